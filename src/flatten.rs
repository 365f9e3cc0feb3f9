use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::schema::SchemaModel;

/// Per-type batches of flat records, built up while traversing one donor
/// tree and merged into the program-level result afterwards.
pub type BatchSet = BTreeMap<String, Vec<Map<String, Value>>>;

/// Identifying values already emitted, per entity type. Caller-owned so the
/// duplicate-detection scope can span every donor in a program.
pub type SeenIds = HashMap<String, HashSet<String>>;

/// A record of an identified type is missing its identifying field. Raised
/// per donor; the partitioner converts it into a per-donor error entry
/// rather than aborting the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{entity} record under {ancestor} {ancestor_id} is missing its identifying field")]
pub struct FlattenError {
    pub entity: String,
    pub ancestor: String,
    pub ancestor_id: String,
}

/// Flatten one donor tree into per-type batches, with the program as the
/// root of the parent chain.
pub fn flatten_donor(
    donor: &Value,
    program_id: &str,
    schema: &SchemaModel,
    seen_ids: &mut SeenIds,
) -> Result<BatchSet, FlattenError> {
    let mut batches = BatchSet::new();
    let mut chain = vec![("programs".to_string(), program_id.to_string())];
    traverse(&mut batches, donor, "donors", &mut chain, schema, seen_ids)?;
    Ok(batches)
}

/// Depth-first traversal with an explicit backtracking stack. `parent_chain`
/// holds `(type_name, id)` pairs from the program root down to the current
/// node's parent; it is pushed before recursing into children and popped
/// after, so only the active path is ever held.
///
/// Foreign keys on each emitted record are fixed at two-plus-immediate-parent:
/// the program id, the donor id once the chain is that deep, and the
/// immediate parent's id below that. This matches the target schema's actual
/// foreign-key shape; it is not a general tree-to-relational mapper.
pub fn traverse(
    batches: &mut BatchSet,
    node: &Value,
    type_name: &str,
    parent_chain: &mut Vec<(String, String)>,
    schema: &SchemaModel,
    seen_ids: &mut SeenIds,
) -> Result<(), FlattenError> {
    let Some(object) = node.as_object() else {
        warn!(entity = type_name, "skipping non-object record");
        return Ok(());
    };

    let id_field = schema.id_field(type_name);
    let mut own_id = None;
    if let Some(id_field) = id_field {
        let Some(id) = object.get(id_field).and_then(Value::as_str) else {
            let (ancestor, ancestor_id) = parent_chain
                .last()
                .cloned()
                .unwrap_or_else(|| ("programs".to_string(), String::new()));
            return Err(FlattenError {
                entity: type_name.to_string(),
                ancestor,
                ancestor_id,
            });
        };
        if !seen_ids
            .entry(type_name.to_string())
            .or_default()
            .insert(id.to_string())
        {
            // Same ID appearing twice is harmless repetition; its subtree
            // was already processed the first time.
            warn!(entity = type_name, id, "duplicate identifying value, skipping record");
            return Ok(());
        }
        own_id = Some(id.to_string());
    }

    let mut record = Map::new();
    if let (Some(id_field), Some(id)) = (id_field, own_id.as_deref()) {
        record.insert(id_field.to_string(), Value::from(id));
    }

    let (_, program_id) = &parent_chain[0];
    record.insert("program_id".to_string(), Value::from(program_id.as_str()));
    if parent_chain.len() >= 2 {
        let (donor_type, donor_id) = &parent_chain[1];
        if let Some(field) = schema.id_field(donor_type) {
            record.insert(field.to_string(), Value::from(donor_id.as_str()));
        }
    }
    if parent_chain.len() > 2 {
        let (parent_type, parent_id) = parent_chain.last().expect("chain is non-empty");
        if let Some(field) = schema.id_field(parent_type) {
            record.insert(field.to_string(), Value::from(parent_id.as_str()));
        }
    }

    let mut children: Vec<(&str, &Value)> = Vec::new();
    for (key, value) in object {
        if Some(key.as_str()) == id_field {
            continue;
        }
        let nested = matches!(value, Value::Array(_) | Value::Object(_));
        if nested && schema.is_known(key) {
            children.push((key, value));
        } else {
            // Scalars and unknown nested values stay opaque attributes.
            record.insert(key.clone(), value.clone());
        }
    }
    batches.entry(type_name.to_string()).or_default().push(record);

    let pushed = match own_id {
        Some(id) => {
            parent_chain.push((type_name.to_string(), id));
            true
        }
        None => false,
    };
    let result = descend(batches, &children, parent_chain, schema, seen_ids);
    if pushed {
        parent_chain.pop();
    }
    result
}

fn descend(
    batches: &mut BatchSet,
    children: &[(&str, &Value)],
    parent_chain: &mut Vec<(String, String)>,
    schema: &SchemaModel,
    seen_ids: &mut SeenIds,
) -> Result<(), FlattenError> {
    for (child_type, value) in children {
        match value {
            Value::Array(items) => {
                for item in items {
                    traverse(batches, item, child_type, parent_chain, schema, seen_ids)?;
                }
            }
            Value::Object(_) => {
                traverse(batches, value, child_type, parent_chain, schema, seen_ids)?;
            }
            _ => {}
        }
    }
    Ok(())
}
