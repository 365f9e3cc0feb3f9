use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::IngestError;

/// One named category in the clinical schema. Types without an identifying
/// field (comorbidities, exposures, ...) are attached directly to their
/// parent and cannot be deduplicated by ID.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntityType {
    pub name: String,
    #[serde(default)]
    pub id_field: Option<String>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub children: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SchemaDocument {
    pub entities: Vec<EntityType>,
}

#[derive(Debug, Clone)]
pub enum SchemaSource {
    Url(String),
    Path(String),
    Inline(Value),
}

impl SchemaSource {
    pub fn from_location(location: &str) -> Self {
        if location.starts_with("http") {
            SchemaSource::Url(location.to_string())
        } else {
            SchemaSource::Path(location.to_string())
        }
    }
}

/// Outcome of validating one program partition. Statistics are free-form
/// per-type record counts, forwarded unchanged to the `programs` record.
#[derive(Debug, Default)]
pub struct Validation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub statistics: Map<String, Value>,
}

/// The entity catalogue, read once per partitioning run and read-only
/// thereafter. Declaration order is the dispatch order: downstream storage
/// enforces foreign-key existence, so each type must land after its parent.
#[derive(Debug, Clone)]
pub struct SchemaModel {
    entities: Vec<EntityType>,
    index: HashMap<String, usize>,
}

impl SchemaModel {
    pub fn load(source: &SchemaSource) -> Result<Self, IngestError> {
        let document = match source {
            SchemaSource::Url(url) => {
                let client = reqwest::blocking::Client::builder()
                    .timeout(Duration::from_secs(60))
                    .build()
                    .map_err(|err| IngestError::SchemaSource {
                        url: url.clone(),
                        message: err.to_string(),
                    })?;
                let response =
                    client
                        .get(url)
                        .send()
                        .map_err(|err| IngestError::SchemaSource {
                            url: url.clone(),
                            message: err.to_string(),
                        })?;
                if !response.status().is_success() {
                    return Err(IngestError::SchemaSource {
                        url: url.clone(),
                        message: format!("status {}", response.status().as_u16()),
                    });
                }
                response
                    .json::<SchemaDocument>()
                    .map_err(|err| IngestError::SchemaParse(err.to_string()))?
            }
            SchemaSource::Path(path) => {
                let content =
                    fs::read_to_string(path).map_err(|err| IngestError::SchemaSource {
                        url: path.clone(),
                        message: err.to_string(),
                    })?;
                serde_json::from_str(&content)
                    .map_err(|err| IngestError::SchemaParse(err.to_string()))?
            }
            SchemaSource::Inline(value) => serde_json::from_value(value.clone())
                .map_err(|err| IngestError::SchemaParse(err.to_string()))?,
        };
        Self::from_document(document)
    }

    pub fn from_document(document: SchemaDocument) -> Result<Self, IngestError> {
        if document.entities.is_empty() {
            return Err(IngestError::SchemaParse(
                "schema document declares no entity types".to_string(),
            ));
        }
        let mut index = HashMap::new();
        for (position, entity) in document.entities.iter().enumerate() {
            if index.insert(entity.name.clone(), position).is_some() {
                return Err(IngestError::SchemaParse(format!(
                    "duplicate entity type {}",
                    entity.name
                )));
            }
        }
        Ok(Self {
            entities: document.entities,
            index,
        })
    }

    /// Built-in MoH catalogue, used when no schema source is supplied.
    pub fn moh() -> Self {
        let doc = |name: &str, id_field: Option<&str>, children: &[&str]| EntityType {
            name: name.to_string(),
            id_field: id_field.map(str::to_string),
            required: Vec::new(),
            children: children.iter().map(|child| child.to_string()).collect(),
        };
        let entities = vec![
            doc("programs", Some("program_id"), &["donors"]),
            doc(
                "donors",
                Some("submitter_donor_id"),
                &[
                    "primary_diagnoses",
                    "comorbidities",
                    "exposures",
                    "biomarkers",
                    "follow_ups",
                ],
            ),
            doc(
                "primary_diagnoses",
                Some("submitter_primary_diagnosis_id"),
                &["specimens", "treatments", "follow_ups", "biomarkers"],
            ),
            doc(
                "specimens",
                Some("submitter_specimen_id"),
                &["sample_registrations", "biomarkers"],
            ),
            doc("sample_registrations", Some("submitter_sample_id"), &[]),
            doc(
                "treatments",
                Some("submitter_treatment_id"),
                &[
                    "chemotherapies",
                    "hormone_therapies",
                    "radiations",
                    "immunotherapies",
                    "surgeries",
                    "follow_ups",
                    "biomarkers",
                ],
            ),
            doc("chemotherapies", None, &[]),
            doc("hormone_therapies", None, &[]),
            doc("radiations", None, &[]),
            doc("immunotherapies", None, &[]),
            doc("surgeries", None, &[]),
            doc("follow_ups", Some("submitter_follow_up_id"), &["biomarkers"]),
            doc("biomarkers", None, &[]),
            doc("comorbidities", None, &[]),
            doc("exposures", None, &[]),
        ];
        Self::from_document(SchemaDocument { entities }).expect("built-in catalogue is well-formed")
    }

    pub fn entity(&self, name: &str) -> Option<&EntityType> {
        self.index.get(name).map(|position| &self.entities[*position])
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn id_field(&self, name: &str) -> Option<&str> {
        self.entity(name).and_then(|entity| entity.id_field.as_deref())
    }

    /// Entity names in foreign-key dependency order.
    pub fn dispatch_order(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|entity| entity.name.as_str())
    }

    /// Structural validation of one program's donors, before any flattening
    /// or network dispatch. Attribute-shape conformance beyond required and
    /// identifying fields is delegated to the downstream schema.
    pub fn validate(&self, program_id: &str, donors: &[&Value]) -> Validation {
        let mut validation = Validation::default();
        let mut counts: HashMap<String, u64> = HashMap::new();

        for (position, donor) in donors.iter().enumerate() {
            let label = donor
                .get("submitter_donor_id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("donor at index {position}"));
            self.check_node(donor, "donors", &label, &mut validation, &mut counts);
        }

        for (name, count) in counts {
            validation.statistics.insert(name, Value::from(count));
        }
        validation
            .statistics
            .insert("program_id".to_string(), Value::from(program_id));
        validation
    }

    fn check_node(
        &self,
        node: &Value,
        type_name: &str,
        donor_label: &str,
        validation: &mut Validation,
        counts: &mut HashMap<String, u64>,
    ) {
        let Some(record) = node.as_object() else {
            validation.errors.push(format!(
                "{donor_label}: {type_name} record is not an object"
            ));
            return;
        };
        *counts.entry(type_name.to_string()).or_default() += 1;

        let Some(entity) = self.entity(type_name) else {
            return;
        };
        if let Some(id_field) = &entity.id_field {
            if record.get(id_field).and_then(Value::as_str).is_none() {
                validation.errors.push(format!(
                    "{donor_label}: {type_name} record missing {id_field}"
                ));
            }
        }
        for field in &entity.required {
            if record.get(field).map(Value::is_null).unwrap_or(true) {
                validation.errors.push(format!(
                    "{donor_label}: {type_name} record missing required field {field}"
                ));
            }
        }

        for (key, value) in record {
            if !self.is_known(key) {
                continue;
            }
            if !entity.children.iter().any(|child| child == key) {
                validation.warnings.push(format!(
                    "{donor_label}: {key} nested under {type_name}, which does not declare it"
                ));
            }
            match value {
                Value::Array(items) => {
                    for item in items {
                        self.check_node(item, key, donor_label, validation, counts);
                    }
                }
                Value::Object(_) => self.check_node(value, key, donor_label, validation, counts),
                _ => {}
            }
        }
    }
}
