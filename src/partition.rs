use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::IngestError;
use crate::flatten::{flatten_donor, BatchSet, SeenIds};
use crate::schema::SchemaModel;

/// Partition key for donors that carry no `program_id`. Nothing under this
/// key is ever flattened or dispatched.
pub const UNKNOWN_PROGRAM: &str = "unknown";

/// Raw clinical submission: a flat list of donor trees plus an optional
/// schema location.
#[derive(Debug, Deserialize)]
pub struct ClinicalSubmission {
    #[serde(default)]
    pub openapi_url: Option<String>,
    pub donors: Vec<Value>,
}

/// Per-program authorization, delegated to an external collaborator.
pub trait ProgramGate: Send + Sync {
    fn is_authorized(&self, program_id: &str) -> Result<bool, IngestError>;
}

/// Gate that admits every program; for local validation runs and tests.
pub struct AllowAll;

impl ProgramGate for AllowAll {
    fn is_authorized(&self, _program_id: &str) -> Result<bool, IngestError> {
        Ok(true)
    }
}

/// One program's partition after validation and flattening. `schemas` is
/// empty whenever `errors` is non-empty: invalid or unauthorized programs
/// are withheld from dispatch, not partially flattened.
#[derive(Debug, Default)]
pub struct ProgramResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub schemas: BatchSet,
    pub statistics: Map<String, Value>,
    /// True when the authorization gate rejected this program, so the
    /// caller can report Permission rather than Validation.
    pub denied: bool,
}

impl ProgramResult {
    pub fn dispatch_ready(&self) -> bool {
        self.errors.is_empty() && !self.schemas.is_empty()
    }
}

/// Group donors by program, validate each program fail-closed, check its
/// authorization, then flatten every donor and inject the single-record
/// `programs` pseudo-batch. One program's failure never blocks its siblings.
pub fn partition_and_validate(
    submission: &ClinicalSubmission,
    schema: &SchemaModel,
    gate: &dyn ProgramGate,
) -> BTreeMap<String, ProgramResult> {
    let mut groups: BTreeMap<String, Vec<&Value>> = BTreeMap::new();
    let mut results: BTreeMap<String, ProgramResult> = BTreeMap::new();

    for (position, donor) in submission.donors.iter().enumerate() {
        match donor.get("program_id").and_then(Value::as_str) {
            Some(program_id) => groups.entry(program_id.to_string()).or_default().push(donor),
            None => results
                .entry(UNKNOWN_PROGRAM.to_string())
                .or_default()
                .errors
                .push(format!("donor at index {position} has no program_id")),
        }
    }

    for (program_id, donors) in groups {
        let mut result = ProgramResult::default();

        let validation = schema.validate(&program_id, &donors);
        result.warnings = validation.warnings;
        result.statistics = validation.statistics;
        if !validation.errors.is_empty() {
            // Fail closed: no partial flatten of invalid data.
            result.errors = validation.errors;
            results.insert(program_id, result);
            continue;
        }

        match gate.is_authorized(&program_id) {
            Ok(true) => {}
            Ok(false) => {
                result.denied = true;
                result
                    .errors
                    .push(format!("not authorized to ingest into program {program_id}"));
                results.insert(program_id, result);
                continue;
            }
            Err(err) => {
                result
                    .errors
                    .push(format!("authorization check failed for {program_id}: {err}"));
                results.insert(program_id, result);
                continue;
            }
        }

        let mut aggregate = BatchSet::new();
        let mut seen_ids = SeenIds::new();
        for donor in &donors {
            match flatten_donor(donor, &program_id, schema, &mut seen_ids) {
                Ok(batches) => {
                    for (entity, mut records) in batches {
                        aggregate.entry(entity).or_default().append(&mut records);
                    }
                }
                Err(err) => result.errors.push(err.to_string()),
            }
        }

        if result.errors.is_empty() {
            aggregate.insert("programs".to_string(), vec![result.statistics.clone()]);
            debug!(
                program = %program_id,
                entity_types = aggregate.len(),
                "program partition flattened"
            );
            result.schemas = aggregate;
        }
        results.insert(program_id, result);
    }

    results
}
