use std::collections::BTreeMap;

use tracing::debug;

use crate::clinical::ClinicalClient;
use crate::error::IngestError;
use crate::flatten::BatchSet;
use crate::report::IngestOutcome;
use crate::schema::SchemaModel;

#[derive(Debug)]
pub struct DispatchSummary {
    pub counts: BTreeMap<String, usize>,
    pub outcome: IngestOutcome,
}

/// Dispatch one program's flattened batches in the schema's declared
/// dependency order, chunked to bound request size. There is no transaction
/// spanning chunks: committed chunks stay committed, and any abort mid-way
/// is surfaced as a "may be partially ingested" outcome for the caller.
///
/// A 404 is a misconfigured endpoint and aborts the whole submission, not
/// just this program.
pub fn dispatch<C: ClinicalClient>(
    program_id: &str,
    batches: &BatchSet,
    schema: &SchemaModel,
    client: &C,
    batch_size: usize,
) -> Result<DispatchSummary, IngestError> {
    let chunk_size = batch_size.max(1);
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut cohort_existed = false;

    for entity in schema.dispatch_order() {
        let Some(records) = batches.get(entity) else {
            continue;
        };
        for chunk in records.chunks(chunk_size) {
            let response = match client.post_batch(entity, chunk) {
                Ok(response) => response,
                Err(err) => {
                    return Ok(DispatchSummary {
                        outcome: IngestOutcome::Server {
                            result: partial_note(
                                format!("program {program_id}: {entity} request failed: {err}"),
                                &counts,
                            ),
                        },
                        counts,
                    });
                }
            };

            match response.status {
                201 => {
                    *counts.entry(entity.to_string()).or_default() += chunk.len();
                    debug!(program = program_id, entity, records = chunk.len(), "chunk ingested");
                }
                404 => {
                    return Err(IngestError::EndpointNotFound {
                        entity: entity.to_string(),
                        message: response.body,
                    });
                }
                403 => {
                    return Ok(DispatchSummary {
                        outcome: IngestOutcome::Permission {
                            result: partial_note(
                                format!(
                                    "program {program_id}: not allowed to ingest {entity} \
                                     (later entity types were not attempted)"
                                ),
                                &counts,
                            ),
                        },
                        counts,
                    });
                }
                _ if entity == "programs" && response.body.contains("unique") => {
                    // Program re-ingestion is expected and safe; the record
                    // already exists downstream.
                    debug!(program = program_id, "program record already ingested");
                    cohort_existed = true;
                    break;
                }
                status => {
                    return Ok(DispatchSummary {
                        outcome: IngestOutcome::Server {
                            result: partial_note(
                                format!(
                                    "program {program_id}: {entity} ingest returned status \
                                     {status}: {}",
                                    response.body
                                ),
                                &counts,
                            ),
                        },
                        counts,
                    });
                }
            }
        }
    }

    let total: usize = counts.values().sum();
    let result = format!(
        "program {program_id}: ingested {total} records across {} entity types",
        counts.len()
    );
    let outcome = if cohort_existed {
        IngestOutcome::CohortExists { result }
    } else {
        IngestOutcome::Completed { result }
    };
    Ok(DispatchSummary { counts, outcome })
}

fn partial_note(message: String, counts: &BTreeMap<String, usize>) -> String {
    if counts.is_empty() {
        message
    } else {
        format!("{message}; earlier batches may be partially ingested and need manual cleanup")
    }
}
