use std::collections::BTreeMap;
use std::fs;

use camino::Utf8Path;
use serde::Serialize;
use serde_json::Value;

use crate::clinical::ClinicalClient;
use crate::config::ResolvedConfig;
use crate::dispatch::dispatch;
use crate::drs::DrsClient;
use crate::error::IngestError;
use crate::linker::{ingest_genomic, GenomicIngestSummary, GenomicManifestEntry};
use crate::partition::{partition_and_validate, ClinicalSubmission, ProgramGate, UNKNOWN_PROGRAM};
use crate::report::IngestOutcome;
use crate::schema::{SchemaModel, SchemaSource};

#[derive(Debug, Serialize)]
pub struct ProgramReport {
    #[serde(flatten)]
    pub outcome: IngestOutcome,
    pub response_code: u16,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub counts: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize)]
pub struct ClinicalIngestReport {
    pub queued_at: String,
    pub programs: BTreeMap<String, ProgramReport>,
    pub response_code: u16,
}

#[derive(Debug, Serialize)]
pub struct GenomicIngestReport {
    pub queued_at: String,
    #[serde(flatten)]
    pub summary: GenomicIngestSummary,
}

#[derive(Debug, Serialize)]
pub struct CleanReport {
    pub deleted: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// The ingest orchestrator: validates and flattens a submission, dispatches
/// it per program, and maps every outcome into the report taxonomy. Each
/// call owns its partitions exclusively; the only shared mutable resource is
/// the remote store.
#[derive(Clone)]
pub struct App<C: ClinicalClient + ProgramGate, D: DrsClient> {
    config: ResolvedConfig,
    clinical: C,
    drs: D,
}

impl<C: ClinicalClient + ProgramGate, D: DrsClient> App<C, D> {
    pub fn new(config: ResolvedConfig, clinical: C, drs: D) -> Self {
        Self {
            config,
            clinical,
            drs,
        }
    }

    /// Ingest one clinical submission. Programs fail independently; a 404
    /// from the store is a misconfiguration and aborts the whole call.
    pub fn ingest_clinical(
        &self,
        submission: &ClinicalSubmission,
    ) -> Result<ClinicalIngestReport, IngestError> {
        let schema = self.resolve_schema(submission)?;
        let partitions = partition_and_validate(submission, &schema, &self.clinical);

        let mut programs = BTreeMap::new();
        for (program_id, partition) in partitions {
            let report = if partition.dispatch_ready() {
                let summary = dispatch(
                    &program_id,
                    &partition.schemas,
                    &schema,
                    &self.clinical,
                    self.config.batch_size,
                )?;
                ProgramReport {
                    response_code: summary.outcome.response_code(),
                    outcome: summary.outcome,
                    warnings: partition.warnings,
                    counts: summary.counts,
                }
            } else {
                let outcome = if partition.denied {
                    IngestOutcome::Permission {
                        result: partition.errors.join("; "),
                    }
                } else if program_id == UNKNOWN_PROGRAM {
                    IngestOutcome::User {
                        result: partition.errors.join("; "),
                    }
                } else {
                    IngestOutcome::Validation {
                        result: format!("program {program_id} failed validation, nothing ingested"),
                        validation_errors: partition.errors,
                    }
                };
                ProgramReport {
                    response_code: outcome.response_code(),
                    outcome,
                    warnings: partition.warnings,
                    counts: BTreeMap::new(),
                }
            };
            programs.insert(program_id, report);
        }

        let response_code = programs
            .values()
            .map(|report| report.response_code)
            .max()
            .unwrap_or(200);
        Ok(ClinicalIngestReport {
            queued_at: iso_timestamp(),
            programs,
            response_code,
        })
    }

    /// Ingest one genomic manifest: an independent pipeline over files and
    /// samples rather than donors.
    pub fn ingest_genomic(&self, manifest: &[GenomicManifestEntry]) -> GenomicIngestReport {
        GenomicIngestReport {
            queued_at: iso_timestamp(),
            summary: ingest_genomic(manifest, &self.drs, &self.config.drs_host_url),
        }
    }

    /// Delete programs and all their dependent records downstream.
    pub fn clean(&self, program_ids: &[String]) -> Result<CleanReport, IngestError> {
        let mut report = CleanReport {
            deleted: Vec::new(),
            errors: Vec::new(),
        };
        for program_id in program_ids {
            let response = self.clinical.delete_program(program_id)?;
            if response.status == 204 {
                report.deleted.push(program_id.clone());
            } else {
                report.errors.push(format!(
                    "failed to delete {program_id}: status {} {}",
                    response.status, response.body
                ));
            }
        }
        Ok(report)
    }

    fn resolve_schema(&self, submission: &ClinicalSubmission) -> Result<SchemaModel, IngestError> {
        let location = submission
            .openapi_url
            .as_deref()
            .or(self.config.schema_url.as_deref());
        match location {
            Some(location) => SchemaModel::load(&SchemaSource::from_location(location)),
            None => Ok(SchemaModel::moh()),
        }
    }
}

pub fn read_submission(path: &Utf8Path) -> Result<ClinicalSubmission, IngestError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|_| IngestError::SubmissionRead(path.to_path_buf()))?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|err| IngestError::SubmissionParse(err.to_string()))?;
    parse_submission(value)
}

pub fn read_manifest(path: &Utf8Path) -> Result<Vec<GenomicManifestEntry>, IngestError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|_| IngestError::SubmissionRead(path.to_path_buf()))?;
    serde_json::from_str(&content).map_err(|err| IngestError::SubmissionParse(err.to_string()))
}

/// Accept either a bare donor list or the `{openapi_url, donors}` wrapper.
pub fn parse_submission(value: Value) -> Result<ClinicalSubmission, IngestError> {
    if value.is_array() {
        let donors = serde_json::from_value(value)
            .map_err(|err| IngestError::SubmissionParse(err.to_string()))?;
        return Ok(ClinicalSubmission {
            openapi_url: None,
            donors,
        });
    }
    serde_json::from_value(value).map_err(|err| IngestError::SubmissionParse(err.to_string()))
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
