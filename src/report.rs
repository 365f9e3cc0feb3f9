use serde::Serialize;

/// Outcome of one ingest unit (a program or a whole manifest), as a tagged
/// union so callers can pattern-match instead of catching exceptions. The
/// `Validation` variant carries the structural errors separately from the
/// summary message.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestOutcome {
    Completed {
        result: String,
    },
    Validation {
        result: String,
        validation_errors: Vec<String>,
    },
    Permission {
        result: String,
    },
    /// The cohort/program already exists downstream. Benign: re-ingestion of
    /// a program record is expected and safe.
    CohortExists {
        result: String,
    },
    Server {
        result: String,
    },
    User {
        result: String,
    },
}

impl IngestOutcome {
    pub fn response_code(&self) -> u16 {
        match self {
            IngestOutcome::Completed { .. } => 201,
            IngestOutcome::CohortExists { .. } => 200,
            IngestOutcome::Validation { .. } | IngestOutcome::User { .. } => 422,
            IngestOutcome::Permission { .. } => 403,
            IngestOutcome::Server { .. } => 500,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            IngestOutcome::Completed { .. } | IngestOutcome::CohortExists { .. }
        )
    }

    pub fn message(&self) -> &str {
        match self {
            IngestOutcome::Completed { result }
            | IngestOutcome::Validation { result, .. }
            | IngestOutcome::Permission { result }
            | IngestOutcome::CohortExists { result }
            | IngestOutcome::Server { result }
            | IngestOutcome::User { result } => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_codes() {
        let completed = IngestOutcome::Completed {
            result: "ok".to_string(),
        };
        assert_eq!(completed.response_code(), 201);
        assert!(completed.is_success());

        let exists = IngestOutcome::CohortExists {
            result: "already ingested".to_string(),
        };
        assert_eq!(exists.response_code(), 200);
        assert!(exists.is_success());

        let forbidden = IngestOutcome::Permission {
            result: "denied".to_string(),
        };
        assert_eq!(forbidden.response_code(), 403);
        assert!(!forbidden.is_success());
    }

    #[test]
    fn serialize_tagged() {
        let outcome = IngestOutcome::Validation {
            result: "validation failed".to_string(),
            validation_errors: vec!["donors: missing submitter_donor_id".to_string()],
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "validation");
        assert_eq!(json["validation_errors"].as_array().unwrap().len(), 1);
    }
}
