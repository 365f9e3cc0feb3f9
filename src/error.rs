use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

/// Fatal, configuration-level failures. Per-program and per-sample problems
/// are accumulated in result structures instead, so one program's failure
/// never aborts its siblings.
#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("missing config file clingest.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to fetch schema from {url}: {message}")]
    SchemaSource { url: String, message: String },

    #[error("malformed schema document: {0}")]
    SchemaParse(String),

    #[error("failed to read submission file {0}")]
    SubmissionRead(Utf8PathBuf),

    #[error("malformed submission: {0}")]
    SubmissionParse(String),

    #[error("clinical store request failed: {0}")]
    ClinicalHttp(String),

    #[error("clinical store returned status {status}: {message}")]
    ClinicalStatus { status: u16, message: String },

    #[error("clinical store endpoint not found for entity type {entity}: {message}")]
    EndpointNotFound { entity: String, message: String },

    #[error("genomic store request failed: {0}")]
    DrsHttp(String),

    #[error("genomic store returned status {status}: {message}")]
    DrsStatus { status: u16, message: String },

    #[error("invalid access URL {url}: {message}")]
    InvalidAccessUrl { url: String, message: String },

    #[error("missing bearer token: set it in the config file or pass --token")]
    MissingToken,
}
