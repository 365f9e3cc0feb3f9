use std::fs;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// On-disk configuration, `clingest.json` by default. Core functions take a
/// [`ResolvedConfig`] by reference and never read environment state.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub clinical_url: String,
    pub genomic_url: String,
    #[serde(default)]
    pub drs_host_url: Option<String>,
    #[serde(default)]
    pub schema_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub clinical_url: String,
    pub genomic_url: String,
    pub drs_host_url: String,
    pub schema_url: Option<String>,
    pub token: Option<String>,
    pub batch_size: usize,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, IngestError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from("clingest.json"),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Err(IngestError::MissingConfig);
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| IngestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| IngestError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        let clinical_url = config.clinical_url.trim_end_matches('/').to_string();
        let genomic_url = config.genomic_url.trim_end_matches('/').to_string();
        let drs_host_url = config
            .drs_host_url
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| default_drs_host(&genomic_url));

        ResolvedConfig {
            clinical_url,
            genomic_url,
            drs_host_url,
            schema_url: config.schema_url,
            token: config.token,
            batch_size: config.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
        }
    }
}

/// DRS URIs use the genomic host with a `drs://` scheme.
fn default_drs_host(genomic_url: &str) -> String {
    let without_scheme = genomic_url
        .strip_prefix("https://")
        .or_else(|| genomic_url.strip_prefix("http://"))
        .unwrap_or(genomic_url);
    format!("drs://{without_scheme}")
}
