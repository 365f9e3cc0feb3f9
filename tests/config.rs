use clingest::config::{ConfigLoader, DEFAULT_BATCH_SIZE};
use clingest::error::IngestError;

use assert_matches::assert_matches;

#[test]
fn resolve_reads_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("clingest.json");
    std::fs::write(
        &path,
        r#"{
            "clinical_url": "https://candig.example.org/katsu/v3/",
            "genomic_url": "https://candig.example.org/genomics",
            "token": "secret"
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(resolved.clinical_url, "https://candig.example.org/katsu/v3");
    assert_eq!(resolved.drs_host_url, "drs://candig.example.org/genomics");
    assert_eq!(resolved.token.as_deref(), Some("secret"));
    assert_eq!(resolved.batch_size, DEFAULT_BATCH_SIZE);
}

#[test]
fn malformed_config_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("clingest.json");
    std::fs::write(&path, "{not json").unwrap();

    let err = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap_err();
    assert_matches!(err, IngestError::ConfigParse(_));
}

#[test]
fn missing_explicit_config_is_a_read_error() {
    let err = ConfigLoader::resolve(Some("/nonexistent/clingest.json")).unwrap_err();
    assert_matches!(err, IngestError::ConfigRead(_));
}
