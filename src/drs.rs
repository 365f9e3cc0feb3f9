use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// One entry in a DRS object's contents list, pointing at other DRS objects
/// by URI. Entries are keyed by `name`: an object's contents list never
/// holds two entries with the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrsContentsEntry {
    pub name: String,
    pub id: String,
    pub drs_uri: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessMethod {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_url: Option<AccessUrl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_id: Option<String>,
}

/// One addressable unit in the genomics store: a raw file, an index file, a
/// master object unifying them, or a per-clinical-sample linking object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrsObject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cohort: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_genome: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_methods: Vec<AccessMethod>,
    #[serde(default)]
    pub contents: Vec<DrsContentsEntry>,
}

impl DrsObject {
    /// Replace-in-place by name, append otherwise. This is what keeps the
    /// read-merge-write cycle idempotent: the store enforces no uniqueness
    /// on contents, so blind appends would grow the list on every rerun.
    pub fn upsert_contents(&mut self, entry: DrsContentsEntry) {
        if let Some(existing) = self
            .contents
            .iter_mut()
            .find(|existing| existing.name == entry.name)
        {
            *existing = entry;
        } else {
            self.contents.push(entry);
        }
    }
}

/// Components of an S3-style access URL, `http(s)://endpoint/bucket/object`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Parts {
    pub endpoint: String,
    pub bucket: String,
    pub object: String,
}

fn s3_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^((https*|s3)://(.+?))/(.+)$").expect("static regex"))
}

pub fn parse_s3_url(url: &str) -> Result<S3Parts, IngestError> {
    let captures = s3_url_regex()
        .captures(url)
        .ok_or_else(|| IngestError::InvalidAccessUrl {
            url: url.to_string(),
            message: "cannot be parsed as an S3-style URL".to_string(),
        })?;
    if &captures[2] == "s3" {
        return Err(IngestError::InvalidAccessUrl {
            url: url.to_string(),
            message: "S3 URLs should be in the form http(s)://endpoint-url/bucket-name/object"
                .to_string(),
        });
    }
    let endpoint = captures[1].to_string();
    let rest = &captures[4];
    let (bucket, object) = rest
        .split_once('/')
        .ok_or_else(|| IngestError::InvalidAccessUrl {
            url: url.to_string(),
            message: "does not contain a bucket name".to_string(),
        })?;
    Ok(S3Parts {
        endpoint,
        bucket: bucket.to_string(),
        object: object.to_string(),
    })
}

/// Build the access method for a file location: local `file://` URLs are
/// embedded directly, anything else must parse as an S3-style URL and is
/// referenced by access id.
pub fn access_method_for(url: &str) -> Result<AccessMethod, IngestError> {
    if url.starts_with("file") {
        return Ok(AccessMethod {
            kind: "file".to_string(),
            access_url: Some(AccessUrl {
                url: url.to_string(),
            }),
            access_id: None,
        });
    }
    parse_s3_url(url)?;
    Ok(AccessMethod {
        kind: "s3".to_string(),
        access_url: None,
        access_id: Some(url.to_string()),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyOutcome {
    pub result: bool,
    #[serde(default)]
    pub message: String,
}

pub trait DrsClient: Send + Sync {
    /// GET by id; absent objects are `None`, not an error.
    fn get_object(&self, id: &str) -> Result<Option<DrsObject>, IngestError>;
    /// Upsert; the store keys nothing, so callers must read-merge-write.
    fn post_object(&self, object: &DrsObject) -> Result<DrsObject, IngestError>;
    fn verify(&self, data_type: &str, id: &str) -> Result<VerifyOutcome, IngestError>;
    fn index(&self, data_type: &str, id: &str) -> Result<(), IngestError>;
}

#[derive(Clone)]
pub struct DrsHttpClient {
    client: Client,
    base_url: String,
}

impl DrsHttpClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, IngestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("clingest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| IngestError::DrsHttp(err.to_string()))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| IngestError::DrsHttp(err.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| IngestError::DrsHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn objects_url(&self) -> String {
        format!("{}/ga4gh/drs/v1/objects", self.base_url)
    }
}

impl DrsClient for DrsHttpClient {
    fn get_object(&self, id: &str) -> Result<Option<DrsObject>, IngestError> {
        let url = format!("{}/{id}", self.objects_url());
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| IngestError::DrsHttp(err.to_string()))?;
        match response.status().as_u16() {
            200 => {
                let object = response
                    .json::<DrsObject>()
                    .map_err(|err| IngestError::DrsHttp(err.to_string()))?;
                Ok(Some(object))
            }
            404 => Ok(None),
            status => {
                let message = response.text().unwrap_or_default();
                Err(IngestError::DrsStatus { status, message })
            }
        }
    }

    fn post_object(&self, object: &DrsObject) -> Result<DrsObject, IngestError> {
        let response = self
            .client
            .post(self.objects_url())
            .json(object)
            .send()
            .map_err(|err| IngestError::DrsHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().unwrap_or_default();
            return Err(IngestError::DrsStatus { status, message });
        }
        response
            .json::<DrsObject>()
            .map_err(|err| IngestError::DrsHttp(err.to_string()))
    }

    fn verify(&self, data_type: &str, id: &str) -> Result<VerifyOutcome, IngestError> {
        let url = format!("{}/htsget/v1/{data_type}s/{id}/verify", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| IngestError::DrsHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().unwrap_or_default();
            return Err(IngestError::DrsStatus { status, message });
        }
        response
            .json::<VerifyOutcome>()
            .map_err(|err| IngestError::DrsHttp(err.to_string()))
    }

    fn index(&self, data_type: &str, id: &str) -> Result<(), IngestError> {
        let url = format!("{}/htsget/v1/{data_type}s/{id}/index", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| IngestError::DrsHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().unwrap_or_default();
            return Err(IngestError::DrsStatus { status, message });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn entry(name: &str, id: &str) -> DrsContentsEntry {
        DrsContentsEntry {
            name: name.to_string(),
            id: id.to_string(),
            drs_uri: vec![format!("drs://host/{name}")],
        }
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut object = DrsObject {
            id: "HG00096.vcf.gz".to_string(),
            ..DrsObject::default()
        };
        object.upsert_contents(entry("HG00096.vcf.gz", "variant"));
        object.upsert_contents(entry("SAMPLE_1", "sample"));
        object.upsert_contents(entry("HG00096.vcf.gz", "variant"));

        assert_eq!(object.contents.len(), 2);
        assert_eq!(object.contents[0].name, "HG00096.vcf.gz");
    }

    #[test]
    fn parse_s3_style_url() {
        let parts = parse_s3_url("https://minio.example.org/mybucket/dir/file.vcf.gz").unwrap();
        assert_eq!(parts.endpoint, "https://minio.example.org");
        assert_eq!(parts.bucket, "mybucket");
        assert_eq!(parts.object, "dir/file.vcf.gz");
    }

    #[test]
    fn s3_scheme_is_rejected() {
        let err = parse_s3_url("s3://mybucket/file.vcf.gz").unwrap_err();
        assert_matches!(err, IngestError::InvalidAccessUrl { .. });
    }

    #[test]
    fn bucketless_url_is_rejected() {
        let err = parse_s3_url("https://minio.example.org/file.vcf.gz").unwrap_err();
        assert_matches!(err, IngestError::InvalidAccessUrl { .. });
    }

    #[test]
    fn file_access_method() {
        let method = access_method_for("file:///data/HG00096.vcf.gz").unwrap();
        assert_eq!(method.kind, "file");
        assert_eq!(
            method.access_url.unwrap().url,
            "file:///data/HG00096.vcf.gz"
        );
        assert!(method.access_id.is_none());
    }

    #[test]
    fn s3_access_method_keeps_full_url_as_id() {
        let method = access_method_for("https://minio.example.org/bucket/HG00096.vcf.gz").unwrap();
        assert_eq!(method.kind, "s3");
        assert_eq!(
            method.access_id.as_deref(),
            Some("https://minio.example.org/bucket/HG00096.vcf.gz")
        );
    }

    #[test]
    fn optional_fields_are_omitted_from_json() {
        let object = DrsObject {
            id: "x".to_string(),
            name: "x".to_string(),
            description: "sample".to_string(),
            cohort: "SYNTHETIC-1".to_string(),
            version: "v1".to_string(),
            ..DrsObject::default()
        };
        let json = serde_json::to_value(&object).unwrap();
        assert!(json.get("reference_genome").is_none());
        assert!(json.get("access_methods").is_none());
        assert!(json.get("contents").is_some());
    }
}
