use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde_json::{Map, Value};

use crate::error::IngestError;
use crate::partition::ProgramGate;

/// Raw outcome of one clinical store call; the dispatcher interprets the
/// status code and body.
#[derive(Debug, Clone)]
pub struct BatchResponse {
    pub status: u16,
    pub body: String,
}

pub trait ClinicalClient: Send + Sync {
    fn post_batch(
        &self,
        entity: &str,
        records: &[Map<String, Value>],
    ) -> Result<BatchResponse, IngestError>;
    fn program_is_authorized(&self, program_id: &str) -> Result<bool, IngestError>;
    fn delete_program(&self, program_id: &str) -> Result<BatchResponse, IngestError>;
}

#[derive(Clone)]
pub struct ClinicalHttpClient {
    client: Client,
    base_url: String,
}

impl ClinicalHttpClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, IngestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("clingest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| IngestError::ClinicalHttp(err.to_string()))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| IngestError::ClinicalHttp(err.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| IngestError::ClinicalHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn read_response(
        response: reqwest::blocking::Response,
    ) -> Result<BatchResponse, IngestError> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| IngestError::ClinicalHttp(err.to_string()))?;
        Ok(BatchResponse { status, body })
    }
}

impl ClinicalClient for ClinicalHttpClient {
    fn post_batch(
        &self,
        entity: &str,
        records: &[Map<String, Value>],
    ) -> Result<BatchResponse, IngestError> {
        let url = format!("{}/ingest/{entity}/", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(records)
            .send()
            .map_err(|err| IngestError::ClinicalHttp(err.to_string()))?;
        Self::read_response(response)
    }

    fn program_is_authorized(&self, program_id: &str) -> Result<bool, IngestError> {
        let url = format!("{}/authorized/programs/", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("program_id", program_id)])
            .send()
            .map_err(|err| IngestError::ClinicalHttp(err.to_string()))?;
        match response.status().as_u16() {
            200 => Ok(true),
            403 | 404 => Ok(false),
            status => {
                let message = response.text().unwrap_or_default();
                Err(IngestError::ClinicalStatus { status, message })
            }
        }
    }

    fn delete_program(&self, program_id: &str) -> Result<BatchResponse, IngestError> {
        let url = format!("{}/authorized/programs/{program_id}/", self.base_url);
        let response = self
            .client
            .delete(&url)
            .send()
            .map_err(|err| IngestError::ClinicalHttp(err.to_string()))?;
        Self::read_response(response)
    }
}

impl ProgramGate for ClinicalHttpClient {
    fn is_authorized(&self, program_id: &str) -> Result<bool, IngestError> {
        self.program_is_authorized(program_id)
    }
}
