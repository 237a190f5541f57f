//! HTTP record store
//!
//! [`RecordStore`] over the remote diagnosis service's JSON API.

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::services::record_store::{FailureResponse, RecordStore, RemoteFailure, ResponseBody};
use async_trait::async_trait;
use ayush_common::api::{
    DiagnosisPatch, DiagnosisRecord, NewPatient, PatientRecord, PipelineRequest,
    PipelineResponse,
};
use serde::de::DeserializeOwned;

const USER_AGENT: &str = concat!("ayush-client/", env!("CARGO_PKG_VERSION"));

/// Remote diagnosis service client
pub struct HttpRecordStore {
    http_client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl HttpRecordStore {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = self.url(path);
        tracing::debug!(method = %method, url = %url, "Calling diagnosis service");

        let builder = self.http_client.request(method, url);
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and decode a JSON success body
    async fn execute<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, RemoteFailure> {
        let response = builder
            .send()
            .await
            .map_err(|e| RemoteFailure::network(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| RemoteFailure {
            response: Some(FailureResponse {
                status: status.as_u16(),
                body: ResponseBody::Absent,
            }),
            transport_message: Some(e.to_string()),
        })?;

        if !status.is_success() {
            tracing::debug!(
                status = status.as_u16(),
                body_len = text.len(),
                "Diagnosis service returned failure status"
            );
            return Err(RemoteFailure::status(
                status.as_u16(),
                ResponseBody::from_text(&text),
            ));
        }

        serde_json::from_str(&text).map_err(|e| {
            tracing::warn!(status = status.as_u16(), error = %e, "Undecodable success body");
            RemoteFailure {
                response: Some(FailureResponse {
                    status: status.as_u16(),
                    body: ResponseBody::Absent,
                }),
                transport_message: Some(format!("Invalid response from server: {}", e)),
            }
        })
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn run_pipeline(
        &self,
        request: &PipelineRequest,
    ) -> Result<PipelineResponse, RemoteFailure> {
        let builder = self
            .request(reqwest::Method::POST, "/run_pipeline/")
            .json(request);
        self.execute(builder).await
    }

    async fn patch_diagnosis(
        &self,
        diagnosis_id: i64,
        patch: &DiagnosisPatch,
    ) -> Result<DiagnosisRecord, RemoteFailure> {
        let builder = self
            .request(
                reqwest::Method::PATCH,
                &format!("/diagnoses/{}/", diagnosis_id),
            )
            .json(patch);
        self.execute(builder).await
    }

    async fn list_diagnoses(&self) -> Result<Vec<DiagnosisRecord>, RemoteFailure> {
        self.execute(self.request(reqwest::Method::GET, "/diagnoses/"))
            .await
    }

    async fn create_patient(&self, patient: &NewPatient) -> Result<PatientRecord, RemoteFailure> {
        let builder = self
            .request(reqwest::Method::POST, "/patients/")
            .json(patient);
        self.execute(builder).await
    }

    async fn list_patients(&self) -> Result<Vec<PatientRecord>, RemoteFailure> {
        self.execute(self.request(reqwest::Method::GET, "/patients/"))
            .await
    }
}
