//! Record store collaborator interface
//!
//! The remote service owns pipeline execution and record persistence. This
//! trait is the seam the session orchestrator talks to; `HttpRecordStore` is
//! the production implementation.

use async_trait::async_trait;
use ayush_common::api::{
    DiagnosisPatch, DiagnosisRecord, NewPatient, PatientRecord, PipelineRequest,
    PipelineResponse,
};
use serde_json::{Map, Value};

/// Body of a failed response, classified by shape
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// No body at all
    Absent,
    /// JSON object (detail message or field-error map)
    Object(Map<String, Value>),
    /// Any other body: markup page, plain text, JSON string
    Text(String),
}

impl ResponseBody {
    /// Classify a raw response body
    ///
    /// JSON objects become `Object`, JSON strings are unwrapped into `Text`,
    /// anything else is kept verbatim as `Text`.
    pub fn from_text(text: &str) -> Self {
        if text.trim().is_empty() {
            return ResponseBody::Absent;
        }

        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => ResponseBody::Object(map),
            Ok(Value::String(s)) => ResponseBody::Text(s),
            _ => ResponseBody::Text(text.to_string()),
        }
    }

    /// Original body as an opaque diagnostic value
    pub fn to_raw_detail(&self) -> Option<Value> {
        match self {
            ResponseBody::Absent => None,
            ResponseBody::Object(map) => Some(Value::Object(map.clone())),
            ResponseBody::Text(text) => Some(Value::String(text.clone())),
        }
    }
}

/// A response that arrived with a failure status
#[derive(Debug, Clone, PartialEq)]
pub struct FailureResponse {
    pub status: u16,
    pub body: ResponseBody,
}

/// Transport-level failure of a remote call
///
/// Never shown to the user directly; feed it to
/// [`normalize`](crate::services::error_normalizer::normalize).
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFailure {
    /// `None` when no response was received at all
    pub response: Option<FailureResponse>,
    /// Transport error text (connect refused, decode error, ...)
    pub transport_message: Option<String>,
}

impl RemoteFailure {
    /// No response reachable
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            response: None,
            transport_message: Some(message.into()),
        }
    }

    /// Response with failure status and body
    pub fn status(status: u16, body: ResponseBody) -> Self {
        Self {
            response: Some(FailureResponse { status, body }),
            transport_message: None,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }
}

impl std::fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.response, &self.transport_message) {
            (Some(response), _) => write!(f, "HTTP {}", response.status),
            (None, Some(message)) => write!(f, "no response: {}", message),
            (None, None) => write!(f, "no response"),
        }
    }
}

/// Remote record store and pipeline endpoint
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Invoke the remote extraction/mapping/validation pipeline
    async fn run_pipeline(
        &self,
        request: &PipelineRequest,
    ) -> Result<PipelineResponse, RemoteFailure>;

    /// Partially update a diagnosis record
    async fn patch_diagnosis(
        &self,
        diagnosis_id: i64,
        patch: &DiagnosisPatch,
    ) -> Result<DiagnosisRecord, RemoteFailure>;

    /// Fetch every diagnosis visible to the caller
    async fn list_diagnoses(&self) -> Result<Vec<DiagnosisRecord>, RemoteFailure>;

    /// Create a patient record
    async fn create_patient(&self, patient: &NewPatient) -> Result<PatientRecord, RemoteFailure>;

    /// Fetch every patient visible to the caller
    async fn list_patients(&self) -> Result<Vec<PatientRecord>, RemoteFailure>;
}
