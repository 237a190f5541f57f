//! Shared API request/response types
//!
//! Types exchanged with the remote diagnosis service. Field names follow the
//! service's snake_case JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ========================================
// Pipeline Types
// ========================================

/// Body of a pipeline invocation
///
/// # Examples
///
/// ```
/// use ayush_common::api::PipelineRequest;
///
/// let request = PipelineRequest {
///     patient_id: 7,
///     raw_text: "fever and cough".to_string(),
///     auto_push: false,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PipelineRequest {
    pub patient_id: i64,
    pub raw_text: String,
    /// Push the resulting record to the national health exchange when confident
    pub auto_push: bool,
}

/// Successful pipeline invocation response
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PipelineResponse {
    #[serde(default)]
    pub message: Option<String>,
    /// Identifier of the diagnosis record persisted for this run
    #[serde(default)]
    pub diagnosis_id: Option<i64>,
    pub result: PipelineResult,
}

/// Best code mapping chosen by the remote pipeline
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct BestMatch {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub title: String,
}

/// One plausible code mapping returned for an ambiguous term
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Candidate {
    pub code: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub source_term: String,
    #[serde(default)]
    pub score: Option<f64>,
}

impl Candidate {
    /// Identity key used for selection and de-duplication
    pub fn identity(&self) -> (&str, &str) {
        (self.code.as_str(), self.source_term.as_str())
    }

    pub fn same_identity(&self, other: &Candidate) -> bool {
        self.identity() == other.identity()
    }
}

/// Result payload of one pipeline run
///
/// Fields this client does not interpret (provenance, FHIR bundle, ...) are
/// kept in `extra` and serialized back unchanged.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct PipelineResult {
    #[serde(default)]
    pub ayush_term: String,
    #[serde(default)]
    pub best: Option<BestMatch>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub needs_human_review: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub manual_review_candidates: Vec<Candidate>,
    #[serde(default)]
    pub review_reasons: Vec<String>,
    /// Candidate committed through manual review, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_review_selected: Option<Candidate>,
    #[serde(default)]
    pub manual_review_applied: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PipelineResult {
    pub fn best_code(&self) -> Option<&str> {
        self.best.as_ref().map(|b| b.code.as_str())
    }
}

// ========================================
// Record Types
// ========================================

/// Persisted diagnosis record
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DiagnosisRecord {
    pub id: i64,
    /// Owning patient id
    pub patient: i64,
    pub ayush_term: String,
    pub icd_code: String,
    pub confidence_score: f64,
    #[serde(default)]
    pub raw_text: String,
    pub created_at: DateTime<Utc>,
}

/// Partial update applied to a diagnosis record by manual review
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DiagnosisPatch {
    pub icd_code: String,
    pub confidence_score: f64,
    pub ayush_term: String,
}

/// Patient creation request
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NewPatient {
    pub name: String,
    pub ayush_id: String,
    pub age: u32,
}

/// Persisted patient record
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PatientRecord {
    pub id: i64,
    pub name: String,
    pub ayush_id: String,
    pub age: u32,
}

// ========================================
// Tests
// ========================================
