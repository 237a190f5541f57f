//! Remote failure normalization
//!
//! Maps a transport-level [`RemoteFailure`] of unknown body shape onto one
//! user-facing message plus an [`ErrorClass`]. Resolution order, first match
//! wins:
//!
//! 1. No response at all → `Network`
//! 2. Object with a single `detail` field → `Validation` (`Unknown` for auth)
//! 3. Object field-error map → `"field: value"` pairs joined with `"; "`
//! 4. Markup error page → `ServerFault` (or `Conflict` for a duplicate id)
//! 5. Plain text → `Unknown`, verbatim
//! 6. Nothing usable → `Unknown` with transport or generic message

use crate::services::record_store::{RemoteFailure, ResponseBody};
use ayush_common::events::ErrorClass;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Identifier field name used by the patient endpoint
pub const IDENTIFIER_FIELD: &str = "ayush_id";

pub const NETWORK_MESSAGE: &str = "Network error. Please check your connection and try again.";
pub const DUPLICATE_FIELD_MESSAGE: &str =
    "AYUSH ID: This ID already exists. Please use a different one.";
pub const DUPLICATE_PAGE_MESSAGE: &str =
    "This AYUSH ID already exists. Please use a different ID.";
pub const SERVER_ERROR_MESSAGE: &str =
    "A server error occurred. Please try again or contact support.";
pub const TIMEOUT_MESSAGE: &str =
    "The pipeline did not respond in time. Please check your connection and retry.";

/// Which user flow the failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorContext {
    AuthFlow,
    PatientCreate,
    PipelineRun,
}

impl ErrorContext {
    /// Generic message when nothing better is obtainable
    pub fn fallback_message(self) -> &'static str {
        match self {
            ErrorContext::AuthFlow => "An unexpected error occurred",
            ErrorContext::PatientCreate => "Error creating patient",
            ErrorContext::PipelineRun => "Pipeline execution failed",
        }
    }
}

/// User-facing failure
///
/// `raw_detail` keeps the original body for a diagnostic panel; callers must
/// not parse it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedError {
    pub message: String,
    pub classification: ErrorClass,
    pub raw_detail: Option<Value>,
}

impl NormalizedError {
    pub fn new(classification: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            classification,
            raw_detail: None,
        }
    }

    /// Bounded pipeline invocation expired
    pub fn timeout() -> Self {
        Self::new(ErrorClass::Network, TIMEOUT_MESSAGE)
    }
}

impl std::fmt::Display for NormalizedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for NormalizedError {}

/// Normalize a remote failure for display
pub fn normalize(failure: &RemoteFailure, context: ErrorContext) -> NormalizedError {
    let normalized = match &failure.response {
        None => NormalizedError::new(ErrorClass::Network, NETWORK_MESSAGE),
        Some(response) => {
            let mut normalized = match &response.body {
                ResponseBody::Object(map) if !map.is_empty() => normalize_object(map, context),
                ResponseBody::Text(text) if !text.trim().is_empty() => {
                    normalize_text(text, response.status, context)
                }
                _ => fallback(failure, context),
            };
            normalized.raw_detail = response.body.to_raw_detail();
            normalized
        }
    };

    debug!(
        classification = %normalized.classification,
        status = ?failure.http_status(),
        "Normalized remote failure"
    );
    normalized
}

fn normalize_object(map: &Map<String, Value>, context: ErrorContext) -> NormalizedError {
    if map.len() == 1 {
        if let Some(detail) = map.get("detail") {
            let classification = match context {
                ErrorContext::AuthFlow => ErrorClass::Unknown,
                _ => ErrorClass::Validation,
            };
            return NormalizedError::new(classification, render_value(detail));
        }
    }

    let mut classification = ErrorClass::Validation;
    let rendered: Vec<String> = map
        .iter()
        .map(|(field, value)| {
            let text = render_value(value);
            if context == ErrorContext::PatientCreate
                && duplicate_heuristic::is_duplicate_field_error(field, &text)
            {
                classification = ErrorClass::Conflict;
                DUPLICATE_FIELD_MESSAGE.to_string()
            } else {
                format!("{}: {}", field, text)
            }
        })
        .collect();

    NormalizedError::new(classification, rendered.join("; "))
}

fn normalize_text(text: &str, status: u16, context: ErrorContext) -> NormalizedError {
    if is_markup_page(text) {
        if context == ErrorContext::PatientCreate
            && matches!(status, 400 | 500)
            && duplicate_heuristic::is_duplicate_page(text)
        {
            return NormalizedError::new(ErrorClass::Conflict, DUPLICATE_PAGE_MESSAGE);
        }
        return NormalizedError::new(ErrorClass::ServerFault, SERVER_ERROR_MESSAGE);
    }

    NormalizedError::new(ErrorClass::Unknown, text)
}

fn fallback(failure: &RemoteFailure, context: ErrorContext) -> NormalizedError {
    let message = failure
        .transport_message
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| context.fallback_message());
    NormalizedError::new(ErrorClass::Unknown, message)
}

/// Render a field value: arrays comma-joined, strings verbatim, rest as JSON
fn render_value(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(render_scalar)
            .collect::<Vec<_>>()
            .join(", "),
        other => render_scalar(other),
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_markup_page(text: &str) -> bool {
    let head = text.trim_start().to_ascii_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html")
}

/// Duplicate-identifier detection by substring matching.
///
/// The remote service reports uniqueness violations only as free text, so
/// this is fragile: a structured conflict code from the service would
/// replace it. Kept apart from the dispatch above so it can be swapped out.
mod duplicate_heuristic {
    use super::IDENTIFIER_FIELD;

    const FIELD_MARKERS: [&str; 3] = ["already exists", "unique", "duplicate"];

    /// Field-error entry for the identifier field that reads as a duplicate
    pub(super) fn is_duplicate_field_error(field: &str, rendered: &str) -> bool {
        if field != IDENTIFIER_FIELD {
            return false;
        }
        let lower = rendered.to_lowercase();
        FIELD_MARKERS.iter().any(|marker| lower.contains(marker))
    }

    /// Markup error page carrying an integrity violation on the identifier
    pub(super) fn is_duplicate_page(page: &str) -> bool {
        let lower = page.to_lowercase();
        lower.contains("integrityerror")
            && (lower.contains("unique constraint") || lower.contains("already exists"))
            && lower.contains("ayush")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object_failure(status: u16, body: Value) -> RemoteFailure {
        match body {
            Value::Object(map) => RemoteFailure::status(status, ResponseBody::Object(map)),
            other => panic!("expected object body, got {}", other),
        }
    }

    fn text_failure(status: u16, text: &str) -> RemoteFailure {
        RemoteFailure::status(status, ResponseBody::Text(text.to_string()))
    }

    #[test]
    fn test_no_response_is_network_for_every_context() {
        let failure = RemoteFailure::network("connection refused");
        for context in [
            ErrorContext::AuthFlow,
            ErrorContext::PatientCreate,
            ErrorContext::PipelineRun,
        ] {
            let normalized = normalize(&failure, context);
            assert_eq!(normalized.classification, ErrorClass::Network);
            assert_eq!(normalized.message, NETWORK_MESSAGE);
            assert_eq!(normalized.raw_detail, None);
        }
    }

    #[test]
    fn test_single_detail_field() {
        let failure = object_failure(404, json!({"detail": "Not found."}));

        let normalized = normalize(&failure, ErrorContext::PipelineRun);
        assert_eq!(normalized.classification, ErrorClass::Validation);
        assert_eq!(normalized.message, "Not found.");

        let normalized = normalize(&failure, ErrorContext::AuthFlow);
        assert_eq!(normalized.classification, ErrorClass::Unknown);
        assert_eq!(normalized.message, "Not found.");
    }

    #[test]
    fn test_detail_alongside_other_fields_is_a_field_map() {
        let failure = object_failure(400, json!({"detail": "bad", "code": "x"}));
        let normalized = normalize(&failure, ErrorContext::PipelineRun);
        assert_eq!(normalized.classification, ErrorClass::Validation);
        assert_eq!(normalized.message, "detail: bad; code: x");
    }

    #[test]
    fn test_field_map_rendering() {
        let failure = object_failure(
            400,
            json!({
                "name": ["This field may not be blank."],
                "age": ["Ensure this value is less than or equal to 150.", "Second."],
                "meta": {"nested": true},
                "count": 3
            }),
        );
        let normalized = normalize(&failure, ErrorContext::PatientCreate);

        assert_eq!(normalized.classification, ErrorClass::Validation);
        assert_eq!(
            normalized.message,
            "name: This field may not be blank.; \
             age: Ensure this value is less than or equal to 150., Second.; \
             meta: {\"nested\":true}; \
             count: 3"
        );
    }

    #[test]
    fn test_duplicate_identifier_is_conflict() {
        let failure = object_failure(400, json!({"ayush_id": ["already exists"]}));
        let normalized = normalize(&failure, ErrorContext::PatientCreate);

        assert_eq!(normalized.classification, ErrorClass::Conflict);
        assert_eq!(normalized.message, DUPLICATE_FIELD_MESSAGE);
        assert_eq!(
            normalized.raw_detail,
            Some(json!({"ayush_id": ["already exists"]}))
        );
    }

    #[test]
    fn test_duplicate_marker_case_insensitive_and_string_value() {
        let failure = object_failure(
            400,
            json!({"ayush_id": "patient with this ayush id ALREADY EXISTS."}),
        );
        let normalized = normalize(&failure, ErrorContext::PatientCreate);
        assert_eq!(normalized.classification, ErrorClass::Conflict);
    }

    #[test]
    fn test_duplicate_phrasing_on_other_field_is_not_conflict() {
        let failure = object_failure(400, json!({"name": ["already exists"]}));
        let normalized = normalize(&failure, ErrorContext::PatientCreate);

        assert_eq!(normalized.classification, ErrorClass::Validation);
        assert_eq!(normalized.message, "name: already exists");
    }

    #[test]
    fn test_duplicate_wins_over_other_field_errors() {
        let failure = object_failure(
            400,
            json!({
                "name": ["This field may not be blank."],
                "ayush_id": ["Patient with this ayush id already exists."]
            }),
        );
        let normalized = normalize(&failure, ErrorContext::PatientCreate);

        assert_eq!(normalized.classification, ErrorClass::Conflict);
        assert_eq!(
            normalized.message,
            format!("name: This field may not be blank.; {}", DUPLICATE_FIELD_MESSAGE)
        );
    }

    #[test]
    fn test_non_duplicate_identifier_error_is_validation() {
        let failure = object_failure(
            400,
            json!({"ayush_id": ["Ensure this field has no more than 50 characters."]}),
        );
        let normalized = normalize(&failure, ErrorContext::PatientCreate);
        assert_eq!(normalized.classification, ErrorClass::Validation);
        assert!(normalized.message.starts_with("ayush_id: Ensure"));
    }

    #[test]
    fn test_duplicate_heuristic_only_for_patient_create() {
        let failure = object_failure(400, json!({"ayush_id": ["already exists"]}));
        let normalized = normalize(&failure, ErrorContext::PipelineRun);
        assert_eq!(normalized.classification, ErrorClass::Validation);
        assert_eq!(normalized.message, "ayush_id: already exists");
    }

    #[test]
    fn test_markup_page_with_integrity_error() {
        let page = "<!DOCTYPE html><html><body>IntegrityError at /api/patients/ \
                    UNIQUE constraint failed: ayush_app_patient.ayush_id</body></html>";
        let normalized = normalize(&text_failure(500, page), ErrorContext::PatientCreate);

        assert_eq!(normalized.classification, ErrorClass::Conflict);
        assert_eq!(normalized.message, DUPLICATE_PAGE_MESSAGE);
        assert_eq!(normalized.raw_detail, Some(Value::String(page.to_string())));
    }

    #[test]
    fn test_markup_page_without_identifier_is_server_fault() {
        let page = "<html><body>IntegrityError: UNIQUE constraint failed: auth_user.username</body></html>";
        let normalized = normalize(&text_failure(500, page), ErrorContext::PatientCreate);
        assert_eq!(normalized.classification, ErrorClass::ServerFault);
        assert_eq!(normalized.message, SERVER_ERROR_MESSAGE);
    }

    #[test]
    fn test_generic_markup_page_is_server_fault() {
        let page = "  <!doctype html><title>Server Error (500)</title>";
        let normalized = normalize(&text_failure(502, page), ErrorContext::PipelineRun);
        assert_eq!(normalized.classification, ErrorClass::ServerFault);
        assert_eq!(normalized.message, SERVER_ERROR_MESSAGE);
    }

    #[test]
    fn test_plain_text_body_is_verbatim() {
        let normalized = normalize(
            &text_failure(503, "Service temporarily unavailable"),
            ErrorContext::PipelineRun,
        );
        assert_eq!(normalized.classification, ErrorClass::Unknown);
        assert_eq!(normalized.message, "Service temporarily unavailable");
    }

    #[test]
    fn test_fallback_messages() {
        let empty = RemoteFailure::status(502, ResponseBody::Absent);
        let normalized = normalize(&empty, ErrorContext::PipelineRun);
        assert_eq!(normalized.classification, ErrorClass::Unknown);
        assert_eq!(normalized.message, "Pipeline execution failed");

        let with_transport = RemoteFailure {
            transport_message: Some("error decoding response body".to_string()),
            ..RemoteFailure::status(200, ResponseBody::Object(Map::new()))
        };
        let normalized = normalize(&with_transport, ErrorContext::PatientCreate);
        assert_eq!(normalized.classification, ErrorClass::Unknown);
        assert_eq!(normalized.message, "error decoding response body");
    }
}
