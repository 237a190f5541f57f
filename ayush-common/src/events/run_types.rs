//! Pipeline run type definitions
//!
//! Supporting types for pipeline run progress and failure classification.

use serde::{Deserialize, Serialize};

/// Stage of one pipeline run
///
/// `Idle → Extraction → Mapping → Validation → {Complete | Failed}`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    /// No run started yet
    #[default]
    Idle,
    /// Extracting the traditional-medicine term
    Extraction,
    /// Mapping the term to diagnostic codes
    Mapping,
    /// Validating mapping confidence
    Validation,
    /// Terminal: result available
    Complete,
    /// Terminal: normalized failure available
    Failed,
}

impl RunStage {
    /// Position in the forward stage order
    pub fn ordinal(self) -> u8 {
        match self {
            RunStage::Idle => 0,
            RunStage::Extraction => 1,
            RunStage::Mapping => 2,
            RunStage::Validation => 3,
            RunStage::Complete | RunStage::Failed => 4,
        }
    }

    /// Progress shown for this stage
    ///
    /// `None` for `Failed`: the progress of the last live stage is kept.
    pub fn progress_percent(self) -> Option<u8> {
        match self {
            RunStage::Idle => Some(0),
            RunStage::Extraction => Some(25),
            RunStage::Mapping => Some(50),
            RunStage::Validation => Some(75),
            RunStage::Complete => Some(100),
            RunStage::Failed => None,
        }
    }

    /// User-facing progress message
    pub fn message(self) -> &'static str {
        match self {
            RunStage::Idle => "Waiting for clinical text",
            RunStage::Extraction => "Extracting AYUSH term...",
            RunStage::Mapping => "Mapping to ICD-11 codes...",
            RunStage::Validation => "Validating mapping confidence...",
            RunStage::Complete => "Pipeline completed successfully",
            RunStage::Failed => "Pipeline execution failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStage::Complete | RunStage::Failed)
    }
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStage::Idle => write!(f, "Idle"),
            RunStage::Extraction => write!(f, "Extraction"),
            RunStage::Mapping => write!(f, "Mapping"),
            RunStage::Validation => write!(f, "Validation"),
            RunStage::Complete => write!(f, "Complete"),
            RunStage::Failed => write!(f, "Failed"),
        }
    }
}

/// Classification of a normalized remote failure
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// No response reachable
    Network,
    /// Structured field-level rejection
    Validation,
    /// Duplicate-identifier signal
    Conflict,
    /// Opaque server failure page
    ServerFault,
    /// Anything else
    Unknown,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Network => write!(f, "Network"),
            ErrorClass::Validation => write!(f, "Validation"),
            ErrorClass::Conflict => write!(f, "Conflict"),
            ErrorClass::ServerFault => write!(f, "ServerFault"),
            ErrorClass::Unknown => write!(f, "Unknown"),
        }
    }
}
