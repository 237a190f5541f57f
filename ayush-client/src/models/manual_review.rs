//! Manual review of ambiguous code mappings
//!
//! Active only when a completed run carries at least one candidate. Holds the
//! user's selection and the outcome of the last commit attempt; both live
//! exactly as long as their parent run.

use crate::error::{ClientError, ClientResult};
use crate::models::PipelineRun;
use ayush_common::api::{BestMatch, Candidate, DiagnosisPatch, PipelineResult};
use serde::Serialize;

/// Confidence committed when neither the candidate nor the run has one
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

pub const APPLY_SUCCESS_MESSAGE: &str = "Selection saved to diagnosis.";
pub const APPLY_FAILURE_MESSAGE: &str = "Failed to save selection. Please retry.";

/// Outcome of the last commit attempt
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ManualReviewStatus {
    pub saving: bool,
    pub success: Option<String>,
    pub error: Option<String>,
}

impl ManualReviewStatus {
    pub fn saving() -> Self {
        Self {
            saving: true,
            ..Default::default()
        }
    }

    pub fn saved() -> Self {
        Self {
            success: Some(APPLY_SUCCESS_MESSAGE.to_string()),
            ..Default::default()
        }
    }

    pub fn failed() -> Self {
        Self {
            error: Some(APPLY_FAILURE_MESSAGE.to_string()),
            ..Default::default()
        }
    }

    pub fn is_clear(&self) -> bool {
        *self == Self::default()
    }
}

/// Candidate selection bound to one run's diagnosis record
#[derive(Debug, Clone, Serialize)]
pub struct ManualReview {
    pub run_id: u64,
    pub diagnosis_id: Option<i64>,
    candidates: Vec<Candidate>,
    selected: Candidate,
    status: ManualReviewStatus,
}

impl ManualReview {
    /// Activate for a completed run
    ///
    /// Returns `None` unless the run completed with at least one candidate.
    /// Candidates sharing an identity key collapse to their first occurrence.
    /// The default pick is the candidate whose code equals the best code,
    /// else the first candidate.
    pub fn activate(run: &PipelineRun) -> Option<Self> {
        let result = run.result()?;

        let mut candidates: Vec<Candidate> = Vec::new();
        for candidate in &result.manual_review_candidates {
            if !candidates.iter().any(|c| c.same_identity(candidate)) {
                candidates.push(candidate.clone());
            }
        }

        let selected = default_pick(&candidates, result.best_code())?.clone();

        Some(Self {
            run_id: run.run_id,
            diagnosis_id: run.diagnosis_id(),
            candidates,
            selected,
            status: ManualReviewStatus::default(),
        })
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn selected(&self) -> &Candidate {
        &self.selected
    }

    pub fn status(&self) -> &ManualReviewStatus {
        &self.status
    }

    /// Replace the selection and clear the commit status
    ///
    /// The candidate must be one of this review's candidates (matched by
    /// identity key).
    pub fn select(&mut self, candidate: &Candidate) -> ClientResult<()> {
        let found = self
            .candidates
            .iter()
            .find(|c| c.same_identity(candidate))
            .cloned()
            .ok_or_else(|| {
                ClientError::invalid_input(format!(
                    "Candidate {} ({}) is not offered for this diagnosis",
                    candidate.code, candidate.source_term
                ))
            })?;

        self.selected = found;
        self.status = ManualReviewStatus::default();
        Ok(())
    }

    /// Select by position in the candidate list
    pub fn select_index(&mut self, index: usize) -> ClientResult<()> {
        let candidate = self.candidates.get(index).cloned().ok_or_else(|| {
            ClientError::invalid_input(format!(
                "Candidate index {} out of range (0..{})",
                index,
                self.candidates.len()
            ))
        })?;
        self.select(&candidate)
    }

    /// Confidence to commit: candidate score, else run confidence, else default
    pub fn commit_confidence(&self, result: &PipelineResult) -> f64 {
        self.selected
            .score
            .or(result.confidence)
            .unwrap_or(DEFAULT_CONFIDENCE)
    }

    /// Partial update for the selected candidate
    pub fn build_patch(&self, result: &PipelineResult) -> DiagnosisPatch {
        DiagnosisPatch {
            icd_code: self.selected.code.clone(),
            confidence_score: self.commit_confidence(result),
            ayush_term: result.ayush_term.clone(),
        }
    }

    pub(crate) fn set_status(&mut self, status: ManualReviewStatus) {
        self.status = status;
    }
}

fn default_pick<'a>(candidates: &'a [Candidate], best_code: Option<&str>) -> Option<&'a Candidate> {
    best_code
        .and_then(|code| candidates.iter().find(|c| c.code == code))
        .or_else(|| candidates.first())
}

/// Fold a committed selection into the displayed result
///
/// Touches only `best`, `confidence` and the manual-review markers.
pub fn merge_selection(result: &mut PipelineResult, candidate: &Candidate, confidence: f64) {
    result.best = Some(BestMatch {
        code: candidate.code.clone(),
        title: candidate.title.clone(),
    });
    result.confidence = Some(confidence);
    result.manual_review_selected = Some(candidate.clone());
    result.manual_review_applied = true;
}
