//! Pipeline run state machine
//!
//! One run progresses `Extraction → Mapping → Validation → {Complete | Failed}`.
//! Mapping and Validation are cosmetic: they are shown on timers and never
//! synchronized with the remote pipeline. Only the terminal transition
//! reflects the real outcome.

use crate::services::error_normalizer::NormalizedError;
use ayush_common::api::{PipelineResponse, PipelineResult};
use ayush_common::events::RunStage;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// State transition of one run
#[derive(Debug, Clone, Serialize)]
pub struct StageTransition {
    pub run_id: u64,
    pub old_stage: RunStage,
    pub new_stage: RunStage,
    pub progress_percent: u8,
    pub transitioned_at: DateTime<Utc>,
}

/// One attempt to process a patient's clinical text
///
/// `result` is present only in `Complete`, `failure` only in `Failed`;
/// both are absent otherwise.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    /// Monotonically increasing per session; identifies stale settlements
    pub run_id: u64,
    pub patient_id: i64,
    pub raw_text: String,
    pub auto_push: bool,
    stage: RunStage,
    progress_percent: u8,
    result: Option<PipelineResult>,
    failure: Option<NormalizedError>,
    diagnosis_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Begin a run; it enters `Extraction` immediately
    pub fn start(run_id: u64, patient_id: i64, raw_text: String, auto_push: bool) -> Self {
        Self {
            run_id,
            patient_id,
            raw_text,
            auto_push,
            stage: RunStage::Extraction,
            progress_percent: progress_for(RunStage::Extraction),
            result: None,
            failure: None,
            diagnosis_id: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn stage(&self) -> RunStage {
        self.stage
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn result(&self) -> Option<&PipelineResult> {
        self.result.as_ref()
    }

    pub(crate) fn result_mut(&mut self) -> Option<&mut PipelineResult> {
        self.result.as_mut()
    }

    pub fn failure(&self) -> Option<&NormalizedError> {
        self.failure.as_ref()
    }

    /// Persisted diagnosis record created by this run
    pub fn diagnosis_id(&self) -> Option<i64> {
        self.diagnosis_id
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Show a cosmetic intermediate stage
    ///
    /// Ignored once terminal, and never moves backwards: a late timer cannot
    /// regress the displayed stage.
    pub fn advance_cosmetic(&mut self, target: RunStage) -> Option<StageTransition> {
        if !matches!(target, RunStage::Mapping | RunStage::Validation) {
            return None;
        }
        if self.is_terminal() || target.ordinal() <= self.stage.ordinal() {
            return None;
        }
        Some(self.transition_to(target))
    }

    /// Settle successfully with the remote response
    pub fn complete(&mut self, response: PipelineResponse) -> StageTransition {
        self.diagnosis_id = response.diagnosis_id;
        self.result = Some(response.result);
        self.failure = None;
        self.transition_to(RunStage::Complete)
    }

    /// Settle with a normalized failure; progress stays at the last live stage
    pub fn fail(&mut self, failure: NormalizedError) -> StageTransition {
        self.result = None;
        self.failure = Some(failure);
        self.transition_to(RunStage::Failed)
    }

    fn transition_to(&mut self, new_stage: RunStage) -> StageTransition {
        let old_stage = self.stage;
        self.stage = new_stage;
        if let Some(progress) = new_stage.progress_percent() {
            self.progress_percent = self.progress_percent.max(progress);
        }
        if new_stage.is_terminal() {
            self.ended_at = Some(Utc::now());
        }

        StageTransition {
            run_id: self.run_id,
            old_stage,
            new_stage,
            progress_percent: self.progress_percent,
            transitioned_at: Utc::now(),
        }
    }
}

fn progress_for(stage: RunStage) -> u8 {
    stage.progress_percent().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ayush_common::api::BestMatch;
    use ayush_common::events::ErrorClass;

    fn response() -> PipelineResponse {
        PipelineResponse {
            message: None,
            diagnosis_id: Some(21),
            result: PipelineResult {
                ayush_term: "Jwara".to_string(),
                best: Some(BestMatch {
                    code: "MG30".to_string(),
                    title: "Fever".to_string(),
                }),
                confidence: Some(0.95),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_start_enters_extraction() {
        let run = PipelineRun::start(1, 7, "fever".to_string(), false);
        assert_eq!(run.stage(), RunStage::Extraction);
        assert_eq!(run.progress_percent(), 25);
        assert!(run.result().is_none());
        assert!(run.failure().is_none());
        assert!(!run.is_terminal());
    }

    #[test]
    fn test_cosmetic_stages_advance_forward_only() {
        let mut run = PipelineRun::start(1, 7, "fever".to_string(), false);

        let transition = run.advance_cosmetic(RunStage::Validation).unwrap();
        assert_eq!(transition.old_stage, RunStage::Extraction);
        assert_eq!(transition.progress_percent, 75);

        // Late Mapping timer must not regress
        assert!(run.advance_cosmetic(RunStage::Mapping).is_none());
        assert_eq!(run.stage(), RunStage::Validation);

        // Not a cosmetic stage
        assert!(run.advance_cosmetic(RunStage::Complete).is_none());
        assert!(run.advance_cosmetic(RunStage::Extraction).is_none());
    }

    #[test]
    fn test_complete_sets_result() {
        let mut run = PipelineRun::start(3, 7, "fever".to_string(), false);
        let transition = run.complete(response());

        assert_eq!(transition.new_stage, RunStage::Complete);
        assert_eq!(run.progress_percent(), 100);
        assert_eq!(run.diagnosis_id(), Some(21));
        assert_eq!(run.result().unwrap().best_code(), Some("MG30"));
        assert!(run.failure().is_none());
        assert!(run.ended_at.is_some());

        // Timer firing after completion is ignored
        assert!(run.advance_cosmetic(RunStage::Validation).is_none());
        assert_eq!(run.stage(), RunStage::Complete);
    }

    #[test]
    fn test_fail_keeps_progress() {
        let mut run = PipelineRun::start(3, 7, "fever".to_string(), false);
        run.advance_cosmetic(RunStage::Mapping);
        let transition = run.fail(NormalizedError::new(ErrorClass::Network, "offline"));

        assert_eq!(transition.new_stage, RunStage::Failed);
        assert_eq!(run.progress_percent(), 50);
        assert!(run.result().is_none());
        assert_eq!(run.failure().unwrap().classification, ErrorClass::Network);
        assert!(run.advance_cosmetic(RunStage::Validation).is_none());
    }
}
