//! Pipeline session orchestrator
//!
//! Owns the single "current run" slot of a session. Issues the remote
//! pipeline call, drives the cosmetic stage timers, routes the settlement to
//! the result path or the error normalizer, and exposes manual review.
//!
//! There is no run queue and no request cancellation. Every run gets a
//! monotonically increasing id; a settlement whose id no longer matches the
//! current run is discarded.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::models::manual_review::{merge_selection, ManualReview, ManualReviewStatus};
use crate::models::{PatientForm, PipelineRun, StageTransition};
use crate::services::error_normalizer::{normalize, ErrorContext, NormalizedError};
use crate::services::http_record_store::HttpRecordStore;
use crate::services::record_store::RecordStore;
use ayush_common::api::{
    Candidate, DiagnosisRecord, PatientRecord, PipelineRequest, PipelineResponse,
};
use ayush_common::events::{ClientEvent, EventBus, RunStage};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shown when a run is requested without a patient or clinical text
pub const RUN_PRECONDITION_MESSAGE: &str = "Please select a patient and enter clinical text";

/// How a `run()` call ended from the caller's point of view
#[derive(Debug, Clone)]
pub enum RunSettlement {
    /// The run was still current when it settled; its terminal state is displayed
    Displayed(PipelineRun),
    /// A newer run started first; this settlement was discarded
    Superseded { run_id: u64, current_run_id: u64 },
}

impl RunSettlement {
    pub fn run(&self) -> Option<&PipelineRun> {
        match self {
            RunSettlement::Displayed(run) => Some(run),
            RunSettlement::Superseded { .. } => None,
        }
    }
}

/// Outcome of a manual review commit
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// No selection, no result or no persisted diagnosis; nothing was sent
    Skipped,
    /// Committed and merged into the displayed result
    Saved,
    /// Commit failed; displayed result unchanged
    Failed(NormalizedError),
    /// The run was replaced while the commit was in flight
    Discarded,
}

/// Read-only view of a session
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSnapshot {
    pub selected_patient: Option<i64>,
    pub pending_text: String,
    pub current_run: Option<PipelineRun>,
    pub manual_review: Option<ManualReview>,
    pub history: Vec<DiagnosisRecord>,
    pub patients: Vec<PatientRecord>,
}

impl SessionSnapshot {
    /// Displayed stage (`Idle` before the first run)
    pub fn stage(&self) -> RunStage {
        self.current_run
            .as_ref()
            .map(|r| r.stage())
            .unwrap_or_default()
    }
}

#[derive(Default)]
struct Session {
    state: SessionSnapshot,
    last_run_id: u64,
    cosmetic_cancel: Option<CancellationToken>,
}

/// Session orchestrator over a [`RecordStore`]
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct PipelineClient {
    store: Arc<dyn RecordStore>,
    config: ClientConfig,
    event_bus: EventBus,
    session: Arc<RwLock<Session>>,
}

impl PipelineClient {
    pub fn new(store: Arc<dyn RecordStore>, config: ClientConfig) -> Self {
        Self::with_event_bus(store, config, EventBus::default())
    }

    pub fn with_event_bus(
        store: Arc<dyn RecordStore>,
        config: ClientConfig,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            config,
            event_bus,
            session: Arc::new(RwLock::new(Session::default())),
        }
    }

    /// Client backed by the HTTP record store
    pub fn from_config(config: ClientConfig) -> ClientResult<Self> {
        let store = HttpRecordStore::new(&config)?;
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.read().await.state.clone()
    }

    pub async fn stage(&self) -> RunStage {
        self.session.read().await.state.stage()
    }

    // ========================================
    // Session inputs
    // ========================================

    pub async fn set_pending_text(&self, text: impl Into<String>) {
        self.session.write().await.state.pending_text = text.into();
    }

    pub async fn pending_text(&self) -> String {
        self.session.read().await.state.pending_text.clone()
    }

    /// Make a patient current and refetch its history
    pub async fn select_patient(&self, patient_id: i64) {
        {
            let mut session = self.session.write().await;
            if session.state.selected_patient != Some(patient_id) {
                session.state.history.clear();
            }
            session.state.selected_patient = Some(patient_id);
        }
        info!(patient_id, "Patient selected");
        self.refresh_history(patient_id).await;
    }

    // ========================================
    // Pipeline runs
    // ========================================

    /// Run the pipeline for the selected patient with the pending text
    pub async fn run_selected(&self, auto_push: bool) -> ClientResult<RunSettlement> {
        let (patient_id, raw_text) = {
            let session = self.session.read().await;
            (
                session.state.selected_patient,
                session.state.pending_text.clone(),
            )
        };
        let patient_id =
            patient_id.ok_or_else(|| ClientError::invalid_input(RUN_PRECONDITION_MESSAGE))?;
        self.run(patient_id, raw_text, auto_push).await
    }

    /// Start a new run and wait for it to settle
    ///
    /// Blank text is a caller error and causes no transition. Otherwise the
    /// run replaces any previous run immediately; remote failures settle the
    /// run as `Failed` and are returned inside the settlement, not as `Err`.
    pub async fn run(
        &self,
        patient_id: i64,
        raw_text: impl Into<String>,
        auto_push: bool,
    ) -> ClientResult<RunSettlement> {
        let raw_text = raw_text.into();
        if raw_text.trim().is_empty() {
            return Err(ClientError::invalid_input(RUN_PRECONDITION_MESSAGE));
        }

        let (run_id, cosmetic_cancel) = self
            .begin_run(patient_id, raw_text.clone(), auto_push)
            .await;
        self.schedule_cosmetic(
            run_id,
            RunStage::Mapping,
            self.config.mapping_delay,
            &cosmetic_cancel,
        );
        self.schedule_cosmetic(
            run_id,
            RunStage::Validation,
            self.config.validation_delay,
            &cosmetic_cancel,
        );

        let request = PipelineRequest {
            patient_id,
            raw_text,
            auto_push,
        };
        let outcome = self.invoke_pipeline(run_id, &request).await;

        // Terminal outcome supersedes any pending cosmetic timer
        cosmetic_cancel.cancel();

        let settlement = self.settle(run_id, outcome).await;

        let history_patient = self
            .session
            .read()
            .await
            .state
            .selected_patient
            .unwrap_or(patient_id);
        self.refresh_history(history_patient).await;

        Ok(settlement)
    }

    async fn begin_run(
        &self,
        patient_id: i64,
        raw_text: String,
        auto_push: bool,
    ) -> (u64, CancellationToken) {
        let mut session = self.session.write().await;

        if let Some(previous) = session.cosmetic_cancel.take() {
            previous.cancel();
        }

        session.last_run_id += 1;
        let run_id = session.last_run_id;
        let cosmetic_cancel = CancellationToken::new();
        session.cosmetic_cancel = Some(cosmetic_cancel.clone());

        let previous_run = session
            .state
            .current_run
            .replace(PipelineRun::start(run_id, patient_id, raw_text, auto_push));
        session.state.manual_review = None;

        if let Some(previous) = previous_run.filter(|r| !r.is_terminal()) {
            debug!(
                run_id,
                previous_run_id = previous.run_id,
                "New run started while previous run in flight"
            );
        }
        info!(run_id, patient_id, auto_push, "Pipeline run started");

        let now = Utc::now();
        self.event_bus.emit_lossy(ClientEvent::RunStarted {
            run_id,
            patient_id,
            timestamp: now,
        });
        self.event_bus.emit_lossy(ClientEvent::StageAdvanced {
            run_id,
            old_stage: RunStage::Idle,
            new_stage: RunStage::Extraction,
            progress_percent: RunStage::Extraction.progress_percent().unwrap_or(0),
            timestamp: now,
        });

        (run_id, cosmetic_cancel)
    }

    /// Spawn one visual-only stage advance
    fn schedule_cosmetic(
        &self,
        run_id: u64,
        stage: RunStage,
        delay: Duration,
        cancel: &CancellationToken,
    ) {
        let client = self.clone();
        let cancel = cancel.child_token();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(run_id, stage = %stage, "Cosmetic stage timer cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    client.advance_cosmetic(run_id, stage).await;
                }
            }
        });
    }

    async fn advance_cosmetic(&self, run_id: u64, stage: RunStage) {
        let mut session = self.session.write().await;
        let transition = match session.state.current_run.as_mut() {
            Some(run) if run.run_id == run_id => run.advance_cosmetic(stage),
            _ => None,
        };
        drop(session);

        if let Some(transition) = transition {
            debug!(run_id, stage = %stage, "Cosmetic stage shown");
            self.emit_transition(&transition);
        }
    }

    async fn invoke_pipeline(
        &self,
        run_id: u64,
        request: &PipelineRequest,
    ) -> Result<PipelineResponse, NormalizedError> {
        let call = self.store.run_pipeline(request);

        let result = match self.config.run_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(run_id, timeout_secs = limit.as_secs_f64(), "Pipeline run timed out");
                    return Err(NormalizedError::timeout());
                }
            },
            None => call.await,
        };

        result.map_err(|failure| {
            warn!(run_id, failure = %failure, "Pipeline run failed");
            normalize(&failure, ErrorContext::PipelineRun)
        })
    }

    async fn settle(
        &self,
        run_id: u64,
        outcome: Result<PipelineResponse, NormalizedError>,
    ) -> RunSettlement {
        let mut session = self.session.write().await;
        let state = &mut session.state;
        let current_run_id = state
            .current_run
            .as_ref()
            .map(|r| r.run_id)
            .unwrap_or_default();

        let Some(run) = state.current_run.as_mut().filter(|r| r.run_id == run_id) else {
            drop(session);
            debug!(run_id, current_run_id, "Discarding stale run settlement");
            self.event_bus.emit_lossy(ClientEvent::RunSuperseded {
                run_id,
                current_run_id,
                timestamp: Utc::now(),
            });
            return RunSettlement::Superseded {
                run_id,
                current_run_id,
            };
        };

        let (transition, terminal_event) = match outcome {
            Ok(response) => {
                let transition = run.complete(response);
                let candidate_count = run
                    .result()
                    .map(|r| r.manual_review_candidates.len())
                    .unwrap_or(0);
                info!(
                    run_id,
                    diagnosis_id = ?run.diagnosis_id(),
                    best_code = ?run.result().and_then(|r| r.best_code()),
                    candidate_count,
                    "Pipeline run completed"
                );
                let event = ClientEvent::RunCompleted {
                    run_id,
                    diagnosis_id: run.diagnosis_id(),
                    candidate_count,
                    timestamp: Utc::now(),
                };
                (transition, event)
            }
            Err(failure) => {
                info!(
                    run_id,
                    classification = %failure.classification,
                    "Pipeline run settled as failed"
                );
                let event = ClientEvent::RunFailed {
                    run_id,
                    classification: failure.classification,
                    message: failure.message.clone(),
                    timestamp: Utc::now(),
                };
                (run.fail(failure), event)
            }
        };

        let run_snapshot = run.clone();
        if run_snapshot.stage() == RunStage::Complete {
            state.manual_review = ManualReview::activate(&run_snapshot);
            state.pending_text.clear();
        }
        session.cosmetic_cancel = None;
        drop(session);

        self.emit_transition(&transition);
        self.event_bus.emit_lossy(terminal_event);

        RunSettlement::Displayed(run_snapshot)
    }

    fn emit_transition(&self, transition: &StageTransition) {
        self.event_bus.emit_lossy(ClientEvent::StageAdvanced {
            run_id: transition.run_id,
            old_stage: transition.old_stage,
            new_stage: transition.new_stage,
            progress_percent: transition.progress_percent,
            timestamp: transition.transitioned_at,
        });
    }

    // ========================================
    // Manual review
    // ========================================

    /// Replace the manual review selection
    pub async fn select_candidate(&self, candidate: &Candidate) -> ClientResult<()> {
        let mut session = self.session.write().await;
        let review = session
            .state
            .manual_review
            .as_mut()
            .ok_or_else(|| ClientError::invalid_input("No manual review is active"))?;
        review.select(candidate)
    }

    /// Replace the manual review selection by candidate position
    pub async fn select_candidate_index(&self, index: usize) -> ClientResult<()> {
        let mut session = self.session.write().await;
        let review = session
            .state
            .manual_review
            .as_mut()
            .ok_or_else(|| ClientError::invalid_input("No manual review is active"))?;
        review.select_index(index)
    }

    /// Commit the current selection to the persisted diagnosis
    ///
    /// Re-applying an already applied selection sends the same commit again.
    pub async fn apply_manual_review(&self) -> ApplyOutcome {
        let prepared = {
            let mut session = self.session.write().await;
            let state = &mut session.state;

            let prepared = match (state.current_run.as_ref(), state.manual_review.as_ref()) {
                (Some(run), Some(review)) => match (run.result(), review.diagnosis_id) {
                    (Some(result), Some(diagnosis_id)) => Some((
                        run.run_id,
                        diagnosis_id,
                        review.selected().clone(),
                        review.build_patch(result),
                    )),
                    _ => None,
                },
                _ => None,
            };

            if prepared.is_some() {
                if let Some(review) = state.manual_review.as_mut() {
                    review.set_status(ManualReviewStatus::saving());
                }
            }
            prepared
        };

        let Some((run_id, diagnosis_id, candidate, patch)) = prepared else {
            debug!("Manual review apply skipped: nothing to commit");
            return ApplyOutcome::Skipped;
        };

        info!(
            run_id,
            diagnosis_id,
            icd_code = %patch.icd_code,
            confidence = patch.confidence_score,
            "Committing manual review selection"
        );
        let commit = self.store.patch_diagnosis(diagnosis_id, &patch).await;

        let outcome = {
            let mut session = self.session.write().await;
            let state = &mut session.state;

            let still_current = state.current_run.as_ref().map(|r| r.run_id) == Some(run_id)
                && state.manual_review.as_ref().map(|r| r.run_id) == Some(run_id);
            if !still_current {
                debug!(run_id, diagnosis_id, "Discarding manual review commit for replaced run");
                return ApplyOutcome::Discarded;
            }

            match commit {
                Ok(_) => {
                    if let Some(result) = state.current_run.as_mut().and_then(|r| r.result_mut()) {
                        merge_selection(result, &candidate, patch.confidence_score);
                    }
                    if let Some(review) = state.manual_review.as_mut() {
                        review.set_status(ManualReviewStatus::saved());
                    }
                    ApplyOutcome::Saved
                }
                Err(failure) => {
                    if let Some(review) = state.manual_review.as_mut() {
                        review.set_status(ManualReviewStatus::failed());
                    }
                    ApplyOutcome::Failed(normalize(&failure, ErrorContext::PipelineRun))
                }
            }
        };

        match &outcome {
            ApplyOutcome::Saved => {
                info!(run_id, diagnosis_id, "Manual review selection saved");
                self.event_bus.emit_lossy(ClientEvent::ManualReviewApplied {
                    run_id,
                    diagnosis_id,
                    icd_code: patch.icd_code.clone(),
                    timestamp: Utc::now(),
                });
                let history_patient = {
                    let session = self.session.read().await;
                    session
                        .state
                        .selected_patient
                        .or_else(|| session.state.current_run.as_ref().map(|r| r.patient_id))
                };
                if let Some(patient_id) = history_patient {
                    self.refresh_history(patient_id).await;
                }
            }
            ApplyOutcome::Failed(failure) => {
                warn!(run_id, diagnosis_id, error = %failure, "Manual review commit failed");
                self.event_bus.emit_lossy(ClientEvent::ManualReviewFailed {
                    run_id,
                    diagnosis_id,
                    timestamp: Utc::now(),
                });
            }
            ApplyOutcome::Skipped | ApplyOutcome::Discarded => {}
        }

        outcome
    }

    // ========================================
    // Records
    // ========================================

    /// Refetch and replace the patient's diagnosis history
    ///
    /// Failures are logged and leave the previous history in place.
    pub async fn refresh_history(&self, patient_id: i64) {
        let records = match self.store.list_diagnoses().await {
            Ok(records) => records,
            Err(failure) => {
                let normalized = normalize(&failure, ErrorContext::PipelineRun);
                warn!(patient_id, error = %normalized, "Diagnosis history refresh failed");
                return;
            }
        };

        let history: Vec<DiagnosisRecord> = records
            .into_iter()
            .filter(|record| record.patient == patient_id)
            .collect();
        let record_count = history.len();

        {
            let mut session = self.session.write().await;
            match session.state.selected_patient {
                Some(selected) if selected != patient_id => {
                    debug!(patient_id, selected, "Discarding history for unselected patient");
                    return;
                }
                _ => session.state.history = history,
            }
        }

        debug!(patient_id, record_count, "Diagnosis history refreshed");
        self.event_bus.emit_lossy(ClientEvent::HistoryRefreshed {
            patient_id,
            record_count,
            timestamp: Utc::now(),
        });
    }

    /// Refetch the patient list
    ///
    /// When no patient is selected yet, the first listed patient becomes
    /// selected. Failures are logged and leave the previous list in place.
    pub async fn refresh_patients(&self) {
        let patients = match self.store.list_patients().await {
            Ok(patients) => patients,
            Err(failure) => {
                let normalized = normalize(&failure, ErrorContext::PatientCreate);
                warn!(error = %normalized, "Patient list refresh failed");
                return;
            }
        };

        let auto_select = {
            let mut session = self.session.write().await;
            let first = patients.first().map(|p| p.id);
            session.state.patients = patients;
            match session.state.selected_patient {
                None => first,
                Some(_) => None,
            }
        };

        if let Some(patient_id) = auto_select {
            self.select_patient(patient_id).await;
        }
    }

    /// Validate the form, create the patient, and refresh the patient list
    pub async fn create_patient(&self, form: &PatientForm) -> ClientResult<PatientRecord> {
        let new_patient = form.validate()?;

        let created = self
            .store
            .create_patient(&new_patient)
            .await
            .map_err(|failure| {
                let normalized = normalize(&failure, ErrorContext::PatientCreate);
                warn!(
                    ayush_id = %new_patient.ayush_id,
                    classification = %normalized.classification,
                    "Patient creation failed"
                );
                ClientError::Remote(normalized)
            })?;

        info!(patient_id = created.id, ayush_id = %created.ayush_id, "Patient created");
        self.refresh_patients().await;
        Ok(created)
    }
}
