//! Test helpers for ayush-client integration tests
//!
//! `ScriptedStore` is an in-memory [`RecordStore`] that replays queued
//! outcomes. A queued outcome can be gated on a `oneshot` channel so a test
//! decides exactly when the "remote" call settles.

#![allow(dead_code)]

use async_trait::async_trait;
use ayush_client::services::record_store::{RecordStore, RemoteFailure};
use ayush_client::ClientConfig;
use ayush_common::api::{
    BestMatch, Candidate, DiagnosisPatch, DiagnosisRecord, NewPatient, PatientRecord,
    PipelineRequest, PipelineResponse, PipelineResult,
};
use ayush_common::events::ClientEvent;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};

/// One queued outcome, optionally held until its gate is released
struct Scripted<T> {
    outcome: Result<T, RemoteFailure>,
    gate: Option<oneshot::Receiver<()>>,
}

impl<T> Scripted<T> {
    async fn settle(self) -> Result<T, RemoteFailure> {
        if let Some(gate) = self.gate {
            // A dropped sender also releases the gate
            let _ = gate.await;
        }
        self.outcome
    }
}

fn gated<T>(outcome: Result<T, RemoteFailure>) -> (Scripted<T>, oneshot::Sender<()>) {
    let (tx, rx) = oneshot::channel();
    (
        Scripted {
            outcome,
            gate: Some(rx),
        },
        tx,
    )
}

fn immediate<T>(outcome: Result<T, RemoteFailure>) -> Scripted<T> {
    Scripted {
        outcome,
        gate: None,
    }
}

fn unscripted<T>(operation: &str) -> Result<T, RemoteFailure> {
    Err(RemoteFailure::network(format!("no scripted {} response", operation)))
}

#[derive(Default)]
pub struct ScriptedStore {
    pipeline: Mutex<VecDeque<Scripted<PipelineResponse>>>,
    patches: Mutex<VecDeque<Scripted<DiagnosisRecord>>>,
    creates: Mutex<VecDeque<Result<PatientRecord, RemoteFailure>>>,
    diagnoses: Mutex<Option<Result<Vec<DiagnosisRecord>, RemoteFailure>>>,
    patients: Mutex<Vec<PatientRecord>>,

    pipeline_requests: Mutex<Vec<PipelineRequest>>,
    patch_requests: Mutex<Vec<(i64, DiagnosisPatch)>>,
    create_requests: Mutex<Vec<NewPatient>>,
    list_diagnoses_calls: Mutex<usize>,
    list_patients_calls: Mutex<usize>,
}

impl ScriptedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_pipeline(&self, outcome: Result<PipelineResponse, RemoteFailure>) {
        self.pipeline.lock().unwrap().push_back(immediate(outcome));
    }

    /// Queue a pipeline outcome that settles only when the returned sender fires
    pub fn push_pipeline_gated(
        &self,
        outcome: Result<PipelineResponse, RemoteFailure>,
    ) -> oneshot::Sender<()> {
        let (scripted, tx) = gated(outcome);
        self.pipeline.lock().unwrap().push_back(scripted);
        tx
    }

    pub fn push_patch(&self, outcome: Result<DiagnosisRecord, RemoteFailure>) {
        self.patches.lock().unwrap().push_back(immediate(outcome));
    }

    pub fn push_patch_gated(
        &self,
        outcome: Result<DiagnosisRecord, RemoteFailure>,
    ) -> oneshot::Sender<()> {
        let (scripted, tx) = gated(outcome);
        self.patches.lock().unwrap().push_back(scripted);
        tx
    }

    pub fn push_create(&self, outcome: Result<PatientRecord, RemoteFailure>) {
        self.creates.lock().unwrap().push_back(outcome);
    }

    pub fn set_diagnoses(&self, records: Vec<DiagnosisRecord>) {
        *self.diagnoses.lock().unwrap() = Some(Ok(records));
    }

    pub fn fail_diagnoses(&self, failure: RemoteFailure) {
        *self.diagnoses.lock().unwrap() = Some(Err(failure));
    }

    pub fn set_patients(&self, patients: Vec<PatientRecord>) {
        *self.patients.lock().unwrap() = patients;
    }

    pub fn pipeline_requests(&self) -> Vec<PipelineRequest> {
        self.pipeline_requests.lock().unwrap().clone()
    }

    pub fn patch_requests(&self) -> Vec<(i64, DiagnosisPatch)> {
        self.patch_requests.lock().unwrap().clone()
    }

    pub fn create_requests(&self) -> Vec<NewPatient> {
        self.create_requests.lock().unwrap().clone()
    }

    pub fn list_diagnoses_calls(&self) -> usize {
        *self.list_diagnoses_calls.lock().unwrap()
    }

    pub fn list_patients_calls(&self) -> usize {
        *self.list_patients_calls.lock().unwrap()
    }
}

#[async_trait]
impl RecordStore for ScriptedStore {
    async fn run_pipeline(
        &self,
        request: &PipelineRequest,
    ) -> Result<PipelineResponse, RemoteFailure> {
        self.pipeline_requests.lock().unwrap().push(request.clone());
        let scripted = self.pipeline.lock().unwrap().pop_front();
        match scripted {
            Some(scripted) => scripted.settle().await,
            None => unscripted("pipeline"),
        }
    }

    async fn patch_diagnosis(
        &self,
        diagnosis_id: i64,
        patch: &DiagnosisPatch,
    ) -> Result<DiagnosisRecord, RemoteFailure> {
        self.patch_requests
            .lock()
            .unwrap()
            .push((diagnosis_id, patch.clone()));
        let scripted = self.patches.lock().unwrap().pop_front();
        match scripted {
            Some(scripted) => scripted.settle().await,
            None => unscripted("patch"),
        }
    }

    async fn list_diagnoses(&self) -> Result<Vec<DiagnosisRecord>, RemoteFailure> {
        *self.list_diagnoses_calls.lock().unwrap() += 1;
        self.diagnoses
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn create_patient(&self, patient: &NewPatient) -> Result<PatientRecord, RemoteFailure> {
        self.create_requests.lock().unwrap().push(patient.clone());
        let outcome = self.creates.lock().unwrap().pop_front();
        match outcome {
            Some(Ok(created)) => {
                self.patients.lock().unwrap().push(created.clone());
                Ok(created)
            }
            Some(Err(failure)) => Err(failure),
            None => unscripted("create"),
        }
    }

    async fn list_patients(&self) -> Result<Vec<PatientRecord>, RemoteFailure> {
        *self.list_patients_calls.lock().unwrap() += 1;
        Ok(self.patients.lock().unwrap().clone())
    }
}

// ========================================
// Fixtures
// ========================================

/// Short cosmetic delays so timer-driven stages show within a test
pub fn fast_config() -> ClientConfig {
    ClientConfig {
        mapping_delay: Duration::from_millis(20),
        validation_delay: Duration::from_millis(40),
        run_timeout: Some(Duration::from_secs(5)),
        ..ClientConfig::with_base_url("http://scripted.invalid/api")
    }
}

pub fn candidate(code: &str, title: &str, source_term: &str, score: Option<f64>) -> Candidate {
    Candidate {
        code: code.to_string(),
        title: title.to_string(),
        source_term: source_term.to_string(),
        score,
    }
}

pub fn pipeline_response(
    diagnosis_id: Option<i64>,
    ayush_term: &str,
    best: (&str, &str),
    confidence: Option<f64>,
    candidates: Vec<Candidate>,
) -> PipelineResponse {
    PipelineResponse {
        message: Some("Pipeline executed successfully.".to_string()),
        diagnosis_id,
        result: PipelineResult {
            ayush_term: ayush_term.to_string(),
            best: Some(BestMatch {
                code: best.0.to_string(),
                title: best.1.to_string(),
            }),
            confidence,
            needs_human_review: !candidates.is_empty(),
            manual_review_candidates: candidates,
            ..Default::default()
        },
    }
}

pub fn diagnosis(id: i64, patient: i64, icd_code: &str) -> DiagnosisRecord {
    DiagnosisRecord {
        id,
        patient,
        ayush_term: "Jwara".to_string(),
        icd_code: icd_code.to_string(),
        confidence_score: 0.9,
        raw_text: "fever".to_string(),
        created_at: Utc::now(),
    }
}

pub fn patient(id: i64, ayush_id: &str) -> PatientRecord {
    PatientRecord {
        id,
        name: format!("Patient {}", id),
        ayush_id: ayush_id.to_string(),
        age: 40,
    }
}

// ========================================
// Synchronization
// ========================================

/// Poll until `condition` holds, failing the test after two seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Everything currently buffered on the receiver
pub fn drain(rx: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// `StageAdvanced` targets for one run, in emission order
pub fn stages_for(events: &[ClientEvent], run: u64) -> Vec<ayush_common::events::RunStage> {
    events
        .iter()
        .filter_map(|event| match event {
            ClientEvent::StageAdvanced {
                run_id, new_stage, ..
            } if *run_id == run => Some(*new_stage),
            _ => None,
        })
        .collect()
}
