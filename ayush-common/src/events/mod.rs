//! Event types for the client event system
//!
//! Provides the ClientEvent enum and the EventBus that presentation layers
//! subscribe to for run progress.

mod run_types;

pub use run_types::{ErrorClass, RunStage};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Client event types
///
/// Events are broadcast via EventBus and can be serialized for display or
/// forwarding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// A new pipeline run became the current run
    RunStarted {
        run_id: u64,
        patient_id: i64,
        timestamp: DateTime<Utc>,
    },

    /// Displayed stage of the current run advanced
    ///
    /// Intermediate stages are cosmetic and not synchronized with the remote
    /// pipeline.
    StageAdvanced {
        run_id: u64,
        old_stage: RunStage,
        new_stage: RunStage,
        progress_percent: u8,
        timestamp: DateTime<Utc>,
    },

    /// Current run completed with a result
    RunCompleted {
        run_id: u64,
        diagnosis_id: Option<i64>,
        /// Number of manual review candidates returned
        candidate_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Current run failed
    RunFailed {
        run_id: u64,
        classification: ErrorClass,
        /// User-facing message
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A run settled after a newer run started; its outcome was discarded
    RunSuperseded {
        run_id: u64,
        current_run_id: u64,
        timestamp: DateTime<Utc>,
    },

    /// Manual review selection committed to the diagnosis record
    ManualReviewApplied {
        run_id: u64,
        diagnosis_id: i64,
        icd_code: String,
        timestamp: DateTime<Utc>,
    },

    /// Manual review commit failed
    ManualReviewFailed {
        run_id: u64,
        diagnosis_id: i64,
        timestamp: DateTime<Utc>,
    },

    /// Diagnosis history for a patient was refetched
    HistoryRefreshed {
        patient_id: i64,
        record_count: usize,
        timestamp: DateTime<Utc>,
    },
}

impl ClientEvent {
    /// Event type name as used in the serialized `type` tag
    pub fn event_type(&self) -> &str {
        match self {
            ClientEvent::RunStarted { .. } => "RunStarted",
            ClientEvent::StageAdvanced { .. } => "StageAdvanced",
            ClientEvent::RunCompleted { .. } => "RunCompleted",
            ClientEvent::RunFailed { .. } => "RunFailed",
            ClientEvent::RunSuperseded { .. } => "RunSuperseded",
            ClientEvent::ManualReviewApplied { .. } => "ManualReviewApplied",
            ClientEvent::ManualReviewFailed { .. } => "ManualReviewFailed",
            ClientEvent::HistoryRefreshed { .. } => "HistoryRefreshed",
        }
    }

    /// Run this event belongs to, if any
    pub fn run_id(&self) -> Option<u64> {
        match self {
            ClientEvent::RunStarted { run_id, .. }
            | ClientEvent::StageAdvanced { run_id, .. }
            | ClientEvent::RunCompleted { run_id, .. }
            | ClientEvent::RunFailed { run_id, .. }
            | ClientEvent::RunSuperseded { run_id, .. }
            | ClientEvent::ManualReviewApplied { run_id, .. }
            | ClientEvent::ManualReviewFailed { run_id, .. } => Some(*run_id),
            ClientEvent::HistoryRefreshed { .. } => None,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for client events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use ayush_common::events::{ClientEvent, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(ClientEvent::RunStarted {
///     run_id: 1,
///     patient_id: 7,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(ClientEvent::RunStarted { run_id: 1, .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ClientEvent,
    ) -> Result<usize, broadcast::error::SendError<ClientEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ClientEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
