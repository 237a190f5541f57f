//! ayush-client library interface
//!
//! Session core of the clinical coding client: identifier canonicalization,
//! failure normalization, the pipeline run state machine, manual review, and
//! the orchestrator tying them to a remote record store.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use crate::config::ClientConfig;
pub use crate::error::{ClientError, ClientResult};
pub use crate::services::{PipelineClient, RecordStore};
