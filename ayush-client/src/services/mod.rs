//! Client services
//!
//! - Identifier canonicalization and validation
//! - Remote failure normalization
//! - Record store interface and its HTTP implementation
//! - Pipeline session orchestration

pub mod error_normalizer;
pub mod http_record_store;
pub mod identifier;
pub mod pipeline_client;
pub mod record_store;

pub use error_normalizer::{normalize, ErrorContext, NormalizedError};
pub use http_record_store::HttpRecordStore;
pub use pipeline_client::{ApplyOutcome, PipelineClient, RunSettlement, SessionSnapshot};
pub use record_store::{FailureResponse, RecordStore, RemoteFailure, ResponseBody};
