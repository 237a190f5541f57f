//! Wire types for the remote diagnosis service
//!
//! # Design Principle
//!
//! This module contains ONLY:
//! - Shared request/response types
//! - Pure helpers on those types (no HTTP client dependencies)
//!
//! The client crate wraps these with its transport.

pub mod types;

pub use types::{
    BestMatch, Candidate, DiagnosisPatch, DiagnosisRecord, NewPatient, PatientRecord,
    PipelineRequest, PipelineResponse, PipelineResult,
};
