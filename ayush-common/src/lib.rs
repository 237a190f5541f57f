//! # AYUSH Common Library
//!
//! Shared code for the AYUSH clinical coding client including:
//! - Wire types for the record-oriented diagnosis API
//! - Event types (ClientEvent enum) and the EventBus
//! - Configuration loading
//! - Common error type

pub mod api;
pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
