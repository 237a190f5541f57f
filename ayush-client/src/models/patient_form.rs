//! Patient creation form
//!
//! Checked synchronously before any remote call; the first failing rule wins.

use crate::error::{ClientError, ClientResult};
use crate::services::identifier;
use ayush_common::api::NewPatient;

pub const NAME_REQUIRED_MESSAGE: &str = "Patient name is required";
pub const IDENTIFIER_REQUIRED_MESSAGE: &str = "AYUSH ID is required";
pub const AGE_INVALID_MESSAGE: &str = "Please enter a valid age (0-150)";

pub const MAX_AGE: u32 = 150;

/// Raw form input, as typed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientForm {
    pub name: String,
    /// Canonical identifier buffer, maintained via [`PatientForm::type_identifier`]
    pub ayush_id: String,
    pub age: String,
}

impl PatientForm {
    pub fn new(name: impl Into<String>, ayush_id: &str, age: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ayush_id: identifier::canonicalize(ayush_id),
            age: age.into(),
        }
    }

    /// Apply one edit to the identifier field
    pub fn type_identifier(&mut self, input: &str) {
        self.ayush_id = identifier::apply_keystroke(&self.ayush_id, input);
    }

    /// Validate and build the creation request
    pub fn validate(&self) -> ClientResult<NewPatient> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ClientError::invalid_input(NAME_REQUIRED_MESSAGE));
        }

        let ayush_id = identifier::canonicalize(self.ayush_id.trim());
        if ayush_id.is_empty() {
            return Err(ClientError::invalid_input(IDENTIFIER_REQUIRED_MESSAGE));
        }
        identifier::validate(&ayush_id).map_err(ClientError::invalid_input)?;

        let age = self
            .age
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|age| *age <= MAX_AGE)
            .ok_or_else(|| ClientError::invalid_input(AGE_INVALID_MESSAGE))?;

        Ok(NewPatient {
            name: name.to_string(),
            ayush_id,
            age,
        })
    }
}
