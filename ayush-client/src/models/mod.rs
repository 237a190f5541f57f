//! Data models for ayush-client
//!
//! - Pipeline run state machine
//! - Manual review selection and commit status
//! - Patient creation form

pub mod manual_review;
pub mod patient_form;
pub mod pipeline_run;

pub use manual_review::{merge_selection, ManualReview, ManualReviewStatus};
pub use patient_form::PatientForm;
pub use pipeline_run::{PipelineRun, StageTransition};
