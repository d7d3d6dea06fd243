//! Submission pipeline shared by the contact, feedback, support and returns forms.
//!
//! Each form is described declaratively (see [`forms`]) and driven through the same
//! validation, account verification, submission, upload and notification steps in
//! [`pipeline`].

pub mod config;
pub mod error;
pub mod forms;
pub mod mock;
pub mod pipeline;
pub mod telemetry;
