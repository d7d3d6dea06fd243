use serde::Serialize;

use super::orchestrator::{FailureKind, SubmissionOutcome};
use super::validator::FieldError;

pub const GENERIC_FAILURE: &str =
    "Something went wrong while submitting the form. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayPhase {
    Idle,
    Submitting,
    Success,
    Error,
}

/// What the form shows the user at a given moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayState {
    pub phase: DisplayPhase,
    pub busy: bool,
    pub submit_enabled: bool,
    pub headline: Option<String>,
    /// Reasons a failed submission recorded nothing.
    pub details: Vec<String>,
    /// Non-blocking warnings about a submission that did go through.
    pub notices: Vec<String>,
    pub field_errors: Vec<FieldError>,
    pub clear_draft: bool,
}

impl DisplayState {
    fn idle() -> Self {
        Self {
            phase: DisplayPhase::Idle,
            busy: false,
            submit_enabled: true,
            headline: None,
            details: Vec::new(),
            notices: Vec::new(),
            field_errors: Vec::new(),
            clear_draft: false,
        }
    }
}

/// Derive the display from the latest outcome. Pure: equal inputs give equal states.
pub fn render(outcome: Option<&SubmissionOutcome>, is_submitting: bool) -> DisplayState {
    if is_submitting {
        return DisplayState {
            phase: DisplayPhase::Submitting,
            busy: true,
            submit_enabled: false,
            headline: Some("Submitting...".to_string()),
            ..DisplayState::idle()
        };
    }

    let Some(outcome) = outcome else {
        return DisplayState::idle();
    };

    if outcome.success {
        let headline = match &outcome.submission_id {
            Some(id) => format!("Thank you! Your form has been submitted. Reference: {id}"),
            None => "Thank you! Your form has been submitted.".to_string(),
        };
        return DisplayState {
            phase: DisplayPhase::Success,
            headline: Some(headline),
            notices: outcome.errors.clone(),
            clear_draft: true,
            ..DisplayState::idle()
        };
    }

    let headline = match outcome.failure {
        Some(FailureKind::Validation) => "Please correct the highlighted fields.",
        Some(FailureKind::AccountUnverified) => "Your customer number has not been verified.",
        _ => "Your submission failed and nothing was recorded.",
    };
    let details = if outcome.errors.is_empty() {
        vec![GENERIC_FAILURE.to_string()]
    } else {
        outcome.errors.clone()
    };
    let field_errors = outcome
        .validation
        .as_ref()
        .map(|validation| validation.errors().to_vec())
        .unwrap_or_default();

    DisplayState {
        phase: DisplayPhase::Error,
        headline: Some(headline.to_string()),
        details,
        field_errors,
        ..DisplayState::idle()
    }
}
