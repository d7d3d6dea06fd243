use crate::pipeline::{
    render, DisplayPhase, FailureKind, FieldSpec, FormDraft, FormSchema, SubmissionOutcome,
    GENERIC_FAILURE,
};

fn succeeded(id: Option<&str>, warnings: &[&str]) -> SubmissionOutcome {
    SubmissionOutcome {
        success: true,
        submission_id: id.map(str::to_string),
        errors: warnings.iter().map(|warning| warning.to_string()).collect(),
        secondary_effects_applied: false,
        failure: None,
        validation: None,
    }
}

#[test]
fn nothing_submitted_yet_is_idle() {
    let state = render(None, false);

    assert_eq!(state.phase, DisplayPhase::Idle);
    assert!(state.submit_enabled);
    assert!(!state.busy);
    assert_eq!(state.headline, None);
}

#[test]
fn submitting_disables_the_submit_action() {
    let previous = SubmissionOutcome::failed(FailureKind::Network, vec!["offline".to_string()]);

    let state = render(Some(&previous), true);

    assert_eq!(state.phase, DisplayPhase::Submitting);
    assert!(state.busy);
    assert!(!state.submit_enabled);
    assert!(state.details.is_empty());
}

#[test]
fn success_mentions_the_reference_and_clears_the_draft() {
    let state = render(Some(&succeeded(Some("sub-000042"), &[])), false);

    assert_eq!(state.phase, DisplayPhase::Success);
    assert!(state.clear_draft);
    assert!(state
        .headline
        .as_deref()
        .is_some_and(|headline| headline.contains("sub-000042")));
    assert!(state.details.is_empty());
}

#[test]
fn partial_failures_are_notices_on_a_success() {
    let outcome = succeeded(Some("S"), &["attachments could not be uploaded"]);

    let state = render(Some(&outcome), false);

    assert_eq!(state.phase, DisplayPhase::Success);
    assert_eq!(state.notices, vec!["attachments could not be uploaded"]);
    assert!(state.details.is_empty());
}

#[test]
fn failures_keep_the_draft_and_list_errors() {
    let outcome = SubmissionOutcome::failed(
        FailureKind::Rejected,
        vec!["Email domain is not allowed".to_string()],
    );

    let state = render(Some(&outcome), false);

    assert_eq!(state.phase, DisplayPhase::Error);
    assert!(!state.clear_draft);
    assert!(state.submit_enabled);
    assert_eq!(state.details, vec!["Email domain is not allowed"]);
    assert!(state.notices.is_empty());
}

#[test]
fn failure_without_messages_falls_back_to_generic_text() {
    let outcome = SubmissionOutcome::failed(FailureKind::Rejected, Vec::new());

    assert_eq!(render(Some(&outcome), false).details, vec![GENERIC_FAILURE]);
}

#[test]
fn validation_failures_expose_field_errors() {
    let schema = FormSchema::new().field(FieldSpec::new("email").required("Email is required"));
    let outcome = SubmissionOutcome::invalid(schema.validate(&FormDraft::new()));

    let state = render(Some(&outcome), false);

    assert_eq!(state.field_errors.len(), 1);
    assert_eq!(state.field_errors[0].field, "email");
    assert_eq!(state.details, vec!["Email is required"]);
}

#[test]
fn rendering_is_idempotent() {
    let outcome = succeeded(Some("S"), &["warning"]);

    assert_eq!(render(Some(&outcome), false), render(Some(&outcome), false));
    assert_eq!(render(None, true), render(None, true));
}
