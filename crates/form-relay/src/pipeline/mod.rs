//! Client-side submission pipeline.
//!
//! validation -> account verification (debounced, independent of submit) -> primary JSON
//! submission -> attachment upload keyed by the returned submission id -> best-effort
//! downstream notifications -> status reporting.

pub mod account;
pub mod draft;
pub mod http;
pub mod notify;
pub mod orchestrator;
pub mod session;
pub mod status;
pub mod validator;

#[cfg(test)]
mod tests;

pub use account::{
    AccountLookup, AccountSource, AccountStatus, AccountValidationState, AccountValidator,
    AccountWatcher, FallbackAccountApi, IdentifierPolicy, PrimaryAccountApi, SourceUnavailable,
    Verification,
};
pub use draft::{Attachment, FieldValue, FormDraft};
pub use http::{
    HttpMethod, HttpResponse, HttpTransport, RequestBody, RequestError, RequestSpec,
    ReqwestTransport, RetryClient, RetryPolicy, TransportError, DEFAULT_RETRYABLE_STATUSES,
    MAX_RETRY_DELAY,
};
pub use notify::{
    NotificationContext, NotificationFormat, NotificationReport, SecondaryTarget,
    WEB_FORM_CASE_ORIGIN,
};
pub use orchestrator::{
    AccountRequirement, FailureKind, FormsApi, PipelineSpec, SubmissionOrchestrator,
    SubmissionOutcome, UPLOAD_FIELD,
};
pub use session::{FormSession, SessionError};
pub use status::{render, DisplayPhase, DisplayState, GENERIC_FAILURE};
pub use validator::{
    AttachmentPolicy, FieldError, FieldRule, FieldSpec, FormSchema, Refinement, ValidationResult,
    ATTACHMENTS_FIELD, EMAIL_PATTERN, PHONE_PATTERN,
};
