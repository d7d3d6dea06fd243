use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use super::account::AccountValidationState;
use super::draft::{Attachment, FormDraft};
use super::http::{server_messages, RequestSpec, RetryClient, RetryPolicy};
use super::notify::{self, NotificationContext, SecondaryTarget};
use super::validator::{FormSchema, ValidationResult};
use crate::config::ApiKey;
use crate::telemetry::TelemetryEvent;

/// Multipart field the upload endpoint reads files from.
pub const UPLOAD_FIELD: &str = "files";

/// Form field holding a customer number that must be verified before submitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRequirement {
    pub field: String,
    pub required: bool,
    /// Whether a format-only result is good enough when no remote system answered.
    pub accept_unverified: bool,
}

impl AccountRequirement {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            required: true,
            accept_unverified: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn verified_only(mut self) -> Self {
        self.accept_unverified = false;
        self
    }

    fn is_satisfied(&self, draft: &FormDraft, account: &AccountValidationState) -> bool {
        if !account.is_valid() {
            return false;
        }
        if !self.accept_unverified && !account.is_verified() {
            return false;
        }
        // A result for an earlier value of the field does not count.
        draft.text(&self.field).as_deref() == account.identifier.as_deref()
    }
}

/// Everything that distinguishes one form's submission pipeline from another.
#[derive(Debug, Clone)]
pub struct PipelineSpec {
    pub form_id: String,
    pub source: String,
    pub schema: FormSchema,
    pub account: Option<AccountRequirement>,
    pub notifications: Vec<SecondaryTarget>,
    pub retry: RetryPolicy,
}

impl PipelineSpec {
    pub fn new(form_id: impl Into<String>, source: impl Into<String>, schema: FormSchema) -> Self {
        Self {
            form_id: form_id.into(),
            source: source.into(),
            schema,
            account: None,
            notifications: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn account(mut self, requirement: AccountRequirement) -> Self {
        self.account = Some(requirement);
        self
    }

    pub fn notify(mut self, target: SecondaryTarget) -> Self {
        self.notifications.push(target);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Endpoints of the forms API.
#[derive(Debug, Clone)]
pub struct FormsApi {
    pub base_url: String,
    pub api_key: Option<ApiKey>,
}

impl FormsApi {
    pub fn new(base_url: impl Into<String>, api_key: Option<ApiKey>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
        }
    }

    pub fn submit_url(&self, form_id: &str) -> String {
        format!("{}/templates/{form_id}/submit", self.base_url)
    }

    pub fn upload_url(&self, submission_id: &str) -> String {
        format!("{}/files/upload/{submission_id}", self.base_url)
    }
}

/// Why a submission attempt did not record anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    AccountUnverified,
    Rejected,
    Network,
}

/// Result of one submit attempt.
///
/// When `success` is true, `errors` only holds partial-failure warnings about attachments.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionOutcome {
    pub success: bool,
    pub submission_id: Option<String>,
    pub errors: Vec<String>,
    pub secondary_effects_applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
}

impl SubmissionOutcome {
    pub fn failed(kind: FailureKind, errors: Vec<String>) -> Self {
        Self {
            success: false,
            submission_id: None,
            errors,
            secondary_effects_applied: false,
            failure: Some(kind),
            validation: None,
        }
    }

    pub fn invalid(validation: ValidationResult) -> Self {
        Self {
            validation: Some(validation.clone()),
            ..Self::failed(FailureKind::Validation, validation.messages())
        }
    }

    pub fn has_warnings(&self) -> bool {
        self.success && !self.errors.is_empty()
    }
}

/// Runs one form's pipeline: validate, check the account, submit, upload, notify.
#[derive(Debug, Clone)]
pub struct SubmissionOrchestrator {
    spec: PipelineSpec,
    api: FormsApi,
    client: RetryClient,
}

impl SubmissionOrchestrator {
    pub fn new(spec: PipelineSpec, api: FormsApi, client: RetryClient) -> Self {
        Self { spec, api, client }
    }

    pub fn spec(&self) -> &PipelineSpec {
        &self.spec
    }

    pub fn validate(&self, draft: &FormDraft, attachments: &[Attachment]) -> ValidationResult {
        self.spec.schema.validate_submission(draft, attachments)
    }

    /// Submit `draft` with its attachments. Never fails; every problem ends up in the outcome.
    #[instrument(skip_all, fields(form = %self.spec.source, attachments = attachments.len()))]
    pub async fn submit(
        &self,
        draft: &FormDraft,
        attachments: &[Attachment],
        account: &AccountValidationState,
    ) -> SubmissionOutcome {
        let validation = self.validate(draft, attachments);
        if !validation.is_valid() {
            debug!(fields = ?validation.fields(), "draft failed validation");
            return SubmissionOutcome::invalid(validation);
        }

        if let Some(requirement) = &self.spec.account {
            if requirement.required && !requirement.is_satisfied(draft, account) {
                debug!(status = ?account.status, "account not verified, not submitting");
                return SubmissionOutcome::failed(
                    FailureKind::AccountUnverified,
                    vec!["Please make sure the customer number is valid before submitting.".to_string()],
                );
            }
        }

        let language = draft.text("language");
        let telemetry = self.client.telemetry();
        telemetry.track(&TelemetryEvent::SubmitAttempt {
            form_id: self.spec.source.clone(),
            has_files: !attachments.is_empty(),
            language: language.clone(),
        });

        let submission_id = match self.submit_primary(draft, account, language).await {
            Ok(submission_id) => submission_id,
            Err(outcome) => {
                telemetry.track(&TelemetryEvent::SubmitError {
                    form_id: self.spec.source.clone(),
                    error: outcome.errors.join("; "),
                });
                return outcome;
            }
        };

        let mut warnings = Vec::new();
        let mut files_uploaded = 0;
        if !attachments.is_empty() {
            match &submission_id {
                Some(id) => {
                    let (uploaded, upload_warnings) = self.upload(id, attachments).await;
                    files_uploaded = uploaded;
                    warnings.extend(upload_warnings);
                }
                None => {
                    warn!("submission accepted without an id, skipping attachments");
                    warnings.push(
                        "Your form was submitted, but the attachments could not be uploaded because no submission reference was returned."
                            .to_string(),
                    );
                }
            }
        }

        let context = NotificationContext {
            draft,
            submission_id: submission_id.as_deref(),
            account: Some(account),
            identifier_field: self.spec.account.as_ref().map(|req| req.field.as_str()),
            source: &self.spec.source,
        };
        let report = notify::dispatch(&self.client, &self.spec.notifications, &context).await;

        telemetry.track(&TelemetryEvent::SubmitSuccess {
            form_id: self.spec.source.clone(),
            submission_id: submission_id.clone(),
            files_uploaded,
        });
        info!(submission_id = ?submission_id, warnings = warnings.len(), "submission recorded");

        SubmissionOutcome {
            success: true,
            submission_id,
            errors: warnings,
            secondary_effects_applied: report.applied(),
            failure: None,
            validation: None,
        }
    }

    fn metadata(&self, account: &AccountValidationState, language: Option<String>) -> Value {
        let validated = self.spec.account.is_some() && account.is_valid();
        json!({
            "source": self.spec.source,
            "submitted_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "language": language,
            "customer_validated": validated,
            "account_id": if validated { account.account_id.clone() } else { None },
        })
    }

    async fn submit_primary(
        &self,
        draft: &FormDraft,
        account: &AccountValidationState,
        language: Option<String>,
    ) -> Result<Option<String>, SubmissionOutcome> {
        let body = json!({
            "data": draft.to_json(),
            "metadata": self.metadata(account, language),
        });
        let request = RequestSpec::post_json(self.api.submit_url(&self.spec.form_id), body)
            .api_key(self.api.api_key.as_ref());

        let response = self
            .client
            .request_with_retry(&request, &self.spec.retry)
            .await
            .map_err(|err| {
                let kind = if err.is_network() {
                    FailureKind::Network
                } else {
                    FailureKind::Rejected
                };
                SubmissionOutcome::failed(kind, err.user_messages())
            })?;

        let body: Value = response.json().unwrap_or(Value::Null);
        if body.get("success").and_then(Value::as_bool) == Some(false) {
            let mut errors = server_messages(&body);
            if errors.is_empty() {
                errors.push("The server rejected the submission.".to_string());
            }
            return Err(SubmissionOutcome::failed(FailureKind::Rejected, errors));
        }
        Ok(submission_id(&body))
    }

    /// Returns the number of stored files and one warning per problem.
    async fn upload(&self, submission_id: &str, attachments: &[Attachment]) -> (usize, Vec<String>) {
        let request = RequestSpec::post_multipart(
            self.api.upload_url(submission_id),
            UPLOAD_FIELD,
            attachments.to_vec(),
        )
        .api_key(self.api.api_key.as_ref());

        let response = match self
            .client
            .request_with_retry(&request, &self.spec.retry)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                self.client.telemetry().track(&TelemetryEvent::FileUploadFailed {
                    submission_id: submission_id.to_string(),
                    error: err.to_string(),
                });
                let reason = err.user_messages().join(" ");
                return (
                    0,
                    vec![format!(
                        "Your form was submitted, but the attachments could not be uploaded. {reason}"
                    )],
                );
            }
        };

        let Ok(Value::Array(results)) = response.json::<Value>() else {
            return (attachments.len(), Vec::new());
        };
        let mut uploaded = 0;
        let mut warnings = Vec::new();
        for (index, result) in results.iter().enumerate() {
            if result.get("success").and_then(Value::as_bool) != Some(false) {
                uploaded += 1;
                continue;
            }
            let file_name = result
                .get("original_filename")
                .and_then(Value::as_str)
                .or_else(|| attachments.get(index).map(|file| file.file_name.as_str()))
                .unwrap_or("attachment");
            let message = result
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("upload failed");
            self.client.telemetry().track(&TelemetryEvent::FileUploadFailed {
                submission_id: submission_id.to_string(),
                error: format!("{file_name}: {message}"),
            });
            warnings.push(format!(
                "Your form was submitted, but {file_name} could not be uploaded: {message}"
            ));
        }
        (uploaded, warnings)
    }
}

/// `submission.id`, falling back to a top-level `id`; numeric ids are accepted.
fn submission_id(body: &Value) -> Option<String> {
    let id = body
        .get("submission")
        .and_then(|submission| submission.get("id"))
        .or_else(|| body.get("id"))?;
    match id {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
