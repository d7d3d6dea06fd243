use serde_json::{json, Map, Value};
use tracing::instrument;

use super::account::AccountValidationState;
use super::draft::FormDraft;
use super::http::{RequestSpec, RetryClient, RetryPolicy};
use crate::config::ApiKey;
use crate::telemetry::TelemetryEvent;

/// Case origin code the case-management system expects for web forms.
pub const WEB_FORM_CASE_ORIGIN: &str = "115000008";

/// Payload shape a downstream system accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationFormat {
    /// Case-management record with a composed description.
    CaseRecord {
        customer_code: String,
        case_origin_code: String,
    },
    /// Flattened draft plus references, for the integration bus.
    BusEnvelope { customer_code: String },
}

/// Downstream system notified after a successful submission.
#[derive(Debug, Clone)]
pub struct SecondaryTarget {
    pub name: String,
    pub url: String,
    pub api_key: Option<ApiKey>,
    pub format: NotificationFormat,
    pub retry: RetryPolicy,
}

impl SecondaryTarget {
    pub fn new(name: impl Into<String>, url: impl Into<String>, format: NotificationFormat) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            api_key: None,
            format,
            retry: RetryPolicy::single_attempt(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<ApiKey>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn derive_payload(&self, context: &NotificationContext<'_>) -> Value {
        let account_id = context.account_id();
        let customer_number = context.customer_number();
        match &self.format {
            NotificationFormat::CaseRecord {
                customer_code,
                case_origin_code,
            } => json!({
                "accountId": account_id,
                "customerNumber": customer_number,
                "customerCode": customer_code,
                "caseOriginCode": case_origin_code,
                "description": describe(context.draft),
            }),
            NotificationFormat::BusEnvelope { customer_code } => {
                let mut envelope: Map<String, Value> = match context.draft.to_json() {
                    Value::Object(fields) => fields,
                    _ => Map::new(),
                };
                envelope.insert(
                    "localSubmissionId".to_string(),
                    json!(context.submission_id),
                );
                envelope.insert("accountId".to_string(), json!(account_id));
                envelope.insert("customerCode".to_string(), json!(customer_code));
                envelope.insert("source".to_string(), json!(context.source));
                Value::Object(envelope)
            }
        }
    }
}

/// What a notification payload is derived from.
#[derive(Debug, Clone, Copy)]
pub struct NotificationContext<'a> {
    pub draft: &'a FormDraft,
    pub submission_id: Option<&'a str>,
    pub account: Option<&'a AccountValidationState>,
    pub identifier_field: Option<&'a str>,
    pub source: &'a str,
}

impl NotificationContext<'_> {
    fn account_id(&self) -> Option<String> {
        self.account
            .filter(|account| account.is_valid())
            .and_then(|account| account.account_id.clone())
    }

    fn customer_number(&self) -> Option<String> {
        self.identifier_field
            .and_then(|field| self.draft.text(field))
            .or_else(|| self.account.and_then(|account| account.identifier.clone()))
    }
}

/// Subject first, then every other filled-in field as `name: value`.
fn describe(draft: &FormDraft) -> String {
    let mut lines = Vec::new();
    if let Some(subject) = draft.text("subject") {
        lines.push(format!("Subject: {subject}"));
        lines.push(String::new());
    }
    for (name, value) in draft.iter() {
        if name == "subject" || value.is_blank() {
            continue;
        }
        lines.push(format!("{name}: {}", value.as_text().trim()));
    }
    lines.join("\n")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationReport {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

impl NotificationReport {
    /// At least one downstream system acknowledged the record.
    pub fn applied(&self) -> bool {
        !self.delivered.is_empty()
    }
}

/// Notify every target in order. Failures are tracked and never returned.
#[instrument(skip_all, fields(targets = targets.len()))]
pub async fn dispatch(
    client: &RetryClient,
    targets: &[SecondaryTarget],
    context: &NotificationContext<'_>,
) -> NotificationReport {
    let mut report = NotificationReport::default();
    for target in targets {
        let request = RequestSpec::post_json(target.url.clone(), target.derive_payload(context))
            .api_key(target.api_key.as_ref());
        match client.request_with_retry(&request, &target.retry).await {
            Ok(response) => {
                client.telemetry().track(&TelemetryEvent::NotificationDelivered {
                    target: target.name.clone(),
                    status: response.status,
                });
                report.delivered.push(target.name.clone());
            }
            Err(err) => {
                client.telemetry().track(&TelemetryEvent::NotificationFailed {
                    target: target.name.clone(),
                    error: err.to_string(),
                });
                report.failed.push(target.name.clone());
            }
        }
    }
    report
}
