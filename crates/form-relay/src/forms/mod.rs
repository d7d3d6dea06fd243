//! Catalog of the forms this crate knows how to submit.
//!
//! Every form is configuration: a validation schema plus the optional account, attachment and
//! notification steps of its pipeline. The wiring helpers turn an [`AppConfig`] into ready
//! orchestrators and sessions.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::pipeline::{
    AccountRequirement, AccountSource, AccountValidator, AccountWatcher, AttachmentPolicy,
    FallbackAccountApi, FieldSpec, FormSchema, FormSession, FormsApi, NotificationFormat,
    PipelineSpec, PrimaryAccountApi, Refinement, ReqwestTransport, RetryClient,
    SecondaryTarget, SubmissionOrchestrator, TransportError, WEB_FORM_CASE_ORIGIN,
};
use crate::telemetry::TelemetrySink;

/// Field holding the customer number on business forms.
pub const CUSTOMER_NUMBER_FIELD: &str = "customerNumber";

const URGENCY: [&str; 3] = ["low", "medium", "high"];
const RETURN_REASONS: [&str; 5] = [
    "defective",
    "not_as_described",
    "damaged",
    "wrong_item",
    "other",
];
const CONDITIONS: [&str; 3] = ["new", "used", "damaged"];
const REFUND_METHODS: [&str; 3] = ["original_payment", "store_credit", "replacement"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormKind {
    Contact,
    B2bFeedback,
    B2bSupport,
    B2bReturns,
    B2cReturns,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown form '{0}' (expected one of: contact, b2b-feedback, b2b-support, b2b-returns, b2c-returns)")]
pub struct UnknownForm(pub String);

impl FormKind {
    pub const ALL: [FormKind; 5] = [
        FormKind::Contact,
        FormKind::B2bFeedback,
        FormKind::B2bSupport,
        FormKind::B2bReturns,
        FormKind::B2cReturns,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            FormKind::Contact => "contact",
            FormKind::B2bFeedback => "b2b-feedback",
            FormKind::B2bSupport => "b2b-support",
            FormKind::B2bReturns => "b2b-returns",
            FormKind::B2cReturns => "b2c-returns",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            FormKind::Contact => "Contact us",
            FormKind::B2bFeedback => "Business feedback",
            FormKind::B2bSupport => "Business support",
            FormKind::B2bReturns => "Business returns",
            FormKind::B2cReturns => "Consumer returns",
        }
    }

    /// Tag stored in submission metadata and notification envelopes.
    pub fn source(&self) -> String {
        format!("{}-form", self.slug())
    }

    pub fn requires_customer_number(&self) -> bool {
        matches!(self, FormKind::B2bSupport)
    }

    pub fn schema(&self) -> FormSchema {
        match self {
            FormKind::Contact => contact_schema(),
            FormKind::B2bFeedback => b2b_feedback_schema(),
            FormKind::B2bSupport => b2b_support_schema(),
            FormKind::B2bReturns => b2b_returns_schema(),
            FormKind::B2cReturns => b2c_returns_schema(),
        }
    }
}

impl fmt::Display for FormKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for FormKind {
    type Err = UnknownForm;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase().replace('_', "-");
        FormKind::ALL
            .into_iter()
            .find(|kind| kind.slug() == wanted)
            .ok_or_else(|| UnknownForm(value.to_string()))
    }
}

fn required(name: &str, label: &str) -> FieldSpec {
    FieldSpec::new(name).required(format!("{label} is required"))
}

fn email() -> FieldSpec {
    required("email", "Email").email("Invalid email address")
}

fn phone() -> FieldSpec {
    FieldSpec::new("phone").phone("Invalid phone number")
}

fn choice(name: &str, options: &[&str], message: &str) -> FieldSpec {
    FieldSpec::new(name)
        .required(message)
        .one_of(options, message)
}

fn long_text(name: &str, label: &str) -> FieldSpec {
    required(name, label).min_length(10, format!("{label} must be at least 10 characters"))
}

fn contact_schema() -> FormSchema {
    FormSchema::new()
        .field(
            required("name", "Name")
                .min_length(2, "Name must be at least 2 characters")
                .max_length(100, "Name must be at most 100 characters"),
        )
        .field(email())
        .field(FieldSpec::new("company"))
        .field(phone())
        .field(
            long_text("message", "Message")
                .max_length(1000, "Message must be at most 1000 characters"),
        )
        .field(FieldSpec::new("consent").must_be_true("You must accept the terms to continue"))
}

fn b2b_feedback_schema() -> FormSchema {
    FormSchema::new()
        .field(required("companyName", "Company name"))
        .field(required("contactPerson", "Contact person"))
        .field(email())
        .field(phone())
        .field(required("businessType", "Business type"))
        .field(choice(
            "feedbackCategory",
            &["product", "service", "partnership", "support", "other"],
            "Please select a feedback category",
        ))
        .field(long_text("message", "Message"))
        .field(choice("priority", &URGENCY, "Please select a priority"))
        .field(FieldSpec::new("followUpRequested"))
        .attachments(AttachmentPolicy::default())
}

fn b2b_support_schema() -> FormSchema {
    FormSchema::new()
        .field(choice(
            "supportType",
            &["technical", "customer"],
            "Please select support type",
        ))
        .field(required(CUSTOMER_NUMBER_FIELD, "Customer number"))
        .field(email())
        .field(required("companyName", "Company name"))
        .field(required("contactPerson", "Contact person"))
        .field(phone())
        .field(FieldSpec::new("productCode"))
        .field(FieldSpec::new("serialNumber"))
        .field(required("subject", "Subject"))
        .field(long_text("problemDescription", "Problem description"))
        .field(choice("urgency", &URGENCY, "Please select urgency"))
        .refine(Refinement::require_any_when(
            "supportType",
            "technical",
            &["productCode", "serialNumber"],
            "productCode",
            "For technical support, either product code or serial number is required",
        ))
        .attachments(AttachmentPolicy::default())
}

fn returns_details(schema: FormSchema) -> FormSchema {
    schema
        .field(required("productModel", "Product model"))
        .field(FieldSpec::new("serialNumber"))
        .field(required("purchaseDate", "Purchase date"))
        .field(choice(
            "returnReason",
            &RETURN_REASONS,
            "Please select a return reason",
        ))
        .field(choice("condition", &CONDITIONS, "Please select the product condition"))
        .field(long_text("description", "Description"))
        .field(choice(
            "refundMethod",
            &REFUND_METHODS,
            "Please select a refund method",
        ))
        .attachments(AttachmentPolicy::default())
}

fn b2b_returns_schema() -> FormSchema {
    let schema = FormSchema::new()
        .field(required("companyName", "Company name"))
        .field(required("contactPerson", "Contact person"))
        .field(email())
        .field(phone())
        .field(required("orderNumber", "Order number"));
    returns_details(schema).field(choice("urgency", &URGENCY, "Please select urgency"))
}

fn b2c_returns_schema() -> FormSchema {
    let schema = FormSchema::new()
        .field(required("firstName", "First name"))
        .field(required("lastName", "Last name"))
        .field(email())
        .field(phone())
        .field(required("address", "Address"))
        .field(required("postalCode", "Postal code"))
        .field(required("city", "City"))
        .field(FieldSpec::new("orderNumber"));
    returns_details(schema)
}

/// Pipeline of `kind` with endpoints and policies taken from `config`.
pub fn pipeline_for(kind: FormKind, config: &AppConfig) -> PipelineSpec {
    let mut spec =
        PipelineSpec::new(kind.slug(), kind.source(), kind.schema()).retry(config.retry.clone());
    if kind.requires_customer_number() {
        spec = spec.account(AccountRequirement::new(CUSTOMER_NUMBER_FIELD));
        if let Some(cases_url) = &config.notifications.cases_url {
            spec = spec.notify(
                SecondaryTarget::new(
                    "cases",
                    format!("{cases_url}/cases"),
                    NotificationFormat::CaseRecord {
                        customer_code: config.account.customer_code.clone(),
                        case_origin_code: WEB_FORM_CASE_ORIGIN.to_string(),
                    },
                )
                .with_api_key(config.account.api_key.clone()),
            );
        }
    }
    if let Some(esb_url) = &config.notifications.esb_url {
        spec = spec.notify(SecondaryTarget::new(
            "esb",
            format!("{esb_url}/{}", kind.slug()),
            NotificationFormat::BusEnvelope {
                customer_code: config.account.customer_code.clone(),
            },
        ));
    }
    spec
}

/// Retrying client over the production reqwest transport.
pub fn http_client(
    config: &AppConfig,
    telemetry: Arc<dyn TelemetrySink>,
) -> Result<RetryClient, TransportError> {
    let transport = ReqwestTransport::new(config.forms.timeout)?;
    Ok(RetryClient::new(Arc::new(transport), telemetry))
}

/// Primary account API followed by the fallback validation service.
pub fn account_validator(config: &AppConfig, client: &RetryClient) -> AccountValidator {
    let sources: Vec<Arc<dyn AccountSource>> = vec![
        Arc::new(PrimaryAccountApi::new(
            client.clone(),
            config.account.base_url.clone(),
            config.account.customer_code.clone(),
            config.account.api_key.clone(),
        )),
        Arc::new(FallbackAccountApi::new(
            client.clone(),
            config.account.fallback_url.clone(),
        )),
    ];
    AccountValidator::new(
        sources,
        config.account.identifier,
        Arc::clone(client.telemetry()),
    )
}

pub fn orchestrator_for(
    kind: FormKind,
    config: &AppConfig,
    client: &RetryClient,
) -> SubmissionOrchestrator {
    SubmissionOrchestrator::new(
        pipeline_for(kind, config),
        FormsApi::new(config.forms.base_url.clone(), config.forms.api_key.clone()),
        client.clone(),
    )
}

/// Fresh session for one instance of `kind`, with an account watcher when the form needs one.
pub fn session_for(kind: FormKind, config: &AppConfig, client: &RetryClient) -> FormSession {
    let watcher = kind.requires_customer_number().then(|| {
        AccountWatcher::new(account_validator(config, client), config.account.debounce)
    });
    FormSession::new(Arc::new(orchestrator_for(kind, config, client)), watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{FormDraft, ATTACHMENTS_FIELD};
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> AppConfig {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        AppConfig::from_lookup(|key| values.get(key).cloned()).expect("config loads")
    }

    #[test]
    fn slugs_round_trip_through_from_str() {
        for kind in FormKind::ALL {
            assert_eq!(kind.slug().parse::<FormKind>(), Ok(kind));
        }
        assert_eq!("B2B_SUPPORT".parse::<FormKind>(), Ok(FormKind::B2bSupport));
        assert!("newsletter".parse::<FormKind>().is_err());
    }

    #[test]
    fn contact_form_requires_consent_and_rejects_files() {
        let schema = FormKind::Contact.schema();
        let draft = FormDraft::new()
            .with("name", "Ada")
            .with("email", "ada@example.com")
            .with("message", "Please call me back about my order.")
            .with("consent", false);

        let result = schema.validate(&draft);

        assert_eq!(result.fields(), vec!["consent"]);
        assert!(!schema.accepts_attachments());
        assert!(!schema.validate_attachments(&[crate::pipeline::Attachment::new(
            "a.pdf",
            "application/pdf",
            vec![1]
        )])
        .for_field(ATTACHMENTS_FIELD)
        .is_empty());
    }

    #[test]
    fn technical_support_needs_a_product_reference() {
        let draft = FormDraft::new()
            .with("supportType", "technical")
            .with("customerNumber", "1411768")
            .with("email", "buyer@example.com")
            .with("companyName", "Forest Tools AB")
            .with("contactPerson", "Sven")
            .with("subject", "Chainsaw stalls")
            .with("problemDescription", "Stalls after a few minutes of cutting.")
            .with("urgency", "high");

        let result = FormKind::B2bSupport.schema().validate(&draft);
        assert_eq!(result.fields(), vec!["productCode"]);

        let fixed = draft.with("productCode", "967 12 34-56");
        assert!(FormKind::B2bSupport.schema().validate(&fixed).is_valid());
    }

    #[test]
    fn returns_forms_share_return_details() {
        let b2c_schema = FormKind::B2cReturns.schema();
        let b2b_schema = FormKind::B2bReturns.schema();
        let b2c = b2c_schema.field_names();
        let b2b = b2b_schema.field_names();

        for field in ["productModel", "purchaseDate", "returnReason", "refundMethod"] {
            assert!(b2c.contains(&field));
            assert!(b2b.contains(&field));
        }
        assert!(b2b.contains(&"urgency"));
        assert!(!b2c.contains(&"urgency"));
    }

    #[test]
    fn support_pipeline_verifies_customers_and_notifies_configured_targets() {
        let config = config(&[
            ("CASES_API_URL", "https://cases.example.com/v1"),
            ("ESB_URL", "https://bus.example.com/esb/"),
            ("ACCOUNT_API_KEY", "key"),
        ]);

        let spec = pipeline_for(FormKind::B2bSupport, &config);

        assert_eq!(
            spec.account.as_ref().map(|req| req.field.as_str()),
            Some(CUSTOMER_NUMBER_FIELD)
        );
        let urls: Vec<&str> = spec.notifications.iter().map(|t| t.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://cases.example.com/v1/cases",
                "https://bus.example.com/esb/b2b-support"
            ]
        );
        assert!(spec.notifications[0].api_key.is_some());
        assert_eq!(spec.retry, config.retry);
    }

    #[test]
    fn other_forms_skip_account_checks_and_unset_targets() {
        let config = config(&[]);

        for kind in FormKind::ALL {
            let spec = pipeline_for(kind, &config);
            assert!(spec.notifications.is_empty());
            assert_eq!(spec.account.is_some(), kind == FormKind::B2bSupport);
            assert_eq!(spec.source, format!("{}-form", kind.slug()));
        }
    }
}
