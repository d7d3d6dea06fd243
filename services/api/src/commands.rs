use crate::infra::{load_attachment, load_draft, parse_form};
use clap::Args;
use form_relay::config::AppConfig;
use form_relay::error::AppError;
use form_relay::forms::{account_validator, http_client, session_for, FormKind};
use form_relay::pipeline::{
    AccountStatus, AccountValidationState, DisplayState, FieldValue, ValidationResult,
};
use form_relay::telemetry::{self, TracingSink};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct CheckArgs {
    /// Form to validate against (contact, b2b-feedback, b2b-support, b2b-returns, b2c-returns)
    #[arg(long, value_parser = parse_form)]
    pub(crate) form: FormKind,
    /// JSON file holding the draft's fields
    #[arg(long)]
    pub(crate) draft: PathBuf,
    /// Files to check against the form's attachment limits
    #[arg(long = "attach")]
    pub(crate) attachments: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct ValidateCustomerArgs {
    /// Customer number to look up
    pub(crate) customer_number: String,
}

#[derive(Args, Debug)]
pub(crate) struct SubmitArgs {
    /// Form to submit (contact, b2b-feedback, b2b-support, b2b-returns, b2c-returns)
    #[arg(long, value_parser = parse_form)]
    pub(crate) form: FormKind,
    /// JSON file holding the draft's fields
    #[arg(long)]
    pub(crate) draft: PathBuf,
    /// Files to upload after the submission is accepted
    #[arg(long = "attach")]
    pub(crate) attachments: Vec<PathBuf>,
    /// Language recorded with the submission
    #[arg(long)]
    pub(crate) language: Option<String>,
    /// Print the outcome as JSON instead of a summary
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn list_forms() {
    println!("Available forms");
    for kind in FormKind::ALL {
        let schema = kind.schema();
        println!("  {:<13} {}", kind.slug(), kind.title());
        println!("    fields: {}", schema.field_names().join(", "));
        println!(
            "    attachments: {}  customer number check: {}",
            yes_no(schema.accepts_attachments()),
            yes_no(kind.requires_customer_number())
        );
    }
}

pub(crate) fn check_draft(args: CheckArgs) -> Result<(), AppError> {
    let draft = load_draft(&args.draft)?;
    let attachments = args
        .attachments
        .iter()
        .map(|path| load_attachment(path))
        .collect::<Result<Vec<_>, _>>()?;

    let result = args.form.schema().validate_submission(&draft, &attachments);
    print_validation(args.form, &result);
    Ok(())
}

pub(crate) async fn validate_customer(args: ValidateCustomerArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let client = http_client(&config, Arc::new(TracingSink))?;
    let state = account_validator(&config, &client)
        .validate_identifier(&args.customer_number)
        .await;
    print_account(&state);
    Ok(())
}

pub(crate) async fn submit_draft(args: SubmitArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let draft = load_draft(&args.draft)?;
    let attachments = args
        .attachments
        .iter()
        .map(|path| load_attachment(path))
        .collect::<Result<Vec<_>, _>>()?;

    let client = http_client(&config, Arc::new(TracingSink))?;
    let session = session_for(args.form, &config, &client);
    for (name, value) in draft.iter() {
        session.set_field(name, value.clone());
    }
    if let Some(language) = args.language {
        session.set_field("language", FieldValue::Text(language));
    }
    for attachment in attachments {
        session.attach(attachment);
    }
    if let Some(state) = session.verify_account().await {
        print_account(&state);
    }

    let outcome = session.submit().await?;
    if args.json {
        match serde_json::to_string_pretty(&outcome) {
            Ok(json) => println!("{json}"),
            Err(err) => eprintln!("failed to serialise outcome: {err}"),
        }
    } else {
        print_display(&session.display());
    }
    Ok(())
}

fn print_validation(form: FormKind, result: &ValidationResult) {
    if result.is_valid() {
        println!("Draft is valid for {}", form.slug());
        return;
    }
    println!("Draft has {} problem(s) for {}:", result.errors().len(), form.slug());
    for error in result.errors() {
        println!("  {}: {}", error.field, error.message);
    }
}

fn print_account(state: &AccountValidationState) {
    let identifier = state.identifier.as_deref().unwrap_or("-");
    match state.status {
        AccountStatus::Idle => println!("Customer number {identifier} was not checked (too short)"),
        AccountStatus::Validating => println!("Customer number {identifier} is still being checked"),
        AccountStatus::Valid => println!(
            "Customer number {identifier} is valid (account {})",
            state.account_id.as_deref().unwrap_or("unknown")
        ),
        AccountStatus::Invalid => println!(
            "Customer number {identifier} is invalid: {}",
            state.message.as_deref().unwrap_or("not found")
        ),
    }
    if state.is_valid() && !state.is_verified() {
        println!("  (format check only; no account service answered)");
    }
}

fn print_display(display: &DisplayState) {
    if let Some(headline) = &display.headline {
        println!("{headline}");
    }
    for detail in &display.details {
        println!("  - {detail}");
    }
    for notice in &display.notices {
        println!("  ! {notice}");
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
