use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use super::draft::{Attachment, FormDraft};

pub const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";
pub const PHONE_PATTERN: &str = r"^(\+\d{1,3}\s?)?(\d{6,14})$";

/// Field name under which attachment problems are reported.
pub const ATTACHMENTS_FIELD: &str = "attachments";

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern compiles"))
}

fn phone_regex() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| Regex::new(PHONE_PATTERN).expect("phone pattern compiles"))
}

/// Message attached to one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Per-field error messages; empty means the draft is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    errors: Vec<FieldError>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .map(|error| error.message.clone())
            .collect()
    }

    pub fn for_field(&self, field: &str) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|error| error.field == field)
            .map(|error| error.message.as_str())
            .collect()
    }

    /// Fields with at least one error, in reporting order.
    pub fn fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for error in &self.errors {
            if !fields.contains(&error.field.as_str()) {
                fields.push(error.field.as_str());
            }
        }
        fields
    }

    fn push(&mut self, field: &str, message: &str) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub(crate) fn extend(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }
}

/// Declarative constraint attached to a single field.
#[derive(Debug, Clone)]
pub enum FieldRule {
    Required { message: String },
    MinLength { min: usize, message: String },
    MaxLength { max: usize, message: String },
    Pattern { regex: Regex, message: String },
    OneOf { options: Vec<String>, message: String },
    MustBeTrue { message: String },
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: String,
    rules: Vec<FieldRule>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rule(mut self, rule: FieldRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn required(self, message: impl Into<String>) -> Self {
        self.rule(FieldRule::Required {
            message: message.into(),
        })
    }

    pub fn min_length(self, min: usize, message: impl Into<String>) -> Self {
        self.rule(FieldRule::MinLength {
            min,
            message: message.into(),
        })
    }

    pub fn max_length(self, max: usize, message: impl Into<String>) -> Self {
        self.rule(FieldRule::MaxLength {
            max,
            message: message.into(),
        })
    }

    pub fn email(self, message: impl Into<String>) -> Self {
        self.rule(FieldRule::Pattern {
            regex: email_regex().clone(),
            message: message.into(),
        })
    }

    pub fn phone(self, message: impl Into<String>) -> Self {
        self.rule(FieldRule::Pattern {
            regex: phone_regex().clone(),
            message: message.into(),
        })
    }

    pub fn one_of(self, options: &[&str], message: impl Into<String>) -> Self {
        self.rule(FieldRule::OneOf {
            options: options.iter().map(|option| option.to_string()).collect(),
            message: message.into(),
        })
    }

    pub fn must_be_true(self, message: impl Into<String>) -> Self {
        self.rule(FieldRule::MustBeTrue {
            message: message.into(),
        })
    }

    fn check(&self, draft: &FormDraft, result: &mut ValidationResult) {
        let value = draft.get(&self.name).filter(|value| !value.is_blank());

        let Some(value) = value else {
            // Format rules only apply to values that were filled in.
            for rule in &self.rules {
                match rule {
                    FieldRule::Required { message } | FieldRule::MustBeTrue { message } => {
                        result.push(&self.name, message)
                    }
                    _ => {}
                }
            }
            return;
        };

        let text = value.as_text();
        let text = text.trim();
        for rule in &self.rules {
            let failed = match rule {
                FieldRule::Required { .. } => None,
                FieldRule::MinLength { min, message } => {
                    (text.chars().count() < *min).then_some(message)
                }
                FieldRule::MaxLength { max, message } => {
                    (text.chars().count() > *max).then_some(message)
                }
                FieldRule::Pattern { regex, message } => (!regex.is_match(text)).then_some(message),
                FieldRule::OneOf { options, message } => {
                    (!options.iter().any(|option| option == text)).then_some(message)
                }
                FieldRule::MustBeTrue { message } => (!value.is_true()).then_some(message),
            };
            if let Some(message) = failed {
                result.push(&self.name, message);
            }
        }
    }
}

/// Rule reading several fields whose error surfaces under one of them.
#[derive(Debug, Clone)]
pub enum Refinement {
    /// When `field` equals `equals`, at least one of `any_of` must be filled in.
    RequireAnyWhen {
        field: String,
        equals: String,
        any_of: Vec<String>,
        report_on: String,
        message: String,
    },
}

impl Refinement {
    pub fn require_any_when(
        field: &str,
        equals: &str,
        any_of: &[&str],
        report_on: &str,
        message: impl Into<String>,
    ) -> Self {
        Refinement::RequireAnyWhen {
            field: field.to_string(),
            equals: equals.to_string(),
            any_of: any_of.iter().map(|name| name.to_string()).collect(),
            report_on: report_on.to_string(),
            message: message.into(),
        }
    }

    fn check(&self, draft: &FormDraft, result: &mut ValidationResult) {
        match self {
            Refinement::RequireAnyWhen {
                field,
                equals,
                any_of,
                report_on,
                message,
            } => {
                let applies = draft.text(field).is_some_and(|value| value == *equals);
                let satisfied = any_of.iter().any(|name| draft.text(name).is_some());
                if applies && !satisfied {
                    result.push(report_on, message);
                }
            }
        }
    }
}

/// Limits applied to files attached to a submission.
#[derive(Debug, Clone)]
pub struct AttachmentPolicy {
    pub max_files: usize,
    pub max_bytes: usize,
    pub allowed_types: Vec<mime::Mime>,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            max_files: 5,
            max_bytes: 10 * 1024 * 1024,
            allowed_types: vec![mime::APPLICATION_PDF, mime::IMAGE_JPEG, mime::IMAGE_PNG],
        }
    }
}

impl AttachmentPolicy {
    pub fn check(&self, attachments: &[Attachment]) -> Vec<String> {
        let mut problems = Vec::new();
        if attachments.len() > self.max_files {
            problems.push(format!(
                "At most {} files can be attached",
                self.max_files
            ));
        }
        for attachment in attachments {
            if attachment.size() > self.max_bytes {
                problems.push(format!(
                    "{} is larger than {} MB",
                    attachment.file_name,
                    self.max_bytes / (1024 * 1024)
                ));
            }
            if !self.allows(&attachment.content_type) {
                problems.push(format!(
                    "{} has an unsupported file type ({})",
                    attachment.file_name, attachment.content_type
                ));
            }
        }
        problems
    }

    fn allows(&self, content_type: &str) -> bool {
        let Ok(parsed) = content_type.parse::<mime::Mime>() else {
            return false;
        };
        // Browsers still report the legacy image/jpg alias.
        let essence = match parsed.essence_str() {
            "image/jpg" => "image/jpeg",
            other => other,
        };
        self.allowed_types
            .iter()
            .any(|allowed| allowed.essence_str() == essence)
    }
}

/// Validation schema of one form: field rules, cross-field refinements and attachment limits.
#[derive(Debug, Clone, Default)]
pub struct FormSchema {
    fields: Vec<FieldSpec>,
    refinements: Vec<Refinement>,
    attachments: Option<AttachmentPolicy>,
}

impl FormSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn refine(mut self, refinement: Refinement) -> Self {
        self.refinements.push(refinement);
        self
    }

    pub fn attachments(mut self, policy: AttachmentPolicy) -> Self {
        self.attachments = Some(policy);
        self
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(FieldSpec::name).collect()
    }

    pub fn accepts_attachments(&self) -> bool {
        self.attachments.is_some()
    }

    /// Check the draft against every field rule and refinement. Pure; never fails.
    ///
    /// Errors are ordered by field declaration, so a refinement error lands in the slot of
    /// the field it reports on.
    pub fn validate(&self, draft: &FormDraft) -> ValidationResult {
        let mut result = ValidationResult::default();
        for field in &self.fields {
            field.check(draft, &mut result);
        }
        for refinement in &self.refinements {
            refinement.check(draft, &mut result);
        }

        let order: HashMap<&str, usize> = self
            .fields
            .iter()
            .enumerate()
            .map(|(index, field)| (field.name(), index))
            .collect();
        result
            .errors
            .sort_by_key(|error| order.get(error.field.as_str()).copied().unwrap_or(usize::MAX));
        result
    }

    pub fn validate_attachments(&self, attachments: &[Attachment]) -> ValidationResult {
        let mut result = ValidationResult::default();
        if attachments.is_empty() {
            return result;
        }
        match &self.attachments {
            Some(policy) => {
                for problem in policy.check(attachments) {
                    result.push(ATTACHMENTS_FIELD, &problem);
                }
            }
            None => result.push(ATTACHMENTS_FIELD, "This form does not accept attachments"),
        }
        result
    }

    /// Draft and attachment checks combined.
    pub fn validate_submission(
        &self,
        draft: &FormDraft,
        attachments: &[Attachment],
    ) -> ValidationResult {
        let mut result = self.validate(draft);
        result.extend(self.validate_attachments(attachments));
        result
    }
}
