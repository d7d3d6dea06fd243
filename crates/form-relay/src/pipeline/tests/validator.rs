use super::common::*;
use crate::pipeline::{
    Attachment, AttachmentPolicy, FieldSpec, FormDraft, FormSchema, ATTACHMENTS_FIELD,
};

#[test]
fn reports_required_and_length_errors_in_field_order() {
    let draft = FormDraft::new()
        .with("name", "")
        .with("email", "a@b.com")
        .with("message", "short");

    let result = contact_schema().validate(&draft);

    assert!(!result.is_valid());
    assert_eq!(result.fields(), vec!["name", "message"]);
    assert_eq!(result.for_field("name"), vec!["Name is required"]);
    assert_eq!(
        result.for_field("message"),
        vec!["Message must be at least 10 characters"]
    );
}

#[test]
fn missing_fields_get_one_message_each() {
    let result = contact_schema().validate(&FormDraft::new());

    assert_eq!(
        result.messages(),
        vec!["Name is required", "Email is required", "Message is required"]
    );
}

#[test]
fn valid_draft_has_no_errors() {
    assert!(contact_schema().validate(&contact_draft()).is_valid());
}

#[test]
fn format_rules_run_only_on_filled_in_values() {
    let schema = FormSchema::new().field(FieldSpec::new("phone").phone("Invalid phone number"));

    assert!(schema.validate(&FormDraft::new().with("phone", "  ")).is_valid());
    assert!(schema
        .validate(&FormDraft::new().with("phone", "+46 701234567"))
        .is_valid());
    assert_eq!(
        schema
            .validate(&FormDraft::new().with("phone", "call me"))
            .for_field("phone"),
        vec!["Invalid phone number"]
    );
}

#[test]
fn email_format_is_checked_independently_of_presence() {
    let draft = contact_draft().with("email", "not-an-email");

    let result = contact_schema().validate(&draft);

    assert_eq!(
        result.for_field("email"),
        vec!["Please enter a valid email address"]
    );
}

#[test]
fn length_rules_count_characters_not_bytes() {
    let schema =
        FormSchema::new().field(FieldSpec::new("name").max_length(3, "Name is too long"));

    assert!(schema.validate(&FormDraft::new().with("name", "Åsa")).is_valid());
}

#[test]
fn cross_field_rule_surfaces_under_the_named_field() {
    let draft = support_draft().with("serialNumber", "");

    let result = support_schema().validate(&draft);

    assert_eq!(result.fields(), vec!["productCode"]);
    assert_eq!(
        result.for_field("productCode"),
        vec!["Product code or serial number is required for technical support"]
    );
}

#[test]
fn cross_field_rule_only_applies_to_matching_category() {
    let draft = support_draft()
        .with("serialNumber", "")
        .with("supportType", "warranty");

    assert!(support_schema().validate(&draft).is_valid());
}

#[test]
fn refinement_errors_keep_declaration_order() {
    let draft = support_draft()
        .with("serialNumber", "")
        .with("subject", "");

    let result = support_schema().validate(&draft);

    assert_eq!(result.fields(), vec!["productCode", "subject"]);
}

#[test]
fn one_of_rejects_unknown_choices() {
    let draft = support_draft().with("supportType", "billing");

    let result = support_schema().validate(&draft);

    assert_eq!(
        result.for_field("supportType"),
        vec!["Please choose a support type"]
    );
}

#[test]
fn consent_must_be_true() {
    let schema = FormSchema::new().field(
        FieldSpec::new("consent").must_be_true("You must accept the privacy policy"),
    );

    assert!(!schema.validate(&FormDraft::new()).is_valid());
    assert!(!schema
        .validate(&FormDraft::new().with("consent", false))
        .is_valid());
    assert!(schema
        .validate(&FormDraft::new().with("consent", true))
        .is_valid());
}

#[test]
fn attachment_policy_flags_size_type_and_count() {
    let policy = AttachmentPolicy {
        max_files: 2,
        ..AttachmentPolicy::default()
    };
    let schema = FormSchema::new().attachments(policy);
    let files = vec![
        Attachment::new("invoice.pdf", "application/pdf", vec![0; 4]),
        Attachment::new("photo.png", "image/png", vec![0; 10 * 1024 * 1024 + 1]),
        Attachment::new("notes.exe", "application/x-msdownload", vec![0; 4]),
    ];

    let result = schema.validate_attachments(&files);

    assert_eq!(
        result.for_field(ATTACHMENTS_FIELD),
        vec![
            "At most 2 files can be attached",
            "photo.png is larger than 10 MB",
            "notes.exe has an unsupported file type (application/x-msdownload)",
        ]
    );
}

#[test]
fn legacy_jpg_content_type_is_accepted() {
    let schema = FormSchema::new().attachments(AttachmentPolicy::default());
    let files = vec![Attachment::new("scan.jpg", "image/jpg", vec![1, 2, 3])];

    assert!(schema.validate_attachments(&files).is_valid());
}

#[test]
fn forms_without_a_policy_refuse_attachments() {
    let result = contact_schema().validate_submission(&contact_draft(), &[pdf("a.pdf")]);

    assert_eq!(
        result.for_field(ATTACHMENTS_FIELD),
        vec!["This form does not accept attachments"]
    );
}
