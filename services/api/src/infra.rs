use form_relay::error::AppError;
use form_relay::forms::FormKind;
use form_relay::pipeline::{Attachment, FieldValue, FormDraft};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn parse_form(raw: &str) -> Result<FormKind, String> {
    raw.parse::<FormKind>().map_err(|err| err.to_string())
}

/// Read a draft from a JSON object of field names to strings, numbers or booleans.
/// `null` fields are left out.
pub(crate) fn load_draft(path: &Path) -> Result<FormDraft, AppError> {
    let raw = std::fs::read_to_string(path)?;
    draft_from_json(&raw).map_err(|source| AppError::Draft {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn draft_from_json(raw: &str) -> Result<FormDraft, serde_json::Error> {
    let fields: serde_json::Map<String, Value> = serde_json::from_str(raw)?;
    let mut draft = FormDraft::new();
    for (name, value) in fields {
        let value = match value {
            Value::Null => continue,
            Value::Bool(flag) => FieldValue::Flag(flag),
            Value::String(text) => FieldValue::Text(text),
            other => FieldValue::Text(other.to_string()),
        };
        draft.set(name, value);
    }
    Ok(draft)
}

/// Read a file to attach; the content type is guessed from the extension.
pub(crate) fn load_attachment(path: &Path) -> Result<Attachment, AppError> {
    let bytes = std::fs::read(path).map_err(|source| AppError::Attachment {
        path: path.to_path_buf(),
        source,
    })?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    let content_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    Ok(Attachment::new(file_name, content_type, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_file(name: &str, contents: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("form-relay-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        let path = dir.join(name);
        std::fs::write(&path, contents).expect("write scratch file");
        path
    }

    #[test]
    fn drafts_accept_scalars_and_skip_nulls() {
        let draft = draft_from_json(
            r#"{ "name": "Ada", "consent": true, "quantity": 3, "company": null }"#,
        )
        .expect("draft parses");

        assert_eq!(draft.text("name").as_deref(), Some("Ada"));
        assert_eq!(draft.get("consent"), Some(&FieldValue::Flag(true)));
        assert_eq!(draft.text("quantity").as_deref(), Some("3"));
        assert!(draft.get("company").is_none());
    }

    #[test]
    fn drafts_must_be_objects() {
        assert!(draft_from_json(r#"["name", "Ada"]"#).is_err());
    }

    #[test]
    fn draft_errors_name_the_file() {
        let path = scratch_file("broken.json", b"{ not json");

        let err = load_draft(&path).expect_err("invalid json rejected");

        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn attachment_types_come_from_the_extension() {
        let path = scratch_file("receipt.pdf", b"%PDF-1.7");

        let attachment = load_attachment(&path).expect("attachment loads");

        assert_eq!(attachment.file_name, "receipt.pdf");
        assert_eq!(attachment.content_type, "application/pdf");
        assert_eq!(attachment.size(), 8);
    }

    #[test]
    fn form_names_are_parsed_for_clap() {
        assert_eq!(parse_form("b2c-returns"), Ok(FormKind::B2cReturns));
        assert!(parse_form("survey").is_err_and(|err| err.contains("survey")));
    }
}
