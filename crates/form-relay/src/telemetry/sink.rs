use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

/// Observability events emitted by the submission pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    ApiRetry {
        url: String,
        attempt: u32,
        status: Option<u16>,
        delay: Duration,
    },
    SubmitAttempt {
        form_id: String,
        has_files: bool,
        language: Option<String>,
    },
    SubmitSuccess {
        form_id: String,
        submission_id: Option<String>,
        files_uploaded: usize,
    },
    SubmitError {
        form_id: String,
        error: String,
    },
    FileUploadFailed {
        submission_id: String,
        error: String,
    },
    NotificationDelivered {
        target: String,
        status: u16,
    },
    NotificationFailed {
        target: String,
        error: String,
    },
    AccountSourceUnavailable {
        source_name: String,
        error: String,
    },
}

impl TelemetryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TelemetryEvent::ApiRetry { .. } => "api_retry",
            TelemetryEvent::SubmitAttempt { .. } => "form_submit_attempt",
            TelemetryEvent::SubmitSuccess { .. } => "form_submit_success",
            TelemetryEvent::SubmitError { .. } => "form_submit_error",
            TelemetryEvent::FileUploadFailed { .. } => "file_upload_failed",
            TelemetryEvent::NotificationDelivered { .. } => "notification_delivered",
            TelemetryEvent::NotificationFailed { .. } => "notification_failed",
            TelemetryEvent::AccountSourceUnavailable { .. } => "account_source_unavailable",
        }
    }
}

/// Injectable collaborator receiving pipeline events.
pub trait TelemetrySink: Send + Sync + Debug {
    fn track(&self, event: &TelemetryEvent);
}

/// Forwards every event to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn track(&self, event: &TelemetryEvent) {
        let name = event.name();
        match event {
            TelemetryEvent::ApiRetry {
                url,
                attempt,
                status,
                delay,
            } => warn!(
                kind = name,
                %url,
                attempt,
                status = ?status,
                delay_ms = delay.as_millis() as u64,
                "request failed, retrying"
            ),
            TelemetryEvent::SubmitAttempt {
                form_id,
                has_files,
                language,
            } => info!(kind = name, %form_id, has_files, language = ?language, "submitting form"),
            TelemetryEvent::SubmitSuccess {
                form_id,
                submission_id,
                files_uploaded,
            } => info!(
                kind = name,
                %form_id,
                submission_id = ?submission_id,
                files_uploaded,
                "form submitted"
            ),
            TelemetryEvent::SubmitError { form_id, error } => {
                warn!(kind = name, %form_id, %error, "form submission failed")
            }
            TelemetryEvent::FileUploadFailed {
                submission_id,
                error,
            } => warn!(kind = name, %submission_id, %error, "attachment upload failed"),
            TelemetryEvent::NotificationDelivered { target, status } => {
                info!(kind = name, target_system = %target, status, "downstream system notified")
            }
            TelemetryEvent::NotificationFailed { target, error } => {
                warn!(kind = name, target_system = %target, %error, "downstream notification failed (non-critical)")
            }
            TelemetryEvent::AccountSourceUnavailable { source_name, error } => {
                warn!(kind = name, source = %source_name, %error, "account source unavailable")
            }
        }
    }
}

/// Keeps events in memory so callers can inspect what the pipeline reported.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().expect("telemetry mutex poisoned").clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .expect("telemetry mutex poisoned")
            .iter()
            .map(TelemetryEvent::name)
            .collect()
    }
}

impl TelemetrySink for RecordingSink {
    fn track(&self, event: &TelemetryEvent) {
        self.events
            .lock()
            .expect("telemetry mutex poisoned")
            .push(event.clone());
    }
}
