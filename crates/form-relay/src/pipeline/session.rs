use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::account::{AccountValidationState, AccountWatcher};
use super::draft::{Attachment, FieldValue, FormDraft};
use super::orchestrator::{SubmissionOrchestrator, SubmissionOutcome};
use super::status::{render, DisplayState};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("a submission is already in progress")]
    SubmissionInFlight,
}

#[derive(Debug, Default)]
struct SessionState {
    draft: FormDraft,
    attachments: Vec<Attachment>,
    outcome: Option<SubmissionOutcome>,
}

/// One form instance: its draft, attachments, account watcher and last outcome.
#[derive(Debug)]
pub struct FormSession {
    orchestrator: Arc<SubmissionOrchestrator>,
    watcher: Option<AccountWatcher>,
    state: Mutex<SessionState>,
    submitting: AtomicBool,
}

/// Clears the in-flight flag even if the submit future is dropped half way.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl FormSession {
    pub fn new(orchestrator: Arc<SubmissionOrchestrator>, watcher: Option<AccountWatcher>) -> Self {
        Self {
            orchestrator,
            watcher,
            state: Mutex::new(SessionState::default()),
            submitting: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().expect("form session mutex poisoned")
    }

    fn account_field(&self) -> Option<&str> {
        self.orchestrator
            .spec()
            .account
            .as_ref()
            .map(|requirement| requirement.field.as_str())
    }

    /// Update one field; a change to the customer-number field restarts account verification.
    pub fn set_field(&self, name: &str, value: impl Into<FieldValue>) {
        let value = value.into();
        let text = value.as_text().into_owned();
        self.lock().draft.set(name, value);
        if self.account_field() == Some(name) {
            if let Some(watcher) = &self.watcher {
                watcher.observe(&text);
            }
        }
    }

    pub fn attach(&self, attachment: Attachment) {
        self.lock().attachments.push(attachment);
    }

    pub fn draft(&self) -> FormDraft {
        self.lock().draft.clone()
    }

    pub fn attachments(&self) -> Vec<Attachment> {
        self.lock().attachments.clone()
    }

    pub fn last_outcome(&self) -> Option<SubmissionOutcome> {
        self.lock().outcome.clone()
    }

    pub fn account_state(&self) -> AccountValidationState {
        self.watcher
            .as_ref()
            .map(AccountWatcher::current)
            .unwrap_or_default()
    }

    /// Verify the current customer number without waiting for the debounce window.
    pub async fn verify_account(&self) -> Option<AccountValidationState> {
        let watcher = self.watcher.as_ref()?;
        let value = self
            .account_field()
            .and_then(|field| self.lock().draft.text(field))
            .unwrap_or_default();
        Some(watcher.validate_now(&value).await)
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::SeqCst)
    }

    /// Run the pipeline on the current draft. A second call while one is running is refused.
    ///
    /// Success clears the submitted draft and attachments along with the account state;
    /// anything edited while the request was in flight is kept. Failure keeps everything so
    /// the user can retry without retyping.
    pub async fn submit(&self) -> Result<SubmissionOutcome, SessionError> {
        if self
            .submitting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("ignoring submit while another is in flight");
            return Err(SessionError::SubmissionInFlight);
        }
        let _in_flight = InFlight(&self.submitting);

        let (draft, attachments) = {
            let state = self.lock();
            (state.draft.clone(), state.attachments.clone())
        };
        let account = self.account_state();
        let outcome = self
            .orchestrator
            .submit(&draft, &attachments, &account)
            .await;

        let mut state = self.lock();
        if outcome.success {
            if state.draft == draft {
                state.draft.clear();
                if let Some(watcher) = &self.watcher {
                    watcher.reset();
                }
            } else {
                debug!("keeping draft edited while the submission was in flight");
            }
            if state.attachments == attachments {
                state.attachments.clear();
            }
        }
        state.outcome = Some(outcome.clone());
        Ok(outcome)
    }

    pub fn display(&self) -> DisplayState {
        render(self.lock().outcome.as_ref(), self.is_submitting())
    }
}
