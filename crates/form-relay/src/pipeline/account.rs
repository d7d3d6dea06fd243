//! Customer/account verification.
//!
//! [`AccountValidator`] walks an ordered chain of remote [`AccountSource`]s and falls back to a
//! local format check only when none of them answered. [`AccountWatcher`] wraps it in a
//! debounced state machine where the most recently *started* validation is the only one
//! allowed to publish its result.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use super::http::{RequestSpec, RetryClient, RetryPolicy};
use crate::config::ApiKey;
use crate::telemetry::{TelemetryEvent, TelemetrySink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Idle,
    Validating,
    Valid,
    Invalid,
}

/// How much a `valid` result can be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verification {
    /// Confirmed by the named remote system.
    Authoritative { source: String },
    /// Only the local format check passed; no remote system was reachable.
    FormatOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountValidationState {
    pub status: AccountStatus,
    pub identifier: Option<String>,
    pub account_id: Option<String>,
    pub message: Option<String>,
    pub verification: Option<Verification>,
}

impl Default for AccountValidationState {
    fn default() -> Self {
        Self::idle()
    }
}

impl AccountValidationState {
    pub fn idle() -> Self {
        Self {
            status: AccountStatus::Idle,
            identifier: None,
            account_id: None,
            message: None,
            verification: None,
        }
    }

    pub fn validating(identifier: &str) -> Self {
        Self {
            status: AccountStatus::Validating,
            identifier: Some(identifier.to_string()),
            ..Self::idle()
        }
    }

    pub fn valid(
        identifier: &str,
        account_id: impl Into<String>,
        message: impl Into<String>,
        verification: Verification,
    ) -> Self {
        Self {
            status: AccountStatus::Valid,
            identifier: Some(identifier.to_string()),
            account_id: Some(account_id.into()),
            message: Some(message.into()),
            verification: Some(verification),
        }
    }

    pub fn invalid(identifier: &str, message: impl Into<String>) -> Self {
        Self {
            status: AccountStatus::Invalid,
            identifier: Some(identifier.to_string()),
            message: Some(message.into()),
            ..Self::idle()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == AccountStatus::Valid
    }

    pub fn is_verified(&self) -> bool {
        self.is_valid() && matches!(self.verification, Some(Verification::Authoritative { .. }))
    }
}

/// Canonical identifier shape, shared by every form that verifies a customer number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierPolicy {
    pub min_len: usize,
    pub max_len: usize,
}

impl Default for IdentifierPolicy {
    fn default() -> Self {
        Self {
            min_len: 3,
            max_len: 20,
        }
    }
}

impl IdentifierPolicy {
    pub fn is_long_enough(&self, identifier: &str) -> bool {
        identifier.trim().chars().count() >= self.min_len
    }

    /// Offline approximation of a customer number: ASCII letters and digits within bounds.
    pub fn check_format(&self, identifier: &str) -> Result<(), String> {
        let identifier = identifier.trim();
        let length = identifier.chars().count();
        if length < self.min_len {
            return Err(format!(
                "Customer number \"{identifier}\" is too short (minimum {} characters)",
                self.min_len
            ));
        }
        if length > self.max_len {
            return Err(format!(
                "Customer number \"{identifier}\" is too long (maximum {} characters)",
                self.max_len
            ));
        }
        if !identifier.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!(
                "Customer number \"{identifier}\" contains invalid characters (letters and digits only)"
            ));
        }
        Ok(())
    }
}

/// Definitive answer from a remote source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountLookup {
    Found {
        account_id: String,
        message: Option<String>,
    },
    NotFound {
        message: Option<String>,
    },
}

/// The source could not give an answer; the chain moves on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{source_name} unavailable: {reason}")]
pub struct SourceUnavailable {
    pub source_name: String,
    pub reason: String,
}

impl SourceUnavailable {
    fn new(source_name: &str, reason: impl ToString) -> Self {
        Self {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
pub trait AccountSource: Send + Sync + Debug {
    fn name(&self) -> &str;

    async fn lookup(&self, identifier: &str) -> Result<AccountLookup, SourceUnavailable>;
}

#[derive(Debug, Deserialize)]
struct PrimaryLookupResponse {
    #[serde(default)]
    valid: bool,
    account_id: Option<String>,
    message: Option<String>,
}

/// Authoritative account lookup: `GET {base}/validate-customer?customer_number=&customer_code=`.
#[derive(Debug, Clone)]
pub struct PrimaryAccountApi {
    client: RetryClient,
    base_url: String,
    customer_code: String,
    api_key: Option<ApiKey>,
    retry: RetryPolicy,
}

impl PrimaryAccountApi {
    pub fn new(
        client: RetryClient,
        base_url: impl Into<String>,
        customer_code: impl Into<String>,
        api_key: Option<ApiKey>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            customer_code: customer_code.into(),
            api_key,
            retry: RetryPolicy::single_attempt(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl AccountSource for PrimaryAccountApi {
    fn name(&self) -> &str {
        "account-api"
    }

    async fn lookup(&self, identifier: &str) -> Result<AccountLookup, SourceUnavailable> {
        let request = RequestSpec::get(format!("{}/validate-customer", self.base_url))
            .query("customer_number", identifier)
            .query("customer_code", self.customer_code.as_str())
            .api_key(self.api_key.as_ref());
        let response = self
            .client
            .request_with_retry(&request, &self.retry)
            .await
            .map_err(|err| SourceUnavailable::new(self.name(), err))?;
        let body: PrimaryLookupResponse = response
            .json()
            .map_err(|err| SourceUnavailable::new(self.name(), err))?;

        Ok(match (body.valid, body.account_id) {
            (true, Some(account_id)) if !account_id.is_empty() => AccountLookup::Found {
                account_id,
                message: body.message,
            },
            _ => AccountLookup::NotFound {
                message: body.message,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FallbackLookupResponse {
    #[serde(default)]
    valid: bool,
    account_id: Option<String>,
    message: Option<String>,
}

/// Secondary validation service: `POST {url}` with `{"customerNumber": ...}`.
#[derive(Debug, Clone)]
pub struct FallbackAccountApi {
    client: RetryClient,
    url: String,
    retry: RetryPolicy,
}

impl FallbackAccountApi {
    pub fn new(client: RetryClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            retry: RetryPolicy::single_attempt(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl AccountSource for FallbackAccountApi {
    fn name(&self) -> &str {
        "fallback-validation"
    }

    async fn lookup(&self, identifier: &str) -> Result<AccountLookup, SourceUnavailable> {
        let request = RequestSpec::post_json(
            self.url.clone(),
            json!({ "customerNumber": identifier }),
        );
        let response = self
            .client
            .request_with_retry(&request, &self.retry)
            .await
            .map_err(|err| SourceUnavailable::new(self.name(), err))?;
        let body: FallbackLookupResponse = response
            .json()
            .map_err(|err| SourceUnavailable::new(self.name(), err))?;

        Ok(if body.valid {
            AccountLookup::Found {
                account_id: body
                    .account_id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| identifier.to_string()),
                message: body.message,
            }
        } else {
            AccountLookup::NotFound {
                message: body.message,
            }
        })
    }
}

/// Ordered multi-source check of one identifier.
#[derive(Debug, Clone)]
pub struct AccountValidator {
    sources: Vec<Arc<dyn AccountSource>>,
    policy: IdentifierPolicy,
    telemetry: Arc<dyn TelemetrySink>,
}

impl AccountValidator {
    pub fn new(
        sources: Vec<Arc<dyn AccountSource>>,
        policy: IdentifierPolicy,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            sources,
            policy,
            telemetry,
        }
    }

    pub fn policy(&self) -> &IdentifierPolicy {
        &self.policy
    }

    /// Resolve `value` to `valid`, `invalid` or, for identifiers below the minimum length,
    /// `idle` without touching the network.
    ///
    /// A remote `NotFound` is remembered while later sources are still consulted; an
    /// unavailable source is reported to telemetry and skipped. The local format check only
    /// decides when no remote source answered.
    #[instrument(skip(self), fields(sources = self.sources.len()))]
    pub async fn validate_identifier(&self, value: &str) -> AccountValidationState {
        let identifier = value.trim();
        if !self.policy.is_long_enough(identifier) {
            return AccountValidationState::idle();
        }

        let mut rejection: Option<Option<String>> = None;
        for source in &self.sources {
            match source.lookup(identifier).await {
                Ok(AccountLookup::Found {
                    account_id,
                    message,
                }) => {
                    debug!(source = source.name(), "identifier confirmed");
                    let message = message.unwrap_or_else(|| {
                        format!("Customer number {identifier} verified via {}", source.name())
                    });
                    return AccountValidationState::valid(
                        identifier,
                        account_id,
                        message,
                        Verification::Authoritative {
                            source: source.name().to_string(),
                        },
                    );
                }
                Ok(AccountLookup::NotFound { message }) => {
                    debug!(source = source.name(), "identifier not found");
                    if rejection.is_none() {
                        rejection = Some(message);
                    }
                }
                Err(unavailable) => {
                    warn!(%unavailable, "account source unavailable, trying next");
                    self.telemetry.track(&TelemetryEvent::AccountSourceUnavailable {
                        source_name: unavailable.source_name,
                        error: unavailable.reason,
                    });
                }
            }
        }

        if let Some(message) = rejection {
            let message =
                message.unwrap_or_else(|| format!("Customer number {identifier} was not found"));
            return AccountValidationState::invalid(identifier, message);
        }

        match self.policy.check_format(identifier) {
            Ok(()) => AccountValidationState::valid(
                identifier,
                identifier,
                format!(
                    "Customer number {identifier} has a valid format but could not be verified"
                ),
                Verification::FormatOnly,
            ),
            Err(message) => AccountValidationState::invalid(identifier, message),
        }
    }
}

/// Debounced, last-started-wins wrapper around an [`AccountValidator`].
///
/// [`observe`](Self::observe) spawns onto the current tokio runtime and must be called from
/// within one.
#[derive(Debug)]
pub struct AccountWatcher {
    validator: Arc<AccountValidator>,
    debounce: Duration,
    state: Arc<watch::Sender<AccountValidationState>>,
    generation: Arc<AtomicU64>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl AccountWatcher {
    pub fn new(validator: AccountValidator, debounce: Duration) -> Self {
        let (state, _) = watch::channel(AccountValidationState::idle());
        Self {
            validator: Arc::new(validator),
            debounce,
            state: Arc::new(state),
            generation: Arc::new(AtomicU64::new(0)),
            timer: Mutex::new(None),
        }
    }

    pub fn current(&self) -> AccountValidationState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AccountValidationState> {
        self.state.subscribe()
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Record a new value of the watched field.
    ///
    /// The state drops back to `idle` immediately; once input has been quiet for the debounce
    /// window it moves to `validating` and the validation result is published unless a newer
    /// value arrived in the meantime.
    pub fn observe(&self, value: &str) {
        let generation = self.supersede();
        self.state.send_replace(AccountValidationState::idle());

        let identifier = value.trim().to_string();
        if !self.validator.policy().is_long_enough(&identifier) {
            return;
        }

        let validator = Arc::clone(&self.validator);
        let state = Arc::clone(&self.state);
        let current = Arc::clone(&self.generation);
        let debounce = self.debounce;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let validating = AccountValidationState::validating(&identifier);
            if !publish(&state, &current, generation, validating) {
                return;
            }
            // Detached so superseding input does not cancel a request already on the wire.
            tokio::spawn(async move {
                let result = validator.validate_identifier(&identifier).await;
                publish(&state, &current, generation, result);
            });
        });
        *self.timer.lock().expect("account timer mutex poisoned") = Some(handle);
    }

    /// Validate `value` right away, skipping the debounce window.
    pub async fn validate_now(&self, value: &str) -> AccountValidationState {
        let generation = self.supersede();
        let identifier = value.trim();
        if !self.validator.policy().is_long_enough(identifier) {
            self.state.send_replace(AccountValidationState::idle());
            return AccountValidationState::idle();
        }
        self.state
            .send_replace(AccountValidationState::validating(identifier));
        let result = self.validator.validate_identifier(identifier).await;
        publish(&self.state, &self.generation, generation, result.clone());
        result
    }

    /// Forget the current value, cancelling any pending timer and ignoring in-flight results.
    pub fn reset(&self) {
        self.supersede();
        self.state.send_replace(AccountValidationState::idle());
    }

    fn supersede(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(timer) = self
            .timer
            .lock()
            .expect("account timer mutex poisoned")
            .take()
        {
            timer.abort();
        }
        generation
    }
}

impl Drop for AccountWatcher {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut timer) = self.timer.lock() {
            if let Some(timer) = timer.take() {
                timer.abort();
            }
        }
    }
}

fn publish(
    state: &watch::Sender<AccountValidationState>,
    current: &AtomicU64,
    generation: u64,
    result: AccountValidationState,
) -> bool {
    let applied = state.send_if_modified(|slot| {
        if current.load(Ordering::SeqCst) != generation {
            return false;
        }
        *slot = result;
        true
    });
    if !applied {
        debug!(generation, "discarding stale account validation state");
    }
    applied
}
