use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::pipeline::{
    AccountLookup, AccountSource, AccountValidationState, Attachment, AttachmentPolicy,
    FieldSpec, FormDraft, FormSchema, FormsApi, HttpResponse, HttpTransport, PipelineSpec,
    Refinement, RequestSpec, RetryClient, RetryPolicy, SourceUnavailable, SubmissionOrchestrator,
    TransportError, Verification,
};
use crate::telemetry::RecordingSink;

pub(super) const API: &str = "http://forms.test/api";
pub(super) const ACCOUNTS: &str = "http://accounts.test/api/accounts";
pub(super) const FALLBACK: &str = "http://bus.test/esb/validate-customer";

#[derive(Debug, Clone)]
pub(super) enum Reply {
    Respond(HttpResponse),
    Fail(TransportError),
}

#[derive(Debug)]
struct Route {
    pattern: String,
    replies: VecDeque<Reply>,
    delay: Duration,
}

#[derive(Debug, Clone)]
pub(super) struct Recorded {
    pub(super) request: RequestSpec,
    pub(super) at: Instant,
}

/// Answers requests from per-URL scripts; the last reply of a script repeats.
#[derive(Debug, Default)]
pub(super) struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    recorded: Mutex<Vec<Recorded>>,
}

impl ScriptedTransport {
    pub(super) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(super) fn on(&self, pattern: &str, reply: Reply) -> &Self {
        let mut routes = self.routes.lock().expect("routes mutex poisoned");
        match routes.iter_mut().find(|route| route.pattern == pattern) {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(Route {
                pattern: pattern.to_string(),
                replies: VecDeque::from([reply]),
                delay: Duration::ZERO,
            }),
        }
        drop(routes);
        self
    }

    pub(super) fn json(&self, pattern: &str, status: u16, body: Value) -> &Self {
        self.on(pattern, Reply::Respond(HttpResponse::json_body(status, &body)))
    }

    pub(super) fn fail(&self, pattern: &str, error: TransportError) -> &Self {
        self.on(pattern, Reply::Fail(error))
    }

    pub(super) fn delay(&self, pattern: &str, delay: Duration) -> &Self {
        let mut routes = self.routes.lock().expect("routes mutex poisoned");
        if let Some(route) = routes.iter_mut().find(|route| route.pattern == pattern) {
            route.delay = delay;
        }
        drop(routes);
        self
    }

    pub(super) fn recorded(&self) -> Vec<Recorded> {
        self.recorded.lock().expect("recorded mutex poisoned").clone()
    }

    pub(super) fn requests(&self) -> Vec<RequestSpec> {
        self.recorded()
            .into_iter()
            .map(|recorded| recorded.request)
            .collect()
    }

    pub(super) fn requests_to(&self, pattern: &str) -> Vec<RequestSpec> {
        self.requests()
            .into_iter()
            .filter(|request| request.url.contains(pattern))
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &RequestSpec) -> Result<HttpResponse, TransportError> {
        self.recorded
            .lock()
            .expect("recorded mutex poisoned")
            .push(Recorded {
                request: request.clone(),
                at: Instant::now(),
            });

        let scripted = {
            let mut routes = self.routes.lock().expect("routes mutex poisoned");
            routes
                .iter_mut()
                .find(|route| request.url.contains(&route.pattern))
                .and_then(|route| {
                    let reply = if route.replies.len() > 1 {
                        route.replies.pop_front()
                    } else {
                        route.replies.front().cloned()
                    };
                    reply.map(|reply| (reply, route.delay))
                })
        };

        let Some((reply, delay)) = scripted else {
            return Err(TransportError::Connect(format!("no route to {}", request.url)));
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match reply {
            Reply::Respond(response) => Ok(response),
            Reply::Fail(error) => Err(error),
        }
    }
}

pub(super) fn retry_client(transport: Arc<ScriptedTransport>) -> (RetryClient, RecordingSink) {
    let sink = RecordingSink::default();
    let client = RetryClient::new(transport, Arc::new(sink.clone()));
    (client, sink)
}

pub(super) fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        base_delay: Duration::from_millis(10),
        ..RetryPolicy::default()
    }
}

pub(super) fn contact_schema() -> FormSchema {
    FormSchema::new()
        .field(
            FieldSpec::new("name")
                .required("Name is required")
                .min_length(2, "Name must be at least 2 characters"),
        )
        .field(
            FieldSpec::new("email")
                .required("Email is required")
                .email("Please enter a valid email address"),
        )
        .field(
            FieldSpec::new("message")
                .required("Message is required")
                .min_length(10, "Message must be at least 10 characters"),
        )
}

pub(super) fn support_schema() -> FormSchema {
    FormSchema::new()
        .field(FieldSpec::new("customerNumber").required("Customer number is required"))
        .field(
            FieldSpec::new("email")
                .required("Email is required")
                .email("Please enter a valid email address"),
        )
        .field(FieldSpec::new("supportType").one_of(
            &["technical", "warranty", "other"],
            "Please choose a support type",
        ))
        .field(FieldSpec::new("productCode"))
        .field(FieldSpec::new("serialNumber"))
        .field(FieldSpec::new("subject").required("Subject is required"))
        .refine(Refinement::require_any_when(
            "supportType",
            "technical",
            &["productCode", "serialNumber"],
            "productCode",
            "Product code or serial number is required for technical support",
        ))
        .attachments(AttachmentPolicy::default())
}

pub(super) fn contact_draft() -> FormDraft {
    FormDraft::new()
        .with("name", "Ada Lovelace")
        .with("email", "ada@example.com")
        .with("message", "The analytical engine is making a noise.")
}

pub(super) fn support_draft() -> FormDraft {
    FormDraft::new()
        .with("customerNumber", "1411768")
        .with("email", "buyer@example.com")
        .with("supportType", "technical")
        .with("serialNumber", "SN-99812")
        .with("subject", "Mower will not start")
}

pub(super) fn pdf(name: &str) -> Attachment {
    Attachment::new(name, "application/pdf", b"%PDF-1.7 test".to_vec())
}

pub(super) fn verified(identifier: &str) -> AccountValidationState {
    AccountValidationState::valid(
        identifier,
        "acc-0001",
        "verified",
        Verification::Authoritative {
            source: "account-api".to_string(),
        },
    )
}

pub(super) fn orchestrator(
    transport: Arc<ScriptedTransport>,
    spec: PipelineSpec,
) -> (SubmissionOrchestrator, RecordingSink) {
    let (client, sink) = retry_client(transport);
    let orchestrator = SubmissionOrchestrator::new(spec, FormsApi::new(API, None), client);
    (orchestrator, sink)
}

pub(super) fn submitted(id: &str) -> Value {
    json!({ "success": true, "submission": { "id": id } })
}

/// Account source answering from a fixed table after an optional delay.
#[derive(Debug, Default)]
pub(super) struct FakeSource {
    name: String,
    answers: HashMap<String, (Duration, AccountLookup)>,
    unavailable: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeSource {
    pub(super) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub(super) fn unavailable(name: &str) -> Self {
        Self {
            unavailable: true,
            ..Self::new(name)
        }
    }

    pub(super) fn knows(mut self, identifier: &str, account_id: &str, delay: Duration) -> Self {
        self.answers.insert(
            identifier.to_string(),
            (
                delay,
                AccountLookup::Found {
                    account_id: account_id.to_string(),
                    message: None,
                },
            ),
        );
        self
    }

    pub(super) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }
}

#[async_trait]
impl AccountSource for FakeSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, identifier: &str) -> Result<AccountLookup, SourceUnavailable> {
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .push(identifier.to_string());
        if self.unavailable {
            return Err(SourceUnavailable {
                source_name: self.name.clone(),
                reason: "offline".to_string(),
            });
        }
        match self.answers.get(identifier) {
            Some((delay, answer)) => {
                tokio::time::sleep(*delay).await;
                Ok(answer.clone())
            }
            None => Ok(AccountLookup::NotFound { message: None }),
        }
    }
}
