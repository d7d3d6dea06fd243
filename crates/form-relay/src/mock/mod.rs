//! In-memory stand-in for the forms API, the account lookup services, the message bus and the
//! case service. Used by the `serve-mock` command and the end-to-end tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::forms::FormKind;
use crate::pipeline::UPLOAD_FIELD;

const UPLOAD_BODY_LIMIT: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MockBackendError {
    #[error("Form template '{0}' not found")]
    UnknownForm(String),
    #[error("Submission '{0}' not found")]
    UnknownSubmission(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("Injected failure")]
    Injected(StatusCode),
}

impl IntoResponse for MockBackendError {
    fn into_response(self) -> Response {
        let status = match &self {
            MockBackendError::UnknownForm(_) | MockBackendError::UnknownSubmission(_) => {
                StatusCode::NOT_FOUND
            }
            MockBackendError::BadRequest(_) => StatusCode::BAD_REQUEST,
            MockBackendError::Injected(status) => *status,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredFile {
    pub file_name: String,
    pub content_type: String,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredSubmission {
    pub id: String,
    pub form_id: String,
    pub data: Value,
    pub metadata: Value,
    pub files: Vec<StoredFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusMessage {
    pub flow: String,
    pub payload: Value,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    submissions: HashMap<String, StoredSubmission>,
    customers: HashMap<(String, String), String>,
    bus: Vec<BusMessage>,
    cases: Vec<Value>,
    submit_failures: VecDeque<StatusCode>,
    rejected_files: Vec<String>,
}

/// Shared handle to the mock's state; clones see the same data.
#[derive(Debug, Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::empty()
            .with_customer("DOJ", "1411768", "0f8fad5b-d9cb-469f-a165-70867728950e")
            .with_customer("DOJ", "123456", "7c9e6679-7425-40de-944b-e07fc1f90ae7")
            .with_customer("DOJ", "999999", "a3bb189e-8bf9-3888-9912-ace4e6543002")
    }
}

impl MockBackend {
    /// Backend without any known customers.
    pub fn empty() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn with_customer(self, customer_code: &str, number: &str, account_id: &str) -> Self {
        self.lock().customers.insert(
            (customer_code.to_string(), number.to_string()),
            account_id.to_string(),
        );
        self
    }

    /// Answer the next `count` submissions with `status` before accepting again.
    pub fn fail_next_submissions(&self, count: usize, status: StatusCode) {
        let mut state = self.lock();
        state.submit_failures.extend(std::iter::repeat(status).take(count));
    }

    /// Report uploads of `file_name` as failed.
    pub fn reject_file(&self, file_name: &str) {
        self.lock().rejected_files.push(file_name.to_string());
    }

    pub fn submission(&self, id: &str) -> Option<StoredSubmission> {
        self.lock().submissions.get(id).cloned()
    }

    pub fn submissions(&self) -> Vec<StoredSubmission> {
        let mut submissions: Vec<_> = self.lock().submissions.values().cloned().collect();
        submissions.sort_by(|a, b| a.id.cmp(&b.id));
        submissions
    }

    pub fn bus_messages(&self) -> Vec<BusMessage> {
        self.lock().bus.clone()
    }

    pub fn cases(&self) -> Vec<Value> {
        self.lock().cases.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock backend mutex poisoned")
    }

    fn account_for(&self, customer_code: &str, number: &str) -> Option<String> {
        let state = self.lock();
        match customer_code {
            "" => state
                .customers
                .iter()
                .find(|((_, known), _)| known == number)
                .map(|(_, account_id)| account_id.clone()),
            code => state
                .customers
                .get(&(code.to_string(), number.to_string()))
                .cloned(),
        }
    }
}

/// Router serving every endpoint the pipeline talks to.
pub fn mock_backend_router(backend: MockBackend) -> Router {
    Router::new()
        .route("/api/templates/:form_id/submit", post(submit_form))
        .route("/api/submissions/:submission_id", get(show_submission))
        .route(
            "/api/files/upload/:submission_id",
            post(upload_files).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/api/accounts/validate-customer", get(validate_customer))
        .route("/esb/validate-customer", post(validate_customer_fallback))
        .route("/esb/:flow", post(publish_to_bus))
        .route("/cases", post(create_case))
        .with_state(backend)
}

#[derive(Debug, Deserialize)]
struct SubmitBody {
    data: Value,
    #[serde(default)]
    metadata: Value,
}

async fn submit_form(
    State(backend): State<MockBackend>,
    Path(form_id): Path<String>,
    Json(body): Json<SubmitBody>,
) -> Result<Json<Value>, MockBackendError> {
    if form_id.parse::<FormKind>().is_err() {
        return Err(MockBackendError::UnknownForm(form_id));
    }
    if !body.data.is_object() {
        return Err(MockBackendError::BadRequest(
            "Submission data must be an object".to_string(),
        ));
    }

    let mut state = backend.lock();
    if let Some(status) = state.submit_failures.pop_front() {
        debug!(%form_id, %status, "injecting submission failure");
        return Err(MockBackendError::Injected(status));
    }
    state.next_id += 1;
    let id = format!("sub-{:06}", state.next_id);
    state.submissions.insert(
        id.clone(),
        StoredSubmission {
            id: id.clone(),
            form_id: form_id.clone(),
            data: body.data,
            metadata: body.metadata,
            files: Vec::new(),
        },
    );
    info!(%form_id, submission_id = %id, "mock submission stored");

    Ok(Json(json!({
        "success": true,
        "submission": { "id": id, "form_id": form_id, "status": "received" },
    })))
}

async fn show_submission(
    State(backend): State<MockBackend>,
    Path(submission_id): Path<String>,
) -> Result<Json<StoredSubmission>, MockBackendError> {
    backend
        .submission(&submission_id)
        .map(Json)
        .ok_or(MockBackendError::UnknownSubmission(submission_id))
}

async fn upload_files(
    State(backend): State<MockBackend>,
    Path(submission_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Value>, MockBackendError> {
    if backend.submission(&submission_id).is_none() {
        return Err(MockBackendError::UnknownSubmission(submission_id));
    }

    let mut received = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| MockBackendError::BadRequest(err.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("attachment").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| MockBackendError::BadRequest(err.body_text()))?;
        received.push(StoredFile {
            file_name,
            content_type,
            size: bytes.len(),
        });
    }
    if received.is_empty() {
        return Err(MockBackendError::BadRequest(format!(
            "No files found in the '{UPLOAD_FIELD}' field"
        )));
    }

    let mut state = backend.lock();
    let rejected = state.rejected_files.clone();
    let mut results = Vec::with_capacity(received.len());
    let mut stored = Vec::new();
    for (index, file) in received.into_iter().enumerate() {
        if rejected.contains(&file.file_name) {
            results.push(json!({
                "success": false,
                "original_filename": file.file_name,
                "message": "File failed virus scan",
            }));
            continue;
        }
        results.push(json!({
            "success": true,
            "file_id": format!("{submission_id}-file-{}", index + 1),
            "original_filename": file.file_name,
            "size": file.size,
        }));
        stored.push(file);
    }
    if let Some(submission) = state.submissions.get_mut(&submission_id) {
        submission.files.extend(stored);
    }
    Ok(Json(Value::Array(results)))
}

#[derive(Debug, Deserialize)]
struct CustomerQuery {
    customer_number: String,
    #[serde(default)]
    customer_code: String,
}

async fn validate_customer(
    State(backend): State<MockBackend>,
    Query(query): Query<CustomerQuery>,
) -> Json<Value> {
    let number = query.customer_number.trim();
    match backend.account_for(query.customer_code.trim(), number) {
        Some(account_id) => Json(json!({
            "valid": true,
            "account_id": account_id,
            "message": "Customer found",
        })),
        None => Json(json!({
            "valid": false,
            "message": format!("Customer number {number} was not found"),
        })),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FallbackQuery {
    customer_number: String,
}

async fn validate_customer_fallback(
    State(backend): State<MockBackend>,
    Json(body): Json<FallbackQuery>,
) -> Json<Value> {
    let number = body.customer_number.trim();
    match backend.account_for("", number) {
        Some(account_id) => Json(json!({ "valid": true, "accountId": account_id })),
        None => Json(json!({ "valid": false })),
    }
}

async fn publish_to_bus(
    State(backend): State<MockBackend>,
    Path(flow): Path<String>,
    Json(payload): Json<Value>,
) -> StatusCode {
    debug!(%flow, "mock bus message received");
    backend.lock().bus.push(BusMessage { flow, payload });
    StatusCode::ACCEPTED
}

async fn create_case(
    State(backend): State<MockBackend>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), MockBackendError> {
    if payload.get("accountId").and_then(Value::as_str).is_none() {
        return Err(MockBackendError::BadRequest(
            "accountId is required".to_string(),
        ));
    }
    let mut state = backend.lock();
    state.cases.push(payload);
    let id = format!("case-{:04}", state.cases.len());
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    async fn read_json_body(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&body).expect("json payload")
    }

    fn post_json(uri: &str, payload: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request builds")
    }

    #[tokio::test]
    async fn submissions_get_sequential_ids() {
        let backend = MockBackend::default();
        let router = mock_backend_router(backend.clone());

        for expected in ["sub-000001", "sub-000002"] {
            let response = router
                .clone()
                .oneshot(post_json(
                    "/api/templates/contact/submit",
                    json!({ "data": { "name": "Ada" }, "metadata": { "source": "contact-form" } }),
                ))
                .await
                .expect("route executes");
            assert_eq!(response.status(), StatusCode::OK);
            let payload = read_json_body(response).await;
            assert_eq!(payload["submission"]["id"], expected);
        }

        let stored = backend.submission("sub-000002").expect("stored");
        assert_eq!(stored.form_id, "contact");
        assert_eq!(stored.metadata["source"], "contact-form");
        assert_eq!(backend.submissions().len(), 2);
    }

    #[tokio::test]
    async fn unknown_templates_are_not_found() {
        let response = mock_backend_router(MockBackend::default())
            .oneshot(post_json(
                "/api/templates/newsletter/submit",
                json!({ "data": {} }),
            ))
            .await
            .expect("route executes");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let payload = read_json_body(response).await;
        assert!(payload["error"]
            .as_str()
            .is_some_and(|error| error.contains("newsletter")));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let backend = MockBackend::default();
        backend.fail_next_submissions(1, StatusCode::SERVICE_UNAVAILABLE);
        let router = mock_backend_router(backend);
        let request = || post_json("/api/templates/contact/submit", json!({ "data": {} }));

        let first = router.clone().oneshot(request()).await.expect("route executes");
        let second = router.oneshot(request()).await.expect("route executes");

        assert_eq!(first.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(second.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn customer_lookup_is_scoped_by_customer_code() {
        let router = mock_backend_router(MockBackend::default());

        let found = router
            .clone()
            .oneshot(
                Request::get(
                    "/api/accounts/validate-customer?customer_number=1411768&customer_code=DOJ",
                )
                .body(Body::empty())
                .expect("request builds"),
            )
            .await
            .expect("route executes");
        let found = read_json_body(found).await;
        assert_eq!(found["valid"], true);
        assert_eq!(found["account_id"], "0f8fad5b-d9cb-469f-a165-70867728950e");

        let other_code = router
            .oneshot(
                Request::get(
                    "/api/accounts/validate-customer?customer_number=1411768&customer_code=XYZ",
                )
                .body(Body::empty())
                .expect("request builds"),
            )
            .await
            .expect("route executes");
        assert_eq!(read_json_body(other_code).await["valid"], false);
    }

    #[tokio::test]
    async fn fallback_lookup_uses_camel_case() {
        let router = mock_backend_router(MockBackend::default());

        let response = router
            .oneshot(post_json(
                "/esb/validate-customer",
                json!({ "customerNumber": "123456" }),
            ))
            .await
            .expect("route executes");

        let payload = read_json_body(response).await;
        assert_eq!(payload["accountId"], "7c9e6679-7425-40de-944b-e07fc1f90ae7");
    }

    #[tokio::test]
    async fn bus_and_case_messages_are_recorded() {
        let backend = MockBackend::default();
        let router = mock_backend_router(backend.clone());

        let bus = router
            .clone()
            .oneshot(post_json("/esb/b2b-support", json!({ "source": "b2b-support-form" })))
            .await
            .expect("route executes");
        let case = router
            .clone()
            .oneshot(post_json("/cases", json!({ "accountId": "acc-1" })))
            .await
            .expect("route executes");
        let bad_case = router
            .oneshot(post_json("/cases", json!({ "description": "no account" })))
            .await
            .expect("route executes");

        assert_eq!(bus.status(), StatusCode::ACCEPTED);
        assert_eq!(case.status(), StatusCode::CREATED);
        assert_eq!(bad_case.status(), StatusCode::BAD_REQUEST);
        assert_eq!(backend.bus_messages()[0].flow, "b2b-support");
        assert_eq!(backend.cases().len(), 1);
    }
}
