//! Outbound HTTP: the transport seam and the retrying client built on it.

mod retry;
mod transport;

pub use retry::{
    RequestError, RetryClient, RetryPolicy, DEFAULT_RETRYABLE_STATUSES, MAX_RETRY_DELAY,
};
pub(crate) use retry::server_messages;
pub use transport::{
    HttpMethod, HttpResponse, HttpTransport, RequestBody, RequestSpec, ReqwestTransport,
    TransportError,
};
