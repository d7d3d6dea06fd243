use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ApiKey;
use crate::pipeline::draft::Attachment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// Files sent under one repeated multipart field.
    Multipart {
        field: String,
        files: Vec<Attachment>,
    },
}

/// Everything needed to (re)issue one outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl RequestSpec {
    fn new(method: HttpMethod, url: impl Into<String>, body: RequestBody) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url, RequestBody::Empty)
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, url, RequestBody::Json(body))
    }

    pub fn post_multipart(
        url: impl Into<String>,
        field: impl Into<String>,
        files: Vec<Attachment>,
    ) -> Self {
        Self::new(
            HttpMethod::Post,
            url,
            RequestBody::Multipart {
                field: field.into(),
                files,
            },
        )
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn api_key(self, key: Option<&ApiKey>) -> Self {
        match key {
            Some(key) => self.header(key.header.clone(), key.value.clone()),
            None => self,
        }
    }
}

/// Status and raw body of a received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json_body(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Failure before any response was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request interrupted before a response arrived: {0}")]
    Interrupted(String),
    #[error("request could not be built: {0}")]
    Build(String),
}

/// Seam between the pipeline and the network, so tests can script responses.
#[async_trait]
pub trait HttpTransport: Send + Sync + Debug {
    async fn send(&self, request: &RequestSpec) -> Result<HttpResponse, TransportError>;
}

/// Production transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map(|client| Self { client })
            .map_err(|err| TransportError::Build(err.to_string()))
    }

    fn classify(err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_builder() {
            TransportError::Build(err.to_string())
        } else {
            TransportError::Interrupted(err.to_string())
        }
    }

    fn multipart(field: &str, files: &[Attachment]) -> Result<Form, TransportError> {
        files.iter().try_fold(Form::new(), |form, file| {
            let part = Part::bytes(file.bytes.clone())
                .file_name(file.file_name.clone())
                .mime_str(&file.content_type)
                .map_err(|err| TransportError::Build(err.to_string()))?;
            Ok(form.part(field.to_string(), part))
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &RequestSpec) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            // reqwest forms are single-use, so every attempt builds a fresh one.
            RequestBody::Multipart { field, files } => {
                builder.multipart(Self::multipart(field, files)?)
            }
        };

        let response = builder.send().await.map_err(Self::classify)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(Self::classify)?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}
