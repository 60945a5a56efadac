//! Per-call request state
//!
//! A [`RequestContext`] is created for every API call and travels through
//! the interceptors. It is kept in a replayable form (headers, JSON value,
//! multipart parts) so the call can be resubmitted once after a refresh.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde_json::Value;

use super::errors::ApiError;

/// Caller-supplied options for a single call
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    /// Overrides the client timeout for this call
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// One part of a multipart upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadPart {
    Text { name: String, value: String },
    File { name: String, file_name: String, content_type: Option<String>, bytes: Vec<u8> },
}

impl UploadPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Text { name: name.into(), value: value.into() }
    }

    pub fn file(name: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::File { name: name.into(), file_name: file_name.into(), content_type: None, bytes }
    }

    #[must_use]
    pub fn with_content_type(self, mime: impl Into<String>) -> Self {
        match self {
            Self::File { name, file_name, bytes, .. } => {
                Self::File { name, file_name, content_type: Some(mime.into()), bytes }
            }
            text => text,
        }
    }
}

/// Request body in replayable form
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(Vec<UploadPart>),
}

/// State of one logical API call
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    pub timeout: Option<Duration>,
    retried: bool,
}

impl RequestContext {
    /// Build the context from caller options.
    ///
    /// # Errors
    /// Returns [`ApiError`] if a header name or value is invalid
    pub fn new(
        method: Method,
        path: impl Into<String>,
        body: RequestBody,
        options: RequestOptions,
    ) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ApiError::request_setup(Some(&format!("invalid header name: {e}"))))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ApiError::request_setup(Some(&format!("invalid header value: {e}"))))?;
            headers.insert(name, value);
        }

        Ok(Self {
            method,
            path: path.into(),
            headers,
            query: options.query,
            body,
            timeout: options.timeout,
            retried: false,
        })
    }

    /// Set `Authorization: Bearer <token>`. Tokens that are not valid header
    /// values are skipped.
    pub fn set_bearer(&mut self, token: &str) -> bool {
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                self.headers.insert(AUTHORIZATION, value);
                true
            }
            Err(_) => false,
        }
    }

    #[must_use]
    pub fn has_authorization(&self) -> bool {
        self.headers.contains_key(AUTHORIZATION)
    }

    /// Mark the call as resubmitted. Returns `false` if it already was.
    pub fn mark_retried(&mut self) -> bool {
        !std::mem::replace(&mut self.retried, true)
    }

    #[must_use]
    pub const fn is_retried(&self) -> bool {
        self.retried
    }
}

/// Materialize multipart parts into a fresh form.
pub(crate) fn build_form(parts: &[UploadPart]) -> Result<Form, ApiError> {
    let mut form = Form::new();
    for part in parts {
        form = match part {
            UploadPart::Text { name, value } => form.text(name.clone(), value.clone()),
            UploadPart::File { name, file_name, content_type, bytes } => {
                let mut file = Part::bytes(bytes.clone()).file_name(file_name.clone());
                if let Some(mime) = content_type {
                    file = file
                        .mime_str(mime)
                        .map_err(|e| ApiError::request_setup(Some(&e.to_string())))?;
                }
                form.part(name.clone(), file)
            }
        };
    }
    Ok(form)
}
