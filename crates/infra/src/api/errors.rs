//! API error normalization
//!
//! Every failed API call surfaces as one [`ApiError`] carrying the HTTP
//! status (0 when no response arrived), a user-facing message and the
//! response payload when there was one.

use serde::Serialize;
use serde_json::Value;
use sim_domain::SimError;
use thiserror::Error;

/// User-facing messages
pub mod messages {
    pub const BAD_REQUEST: &str = "잘못된 요청입니다.";
    pub const UNAUTHORIZED: &str = "인증이 필요합니다.";
    pub const FORBIDDEN: &str = "접근 권한이 없습니다.";
    pub const NOT_FOUND: &str = "요청한 리소스를 찾을 수 없습니다.";
    pub const SERVER_ERROR: &str = "서버 오류가 발생했습니다.";
    pub const BAD_GATEWAY: &str = "게이트웨이 오류가 발생했습니다.";
    pub const SERVICE_UNAVAILABLE: &str = "서비스를 일시적으로 사용할 수 없습니다.";
    pub const NO_RESPONSE: &str = "서버로부터 응답이 없습니다. 네트워크 연결을 확인해주세요.";
    pub const UNKNOWN: &str = "알 수 없는 오류가 발생했습니다.";
    pub const SESSION_EXPIRED: &str = "인증 세션이 만료되었습니다.";
    pub const INVALID_PAYLOAD: &str = "응답 형식이 올바르지 않습니다.";
}

/// Coarse classification for caller-side branching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCategory {
    /// 401
    Authentication,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// Other 4xx, or the request could not be built
    Client,
    /// 5xx
    Server,
    /// No response received
    Network,
}

/// Normalized API failure
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{message} (status {status})")]
pub struct ApiError {
    pub message: String,
    /// HTTP status, 0 when no response was received
    pub status: u16,
    /// Response payload, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self { message: message.into(), status, data: None }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Error for a response with a non-success status.
    ///
    /// Message precedence: the payload's `message`, then its `error`, then
    /// the static message for the status.
    pub fn from_response(status: u16, data: Option<Value>) -> Self {
        let message = data
            .as_ref()
            .and_then(|payload| payload_message(payload, "message").or_else(|| payload_message(payload, "error")))
            .map_or_else(|| status_message(status), str::to_string);

        Self { message, status, data }
    }

    /// No response was received (network failure or timeout).
    pub fn no_response() -> Self {
        Self::new(0, messages::NO_RESPONSE)
    }

    /// The request could not be sent at all.
    pub fn request_setup(reason: Option<&str>) -> Self {
        let message = reason.filter(|r| !r.is_empty()).unwrap_or(messages::UNKNOWN);
        Self::new(0, message)
    }

    /// The session could not be refreshed after a 401.
    pub fn session_expired() -> Self {
        Self::new(401, messages::SESSION_EXPIRED)
    }

    /// The payload did not match the expected shape.
    pub fn invalid_payload(status: u16, data: Value) -> Self {
        Self::new(status, messages::INVALID_PAYLOAD).with_data(data)
    }

    pub fn category(&self) -> ApiErrorCategory {
        match self.status {
            0 if self.message == messages::NO_RESPONSE => ApiErrorCategory::Network,
            0 => ApiErrorCategory::Client,
            401 => ApiErrorCategory::Authentication,
            403 => ApiErrorCategory::Forbidden,
            404 => ApiErrorCategory::NotFound,
            500..=599 => ApiErrorCategory::Server,
            _ => ApiErrorCategory::Client,
        }
    }

    /// `true` for the error raised after a failed session refresh.
    pub fn is_session_expired(&self) -> bool {
        self.status == 401 && self.message == messages::SESSION_EXPIRED
    }
}

/// Transport failures carry no response: network problems become
/// [`ApiError::no_response`], everything else a request-setup error.
impl From<SimError> for ApiError {
    fn from(err: SimError) -> Self {
        match err {
            SimError::Network(_) => Self::no_response(),
            other => Self::request_setup(Some(&other.to_string())),
        }
    }
}

/// Static message for an HTTP status.
pub fn status_message(status: u16) -> String {
    match status {
        400 => messages::BAD_REQUEST.to_string(),
        401 => messages::UNAUTHORIZED.to_string(),
        403 => messages::FORBIDDEN.to_string(),
        404 => messages::NOT_FOUND.to_string(),
        500 => messages::SERVER_ERROR.to_string(),
        502 => messages::BAD_GATEWAY.to_string(),
        503 => messages::SERVICE_UNAVAILABLE.to_string(),
        0 => messages::NO_RESPONSE.to_string(),
        other => format!("{} ({other})", messages::SERVER_ERROR),
    }
}

fn payload_message<'a>(payload: &'a Value, field: &str) -> Option<&'a str> {
    payload.get(field).and_then(Value::as_str).filter(|message| !message.is_empty())
}
