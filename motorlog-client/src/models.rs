use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ApiClientError, Result};

/// Path prefix joined onto the backend origin for every request.
pub const API_PREFIX: &str = "/api/v1";

/// Endpoint used to exchange a refresh token for fresh credentials.
pub const REFRESH_ENDPOINT: &str = "/auth/refresh-token";

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend origin (e.g., "https://api.motorlog.app")
    pub base_url: String,
    /// Versioned path prefix joined onto the origin
    pub api_prefix: String,
    /// Timeout for HTTP requests (in seconds)
    pub request_timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            api_prefix: API_PREFIX.to_string(),
            request_timeout_secs: 30,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.request_timeout_secs = timeout_secs;
        self
    }

    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    /// Load configuration from the environment.
    ///
    /// `MOTORLOG_API_URL` is required; `MOTORLOG_API_TIMEOUT_SECS` overrides
    /// the default request timeout.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("MOTORLOG_API_URL").map_err(|_| {
            ApiClientError::Configuration("MOTORLOG_API_URL is not set".to_string())
        })?;

        let mut config = Self::new(base_url);
        if let Ok(timeout) = std::env::var("MOTORLOG_API_TIMEOUT_SECS") {
            config.request_timeout_secs = timeout.parse().map_err(|e| {
                ApiClientError::Configuration(format!("invalid MOTORLOG_API_TIMEOUT_SECS: {}", e))
            })?;
        }
        Ok(config)
    }
}

/// One logical request to the backend, described as plain data.
///
/// Kept as data (rather than a built transport request) so the client can
/// replay it after a credential refresh.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    /// Path relative to the versioned prefix (e.g., "/vehicles/123/gas/")
    pub path: String,
    pub method: Method,
    pub body: Option<RequestBody>,
    /// Extra headers; an explicit `Authorization` entry suppresses the
    /// automatic bearer header.
    pub headers: Vec<(String, String)>,
}

impl RequestEnvelope {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Self {
            path,
            method,
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        self.body = Some(RequestBody::Json(serde_json::to_value(body)?));
        Ok(self)
    }

    /// Attach a multipart form body. The transport sets the content type
    /// (with boundary), so file uploads are not JSON-encoded.
    pub fn multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = Some(RequestBody::Multipart(parts));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Whether the caller pinned their own `Authorization` header.
    pub fn has_authorization(&self) -> bool {
        self.headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("authorization"))
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.body, Some(RequestBody::Multipart(_)))
    }
}

/// Request body variants
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    Multipart(Vec<FormPart>),
}

/// One part of a multipart form, as replayable data
#[derive(Debug, Clone)]
pub struct FormPart {
    pub name: String,
    pub value: PartValue,
}

#[derive(Debug, Clone)]
pub enum PartValue {
    Text(String),
    File {
        file_name: String,
        mime_type: String,
        bytes: Vec<u8>,
    },
}

impl FormPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: PartValue::Text(value.into()),
        }
    }

    pub fn file(
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            value: PartValue::File {
                file_name: file_name.into(),
                mime_type: mime_type.into(),
                bytes,
            },
        }
    }
}

/// Decoded success payload from the backend
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    /// Deserialize the response body into a typed value.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

/// Server-supplied error payload, shape varies by endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorBody(pub Value);

impl ErrorBody {
    const FALLBACK: &'static str = "Something went wrong. Please try again.";

    /// Extract a display message from the payload.
    ///
    /// Precedence: `message`, then `detail`, then the first element of
    /// `details`, then the value of the first key, then a generic default.
    /// The order matters for compatibility with existing backend responses.
    pub fn message(&self) -> String {
        match &self.0 {
            Value::Object(map) => {
                for key in ["message", "detail"] {
                    match map.get(key) {
                        Some(Value::Null) | None => {}
                        Some(value) => return stringify(value),
                    }
                }
                if let Some(Value::Array(items)) = map.get("details") {
                    if let Some(first) = items.first() {
                        return stringify(first);
                    }
                }
                match map.iter().next() {
                    Some((_, value)) if !value.is_null() => stringify(value),
                    _ => Self::FALLBACK.to_string(),
                }
            }
            Value::String(text) if !text.is_empty() => text.clone(),
            _ => Self::FALLBACK.to_string(),
        }
    }
}

impl From<Value> for ErrorBody {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Authenticated user record, persisted under the `userInfo` storage key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Credentials for the login exchange
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Payload for the signup exchange
#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

/// Response from login/signup exchanges
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: Option<UserProfile>,
}

/// Body of the refresh-token exchange
#[derive(Debug, Serialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

/// Response from the refresh-token exchange.
///
/// `access_token` is optional so a malformed success body is handled as a
/// failed exchange rather than a deserialization error.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}
