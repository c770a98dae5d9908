use std::sync::Arc;
use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, multipart, Client, StatusCode};
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::{
    bridge::SessionBridge,
    errors::{ApiClientError, Result},
    models::{
        ApiResponse, AuthResponse, ClientConfig, LoginRequest, PartValue, RefreshRequest,
        RefreshResponse, RequestBody, RequestEnvelope, SignupRequest, REFRESH_ENDPOINT,
    },
    session::{Session, SessionState, SessionStore},
    storage::{keys, DurableStore},
};

/// Authenticated client for the motorlog backend.
///
/// Every request goes out with the current bearer token attached. A 401
/// response triggers one refresh-token exchange and one replay of the
/// original request; a single `send` therefore issues at most three network
/// calls. The transport performs no retries of its own.
#[derive(Debug, Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    config: ClientConfig,
    http: Client,
    sessions: SessionStore,
    bridge: SessionBridge,
    /// Single-flight guard: at most one refresh exchange is in flight,
    /// concurrent 401 holders queue here and reuse its result.
    refresh_gate: Mutex<()>,
}

/// Raw reply from one transport round-trip, before outcome mapping.
#[derive(Debug)]
struct RawReply {
    status: u16,
    body: Value,
}

impl ApiClient {
    pub fn new(
        config: ClientConfig,
        sessions: SessionStore,
        durable: Arc<dyn DurableStore>,
    ) -> Result<Self> {
        url::Url::parse(&config.base_url).map_err(|e| {
            ApiClientError::Configuration(format!("invalid base URL '{}': {}", config.base_url, e))
        })?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(ApiClientError::Network)?;

        let bridge = SessionBridge::new(sessions.clone(), durable);
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                http,
                sessions,
                bridge,
                refresh_gate: Mutex::new(()),
            }),
        })
    }

    /// Current session state.
    pub fn session(&self) -> SessionState {
        self.inner.sessions.get()
    }

    /// Subscribe to session transitions (login, logout, token rotation).
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.sessions.subscribe()
    }

    /// Restore a persisted "remember me" session at process start.
    pub async fn restore_session(&self) -> Result<Option<Session>> {
        self.inner.bridge.restore().await
    }

    /// Send one logical request, recovering from an expired access token.
    pub async fn send(&self, envelope: RequestEnvelope) -> Result<ApiResponse> {
        let token = self
            .inner
            .sessions
            .get()
            .access_token()
            .map(str::to_string);

        let reply = self.execute(&envelope, token.as_deref()).await?;
        if reply.status != StatusCode::UNAUTHORIZED.as_u16() {
            return into_outcome(reply);
        }

        debug!(path = %envelope.path, "request rejected with 401, refreshing credentials");
        match self.refresh_access_token(token.as_deref()).await {
            Ok(fresh_token) => {
                let replay = self.execute(&envelope, Some(&fresh_token)).await?;
                if replay.status == StatusCode::UNAUTHORIZED.as_u16() {
                    // The replayed request is final; a second 401 surfaces
                    // as-is rather than looping through another refresh.
                    warn!(path = %envelope.path, "replayed request was rejected again");
                    Err(ApiClientError::AuthExpired {
                        status: replay.status,
                        body: replay.body.into(),
                    })
                } else {
                    into_outcome(replay)
                }
            }
            Err(e) => {
                // The refresh sub-flow's failure stays contained here; the
                // caller sees the original 401.
                warn!("credential refresh failed: {}", e);
                Err(ApiClientError::AuthExpired {
                    status: reply.status,
                    body: reply.body.into(),
                })
            }
        }
    }

    /// Log in and commit the resulting session.
    pub async fn login(&self, request: &LoginRequest, remember_me: bool) -> Result<Session> {
        let envelope = RequestEnvelope::post("/auth/login").json(request)?;
        self.authenticate(envelope, remember_me).await
    }

    /// Create an account and commit the resulting session.
    pub async fn signup(&self, request: &SignupRequest, remember_me: bool) -> Result<Session> {
        let envelope = RequestEnvelope::post("/auth/signup").json(request)?;
        self.authenticate(envelope, remember_me).await
    }

    /// Log out: drop the session from memory and durable storage.
    pub async fn logout(&self) -> Result<()> {
        self.inner.bridge.clear().await
    }

    async fn authenticate(&self, envelope: RequestEnvelope, remember_me: bool) -> Result<Session> {
        // Credential exchanges never carry a stale bearer token.
        let reply = self.execute(&envelope, None).await?;
        let response = into_outcome(reply)?;
        let auth: AuthResponse = response.json()?;

        let mut session = Session::new(auth.access_token).with_remember_me(remember_me);
        session.refresh_token = auth.refresh_token;
        session.user = auth.user;

        self.inner.bridge.commit(session.clone()).await?;
        info!("authenticated against {}", self.inner.config.base_url);
        Ok(session)
    }

    /// Exchange the refresh token for new credentials, coalescing
    /// concurrent callers onto a single in-flight exchange.
    ///
    /// `stale_token` is the access token the failing request went out with.
    /// If the session's token has already moved past it by the time the
    /// guard is acquired, another caller completed the exchange and its
    /// result is reused. Any exchange failure clears the session.
    async fn refresh_access_token(&self, stale_token: Option<&str>) -> Result<String> {
        let _guard = self.inner.refresh_gate.lock().await;

        if let Some(current) = self.inner.sessions.get().access_token() {
            if Some(current) != stale_token {
                debug!("credentials already rotated by a concurrent refresh");
                return Ok(current.to_string());
            }
        }

        let refresh_token = match self.current_refresh_token().await? {
            Some(token) => token,
            None => {
                warn!("no refresh token available, dropping session");
                self.inner.bridge.clear().await?;
                return Err(ApiClientError::Storage(
                    "no refresh token available".to_string(),
                ));
            }
        };

        info!("exchanging refresh token for new credentials");
        let envelope = RequestEnvelope::post(REFRESH_ENDPOINT).json(&RefreshRequest {
            refresh: refresh_token,
        })?;

        // The exchange itself goes out without an Authorization header and
        // is never retried; any failure at all drops the session.
        let reply = match self.execute(&envelope, None).await {
            Ok(reply) => reply,
            Err(e) => {
                self.inner.bridge.clear().await?;
                return Err(e);
            }
        };

        if !(200..300).contains(&reply.status) {
            warn!(status = reply.status, "refresh endpoint rejected the exchange");
            self.inner.bridge.clear().await?;
            return Err(ApiClientError::Server {
                status: reply.status,
                body: reply.body.into(),
            });
        }

        let refreshed: RefreshResponse =
            serde_json::from_value(reply.body).unwrap_or_default();
        match refreshed.access_token {
            Some(access_token) => {
                self.inner
                    .bridge
                    .commit_refresh(access_token.clone(), refreshed.refresh_token)
                    .await?;
                info!("access token refreshed");
                Ok(access_token)
            }
            None => {
                warn!("refresh exchange returned no access token, dropping session");
                self.inner.bridge.clear().await?;
                Err(ApiClientError::Storage(
                    "refresh exchange returned no access token".to_string(),
                ))
            }
        }
    }

    /// Refresh token for the exchange: the live session first, durable
    /// storage as fallback for sessions restored only partially.
    async fn current_refresh_token(&self) -> Result<Option<String>> {
        if let Some(token) = self.inner.sessions.get().refresh_token() {
            return Ok(Some(token.to_string()));
        }
        self.inner.bridge.durable_get(keys::REFRESH_TOKEN).await
    }

    /// Execute one transport round-trip for the envelope.
    ///
    /// `token` is attached as a bearer header unless the caller pinned an
    /// `Authorization` header on the envelope. Non-multipart requests are
    /// always sent as `application/json`.
    async fn execute(&self, envelope: &RequestEnvelope, token: Option<&str>) -> Result<RawReply> {
        let url = format!(
            "{}{}{}",
            self.inner.config.base_url, self.inner.config.api_prefix, envelope.path
        );

        let mut builder = self.inner.http.request(envelope.method.clone(), &url);

        let caller_sets_content_type = envelope
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
        if !envelope.is_multipart() && !caller_sets_content_type {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        for (name, value) in &envelope.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !envelope.has_authorization() {
            if let Some(token) = token {
                builder = builder.bearer_auth(token);
            }
        }

        match &envelope.body {
            Some(RequestBody::Json(value)) => builder = builder.json(value),
            Some(RequestBody::Multipart(parts)) => {
                builder = builder.multipart(build_form(parts)?);
            }
            None => {}
        }

        debug!(method = %envelope.method, %url, "issuing request");
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(RawReply { status, body })
    }
}

/// Rebuild a multipart form from its envelope description. Forms are not
/// reusable across attempts, so each replay builds a fresh one.
fn build_form(parts: &[crate::models::FormPart]) -> Result<multipart::Form> {
    let mut form = multipart::Form::new();
    for part in parts {
        match &part.value {
            PartValue::Text(text) => {
                form = form.text(part.name.clone(), text.clone());
            }
            PartValue::File {
                file_name,
                mime_type,
                bytes,
            } => {
                let file = multipart::Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(mime_type)?;
                form = form.part(part.name.clone(), file);
            }
        }
    }
    Ok(form)
}

fn into_outcome(reply: RawReply) -> Result<ApiResponse> {
    if (200..300).contains(&reply.status) {
        Ok(ApiResponse {
            status: reply.status,
            body: reply.body,
        })
    } else {
        Err(ApiClientError::Server {
            status: reply.status,
            body: reply.body.into(),
        })
    }
}
