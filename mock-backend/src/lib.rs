//! In-process mock of the motorlog vehicle-maintenance API.
//!
//! Drives the SDK's integration tests over real HTTP. Token validity and
//! refresh-exchange behavior are scripted per test through [`BackendState`],
//! and every protected request is recorded so tests can assert on the
//! headers that actually went over the wire.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// How the refresh endpoint answers for a given refresh token.
#[derive(Debug, Clone)]
pub enum RefreshBehavior {
    /// Issue new credentials; the new access token becomes valid.
    Grant {
        access_token: String,
        refresh_token: Option<String>,
    },
    /// Issue an access token that protected routes still reject, for
    /// exercising the replay-also-401 path.
    GrantUnusable { access_token: String },
    /// Answer 200 with a body that carries no access token.
    Malformed,
    /// Reject the exchange with a 401.
    Deny,
}

/// One request observed by a protected route.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    valid_tokens: RwLock<HashSet<String>>,
    refresh_scripts: RwLock<HashMap<String, RefreshBehavior>>,
    refresh_calls: AtomicUsize,
    requests: RwLock<Vec<RecordedRequest>>,
    fuel_logs: RwLock<HashMap<String, Vec<Value>>>,
}

/// Shared, scriptable backend state. Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct BackendState(Arc<Inner>);

impl BackendState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an access token as accepted by protected routes.
    pub async fn authorize_token(&self, token: &str) {
        self.0.valid_tokens.write().await.insert(token.to_string());
    }

    /// Expire an access token; protected routes answer 401 for it.
    pub async fn revoke_token(&self, token: &str) {
        self.0.valid_tokens.write().await.remove(token);
    }

    /// Script the refresh endpoint's answer for a refresh token.
    pub async fn script_refresh(&self, refresh_token: &str, behavior: RefreshBehavior) {
        self.0
            .refresh_scripts
            .write()
            .await
            .insert(refresh_token.to_string(), behavior);
    }

    /// Number of refresh exchanges the backend has served.
    pub fn refresh_calls(&self) -> usize {
        self.0.refresh_calls.load(Ordering::SeqCst)
    }

    /// All requests seen by protected routes, in arrival order.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.0.requests.read().await.clone()
    }

    pub async fn last_request(&self) -> Option<RecordedRequest> {
        self.0.requests.read().await.last().cloned()
    }

    async fn record(&self, method: &str, path: String, headers: &HeaderMap) {
        let pick = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        self.0.requests.write().await.push(RecordedRequest {
            method: method.to_string(),
            path,
            authorization: pick(header::AUTHORIZATION),
            content_type: pick(header::CONTENT_TYPE),
        });
    }

    async fn check_bearer(&self, headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        match token {
            Some(token) if self.0.valid_tokens.read().await.contains(token) => Ok(()),
            _ => Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({"detail": "token not valid"})),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CredentialsBody {
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct RefreshBody {
    refresh: String,
}

pub fn router(state: BackendState) -> Router {
    Router::new()
        .route("/api/v1/auth/login", post(handle_login))
        .route("/api/v1/auth/signup", post(handle_signup))
        .route("/api/v1/auth/refresh-token", post(handle_refresh))
        .route(
            "/api/v1/vehicles/{vehicle_id}/gas/",
            get(list_fuel_logs).post(create_fuel_log),
        )
        .route("/api/v1/vehicles/{vehicle_id}/documents/", post(upload_document))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: BackendState) -> std::io::Result<()> {
    tracing::debug!("mock backend listening on {:?}", listener.local_addr());
    axum::serve(listener, router(state)).await
}

async fn handle_login(
    State(state): State<BackendState>,
    Json(body): Json<CredentialsBody>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    issue_session(&state, &body, StatusCode::OK).await.map(|(_, json)| json)
}

async fn handle_signup(
    State(state): State<BackendState>,
    Json(body): Json<CredentialsBody>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    issue_session(&state, &body, StatusCode::CREATED).await
}

async fn issue_session(
    state: &BackendState,
    body: &CredentialsBody,
    status: StatusCode,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    if body.password.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "password is required"})),
        ));
    }

    let access_token = Uuid::new_v4().to_string();
    let refresh_token = Uuid::new_v4().to_string();
    state.authorize_token(&access_token).await;

    Ok((
        status,
        Json(json!({
            "access_token": access_token,
            "refresh_token": refresh_token,
            "user": {"id": 1, "email": body.email, "name": "Test Driver"},
        })),
    ))
}

async fn handle_refresh(
    State(state): State<BackendState>,
    Json(body): Json<RefreshBody>,
) -> (StatusCode, Json<Value>) {
    state.0.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let behavior = state
        .0
        .refresh_scripts
        .read()
        .await
        .get(&body.refresh)
        .cloned();

    match behavior {
        Some(RefreshBehavior::Grant {
            access_token,
            refresh_token,
        }) => {
            state.authorize_token(&access_token).await;
            let mut reply = json!({"access_token": access_token});
            if let Some(refresh_token) = refresh_token {
                reply["refresh_token"] = Value::String(refresh_token);
            }
            (StatusCode::OK, Json(reply))
        }
        Some(RefreshBehavior::GrantUnusable { access_token }) => {
            (StatusCode::OK, Json(json!({"access_token": access_token})))
        }
        Some(RefreshBehavior::Malformed) => (StatusCode::OK, Json(json!({"status": "ok"}))),
        Some(RefreshBehavior::Deny) | None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "refresh token invalid"})),
        ),
    }
}

async fn list_fuel_logs(
    State(state): State<BackendState>,
    Path(vehicle_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state
        .record("GET", format!("/vehicles/{vehicle_id}/gas/"), &headers)
        .await;
    state.check_bearer(&headers).await?;

    let logs = state.0.fuel_logs.read().await;
    let entries = logs.get(&vehicle_id).cloned().unwrap_or_default();
    Ok(Json(json!({"results": entries})))
}

async fn create_fuel_log(
    State(state): State<BackendState>,
    Path(vehicle_id): Path<String>,
    headers: HeaderMap,
    Json(mut entry): Json<Value>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    state
        .record("POST", format!("/vehicles/{vehicle_id}/gas/"), &headers)
        .await;
    state.check_bearer(&headers).await?;

    entry["id"] = json!(Uuid::new_v4().to_string());
    state
        .0
        .fuel_logs
        .write()
        .await
        .entry(vehicle_id)
        .or_default()
        .push(entry.clone());
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn upload_document(
    State(state): State<BackendState>,
    Path(vehicle_id): Path<String>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    state
        .record("POST", format!("/vehicles/{vehicle_id}/documents/"), &headers)
        .await;
    state.check_bearer(&headers).await?;

    Ok((StatusCode::CREATED, Json(json!({"message": "uploaded"}))))
}
