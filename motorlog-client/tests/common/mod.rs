//! Shared harness: boots the mock backend on a random port and wires an
//! `ApiClient` to it with fresh in-memory stores.

use std::sync::Arc;

use mock_backend::BackendState;
use motorlog_client::{
    storage::keys, ApiClient, ClientConfig, DurableStore, MemoryStorage, Session, SessionState,
    SessionStore, UserProfile,
};

pub struct Harness {
    pub backend: BackendState,
    pub client: ApiClient,
    pub sessions: SessionStore,
    pub storage: MemoryStorage,
}

pub async fn spawn() -> Harness {
    let _ = tracing_subscriber::fmt::try_init();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock backend");
    let addr = listener.local_addr().expect("local addr");

    let backend = BackendState::new();
    tokio::spawn(mock_backend::serve(listener, backend.clone()));

    let sessions = SessionStore::new();
    let storage = MemoryStorage::new();
    let client = ApiClient::new(
        ClientConfig::new(format!("http://{addr}")),
        sessions.clone(),
        Arc::new(storage.clone()),
    )
    .expect("build client");

    Harness {
        backend,
        client,
        sessions,
        storage,
    }
}

pub fn test_user() -> UserProfile {
    UserProfile {
        id: 1,
        email: "driver@example.com".to_string(),
        name: Some("Test Driver".to_string()),
    }
}

/// Put a remembered session into both stores, as a restored process would
/// have it. The access token is NOT authorized on the backend unless the
/// test does so itself.
pub async fn seed_remembered_session(harness: &Harness, access_token: &str, refresh_token: &str) {
    harness
        .storage
        .set(keys::TOKEN, access_token)
        .await
        .unwrap();
    harness
        .storage
        .set(keys::REFRESH_TOKEN, refresh_token)
        .await
        .unwrap();
    harness
        .storage
        .set(
            keys::USER_INFO,
            &serde_json::to_string(&test_user()).unwrap(),
        )
        .await
        .unwrap();
    harness.storage.set(keys::REMEMBER_ME, "true").await.unwrap();

    harness.sessions.set(SessionState::LoggedIn(
        Session::new(access_token)
            .with_refresh_token(refresh_token)
            .with_user(test_user())
            .with_remember_me(true),
    ));
}

pub async fn stored(harness: &Harness, key: &str) -> Option<String> {
    harness.storage.get(key).await.unwrap()
}
