//! Session persistence tests: restore at startup, the remember-me
//! invariant, and the login/logout lifecycle against the mock backend.

mod common;

use std::sync::Arc;

use motorlog_client::{
    storage::keys, DurableStore, LoginRequest, MemoryStorage, SessionBridge, SessionState,
    SessionStore, SignupRequest,
};

fn bridge() -> (SessionBridge, SessionStore, MemoryStorage) {
    let store = SessionStore::new();
    let storage = MemoryStorage::new();
    let bridge = SessionBridge::new(store.clone(), Arc::new(storage.clone()));
    (bridge, store, storage)
}

async fn seed_storage(storage: &MemoryStorage, remember_me: &str) {
    storage.set(keys::TOKEN, "abc").await.unwrap();
    storage.set(keys::REFRESH_TOKEN, "r1").await.unwrap();
    storage
        .set(
            keys::USER_INFO,
            &serde_json::to_string(&common::test_user()).unwrap(),
        )
        .await
        .unwrap();
    storage.set(keys::REMEMBER_ME, remember_me).await.unwrap();
}

#[tokio::test]
async fn restore_logs_in_from_a_complete_remembered_session() {
    let (bridge, store, storage) = bridge();
    seed_storage(&storage, "true").await;

    let session = bridge.restore().await.unwrap().expect("session restored");
    assert_eq!(session.access_token, "abc");
    assert_eq!(session.refresh_token.as_deref(), Some("r1"));
    assert_eq!(session.user, Some(common::test_user()));
    assert!(session.remember_me);
    assert_eq!(store.get().access_token(), Some("abc"));
}

#[tokio::test]
async fn restore_ignores_stale_keys_when_remember_me_is_false() {
    let (bridge, store, storage) = bridge();
    seed_storage(&storage, "false").await;

    assert!(bridge.restore().await.unwrap().is_none());
    assert_eq!(store.get(), SessionState::LoggedOut);
}

#[tokio::test]
async fn restore_stays_logged_out_when_token_is_missing() {
    let (bridge, store, storage) = bridge();
    seed_storage(&storage, "true").await;
    storage.remove(keys::TOKEN).await.unwrap();

    assert!(bridge.restore().await.unwrap().is_none());
    assert_eq!(store.get(), SessionState::LoggedOut);
}

#[tokio::test]
async fn restore_stays_logged_out_when_user_record_is_missing() {
    let (bridge, store, storage) = bridge();
    seed_storage(&storage, "true").await;
    storage.remove(keys::USER_INFO).await.unwrap();

    assert!(bridge.restore().await.unwrap().is_none());
    assert_eq!(store.get(), SessionState::LoggedOut);
}

#[tokio::test]
async fn restore_treats_corrupt_user_record_as_logged_out() {
    let (bridge, store, storage) = bridge();
    seed_storage(&storage, "true").await;
    storage.set(keys::USER_INFO, "not json").await.unwrap();

    assert!(bridge.restore().await.unwrap().is_none());
    assert_eq!(store.get(), SessionState::LoggedOut);
}

#[tokio::test]
async fn restore_on_empty_storage_is_logged_out() {
    let (bridge, store, _storage) = bridge();
    assert!(bridge.restore().await.unwrap().is_none());
    assert_eq!(store.get(), SessionState::LoggedOut);
}

#[tokio::test]
async fn login_without_remember_me_never_touches_durable_tokens() {
    let h = common::spawn().await;

    let session = h
        .client
        .login(
            &LoginRequest {
                email: "driver@example.com".to_string(),
                password: "hunter2".to_string(),
            },
            false,
        )
        .await
        .unwrap();

    // In memory for the process lifetime, nothing on disk.
    assert!(h.sessions.get().is_logged_in());
    assert!(!session.remember_me);
    assert_eq!(common::stored(&h, keys::TOKEN).await, None);
    assert_eq!(common::stored(&h, keys::USER_INFO).await, None);
    assert_eq!(
        common::stored(&h, keys::REMEMBER_ME).await.as_deref(),
        Some("false")
    );
}

#[tokio::test]
async fn login_with_remember_me_persists_the_session() {
    let h = common::spawn().await;

    let session = h
        .client
        .login(
            &LoginRequest {
                email: "driver@example.com".to_string(),
                password: "hunter2".to_string(),
            },
            true,
        )
        .await
        .unwrap();

    assert_eq!(
        common::stored(&h, keys::TOKEN).await.as_deref(),
        Some(session.access_token.as_str())
    );
    assert_eq!(
        common::stored(&h, keys::REFRESH_TOKEN).await,
        session.refresh_token
    );
    assert_eq!(
        common::stored(&h, keys::REMEMBER_ME).await.as_deref(),
        Some("true")
    );
    assert!(common::stored(&h, keys::USER_INFO).await.is_some());
}

#[tokio::test]
async fn signup_commits_a_session_like_login() {
    let h = common::spawn().await;

    let session = h
        .client
        .signup(
            &SignupRequest {
                email: "new@example.com".to_string(),
                password: "hunter2".to_string(),
                name: Some("New Driver".to_string()),
            },
            true,
        )
        .await
        .unwrap();

    assert!(h.sessions.get().is_logged_in());
    assert_eq!(
        common::stored(&h, keys::TOKEN).await.as_deref(),
        Some(session.access_token.as_str())
    );
}

#[tokio::test]
async fn logout_clears_both_stores() {
    let h = common::spawn().await;
    common::seed_remembered_session(&h, "abc", "r1").await;

    h.client.logout().await.unwrap();

    assert_eq!(h.sessions.get(), SessionState::LoggedOut);
    for key in [
        keys::TOKEN,
        keys::REFRESH_TOKEN,
        keys::USER_INFO,
        keys::REMEMBER_ME,
    ] {
        assert_eq!(common::stored(&h, key).await, None, "key {key} not cleared");
    }
}

#[tokio::test]
async fn session_subscribers_see_login_and_logout() {
    let h = common::spawn().await;
    let mut rx = h.client.subscribe();

    h.client
        .login(
            &LoginRequest {
                email: "driver@example.com".to_string(),
                password: "hunter2".to_string(),
            },
            false,
        )
        .await
        .unwrap();
    rx.changed().await.unwrap();
    assert!(rx.borrow().is_logged_in());

    h.client.logout().await.unwrap();
    rx.changed().await.unwrap();
    assert!(!rx.borrow().is_logged_in());
}
