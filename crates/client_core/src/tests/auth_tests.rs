use super::*;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use shared::domain::UserId;
use std::{collections::HashMap, sync::Arc};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct FakeGoTrue {
    token_calls: Arc<Mutex<Vec<(String, Value)>>>,
    logout_tokens: Arc<Mutex<Vec<String>>>,
    logout_status: Arc<Mutex<Option<StatusCode>>>,
}

async fn fake_token(
    State(state): State<FakeGoTrue>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> axum::response::Response {
    let grant = query.get("grant_type").cloned().unwrap_or_default();
    state
        .token_calls
        .lock()
        .await
        .push((grant.clone(), body.clone()));

    if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some("anon-key") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "No API key found in request" })),
        )
            .into_response();
    }

    match grant.as_str() {
        "password" if body["password"] == "hunter2" => Json(json!({
            "access_token": "access-1",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "refresh-1",
            "user": { "id": "user-1", "email": body["email"] }
        }))
        .into_response(),
        "password" => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "code": 400,
                "error_code": "invalid_credentials",
                "msg": "Invalid login credentials"
            })),
        )
            .into_response(),
        "refresh_token" if body["refresh_token"] == "refresh-1" => Json(json!({
            "access_token": "access-2",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "refresh-2",
            "user": { "id": "user-1", "email": "cat@example.com" }
        }))
        .into_response(),
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "code": 400,
                "error_code": "refresh_token_not_found",
                "msg": "Invalid Refresh Token: Refresh Token Not Found"
            })),
        )
            .into_response(),
    }
}

async fn fake_logout(State(state): State<FakeGoTrue>, headers: HeaderMap) -> StatusCode {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    state.logout_tokens.lock().await.push(bearer);
    state
        .logout_status
        .lock()
        .await
        .unwrap_or(StatusCode::NO_CONTENT)
}

async fn spawn_gotrue() -> (String, FakeGoTrue) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = FakeGoTrue::default();
    let app = Router::new()
        .route("/auth/v1/token", post(fake_token))
        .route("/auth/v1/logout", post(fake_logout))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

fn stored_session(refresh_token: &str, expires_in: i64) -> Session {
    Session {
        access_token: "stale-access".into(),
        refresh_token: refresh_token.into(),
        user_id: UserId("user-1".into()),
        email: Some("cat@example.com".into()),
        expires_at: Some(Utc::now() + Duration::seconds(expires_in)),
    }
}

#[tokio::test]
async fn in_memory_sign_in_and_out_notify_subscribers() {
    let provider = InMemoryAuthProvider::new().with_user("cat@example.com", "hunter2");
    let mut subscription = provider.subscribe();
    assert_eq!(provider.current_session().await.expect("fetch"), None);

    let session = provider
        .sign_in_with_password("Cat@Example.com ", "hunter2")
        .await
        .expect("sign in");
    assert_eq!(session.email.as_deref(), Some("cat@example.com"));

    let change = subscription.recv().await.expect("signed in");
    assert_eq!(change.kind, SessionChangeKind::SignedIn);
    assert_eq!(change.session.as_ref(), Some(&session));
    assert_eq!(
        provider.current_session().await.expect("fetch"),
        Some(session)
    );

    provider.sign_out().await.expect("sign out");
    let change = subscription.recv().await.expect("signed out");
    assert_eq!(change.kind, SessionChangeKind::SignedOut);
    assert_eq!(change.session, None);
    assert_eq!(provider.current_session().await.expect("fetch"), None);
}

#[tokio::test]
async fn in_memory_rejects_wrong_password() {
    let provider = InMemoryAuthProvider::new().with_user("cat@example.com", "hunter2");
    let err = provider
        .sign_in_with_password("cat@example.com", "wrong")
        .await
        .expect_err("wrong password");
    assert_eq!(err, AuthError::InvalidCredentials);

    let open = InMemoryAuthProvider::new();
    open.sign_in_with_password("anyone@example.com", "x")
        .await
        .expect("open provider accepts any credentials");
    assert_eq!(
        open.sign_in_with_password("", "x").await.expect_err("empty email"),
        AuthError::InvalidCredentials
    );
}

#[tokio::test]
async fn in_memory_refresh_rotates_tokens_for_same_user() {
    let provider = InMemoryAuthProvider::new();
    let first = provider
        .sign_in_with_password("cat@example.com", "pw")
        .await
        .expect("sign in");
    let mut subscription = provider.subscribe();

    let refreshed = provider.refresh().await.expect("refresh");
    assert_eq!(refreshed.user_id, first.user_id);
    assert_ne!(refreshed.access_token, first.access_token);
    assert_eq!(
        subscription.try_recv().expect("change").kind,
        SessionChangeKind::TokenRefreshed
    );
}

#[test]
fn dropping_subscription_unregisters_it() {
    let provider = InMemoryAuthProvider::new();
    let first = provider.subscribe();
    let second = provider.subscribe();
    assert_eq!(provider.subscriber_count(), 2);
    drop(first);
    assert_eq!(provider.subscriber_count(), 1);
    drop(second);
    assert_eq!(provider.subscriber_count(), 0);
}

#[test]
fn session_file_store_round_trips_and_clears() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SessionFileStore::new(dir.path().join("nested").join("session.json"));
    assert_eq!(store.load().expect("load missing"), None);

    let session = stored_session("refresh-1", 600);
    store.save(&session).expect("save");
    assert_eq!(store.load().expect("load"), Some(session));

    store.clear().expect("clear");
    store.clear().expect("clear twice");
    assert_eq!(store.load().expect("load cleared"), None);
}

#[cfg(unix)]
#[test]
fn session_file_is_readable_by_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.json");
    std::fs::write(&path, "{}").expect("write");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).expect("chmod");

    let store = SessionFileStore::new(&path);
    store.save(&stored_session("refresh-1", 600)).expect("save");
    let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
    assert_eq!(mode & 0o777, 0o600);

    std::fs::remove_file(&path).expect("remove");
    store.save(&stored_session("refresh-2", 600)).expect("save fresh");
    let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn session_file_store_reports_malformed_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.json");
    std::fs::write(&path, "{not json").expect("write");
    let err = SessionFileStore::new(path).load().expect_err("malformed");
    assert!(matches!(err, AuthError::Storage(_)));
}

#[tokio::test]
async fn gotrue_sign_in_persists_and_broadcasts_session() {
    let (url, fake) = spawn_gotrue().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SessionFileStore::new(dir.path().join("session.json"));
    let provider = GoTrueAuthProvider::new(&url, "anon-key")
        .expect("provider")
        .with_store(store.clone());
    let mut subscription = provider.subscribe();

    let session = provider
        .sign_in_with_password("cat@example.com", "hunter2")
        .await
        .expect("sign in");
    assert_eq!(session.access_token, "access-1");
    assert_eq!(session.user_id, UserId("user-1".into()));
    assert!(session.expires_at.is_some());

    let change = subscription.recv().await.expect("change");
    assert_eq!(change.kind, SessionChangeKind::SignedIn);
    assert_eq!(store.load().expect("load"), Some(session.clone()));

    let calls = fake.token_calls.lock().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "password");
    assert_eq!(calls[0].1["email"], "cat@example.com");
}

#[tokio::test]
async fn gotrue_maps_invalid_credentials() {
    let (url, _fake) = spawn_gotrue().await;
    let provider = GoTrueAuthProvider::new(&url, "anon-key").expect("provider");
    let err = provider
        .sign_in_with_password("cat@example.com", "nope")
        .await
        .expect_err("invalid");
    assert_eq!(err, AuthError::InvalidCredentials);
    assert_eq!(provider.current_session().await.expect("fetch"), None);
}

#[tokio::test]
async fn gotrue_restores_and_refreshes_expired_session() {
    let (url, _fake) = spawn_gotrue().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SessionFileStore::new(dir.path().join("session.json"));
    store.save(&stored_session("refresh-1", -5)).expect("seed");

    let provider = GoTrueAuthProvider::new(&url, "anon-key")
        .expect("provider")
        .with_store(store.clone());
    let mut subscription = provider.subscribe();

    let session = provider
        .current_session()
        .await
        .expect("fetch")
        .expect("session");
    assert_eq!(session.access_token, "access-2");
    assert_eq!(
        subscription.recv().await.expect("change").kind,
        SessionChangeKind::TokenRefreshed
    );
    assert_eq!(
        store.load().expect("load").expect("persisted").refresh_token,
        "refresh-2"
    );
}

#[tokio::test]
async fn gotrue_drops_session_when_refresh_token_is_revoked() {
    let (url, _fake) = spawn_gotrue().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SessionFileStore::new(dir.path().join("session.json"));
    store.save(&stored_session("revoked", -5)).expect("seed");

    let provider = GoTrueAuthProvider::new(&url, "anon-key")
        .expect("provider")
        .with_store(store.clone());
    let mut subscription = provider.subscribe();

    assert_eq!(provider.current_session().await.expect("fetch"), None);
    assert_eq!(
        subscription.recv().await.expect("change").kind,
        SessionChangeKind::SignedOut
    );
    assert_eq!(store.load().expect("load"), None);
}

#[tokio::test]
async fn gotrue_fresh_stored_session_is_returned_without_refresh() {
    let (url, fake) = spawn_gotrue().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SessionFileStore::new(dir.path().join("session.json"));
    let seeded = stored_session("refresh-1", 600);
    store.save(&seeded).expect("seed");

    let provider = GoTrueAuthProvider::new(&url, "anon-key")
        .expect("provider")
        .with_store(store);
    assert_eq!(
        provider.current_session().await.expect("fetch"),
        Some(seeded)
    );
    assert!(fake.token_calls.lock().await.is_empty());
}

#[tokio::test]
async fn gotrue_sign_out_revokes_and_clears_even_when_server_fails() {
    let (url, fake) = spawn_gotrue().await;
    *fake.logout_status.lock().await = Some(StatusCode::INTERNAL_SERVER_ERROR);
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SessionFileStore::new(dir.path().join("session.json"));
    let provider = GoTrueAuthProvider::new(&url, "anon-key")
        .expect("provider")
        .with_store(store.clone());

    provider
        .sign_in_with_password("cat@example.com", "hunter2")
        .await
        .expect("sign in");
    let mut subscription = provider.subscribe();

    provider.sign_out().await.expect("sign out");
    assert_eq!(
        fake.logout_tokens.lock().await.as_slice(),
        ["Bearer access-1".to_string()]
    );
    assert_eq!(
        subscription.recv().await.expect("change").kind,
        SessionChangeKind::SignedOut
    );
    assert_eq!(provider.current_session().await.expect("fetch"), None);
    assert_eq!(store.load().expect("load"), None);
}

#[test]
fn gotrue_rejects_invalid_project_url() {
    assert!(GoTrueAuthProvider::new("::not a url::", "anon-key").is_err());
}
