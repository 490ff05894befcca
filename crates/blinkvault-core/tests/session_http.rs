//! End-to-end session behaviour over real HTTP against a local stand-in API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use blinkvault_core::api::HttpTransport;
use blinkvault_core::auth::{MemoryTokenStore, TokenStore};
use blinkvault_core::{ApiError, BlinkVaultClient, RequestPipeline, SessionManager};

const REFRESH_COOKIE: &str = "refreshToken=r1";

struct Backend {
    valid_token: Mutex<String>,
    issued_on_login: String,
    refresh_to: Option<String>,
    refresh_calls: AtomicUsize,
    feed_calls: AtomicUsize,
}

impl Backend {
    fn new(valid_token: &str, issued_on_login: &str, refresh_to: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            valid_token: Mutex::new(valid_token.to_string()),
            issued_on_login: issued_on_login.to_string(),
            refresh_to: refresh_to.map(str::to_string),
            refresh_calls: AtomicUsize::new(0),
            feed_calls: AtomicUsize::new(0),
        })
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = format!("Bearer {}", self.valid_token.lock().unwrap());
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v == expected)
            .unwrap_or(false)
    }
}

fn nina() -> serde_json::Value {
    json!({ "_id": "u1", "username": "nina", "role": "user", "following": ["u2"] })
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": "jwt expired" }))).into_response()
}

async fn login(State(backend): State<Arc<Backend>>) -> Response {
    (
        [(header::SET_COOKIE, format!("{}; Path=/; HttpOnly", REFRESH_COOKIE))],
        Json(json!({ "user": nina(), "accessToken": backend.issued_on_login })),
    )
        .into_response()
}

async fn me(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({ "user": nina() })).into_response()
}

async fn refresh(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let has_cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(|c| c.contains(REFRESH_COOKIE))
        .unwrap_or(false);

    match (&backend.refresh_to, has_cookie) {
        (Some(token), true) => {
            *backend.valid_token.lock().unwrap() = token.clone();
            Json(json!({ "accessToken": token })).into_response()
        }
        _ => (StatusCode::FORBIDDEN, Json(json!({ "message": "refresh rejected" }))).into_response(),
    }
}

async fn feed(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    backend.feed_calls.fetch_add(1, Ordering::SeqCst);
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({ "trending": [], "latest": [{ "_id": "p1", "title": "hello" }] })).into_response()
}

async fn spawn_backend(backend: Arc<Backend>) -> String {
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh-token", post(refresh))
        .route("/api/users/me", get(me))
        .route("/api/posts/feed", get(feed))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{}/api", addr)
}

fn client(base_url: &str, store: Arc<MemoryTokenStore>) -> BlinkVaultClient {
    let transport = HttpTransport::new(base_url, Duration::from_secs(5)).expect("transport");
    let session = Arc::new(SessionManager::new(store));
    BlinkVaultClient::new(RequestPipeline::new(transport, session))
}

#[tokio::test]
async fn expired_token_is_refreshed_with_cookie_and_retried() {
    let backend = Backend::new("fresh", "stale", Some("fresh"));
    let base_url = spawn_backend(backend.clone()).await;
    let store = Arc::new(MemoryTokenStore::default());
    let client = client(&base_url, store.clone());

    client.bootstrap().await;
    assert!(!client.session().is_authenticated());

    client.login("9876543210", "secret").await.expect("login");
    assert_eq!(client.session().token().as_deref(), Some("stale"));

    let feed = client.feed().await.expect("feed");

    assert_eq!(feed.latest[0].id, "p1");
    assert_eq!(client.session().token().as_deref(), Some("fresh"));
    assert_eq!(store.peek().as_deref(), Some("fresh"));
    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(backend.feed_calls.load(Ordering::SeqCst), 2);
    assert!(client.session().is_authenticated());
}

#[tokio::test]
async fn persisted_token_restores_session() {
    let backend = Backend::new("abc", "unused", None);
    let base_url = spawn_backend(backend).await;
    let store = Arc::new(MemoryTokenStore::new(Some("abc".to_string())));
    let client = client(&base_url, store);

    client.bootstrap().await;

    let user = client.session().current_user().expect("restored user");
    assert_eq!(user.username, "nina");
    assert!(user.is_following("u2"));
    assert!(!client.session().is_bootstrapping());
}

#[tokio::test]
async fn stale_token_without_refresh_cookie_signs_out() {
    let backend = Backend::new("fresh", "unused", Some("fresh"));
    let base_url = spawn_backend(backend.clone()).await;
    let store = Arc::new(MemoryTokenStore::new(Some("stale".to_string())));
    let client = client(&base_url, store.clone());
    let mut events = client.session().events();

    client.bootstrap().await;

    assert!(!client.session().is_authenticated());
    assert_eq!(store.load().expect("load"), None);
    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        events.recv().await.expect("signed out"),
        blinkvault_core::SessionEvent::SignedOut {
            reason: blinkvault_core::SignOutReason::BootstrapFailed
        }
    );
}

#[tokio::test]
async fn rejected_refresh_surfaces_session_expired() {
    let backend = Backend::new("fresh", "stale", None);
    let base_url = spawn_backend(backend.clone()).await;
    let client = client(&base_url, Arc::new(MemoryTokenStore::default()));
    let mut events = client.session().events();

    client.login("9876543210", "secret").await.expect("login");
    let err = client.feed().await.expect_err("feed should fail");

    assert!(matches!(err, ApiError::SessionExpired));
    assert!(!client.session().is_authenticated());
    assert_eq!(backend.feed_calls.load(Ordering::SeqCst), 1);

    assert_eq!(
        events.recv().await.expect("signed in"),
        blinkvault_core::SessionEvent::SignedIn
    );
    assert_eq!(
        events.recv().await.expect("signed out"),
        blinkvault_core::SessionEvent::SignedOut {
            reason: blinkvault_core::SignOutReason::SessionExpired
        }
    );
}
