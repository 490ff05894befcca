//! Outbound request decoration and refresh-on-401.
//!
//! Every request carries `Authorization: Bearer <token>` when the session
//! holds one. A 401 on a first attempt that carried a token triggers one
//! call to the refresh endpoint; on success the request is re-issued once
//! as a retry. A retry is never retried again, and exhausting the cycle
//! signs the session out and surfaces [`ApiError::SessionExpired`].

use std::sync::Arc;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::auth::SessionManager;

use super::{ApiError, ApiRequest, ApiResponse, HttpTransport, Transport};

/// Token refresh endpoint; authenticates with the ambient refresh cookie
pub const REFRESH_PATH: &str = "/auth/refresh-token";

/// Which issue of a request this is. At most one `Retry` follows a `First`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Retry,
}

#[derive(Debug, Deserialize)]
struct RefreshGrant {
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
}

pub struct RequestPipeline<T: Transport = HttpTransport> {
    transport: T,
    session: Arc<SessionManager>,
}

impl<T: Transport> RequestPipeline<T> {
    pub fn new(transport: T, session: Arc<SessionManager>) -> Self {
        Self { transport, session }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send a request, recovering once from an expired token.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.send_attempt(&request, Attempt::First).await
    }

    /// Send `request` as the given attempt. A `Retry` that comes back 401 is
    /// terminal.
    pub async fn send_attempt(
        &self,
        request: &ApiRequest,
        attempt: Attempt,
    ) -> Result<ApiResponse, ApiError> {
        let (response, sent) = self.issue(request, attempt).await?;
        if response.status != StatusCode::UNAUTHORIZED || !request.refreshable {
            return Self::check(response);
        }

        if attempt == Attempt::Retry {
            return Err(self.give_up(request));
        }

        // Anonymous request: there is no session to recover
        let Some(rejected) = sent else {
            return Self::check(response);
        };

        info!(path = %request.path, "Access token rejected, attempting refresh");
        if let Err(e) = self.refresh(&rejected).await {
            warn!(error = %e, "Token refresh failed");
            return Err(self.give_up(request));
        }

        if self.session.token().is_none() {
            info!(path = %request.path, "Signed out during refresh, not retrying");
            return Err(ApiError::Unauthorized);
        }

        let (retried, _) = self.issue(request, Attempt::Retry).await?;
        if retried.status == StatusCode::UNAUTHORIZED {
            return Err(self.give_up(request));
        }
        Self::check(retried)
    }

    /// Issue once with the session's current token; also returns that token.
    async fn issue(
        &self,
        request: &ApiRequest,
        attempt: Attempt,
    ) -> Result<(ApiResponse, Option<String>), ApiError> {
        let token = self.session.token();
        debug!(
            method = %request.method,
            path = %request.path,
            ?attempt,
            authenticated = token.is_some(),
            "Sending request"
        );
        let response = self.transport.execute(request, token.as_deref()).await?;
        Ok((response, token))
    }

    /// Exchange the refresh cookie for a new bearer token. The token is
    /// installed only if the session still holds `rejected`. The refresh
    /// call itself is never intercepted.
    async fn refresh(&self, rejected: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post(REFRESH_PATH);
        let response = self.transport.execute(&request, Some(rejected)).await?;
        let grant: RefreshGrant = Self::check(response)?.json()?;

        match grant.access_token {
            Some(token) if !token.trim().is_empty() => {
                if self.session.replace_token(rejected, token) {
                    info!("Token refreshed successfully");
                }
                Ok(())
            }
            _ => Err(ApiError::InvalidResponse(
                "Refresh response carried no access token".to_string(),
            )),
        }
    }

    fn give_up(&self, request: &ApiRequest) -> ApiError {
        warn!(path = %request.path, "Authentication could not be recovered, signing out");
        self.session.expire();
        ApiError::SessionExpired
    }

    fn check(response: ApiResponse) -> Result<ApiResponse, ApiError> {
        if response.status.is_success() {
            Ok(response)
        } else {
            Err(ApiError::from_status(response.status, &response.body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionEvent;
    use crate::auth::SignOutReason;
    use crate::models::{Role, UserSummary};
    use crate::testing::{session_with, ScriptedTransport};
    use serde_json::json;

    const FEED: &str = "/posts/feed";

    fn signed_in(transport: ScriptedTransport, token: &str) -> RequestPipeline<ScriptedTransport> {
        let (session, _) = session_with(None);
        session.login(UserSummary::new("u1", "nina", Role::User), token.to_string());
        RequestPipeline::new(transport, session)
    }

    #[tokio::test]
    async fn test_bearer_attached_when_present() {
        let transport = ScriptedTransport::new()
            .reply(FEED, 200, json!({}))
            .reply(FEED, 200, json!({}));
        let pipeline = signed_in(transport, "abc");

        pipeline.send(ApiRequest::get(FEED)).await.expect("send");
        pipeline.session().logout();
        pipeline.send(ApiRequest::get(FEED)).await.expect("send");

        let calls = pipeline.transport().calls();
        assert_eq!(calls[0].bearer.as_deref(), Some("abc"));
        assert_eq!(calls[1].bearer, None);
    }

    #[tokio::test]
    async fn test_refresh_and_retry_is_invisible_to_caller() {
        let transport = ScriptedTransport::new()
            .reply(FEED, 401, json!({ "message": "jwt expired" }))
            .reply(REFRESH_PATH, 200, json!({ "accessToken": "new123" }))
            .reply(FEED, 200, json!({ "latest": [] }));
        let pipeline = signed_in(transport, "old");
        let mut events = pipeline.session().events();

        let response = pipeline.send(ApiRequest::get(FEED)).await.expect("send");

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, json!({ "latest": [] }).to_string());
        let feed_calls = pipeline.transport().calls_to(FEED);
        assert_eq!(feed_calls.len(), 2);
        assert_eq!(feed_calls[1].bearer.as_deref(), Some("new123"));
        assert_eq!(pipeline.transport().calls_to(REFRESH_PATH).len(), 1);
        assert_eq!(pipeline.session().token().as_deref(), Some("new123"));
        assert!(pipeline.session().is_authenticated());
        assert_eq!(events.try_recv().expect("event"), SessionEvent::TokenRefreshed);
    }

    /// Runs `on_refresh` against the session while the refresh call is in
    /// flight.
    struct DuringRefresh {
        inner: ScriptedTransport,
        session: Arc<SessionManager>,
        on_refresh: fn(&SessionManager),
    }

    impl Transport for DuringRefresh {
        async fn execute(
            &self,
            request: &ApiRequest,
            bearer: Option<&str>,
        ) -> Result<ApiResponse, ApiError> {
            if request.path == REFRESH_PATH {
                (self.on_refresh)(&self.session);
            }
            self.inner.execute(request, bearer).await
        }
    }

    fn racing(
        inner: ScriptedTransport,
        on_refresh: fn(&SessionManager),
    ) -> (RequestPipeline<DuringRefresh>, Arc<crate::auth::MemoryTokenStore>) {
        let (session, store) = session_with(None);
        session.login(UserSummary::new("u1", "nina", Role::User), "old".to_string());
        let transport = DuringRefresh {
            inner,
            session: session.clone(),
            on_refresh,
        };
        (RequestPipeline::new(transport, session), store)
    }

    #[tokio::test]
    async fn test_logout_during_refresh_keeps_session_signed_out() {
        let inner = ScriptedTransport::new()
            .reply(FEED, 401, json!({}))
            .reply(REFRESH_PATH, 200, json!({ "accessToken": "new123" }))
            .reply(FEED, 200, json!({}));
        let (pipeline, store) = racing(inner, |session| session.logout());

        let err = pipeline.send(ApiRequest::get(FEED)).await.expect_err("should fail");

        assert!(matches!(err, ApiError::Unauthorized));
        let session = pipeline.session();
        assert_eq!(session.token(), None);
        assert_eq!(session.current_user(), None);
        assert_eq!(store.peek(), None);
        assert_eq!(pipeline.transport().inner.calls_to(FEED).len(), 1);
    }

    #[tokio::test]
    async fn test_superseded_refresh_retries_with_current_token() {
        let inner = ScriptedTransport::new()
            .reply(FEED, 401, json!({}))
            .reply(REFRESH_PATH, 200, json!({ "accessToken": "late" }))
            .reply(FEED, 200, json!({}));
        // Another request's refresh lands first
        let (pipeline, store) = racing(inner, |session| {
            session.replace_token("old", "early".to_string());
        });

        let response = pipeline.send(ApiRequest::get(FEED)).await.expect("send");

        assert_eq!(response.status, StatusCode::OK);
        let feed_calls = pipeline.transport().inner.calls_to(FEED);
        assert_eq!(feed_calls[0].bearer.as_deref(), Some("old"));
        assert_eq!(feed_calls[1].bearer.as_deref(), Some("early"));
        assert_eq!(pipeline.session().token().as_deref(), Some("early"));
        assert_eq!(store.peek().as_deref(), Some("early"));
        assert!(pipeline.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_anonymous_401_is_not_refreshed() {
        let transport = ScriptedTransport::new().reply(FEED, 401, json!({}));
        let (session, _) = session_with(None);
        let pipeline = RequestPipeline::new(transport, session);
        let mut events = pipeline.session().events();

        let err = pipeline.send(ApiRequest::get(FEED)).await.expect_err("should fail");

        assert!(matches!(err, ApiError::Unauthorized));
        assert!(pipeline.transport().calls_to(REFRESH_PATH).is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_refresh_signs_out() {
        let transport = ScriptedTransport::new()
            .reply(FEED, 401, json!({}))
            .reply(REFRESH_PATH, 403, json!({ "message": "no refresh cookie" }));
        let pipeline = signed_in(transport, "old");
        let mut events = pipeline.session().events();

        let err = pipeline.send(ApiRequest::get(FEED)).await.expect_err("should fail");

        assert!(err.is_session_expired());
        assert!(!pipeline.session().is_authenticated());
        assert_eq!(pipeline.transport().calls_to(FEED).len(), 1);
        assert_eq!(
            events.try_recv().expect("event"),
            SessionEvent::SignedOut {
                reason: SignOutReason::SessionExpired
            }
        );
    }

    #[tokio::test]
    async fn test_second_401_is_terminal() {
        let transport = ScriptedTransport::new()
            .reply(FEED, 401, json!({}))
            .reply(REFRESH_PATH, 200, json!({ "accessToken": "new123" }))
            .reply(FEED, 401, json!({}))
            .reply(FEED, 200, json!({}));
        let pipeline = signed_in(transport, "old");

        let err = pipeline.send(ApiRequest::get(FEED)).await.expect_err("should fail");

        assert!(err.is_session_expired());
        assert_eq!(pipeline.transport().calls_to(FEED).len(), 2);
        assert_eq!(pipeline.transport().calls_to(REFRESH_PATH).len(), 1);
        assert!(!pipeline.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_refresh_without_token_counts_as_failure() {
        let transport = ScriptedTransport::new()
            .reply(FEED, 401, json!({}))
            .reply(REFRESH_PATH, 200, json!({ "message": "ok" }));
        let pipeline = signed_in(transport, "old");

        let err = pipeline.send(ApiRequest::get(FEED)).await.expect_err("should fail");
        assert!(err.is_session_expired());
        assert_eq!(pipeline.transport().calls_to(FEED).len(), 1);
    }

    #[tokio::test]
    async fn test_retry_attempt_never_refreshes() {
        let transport = ScriptedTransport::new().reply(FEED, 401, json!({}));
        let pipeline = signed_in(transport, "old");

        let err = pipeline
            .send_attempt(&ApiRequest::get(FEED), Attempt::Retry)
            .await
            .expect_err("should fail");

        assert!(err.is_session_expired());
        assert!(pipeline.transport().calls_to(REFRESH_PATH).is_empty());
    }

    #[tokio::test]
    async fn test_credential_exchange_401_passes_through() {
        let transport = ScriptedTransport::new().reply(
            "/auth/login",
            401,
            json!({ "message": "Invalid credentials" }),
        );
        let pipeline = signed_in(transport, "abc");

        let err = pipeline
            .send(ApiRequest::post("/auth/login").credential_exchange())
            .await
            .expect_err("should fail");

        assert!(matches!(err, ApiError::Unauthorized));
        assert!(pipeline.transport().calls_to(REFRESH_PATH).is_empty());
        assert!(pipeline.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_other_errors_propagate_unchanged() {
        let transport = ScriptedTransport::new()
            .reply(FEED, 404, json!({ "message": "Post not found" }))
            .reply(FEED, 500, json!({}));
        let pipeline = signed_in(transport, "abc");

        let err = pipeline.send(ApiRequest::get(FEED)).await.expect_err("404");
        assert!(matches!(err, ApiError::NotFound(ref m) if m == "Post not found"));
        let err = pipeline.send(ApiRequest::get(FEED)).await.expect_err("500");
        assert!(matches!(err, ApiError::ServerError(_)));

        assert!(pipeline.transport().calls_to(REFRESH_PATH).is_empty());
        assert!(pipeline.session().is_authenticated());
    }
}
