use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::Result;
use crate::http_client::{ApiClient, ApiRequest};

use super::store::TokenStore;
use super::types::{
    LoginRequest, LoginResponse, LogoutRequest, RegisterRequest, RegisterResponse, User,
};

pub const LOGIN_PATH: &str = "/auth/login/";
pub const REGISTER_PATH: &str = "/auth/register/";
pub const PROFILE_PATH: &str = "/auth/profile/";
pub const LOGOUT_PATH: &str = "/auth/logout/";

/// Snapshot of the authentication state seen by views and route guards
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSessionState {
    pub user: Option<User>,
    /// True only while the startup identity fetch runs
    pub is_loading: bool,
}

impl AuthSessionState {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

impl Default for AuthSessionState {
    fn default() -> Self {
        Self {
            user: None,
            is_loading: true,
        }
    }
}

/// Receives forced session teardown from the request pipeline
pub trait SessionSink: Send + Sync {
    fn end_session(&self);
}

/// Shared handle on the observable session state.
///
/// Created before the API client so the refresh stage can end the session
/// it belongs to. Clones share one channel.
#[derive(Clone)]
pub struct SessionHandle {
    state: Arc<watch::Sender<AuthSessionState>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(AuthSessionState::default());
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> AuthSessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSessionState> {
        self.state.subscribe()
    }

    fn replace(&self, state: AuthSessionState) {
        self.state.send_replace(state);
    }

    fn set_user(&self, user: Option<User>) {
        self.state.send_modify(|state| state.user = user);
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSink for SessionHandle {
    fn end_session(&self) {
        if self.state.borrow().user.is_some() {
            tracing::info!("Session ended after failed token refresh");
        }
        self.set_user(None);
    }
}

/// Authentication context, built once at startup and shared by every view
pub struct AuthSession {
    client: Arc<ApiClient>,
    store: Arc<dyn TokenStore>,
    state: SessionHandle,
    bootstrapped: AtomicBool,
}

impl AuthSession {
    /// `state` must be the handle given to the client's refresh stage
    pub fn new(client: Arc<ApiClient>, store: Arc<dyn TokenStore>, state: SessionHandle) -> Self {
        Self {
            client,
            store,
            state,
            bootstrapped: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> AuthSessionState {
        self.state.state()
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<AuthSessionState> {
        self.state.subscribe()
    }

    pub fn user(&self) -> Option<User> {
        self.state.state.borrow().user.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.state.borrow().is_loading
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.state.borrow().is_authenticated()
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    /// Restore the session from stored tokens. Runs once; later calls are no-ops.
    pub async fn bootstrap(&self) {
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            return;
        }

        let has_token = match self.store.get_access() {
            Ok(token) => token.is_some(),
            Err(e) => {
                tracing::error!("Failed to read stored access token: {}", e);
                false
            }
        };

        let user = if has_token {
            match self.fetch_profile().await {
                Ok(user) => {
                    tracing::info!("Session restored for {}", user.username);
                    Some(user)
                }
                Err(e) => {
                    tracing::warn!("Stored session is no longer valid: {}", e);
                    self.clear_tokens();
                    None
                }
            }
        } else {
            tracing::debug!("No stored access token, starting logged out");
            None
        };

        self.state.replace(AuthSessionState {
            user,
            is_loading: false,
        });
    }

    /// Log in and load the profile. On failure the previous tokens and
    /// identity are left as they were.
    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        let tokens: LoginResponse = self
            .client
            .post(
                LOGIN_PATH,
                &LoginRequest {
                    username: username.to_string(),
                    password: password.to_string(),
                },
            )
            .await?;

        let previous = (self.store.get_access()?, self.store.get_refresh()?);
        self.store.set(&tokens.access, &tokens.refresh)?;

        let user = match self.fetch_profile().await {
            Ok(user) => user,
            Err(e) => {
                self.restore_tokens(previous);
                return Err(e);
            }
        };

        tracing::info!("Logged in as {}", user.username);
        self.set_user(Some(user.clone()));
        Ok(user)
    }

    /// Create an account; the backend returns identity and tokens together
    pub async fn register(&self, request: &RegisterRequest) -> Result<User> {
        let data: RegisterResponse = self.client.post(REGISTER_PATH, request).await?;

        self.store.set(&data.tokens.access, &data.tokens.refresh)?;
        tracing::info!("Registered {}: {}", data.user.username, data.message);
        self.set_user(Some(data.user.clone()));
        Ok(data.user)
    }

    /// Best-effort server-side logout; local state is always cleared
    pub async fn logout(&self) {
        let refresh = self.store.get_refresh().unwrap_or_else(|e| {
            tracing::warn!("Failed to read refresh token: {}", e);
            None
        });

        let notified = ApiRequest::post(LOGOUT_PATH)
            .with_json(&LogoutRequest { refresh });
        let result = match notified {
            Ok(request) => self.client.execute(request).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::debug!("Ignoring logout notification failure: {}", e);
        }

        self.clear_tokens();
        self.set_user(None);
        tracing::info!("Logged out");
    }

    async fn fetch_profile(&self) -> Result<User> {
        self.client.get(PROFILE_PATH).await
    }

    fn set_user(&self, user: Option<User>) {
        self.state.set_user(user);
    }

    fn clear_tokens(&self) {
        if let Err(e) = self.store.clear() {
            tracing::error!("Failed to clear tokens: {}", e);
        }
    }

    fn restore_tokens(&self, previous: (Option<String>, Option<String>)) {
        let restored = match previous {
            (Some(access), Some(refresh)) => self.store.set(&access, &refresh),
            _ => self.store.clear(),
        };
        if let Err(e) = restored {
            tracing::error!("Failed to restore previous tokens: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;
    use crate::error::ApiError;
    use crate::http_client::{ApiResponse, ReqwestTransport, Transport};
    use crate::middleware::session_stages;
    use crate::routes::{guard, Guard, Route, Router};
    use async_trait::async_trait;
    use bytes::Bytes;
    use mockito::Matcher;
    use reqwest::header::HeaderMap;
    use reqwest::StatusCode;
    use serde_json::json;

    const PROFILE: &str = r#"{
        "id": 3,
        "username": "ada",
        "email": "ada@example.com",
        "first_name": "Ada",
        "last_name": "Lovelace",
        "date_joined": "2024-05-01T10:00:00Z"
    }"#;

    fn session(url: &str, store: Arc<MemoryTokenStore>) -> AuthSession {
        let router = Arc::new(Router::default());
        let handle = SessionHandle::new();
        let transport = Arc::new(ReqwestTransport::new(url, None).unwrap());
        let client = Arc::new(ApiClient::new(
            transport,
            session_stages(store.clone(), router, Arc::new(handle.clone())),
        ));
        AuthSession::new(client, store, handle)
    }

    #[test]
    fn test_initial_state() {
        let state = AuthSessionState::default();
        assert!(state.is_loading);
        assert!(!state.is_authenticated());
    }

    #[tokio::test]
    async fn test_bootstrap_without_token_skips_fetch() {
        let mut server = mockito::Server::new_async().await;
        let profile = server
            .mock("GET", "/auth/profile/")
            .expect(0)
            .create_async()
            .await;

        let session = session(&server.url(), Arc::new(MemoryTokenStore::new()));
        session.bootstrap().await;

        assert_eq!(
            session.state(),
            AuthSessionState {
                user: None,
                is_loading: false
            }
        );
        profile.assert_async().await;
    }

    #[tokio::test]
    async fn test_bootstrap_runs_once() {
        let mut server = mockito::Server::new_async().await;
        let profile = server
            .mock("GET", "/auth/profile/")
            .with_status(200)
            .with_body(PROFILE)
            .expect(1)
            .create_async()
            .await;

        let session = session(
            &server.url(),
            Arc::new(MemoryTokenStore::with_tokens("a", "r")),
        );
        session.bootstrap().await;
        session.bootstrap().await;

        assert!(session.is_authenticated());
        profile.assert_async().await;
    }

    #[tokio::test]
    async fn test_login_failure_leaves_state_unchanged() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/login/")
            .with_status(401)
            .with_body(r#"{"detail": "No active account found with the given credentials"}"#)
            .create_async()
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let session = session(&server.url(), store.clone());
        session.bootstrap().await;

        let err = session.login("ada", "wrong").await.unwrap_err();
        assert_eq!(
            err.user_message("Login failed"),
            "No active account found with the given credentials"
        );
        assert!(!session.is_authenticated());
        assert_eq!(store.get_access().unwrap(), None);
    }

    #[tokio::test]
    async fn test_login_rolls_back_tokens_when_profile_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/login/")
            .with_status(200)
            .with_body(r#"{"access": "new-a", "refresh": "new-r"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/auth/profile/")
            .with_status(500)
            .create_async()
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let session = session(&server.url(), store.clone());

        let err = session.login("ada", "secret").await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(store.get_access().unwrap(), None);
        assert_eq!(store.get_refresh().unwrap(), None);
        assert!(session.user().is_none());
    }

    #[tokio::test]
    async fn test_register_stores_tokens_and_user() {
        let mut server = mockito::Server::new_async().await;
        let register = server
            .mock("POST", "/auth/register/")
            .match_body(Matcher::Json(json!({
                "username": "ada",
                "email": "ada@example.com",
                "password": "pw-123456",
                "password_confirm": "pw-123456"
            })))
            .with_status(201)
            .with_body(format!(
                r#"{{"user": {}, "tokens": {{"access": "a-1", "refresh": "r-1"}}, "message": "ok"}}"#,
                PROFILE
            ))
            .create_async()
            .await;
        let profile = server
            .mock("GET", "/auth/profile/")
            .expect(0)
            .create_async()
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let session = session(&server.url(), store.clone());
        let user = session
            .register(&RegisterRequest {
                username: "ada".to_string(),
                email: "ada@example.com".to_string(),
                password: "pw-123456".to_string(),
                password_confirm: "pw-123456".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(user.username, "ada");
        assert_eq!(session.user(), Some(user));
        assert_eq!(store.get_access().unwrap().as_deref(), Some("a-1"));
        assert_eq!(store.get_refresh().unwrap().as_deref(), Some("r-1"));
        register.assert_async().await;
        profile.assert_async().await;
    }

    #[tokio::test]
    async fn test_logout_notifies_backend() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/auth/profile/")
            .with_status(200)
            .with_body(PROFILE)
            .create_async()
            .await;
        let logout = server
            .mock("POST", "/auth/logout/")
            .match_header("authorization", "Bearer a")
            .match_body(Matcher::Json(json!({"refresh": "r"})))
            .with_status(205)
            .create_async()
            .await;

        let store = Arc::new(MemoryTokenStore::with_tokens("a", "r"));
        let session = session(&server.url(), store.clone());
        session.bootstrap().await;
        assert!(session.is_authenticated());

        session.logout().await;

        logout.assert_async().await;
        assert!(!session.is_authenticated());
        assert_eq!(store.get_access().unwrap(), None);
    }

    #[tokio::test]
    async fn test_state_changes_are_observable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/login/")
            .with_status(200)
            .with_body(r#"{"access": "a", "refresh": "r"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/auth/profile/")
            .with_status(200)
            .with_body(PROFILE)
            .create_async()
            .await;

        let session = session(&server.url(), Arc::new(MemoryTokenStore::new()));
        let mut rx = session.subscribe();

        session.bootstrap().await;
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().is_loading);

        session.login("ada", "pw").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_authenticated());
    }

    #[tokio::test]
    async fn test_failed_refresh_ends_session() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/auth/profile/")
            .match_header("authorization", "Bearer a")
            .with_status(200)
            .with_body(PROFILE)
            .create_async()
            .await;
        server
            .mock("GET", "/categories/")
            .with_status(401)
            .create_async()
            .await;
        server
            .mock("POST", "/auth/token/refresh/")
            .with_status(401)
            .create_async()
            .await;

        let store = Arc::new(MemoryTokenStore::with_tokens("a", "r"));
        let session = session(&server.url(), store.clone());
        session.bootstrap().await;
        assert!(session.is_authenticated());

        let err = session
            .client()
            .get::<serde_json::Value>("/categories/")
            .await
            .unwrap_err();

        assert!(err.is_unauthorized());
        assert!(!session.is_authenticated());
        assert_eq!(store.get_access().unwrap(), None);
        assert_eq!(guard(&session.state(), Route::Login), Guard::Render(Route::Login));
        assert_eq!(
            guard(&session.state(), Route::Expenses),
            Guard::Redirect(Route::Login)
        );
    }

    /// Serves the profile, but the logout call never reaches a server
    struct LogoutUnreachable;

    #[async_trait]
    impl Transport for LogoutUnreachable {
        async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
            if request.path == LOGOUT_PATH {
                return Err(ApiError::Network("connection refused".to_string()));
            }
            Ok(ApiResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::from_static(PROFILE.as_bytes()),
            })
        }
    }

    #[tokio::test]
    async fn test_logout_clears_user_when_backend_unreachable() {
        let store = Arc::new(MemoryTokenStore::with_tokens("a", "r"));
        let handle = SessionHandle::new();
        let client = Arc::new(ApiClient::new(
            Arc::new(LogoutUnreachable),
            session_stages(
                store.clone(),
                Arc::new(Router::default()),
                Arc::new(handle.clone()),
            ),
        ));
        let session = AuthSession::new(client, store.clone(), handle);
        session.bootstrap().await;
        assert_eq!(session.user().unwrap().username, "ada");

        session.logout().await;

        assert!(!session.is_authenticated());
        assert_eq!(store.get_access().unwrap(), None);
        assert_eq!(store.get_refresh().unwrap(), None);
    }

    #[test]
    fn test_end_session_keeps_loading_flag() {
        let handle = SessionHandle::new();
        handle.end_session();
        assert_eq!(handle.state(), AuthSessionState::default());
    }

    #[tokio::test]
    async fn test_login_network_error() {
        let store = Arc::new(MemoryTokenStore::new());
        let session = session("http://127.0.0.1:9", store.clone());
        let err = session.login("ada", "pw").await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        assert_eq!(store.get_access().unwrap(), None);
    }
}
