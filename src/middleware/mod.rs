// Request pipeline stages: bearer injection and refresh-on-401

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use std::sync::Arc;

use crate::auth::{refresh, SessionSink, TokenStore};
use crate::error::Result;
use crate::http_client::{ApiRequest, ApiResponse, Middleware, Next};
use crate::routes::Navigator;

/// Attaches the stored access token as a bearer credential.
///
/// Requests go out unauthenticated when no token is stored. A header
/// already present on the request (a retry patched after refresh) is kept.
pub struct BearerAuth {
    store: Arc<dyn TokenStore>,
}

impl BearerAuth {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Middleware for BearerAuth {
    async fn handle(&self, mut request: ApiRequest, next: Next<'_>) -> Result<ApiResponse> {
        if !request.headers.contains_key(AUTHORIZATION) {
            if let Some(token) = self.store.get_access()? {
                request.set_bearer(&token)?;
            }
        }
        next.run(request).await
    }
}

/// Recovers from an expired access token.
///
/// On a 401 for a request that has not been retried yet, the refresh token
/// is exchanged for a new access token and the original request is issued
/// once more. Refresh failure clears the tokens, ends the session, redirects
/// to login and hands the original 401 back to the caller.
pub struct RefreshOn401 {
    store: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
    session: Arc<dyn SessionSink>,
}

impl RefreshOn401 {
    pub fn new(
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
        session: Arc<dyn SessionSink>,
    ) -> Self {
        Self {
            store,
            navigator,
            session,
        }
    }
}

#[async_trait]
impl Middleware for RefreshOn401 {
    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<ApiResponse> {
        let mut original = request.clone();
        let response = next.run(request).await?;

        if response.status != StatusCode::UNAUTHORIZED || original.retried {
            return Ok(response);
        }
        original.retried = true;

        let Some(refresh_token) = self.store.get_refresh()? else {
            tracing::debug!(
                request_id = %original.id,
                "Received 401 with no refresh token stored"
            );
            return Ok(response);
        };

        tracing::warn!(
            request_id = %original.id,
            path = %original.path,
            "Received 401, refreshing token and retrying..."
        );

        match refresh::refresh_access_token(next.transport(), &refresh_token).await {
            Ok(access) => {
                // The refresh token is not rotated client-side
                self.store.set(&access, &refresh_token)?;
                original.set_bearer(&access)?;
                next.run(original).await
            }
            Err(e) => {
                tracing::error!("Token refresh failed: {}", e);
                if let Err(clear_err) = self.store.clear() {
                    tracing::error!("Failed to clear tokens: {}", clear_err);
                }
                self.session.end_session();
                self.navigator.redirect_to_login();
                Ok(response)
            }
        }
    }
}

/// Standard pipeline: refresh handling wraps bearer injection so a retried
/// request picks up the refreshed token on its way back through.
pub fn session_stages(
    store: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
    session: Arc<dyn SessionSink>,
) -> Vec<Arc<dyn Middleware>> {
    vec![
        Arc::new(RefreshOn401::new(store.clone(), navigator, session)),
        Arc::new(BearerAuth::new(store)),
    ]
}
