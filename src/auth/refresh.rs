// Token refresh call

use crate::error::{ApiError, Result};
use crate::http_client::{ApiRequest, Transport};

use super::types::{RefreshRequest, RefreshResponse};

pub const REFRESH_PATH: &str = "/auth/token/refresh/";

/// Exchange a refresh token for a new access token.
///
/// Goes straight to the transport: no bearer header is attached and a
/// failure here is never itself refreshed or retried.
pub async fn refresh_access_token(transport: &dyn Transport, refresh_token: &str) -> Result<String> {
    let request = ApiRequest::post(REFRESH_PATH).with_json(&RefreshRequest {
        refresh: refresh_token.to_string(),
    })?;

    tracing::info!(request_id = %request.id, "Refreshing access token...");

    let response = transport.send(&request).await?;
    if !response.status.is_success() {
        tracing::warn!(
            status = response.status.as_u16(),
            body = %response.text(),
            "Token refresh rejected"
        );
    }

    let data: RefreshResponse = response.into_result()?.json()?;
    if data.access.is_empty() {
        return Err(ApiError::Decode(
            "Refresh response does not contain an access token".to_string(),
        ));
    }

    tracing::info!("Access token refreshed");
    Ok(data.access)
}
