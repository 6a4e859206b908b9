//! Caller identification. Lorelai sits behind an authenticating proxy that
//! forwards the signed-in user as `x-lorelai-user`; when an API key is
//! configured the proxy must also present it as `x-api-key`.

use crate::errors::ApiError;
use crate::state::AppState;
use axum::http::HeaderMap;
use lorelai_core::config::Secret;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const USER_HEADER: &str = "x-lorelai-user";

/// The organisation and user a request acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tenant {
    pub org_id: i64,
    pub user_id: i64,
}

pub fn require_api_key(headers: &HeaderMap, expected: Option<&Secret>) -> Result<(), ApiError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let header_value = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if header_value.is_empty() || header_value != expected.expose() {
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

/// Resolves the calling user to its organisation. Users without one cannot
/// see tenant data.
pub fn tenant(state: &AppState, headers: &HeaderMap) -> Result<Tenant, ApiError> {
    require_api_key(headers, state.api_key.as_ref())?;

    let raw = headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ApiError::Unauthorized)?;
    let user_id: i64 = raw
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid {} header '{}'", USER_HEADER, raw)))?;

    let user = state
        .store
        .get_user(user_id)?
        .ok_or(ApiError::Unauthorized)?;
    let org_id = user
        .org_id
        .ok_or_else(|| ApiError::Forbidden(format!("user {} has no organisation", user_id)))?;
    Ok(Tenant { org_id, user_id })
}
