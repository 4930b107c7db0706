//! Bearer-token authentication middleware
//!
//! The token is resolved once per request into a `Session` carrying the
//! caller's user record; handlers receive it as a request extension.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use sahayak_common::auth::{extract_bearer, TokenType};
use sahayak_common::models::User;
use tracing::debug;

use crate::db::users;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Authenticated caller
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
}

impl Session {
    /// CRP and DIET accounts only
    pub fn require_supervisor(&self) -> ApiResult<()> {
        if self.user.role.is_supervisor() {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "This action requires a CRP or DIET account".to_string(),
            ))
        }
    }
}

/// Caller on optional-auth routes; `None` for anonymous requests
#[derive(Debug, Clone, Default)]
pub struct MaybeSession(pub Option<Session>);

async fn resolve_session(state: &AppState, headers: &HeaderMap) -> ApiResult<Option<Session>> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Malformed Authorization header".to_string()))?;
    let token = extract_bearer(value)
        .ok_or_else(|| ApiError::Unauthorized("Expected a bearer token".to_string()))?;

    let claims = state.tokens.verify(token, TokenType::Access)?;
    let user = users::get_user(&state.db, claims.user_id()?)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".to_string()))?;

    if !user.is_active {
        return Err(ApiError::BadRequest("Inactive user".to_string()));
    }
    Ok(Some(Session { user }))
}

/// Rejects requests without a valid access token
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let session = resolve_session(&state, request.headers())
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))?;
    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

/// Attaches a session when a valid token is present; otherwise anonymous
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let session = match resolve_session(&state, request.headers()).await {
        Ok(session) => session,
        Err(e) => {
            debug!("Treating request as anonymous: {}", e);
            None
        }
    };
    request.extensions_mut().insert(MaybeSession(session));
    next.run(request).await
}
