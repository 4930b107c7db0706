//! Registration, login and profile endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use once_cell::sync::Lazy;
use regex::Regex;
use sahayak_common::auth::{hash_password, verify_password, TokenType};
use sahayak_common::models::{Role, User};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{check_length, Session};
use crate::db::users::{self, NewUser, ProfileUpdate};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const MIN_PASSWORD_CHARS: usize = 6;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    pub school_id: Option<String>,
    pub school_name: Option<String>,
    pub district: Option<String>,
    pub block: Option<String>,
    pub state: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub grades: Vec<u32>,
    pub preferred_language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Editable profile fields; anything else in the body is ignored
#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdateRequest {
    pub name: Option<String>,
    pub school_id: Option<String>,
    pub school_name: Option<String>,
    pub district: Option<String>,
    pub block: Option<String>,
    pub phone: Option<String>,
    pub subjects: Option<Vec<String>>,
    pub grades: Option<Vec<u32>>,
    pub preferred_language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub user: User,
}

fn issue_tokens(state: &AppState, user: User) -> ApiResult<TokenResponse> {
    Ok(TokenResponse {
        access_token: state.tokens.issue_access(user.id, user.role)?,
        refresh_token: state.tokens.issue_refresh(user.id, user.role)?,
        token_type: "bearer",
        expires_in: state.tokens.access_ttl_secs(),
        user,
    })
}

fn validate_grades(grades: &[u32]) -> ApiResult<()> {
    if grades.iter().any(|g| !(1..=12).contains(g)) {
        return Err(ApiError::BadRequest("grades must be between 1 and 12".to_string()));
    }
    Ok(())
}

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<TokenResponse>)> {
    let email = body.email.trim().to_lowercase();
    if !EMAIL_RE.is_match(&email) {
        return Err(ApiError::BadRequest("A valid email address is required".to_string()));
    }
    if body.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_CHARS
        )));
    }
    check_length("name", &body.name, 2, 100)?;
    validate_grades(&body.grades)?;

    // Unknown roles register as teachers
    let role = body
        .role
        .as_deref()
        .and_then(|r| r.parse::<Role>().ok())
        .unwrap_or_default();

    let user = users::create_user(
        &state.db,
        &NewUser {
            email,
            name: body.name,
            password_hash: hash_password(&body.password)?,
            role,
            school_id: body.school_id,
            school_name: body.school_name,
            district: body.district,
            block: body.block,
            state: body.state,
            phone: body.phone,
            subjects: body.subjects,
            grades: body.grades,
            preferred_language: body.preferred_language.unwrap_or_else(|| "en".to_string()),
        },
    )
    .await?;

    info!(user_id = %user.id, role = %user.role, "User registered");
    Ok((StatusCode::CREATED, Json(issue_tokens(&state, user)?)))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let user = users::get_user_by_email(&state.db, &body.email)
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(&body.password, &user.password_hash) {
        return Err(invalid());
    }
    if !user.is_active {
        return Err(ApiError::BadRequest("User account is disabled".to_string()));
    }

    users::touch_last_login(&state.db, user.id).await?;
    let user = users::get_user(&state.db, user.id).await?.ok_or_else(invalid)?;
    Ok(Json(issue_tokens(&state, user)?))
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let claims = state.tokens.verify(&body.refresh_token, TokenType::Refresh)?;
    let user = users::get_user(&state.db, claims.user_id()?)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".to_string()))?;
    if !user.is_active {
        return Err(ApiError::BadRequest("User account is disabled".to_string()));
    }
    Ok(Json(issue_tokens(&state, user)?))
}

/// GET /auth/me
pub async fn me(Extension(session): Extension<Session>) -> Json<User> {
    Json(session.user)
}

/// PUT /auth/me
pub async fn update_me(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<ProfileUpdateRequest>,
) -> ApiResult<Json<User>> {
    if let Some(name) = &body.name {
        check_length("name", name, 2, 100)?;
    }
    if let Some(grades) = &body.grades {
        validate_grades(grades)?;
    }

    let update = ProfileUpdate {
        name: body.name.map(|n| n.trim().to_string()),
        school_id: body.school_id,
        school_name: body.school_name,
        district: body.district,
        block: body.block,
        phone: body.phone,
        subjects: body.subjects,
        grades: body.grades,
        preferred_language: body.preferred_language,
    };
    let user = users::update_profile(&state.db, session.user.id, &update).await?;
    Ok(Json(user))
}

/// Unauthenticated account routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

/// Profile routes; require a session
pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(me).put(update_me))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_pattern() {
        assert!(EMAIL_RE.is_match("asha@school.in"));
        assert!(!EMAIL_RE.is_match("asha@school"));
        assert!(!EMAIL_RE.is_match("asha school@x.in"));
    }

    #[test]
    fn test_profile_update_ignores_unknown_fields() {
        let body: ProfileUpdateRequest =
            serde_json::from_str(r#"{"name": "Asha", "role": "diet", "email": "x@y.z"}"#).unwrap();
        assert_eq!(body.name.as_deref(), Some("Asha"));
        assert!(body.subjects.is_none());
    }
}
