//! SOS submission, history and feedback endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use sahayak_common::models::{InputType, Playbook, PlaybookContent, SosRequest, SosStatus};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::{check_grade, check_length, paging, parse_id, MaybeSession, Message, Session};
use crate::db::sos_requests::{self, NewSosRequest};
use crate::db::{playbooks, users};
use crate::error::{ApiError, ApiResult};
use crate::services::context_engine::ContextOverrides;
use crate::services::pedagogy_engine::ProcessOutcome;
use crate::AppState;

const MIN_INPUT_CHARS: usize = 5;
const MAX_INPUT_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct SosCreateRequest {
    pub raw_input: String,
    pub input_type: Option<String>,
    pub input_language: Option<String>,
    pub subject: Option<String>,
    pub grade: Option<u32>,
    pub topic: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuickSosParams {
    pub raw_input: String,
    pub subject: Option<String>,
    pub grade: Option<u32>,
    pub topic: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub was_helpful: bool,
    pub effectiveness_rating: u8,
    pub feedback_text: Option<String>,
}

/// Request record with its playbook, if one was produced
#[derive(Debug, Serialize)]
pub struct SosWithPlaybook {
    #[serde(flatten)]
    pub request: SosRequest,
    pub playbook: Option<Playbook>,
}

impl From<ProcessOutcome> for SosWithPlaybook {
    fn from(outcome: ProcessOutcome) -> Self {
        Self {
            request: outcome.request,
            playbook: outcome.playbook,
        }
    }
}

/// Compact result for the quick endpoint
#[derive(Debug, Serialize)]
pub struct QuickSosResponse {
    pub success: bool,
    pub sos_id: Uuid,
    pub problem: String,
    pub detected_subject: Option<String>,
    pub detected_grade: Option<u32>,
    pub urgency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playbook: Option<PlaybookContent>,
    pub processing_time_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn validate_input(raw_input: &str, grade: Option<u32>) -> ApiResult<()> {
    check_length("raw_input", raw_input, MIN_INPUT_CHARS, MAX_INPUT_CHARS)?;
    check_grade(grade)
}

fn overrides(subject: Option<String>, grade: Option<u32>, topic: Option<String>) -> ContextOverrides {
    ContextOverrides { subject, grade, topic }
}

/// POST /sos
pub async fn create_sos(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<SosCreateRequest>,
) -> ApiResult<(StatusCode, Json<SosWithPlaybook>)> {
    validate_input(&body.raw_input, body.grade)?;
    let input_type = match body.input_type.as_deref() {
        None => InputType::Text,
        Some(raw) => raw
            .parse::<InputType>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
    };

    let user = &session.user;
    let new = NewSosRequest {
        teacher_id: Some(user.id),
        teacher_name: Some(user.name.clone()),
        raw_input: body.raw_input.trim().to_string(),
        input_type,
        input_language: body
            .input_language
            .unwrap_or_else(|| user.preferred_language.clone()),
        subject: body.subject.clone(),
        grade: body.grade,
        topic: body.topic.clone(),
        school_id: user.school_id.clone(),
        district: user.district.clone(),
    };

    let outcome = state
        .engine
        .submit(&new, &overrides(body.subject, body.grade, body.topic))
        .await?;

    // The request exists either way; a stale counter must not fail the call
    if let Err(e) = users::increment_sos_count(&state.db, user.id).await {
        warn!(user_id = %user.id, "Failed to increment SOS counter: {}", e);
    }

    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// POST /sos/quick
///
/// Query-string submission; works without a session.
pub async fn quick_sos(
    State(state): State<AppState>,
    Extension(MaybeSession(session)): Extension<MaybeSession>,
    Query(params): Query<QuickSosParams>,
) -> ApiResult<Json<QuickSosResponse>> {
    validate_input(&params.raw_input, params.grade)?;

    let user = session.as_ref().map(|s| &s.user);
    let new = NewSosRequest {
        teacher_id: user.map(|u| u.id),
        teacher_name: Some(
            user.map(|u| u.name.clone())
                .unwrap_or_else(|| "Anonymous Teacher".to_string()),
        ),
        raw_input: params.raw_input.trim().to_string(),
        input_type: InputType::Text,
        input_language: params.language.unwrap_or_else(|| "en".to_string()),
        subject: params.subject.clone(),
        grade: params.grade,
        topic: params.topic.clone(),
        school_id: user.and_then(|u| u.school_id.clone()),
        district: user.and_then(|u| u.district.clone()),
    };

    let outcome = state
        .engine
        .submit(&new, &overrides(params.subject, params.grade, params.topic))
        .await?;
    let request = outcome.request;
    let success = outcome.playbook.is_some();

    Ok(Json(QuickSosResponse {
        success,
        sos_id: request.id,
        problem: request.raw_input,
        detected_subject: request.subject,
        detected_grade: request.grade,
        urgency: request.urgency.to_string(),
        playbook: outcome.playbook.map(|p| p.content),
        processing_time_ms: request.processing_time_ms,
        error: (!success).then(|| "Failed to generate playbook".to_string()),
    }))
}

/// GET /sos
pub async fn list_sos(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Json<Vec<SosRequest>>> {
    let (skip, limit) = paging(params.skip, params.limit, 10, 50)?;
    // Unknown status values are ignored rather than rejected
    let status = params
        .status
        .as_deref()
        .and_then(|s| s.parse::<SosStatus>().ok());

    let requests = sos_requests::list_for_teacher(&state.db, session.user.id, status, skip, limit).await?;
    Ok(Json(requests))
}

/// GET /sos/:id
///
/// Owners and supervisors only. Each read counts as a playbook view.
pub async fn get_sos(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> ApiResult<Json<SosWithPlaybook>> {
    let id = parse_id(&id, "SOS request")?;
    let request = sos_requests::get_request(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("SOS request not found".to_string()))?;

    let is_owner = request.teacher_id == Some(session.user.id);
    if !is_owner && !session.user.role.is_supervisor() {
        return Err(ApiError::Forbidden(
            "Not authorized to view this SOS request".to_string(),
        ));
    }

    let playbook = match request.playbook_id {
        Some(playbook_id) => playbooks::record_view(&state.db, playbook_id).await?,
        None => None,
    };

    Ok(Json(SosWithPlaybook { request, playbook }))
}

/// POST /sos/:id/feedback
pub async fn submit_feedback(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(body): Json<FeedbackRequest>,
) -> ApiResult<Json<Message>> {
    if !(1..=5).contains(&body.effectiveness_rating) {
        return Err(ApiError::BadRequest(
            "effectiveness_rating must be between 1 and 5".to_string(),
        ));
    }

    let id = parse_id(&id, "SOS request")?;
    let request = sos_requests::get_request(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("SOS request not found".to_string()))?;
    if request.teacher_id != Some(session.user.id) {
        return Err(ApiError::Forbidden(
            "Not authorized to give feedback on this request".to_string(),
        ));
    }

    sos_requests::record_feedback(
        &state.db,
        id,
        body.was_helpful,
        Some(body.effectiveness_rating),
        body.feedback_text.as_deref(),
    )
    .await?;
    if let Some(playbook_id) = request.playbook_id {
        playbooks::record_feedback(
            &state.db,
            playbook_id,
            body.was_helpful,
            Some(body.effectiveness_rating),
        )
        .await?;
    }

    info!(sos_id = %id, helpful = body.was_helpful, "Feedback recorded");
    Ok(Json(Message::new("Thank you for your feedback!")))
}

/// Session-only SOS routes
pub fn sos_routes() -> Router<AppState> {
    Router::new()
        .route("/sos", post(create_sos).get(list_sos))
        .route("/sos/:id", get(get_sos))
        .route("/sos/:id/feedback", post(submit_feedback))
}

/// Quick submission; session optional
pub fn quick_routes() -> Router<AppState> {
    Router::new().route("/sos/quick", post(quick_sos))
}
