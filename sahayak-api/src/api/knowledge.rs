//! Peer knowledge exchange: shared solutions, mentor insights, curriculum
//! references, offline packs and the retrieval index

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use sahayak_common::models::{SharedSolution, SolutionStatus, UnknownVariant};
use sahayak_common::time;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{check_grade, check_length, paging, parse_id, MaybeSession, Message, Session};
use crate::db::solutions::{self, LibraryQuery, LibrarySort, NewSolution};
use crate::db::sos_requests;
use crate::error::{ApiError, ApiResult};
use crate::services::analytics::PROVEN_TRUST_SCORE;
use crate::services::knowledge_index::{DocumentKind, IndexStats, SearchFilter, SearchHit};
use crate::services::mentor::{self, MentorProfile, Nudge, WeeklyReport};
use crate::services::ncert::{self, NcertReference};
use crate::AppState;

const OFFLINE_PACK_LIMIT: i64 = 50;
const CONTEXT_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub problem_description: String,
    pub subject: String,
    pub grade: u32,
    pub topic: Option<String>,
    pub solution_title: String,
    pub solution_description: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub materials_needed: Vec<String>,
    pub time_required_minutes: Option<u32>,
    pub original_playbook_id: Option<uuid::Uuid>,
    pub is_anonymous: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LibraryParams {
    pub subject: Option<String>,
    pub grade: Option<u32>,
    pub sort_by: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub vote: i64,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub success: bool,
    pub your_vote: i64,
    pub voted_at: DateTime<Utc>,
    pub new_trust_score: f64,
    pub helpful_count: i64,
    pub not_helpful_count: i64,
    pub total_votes: i64,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct InsightsResponse {
    pub teacher_name: String,
    pub total_sos_requests: usize,
    pub engagement_score: f64,
    pub patterns: Vec<String>,
    pub suggestions: Vec<String>,
    pub strengths: Vec<String>,
    pub growth_areas: Vec<String>,
    pub pending_nudges: Vec<Nudge>,
}

#[derive(Debug, Deserialize)]
pub struct NcertParams {
    pub topic: String,
    pub grade: Option<u32>,
    pub subject: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct NcertResponse {
    pub topic: String,
    pub results: Vec<NcertReference>,
}

#[derive(Debug, Deserialize)]
pub struct OfflinePackParams {
    pub language: Option<String>,
    pub grade: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct OfflineProblem {
    pub id: uuid::Uuid,
    pub problem: String,
    pub solution: String,
    pub steps: Vec<String>,
    pub subject: String,
    pub grade: u32,
}

impl From<SharedSolution> for OfflineProblem {
    fn from(s: SharedSolution) -> Self {
        Self {
            id: s.id,
            problem: s.problem_description,
            solution: s.solution_description,
            steps: s.steps,
            subject: s.subject,
            grade: s.grade,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OfflinePack {
    pub version: String,
    pub language: String,
    pub problem_count: usize,
    pub generated_at: String,
    pub problems: Vec<OfflineProblem>,
}

#[derive(Debug, Deserialize)]
pub struct SyncParams {
    pub current_version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub needs_update: bool,
    pub latest_version: String,
    pub current_version: String,
}

#[derive(Debug, Deserialize)]
pub struct RagParams {
    pub query: String,
    pub subject: Option<String>,
    pub grade: Option<u32>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RagResponse {
    pub query: String,
    pub sources: Vec<SearchHit>,
    pub context_preview: Option<String>,
}

fn bounded_limit(requested: Option<usize>, default: usize, max: usize) -> ApiResult<usize> {
    let limit = requested.unwrap_or(default);
    if !(1..=max).contains(&limit) {
        return Err(ApiError::BadRequest(format!("limit must be between 1 and {}", max)));
    }
    Ok(limit)
}

fn preview(text: &str) -> String {
    text.chars().take(CONTEXT_PREVIEW_CHARS).collect()
}

async fn find_solution(state: &AppState, raw_id: &str) -> ApiResult<SharedSolution> {
    let id = parse_id(raw_id, "Solution")?;
    solutions::get_solution(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Solution not found".to_string()))
}

/// POST /knowledge/share
pub async fn share_solution(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<ShareRequest>,
) -> ApiResult<(StatusCode, Json<SharedSolution>)> {
    check_length("problem_description", &body.problem_description, 10, 2000)?;
    check_length("solution_title", &body.solution_title, 5, 200)?;
    check_length("solution_description", &body.solution_description, 20, 5000)?;
    if body.subject.trim().is_empty() {
        return Err(ApiError::BadRequest("subject is required".to_string()));
    }
    check_grade(Some(body.grade))?;

    let user = &session.user;
    let new = NewSolution {
        teacher_id: user.id,
        teacher_name: user.name.clone(),
        school_id: user.school_id.clone(),
        district: user.district.clone(),
        problem_description: body.problem_description.trim().to_string(),
        subject: body.subject.trim().to_string(),
        grade: body.grade,
        topic: body.topic,
        solution_title: body.solution_title.trim().to_string(),
        solution_description: body.solution_description.trim().to_string(),
        steps: body.steps,
        materials_needed: body.materials_needed,
        time_required_minutes: body.time_required_minutes.unwrap_or(10),
        original_playbook_id: body.original_playbook_id,
        is_anonymous: body.is_anonymous.unwrap_or(true),
        tags: body.tags,
        language: user.preferred_language.clone(),
    };
    let solution = solutions::insert_solution(&state.db, &new).await?;

    state
        .index
        .add_shared_solution(
            &solution.problem_description,
            &solution.solution_title,
            &solution.solution_description,
            &solution.subject,
            solution.grade,
        )
        .await;

    info!(solution_id = %solution.id, teacher_id = %user.id, "Solution shared");
    Ok((StatusCode::CREATED, Json(solution.masked())))
}

/// GET /knowledge/library
pub async fn browse_library(
    State(state): State<AppState>,
    Query(params): Query<LibraryParams>,
) -> ApiResult<Json<Vec<SharedSolution>>> {
    check_grade(params.grade)?;
    let sort = match params.sort_by.as_deref() {
        None => LibrarySort::default(),
        Some(raw) => LibrarySort::parse(raw).ok_or_else(|| {
            ApiError::BadRequest(
                "sort_by must be one of trust_score, usage_count, created_at".to_string(),
            )
        })?,
    };
    let (skip, limit) = paging(params.skip, params.limit, 20, 50)?;

    let query = LibraryQuery {
        subject: params.subject,
        grade: params.grade,
        sort,
        skip,
        limit,
    };
    let found = solutions::list_published(&state.db, &query).await?;
    Ok(Json(found.into_iter().map(SharedSolution::masked).collect()))
}

/// GET /knowledge/library/:id
///
/// Unpublished solutions are visible to their author and to supervisors only.
/// Each view counts as a use.
pub async fn view_solution(
    State(state): State<AppState>,
    Extension(MaybeSession(session)): Extension<MaybeSession>,
    Path(id): Path<String>,
) -> ApiResult<Json<SharedSolution>> {
    let solution = find_solution(&state, &id).await?;
    if !solution.status.is_published() {
        let allowed = session.as_ref().is_some_and(|s| {
            s.user.id == solution.teacher_id || s.user.role.is_supervisor()
        });
        if !allowed {
            return Err(ApiError::NotFound("Solution not found".to_string()));
        }
    }

    let solution = solutions::record_usage(&state.db, solution.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Solution not found".to_string()))?;
    Ok(Json(solution.masked()))
}

/// POST /knowledge/library/:id/vote
pub async fn vote_solution(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(body): Json<VoteRequest>,
) -> ApiResult<Json<VoteResponse>> {
    if !(-1..=1).contains(&body.vote) {
        return Err(ApiError::BadRequest("vote must be -1, 0 or 1".to_string()));
    }
    let solution = find_solution(&state, &id).await?;
    if solution.teacher_id == session.user.id {
        return Err(ApiError::BadRequest("Cannot vote on your own solution".to_string()));
    }

    let tally = solutions::cast_vote(
        &state.db,
        solution.id,
        session.user.id,
        &session.user.name,
        body.vote,
        body.comment.as_deref(),
    )
    .await?;

    Ok(Json(VoteResponse {
        success: true,
        your_vote: tally.ballot.vote,
        voted_at: tally.ballot.voted_at,
        new_trust_score: tally.trust_score,
        helpful_count: tally.helpful_count,
        not_helpful_count: tally.not_helpful_count,
        total_votes: tally.total_votes,
    }))
}

/// PUT /knowledge/library/:id/status
pub async fn moderate_solution(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(body): Json<StatusRequest>,
) -> ApiResult<Json<Message>> {
    session.require_supervisor()?;
    let status: SolutionStatus = body
        .status
        .parse()
        .map_err(|e: UnknownVariant| ApiError::BadRequest(e.to_string()))?;
    let solution = find_solution(&state, &id).await?;
    let id = solution.id;

    if !solutions::set_status(&state.db, id, status).await? {
        return Err(ApiError::NotFound("Solution not found".to_string()));
    }

    // The index holds every solution that is not archived
    if status == SolutionStatus::Archived {
        state
            .index
            .remove_shared_solution(
                &solution.problem_description,
                &solution.solution_title,
                &solution.solution_description,
                &solution.subject,
                solution.grade,
            )
            .await;
    } else {
        state
            .index
            .add_shared_solution(
                &solution.problem_description,
                &solution.solution_title,
                &solution.solution_description,
                &solution.subject,
                solution.grade,
            )
            .await;
    }
    info!(solution_id = %id, status = %status, moderator = %session.user.id, "Solution status changed");
    Ok(Json(Message::new(format!("Solution status set to {}", status))))
}

/// GET /knowledge/my-solutions
pub async fn my_solutions(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Vec<SharedSolution>>> {
    let (skip, limit) = paging(params.skip, params.limit, 20, 50)?;
    let own = solutions::list_by_teacher(&state.db, session.user.id, skip, limit).await?;
    Ok(Json(own))
}

/// GET /knowledge/mentor/insights
pub async fn mentor_insights(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<InsightsResponse>> {
    let history = sos_requests::history_for_teacher(&state.db, session.user.id).await?;
    let profile = MentorProfile::from_history(&history, time::now());
    let insights = profile.insights();

    Ok(Json(InsightsResponse {
        teacher_name: session.user.name,
        total_sos_requests: profile.total_sos_requests,
        engagement_score: profile.engagement_score,
        patterns: insights.patterns,
        suggestions: insights.suggestions,
        strengths: insights.strengths,
        growth_areas: insights.growth_areas,
        pending_nudges: insights.pending_nudges,
    }))
}

/// GET /knowledge/mentor/weekly-report
pub async fn weekly_report(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<WeeklyReport>> {
    let history = sos_requests::history_for_teacher(&state.db, session.user.id).await?;
    Ok(Json(mentor::weekly_report(&session.user, &history, time::now())))
}

/// GET /knowledge/ncert/search
pub async fn ncert_search(Query(params): Query<NcertParams>) -> ApiResult<Json<NcertResponse>> {
    if params.topic.trim().chars().count() < 2 {
        return Err(ApiError::BadRequest("topic must be at least 2 characters".to_string()));
    }
    check_grade(params.grade)?;
    let limit = bounded_limit(params.limit, 5, 20)?;

    let topic = params.topic.trim().to_string();
    let mut results = ncert::search(params.subject.as_deref(), params.grade, Some(&topic));
    results.truncate(limit);
    Ok(Json(NcertResponse { topic, results }))
}

/// GET /knowledge/offline/pack
pub async fn offline_pack(
    State(state): State<AppState>,
    Query(params): Query<OfflinePackParams>,
) -> ApiResult<Json<OfflinePack>> {
    check_grade(params.grade)?;
    let trusted = solutions::list_trusted(
        &state.db,
        &[SolutionStatus::Approved],
        PROVEN_TRUST_SCORE,
        params.grade,
        OFFLINE_PACK_LIMIT,
    )
    .await?;
    let problems: Vec<OfflineProblem> = trusted.into_iter().map(OfflineProblem::from).collect();

    Ok(Json(OfflinePack {
        version: state.config.offline_pack_version.clone(),
        language: params.language.unwrap_or_else(|| "en".to_string()),
        problem_count: problems.len(),
        generated_at: time::now().to_rfc3339(),
        problems,
    }))
}

/// POST /knowledge/offline/sync
pub async fn offline_sync(
    State(state): State<AppState>,
    Extension(_session): Extension<Session>,
    Query(params): Query<SyncParams>,
) -> Json<SyncResponse> {
    let current_version = params.current_version.unwrap_or_else(|| "1.0.0".to_string());
    let latest_version = state.config.offline_pack_version.clone();
    Json(SyncResponse {
        needs_update: current_version != latest_version,
        latest_version,
        current_version,
    })
}

/// GET /knowledge/rag/search
pub async fn rag_search(
    State(state): State<AppState>,
    Query(params): Query<RagParams>,
) -> ApiResult<Json<RagResponse>> {
    let query = params.query.trim().to_string();
    if query.chars().count() < 3 {
        return Err(ApiError::BadRequest("query must be at least 3 characters".to_string()));
    }
    check_grade(params.grade)?;
    let limit = bounded_limit(params.limit, 5, 10)?;
    let kind = match params.kind.as_deref() {
        None => None,
        Some(raw) => Some(
            DocumentKind::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown document type '{}'", raw)))?,
        ),
    };

    let filter = SearchFilter {
        kind,
        subject: params.subject.clone(),
        grade: params.grade,
    };
    let sources = state.index.search(&query, limit, &filter).await;
    let context_preview = state
        .index
        .augmented_context(&query, params.subject.as_deref(), params.grade)
        .await
        .map(|c| preview(&c));

    Ok(Json(RagResponse {
        query,
        sources,
        context_preview,
    }))
}

/// GET /knowledge/rag/stats
pub async fn rag_stats(State(state): State<AppState>) -> Json<IndexStats> {
    Json(state.index.stats().await)
}

/// Knowledge routes that need a session
pub fn member_routes() -> Router<AppState> {
    Router::new()
        .route("/knowledge/share", post(share_solution))
        .route("/knowledge/library/:id/vote", post(vote_solution))
        .route("/knowledge/library/:id/status", put(moderate_solution))
        .route("/knowledge/my-solutions", get(my_solutions))
        .route("/knowledge/mentor/insights", get(mentor_insights))
        .route("/knowledge/mentor/weekly-report", get(weekly_report))
        .route("/knowledge/offline/sync", post(offline_sync))
}

/// Library browsing; session optional
pub fn library_routes() -> Router<AppState> {
    Router::new()
        .route("/knowledge/library", get(browse_library))
        .route("/knowledge/library/:id", get(view_solution))
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/knowledge/ncert/search", get(ncert_search))
        .route("/knowledge/offline/pack", get(offline_pack))
        .route("/knowledge/rag/search", get(rag_search))
        .route("/knowledge/rag/stats", get(rag_stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_limit() {
        assert_eq!(bounded_limit(None, 5, 10).unwrap(), 5);
        assert_eq!(bounded_limit(Some(10), 5, 10).unwrap(), 10);
        assert!(bounded_limit(Some(0), 5, 10).is_err());
        assert!(bounded_limit(Some(11), 5, 10).is_err());
    }

    #[test]
    fn test_preview_truncates_on_characters() {
        let text = "ಅ".repeat(600);
        assert_eq!(preview(&text).chars().count(), CONTEXT_PREVIEW_CHARS);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_share_request_defaults() {
        let body: ShareRequest = serde_json::from_str(
            r#"{
                "problem_description": "Students mix up place values",
                "subject": "Mathematics",
                "grade": 3,
                "solution_title": "Bundle sticks",
                "solution_description": "Use bundles of ten sticks to show tens and ones"
            }"#,
        )
        .unwrap();
        assert!(body.steps.is_empty());
        assert!(body.is_anonymous.is_none());
        assert!(body.time_required_minutes.is_none());
    }
}
