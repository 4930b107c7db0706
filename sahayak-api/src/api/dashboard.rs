//! Role-scoped dashboards

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use sahayak_common::models::{Role, SolutionStatus, User};
use sahayak_common::time;
use serde::Deserialize;
use uuid::Uuid;

use super::{paging, Session};
use crate::db::solutions::{self, ContributorTotals};
use crate::db::sos_requests::{self, RequestScope};
use crate::db::{playbooks, users};
use crate::error::{ApiError, ApiResult};
use crate::services::analytics::{self, Overview, PROVEN_TRUST_SCORE};
use crate::AppState;

const MAX_DAYS: i64 = 30;
const SUPERVISOR_DEFAULT_DAYS: i64 = 7;
const TEACHER_DEFAULT_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct DashboardParams {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TeacherListParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

fn window_days(requested: Option<i64>, default: i64) -> ApiResult<i64> {
    let days = requested.unwrap_or(default);
    if !(1..=MAX_DAYS).contains(&days) {
        return Err(ApiError::BadRequest(format!("days must be between 1 and {}", MAX_DAYS)));
    }
    Ok(days)
}

async fn contributors_among(state: &AppState, teachers: &[User]) -> ApiResult<Vec<ContributorTotals>> {
    let ids: Vec<Uuid> = teachers.iter().map(|t| t.id).collect();
    Ok(solutions::contributor_totals(&state.db, Some(&ids)).await?)
}

/// GET /dashboard/:role
pub async fn role_dashboard(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(role): Path<String>,
    Query(params): Query<DashboardParams>,
) -> ApiResult<Response> {
    let target: Role = role
        .parse()
        .map_err(|_| ApiError::NotFound(format!("No dashboard for '{}'", role)))?;
    let user = &session.user;
    if !user.role.can_view_dashboard(target) {
        return Err(ApiError::Forbidden(format!(
            "A {} account cannot open the {} dashboard",
            user.role, target
        )));
    }

    let now = time::now();
    let response = match target {
        Role::Teacher => {
            let days = window_days(params.days, TEACHER_DEFAULT_DAYS)?;
            let history = sos_requests::history_for_teacher(&state.db, user.id).await?;
            Json(analytics::teacher_dashboard(user, &history, days, now)).into_response()
        }
        Role::Crp => {
            let days = window_days(params.days, SUPERVISOR_DEFAULT_DAYS)?;
            let district = user.district.as_deref();
            let block = user.block.as_deref();
            let teachers = users::list_teachers(&state.db, district, block).await?;
            let scope = RequestScope {
                teacher_id: None,
                district: user.district.clone(),
                block: user.block.clone(),
            };
            let requests = sos_requests::list_since(&state.db, &time::days_ago(days), &scope).await?;
            let proven = solutions::list_trusted(
                &state.db,
                &SolutionStatus::PUBLISHED,
                PROVEN_TRUST_SCORE,
                None,
                10,
            )
            .await?;
            let contributors = contributors_among(&state, &teachers).await?;
            let proven: Vec<_> = proven.into_iter().map(|s| s.masked()).collect();
            Json(analytics::cluster_dashboard(
                &teachers,
                &requests,
                &proven,
                &contributors,
                days,
                now,
            ))
            .into_response()
        }
        Role::Diet => {
            let days = window_days(params.days, SUPERVISOR_DEFAULT_DAYS)?;
            let teachers = users::list_teachers(&state.db, user.district.as_deref(), None).await?;
            let scope = RequestScope {
                teacher_id: None,
                district: user.district.clone(),
                block: None,
            };
            let requests = sos_requests::list_since(&state.db, &time::days_ago(days), &scope).await?;
            let contributors = contributors_among(&state, &teachers).await?;
            Json(analytics::district_dashboard(
                &teachers,
                &requests,
                &contributors,
                days,
                now,
            ))
            .into_response()
        }
    };
    Ok(response)
}

/// GET /dashboard/overview
pub async fn overview(State(state): State<AppState>) -> ApiResult<Json<Overview>> {
    let user_count = users::count_users(&state.db).await?;
    let (total, resolved) = sos_requests::status_totals(&state.db).await?;
    let playbook_count = playbooks::count_playbooks(&state.db).await?;
    Ok(Json(analytics::overview(user_count, total, playbook_count, resolved)))
}

/// GET /dashboard/teachers
///
/// Teachers in the caller's district; all teachers when the caller has none.
pub async fn list_teachers(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(params): Query<TeacherListParams>,
) -> ApiResult<Json<Vec<User>>> {
    session.require_supervisor()?;
    let (skip, limit) = paging(params.skip, params.limit, 20, 100)?;

    let teachers =
        users::list_teachers_page(&state.db, session.user.district.as_deref(), None, skip, limit).await?;
    Ok(Json(teachers))
}

/// Session-only dashboard routes
pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard/teachers", get(list_teachers))
        .route("/dashboard/:role", get(role_dashboard))
}

/// Public totals
pub fn overview_routes() -> Router<AppState> {
    Router::new().route("/dashboard/overview", get(overview))
}
