//! SOS request persistence
//!
//! Status changes are guarded in SQL (`WHERE status = <expected>`), so a
//! request can only move along `pending → processing → resolved | failed`
//! no matter how many callers race on it.

use chrono::{DateTime, Utc};
use sahayak_common::models::{InputType, IssueType, SosRequest, SosStatus, Urgency};
use sahayak_common::{time, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{opt_u32, parse_enum, parse_uuid, parse_uuid_opt};

#[derive(Debug, Clone)]
pub struct NewSosRequest {
    pub teacher_id: Option<Uuid>,
    pub teacher_name: Option<String>,
    pub raw_input: String,
    pub input_type: InputType,
    pub input_language: String,
    pub subject: Option<String>,
    pub grade: Option<u32>,
    pub topic: Option<String>,
    pub school_id: Option<String>,
    pub district: Option<String>,
}

/// Extracted classroom context written back onto the request
#[derive(Debug, Clone)]
pub struct ContextUpdate {
    pub subject: Option<String>,
    pub grade: Option<u32>,
    pub topic: Option<String>,
    pub issue_type: IssueType,
    pub urgency: Urgency,
    pub student_count: Option<u32>,
    pub specific_challenge: Option<String>,
}

/// Row scope for aggregate queries; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    pub teacher_id: Option<Uuid>,
    pub district: Option<String>,
    pub block: Option<String>,
}

impl RequestScope {
    pub fn teacher(id: Uuid) -> Self {
        Self {
            teacher_id: Some(id),
            ..Default::default()
        }
    }
}

const SOS_COLUMNS: &str = "r.id, r.teacher_id, r.teacher_name, r.raw_input, r.input_type, \
    r.input_language, r.subject, r.grade, r.topic, r.issue_type, r.student_count, \
    r.specific_challenge, r.urgency, r.status, r.processing_started_at, \
    r.processing_completed_at, r.processing_time_ms, r.playbook_id, r.was_helpful, \
    r.feedback_rating, r.feedback_text, r.school_id, r.district, r.created_at, r.updated_at";

fn request_from_row(row: &SqliteRow) -> Result<SosRequest> {
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let rating: Option<i64> = row.get("feedback_rating");

    Ok(SosRequest {
        id: parse_uuid(row.get("id"))?,
        teacher_id: parse_uuid_opt(row.get("teacher_id"))?,
        teacher_name: row.get("teacher_name"),
        raw_input: row.get("raw_input"),
        input_type: parse_enum(row.get("input_type"))?,
        input_language: row.get("input_language"),
        subject: row.get("subject"),
        grade: opt_u32(row.get("grade")),
        topic: row.get("topic"),
        issue_type: parse_enum(row.get("issue_type"))?,
        student_count: opt_u32(row.get("student_count")),
        specific_challenge: row.get("specific_challenge"),
        urgency: parse_enum(row.get("urgency"))?,
        status: parse_enum(row.get("status"))?,
        processing_started_at: time::from_db_opt(row.get("processing_started_at")),
        processing_completed_at: time::from_db_opt(row.get("processing_completed_at")),
        processing_time_ms: row.get("processing_time_ms"),
        playbook_id: parse_uuid_opt(row.get("playbook_id"))?,
        was_helpful: row.get("was_helpful"),
        feedback_rating: rating.and_then(|r| u8::try_from(r).ok()),
        feedback_text: row.get("feedback_text"),
        school_id: row.get("school_id"),
        district: row.get("district"),
        created_at: time::from_db(&created_at),
        updated_at: time::from_db(&updated_at),
    })
}

pub async fn insert_request(pool: &SqlitePool, new: &NewSosRequest) -> Result<SosRequest> {
    insert_request_at(pool, new, time::now()).await
}

/// Insert with an explicit creation time
pub async fn insert_request_at(
    pool: &SqlitePool,
    new: &NewSosRequest,
    created_at: DateTime<Utc>,
) -> Result<SosRequest> {
    let id = Uuid::new_v4();
    let created = time::to_db(created_at);

    sqlx::query(
        r#"
        INSERT INTO sos_requests (
            id, teacher_id, teacher_name, raw_input, input_type, input_language,
            subject, grade, topic, status, school_id, district, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(new.teacher_id.map(|t| t.to_string()))
    .bind(&new.teacher_name)
    .bind(&new.raw_input)
    .bind(new.input_type.as_str())
    .bind(&new.input_language)
    .bind(&new.subject)
    .bind(new.grade.map(i64::from))
    .bind(&new.topic)
    .bind(&new.school_id)
    .bind(&new.district)
    .bind(&created)
    .bind(&created)
    .execute(pool)
    .await?;

    get_request(pool, id)
        .await?
        .ok_or_else(|| Error::Internal(format!("SOS request {} missing after insert", id)))
}

pub async fn get_request(pool: &SqlitePool, id: Uuid) -> Result<Option<SosRequest>> {
    let row = sqlx::query(&format!("SELECT {} FROM sos_requests r WHERE r.id = ?", SOS_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(request_from_row).transpose()
}

/// A teacher's own requests, newest first
pub async fn list_for_teacher(
    pool: &SqlitePool,
    teacher_id: Uuid,
    status: Option<SosStatus>,
    skip: i64,
    limit: i64,
) -> Result<Vec<SosRequest>> {
    let status = status.map(|s| s.as_str());
    let rows = sqlx::query(&format!(
        r#"
        SELECT {} FROM sos_requests r
        WHERE r.teacher_id = ? AND (? IS NULL OR r.status = ?)
        ORDER BY r.created_at DESC
        LIMIT ? OFFSET ?
        "#,
        SOS_COLUMNS
    ))
    .bind(teacher_id.to_string())
    .bind(status)
    .bind(status)
    .bind(limit)
    .bind(skip)
    .fetch_all(pool)
    .await?;

    rows.iter().map(request_from_row).collect()
}

/// Every request a teacher has made, oldest first
pub async fn history_for_teacher(pool: &SqlitePool, teacher_id: Uuid) -> Result<Vec<SosRequest>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM sos_requests r WHERE r.teacher_id = ? ORDER BY r.created_at ASC",
        SOS_COLUMNS
    ))
    .bind(teacher_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(request_from_row).collect()
}

pub async fn count_for_teacher(pool: &SqlitePool, teacher_id: Uuid, status: Option<SosStatus>) -> Result<i64> {
    let status = status.map(|s| s.as_str());
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sos_requests WHERE teacher_id = ? AND (? IS NULL OR status = ?)",
    )
    .bind(teacher_id.to_string())
    .bind(status)
    .bind(status)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Requests created at or after `since` within a scope, oldest first
///
/// District and block filters apply to the author's profile.
pub async fn list_since(pool: &SqlitePool, since: &str, scope: &RequestScope) -> Result<Vec<SosRequest>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {} FROM sos_requests r
        LEFT JOIN users u ON u.id = r.teacher_id
        WHERE r.created_at >= ?
          AND (? IS NULL OR r.teacher_id = ?)
          AND (? IS NULL OR u.district = ?)
          AND (? IS NULL OR u.block = ?)
        ORDER BY r.created_at ASC
        "#,
        SOS_COLUMNS
    ))
    .bind(since)
    .bind(scope.teacher_id.map(|t| t.to_string()))
    .bind(scope.teacher_id.map(|t| t.to_string()))
    .bind(&scope.district)
    .bind(&scope.district)
    .bind(&scope.block)
    .bind(&scope.block)
    .fetch_all(pool)
    .await?;

    rows.iter().map(request_from_row).collect()
}

/// Guarded `pending → processing`; false if the request was not pending
pub async fn begin_processing(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let now = time::to_db(time::now());
    let result = sqlx::query(
        r#"
        UPDATE sos_requests
        SET status = 'processing', processing_started_at = ?, updated_at = ?
        WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(&now)
    .bind(&now)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn update_context(pool: &SqlitePool, id: Uuid, ctx: &ContextUpdate) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE sos_requests SET
            subject = ?, grade = ?, topic = ?, issue_type = ?, urgency = ?,
            student_count = ?, specific_challenge = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&ctx.subject)
    .bind(ctx.grade.map(i64::from))
    .bind(&ctx.topic)
    .bind(ctx.issue_type.as_str())
    .bind(ctx.urgency.as_str())
    .bind(ctx.student_count.map(i64::from))
    .bind(&ctx.specific_challenge)
    .bind(time::to_db(time::now()))
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Guarded `processing → resolved` with the playbook attached
pub async fn mark_resolved(pool: &SqlitePool, id: Uuid, playbook_id: Uuid, processing_time_ms: i64) -> Result<bool> {
    let now = time::to_db(time::now());
    let result = sqlx::query(
        r#"
        UPDATE sos_requests
        SET status = 'resolved', playbook_id = ?, processing_time_ms = ?,
            processing_completed_at = ?, updated_at = ?
        WHERE id = ? AND status = 'processing'
        "#,
    )
    .bind(playbook_id.to_string())
    .bind(processing_time_ms)
    .bind(&now)
    .bind(&now)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Mark a non-terminal request failed
pub async fn mark_failed(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let now = time::to_db(time::now());
    let result = sqlx::query(
        r#"
        UPDATE sos_requests
        SET status = 'failed', processing_completed_at = ?, updated_at = ?
        WHERE id = ? AND status IN ('pending', 'processing')
        "#,
    )
    .bind(&now)
    .bind(&now)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn record_feedback(
    pool: &SqlitePool,
    id: Uuid,
    was_helpful: bool,
    rating: Option<u8>,
    text: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE sos_requests
        SET was_helpful = ?, feedback_rating = ?, feedback_text = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(was_helpful)
    .bind(rating.map(i64::from))
    .bind(text)
    .bind(time::to_db(time::now()))
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// (total, resolved) across all requests
pub async fn status_totals(pool: &SqlitePool) -> Result<(i64, i64)> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS total, COALESCE(SUM(status = 'resolved'), 0) AS resolved FROM sos_requests",
    )
    .fetch_one(pool)
    .await?;
    Ok((row.get("total"), row.get("resolved")))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn new_request(teacher_id: Option<Uuid>, raw_input: &str) -> NewSosRequest {
        NewSosRequest {
            teacher_id,
            teacher_name: None,
            raw_input: raw_input.to_string(),
            input_type: InputType::Text,
            input_language: "en".to_string(),
            subject: None,
            grade: None,
            topic: None,
            school_id: None,
            district: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::new_request;
    use super::*;
    use crate::db::test_pool;
    use crate::db::users::{create_user, test_support::new_user};
    use sahayak_common::models::Role;

    #[tokio::test]
    async fn test_guarded_lifecycle() {
        let (_dir, pool) = test_pool().await;
        let req = insert_request(&pool, &new_request(None, "Students are restless"))
            .await
            .unwrap();
        assert_eq!(req.status, SosStatus::Pending);

        assert!(begin_processing(&pool, req.id).await.unwrap());
        // Second claim loses
        assert!(!begin_processing(&pool, req.id).await.unwrap());

        let playbook_id = Uuid::new_v4();
        assert!(mark_resolved(&pool, req.id, playbook_id, 120).await.unwrap());

        // Terminal
        assert!(!mark_failed(&pool, req.id).await.unwrap());
        assert!(!mark_resolved(&pool, req.id, playbook_id, 1).await.unwrap());

        let req = get_request(&pool, req.id).await.unwrap().unwrap();
        assert_eq!(req.status, SosStatus::Resolved);
        assert_eq!(req.playbook_id, Some(playbook_id));
        assert_eq!(req.processing_time_ms, Some(120));
        assert!(req.processing_completed_at.is_some());
    }

    #[tokio::test]
    async fn test_resolve_requires_processing() {
        let (_dir, pool) = test_pool().await;
        let req = insert_request(&pool, &new_request(None, "help")).await.unwrap();
        assert!(!mark_resolved(&pool, req.id, Uuid::new_v4(), 1).await.unwrap());
        assert!(mark_failed(&pool, req.id).await.unwrap());
        let req = get_request(&pool, req.id).await.unwrap().unwrap();
        assert_eq!(req.status, SosStatus::Failed);
    }

    #[tokio::test]
    async fn test_list_for_teacher_paging_and_filter() {
        let (_dir, pool) = test_pool().await;
        let teacher = create_user(&pool, &new_user("t@x.in", Role::Teacher, None, None)).await.unwrap();
        let base = time::now() - chrono::Duration::hours(1);
        for i in 0..5 {
            insert_request_at(
                &pool,
                &new_request(Some(teacher.id), &format!("request {}", i)),
                base + chrono::Duration::minutes(i),
            )
            .await
            .unwrap();
        }
        insert_request(&pool, &new_request(None, "anonymous")).await.unwrap();

        let page = list_for_teacher(&pool, teacher.id, None, 1, 2).await.unwrap();
        let inputs: Vec<&str> = page.iter().map(|r| r.raw_input.as_str()).collect();
        assert_eq!(inputs, vec!["request 3", "request 2"]);

        assert_eq!(count_for_teacher(&pool, teacher.id, None).await.unwrap(), 5);
        assert_eq!(
            count_for_teacher(&pool, teacher.id, Some(SosStatus::Resolved)).await.unwrap(),
            0
        );
        let pending = list_for_teacher(&pool, teacher.id, Some(SosStatus::Pending), 0, 50).await.unwrap();
        assert_eq!(pending.len(), 5);

        let history = history_for_teacher(&pool, teacher.id).await.unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].raw_input, "request 0");
    }

    #[tokio::test]
    async fn test_list_since_scopes_by_author_profile() {
        let (_dir, pool) = test_pool().await;
        let a = create_user(&pool, &new_user("a@x.in", Role::Teacher, Some("Mysuru"), Some("Hunsur"))).await.unwrap();
        let b = create_user(&pool, &new_user("b@x.in", Role::Teacher, Some("Mandya"), None)).await.unwrap();
        insert_request(&pool, &new_request(Some(a.id), "one")).await.unwrap();
        insert_request(&pool, &new_request(Some(b.id), "two")).await.unwrap();
        insert_request_at(
            &pool,
            &new_request(Some(a.id), "old"),
            time::now() - chrono::Duration::days(40),
        )
        .await
        .unwrap();

        let since = time::days_ago(7);
        assert_eq!(list_since(&pool, &since, &RequestScope::default()).await.unwrap().len(), 2);

        let scope = RequestScope {
            district: Some("Mysuru".to_string()),
            ..Default::default()
        };
        let scoped = list_since(&pool, &since, &scope).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].raw_input, "one");

        let all_time = list_since(&pool, &time::days_ago(60), &RequestScope::teacher(a.id)).await.unwrap();
        assert_eq!(all_time.len(), 2);
    }

    #[tokio::test]
    async fn test_feedback_and_totals() {
        let (_dir, pool) = test_pool().await;
        let req = insert_request(&pool, &new_request(None, "x")).await.unwrap();
        record_feedback(&pool, req.id, true, Some(4), Some("worked")).await.unwrap();
        let req = get_request(&pool, req.id).await.unwrap().unwrap();
        assert_eq!(req.was_helpful, Some(true));
        assert_eq!(req.feedback_rating, Some(4));

        begin_processing(&pool, req.id).await.unwrap();
        mark_resolved(&pool, req.id, Uuid::new_v4(), 5).await.unwrap();
        insert_request(&pool, &new_request(None, "y")).await.unwrap();
        assert_eq!(status_totals(&pool).await.unwrap(), (2, 1));
    }
}
