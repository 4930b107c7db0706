//! Playbook persistence

use sahayak_common::models::{Playbook, PlaybookContent, PlaybookSource};
use sahayak_common::{time, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{json_list, parse_enum, parse_uuid, to_json};

/// Generation metadata stored alongside the parsed content
#[derive(Debug, Clone)]
pub struct PlaybookMeta {
    pub model_used: String,
    pub source: PlaybookSource,
    pub prompt_tokens: Option<i64>,
    pub response_tokens: Option<i64>,
    pub language: String,
}

const PLAYBOOK_COLUMNS: &str = "id, sos_request_id, title, summary, immediate_actions, \
    recovery_steps, alternative_strategies, success_indicators, youtube_videos, \
    teaching_resources, teaching_tips, ncert_reference, estimated_time_minutes, difficulty, \
    model_used, source, prompt_tokens, response_tokens, language, times_viewed, \
    was_implemented, effectiveness_rating, created_at";

fn playbook_from_row(row: &SqliteRow) -> Result<Playbook> {
    let created_at: String = row.get("created_at");
    let minutes: i64 = row.get("estimated_time_minutes");
    let rating: Option<i64> = row.get("effectiveness_rating");

    let content = PlaybookContent {
        title: row.get("title"),
        summary: row.get("summary"),
        immediate_actions: json_list(row.get("immediate_actions"))?,
        recovery_steps: json_list(row.get("recovery_steps"))?,
        alternative_strategies: json_list(row.get("alternative_strategies"))?,
        success_indicators: json_list(row.get("success_indicators"))?,
        youtube_videos: json_list(row.get("youtube_videos"))?,
        teaching_resources: json_list(row.get("teaching_resources"))?,
        teaching_tips: json_list(row.get("teaching_tips"))?,
        ncert_reference: row.get("ncert_reference"),
        estimated_time_minutes: u32::try_from(minutes).unwrap_or(10),
        difficulty: parse_enum(row.get("difficulty"))?,
    };

    Ok(Playbook {
        id: parse_uuid(row.get("id"))?,
        sos_request_id: parse_uuid(row.get("sos_request_id"))?,
        content,
        model_used: row.get("model_used"),
        source: parse_enum(row.get("source"))?,
        prompt_tokens: row.get("prompt_tokens"),
        response_tokens: row.get("response_tokens"),
        language: row.get("language"),
        times_viewed: row.get("times_viewed"),
        was_implemented: row.get("was_implemented"),
        effectiveness_rating: rating.and_then(|r| u8::try_from(r).ok()),
        created_at: time::from_db(&created_at),
    })
}

pub async fn insert_playbook(
    pool: &SqlitePool,
    sos_request_id: Uuid,
    content: &PlaybookContent,
    meta: &PlaybookMeta,
) -> Result<Playbook> {
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO playbooks (
            id, sos_request_id, title, summary, immediate_actions, recovery_steps,
            alternative_strategies, success_indicators, youtube_videos, teaching_resources,
            teaching_tips, ncert_reference, estimated_time_minutes, difficulty,
            model_used, source, prompt_tokens, response_tokens, language, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(sos_request_id.to_string())
    .bind(&content.title)
    .bind(&content.summary)
    .bind(to_json(&content.immediate_actions)?)
    .bind(to_json(&content.recovery_steps)?)
    .bind(to_json(&content.alternative_strategies)?)
    .bind(to_json(&content.success_indicators)?)
    .bind(to_json(&content.youtube_videos)?)
    .bind(to_json(&content.teaching_resources)?)
    .bind(to_json(&content.teaching_tips)?)
    .bind(&content.ncert_reference)
    .bind(i64::from(content.estimated_time_minutes))
    .bind(content.difficulty.as_str())
    .bind(&meta.model_used)
    .bind(meta.source.as_str())
    .bind(meta.prompt_tokens)
    .bind(meta.response_tokens)
    .bind(&meta.language)
    .bind(time::to_db(time::now()))
    .execute(pool)
    .await?;

    get_playbook(pool, id)
        .await?
        .ok_or_else(|| Error::Internal(format!("Playbook {} missing after insert", id)))
}

pub async fn get_playbook(pool: &SqlitePool, id: Uuid) -> Result<Option<Playbook>> {
    let row = sqlx::query(&format!("SELECT {} FROM playbooks WHERE id = ?", PLAYBOOK_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(playbook_from_row).transpose()
}

/// Atomic view counter increment; returns the playbook after the increment
pub async fn record_view(pool: &SqlitePool, id: Uuid) -> Result<Option<Playbook>> {
    sqlx::query("UPDATE playbooks SET times_viewed = times_viewed + 1 WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    get_playbook(pool, id).await
}

/// Mirror request feedback onto the playbook
pub async fn record_feedback(pool: &SqlitePool, id: Uuid, was_helpful: bool, rating: Option<u8>) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE playbooks
        SET was_implemented = ?, effectiveness_rating = COALESCE(?, effectiveness_rating)
        WHERE id = ?
        "#,
    )
    .bind(was_helpful)
    .bind(rating.map(i64::from))
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn count_playbooks(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM playbooks")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sos_requests::{insert_request, test_support::new_request};
    use crate::db::test_pool;
    use crate::services::ai_gateway::FALLBACK_PLAYBOOK;
    use crate::services::playbook_parser::{parse_playbook, ParseHints};

    fn meta() -> PlaybookMeta {
        PlaybookMeta {
            model_used: "static-fallback".to_string(),
            source: PlaybookSource::Fallback,
            prompt_tokens: None,
            response_tokens: None,
            language: "en".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_preserves_content() {
        let (_dir, pool) = test_pool().await;
        let req = insert_request(&pool, &new_request(None, "noisy class")).await.unwrap();
        let content = parse_playbook(FALLBACK_PLAYBOOK, &ParseHints::default());

        let playbook = insert_playbook(&pool, req.id, &content, &meta()).await.unwrap();
        assert_eq!(playbook.content, content);
        assert_eq!(playbook.source, PlaybookSource::Fallback);
        assert_eq!(playbook.times_viewed, 0);
    }

    #[tokio::test]
    async fn test_one_playbook_per_request() {
        let (_dir, pool) = test_pool().await;
        let req = insert_request(&pool, &new_request(None, "noisy class")).await.unwrap();
        let content = parse_playbook(FALLBACK_PLAYBOOK, &ParseHints::default());
        insert_playbook(&pool, req.id, &content, &meta()).await.unwrap();
        assert!(insert_playbook(&pool, req.id, &content, &meta()).await.is_err());
    }

    #[tokio::test]
    async fn test_views_and_feedback() {
        let (_dir, pool) = test_pool().await;
        let req = insert_request(&pool, &new_request(None, "noisy class")).await.unwrap();
        let content = parse_playbook(FALLBACK_PLAYBOOK, &ParseHints::default());
        let playbook = insert_playbook(&pool, req.id, &content, &meta()).await.unwrap();

        record_view(&pool, playbook.id).await.unwrap();
        let viewed = record_view(&pool, playbook.id).await.unwrap().unwrap();
        assert_eq!(viewed.times_viewed, 2);

        record_feedback(&pool, playbook.id, true, Some(5)).await.unwrap();
        record_feedback(&pool, playbook.id, false, None).await.unwrap();
        let playbook = get_playbook(&pool, playbook.id).await.unwrap().unwrap();
        assert_eq!(playbook.was_implemented, Some(false));
        assert_eq!(playbook.effectiveness_rating, Some(5));
        assert_eq!(count_playbooks(&pool).await.unwrap(), 1);
    }
}
