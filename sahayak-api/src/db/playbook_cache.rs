//! Semantic playbook cache
//!
//! Model responses are cached under a key built from the extracted classroom
//! context, not the raw text, so differently worded requests about the same
//! subject, grade and topic share an entry. Lookups fall back to broader keys.

use chrono::{DateTime, Utc};
use sahayak_common::{time, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Normalised context a cache key is built from
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheKeyParts<'a> {
    pub subject: Option<&'a str>,
    pub grade: Option<u32>,
    pub topic: Option<&'a str>,
    pub language: &'a str,
}

fn slug(value: Option<&str>, missing: &str) -> String {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v.to_lowercase().split_whitespace().collect::<Vec<_>>().join("_"),
        None => missing.to_string(),
    }
}

impl CacheKeyParts<'_> {
    fn build(&self, grade: Option<u32>, topic: Option<&str>) -> String {
        format!(
            "playbook:{}:{}:{}:{}",
            slug(self.subject, "general"),
            grade.map(|g| g.to_string()).unwrap_or_else(|| "any".to_string()),
            slug(topic, "general"),
            slug(Some(self.language), "en"),
        )
    }

    pub fn exact_key(&self) -> String {
        self.build(self.grade, self.topic)
    }

    /// Exact key followed by broader fallbacks, without duplicates
    pub fn lookup_keys(&self) -> Vec<String> {
        let mut keys = vec![
            self.exact_key(),
            self.build(None, self.topic),
            self.build(self.grade, None),
            self.build(None, None),
        ];
        let mut seen = std::collections::HashSet::new();
        keys.retain(|k| seen.insert(k.clone()));
        keys
    }
}

/// Model response as stored in the cache
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub key: String,
    pub text: String,
    pub model_used: String,
    pub prompt_tokens: Option<i64>,
    pub response_tokens: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub entries: i64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

#[derive(Clone)]
pub struct PlaybookCache {
    pool: SqlitePool,
    ttl_secs: u64,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl PlaybookCache {
    /// A TTL of zero disables the cache
    pub fn new(pool: SqlitePool, ttl_secs: u64) -> Self {
        Self {
            pool,
            ttl_secs,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.ttl_secs > 0
    }

    /// Oldest live `cached_at`; TTLs reaching past the epoch keep everything
    fn cutoff(&self) -> String {
        let oldest = i64::try_from(self.ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|ttl| time::now().checked_sub_signed(ttl))
            .filter(|ts| *ts > DateTime::<Utc>::UNIX_EPOCH)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        time::to_db(oldest)
    }

    pub async fn lookup(&self, parts: &CacheKeyParts<'_>) -> Result<Option<CachedResponse>> {
        if !self.is_enabled() {
            return Ok(None);
        }

        let cutoff = self.cutoff();
        for key in parts.lookup_keys() {
            let row = sqlx::query(
                r#"
                SELECT cache_key, response_text, model_used, prompt_tokens, response_tokens
                FROM playbook_cache
                WHERE cache_key = ? AND cached_at >= ?
                "#,
            )
            .bind(&key)
            .bind(&cutoff)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = row {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Playbook cache hit");
                return Ok(Some(CachedResponse {
                    key: row.get("cache_key"),
                    text: row.get("response_text"),
                    model_used: row.get("model_used"),
                    prompt_tokens: row.get("prompt_tokens"),
                    response_tokens: row.get("response_tokens"),
                }));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    /// Store under the exact key, and under the any-grade key if that is free
    pub async fn store(
        &self,
        parts: &CacheKeyParts<'_>,
        text: &str,
        model_used: &str,
        prompt_tokens: Option<i64>,
        response_tokens: Option<i64>,
    ) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let now = time::to_db(time::now());
        sqlx::query(
            r#"
            INSERT INTO playbook_cache (cache_key, response_text, model_used, prompt_tokens, response_tokens, cached_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(cache_key) DO UPDATE SET
                response_text = excluded.response_text,
                model_used = excluded.model_used,
                prompt_tokens = excluded.prompt_tokens,
                response_tokens = excluded.response_tokens,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(parts.exact_key())
        .bind(text)
        .bind(model_used)
        .bind(prompt_tokens)
        .bind(response_tokens)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let broad_key = parts.build(None, parts.topic);
        if parts.grade.is_some() {
            // Replaces only an expired entry
            sqlx::query(
                r#"
                INSERT INTO playbook_cache (cache_key, response_text, model_used, prompt_tokens, response_tokens, cached_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(cache_key) DO UPDATE SET
                    response_text = excluded.response_text,
                    model_used = excluded.model_used,
                    prompt_tokens = excluded.prompt_tokens,
                    response_tokens = excluded.response_tokens,
                    cached_at = excluded.cached_at
                WHERE playbook_cache.cached_at < ?
                "#,
            )
            .bind(&broad_key)
            .bind(text)
            .bind(model_used)
            .bind(prompt_tokens)
            .bind(response_tokens)
            .bind(&now)
            .bind(self.cutoff())
            .execute(&self.pool)
            .await?;
        }

        debug!(key = %parts.exact_key(), "Cached playbook response");
        Ok(())
    }

    /// Delete expired entries; returns the number removed
    pub async fn purge_expired(&self) -> Result<u64> {
        if !self.is_enabled() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM playbook_cache WHERE cached_at < ?")
            .bind(self.cutoff())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            info!("Purged {} expired playbook cache entries", result.rows_affected());
        }
        Ok(result.rows_affected())
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM playbook_cache WHERE cached_at >= ?")
            .bind(self.cutoff())
            .fetch_one(&self.pool)
            .await?;
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            (hits as f64 / lookups as f64 * 1000.0).round() / 10.0
        };

        Ok(CacheStats {
            enabled: self.is_enabled(),
            ttl_secs: self.ttl_secs,
            entries: if self.is_enabled() { entries } else { 0 },
            hits,
            misses,
            hit_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn parts<'a>(subject: Option<&'a str>, grade: Option<u32>, topic: Option<&'a str>) -> CacheKeyParts<'a> {
        CacheKeyParts {
            subject,
            grade,
            topic,
            language: "en",
        }
    }

    #[test]
    fn test_key_normalisation() {
        let p = parts(Some("Social Studies"), Some(5), None);
        assert_eq!(p.exact_key(), "playbook:social_studies:5:general:en");
        assert_eq!(parts(None, None, None).exact_key(), "playbook:general:any:general:en");
    }

    #[test]
    fn test_lookup_key_order() {
        let keys = parts(Some("Mathematics"), Some(5), Some("Fractions")).lookup_keys();
        assert_eq!(
            keys,
            vec![
                "playbook:mathematics:5:fractions:en",
                "playbook:mathematics:any:fractions:en",
                "playbook:mathematics:5:general:en",
                "playbook:mathematics:any:general:en",
            ]
        );
        assert_eq!(parts(Some("Science"), None, None).lookup_keys().len(), 1);
    }

    #[tokio::test]
    async fn test_store_then_broader_lookup() {
        let (_dir, pool) = test_pool().await;
        let cache = PlaybookCache::new(pool, 3600);
        let stored = parts(Some("Mathematics"), Some(5), Some("Fractions"));
        cache.store(&stored, "cached text", "gemini", Some(1), Some(2)).await.unwrap();

        // Same topic, different grade hits the any-grade entry
        let other_grade = parts(Some("Mathematics"), Some(6), Some("Fractions"));
        let hit = cache.lookup(&other_grade).await.unwrap().unwrap();
        assert_eq!(hit.text, "cached text");
        assert_eq!(hit.key, "playbook:mathematics:any:fractions:en");

        let miss = cache.lookup(&parts(Some("Science"), Some(5), None)).await.unwrap();
        assert!(miss.is_none());

        let stats = cache.stats().await.unwrap();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.hit_rate, 50.0);
    }

    #[tokio::test]
    async fn test_zero_ttl_disables() {
        let (_dir, pool) = test_pool().await;
        let cache = PlaybookCache::new(pool, 0);
        let p = parts(Some("Mathematics"), None, None);
        cache.store(&p, "text", "gemini", None, None).await.unwrap();
        assert!(cache.lookup(&p).await.unwrap().is_none());
        assert!(!cache.stats().await.unwrap().enabled);
    }

    #[tokio::test]
    async fn test_expired_entries_ignored_and_purged() {
        let (_dir, pool) = test_pool().await;
        let cache = PlaybookCache::new(pool.clone(), 60);
        let p = parts(Some("Mathematics"), None, None);
        cache.store(&p, "text", "gemini", None, None).await.unwrap();

        sqlx::query("UPDATE playbook_cache SET cached_at = ?")
            .bind(time::to_db(time::now() - chrono::Duration::seconds(120)))
            .execute(&pool)
            .await
            .unwrap();

        assert!(cache.lookup(&p).await.unwrap().is_none());
        assert_eq!(cache.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_huge_ttl_never_expires() {
        for ttl in [10_000_000_000_000, u64::MAX] {
            let (_dir, pool) = test_pool().await;
            let cache = PlaybookCache::new(pool.clone(), ttl);
            let p = parts(Some("Mathematics"), Some(4), Some("Fractions"));
            cache.store(&p, "text", "gemini", None, None).await.unwrap();

            sqlx::query("UPDATE playbook_cache SET cached_at = ?")
                .bind(time::to_db(time::now() - chrono::Duration::days(3650)))
                .execute(&pool)
                .await
                .unwrap();

            assert_eq!(cache.lookup(&p).await.unwrap().unwrap().text, "text");
            assert_eq!(cache.purge_expired().await.unwrap(), 0);
            let stats = cache.stats().await.unwrap();
            assert!(stats.enabled);
            assert_eq!(stats.entries, 2);
        }
    }
}
