//! Database initialization
//!
//! Opens (or creates) the SQLite database, applies connection pragmas and
//! creates every table idempotently. Safe to call on every startup.

use crate::{auth, Result};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Settings key holding the generated token secret
pub const JWT_SECRET_SETTING: &str = "jwt_secret";

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                // Per-connection pragmas; the pool hands out many connections
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_users_table(pool).await?;
    create_sos_requests_table(pool).await?;
    create_playbooks_table(pool).await?;
    create_shared_solutions_table(pool).await?;
    create_solution_votes_table(pool).await?;
    create_playbook_cache_table(pool).await?;
    Ok(())
}

/// Key-value application settings
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'teacher' CHECK (role IN ('teacher', 'crp', 'diet')),
            school_id TEXT,
            school_name TEXT,
            district TEXT,
            block TEXT,
            state TEXT NOT NULL DEFAULT 'Karnataka',
            phone TEXT,
            subjects TEXT NOT NULL DEFAULT '[]',
            grades TEXT NOT NULL DEFAULT '[]',
            preferred_language TEXT NOT NULL DEFAULT 'en',
            is_active INTEGER NOT NULL DEFAULT 1,
            total_sos_requests INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            last_login TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_district_block ON users(district, block)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_sos_requests_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sos_requests (
            id TEXT PRIMARY KEY,
            teacher_id TEXT REFERENCES users(id),
            teacher_name TEXT,
            raw_input TEXT NOT NULL,
            input_type TEXT NOT NULL DEFAULT 'text',
            input_language TEXT NOT NULL DEFAULT 'en',
            subject TEXT,
            grade INTEGER,
            topic TEXT,
            issue_type TEXT NOT NULL DEFAULT 'other',
            student_count INTEGER,
            specific_challenge TEXT,
            urgency TEXT NOT NULL DEFAULT 'medium',
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'processing', 'resolved', 'failed')),
            processing_started_at TEXT,
            processing_completed_at TEXT,
            processing_time_ms INTEGER,
            playbook_id TEXT,
            was_helpful INTEGER,
            feedback_rating INTEGER CHECK (feedback_rating IS NULL OR feedback_rating BETWEEN 1 AND 5),
            feedback_text TEXT,
            school_id TEXT,
            district TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sos_teacher_created ON sos_requests(teacher_id, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sos_created ON sos_requests(created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_playbooks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS playbooks (
            id TEXT PRIMARY KEY,
            sos_request_id TEXT NOT NULL UNIQUE REFERENCES sos_requests(id),
            title TEXT NOT NULL,
            summary TEXT NOT NULL DEFAULT '',
            immediate_actions TEXT NOT NULL DEFAULT '[]',
            recovery_steps TEXT NOT NULL DEFAULT '[]',
            alternative_strategies TEXT NOT NULL DEFAULT '[]',
            success_indicators TEXT NOT NULL DEFAULT '[]',
            youtube_videos TEXT NOT NULL DEFAULT '[]',
            teaching_resources TEXT NOT NULL DEFAULT '[]',
            teaching_tips TEXT NOT NULL DEFAULT '[]',
            ncert_reference TEXT,
            estimated_time_minutes INTEGER NOT NULL DEFAULT 10,
            difficulty TEXT NOT NULL DEFAULT 'medium',
            model_used TEXT NOT NULL,
            source TEXT NOT NULL CHECK (source IN ('model', 'cache', 'fallback')),
            prompt_tokens INTEGER,
            response_tokens INTEGER,
            language TEXT NOT NULL DEFAULT 'en',
            times_viewed INTEGER NOT NULL DEFAULT 0,
            was_implemented INTEGER,
            effectiveness_rating INTEGER,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_shared_solutions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shared_solutions (
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL REFERENCES users(id),
            teacher_name TEXT NOT NULL,
            school_id TEXT,
            district TEXT,
            problem_description TEXT NOT NULL,
            subject TEXT NOT NULL,
            grade INTEGER NOT NULL,
            topic TEXT,
            solution_title TEXT NOT NULL,
            solution_description TEXT NOT NULL,
            steps TEXT NOT NULL DEFAULT '[]',
            materials_needed TEXT NOT NULL DEFAULT '[]',
            time_required_minutes INTEGER NOT NULL DEFAULT 10,
            original_playbook_id TEXT,
            is_anonymous INTEGER NOT NULL DEFAULT 0,
            trust_score REAL NOT NULL DEFAULT 0.0,
            usage_count INTEGER NOT NULL DEFAULT 0,
            helpful_count INTEGER NOT NULL DEFAULT 0,
            not_helpful_count INTEGER NOT NULL DEFAULT 0,
            total_votes INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'approved', 'featured', 'archived')),
            tags TEXT NOT NULL DEFAULT '[]',
            language TEXT NOT NULL DEFAULT 'en',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_solutions_status_subject ON shared_solutions(status, subject, grade)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One ballot per (solution, voter)
async fn create_solution_votes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS solution_votes (
            solution_id TEXT NOT NULL REFERENCES shared_solutions(id),
            teacher_id TEXT NOT NULL REFERENCES users(id),
            teacher_name TEXT NOT NULL,
            vote INTEGER NOT NULL CHECK (vote BETWEEN -1 AND 1),
            comment TEXT,
            voted_at TEXT NOT NULL,
            PRIMARY KEY (solution_id, teacher_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_playbook_cache_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS playbook_cache (
            cache_key TEXT PRIMARY KEY,
            response_text TEXT NOT NULL,
            model_used TEXT NOT NULL,
            prompt_tokens INTEGER,
            response_tokens INTEGER,
            cached_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_playbook_cache_cached_at ON playbook_cache(cached_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Initialize default settings
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "schema_version", "1").await?;
    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// Missing settings are created; NULL values are reset to the default.
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    match value {
        None => {
            // INSERT OR IGNORE tolerates a concurrent initializer
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;
            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
        Some(None) => {
            sqlx::query("UPDATE settings SET value = ?, updated_at = CURRENT_TIMESTAMP WHERE key = ?")
                .bind(default_value)
                .bind(key)
                .execute(pool)
                .await?;
            warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
        }
        Some(Some(_)) => {}
    }

    Ok(())
}

/// Read a setting value
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;
    Ok(value.flatten())
}

/// Insert or replace a setting value
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Load the stored token secret, generating and persisting one if missing
pub async fn load_or_init_jwt_secret(pool: &SqlitePool) -> Result<String> {
    if let Some(secret) = get_setting(pool, JWT_SECRET_SETTING).await? {
        if !secret.trim().is_empty() {
            return Ok(secret);
        }
    }

    let secret = auth::generate_secret();
    // A concurrent initializer may win; re-read so every caller agrees
    sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(JWT_SECRET_SETTING)
        .bind(&secret)
        .execute(pool)
        .await?;
    sqlx::query("UPDATE settings SET value = ? WHERE key = ? AND (value IS NULL OR trim(value) = '')")
        .bind(&secret)
        .bind(JWT_SECRET_SETTING)
        .execute(pool)
        .await?;

    let stored = get_setting(pool, JWT_SECRET_SETTING).await?.unwrap_or(secret);
    info!("Generated token signing secret");
    Ok(stored)
}
