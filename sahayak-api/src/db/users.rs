//! User account persistence

use sahayak_common::models::{Role, User};
use sahayak_common::{time, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{json_list, parse_enum, parse_uuid, to_json};

/// Fields supplied at registration
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
    pub school_id: Option<String>,
    pub school_name: Option<String>,
    pub district: Option<String>,
    pub block: Option<String>,
    pub state: Option<String>,
    pub phone: Option<String>,
    pub subjects: Vec<String>,
    pub grades: Vec<u32>,
    pub preferred_language: String,
}

/// Whitelisted profile edits; `None` leaves the field unchanged
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
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

const USER_COLUMNS: &str = "id, email, name, password_hash, role, school_id, school_name, \
    district, block, state, phone, subjects, grades, preferred_language, is_active, \
    total_sos_requests, created_at, updated_at, last_login";

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let grades: Vec<i64> = json_list(row.get("grades"))?;

    Ok(User {
        id: parse_uuid(row.get("id"))?,
        email: row.get("email"),
        name: row.get("name"),
        password_hash: row.get("password_hash"),
        role: parse_enum(row.get("role"))?,
        school_id: row.get("school_id"),
        school_name: row.get("school_name"),
        district: row.get("district"),
        block: row.get("block"),
        state: row.get("state"),
        phone: row.get("phone"),
        subjects: json_list(row.get("subjects"))?,
        grades: grades.into_iter().filter_map(|g| u32::try_from(g).ok()).collect(),
        preferred_language: row.get("preferred_language"),
        is_active: row.get("is_active"),
        total_sos_requests: row.get("total_sos_requests"),
        created_at: time::from_db(&created_at),
        updated_at: time::from_db(&updated_at),
        last_login: time::from_db_opt(row.get("last_login")),
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Insert a new user; a taken email is a conflict
pub async fn create_user(pool: &SqlitePool, new: &NewUser) -> Result<User> {
    let id = Uuid::new_v4();
    let now = time::to_db(time::now());
    let email = new.email.trim().to_lowercase();

    let result = sqlx::query(
        r#"
        INSERT INTO users (
            id, email, name, password_hash, role, school_id, school_name,
            district, block, state, phone, subjects, grades, preferred_language,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, COALESCE(?, 'Karnataka'), ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(&email)
    .bind(new.name.trim())
    .bind(&new.password_hash)
    .bind(new.role.as_str())
    .bind(&new.school_id)
    .bind(&new.school_name)
    .bind(&new.district)
    .bind(&new.block)
    .bind(&new.state)
    .bind(&new.phone)
    .bind(to_json(&new.subjects)?)
    .bind(to_json(&new.grades)?)
    .bind(&new.preferred_language)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await;

    match result {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(Error::Conflict("Email already registered".to_string()));
        }
        Err(e) => return Err(e.into()),
    }

    get_user(pool, id)
        .await?
        .ok_or_else(|| Error::Internal(format!("User {} missing after insert", id)))
}

pub async fn get_user(pool: &SqlitePool, id: Uuid) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(user_from_row).transpose()
}

pub async fn get_user_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
        .bind(email.trim().to_lowercase())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(user_from_row).transpose()
}

/// Apply whitelisted profile edits and return the updated record
pub async fn update_profile(pool: &SqlitePool, id: Uuid, update: &ProfileUpdate) -> Result<User> {
    let subjects = update.subjects.as_ref().map(to_json).transpose()?;
    let grades = update.grades.as_ref().map(to_json).transpose()?;

    let result = sqlx::query(
        r#"
        UPDATE users SET
            name = COALESCE(?, name),
            school_id = COALESCE(?, school_id),
            school_name = COALESCE(?, school_name),
            district = COALESCE(?, district),
            block = COALESCE(?, block),
            phone = COALESCE(?, phone),
            subjects = COALESCE(?, subjects),
            grades = COALESCE(?, grades),
            preferred_language = COALESCE(?, preferred_language),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&update.name)
    .bind(&update.school_id)
    .bind(&update.school_name)
    .bind(&update.district)
    .bind(&update.block)
    .bind(&update.phone)
    .bind(subjects)
    .bind(grades)
    .bind(&update.preferred_language)
    .bind(time::to_db(time::now()))
    .bind(id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("User {} not found", id)));
    }

    get_user(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User {} not found", id)))
}

pub async fn touch_last_login(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
        .bind(time::to_db(time::now()))
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Atomic counter increment
pub async fn increment_sos_count(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE users SET total_sos_requests = total_sos_requests + 1 WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Active teachers, optionally scoped to a district and block
pub async fn list_teachers(
    pool: &SqlitePool,
    district: Option<&str>,
    block: Option<&str>,
) -> Result<Vec<User>> {
    // SQLite treats a negative LIMIT as unbounded
    list_teachers_page(pool, district, block, 0, -1).await
}

/// One page of [`list_teachers`], ordered by name
pub async fn list_teachers_page(
    pool: &SqlitePool,
    district: Option<&str>,
    block: Option<&str>,
    skip: i64,
    limit: i64,
) -> Result<Vec<User>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {} FROM users
        WHERE role = 'teacher' AND is_active = 1
          AND (? IS NULL OR district = ?)
          AND (? IS NULL OR block = ?)
        ORDER BY name, id
        LIMIT ? OFFSET ?
        "#,
        USER_COLUMNS
    ))
    .bind(district)
    .bind(district)
    .bind(block)
    .bind(block)
    .bind(limit)
    .bind(skip)
    .fetch_all(pool)
    .await?;

    rows.iter().map(user_from_row).collect()
}

pub async fn count_users(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn new_user(email: &str, role: Role, district: Option<&str>, block: Option<&str>) -> NewUser {
        NewUser {
            email: email.to_string(),
            name: email.split('@').next().unwrap_or("user").to_string(),
            password_hash: "hash".to_string(),
            role,
            school_id: Some("SCH-1".to_string()),
            school_name: None,
            district: district.map(str::to_string),
            block: block.map(str::to_string),
            state: None,
            phone: None,
            subjects: vec!["Mathematics".to_string()],
            grades: vec![5],
            preferred_language: "en".to_string(),
        }
    }
}
