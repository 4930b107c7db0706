//! User accounts

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::Role;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    /// Stored lower-case; unique
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,

    pub school_id: Option<String>,
    pub school_name: Option<String>,
    pub district: Option<String>,
    pub block: Option<String>,
    pub state: String,
    pub phone: Option<String>,

    pub subjects: Vec<String>,
    pub grades: Vec<u32>,
    pub preferred_language: String,

    pub is_active: bool,
    pub total_sos_requests: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}
