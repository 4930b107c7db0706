//! Database access for the API service
//!
//! Schema creation lives in `sahayak_common::db`; these modules hold the
//! queries the handlers and services issue.

pub mod playbook_cache;
pub mod playbooks;
pub mod solutions;
pub mod sos_requests;
pub mod users;

use sahayak_common::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::str::FromStr;
use uuid::Uuid;

pub(crate) fn parse_uuid(value: String) -> Result<Uuid> {
    Uuid::parse_str(&value).map_err(|e| Error::Internal(format!("Invalid stored id '{}': {}", value, e)))
}

pub(crate) fn parse_uuid_opt(value: Option<String>) -> Result<Option<Uuid>> {
    value.map(parse_uuid).transpose()
}

/// Parse a text-stored enum column
pub(crate) fn parse_enum<T>(value: String) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| Error::Internal(format!("Invalid stored value: {}", e)))
}

/// Decode a JSON text list column
pub(crate) fn json_list<T: DeserializeOwned>(value: String) -> Result<Vec<T>> {
    serde_json::from_str(&value)
        .map_err(|e| Error::Internal(format!("Failed to deserialize list column: {}", e)))
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Internal(format!("Failed to serialize column: {}", e)))
}

pub(crate) fn opt_u32(value: Option<i64>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> (tempfile::TempDir, sqlx::SqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let pool = sahayak_common::db::init_database(&dir.path().join("test.db"))
        .await
        .unwrap();
    (dir, pool)
}
