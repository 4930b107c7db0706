//! HTTP API handlers
//!
//! Route builders are grouped by the authentication they need; `build_router`
//! attaches the matching middleware.

pub mod auth;
pub mod dashboard;
pub mod health;
pub mod knowledge;
pub mod sos;
pub mod users;

pub use auth::{MaybeSession, Session};
pub use health::health_routes;

use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Path id parse; malformed ids are reported as missing records
pub(crate) fn parse_id(raw: &str, what: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::NotFound(format!("{} not found", what)))
}

/// Plain acknowledgement body
#[derive(Debug, serde::Serialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Validate an optional `skip`/`limit` pair
pub(crate) fn paging(skip: Option<i64>, limit: Option<i64>, default_limit: i64, max_limit: i64) -> ApiResult<(i64, i64)> {
    let skip = skip.unwrap_or(0);
    if skip < 0 {
        return Err(ApiError::BadRequest("skip must be >= 0".to_string()));
    }
    let limit = limit.unwrap_or(default_limit);
    if !(1..=max_limit).contains(&limit) {
        return Err(ApiError::BadRequest(format!("limit must be between 1 and {}", max_limit)));
    }
    Ok((skip, limit))
}

/// Character-count bounds check for a text field
pub(crate) fn check_length(field: &str, value: &str, min: usize, max: usize) -> ApiResult<()> {
    let len = value.trim().chars().count();
    if len < min || len > max {
        return Err(ApiError::BadRequest(format!(
            "{} must be between {} and {} characters",
            field, min, max
        )));
    }
    Ok(())
}

/// Grade must be a school class, 1 to 12
pub(crate) fn check_grade(grade: Option<u32>) -> ApiResult<()> {
    match grade {
        Some(g) if !(1..=12).contains(&g) => Err(ApiError::BadRequest("grade must be between 1 and 12".to_string())),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paging_bounds() {
        assert_eq!(paging(None, None, 10, 50).unwrap(), (0, 10));
        assert_eq!(paging(Some(5), Some(50), 10, 50).unwrap(), (5, 50));
        assert!(paging(Some(-1), None, 10, 50).is_err());
        assert!(paging(None, Some(0), 10, 50).is_err());
        assert!(paging(None, Some(51), 10, 50).is_err());
    }

    #[test]
    fn test_length_counts_characters() {
        assert!(check_length("raw_input", "ಮಕ್ಕಳು", 5, 10).is_ok());
        assert!(check_length("raw_input", "  abc  ", 5, 10).is_err());
    }

    #[test]
    fn test_grade_range() {
        assert!(check_grade(None).is_ok());
        assert!(check_grade(Some(12)).is_ok());
        assert!(check_grade(Some(0)).is_err());
        assert!(check_grade(Some(13)).is_err());
    }
}
