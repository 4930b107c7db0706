//! Errors raised below the HTTP layer
//!
//! The API crate turns these into status codes: `NotFound` is 404,
//! `InvalidInput` 400, `Conflict` 409, `Auth` 401, everything else 500.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// SQLite query, pool or migration failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Root folder or config file could not be read or created
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad TOML, or a setting such as the token secret is unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// No user, SOS request, playbook or solution with that id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller-supplied value rejected before any write
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Duplicate email, or a request no longer in the expected status
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Wrong password, or a token that fails verification
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Stored data that cannot be decoded, and other broken invariants
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_convert() {
        fn open_missing() -> Result<()> {
            std::fs::read("/nonexistent/sahayak.toml")?;
            Ok(())
        }
        assert!(matches!(open_missing(), Err(Error::Io(_))));
    }

    #[test]
    fn test_messages_carry_detail() {
        let err = Error::Conflict("SOS request is not pending".to_string());
        assert_eq!(err.to_string(), "Conflict: SOS request is not pending");
        assert_eq!(
            Error::Auth("Malformed token subject".to_string()).to_string(),
            "Authentication failed: Malformed token subject"
        );
    }
}
