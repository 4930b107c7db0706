//! # Sahayak Common Library
//!
//! Shared code for the Sahayak classroom-support service:
//! - Domain models (users, SOS requests, playbooks, shared solutions)
//! - Database initialization and schema
//! - Configuration loading and root folder resolution
//! - Password hashing and bearer tokens
//! - Timestamp helpers

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod time;

pub use error::{Error, Result};
