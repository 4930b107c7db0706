//! Database initialization and settings

pub mod init;

pub use init::*;
