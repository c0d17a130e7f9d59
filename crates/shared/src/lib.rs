//! Shared types, errors, and configuration for the file manager.
//!
//! This crate provides common types used across all other crates:
//! - Typed uids for files, variants, links, and users
//! - Pagination types for list operations
//! - The file manager error taxonomy
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, FmConfig, LogConfig, StorageProvider};
pub use error::{FmError, FmResult};
