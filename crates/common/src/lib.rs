//! SalesTrackr Common Library
//!
//! Shared code for the SalesTrackr services including:
//! - Database models and repository patterns
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;

// Re-export commonly used types
pub use auth::{AuthContext, Role};
pub use config::AppConfig;
pub use db::{Repository, VisitFilter, VisitRecord};
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
