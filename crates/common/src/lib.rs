//! Commentree Common Library
//!
//! Shared code for the Commentree comment service including:
//! - Comment entity, statement builder and retrying executor
//! - Comment store and service layer
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod service;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::models::Comment;
pub use db::{Cancellation, CommentRepository, CommentStore, DbPool, Page};
pub use errors::{AppError, Result};
pub use service::CommentService;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
