//! Comment entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Upper bound on comment length, in characters
pub const MAX_CONTENT_CHARS: usize = 10_000;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "comments")]
pub struct Model {
    /// Assigned by the database; 0 until the comment is created
    #[sea_orm(primary_key)]
    #[serde(default)]
    pub id: i64,

    /// `None` for root comments
    #[sea_orm(nullable)]
    #[validate(range(min = 1))]
    pub parent_id: Option<i64>,

    #[sea_orm(column_type = "Text")]
    #[validate(custom(function = "validate_content"))]
    pub content: String,

    pub created_at: DateTimeUtc,
}

impl Model {
    /// New, not yet persisted comment stamped with the current time
    pub fn new(parent_id: Option<i64>, content: impl Into<String>) -> Self {
        Self {
            id: 0,
            parent_id,
            content: content.into(),
            created_at: chrono::Utc::now(),
        }
    }

    /// Whether this is a top-level comment
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

fn validate_content(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message("content must not be blank".into()));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ValidationError::new("too_long").with_message("content is too long".into()));
    }
    Ok(())
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
