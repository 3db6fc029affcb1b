//! Comment store
//!
//! The data-access contract consumed by the service layer. Each operation
//! validates its input, builds a statement, runs it through the retrying
//! executor, and maps rows back to [`Comment`] records.

use crate::config::AppConfig;
use crate::db::executor::{Cancellation, Executor};
use crate::db::models::Comment;
use crate::db::statements::{Page, StatementBuilder};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use sea_orm::{FromQueryResult, QueryResult};
use tracing::debug;
use validator::Validate;

/// Capability set over persisted comments
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Persist a new comment and assign its `id`
    async fn create(&self, comment: &mut Comment, cancel: &Cancellation) -> Result<()>;

    /// Replace the content of an existing comment
    async fn update(&self, comment: &Comment, cancel: &Cancellation) -> Result<()>;

    /// Remove a comment; succeeds even when nothing matched
    async fn delete(&self, id: i64, cancel: &Cancellation) -> Result<()>;

    /// Children of `parent_id` (root comments for `None`), oldest first
    async fn get_by_parent(
        &self,
        parent_id: Option<i64>,
        page: Page,
        cancel: &Cancellation,
    ) -> Result<Vec<Comment>>;

    /// Comments matching `query`, ranked by relevance then recency
    async fn search(&self, query: &str, page: Page, cancel: &Cancellation) -> Result<Vec<Comment>>;
}

/// PostgreSQL-backed [`CommentRepository`]
#[derive(Clone)]
pub struct CommentStore {
    pool: DbPool,
    statements: StatementBuilder,
    executor: Executor,
}

impl CommentStore {
    pub fn new(pool: DbPool, statements: StatementBuilder, executor: Executor) -> Self {
        Self { pool, statements, executor }
    }

    /// Build a store using the configured retry policy and search language
    pub fn from_config(pool: DbPool, config: &AppConfig) -> Result<Self> {
        let executor = Executor::new(config.retry.policy()?);
        let statements = StatementBuilder::new(config.search.language.clone());
        Ok(Self::new(pool, statements, executor))
    }
}

fn validate_id(id: i64) -> Result<()> {
    if id <= 0 {
        return Err(AppError::validation("id", format!("{} is not a valid comment id", id)));
    }
    Ok(())
}

fn to_comments(operation: &'static str, rows: Vec<QueryResult>) -> Result<Vec<Comment>> {
    rows.iter()
        .map(|row| {
            Comment::from_query_result(row, "")
                .map_err(|source| AppError::Store { operation, source })
        })
        .collect()
}

#[async_trait]
impl CommentRepository for CommentStore {
    async fn create(&self, comment: &mut Comment, cancel: &Cancellation) -> Result<()> {
        comment.validate()?;

        let stmt = self.statements.insert(comment)?;
        let row = self
            .executor
            .query_one("create", cancel, self.pool.write(), stmt)
            .await?
            .ok_or_else(|| AppError::Internal {
                message: "insert returned no generated id".to_string(),
            })?;

        comment.id = row
            .try_get::<i64>("", "id")
            .map_err(|source| AppError::Store { operation: "create", source })?;

        debug!(id = comment.id, parent_id = ?comment.parent_id, "Comment created");
        Ok(())
    }

    async fn update(&self, comment: &Comment, cancel: &Cancellation) -> Result<()> {
        validate_id(comment.id)?;
        comment.validate()?;

        let stmt = self.statements.update(comment)?;
        let result = self
            .executor
            .execute("update", cancel, self.pool.write(), stmt)
            .await?;

        if result.rows_affected() == 0 {
            debug!(id = comment.id, "Update matched no comment");
        }
        Ok(())
    }

    async fn delete(&self, id: i64, cancel: &Cancellation) -> Result<()> {
        validate_id(id)?;

        let stmt = self.statements.delete(id)?;
        let result = self
            .executor
            .execute("delete", cancel, self.pool.write(), stmt)
            .await?;

        if result.rows_affected() == 0 {
            debug!(id, "Delete matched no comment");
        }
        Ok(())
    }

    async fn get_by_parent(
        &self,
        parent_id: Option<i64>,
        page: Page,
        cancel: &Cancellation,
    ) -> Result<Vec<Comment>> {
        let stmt = self.statements.list_by_parent(parent_id, page)?;
        let rows = self
            .executor
            .query_all("get_by_parent", cancel, self.pool.read(), stmt)
            .await?;

        to_comments("get_by_parent", rows)
    }

    async fn search(&self, query: &str, page: Page, cancel: &Cancellation) -> Result<Vec<Comment>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::validation("query", "search query must not be empty"));
        }

        let stmt = self.statements.search(query, page)?;
        let rows = self
            .executor
            .query_all("search", cancel, self.pool.read(), stmt)
            .await?;

        let comments = to_comments("search", rows)?;
        metrics::record_search(comments.len());
        Ok(comments)
    }
}
