//! Statement builder for comment operations
//!
//! Turns logical operations into parameterized PostgreSQL statements.
//! User input is always bound as a value, never spliced into SQL text.

use crate::db::models::{Comment, CommentColumn, CommentEntity};
use crate::errors::{AppError, Result};
use sea_orm::sea_query::{
    Alias, Expr, IntoColumnRef, Order, PostgresQueryBuilder, Query, QueryStatementWriter,
    SelectStatement, SimpleExpr,
};
use sea_orm::{DbBackend, Statement};

/// Storage-maintained tsvector column derived from `content`
const SEARCH_VECTOR: &str = "search_vector";

/// Alias of the computed relevance column in search results
const RANK: &str = "rank";

/// Limit/offset pagination window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u64,
    pub offset: u64,
}

impl Page {
    pub fn new(limit: u64, offset: u64) -> Self {
        Self { limit, offset }
    }
}

/// Builds statements against the `comments` table
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    language: String,
}

impl StatementBuilder {
    /// Create a builder ranking search results with the given text search configuration
    pub fn new(language: impl Into<String>) -> Self {
        Self { language: language.into() }
    }

    /// Text search configuration bound into search statements
    pub fn language(&self) -> &str {
        &self.language
    }

    /// `INSERT ... RETURNING id`
    pub fn insert(&self, comment: &Comment) -> Result<Statement> {
        let mut query = Query::insert();
        query
            .into_table(CommentEntity)
            .columns([
                CommentColumn::ParentId,
                CommentColumn::Content,
                CommentColumn::CreatedAt,
            ])
            .values([
                comment.parent_id.into(),
                comment.content.clone().into(),
                comment.created_at.into(),
            ])
            .map_err(|e| AppError::Construction {
                operation: "create",
                message: e.to_string(),
            })?
            .returning_col(CommentColumn::Id);

        Ok(build(&query))
    }

    /// Update the content of one comment; parent and timestamp are never touched
    pub fn update(&self, comment: &Comment) -> Result<Statement> {
        let query = Query::update()
            .table(CommentEntity)
            .value(CommentColumn::Content, comment.content.clone())
            .and_where(Expr::col(CommentColumn::Id).eq(comment.id))
            .to_owned();

        Ok(build(&query))
    }

    pub fn delete(&self, id: i64) -> Result<Statement> {
        let query = Query::delete()
            .from_table(CommentEntity)
            .and_where(Expr::col(CommentColumn::Id).eq(id))
            .to_owned();

        Ok(build(&query))
    }

    /// Children of `parent_id` (or root comments when `None`), oldest first
    pub fn list_by_parent(&self, parent_id: Option<i64>, page: Page) -> Result<Statement> {
        // A bound NULL would compare as unknown, so roots need IS NULL.
        let predicate = match parent_id {
            Some(id) => Expr::col(CommentColumn::ParentId).eq(id),
            None => Expr::col(CommentColumn::ParentId).is_null(),
        };

        let query = select_comments()
            .and_where(predicate)
            .order_by(CommentColumn::CreatedAt, Order::Asc)
            .order_by(CommentColumn::Id, Order::Asc)
            .limit(page.limit)
            .offset(page.offset)
            .to_owned();

        Ok(build(&query))
    }

    /// Comments matching `text`, most relevant first, newest first among equals
    pub fn search(&self, text: &str, page: Page) -> Result<Statement> {
        if self.language.trim().is_empty() {
            return Err(AppError::Construction {
                operation: "search",
                message: "text search configuration is not set".to_string(),
            });
        }

        let query = select_comments()
            .expr_as(self.rank(text), Alias::new(RANK))
            .and_where(self.matches(text))
            .order_by(Alias::new(RANK).into_column_ref(), Order::Desc)
            .order_by(CommentColumn::CreatedAt, Order::Desc)
            .order_by(CommentColumn::Id, Order::Desc)
            .limit(page.limit)
            .offset(page.offset)
            .to_owned();

        Ok(build(&query))
    }

    fn rank(&self, text: &str) -> SimpleExpr {
        Expr::cust_with_values(
            format!(r#"ts_rank("{SEARCH_VECTOR}", plainto_tsquery($1::regconfig, $2))"#),
            [self.language.clone(), text.to_string()],
        )
    }

    fn matches(&self, text: &str) -> SimpleExpr {
        Expr::cust_with_values(
            format!(r#""{SEARCH_VECTOR}" @@ plainto_tsquery($1::regconfig, $2)"#),
            [self.language.clone(), text.to_string()],
        )
    }
}

fn select_comments() -> SelectStatement {
    Query::select()
        .columns([
            CommentColumn::Id,
            CommentColumn::ParentId,
            CommentColumn::Content,
            CommentColumn::CreatedAt,
        ])
        .from(CommentEntity)
        .to_owned()
}

fn build<S: QueryStatementWriter>(query: &S) -> Statement {
    let (sql, values) = query.build(PostgresQueryBuilder);
    Statement::from_sql_and_values(DbBackend::Postgres, sql, values.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Value;

    fn builder() -> StatementBuilder {
        StatementBuilder::new("russian")
    }

    fn values(stmt: &Statement) -> Vec<Value> {
        stmt.values.clone().map(|v| v.0).unwrap_or_default()
    }

    #[test]
    fn test_insert_binds_all_fields_and_returns_id() {
        let comment = Comment::new(Some(4), "hello'); DROP TABLE comments; --");
        let stmt = builder().insert(&comment).unwrap();

        assert!(stmt.sql.starts_with(r#"INSERT INTO "comments""#));
        assert!(stmt.sql.contains(r#"("parent_id", "content", "created_at")"#));
        assert!(stmt.sql.contains(r#"RETURNING "id""#));
        assert!(!stmt.sql.contains("DROP TABLE"));

        let values = values(&stmt);
        assert_eq!(values.len(), 3);
        assert_eq!(values[0], Value::BigInt(Some(4)));
        assert_eq!(values[1], Value::String(Some(Box::new(comment.content.clone()))));
    }

    #[test]
    fn test_insert_root_binds_null_parent() {
        let stmt = builder().insert(&Comment::new(None, "root")).unwrap();
        assert_eq!(values(&stmt)[0], Value::BigInt(None));
    }

    #[test]
    fn test_update_touches_content_only() {
        let mut comment = Comment::new(Some(1), "edited");
        comment.id = 9;
        let stmt = builder().update(&comment).unwrap();

        assert!(stmt.sql.starts_with(r#"UPDATE "comments" SET "content" = $1"#));
        assert!(stmt.sql.contains(r#"WHERE "id" = $2"#));
        assert!(!stmt.sql.contains("parent_id"));
        assert!(!stmt.sql.contains("created_at"));
        assert_eq!(values(&stmt)[1], Value::BigInt(Some(9)));
    }

    #[test]
    fn test_delete_by_id() {
        let stmt = builder().delete(42).unwrap();
        assert_eq!(stmt.sql, r#"DELETE FROM "comments" WHERE "id" = $1"#);
        assert_eq!(values(&stmt), vec![Value::BigInt(Some(42))]);
    }

    #[test]
    fn test_list_roots_uses_is_null() {
        let stmt = builder().list_by_parent(None, Page::new(10, 0)).unwrap();

        assert!(stmt.sql.contains(r#""parent_id" IS NULL"#));
        assert!(stmt.sql.contains(r#"ORDER BY "created_at" ASC, "id" ASC"#));
        assert!(stmt.sql.contains("LIMIT $1 OFFSET $2"));
        // only the pagination window is bound
        assert_eq!(values(&stmt).len(), 2);
    }

    #[test]
    fn test_list_children_binds_parent() {
        let stmt = builder().list_by_parent(Some(7), Page::new(5, 15)).unwrap();

        assert!(stmt.sql.contains(r#""parent_id" = $1"#));
        assert!(!stmt.sql.contains("IS NULL"));
        assert!(stmt.sql.contains("LIMIT $2 OFFSET $3"));
        assert_eq!(values(&stmt)[0], Value::BigInt(Some(7)));
    }

    #[test]
    fn test_search_ranks_and_breaks_ties_by_recency() {
        let stmt = builder().search("играет", Page::new(10, 0)).unwrap();

        assert!(stmt.sql.contains(r#"ts_rank("search_vector", plainto_tsquery($1::regconfig, $2)) AS "rank""#));
        assert!(stmt.sql.contains(r#""search_vector" @@ plainto_tsquery($3::regconfig, $4)"#));
        assert!(stmt.sql.contains(r#"ORDER BY "rank" DESC, "created_at" DESC, "id" DESC"#));
        assert!(stmt.sql.contains("LIMIT $5 OFFSET $6"));

        let values = values(&stmt);
        assert_eq!(values.len(), 6);
        assert_eq!(values[0], Value::String(Some(Box::new("russian".to_string()))));
        assert_eq!(values[1], Value::String(Some(Box::new("играет".to_string()))));
    }

    #[test]
    fn test_search_without_language_is_construction_error() {
        let err = StatementBuilder::new(" ").search("x", Page::new(1, 0)).unwrap_err();
        assert!(matches!(err, AppError::Construction { operation: "search", .. }));
    }
}
