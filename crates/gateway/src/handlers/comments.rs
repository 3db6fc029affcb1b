//! Comment handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use commentree_common::{
    errors::{AppError, Result},
    Cancellation, Comment, Page,
};

/// Request to create a comment
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    /// Comment being replied to; absent for a root comment
    #[serde(default)]
    #[validate(range(min = 1))]
    pub parent_id: Option<i64>,

    #[validate(length(min = 1, max = 10000))]
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(length(min = 1, max = 10000))]
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateCommentResponse {
    pub id: i64,
    pub content: String,
}

/// Query parameters for listing children of a comment
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Parent id; empty or `null` selects root comments
    pub parent: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Store deadline for one request
fn request_deadline(state: &AppState) -> Cancellation {
    Cancellation::with_timeout(state.config.request_timeout())
}

fn page(state: &AppState, limit: Option<u64>, offset: Option<u64>) -> Page {
    Page::new(state.config.pagination.limit(limit), offset.unwrap_or(0))
}

/// Interpret the `parent` query parameter
fn parse_parent(raw: Option<&str>) -> Result<Option<i64>> {
    match raw.map(str::trim) {
        None | Some("") | Some("null") => Ok(None),
        Some(value) => value.parse::<i64>().map(Some).map_err(|_| AppError::InvalidFormat {
            message: format!("parent must be a comment id or null, got '{}'", value),
        }),
    }
}

/// Create a new comment
pub async fn create_comment(
    State(state): State<AppState>,
    Json(request): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>)> {
    request.validate()?;

    let comment = state
        .comments
        .create(Comment::new(request.parent_id, request.content), &request_deadline(&state))
        .await?;

    tracing::info!(id = comment.id, parent_id = ?comment.parent_id, "Comment created");

    Ok((StatusCode::CREATED, Json(comment)))
}

/// Replace the content of a comment
pub async fn update_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateCommentRequest>,
) -> Result<Json<UpdateCommentResponse>> {
    request.validate()?;

    let mut comment = Comment::new(None, request.content);
    comment.id = id;
    state.comments.update(&comment, &request_deadline(&state)).await?;

    Ok(Json(UpdateCommentResponse {
        id: comment.id,
        content: comment.content,
    }))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.comments.delete(id, &request_deadline(&state)).await?;

    tracing::info!(id, "Comment deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// List root comments or the replies to one comment
pub async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Comment>>> {
    let parent_id = parse_parent(query.parent.as_deref())?;
    let page = page(&state, query.limit, query.offset);

    let comments = state
        .comments
        .get_by_parent(parent_id, page, &request_deadline(&state))
        .await?;

    Ok(Json(comments))
}

/// Full-text search over comment content
pub async fn search_comments(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Comment>>> {
    let page = page(&state, query.limit, query.offset);

    let comments = state
        .comments
        .search(&query.query, page, &request_deadline(&state))
        .await?;

    tracing::debug!(query = %query.query, results = comments.len(), "Search completed");

    Ok(Json(comments))
}
