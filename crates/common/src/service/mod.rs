//! Comment service
//!
//! Thin application layer over a [`CommentRepository`]. Forwards every call
//! and records failures at `debug` with the operation name; the transport
//! owns the error-level log when it turns the [`AppError`] into a response.

use crate::db::models::Comment;
use crate::db::{Cancellation, CommentRepository, Page};
use crate::errors::{AppError, Result};
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Clone)]
pub struct CommentService {
    repository: Arc<dyn CommentRepository>,
}

impl CommentService {
    pub fn new(repository: Arc<dyn CommentRepository>) -> Self {
        Self { repository }
    }

    /// Create a comment, returning it with its assigned id
    #[instrument(skip(self, comment, cancel), fields(parent_id = ?comment.parent_id))]
    pub async fn create(&self, mut comment: Comment, cancel: &Cancellation) -> Result<Comment> {
        self.repository
            .create(&mut comment, cancel)
            .await
            .map_err(|e| log_failure("create", e))?;
        Ok(comment)
    }

    #[instrument(skip(self, comment, cancel), fields(id = comment.id))]
    pub async fn update(&self, comment: &Comment, cancel: &Cancellation) -> Result<()> {
        self.repository
            .update(comment, cancel)
            .await
            .map_err(|e| log_failure("update", e))
    }

    #[instrument(skip(self, cancel))]
    pub async fn delete(&self, id: i64, cancel: &Cancellation) -> Result<()> {
        self.repository
            .delete(id, cancel)
            .await
            .map_err(|e| log_failure("delete", e))
    }

    #[instrument(skip(self, cancel))]
    pub async fn get_by_parent(
        &self,
        parent_id: Option<i64>,
        page: Page,
        cancel: &Cancellation,
    ) -> Result<Vec<Comment>> {
        self.repository
            .get_by_parent(parent_id, page, cancel)
            .await
            .map_err(|e| log_failure("get_by_parent", e))
    }

    #[instrument(skip(self, cancel))]
    pub async fn search(&self, query: &str, page: Page, cancel: &Cancellation) -> Result<Vec<Comment>> {
        self.repository
            .search(query, page, cancel)
            .await
            .map_err(|e| log_failure("search", e))
    }
}

fn log_failure(operation: &'static str, err: AppError) -> AppError {
    debug!(operation, code = ?err.code(), error = %err, "Comment operation failed");
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory repository keeping insertion order
    #[derive(Default)]
    struct MemoryRepository {
        rows: Mutex<Vec<Comment>>,
    }

    #[async_trait]
    impl CommentRepository for MemoryRepository {
        async fn create(&self, comment: &mut Comment, _cancel: &Cancellation) -> Result<()> {
            let mut rows = self.rows.lock().unwrap();
            comment.id = rows.len() as i64 + 1;
            rows.push(comment.clone());
            Ok(())
        }

        async fn update(&self, comment: &Comment, _cancel: &Cancellation) -> Result<()> {
            let mut rows = self.rows.lock().unwrap();
            if let Some(row) = rows.iter_mut().find(|r| r.id == comment.id) {
                row.content = comment.content.clone();
            }
            Ok(())
        }

        async fn delete(&self, id: i64, _cancel: &Cancellation) -> Result<()> {
            if id <= 0 {
                return Err(AppError::validation("id", "invalid id"));
            }
            self.rows.lock().unwrap().retain(|r| r.id != id);
            Ok(())
        }

        async fn get_by_parent(
            &self,
            parent_id: Option<i64>,
            page: Page,
            _cancel: &Cancellation,
        ) -> Result<Vec<Comment>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.parent_id == parent_id)
                .skip(page.offset as usize)
                .take(page.limit as usize)
                .cloned()
                .collect())
        }

        async fn search(&self, _query: &str, _page: Page, _cancel: &Cancellation) -> Result<Vec<Comment>> {
            Err(AppError::Cancelled { operation: "search" })
        }
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn service() -> CommentService {
        CommentService::new(Arc::new(MemoryRepository::default()))
    }

    #[tokio::test]
    async fn test_create_returns_assigned_id() {
        let service = service();
        let cancel = Cancellation::none();

        let root = service.create(Comment::new(None, "root"), &cancel).await.unwrap();
        let reply = service.create(Comment::new(Some(root.id), "reply"), &cancel).await.unwrap();

        assert_eq!(root.id, 1);
        assert_eq!(reply.id, 2);
        assert_eq!(reply.parent_id, Some(1));
    }

    #[tokio::test]
    async fn test_update_then_list_children() {
        let service = service();
        let cancel = Cancellation::none();

        let root = service.create(Comment::new(None, "root"), &cancel).await.unwrap();
        let mut reply = service.create(Comment::new(Some(root.id), "draft"), &cancel).await.unwrap();
        reply.content = "final".to_string();
        service.update(&reply, &cancel).await.unwrap();

        let children = service.get_by_parent(Some(root.id), Page::new(10, 0), &cancel).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].content, "final");

        let roots = service.get_by_parent(None, Page::new(10, 0), &cancel).await.unwrap();
        assert_eq!(roots, vec![root]);
    }

    #[tokio::test]
    async fn test_errors_pass_through_unchanged() {
        let service = service();
        let cancel = Cancellation::none();

        let err = service.delete(0, &cancel).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let err = service.search("x", Page::new(10, 0), &cancel).await.unwrap_err();
        assert!(matches!(err, AppError::Cancelled { operation: "search" }));
    }

    #[tokio::test]
    async fn test_server_failures_are_not_logged_at_error() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let err = service()
            .search("x", Page::new(10, 0), &Cancellation::none())
            .await
            .unwrap_err();
        assert!(err.is_server_error());

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("Comment operation failed"));
        assert!(logs.contains("DEBUG"));
        assert!(!logs.contains("ERROR"));
        assert!(!logs.contains("WARN"));
    }
}
