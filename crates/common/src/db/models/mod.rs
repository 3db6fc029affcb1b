//! SeaORM entity models
//!
//! Database entities for Commentree

mod comment;

pub use comment::{
    Entity as CommentEntity,
    Model as Comment,
    ActiveModel as CommentActiveModel,
    Column as CommentColumn,
    MAX_CONTENT_CHARS,
};
