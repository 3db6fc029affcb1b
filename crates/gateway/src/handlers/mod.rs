//! API handlers module

pub mod comments;
pub mod health;
