//! Core data models for articles and search runs.

mod article;
mod search;

pub use article::{Article, ArticleBuilder, SourceType, RETENTION_DAYS};
pub use search::{LastSearchRecord, SearchQuery, SearchResponse, SearchRun};
