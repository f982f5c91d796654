//! Utility modules supporting the aggregation pipeline.
//!
//! - [`deduplicate_articles`]: Keep one article per canonical URL (first seen wins)
//! - [`HttpClient`]: HTTP client with an optional rate limit
//! - [`RetryConfig`] / [`with_retry`]: Retry transient adapter errors with backoff
//! - [`text`]: Snippet cleanup, year extraction, host labels, language heuristics
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use bloodless_digest::utils::{with_retry, api_retry_config};
//! use bloodless_digest::sources::SourceError;
//!
//! # async fn fetch_data() -> Result<String, SourceError> { Ok("data".to_string()) }
//! # #[tokio::main]
//! # async fn main() -> Result<(), SourceError> {
//! let body = with_retry(api_retry_config(), || fetch_data()).await?;
//! # Ok(())
//! # }
//! ```

mod dedup;
mod http;
mod retry;
pub mod text;

pub use dedup::{deduplicate_articles, url_key};
pub use http::{HttpClient, DEFAULT_TIMEOUT};
pub use retry::{api_retry_config, with_retry, RetryConfig, TransientError};
