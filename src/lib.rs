//! # Bloodless Digest
//!
//! Aggregates bloodless medicine and Patient Blood Management literature from
//! eight biomedical sources into a small, self-expiring weekly digest.
//!
//! ## Architecture
//!
//! - [`sources`]: One adapter per provider behind the [`Source`] trait
//! - [`pipeline`]: Concurrent fan-out, trust and relevance filtering, dedup, scoring and ranking
//! - [`store`]: Capped article store with expiry, legacy purge and the last-search record
//! - [`service`]: Manual and scheduled triggers, status, and report dispatch
//! - [`notify`]: Email delivery with per-recipient outcomes and a `mailto:` fallback
//! - [`mcp`]: MCP server exposing the digest as tools
//! - [`config`]: Layered configuration (defaults, TOML file, environment)

pub mod config;
pub mod mcp;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod service;
pub mod sources;
pub mod store;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use models::{Article, LastSearchRecord};
pub use service::{DigestService, SearchOutcome, Trigger};
pub use sources::{Source, SourceRegistry};
pub use store::ArticleStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
