//! Aggregation pipeline: fan-out, filter, score, deduplicate, rank.
//!
//! ```text
//! queries x sources --(join_all, ordered)--> raw articles
//!     -> FilterPolicy::check -> score_all -> deduplicate_articles
//!     -> rank (stable) -> truncate(max_articles)
//! ```

mod aggregate;
mod filter;
mod rank;

pub use aggregate::{AggregationResult, Aggregator, AggregatorSettings};
pub use filter::{FilterPolicy, Rejection, TrustMode};
pub use rank::{compare, rank, score_all};
