//! Literature source adapters with a trait-based plugin architecture.
//!
//! This module defines the [`Source`] trait that every external literature API
//! implements. Each adapter translates one provider's response shape into the
//! common [`Article`](crate::models::Article) model. Adapters are registered in a
//! fixed priority order in the [`SourceRegistry`]; that order decides which
//! source wins when two sources return the same work.
//!
//! # Adapters
//!
//! | id           | provider                              |
//! |--------------|---------------------------------------|
//! | `pubmed`     | NCBI E-utilities (esearch + efetch)   |
//! | `europe_pmc` | Europe PMC REST search                |
//! | `semantic`   | Semantic Scholar Graph API            |
//! | `doaj`       | Directory of Open Access Journals     |
//! | `medrxiv`    | medRxiv details API                   |
//! | `scielo`     | SciELO search (RSS output)            |
//! | `base`       | Bielefeld Academic Search Engine      |
//! | `openalex`   | OpenAlex works API                    |
//!
//! # Best-effort contract
//!
//! `Source::search` returns a `Result` so adapters can use `?` internally. The
//! pipeline never calls it directly: it goes through [`fetch_best_effort`],
//! which bounds the call with a timeout and turns every failure into an empty
//! article list plus a logged warning.

mod base;
mod doaj;
mod europe_pmc;
mod medrxiv;
mod openalex;
mod pubmed;
mod registry;
mod scielo;
mod semantic;

pub mod mock;

pub use base::BaseSource;
pub use doaj::DoajSource;
pub use europe_pmc::EuropePmcSource;
pub use medrxiv::MedRxivSource;
pub use mock::MockSource;
pub use openalex::OpenAlexSource;
pub use pubmed::PubMedSource;
pub use registry::{SourceCapabilities, SourceRegistry, DEFAULT_SOURCE_ORDER};
pub use scielo::ScieloSource;
pub use semantic::SemanticScholarSource;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;

use crate::models::{Article, SearchQuery, SearchResponse};
use crate::utils::{api_retry_config, with_retry, HttpClient};

/// The Source trait defines the interface for all literature source adapters.
///
/// # Implementing a New Source
///
/// 1. Create a struct holding an `Arc<HttpClient>` and its base URL
/// 2. Implement `id`, `name` and `search`
/// 3. Declare optional signals through `capabilities`
/// 4. Add the source to `SourceRegistry::from_config`
#[async_trait]
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this source (e.g., "pubmed", "openalex")
    fn id(&self) -> &str;

    /// Human-readable name of this source
    fn name(&self) -> &str;

    /// Describe the capabilities of this source
    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
    }

    /// Whether this source honours `SearchQuery::year`
    fn supports_year_filter(&self) -> bool {
        self.capabilities()
            .contains(SourceCapabilities::YEAR_FILTER)
    }

    /// Search for articles matching the query
    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SourceError>;
}

/// Errors that can occur when interacting with a source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(String),

    /// Parsing error (XML, JSON, RSS, etc.)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimit,

    /// API error from the source
    #[error("API error: {0}")]
    Api(String),

    /// The call did not finish within its time budget
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Other error
    #[error("Error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

impl From<quick_xml::DeError> for SourceError {
    fn from(err: quick_xml::DeError) -> Self {
        SourceError::Parse(format!("XML: {}", err))
    }
}

/// Map a non-success HTTP status to a [`SourceError`]
///
/// 429 becomes `RateLimit`; 5xx responses are worded so that the retry layer
/// treats them as transient.
pub(crate) fn status_error(provider: &str, status: reqwest::StatusCode) -> SourceError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        SourceError::RateLimit
    } else if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
        SourceError::Api(format!("{} service unavailable", provider))
    } else if status.is_server_error() {
        SourceError::Api(format!("{} server error: {}", provider, status))
    } else {
        SourceError::Api(format!("{} returned status: {}", provider, status))
    }
}

/// GET `url` as text with throttling, retry and status mapping
pub(crate) async fn fetch_text(
    client: &Arc<HttpClient>,
    provider: &str,
    url: &str,
    headers: &[(&'static str, String)],
) -> Result<String, SourceError> {
    tracing::debug!("{} request: {}", provider, url);
    with_retry(api_retry_config(), || {
        let client = Arc::clone(client);
        let url = url.to_string();
        let provider = provider.to_string();
        let headers = headers.to_vec();
        async move {
            client.throttle().await;
            let mut request = client.get(&url);
            for (name, value) in headers {
                request = request.header(name, value);
            }

            let response = request
                .send()
                .await
                .map_err(|e| SourceError::Network(format!("Failed to reach {}: {}", provider, e)))?;

            let status = response.status();
            if !status.is_success() {
                return Err(status_error(&provider, status));
            }

            response.text().await.map_err(|e| {
                SourceError::Network(format!("Failed to read {} response: {}", provider, e))
            })
        }
    })
    .await
}

/// Result of one best-effort adapter call
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    /// Adapter id
    pub source_id: String,
    /// Query that was issued
    pub query: String,
    /// Normalized articles (empty on failure)
    pub articles: Vec<Article>,
    /// Failure description, if the call failed or timed out
    pub error: Option<String>,
}

impl SourceOutcome {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Run one adapter call under a timeout, never propagating its failure
///
/// Errors, timeouts and panics inside the adapter all become a failed
/// [`SourceOutcome`].
pub async fn fetch_best_effort(
    source: &dyn Source,
    query: &SearchQuery,
    timeout: Duration,
) -> SourceOutcome {
    let started = std::time::Instant::now();
    let call = AssertUnwindSafe(source.search(query)).catch_unwind();
    let result = match tokio::time::timeout(timeout, call).await {
        Ok(Ok(result)) => result,
        Ok(Err(payload)) => Err(SourceError::Other(format!(
            "adapter panicked: {}",
            panic_message(payload.as_ref())
        ))),
        Err(_) => Err(SourceError::Timeout(timeout)),
    };

    match result {
        Ok(response) => {
            tracing::debug!(
                source = source.id(),
                query = %query.query,
                count = response.articles.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Source search completed"
            );
            SourceOutcome {
                source_id: source.id().to_string(),
                query: query.query.clone(),
                articles: response.articles,
                error: None,
            }
        }
        Err(e) => {
            tracing::warn!(
                source = source.id(),
                query = %query.query,
                "Source search failed: {}",
                e
            );
            SourceOutcome {
                source_id: source.id().to_string(),
                query: query.query.clone(),
                articles: Vec::new(),
                error: Some(e.to_string()),
            }
        }
    }
}
