//! Digest service: manual and scheduled triggers, status, and report dispatch.
//!
//! Triggers never fail as a whole. Every outcome is a structured
//! [`SearchOutcome`] with a success flag, a count and a message.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::models::{Article, LastSearchRecord};
use crate::notify::{DispatchError, DispatchReport, Mailer};
use crate::pipeline::{AggregationResult, Aggregator};
use crate::sources::{SourceError, SourceRegistry};
use crate::store::{ArticleStore, MergeSummary};

/// Errors building the service
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Source setup failed: {0}")]
    Source(#[from] SourceError),

    #[error("Email setup failed: {0}")]
    Dispatch(#[from] DispatchError),
}

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Scheduled,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Manual => write!(f, "manual"),
            Trigger::Scheduled => write!(f, "scheduled"),
        }
    }
}

/// Result of a manual or scheduled trigger
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub success: bool,
    pub trigger: Trigger,
    /// Number of articles in `articles`
    pub count: usize,
    pub message: String,
    /// Ranked articles from this run, or the stored digest when the run
    /// failed or was skipped
    pub articles: Vec<Article>,
    pub last_search: Option<LastSearchRecord>,
    /// True when a scheduled trigger found no run due
    pub skipped: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchReport>,
}

/// Read-only view of the store
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub last_search: Option<LastSearchRecord>,
    pub needs_new_search: bool,
    /// Storage rejected the last write; serving from memory
    pub degraded: bool,
    pub location: String,
    pub count: usize,
    pub articles: Vec<Article>,
}

/// Owns the aggregator, the store and the mailer
#[derive(Debug)]
pub struct DigestService {
    aggregator: Aggregator,
    store: Arc<ArticleStore>,
    mailer: Mailer,
    queries: Vec<String>,
}

impl DigestService {
    pub fn new(
        aggregator: Aggregator,
        store: Arc<ArticleStore>,
        mailer: Mailer,
        queries: Vec<String>,
    ) -> Self {
        Self {
            aggregator,
            store,
            mailer,
            queries,
        }
    }

    /// Build every component from configuration
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        let registry = SourceRegistry::from_config(config)?;
        let aggregator = Aggregator::new(
            registry,
            config.filter.clone(),
            config.aggregator_settings(),
        );
        let store = Arc::new(ArticleStore::open(config.data_dir(), config.store_settings()));
        let mailer = Mailer::new(config.email.clone())?;

        Ok(Self::new(
            aggregator,
            store,
            mailer,
            config.search.queries.clone(),
        ))
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn store(&self) -> &Arc<ArticleStore> {
        &self.store
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    /// On-demand run over the configured queries
    pub async fn manual_search(&self) -> SearchOutcome {
        self.search_with(&self.queries, Trigger::Manual).await
    }

    /// Run over the given queries (falls back to the configured ones when empty)
    pub async fn search_with(&self, queries: &[String], trigger: Trigger) -> SearchOutcome {
        let queries: Vec<String> = if queries.iter().any(|q| !q.trim().is_empty()) {
            queries.to_vec()
        } else {
            self.queries.clone()
        };

        // Adapter panics are caught per call; anything else surfaces as a JoinError
        let aggregator = self.aggregator.clone();
        let joined = tokio::spawn(async move { aggregator.run(&queries).await }).await;

        let result: AggregationResult = match joined {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, trigger = %trigger, "Aggregation run aborted");
                return self.fallback(trigger, "Search aborted unexpectedly", Vec::new());
            }
        };

        let failed_sources: Vec<String> = result.run.failed_sources.iter().cloned().collect();

        if result.run.calls == 0 {
            return self.fallback(trigger, "No sources or queries configured", failed_sources);
        }
        if result.run.is_total_failure() {
            let message = format!("All {} source calls failed", result.run.calls);
            return self.fallback(trigger, &message, failed_sources);
        }

        let merge = self.store.merge_and_save(result.articles.clone(), &result.run);
        let count = result.articles.len();
        let mut message = format!(
            "Found {} article{} from {} source{} ({} new in digest, {} stored)",
            count,
            plural(count),
            result.run.sources.len(),
            plural(result.run.sources.len()),
            merge.added,
            merge.total
        );
        if !failed_sources.is_empty() {
            message.push_str(&format!("; unavailable: {}", failed_sources.join(", ")));
        }
        if !merge.persisted {
            message.push_str("; storage unavailable, results kept in memory");
        }

        tracing::info!(trigger = %trigger, count, "Search run completed");

        SearchOutcome {
            success: true,
            trigger,
            count,
            message,
            articles: result.articles,
            last_search: self.store.last_search(),
            skipped: false,
            failed_sources,
            merge: Some(merge),
            dispatch: None,
        }
    }

    /// Scheduled run: skipped unless due (or forced); emails the digest
    /// afterwards when `notify` is set and recipients are configured
    pub async fn scheduled_search(&self, force: bool, notify: bool) -> SearchOutcome {
        if !force && !self.store.needs_new_search() {
            let articles = self.store.load_all();
            let last_search = self.store.last_search();
            let message = match &last_search {
                Some(record) => format!(
                    "Search not due until {}",
                    record.next_scheduled_search.format("%Y-%m-%d %H:%M UTC")
                ),
                None => "Search not due".to_string(),
            };
            tracing::debug!("{}", message);
            return SearchOutcome {
                success: true,
                trigger: Trigger::Scheduled,
                count: articles.len(),
                message,
                articles,
                last_search,
                skipped: true,
                failed_sources: Vec::new(),
                merge: None,
                dispatch: None,
            };
        }

        let mut outcome = self.search_with(&self.queries, Trigger::Scheduled).await;
        if notify && outcome.success && !self.mailer.default_recipients().is_empty() {
            outcome.dispatch = Some(self.send_report(None).await);
        }
        outcome
    }

    /// Last-search record plus the stored digest; never searches
    pub fn status(&self) -> StatusReport {
        let articles = self.store.load_all();
        StatusReport {
            last_search: self.store.last_search(),
            needs_new_search: self.store.needs_new_search(),
            degraded: self.store.is_degraded(),
            location: self.store.location(),
            count: articles.len(),
            articles,
        }
    }

    /// Email the stored digest to `recipients`, or the configured ones
    pub async fn send_report(&self, recipients: Option<&[String]>) -> DispatchReport {
        let recipients = recipients.unwrap_or_else(|| self.mailer.default_recipients());
        let articles = self.store.load_all();
        self.mailer.send(&articles, recipients).await
    }

    /// Check every `every` whether a scheduled run is due
    pub fn spawn_scheduler(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
            loop {
                ticker.tick().await;
                let outcome = service.scheduled_search(false, true).await;
                if !outcome.skipped {
                    tracing::info!(
                        success = outcome.success,
                        count = outcome.count,
                        "{}",
                        outcome.message
                    );
                }
            }
        })
    }

    /// Failed run: report the stored digest instead of an empty list
    fn fallback(&self, trigger: Trigger, reason: &str, failed_sources: Vec<String>) -> SearchOutcome {
        let articles = self.store.load_all();
        let message = format!(
            "{}; showing {} stored article{}",
            reason,
            articles.len(),
            plural(articles.len())
        );
        tracing::warn!(trigger = %trigger, "{}", message);
        SearchOutcome {
            success: false,
            trigger,
            count: articles.len(),
            message,
            articles,
            last_search: self.store.last_search(),
            skipped: false,
            failed_sources,
            merge: None,
            dispatch: None,
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
