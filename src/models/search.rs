//! Search request, response and run bookkeeping models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::models::Article;

/// Search query parameters passed to every adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text query string
    pub query: String,

    /// Maximum number of results to request per adapter
    pub max_results: usize,

    /// Year filter (single year, range like "2018-2022", or "2020-" for from)
    pub year: Option<String>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            max_results: 10,
            year: None,
        }
    }
}

impl SearchQuery {
    /// Create a new search query
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Set maximum results
    pub fn max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    /// Set year filter
    pub fn year(mut self, year: impl Into<String>) -> Self {
        self.year = Some(year.into());
        self
    }

    /// Lower and upper bound of the year filter, if any
    pub fn year_bounds(&self) -> (Option<i32>, Option<i32>) {
        let Some(year) = self.year.as_deref().map(str::trim) else {
            return (None, None);
        };
        match year.split_once('-') {
            Some((from, to)) => (from.trim().parse().ok(), to.trim().parse().ok()),
            None => {
                let single = year.parse().ok();
                (single, single)
            }
        }
    }
}

/// Search response containing articles and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Articles found
    pub articles: Vec<Article>,

    /// Total number of matches reported by the provider
    pub total_results: Option<usize>,

    /// Source of the results
    pub source: String,

    /// Query that was executed
    pub query: String,
}

impl SearchResponse {
    /// Create a new search response
    pub fn new(articles: Vec<Article>, source: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            articles,
            total_results: None,
            source: source.into(),
            query: query.into(),
        }
    }

    /// An empty response for a query that matched nothing
    pub fn empty(source: impl Into<String>, query: impl Into<String>) -> Self {
        Self::new(Vec::new(), source, query)
    }

    /// Set total results
    pub fn total_results(mut self, total: usize) -> Self {
        self.total_results = Some(total);
        self
    }
}

/// Bookkeeping for one aggregation run (not persisted)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRun {
    /// Queries issued this run
    pub queries: Vec<String>,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// Number of accepted articles after filtering and ranking
    pub articles_found: usize,

    /// Sources that yielded at least one raw result
    pub sources: BTreeSet<String>,

    /// Sources where at least one call failed or timed out
    pub failed_sources: BTreeSet<String>,

    /// Adapter calls attempted
    pub calls: usize,

    /// Adapter calls that failed or timed out
    pub failed_calls: usize,
}

impl SearchRun {
    pub fn new(queries: Vec<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            queries,
            started_at,
            articles_found: 0,
            sources: BTreeSet::new(),
            failed_sources: BTreeSet::new(),
            calls: 0,
            failed_calls: 0,
        }
    }

    /// Every attempted adapter call failed
    pub fn is_total_failure(&self) -> bool {
        self.calls > 0 && self.failed_calls == self.calls
    }
}

/// Singleton record describing the most recent completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSearchRecord {
    pub last_search_timestamp: DateTime<Utc>,
    pub next_scheduled_search: DateTime<Utc>,
    /// Articles accepted by the run itself (not the post-merge total)
    pub articles_found: usize,
    pub sources_searched: Vec<String>,
}

impl LastSearchRecord {
    /// Record for a run completed at `now`
    pub fn for_run(run: &SearchRun, now: DateTime<Utc>, interval: Duration) -> Self {
        Self {
            last_search_timestamp: now,
            next_scheduled_search: now + interval,
            articles_found: run.articles_found,
            sources_searched: run.sources.iter().cloned().collect(),
        }
    }

    /// Whether a new search is due at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_scheduled_search
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_bounds() {
        assert_eq!(SearchQuery::new("x").year_bounds(), (None, None));
        assert_eq!(SearchQuery::new("x").year("2020").year_bounds(), (Some(2020), Some(2020)));
        assert_eq!(SearchQuery::new("x").year("2018-2022").year_bounds(), (Some(2018), Some(2022)));
        assert_eq!(SearchQuery::new("x").year("2020-").year_bounds(), (Some(2020), None));
        assert_eq!(SearchQuery::new("x").year("-2015").year_bounds(), (None, Some(2015)));
    }

    #[test]
    fn test_total_failure() {
        let mut run = SearchRun::new(vec!["q".into()], Utc::now());
        assert!(!run.is_total_failure());

        run.calls = 3;
        run.failed_calls = 2;
        assert!(!run.is_total_failure());

        run.failed_calls = 3;
        assert!(run.is_total_failure());
    }

    #[test]
    fn test_last_search_record() {
        let now = Utc::now();
        let mut run = SearchRun::new(vec!["q".into()], now);
        run.articles_found = 4;
        run.sources.insert("PubMed".into());

        let record = LastSearchRecord::for_run(&run, now, Duration::days(7));
        assert_eq!(record.articles_found, 4);
        assert_eq!(record.sources_searched, vec!["PubMed".to_string()]);
        assert!(!record.is_due(now + Duration::days(6)));
        assert!(record.is_due(now + Duration::days(7)));

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("nextScheduledSearch").is_some());
    }
}
