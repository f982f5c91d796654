//! Concurrent fan-out across all registered sources.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future;

use crate::models::{Article, SearchQuery, SearchRun};
use crate::pipeline::{rank, score_all, FilterPolicy};
use crate::sources::{fetch_best_effort, Source, SourceOutcome, SourceRegistry};
use crate::utils::deduplicate_articles;

/// Tunables for one aggregation run
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    /// Results requested from each source per query
    pub max_results_per_query: usize,
    /// Year filter passed to sources that support it
    pub year: Option<String>,
    /// Budget for a single source call
    pub timeout: Duration,
    /// Maximum number of ranked articles returned
    pub max_articles: usize,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            max_results_per_query: 10,
            year: Some("2020-".to_string()),
            timeout: Duration::from_secs(10),
            max_articles: 15,
        }
    }
}

/// Ranked articles plus run bookkeeping
#[derive(Debug, Clone)]
pub struct AggregationResult {
    pub articles: Vec<Article>,
    pub run: SearchRun,
}

/// Runs every query against every source, then filters, dedups and ranks
#[derive(Debug, Clone)]
pub struct Aggregator {
    registry: SourceRegistry,
    policy: FilterPolicy,
    settings: AggregatorSettings,
}

impl Aggregator {
    pub fn new(registry: SourceRegistry, policy: FilterPolicy, settings: AggregatorSettings) -> Self {
        Self {
            registry,
            policy,
            settings,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &FilterPolicy {
        &self.policy
    }

    pub fn settings(&self) -> &AggregatorSettings {
        &self.settings
    }

    /// Query for one source; the year filter only goes to sources that honour it
    fn query_for(&self, source: &dyn Source, text: &str) -> SearchQuery {
        let query = SearchQuery::new(text).max_results(self.settings.max_results_per_query);
        match &self.settings.year {
            Some(year) if source.supports_year_filter() => query.year(year.clone()),
            _ => query,
        }
    }

    /// Execute one aggregation run
    ///
    /// Every (source, query) call starts at once. Results are consumed in
    /// (source priority, query) order, so the higher-priority source wins
    /// duplicate URLs whichever call finishes first.
    pub async fn run(&self, queries: &[String]) -> AggregationResult {
        let mut run = SearchRun::new(queries.to_vec(), Utc::now());

        let pairs: Vec<(Arc<dyn Source>, SearchQuery)> = self
            .registry
            .all()
            .flat_map(|source| {
                queries
                    .iter()
                    .filter(|q| !q.trim().is_empty())
                    .map(move |q| (Arc::clone(source), self.query_for(source.as_ref(), q.trim())))
            })
            .collect();

        tracing::info!(
            sources = self.registry.len(),
            queries = queries.len(),
            calls = pairs.len(),
            "Starting aggregation run"
        );

        let timeout = self.settings.timeout;
        let outcomes: Vec<SourceOutcome> =
            future::join_all(pairs.into_iter().map(|(source, query)| async move {
                fetch_best_effort(source.as_ref(), &query, timeout).await
            }))
            .await;

        let mut raw = Vec::new();
        for outcome in outcomes {
            run.calls += 1;
            if outcome.is_failure() {
                run.failed_calls += 1;
                run.failed_sources.insert(outcome.source_id.clone());
            } else if !outcome.articles.is_empty() {
                run.sources.insert(outcome.source_id.clone());
            }
            raw.extend(outcome.articles);
        }
        let raw_count = raw.len();

        let mut accepted: Vec<Article> = raw
            .into_iter()
            .filter(|article| match self.policy.check(article) {
                Ok(()) => true,
                Err(reason) => {
                    tracing::trace!(url = %article.url, "Rejected: {}", reason);
                    false
                }
            })
            .collect();
        let accepted_count = accepted.len();

        score_all(&mut accepted, &self.policy);
        let mut articles = deduplicate_articles(accepted);
        rank(&mut articles, self.policy.scoring);
        articles.truncate(self.settings.max_articles);

        run.articles_found = articles.len();

        if run.is_total_failure() {
            tracing::warn!(calls = run.calls, "Every source call failed");
        } else {
            tracing::info!(
                raw = raw_count,
                accepted = accepted_count,
                ranked = articles.len(),
                failed_calls = run.failed_calls,
                "Aggregation run finished"
            );
        }

        AggregationResult { articles, run }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleBuilder, SourceType};
    use crate::sources::MockSource;

    fn article(title: &str, url: &str, provider: SourceType) -> Article {
        ArticleBuilder::new(title, url, provider).build().unwrap()
    }

    fn aggregator(sources: Vec<Arc<dyn Source>>) -> Aggregator {
        let mut registry = SourceRegistry::new();
        for source in sources {
            registry.register(source);
        }
        Aggregator::new(
            registry,
            FilterPolicy::default(),
            AggregatorSettings {
                timeout: Duration::from_millis(200),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_priority_order_wins_duplicates_regardless_of_timing() {
        let slow_high = MockSource::new("pubmed")
            .with_delay(Duration::from_millis(50))
            .with_articles(vec![article(
                "Bloodless surgery from the slow source",
                "https://doi.org/10.1/same",
                SourceType::PubMed,
            )]);
        let fast_low = MockSource::new("openalex").with_articles(vec![article(
            "Bloodless surgery from the fast source",
            "https://doi.org/10.1/same",
            SourceType::OpenAlex,
        )]);

        let agg = aggregator(vec![Arc::new(slow_high) as Arc<dyn Source>, Arc::new(fast_low)]);
        let result = agg.run(&["bloodless".to_string()]).await;

        assert_eq!(result.articles.len(), 1);
        assert_eq!(result.articles[0].provider, SourceType::PubMed);
        assert_eq!(result.run.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_failing_source_is_isolated() {
        let good = MockSource::new("europe_pmc").with_articles(vec![article(
            "Patient blood management in obstetrics",
            "https://europepmc.org/article/MED/1",
            SourceType::EuropePmc,
        )]);
        let bad = MockSource::new("semantic").failing();
        let slow = MockSource::new("doaj").with_delay(Duration::from_secs(5));

        let agg = aggregator(vec![Arc::new(bad) as Arc<dyn Source>, Arc::new(good), Arc::new(slow)]);
        let result = agg.run(&["patient blood management".to_string()]).await;

        assert_eq!(result.articles.len(), 1);
        assert!(!result.run.is_total_failure());
        assert_eq!(result.run.failed_calls, 2);
        assert!(result.run.failed_sources.contains("semantic"));
        assert!(result.run.failed_sources.contains("doaj"));
    }

    #[tokio::test]
    async fn test_total_failure() {
        let agg = aggregator(vec![
            Arc::new(MockSource::new("a").failing()) as Arc<dyn Source>,
            Arc::new(MockSource::new("b").failing()),
        ]);
        let result = agg.run(&["bloodless".to_string()]).await;
        assert!(result.articles.is_empty());
        assert!(result.run.is_total_failure());
    }

    #[tokio::test]
    async fn test_filters_and_truncates() {
        let mut articles: Vec<Article> = (0..30)
            .map(|i| {
                article(
                    &format!("Bloodless medicine case series {}", i),
                    &format!("https://europepmc.org/article/{}", i),
                    SourceType::EuropePmc,
                )
            })
            .collect();
        articles.push(article(
            "Bloodless surgery on an untrusted host",
            "https://random-blog.net/post",
            SourceType::EuropePmc,
        ));

        let source = MockSource::new("europe_pmc").with_articles(articles);
        let agg = aggregator(vec![Arc::new(source) as Arc<dyn Source>]);
        let result = agg.run(&["bloodless".to_string()]).await;

        assert_eq!(result.articles.len(), 15);
        assert_eq!(result.run.articles_found, 15);
        assert!(result.articles.iter().all(|a| a.url.contains("europepmc.org")));
        assert!(result.articles.iter().all(|a| a.relevance_score >= 1));
    }

    #[tokio::test]
    async fn test_every_query_reaches_every_source() {
        let a = Arc::new(MockSource::new("a"));
        let b = Arc::new(MockSource::new("b"));
        let agg = aggregator(vec![a.clone() as Arc<dyn Source>, b.clone()]);
        let queries = vec!["one".to_string(), "two".to_string(), "  ".to_string()];

        let result = agg.run(&queries).await;
        assert_eq!(result.run.calls, 4);
        assert_eq!(a.calls(), 2);
        assert_eq!(b.calls(), 2);
        assert!(result.articles.is_empty());
        assert!(!result.run.is_total_failure());
    }

    #[tokio::test]
    async fn test_slow_source_does_not_hold_back_siblings() {
        let slow = Arc::new(MockSource::new("pubmed").with_delay(Duration::from_millis(400)));
        let fast = Arc::new(MockSource::new("europe_pmc"));
        let agg = Aggregator::new(
            {
                let mut registry = SourceRegistry::new();
                registry.register(slow.clone());
                registry.register(fast.clone());
                registry
            },
            FilterPolicy::default(),
            AggregatorSettings::default(),
        );
        let queries: Vec<String> = (0..8).map(|i| format!("query {}", i)).collect();

        let handle = tokio::spawn({
            let agg = agg.clone();
            async move { agg.run(&queries).await }
        });
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(slow.calls(), 8);
        assert_eq!(fast.calls(), 8);

        let result = handle.await.unwrap();
        assert_eq!(result.run.calls, 16);
        assert_eq!(result.run.failed_calls, 0);
    }

    #[tokio::test]
    async fn test_panicking_source_is_isolated() {
        let good = MockSource::new("europe_pmc").with_articles(vec![
            article(
                "Patient blood management in obstetrics",
                "https://europepmc.org/article/MED/1",
                SourceType::EuropePmc,
            ),
            article(
                "Bloodless surgery in elderly patients",
                "https://europepmc.org/article/MED/2",
                SourceType::EuropePmc,
            ),
        ]);
        let agg = aggregator(vec![
            Arc::new(MockSource::new("pubmed").panicking()) as Arc<dyn Source>,
            Arc::new(good),
        ]);

        let result = agg.run(&["bloodless".to_string()]).await;
        assert_eq!(result.articles.len(), 2);
        assert!(!result.run.is_total_failure());
        assert!(result.run.failed_sources.contains("pubmed"));
    }

    #[test]
    fn test_year_filter_only_for_supporting_sources() {
        let sources = SourceRegistry::from_config(&crate::config::Config::default()).unwrap();
        let agg = Aggregator::new(
            SourceRegistry::new(),
            FilterPolicy::default(),
            AggregatorSettings::default(),
        );

        let openalex = sources.get("openalex").unwrap();
        assert_eq!(
            agg.query_for(openalex.as_ref(), "bloodless").year.as_deref(),
            Some("2020-")
        );
        let scielo = sources.get("scielo").unwrap();
        assert_eq!(agg.query_for(scielo.as_ref(), "bloodless").year, None);
    }
}
