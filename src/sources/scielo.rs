//! SciELO source implementation.
//!
//! SciELO's search portal has no JSON API but exposes each result page as an
//! RSS feed (`output=rss`), which is parsed with feed-rs. Entries carry no
//! language tag, so Portuguese detection falls back to the text heuristic.

use async_trait::async_trait;
use feed_rs::model::Entry;
use std::sync::Arc;

use crate::models::{Article, ArticleBuilder, SearchQuery, SearchResponse, SourceType};
use crate::sources::{fetch_text, Source, SourceCapabilities, SourceError};
use crate::utils::HttpClient;

const SCIELO_SEARCH_URL: &str = "https://search.scielo.org";

/// SciELO source
#[derive(Debug, Clone)]
pub struct ScieloSource {
    client: Arc<HttpClient>,
    base_url: String,
}

impl ScieloSource {
    pub fn new() -> Result<Self, SourceError> {
        Ok(Self::with_client(Arc::new(HttpClient::new()?)))
    }

    pub fn with_client(client: Arc<HttpClient>) -> Self {
        Self {
            client,
            base_url: SCIELO_SEARCH_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_search_url(&self, query: &SearchQuery) -> String {
        format!(
            "{}/?q={}&lang=pt&count={}&from=0&output=rss&sort=RELEVANCE",
            self.base_url,
            urlencoding::encode(&query.query),
            query.max_results.clamp(1, 100)
        )
    }

    fn parse_feed(xml: &str) -> Result<Vec<Article>, SourceError> {
        let feed = feed_rs::parser::parse(xml.as_bytes())
            .map_err(|e| SourceError::Parse(format!("Failed to parse SciELO feed: {}", e)))?;

        Ok(feed.entries.iter().filter_map(Self::parse_entry).collect())
    }

    /// Parse a feed entry into an Article
    fn parse_entry(entry: &Entry) -> Option<Article> {
        let title = entry.title.as_ref().map(|t| t.content.clone())?;
        let url = entry
            .links
            .iter()
            .map(|l| l.href.trim())
            .find(|href| href.starts_with("http"))
            .map(str::to_string)
            .or_else(|| Some(entry.id.clone()).filter(|id| id.starts_with("http")))?;

        let mut builder = ArticleBuilder::new(title, url, SourceType::Scielo).has_full_text(true);

        let summary = entry
            .summary
            .as_ref()
            .map(|s| s.content.as_str())
            .or_else(|| entry.content.as_ref().and_then(|c| c.body.as_deref()));
        if let Some(summary) = summary {
            builder = builder.snippet(summary);
        }
        if let Some(date) = entry.published.or(entry.updated) {
            builder = builder.publication_date(date.format("%Y-%m-%d").to_string());
        }

        builder.is_preprint(false).build()
    }
}

#[async_trait]
impl Source for ScieloSource {
    fn id(&self) -> &str {
        "scielo"
    }

    fn name(&self) -> &str {
        "SciELO"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH | SourceCapabilities::FULL_TEXT
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SourceError> {
        let xml = fetch_text(
            &self.client,
            "SciELO",
            &self.build_search_url(query),
            &[("Accept", "application/rss+xml, application/xml".to_string())],
        )
        .await?;

        let mut articles = Self::parse_feed(&xml)?;
        articles.truncate(query.max_results);
        Ok(SearchResponse::new(articles, "SciELO", &query.query))
    }
}
