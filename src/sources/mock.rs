//! Mock source for testing purposes.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::models::{Article, SearchQuery, SearchResponse};
use crate::sources::{Source, SourceCapabilities, SourceError};

/// A mock source that returns predefined articles, optionally slowly or not at all.
#[derive(Debug, Default)]
pub struct MockSource {
    id: String,
    articles: Mutex<Vec<Article>>,
    delay: Option<Duration>,
    failing: bool,
    panicking: bool,
    calls: AtomicUsize,
}

impl MockSource {
    /// Create a new mock source with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Articles returned for every query.
    pub fn with_articles(self, articles: Vec<Article>) -> Self {
        self.set_articles(articles);
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call with a network error.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Panic inside every call.
    pub fn panicking(mut self) -> Self {
        self.panicking = true;
        self
    }

    /// Replace the configured articles.
    pub fn set_articles(&self, articles: Vec<Article>) {
        let mut guard = self.articles.lock().unwrap_or_else(|e| e.into_inner());
        *guard = articles;
    }

    /// Number of searches issued against this source.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Mock Source"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panicking {
            panic!("{} adapter bug", self.id);
        }
        if self.failing {
            return Err(SourceError::Network(format!("{} is unreachable", self.id)));
        }

        let articles = self
            .articles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        Ok(SearchResponse::new(articles, self.id.clone(), &query.query))
    }
}
