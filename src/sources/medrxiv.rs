//! medRxiv source implementation.
//!
//! The medRxiv details API has no keyword search: it lists postings in a date
//! window, 100 per page. The adapter fetches a bounded number of pages for the
//! recent window (narrowed by the query's year filter) once per day, keeps them
//! in memory, and matches queries locally against title and abstract.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::{Article, ArticleBuilder, SearchQuery, SearchResponse, SourceType};
use crate::sources::{fetch_text, Source, SourceCapabilities, SourceError};
use crate::utils::HttpClient;

const MEDRXIV_API_URL: &str = "https://api.biorxiv.org";

/// Records per page returned by the details API
const PAGE_SIZE: usize = 100;

const DEFAULT_MAX_PAGES: usize = 5;

const DEFAULT_WINDOW_DAYS: i64 = 90;

/// Postings fetched for one day and date range
#[derive(Debug, Clone)]
struct Snapshot {
    day: NaiveDate,
    from: NaiveDate,
    to: NaiveDate,
    papers: Arc<Vec<MedRxivPaper>>,
}

/// medRxiv source
#[derive(Debug, Clone)]
pub struct MedRxivSource {
    client: Arc<HttpClient>,
    base_url: String,
    window_days: i64,
    max_pages: usize,
    snapshot: Arc<Mutex<Option<Snapshot>>>,
}

impl MedRxivSource {
    pub fn new() -> Result<Self, SourceError> {
        Ok(Self::with_client(Arc::new(HttpClient::new()?)))
    }

    pub fn with_client(client: Arc<HttpClient>) -> Self {
        Self {
            client,
            base_url: MEDRXIV_API_URL.to_string(),
            window_days: DEFAULT_WINDOW_DAYS,
            max_pages: DEFAULT_MAX_PAGES,
            snapshot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Number of days back from today that are scanned
    pub fn with_window_days(mut self, days: i64) -> Self {
        self.window_days = days.max(1);
        self
    }

    /// Upper bound on pages fetched per day
    pub fn with_max_pages(mut self, pages: usize) -> Self {
        self.max_pages = pages.max(1);
        self
    }

    fn build_page_url(&self, from: NaiveDate, to: NaiveDate, cursor: usize) -> String {
        format!(
            "{}/details/medrxiv/{}/{}/{}/json",
            self.base_url,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d"),
            cursor
        )
    }

    fn parse_page(json: &str) -> Result<(Vec<MedRxivPaper>, Option<usize>), SourceError> {
        let page: DetailsResponse = serde_json::from_str(json)
            .map_err(|e| SourceError::Parse(format!("Failed to parse medRxiv JSON: {}", e)))?;

        let total = page
            .messages
            .first()
            .and_then(|m| m.total.as_ref())
            .and_then(|t| match t {
                serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize),
                serde_json::Value::String(s) => s.parse().ok(),
                _ => None,
            });
        Ok((page.collection, total))
    }

    /// Date range scanned for a query: the recent window narrowed by its year filter
    fn window_for(&self, query: &SearchQuery, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let mut from = today - Duration::days(self.window_days);
        let mut to = today;

        let (start_year, end_year) = query.year_bounds();
        if let Some(start) = start_year.and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1)) {
            from = from.max(start);
        }
        if let Some(end) = end_year.and_then(|y| NaiveDate::from_ymd_opt(y, 12, 31)) {
            to = to.min(end);
        }
        (from <= to).then_some((from, to))
    }

    /// Postings between `from` and `to`, fetched at most once per day
    async fn postings(
        &self,
        today: NaiveDate,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Arc<Vec<MedRxivPaper>>, SourceError> {
        let mut guard = self.snapshot.lock().await;
        if let Some(snapshot) = guard
            .as_ref()
            .filter(|s| s.day == today && s.from == from && s.to == to)
        {
            return Ok(Arc::clone(&snapshot.papers));
        }

        let mut papers = Vec::new();
        let mut cursor = 0;
        let mut total = None;
        let mut covered = false;

        for _ in 0..self.max_pages {
            let json = fetch_text(
                &self.client,
                "medRxiv",
                &self.build_page_url(from, to, cursor),
                &[],
            )
            .await?;
            let (page, page_total) = Self::parse_page(&json)?;
            total = page_total.or(total);
            let fetched = page.len();
            papers.extend(page);
            cursor += fetched;

            if fetched < PAGE_SIZE || total.is_some_and(|t| cursor >= t) {
                covered = true;
                break;
            }
        }

        if covered {
            tracing::debug!(
                count = papers.len(),
                from = %from,
                to = %to,
                "Fetched medRxiv postings"
            );
        } else {
            tracing::warn!(
                scanned = papers.len(),
                total = ?total,
                pages = self.max_pages,
                from = %from,
                to = %to,
                "medRxiv window exceeds the page budget; remaining postings were not scanned"
            );
        }

        let papers = Arc::new(papers);
        *guard = Some(Snapshot {
            day: today,
            from,
            to,
            papers: Arc::clone(&papers),
        });
        Ok(papers)
    }

    /// Every query word must appear in title or abstract
    fn matches(paper: &MedRxivPaper, words: &[String]) -> bool {
        let mut text = paper.title.clone().unwrap_or_default().to_lowercase();
        if let Some(abstract_text) = &paper.r#abstract {
            text.push(' ');
            text.push_str(&abstract_text.to_lowercase());
        }
        words.iter().all(|w| text.contains(w.as_str()))
    }

    fn to_article(paper: &MedRxivPaper) -> Option<Article> {
        let doi = paper.doi.as_deref().map(str::trim).filter(|d| !d.is_empty())?;
        let url = match paper.version.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            Some(version) => format!("https://www.medrxiv.org/content/{}v{}", doi, version),
            None => format!("https://www.medrxiv.org/content/{}", doi),
        };

        let mut builder = ArticleBuilder::new(
            paper.title.clone().unwrap_or_default(),
            url,
            SourceType::MedRxiv,
        )
        .has_full_text(true)
        .is_preprint(true);

        if let Some(abstract_text) = &paper.r#abstract {
            builder = builder.snippet(abstract_text);
        }
        if let Some(date) = &paper.date {
            builder = builder.publication_date(date.clone());
        }
        builder.build()
    }
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    #[serde(default)]
    messages: Vec<DetailsMessage>,
    #[serde(default)]
    collection: Vec<MedRxivPaper>,
}

#[derive(Debug, Deserialize)]
struct DetailsMessage {
    total: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct MedRxivPaper {
    doi: Option<String>,
    title: Option<String>,
    r#abstract: Option<String>,
    date: Option<String>,
    version: Option<String>,
}

#[async_trait]
impl Source for MedRxivSource {
    fn id(&self) -> &str {
        "medrxiv"
    }

    fn name(&self) -> &str {
        "medRxiv"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
            | SourceCapabilities::YEAR_FILTER
            | SourceCapabilities::FULL_TEXT
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SourceError> {
        let words: Vec<String> = query
            .query
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();
        if words.is_empty() {
            return Ok(SearchResponse::empty("medRxiv", &query.query));
        }

        let today = Utc::now().date_naive();
        let Some((from, to)) = self.window_for(query, today) else {
            tracing::debug!(year = ?query.year, "Year filter lies outside the medRxiv window");
            return Ok(SearchResponse::empty("medRxiv", &query.query));
        };

        let postings = self.postings(today, from, to).await?;
        let articles: Vec<Article> = postings
            .iter()
            .filter(|paper| Self::matches(paper, &words))
            .filter_map(Self::to_article)
            .take(query.max_results)
            .collect();

        Ok(SearchResponse::new(articles, "medRxiv", &query.query).total_results(postings.len()))
    }
}
