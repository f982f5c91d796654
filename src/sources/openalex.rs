//! OpenAlex works search.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{Article, ArticleBuilder, SearchQuery, SearchResponse, SourceType};
use crate::sources::{fetch_text, Source, SourceCapabilities, SourceError};
use crate::utils::HttpClient;

const OPENALEX_API_BASE: &str = "https://api.openalex.org";

/// OpenAlex source
///
/// Uses the OpenAlex REST API. A contact email puts requests in the polite pool.
#[derive(Debug, Clone)]
pub struct OpenAlexSource {
    client: Arc<HttpClient>,
    base_url: String,
    mailto: Option<String>,
}

impl OpenAlexSource {
    /// Create a new OpenAlex source
    pub fn new() -> Result<Self, SourceError> {
        Ok(Self::with_client(Arc::new(HttpClient::new()?)))
    }

    pub fn with_client(client: Arc<HttpClient>) -> Self {
        Self {
            client,
            base_url: OPENALEX_API_BASE.to_string(),
            mailto: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Contact email (recommended for better rate limits)
    pub fn with_mailto(mut self, mailto: Option<String>) -> Self {
        self.mailto = mailto.filter(|m| !m.trim().is_empty());
        self
    }

    fn build_search_url(&self, query: &SearchQuery) -> String {
        let mut url = format!(
            "{}/works?search={}&per-page={}",
            self.base_url,
            urlencoding::encode(&query.query),
            query.max_results.clamp(1, 200)
        );

        if let Some(filter) = query.year.as_deref().and_then(year_filter) {
            url = format!("{}&filter=publication_year:{}", url, filter);
        }
        if let Some(ref email) = self.mailto {
            url = format!("{}&mailto={}", url, urlencoding::encode(email));
        }
        url
    }

    fn parse_search_response(json: &str) -> Result<(Vec<Article>, Option<usize>), SourceError> {
        let data: WorksResponse = serde_json::from_str(json)
            .map_err(|e| SourceError::Parse(format!("Failed to parse OpenAlex JSON: {}", e)))?;

        let articles = data.results.iter().filter_map(Self::parse_work).collect();
        Ok((articles, data.meta.and_then(|m| m.count)))
    }

    /// Parse OpenAlex work data
    fn parse_work(data: &OAWork) -> Option<Article> {
        let doi_url = data.doi.clone().filter(|d| d.starts_with("http"));
        let url = data
            .primary_location
            .as_ref()
            .and_then(|l| l.landing_page_url.clone())
            .filter(|u| u.starts_with("http"))
            .or(doi_url)
            .or_else(|| data.id.clone())?;

        let title = data
            .title
            .clone()
            .or_else(|| data.display_name.clone())
            .unwrap_or_default();

        let mut builder = ArticleBuilder::new(title, url, SourceType::OpenAlex);

        if let Some(index) = &data.abstract_inverted_index {
            builder = builder.snippet(rebuild_abstract(index));
        }
        if let Some(date) = data
            .publication_date
            .clone()
            .or_else(|| data.publication_year.map(|y| y.to_string()))
        {
            builder = builder.publication_date(date);
        }
        if let Some(language) = &data.language {
            builder = builder.language(language.clone());
        }
        if let Some(count) = data.cited_by_count {
            builder = builder.citation_count(count);
        }
        if let Some(open) = data.open_access.as_ref().and_then(|oa| oa.is_oa) {
            builder = builder.has_full_text(open);
        }

        builder
            .is_preprint(data.work_type.as_deref() == Some("preprint"))
            .build()
    }
}

/// Translate "2020-", "-2018", "2015-2020" or "2021" into OpenAlex filter syntax
fn year_filter(year: &str) -> Option<String> {
    let year = year.trim();
    if year.is_empty() {
        None
    } else if let Some(start) = year.strip_suffix('-') {
        Some(format!(">{}", start.trim().parse::<i32>().ok()?.checked_sub(1)?))
    } else if let Some(end) = year.strip_prefix('-') {
        Some(format!("<{}", end.trim().parse::<i32>().ok()?.checked_add(1)?))
    } else if year.contains('-') {
        Some(year.to_string())
    } else if year.len() == 4 {
        Some(year.to_string())
    } else {
        None
    }
}

/// OpenAlex ships abstracts as word -> positions; put the words back in order
fn rebuild_abstract(index: &HashMap<String, Vec<usize>>) -> String {
    let mut positioned: Vec<(usize, &str)> = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |p| (*p, word.as_str())))
        .collect();
    positioned.sort_unstable_by_key(|(p, _)| *p);
    positioned
        .into_iter()
        .map(|(_, word)| word)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Deserialize)]
struct WorksResponse {
    meta: Option<WorksMeta>,
    #[serde(default)]
    results: Vec<OAWork>,
}

#[derive(Debug, Deserialize)]
struct WorksMeta {
    count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct OAWork {
    id: Option<String>,
    doi: Option<String>,
    title: Option<String>,
    display_name: Option<String>,
    publication_date: Option<String>,
    publication_year: Option<i32>,
    language: Option<String>,
    cited_by_count: Option<u32>,
    #[serde(rename = "type")]
    work_type: Option<String>,
    open_access: Option<OAOpenAccess>,
    primary_location: Option<OALocation>,
    abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
}

#[derive(Debug, Deserialize)]
struct OAOpenAccess {
    is_oa: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct OALocation {
    landing_page_url: Option<String>,
}

#[async_trait]
impl Source for OpenAlexSource {
    fn id(&self) -> &str {
        "openalex"
    }

    fn name(&self) -> &str {
        "OpenAlex"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
            | SourceCapabilities::YEAR_FILTER
            | SourceCapabilities::CITATION_COUNTS
            | SourceCapabilities::LANGUAGE
            | SourceCapabilities::FULL_TEXT
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SourceError> {
        let json = fetch_text(&self.client, "OpenAlex", &self.build_search_url(query), &[]).await?;

        let (articles, total) = Self::parse_search_response(&json)?;
        let response = SearchResponse::new(articles, "OpenAlex", &query.query);
        Ok(match total {
            Some(total) => response.total_results(total),
            None => response,
        })
    }
}
