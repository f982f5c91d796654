//! Semantic Scholar source implementation.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::models::{Article, ArticleBuilder, SearchQuery, SearchResponse, SourceType};
use crate::sources::{fetch_text, Source, SourceCapabilities, SourceError};
use crate::utils::HttpClient;

const SEMANTIC_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

const SEARCH_FIELDS: &str =
    "title,abstract,url,year,publicationDate,venue,citationCount,isOpenAccess,externalIds,publicationTypes";

/// Semantic Scholar source
///
/// Uses the Graph API paper search. An API key is optional but raises the
/// shared unauthenticated rate limit.
#[derive(Debug, Clone)]
pub struct SemanticScholarSource {
    client: Arc<HttpClient>,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarSource {
    /// Create a new Semantic Scholar source
    pub fn new() -> Result<Self, SourceError> {
        Ok(Self::with_client(Arc::new(HttpClient::new()?)))
    }

    /// Create with a custom HTTP client
    pub fn with_client(client: Arc<HttpClient>) -> Self {
        Self {
            client,
            base_url: SEMANTIC_API_BASE.to_string(),
            api_key: None,
        }
    }

    /// Override the Graph API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// API key sent as `x-api-key`
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    fn build_search_url(&self, query: &SearchQuery) -> String {
        let mut url = format!(
            "{}/paper/search?query={}&limit={}&fields={}",
            self.base_url,
            urlencoding::encode(&query.query),
            query.max_results.clamp(1, 100),
            SEARCH_FIELDS
        );
        // The Graph API accepts the same "2020-" / "2018-2022" year syntax
        if let Some(year) = query.year.as_deref().map(str::trim).filter(|y| !y.is_empty()) {
            url.push_str(&format!("&year={}", urlencoding::encode(year)));
        }
        url
    }

    fn parse_search_response(json: &str) -> Result<(Vec<Article>, Option<usize>), SourceError> {
        let response: S2SearchResponse = serde_json::from_str(json).map_err(|e| {
            SourceError::Parse(format!("Failed to parse Semantic Scholar JSON: {}", e))
        })?;

        let articles = response
            .data
            .iter()
            .filter_map(Self::parse_paper)
            .collect();
        Ok((articles, response.total))
    }

    /// Parse Semantic Scholar paper data
    fn parse_paper(data: &S2Paper) -> Option<Article> {
        let doi = data
            .external_ids
            .as_ref()
            .and_then(|ids| ids.doi.clone())
            .filter(|d| !d.trim().is_empty());

        let url = data
            .url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| data.paper_id.as_ref().map(|id| format!("https://www.semanticscholar.org/paper/{}", id)))
            .or_else(|| doi.as_ref().map(|d| format!("https://doi.org/{}", d)))?;

        let mut builder =
            ArticleBuilder::new(data.title.clone().unwrap_or_default(), url, SourceType::SemanticScholar);

        if let Some(abstract_text) = &data.r#abstract {
            builder = builder.snippet(abstract_text);
        }
        if let Some(date) = data
            .publication_date
            .clone()
            .or_else(|| data.year.map(|y| y.to_string()))
        {
            builder = builder.publication_date(date);
        }
        if let Some(count) = data.citation_count {
            builder = builder.citation_count(count);
        }
        if let Some(open) = data.is_open_access {
            builder = builder.has_full_text(open);
        }

        let venue = data.venue.as_deref().unwrap_or_default().to_lowercase();
        let preprint = venue.contains("rxiv")
            || data
                .external_ids
                .as_ref()
                .is_some_and(|ids| ids.arxiv.is_some() && doi.is_none());

        builder.is_preprint(preprint).build()
    }
}

#[derive(Debug, Deserialize)]
struct S2SearchResponse {
    total: Option<usize>,
    #[serde(default)]
    data: Vec<S2Paper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    paper_id: Option<String>,
    title: Option<String>,
    r#abstract: Option<String>,
    url: Option<String>,
    year: Option<i32>,
    publication_date: Option<String>,
    venue: Option<String>,
    citation_count: Option<u32>,
    is_open_access: Option<bool>,
    external_ids: Option<S2ExternalIds>,
}

#[derive(Debug, Deserialize)]
struct S2ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "ArXiv")]
    arxiv: Option<String>,
}

#[async_trait]
impl Source for SemanticScholarSource {
    fn id(&self) -> &str {
        "semantic"
    }

    fn name(&self) -> &str {
        "Semantic Scholar"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
            | SourceCapabilities::YEAR_FILTER
            | SourceCapabilities::CITATION_COUNTS
            | SourceCapabilities::FULL_TEXT
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SourceError> {
        let mut headers = Vec::new();
        if let Some(key) = &self.api_key {
            headers.push(("x-api-key", key.clone()));
        }

        let json = fetch_text(
            &self.client,
            "Semantic Scholar",
            &self.build_search_url(query),
            &headers,
        )
        .await?;

        let (articles, total) = Self::parse_search_response(&json)?;
        let response = SearchResponse::new(articles, "Semantic Scholar", &query.query);
        Ok(match total {
            Some(total) => response.total_results(total),
            None => response,
        })
    }
}
