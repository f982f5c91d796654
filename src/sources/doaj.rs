//! DOAJ (Directory of Open Access Journals) source implementation.
//!
//! API documentation: <https://doaj.org/api/docs>
//!
//! DOAJ is free and requires no API key for search. Every indexed article is
//! open access.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::models::{Article, ArticleBuilder, SearchQuery, SearchResponse, SourceType};
use crate::sources::{fetch_text, Source, SourceCapabilities, SourceError};
use crate::utils::HttpClient;

const DOAJ_API_BASE: &str = "https://doaj.org/api";

/// DOAJ source
#[derive(Debug, Clone)]
pub struct DoajSource {
    client: Arc<HttpClient>,
    base_url: String,
}

impl DoajSource {
    pub fn new() -> Result<Self, SourceError> {
        Ok(Self::with_client(Arc::new(HttpClient::new()?)))
    }

    pub fn with_client(client: Arc<HttpClient>) -> Self {
        Self {
            client,
            base_url: DOAJ_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_search_url(&self, query: &SearchQuery) -> String {
        // The query is a path segment in the DOAJ search API
        format!(
            "{}/search/articles/{}?page=1&pageSize={}",
            self.base_url,
            urlencoding::encode(&query.query),
            query.max_results.clamp(1, 100)
        )
    }

    fn parse_search_response(json: &str) -> Result<(Vec<Article>, Option<usize>), SourceError> {
        let response: DoajResponse = serde_json::from_str(json)
            .map_err(|e| SourceError::Parse(format!("Failed to parse DOAJ response: {}", e)))?;

        let articles = response
            .results
            .iter()
            .filter_map(Self::parse_result)
            .collect();
        Ok((articles, response.total))
    }

    fn parse_result(result: &DoajArticle) -> Option<Article> {
        let bibjson = result.bibjson.as_ref()?;

        let doi = bibjson
            .identifier
            .iter()
            .find(|id| id.id_type.eq_ignore_ascii_case("doi"))
            .and_then(|id| id.id.clone())
            .filter(|d| !d.trim().is_empty());

        let url = bibjson
            .link
            .iter()
            .find(|l| l.link_type.as_deref() == Some("fulltext"))
            .and_then(|l| l.url.clone())
            .filter(|u| u.starts_with("http"))
            .or_else(|| doi.as_ref().map(|d| format!("https://doi.org/{}", d.trim())))
            .or_else(|| result.id.as_ref().map(|id| format!("https://doaj.org/article/{}", id)))?;

        let mut builder = ArticleBuilder::new(
            bibjson.title.clone().unwrap_or_default(),
            url,
            SourceType::Doaj,
        )
        .has_full_text(true)
        .is_preprint(false);

        if let Some(abstract_text) = &bibjson.r#abstract {
            builder = builder.snippet(abstract_text);
        }
        if let Some(year) = &bibjson.year {
            let date = match &bibjson.month {
                Some(month) if !month.trim().is_empty() => {
                    format!("{}-{:0>2}", year.trim(), month.trim())
                }
                _ => year.trim().to_string(),
            };
            builder = builder.publication_date(date);
        }

        // Journals list every language they publish in; only a single one is a usable signal
        let languages = bibjson
            .journal
            .as_ref()
            .map(|j| j.language.as_slice())
            .unwrap_or_default();
        if let [only] = languages {
            builder = builder.language(only.clone());
        }

        builder.build()
    }
}

#[derive(Debug, Deserialize)]
struct DoajResponse {
    total: Option<usize>,
    #[serde(default)]
    results: Vec<DoajArticle>,
}

#[derive(Debug, Deserialize)]
struct DoajArticle {
    id: Option<String>,
    bibjson: Option<BibJson>,
}

#[derive(Debug, Deserialize)]
struct BibJson {
    title: Option<String>,
    r#abstract: Option<String>,
    year: Option<String>,
    month: Option<String>,
    #[serde(default)]
    link: Vec<DoajLink>,
    #[serde(default)]
    identifier: Vec<DoajIdentifier>,
    journal: Option<DoajJournal>,
}

#[derive(Debug, Deserialize)]
struct DoajLink {
    #[serde(rename = "type")]
    link_type: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DoajIdentifier {
    #[serde(rename = "type", default)]
    id_type: String,
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DoajJournal {
    #[serde(default)]
    language: Vec<String>,
}

#[async_trait]
impl Source for DoajSource {
    fn id(&self) -> &str {
        "doaj"
    }

    fn name(&self) -> &str {
        "DOAJ"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH | SourceCapabilities::LANGUAGE | SourceCapabilities::FULL_TEXT
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SourceError> {
        let json = fetch_text(
            &self.client,
            "DOAJ",
            &self.build_search_url(query),
            &[("Accept", "application/json".to_string())],
        )
        .await?;

        let (articles, total) = Self::parse_search_response(&json)?;
        let response = SearchResponse::new(articles, "DOAJ", &query.query);
        Ok(match total {
            Some(total) => response.total_results(total),
            None => response,
        })
    }
}
