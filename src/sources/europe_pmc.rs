//! Europe PMC source implementation using their REST API.
//!
//! Europe PMC indexes PubMed, PMC, Agricola and preprints (source `PPR`).

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::models::{Article, ArticleBuilder, SearchQuery, SearchResponse, SourceType};
use crate::sources::{fetch_text, Source, SourceCapabilities, SourceError};
use crate::utils::HttpClient;

/// Europe PMC REST API base URL
const EUROPE_PMC_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest";

/// Europe PMC source
#[derive(Debug, Clone)]
pub struct EuropePmcSource {
    client: Arc<HttpClient>,
    base_url: String,
}

impl EuropePmcSource {
    /// Create a new Europe PMC source
    pub fn new() -> Result<Self, SourceError> {
        Ok(Self::with_client(Arc::new(HttpClient::new()?)))
    }

    /// Create with a custom HTTP client
    pub fn with_client(client: Arc<HttpClient>) -> Self {
        Self {
            client,
            base_url: EUROPE_PMC_URL.to_string(),
        }
    }

    /// Override the REST base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build search URL; the year filter goes into the query syntax
    fn build_search_url(&self, query: &SearchQuery) -> String {
        let mut text = query.query.clone();
        let (from, to) = query.year_bounds();
        if from.is_some() || to.is_some() {
            text = format!(
                "({}) AND PUB_YEAR:[{} TO {}]",
                text,
                from.unwrap_or(1800),
                to.unwrap_or(3000)
            );
        }

        format!(
            "{}/search?query={}&resultType=core&format=json&pageSize={}",
            self.base_url,
            urlencoding::encode(&text),
            query.max_results.clamp(1, 1000)
        )
    }

    /// Parse search response JSON
    fn parse_search_response(json: &str) -> Result<(Vec<Article>, Option<usize>), SourceError> {
        let result: SearchResult = serde_json::from_str(json)
            .map_err(|e| SourceError::Parse(format!("Failed to parse Europe PMC JSON: {}", e)))?;

        let articles = result
            .result_list
            .map(|list| list.result)
            .unwrap_or_default()
            .iter()
            .filter_map(Self::parse_result)
            .collect();
        Ok((articles, result.hit_count))
    }

    /// Parse a single result into an Article
    fn parse_result(result: &ResultItem) -> Option<Article> {
        let title = result.title.clone()?;
        let url = if let Some(pmid) = non_empty(&result.pmid) {
            format!("https://europepmc.org/article/MED/{}", pmid)
        } else if let (Some(source), Some(id)) = (non_empty(&result.source), non_empty(&result.id)) {
            format!("https://europepmc.org/article/{}/{}", source, id)
        } else if let Some(doi) = non_empty(&result.doi) {
            format!("https://doi.org/{}", doi)
        } else {
            return None;
        };

        let mut builder = ArticleBuilder::new(title, url, SourceType::EuropePmc);

        if let Some(abstract_text) = &result.abstract_text {
            builder = builder.snippet(abstract_text);
        }
        if let Some(date) = result
            .first_publication_date
            .clone()
            .or_else(|| result.pub_year.clone())
        {
            builder = builder.publication_date(date);
        }
        if let Some(language) = &result.language {
            builder = builder.language(language.clone());
        }
        if let Some(count) = result.cited_by_count {
            builder = builder.citation_count(count);
        }

        let open = yes(&result.is_open_access) || yes(&result.in_epmc);
        let preprint = result.source.as_deref() == Some("PPR");

        builder.has_full_text(open).is_preprint(preprint).build()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn yes(flag: &Option<String>) -> bool {
    flag.as_deref().is_some_and(|f| f.eq_ignore_ascii_case("y"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    hit_count: Option<usize>,
    result_list: Option<ResultList>,
}

#[derive(Debug, Deserialize)]
struct ResultList {
    #[serde(default)]
    result: Vec<ResultItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultItem {
    id: Option<String>,
    source: Option<String>,
    pmid: Option<String>,
    doi: Option<String>,
    title: Option<String>,
    abstract_text: Option<String>,
    pub_year: Option<String>,
    first_publication_date: Option<String>,
    language: Option<String>,
    cited_by_count: Option<u32>,
    is_open_access: Option<String>,
    #[serde(rename = "inEPMC")]
    in_epmc: Option<String>,
}

#[async_trait]
impl Source for EuropePmcSource {
    fn id(&self) -> &str {
        "europe_pmc"
    }

    fn name(&self) -> &str {
        "Europe PMC"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
            | SourceCapabilities::YEAR_FILTER
            | SourceCapabilities::CITATION_COUNTS
            | SourceCapabilities::LANGUAGE
            | SourceCapabilities::FULL_TEXT
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SourceError> {
        let json = fetch_text(
            &self.client,
            "Europe PMC",
            &self.build_search_url(query),
            &[("Accept", "application/json".to_string())],
        )
        .await?;

        let (articles, total) = Self::parse_search_response(&json)?;
        let response = SearchResponse::new(articles, "Europe PMC", &query.query);
        Ok(match total {
            Some(total) => response.total_results(total),
            None => response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const RESPONSE: &str = r#"{
      "version": "6.9",
      "hitCount": 3,
      "resultList": {
        "result": [
          {
            "id": "37000001", "source": "MED", "pmid": "37000001", "pmcid": "PMC9000001",
            "doi": "10.1016/j.bja.2023.01.001",
            "title": "Patient blood management programmes: a systematic review.",
            "authorString": "Silva A, Souza B.",
            "pubYear": "2023",
            "abstractText": "<h4>Background</h4>Patient blood management (PBM) <i>reduces</i> transfusion.",
            "language": "eng",
            "isOpenAccess": "Y", "inEPMC": "Y",
            "citedByCount": 42,
            "firstPublicationDate": "2023-02-14"
          },
          {
            "id": "PPR600001", "source": "PPR",
            "title": "Bloodless surgery outcomes: a preprint",
            "pubYear": "2024",
            "isOpenAccess": "N",
            "citedByCount": 0
          },
          { "id": "X1", "source": "MED", "pmid": "1" }
        ]
      }
    }"#;

    #[test]
    fn test_build_search_url_with_year() {
        let source = EuropePmcSource::new().unwrap();
        let url = source.build_search_url(&SearchQuery::new("bloodless").year("2020-"));
        assert!(url.contains("resultType=core"));
        assert!(url.contains(&*urlencoding::encode("(bloodless) AND PUB_YEAR:[2020 TO 3000]")));
    }

    #[test]
    fn test_parse_search_response() {
        let (articles, total) = EuropePmcSource::parse_search_response(RESPONSE).unwrap();
        assert_eq!(total, Some(3));
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.url, "https://europepmc.org/article/MED/37000001");
        assert_eq!(first.source, "europepmc.org");
        assert_eq!(first.citation_count, Some(42));
        assert_eq!(first.has_full_text, Some(true));
        assert_eq!(first.is_preprint, Some(false));
        assert_eq!(first.publication_date.as_deref(), Some("2023-02-14"));
        assert_eq!(
            first.snippet.as_deref(),
            Some("Background Patient blood management (PBM) reduces transfusion.")
        );

        let preprint = &articles[1];
        assert_eq!(preprint.url, "https://europepmc.org/article/PPR/PPR600001");
        assert_eq!(preprint.is_preprint, Some(true));
        assert_eq!(preprint.has_full_text, Some(false));
        assert_eq!(preprint.publication_date.as_deref(), Some("2024"));
    }

    #[test]
    fn test_parse_empty_response() {
        let (articles, total) =
            EuropePmcSource::parse_search_response(r#"{"hitCount":0,"resultList":{"result":[]}}"#)
                .unwrap();
        assert!(articles.is_empty());
        assert_eq!(total, Some(0));

        assert!(EuropePmcSource::parse_search_response("not json").is_err());
    }

    #[tokio::test]
    async fn test_search_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex(r"^/search\?query=".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(RESPONSE)
            .create_async()
            .await;

        let source = EuropePmcSource::new().unwrap().with_base_url(server.url());
        let response = source.search(&SearchQuery::new("pbm")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.articles.len(), 2);
        assert_eq!(response.total_results, Some(3));
    }
}
