//! BASE (Bielefeld Academic Search Engine) search.
//!
//! Uses the BASE HTTP search interface for resources from repositories worldwide.
//! API documentation: https://www.base-search.net/about/en/about_develop.php
//!
//! Dublin Core fields come back as either a string or a list of strings
//! depending on the record, so documents are read as loose JSON values.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::models::{Article, ArticleBuilder, SearchQuery, SearchResponse, SourceType};
use crate::sources::{fetch_text, Source, SourceCapabilities, SourceError};
use crate::utils::HttpClient;

const BASE_API_BASE: &str = "https://api.base-search.net/cgi-bin/BaseHttpSearchInterface.fcgi";

/// BASE source
#[derive(Debug, Clone)]
pub struct BaseSource {
    client: Arc<HttpClient>,
    base_url: String,
}

impl BaseSource {
    pub fn new() -> Result<Self, SourceError> {
        Ok(Self::with_client(Arc::new(HttpClient::new()?)))
    }

    pub fn with_client(client: Arc<HttpClient>) -> Self {
        Self {
            client,
            base_url: BASE_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_search_url(&self, query: &SearchQuery) -> String {
        let mut text = query.query.clone();
        let (from, to) = query.year_bounds();
        if from.is_some() || to.is_some() {
            let from = from.map(|y| y.to_string()).unwrap_or_else(|| "*".to_string());
            let to = to.map(|y| y.to_string()).unwrap_or_else(|| "*".to_string());
            text = format!("{} dcyear:[{} TO {}]", text, from, to);
        }

        format!(
            "{}?func=PerformSearch&query={}&format=json&hits={}",
            self.base_url,
            urlencoding::encode(&text),
            query.max_results.clamp(1, 120)
        )
    }

    fn parse_search_response(json: &str) -> Result<(Vec<Article>, Option<usize>), SourceError> {
        let data: BaseResponse = serde_json::from_str(json)
            .map_err(|e| SourceError::Parse(format!("Failed to parse BASE response: {}", e)))?;

        let articles = data.response.docs.iter().filter_map(Self::parse_doc).collect();
        Ok((articles, data.response.num_found))
    }

    fn parse_doc(doc: &Value) -> Option<Article> {
        let doi = first_text(doc.get("dcdoi"));
        let url = all_texts(doc.get("dclink"))
            .into_iter()
            .chain(all_texts(doc.get("dcidentifier")))
            .find(|u| u.starts_with("http"))
            .or_else(|| doi.map(|d| format!("https://doi.org/{}", d)))?;

        let mut builder = ArticleBuilder::new(
            first_text(doc.get("dctitle")).unwrap_or_default(),
            url,
            SourceType::Base,
        );

        if let Some(description) = first_text(doc.get("dcdescription")) {
            builder = builder.snippet(description);
        }
        if let Some(year) = first_text(doc.get("dcyear")) {
            builder = builder.publication_date(year);
        }
        if let Some(language) = first_text(doc.get("dclang")) {
            builder = builder.language(language);
        }
        // dcoa: 1 = open access, 2 = not, 0 = unknown
        match first_text(doc.get("dcoa")).as_deref() {
            Some("1") => builder = builder.has_full_text(true),
            Some("2") => builder = builder.has_full_text(false),
            _ => {}
        }

        let preprint = all_texts(doc.get("dctype"))
            .iter()
            .any(|t| t.to_lowercase().contains("preprint"));

        builder.is_preprint(preprint).build()
    }
}

/// Text values of a field that may be a string, number, or list of them
fn all_texts(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.trim().to_string()],
        Some(Value::Number(n)) => vec![n.to_string()],
        Some(Value::Array(items)) => items.iter().flat_map(|v| all_texts(Some(v))).collect(),
        _ => Vec::new(),
    }
    .into_iter()
    .filter(|s| !s.is_empty())
    .collect()
}

fn first_text(value: Option<&Value>) -> Option<String> {
    all_texts(value).into_iter().next()
}

/// BASE API response
#[derive(Debug, Deserialize)]
struct BaseResponse {
    response: BaseResult,
}

#[derive(Debug, Deserialize)]
struct BaseResult {
    #[serde(rename = "numFound")]
    num_found: Option<usize>,
    #[serde(default)]
    docs: Vec<Value>,
}

#[async_trait]
impl Source for BaseSource {
    fn id(&self) -> &str {
        "base"
    }

    fn name(&self) -> &str {
        "BASE"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
            | SourceCapabilities::YEAR_FILTER
            | SourceCapabilities::LANGUAGE
            | SourceCapabilities::FULL_TEXT
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SourceError> {
        let json = fetch_text(&self.client, "BASE", &self.build_search_url(query), &[]).await?;

        let (articles, total) = Self::parse_search_response(&json)?;
        let response = SearchResponse::new(articles, "BASE", &query.query);
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
      "response": {
        "numFound": 3,
        "start": 0,
        "docs": [
          {
            "dctitle": "Estratégias de conservação de sangue em cirurgia ortopédica",
            "dclink": "https://repositorio.ufmg.br/handle/1843/12345",
            "dcdescription": ["Resumo do estudo.", "Second description"],
            "dcyear": 2022,
            "dclang": ["por"],
            "dcoa": 1,
            "dctype": ["Article"]
          },
          {
            "dctitle": ["Iron supplementation before surgery: a preprint"],
            "dcidentifier": ["urn:nbn:x", "https://zenodo.org/records/999"],
            "dcdoi": ["10.5281/zenodo.999"],
            "dcyear": "2024",
            "dcoa": "2",
            "dctype": ["Preprint"]
          },
          { "dctitle": "No locator", "dcyear": "2021" }
        ]
      }
    }"#;

    #[test]
    fn test_build_search_url() {
        let source = BaseSource::new().unwrap();
        let url = source.build_search_url(&SearchQuery::new("bloodless").year("2020-"));
        assert!(url.starts_with(BASE_API_BASE));
        assert!(url.contains("func=PerformSearch"));
        assert!(url.contains("format=json"));
        assert!(url.contains(&*urlencoding::encode("bloodless dcyear:[2020 TO *]")));
    }

    #[test]
    fn test_parse_search_response() {
        let (articles, total) = BaseSource::parse_search_response(RESPONSE).unwrap();
        assert_eq!(total, Some(3));
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.source, "repositorio.ufmg.br");
        assert!(first.is_portuguese);
        assert_eq!(first.publication_date.as_deref(), Some("2022"));
        assert_eq!(first.snippet.as_deref(), Some("Resumo do estudo."));
        assert_eq!(first.has_full_text, Some(true));
        assert_eq!(first.is_preprint, Some(false));

        let second = &articles[1];
        assert_eq!(second.url, "https://zenodo.org/records/999");
        assert_eq!(second.has_full_text, Some(false));
        assert_eq!(second.is_preprint, Some(true));
    }

    #[tokio::test]
    async fn test_search_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex(r"func=PerformSearch".into()))
            .with_status(200)
            .with_body(RESPONSE)
            .create_async()
            .await;

        let source = BaseSource::new().unwrap().with_base_url(server.url());
        let response = source.search(&SearchQuery::new("pbm")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.articles.len(), 2);
        assert_eq!(response.total_results, Some(3));
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_parse_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let source = BaseSource::new().unwrap().with_base_url(server.url());
        let result = source.search(&SearchQuery::new("pbm")).await;
        assert!(matches!(result, Err(SourceError::Parse(_))));
    }
}
