//! PubMed source implementation using the E-utilities API.
//!
//! Two-step: `esearch` returns matching PMIDs, `efetch` returns the records.

use async_trait::async_trait;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};

use crate::models::{Article, ArticleBuilder, SearchQuery, SearchResponse, SourceType};
use crate::sources::{fetch_text, Source, SourceCapabilities, SourceError};
use crate::utils::HttpClient;

/// PubMed E-utilities API base URL
const PUBMED_EUTILS_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// PubMed source
#[derive(Debug, Clone)]
pub struct PubMedSource {
    client: Arc<HttpClient>,
    base_url: String,
    api_key: Option<String>,
}

impl PubMedSource {
    /// Create a new PubMed source
    pub fn new() -> Result<Self, SourceError> {
        Ok(Self::with_client(Arc::new(HttpClient::new()?)))
    }

    /// Create with a custom HTTP client
    pub fn with_client(client: Arc<HttpClient>) -> Self {
        Self {
            client,
            base_url: PUBMED_EUTILS_URL.to_string(),
            api_key: None,
        }
    }

    /// Override the E-utilities base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// NCBI API key (raises the rate limit from 3 to 10 requests/second)
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Build esearch URL
    fn build_search_url(&self, query: &SearchQuery) -> String {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("term", query.query.clone()),
            ("retmax", query.max_results.to_string()),
            ("retmode", "xml".to_string()),
            ("sort", "relevance".to_string()),
        ];

        // E-utilities needs both bounds when filtering by date
        let (from, to) = query.year_bounds();
        if from.is_some() || to.is_some() {
            params.push(("datetype", "pdat".to_string()));
            params.push(("mindate", from.unwrap_or(1800).to_string()));
            params.push(("maxdate", to.unwrap_or(3000).to_string()));
        }

        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }

        format!("{}/esearch.fcgi?{}", self.base_url, encode_params(&params))
    }

    /// Build efetch URL for specific PubMed IDs
    fn build_fetch_url(&self, ids: &[String]) -> String {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("id", ids.join(",")),
            ("retmode", "xml".to_string()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        format!("{}/efetch.fcgi?{}", self.base_url, encode_params(&params))
    }

    /// Parse esearch response XML into PMIDs
    fn parse_search_response(xml: &str) -> Result<Vec<String>, SourceError> {
        #[derive(Debug, Deserialize)]
        #[allow(non_snake_case)]
        struct ESearchResult {
            #[serde(default)]
            IdList: Option<IdList>,
        }

        #[derive(Debug, Deserialize)]
        struct IdList {
            #[serde(rename = "Id", default)]
            ids: Vec<String>,
        }

        let result: ESearchResult = from_str(xml)
            .map_err(|e| SourceError::Parse(format!("Failed to parse PubMed search XML: {}", e)))?;

        Ok(result
            .IdList
            .map(|list| list.ids)
            .unwrap_or_default()
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect())
    }

    /// Parse efetch response XML into articles
    fn parse_fetch_response(xml: &str) -> Result<Vec<Article>, SourceError> {
        let flattened = flatten_inline_markup(xml);
        let result: PubmedArticleSet = from_str(&flattened)
            .map_err(|e| SourceError::Parse(format!("Failed to parse PubMed fetch XML: {}", e)))?;

        Ok(result
            .articles
            .into_iter()
            .filter_map(Self::parse_article)
            .collect())
    }

    fn parse_article(record: PubmedArticle) -> Option<Article> {
        let citation = record.MedlineCitation?;
        let pmid = citation.PMID?.text.trim().to_string();
        let article = citation.Article?;
        if pmid.is_empty() {
            return None;
        }

        let title = article
            .ArticleTitle
            .map(|t| t.text)
            .filter(|t| !t.trim().is_empty())
            .or_else(|| article.VernacularTitle.map(|t| t.text))
            .unwrap_or_default();

        let mut builder = ArticleBuilder::new(
            title,
            format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid),
            SourceType::PubMed,
        );

        if let Some(abstract_) = article.Abstract {
            let text = abstract_
                .texts
                .iter()
                .map(|t| t.text.trim())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            builder = builder.snippet(text);
        }

        if let Some(date) = article
            .ArticleDate
            .as_ref()
            .and_then(ArticleDate::iso)
            .or_else(|| {
                article
                    .Journal
                    .and_then(|j| j.JournalIssue)
                    .and_then(|ji| ji.PubDate)
                    .and_then(|pd| pd.Year.or(pd.MedlineDate))
            })
        {
            builder = builder.publication_date(date);
        }

        if let Some(language) = article.languages.first() {
            builder = builder.language(language.clone());
        }

        let is_preprint = article
            .PublicationTypeList
            .map(|list| {
                list.types
                    .iter()
                    .any(|t| t.text.trim().eq_ignore_ascii_case("preprint"))
            })
            .unwrap_or(false);
        builder = builder.is_preprint(is_preprint);

        let has_pmc = record
            .PubmedData
            .and_then(|pd| pd.ArticleIdList)
            .map(|list| {
                list.ids
                    .iter()
                    .any(|id| id.id_type == "pmc" && !id.value.trim().is_empty())
            })
            .unwrap_or(false);
        builder = builder.has_full_text(has_pmc);

        builder.build()
    }
}

fn encode_params(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Drop inline formatting tags (`<i>`, `<sup>`, MathML, ...) so mixed-content
/// titles and abstracts deserialize as plain text.
fn flatten_inline_markup(xml: &str) -> std::borrow::Cow<'_, str> {
    static INLINE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = INLINE.get_or_init(|| {
        Regex::new(r"</?(?:i|b|u|sup|sub|em|strong|mml:[A-Za-z]+)(?:\s[^>]*)?/?>").ok()
    });
    match re {
        Some(re) => re.replace_all(xml, ""),
        None => std::borrow::Cow::Borrowed(xml),
    }
}

#[derive(Debug, Deserialize)]
struct PubmedArticleSet {
    #[serde(rename = "PubmedArticle", default)]
    articles: Vec<PubmedArticle>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubmedArticle {
    MedlineCitation: Option<MedlineCitation>,
    PubmedData: Option<PubmedData>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct MedlineCitation {
    PMID: Option<Text>,
    Article: Option<MedlineArticle>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct MedlineArticle {
    Journal: Option<Journal>,
    ArticleTitle: Option<Text>,
    VernacularTitle: Option<Text>,
    Abstract: Option<Abstract>,
    #[serde(rename = "Language", default)]
    languages: Vec<String>,
    PublicationTypeList: Option<PublicationTypeList>,
    ArticleDate: Option<ArticleDate>,
}

#[derive(Debug, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Journal {
    JournalIssue: Option<JournalIssue>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct JournalIssue {
    PubDate: Option<PubDate>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubDate {
    Year: Option<String>,
    MedlineDate: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct ArticleDate {
    Year: Option<String>,
    Month: Option<String>,
    Day: Option<String>,
}

impl ArticleDate {
    fn iso(&self) -> Option<String> {
        let year = self.Year.as_deref()?.trim();
        match (self.Month.as_deref(), self.Day.as_deref()) {
            (Some(m), Some(d)) => Some(format!("{}-{:0>2}-{:0>2}", year, m.trim(), d.trim())),
            (Some(m), None) => Some(format!("{}-{:0>2}", year, m.trim())),
            _ => Some(year.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Abstract {
    #[serde(rename = "AbstractText", default)]
    texts: Vec<Text>,
}

#[derive(Debug, Deserialize)]
struct PublicationTypeList {
    #[serde(rename = "PublicationType", default)]
    types: Vec<Text>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubmedData {
    ArticleIdList: Option<ArticleIdList>,
}

#[derive(Debug, Deserialize)]
struct ArticleIdList {
    #[serde(rename = "ArticleId", default)]
    ids: Vec<ArticleId>,
}

#[derive(Debug, Deserialize)]
struct ArticleId {
    #[serde(rename = "@IdType", default)]
    id_type: String,
    #[serde(rename = "$text", default)]
    value: String,
}

#[async_trait]
impl Source for PubMedSource {
    fn id(&self) -> &str {
        "pubmed"
    }

    fn name(&self) -> &str {
        "PubMed"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
            | SourceCapabilities::YEAR_FILTER
            | SourceCapabilities::LANGUAGE
            | SourceCapabilities::FULL_TEXT
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SourceError> {
        let xml = fetch_text(&self.client, "PubMed", &self.build_search_url(query), &[]).await?;
        let ids = Self::parse_search_response(&xml)?;

        if ids.is_empty() {
            return Ok(SearchResponse::empty("PubMed", &query.query));
        }

        let fetch_xml =
            fetch_text(&self.client, "PubMed", &self.build_fetch_url(&ids), &[]).await?;
        let articles = Self::parse_fetch_response(&fetch_xml)?;

        Ok(SearchResponse::new(articles, "PubMed", &query.query).total_results(ids.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const ESEARCH_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<!DOCTYPE eSearchResult PUBLIC "-//NLM//DTD esearch 20060628//EN" "https://eutils.ncbi.nlm.nih.gov/eutils/dtd/20060628/esearch.dtd">
<eSearchResult><Count>2</Count><RetMax>2</RetMax><RetStart>0</RetStart>
<IdList><Id>38000001</Id><Id>38000002</Id></IdList>
<TranslationSet/><QueryTranslation>bloodless</QueryTranslation></eSearchResult>"#;

    const EFETCH_XML: &str = r#"<?xml version="1.0" ?>
<PubmedArticleSet>
<PubmedArticle>
  <MedlineCitation Status="MEDLINE" Owner="NLM">
    <PMID Version="1">38000001</PMID>
    <Article PubModel="Print">
      <Journal>
        <JournalIssue CitedMedium="Internet"><PubDate><Year>2023</Year><Month>Nov</Month></PubDate></JournalIssue>
        <Title>Transfusion</Title>
      </Journal>
      <ArticleTitle>Outcomes of <i>bloodless</i> cardiac surgery in Jehovah's Witness patients.</ArticleTitle>
      <Abstract>
        <AbstractText Label="BACKGROUND">Patient blood management reduces transfusion.</AbstractText>
        <AbstractText Label="RESULTS">Mortality was 2.1%.</AbstractText>
      </Abstract>
      <Language>eng</Language>
      <PublicationTypeList><PublicationType UI="D016428">Journal Article</PublicationType></PublicationTypeList>
      <ArticleDate DateType="Electronic"><Year>2023</Year><Month>10</Month><Day>4</Day></ArticleDate>
    </Article>
  </MedlineCitation>
  <PubmedData>
    <ArticleIdList>
      <ArticleId IdType="pubmed">38000001</ArticleId>
      <ArticleId IdType="pmc">PMC1234567</ArticleId>
      <ArticleId IdType="doi">10.1111/trf.1</ArticleId>
    </ArticleIdList>
  </PubmedData>
</PubmedArticle>
<PubmedArticle>
  <MedlineCitation Status="MEDLINE" Owner="NLM">
    <PMID Version="1">38000002</PMID>
    <Article PubModel="Print">
      <Journal>
        <JournalIssue><PubDate><MedlineDate>2022 Jan-Feb</MedlineDate></PubDate></JournalIssue>
      </Journal>
      <ArticleTitle>Gestão do sangue do paciente em cirurgia ortopédica.</ArticleTitle>
      <Language>por</Language>
    </Article>
  </MedlineCitation>
</PubmedArticle>
<PubmedArticle>
  <MedlineCitation Status="MEDLINE" Owner="NLM">
    <PMID Version="1">38000003</PMID>
    <Article PubModel="Print"><ArticleTitle></ArticleTitle></Article>
  </MedlineCitation>
</PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_build_search_url() {
        let source = PubMedSource::new().unwrap();
        let url = source.build_search_url(&SearchQuery::new("bloodless surgery").max_results(5));
        assert!(url.starts_with("https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi?"));
        assert!(url.contains("term=bloodless%20surgery"));
        assert!(url.contains("retmax=5"));
        assert!(!url.contains("mindate"));
        assert!(!url.contains("api_key"));
    }

    #[test]
    fn test_build_search_url_with_year_from() {
        let source = PubMedSource::new()
            .unwrap()
            .with_api_key(Some("k".to_string()));
        let url = source.build_search_url(&SearchQuery::new("pbm").year("2020-"));
        assert!(url.contains("datetype=pdat"));
        assert!(url.contains("mindate=2020"));
        assert!(url.contains("maxdate=3000"));
        assert!(url.contains("api_key=k"));
    }

    #[test]
    fn test_parse_search_response() {
        let ids = PubMedSource::parse_search_response(ESEARCH_XML).unwrap();
        assert_eq!(ids, vec!["38000001", "38000002"]);

        let empty = PubMedSource::parse_search_response(
            "<eSearchResult><Count>0</Count><IdList/></eSearchResult>",
        )
        .unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_parse_fetch_response() {
        let articles = PubMedSource::parse_fetch_response(EFETCH_XML).unwrap();
        // Third record has no title and is skipped
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(
            first.title,
            "Outcomes of bloodless cardiac surgery in Jehovah's Witness patients."
        );
        assert_eq!(first.url, "https://pubmed.ncbi.nlm.nih.gov/38000001/");
        assert_eq!(first.source, "pubmed.ncbi.nlm.nih.gov");
        assert_eq!(first.publication_date.as_deref(), Some("2023-10-04"));
        assert_eq!(first.has_full_text, Some(true));
        assert_eq!(first.is_preprint, Some(false));
        assert!(!first.is_portuguese);
        assert!(first
            .snippet
            .as_deref()
            .unwrap()
            .starts_with("Patient blood management reduces transfusion. Mortality"));

        let second = &articles[1];
        assert!(second.is_portuguese);
        assert_eq!(second.publication_date.as_deref(), Some("2022 Jan-Feb"));
        assert_eq!(second.has_full_text, Some(false));
    }

    #[tokio::test]
    async fn test_search_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let esearch = server
            .mock("GET", Matcher::Regex(r"^/esearch\.fcgi\?".into()))
            .with_status(200)
            .with_body(ESEARCH_XML)
            .create_async()
            .await;
        let efetch = server
            .mock("GET", Matcher::Regex(r"^/efetch\.fcgi\?.*id=38000001%2C38000002".into()))
            .with_status(200)
            .with_body(EFETCH_XML)
            .create_async()
            .await;

        let source = PubMedSource::new().unwrap().with_base_url(server.url());
        let response = source.search(&SearchQuery::new("bloodless")).await.unwrap();

        esearch.assert_async().await;
        efetch.assert_async().await;
        assert_eq!(response.articles.len(), 2);
        assert_eq!(response.total_results, Some(2));
    }

    #[tokio::test]
    async fn test_search_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", Matcher::Regex(r"^/esearch\.fcgi".into()))
            .with_status(400)
            .create_async()
            .await;

        let source = PubMedSource::new().unwrap().with_base_url(server.url());
        let result = source.search(&SearchQuery::new("bloodless")).await;
        assert!(matches!(result, Err(SourceError::Api(_))));
    }
}
