//! Article model representing one piece of literature from any source.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::text::{clean_snippet, host_label, is_portuguese_code, looks_portuguese};

/// Default number of days an article stays in the digest
pub const RETENTION_DAYS: i64 = 30;

/// The adapter that produced an article
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    #[serde(rename = "pubmed")]
    PubMed,
    #[serde(rename = "europe_pmc")]
    EuropePmc,
    #[serde(rename = "semantic")]
    SemanticScholar,
    #[serde(rename = "doaj")]
    Doaj,
    #[serde(rename = "medrxiv")]
    MedRxiv,
    #[serde(rename = "scielo")]
    Scielo,
    #[serde(rename = "base")]
    Base,
    #[serde(rename = "openalex")]
    OpenAlex,
    #[serde(untagged)]
    Other(String),
}

impl SourceType {
    /// Returns the display name of the source
    pub fn name(&self) -> &str {
        match self {
            SourceType::PubMed => "PubMed",
            SourceType::EuropePmc => "Europe PMC",
            SourceType::SemanticScholar => "Semantic Scholar",
            SourceType::Doaj => "DOAJ",
            SourceType::MedRxiv => "medRxiv",
            SourceType::Scielo => "SciELO",
            SourceType::Base => "BASE",
            SourceType::OpenAlex => "OpenAlex",
            SourceType::Other(s) => s,
        }
    }

    /// Returns the source identifier (matches `Source::id`)
    pub fn id(&self) -> &str {
        match self {
            SourceType::PubMed => "pubmed",
            SourceType::EuropePmc => "europe_pmc",
            SourceType::SemanticScholar => "semantic",
            SourceType::Doaj => "doaj",
            SourceType::MedRxiv => "medrxiv",
            SourceType::Scielo => "scielo",
            SourceType::Base => "base",
            SourceType::OpenAlex => "openalex",
            SourceType::Other(s) => s,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single article in the digest
///
/// Articles are immutable once built. The store re-stamps `date_found` and
/// `expires_at` when an article is first persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// Opaque identifier generated at ingestion
    pub id: String,

    /// Display title
    pub title: String,

    /// Canonical HTTP(S) locator, used as the dedup key
    pub url: String,

    /// Short host/provider label
    pub source: String,

    /// Adapter that produced the article
    pub provider: SourceType,

    /// Abstract or summary, truncated for display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,

    /// Loosely structured publication date (year, or year-month-day)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<String>,

    /// Language code as reported by the source (or "pt" when detected)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Portuguese-language flag used for ordering
    #[serde(default)]
    pub is_portuguese: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_full_text: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_preprint: Option<bool>,

    /// Number of distinct relevance keywords matched
    #[serde(default)]
    pub relevance_score: u32,

    /// When the article entered the store
    pub date_found: DateTime<Utc>,

    /// When the article leaves the store
    pub expires_at: DateTime<Utc>,
}

impl Article {
    /// Title and snippet joined, lowercased, for keyword matching
    pub fn searchable_text(&self) -> String {
        let mut text = self.title.to_lowercase();
        if let Some(snippet) = &self.snippet {
            text.push(' ');
            text.push_str(&snippet.to_lowercase());
        }
        text
    }

    /// Whether the article has expired at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Returns a copy stamped as found at `now` with the given retention
    pub fn stamped(mut self, now: DateTime<Utc>, retention: Duration) -> Self {
        self.date_found = now;
        self.expires_at = now + retention;
        self
    }
}

/// Builder used by adapters to normalize provider records
#[derive(Debug, Clone)]
pub struct ArticleBuilder {
    title: String,
    url: String,
    provider: SourceType,
    source: Option<String>,
    snippet: Option<String>,
    publication_date: Option<String>,
    language: Option<String>,
    citation_count: Option<u32>,
    has_full_text: Option<bool>,
    is_preprint: Option<bool>,
}

impl ArticleBuilder {
    /// Create a new builder with required fields
    pub fn new(title: impl Into<String>, url: impl Into<String>, provider: SourceType) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            provider,
            source: None,
            snippet: None,
            publication_date: None,
            language: None,
            citation_count: None,
            has_full_text: None,
            is_preprint: None,
        }
    }

    /// Override the host-derived source label
    pub fn source(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        if !label.trim().is_empty() {
            self.source = Some(label.trim().to_string());
        }
        self
    }

    /// Set the abstract/summary; markup is stripped and the text truncated
    pub fn snippet(mut self, text: impl AsRef<str>) -> Self {
        self.snippet = clean_snippet(text.as_ref());
        self
    }

    /// Set publication date, ignoring blank values
    pub fn publication_date(mut self, date: impl Into<String>) -> Self {
        let date = date.into();
        if !date.trim().is_empty() {
            self.publication_date = Some(date.trim().to_string());
        }
        self
    }

    /// Set the language code reported by the source
    pub fn language(mut self, code: impl Into<String>) -> Self {
        let code = code.into();
        if !code.trim().is_empty() {
            self.language = Some(code.trim().to_lowercase());
        }
        self
    }

    pub fn citation_count(mut self, count: u32) -> Self {
        self.citation_count = Some(count);
        self
    }

    pub fn has_full_text(mut self, value: bool) -> Self {
        self.has_full_text = Some(value);
        self
    }

    pub fn is_preprint(mut self, value: bool) -> Self {
        self.is_preprint = Some(value);
        self
    }

    /// Build the article, or `None` when title or URL is missing
    pub fn build(self) -> Option<Article> {
        let title = collapse_whitespace(&self.title);
        let url = self.url.trim().to_string();
        if title.is_empty() || url.is_empty() {
            return None;
        }

        let source = self
            .source
            .or_else(|| host_label(&url))
            .unwrap_or_else(|| self.provider.name().to_string());

        let is_portuguese = match &self.language {
            Some(code) => is_portuguese_code(code),
            None => looks_portuguese(&title, self.snippet.as_deref()),
        };
        let language = self
            .language
            .or_else(|| is_portuguese.then(|| "pt".to_string()));

        let now = Utc::now();
        Some(Article {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            url,
            source,
            provider: self.provider,
            snippet: self.snippet,
            publication_date: self.publication_date,
            language,
            is_portuguese,
            citation_count: self.citation_count,
            has_full_text: self.has_full_text,
            is_preprint: self.is_preprint,
            relevance_score: 0,
            date_found: now,
            expires_at: now + Duration::days(RETENTION_DAYS),
        })
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
