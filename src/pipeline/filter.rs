//! Trust and relevance filtering.
//!
//! [`FilterPolicy`] decides whether a normalized article may enter the digest.
//! The domain check runs in one of two explicit modes: an allow-list of trusted
//! hosts, or a deny-list of known placeholder/fabricated hosts.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::Article;

/// How the domain check treats the article host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustMode {
    /// Host must match a trusted domain
    #[default]
    Allow,
    /// Host must not match a denied domain
    Deny,
}

impl std::fmt::Display for TrustMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrustMode::Allow => write!(f, "allow"),
            TrustMode::Deny => write!(f, "deny"),
        }
    }
}

/// Why an article was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// URL is not an absolute http(s) URL with a host
    InvalidUrl,
    /// Title is not longer than the minimum length
    ShortTitle,
    /// Host is not on the trusted list (allow mode)
    Untrusted(String),
    /// Host is on the denied list (deny mode)
    Denied(String),
    /// No relevance keyword in title or snippet
    NotRelevant,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::InvalidUrl => write!(f, "invalid url"),
            Rejection::ShortTitle => write!(f, "title too short"),
            Rejection::Untrusted(host) => write!(f, "untrusted host {}", host),
            Rejection::Denied(host) => write!(f, "denied host {}", host),
            Rejection::NotRelevant => write!(f, "no relevance keyword"),
        }
    }
}

/// Filter and scoring policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterPolicy {
    /// Which domain list is authoritative
    #[serde(default)]
    pub trust_mode: TrustMode,

    /// Hosts accepted in allow mode (subdomains included)
    #[serde(default = "default_trusted_domains")]
    pub trusted_domains: Vec<String>,

    /// Hosts rejected in deny mode (subdomains included)
    #[serde(default = "default_denied_domains")]
    pub denied_domains: Vec<String>,

    /// Bilingual relevance keywords, matched case-insensitively
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    /// Reject articles that match no keyword
    #[serde(default = "default_true")]
    pub require_keyword: bool,

    /// Order by relevance score before the other ranking tiers
    #[serde(default = "default_true")]
    pub scoring: bool,

    /// Titles must be strictly longer than this many characters
    #[serde(default = "default_min_title_length")]
    pub min_title_length: usize,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            trust_mode: TrustMode::default(),
            trusted_domains: default_trusted_domains(),
            denied_domains: default_denied_domains(),
            keywords: default_keywords(),
            require_keyword: true,
            scoring: true,
            min_title_length: default_min_title_length(),
        }
    }
}

impl FilterPolicy {
    /// Whether the article passes every check
    pub fn accept(&self, article: &Article) -> bool {
        self.check(article).is_ok()
    }

    /// Run all checks, returning the first failure
    pub fn check(&self, article: &Article) -> Result<(), Rejection> {
        let host = valid_host(&article.url).ok_or(Rejection::InvalidUrl)?;

        if article.title.trim().chars().count() <= self.min_title_length {
            return Err(Rejection::ShortTitle);
        }

        match self.trust_mode {
            TrustMode::Allow => {
                if !matches_any(&host, &self.trusted_domains) {
                    return Err(Rejection::Untrusted(host));
                }
            }
            TrustMode::Deny => {
                if matches_any(&host, &self.denied_domains) {
                    return Err(Rejection::Denied(host));
                }
            }
        }

        if self.require_keyword && self.matched_keywords(article) == 0 {
            return Err(Rejection::NotRelevant);
        }

        Ok(())
    }

    /// Number of distinct keywords found in title + snippet
    pub fn matched_keywords(&self, article: &Article) -> u32 {
        let text = article.searchable_text();
        self.keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect::<BTreeSet<_>>()
            .iter()
            .filter(|k| text.contains(k.as_str()))
            .count() as u32
    }
}

/// Lowercased host of an absolute http(s) URL
fn valid_host(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.to_lowercase())
}

/// Exact or subdomain match against a domain list
fn matches_any(host: &str, domains: &[String]) -> bool {
    let host = host.trim_start_matches("www.");
    domains.iter().any(|domain| {
        let domain = domain.trim().trim_start_matches("www.").to_lowercase();
        !domain.is_empty()
            && (host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.')))
    })
}

fn default_true() -> bool {
    true
}

fn default_min_title_length() -> usize {
    10
}

fn default_trusted_domains() -> Vec<String> {
    [
        "pubmed.ncbi.nlm.nih.gov",
        "ncbi.nlm.nih.gov",
        "nih.gov",
        "europepmc.org",
        "semanticscholar.org",
        "doaj.org",
        "medrxiv.org",
        "biorxiv.org",
        "scielo.org",
        "scielo.br",
        "scielo.pt",
        "base-search.net",
        "openalex.org",
        "doi.org",
        "who.int",
        "cochranelibrary.com",
        "nejm.org",
        "thelancet.com",
        "bmj.com",
        "jamanetwork.com",
        "nature.com",
        "springer.com",
        "biomedcentral.com",
        "sciencedirect.com",
        "wiley.com",
        "frontiersin.org",
        "plos.org",
        "mdpi.com",
        "karger.com",
        "ahajournals.org",
        "lww.com",
        "tandfonline.com",
        "sagepub.com",
        "oup.com",
        "cureus.com",
        "rbhh.org",
        "bjan-sba.org",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_denied_domains() -> Vec<String> {
    [
        "example.com",
        "example.org",
        "example.net",
        "localhost",
        "test.com",
        "placeholder.com",
        "fake-journal.com",
        "lorem-ipsum.org",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_keywords() -> Vec<String> {
    [
        // English
        "bloodless",
        "patient blood management",
        "blood management",
        "transfusion-free",
        "transfusion free",
        "without transfusion",
        "transfusion alternative",
        "alternatives to transfusion",
        "blood conservation",
        "restrictive transfusion",
        "cell salvage",
        "tranexamic acid",
        "erythropoietin",
        "jehovah's witness",
        // Portuguese
        "sem sangue",
        "gestão do sangue",
        "gerenciamento de sangue",
        "sem transfusão",
        "alternativas à transfusão",
        "conservação de sangue",
        "recuperação intraoperatória",
        "ácido tranexâmico",
        "eritropoietina",
        "testemunhas de jeová",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
