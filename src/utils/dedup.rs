//! URL-based deduplication of articles across sources.
//!
//! Two articles are the same work when their canonical URL keys match. The
//! key lowercases scheme and host, drops the fragment, a default port and any
//! trailing slash on the path. Path and query stay case-sensitive.

use std::collections::HashSet;

use crate::models::Article;

/// Canonical comparison key for a URL
pub fn url_key(url: &str) -> String {
    let trimmed = url.trim();
    match url::Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            let path = parsed.path().trim_end_matches('/').to_string();
            let mut key = format!(
                "{}://{}",
                parsed.scheme(),
                parsed.host_str().unwrap_or_default().to_lowercase()
            );
            if let Some(port) = parsed.port() {
                key.push_str(&format!(":{}", port));
            }
            key.push_str(&path);
            if let Some(query) = parsed.query() {
                key.push('?');
                key.push_str(query);
            }
            key
        }
        Err(_) => trimmed.trim_end_matches('/').to_string(),
    }
}

/// Keep the first-seen article for each URL, preserving order
pub fn deduplicate_articles(articles: Vec<Article>) -> Vec<Article> {
    let mut seen: HashSet<String> = HashSet::with_capacity(articles.len());
    let before = articles.len();

    let unique: Vec<Article> = articles
        .into_iter()
        .filter(|article| seen.insert(url_key(&article.url)))
        .collect();

    if unique.len() < before {
        tracing::debug!("Dropped {} duplicate articles", before - unique.len());
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleBuilder, SourceType};

    fn article(title: &str, url: &str, provider: SourceType) -> Article {
        ArticleBuilder::new(title, url, provider).build().unwrap()
    }

    #[test]
    fn test_url_key_normalization() {
        assert_eq!(
            url_key("HTTPS://PubMed.ncbi.nlm.nih.gov/123/"),
            url_key("https://pubmed.ncbi.nlm.nih.gov/123")
        );
        assert_eq!(url_key("https://doi.org/10.1/x#section"), url_key("https://doi.org/10.1/x"));
        assert_ne!(url_key("https://doi.org/10.1/ABC"), url_key("https://doi.org/10.1/abc"));
        assert_ne!(url_key("https://a.org/x?id=1"), url_key("https://a.org/x?id=2"));
    }

    #[test]
    fn test_first_seen_wins() {
        let articles = vec![
            article("From PubMed", "https://doi.org/10.1/x", SourceType::PubMed),
            article("From OpenAlex", "https://doi.org/10.1/x/", SourceType::OpenAlex),
            article("Other", "https://doi.org/10.1/y", SourceType::OpenAlex),
        ];

        let unique = deduplicate_articles(articles);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].title, "From PubMed");
        assert_eq!(unique[1].title, "Other");
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let articles = vec![
            article("A", "https://a.org/1", SourceType::Doaj),
            article("B", "https://a.org/1", SourceType::Base),
            article("C", "https://a.org/2", SourceType::Base),
            article("D", "https://a.org/2/", SourceType::Doaj),
            article("E", "https://a.org/3", SourceType::Doaj),
        ];

        let once = deduplicate_articles(articles);
        let twice = deduplicate_articles(once.clone());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 3);
    }
}
