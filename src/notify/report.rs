//! Plain-text digest rendering and the compose-link fallback.

use crate::models::Article;
use crate::utils::text::{extract_year, truncate_chars};

/// Longest snippet excerpt included per article
const EXCERPT_CHARS: usize = 240;

/// Longest body placed in a `mailto:` link; mail clients truncate beyond this
const COMPOSE_BODY_CHARS: usize = 1800;

/// Render the digest body as plain text
pub fn render_text(articles: &[Article]) -> String {
    let mut body = format!(
        "Bloodless medicine and patient blood management: {} article{}\n\n",
        articles.len(),
        if articles.len() == 1 { "" } else { "s" }
    );

    for (i, article) in articles.iter().enumerate() {
        body.push_str(&format!("{}. {}\n", i + 1, article.title));

        let mut meta = vec![article.source.clone()];
        if let Some(year) = extract_year(article.publication_date.as_deref()) {
            meta.push(year.to_string());
        }
        if article.is_portuguese {
            meta.push("PT".to_string());
        }
        if let Some(count) = article.citation_count {
            meta.push(format!("{} citations", count));
        }
        if article.is_preprint == Some(true) {
            meta.push("preprint".to_string());
        }
        body.push_str(&format!("   {}\n", meta.join(" | ")));

        if let Some(snippet) = &article.snippet {
            body.push_str(&format!("   {}\n", truncate_chars(snippet, EXCERPT_CHARS)));
        }
        body.push_str(&format!("   {}\n\n", article.url));
    }
    body
}

/// `mailto:` link that opens a pre-filled message in the user's mail client
pub fn compose_link(recipients: &[String], subject: &str, body: &str) -> String {
    let to = recipients
        .iter()
        .map(|r| urlencoding::encode(r.trim()).into_owned())
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "mailto:{}?subject={}&body={}",
        to,
        urlencoding::encode(subject),
        urlencoding::encode(&truncate_chars(body, COMPOSE_BODY_CHARS))
    )
}

/// Loose address check: something@domain.tld without whitespace
pub fn is_valid_address(address: &str) -> bool {
    let address = address.trim();
    if address.chars().any(char::is_whitespace) {
        return false;
    }
    match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleBuilder, SourceType};

    fn article() -> Article {
        ArticleBuilder::new(
            "Patient blood management in cardiac surgery",
            "https://www.scielo.br/j/abc",
            SourceType::Scielo,
        )
        .snippet("Uma revisão sobre transfusão.")
        .publication_date("2022-04-01")
        .language("pt")
        .citation_count(5)
        .build()
        .unwrap()
    }

    #[test]
    fn test_render_text() {
        let body = render_text(&[article()]);
        assert!(body.starts_with("Bloodless medicine and patient blood management: 1 article\n"));
        assert!(body.contains("1. Patient blood management in cardiac surgery"));
        assert!(body.contains("scielo.br | 2022 | PT | 5 citations"));
        assert!(body.contains("https://www.scielo.br/j/abc"));
    }

    #[test]
    fn test_render_empty() {
        assert!(render_text(&[]).contains(": 0 articles"));
    }

    #[test]
    fn test_compose_link() {
        let link = compose_link(
            &["a@example.org".to_string(), "b@example.org".to_string()],
            "Weekly digest",
            "line one\nline two",
        );
        assert_eq!(
            link,
            "mailto:a%40example.org,b%40example.org?subject=Weekly%20digest&body=line%20one%0Aline%20two"
        );
    }

    #[test]
    fn test_address_validation() {
        assert!(is_valid_address("team@example.org"));
        assert!(is_valid_address(" team@example.org "));
        assert!(!is_valid_address("team@example"));
        assert!(!is_valid_address("team example@x.org"));
        assert!(!is_valid_address("@example.org"));
        assert!(!is_valid_address("a@b@c.org"));
    }
}
