//! Relevance scoring and multi-tier ordering.

use std::cmp::Ordering;

use crate::models::Article;
use crate::pipeline::FilterPolicy;
use crate::utils::text::extract_year;

/// Set `relevance_score` on every article
pub fn score_all(articles: &mut [Article], policy: &FilterPolicy) {
    for article in articles.iter_mut() {
        article.relevance_score = policy.matched_keywords(article);
    }
}

/// Compare two articles for digest order
///
/// Tiers, each only breaking ties of the previous one:
/// relevance score (when `scoring`), Portuguese first, citation count (only
/// when both are known), then publication year with unknown years as 0.
pub fn compare(a: &Article, b: &Article, scoring: bool) -> Ordering {
    let by_score = if scoring {
        b.relevance_score.cmp(&a.relevance_score)
    } else {
        Ordering::Equal
    };

    by_score
        .then_with(|| b.is_portuguese.cmp(&a.is_portuguese))
        .then_with(|| match (a.citation_count, b.citation_count) {
            (Some(ca), Some(cb)) => cb.cmp(&ca),
            _ => Ordering::Equal,
        })
        .then_with(|| year_of(b).cmp(&year_of(a)))
}

/// Stable in-place sort by [`compare`]
pub fn rank(articles: &mut [Article], scoring: bool) {
    articles.sort_by(|a, b| compare(a, b, scoring));
}

fn year_of(article: &Article) -> i32 {
    extract_year(article.publication_date.as_deref()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleBuilder, SourceType};

    fn article(title: &str) -> Article {
        ArticleBuilder::new(title, format!("https://europepmc.org/{}", title.len()), SourceType::EuropePmc)
            .language("en")
            .build()
            .unwrap()
    }

    #[test]
    fn test_score_counts_keywords() {
        let policy = FilterPolicy::default();
        let mut articles = vec![ArticleBuilder::new(
            "Bloodless surgery with cell salvage",
            "https://europepmc.org/1",
            SourceType::EuropePmc,
        )
        .snippet("Tranexamic acid reduced transfusion.")
        .build()
        .unwrap()];
        score_all(&mut articles, &policy);
        assert_eq!(articles[0].relevance_score, 3);
    }

    #[test]
    fn test_score_tier_first() {
        let mut low = article("low");
        low.relevance_score = 1;
        low.is_portuguese = true;
        let mut high = article("high");
        high.relevance_score = 3;

        let mut list = vec![low, high];
        rank(&mut list, true);
        assert_eq!(list[0].title, "high");

        // Without scoring the Portuguese tier decides
        rank(&mut list, false);
        assert_eq!(list[0].title, "low");
    }

    #[test]
    fn test_citation_tier_only_when_both_known() {
        let mut a = article("a");
        a.citation_count = Some(5);
        a.publication_date = Some("2019".into());
        let mut b = article("b");
        b.citation_count = Some(50);
        b.publication_date = Some("2018".into());
        assert_eq!(compare(&a, &b, true), Ordering::Greater);

        // Unknown citations fall through to year
        b.citation_count = None;
        assert_eq!(compare(&a, &b, true), Ordering::Less);
    }

    #[test]
    fn test_missing_year_sorts_last() {
        let mut dated = article("dated");
        dated.publication_date = Some("2001-05-02".into());
        let undated = article("undated");

        let mut list = vec![undated, dated];
        rank(&mut list, true);
        assert_eq!(list[0].title, "dated");
    }

    #[test]
    fn test_rank_is_stable() {
        let list: Vec<Article> = ["first", "second", "third"]
            .iter()
            .map(|t| {
                let mut a = article(t);
                a.relevance_score = 2;
                a.publication_date = Some("2022".into());
                a
            })
            .collect();

        let mut ranked = list.clone();
        rank(&mut ranked, true);
        let titles: Vec<_> = ranked.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second", "third"]);
    }
}
