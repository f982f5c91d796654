//! Terminal output for the CLI.
//!
//! Colored status lines, article tables, and a spinner for long runs.

use comfy_table::{presets, Attribute, Cell, CellAlignment, ContentArrangement, Table};
use owo_colors::OwoColorize;
use std::io::IsTerminal;
use std::time::Duration;

use crate::models::{Article, LastSearchRecord};
use crate::notify::{DispatchReport, DispatchStatus};
use crate::utils::text::extract_year;

/// Get the current terminal width.
pub fn terminal_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(100)
}

/// Check if stdout is a terminal.
pub fn is_terminal() -> bool {
    std::io::stdout().is_terminal()
}

/// Icon for a source id.
pub fn source_icon(source: &str) -> &'static str {
    match source.to_lowercase().as_str() {
        "pubmed" => "🏥",
        "europe_pmc" | "europe pmc" => "🌍",
        "semantic" | "semantic scholar" => "🧠",
        "doaj" => "📓",
        "medrxiv" => "🧬",
        "scielo" => "📗",
        "base" => "🔍",
        "openalex" => "🔗",
        _ => "📄",
    }
}

/// Status types for colored output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
    Warning,
    Info,
    Search,
}

/// Status icons for different operations.
pub fn status_icon(status: Status) -> &'static str {
    match status {
        Status::Success => "✓",
        Status::Error => "✗",
        Status::Warning => "⚠",
        Status::Info => "ℹ",
        Status::Search => "🔍",
    }
}

/// Print a styled status line to stderr.
pub fn print_status(status: Status, msg: &str) {
    let icon = status_icon(status);
    match status {
        Status::Success => eprintln!("{} {}", icon.green().bold(), msg),
        Status::Error => eprintln!("{} {}", icon.red().bold(), msg),
        Status::Warning => eprintln!("{} {}", icon.yellow().bold(), msg),
        Status::Info => eprintln!("{} {}", icon.cyan().bold(), msg),
        Status::Search => eprintln!("{} {}", icon.yellow(), msg),
    }
}

/// Print a section header.
pub fn print_section(title: &str) {
    println!();
    println!("{}", format!("━━━ {} ━━━", title).bold().cyan());
}

/// Truncate text to fit within the specified width using unicode-aware truncation.
pub fn truncate_with_ellipsis(text: &str, max_width: usize) -> String {
    if max_width <= 3 {
        return "...".to_string();
    }

    let char_widths: Vec<(char, usize)> = text
        .chars()
        .map(|c| (c, unicode_width::UnicodeWidthChar::width(c).unwrap_or(1)))
        .collect();

    let total_width: usize = char_widths.iter().map(|(_, w)| *w).sum();
    if total_width <= max_width {
        return text.to_string();
    }

    let mut current_width = 0;
    let mut end_idx = 0;
    for (i, (_, w)) in char_widths.iter().enumerate() {
        if current_width + w > max_width - 3 {
            break;
        }
        current_width += w;
        end_idx = i + 1;
    }

    if end_idx == 0 {
        return "...".to_string();
    }

    let truncated: String = char_widths[..end_idx].iter().map(|(c, _)| *c).collect();
    format!("{}...", truncated)
}

/// Compact flags column: language, preprint, citations
fn flags(article: &Article) -> String {
    let mut parts = Vec::new();
    if article.is_portuguese {
        parts.push("PT".to_string());
    }
    if article.is_preprint == Some(true) {
        parts.push("preprint".to_string());
    }
    if article.has_full_text == Some(true) {
        parts.push("full text".to_string());
    }
    if let Some(count) = article.citation_count {
        parts.push(format!("{} cit.", count));
    }
    parts.join(", ")
}

/// Ranked articles as a table sized to `width`
pub fn articles_table(articles: &[Article], width: usize) -> Table {
    let title_width = width.saturating_sub(60).clamp(30, 90);

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(width.min(u16::MAX as usize) as u16)
        .set_header(vec!["#", "Title", "Source", "Year", "Score", "Notes"]);

    for (i, article) in articles.iter().enumerate() {
        let year = extract_year(article.publication_date.as_deref())
            .map(|y| y.to_string())
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(i + 1).set_alignment(CellAlignment::Right),
            Cell::new(truncate_with_ellipsis(&article.title, title_width))
                .add_attribute(Attribute::Bold),
            Cell::new(format!(
                "{} {}",
                source_icon(article.provider.id()),
                article.source
            )),
            Cell::new(year),
            Cell::new(article.relevance_score).set_alignment(CellAlignment::Right),
            Cell::new(flags(article)),
        ]);
    }
    table
}

/// Ranked articles as plain text, one block per article
pub fn articles_plain(articles: &[Article]) -> String {
    let mut out = String::new();
    for (i, article) in articles.iter().enumerate() {
        out.push_str(&format!("{}. {} ({})\n", i + 1, article.title, article.source));
        out.push_str(&format!("   URL: {}\n", article.url));
        if let Some(date) = &article.publication_date {
            out.push_str(&format!("   Published: {}\n", date));
        }
        let notes = flags(article);
        if !notes.is_empty() {
            out.push_str(&format!("   {}\n", notes));
        }
        out.push_str(&format!("   Score: {}\n\n", article.relevance_score));
    }
    out
}

/// One-line summary of the last search record
pub fn describe_last_search(record: Option<&LastSearchRecord>) -> String {
    match record {
        Some(r) => format!(
            "Last search {} found {} article{} from {} source{}; next due {}",
            r.last_search_timestamp.format("%Y-%m-%d %H:%M UTC"),
            r.articles_found,
            if r.articles_found == 1 { "" } else { "s" },
            r.sources_searched.len(),
            if r.sources_searched.len() == 1 { "" } else { "s" },
            r.next_scheduled_search.format("%Y-%m-%d %H:%M UTC"),
        ),
        None => "No search has been run yet".to_string(),
    }
}

/// Print a dispatch report with one line per recipient
pub fn print_dispatch(report: &DispatchReport) {
    let status = match report.status {
        DispatchStatus::Sent => Status::Success,
        DispatchStatus::PartiallySent | DispatchStatus::ComposeLink => Status::Warning,
        DispatchStatus::Failed => Status::Error,
        DispatchStatus::Skipped => Status::Info,
    };
    print_status(status, &report.message);

    for outcome in &report.outcomes {
        match &outcome.error {
            None => eprintln!("  {} {}", "✓".green(), outcome.recipient),
            Some(error) => eprintln!("  {} {}: {}", "✗".red(), outcome.recipient, error.dimmed()),
        }
    }
    if let Some(link) = &report.compose_link {
        println!("{}", link);
    }
}

/// Spinner shown on stderr while a search runs
pub struct Spinner {
    pb: indicatif::ProgressBar,
}

impl Spinner {
    /// Create a new spinner with the given message.
    pub fn new(msg: &str) -> Self {
        let pb = indicatif::ProgressBar::new_spinner();
        if let Ok(style) = indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "));
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    /// Finish with success message.
    pub fn finish_with_success(&self, msg: &str) {
        self.finish_styled("{spinner:.green} {msg}", "✓", msg);
    }

    /// Finish with error message.
    pub fn finish_with_error(&self, msg: &str) {
        self.finish_styled("{spinner:.red} {msg}", "✗", msg);
    }

    fn finish_styled(&self, template: &str, tick: &str, msg: &str) {
        if let Ok(style) = indicatif::ProgressStyle::with_template(template) {
            self.pb.set_style(style.tick_chars(&format!("{tick}{tick}")));
        }
        self.pb.finish_with_message(msg.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleBuilder, SourceType};
    use chrono::{TimeZone, Utc};

    fn article() -> Article {
        ArticleBuilder::new(
            "Tranexamic acid in bloodless cardiac surgery",
            "https://europepmc.org/article/MED/123",
            SourceType::EuropePmc,
        )
        .publication_date("2023-02-11")
        .citation_count(12)
        .is_preprint(false)
        .build()
        .unwrap()
    }

    #[test]
    fn test_source_icon() {
        assert_eq!(source_icon("pubmed"), "🏥");
        assert_eq!(source_icon("MEDRXIV"), "🧬");
        assert_eq!(source_icon("unknown"), "📄");
    }

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("Hello", 10), "Hello");
        assert_eq!(truncate_with_ellipsis("Hello World", 8), "Hello...");
        assert_eq!(truncate_with_ellipsis("", 10), "");
        assert_eq!(truncate_with_ellipsis("Hello", 3), "...");
    }

    #[test]
    fn test_articles_table() {
        let rendered = articles_table(&[article()], 140).to_string();
        assert!(rendered.contains("Tranexamic acid"));
        assert!(rendered.contains("2023"));
        assert!(rendered.contains("12 cit."));
    }

    #[test]
    fn test_articles_plain() {
        let text = articles_plain(&[article()]);
        assert!(text.starts_with("1. Tranexamic acid in bloodless cardiac surgery"));
        assert!(text.contains("URL: https://europepmc.org/article/MED/123"));
        assert!(text.contains("Published: 2023-02-11"));
    }

    #[test]
    fn test_describe_last_search() {
        assert_eq!(describe_last_search(None), "No search has been run yet");

        let at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let record = LastSearchRecord {
            last_search_timestamp: at,
            next_scheduled_search: at + chrono::Duration::days(7),
            articles_found: 1,
            sources_searched: vec!["pubmed".into(), "doaj".into()],
        };
        assert_eq!(
            describe_last_search(Some(&record)),
            "Last search 2026-03-02 09:00 UTC found 1 article from 2 sources; next due 2026-03-09 09:00 UTC"
        );
    }
}
