//! Text normalization helpers shared by the adapters and the pipeline.

use regex::Regex;
use scraper::Html;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Maximum snippet length in characters
pub const SNIPPET_MAX_CHARS: usize = 400;

/// Strip markup (e.g. `<i>`, `<sup>`, JATS tags) from a fragment
///
/// Block-level closing tags become word breaks; whitespace is collapsed.
pub fn strip_markup(text: &str) -> String {
    if !text.contains('<') {
        return text.to_string();
    }
    let spaced = block_end_regex().replace_all(text, "$0 ");
    Html::parse_fragment(&spaced)
        .root_element()
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn block_end_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)</(?:p|div|li|h[1-6]|title|sec|jats:p|jats:title|jats:sec)>|<br\s*/?>")
            .expect("valid block tag regex")
    })
}

/// Truncate to `max_chars` characters on a char boundary, appending an ellipsis
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out = out.trim_end().to_string();
    out.push('…');
    out
}

/// Turn a raw abstract into a display snippet, `None` when blank
pub fn clean_snippet(raw: &str) -> Option<String> {
    let stripped = strip_markup(raw);
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(truncate_chars(&collapsed, SNIPPET_MAX_CHARS))
    }
}

fn year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(1[89]\d{2}|20\d{2})\b").expect("valid year regex"))
}

/// First plausible four-digit year in a loosely structured date string
pub fn extract_year(date: Option<&str>) -> Option<i32> {
    let date = date?;
    year_regex()
        .find(date)
        .and_then(|m| m.as_str().parse().ok())
}

/// Lowercased host of an absolute URL with a leading `www.` removed
pub fn host_label(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Whether a language code or name denotes Portuguese
pub fn is_portuguese_code(code: &str) -> bool {
    let code = code.trim().to_lowercase();
    matches!(
        code.as_str(),
        "pt" | "por" | "pt-br" | "pt_br" | "pt-pt" | "portuguese" | "português" | "portugues"
    )
}

const PORTUGUESE_WORDS: &[&str] = &[
    "da", "do", "das", "dos", "em", "para", "com", "uma", "não", "pelo", "pela", "são",
    "paciente", "pacientes", "sangue", "cirurgia", "transfusão", "gestão", "através",
];

const PORTUGUESE_SUFFIXES: &[&str] = &["ção", "ções", "ões", "ência"];

/// Heuristic Portuguese detection for sources without a language field
///
/// Requires at least three distinct markers across title and snippet.
pub fn looks_portuguese(title: &str, snippet: Option<&str>) -> bool {
    let mut text = title.to_lowercase();
    if let Some(snippet) = snippet {
        text.push(' ');
        text.push_str(&snippet.to_lowercase());
    }

    let mut markers: HashSet<&str> = HashSet::new();
    for word in text.split(|c: char| !c.is_alphabetic()) {
        if word.is_empty() {
            continue;
        }
        if let Some(hit) = PORTUGUESE_WORDS.iter().find(|w| **w == word) {
            markers.insert(hit);
        }
        if let Some(hit) = PORTUGUESE_SUFFIXES.iter().find(|s| word.ends_with(**s)) {
            markers.insert(hit);
        }
    }
    markers.len() >= 3
}
