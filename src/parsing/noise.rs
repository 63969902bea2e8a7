//! Noise and header line classification.

use std::sync::LazyLock;

use regex::Regex;

use crate::rules::CompiledRules;

static PAGE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:page|p\.)?\s*[-–]?\s*\d{1,4}\s*[-–]?\s*\.?\s*$")
        .expect("page number regex should compile")
});

static PAGE_OF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bpage\s+\d+\s+of\s+\d+\b").expect("page-of regex should compile")
});

/// Minimum trimmed length for a line to carry data.
const MIN_LINE_LEN: usize = 5;

/// Whether a line is page furniture rather than data.
pub fn is_noise_line(line: &str, rules: &CompiledRules) -> bool {
    let trimmed = line.trim();
    if trimmed.chars().count() < MIN_LINE_LEN {
        return true;
    }
    if PAGE_NUMBER.is_match(trimmed) || PAGE_OF.is_match(trimmed) {
        return true;
    }
    if trimmed
        .chars()
        .all(|c| c.is_whitespace() || matches!(c, '-' | '=' | '_' | '|' | '+'))
    {
        return true;
    }
    if !trimmed.chars().any(|c| c.is_alphanumeric()) {
        return true;
    }
    rules.is_noise_phrase(trimmed) || is_owner_label_line(trimmed, rules)
}

/// Lines such as `Petitioner: John Smith` name the owner of the page's rows;
/// they are read for owner candidates, not emitted as rows.
fn is_owner_label_line(trimmed: &str, rules: &CompiledRules) -> bool {
    rules
        .owner_labels
        .iter()
        .any(|re| re.find(trimmed).is_some_and(|m| m.start() == 0))
}

/// Whether at least half of the declared headers appear in the line.
pub fn is_header_line(line: &str, headers: &[String]) -> bool {
    let headers: Vec<String> = headers
        .iter()
        .map(|h| h.trim().to_lowercase())
        .filter(|h| !h.is_empty())
        .collect();
    if headers.is_empty() {
        return false;
    }
    let lower = line.to_lowercase();
    let hits = headers.iter().filter(|h| lower.contains(h.as_str())).count();
    hits > 0 && hits * 2 >= headers.len()
}
