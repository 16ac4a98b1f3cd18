//! Small text helpers shared by the locator and the extractor.

use regex::Regex;
use std::sync::OnceLock;

fn day_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^Day\s*\d+").expect("day marker regex is valid"))
}

fn day_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^Day\s*\d+\s*:\s*").expect("day label regex is valid"))
}

fn day_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^Day\s*\d+\s*:?\s*").expect("day prefix regex is valid"))
}

fn changed_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s+Changed$").expect("changed suffix regex is valid"))
}

/// `text` begins with "Day" followed by a number.
pub fn starts_with_day_marker(text: &str) -> bool {
    day_marker_re().is_match(text)
}

/// Remove a leading `Day N:` label (colon required).
pub fn strip_day_label(text: &str) -> String {
    day_label_re().replace(text, "").trim().to_string()
}

/// Remove a leading `Day N` with or without a colon.
pub fn strip_day_prefix(text: &str) -> String {
    day_prefix_re().replace(text, "").trim().to_string()
}

/// Remove the trailing "Changed" badge the host page appends to edited days.
pub fn strip_changed(text: &str) -> String {
    changed_suffix_re().replace(text, "").trim().to_string()
}

/// Last entry of a comma-separated list of places, ignoring empty and
/// implausibly long parts.
pub fn last_listed(text: &str) -> Option<String> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty() && part.chars().count() < 100)
        .last()
        .map(strip_changed)
}
