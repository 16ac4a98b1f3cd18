//! Destination extraction.
//!
//! The host page has no structured field for "where does this day end", so
//! the destination is recovered from the day block's text with an ordered
//! cascade of matchers. Each matcher is a pure function; the first one whose
//! result passes [`validate`] wins.

use super::text::{last_listed, starts_with_day_marker, strip_changed, strip_day_label, strip_day_prefix};
use crate::dom::ElementRef;
use regex::Regex;
use std::sync::OnceLock;

/// What a matcher may look at: the section text and, when still attached,
/// the day block element.
#[derive(Debug, Clone, Copy)]
pub struct SectionView<'a> {
    pub text: &'a str,
    pub element: Option<ElementRef<'a>>,
}

impl<'a> SectionView<'a> {
    pub fn new(text: &'a str, element: Option<ElementRef<'a>>) -> Self {
        Self { text, element }
    }

    /// Text-only view, for offline extraction from a title string.
    pub fn text_only(text: &'a str) -> Self {
        Self {
            text,
            element: None,
        }
    }
}

type Matcher = fn(&SectionView<'_>) -> Option<String>;

/// The cascade, in priority order.
pub const CASCADE: &[(&str, Matcher)] = &[
    ("day-title", match_day_title),
    ("day-title-colon", match_day_title_colon),
    ("strong-label", match_strong_label),
    ("destination-field", match_destination_field),
];

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn day_title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)Day\s*\d+([A-Za-zÀ-ÿ][a-zA-ZÀ-ÿ\s\-,]+?)(?:\s+Changed|$)")
            .expect("day title regex is valid")
    })
}

fn day_title_colon_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)Day\s*\d+\s*:\s*([A-Za-zÀ-ÿ][a-zA-ZÀ-ÿ\s\-,]+?)(?:\s+Changed|$)")
            .expect("colon day title regex is valid")
    })
}

fn destination_field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)Destination:\s*([^\n]+?)(?:\n|See Location|Chose Location|$)")
            .expect("destination field regex is valid")
    })
}

fn label_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(Routes|Start|End)").expect("label prefix regex is valid"))
}

/// Shared tail of both title matchers: last of a comma list, or a single
/// place name.
fn from_title_capture(capture: &str) -> Option<String> {
    let location = strip_changed(capture.trim());
    if location.contains(',') {
        return last_listed(&location);
    }
    if char_len(&location) <= 1 {
        return None;
    }
    let location = strip_day_label(&location);
    (char_len(&location) > 1 && !starts_with_day_marker(&location)).then_some(location)
}

/// `Day 2Bilbao, Guernica, San Sebastián` (no separator after the number).
fn match_day_title(view: &SectionView<'_>) -> Option<String> {
    let caps = day_title_re().captures(view.text)?;
    from_title_capture(caps.get(1)?.as_str())
}

/// `Day 2: Bilbao, San Sebastián`.
fn match_day_title_colon(view: &SectionView<'_>) -> Option<String> {
    let caps = day_title_colon_re().captures(view.text)?;
    from_title_capture(caps.get(1)?.as_str())
}

/// The first `<strong>` of each `.col-sm-12` column holds the day's route.
fn match_strong_label(view: &SectionView<'_>) -> Option<String> {
    let day = view.element?;
    for column in day.find_all(|e| e.has_class("col-sm-12")) {
        let Some(strong) = column.find(|e| e.is("strong")) else {
            continue;
        };
        let text = strong.text().trim().to_string();
        if starts_with_day_marker(&text)
            || text.to_lowercase().contains("destination:")
            || label_prefix_re().is_match(&text)
        {
            continue;
        }
        let len = char_len(&text);
        if len <= 1 || len >= 100 {
            continue;
        }
        let location = strip_day_label(&strip_changed(&text));
        if location.contains(',') {
            if let Some(last) = last_listed(&location) {
                return Some(last);
            }
        } else if char_len(&location) > 1 {
            return Some(location);
        }
    }
    None
}

/// `Destination: San Sebastián, Spain` form field label.
fn match_destination_field(view: &SectionView<'_>) -> Option<String> {
    let caps = destination_field_re().captures(view.text)?;
    let full = caps.get(1)?.as_str().trim();
    let lower = full.to_lowercase();
    if full.is_empty()
        || full == ","
        || full == ", "
        || lower.contains("chose")
        || lower.contains("select")
        || char_len(full) <= 2
    {
        return None;
    }
    if full.starts_with(',') {
        return None;
    }
    let city = full.split(',').next()?.trim();
    let city = strip_day_label(city);
    (char_len(&city) > 1).then_some(city)
}

/// Accept a candidate only if it is a plausible place name.
pub fn validate(candidate: &str) -> Option<String> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() || starts_with_day_marker(trimmed) || char_len(trimmed) <= 1 {
        return None;
    }
    Some(trimmed.to_string())
}

/// Run the cascade and return the first validated result.
pub fn extract_destination(view: &SectionView<'_>) -> Option<String> {
    for (name, matcher) in CASCADE {
        match matcher(view) {
            Some(raw) => match validate(&raw) {
                Some(destination) => {
                    tracing::debug!(matcher = name, %destination, "destination extracted");
                    return Some(destination);
                }
                None => tracing::debug!(matcher = name, candidate = %raw, "candidate rejected"),
            },
            None => continue,
        }
    }
    None
}

/// Final clean-up before typing: drop any leading `Day N` and re-validate.
pub fn normalize_destination(destination: &str) -> Option<String> {
    validate(&strip_day_prefix(destination))
}
