//! Autocomplete candidate scoring and selection.
//!
//! After typing, the host page shows a suggestion list. Each entry is scored
//! against the destination with a tiered scheme; the best entry is committed
//! by replaying the events a user's click would produce.

use super::timing::Timings;
use crate::dom::{DomTree, ElementRef, NodeHandle};
use crate::error::Result;
use crate::page::{SyntheticEvent, TaggerPage};
use regex::Regex;
use serde::Serialize;

/// Widgets the host page is known to use, in lookup order.
const DROPDOWN_CLASSES: &[&str] = &["suggestionbox", "suggestions-list"];

/// Max horizontal offset between an input and its dropdown.
const DROPDOWN_MAX_LEFT_OFFSET: f64 = 200.0;

/// Similarity tiers, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MatchTier {
    Exact,
    ExactLocation,
    Prefix,
    WordBoundary,
    Normalized,
    AllWords,
    Phrase,
}

impl MatchTier {
    pub fn score(self) -> u32 {
        match self {
            MatchTier::Exact => 1000,
            MatchTier::ExactLocation => 900,
            MatchTier::Prefix => 800,
            MatchTier::WordBoundary => 700,
            MatchTier::Normalized => 600,
            MatchTier::AllWords => 500,
            MatchTier::Phrase => 400,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MatchTier::Exact => "exact match",
            MatchTier::ExactLocation => "exact location match",
            MatchTier::Prefix => "prefix match",
            MatchTier::WordBoundary => "word boundary match",
            MatchTier::Normalized => "normalized match",
            MatchTier::AllWords => "all words match",
            MatchTier::Phrase => "phrase match",
        }
    }
}

/// A scored dropdown entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub element: NodeHandle,
    pub display_text: String,
    pub score: u32,
    pub tier: Option<MatchTier>,
}

/// Predicate holds for the option text or its value.
fn either(text: &str, value: &str, pred: impl Fn(&str) -> bool) -> bool {
    pred(text) || pred(value)
}

fn strip_separators(s: &str) -> String {
    s.chars().filter(|c| *c != '-' && !c.is_whitespace()).collect()
}

/// Scores option strings against one destination. Regexes are compiled once
/// per destination.
#[derive(Debug)]
pub struct DestinationMatcher {
    lower: String,
    normalized: String,
    words: Vec<String>,
    boundary: Option<Regex>,
    word_res: Vec<Regex>,
    phrase: Option<Regex>,
}

impl DestinationMatcher {
    pub fn new(destination: &str) -> Self {
        let lower = destination.to_lowercase();
        let words: Vec<String> = lower
            .split(|c: char| c.is_whitespace() || c == '-')
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
        let boundary = Regex::new(&format!(r"(?i)^{}[,\s]", regex::escape(&lower))).ok();
        let word_res = words
            .iter()
            .filter_map(|w| Regex::new(&format!(r"(?i)(^|[^a-z]){}([^a-z]|$)", regex::escape(w))).ok())
            .collect();
        let phrase = (words.len() > 1)
            .then(|| Regex::new(&format!(r"(?i)(^|,\s*){}[,\s]", regex::escape(&words.join(" ")))).ok())
            .flatten();
        Self {
            normalized: strip_separators(&lower),
            lower,
            words,
            boundary,
            word_res,
            phrase,
        }
    }

    /// Starts with the destination followed by a space, or at a word
    /// boundary. `Parish Hill` is not a prefix match for `Paris`.
    fn is_prefix_of(&self, s: &str) -> bool {
        s.starts_with(&format!("{} ", self.lower))
            || s.strip_prefix(self.lower.as_str())
                .is_some_and(|rest| rest.chars().next().map_or(true, |c| !c.is_alphabetic()))
    }

    /// Tier for an option, given its lowercase text and lowercase value.
    pub fn tier(&self, text: &str, value: &str) -> Option<MatchTier> {
        if either(text, value, |s| s == self.lower) {
            return Some(MatchTier::Exact);
        }
        let with_comma = format!("{},", self.lower);
        if either(text, value, |s| s.starts_with(&with_comma)) {
            return Some(MatchTier::ExactLocation);
        }
        if either(text, value, |s| self.is_prefix_of(s)) {
            return Some(MatchTier::Prefix);
        }
        if let Some(re) = &self.boundary {
            if either(text, value, |s| re.is_match(s)) {
                return Some(MatchTier::WordBoundary);
            }
        }
        if either(text, value, |s| strip_separators(s) == self.normalized) {
            return Some(MatchTier::Normalized);
        }
        if !self.words.is_empty() && self.word_res.len() == self.words.len() {
            if self.word_res.iter().all(|re| either(text, value, |s| re.is_match(s))) {
                return Some(MatchTier::AllWords);
            }
            if let Some(re) = &self.phrase {
                if either(text, value, |s| re.is_match(s)) {
                    return Some(MatchTier::Phrase);
                }
            }
        }
        None
    }

    /// Score a dropdown option element.
    pub fn score_option(&self, option: &ElementRef<'_>) -> Candidate {
        let display_text = option.text().trim().to_string();
        let text = display_text.to_lowercase();
        let value = option
            .attr("data-value")
            .map(str::to_lowercase)
            .unwrap_or_else(|| text.clone());
        let tier = self.tier(&text, &value);
        Candidate {
            element: option.handle(),
            display_text,
            score: tier.map_or(0, MatchTier::score),
            tier,
        }
    }
}

/// Score every option; result is ordered best first, document order within
/// equal scores.
pub fn rank_candidates(destination: &str, options: &[ElementRef<'_>]) -> Vec<Candidate> {
    let matcher = DestinationMatcher::new(destination);
    let mut ranked: Vec<Candidate> = options.iter().map(|o| matcher.score_option(o)).collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
}

fn is_shown(el: &ElementRef<'_>) -> bool {
    el.is_visible() && el.is_displayed()
}

/// The suggestion list belonging to `input`, if one is showing.
pub fn find_dropdown<'a>(tree: &'a DomTree, input: Option<NodeHandle>) -> Option<ElementRef<'a>> {
    let input_rect = input.and_then(|h| tree.get(h)).map(|e| e.rect());

    for class in DROPDOWN_CLASSES {
        for dropdown in tree.select(|e| e.has_class(class)) {
            if !is_shown(&dropdown) {
                continue;
            }
            match input_rect {
                Some(anchor) => {
                    let rect = dropdown.rect();
                    if rect.top >= anchor.top && (rect.left - anchor.left).abs() < DROPDOWN_MAX_LEFT_OFFSET {
                        return Some(dropdown);
                    }
                }
                None => return Some(dropdown),
            }
        }
    }

    tree.elements().into_iter().find(|e| {
        (e.is("ul") || e.is("ol") || (e.is("div") && e.attr("role") == Some("listbox")))
            && is_shown(e)
            && e.children().next().is_some()
    })
}

fn is_generic_option(e: &ElementRef<'_>) -> bool {
    e.is("li")
        || e.is("a")
        || (e.is("div") && e.attr("role") == Some("option"))
        || e.has_class("option")
        || e.has_class("dropdown-item")
        || e.has_class("suggestion")
        || e.has_class("autocomplete-item")
}

/// Entries of a dropdown.
pub fn find_options<'a>(dropdown: &ElementRef<'a>) -> Vec<ElementRef<'a>> {
    let items = dropdown.find_all(|e| e.has_class("suggestionbox-item"));
    if !items.is_empty() {
        return items;
    }
    dropdown.find_all(is_generic_option)
}

/// Picks and commits the best dropdown entry.
pub struct DropdownSelector<'p> {
    page: &'p dyn TaggerPage,
    timings: &'p Timings,
}

impl<'p> DropdownSelector<'p> {
    pub fn new(page: &'p dyn TaggerPage, timings: &'p Timings) -> Self {
        Self { page, timings }
    }

    /// Returns `Ok(true)` once a candidate was committed, `Ok(false)` when
    /// there was no dropdown, no acceptable candidate, or the commit failed.
    /// Only a failed snapshot is an error.
    pub async fn select(&self, destination: &str, input: NodeHandle) -> Result<bool> {
        let tree = self.page.snapshot().await?;

        let Some(dropdown) = find_dropdown(&tree, Some(input)) else {
            tracing::debug!(%destination, "no dropdown showing");
            return Ok(false);
        };
        let options = find_options(&dropdown);
        let ranked = rank_candidates(destination, &options);
        let Some(best) = ranked.first().filter(|c| c.score > 0) else {
            tracing::debug!(%destination, options = options.len(), "no acceptable candidate");
            return Ok(false);
        };
        tracing::debug!(
            %destination,
            choice = %best.display_text,
            score = best.score,
            tier = best.tier.map_or("", MatchTier::label),
            "selecting candidate"
        );

        let Some(option) = tree.get(best.element) else {
            return Ok(false);
        };
        let clickable = option.attr("data-clickable") == Some("true");
        let target = option.attr("data-target").map(str::to_string);
        let committed = option
            .attr("data-value")
            .map(str::to_string)
            .unwrap_or_else(|| best.display_text.clone());

        match self
            .commit(best.element, clickable.then_some(target).flatten(), &committed)
            .await
        {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::debug!(error = %e, "committing candidate failed");
                Ok(false)
            }
        }
    }

    async fn commit(&self, option: NodeHandle, target_selector: Option<String>, value: &str) -> Result<()> {
        self.page.scroll_into_view(option).await?;

        let mut target = None;
        if let Some(selector) = target_selector {
            if let Some(t) = self.page.resolve_selector(&selector).await? {
                self.page.set_value(t, value).await?;
                self.page.dispatch(t, &SyntheticEvent::Input { data: None }).await?;
                self.page.dispatch(t, &SyntheticEvent::Change).await?;
                self.page.dispatch(t, &SyntheticEvent::Focus).await?;
                target = Some(t);
            }
        }

        self.page.dispatch(option, &SyntheticEvent::Click).await?;
        self.page.dispatch(option, &SyntheticEvent::MouseDown).await?;
        self.page.dispatch(option, &SyntheticEvent::MouseUp).await?;

        if let Some(t) = target {
            tokio::time::sleep(self.timings.target_blur()).await;
            if let Err(e) = self.page.dispatch(t, &SyntheticEvent::Blur).await {
                tracing::debug!(error = %e, "blur after selection failed");
            }
        }
        Ok(())
    }
}
