//! Finds the "Day N" blocks of an itinerary.

use crate::dom::{DomTree, ElementRef, NodeHandle};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6", "strong", "label"];
const ENDPOINT_MARKERS: &[&str] = &["start destination", "end destination"];

fn day_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)Day\s*(\d+)").expect("day number regex is valid"))
}

/// One itinerary day as seen in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySection {
    pub day: u32,
    /// The `.itinerary-holder` element.
    pub element: NodeHandle,
    /// Holder text at discovery time.
    pub text: String,
}

impl DaySection {
    pub fn key(&self) -> String {
        day_key(self.day)
    }
}

/// Key under which a day is stored in the processed set.
pub fn day_key(day: u32) -> String {
    format!("day-{day}")
}

fn mentions_endpoint(text: &str) -> bool {
    let lower = text.to_lowercase();
    ENDPOINT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Trip start/end blocks reuse the holder markup but carry a heading naming
/// them.
fn is_endpoint_block(holder: &ElementRef<'_>) -> bool {
    mentions_endpoint(&holder.text())
        && holder
            .find(|e| HEADING_TAGS.iter().any(|t| e.is(t)) && mentions_endpoint(&e.text()))
            .is_some()
}

/// Every day block in `tree`, ascending by day, first occurrence of each day
/// number only.
pub fn find_day_sections(tree: &DomTree) -> Vec<DaySection> {
    let mut seen = HashSet::new();
    let mut sections = Vec::new();

    for holder in tree.select(|e| e.has_class("itinerary-holder")) {
        let Some(title) = holder.find(|e| e.has_class("itinerary-title")) else {
            continue;
        };
        let title_text = title.text().trim().to_string();

        if is_endpoint_block(&holder) {
            tracing::debug!(title = %title_text, "skipping start/end destination block");
            continue;
        }

        let Some(day) = day_number_re()
            .captures(&title_text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
        else {
            continue;
        };
        if !seen.insert(day) {
            continue;
        }

        let holder_text = holder.text().trim().to_string();
        sections.push(DaySection {
            day,
            element: holder.handle(),
            text: if holder_text.is_empty() {
                title_text
            } else {
                holder_text
            },
        });
    }

    sections.sort_by_key(|s| s.day);
    sections
}
