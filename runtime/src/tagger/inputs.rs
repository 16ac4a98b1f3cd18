//! Destination input lookup and the filled/tagged predicate.

use crate::dom::ElementRef;

/// Ancestors searched above a "Destination:" label, label included.
const LABEL_SEARCH_LEVELS: usize = 5;

/// Placeholder values the host page leaves in empty fields.
const PLACEHOLDERS: &[&str] = &[",", ", ", " ", " ,"];
const PLACEHOLDER_PHRASES: &[&str] = &["chose", "select", "see location"];

/// Whether a field value is a real destination rather than a placeholder.
///
/// Used both to skip fields that are already filled and to verify a fill.
pub fn is_meaningful_value(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() || PLACEHOLDERS.contains(&trimmed) {
        return false;
    }
    let lower = trimmed.to_lowercase();
    if PLACEHOLDER_PHRASES.iter().any(|p| lower.contains(p)) {
        return false;
    }
    trimmed.chars().count() >= 2
}

/// `input.itidestination` or `input[class*='itidestination']`.
pub fn is_destination_input(el: &ElementRef<'_>) -> bool {
    el.is("input") && el.class_contains("itidestination")
}

/// `input[type='text']`.
pub fn is_text_input(el: &ElementRef<'_>) -> bool {
    el.is("input")
        && el
            .attr("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("text"))
}

/// Visible, editable and still empty.
pub fn is_eligible(el: &ElementRef<'_>) -> bool {
    el.is_visible() && !el.is_disabled() && !el.is_read_only() && !is_meaningful_value(el.value())
}

fn first_eligible_destination<'a>(scope: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    scope.find(|e| is_destination_input(e) && is_eligible(e))
}

/// Locate the empty destination field of a day block.
///
/// Looks inside the block first, then around the first short element
/// mentioning "destination:".
pub fn find_destination_input<'a>(day: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    if let Some(input) = first_eligible_destination(day) {
        return Some(input);
    }

    let label = day.find(|e| {
        let text = e.text().to_lowercase();
        text.contains("destination:") && text.chars().count() < 50
    })?;

    std::iter::once(label)
        .chain(label.ancestors())
        .take(LABEL_SEARCH_LEVELS)
        .find_map(|container| first_eligible_destination(&container))
}

/// Id or name mentions the trip start or end field.
fn is_endpoint_field(el: &ElementRef<'_>) -> bool {
    let id = el.id().unwrap_or("").to_lowercase();
    let name = el.attr("name").unwrap_or("").to_lowercase();
    ["start", "end"]
        .iter()
        .any(|w| id.contains(w) || name.contains(w))
}

/// Wider search used when [`find_destination_input`] comes up empty.
///
/// Walks up to `levels` ancestors of the day block. Inputs sitting inside a
/// different `.itinerary-holder` belong to another day and are skipped.
pub fn find_ancestor_input<'a>(day: &ElementRef<'a>, levels: usize) -> Option<ElementRef<'a>> {
    let own = day.handle();
    for container in day.ancestors().take(levels) {
        let found = container.find(|e| {
            (is_destination_input(e) || is_text_input(e))
                && is_eligible(e)
                && !is_endpoint_field(e)
                && e.closest(|a| a.has_class("itinerary-holder"))
                    .map_or(true, |holder| holder.handle() == own)
        });
        if found.is_some() {
            return found;
        }
    }
    None
}

/// Some destination or text field in the block already holds a value.
pub fn has_prefilled_input(day: &ElementRef<'_>) -> bool {
    day.find(|e| (is_destination_input(e) || is_text_input(e)) && is_meaningful_value(e.value()))
        .is_some()
}

/// Outcome of looking for the field a day's destination goes into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DayField<'a> {
    /// An empty, editable field to type into.
    Open(ElementRef<'a>),
    /// The day's own field already holds a destination.
    Prefilled,
    Missing,
}

/// Resolve a day block's field: its own empty destination field, else an
/// already filled one, else the wider ancestor search. A prefilled day never
/// falls through to the ancestor search.
pub fn locate_day_field<'a>(day: &ElementRef<'a>, levels: usize) -> DayField<'a> {
    if let Some(input) = find_destination_input(day) {
        return DayField::Open(input);
    }
    if has_prefilled_input(day) {
        return DayField::Prefilled;
    }
    find_ancestor_input(day, levels).map_or(DayField::Missing, DayField::Open)
}
