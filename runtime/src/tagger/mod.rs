//! The tagging core: find day blocks, extract destinations, type them into
//! the page's autocomplete and keep track of which days are done.

pub mod autofill;
pub mod extractor;
pub mod inputs;
pub mod locator;
pub mod orchestrator;
pub mod scorer;
pub mod text;
pub mod timing;

pub use locator::{find_day_sections, DaySection};
pub use orchestrator::{DayOutcome, Orchestrator, PassOptions, PassReport, ProcessedSet};
pub use timing::Timings;

use crate::dom::{DomTree, NodeHandle};
use crate::error::Result;
use crate::page::TaggerPage;
use extractor::{extract_destination, normalize_destination, SectionView};
use inputs::{has_prefilled_input, locate_day_field, DayField};
use serde::Serialize;

/// Number of day blocks currently on the page.
pub async fn count_days(page: &dyn TaggerPage) -> Result<usize> {
    let tree = page.snapshot().await?;
    Ok(find_day_sections(&tree).len())
}

/// What a pass would do for one day, without touching the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayPlan {
    pub day: u32,
    pub destination: Option<String>,
    pub input: Option<NodeHandle>,
    pub prefilled: bool,
}

/// Dry run of a pass over a static snapshot.
pub fn plan_days(tree: &DomTree) -> Vec<DayPlan> {
    find_day_sections(tree)
        .into_iter()
        .map(|section| {
            let block = tree.get(section.element);
            let destination = extract_destination(&SectionView::new(&section.text, block))
                .as_deref()
                .and_then(normalize_destination);
            let input = block.and_then(|b| match locate_day_field(&b, orchestrator::ANCESTOR_SEARCH_LEVELS) {
                DayField::Open(input) => Some(input.handle()),
                DayField::Prefilled | DayField::Missing => None,
            });
            DayPlan {
                day: section.day,
                destination,
                input,
                prefilled: block.is_some_and(|b| has_prefilled_input(&b)),
            }
        })
        .collect()
}
