//! Keystroke simulation against the host page's autocomplete.
//!
//! Typing is an explicit [`TypingPlan`]: one [`KeyStep`] per character,
//! each with its offset from the start. The driver walks the plan, then
//! hands over to the [`DropdownSelector`].

use super::scorer::DropdownSelector;
use super::timing::Timings;
use crate::dom::NodeHandle;
use crate::error::Result;
use crate::page::{SyntheticEvent, TaggerPage};
use std::time::Duration;
use tokio::time::Instant;

/// One simulated keystroke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStep {
    /// Field value after this keystroke.
    pub typed: String,
    /// The character typed.
    pub key: String,
    /// Delay from the first keystroke.
    pub offset: Duration,
}

impl KeyStep {
    /// `KeyboardEvent.code` as the host page expects it: `Key` + uppercase.
    pub fn code(&self) -> String {
        format!("Key{}", self.key.to_uppercase())
    }
}

/// The full keystroke sequence for one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingPlan {
    steps: Vec<KeyStep>,
    interval: Duration,
}

impl TypingPlan {
    pub fn new(destination: &str, interval: Duration) -> Self {
        let mut typed = String::new();
        let steps = destination
            .chars()
            .enumerate()
            .map(|(i, ch)| {
                typed.push(ch);
                KeyStep {
                    typed: typed.clone(),
                    key: ch.to_string(),
                    offset: interval * i as u32,
                }
            })
            .collect();
        Self { steps, interval }
    }

    pub fn steps(&self) -> &[KeyStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Time from the first keystroke until the pause after the last one ends.
    pub fn duration(&self) -> Duration {
        self.interval * self.steps.len() as u32
    }
}

/// How a fill attempt ended. The field itself is the source of truth; this
/// is reported for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// A candidate was committed on the given attempt (1 or 2).
    Selected { attempt: u8 },
    /// No candidate on either attempt; the field was cleared.
    Abandoned,
}

pub struct AutofillDriver<'p> {
    page: &'p dyn TaggerPage,
    timings: &'p Timings,
}

impl<'p> AutofillDriver<'p> {
    pub fn new(page: &'p dyn TaggerPage, timings: &'p Timings) -> Self {
        Self { page, timings }
    }

    /// Type `destination` into `input` and pick from the suggestions.
    pub async fn fill(&self, input: NodeHandle, destination: &str) -> Result<FillOutcome> {
        let page = self.page;

        page.dispatch(input, &SyntheticEvent::Focus).await?;
        page.set_value(input, "").await?;
        page.dispatch(input, &SyntheticEvent::Input { data: None }).await?;

        let plan = TypingPlan::new(destination, self.timings.keystroke());
        let start = Instant::now();
        for step in plan.steps() {
            tokio::time::sleep_until(start + step.offset).await;
            page.set_value(input, &step.typed).await?;
            page.dispatch(
                input,
                &SyntheticEvent::Input {
                    data: Some(step.key.clone()),
                },
            )
            .await?;
            let code = step.code();
            page.dispatch(
                input,
                &SyntheticEvent::KeyDown {
                    key: step.key.clone(),
                    code: code.clone(),
                },
            )
            .await?;
            page.dispatch(
                input,
                &SyntheticEvent::KeyUp {
                    key: step.key.clone(),
                    code,
                },
            )
            .await?;
        }
        tokio::time::sleep_until(start + plan.duration()).await;

        let selector = DropdownSelector::new(page, self.timings);

        tokio::time::sleep(self.timings.dropdown_settle()).await;
        if selector.select(destination, input).await? {
            tokio::time::sleep(self.timings.selection_settle()).await;
            return Ok(FillOutcome::Selected { attempt: 1 });
        }

        tokio::time::sleep(self.timings.dropdown_retry()).await;
        let outcome = if selector.select(destination, input).await? {
            FillOutcome::Selected { attempt: 2 }
        } else {
            tracing::debug!(%destination, "no candidate after retry, clearing field");
            page.set_value(input, "").await?;
            page.dispatch(input, &SyntheticEvent::Change).await?;
            FillOutcome::Abandoned
        };
        tokio::time::sleep(self.timings.retry_settle()).await;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::memory::{MemoryPage, PageAction};

    #[test]
    fn test_typing_plan() {
        let plan = TypingPlan::new("Rome", Duration::from_millis(50));
        assert_eq!(plan.len(), 4);
        let typed: Vec<&str> = plan.steps().iter().map(|s| s.typed.as_str()).collect();
        assert_eq!(typed, vec!["R", "Ro", "Rom", "Rome"]);
        let offsets: Vec<u64> = plan.steps().iter().map(|s| s.offset.as_millis() as u64).collect();
        assert_eq!(offsets, vec![0, 50, 100, 150]);
        assert_eq!(plan.steps()[1].code(), "KeyO");
        assert_eq!(plan.duration(), Duration::from_millis(200));
    }

    #[test]
    fn test_typing_plan_multibyte() {
        let plan = TypingPlan::new("Sán", Duration::from_millis(50));
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.steps()[1].key, "á");
        assert_eq!(plan.steps()[1].code(), "KeyÁ");
        assert!(TypingPlan::new("", Duration::from_millis(50)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_fill_timing_and_events() {
        let page = MemoryPage::from_html(
            r#"<body><input type="text" id="dest" class="itidestination"></body>"#,
            "about:blank",
        );
        let input = page.resolve_selector("#dest").await.unwrap().unwrap();
        let timings = Timings::default();

        let start = Instant::now();
        let outcome = AutofillDriver::new(&page, &timings)
            .fill(input, "Oslo")
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(outcome, FillOutcome::Abandoned);
        // 4 keystrokes, dropdown settle, retry wait, final settle.
        assert_eq!(elapsed, Duration::from_millis(4 * 50 + 1000 + 800 + 500));

        let actions = page.actions();
        assert_eq!(
            actions[0],
            PageAction::Dispatch {
                node: input,
                event: SyntheticEvent::Focus
            }
        );
        let values: Vec<&str> = actions
            .iter()
            .filter_map(|a| match a {
                PageAction::SetValue { value, .. } => Some(value.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec!["", "O", "Os", "Osl", "Oslo", ""]);
        assert!(matches!(
            actions.last(),
            Some(PageAction::Dispatch {
                event: SyntheticEvent::Change,
                ..
            })
        ));
        assert_eq!(page.read_value(input).await.unwrap(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_input_is_an_error() {
        let page = MemoryPage::from_html(r#"<body><input id="dest"></body>"#, "about:blank");
        let input = page.resolve_selector("#dest").await.unwrap().unwrap();
        page.remove(input).unwrap();
        let timings = Timings::default();
        assert!(AutofillDriver::new(&page, &timings)
            .fill(input, "Oslo")
            .await
            .is_err());
    }
}
