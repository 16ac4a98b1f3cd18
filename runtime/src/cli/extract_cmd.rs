//! `tagger extract <file>`: offline dry run over a saved itinerary page.

use crate::cli::output::{self, Styled};
use crate::dom::parse::parse_html;
use crate::tagger::plan_days;
use anyhow::{Context, Result};
use std::path::Path;

pub async fn run(file: &Path) -> Result<()> {
    let html = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let tree = parse_html(&html);
    let plan = plan_days(&tree);

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "title": tree.title(),
            "days": plan,
        }));
        return Ok(());
    }

    if plan.is_empty() {
        println!("No day sections found in {}", file.display());
        return Ok(());
    }

    let s = Styled::new();
    for day in &plan {
        let destination = day.destination.as_deref().unwrap_or("-");
        let action = if day.prefilled && day.input.is_none() {
            s.dim("already filled")
        } else if day.destination.is_none() {
            s.red("no destination")
        } else if day.input.is_none() {
            s.red("no input")
        } else {
            s.green("would tag")
        };
        println!("Day {:<3} {:<30} {action}", day.day, destination);
    }
    if !output::is_quiet() {
        eprintln!(
            "  {} {} day(s) in {}",
            s.ok_sym(),
            plan.len(),
            file.display()
        );
    }
    Ok(())
}
