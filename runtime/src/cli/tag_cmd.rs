//! `tagger tag`: manual re-tag of every day on the page.

use crate::cli::client;
use crate::cli::output::{self, Styled};
use crate::config::RuntimeConfig;
use anyhow::{bail, Result};
use serde_json::json;

pub async fn run() -> Result<()> {
    let config = RuntimeConfig::load()?;
    match client::request(&config.socket_path, json!({ "action": "tagMap" })).await? {
        Ok(result) => {
            if output::is_json() {
                output::print_json(&result);
            } else if !output::is_quiet() {
                println!("  {} Tagging requested.", Styled::new().ok_sym());
            }
            Ok(())
        }
        Err(err) => bail!("tag request failed: {}", err.message),
    }
}
