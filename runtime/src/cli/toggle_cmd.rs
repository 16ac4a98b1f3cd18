//! `tagger toggle <on|off>`: switch automatic tagging.

use crate::cli::client;
use crate::cli::output::{self, Styled};
use crate::config::{self, RuntimeConfig};
use crate::settings::SettingsStore;
use anyhow::{bail, Result};
use clap::ValueEnum;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn enabled(self) -> bool {
        self == Switch::On
    }
}

/// Persist the setting, then tell the running daemon (if any).
pub async fn run(switch: Switch) -> Result<()> {
    let enabled = switch.enabled();
    let settings = SettingsStore::load_or_install(config::settings_path())?;
    settings.set_auto_tag(enabled)?;

    let config = RuntimeConfig::load()?;
    let delivered = match client::request(
        &config.socket_path,
        json!({ "action": "toggleAutoTag", "enabled": enabled }),
    )
    .await
    {
        Ok(Ok(_)) => true,
        Ok(Err(err)) => bail!("daemon rejected toggle: {}", err.message),
        Err(e) => {
            tracing::debug!(error = %e, "daemon not reachable, setting saved only");
            false
        }
    };

    if output::is_json() {
        output::print_json(&json!({ "autoTagEnabled": enabled, "applied": delivered }));
        return Ok(());
    }
    if !output::is_quiet() {
        let s = Styled::new();
        let state = if enabled { "enabled" } else { "disabled" };
        if delivered {
            println!("  {} Auto-tag {state}.", s.ok_sym());
        } else {
            println!("  {} Auto-tag {state} (takes effect on next start).", s.ok_sym());
        }
    }
    Ok(())
}
