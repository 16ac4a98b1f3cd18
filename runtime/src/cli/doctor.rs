//! Environment readiness check.

use crate::cli::output;
use crate::cli::pid::PidFile;
use crate::config::{self, RuntimeConfig};
use crate::renderer::chromium::find_chromium;
use crate::settings::SettingsStore;
use anyhow::Result;
use serde_json::json;
use std::process::Command;

/// Check Chromium, configuration, settings and the daemon.
pub async fn run() -> Result<()> {
    let config = RuntimeConfig::load();
    let chromium = match &config {
        Ok(c) => c.chromium_path.clone().or_else(find_chromium),
        Err(_) => find_chromium(),
    };
    let settings = SettingsStore::load_or_install(config::settings_path()).and_then(|s| s.get());
    let running = PidFile::new(config::pid_file_path()).running();
    let mem_mb = get_available_memory_mb();

    if output::is_json() {
        output::print_json(&json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "chromium": chromium.as_ref().map(|p| p.display().to_string()),
            "config_ok": config.is_ok(),
            "auto_tag_enabled": settings.as_ref().ok().map(|s| s.auto_tag_enabled),
            "running_pid": running,
            "available_memory_mb": mem_mb,
            "ready": chromium.is_some() && config.is_ok(),
        }));
        return Ok(());
    }

    println!("tagger doctor");
    println!("=============");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!("[!!] Chromium NOT found. Set TAGGER_CHROMIUM_PATH or chromium_path in config.json."),
    }

    match &config {
        Ok(c) => {
            println!("[OK] Config loaded (host {})", c.host);
            let socket_dir = c.socket_path.parent().unwrap_or(&c.socket_path);
            if socket_dir.exists() {
                println!("[OK] Socket path {} is usable", c.socket_path.display());
            } else {
                println!("[!!] Socket directory does not exist: {}", socket_dir.display());
            }
        }
        Err(e) => println!("[!!] Config error: {e:#}"),
    }

    match &settings {
        Ok(s) => println!(
            "[OK] Settings: auto-tag {}",
            if s.auto_tag_enabled { "on" } else { "off" }
        ),
        Err(e) => println!("[!!] Settings error: {e:#}"),
    }

    match running {
        Some(pid) => println!("[OK] Daemon running (PID {pid})"),
        None => println!("[--] Daemon not running"),
    }

    match mem_mb {
        Some(mb) if mb >= 256 => println!("[OK] Available memory: {mb}MB"),
        Some(mb) => println!("[!!] Available memory: {mb}MB (< 256MB, Chromium may struggle)"),
        None => println!("[??] Could not determine available memory"),
    }

    println!();
    if chromium.is_some() && config.is_ok() {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }

    Ok(())
}

/// Get available memory in MB (platform-specific).
fn get_available_memory_mb() -> Option<u64> {
    #[cfg(target_os = "macos")]
    {
        let output = Command::new("sysctl")
            .args(["-n", "hw.memsize"])
            .output()
            .ok()?;
        let s = String::from_utf8_lossy(&output.stdout);
        let bytes: u64 = s.trim().parse().ok()?;
        Some(bytes / 1_048_576)
    }
    #[cfg(target_os = "linux")]
    {
        let output = Command::new("free").args(["-m"]).output().ok()?;
        let s = String::from_utf8_lossy(&output.stdout);
        s.lines()
            .find(|line| line.starts_with("Mem:"))
            .and_then(|line| line.split_whitespace().nth(6))
            .and_then(|v| v.parse().ok())
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        None
    }
}
