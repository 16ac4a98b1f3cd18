//! The daemon's PID file.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The recorded PID. A missing file is `None`; garbage is an error.
    pub fn read(&self) -> Result<Option<i32>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let pid = raw
            .trim()
            .parse()
            .with_context(|| format!("invalid PID in {}", self.path.display()))?;
        Ok(Some(pid))
    }

    pub fn write_current(&self) -> Result<()> {
        std::fs::write(&self.path, std::process::id().to_string())
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    pub fn remove(&self) {
        let _ = std::fs::remove_file(&self.path);
    }

    /// PID of a live daemon. Clears the file when it points at nothing.
    pub fn running(&self) -> Option<i32> {
        match self.read() {
            Ok(Some(pid)) if is_alive(pid) => Some(pid),
            Ok(None) => None,
            _ => {
                self.remove();
                None
            }
        }
    }
}

/// `kill -0`: whether a signal could be delivered to `pid`.
pub fn is_alive(pid: i32) -> bool {
    signal(pid, None)
}

/// Ask `pid` to exit with SIGTERM. False when the signal was not delivered.
pub fn terminate(pid: i32) -> bool {
    signal(pid, Some("-TERM"))
}

fn signal(pid: i32, sig: Option<&str>) -> bool {
    if !cfg!(unix) {
        return false;
    }
    let mut cmd = Command::new("kill");
    cmd.arg(sig.unwrap_or("-0")).arg(pid.to_string());
    matches!(cmd.output(), Ok(o) if o.status.success())
}
