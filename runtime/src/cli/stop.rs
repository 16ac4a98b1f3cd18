//! Stop the running tagger daemon.

use super::pid::{self, PidFile};
use crate::cli::output::{self, Styled};
use crate::config::{self, RuntimeConfig};
use anyhow::{bail, Result};
use std::time::Duration;

const STOP_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_POLL: Duration = Duration::from_millis(100);

/// SIGTERM the daemon and wait for it to exit. The daemon removes its own
/// PID file and socket; they are cleaned up here only if it did not.
pub async fn run() -> Result<()> {
    let s = Styled::new();
    let pid_file = PidFile::new(config::pid_file_path());
    let Some(pid) = pid_file.read()? else {
        bail!(
            "tagger is not running (no PID file at {})",
            pid_file.path().display()
        );
    };

    if !pid::terminate(pid) {
        pid_file.remove();
        bail!("could not signal PID {pid}; it may have exited already. PID file removed.");
    }
    if !output::is_quiet() {
        eprintln!("  Stopping tagger (PID {pid})...");
    }

    let exited = tokio::time::timeout(STOP_TIMEOUT, async {
        while pid::is_alive(pid) {
            tokio::time::sleep(STOP_POLL).await;
        }
    })
    .await
    .is_ok();

    pid_file.remove();
    if exited {
        let socket_path = RuntimeConfig::load()
            .map(|c| c.socket_path)
            .unwrap_or_else(|_| config::SOCKET_PATH.into());
        let _ = std::fs::remove_file(socket_path);
        if !output::is_quiet() {
            eprintln!("  {} tagger stopped.", s.ok_sym());
        }
    } else {
        eprintln!(
            "  {} tagger (PID {pid}) did not exit within {}s. PID file removed.",
            s.warn_sym(),
            STOP_TIMEOUT.as_secs()
        );
    }
    Ok(())
}
