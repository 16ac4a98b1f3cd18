//! Minimal client for the daemon's socket protocol.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Error payload of a failed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub code: String,
    pub message: String,
}

/// Send one message (`{"action": ..., ...}`) and wait for its reply.
///
/// Returns the `result` object, or the daemon's error.
pub async fn request(socket_path: &Path, mut message: Value) -> Result<std::result::Result<Value, RemoteError>> {
    let id = uuid::Uuid::new_v4().to_string();
    match message.as_object_mut() {
        Some(obj) => {
            obj.insert("id".into(), Value::String(id.clone()));
        }
        None => bail!("message must be a JSON object"),
    }

    let stream = UnixStream::connect(socket_path).await.with_context(|| {
        format!(
            "tagger is not running (cannot connect to {}). Start it with 'tagger start <url>'.",
            socket_path.display()
        )
    })?;
    let (reader, mut writer) = stream.into_split();
    writer
        .write_all(format!("{message}\n").as_bytes())
        .await
        .context("failed to send request")?;
    writer.flush().await?;

    let mut line = String::new();
    let mut reader = BufReader::new(reader);
    tokio::time::timeout(REPLY_TIMEOUT, reader.read_line(&mut line))
        .await
        .context("timed out waiting for the daemon")?
        .context("failed to read reply")?;

    parse_reply(&line, &id)
}

fn parse_reply(line: &str, id: &str) -> Result<std::result::Result<Value, RemoteError>> {
    let mut reply: Value = serde_json::from_str(line.trim()).context("daemon sent malformed reply")?;
    if reply["id"].as_str() != Some(id) {
        bail!("reply id does not match request");
    }
    if let Some(result) = reply.get_mut("result") {
        return Ok(Ok(result.take()));
    }
    let err = &reply["error"];
    Ok(Err(RemoteError {
        code: err["code"].as_str().unwrap_or("E_UNKNOWN").to_string(),
        message: err["message"].as_str().unwrap_or("unknown error").to_string(),
    }))
}
