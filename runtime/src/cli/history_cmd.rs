//! `tagger history`: recently tagged maps, newest first.

use crate::background::history::MapRecord;
use crate::background::{format_relative, HistoryStore};
use crate::cli::output::{self, Styled};
use crate::config;
use anyhow::Result;
use chrono::{DateTime, Utc};

const LIMIT: usize = 10;

/// Render one history entry as display lines.
pub fn render_entry(record: &MapRecord, now: DateTime<Utc>) -> Vec<String> {
    let mut lines = vec![record.title.clone().unwrap_or_else(|| "Untitled Map".into())];
    if let Some(location) = record.location.as_deref().filter(|l| !l.is_empty()) {
        lines.push(format!("  📍 {location}"));
    }
    if let Some(c) = record.coordinates {
        lines.push(format!("  📍 {}, {}", c.lat, c.lng));
    }
    lines.push(format!("  {}", format_relative(&record.timestamp, now)));
    lines
}

pub async fn run() -> Result<()> {
    let store = HistoryStore::open(config::history_path())?;
    let maps = store.recent_maps(LIMIT)?;

    if output::is_json() {
        output::print_json(&serde_json::json!({ "taggedMaps": maps }));
        return Ok(());
    }

    if maps.is_empty() {
        println!("No tagged maps yet");
        return Ok(());
    }

    let s = Styled::new();
    let now = Utc::now();
    for record in &maps {
        let mut lines = render_entry(record, now).into_iter();
        if let Some(title) = lines.next() {
            println!("{}", s.bold(&title));
        }
        for line in lines {
            println!("{}", s.dim(&line));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Coordinates;

    #[test]
    fn test_render_entry() {
        let now = DateTime::parse_from_rfc3339("2026-03-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let record = MapRecord {
            title: None,
            location: Some("San Sebastián".into()),
            coordinates: Some(Coordinates { lat: 43.3, lng: -1.98 }),
            url: String::new(),
            tab_id: String::new(),
            timestamp: "2026-03-10T11:58:00Z".into(),
        };
        assert_eq!(
            render_entry(&record, now),
            vec![
                "Untitled Map".to_string(),
                "  📍 San Sebastián".to_string(),
                "  📍 43.3, -1.98".to_string(),
                "  2 minutes ago".to_string(),
            ]
        );
    }
}
