//! Event scripts
//!
//! A script is a text file of timed UI events, one per line:
//!
//! ```text
//! # ms    event_type       target   old  new
//! 1500    button_click     save
//! 4200    slider_changed   volume   3    8
//! 9000    page_visibility  -        -    hidden
//! ```
//!
//! Times are offsets from the start of the replay. `-` leaves a field empty.
//! Blank lines and lines starting with `#` are ignored.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use chazy_core::EventData;

/// One scripted event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptEvent {
    /// Offset from the start of the replay
    pub at: Duration,
    /// UI or system event type
    pub event_type: String,
    /// Payload
    pub data: EventData,
}

fn field(value: Option<&str>) -> Option<String> {
    value.filter(|v| *v != "-").map(str::to_string)
}

/// Parse a script, sorted by time
pub fn parse(source: &str) -> Result<Vec<ScriptEvent>> {
    let mut events = Vec::new();
    for (number, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(at), Some(event_type)) = (parts.next(), parts.next()) else {
            bail!("line {}: expected `<ms> <event_type>`", number + 1);
        };
        let at: u64 = at
            .parse()
            .with_context(|| format!("line {}: invalid time {at:?}", number + 1))?;
        let data = EventData {
            target: field(parts.next()),
            old_value: field(parts.next()),
            new_value: field(parts.next()),
        };
        if parts.next().is_some() {
            bail!("line {}: too many fields", number + 1);
        }
        events.push(ScriptEvent {
            at: Duration::from_millis(at),
            event_type: event_type.to_string(),
            data,
        });
    }
    events.sort_by_key(|event| event.at);
    Ok(events)
}

/// Read and parse a script file
pub fn load(path: &Path) -> Result<Vec<ScriptEvent>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script: {}", path.display()))?;
    parse(&source).with_context(|| format!("Invalid script: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fields_and_order() {
        let events = parse(
            "# comment\n\n4200 slider_changed volume 3 8\n1500 button_click save\n9000 page_visibility - - hidden\n",
        )
        .unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type, "button_click");
        assert_eq!(events[0].data, EventData::target("save"));
        assert_eq!(
            events[1].data,
            EventData::target("volume").with_change("3", "8")
        );
        assert_eq!(events[2].data.target, None);
        assert_eq!(events[2].data.new_value.as_deref(), Some("hidden"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("soon button_click").is_err());
        assert!(parse("100").is_err());
        assert!(parse("100 slider_changed a b c d").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(load(&dir.path().join("missing.txt")).is_err());
    }
}
