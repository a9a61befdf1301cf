//! Inline pause markers
//!
//! Lines may embed `\pause{N}` to hold the typing cursor for `N`
//! milliseconds. Markers are stripped before the line is split into
//! graphemes; each pause is keyed by the clean-text grapheme index it
//! precedes.

use std::collections::BTreeMap;
use std::time::Duration;

use unicode_segmentation::UnicodeSegmentation;

const MARKER_OPEN: &str = "\\pause{";

/// Shortest accepted pause
pub const MIN_PAUSE_MS: u64 = 50;

/// Longest accepted pause (also the cap for merged pauses)
pub const MAX_PAUSE_MS: u64 = 5000;

/// A line with its pause markers extracted
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedLine {
    /// Text with markers removed
    pub clean: String,
    /// Grapheme clusters of `clean`
    pub graphemes: Vec<String>,
    /// Pause to hold *before* typing the grapheme at the key index.
    /// A key equal to `graphemes.len()` holds before the run completes.
    pub pauses: BTreeMap<usize, Duration>,
}

impl ParsedLine {
    /// Pause scheduled before grapheme `index`, if any
    #[must_use]
    pub fn pause_before(&self, index: usize) -> Option<Duration> {
        self.pauses.get(&index).copied()
    }
}

/// Split a raw line into clean graphemes and pause positions
#[must_use]
pub fn parse_line(raw: &str) -> ParsedLine {
    let mut clean = String::with_capacity(raw.len());
    // (byte offset into `clean`, clamped pause ms)
    let mut raw_pauses: Vec<(usize, u64)> = Vec::new();
    let mut rest = raw;

    while let Some(start) = rest.find(MARKER_OPEN) {
        clean.push_str(&rest[..start]);
        let after_open = &rest[start + MARKER_OPEN.len()..];
        let parsed = after_open
            .find('}')
            .and_then(|end| after_open[..end].trim().parse::<u64>().ok().map(|ms| (end, ms)));

        match parsed {
            Some((end, ms)) => {
                let clamped = ms.clamp(MIN_PAUSE_MS, MAX_PAUSE_MS);
                if clamped != ms {
                    tracing::debug!(requested = ms, clamped, "Pause marker clamped");
                }
                raw_pauses.push((clean.len(), clamped));
                rest = &after_open[end + 1..];
            }
            None => {
                // Not a marker we understand; keep it as literal text.
                clean.push_str(MARKER_OPEN);
                rest = after_open;
            }
        }
    }
    clean.push_str(rest);

    let graphemes: Vec<String> = clean.graphemes(true).map(str::to_string).collect();
    let starts: Vec<usize> = clean.grapheme_indices(true).map(|(i, _)| i).collect();

    let mut pauses: BTreeMap<usize, Duration> = BTreeMap::new();
    for (byte_offset, ms) in raw_pauses {
        let index = starts.partition_point(|&start| start < byte_offset);
        match pauses.get_mut(&index) {
            Some(existing) => {
                let merged_ms = u64::try_from(existing.as_millis())
                    .unwrap_or(MAX_PAUSE_MS)
                    .saturating_add(ms)
                    .min(MAX_PAUSE_MS);
                tracing::warn!(
                    index,
                    merged_ms,
                    "Consecutive pause markers merged into one pause"
                );
                *existing = Duration::from_millis(merged_ms);
            }
            None => {
                pauses.insert(index, Duration::from_millis(ms));
            }
        }
    }

    ParsedLine {
        clean,
        graphemes,
        pauses,
    }
}
