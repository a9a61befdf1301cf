//! Interrupt calibration history
//!
//! Records how long accepted interrupts took to clear the surface, per
//! emotion, and suggests a clear duration from recent samples. Stored as JSON
//! at `$XDG_DATA_HOME/chazy/calibration.json`; samples older than seven days
//! are dropped on load.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::emotion::Emotion;
use crate::state_machine::ClearStrategy;

/// Samples older than this are dropped on load
pub const MAX_AGE_DAYS: i64 = 7;

/// Oldest samples are dropped beyond this count
pub const MAX_SAMPLES: usize = 500;

/// Errors loading or saving calibration data
#[derive(Debug, Error)]
pub enum CalibrationError {
    /// Failed to read or write the history file
    #[error("Calibration file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The history file is not valid JSON
    #[error("Failed to parse calibration history: {0}")]
    Json(#[from] serde_json::Error),
}

/// One measured interrupt clear
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    /// Emotion at the time of the interrupt
    pub emotion: Emotion,
    /// Strategy used
    pub strategy: ClearStrategy,
    /// Time from decision to cleared surface
    pub clear_ms: u64,
    /// When the sample was taken
    pub recorded_at: DateTime<Utc>,
}

/// Interrupt timing samples
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CalibrationHistory {
    samples: Vec<CalibrationSample>,
}

/// Default history location
#[must_use]
pub fn default_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("chazy").join("calibration.json"))
}

impl CalibrationHistory {
    /// Empty history
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`; a missing file is an empty history
    pub fn load(path: &Path) -> Result<Self, CalibrationError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No calibration history");
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(CalibrationError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let mut history: Self = serde_json::from_str(&content)?;
        let before = history.samples.len();
        history.prune(Utc::now());
        tracing::debug!(
            path = %path.display(),
            loaded = before,
            kept = history.samples.len(),
            "Calibration history loaded"
        );
        Ok(history)
    }

    /// Write to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), CalibrationError> {
        let io_error = |source| CalibrationError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(io_error)
    }

    /// Drop samples older than seven days
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::days(MAX_AGE_DAYS);
        self.samples.retain(|sample| sample.recorded_at >= cutoff);
    }

    /// Record a clear that took `clear`
    pub fn record(&mut self, emotion: Emotion, strategy: ClearStrategy, clear: Duration) {
        self.record_at(emotion, strategy, clear, Utc::now());
    }

    /// Record a sample with an explicit timestamp
    pub fn record_at(
        &mut self,
        emotion: Emotion,
        strategy: ClearStrategy,
        clear: Duration,
        recorded_at: DateTime<Utc>,
    ) {
        self.samples.push(CalibrationSample {
            emotion,
            strategy,
            clear_ms: clear.as_millis() as u64,
            recorded_at,
        });
        if self.samples.len() > MAX_SAMPLES {
            let excess = self.samples.len() - MAX_SAMPLES;
            self.samples.drain(..excess);
        }
    }

    /// Median clear time for `emotion`, if any samples exist
    #[must_use]
    pub fn suggested_clear_ms(&self, emotion: Emotion) -> Option<u64> {
        let mut times: Vec<u64> = self
            .samples
            .iter()
            .filter(|sample| sample.emotion == emotion)
            .map(|sample| sample.clear_ms)
            .collect();
        if times.is_empty() {
            return None;
        }
        times.sort_unstable();
        Some(times[times.len() / 2])
    }

    /// All samples, oldest first
    #[must_use]
    pub fn samples(&self) -> &[CalibrationSample] {
        &self.samples
    }

    /// Number of samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether there are no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
