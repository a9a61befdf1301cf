//! Text Surface Abstraction
//!
//! The engine never touches a concrete renderer. It drives a [`TextSurface`]:
//! a row of grapheme slots with a cursor, a selection highlight and an
//! opacity. A web view, a terminal line or the in-memory [`MemorySurface`]
//! used by tests all implement the same contract.
//!
//! Slots are addressed by grapheme index. `reveal(i, g)` replaces slot `i`
//! when it exists and appends when `i == len()`; anything further out is an
//! error.

use std::ops::Range;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;

/// Errors reported by a text surface
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SurfaceError {
    /// The surface is no longer attached to anything visible
    #[error("Text surface is detached")]
    Detached,

    /// A slot index beyond the end of the rendered text
    #[error("Slot {index} out of range (len {len})")]
    OutOfRange {
        /// Requested slot
        index: usize,
        /// Current slot count
        len: usize,
    },

    /// Backend-specific failure
    #[error("Surface backend failed: {0}")]
    Backend(String),
}

/// A single-line, grapheme-addressed rendering target
pub trait TextSurface: Send + Sync {
    /// Remove every slot and reset selection and opacity
    fn clear(&self) -> Result<(), SurfaceError>;

    /// Place the cursor before slot `position`
    fn set_cursor(&self, position: usize) -> Result<(), SurfaceError>;

    /// Show `grapheme` in slot `index` (replace, or append at `len()`)
    fn reveal(&self, index: usize, grapheme: &str) -> Result<(), SurfaceError>;

    /// Remove slot `index`, shifting later slots left
    fn remove(&self, index: usize) -> Result<(), SurfaceError>;

    /// Highlight `range` as selected; an empty range clears the selection
    fn select(&self, range: Range<usize>) -> Result<(), SurfaceError>;

    /// Set the opacity of the whole line (0.0 to 1.0)
    fn set_opacity(&self, opacity: f32) -> Result<(), SurfaceError>;

    /// Number of rendered slots
    fn len(&self) -> usize;

    /// Whether nothing is rendered
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The rendered text
    fn text(&self) -> String;
}

/// Replace whatever is rendered with `graphemes` and park the cursor at the end
///
/// Used for the `complete` cancel mode and for the failure fallback.
pub fn render_complete<S>(surface: &S, graphemes: &[String]) -> Result<(), SurfaceError>
where
    S: TextSurface + ?Sized,
{
    surface.clear()?;
    for (index, grapheme) in graphemes.iter().enumerate() {
        surface.reveal(index, grapheme)?;
    }
    surface.set_cursor(graphemes.len())
}

// =============================================================================
// In-memory surface
// =============================================================================

/// One recorded surface operation
#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceOp {
    /// `clear()`
    Clear,
    /// `set_cursor(position)`
    Cursor(usize),
    /// `reveal(index, grapheme)`
    Reveal {
        /// Slot index
        index: usize,
        /// Rendered grapheme
        grapheme: String,
    },
    /// `remove(index)`
    Remove(usize),
    /// `select(range)`
    Select(Range<usize>),
    /// `set_opacity(value)`
    Opacity(f32),
}

/// A surface operation with the (tokio) time it happened
#[derive(Clone, Debug)]
pub struct SurfaceRecord {
    /// When the operation was applied
    pub at: Instant,
    /// What was done
    pub op: SurfaceOp,
}

#[derive(Debug, Default)]
struct MemoryState {
    slots: Vec<String>,
    cursor: usize,
    selection: Range<usize>,
    opacity: f32,
    log: Vec<SurfaceRecord>,
    fail_after: Option<usize>,
    transient: bool,
    ops: usize,
}

/// In-memory [`TextSurface`] that records every operation
///
/// Useful for headless runs and tests. With [`MemorySurface::failing_after`]
/// it starts returning errors after a number of successful operations.
#[derive(Debug)]
pub struct MemorySurface {
    state: Mutex<MemoryState>,
}

impl MemorySurface {
    /// Create an empty surface
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                opacity: 1.0,
                ..MemoryState::default()
            }),
        }
    }

    /// Create a surface whose operations fail once `ops` have succeeded
    #[must_use]
    pub fn failing_after(ops: usize) -> Self {
        let surface = Self::new();
        surface.state.lock().fail_after = Some(ops);
        surface
    }

    /// Create a surface where only the operation after `ops` successes fails
    #[must_use]
    pub fn failing_once_after(ops: usize) -> Self {
        let surface = Self::failing_after(ops);
        surface.state.lock().transient = true;
        surface
    }

    /// Stop injecting failures
    pub fn heal(&self) {
        self.state.lock().fail_after = None;
    }

    /// Current cursor position
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.state.lock().cursor
    }

    /// Current selection
    #[must_use]
    pub fn selection(&self) -> Range<usize> {
        self.state.lock().selection.clone()
    }

    /// Current opacity
    #[must_use]
    pub fn opacity(&self) -> f32 {
        self.state.lock().opacity
    }

    /// Snapshot of the operation log
    #[must_use]
    pub fn log(&self) -> Vec<SurfaceRecord> {
        self.state.lock().log.clone()
    }

    /// Forget the operation log
    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    /// Time of the last `reveal` that put `grapheme` into slot `index`
    #[must_use]
    pub fn last_reveal_of(&self, index: usize, grapheme: &str) -> Option<Instant> {
        self.state
            .lock()
            .log
            .iter()
            .rev()
            .find(|record| {
                matches!(&record.op, SurfaceOp::Reveal { index: i, grapheme: g }
                    if *i == index && g == grapheme)
            })
            .map(|record| record.at)
    }

    fn apply<F>(&self, op: SurfaceOp, mutate: F) -> Result<(), SurfaceError>
    where
        F: FnOnce(&mut MemoryState) -> Result<(), SurfaceError>,
    {
        let mut state = self.state.lock();
        if let Some(limit) = state.fail_after {
            if state.ops >= limit {
                if state.transient {
                    state.fail_after = None;
                }
                return Err(SurfaceError::Backend("injected failure".to_string()));
            }
        }
        mutate(&mut state)?;
        state.ops += 1;
        state.log.push(SurfaceRecord {
            at: Instant::now(),
            op,
        });
        Ok(())
    }
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self::new()
    }
}

impl TextSurface for MemorySurface {
    fn clear(&self) -> Result<(), SurfaceError> {
        self.apply(SurfaceOp::Clear, |state| {
            state.slots.clear();
            state.cursor = 0;
            state.selection = 0..0;
            state.opacity = 1.0;
            Ok(())
        })
    }

    fn set_cursor(&self, position: usize) -> Result<(), SurfaceError> {
        self.apply(SurfaceOp::Cursor(position), |state| {
            state.cursor = position.min(state.slots.len());
            Ok(())
        })
    }

    fn reveal(&self, index: usize, grapheme: &str) -> Result<(), SurfaceError> {
        let op = SurfaceOp::Reveal {
            index,
            grapheme: grapheme.to_string(),
        };
        self.apply(op, |state| {
            let len = state.slots.len();
            match index.cmp(&len) {
                std::cmp::Ordering::Less => state.slots[index] = grapheme.to_string(),
                std::cmp::Ordering::Equal => state.slots.push(grapheme.to_string()),
                std::cmp::Ordering::Greater => {
                    return Err(SurfaceError::OutOfRange { index, len });
                }
            }
            Ok(())
        })
    }

    fn remove(&self, index: usize) -> Result<(), SurfaceError> {
        self.apply(SurfaceOp::Remove(index), |state| {
            let len = state.slots.len();
            if index >= len {
                return Err(SurfaceError::OutOfRange { index, len });
            }
            state.slots.remove(index);
            state.cursor = state.cursor.min(state.slots.len());
            Ok(())
        })
    }

    fn select(&self, range: Range<usize>) -> Result<(), SurfaceError> {
        self.apply(SurfaceOp::Select(range.clone()), |state| {
            state.selection = range;
            Ok(())
        })
    }

    fn set_opacity(&self, opacity: f32) -> Result<(), SurfaceError> {
        let opacity = opacity.clamp(0.0, 1.0);
        self.apply(SurfaceOp::Opacity(opacity), |state| {
            state.opacity = opacity;
            Ok(())
        })
    }

    fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    fn text(&self) -> String {
        self.state.lock().slots.concat()
    }
}
