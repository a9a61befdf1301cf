//! One-line terminal surface
//!
//! Draws the animated line on the current terminal row with crossterm. Each
//! operation updates the in-memory slots and redraws the whole row, which is
//! cheap for a single line and keeps selection and fade consistent.

use std::io::{self, Write};
use std::ops::Range;

use crossterm::cursor::{Hide, MoveToColumn, Show};
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use crossterm::{execute, queue};
use parking_lot::Mutex;
use unicode_width::UnicodeWidthStr;

use chazy_core::{SurfaceError, TextSurface};

#[derive(Debug)]
struct LineState {
    slots: Vec<String>,
    cursor: usize,
    selection: Range<usize>,
    opacity: f32,
}

/// [`TextSurface`] that renders to stdout
#[derive(Debug)]
pub struct TerminalSurface {
    state: Mutex<LineState>,
}

fn backend(error: io::Error) -> SurfaceError {
    SurfaceError::Backend(error.to_string())
}

/// Grey level for a fade step
fn fade_color(opacity: f32) -> Color {
    let level = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
    Color::Rgb {
        r: level,
        g: level,
        b: level,
    }
}

impl TerminalSurface {
    /// Start drawing on the current row
    pub fn new() -> io::Result<Self> {
        execute!(io::stdout(), Hide)?;
        Ok(Self {
            state: Mutex::new(LineState {
                slots: Vec::new(),
                cursor: 0,
                selection: 0..0,
                opacity: 1.0,
            }),
        })
    }

    /// Leave the row and restore the cursor
    pub fn finish(&self) -> io::Result<()> {
        execute!(io::stdout(), ResetColor, Show, Print("\r\n"))
    }

    fn apply<F>(&self, f: F) -> Result<(), SurfaceError>
    where
        F: FnOnce(&mut LineState) -> Result<(), SurfaceError>,
    {
        let mut state = self.state.lock();
        f(&mut state)?;
        Self::draw(&state).map_err(backend)
    }

    fn draw(state: &LineState) -> io::Result<()> {
        let mut out = io::stdout().lock();
        queue!(
            out,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            SetForegroundColor(fade_color(state.opacity))
        )?;
        for (index, grapheme) in state.slots.iter().enumerate() {
            if state.selection.contains(&index) {
                queue!(
                    out,
                    SetAttribute(Attribute::Reverse),
                    Print(grapheme),
                    SetAttribute(Attribute::NoReverse)
                )?;
            } else {
                queue!(out, Print(grapheme))?;
            }
        }
        let column: usize = state.slots[..state.cursor.min(state.slots.len())]
            .iter()
            .map(|g| g.width())
            .sum();
        queue!(
            out,
            ResetColor,
            MoveToColumn(u16::try_from(column).unwrap_or(u16::MAX))
        )?;
        out.flush()
    }
}

impl TextSurface for TerminalSurface {
    fn clear(&self) -> Result<(), SurfaceError> {
        self.apply(|state| {
            state.slots.clear();
            state.cursor = 0;
            state.selection = 0..0;
            state.opacity = 1.0;
            Ok(())
        })
    }

    fn set_cursor(&self, position: usize) -> Result<(), SurfaceError> {
        self.apply(|state| {
            state.cursor = position.min(state.slots.len());
            Ok(())
        })
    }

    fn reveal(&self, index: usize, grapheme: &str) -> Result<(), SurfaceError> {
        self.apply(|state| {
            let len = state.slots.len();
            if index < len {
                state.slots[index] = grapheme.to_string();
            } else if index == len {
                state.slots.push(grapheme.to_string());
            } else {
                return Err(SurfaceError::OutOfRange { index, len });
            }
            Ok(())
        })
    }

    fn remove(&self, index: usize) -> Result<(), SurfaceError> {
        self.apply(|state| {
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
        self.apply(|state| {
            state.selection = range;
            Ok(())
        })
    }

    fn set_opacity(&self, opacity: f32) -> Result<(), SurfaceError> {
        self.apply(|state| {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_color_bounds() {
        assert_eq!(fade_color(1.0), Color::Rgb { r: 255, g: 255, b: 255 });
        assert_eq!(fade_color(0.0), Color::Rgb { r: 0, g: 0, b: 0 });
        assert_eq!(fade_color(7.0), Color::Rgb { r: 255, g: 255, b: 255 });
    }
}
