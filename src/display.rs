//! # Display Collaborator
//!
//! The render scheduler hands every finished [`Frame`] to a [`Display`] and then
//! asks it to present with a [`RefreshMode`]. The display owns the physical
//! refresh timing; the scheduler only chooses full vs. partial.
//!
//! Two implementations ship with the library:
//! - [`crate::epd4in2b_v2::EpdDisplay`]: the tri-colour e-paper panel
//! - [`TerminalDisplay`]: ASCII art on a terminal for development without hardware

use crate::epd4in2b_v2::{DisplayBuffer, EpdError};
use crate::frame::{Frame, InkColor};
use crate::layout::FontBook;
use std::io::{self, Write};
use thiserror::Error;

/// Display update intensity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefreshMode {
    /// Full waveform, clears ghosting, slow and flashes the panel
    Full,
    /// Fast update, may leave residue
    Partial,
}

/// Errors raised while pushing a frame to a display.
#[derive(Error, Debug)]
pub enum DisplayError {
    /// The panel driver reported a failure
    #[error("panel: {0}")]
    Panel(#[from] EpdError),

    /// Writing to the output device failed
    #[error("display IO: {0}")]
    Io(#[from] io::Error),

    /// `present` was called before any frame was set
    #[error("no frame to present")]
    NoFrame,
}

/// Destination for composed frames.
pub trait Display {
    /// Stage `frame` for the next presentation.
    fn set_frame(&mut self, frame: &Frame) -> Result<(), DisplayError>;

    /// Push the staged frame to the physical output.
    fn present(&mut self, mode: RefreshMode) -> Result<(), DisplayError>;
}

impl<D: Display + ?Sized> Display for Box<D> {
    fn set_frame(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        (**self).set_frame(frame)
    }

    fn present(&mut self, mode: RefreshMode) -> Result<(), DisplayError> {
        (**self).present(mode)
    }
}

/// Renders frames as ASCII art, one character per `cell` of pixels.
///
/// Character legend: `x` cell contains red ink, `#` mostly black, `.` some black.
pub struct TerminalDisplay<W: Write> {
    out: W,
    buffer: DisplayBuffer,
    fonts: FontBook,
    cell: (u32, u32),
    staged: bool,
}

impl TerminalDisplay<io::Stdout> {
    /// Terminal display writing to stdout with 4×8 pixel cells.
    pub fn stdout(width: u32, height: u32) -> Self {
        Self::new(io::stdout(), width, height, (4, 8))
    }
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W, width: u32, height: u32, cell: (u32, u32)) -> Self {
        Self {
            out,
            buffer: DisplayBuffer::new(width, height),
            fonts: FontBook::default(),
            cell: (cell.0.max(1), cell.1.max(1)),
            staged: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn cell_char(&self, col: u32, row: u32) -> char {
        let (cw, ch) = self.cell;
        let mut black = 0;
        let mut red = false;
        for y in row * ch..(row + 1) * ch {
            for x in col * cw..(col + 1) * cw {
                match self.buffer.pixel(x, y) {
                    Some(InkColor::Black) => black += 1,
                    Some(InkColor::Red) => red = true,
                    _ => {}
                }
            }
        }
        if red {
            'x'
        } else if black * 2 >= cw * ch {
            '#'
        } else if black > 0 {
            '.'
        } else {
            ' '
        }
    }
}

impl<W: Write> Display for TerminalDisplay<W> {
    fn set_frame(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        // DisplayBuffer drawing is infallible
        let _ = frame.draw(&mut self.buffer, &self.fonts);
        self.staged = true;
        Ok(())
    }

    fn present(&mut self, mode: RefreshMode) -> Result<(), DisplayError> {
        if !self.staged {
            return Err(DisplayError::NoFrame);
        }
        let cols = self.buffer.width().div_ceil(self.cell.0);
        let rows = self.buffer.height().div_ceil(self.cell.1);

        let border = "-".repeat(cols as usize);
        writeln!(self.out, "+{border}+ {mode:?} refresh")?;
        for row in 0..rows {
            let line: String = (0..cols).map(|col| self.cell_char(col, row)).collect();
            writeln!(self.out, "|{line}|")?;
        }
        writeln!(self.out, "+{border}+")?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{ContentMode, DrawOp, RuleOp, Zone};
    use embedded_graphics::prelude::Size;

    fn ruled_frame() -> Frame {
        Frame {
            size: Size::new(16, 16),
            background: InkColor::White,
            mode: ContentMode::Verse,
            ops: vec![DrawOp::Rule(RuleOp {
                zone: Zone::Separator,
                y: 8,
                thickness: 8,
                color: InkColor::Black,
            })],
        }
    }

    #[test]
    fn test_present_without_frame_fails() {
        let mut display = TerminalDisplay::new(Vec::new(), 16, 16, (4, 8));
        assert!(matches!(
            display.present(RefreshMode::Full),
            Err(DisplayError::NoFrame)
        ));
    }

    #[test]
    fn test_ascii_rendering() {
        let mut display = TerminalDisplay::new(Vec::new(), 16, 16, (4, 8));
        display.set_frame(&ruled_frame()).unwrap();
        display.present(RefreshMode::Partial).unwrap();

        let text = String::from_utf8(display.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "+----+ Partial refresh");
        assert_eq!(lines[1], "|    |");
        assert_eq!(lines[2], "|####|");
        assert_eq!(lines[3], "+----+");
    }

    #[test]
    fn test_boxed_display_delegates() {
        let mut display: Box<dyn Display> =
            Box::new(TerminalDisplay::new(Vec::new(), 8, 8, (4, 8)));
        display.set_frame(&ruled_frame()).unwrap();
        assert!(display.present(RefreshMode::Full).is_ok());
    }
}
