//! # Text Measurement and Word Wrapping
//!
//! Everything that needs to know how wide a string is goes through
//! [`FontMetrics`]. The composer uses it for centering and [`wrap`] uses it to
//! break verse text into lines that fit the canvas.
//!
//! The stock implementation, [`MonoMetrics`], measures with the fixed-cell
//! `embedded-graphics` mono fonts the frame is eventually drawn with, so the
//! measured width is exactly the drawn width.

use embedded_graphics::mono_font::{ascii, MonoFont};
use embedded_graphics::prelude::Size;
use thiserror::Error;

/// A string could not be measured with the requested font.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeasurementError {
    /// The font has no glyph for this character
    #[error("no glyph for {0:?}")]
    MissingGlyph(char),
}

/// Measures rendered text extents in pixels.
pub trait FontMetrics {
    fn measure(&self, text: &str) -> Result<Size, MeasurementError>;
}

impl<F> FontMetrics for F
where
    F: Fn(&str) -> Result<Size, MeasurementError>,
{
    fn measure(&self, text: &str) -> Result<Size, MeasurementError> {
        self(text)
    }
}

/// Metrics for a fixed-cell `embedded-graphics` font.
///
/// Control characters have no glyph and fail to measure; anything else is one
/// cell wide (characters outside the font's table draw as its replacement glyph).
#[derive(Clone, Copy)]
pub struct MonoMetrics {
    font: &'static MonoFont<'static>,
}

impl MonoMetrics {
    pub fn new(font: &'static MonoFont<'static>) -> Self {
        Self { font }
    }
}

impl FontMetrics for MonoMetrics {
    fn measure(&self, text: &str) -> Result<Size, MeasurementError> {
        if let Some(c) = text.chars().find(|c| c.is_control()) {
            return Err(MeasurementError::MissingGlyph(c));
        }
        let cells = text.chars().count() as u32;
        let cell = self.font.character_size;
        let spacing = self.font.character_spacing * cells.saturating_sub(1);
        Ok(Size::new(cell.width * cells + spacing, cell.height))
    }
}

/// Typographic role of a run of text within a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FontRole {
    /// Instruction text, top left
    Header,
    /// Current time, top right
    Clock,
    /// Verse reference, accent colour
    Reference,
    /// Wrapped verse body
    Verse,
    /// Rotating phrase/icon line
    Decoration,
    /// Glyph run along the bottom edge
    Footer,
    /// Whole-hour time display
    Banner,
}

/// Font assignment for every [`FontRole`].
#[derive(Clone, Copy)]
pub struct FontBook {
    pub header: &'static MonoFont<'static>,
    pub clock: &'static MonoFont<'static>,
    pub reference: &'static MonoFont<'static>,
    pub verse: &'static MonoFont<'static>,
    pub decoration: &'static MonoFont<'static>,
    pub footer: &'static MonoFont<'static>,
    pub banner: &'static MonoFont<'static>,
}

impl Default for FontBook {
    fn default() -> Self {
        Self {
            header: &ascii::FONT_8X13,
            clock: &ascii::FONT_10X20,
            reference: &ascii::FONT_9X18_BOLD,
            verse: &ascii::FONT_9X15,
            decoration: &ascii::FONT_7X13,
            footer: &ascii::FONT_10X20,
            banner: &ascii::FONT_10X20,
        }
    }
}

impl FontBook {
    pub fn font(&self, role: FontRole) -> &'static MonoFont<'static> {
        match role {
            FontRole::Header => self.header,
            FontRole::Clock => self.clock,
            FontRole::Reference => self.reference,
            FontRole::Verse => self.verse,
            FontRole::Decoration => self.decoration,
            FontRole::Footer => self.footer,
            FontRole::Banner => self.banner,
        }
    }

    pub fn metrics(&self, role: FontRole) -> MonoMetrics {
        MonoMetrics::new(self.font(role))
    }
}

/// Wrapped lines for one text run plus the line pitch to lay them out with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrappedBlock {
    pub lines: Vec<String>,
    pub line_height: u32,
}

impl WrappedBlock {
    /// Wrap `text` and take the line height from the extent of `"Ay"`
    /// (cap height plus descender).
    pub fn new<M: FontMetrics + ?Sized>(text: &str, metrics: &M, max_width: u32) -> Self {
        Self {
            lines: wrap(text, metrics, max_width),
            line_height: metrics.measure("Ay").map(|s| s.height).unwrap_or(0),
        }
    }
}

/// Greedy word wrap.
///
/// Words are split on any whitespace. Each word is appended to the current line
/// while the result measures at most `max_width`; otherwise the current line is
/// emitted and the word starts a new one. A single word wider than `max_width`
/// is emitted alone and is not split. A candidate that fails to measure is
/// treated as not fitting.
///
/// # Example
/// ```
/// use bible_clock_lib::layout::{wrap, MeasurementError};
/// use embedded_graphics::prelude::Size;
///
/// let one_px_per_char = |s: &str| Ok::<_, MeasurementError>(Size::new(s.len() as u32, 1));
/// assert_eq!(wrap("in the beginning", &one_px_per_char, 6), vec!["in the", "beginning"]);
/// ```
pub fn wrap<M: FontMetrics + ?Sized>(text: &str, metrics: &M, max_width: u32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };

        let fits = metrics
            .measure(&candidate)
            .map(|size| size.width <= max_width)
            .unwrap_or(false);

        if fits {
            current = candidate;
        } else {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current = word.to_string();
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Left edge that centres `measured_width` on a canvas of `canvas_width`.
///
/// Rounds toward negative infinity and is not clamped: content wider than the
/// canvas gets a negative x.
pub fn center_x(canvas_width: u32, measured_width: u32) -> i32 {
    center_offset(canvas_width, measured_width)
}

/// Offset that centres `measured` within `extent` along either axis, with the
/// same rounding as [`center_x`].
pub fn center_offset(extent: u32, measured: u32) -> i32 {
    (extent as i64 - measured as i64).div_euclid(2) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chars(text: &str) -> Result<Size, MeasurementError> {
        Ok(Size::new(text.chars().count() as u32, 1))
    }

    #[test]
    fn test_empty_text_yields_no_lines() {
        assert!(wrap("", &chars, 10).is_empty());
        assert!(wrap("   \n\t ", &chars, 10).is_empty());
        assert!(wrap("", &MonoMetrics::new(&ascii::FONT_9X15), 0).is_empty());
    }

    #[test]
    fn test_greedy_wrap() {
        let lines = wrap("For God so loved the world", &chars, 10);
        assert_eq!(lines, vec!["For God so", "loved the", "world"]);
    }

    #[test]
    fn test_exact_fit_is_accepted() {
        assert_eq!(wrap("abc def", &chars, 7), vec!["abc def"]);
        assert_eq!(wrap("abc def", &chars, 6), vec!["abc", "def"]);
    }

    #[test]
    fn test_overlong_word_is_emitted_alone() {
        let lines = wrap("a Mahershalalhashbaz b", &chars, 5);
        assert_eq!(lines, vec!["a", "Mahershalalhashbaz", "b"]);
    }

    #[test]
    fn test_overlong_first_word_does_not_emit_empty_line() {
        let lines = wrap("Mahershalalhashbaz is long", &chars, 7);
        assert_eq!(lines, vec!["Mahershalalhashbaz", "is long"]);
    }

    #[test]
    fn test_unmeasurable_word_gets_its_own_line() {
        let metrics = MonoMetrics::new(&ascii::FONT_6X10);
        let lines = wrap("be \u{7} still", &metrics, 400);
        assert_eq!(lines, vec!["be", "\u{7}", "still"]);
    }

    #[test]
    fn test_mono_metrics() {
        let metrics = MonoMetrics::new(&ascii::FONT_10X20);
        assert_eq!(metrics.measure("").unwrap(), Size::new(0, 20));
        assert_eq!(metrics.measure("09:05").unwrap(), Size::new(50, 20));
        assert_eq!(
            metrics.measure("a\tb"),
            Err(MeasurementError::MissingGlyph('\t'))
        );
    }

    #[test]
    fn test_wrapped_block_line_height() {
        let block = WrappedBlock::new("Jesus wept.", &MonoMetrics::new(&ascii::FONT_9X15), 360);
        assert_eq!(block.lines, vec!["Jesus wept."]);
        assert_eq!(block.line_height, 15);
    }

    #[test]
    fn test_center_x() {
        assert_eq!(center_x(400, 100), 150);
        assert_eq!(center_x(400, 101), 149);
        assert_eq!(center_x(400, 400), 0);
        assert_eq!(center_x(400, 450), -25);
        assert_eq!(center_x(400, 451), -26);
    }

    #[test]
    fn test_center_offset_on_the_vertical_axis() {
        // 15 px glyphs on a 300 px tall canvas
        assert_eq!(center_offset(300, 15), 142);
        assert_eq!(center_offset(300, 300), 0);
        assert_eq!(center_offset(10, 15), -3);
        assert_eq!(center_offset(300, 15), center_x(300, 15));
    }

    #[test]
    fn test_font_book_roles() {
        let fonts = FontBook::default();
        assert_eq!(fonts.font(FontRole::Clock).character_size, Size::new(10, 20));
        assert_eq!(fonts.font(FontRole::Verse).character_size, Size::new(9, 15));
    }

    proptest! {
        #[test]
        fn wrapped_lines_fit_and_preserve_words(
            words in prop::collection::vec("[a-zA-Z,.;']{1,14}", 0..40),
            seps in prop::collection::vec("[ \t\n]{1,3}", 40),
            width in 1u32..60,
        ) {
            let text: String = words
                .iter()
                .zip(seps.iter())
                .map(|(w, s)| format!("{w}{s}"))
                .collect();
            let lines = wrap(&text, &chars, width);

            for line in &lines {
                let fits = chars(line).unwrap().width <= width;
                prop_assert!(fits || !line.contains(' '), "line {:?} too wide", line);
            }
            prop_assert_eq!(lines.join(" "), words.join(" "));
        }
    }
}
