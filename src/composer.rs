//! # Frame Composition
//!
//! Turns one resolved minute into a positioned [`Frame`]. The layout mirrors the
//! physical clock face, top to bottom:
//!
//! ```text
//! connect bluetooth to sync                 09:05   <- header (y = 10)
//! ───────────────────────────────────────────────   <- separator (y = 40)
//!                  John 3:16                        <- reference, accent colour (y = 60)
//!       For God so loved the world, that he         <- verse, centred line by line
//!          gave his only begotten Son, ...
//!
//!               * Grace and peace *                 <- decoration
//!                    +   +   +                      <- footer (10 px above the edge)
//! ```
//!
//! In whole-hour mode the reference and verse are replaced by the time alone,
//! centred on the canvas, whenever the minute is `00`.
//!
//! Every centred element sits at `x = (canvas_width - measured_width) / 2`,
//! rounded down and never clamped. Composition is a pure function of its inputs.

use crate::config::Config;
use crate::frame::{ContentMode, DrawOp, Frame, InkColor, RuleOp, TextOp, Zone};
use crate::layout::{center_offset, center_x, FontBook, FontMetrics, FontRole, WrappedBlock};
use crate::{ContentEntry, DecorativeSelection, TimeKey};
use embedded_graphics::prelude::{Point, Size};
use log::warn;

const MARGIN: i32 = 10;
const SEPARATOR_Y: i32 = 40;
const SEPARATOR_THICKNESS: u32 = 2;
const REFERENCE_Y: i32 = 60;
/// Space between the reference and the first verse line
const VERSE_TOP_GAP: i32 = 10;
/// Extra space between verse lines
const LINE_GAP: i32 = 4;
/// Total horizontal space kept free around the verse
const VERSE_SIDE_MARGIN: u32 = 40;
/// Space between the decoration line and the footer
const DECORATION_GAP: i32 = 6;

/// Palette, fixed texts and content-mode switch for composed frames.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameStyle {
    pub background: InkColor,
    pub foreground: InkColor,
    pub accent: InkColor,
    pub header_text: String,
    pub footer_text: String,
    pub whole_hour_mode: bool,
}

impl Default for FrameStyle {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for FrameStyle {
    fn from(config: &Config) -> Self {
        Self {
            background: config.display.background,
            foreground: config.display.foreground,
            accent: config.display.accent,
            header_text: config.content.header_text.clone(),
            footer_text: config.content.footer_text.clone(),
            whole_hour_mode: config.render.whole_hour_mode,
        }
    }
}

/// Builds frames from resolved content.
#[derive(Clone)]
pub struct Composer {
    fonts: FontBook,
    style: FrameStyle,
}

impl Composer {
    pub fn new(fonts: FontBook, style: FrameStyle) -> Self {
        Self { fonts, style }
    }

    pub fn fonts(&self) -> &FontBook {
        &self.fonts
    }

    pub fn style(&self) -> &FrameStyle {
        &self.style
    }

    /// Lay out one frame.
    ///
    /// Text that fails to measure is left out of the frame (logged); everything
    /// else is still drawn.
    pub fn compose(
        &self,
        key: &TimeKey,
        content: &ContentEntry,
        decorative: Option<&DecorativeSelection>,
        canvas: Size,
    ) -> Frame {
        let mode = if self.style.whole_hour_mode && key.is_whole_hour() {
            ContentMode::WholeHour
        } else {
            ContentMode::Verse
        };

        let mut ops = Vec::new();
        self.header(key, canvas, &mut ops);
        ops.push(DrawOp::Rule(RuleOp {
            zone: Zone::Separator,
            y: SEPARATOR_Y,
            thickness: SEPARATOR_THICKNESS,
            color: self.style.foreground,
        }));

        match mode {
            ContentMode::Verse => self.verse(content, canvas, &mut ops),
            ContentMode::WholeHour => self.banner(key, canvas, &mut ops),
        }

        let footer_y = self.footer(canvas, &mut ops);
        if let Some(selection) = decorative {
            self.decoration(selection, canvas, footer_y, &mut ops);
        }

        Frame {
            size: canvas,
            background: self.style.background,
            mode,
            ops,
        }
    }

    fn measure(&self, role: FontRole, text: &str) -> Option<Size> {
        match self.fonts.metrics(role).measure(text) {
            Ok(size) => Some(size),
            Err(error) => {
                warn!("Skipping {:?} text {:?}: {}", role, text, error);
                None
            }
        }
    }

    fn push_text(
        &self,
        ops: &mut Vec<DrawOp>,
        zone: Zone,
        role: FontRole,
        text: &str,
        origin: Point,
        color: InkColor,
    ) {
        ops.push(DrawOp::Text(TextOp {
            zone,
            text: text.to_string(),
            origin,
            font: role,
            color,
        }));
    }

    /// Push `text` centred horizontally at `y`. Returns its size, or `None` when
    /// it could not be measured and was skipped.
    #[allow(clippy::too_many_arguments)]
    fn push_centered(
        &self,
        ops: &mut Vec<DrawOp>,
        zone: Zone,
        role: FontRole,
        text: &str,
        y: i32,
        color: InkColor,
        canvas: Size,
    ) -> Option<Size> {
        let size = self.measure(role, text)?;
        let origin = Point::new(center_x(canvas.width, size.width), y);
        self.push_text(ops, zone, role, text, origin, color);
        Some(size)
    }

    fn header(&self, key: &TimeKey, canvas: Size, ops: &mut Vec<DrawOp>) {
        let fg = self.style.foreground;
        if self.measure(FontRole::Header, &self.style.header_text).is_some() {
            let origin = Point::new(MARGIN, MARGIN);
            self.push_text(ops, Zone::Header, FontRole::Header, &self.style.header_text, origin, fg);
        }

        let time = key.to_string();
        if let Some(size) = self.measure(FontRole::Clock, &time) {
            let x = canvas.width as i32 - size.width as i32 - MARGIN;
            self.push_text(ops, Zone::Header, FontRole::Clock, &time, Point::new(x, MARGIN), fg);
        }
    }

    fn verse(&self, content: &ContentEntry, canvas: Size, ops: &mut Vec<DrawOp>) {
        let reference_height = self
            .push_centered(
                ops,
                Zone::Reference,
                FontRole::Reference,
                &content.reference,
                REFERENCE_Y,
                self.style.accent,
                canvas,
            )
            .map(|size| size.height)
            .unwrap_or(self.fonts.reference.character_size.height);

        let metrics = self.fonts.metrics(FontRole::Verse);
        let max_width = canvas.width.saturating_sub(VERSE_SIDE_MARGIN);
        let block = WrappedBlock::new(&content.body, &metrics, max_width);

        let top = REFERENCE_Y + reference_height as i32 + VERSE_TOP_GAP;
        let pitch = block.line_height as i32 + LINE_GAP;
        for (index, line) in block.lines.iter().enumerate() {
            // Skipped lines keep their slot so the rest of the verse does not shift
            let y = top + index as i32 * pitch;
            self.push_centered(ops, Zone::Verse, FontRole::Verse, line, y, self.style.foreground, canvas);
        }
    }

    fn banner(&self, key: &TimeKey, canvas: Size, ops: &mut Vec<DrawOp>) {
        let time = key.to_string();
        if let Some(size) = self.measure(FontRole::Banner, &time) {
            let y = center_offset(canvas.height, size.height);
            let origin = Point::new(center_x(canvas.width, size.width), y);
            self.push_text(ops, Zone::Clock, FontRole::Banner, &time, origin, self.style.foreground);
        }
    }

    /// Draw the footer run; returns its top edge.
    fn footer(&self, canvas: Size, ops: &mut Vec<DrawOp>) -> i32 {
        let height = self
            .measure(FontRole::Footer, &self.style.footer_text)
            .map(|size| size.height)
            .unwrap_or(self.fonts.footer.character_size.height);
        let y = canvas.height as i32 - height as i32 - MARGIN;
        self.push_centered(
            ops,
            Zone::Footer,
            FontRole::Footer,
            &self.style.footer_text,
            y,
            self.style.foreground,
            canvas,
        );
        y
    }

    fn decoration(
        &self,
        selection: &DecorativeSelection,
        canvas: Size,
        footer_y: i32,
        ops: &mut Vec<DrawOp>,
    ) {
        let text = [&selection.icon, &selection.phrase, &selection.icon]
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| part.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        if text.is_empty() {
            return;
        }
        let height = self.fonts.decoration.character_size.height as i32;
        let y = footer_y - DECORATION_GAP - height;
        self.push_centered(
            ops,
            Zone::Decoration,
            FontRole::Decoration,
            &text,
            y,
            self.style.foreground,
            canvas,
        );
    }
}
