//! Drawing instructions for one display update.
//!
//! A [`Frame`] is plain data: a background colour and an ordered list of
//! positioned text runs and rules. It is built by the composer, compared by
//! tests, and rasterised onto any `embedded-graphics` draw target whose colour
//! is [`InkColor`].

use crate::layout::{FontBook, FontRole};
use embedded_graphics::{
    mono_font::MonoTextStyle,
    pixelcolor::PixelColor,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};
use serde::{Deserialize, Serialize};

/// The three inks of a black/white/red e-paper panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InkColor {
    White,
    Black,
    Red,
}

impl PixelColor for InkColor {
    type Raw = ();
}

/// Layout zone a drawing operation belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Zone {
    Header,
    Separator,
    Reference,
    Verse,
    /// Large time display used in whole-hour mode
    Clock,
    Decoration,
    Footer,
}

/// Which content branch produced the middle of the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentMode {
    /// Reference plus wrapped verse
    Verse,
    /// Single large time string
    WholeHour,
}

/// A run of text with its top-left corner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextOp {
    pub zone: Zone,
    pub text: String,
    pub origin: Point,
    pub font: FontRole,
    pub color: InkColor,
}

/// A full-width horizontal rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleOp {
    pub zone: Zone,
    pub y: i32,
    pub thickness: u32,
    pub color: InkColor,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DrawOp {
    Text(TextOp),
    Rule(RuleOp),
}

/// Fully composed drawing instructions for one display update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub size: Size,
    pub background: InkColor,
    pub mode: ContentMode,
    pub ops: Vec<DrawOp>,
}

impl Frame {
    /// Text runs belonging to `zone`, in drawing order.
    pub fn texts_in(&self, zone: Zone) -> impl Iterator<Item = &TextOp> + '_ {
        self.ops.iter().filter_map(move |op| match op {
            DrawOp::Text(text) if text.zone == zone => Some(text),
            _ => None,
        })
    }

    /// Rules belonging to `zone`, in drawing order.
    pub fn rules_in(&self, zone: Zone) -> impl Iterator<Item = &RuleOp> + '_ {
        self.ops.iter().filter_map(move |op| match op {
            DrawOp::Rule(rule) if rule.zone == zone => Some(rule),
            _ => None,
        })
    }

    /// Rasterise the frame: clear to the background, then draw every op in order.
    pub fn draw<D>(&self, target: &mut D, fonts: &FontBook) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = InkColor>,
    {
        target.clear(self.background)?;

        for op in &self.ops {
            match op {
                DrawOp::Text(text) => {
                    let style = MonoTextStyle::new(fonts.font(text.font), text.color);
                    Text::with_baseline(&text.text, text.origin, style, Baseline::Top)
                        .draw(target)?;
                }
                DrawOp::Rule(rule) => {
                    Rectangle::new(
                        Point::new(0, rule.y),
                        Size::new(self.size.width, rule.thickness),
                    )
                    .into_styled(PrimitiveStyle::with_fill(rule.color))
                    .draw(target)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epd4in2b_v2::DisplayBuffer;

    fn sample_frame() -> Frame {
        Frame {
            size: Size::new(64, 32),
            background: InkColor::White,
            mode: ContentMode::Verse,
            ops: vec![
                DrawOp::Text(TextOp {
                    zone: Zone::Reference,
                    text: "Ps".to_string(),
                    origin: Point::new(2, 2),
                    font: FontRole::Reference,
                    color: InkColor::Red,
                }),
                DrawOp::Rule(RuleOp {
                    zone: Zone::Separator,
                    y: 28,
                    thickness: 2,
                    color: InkColor::Black,
                }),
            ],
        }
    }

    #[test]
    fn test_texts_in_filters_by_zone() {
        let frame = sample_frame();
        assert_eq!(frame.texts_in(Zone::Reference).count(), 1);
        assert_eq!(frame.texts_in(Zone::Verse).count(), 0);
        // Rules are not text runs
        assert_eq!(frame.texts_in(Zone::Separator).count(), 0);
    }

    #[test]
    fn test_rules_in_filters_by_zone() {
        let frame = sample_frame();
        let rules: Vec<&RuleOp> = frame.rules_in(Zone::Separator).collect();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].y, 28);
        assert_eq!(frame.rules_in(Zone::Reference).count(), 0);
    }

    #[test]
    fn test_draw_paints_rule_and_text() {
        let frame = sample_frame();
        let mut buffer = DisplayBuffer::new(64, 32);
        frame.draw(&mut buffer, &FontBook::default()).unwrap();

        // Rule spans the full width on rows 28 and 29
        for x in 0..64 {
            assert_eq!(buffer.pixel(x, 28), Some(InkColor::Black));
            assert_eq!(buffer.pixel(x, 29), Some(InkColor::Black));
        }
        assert_eq!(buffer.pixel(0, 30), Some(InkColor::White));

        // Reference glyphs are red and stay inside their cells
        let red = (0..64)
            .flat_map(|x| (0..28).map(move |y| (x, y)))
            .filter(|&(x, y)| buffer.pixel(x, y) == Some(InkColor::Red))
            .count();
        assert!(red > 0, "reference text was not drawn");
        assert_eq!(buffer.pixel(40, 10), Some(InkColor::White));
    }

    #[test]
    fn test_draw_clears_previous_content() {
        let mut buffer = DisplayBuffer::new(16, 16);
        buffer.clear(InkColor::Black);
        let blank = Frame {
            size: Size::new(16, 16),
            background: InkColor::White,
            mode: ContentMode::Verse,
            ops: Vec::new(),
        };
        blank.draw(&mut buffer, &FontBook::default()).unwrap();
        assert!((0..16).all(|x| buffer.pixel(x, 7) == Some(InkColor::White)));
    }
}
