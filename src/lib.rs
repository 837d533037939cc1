//! # Bible Clock Core Library
//!
//! This library holds everything the clock needs to turn the current minute into a
//! picture on a slow-refresh e-ink panel, and to let a phone correct the system
//! time over a short-range link. It targets a Raspberry Pi driving a 400×300
//! tri-colour (black/white/red) panel, where every redraw is slow and visible.
//!
//! ## Design Philosophy
//!
//! ### Minute-Keyed Content
//! - **One key per minute**: the wall clock is reduced to a [`TimeKey`] (`"HH:MM"`)
//!   which is the only lookup key into the verse table
//! - **Live edits**: the verse table is re-read every render cycle, so editing the
//!   JSON file on the device shows up on the next tick without a restart
//! - **Never blank**: a missing or broken table degrades to a sentinel entry instead
//!   of stopping the render loop
//!
//! ### Redraw Budget
//! E-ink refreshes take seconds and flash the panel. The scheduler either redraws on a
//! fixed tick (with a periodic full refresh to clear ghosting) or only when the
//! minute or the decorative selection actually changed.
//!
//! ### Data Flow
//! 1. **Resolve**: content store → [`TimeKey`] lookup → [`ContentEntry`]
//! 2. **Compose**: entry + [`DecorativeSelection`] → positioned [`frame::Frame`]
//! 3. **Present**: frame → display collaborator (full or partial refresh)
//! 4. **Sync** (independent): wireless link → time string → system clock
//!
//! ## Core Types
//! - [`TimeKey`]: minute-granular clock key
//! - [`ContentEntry`]: a reference/body pair resolved for one key
//! - [`DecorativeSelection`]: the rotating phrase/icon pair

use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::fmt;

// Module declarations
pub mod clock;
pub mod composer;
pub mod config;
pub mod content;
pub mod decor;
pub mod display;
pub mod epd4in2b_v2;
pub mod frame;
pub mod layout;
pub mod scheduler;
pub mod time_sync;

/// Minute-granular wall-clock key, rendered as `"HH:MM"` (24-hour, zero padded).
///
/// Seconds and below are discarded, so every instant within the same minute
/// produces the same key.
///
/// # Example
/// ```
/// use bible_clock_lib::TimeKey;
/// use chrono::NaiveTime;
///
/// let key = TimeKey::from_time(&NaiveTime::from_hms_opt(9, 5, 59).unwrap());
/// assert_eq!(key.to_string(), "09:05");
/// assert!(!key.is_whole_hour());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeKey {
    hour: u8,
    minute: u8,
}

impl TimeKey {
    /// Build a key from anything carrying a time of day, truncating to the minute.
    pub fn from_time<T: Timelike>(time: &T) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    /// Parse a strict `"HH:MM"` key. Returns `None` for anything else.
    pub fn parse(text: &str) -> Option<Self> {
        let bytes = text.as_bytes();
        if bytes.len() != 5 || bytes[2] != b':' {
            return None;
        }
        let digits = |s: &str| -> Option<u8> {
            if s.bytes().all(|b| b.is_ascii_digit()) {
                s.parse().ok()
            } else {
                None
            }
        };
        let hour = digits(text.get(0..2)?)?;
        let minute = digits(text.get(3..5)?)?;
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// True when the minutes field is `"00"`.
    pub fn is_whole_hour(&self) -> bool {
        self.minute == 0
    }
}

impl fmt::Display for TimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// A resolved verse: short reference label plus free text to be wrapped.
///
/// Built fresh every render cycle from the live content store and never
/// persisted.
///
/// # Example
/// ```
/// use bible_clock_lib::ContentEntry;
///
/// let entry = ContentEntry::parse("John 3:16 – For God so loved...", "–");
/// assert_eq!(entry.reference, "John 3:16");
/// assert_eq!(entry.body, "For God so loved...");
///
/// let bare = ContentEntry::parse("Selah", "–");
/// assert_eq!(bare.reference, "Selah");
/// assert!(bare.body.is_empty());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEntry {
    /// Book/chapter/verse label, drawn in the accent colour
    pub reference: String,
    /// Verse text, word-wrapped to the canvas
    pub body: String,
}

impl ContentEntry {
    /// Split a raw store value on the first `delimiter`.
    ///
    /// Both halves are trimmed. Without a delimiter the whole raw string becomes
    /// the reference and the body is empty.
    pub fn parse(raw: &str, delimiter: &str) -> Self {
        match raw.split_once(delimiter) {
            Some((reference, body)) if !delimiter.is_empty() => Self {
                reference: reference.trim().to_string(),
                body: body.trim().to_string(),
            },
            _ => Self {
                reference: raw.to_string(),
                body: String::new(),
            },
        }
    }
}

/// Rotating decorative pair drawn above the footer.
///
/// Phrase and icon are drawn independently from two fixed candidate sets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecorativeSelection {
    pub phrase: String,
    pub icon: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn test_time_key_is_zero_padded() {
        let key = TimeKey::from_time(&NaiveTime::from_hms_opt(7, 3, 0).unwrap());
        assert_eq!(key.to_string(), "07:03");
        assert_eq!(key.to_string().len(), 5);
    }

    #[test]
    fn test_time_key_truncates_seconds() {
        let a = TimeKey::from_time(&NaiveTime::from_hms_opt(23, 59, 0).unwrap());
        let b = TimeKey::from_time(&NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn test_time_key_parse() {
        assert_eq!(TimeKey::parse("14:00").map(|k| k.to_string()), Some("14:00".into()));
        assert!(TimeKey::parse("14:00").unwrap().is_whole_hour());
        assert!(TimeKey::parse("9:05").is_none());
        assert!(TimeKey::parse("24:00").is_none());
        assert!(TimeKey::parse("12:60").is_none());
        assert!(TimeKey::parse("+1:05").is_none());
        assert!(TimeKey::parse("12-05").is_none());
    }

    #[test]
    fn test_content_entry_splits_on_first_delimiter() {
        let entry = ContentEntry::parse("Ps 23:1 – The Lord – my shepherd", "–");
        assert_eq!(entry.reference, "Ps 23:1");
        assert_eq!(entry.body, "The Lord – my shepherd");
    }

    #[test]
    fn test_content_entry_without_delimiter_keeps_raw_reference() {
        let entry = ContentEntry::parse("No verse set for this time.", "–");
        assert_eq!(entry.reference, "No verse set for this time.");
        assert_eq!(entry.body, "");
    }
}
