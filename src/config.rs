//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the bible-clock.toml file.
//! It provides a centralized way to configure the canvas, the render policy, the verse
//! table location, the decorative candidate sets and the time-sync listener.
//!
//! Every section is defaulted, so a file only needs the keys it wants to change.

use crate::frame::InkColor;
use crate::scheduler::RenderPolicy;
use crate::time_sync::SyncSettings;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_PATH: &str = "bible-clock.toml";

/// Application configuration loaded from bible-clock.toml
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Canvas size, palette and panel wiring
    pub display: DisplayConfig,
    /// When and how frames are redrawn
    pub render: RenderConfig,
    /// Verse table location and fixed texts
    pub content: ContentConfig,
    /// Decorative phrase/icon candidate sets
    pub decorations: DecorationsConfig,
    /// Wireless time-sync listener
    pub sync: SyncConfig,
}

/// Display and palette configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// E-ink display width in pixels
    pub width: u32,
    /// E-ink display height in pixels
    pub height: u32,
    /// Canvas fill before every frame
    pub background: InkColor,
    /// Colour of all text except the reference
    pub foreground: InkColor,
    /// Colour of the verse reference
    pub accent: InkColor,
    /// GPIO/SPI wiring, only used with the `hardware` feature
    pub hardware: HardwareConfig,
}

/// Panel wiring on the Raspberry Pi header (BCM numbering)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub gpio_chip: String,
    pub spi_device: String,
    /// Data/Command select
    pub dc_pin: u32,
    /// Panel reset
    pub rst_pin: u32,
    /// Panel busy line (active high on rev2.2+ modules)
    pub busy_pin: u32,
}

/// Which render loop variant to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderModeConfig {
    /// Redraw unconditionally on every tick
    Timed,
    /// Poll quickly, redraw only when something visible changed
    ChangeDetection,
}

/// Render scheduling configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    pub mode: RenderModeConfig,
    /// Tick length in timed mode
    pub interval_secs: u64,
    /// Poll length in change-detection mode
    pub poll_secs: u64,
    /// Timed mode: every Nth cycle is a full refresh, the rest are partial
    pub full_refresh_every: u64,
    /// Replace the verse with a large clock when the minute is `00`
    pub whole_hour_mode: bool,
    /// Draw the rotating phrase/icon pair
    pub decorations: bool,
}

/// Verse table and fixed text configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ContentConfig {
    /// JSON object mapping `"HH:MM"` to `"<reference> – <body>"`
    pub path: PathBuf,
    /// Separator between reference and body
    pub delimiter: String,
    /// Reference shown when no verse exists for the current minute
    pub missing_text: String,
    /// Header instruction text (top left)
    pub header_text: String,
    /// Decorative glyph run along the bottom edge
    pub footer_text: String,
}

/// Decorative candidate sets
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DecorationsConfig {
    pub phrases: Vec<String>,
    pub icons: Vec<String>,
}

/// Time-sync listener configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Socket address the listener binds
    pub bind_addr: String,
    /// Maximum bytes read from a client
    pub read_buffer: usize,
    /// Hard upper bound on a connection's lifetime
    pub grace_secs: u64,
    /// Program invoked as `<program> -s <time>` to set the clock
    pub clock_program: String,
    /// Prefix the clock program with `sudo`
    pub use_sudo: bool,
    /// Run after a forced teardown, `{peer}` is replaced with the peer address
    /// (e.g. `"bluetoothctl disconnect {peer}"`)
    pub disconnect_command: Option<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 400,  // Inky wHAT / Waveshare 4.2"
            height: 300, // Inky wHAT / Waveshare 4.2"
            background: InkColor::White,
            foreground: InkColor::Black,
            accent: InkColor::Red,
            hardware: HardwareConfig::default(),
        }
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            gpio_chip: "/dev/gpiochip0".to_string(),
            spi_device: "/dev/spidev0.0".to_string(),
            dc_pin: 25,
            rst_pin: 17,
            busy_pin: 24,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            mode: RenderModeConfig::Timed,
            interval_secs: 60,
            poll_secs: 5,
            full_refresh_every: 60, // one full refresh an hour at one tick a minute
            whole_hour_mode: false,
            decorations: true,
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("bible_verse.json"),
            delimiter: "–".to_string(),
            missing_text: "No verse set for this time.".to_string(),
            header_text: "connect bluetooth to sync".to_string(),
            footer_text: "+   +   +".to_string(),
        }
    }
}

impl Default for DecorationsConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            phrases: strings(&[
                "Be still",
                "Grace and peace",
                "Rejoice always",
                "Pray without ceasing",
                "Give thanks",
                "Walk in the light",
            ]),
            icons: strings(&["*", "+", "~", "<>", "o"]),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7070".to_string(),
            read_buffer: 1024,
            grace_secs: 15,
            clock_program: "date".to_string(),
            use_sudo: true,
            disconnect_command: None,
        }
    }
}

impl RenderConfig {
    /// Translate the file representation into the scheduler's policy.
    pub fn policy(&self) -> RenderPolicy {
        match self.mode {
            RenderModeConfig::Timed => RenderPolicy::Timed {
                interval: Duration::from_secs(self.interval_secs.max(1)),
                full_refresh_every: self.full_refresh_every.max(1),
            },
            RenderModeConfig::ChangeDetection => RenderPolicy::ChangeDetection {
                poll: Duration::from_secs(self.poll_secs.max(1)),
            },
        }
    }
}

impl SyncConfig {
    /// Listener settings derived from this section
    pub fn settings(&self) -> SyncSettings {
        SyncSettings {
            read_buffer: self.read_buffer.max(1),
            grace_period: Duration::from_secs(self.grace_secs),
            disconnect_command: self.disconnect_command.clone(),
        }
    }
}

impl Config {
    /// Load configuration from bible-clock.toml
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Invalid config file format in {}: {}", path.display(), e);
                    warn!("Using default configuration");
                    Self::default()
                }
            },
            Err(_) => {
                info!(
                    "No config file found at {}, using default configuration",
                    path.display()
                );
                Self::default()
            }
        }
    }

    /// Save current configuration to `path` as pretty TOML
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path.as_ref(), contents)?;
        info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.display.width, 400);
        assert_eq!(config.display.height, 300);
        assert_eq!(config.display.accent, InkColor::Red);
        assert_eq!(config.render.mode, RenderModeConfig::Timed);
        assert_eq!(config.render.full_refresh_every, 60);
        assert!(!config.render.whole_hour_mode);
        assert_eq!(config.content.delimiter, "–");
        assert_eq!(config.sync.grace_secs, 15);
        assert_eq!(config.sync.read_buffer, 1024);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let parsed: Config = toml::from_str(
            r#"
[render]
mode = "change_detection"
poll_secs = 2
whole_hour_mode = true

[sync]
disconnect_command = "bluetoothctl disconnect {peer}"
"#,
        )
        .unwrap();
        assert_eq!(parsed.render.mode, RenderModeConfig::ChangeDetection);
        assert_eq!(parsed.render.interval_secs, 60);
        assert!(parsed.render.whole_hour_mode);
        assert_eq!(parsed.display.width, 400);
        assert_eq!(parsed.sync.bind_addr, "0.0.0.0:7070");
        assert_eq!(
            parsed.sync.settings().disconnect_command.as_deref(),
            Some("bluetoothctl disconnect {peer}")
        );
        assert_eq!(
            parsed.render.policy(),
            RenderPolicy::ChangeDetection {
                poll: Duration::from_secs(2)
            }
        );
    }

    #[test]
    fn test_zero_refresh_cadence_is_clamped() {
        let render = RenderConfig {
            full_refresh_every: 0,
            ..RenderConfig::default()
        };
        assert_eq!(
            render.policy(),
            RenderPolicy::Timed {
                interval: Duration::from_secs(60),
                full_refresh_every: 1
            }
        );
    }

    #[test]
    fn test_load_nonexistent_file() {
        let config = Config::load_from_path("/nonexistent/path");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_invalid_file_falls_back() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "[display]\nwidth = \"wide\"\n").unwrap();
        assert_eq!(Config::load_from_path(file.path()), Config::default());
    }

    #[test]
    fn test_save_then_load() {
        let file = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.content.header_text = "sync me".to_string();
        config.save(file.path()).unwrap();
        assert_eq!(Config::load_from_path(file.path()), config);
    }
}
