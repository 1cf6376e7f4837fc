use anyhow::{bail, Context, Result};
use ledgrid_matrix_lib::{uniform_layout, LedBlock};
use log::{debug, warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::pins::{GpioPin, PixelOrder, UnknownPin, UnknownPixelOrder};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.config.json";

/// Top-level sections a config file must contain
const REQUIRED_SECTIONS: [&str; 2] = ["strips", "blocks"];

/// Configurable log level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    #[must_use]
    pub const fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::Off,
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripConfig {
    #[serde(default = "default_identifier")]
    pub identifier: String,
    /// Number of LEDs on the strip
    #[serde(default = "default_count")]
    pub count: usize,
    /// Data pin, e.g. `board.D13`
    #[serde(default = "default_gpio")]
    pub gpio: String,
    /// Global brightness, 0.0 to 1.0
    #[serde(default = "default_brightness")]
    pub brightness: f32,
    #[serde(default = "default_bytes_per_pixel")]
    pub bytes_per_pixel: usize,
    /// Pixel order, e.g. `neopixel.GRB`
    #[serde(rename = "type", default = "default_strip_type")]
    pub strip_type: String,
    /// Pin enabling the strip's power supply
    #[serde(default = "default_power_gpio")]
    pub power_gpio: String,
}

fn default_identifier() -> String {
    "default".to_string()
}

const fn default_count() -> usize {
    100
}

fn default_gpio() -> String {
    "board.D13".to_string()
}

const fn default_brightness() -> f32 {
    1.0
}

const fn default_bytes_per_pixel() -> usize {
    3
}

fn default_strip_type() -> String {
    "neopixel.GRB".to_string()
}

fn default_power_gpio() -> String {
    "board.D18".to_string()
}

impl Default for StripConfig {
    fn default() -> Self {
        Self {
            identifier: default_identifier(),
            count: default_count(),
            gpio: default_gpio(),
            brightness: default_brightness(),
            bytes_per_pixel: default_bytes_per_pixel(),
            strip_type: default_strip_type(),
            power_gpio: default_power_gpio(),
        }
    }
}

impl StripConfig {
    pub fn data_pin(&self) -> Result<GpioPin, UnknownPin> {
        self.gpio.parse()
    }

    pub fn power_pin(&self) -> Result<GpioPin, UnknownPin> {
        self.power_gpio.parse()
    }

    pub fn pixel_order(&self) -> Result<PixelOrder, UnknownPixelOrder> {
        self.strip_type.parse()
    }

    /// Brightness scaled to the 0-255 range the LED pipeline uses
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn brightness_u8(&self) -> u8 {
        (self.brightness.clamp(0.0, 1.0) * 255.0).round() as u8
    }
}

/// One matrix of blocks on a strip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    #[serde(default = "default_identifier")]
    pub name: String,
    #[serde(default = "default_rows")]
    pub rows: usize,
    #[serde(default = "default_cols")]
    pub cols: usize,
    #[serde(default = "default_identifier")]
    pub strip_name: String,
    /// Per-cell `[start, end]` LED ranges, rows x cols. Split the strip evenly
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<Vec<[usize; 2]>>>,
}

const fn default_rows() -> usize {
    10
}

const fn default_cols() -> usize {
    5
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            name: default_identifier(),
            rows: default_rows(),
            cols: default_cols(),
            strip_name: default_identifier(),
            blocks: None,
        }
    }
}

impl MatrixConfig {
    /// Block grid for a strip with `led_count` LEDs.
    #[must_use]
    pub fn layout(&self, led_count: usize) -> Vec<Vec<LedBlock>> {
        match &self.blocks {
            Some(rows) => rows
                .iter()
                .map(|row| row.iter().copied().map(LedBlock::from).collect())
                .collect(),
            None => {
                // an unrepresentable grid yields no rows, which the matrix rejects
                let Some(cells) = self.rows.checked_mul(self.cols) else {
                    return Vec::new();
                };
                let per_block = led_count.checked_div(cells).unwrap_or(0);
                uniform_layout(self.rows, self.cols, per_block)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log_level: LogLevel,
    /// Address the HTTP control surface binds to
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    pub strips: Vec<StripConfig>,
    pub blocks: Vec<MatrixConfig>,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        for section in REQUIRED_SECTIONS {
            if value.get(section).is_none() {
                bail!("missing section '{section}'");
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_json(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!(
            "Config parsed: {} strips, {} matrices, log_level={:?}",
            config.strips.len(),
            config.blocks.len(),
            config.log_level
        );
        Ok(config)
    }

    /// Clamp values to valid ranges and drop duplicate strips
    pub fn validate(&mut self) {
        for strip in &mut self.strips {
            if !(0.0..=1.0).contains(&strip.brightness) {
                let clamped = if strip.brightness.is_nan() { 1.0 } else { strip.brightness.clamp(0.0, 1.0) };
                warn!("Clamping brightness of strip '{}' from {} to {clamped}", strip.identifier, strip.brightness);
                strip.brightness = clamped;
            }
        }

        let mut seen = std::collections::HashSet::new();
        self.strips.retain(|strip| {
            let first = seen.insert(strip.identifier.clone());
            if !first {
                warn!("Strip '{}' defined twice, keeping the first definition", strip.identifier);
            }
            first
        });
    }
}
