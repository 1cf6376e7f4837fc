//! 8-bit RGB color model used for block colors.
//!
//! Channels are stored as `u8`, so a [`Color`] can never leave `[0, 255]`.
//! Every derivation that goes through wider arithmetic (mixing, construction
//! from integers) clamps before narrowing.

use rand::Rng;
use rgb::RGB8;
use serde::{Deserialize, Serialize};

/// Sum of channels below which white text is used on top of a color
const CONTRAST_THRESHOLD: u16 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    #[serde(default)]
    pub red: u8,
    #[serde(default)]
    pub green: u8,
    #[serde(default)]
    pub blue: u8,
}

impl Color {
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE_TEXT: Self = Self::new(255, 255, 255);

    #[must_use]
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Build a color from arbitrary integers, clamping each channel to `[0, 255]`.
    #[must_use]
    pub fn clamped(red: i64, green: i64, blue: i64) -> Self {
        Self::new(clamp_channel(red), clamp_channel(green), clamp_channel(blue))
    }

    /// Uniform, independent sample of every channel.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::new(rng.gen(), rng.gen(), rng.gen())
    }

    #[must_use]
    pub const fn is_black(self) -> bool {
        self.red == 0 && self.green == 0 && self.blue == 0
    }

    #[must_use]
    pub const fn as_tuple(self) -> (u8, u8, u8) {
        (self.red, self.green, self.blue)
    }

    /// `#rrggbb` form used by the web UI.
    #[must_use]
    pub fn as_html(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }

    /// Text color that stays readable on top of this color: white on dark
    /// colors, black otherwise.
    #[must_use]
    pub fn text_color(self) -> Self {
        let sum = u16::from(self.red) + u16::from(self.green) + u16::from(self.blue);
        if sum < CONTRAST_THRESHOLD {
            Self::WHITE_TEXT
        } else {
            Self::BLACK
        }
    }

    #[must_use]
    pub fn text_as_html(self) -> String {
        self.text_color().as_html()
    }

    /// Linear mix towards `other`.
    ///
    /// `factor` is clamped to `[0, 1]`; 0 yields `self`, 1 yields `other`.
    /// Each channel is floored and then clamped.
    #[must_use]
    pub fn mix(self, other: Self, factor: f64) -> Self {
        let factor = if factor.is_nan() { 0.0 } else { factor.clamp(0.0, 1.0) };
        let channel = |from: u8, to: u8| {
            let from = f64::from(from);
            let value = (from + (f64::from(to) - from) * factor).floor();
            // value lies within [0, 255] up to rounding; clamp_channel handles the edges
            #[allow(clippy::cast_possible_truncation)]
            clamp_channel(value as i64)
        };
        Self::new(
            channel(self.red, other.red),
            channel(self.green, other.green),
            channel(self.blue, other.blue),
        )
    }
}

fn clamp_channel(value: i64) -> u8 {
    u8::try_from(value.clamp(0, 255)).unwrap_or(u8::MAX)
}

impl From<Color> for RGB8 {
    fn from(c: Color) -> Self {
        RGB8 { r: c.red, g: c.green, b: c.blue }
    }
}

impl From<RGB8> for Color {
    fn from(c: RGB8) -> Self {
        Color::new(c.r, c.g, c.b)
    }
}

impl From<(u8, u8, u8)> for Color {
    fn from((red, green, blue): (u8, u8, u8)) -> Self {
        Color::new(red, green, blue)
    }
}
