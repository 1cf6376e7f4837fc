//! Typed board pins and pixel orders.
//!
//! Configuration names pins and strip types with tokens like `board.D13` and
//! `neopixel.GRB`. Both resolve through the tables here.

use std::fmt;
use std::str::FromStr;

use derive_more::{Display, Error};
use log::info;
use smart_leds::RGB8;

const BOARD_PIN_PREFIX: &str = "board.D";

/// Highest digital pin number exposed on the header
pub const MAX_BOARD_PIN: u8 = 27;

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("unknown pin '{token}', expected {BOARD_PIN_PREFIX}1 to {BOARD_PIN_PREFIX}{MAX_BOARD_PIN}")]
pub struct UnknownPin {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("unknown strip type '{token}'")]
pub struct UnknownPixelOrder {
    pub token: String,
}

/// A digital header pin, `board.D1` to `board.D27`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpioPin(u8);

impl GpioPin {
    #[must_use]
    pub const fn number(self) -> u8 {
        self.0
    }
}

impl fmt::Display for GpioPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{BOARD_PIN_PREFIX}{}", self.0)
    }
}

impl FromStr for GpioPin {
    type Err = UnknownPin;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || UnknownPin { token: s.to_string() };
        let digits = s.strip_prefix(BOARD_PIN_PREFIX).ok_or_else(err)?;
        // Reject forms like "+5" or "07" that u8 parsing would accept
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) || digits.starts_with('0') {
            return Err(err());
        }
        match digits.parse::<u8>() {
            Ok(n) if (1..=MAX_BOARD_PIN).contains(&n) => Ok(Self(n)),
            _ => Err(err()),
        }
    }
}

/// Channel order the strip expects on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelOrder {
    Rgb,
    Grb,
    Rgbw,
    Grbw,
}

const PIXEL_ORDERS: [(&str, PixelOrder); 4] = [
    ("neopixel.RGB", PixelOrder::Rgb),
    ("neopixel.GRB", PixelOrder::Grb),
    ("neopixel.RGBW", PixelOrder::Rgbw),
    ("neopixel.GRBW", PixelOrder::Grbw),
];

impl PixelOrder {
    #[must_use]
    pub fn token(self) -> &'static str {
        PIXEL_ORDERS
            .iter()
            .find(|(_, order)| *order == self)
            .map_or("", |(token, _)| token)
    }

    /// Bytes per pixel on the wire
    #[must_use]
    pub const fn channels(self) -> usize {
        match self {
            Self::Rgb | Self::Grb => 3,
            Self::Rgbw | Self::Grbw => 4,
        }
    }

    /// Append one pixel in wire order. The white channel of RGBW strips is
    /// never driven.
    pub fn encode(self, pixel: RGB8, out: &mut Vec<u8>) {
        match self {
            Self::Rgb => out.extend_from_slice(&[pixel.r, pixel.g, pixel.b]),
            Self::Grb => out.extend_from_slice(&[pixel.g, pixel.r, pixel.b]),
            Self::Rgbw => out.extend_from_slice(&[pixel.r, pixel.g, pixel.b, 0]),
            Self::Grbw => out.extend_from_slice(&[pixel.g, pixel.r, pixel.b, 0]),
        }
    }
}

impl FromStr for PixelOrder {
    type Err = UnknownPixelOrder;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PIXEL_ORDERS
            .iter()
            .find(|(token, _)| *token == s)
            .map(|(_, order)| *order)
            .ok_or_else(|| UnknownPixelOrder { token: s.to_string() })
    }
}

/// Digital output that enables the strip's power supply
#[derive(Debug)]
pub struct PowerSwitch {
    pin: GpioPin,
    value: bool,
}

impl PowerSwitch {
    /// Claim `pin` as an output, initially low.
    #[must_use]
    pub const fn new(pin: GpioPin) -> Self {
        Self { pin, value: false }
    }

    #[must_use]
    pub const fn pin(&self) -> GpioPin {
        self.pin
    }

    #[must_use]
    pub const fn is_on(&self) -> bool {
        self.value
    }

    pub fn set(&mut self, value: bool) {
        if self.value != value {
            info!("Power pin {} -> {}", self.pin, if value { "high" } else { "low" });
        }
        self.value = value;
    }
}
