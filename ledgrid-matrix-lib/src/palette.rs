//! Closed set of named colors offered by the control surface.

use std::fmt;
use std::str::FromStr;

use derive_more::{Display, Error};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::color::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorName {
    #[default]
    Black,
    White,

    LightRed,
    Red,
    DarkRed,

    Blue,
    DarkBlue,

    Green,
    LightGreen,
    DarkGreen,

    Yellow,
    LightYellow,
    DarkYellow,

    Cyan,
    LightCyan,
    DarkCyan,

    Magenta,
    LightMagenta,
}

impl ColorName {
    pub const ALL: [Self; 18] = [
        Self::Black,
        Self::White,
        Self::LightRed,
        Self::Red,
        Self::DarkRed,
        Self::Blue,
        Self::DarkBlue,
        Self::Green,
        Self::LightGreen,
        Self::DarkGreen,
        Self::Yellow,
        Self::LightYellow,
        Self::DarkYellow,
        Self::Cyan,
        Self::LightCyan,
        Self::DarkCyan,
        Self::Magenta,
        Self::LightMagenta,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Black => "black",
            Self::White => "white",
            Self::LightRed => "light_red",
            Self::Red => "red",
            Self::DarkRed => "dark_red",
            Self::Blue => "blue",
            Self::DarkBlue => "dark_blue",
            Self::Green => "green",
            Self::LightGreen => "light_green",
            Self::DarkGreen => "dark_green",
            Self::Yellow => "yellow",
            Self::LightYellow => "light_yellow",
            Self::DarkYellow => "dark_yellow",
            Self::Cyan => "cyan",
            Self::LightCyan => "light_cyan",
            Self::DarkCyan => "dark_cyan",
            Self::Magenta => "magenta",
            Self::LightMagenta => "light_magenta",
        }
    }

    /// The fixed color behind this name.
    #[must_use]
    pub const fn color(self) -> Color {
        match self {
            Self::Black => Color::new(0, 0, 0),
            Self::White => Color::new(100, 100, 100),
            Self::LightRed => Color::new(255, 0, 0),
            Self::Red => Color::new(160, 0, 0),
            Self::DarkRed => Color::new(80, 0, 0),
            Self::Blue => Color::new(0, 0, 255),
            Self::DarkBlue => Color::new(0, 0, 139),
            Self::Green => Color::new(0, 160, 0),
            Self::LightGreen => Color::new(0, 255, 0),
            Self::DarkGreen => Color::new(0, 80, 0),
            Self::Yellow => Color::new(160, 160, 0),
            Self::LightYellow => Color::new(255, 255, 0),
            Self::DarkYellow => Color::new(139, 139, 0),
            Self::Cyan => Color::new(0, 255, 255),
            Self::LightCyan => Color::new(224, 255, 255),
            Self::DarkCyan => Color::new(0, 139, 139),
            Self::Magenta => Color::new(160, 0, 160),
            Self::LightMagenta => Color::new(255, 0, 255),
        }
    }
}

impl fmt::Display for ColorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("unknown color name '{name}'")]
pub struct UnknownColorName {
    pub name: String,
}

impl FromStr for ColorName {
    type Err = UnknownColorName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownColorName { name: s.to_string() })
    }
}

/// Look up the color for a palette name.
#[must_use]
pub const fn lookup(name: ColorName) -> Color {
    name.color()
}

/// Uniform pick from the palette, resampling while the draw equals `exclude`.
///
/// The caller must make sure the palette holds at least one color other than
/// `exclude`; this loop does not terminate otherwise.
pub fn random<R: Rng + ?Sized>(rng: &mut R, exclude: Option<Color>) -> Color {
    loop {
        let color = ColorName::ALL
            .choose(rng)
            .map_or(Color::BLACK, |name| name.color());
        if exclude != Some(color) {
            return color;
        }
    }
}

/// Random palette color that is never black.
pub fn random_non_black<R: Rng + ?Sized>(rng: &mut R) -> Color {
    random(rng, Some(Color::BLACK))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_names_round_trip_through_from_str() {
        for name in ColorName::ALL {
            assert_eq!(name.as_str().parse::<ColorName>(), Ok(name));
        }
    }

    #[test]
    fn test_unknown_name() {
        let err = "purple".parse::<ColorName>().unwrap_err();
        assert_eq!(err.to_string(), "unknown color name 'purple'");
    }

    #[test]
    fn test_palette_values_are_distinct() {
        let values: HashSet<Color> = ColorName::ALL.iter().map(|n| n.color()).collect();
        assert_eq!(values.len(), ColorName::ALL.len());
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup(ColorName::Black), Color::BLACK);
        assert_eq!(lookup(ColorName::White), Color::new(100, 100, 100));
        assert_eq!(lookup(ColorName::LightCyan), Color::new(224, 255, 255));
    }

    #[test]
    fn test_display_matches_wire_name() {
        assert_eq!(ColorName::DarkYellow.to_string(), "dark_yellow");
    }

    #[test]
    fn test_random_never_returns_excluded() {
        let mut rng = StdRng::seed_from_u64(42);
        let excluded = ColorName::Cyan.color();
        for _ in 0..10_000 {
            assert_ne!(random(&mut rng, Some(excluded)), excluded);
        }
    }

    #[test]
    fn test_random_non_black() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..10_000 {
            assert!(!random_non_black(&mut rng).is_black());
        }
    }

    #[test]
    fn test_random_covers_palette() {
        let mut rng = StdRng::seed_from_u64(3);
        let seen: HashSet<Color> = (0..5_000).map(|_| random(&mut rng, None)).collect();
        assert_eq!(seen.len(), ColorName::ALL.len());
    }
}
