//! Animation programs and the rules that turn a user's color choice into
//! concrete colors for an animation.

use std::fmt;
use std::str::FromStr;

use derive_more::{Display, Error};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::palette;

/// Program kinds a user can select for a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Program {
    Stop,
    Fixed,
    ColorRun,
    Fading,
    #[default]
    Random,
}

impl Program {
    pub const ALL: [Self; 5] = [
        Self::Stop,
        Self::Fixed,
        Self::ColorRun,
        Self::Fading,
        Self::Random,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Fixed => "fixed",
            Self::ColorRun => "color_run",
            Self::Fading => "fading",
            Self::Random => "random",
        }
    }

    /// Resolve the requested colors into a concrete [`Animation`].
    ///
    /// Missing or black entries are replaced by random non-black palette
    /// colors, except for the second fading color where black is a valid
    /// choice. Malformed lists are never rejected.
    pub fn resolve<R: Rng + ?Sized>(self, colors: &[Color], rng: &mut R) -> Animation {
        let first = colors.first().copied();
        let second = colors.get(1).copied();

        match self {
            Self::Stop => Animation::Stop,
            Self::Fixed => Animation::Fixed(non_black_or_random(first, rng)),
            Self::Random => match (first, second) {
                (Some(a), Some(b)) if !a.is_black() && !b.is_black() => {
                    Animation::RandomTwoColors(a, b)
                }
                _ => Animation::Random,
            },
            Self::ColorRun => {
                let a = non_black_or_random(first, rng);
                let b = non_black_or_random(second, rng);
                Animation::ColorRun(a, b)
            }
            Self::Fading => {
                let a = non_black_or_random(first, rng);
                let b = second.unwrap_or_else(|| palette::random_non_black(rng));
                Animation::Fading(a, b)
            }
        }
    }
}

fn non_black_or_random<R: Rng + ?Sized>(color: Option<Color>, rng: &mut R) -> Color {
    match color {
        Some(color) if !color.is_black() => color,
        _ => palette::random_non_black(rng),
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("unknown program '{name}'")]
pub struct UnknownProgram {
    pub name: String,
}

impl FromStr for Program {
    type Err = UnknownProgram;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|program| program.as_str() == s)
            .ok_or_else(|| UnknownProgram { name: s.to_string() })
    }
}

/// A program with its colors resolved, ready to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Animation {
    Stop,
    Fixed(Color),
    Random,
    RandomTwoColors(Color, Color),
    ColorRun(Color, Color),
    Fading(Color, Color),
}

impl Animation {
    /// Short label used in task descriptions and logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Fixed(_) => "fixed",
            Self::Random => "random",
            Self::RandomTwoColors(..) => "random_two_colors",
            Self::ColorRun(..) => "color_run",
            Self::Fading(..) => "fading",
        }
    }
}
