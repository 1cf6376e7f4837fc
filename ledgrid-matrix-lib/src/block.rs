//! A block is a contiguous run of LEDs on a strip that always shows one color.
//!
//! `start` can be greater than `end`, meaning the block is wired in reverse
//! on the strip. The physical range is always `abs_start()..abs_start() + led_count()`.

use serde::{Deserialize, Serialize};

use crate::color::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedBlock {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub color: Color,
}

/// One range write for a strip: `length` LEDs starting at `start` set to `color`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripWrite {
    pub color: Color,
    pub start: usize,
    pub length: usize,
}

impl LedBlock {
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            color: Color::BLACK,
        }
    }

    #[must_use]
    pub const fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    #[must_use]
    pub const fn inverted(&self) -> bool {
        self.start > self.end
    }

    #[must_use]
    pub fn abs_start(&self) -> usize {
        self.start.min(self.end)
    }

    #[must_use]
    pub const fn led_count(&self) -> usize {
        self.start.abs_diff(self.end)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// One past the highest physical index this block touches.
    #[must_use]
    pub fn abs_end(&self) -> usize {
        self.start.max(self.end)
    }

    #[must_use]
    pub fn strip_write(&self) -> StripWrite {
        StripWrite {
            color: self.color,
            start: self.abs_start(),
            length: self.led_count(),
        }
    }
}

impl From<(usize, usize)> for LedBlock {
    fn from((start, end): (usize, usize)) -> Self {
        Self::new(start, end)
    }
}

impl From<[usize; 2]> for LedBlock {
    fn from([start, end]: [usize; 2]) -> Self {
        Self::new(start, end)
    }
}

/// Row-major walk over every block of a grid.
pub fn row_major(grid: &[Vec<LedBlock>]) -> impl Iterator<Item = &LedBlock> {
    grid.iter().flatten()
}

/// Mutable row-major walk over every block of a grid.
pub fn row_major_mut(grid: &mut [Vec<LedBlock>]) -> impl Iterator<Item = &mut LedBlock> {
    grid.iter_mut().flatten()
}
