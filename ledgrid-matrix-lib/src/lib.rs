//! Block matrix engine for addressable LED strips
//!
//! A matrix is a grid of blocks, each block a contiguous (possibly reversed)
//! range of LEDs on a strip that shows a single color. Users pick an
//! animation program per matrix; the engine runs it as a background tokio
//! task, guaranteeing at most one task per matrix, and pushes the resulting
//! block colors to the strip.
//!
//! The crate is hardware-agnostic: drivers plug in through [`LedStrip`].

pub mod animation;
pub mod block;
pub mod color;
pub mod matrix;
pub mod palette;
pub mod program;
pub mod registry;
pub mod strip;

pub use block::{LedBlock, StripWrite};
pub use color::Color;
pub use matrix::{uniform_layout, LayoutError, LedMatrix, MatrixState, ProgramTicket};
pub use palette::{ColorName, UnknownColorName};
pub use program::{Animation, Program, UnknownProgram};
pub use registry::{MatrixRegistry, UnknownMatrix};
pub use strip::{LedStrip, SharedStrip};

pub use rgb::RGB8;
