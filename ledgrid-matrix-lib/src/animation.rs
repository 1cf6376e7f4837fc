//! Frame producers for every program.
//!
//! Each looping animation checks the matrix running flag at the top of every
//! iteration and clears it when it exits. Frames are pushed to the strip
//! right after the blocks are updated.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::time::sleep;

use crate::block::{row_major_mut, LedBlock};
use crate::color::Color;
use crate::matrix::LedMatrix;
use crate::palette;
use crate::program::Animation;

/// Tick of the pure random program
pub const RANDOM_TICK: Duration = Duration::from_millis(50);

/// Ticks between two block changes of the pure random program (~1s)
pub const RANDOM_RESELECT_TICKS: u32 = 20;

/// Delay between toggles of the two-color random program
pub const TWO_COLOR_TICK: Duration = Duration::from_millis(500);

/// Delay between diagonal steps of the color run
pub const COLOR_RUN_TICK: Duration = Duration::from_millis(500);

/// Delay between fading sub-steps
pub const FADING_TICK: Duration = Duration::from_millis(200);

/// Phase offsets of one fading cycle
pub const FADING_PHASES: usize = 10;

/// Interpolation steps between two fading phases
pub const FADING_SUBSTEPS: usize = 10;

pub(crate) async fn run(matrix: Arc<LedMatrix>, animation: Animation, mut rng: StdRng) {
    debug!("Matrix '{}': task {} started", matrix.name(), animation.label());
    match animation {
        Animation::Stop => run_stop(&matrix).await,
        Animation::Fixed(color) => run_fixed(&matrix, color),
        Animation::Random => run_random(&matrix, &mut rng).await,
        Animation::RandomTwoColors(a, b) => run_random_two_colors(&matrix, a, b, &mut rng).await,
        Animation::ColorRun(a, b) => run_color_run(&matrix, a, b).await,
        Animation::Fading(a, b) => run_fading(&matrix, a, b).await,
    }
    debug!("Matrix '{}': task {} finished", matrix.name(), animation.label());
}

fn paint_all(matrix: &LedMatrix, color: Color) {
    matrix.with_blocks_mut(|grid| {
        for block in row_major_mut(grid) {
            block.color = color;
        }
    });
}

async fn run_stop(matrix: &LedMatrix) {
    paint_all(matrix, Color::BLACK);
    matrix.update_strip();
    matrix.set_running(false);
    matrix.power_off_strip().await;
}

fn run_fixed(matrix: &LedMatrix, color: Color) {
    paint_all(matrix, color);
    matrix.update_strip();
    matrix.set_running(false);
}

/// Pick a random row, then a random block within it.
fn random_block<'a>(grid: &'a mut [Vec<LedBlock>], rng: &mut StdRng) -> Option<&'a mut LedBlock> {
    grid.choose_mut(rng)?.choose_mut(rng)
}

async fn run_random(matrix: &LedMatrix, rng: &mut StdRng) {
    let mut tick = 0;
    while matrix.is_running() {
        if tick == 0 {
            let changed = matrix.with_blocks_mut(|grid| {
                let block = random_block(grid, rng)?;
                block.color = palette::random(rng, Some(block.color));
                Some(*block)
            });
            if let Some(block) = changed {
                matrix.update_block(&block);
            }
        }
        sleep(RANDOM_TICK).await;
        tick = (tick + 1) % RANDOM_RESELECT_TICKS;
    }
    matrix.set_running(false);
}

async fn run_random_two_colors(matrix: &LedMatrix, a: Color, b: Color, rng: &mut StdRng) {
    let (rows, cols) = (matrix.rows(), matrix.cols());
    for row in 0..rows {
        for col in 0..cols {
            let color = if rng.gen_bool(0.5) { a } else { b };
            matrix.with_blocks_mut(|grid| grid[row][col].color = color);
            matrix.update_strip();
        }
    }

    while matrix.is_running() {
        let changed = matrix.with_blocks_mut(|grid| {
            let block = random_block(grid, rng)?;
            block.color = if block.color == a { b } else { a };
            Some(*block)
        });
        if let Some(block) = changed {
            matrix.update_block(&block);
        }
        sleep(TWO_COLOR_TICK).await;
    }
    matrix.set_running(false);
}

/// Cells `(row, col)` with `row + col == sum`.
pub fn diagonal_cells(rows: usize, cols: usize, sum: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..rows).filter_map(move |row| {
        sum.checked_sub(row)
            .filter(|&col| col < cols)
            .map(|col| (row, col))
    })
}

fn paint_diagonal(grid: &mut [Vec<LedBlock>], sum: usize, color: Color) {
    let rows = grid.len();
    let cols = grid.first().map_or(0, Vec::len);
    for (row, col) in diagonal_cells(rows, cols, sum) {
        grid[row][col].color = color;
    }
}

async fn run_color_run(matrix: &LedMatrix, a: Color, b: Color) {
    let diagonals = matrix.rows() + matrix.cols() - 1;
    let half = diagonals / 2;

    for index in 0..half {
        if !matrix.is_running() {
            return;
        }
        matrix.with_blocks_mut(|grid| paint_diagonal(grid, index, a));
        matrix.update_strip();
        sleep(COLOR_RUN_TICK).await;
    }

    'cycle: while matrix.is_running() {
        for index in 0..diagonals {
            if !matrix.is_running() {
                break 'cycle;
            }
            matrix.with_blocks_mut(|grid| {
                paint_diagonal(grid, (index + half) % diagonals, a);
                paint_diagonal(grid, index, b);
            });
            matrix.update_strip();
            sleep(COLOR_RUN_TICK).await;
        }
    }
    matrix.set_running(false);
}

/// Distance between `start` and `end` on a ring of `size` positions, taking
/// the shorter way round.
#[must_use]
pub const fn circular_distance(start: usize, end: usize, size: usize) -> usize {
    let (a, b) = if start < end {
        (end.abs_diff(start), (start + size).abs_diff(end))
    } else {
        ((size + end).abs_diff(start), start.abs_diff(end))
    };
    if a < b {
        a
    } else {
        b
    }
}

/// Per-row targets of one fading phase.
#[must_use]
pub fn fading_targets(phase: usize, rows: usize) -> Vec<f64> {
    (0..rows)
        .map(|row| {
            // distances are bounded by the row count
            #[allow(clippy::cast_precision_loss)]
            let distance = circular_distance(phase, row, rows) as f64;
            distance * 2.0
        })
        .collect()
}

/// Mix factor of `row` at `step` of [`FADING_SUBSTEPS`], normalized by the row
/// count. The row moves away from the next row's target by `step` tenths of
/// their difference.
#[must_use]
pub fn fading_factor(targets: &[f64], row: usize, step: usize) -> f64 {
    let rows = targets.len();
    if rows == 0 {
        return 0.0;
    }
    let own = targets[row];
    let next = targets[(row + 1) % rows];
    #[allow(clippy::cast_precision_loss)]
    let fraction = step as f64 / FADING_SUBSTEPS as f64;
    #[allow(clippy::cast_precision_loss)]
    let rows = rows as f64;
    (own - fraction * (next - own)) / rows
}

async fn run_fading(matrix: &LedMatrix, a: Color, b: Color) {
    let rows = matrix.rows();

    'cycle: while matrix.is_running() {
        for phase in 0..FADING_PHASES {
            let targets = fading_targets(phase, rows);
            for step in 0..FADING_SUBSTEPS {
                if !matrix.is_running() {
                    break 'cycle;
                }
                matrix.with_blocks_mut(|grid| {
                    for (row, cells) in grid.iter_mut().enumerate() {
                        let color = a.mix(b, fading_factor(&targets, row, step));
                        for block in cells {
                            block.color = color;
                        }
                    }
                });
                matrix.update_strip();
                sleep(FADING_TICK).await;
            }
        }
    }
    matrix.set_running(false);
}
