//! A matrix is a rows x cols grid of [`LedBlock`]s driven by at most one
//! animation task at a time.
//!
//! Task replacement protocol (see [`LedMatrix::run_program`]):
//! 1. clear the running flag and give the current task up to
//!    `STOP_POLL_ATTEMPTS * STOP_POLL_INTERVAL` to notice and exit,
//! 2. abort it unconditionally and join it,
//! 3. power the strip on if the matrix was idle,
//! 4. set the running flag and spawn the new task.
//!
//! Replacements are serialized per matrix, so two requests for the same
//! matrix never interleave and only one task can ever write to the blocks.
//! Every request draws a [`ProgramTicket`] when it arrives; a request whose
//! ticket is older than the last one applied is dropped, so the most recent
//! request wins even when the callers reach the matrix out of order.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use derive_more::{Display, Error};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::task::JoinHandle;

use crate::animation;
use crate::block::{row_major, LedBlock, StripWrite};
use crate::color::Color;
use crate::program::{Animation, Program};
use crate::strip::SharedStrip;

/// Interval between checks whether the previous task has exited
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Checks before the previous task is aborted (10 x 100ms = 1s)
pub const STOP_POLL_ATTEMPTS: u32 = 10;

/// Block grid does not fit the matrix it was configured for
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum LayoutError {
    #[display("matrix '{matrix}' must have at least one row and one column")]
    EmptyGrid { matrix: String },
    #[display("matrix '{matrix}' declares {expected} rows but its layout has {actual}")]
    RowCount {
        matrix: String,
        expected: usize,
        actual: usize,
    },
    #[display("matrix '{matrix}' row {row} has {actual} blocks, expected {expected}")]
    ColumnCount {
        matrix: String,
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[display("matrix '{matrix}' block ({row}, {col}) reaches LED {end} but the strip has {led_count} LEDs")]
    BlockOutOfRange {
        matrix: String,
        row: usize,
        col: usize,
        end: usize,
        led_count: usize,
    },
}

/// Observable program state of a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MatrixState {
    /// No task owns the blocks
    #[display("idle")]
    Idle,
    /// A task is producing frames
    #[display("running")]
    Running,
    /// The running flag is cleared but the last task has not exited yet
    #[display("stopping")]
    Stopping,
}

/// Arrival order of a program request on one matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProgramTicket(u64);

struct CurrentTask {
    label: String,
    handle: JoinHandle<()>,
}

pub struct LedMatrix {
    name: String,
    rows: usize,
    cols: usize,
    blocks: Mutex<Vec<Vec<LedBlock>>>,
    strip: Option<SharedStrip>,
    running: AtomicBool,
    current: Mutex<Option<CurrentTask>>,
    /// Serializes task replacement; held across the whole protocol
    replace_lock: tokio::sync::Mutex<()>,
    task_serial: AtomicU64,
    request_serial: AtomicU64,
    /// Last ticket that installed a task; only touched under `replace_lock`
    applied_ticket: AtomicU64,
}

impl LedMatrix {
    /// Build a matrix, checking the layout against `rows` x `cols` and, when a
    /// strip is attached, against the strip's LED count.
    pub fn new(
        name: impl Into<String>,
        rows: usize,
        cols: usize,
        blocks: Vec<Vec<LedBlock>>,
        strip: Option<SharedStrip>,
    ) -> Result<Self, LayoutError> {
        let name = name.into();
        validate_layout(&name, rows, cols, &blocks, strip.as_ref().map(SharedStrip::led_count))?;
        debug!(
            "Matrix '{name}': {rows}x{cols} blocks, strip {:?}",
            strip.as_ref().map(SharedStrip::identifier)
        );

        Ok(Self {
            name,
            rows,
            cols,
            blocks: Mutex::new(blocks),
            strip,
            running: AtomicBool::new(false),
            current: Mutex::new(None),
            replace_lock: tokio::sync::Mutex::new(()),
            task_serial: AtomicU64::new(0),
            request_serial: AtomicU64::new(0),
            applied_ticket: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    #[must_use]
    pub const fn strip(&self) -> Option<&SharedStrip> {
        self.strip.as_ref()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    #[must_use]
    pub fn state(&self) -> MatrixState {
        if self.is_running() {
            MatrixState::Running
        } else if self.current_task().as_ref().is_some_and(|t| !t.handle.is_finished()) {
            MatrixState::Stopping
        } else {
            MatrixState::Idle
        }
    }

    /// Human readable description of the current task.
    #[must_use]
    pub fn running_task(&self) -> String {
        match self.current_task().as_ref() {
            Some(task) if !task.handle.is_finished() => format!("Running task: {}", task.label),
            _ => "No running task".to_string(),
        }
    }

    /// Copy of the block grid.
    #[must_use]
    pub fn blocks(&self) -> Vec<Vec<LedBlock>> {
        self.grid().clone()
    }

    /// Current colors in row-major nested order.
    #[must_use]
    pub fn colors(&self) -> Vec<Vec<Color>> {
        self.grid()
            .iter()
            .map(|row| row.iter().map(|block| block.color).collect())
            .collect()
    }

    /// Current colors as `(background, contrast text)` html pairs.
    #[must_use]
    pub fn html_colors(&self) -> Vec<Vec<(String, String)>> {
        self.grid()
            .iter()
            .map(|row| {
                row.iter()
                    .map(|block| (block.color.as_html(), block.color.text_as_html()))
                    .collect()
            })
            .collect()
    }

    fn grid(&self) -> MutexGuard<'_, Vec<Vec<LedBlock>>> {
        self.blocks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_task(&self) -> MutexGuard<'_, Option<CurrentTask>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate the grid. `f` must not block; the grid lock is held while it runs.
    pub(crate) fn with_blocks_mut<R>(&self, f: impl FnOnce(&mut Vec<Vec<LedBlock>>) -> R) -> R {
        let mut grid = self.grid();
        f(&mut *grid)
    }

    /// Push every block to the strip and refresh it once.
    pub(crate) fn update_strip(&self) {
        let Some(strip) = &self.strip else {
            return;
        };
        let writes: Vec<StripWrite> = row_major(&self.grid()).map(LedBlock::strip_write).collect();
        strip.write(writes);
    }

    /// Push a single block to the strip and refresh it.
    pub(crate) fn update_block(&self, block: &LedBlock) {
        if let Some(strip) = &self.strip {
            strip.write([block.strip_write()]);
        }
    }

    pub(crate) async fn power_off_strip(&self) {
        if let Some(strip) = &self.strip {
            strip.power_off().await;
        }
    }

    /// Start `program` with the requested colors, superseding whatever runs now.
    ///
    /// Returns once the new task is installed. Never fails; missing or black
    /// colors are resolved as described on [`Program::resolve`].
    pub async fn run_program(self: &Arc<Self>, program: Program, colors: &[Color]) {
        self.run_program_with_rng(program, colors, StdRng::from_entropy()).await;
    }

    /// [`run_program`](Self::run_program) with a caller supplied random source.
    pub async fn run_program_with_rng(self: &Arc<Self>, program: Program, colors: &[Color], rng: StdRng) {
        let ticket = self.program_ticket();
        self.run_program_in_order_with_rng(ticket, program, colors, rng).await;
    }

    /// Draw the ticket that orders a request against every other request for
    /// this matrix. Take it as soon as the request arrives.
    #[must_use]
    pub fn program_ticket(&self) -> ProgramTicket {
        ProgramTicket(self.request_serial.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Start `program` unless a request with a newer ticket has already been
    /// applied. Returns whether the program was installed.
    pub async fn run_program_in_order(
        self: &Arc<Self>,
        ticket: ProgramTicket,
        program: Program,
        colors: &[Color],
    ) -> bool {
        self.run_program_in_order_with_rng(ticket, program, colors, StdRng::from_entropy())
            .await
    }

    async fn run_program_in_order_with_rng(
        self: &Arc<Self>,
        ticket: ProgramTicket,
        program: Program,
        colors: &[Color],
        mut rng: StdRng,
    ) -> bool {
        let _replacing = self.replace_lock.lock().await;
        let applied = self.applied_ticket.load(Ordering::SeqCst);
        if ticket.0 <= applied {
            info!(
                "Matrix '{}': dropping {program} request {}, request {applied} is newer",
                self.name, ticket.0
            );
            return false;
        }
        self.applied_ticket.store(ticket.0, Ordering::SeqCst);

        let animation = program.resolve(colors, &mut rng);
        info!("Matrix '{}': starting {animation:?}", self.name);
        let was_running = self.is_running();

        self.retire_current().await;

        if !was_running {
            if let Some(strip) = &self.strip {
                strip.power_on().await;
            }
        }

        self.set_running(true);
        let serial = self.task_serial.fetch_add(1, Ordering::Relaxed) + 1;
        let label = format!("{}-{serial}", animation.label());
        let handle = tokio::spawn(animation::run(Arc::clone(self), animation, rng));
        debug!("Matrix '{}': installed task {label}", self.name);
        *self.current_task() = Some(CurrentTask { label, handle });
        true
    }

    /// Stop the current task with the bounded protocol and leave the matrix
    /// idle. The strip is left as it is.
    pub async fn halt(&self) {
        let _replacing = self.replace_lock.lock().await;
        self.retire_current().await;
        self.set_running(false);
    }

    /// Wait for the current task to finish on its own.
    ///
    /// Only programs that terminate (stop, fixed) ever return from this.
    pub async fn wait_for_task(&self) {
        let _replacing = self.replace_lock.lock().await;
        let task = self.current_task().take();
        if let Some(task) = task {
            if let Err(e) = task.handle.await {
                warn!("Matrix '{}': task {} ended abnormally: {e}", self.name, task.label);
            }
        }
    }

    /// Ask the current task to exit, wait a bounded time, then abort it.
    async fn retire_current(&self) {
        let mut attempts = 0;
        loop {
            let finished = self
                .current_task()
                .as_ref()
                .map_or(true, |task| task.handle.is_finished());
            if finished || attempts >= STOP_POLL_ATTEMPTS {
                break;
            }
            self.set_running(false);
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
            attempts += 1;
        }

        let previous = self.current_task().take();
        let Some(task) = previous else {
            return;
        };

        // Aborting a finished task is a no-op
        task.handle.abort();
        match task.handle.await {
            Ok(()) => debug!("Matrix '{}': task {} exited", self.name, task.label),
            Err(e) if e.is_cancelled() => {
                warn!(
                    "Matrix '{}': task {} ignored the stop request, cancelled after {attempts} checks",
                    self.name, task.label
                );
            }
            Err(e) => error!("Matrix '{}': task {} panicked: {e}", self.name, task.label),
        }
    }

    #[cfg(test)]
    pub(crate) fn install_task_for_test(&self, label: &str, handle: JoinHandle<()>) {
        self.set_running(true);
        *self.current_task() = Some(CurrentTask {
            label: label.to_string(),
            handle,
        });
    }
}

impl std::fmt::Debug for LedMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedMatrix")
            .field("name", &self.name)
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("strip", &self.strip)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

fn validate_layout(
    name: &str,
    rows: usize,
    cols: usize,
    blocks: &[Vec<LedBlock>],
    led_count: Option<usize>,
) -> Result<(), LayoutError> {
    if rows == 0 || cols == 0 {
        return Err(LayoutError::EmptyGrid { matrix: name.to_string() });
    }
    if blocks.len() != rows {
        return Err(LayoutError::RowCount {
            matrix: name.to_string(),
            expected: rows,
            actual: blocks.len(),
        });
    }
    for (row, cells) in blocks.iter().enumerate() {
        if cells.len() != cols {
            return Err(LayoutError::ColumnCount {
                matrix: name.to_string(),
                row,
                expected: cols,
                actual: cells.len(),
            });
        }
        let Some(led_count) = led_count else {
            continue;
        };
        for (col, block) in cells.iter().enumerate() {
            if block.abs_end() > led_count {
                return Err(LayoutError::BlockOutOfRange {
                    matrix: name.to_string(),
                    row,
                    col,
                    end: block.abs_end(),
                    led_count,
                });
            }
        }
    }
    Ok(())
}

/// Split `rows * cols * leds_per_block` LEDs into equal blocks, row-major.
#[must_use]
pub fn uniform_layout(rows: usize, cols: usize, leds_per_block: usize) -> Vec<Vec<LedBlock>> {
    (0..rows)
        .map(|row| {
            (0..cols)
                .map(|col| {
                    let start = (row * cols + col) * leds_per_block;
                    LedBlock::new(start, start + leds_per_block)
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::row_major;
    use crate::palette::ColorName;
    use crate::strip::testing::RecordingStrip;
    use tokio::time::{sleep, Instant};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(5)
    }

    fn colored_layout() -> Vec<Vec<LedBlock>> {
        let colors = [Color::new(0, 100, 0), Color::new(0, 0, 100), Color::new(100, 0, 0)];
        (0..2)
            .map(|row| {
                (0..3)
                    .map(|col| {
                        let start = (row * 3 + col) * 4;
                        LedBlock::new(start, start + 4).with_color(colors[col])
                    })
                    .collect()
            })
            .collect()
    }

    fn matrix_with_strip() -> (Arc<LedMatrix>, Arc<std::sync::Mutex<RecordingStrip>>) {
        let (raw, strip) = RecordingStrip::shared(24);
        let matrix = LedMatrix::new("test", 2, 3, colored_layout(), Some(strip)).unwrap();
        (Arc::new(matrix), raw)
    }

    #[test]
    fn test_layout_validation() {
        let err = LedMatrix::new("m", 3, 3, colored_layout(), None).unwrap_err();
        assert_eq!(
            err,
            LayoutError::RowCount { matrix: "m".to_string(), expected: 3, actual: 2 }
        );

        let err = LedMatrix::new("m", 2, 2, colored_layout(), None).unwrap_err();
        assert!(matches!(err, LayoutError::ColumnCount { row: 0, expected: 2, actual: 3, .. }));

        let err = LedMatrix::new("m", 0, 3, Vec::new(), None).unwrap_err();
        assert!(matches!(err, LayoutError::EmptyGrid { .. }));

        let (_, strip) = RecordingStrip::shared(10);
        let err = LedMatrix::new("m", 2, 3, colored_layout(), Some(strip)).unwrap_err();
        assert!(matches!(err, LayoutError::BlockOutOfRange { row: 0, col: 2, end: 12, led_count: 10, .. }));
        assert_eq!(
            err.to_string(),
            "matrix 'm' block (0, 2) reaches LED 12 but the strip has 10 LEDs"
        );
    }

    #[test]
    fn test_uniform_layout() {
        let layout = uniform_layout(2, 2, 5);
        assert_eq!(layout[0][0], LedBlock::new(0, 5));
        assert_eq!(layout[0][1], LedBlock::new(5, 10));
        assert_eq!(layout[1][0], LedBlock::new(10, 15));
        assert_eq!(layout[1][1], LedBlock::new(15, 20));
    }

    #[test]
    fn test_new_matrix_is_idle() {
        let matrix = LedMatrix::new("idle", 2, 3, colored_layout(), None).unwrap();
        assert_eq!(matrix.state(), MatrixState::Idle);
        assert_eq!(matrix.running_task(), "No running task");
        assert_eq!(matrix.colors()[0][1], Color::new(0, 0, 100));
    }

    #[test]
    fn test_html_colors() {
        let matrix = LedMatrix::new("html", 2, 3, colored_layout(), None).unwrap();
        let colors = matrix.html_colors();
        assert_eq!(colors.len(), 2);
        assert_eq!(colors[0][0], ("#006400".to_string(), "#ffffff".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_blanks_blocks_and_powers_off() {
        let (matrix, raw) = matrix_with_strip();
        raw.lock().unwrap().leds.fill(Color::new(1, 1, 1));

        matrix.run_program_with_rng(Program::Stop, &[], rng()).await;
        matrix.wait_for_task().await;

        assert!(row_major(&matrix.blocks()).all(|b| b.color.is_black()));
        assert_eq!(matrix.state(), MatrixState::Idle);
        let raw = raw.lock().unwrap();
        assert!(raw.leds.iter().all(|c| c.is_black()));
        assert!(raw.shows >= 2);
        assert_eq!(raw.power_events, [true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_paints_every_block() {
        let (matrix, raw) = matrix_with_strip();
        let color = Color::new(100, 50, 0);

        matrix.run_program_with_rng(Program::Fixed, &[color], rng()).await;
        matrix.wait_for_task().await;

        assert!(row_major(&matrix.blocks()).all(|b| b.color == color));
        assert!(!matrix.is_running());
        let raw = raw.lock().unwrap();
        assert!(raw.leds.iter().all(|c| *c == color));
        assert!(raw.powered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_without_strip() {
        let matrix = Arc::new(LedMatrix::new("bare", 2, 3, colored_layout(), None).unwrap());
        matrix.run_program_with_rng(Program::Fixed, &[Color::BLACK], rng()).await;
        matrix.wait_for_task().await;

        let colors = matrix.colors();
        let first = colors[0][0];
        assert!(!first.is_black());
        assert!(colors.iter().flatten().all(|c| *c == first));
    }

    #[tokio::test(start_paused = true)]
    async fn test_random_two_colors_only_uses_both_colors() {
        let (matrix, _raw) = matrix_with_strip();
        let red = ColorName::Red.color();
        let blue = ColorName::Blue.color();

        matrix.run_program_with_rng(Program::Random, &[red, blue], rng()).await;
        assert_eq!(matrix.state(), MatrixState::Running);
        assert!(matrix.running_task().starts_with("Running task: random_two_colors-"));
        sleep(Duration::from_secs(3)).await;

        assert!(row_major(&matrix.blocks()).all(|b| b.color == red || b.color == blue));
        matrix.halt().await;
        assert_eq!(matrix.state(), MatrixState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pure_random_colors_a_block() {
        let layout = vec![vec![LedBlock::new(0, 2); 3]; 2];
        let matrix = Arc::new(LedMatrix::new("random", 2, 3, layout, None).unwrap());

        matrix.run_program_with_rng(Program::Random, &[], rng()).await;
        sleep(Duration::from_millis(200)).await;

        assert!(row_major(&matrix.blocks()).any(|b| !b.color.is_black()));
        matrix.halt().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacement_supersedes_running_task() {
        let (matrix, raw) = matrix_with_strip();
        matrix.run_program_with_rng(Program::ColorRun, &[], rng()).await;
        sleep(Duration::from_secs(2)).await;

        let start = Instant::now();
        let color = ColorName::Green.color();
        matrix.run_program_with_rng(Program::Fixed, &[color], rng()).await;
        assert!(start.elapsed() <= Duration::from_millis(1100));

        matrix.wait_for_task().await;
        sleep(Duration::from_secs(3)).await;

        // Nothing from the color run may leak in after the replacement
        assert!(row_major(&matrix.blocks()).all(|b| b.color == color));
        // Strip was only powered on once: the matrix was running when fixed started
        assert_eq!(raw.lock().unwrap().power_events, [true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newest_request_wins_when_applied_out_of_order() {
        let (matrix, _raw) = matrix_with_strip();
        let red = ColorName::Red.color();
        let green = ColorName::Green.color();

        let first = matrix.program_ticket();
        let second = matrix.program_ticket();
        assert!(first < second);

        assert!(matrix.run_program_in_order(second, Program::Fixed, &[green]).await);
        assert!(!matrix.run_program_in_order(first, Program::Fixed, &[red]).await);
        matrix.wait_for_task().await;

        assert!(row_major(&matrix.blocks()).all(|b| b.color == green));
        assert_eq!(matrix.state(), MatrixState::Idle);

        // a ticket drawn afterwards still replaces the program
        let third = matrix.program_ticket();
        assert!(matrix.run_program_in_order(third, Program::Fixed, &[red]).await);
        matrix.wait_for_task().await;
        assert!(row_major(&matrix.blocks()).all(|b| b.color == red));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_task_is_cancelled_after_bound() {
        let matrix = LedMatrix::new("stuck", 2, 3, colored_layout(), None).unwrap();
        let handle = tokio::spawn(async {
            loop {
                sleep(Duration::from_secs(60)).await;
            }
        });
        matrix.install_task_for_test("stuck-1", handle);
        assert_eq!(matrix.state(), MatrixState::Running);
        assert_eq!(matrix.running_task(), "Running task: stuck-1");

        let start = Instant::now();
        matrix.halt().await;
        let elapsed = start.elapsed();

        assert!(elapsed >= STOP_POLL_INTERVAL * STOP_POLL_ATTEMPTS);
        assert!(elapsed < Duration::from_millis(1200));
        assert_eq!(matrix.state(), MatrixState::Idle);
        assert_eq!(matrix.running_task(), "No running task");
    }

    #[tokio::test(start_paused = true)]
    async fn test_halting_finished_task_is_noop() {
        let matrix = Arc::new(LedMatrix::new("done", 2, 3, colored_layout(), None).unwrap());
        matrix.run_program_with_rng(Program::Fixed, &[Color::new(5, 5, 5)], rng()).await;
        sleep(Duration::from_millis(10)).await;

        let start = Instant::now();
        matrix.halt().await;
        assert!(start.elapsed() < STOP_POLL_INTERVAL);
        assert!(row_major(&matrix.blocks()).all(|b| b.color == Color::new(5, 5, 5)));
    }
}
