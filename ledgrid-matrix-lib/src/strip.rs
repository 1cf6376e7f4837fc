//! Interface between the matrix engine and an LED strip driver.
//!
//! Drivers implement the small synchronous [`LedStrip`] trait. The engine
//! talks to them through [`SharedStrip`], which adds the timed power
//! sequencing and lets several matrices and the self-test share one strip.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info};

use crate::block::StripWrite;
use crate::color::Color;

/// Time the LEDs need after enabling power before they accept data
pub const POWER_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Time between blanking the strip and cutting its power
pub const POWER_OFF_DELAY: Duration = Duration::from_secs(1);

pub trait LedStrip: Send {
    fn identifier(&self) -> &str;

    fn led_count(&self) -> usize;

    /// Buffer `color` for `length` LEDs starting at `start_index`. A zero
    /// `length` is a no-op.
    fn set_colors(&mut self, color: Color, start_index: usize, length: usize);

    /// Flush buffered writes to the LEDs.
    fn show(&mut self);

    /// Drive the power-enable line.
    fn set_power(&mut self, enabled: bool);

    fn clear(&mut self) {
        let count = self.led_count();
        self.set_colors(Color::BLACK, 0, count);
    }
}

/// Cloneable handle to a strip driver.
#[derive(Clone)]
pub struct SharedStrip {
    inner: Arc<Mutex<dyn LedStrip>>,
}

impl SharedStrip {
    pub fn new<S: LedStrip + 'static>(strip: S) -> Self {
        Self::from_shared(Arc::new(Mutex::new(strip)))
    }

    /// Wrap a strip the caller keeps its own typed handle to.
    pub fn from_shared<S: LedStrip + 'static>(strip: Arc<Mutex<S>>) -> Self {
        Self { inner: strip }
    }

    fn lock(&self) -> MutexGuard<'_, dyn LedStrip + 'static> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn identifier(&self) -> String {
        self.lock().identifier().to_string()
    }

    #[must_use]
    pub fn led_count(&self) -> usize {
        self.lock().led_count()
    }

    /// Run `f` with exclusive access to the driver.
    pub fn with_strip<R>(&self, f: impl FnOnce(&mut dyn LedStrip) -> R) -> R {
        let mut guard = self.lock();
        f(&mut *guard)
    }

    /// Apply a batch of range writes, then refresh the strip once.
    pub fn write<I>(&self, writes: I)
    where
        I: IntoIterator<Item = StripWrite>,
    {
        let mut strip = self.lock();
        for write in writes {
            if write.length > 0 {
                strip.set_colors(write.color, write.start, write.length);
            }
        }
        strip.show();
    }

    /// Enable power and wait for the LEDs to settle.
    pub async fn power_on(&self) {
        let identifier = {
            let mut strip = self.lock();
            strip.set_power(true);
            strip.identifier().to_string()
        };
        info!("Strip '{identifier}' powered on, settling for {POWER_SETTLE_DELAY:?}");
        tokio::time::sleep(POWER_SETTLE_DELAY).await;
    }

    /// Blank every LED, wait, then disable power.
    pub async fn power_off(&self) {
        let identifier = {
            let mut strip = self.lock();
            strip.clear();
            strip.show();
            strip.identifier().to_string()
        };
        debug!("Strip '{identifier}' blanked, cutting power in {POWER_OFF_DELAY:?}");
        tokio::time::sleep(POWER_OFF_DELAY).await;
        self.lock().set_power(false);
        info!("Strip '{identifier}' powered off");
    }
}

impl std::fmt::Debug for SharedStrip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let strip = self.lock();
        f.debug_struct("SharedStrip")
            .field("identifier", &strip.identifier())
            .field("led_count", &strip.led_count())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// In-memory strip that records everything the engine does to it.
    #[derive(Debug)]
    pub struct RecordingStrip {
        pub leds: Vec<Color>,
        pub shows: usize,
        pub powered: bool,
        pub power_events: Vec<bool>,
    }

    impl RecordingStrip {
        pub fn new(count: usize) -> Self {
            Self {
                leds: vec![Color::BLACK; count],
                shows: 0,
                powered: false,
                power_events: Vec::new(),
            }
        }

        pub fn shared(count: usize) -> (Arc<Mutex<Self>>, SharedStrip) {
            let strip = Arc::new(Mutex::new(Self::new(count)));
            (strip.clone(), SharedStrip::from_shared(strip))
        }
    }

    impl LedStrip for RecordingStrip {
        fn identifier(&self) -> &str {
            "recording"
        }

        fn led_count(&self) -> usize {
            self.leds.len()
        }

        fn set_colors(&mut self, color: Color, start_index: usize, length: usize) {
            for led in self.leds.iter_mut().skip(start_index).take(length) {
                *led = color;
            }
        }

        fn show(&mut self) {
            self.shows += 1;
        }

        fn set_power(&mut self, enabled: bool) {
            self.powered = enabled;
            self.power_events.push(enabled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingStrip;
    use super::*;

    #[test]
    fn test_write_applies_ranges_and_shows_once() {
        let (raw, strip) = RecordingStrip::shared(10);
        strip.write([
            StripWrite { color: Color::new(1, 0, 0), start: 0, length: 3 },
            StripWrite { color: Color::new(0, 1, 0), start: 3, length: 0 },
            StripWrite { color: Color::new(0, 0, 1), start: 5, length: 2 },
        ]);
        let raw = raw.lock().unwrap();
        assert_eq!(raw.shows, 1);
        assert_eq!(raw.leds[0..3], [Color::new(1, 0, 0); 3]);
        assert_eq!(raw.leds[3], Color::BLACK);
        assert_eq!(raw.leds[5..7], [Color::new(0, 0, 1); 2]);
        assert_eq!(raw.leds[7], Color::BLACK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_power_on_waits_for_settle_delay() {
        let (raw, strip) = RecordingStrip::shared(4);
        let start = tokio::time::Instant::now();
        strip.power_on().await;
        assert!(start.elapsed() >= POWER_SETTLE_DELAY);
        assert!(raw.lock().unwrap().powered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_power_off_blanks_then_disables() {
        let (raw, strip) = RecordingStrip::shared(4);
        strip.power_on().await;
        strip.write([StripWrite { color: Color::new(9, 9, 9), start: 0, length: 4 }]);

        strip.power_off().await;

        let raw = raw.lock().unwrap();
        assert!(raw.leds.iter().all(|c| c.is_black()));
        assert!(!raw.powered);
        assert_eq!(raw.power_events, [true, false]);
    }

    #[test]
    fn test_debug_output() {
        let strip = SharedStrip::new(RecordingStrip::new(3));
        let debug = format!("{strip:?}");
        assert!(debug.contains("recording"));
        assert!(debug.contains('3'));
    }
}
