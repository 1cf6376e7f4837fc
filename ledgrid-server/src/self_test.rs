//! Strip wiring check: light every LED red, then green, one at a time.

use std::time::Duration;

use ledgrid_matrix_lib::{Color, SharedStrip};
use log::info;

const HOLD_TIME: Duration = Duration::from_secs(1);

pub async fn run(strip: SharedStrip) {
    let identifier = strip.identifier();
    info!("Starting self-test for strip '{identifier}'");
    strip.power_on().await;

    info!("Self-test '{identifier}': red");
    paint_one_by_one(&strip, Color::new(255, 0, 0));
    tokio::time::sleep(HOLD_TIME).await;

    info!("Self-test '{identifier}': green");
    paint_one_by_one(&strip, Color::new(0, 255, 0));
    tokio::time::sleep(HOLD_TIME).await;

    strip.power_off().await;
    info!("Finished self-test for strip '{identifier}'");
}

fn paint_one_by_one(strip: &SharedStrip, color: Color) {
    strip.with_strip(|strip| {
        for index in 0..strip.led_count() {
            strip.set_colors(color, index, 1);
            strip.show();
        }
    });
}

/// Spawn a self-test for each strip; returns the number started.
pub fn start_all<'a>(strips: impl IntoIterator<Item = &'a SharedStrip>) -> usize {
    strips
        .into_iter()
        .map(|strip| tokio::spawn(run(strip.clone())))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StripConfig;
    use crate::strip::Strip;
    use smart_leds::RGB8;
    use std::sync::{Arc, Mutex};

    fn strip(count: usize) -> (Arc<Mutex<Strip>>, SharedStrip) {
        let config = StripConfig { count, ..StripConfig::default() };
        let raw = Arc::new(Mutex::new(Strip::from_config(&config).unwrap()));
        (raw.clone(), SharedStrip::from_shared(raw))
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_test_sequence() {
        let (raw, shared) = strip(4);
        let start = tokio::time::Instant::now();

        let test = tokio::spawn(run(shared));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        {
            let raw = raw.lock().unwrap();
            assert!(raw.is_powered());
            assert!(raw.pixels().iter().all(|p| *p == RGB8::new(255, 0, 0)));
        }

        test.await.unwrap();
        let raw = raw.lock().unwrap();
        // settle + two holds + power-off delay
        assert!(start.elapsed() >= Duration::from_secs(4));
        assert!(!raw.is_powered());
        assert!(raw.pixels().iter().all(|p| *p == RGB8::default()));
        // one show per LED per color, plus the blanking show
        assert_eq!(raw.frames_shown(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_all_spawns_one_per_strip() {
        let (_, a) = strip(2);
        let (_, b) = strip(3);
        assert_eq!(start_all([&a, &b]), 2);
    }
}
