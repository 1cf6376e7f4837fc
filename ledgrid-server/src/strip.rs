use anyhow::{bail, Result};
use ledgrid_matrix_lib::{Color, LedStrip};
use log::{debug, warn};
use smart_leds::{brightness, RGB8};

use crate::config::StripConfig;
use crate::pins::{GpioPin, PixelOrder, PowerSwitch};

/// Addressable strip backed by an in-memory pixel buffer.
///
/// `show` renders the buffer into the byte frame the data pin would clock
/// out, with brightness and pixel order applied.
#[derive(Debug)]
pub struct Strip {
    identifier: String,
    data_pin: GpioPin,
    order: PixelOrder,
    brightness: u8,
    pixels: Vec<RGB8>,
    frame: Vec<u8>,
    frames_shown: u64,
    power: PowerSwitch,
}

impl Strip {
    pub fn from_config(config: &StripConfig) -> Result<Self> {
        let data_pin = config.data_pin()?;
        let power_pin = config.power_pin()?;
        let order = config.pixel_order()?;
        if config.bytes_per_pixel != order.channels() {
            bail!(
                "bytes_per_pixel is {} but {} uses {} bytes per pixel",
                config.bytes_per_pixel,
                order.token(),
                order.channels()
            );
        }
        if data_pin == power_pin {
            bail!("data and power both use pin {data_pin}");
        }

        debug!(
            "Creating strip '{}': {} LEDs on {data_pin}, power {power_pin}, {}",
            config.identifier,
            config.count,
            order.token()
        );
        Ok(Self {
            identifier: config.identifier.clone(),
            data_pin,
            order,
            brightness: config.brightness_u8(),
            pixels: vec![RGB8::default(); config.count],
            frame: Vec::with_capacity(config.count * order.channels()),
            frames_shown: 0,
            power: PowerSwitch::new(power_pin),
        })
    }

    #[must_use]
    pub const fn data_pin(&self) -> GpioPin {
        self.data_pin
    }

    #[must_use]
    pub fn pixels(&self) -> &[RGB8] {
        &self.pixels
    }

    /// Bytes of the most recently shown frame
    #[must_use]
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    #[must_use]
    pub const fn frames_shown(&self) -> u64 {
        self.frames_shown
    }

    #[must_use]
    pub const fn is_powered(&self) -> bool {
        self.power.is_on()
    }
}

impl LedStrip for Strip {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn led_count(&self) -> usize {
        self.pixels.len()
    }

    fn set_colors(&mut self, color: Color, start_index: usize, length: usize) {
        if length == 0 {
            return;
        }
        let count = self.pixels.len();
        let end = start_index.saturating_add(length);
        if end > count {
            warn!(
                "Strip '{}': write to LEDs {start_index}..{end} clipped to {count} LEDs",
                self.identifier
            );
        }
        let start = start_index.min(count);
        self.pixels[start..end.min(count)].fill(color.into());
    }

    fn show(&mut self) {
        self.frame.clear();
        for pixel in brightness(self.pixels.iter().copied(), self.brightness) {
            self.order.encode(pixel, &mut self.frame);
        }
        self.frames_shown += 1;
    }

    fn set_power(&mut self, enabled: bool) {
        self.power.set(enabled);
    }
}
