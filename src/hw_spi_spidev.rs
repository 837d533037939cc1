//! Kernel SPI bus for the panel; chip select is driven by the kernel.

use bible_clock_lib::epd4in2b_v2::{EpdError, SoftwareSpi};
use linux_embedded_hal::spidev::{SpiModeFlags, Spidev, SpidevOptions};
use std::io::Write;

/// The SSD1683 controller tops out at 8 MHz
const MAX_SPEED_HZ: u32 = 8_000_000;

pub struct SpidevHwSpi {
    dev: Spidev,
}

impl SpidevHwSpi {
    pub fn open(path: &str) -> Result<Self, EpdError> {
        let mut dev = Spidev::open(path).map_err(|e| EpdError(format!("{path}: {e}")))?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(MAX_SPEED_HZ)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        dev.configure(&options)
            .map_err(|e| EpdError(format!("configure {path}: {e}")))?;
        Ok(Self { dev })
    }
}

impl SoftwareSpi for SpidevHwSpi {
    fn write_byte(&mut self, data: u8) -> Result<(), EpdError> {
        self.dev
            .write_all(&[data])
            .map_err(|e| EpdError(e.to_string()))
    }
}
