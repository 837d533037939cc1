//! Custom EPD 4.2" B/W/Red V2 Driver
//!
//! This implementation follows the Waveshare epd4in2b_v2 reference sequence
//! (SSD1683 controller) byte for byte. The bus and pins are abstracted behind
//! small traits so the binary can back them with spidev and the GPIO character
//! device, and tests can back them with recorders.
//!
//! [`DisplayBuffer`] holds the two bit planes the controller expects and is an
//! `embedded-graphics` draw target, so frames are rasterised straight into it.

use crate::display::{Display, DisplayError, RefreshMode};
use crate::frame::{Frame, InkColor};
use crate::layout::FontBook;
use embedded_graphics::prelude::*;
use log::{debug, info, warn};
use std::thread;
use std::time::Duration;

/// Display dimensions
pub const EPD_WIDTH: u32 = 400;
pub const EPD_HEIGHT: u32 = 300;

/// Busy-wait poll interval and upper bound (5 seconds)
const BUSY_POLL: Duration = Duration::from_millis(10);
const BUSY_MAX_POLLS: u32 = 500;

/// Simple error type for our EPD operations
#[derive(Debug)]
pub struct EpdError(pub String);

impl std::fmt::Display for EpdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPD Error: {}", self.0)
    }
}

impl std::error::Error for EpdError {}

/// Trait for the SPI byte interface
pub trait SoftwareSpi {
    fn write_byte(&mut self, data: u8) -> Result<(), EpdError>;
}

/// Trait for GPIO pin interface
pub trait GpioPin {
    fn set_high(&mut self) -> Result<(), EpdError>;
    fn set_low(&mut self) -> Result<(), EpdError>;
}

/// Trait for input pin interface
pub trait InputPin {
    fn is_high(&self) -> Result<bool, EpdError>;
}

/// `None` stands for a chip select driven by the kernel SPI driver.
impl<P: GpioPin> GpioPin for Option<P> {
    fn set_high(&mut self) -> Result<(), EpdError> {
        self.as_mut().map_or(Ok(()), |pin| pin.set_high())
    }

    fn set_low(&mut self) -> Result<(), EpdError> {
        self.as_mut().map_or(Ok(()), |pin| pin.set_low())
    }
}

/// EPD 4.2" B/W/Red V2 display driver
pub struct Epd4in2bV2<SPI, CS, DC, RST, BUSY> {
    spi: SPI,
    cs_pin: CS,
    dc_pin: DC,
    rst_pin: RST,
    busy_pin: BUSY,
    width: u32,
    height: u32,
}

/// Display buffer for the 4.2" B/W/Red display
///
/// Black plane: bit 0 = black. Red plane: bit 1 = red. One bit per pixel,
/// rows padded to whole bytes, MSB is the leftmost pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayBuffer {
    width: u32,
    height: u32,
    black_buffer: Vec<u8>,
    red_buffer: Vec<u8>,
}

impl DisplayBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        // Buffer size: each row has (width+7)/8 bytes, total height rows
        let bytes_per_row = width.div_ceil(8);
        let buffer_size = (bytes_per_row * height) as usize;
        Self {
            width,
            height,
            black_buffer: vec![0xFF; buffer_size], // White by default
            red_buffer: vec![0x00; buffer_size],   // No red by default
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn clear(&mut self, color: InkColor) {
        let (black, red) = match color {
            InkColor::White => (0xFF, 0x00),
            InkColor::Black => (0x00, 0x00),
            InkColor::Red => (0xFF, 0xFF),
        };
        self.black_buffer.fill(black);
        self.red_buffer.fill(red);
    }

    pub fn black_buffer(&self) -> &[u8] {
        &self.black_buffer
    }

    pub fn red_buffer(&self) -> &[u8] {
        &self.red_buffer
    }

    fn locate(&self, x: u32, y: u32) -> Option<(usize, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bytes_per_row = self.width.div_ceil(8);
        Some(((y * bytes_per_row + x / 8) as usize, 0x80 >> (x % 8)))
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: InkColor) {
        let Some((byte_index, bit_mask)) = self.locate(x, y) else {
            return;
        };

        match color {
            InkColor::White => {
                self.black_buffer[byte_index] |= bit_mask;
                self.red_buffer[byte_index] &= !bit_mask;
            }
            InkColor::Black => {
                self.black_buffer[byte_index] &= !bit_mask;
                self.red_buffer[byte_index] &= !bit_mask;
            }
            InkColor::Red => {
                self.black_buffer[byte_index] |= bit_mask;
                self.red_buffer[byte_index] |= bit_mask;
            }
        }
    }

    /// Colour at (x, y), `None` outside the buffer. Red wins over black.
    pub fn pixel(&self, x: u32, y: u32) -> Option<InkColor> {
        let (byte_index, bit_mask) = self.locate(x, y)?;
        Some(if self.red_buffer[byte_index] & bit_mask != 0 {
            InkColor::Red
        } else if self.black_buffer[byte_index] & bit_mask == 0 {
            InkColor::Black
        } else {
            InkColor::White
        })
    }
}

impl OriginDimensions for DisplayBuffer {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for DisplayBuffer {
    type Color = InkColor;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if let (Ok(x), Ok(y)) = (u32::try_from(point.x), u32::try_from(point.y)) {
                self.set_pixel(x, y, color);
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        DisplayBuffer::clear(self, color);
        Ok(())
    }
}

impl<SPI, CS, DC, RST, BUSY> Epd4in2bV2<SPI, CS, DC, RST, BUSY>
where
    SPI: SoftwareSpi,
    CS: GpioPin,
    DC: GpioPin,
    RST: GpioPin,
    BUSY: InputPin,
{
    /// Create a new EPD instance
    pub fn new(spi: SPI, cs_pin: CS, dc_pin: DC, rst_pin: RST, busy_pin: BUSY) -> Self {
        Self {
            spi,
            cs_pin,
            dc_pin,
            rst_pin,
            busy_pin,
            width: EPD_WIDTH,
            height: EPD_HEIGHT,
        }
    }

    /// Hardware reset pulse
    fn reset(&mut self) -> Result<(), EpdError> {
        self.rst_pin.set_high()?;
        thread::sleep(Duration::from_millis(200));

        self.rst_pin.set_low()?;
        thread::sleep(Duration::from_millis(5));

        self.rst_pin.set_high()?;
        thread::sleep(Duration::from_millis(200));
        Ok(())
    }

    fn send_command(&mut self, command: u8) -> Result<(), EpdError> {
        self.dc_pin.set_low()?; // Command mode
        self.cs_pin.set_low()?;
        self.spi.write_byte(command)?;
        self.cs_pin.set_high()?;
        Ok(())
    }

    fn send_data(&mut self, data: u8) -> Result<(), EpdError> {
        self.dc_pin.set_high()?; // Data mode
        self.cs_pin.set_low()?;
        self.spi.write_byte(data)?;
        self.cs_pin.set_high()?;
        Ok(())
    }

    /// Wait while BUSY is high (rev2.2+ modules are active high).
    fn read_busy(&mut self) -> Result<(), EpdError> {
        let mut count = 0;
        while self.busy_pin.is_high()? {
            thread::sleep(BUSY_POLL);
            count += 1;
            if count > BUSY_MAX_POLLS {
                warn!("BUSY pin timeout after 5 seconds - display may be stuck");
                break;
            }
        }
        debug!("Display ready after {} busy checks", count);
        Ok(())
    }

    fn turn_on_display(&mut self) -> Result<(), EpdError> {
        self.send_command(0x22)?; // Display update control
        self.send_data(0xF7)?;
        self.send_command(0x20)?; // Master activation
        self.read_busy()
    }

    /// Reset and configure the controller. Required after [`Self::power_down`].
    pub fn init(&mut self) -> Result<(), EpdError> {
        self.reset()?;

        self.read_busy()?;
        self.send_command(0x12)?; // SWRESET
        self.read_busy()?;

        self.send_command(0x3C)?; // BorderWaveform
        self.send_data(0x05)?;

        self.send_command(0x18)?; // Read built-in temperature sensor
        self.send_data(0x80)?;

        self.send_command(0x11)?; // Data entry mode setting
        self.send_data(0x03)?;

        // RAM X address start/end
        self.send_command(0x44)?;
        self.send_data(0x00)?;
        self.send_data((self.width / 8 - 1) as u8)?;

        // RAM Y address start/end
        self.send_command(0x45)?;
        self.send_data(0x00)?;
        self.send_data(0x00)?;
        self.send_data(((self.height - 1) % 256) as u8)?;
        self.send_data(((self.height - 1) / 256) as u8)?;

        // RAM X address counter
        self.send_command(0x4E)?;
        self.send_data(0x00)?;

        // RAM Y address counter
        self.send_command(0x4F)?;
        self.send_data(0x00)?;
        self.send_data(0x00)?;

        self.read_busy()?;
        debug!("EPD initialised");
        Ok(())
    }

    /// Send both planes and run a full refresh.
    pub fn display(&mut self, black_buffer: &[u8], red_buffer: &[u8]) -> Result<(), EpdError> {
        let high = self.height as usize;
        let wide = self.width.div_ceil(8) as usize;
        let expected = high * wide;
        if black_buffer.len() != expected || red_buffer.len() != expected {
            return Err(EpdError(format!(
                "buffer size mismatch: expected {} bytes, got black={} red={}",
                expected,
                black_buffer.len(),
                red_buffer.len()
            )));
        }

        self.send_command(0x24)?;
        for &byte in black_buffer {
            self.send_data(byte)?;
        }

        // Controller red RAM is active low
        self.send_command(0x26)?;
        for &byte in red_buffer {
            self.send_data(!byte)?;
        }

        self.turn_on_display()
    }

    /// POWER_OFF then DEEP_SLEEP(0x01). The image persists without power; the
    /// next update needs [`Self::init`].
    pub fn power_down(&mut self) -> Result<(), EpdError> {
        self.send_command(0x02)?; // POWER_OFF
        self.read_busy()?;

        self.send_command(0x10)?; // DEEP_SLEEP
        self.send_data(0x01)?;
        Ok(())
    }
}

/// [`Display`] backed by the 4.2" tri-colour panel.
///
/// Every presentation wakes the panel, pushes both planes and puts it back into
/// deep sleep, so the image survives between minute ticks without drawing power.
pub struct EpdDisplay<SPI, CS, DC, RST, BUSY> {
    epd: Epd4in2bV2<SPI, CS, DC, RST, BUSY>,
    buffer: DisplayBuffer,
    fonts: FontBook,
}

impl<SPI, CS, DC, RST, BUSY> EpdDisplay<SPI, CS, DC, RST, BUSY>
where
    SPI: SoftwareSpi,
    CS: GpioPin,
    DC: GpioPin,
    RST: GpioPin,
    BUSY: InputPin,
{
    pub fn new(epd: Epd4in2bV2<SPI, CS, DC, RST, BUSY>, fonts: FontBook) -> Self {
        Self {
            epd,
            buffer: DisplayBuffer::new(EPD_WIDTH, EPD_HEIGHT),
            fonts,
        }
    }

    pub fn buffer(&self) -> &DisplayBuffer {
        &self.buffer
    }
}

impl<SPI, CS, DC, RST, BUSY> Display for EpdDisplay<SPI, CS, DC, RST, BUSY>
where
    SPI: SoftwareSpi,
    CS: GpioPin,
    DC: GpioPin,
    RST: GpioPin,
    BUSY: InputPin,
{
    fn set_frame(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        if frame.size != self.buffer.size() {
            warn!(
                "Frame is {}x{} but panel is {}x{}; clipping",
                frame.size.width, frame.size.height, EPD_WIDTH, EPD_HEIGHT
            );
        }
        // DisplayBuffer drawing is infallible
        let _ = frame.draw(&mut self.buffer, &self.fonts);
        Ok(())
    }

    fn present(&mut self, mode: RefreshMode) -> Result<(), DisplayError> {
        if mode == RefreshMode::Partial {
            // The tri-colour waveform has no partial update
            debug!("Partial refresh requested; panel only supports full refresh");
        }
        self.epd.init()?;
        self.epd
            .display(self.buffer.black_buffer(), self.buffer.red_buffer())?;
        self.epd.power_down()?;
        info!("Panel updated ({:?} refresh requested)", mode);
        Ok(())
    }
}
