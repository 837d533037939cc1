//! # Bible Clock Application Entry Point
//!
//! This binary wires the library together: it loads the configuration, opens the
//! time-sync listener, picks a display and runs the render loop and the listener
//! side by side until Ctrl-C.
//!
//! It supports both production mode (e-ink panel, `hardware` feature on Linux)
//! and development mode (`--stdout`, ASCII frames on the terminal).

// Test modules
#[cfg(test)]
mod tests;

#[cfg(all(target_os = "linux", feature = "hardware"))]
mod hw_gpio_cdev;
#[cfg(all(target_os = "linux", feature = "hardware"))]
mod hw_spi_spidev;

use anyhow::Context;
use bible_clock_lib::clock::SystemClock;
use bible_clock_lib::config::{Config, DEFAULT_CONFIG_PATH};
use bible_clock_lib::content::JsonFileStore;
use bible_clock_lib::display::{Display, TerminalDisplay};
use bible_clock_lib::scheduler::RenderScheduler;
use bible_clock_lib::time_sync::{TcpTransport, TimeSyncListener};
use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use std::sync::Arc;

/// Command line switches.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "bible-clock", version, about = "Verse-of-the-minute clock for e-ink panels")]
pub struct Options {
    /// Draw frames as ASCII on the terminal instead of the panel
    #[arg(long)]
    pub stdout: bool,

    /// Configuration file
    #[arg(long = "config", value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    pub config_path: String,

    /// Write the default configuration to the config path and exit
    #[arg(long)]
    pub init_config: bool,
}

/// Open the tri-colour panel from the configured wiring.
#[cfg(all(target_os = "linux", feature = "hardware"))]
fn open_panel(config: &Config) -> anyhow::Result<Box<dyn Display + Send>> {
    use bible_clock_lib::epd4in2b_v2::{EpdDisplay, Epd4in2bV2};
    use bible_clock_lib::layout::FontBook;
    use hw_gpio_cdev::{open_chip, CdevInputPin, CdevOutputPin};
    use hw_spi_spidev::SpidevHwSpi;

    let hw = &config.display.hardware;
    info!(
        "Opening panel: {} DC={} RST={} BUSY={}, {}",
        hw.gpio_chip, hw.dc_pin, hw.rst_pin, hw.busy_pin, hw.spi_device
    );

    let mut chip = open_chip(&hw.gpio_chip)?;
    let dc = CdevOutputPin::new(&mut chip, hw.dc_pin)?;
    let rst = CdevOutputPin::new(&mut chip, hw.rst_pin)?;
    let busy = CdevInputPin::new(&mut chip, hw.busy_pin)?;
    let spi = SpidevHwSpi::open(&hw.spi_device)?;

    // Chip select is handled by the kernel SPI driver
    let epd = Epd4in2bV2::new(spi, None::<CdevOutputPin>, dc, rst, busy);
    Ok(Box::new(EpdDisplay::new(epd, FontBook::default())))
}

fn terminal(config: &Config) -> Box<dyn Display + Send> {
    Box::new(TerminalDisplay::stdout(
        config.display.width,
        config.display.height,
    ))
}

/// Pick the panel when available, the terminal otherwise.
fn select_display(config: &Config, stdout: bool) -> Box<dyn Display + Send> {
    if stdout {
        info!("Development mode: drawing to the terminal");
        return terminal(config);
    }

    #[cfg(all(target_os = "linux", feature = "hardware"))]
    {
        match open_panel(config) {
            Ok(display) => return display,
            Err(e) => warn!("Panel unavailable ({:#}), falling back to the terminal", e),
        }
    }

    #[cfg(not(all(target_os = "linux", feature = "hardware")))]
    {
        warn!("Built without hardware support, drawing to the terminal");
    }

    terminal(config)
}

async fn run(config: Config, options: Options) -> anyhow::Result<()> {
    let transport = TcpTransport::bind(&config.sync.bind_addr)
        .await
        .context("starting the time sync listener")?;
    if let Ok(addr) = transport.local_addr() {
        info!("Accepting time sync connections on {}", addr);
    }
    let listener = TimeSyncListener::new(
        transport,
        Arc::new(SystemClock::from(&config.sync)),
        config.sync.settings(),
    );

    let display = select_display(&config, options.stdout);
    let store = JsonFileStore::new(&config.content.path);
    let scheduler = RenderScheduler::from_config(store, display, &config);

    let render = tokio::spawn(scheduler.run());
    let sync = tokio::spawn(listener.run());

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for Ctrl-C")?;
            info!("Interrupted, shutting down");
        }
        result = render => error!("Render loop stopped: {:?}", result),
        result = sync => error!("Time sync listener stopped: {:?}", result),
    }
    Ok(())
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let options = Options::parse();

    if options.init_config {
        return Config::default()
            .save(&options.config_path)
            .with_context(|| format!("writing {}", options.config_path));
    }

    let config = Config::load_from_path(&options.config_path);

    // Store reads and panel updates block inside the render task
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(run(config, options))
}
