//! # minithermal CLI
//!
//! Command-line interface for Bluetooth mini thermal printers.
//!
//! ## Usage
//!
//! ```bash
//! # Print a line of text
//! minithermal text "Hello" --device 00:11:22:33:44:55
//!
//! # Print a QR code, 300px wide
//! minithermal qr "https://example.com" --device 00:11:22:33:44:55 --size 300
//!
//! # Print a photo
//! minithermal image cat.jpg --device 00:11:22:33:44:55
//!
//! # Wait for a printer or host to connect and log what it sends
//! minithermal listen
//!
//! # Encode without a printer: job bytes to a file, dots to a PNG
//! minithermal encode image cat.jpg --out cat.bin --png cat.png
//! ```
//!
//! Set `RUST_LOG` to change verbosity (default `info,minithermal=debug`).

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use image::DynamicImage;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use minithermal::{
    PrintJob, PrinterConfig, PrinterError,
    render::{qr, raster::MonochromeRaster},
};

/// minithermal - Bluetooth mini thermal printer utility
#[derive(Parser, Debug)]
#[command(name = "minithermal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Printer configuration (JSON)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Display name for the printer
    #[arg(long, global = true)]
    name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print text
    Text {
        text: String,

        /// Printer Bluetooth address
        #[arg(long)]
        device: String,

        /// Code page label (latin1, cp437, windows-1251, ...)
        #[arg(long)]
        code_page: Option<String>,
    },

    /// Print a QR code
    Qr {
        text: String,

        /// Printer Bluetooth address
        #[arg(long)]
        device: String,

        /// QR code size in pixels
        #[arg(long)]
        size: Option<u32>,
    },

    /// Print an image file
    Image {
        file: PathBuf,

        /// Printer Bluetooth address
        #[arg(long)]
        device: String,

        /// Print width in dots
        #[arg(long)]
        width: Option<u32>,

        /// Raster mode byte
        #[arg(long)]
        mode: Option<u8>,
    },

    /// Print the test page
    TestPage {
        /// Printer Bluetooth address
        #[arg(long)]
        device: String,
    },

    /// Wait for an inbound connection and log events until Ctrl-C
    Listen,

    /// Encode a job without sending it
    Encode {
        kind: EncodeKind,

        /// Text, QR payload, or image path
        input: String,

        /// Write the job bytes here
        #[arg(long, value_name = "FILE")]
        out: PathBuf,

        /// Also save the printed dots as a PNG (image and QR only)
        #[arg(long, value_name = "FILE")]
        png: Option<PathBuf>,

        /// Print width in dots (image)
        #[arg(long)]
        width: Option<u32>,

        /// Raster mode byte
        #[arg(long)]
        mode: Option<u8>,

        /// QR code size in pixels
        #[arg(long)]
        size: Option<u32>,

        /// Code page label (text and QR payloads)
        #[arg(long)]
        code_page: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EncodeKind {
    Image,
    Qr,
    Text,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,minithermal=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), PrinterError> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PrinterConfig::load(path)?,
        None => PrinterConfig::default(),
    };

    match cli.command {
        Commands::Text {
            text,
            device,
            code_page,
        } => {
            if let Some(label) = code_page {
                config.code_page = label;
            }
            let job = PrintJob::text(&text, config.code_page()?)?;
            send(config, &device, cli.name, &job).await
        }
        Commands::Qr { text, device, size } => {
            if let Some(size) = size {
                config.qr_size = size;
            }
            let job = PrintJob::qr(&text, &config)?;
            send(config, &device, cli.name, &job).await
        }
        Commands::Image {
            file,
            device,
            width,
            mode,
        } => {
            if let Some(width) = width {
                config.image_width = width;
            }
            if let Some(mode) = mode {
                config.raster_mode = mode;
            }
            let job = PrintJob::image(&open_image(&file)?, &config)?;
            send(config, &device, cli.name, &job).await
        }
        Commands::TestPage { device } => {
            let job = PrintJob::test_page(config.code_page()?)?;
            send(config, &device, cli.name, &job).await
        }
        Commands::Listen => listen(config).await,
        Commands::Encode {
            kind,
            input,
            out,
            png,
            width,
            mode,
            size,
            code_page,
        } => {
            if let Some(width) = width {
                config.image_width = width;
            }
            if let Some(mode) = mode {
                config.raster_mode = mode;
            }
            if let Some(size) = size {
                config.qr_size = size;
            }
            if let Some(label) = code_page {
                config.code_page = label;
            }
            encode(kind, &input, &out, png.as_deref(), &config)
        }
    }
}

fn open_image(path: &Path) -> Result<DynamicImage, PrinterError> {
    image::open(path)
        .map_err(|e| PrinterError::Image(format!("Failed to open {}: {}", path.display(), e)))
}

/// Build the job offline and write its bytes (and optionally a preview).
fn encode(
    kind: EncodeKind,
    input: &str,
    out: &Path,
    png: Option<&Path>,
    config: &PrinterConfig,
) -> Result<(), PrinterError> {
    let (job, preview) = match kind {
        EncodeKind::Text => {
            if png.is_some() {
                return Err(PrinterError::InvalidParameter(
                    "PNG preview is only available for images and QR codes".to_string(),
                ));
            }
            (PrintJob::text(input, config.code_page()?)?, None)
        }
        EncodeKind::Image => {
            let raster = MonochromeRaster::from_image(&open_image(Path::new(input))?, config.image_width)?;
            let job = PrintJob::raster(raster.to_commands(config.raster_mode), config)?;
            (job, Some(raster))
        }
        EncodeKind::Qr => {
            let code = qr::render(input, config.code_page()?, config.qr_size)?;
            let raster = MonochromeRaster::from_image(&code, config.qr_size)?;
            let job = PrintJob::raster(raster.to_commands(config.raster_mode), config)?;
            (job, Some(raster))
        }
    };

    let bytes = job.to_bytes();
    std::fs::write(out, &bytes)?;
    tracing::info!(frames = job.len(), bytes = bytes.len(), "wrote {}", out.display());

    if let (Some(path), Some(raster)) = (png, preview) {
        raster
            .to_image()
            .save(path)
            .map_err(|e| PrinterError::Image(format!("Failed to save PNG: {}", e)))?;
        tracing::info!(
            width = raster.width(),
            height = raster.height(),
            "saved preview to {}",
            path.display()
        );
    }
    Ok(())
}

#[cfg(target_os = "linux")]
mod device {
    use std::time::Duration;

    use minithermal::connection::{ConnectionManager, ConnectionState, Event, MESSAGE_UNABLE_TO_CONNECT};
    use minithermal::transport::bluetooth::is_valid_mac;
    use minithermal::transport::{RemoteDevice, RfcommAdapter};
    use minithermal::{PrintJob, PrinterConfig, PrinterError};

    /// Time for the printer to drain its buffer before the link is closed.
    const DRAIN_DELAY_MS: u64 = 1000;

    /// Connect to `address`, print `job`, disconnect.
    pub async fn send(
        config: PrinterConfig,
        address: &str,
        name: Option<String>,
        job: &PrintJob,
    ) -> Result<(), PrinterError> {
        if !is_valid_mac(address) {
            return Err(PrinterError::Connect(format!(
                "Invalid Bluetooth address '{}', expected XX:XX:XX:XX:XX:XX",
                address
            )));
        }
        let device = match name {
            Some(name) => RemoteDevice::new(address, name),
            None => RemoteDevice::from_address(address),
        };

        let (manager, mut events) = ConnectionManager::new(RfcommAdapter::without_sdp(), config)?;
        manager.connect(device);

        while let Some(event) = events.recv().await {
            match event {
                Event::StateChanged(ConnectionState::Connected) => break,
                Event::UnableToConnect => {
                    manager.stop();
                    return Err(PrinterError::Connect(MESSAGE_UNABLE_TO_CONNECT.to_string()));
                }
                other => tracing::debug!(event = ?other, "event"),
            }
        }

        manager.print(job).await;
        tokio::time::sleep(Duration::from_millis(DRAIN_DELAY_MS)).await;
        manager.stop();
        tracing::info!(frames = job.len(), "printed successfully");
        Ok(())
    }

    /// Listen until Ctrl-C, logging every event.
    pub async fn listen(config: PrinterConfig) -> Result<(), PrinterError> {
        let (manager, mut events) = ConnectionManager::new(RfcommAdapter::new(), config)?;
        manager.start();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                event = events.recv() => match event {
                    Some(Event::DataReceived(bytes)) => {
                        tracing::info!(len = bytes.len(), "received {:02X?}", bytes);
                    }
                    Some(Event::Message(text)) => tracing::warn!("{}", text),
                    Some(other) => tracing::info!(event = ?other, "event"),
                    None => break,
                },
            }
        }

        manager.stop();
        Ok(())
    }
}

#[cfg(target_os = "linux")]
use device::{listen, send};

#[cfg(not(target_os = "linux"))]
async fn send(
    _config: PrinterConfig,
    _address: &str,
    _name: Option<String>,
    _job: &PrintJob,
) -> Result<(), PrinterError> {
    Err(PrinterError::Transport(
        "Bluetooth printing requires Linux (BlueZ)".to_string(),
    ))
}

#[cfg(not(target_os = "linux"))]
async fn listen(_config: PrinterConfig) -> Result<(), PrinterError> {
    Err(PrinterError::Transport(
        "Bluetooth listening requires Linux (BlueZ)".to_string(),
    ))
}
