//! # minithermal - Bluetooth Mini Thermal Printer Library
//!
//! minithermal drives the cheap 58mm Bluetooth receipt printers sold as
//! "mini thermal printers" (MTP-II, PT-210 and friends). It provides:
//!
//! - **Connection management**: listen for or connect to a printer over
//!   RFCOMM, with exactly one link at a time and events for every change
//! - **Protocol implementation**: ESC/POS frame builders and code pages
//! - **Raster encoding**: any image → thresholded `GS v 0` raster lines
//! - **QR codes**: rendered as images and printed through the raster path
//!
//! ## Quick Start
//!
//! ```no_run
//! use minithermal::{ConnectionManager, ConnectionState, Event, PrintJob, PrinterConfig};
//! use minithermal::transport::{RemoteDevice, RfcommAdapter};
//!
//! # async fn demo() -> Result<(), minithermal::PrinterError> {
//! let config = PrinterConfig::default();
//! let (manager, mut events) = ConnectionManager::new(RfcommAdapter::new(), config.clone())?;
//!
//! manager.connect(RemoteDevice::from_address("00:11:22:33:44:55"));
//! while let Some(event) = events.recv().await {
//!     match event {
//!         Event::StateChanged(ConnectionState::Connected) => break,
//!         Event::UnableToConnect => return Ok(()),
//!         _ => {}
//!     }
//! }
//!
//! manager.print(&PrintJob::qr("https://example.com", &config)?).await;
//! manager.stop();
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`connection`] | Connection state machine, listener/connector/session tasks |
//! | [`transport`] | Bluetooth adapter seam and the Linux RFCOMM adapter |
//! | [`protocol`] | ESC/POS command builders and text encoding |
//! | [`render`] | Thresholding, raster framing, QR images |
//! | [`job`] | Canonical print job sequences |
//! | [`printer`] | Printer configuration |
//! | [`error`] | Error types |
//!
//! ## Wire Format
//!
//! Every write on the link starts with `1C 2E 1B 74 10` (cancel Kanji mode,
//! select WPC1252), followed by the job frame:
//!
//! | Frame | Bytes |
//! |-------|-------|
//! | init | `1B 40` |
//! | feed | `1B 4A n` |
//! | cut | `1D 56 42 m` |
//! | raster line | `1D 76 30 m xL xH 01 00 data` |

pub mod connection;
pub mod error;
pub mod job;
pub mod printer;
pub mod protocol;
pub mod render;
pub mod transport;

// Re-exports for convenience
pub use connection::{ConnectionManager, ConnectionState, Event, EventReceiver};
pub use error::PrinterError;
pub use job::{CommandFrame, PrintJob};
pub use printer::PrinterConfig;
