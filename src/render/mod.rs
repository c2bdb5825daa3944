//! # Rendering Module
//!
//! Turns pixels into printer dots.
//!
//! ## Modules
//!
//! - [`threshold`]: Global mean thresholding and MSB-first bit packing
//! - [`raster`]: Image → [`MonochromeRaster`](raster::MonochromeRaster) → `GS v 0` frames
//! - [`qr`]: QR code images for the raster encoder
//!
//! ## Usage Example
//!
//! ```
//! use minithermal::protocol::text::CodePage;
//! use minithermal::render::{qr, raster::MonochromeRaster};
//!
//! let code = qr::render("hello", CodePage::default(), qr::DEFAULT_QR_SIZE)?;
//! let raster = MonochromeRaster::from_image(&code, 385)?;
//! assert_eq!(raster.width(), 392);
//!
//! let bytes = raster.to_commands(0);
//! assert_eq!(bytes.len(), raster.height() as usize * (8 + 49));
//! # Ok::<(), minithermal::PrinterError>(())
//! ```

pub mod qr;
pub mod raster;
pub mod threshold;
