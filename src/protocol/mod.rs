//! # ESC/POS Protocol Implementation
//!
//! Low-level command builders for the ESC/POS dialect spoken by Bluetooth
//! mini thermal printers.
//!
//! ## Module Structure
//!
//! - [`commands`]: Fixed frames (init, line feed, feed, cut, write prologue)
//! - [`graphics`]: `GS v 0` raster line frames
//! - [`text`]: Single-byte code pages and text encoding
//! - [`cp437`]: Built-in PC437 table
//!
//! ## Usage Example
//!
//! ```
//! use minithermal::protocol::{commands, graphics, text};
//!
//! let mut data = Vec::new();
//! data.extend(commands::init());
//! data.extend(text::encode_text("RECEIPT", text::CodePage::default())?);
//! data.extend(commands::line_feed());
//! data.extend(graphics::raster_line(0, &[0xFF; 48]));
//! data.extend(commands::feed(30)?);
//! data.extend(commands::cut(1)?);
//! # Ok::<(), minithermal::PrinterError>(())
//! ```

pub mod commands;
pub mod cp437;
pub mod graphics;
pub mod text;
