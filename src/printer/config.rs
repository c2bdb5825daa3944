//! # Printer Configuration
//!
//! Defaults for print jobs and for the link to the printer.
//!
//! ## Presets
//!
//! | Preset | Paper | Image width | QR size | Code table |
//! |--------|-------|-------------|---------|------------|
//! | `mini_58mm` | 58mm | 385 dots | 385 px | 16 (WPC1252) |
//!
//! ## Loading From JSON
//!
//! Every field is optional; missing fields keep the preset value.
//!
//! ```
//! use minithermal::printer::PrinterConfig;
//!
//! let config = PrinterConfig::from_json(r#"{ "image_width": 384, "cut_mode": 0 }"#)?;
//! assert_eq!(config.image_width, 384);
//! assert_eq!(config.cut_mode, 0);
//! assert_eq!(config.feed_after_job, 30);
//! # Ok::<(), minithermal::PrinterError>(())
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PrinterError;
use crate::protocol::commands::DEFAULT_CODE_TABLE;
use crate::protocol::text::CodePage;
use crate::render::qr::DEFAULT_QR_SIZE;

/// # Printer Configuration
///
/// ## Job Defaults
///
/// - **image_width**: raster width for photos, rounded up to a multiple of 8
/// - **qr_size**: edge length of rendered QR codes before rasterizing
/// - **raster_mode**: `m` byte of every `GS v 0` line (only bit 0 is sent)
/// - **feed_after_job** / **cut_mode**: trailer of image and QR jobs
/// - **code_page**: label used to encode text and QR payloads
///
/// ## Link
///
/// - **code_table**: `ESC t n` value sent in the prologue of every write
/// - **read_buffer**: bytes requested per read on the open link
/// - **service_channel**: RFCOMM channel used when listening
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    /// Printer model name
    pub name: String,

    /// Raster width for images, in dots
    pub image_width: u32,

    /// QR code edge length, in pixels
    pub qr_size: u32,

    /// Raster mode byte (bit 0 only)
    pub raster_mode: u8,

    /// Code page label for text (see [`CodePage::for_label`])
    pub code_page: String,

    /// Printer-side code table selected before each write
    pub code_table: u8,

    /// `ESC J` amount after image and QR jobs
    pub feed_after_job: u8,

    /// `GS V B` parameter after image and QR jobs
    pub cut_mode: u8,

    /// Read chunk size on the open link
    pub read_buffer: usize,

    /// RFCOMM channel to listen on
    pub service_channel: u8,
}

impl PrinterConfig {
    /// # Generic 58mm Bluetooth Mini Printer
    ///
    /// ```text
    /// ├─ 5mm ─┼──── 48mm printable ────┼─ 5mm ─┤
    /// │       │       384 dots         │       │
    /// ```
    pub fn mini_58mm() -> Self {
        Self {
            name: "Mini Thermal Printer 58mm".to_string(),
            image_width: 385,
            qr_size: DEFAULT_QR_SIZE,
            raster_mode: 0,
            code_page: "ISO-8859-1".to_string(),
            code_table: DEFAULT_CODE_TABLE,
            feed_after_job: 30,
            cut_mode: 1,
            read_buffer: 256,
            service_channel: 1,
        }
    }

    /// Parse a JSON document on top of the 58mm preset.
    pub fn from_json(json: &str) -> Result<Self, PrinterError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PrinterError::Config(format!("Invalid printer config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PrinterError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            PrinterError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Resolve [`code_page`](Self::code_page).
    pub fn code_page(&self) -> Result<CodePage, PrinterError> {
        CodePage::for_label(&self.code_page)
    }

    fn validate(&self) -> Result<(), PrinterError> {
        if self.image_width == 0 || self.qr_size == 0 {
            return Err(PrinterError::Config(
                "image_width and qr_size must be positive".to_string(),
            ));
        }
        if self.read_buffer == 0 {
            return Err(PrinterError::Config(
                "read_buffer must be positive".to_string(),
            ));
        }
        if !(1..=30).contains(&self.service_channel) {
            return Err(PrinterError::Config(format!(
                "RFCOMM channel {} outside 1..=30",
                self.service_channel
            )));
        }
        self.code_page().map(|_| ())
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self::mini_58mm()
    }
}

// ============================================================================
// TESTS
// ============================================================================
