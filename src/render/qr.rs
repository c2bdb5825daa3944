//! # QR Code Images
//!
//! Renders a QR code into a square black-on-white pixel buffer. The buffer
//! is consumed unchanged by the raster encoder, exactly like a photo.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────── size ────────────┐
//! │ pad  quiet ████ modules ████ │   quiet zone: 4 modules
//! │      zone  ████ × scale ████ │   scale: largest integer that fits
//! └──────────────────────────────┘   pad: leftover, split evenly
//! ```
//!
//! The text is encoded with the caller's code page (ISO-8859-1 by default)
//! before being placed in the QR byte segment.

use image::{DynamicImage, GrayImage, Luma};
use qrcode::{Color, EcLevel, QrCode};

use crate::error::PrinterError;
use crate::protocol::text::{CodePage, encode_text};

/// Default edge length of the rendered code, in pixels.
pub const DEFAULT_QR_SIZE: u32 = 385;

/// Quiet zone around the symbol, in modules.
pub const QUIET_ZONE: u32 = 4;

/// Render `text` as a `size × size` QR code image.
///
/// ## Errors
///
/// - [`PrinterError::InvalidParameter`] for empty text or a zero size
/// - [`PrinterError::Image`] when the data does not fit in a QR code
///
/// ## Example
///
/// ```
/// use minithermal::protocol::text::CodePage;
/// use minithermal::render::qr;
///
/// let img = qr::render("https://example.com", CodePage::default(), 200)?;
/// assert_eq!((img.width(), img.height()), (200, 200));
/// # Ok::<(), minithermal::PrinterError>(())
/// ```
pub fn render(text: &str, code_page: CodePage, size: u32) -> Result<DynamicImage, PrinterError> {
    if size == 0 {
        return Err(PrinterError::InvalidParameter(
            "QR size must be positive".to_string(),
        ));
    }

    let payload = encode_text(text, code_page)?;
    let code = QrCode::with_error_correction_level(&payload, EcLevel::L)
        .map_err(|e| PrinterError::Image(format!("QR code generation failed: {}", e)))?;

    let modules = code.width() as u32;
    let total = modules + 2 * QUIET_ZONE;
    let scale = (size / total).max(1);
    let pad = size.saturating_sub(total * scale) / 2;
    let offset = pad + QUIET_ZONE * scale;

    let img = GrayImage::from_fn(size, size, |x, y| {
        let (Some(qx), Some(qy)) = (x.checked_sub(offset), y.checked_sub(offset)) else {
            return Luma([255]);
        };
        let (mx, my) = (qx / scale, qy / scale);
        if mx < modules && my < modules && code[(mx as usize, my as usize)] == Color::Dark {
            Luma([0])
        } else {
            Luma([255])
        }
    });

    Ok(DynamicImage::ImageLuma8(img))
}
