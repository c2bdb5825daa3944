//! # Image to Raster Conversion
//!
//! Turns an arbitrary pixel buffer into the printer's monochrome raster
//! command stream.
//!
//! ## Pipeline
//!
//! ```text
//! DynamicImage ──resize──► target width ──luma──► GrayImage
//!     ──mean threshold──► packed bits ──GS v 0 per line──► bytes
//! ```
//!
//! 1. Output width is the requested width rounded up to a multiple of 8.
//!    Output height keeps the aspect ratio and is rounded up to a multiple
//!    of 8 as well.
//! 2. The image is resampled (bilinear) only when its width differs from the
//!    output width. An image already at the output width is never stretched
//!    vertically; missing rows at the bottom print as background.
//! 3. Grayscale uses Rec. 709 luminance. Alpha is ignored.
//! 4. Each pixel at or below the image's mean gray prints as ink.
//! 5. Eight pixels pack into one byte, MSB first.
//! 6. Every scan line becomes one `GS v 0` frame.
//!
//! ## Example
//!
//! ```
//! use image::{DynamicImage, GrayImage, Luma};
//! use minithermal::render::raster::to_raster;
//!
//! let black = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([0])));
//! let bytes = to_raster(&black, 8, 0)?;
//!
//! // 8 lines of 8-byte header + 1 data byte
//! assert_eq!(bytes.len(), 8 * 9);
//! assert_eq!(&bytes[..9], &[0x1D, 0x76, 0x30, 0, 1, 0, 1, 0, 0xFF]);
//! # Ok::<(), minithermal::PrinterError>(())
//! ```

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};

use super::threshold;
use crate::error::PrinterError;
use crate::protocol::graphics::{self, RASTER_HEADER_LEN};

/// Widest line the `GS v 0` header can describe, in dots.
pub const MAX_WIDTH_DOTS: u32 = u16::MAX as u32 * 8;

/// Tallest raster accepted, in dots (about 8 m of paper at 203 dpi).
pub const MAX_HEIGHT_DOTS: u32 = 65_536;

/// # Monochrome Raster
///
/// A binarized image ready for printing.
///
/// ## Invariants
///
/// - `width % 8 == 0` and `height % 8 == 0`
/// - `data.len() == width / 8 * height`
/// - bit 1 = ink, MSB = leftmost dot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonochromeRaster {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl MonochromeRaster {
    /// Convert `image` to a raster `target_width` dots wide (rounded up to 8).
    ///
    /// ## Errors
    ///
    /// [`PrinterError::InvalidParameter`] for an empty image, a zero target
    /// width, or a width the raster header cannot encode.
    pub fn from_image(image: &DynamicImage, target_width: u32) -> Result<Self, PrinterError> {
        let (width, height) = output_size(image.width(), image.height(), target_width)?;

        let gray = if image.width() != width {
            image
                .resize_exact(width, height, FilterType::Triangle)
                .to_luma8()
        } else {
            image.to_luma8()
        };

        let mut data = threshold::binarize(&gray);
        // Same-width input shorter than the rounded height: pad with paper.
        data.resize((width / 8) as usize * height as usize, 0);

        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Width in dots (multiple of 8).
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in dots (multiple of 8).
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Packed bytes per scan line.
    pub fn bytes_per_line(&self) -> usize {
        (self.width / 8) as usize
    }

    /// The packed bit buffer, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Packed bytes of scan line `y`.
    pub fn line(&self, y: u32) -> &[u8] {
        let start = y as usize * self.bytes_per_line();
        &self.data[start..start + self.bytes_per_line()]
    }

    /// Whether the dot at (`x`, `y`) prints.
    pub fn is_ink(&self, x: u32, y: u32) -> bool {
        let byte = self.line(y)[(x / 8) as usize];
        byte & (0x80 >> (x % 8)) != 0
    }

    /// Fraction of dots that print, in `0.0..=1.0`.
    pub fn ink_ratio(&self) -> f64 {
        let dots = self.width as u64 * self.height as u64;
        if dots == 0 {
            return 0.0;
        }
        let ink: u64 = self.data.iter().map(|b| b.count_ones() as u64).sum();
        ink as f64 / dots as f64
    }

    /// Encode every scan line as a `GS v 0` frame.
    ///
    /// Output length is `height × (8 + width / 8)`.
    pub fn to_commands(&self, mode: u8) -> Vec<u8> {
        let bytes_per_line = self.bytes_per_line();
        let mut out = Vec::with_capacity(self.height as usize * (RASTER_HEADER_LEN + bytes_per_line));

        if bytes_per_line == 0 {
            return out;
        }
        for line in self.data.chunks_exact(bytes_per_line) {
            graphics::push_raster_line(&mut out, mode, line);
        }
        out
    }

    /// Render back to an image (black ink on white) for previews.
    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            if self.is_ink(x, y) { Luma([0]) } else { Luma([255]) }
        })
    }
}

/// Output dimensions for a `src_width × src_height` image printed
/// `target_width` dots wide.
///
/// ```
/// use minithermal::render::raster::output_size;
///
/// // 385 rounds up to 392; 200 × 392 / 100 = 784 is already a multiple of 8
/// assert_eq!(output_size(100, 200, 385).unwrap(), (392, 784));
/// ```
pub fn output_size(
    src_width: u32,
    src_height: u32,
    target_width: u32,
) -> Result<(u32, u32), PrinterError> {
    if src_width == 0 || src_height == 0 {
        return Err(PrinterError::InvalidParameter(format!(
            "cannot print an empty {}x{} image",
            src_width, src_height
        )));
    }
    if target_width == 0 || target_width > MAX_WIDTH_DOTS {
        return Err(PrinterError::InvalidParameter(format!(
            "print width {} outside 1..={}",
            target_width, MAX_WIDTH_DOTS
        )));
    }

    let width = target_width.div_ceil(8) * 8;
    let scaled = src_height as u64 * width as u64 / src_width as u64;
    let height = scaled.max(1).div_ceil(8) * 8;
    if height > MAX_HEIGHT_DOTS as u64 {
        return Err(PrinterError::InvalidParameter(format!(
            "scaled height {} exceeds {} dots",
            height, MAX_HEIGHT_DOTS
        )));
    }
    let height = height as u32;

    Ok((width, height))
}

/// # Image to Raster Commands
///
/// Convenience wrapper: [`MonochromeRaster::from_image`] followed by
/// [`MonochromeRaster::to_commands`].
pub fn to_raster(image: &DynamicImage, target_width: u32, mode: u8) -> Result<Vec<u8>, PrinterError> {
    Ok(MonochromeRaster::from_image(image, target_width)?.to_commands(mode))
}

// ============================================================================
// TESTS
// ============================================================================
