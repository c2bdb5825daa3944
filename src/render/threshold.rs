//! # Global Mean Thresholding
//!
//! Converts a grayscale image to ink/background dots using one threshold for
//! the whole image: the image's own mean gray level.
//!
//! ## Algorithm
//!
//! ```text
//! pass 1:  mean = (sum of all gray values) / (width × height)   (integer)
//! pass 2:  ink  = gray <= mean
//! ```
//!
//! Because the threshold follows the image, a dark photo and a light photo
//! both keep roughly half of their dots inked. A uniformly distributed image
//! inks about 50% of its pixels.
//!
//! Pure black-and-white inputs (QR codes) keep their shape: the mean lies
//! strictly between 0 and 255, so black stays ink and white stays paper.
//!
//! A perfectly flat image has no contrast for the mean to split: every pixel
//! equals the mean. Such images are judged by absolute level instead
//! (darker than mid-gray prints), so a blank page stays blank.
//!
//! ## Comparison with Dithering
//!
//! | Method | Gray levels | Edges | Best For |
//! |--------|-------------|-------|----------|
//! | Mean threshold | 2 | Crisp | Text, logos, QR codes |
//! | Ordered dither | Simulated | Patterned | Photos |

use image::GrayImage;

/// Arithmetic mean of all gray values, rounded down.
///
/// Returns 0 for an empty image.
pub fn mean_gray(gray: &GrayImage) -> u8 {
    let count = gray.width() as u64 * gray.height() as u64;
    if count == 0 {
        return 0;
    }
    let total: u64 = gray.as_raw().iter().map(|&g| g as u64).sum();
    (total / count) as u8
}

/// Whether a pixel with `gray` value prints under threshold `mean`.
#[inline]
pub fn is_ink(gray: u8, mean: u8) -> bool {
    gray <= mean
}

/// Mid-gray cut used for images without any contrast.
pub const FLAT_IMAGE_CUTOFF: u8 = 128;

/// Whether every pixel of `gray` has the same value.
pub fn is_flat(gray: &GrayImage) -> bool {
    match gray.as_raw().split_first() {
        Some((first, rest)) => rest.iter().all(|g| g == first),
        None => true,
    }
}

/// Pack a row of boolean pixel values into bytes.
///
/// - Bit 7 (MSB) = leftmost pixel, bit 0 (LSB) = rightmost pixel
/// - 1 = ink, 0 = background
///
/// A row whose length is not a multiple of 8 is padded with background.
///
/// ```
/// use minithermal::render::threshold::pack_row;
///
/// let row = [true, true, false, false, true, false, true, false];
/// assert_eq!(pack_row(&row), vec![0b1100_1010]);
/// ```
pub fn pack_row(pixels: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; pixels.len().div_ceil(8)];

    for (i, &pixel) in pixels.iter().enumerate() {
        if pixel {
            bytes[i / 8] |= 0x80 >> (i % 8);
        }
    }

    bytes
}

/// Threshold `gray` against its own mean and pack it row by row.
///
/// Returns `ceil(width / 8) × height` bytes.
pub fn binarize(gray: &GrayImage) -> Vec<u8> {
    let mean = mean_gray(gray);
    let flat = is_flat(gray);
    let width = gray.width() as usize;
    let mut data = Vec::with_capacity(width.div_ceil(8) * gray.height() as usize);

    if width == 0 {
        return data;
    }

    let mut row = Vec::with_capacity(width);
    for line in gray.as_raw().chunks_exact(width) {
        row.clear();
        row.extend(line.iter().map(|&g| {
            if flat {
                g < FLAT_IMAGE_CUTOFF
            } else {
                is_ink(g, mean)
            }
        }));
        data.extend(pack_row(&row));
    }

    data
}

// ============================================================================
// TESTS
// ============================================================================
