//! # ESC/POS Raster Graphics
//!
//! Mini thermal printers print bitmaps with the `GS v 0` raster bit image
//! command. Images are sent one scan line at a time: each line is its own
//! command with a height of 1, which keeps the printer's receive buffer small
//! on slow Bluetooth links.
//!
//! ## Bit Packing
//!
//! Graphics data is packed as bytes where each bit represents one dot:
//! - Bit 7 (MSB) = leftmost dot
//! - Bit 0 (LSB) = rightmost dot
//! - 1 = black (print), 0 = white (no print)
//!
//! ```text
//! Byte value 0xF0 = 11110000 = ████░░░░
//! Byte value 0x0F = 00001111 = ░░░░████
//! ```

use super::commands::{GS, u16_le};

/// Length of the `GS v 0` header preceding each line of dots.
pub const RASTER_HEADER_LEN: usize = 8;

/// # Print Raster Bit Image, One Line (GS v 0 m xL xH yL yH d1...dk)
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | GS v 0 m xL xH 1 0 d1...dk |
/// | Hex     | 1D 76 30 m xL xH 01 00 d1...dk |
///
/// ## Parameters
///
/// - `mode`: only bit 0 is sent (0 = normal density, 1 = double width)
/// - `line`: packed dots of one scan line; `xL xH` is its length in bytes
///
/// ## Example
///
/// ```
/// use minithermal::protocol::graphics;
///
/// let frame = graphics::raster_line(0, &[0xFF]);
/// assert_eq!(frame, vec![0x1D, 0x76, 0x30, 0, 1, 0, 1, 0, 0xFF]);
/// ```
pub fn raster_line(mode: u8, line: &[u8]) -> Vec<u8> {
    let mut cmd = Vec::with_capacity(RASTER_HEADER_LEN + line.len());
    push_raster_line(&mut cmd, mode, line);
    cmd
}

/// Append one raster line frame to `out`.
///
/// Used when encoding a whole image so that all lines share one allocation.
pub fn push_raster_line(out: &mut Vec<u8>, mode: u8, line: &[u8]) {
    debug_assert!(
        line.len() <= u16::MAX as usize,
        "raster line too wide: {} bytes",
        line.len()
    );

    let [xl, xh] = u16_le(line.len() as u16);
    out.extend_from_slice(&[GS, b'v', b'0', mode & 1, xl, xh, 1, 0]);
    out.extend_from_slice(line);
}
