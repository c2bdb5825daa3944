//! # ESC/POS Printer Commands
//!
//! This module implements the handful of ESC/POS commands understood by the
//! common 58mm Bluetooth mini thermal printers.
//!
//! ## Protocol Overview
//!
//! Commands are byte sequences starting with a prefix byte:
//!
//! - `ESC` (0x1B): initialization, paper feed, code table selection
//! - `GS` (0x1D): paper cut, raster bit images
//! - `FS` (0x1C): Kanji / multi-byte character mode control
//!
//! ## Frame Ownership
//!
//! Every builder returns a freshly allocated `Vec<u8>`. Nothing is cached
//! or patched in place, so frames can be built from any thread.
//!
//! ## Parameter Validation
//!
//! Builders taking a one-byte parameter accept an `i32` and reject anything
//! outside `0..=255` with [`PrinterError::InvalidParameter`]. Callers must
//! check the result before sending.

use crate::error::PrinterError;

// ============================================================================
// ESCAPE SEQUENCE CONSTANTS
// ============================================================================

/// ESC (Escape) - Command prefix byte
pub const ESC: u8 = 0x1B;

/// GS (Group Separator) - Extended command prefix
///
/// Used for cutter control (`GS V`) and raster bit images (`GS v 0`).
pub const GS: u8 = 0x1D;

/// FS (File Separator) - Kanji / multi-byte mode prefix
pub const FS: u8 = 0x1C;

/// LF (Line Feed) - Print the line buffer and advance one line
pub const LF: u8 = 0x0A;

/// Code table selected by default before every write: WPC1252
pub const DEFAULT_CODE_TABLE: u8 = 0x10;

// ============================================================================
// INITIALIZATION COMMANDS
// ============================================================================

/// # Initialize Printer (ESC @)
///
/// Clears the print buffer and resets the printer to its power-on defaults.
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | ESC @ |
/// | Hex     | 1B 40 |
///
/// ## Example
///
/// ```
/// use minithermal::protocol::commands;
///
/// assert_eq!(commands::init(), vec![0x1B, 0x40]);
/// ```
#[inline]
pub fn init() -> Vec<u8> {
    vec![ESC, b'@']
}

/// # Line Feed (LF)
///
/// Prints the contents of the line buffer and feeds one line.
#[inline]
pub fn line_feed() -> Vec<u8> {
    vec![LF]
}

// ============================================================================
// PAPER FEED AND CUT
// ============================================================================

/// # Print and Feed Paper (ESC J n)
///
/// Prints the buffer and feeds the paper by `n` motion units.
///
/// | Format  | Bytes     |
/// |---------|-----------|
/// | ASCII   | ESC J n   |
/// | Hex     | 1B 4A n   |
///
/// ## Errors
///
/// [`PrinterError::InvalidParameter`] when `n` is outside `0..=255`.
///
/// ## Example
///
/// ```
/// use minithermal::protocol::commands;
///
/// assert_eq!(commands::feed(30).unwrap(), vec![0x1B, 0x4A, 30]);
/// assert!(commands::feed(256).is_err());
/// ```
pub fn feed(n: i32) -> Result<Vec<u8>, PrinterError> {
    let n = byte_param("feed", n)?;
    Ok(vec![ESC, b'J', n])
}

/// # Select Cut Mode and Cut Paper (GS V 66 n)
///
/// Feeds the paper to the cutting position plus `n` units, then cuts.
/// Printers without a cutter simply feed.
///
/// | Format  | Bytes       |
/// |---------|-------------|
/// | ASCII   | GS V B n    |
/// | Hex     | 1D 56 42 n  |
///
/// ## Errors
///
/// [`PrinterError::InvalidParameter`] when `mode` is outside `0..=255`.
pub fn cut(mode: i32) -> Result<Vec<u8>, PrinterError> {
    let mode = byte_param("cut", mode)?;
    Ok(vec![GS, b'V', b'B', mode])
}

// ============================================================================
// CHARACTER MODE
// ============================================================================

/// # Cancel Kanji Character Mode (FS .)
///
/// Leaves multi-byte character mode so every following text byte is looked
/// up in the single-byte code table.
#[inline]
pub fn cancel_kanji_mode() -> Vec<u8> {
    vec![FS, b'.']
}

/// # Select Character Code Table (ESC t n)
///
/// | n  | Table |
/// |----|-------|
/// | 0  | PC437 (USA, standard Europe) |
/// | 16 | WPC1252 |
#[inline]
pub fn select_code_table(n: u8) -> Vec<u8> {
    vec![ESC, b't', n]
}

/// Prologue written before every payload on an open link.
///
/// `FS .` followed by `ESC t n`: the printer is forced out of multi-byte mode
/// and into the given single-byte table, whatever state a previous job left.
///
/// ```
/// use minithermal::protocol::commands;
///
/// assert_eq!(commands::prologue(0x10), vec![0x1C, 0x2E, 0x1B, 0x74, 0x10]);
/// ```
pub fn prologue(code_table: u8) -> Vec<u8> {
    let mut cmd = cancel_kanji_mode();
    cmd.extend(select_code_table(code_table));
    cmd
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Encode a u16 value as little-endian bytes [low, high]
#[inline]
pub const fn u16_le(value: u16) -> [u8; 2] {
    [value as u8, (value >> 8) as u8]
}

fn byte_param(command: &str, value: i32) -> Result<u8, PrinterError> {
    u8::try_from(value).map_err(|_| {
        PrinterError::InvalidParameter(format!(
            "{} parameter {} outside 0..=255",
            command, value
        ))
    })
}

// ============================================================================
// TESTS
// ============================================================================
