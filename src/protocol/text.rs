//! # Single-Byte Text Encoding
//!
//! Mini thermal printers interpret text bytes through one single-byte code
//! table at a time (`ESC t n`). This module turns Unicode strings into bytes
//! for a caller-chosen code page.
//!
//! ## Supported Code Pages
//!
//! | Label | Encoding | `ESC t` table |
//! |-------|----------|---------------|
//! | `cp437`, `ibm437`, `437` | PC437 (built-in table) | 0 |
//! | `iso-8859-1`, `latin1`, `l1`, `ascii` | ISO-8859-1 (built-in) | 16 |
//! | `windows-1252` | WPC1252 | 16 |
//! | `ibm866` | PC866 | 17 |
//! | `windows-1250` | WPC1250 | 45 |
//! | `windows-1251` | WPC1251 | 46 |
//! | any other WHATWG single-byte label | via `encoding_rs` | - |
//!
//! ISO-8859-1 is handled here rather than by `encoding_rs`, which follows
//! WHATWG and maps that label to windows-1252. The two differ in 0x80-0x9F:
//! Latin-1 keeps the C1 controls there, so `€` has no slot and becomes `?`.
//!
//! Multi-byte encodings (UTF-8, GBK, Shift_JIS, ...) are rejected: the
//! session prologue always switches the printer out of Kanji mode.
//!
//! ## Example
//!
//! ```
//! use minithermal::protocol::text::{CodePage, encode_text};
//!
//! let latin1 = CodePage::for_label("ISO-8859-1").unwrap();
//! assert_eq!(encode_text("A", latin1).unwrap(), vec![0x41]);
//! assert!(encode_text("", latin1).is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use encoding_rs::Encoding;

use super::cp437;
use crate::error::PrinterError;

/// A single-byte character encoding understood by the printer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum CodePage {
    /// IBM PC437, encoded with the built-in table
    Cp437,
    /// ISO-8859-1: code points up to U+00FF map to themselves
    Latin1,
    /// Any WHATWG single-byte encoding
    Single(&'static Encoding),
}

impl CodePage {
    /// ISO-8859-1, the default for text and QR payloads.
    pub fn latin1() -> Self {
        Self::Latin1
    }

    /// Resolve a code page label (case-insensitive).
    ///
    /// ## Errors
    ///
    /// [`PrinterError::UnsupportedCodePage`] for unknown labels and for
    /// encodings that need more than one byte per character.
    pub fn for_label(label: &str) -> Result<Self, PrinterError> {
        let trimmed = label.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "cp437" | "ibm437" | "437" | "pc437" => return Ok(Self::Cp437),
            "iso-8859-1" | "iso8859-1" | "iso_8859-1" | "latin1" | "l1" | "cp819"
            | "ibm819" | "ascii" | "us-ascii" => return Ok(Self::Latin1),
            _ => {}
        }

        match Encoding::for_label(trimmed.as_bytes()) {
            Some(encoding) if encoding.is_single_byte() => Ok(Self::Single(encoding)),
            Some(encoding) => Err(PrinterError::UnsupportedCodePage(format!(
                "{} is a multi-byte encoding",
                encoding.name()
            ))),
            None => Err(PrinterError::UnsupportedCodePage(format!(
                "unknown label '{}'",
                trimmed
            ))),
        }
    }

    /// Canonical name of the code page.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cp437 => "IBM437",
            Self::Latin1 => "ISO-8859-1",
            Self::Single(encoding) => encoding.name(),
        }
    }

    /// The `ESC t n` table number for this code page, when known.
    pub fn code_table(&self) -> Option<u8> {
        match self {
            Self::Cp437 => Some(0),
            Self::Latin1 => Some(16),
            Self::Single(encoding) => match encoding.name() {
                "windows-1252" => Some(16),
                "IBM866" => Some(17),
                "windows-1250" => Some(45),
                "windows-1251" => Some(46),
                _ => None,
            },
        }
    }

    /// Encode one character, or `None` when the table has no slot for it.
    pub fn encode_char(&self, ch: char) -> Option<u8> {
        match self {
            Self::Cp437 => cp437::encode_char(ch),
            Self::Latin1 => u8::try_from(u32::from(ch)).ok(),
            Self::Single(encoding) => {
                let mut buf = [0u8; 4];
                let (bytes, _, had_errors) = encoding.encode(ch.encode_utf8(&mut buf));
                match (had_errors, &*bytes) {
                    (false, [byte]) => Some(*byte),
                    _ => None,
                }
            }
        }
    }

    /// Encode a string, replacing unmappable characters with `?`.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Self::Cp437 => cp437::encode(text),
            Self::Latin1 | Self::Single(_) => text
                .chars()
                .map(|ch| self.encode_char(ch).unwrap_or(b'?'))
                .collect(),
        }
    }
}

impl Default for CodePage {
    fn default() -> Self {
        Self::latin1()
    }
}

impl fmt::Debug for CodePage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodePage({})", self.name())
    }
}

impl fmt::Display for CodePage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CodePage {
    type Err = PrinterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::for_label(s)
    }
}

/// # Encode Text for Printing
///
/// Returns the text's bytes under `code_page`.
///
/// ## Errors
///
/// [`PrinterError::InvalidParameter`] for empty text. Nothing should be sent
/// in that case.
pub fn encode_text(text: &str, code_page: CodePage) -> Result<Vec<u8>, PrinterError> {
    if text.is_empty() {
        return Err(PrinterError::InvalidParameter(
            "text to print is empty".to_string(),
        ));
    }
    Ok(code_page.encode(text))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_ascii_char() {
        let latin1 = CodePage::for_label("latin1").unwrap();
        assert_eq!(encode_text("A", latin1).unwrap(), vec![0x41]);
    }

    #[test]
    fn test_empty_text_rejected() {
        for label in ["latin1", "cp437", "windows-1251"] {
            let cp = CodePage::for_label(label).unwrap();
            assert!(matches!(
                encode_text("", cp),
                Err(PrinterError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn test_latin1_accents() {
        let cp = CodePage::for_label("ISO-8859-1").unwrap();
        assert_eq!(
            encode_text("áçéãõ", cp).unwrap(),
            vec![0xE1, 0xE7, 0xE9, 0xE3, 0xF5]
        );
    }

    #[test]
    fn test_unmappable_becomes_question_mark() {
        let cp = CodePage::latin1();
        assert_eq!(encode_text("a★b", cp).unwrap(), vec![b'a', b'?', b'b']);
    }

    #[test]
    fn test_cyrillic() {
        let cp = CodePage::for_label("windows-1251").unwrap();
        assert_eq!(encode_text("Мир", cp).unwrap(), vec![0xCC, 0xE8, 0xF0]);
        assert_eq!(cp.code_table(), Some(46));
    }

    #[test]
    fn test_cp437_label() {
        let cp: CodePage = "CP437".parse().unwrap();
        assert_eq!(cp, CodePage::Cp437);
        assert_eq!(cp.code_table(), Some(0));
        assert_eq!(encode_text("é", cp).unwrap(), vec![0x82]);
    }

    #[test]
    fn test_multi_byte_rejected() {
        for label in ["utf-8", "gbk", "shift_jis", "utf-16le"] {
            assert!(
                matches!(
                    CodePage::for_label(label),
                    Err(PrinterError::UnsupportedCodePage(_))
                ),
                "{} should be rejected",
                label
            );
        }
    }

    #[test]
    fn test_unknown_label_rejected() {
        assert!(CodePage::for_label("klingon").is_err());
    }

    #[test]
    fn test_default_table() {
        assert_eq!(CodePage::default().code_table(), Some(16));
        assert_eq!(CodePage::default().name(), "ISO-8859-1");
    }

    #[test]
    fn test_latin1_c1_range() {
        let latin1 = CodePage::for_label("ISO-8859-1").unwrap();
        assert_eq!(latin1, CodePage::Latin1);
        assert_eq!(encode_text("€", latin1).unwrap(), vec![b'?']);
        assert_eq!(encode_text("\u{0080}ÿ", latin1).unwrap(), vec![0x80, 0xFF]);
        assert_eq!(encode_text("Ā", latin1).unwrap(), vec![b'?']);
    }

    #[test]
    fn test_windows_1252_keeps_euro() {
        let cp = CodePage::for_label("windows-1252").unwrap();
        assert_eq!(encode_text("€", cp).unwrap(), vec![0x80]);
        assert_eq!(cp.code_table(), Some(16));
    }
}
