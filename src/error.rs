//! # Error Types
//!
//! This module defines error types used throughout the minithermal library.
//!
//! Most of these never escape the connection manager: its tasks absorb
//! failures and surface them as [`Event`](crate::connection::Event)s. The
//! encoders return them directly so callers can skip sending an empty job.

use thiserror::Error;

/// Main error type for minithermal operations
#[derive(Debug, Error)]
pub enum PrinterError {
    /// Transport-level errors (socket setup, I/O on an established link)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The listening endpoint could not be created
    #[error("Bind failed: {0}")]
    Bind(String),

    /// An outbound connection attempt failed
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Encoder parameter out of range (feed/cut outside 0-255, empty text, ...)
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Code page label unknown or not a single-byte encoding
    #[error("Unsupported code page: {0}")]
    UnsupportedCodePage(String),

    /// Image decoding or QR generation error
    #[error("Image error: {0}")]
    Image(String),

    /// Configuration file could not be read or parsed
    #[error("Config error: {0}")]
    Config(String),

    /// No Tokio runtime available to spawn connection tasks on
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
