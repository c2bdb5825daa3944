//! # Printer Module
//!
//! Printer presets and job defaults.
//!
//! ## Modules
//!
//! - [`config`]: Job and link configuration, JSON loading

pub mod config;

pub use config::PrinterConfig;
