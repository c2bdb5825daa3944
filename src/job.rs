//! # Print Jobs
//!
//! A print job is the ordered list of command frames produced for one user
//! action (print this text, this QR code, this photo). Jobs are built fresh
//! per action and handed to
//! [`ConnectionManager::print`](crate::connection::ConnectionManager::print),
//! which writes the frames in order.
//!
//! ## Frame Sequences
//!
//! | Job | Frames |
//! |-----|--------|
//! | text | text, LF, `\n\n` |
//! | image / QR | init, LF, raster lines, feed(30), cut(1), init |
//!
//! The two blank lines after text push the last line past the tear bar on
//! printers without a cutter.

use std::ops::Deref;

use image::DynamicImage;

use crate::error::PrinterError;
use crate::printer::PrinterConfig;
use crate::protocol::commands;
use crate::protocol::text::{CodePage, encode_text};
use crate::render::qr;
use crate::render::raster::MonochromeRaster;

/// Trailing blank lines after a text job.
const TRAILING_NEWLINES: &[u8] = b"\n\n";

/// Text printed by [`PrintJob::test_page`].
pub const TEST_PAGE_TEXT: &str = "Testing Mini Thermal Printer \n\n abcdefghijklmnopqrstuvxyz \n ABCDEFGHIJKLMNOPQRSTUVXYZ \n 0123456789 \n UTF-8/ISO_8859_1 Charset: áçéãẽõôÁÇÃÉ";

/// One immutable protocol instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame(Vec<u8>);

impl CommandFrame {
    /// Wrap already-encoded bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The frame's bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for CommandFrame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for CommandFrame {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// # Print Job
///
/// An ordered sequence of [`CommandFrame`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrintJob {
    frames: Vec<CommandFrame>,
}

impl PrintJob {
    /// Empty job.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame.
    pub fn push(&mut self, frame: impl Into<CommandFrame>) -> &mut Self {
        self.frames.push(frame.into());
        self
    }

    /// The frames, in send order.
    pub fn frames(&self) -> &[CommandFrame] {
        &self.frames
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the job has no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// All frames concatenated, as they appear on the wire (without the
    /// per-write prologue).
    pub fn to_bytes(&self) -> Vec<u8> {
        self.frames.iter().flat_map(|f| f.iter().copied()).collect()
    }

    /// # Text Job
    ///
    /// ```
    /// use minithermal::job::PrintJob;
    /// use minithermal::protocol::text::CodePage;
    ///
    /// let job = PrintJob::text("Hi", CodePage::default())?;
    /// assert_eq!(job.to_bytes(), b"Hi\n\n\n");
    /// # Ok::<(), minithermal::PrinterError>(())
    /// ```
    pub fn text(text: &str, code_page: CodePage) -> Result<Self, PrinterError> {
        let mut job = Self::new();
        job.push(encode_text(text, code_page)?)
            .push(commands::line_feed())
            .push(TRAILING_NEWLINES.to_vec());
        Ok(job)
    }

    /// The fixed test page: ASCII letters, digits and accented Latin-1.
    pub fn test_page(code_page: CodePage) -> Result<Self, PrinterError> {
        Self::text(TEST_PAGE_TEXT, code_page)
    }

    /// # Raster Job
    ///
    /// Wraps already-encoded raster lines in the canonical image sequence:
    /// `init, LF, raster, feed, cut, init`.
    pub fn raster(raster: Vec<u8>, config: &PrinterConfig) -> Result<Self, PrinterError> {
        let mut job = Self::new();
        job.push(commands::init())
            .push(commands::line_feed())
            .push(raster)
            .push(commands::feed(config.feed_after_job as i32)?)
            .push(commands::cut(config.cut_mode as i32)?)
            .push(commands::init());
        Ok(job)
    }

    /// Image job at the configured width and raster mode.
    pub fn image(image: &DynamicImage, config: &PrinterConfig) -> Result<Self, PrinterError> {
        let raster = MonochromeRaster::from_image(image, config.image_width)?;
        Self::raster(raster.to_commands(config.raster_mode), config)
    }

    /// QR job: renders the code at `qr_size`, then prints it as an image
    /// `qr_size` dots wide.
    pub fn qr(text: &str, config: &PrinterConfig) -> Result<Self, PrinterError> {
        let code = qr::render(text, config.code_page()?, config.qr_size)?;
        let raster = MonochromeRaster::from_image(&code, config.qr_size)?;
        Self::raster(raster.to_commands(config.raster_mode), config)
    }
}

impl IntoIterator for PrintJob {
    type Item = CommandFrame;
    type IntoIter = std::vec::IntoIter<CommandFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}

impl<'a> IntoIterator for &'a PrintJob {
    type Item = &'a CommandFrame;
    type IntoIter = std::slice::Iter<'a, CommandFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_text_job_frames() {
        let job = PrintJob::text("abc", CodePage::default()).unwrap();
        assert_eq!(job.len(), 3);
        assert_eq!(job.frames()[0].as_bytes(), b"abc");
        assert_eq!(job.frames()[1].as_bytes(), &[0x0A]);
        assert_eq!(job.frames()[2].as_bytes(), b"\n\n");
    }

    #[test]
    fn test_empty_text_job_rejected() {
        assert!(PrintJob::text("", CodePage::default()).is_err());
    }

    #[test]
    fn test_canonical_raster_order() {
        let config = PrinterConfig::default();
        let job = PrintJob::raster(vec![0xAB], &config).unwrap();
        let frames: Vec<&[u8]> = job.frames().iter().map(|f| f.as_bytes()).collect();
        assert_eq!(
            frames,
            vec![
                &[0x1B, 0x40][..],
                &[0x0A][..],
                &[0xAB][..],
                &[0x1B, 0x4A, 30][..],
                &[0x1D, 0x56, 0x42, 1][..],
                &[0x1B, 0x40][..],
            ]
        );
    }

    #[test]
    fn test_image_job_uses_config_width() {
        let config = PrinterConfig {
            image_width: 16,
            ..PrinterConfig::default()
        };
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(32, 32, Luma([0])));
        let job = PrintJob::image(&img, &config).unwrap();

        // 16 wide, 16 tall: 16 lines of 8 header + 2 data bytes
        assert_eq!(job.frames()[2].len(), 16 * 10);
        assert_eq!(&job.frames()[2][..8], &[0x1D, 0x76, 0x30, 0, 2, 0, 1, 0]);
    }

    #[test]
    fn test_qr_job() {
        let config = PrinterConfig::default();
        let job = PrintJob::qr("https://example.com", &config).unwrap();
        assert_eq!(job.len(), 6);

        // 385 rounds up to 392 dots = 49 bytes per line
        let raster = &job.frames()[2];
        assert_eq!(raster.len() % (8 + 49), 0);
        assert_eq!(raster[4], 49);
    }

    #[test]
    fn test_to_bytes_concatenates() {
        let mut job = PrintJob::new();
        job.push(vec![1, 2]).push(vec![3]);
        assert_eq!(job.to_bytes(), vec![1, 2, 3]);
        assert!(!job.is_empty());
    }

    #[test]
    fn test_test_page_latin1() {
        let job = PrintJob::test_page(CodePage::default()).unwrap();
        let text = job.frames()[0].as_bytes();
        assert!(text.starts_with(b"Testing Mini Thermal Printer"));
        // 'á' in Latin-1
        assert!(text.contains(&0xE1));
    }
}
