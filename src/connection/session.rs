//! # Transport Session
//!
//! The single open link. The read half is pumped by a task that reports
//! every chunk as [`Event::DataReceived`]; the write half sits behind an
//! async mutex so that concurrent writers never interleave.
//!
//! ## Write Framing
//!
//! Every write is preceded by the prologue:
//!
//! ```text
//! 1C 2E        FS .    cancel Kanji mode
//! 1B 74 n      ESC t n select code table (16 = WPC1252)
//! ```
//!
//! Mini printers forget the selected code table between jobs, so it is
//! re-sent each time.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{ConnectionManager, Event, EventSender};
use crate::error::PrinterError;
use crate::protocol::commands;
use crate::transport::{Adapter, RemoteDevice};

/// Write side of an open link.
pub struct TransportSession<S> {
    writer: Mutex<WriteHalf<S>>,
    device: RemoteDevice,
    code_table: u8,
    events: EventSender,
}

impl<S: AsyncRead + AsyncWrite> TransportSession<S> {
    pub(crate) fn new(
        stream: S,
        device: RemoteDevice,
        code_table: u8,
        events: EventSender,
    ) -> (Self, ReadHalf<S>) {
        let (reader, writer) = tokio::io::split(stream);
        let session = Self {
            writer: Mutex::new(writer),
            device,
            code_table,
            events,
        };
        (session, reader)
    }

    /// Peer on the other end.
    pub fn device(&self) -> &RemoteDevice {
        &self.device
    }

    /// Write the prologue and `payload`, then flush.
    ///
    /// Emits [`Event::DataWritten`] with `payload` once flushed.
    pub async fn write(&self, payload: &[u8]) -> Result<(), PrinterError> {
        {
            let mut writer = self.writer.lock().await;
            writer.write_all(&commands::prologue(self.code_table)).await?;
            writer.write_all(payload).await?;
            writer.flush().await?;
        }
        tracing::trace!(len = payload.len(), "wrote payload");
        let _ = self.events.send(Event::DataWritten(payload.to_vec()));
        Ok(())
    }
}

/// Read loop for session `id`. Reports the link as lost on EOF or error,
/// and exits quietly when cancelled.
pub(crate) async fn run<A: Adapter>(
    manager: ConnectionManager<A>,
    id: u64,
    cancel: CancellationToken,
    mut reader: ReadHalf<A::Stream>,
    buffer_size: usize,
) {
    let mut buf = vec![0u8; buffer_size.max(1)];

    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(id, "session cancelled");
                return;
            }
            read = reader.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                tracing::info!(id, "link closed by peer");
                break;
            }
            Ok(n) => {
                tracing::trace!(id, len = n, "received");
                manager.emit(Event::DataReceived(buf[..n].to_vec()));
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "read failed");
                break;
            }
        }
    }

    manager.connection_lost(id);
}
