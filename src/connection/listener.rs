//! # Listener Task
//!
//! Binds the serial port service and waits for a peer to connect. A peer
//! accepted while the manager is listening or connecting becomes the link and
//! ends the task. One accepted while idle or already connected is closed
//! straight away, and the task keeps waiting.
//!
//! A bind failure only ends this task; outbound connections keep working.

use tokio_util::sync::CancellationToken;

use super::ConnectionManager;
use crate::transport::{Acceptor, Adapter};

/// Accept loop for listener `id`.
pub(crate) async fn run<A: Adapter>(
    manager: ConnectionManager<A>,
    id: u64,
    cancel: CancellationToken,
) {
    let service = manager.service().clone();

    let bound = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        bound = manager.adapter().listen(&service) => bound,
    };
    let mut acceptor = match bound {
        Ok(acceptor) => acceptor,
        Err(e) => {
            tracing::error!(id, channel = service.channel, error = %e, "listen failed");
            return;
        }
    };
    tracing::debug!(id, channel = service.channel, "listener ready");

    loop {
        let accepted = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(id, "listener cancelled");
                return;
            }
            accepted = acceptor.accept() => accepted,
        };

        match accepted {
            Ok((stream, device)) => {
                tracing::info!(id, device = %device, "accepted connection");
                if manager.connected(id, stream, device) {
                    return;
                }
            }
            Err(e) => {
                tracing::error!(id, error = %e, "accept failed");
                return;
            }
        }
    }
}
