//! # Connector Task
//!
//! One outbound connection attempt. Device discovery is stopped first since
//! it slows down connection setup. Cancellation drops the pending connect,
//! which closes its socket, and reports nothing.

use tokio_util::sync::CancellationToken;

use super::ConnectionManager;
use crate::transport::{Adapter, RemoteDevice};

/// Connect attempt for connector `id`.
pub(crate) async fn run<A: Adapter>(
    manager: ConnectionManager<A>,
    id: u64,
    cancel: CancellationToken,
    device: RemoteDevice,
) {
    let adapter = manager.adapter();
    let service = manager.service();

    let attempt = async {
        adapter.cancel_discovery().await;
        adapter.connect(&device, service).await
    };

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!(id, device = %device, "connect cancelled");
            return;
        }
        result = attempt => result,
    };

    match result {
        Ok(stream) => {
            tracing::debug!(id, device = %device, "outbound link up");
            manager.connected(id, stream, device);
        }
        Err(e) => {
            tracing::warn!(id, device = %device, error = %e, "connect failed");
            manager.connection_failed(id);
        }
    }
}
