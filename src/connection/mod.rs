//! # Connection Manager
//!
//! Owns the link to one printer and decides who gets to create it.
//!
//! ## States
//!
//! ```text
//!            start()                connect(device)
//!   Idle ──────────────► Listening ─────────────────► Connecting
//!    ▲                    ▲  │ accept                     │ connect ok
//!    │ stop()             │  ▼                            ▼
//!    └──────────── any    └──── lost / failed ◄──── Connected
//! ```
//!
//! Three roles can run at the same time, at most one of each:
//!
//! | Role | Task | Ends when |
//! |------|------|-----------|
//! | listener | `listener` | a peer connects, bind/accept fails, or cancelled |
//! | connector | `connector` | the outbound connect succeeds, fails, or cancelled |
//! | session | [`session`] | the link closes, or cancelled |
//!
//! Whichever of listener and connector completes a handshake first installs
//! the session; installing it retires the other two. Every role carries an
//! id, and reports from a role that has since been replaced are ignored, so
//! `connect(a)` followed by `connect(b)` can never let `a` disturb `b`.
//!
//! ## Events
//!
//! Everything the manager wants to tell its owner (state changes, toast
//! messages, bytes seen on the link) goes out on the single [`EventReceiver`]
//! returned by [`ConnectionManager::new`].
//!
//! ## Example
//!
//! ```no_run
//! use minithermal::connection::{ConnectionManager, Event};
//! use minithermal::transport::{RemoteDevice, RfcommAdapter};
//! use minithermal::{PrintJob, PrinterConfig};
//!
//! # async fn demo() -> Result<(), minithermal::PrinterError> {
//! let config = PrinterConfig::default();
//! let (manager, mut events) = ConnectionManager::new(RfcommAdapter::new(), config.clone())?;
//!
//! manager.connect(RemoteDevice::from_address("00:11:22:33:44:55"));
//! while let Some(event) = events.recv().await {
//!     if event == Event::StateChanged(minithermal::ConnectionState::Connected) {
//!         break;
//!     }
//! }
//! manager.print(&PrintJob::text("Hello", config.code_page()?)?).await;
//! manager.stop();
//! # Ok(())
//! # }
//! ```

mod connector;
mod listener;
pub mod session;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::PrinterError;
use crate::job::PrintJob;
use crate::printer::PrinterConfig;
use crate::transport::{Adapter, RemoteDevice, ServiceRecord};

pub use session::TransportSession;

/// Toast text sent when an outbound connection fails.
pub const MESSAGE_UNABLE_TO_CONNECT: &str = "Unable to connect device";

/// Toast text sent when an established link drops.
pub const MESSAGE_CONNECTION_LOST: &str = "Device connection was lost";

/// Link state. Exactly one at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Nothing running
    Idle,
    /// Waiting for a peer to connect to us
    Listening,
    /// Outbound connection in progress
    Connecting,
    /// Link established
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Listening => "listening",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Notification from the manager to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The state changed
    StateChanged(ConnectionState),
    /// Name of the device a link was just established with
    DeviceName(String),
    /// User-facing message
    Message(String),
    /// An established link dropped
    ConnectionLost,
    /// An outbound connection attempt failed
    UnableToConnect,
    /// Bytes read from the printer
    DataReceived(Vec<u8>),
    /// Payload written to the printer (without the prologue)
    DataWritten(Vec<u8>),
}

/// Receiving side of the manager's event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

type EventSender = mpsc::UnboundedSender<Event>;

/// A running task and the token that retires it.
struct Role {
    id: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Role {
    fn retire(self) {
        self.cancel.cancel();
    }

    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

struct Slots<S> {
    state: ConnectionState,
    next_id: u64,
    listener: Option<Role>,
    connector: Option<Role>,
    session: Option<(Role, Arc<TransportSession<S>>)>,
}

impl<S> Slots<S> {
    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

struct Shared<A: Adapter> {
    adapter: A,
    config: PrinterConfig,
    service: ServiceRecord,
    events: EventSender,
    runtime: Handle,
    slots: Mutex<Slots<A::Stream>>,
}

/// # Connection Manager
///
/// Cheap to clone; all clones drive the same link. Tasks run on the Tokio
/// runtime that was current when the manager was created.
///
/// Roles hold a clone of the manager while they run; call
/// [`stop`](Self::stop) to shut everything down.
pub struct ConnectionManager<A: Adapter> {
    shared: Arc<Shared<A>>,
}

impl<A: Adapter> Clone for ConnectionManager<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A: Adapter> ConnectionManager<A> {
    /// Create an idle manager driving `adapter`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(adapter: A, config: PrinterConfig) -> Result<(Self, EventReceiver), PrinterError> {
        let runtime = Handle::try_current()
            .map_err(|e| PrinterError::Runtime(format!("No Tokio runtime: {}", e)))?;
        let (events, receiver) = mpsc::unbounded_channel();
        let service = ServiceRecord::serial_port(config.service_channel);

        let manager = Self {
            shared: Arc::new(Shared {
                adapter,
                config,
                service,
                events,
                runtime,
                slots: Mutex::new(Slots {
                    state: ConnectionState::Idle,
                    next_id: 1,
                    listener: None,
                    connector: None,
                    session: None,
                }),
            }),
        };
        Ok((manager, receiver))
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Device on the other end of the current link, if any.
    pub fn device(&self) -> Option<RemoteDevice> {
        self.lock()
            .session
            .as_ref()
            .map(|(_, session)| session.device().clone())
    }

    /// Job and link settings.
    pub fn config(&self) -> &PrinterConfig {
        &self.shared.config
    }

    /// Service the listener binds.
    pub fn service(&self) -> &ServiceRecord {
        &self.shared.service
    }

    pub(crate) fn adapter(&self) -> &A {
        &self.shared.adapter
    }

    /// Listen for inbound connections.
    ///
    /// Drops any outbound attempt and any open link. An already running
    /// listener is kept.
    pub fn start(&self) {
        let mut slots = self.lock();
        self.start_locked(&mut slots);
    }

    /// Open an outbound link to `device`.
    ///
    /// Replaces any earlier attempt and drops any open link. A running
    /// listener is kept, so a peer connecting in the meantime still wins.
    pub fn connect(&self, device: RemoteDevice) {
        let mut slots = self.lock();
        tracing::debug!(device = %device, "connect");

        if let Some(role) = slots.connector.take() {
            tracing::debug!(id = role.id, "retiring connector");
            role.retire();
        }
        if let Some((role, _)) = slots.session.take() {
            tracing::debug!(id = role.id, "retiring session");
            role.retire();
        }

        let id = slots.allocate_id();
        let cancel = CancellationToken::new();
        let task = self.shared.runtime.spawn(connector::run(
            self.clone(),
            id,
            cancel.clone(),
            device,
        ));
        slots.connector = Some(Role { id, cancel, task });

        self.set_state_locked(&mut slots, ConnectionState::Connecting);
    }

    /// Stop every role and go idle. Nothing restarts on its own afterwards.
    pub fn stop(&self) {
        let mut slots = self.lock();
        tracing::debug!("stop");
        self.set_state_locked(&mut slots, ConnectionState::Idle);
        Self::retire_all(&mut slots);
    }

    /// Send `bytes` over the open link, prefixed with the prologue.
    ///
    /// Does nothing unless connected. Write failures are logged; a broken
    /// link is reported by the session's read side.
    pub async fn write(&self, bytes: &[u8]) {
        let session = {
            let slots = self.lock();
            if slots.state != ConnectionState::Connected {
                tracing::debug!(len = bytes.len(), state = %slots.state, "not connected, write dropped");
                return;
            }
            slots.session.as_ref().map(|(_, session)| Arc::clone(session))
        };

        if let Some(session) = session {
            if let Err(e) = session.write(bytes).await {
                tracing::warn!(error = %e, "write failed");
            }
        }
    }

    /// Write each frame of `job` in order. Does nothing unless connected.
    pub async fn print(&self, job: &PrintJob) {
        if self.state() != ConnectionState::Connected {
            tracing::debug!(frames = job.len(), "not connected, job dropped");
            return;
        }
        for frame in job {
            self.write(frame).await;
        }
    }

    // ========================================================================
    // Role reports
    // ========================================================================

    /// A listener or connector produced a link.
    ///
    /// Returns `false` (and closes `stream`) when the manager doesn't want
    /// it: the reporting role was replaced, or the state is idle or already
    /// connected.
    pub(crate) fn connected(&self, origin: u64, stream: A::Stream, device: RemoteDevice) -> bool {
        let mut slots = self.lock();

        if matches!(
            slots.state,
            ConnectionState::Idle | ConnectionState::Connected
        ) {
            tracing::debug!(device = %device, state = %slots.state, "link not wanted, closing");
            return false;
        }
        let current = slots.listener.as_ref().is_some_and(|r| r.id == origin)
            || slots.connector.as_ref().is_some_and(|r| r.id == origin);
        if !current {
            tracing::debug!(id = origin, device = %device, "link from retired role, closing");
            return false;
        }

        Self::retire_all(&mut slots);

        let id = slots.allocate_id();
        let cancel = CancellationToken::new();
        let (session, reader) = TransportSession::new(
            stream,
            device.clone(),
            self.shared.config.code_table,
            self.shared.events.clone(),
        );
        let task = self.shared.runtime.spawn(session::run(
            self.clone(),
            id,
            cancel.clone(),
            reader,
            self.shared.config.read_buffer,
        ));
        slots.session = Some((Role { id, cancel, task }, Arc::new(session)));

        tracing::info!(device = %device, "connected");
        self.emit(Event::DeviceName(device.name));
        self.set_state_locked(&mut slots, ConnectionState::Connected);
        true
    }

    /// The connector `origin` could not reach its device.
    pub(crate) fn connection_failed(&self, origin: u64) {
        let mut slots = self.lock();
        if !slots.connector.as_ref().is_some_and(|r| r.id == origin) {
            tracing::debug!(id = origin, "failure from retired connector ignored");
            return;
        }
        slots.connector = None;

        self.emit(Event::UnableToConnect);
        self.emit(Event::Message(MESSAGE_UNABLE_TO_CONNECT.to_string()));
        self.start_locked(&mut slots);
    }

    /// The session `origin` saw its link close.
    pub(crate) fn connection_lost(&self, origin: u64) {
        let mut slots = self.lock();
        if !slots.session.as_ref().is_some_and(|(r, _)| r.id == origin) {
            tracing::debug!(id = origin, "loss from retired session ignored");
            return;
        }
        slots.session = None;

        self.emit(Event::ConnectionLost);
        self.emit(Event::Message(MESSAGE_CONNECTION_LOST.to_string()));
        if slots.state != ConnectionState::Idle {
            self.start_locked(&mut slots);
        }
    }

    pub(crate) fn emit(&self, event: Event) {
        // Owner may have dropped the receiver
        let _ = self.shared.events.send(event);
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn lock(&self) -> MutexGuard<'_, Slots<A::Stream>> {
        self.shared
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn start_locked(&self, slots: &mut Slots<A::Stream>) {
        tracing::debug!("start");
        if let Some(role) = slots.connector.take() {
            tracing::debug!(id = role.id, "retiring connector");
            role.retire();
        }
        if let Some((role, _)) = slots.session.take() {
            tracing::debug!(id = role.id, "retiring session");
            role.retire();
        }

        if !slots.listener.as_ref().is_some_and(Role::is_running) {
            let id = slots.allocate_id();
            let cancel = CancellationToken::new();
            let task = self
                .shared
                .runtime
                .spawn(listener::run(self.clone(), id, cancel.clone()));
            slots.listener = Some(Role { id, cancel, task });
        }

        self.set_state_locked(slots, ConnectionState::Listening);
    }

    fn retire_all(slots: &mut Slots<A::Stream>) {
        let roles = [
            slots.listener.take(),
            slots.connector.take(),
            slots.session.take().map(|(role, _)| role),
        ];
        for role in roles.into_iter().flatten() {
            tracing::debug!(id = role.id, "retiring role");
            role.retire();
        }
    }

    fn set_state_locked(&self, slots: &mut Slots<A::Stream>, state: ConnectionState) {
        if slots.state == state {
            return;
        }
        tracing::info!(from = %slots.state, to = %state, "connection state changed");
        slots.state = state;
        self.emit(Event::StateChanged(state));
    }
}
