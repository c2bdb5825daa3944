//! # Connection Tests
//!
//! Drive the connection manager against an in-memory adapter. Links are
//! `tokio::io::duplex` pairs: the manager gets one end, the test plays the
//! printer on the other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use minithermal::connection::{
    ConnectionManager, ConnectionState, Event, EventReceiver, MESSAGE_CONNECTION_LOST,
    MESSAGE_UNABLE_TO_CONNECT,
};
use minithermal::transport::{Acceptor, Adapter, RemoteDevice, ServiceRecord};
use minithermal::{PrintJob, PrinterConfig, PrinterError};

const PRINTER: &str = "00:11:22:33:44:55";
const OTHER_PRINTER: &str = "66:77:88:99:AA:BB";
const PHONE: &str = "DE:AD:BE:EF:00:01";

const PROLOGUE: [u8; 5] = [0x1C, 0x2E, 0x1B, 0x74, 0x10];

// ============================================================================
// MOCK ADAPTER
// ============================================================================

#[derive(Clone, Copy)]
enum Outbound {
    Accept,
    Refuse,
    Hang,
}

struct MockState {
    outbound: Mutex<HashMap<String, Outbound>>,
    listen_fails: bool,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<(DuplexStream, RemoteDevice)>>,
    printers: mpsc::UnboundedSender<(String, DuplexStream)>,
    discovery_cancels: AtomicUsize,
    listens: AtomicUsize,
}

struct MockAdapter(Arc<MockState>);

struct MockAcceptor(Arc<MockState>);

#[async_trait]
impl Adapter for MockAdapter {
    type Stream = DuplexStream;
    type Acceptor = MockAcceptor;

    async fn cancel_discovery(&self) {
        self.0.discovery_cancels.fetch_add(1, Ordering::SeqCst);
    }

    async fn listen(&self, service: &ServiceRecord) -> Result<MockAcceptor, PrinterError> {
        assert_eq!(service.uuid, ServiceRecord::SERIAL_PORT_UUID);
        self.0.listens.fetch_add(1, Ordering::SeqCst);
        if self.0.listen_fails {
            return Err(PrinterError::Bind("channel busy".to_string()));
        }
        Ok(MockAcceptor(Arc::clone(&self.0)))
    }

    async fn connect(
        &self,
        device: &RemoteDevice,
        _service: &ServiceRecord,
    ) -> Result<DuplexStream, PrinterError> {
        let behavior = self
            .0
            .outbound
            .lock()
            .unwrap()
            .get(&device.address)
            .copied()
            .unwrap_or(Outbound::Refuse);

        match behavior {
            Outbound::Accept => {
                let (ours, theirs) = tokio::io::duplex(4096);
                self.0.printers.send((device.address.clone(), theirs)).unwrap();
                Ok(ours)
            }
            Outbound::Refuse => Err(PrinterError::Connect("host is down".to_string())),
            Outbound::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl Acceptor for MockAcceptor {
    type Stream = DuplexStream;

    async fn accept(&mut self) -> Result<(DuplexStream, RemoteDevice), PrinterError> {
        let mut inbound = self.0.inbound.lock().await;
        inbound
            .recv()
            .await
            .ok_or_else(|| PrinterError::Transport("adapter gone".to_string()))
    }
}

// ============================================================================
// HARNESS
// ============================================================================

struct Harness {
    manager: ConnectionManager<MockAdapter>,
    events: EventReceiver,
    mock: Arc<MockState>,
    peers: mpsc::UnboundedSender<(DuplexStream, RemoteDevice)>,
    printers: mpsc::UnboundedReceiver<(String, DuplexStream)>,
}

impl Harness {
    fn new(outbound: &[(&str, Outbound)]) -> Self {
        Self::build(outbound, false)
    }

    fn build(outbound: &[(&str, Outbound)], listen_fails: bool) -> Self {
        let (peers, inbound) = mpsc::unbounded_channel();
        let (printer_tx, printers) = mpsc::unbounded_channel();
        let mock = Arc::new(MockState {
            outbound: Mutex::new(
                outbound
                    .iter()
                    .map(|(addr, behavior)| (addr.to_string(), *behavior))
                    .collect(),
            ),
            listen_fails,
            inbound: tokio::sync::Mutex::new(inbound),
            printers: printer_tx,
            discovery_cancels: AtomicUsize::new(0),
            listens: AtomicUsize::new(0),
        });
        let (manager, events) =
            ConnectionManager::new(MockAdapter(Arc::clone(&mock)), PrinterConfig::default())
                .unwrap();
        Self {
            manager,
            events,
            mock,
            peers,
            printers,
        }
    }

    async fn next_event(&mut self) -> Event {
        timeout(Duration::from_secs(2), self.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn expect_events(&mut self, expected: &[Event]) {
        for want in expected {
            assert_eq!(&self.next_event().await, want);
        }
    }

    async fn expect_quiet(&mut self) {
        let next = timeout(Duration::from_millis(200), self.events.recv()).await;
        assert!(next.is_err(), "unexpected event: {:?}", next);
    }

    async fn printer(&mut self) -> (String, DuplexStream) {
        timeout(Duration::from_secs(2), self.printers.recv())
            .await
            .expect("timed out waiting for outbound link")
            .expect("printer channel closed")
    }

    /// Simulate a peer connecting to our listener; returns the peer's end.
    fn inbound(&self, address: &str) -> DuplexStream {
        let (ours, theirs) = tokio::io::duplex(4096);
        self.peers
            .send((ours, RemoteDevice::from_address(address)))
            .unwrap();
        theirs
    }

    async fn connect_to_printer(&mut self) -> DuplexStream {
        self.manager
            .connect(RemoteDevice::new(PRINTER, "MTP-II"));
        self.expect_events(&[
            Event::StateChanged(ConnectionState::Connecting),
            Event::DeviceName("MTP-II".to_string()),
            Event::StateChanged(ConnectionState::Connected),
        ])
        .await;
        let (address, link) = self.printer().await;
        assert_eq!(address, PRINTER);
        link
    }
}

async fn read_exactly(link: &mut DuplexStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    timeout(Duration::from_secs(2), link.read_exact(&mut buf))
        .await
        .expect("timed out reading from link")
        .unwrap();
    buf
}

// ============================================================================
// STATE MACHINE
// ============================================================================

#[tokio::test]
async fn test_new_manager_is_idle() {
    let mut h = Harness::new(&[]);
    assert_eq!(h.manager.state(), ConnectionState::Idle);
    assert!(h.manager.device().is_none());
    h.expect_quiet().await;
}

#[tokio::test]
async fn test_start_listens() {
    let mut h = Harness::new(&[]);
    h.manager.start();
    h.expect_events(&[Event::StateChanged(ConnectionState::Listening)])
        .await;
    assert_eq!(h.manager.state(), ConnectionState::Listening);
}

#[tokio::test]
async fn test_start_twice_keeps_one_listener() {
    let mut h = Harness::new(&[]);
    h.manager.start();
    h.manager.start();
    h.expect_events(&[Event::StateChanged(ConnectionState::Listening)])
        .await;
    h.expect_quiet().await;
    assert_eq!(h.mock.listens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_inbound_connection() {
    let mut h = Harness::new(&[]);
    h.manager.start();
    let _peer = h.inbound(PHONE);

    h.expect_events(&[
        Event::StateChanged(ConnectionState::Listening),
        Event::DeviceName(PHONE.to_string()),
        Event::StateChanged(ConnectionState::Connected),
    ])
    .await;
    assert_eq!(h.manager.state(), ConnectionState::Connected);
    assert_eq!(h.manager.device(), Some(RemoteDevice::from_address(PHONE)));
}

#[tokio::test]
async fn test_outbound_connection() {
    let mut h = Harness::new(&[(PRINTER, Outbound::Accept)]);
    let _link = h.connect_to_printer().await;
    assert_eq!(h.manager.state(), ConnectionState::Connected);
    assert!(h.mock.discovery_cancels.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_connect_failure_falls_back_to_listening() {
    let mut h = Harness::new(&[(PRINTER, Outbound::Refuse)]);
    h.manager.connect(RemoteDevice::from_address(PRINTER));

    h.expect_events(&[
        Event::StateChanged(ConnectionState::Connecting),
        Event::UnableToConnect,
        Event::Message(MESSAGE_UNABLE_TO_CONNECT.to_string()),
        Event::StateChanged(ConnectionState::Listening),
    ])
    .await;
    assert_eq!(h.manager.state(), ConnectionState::Listening);
}

#[tokio::test]
async fn test_connection_lost_falls_back_to_listening() {
    let mut h = Harness::new(&[(PRINTER, Outbound::Accept)]);
    let link = h.connect_to_printer().await;

    drop(link);
    h.expect_events(&[
        Event::ConnectionLost,
        Event::Message(MESSAGE_CONNECTION_LOST.to_string()),
        Event::StateChanged(ConnectionState::Listening),
    ])
    .await;
    assert!(h.manager.device().is_none());
}

#[tokio::test]
async fn test_reconnect_after_loss() {
    let mut h = Harness::new(&[(PRINTER, Outbound::Accept)]);
    let link = h.connect_to_printer().await;
    drop(link);
    h.expect_events(&[
        Event::ConnectionLost,
        Event::Message(MESSAGE_CONNECTION_LOST.to_string()),
        Event::StateChanged(ConnectionState::Listening),
    ])
    .await;

    let _peer = h.inbound(PHONE);
    h.expect_events(&[
        Event::DeviceName(PHONE.to_string()),
        Event::StateChanged(ConnectionState::Connected),
    ])
    .await;
}

#[tokio::test]
async fn test_stop_closes_link_without_fallback() {
    let mut h = Harness::new(&[(PRINTER, Outbound::Accept)]);
    let mut link = h.connect_to_printer().await;

    h.manager.stop();
    h.expect_events(&[Event::StateChanged(ConnectionState::Idle)])
        .await;

    // Our end was dropped: the printer sees EOF
    let mut buf = [0u8; 8];
    let n = timeout(Duration::from_secs(2), link.read(&mut buf))
        .await
        .expect("link left open")
        .unwrap();
    assert_eq!(n, 0);

    h.expect_quiet().await;
    assert_eq!(h.manager.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn test_stop_while_connecting() {
    let mut h = Harness::new(&[(PRINTER, Outbound::Hang)]);
    h.manager.connect(RemoteDevice::from_address(PRINTER));
    h.manager.stop();

    h.expect_events(&[
        Event::StateChanged(ConnectionState::Connecting),
        Event::StateChanged(ConnectionState::Idle),
    ])
    .await;
    h.expect_quiet().await;
}

#[tokio::test]
async fn test_second_connect_supersedes_first() {
    let mut h = Harness::new(&[(PRINTER, Outbound::Hang), (OTHER_PRINTER, Outbound::Accept)]);
    h.manager.connect(RemoteDevice::from_address(PRINTER));
    h.manager.connect(RemoteDevice::from_address(OTHER_PRINTER));

    h.expect_events(&[
        Event::StateChanged(ConnectionState::Connecting),
        Event::DeviceName(OTHER_PRINTER.to_string()),
        Event::StateChanged(ConnectionState::Connected),
    ])
    .await;
    h.expect_quiet().await;

    let (address, _link) = h.printer().await;
    assert_eq!(address, OTHER_PRINTER);
    assert_eq!(h.manager.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_superseded_failure_is_ignored() {
    let mut h = Harness::new(&[(PRINTER, Outbound::Refuse), (OTHER_PRINTER, Outbound::Hang)]);
    h.manager.connect(RemoteDevice::from_address(PRINTER));
    h.manager.connect(RemoteDevice::from_address(OTHER_PRINTER));

    h.expect_events(&[Event::StateChanged(ConnectionState::Connecting)])
        .await;
    h.expect_quiet().await;
    assert_eq!(h.manager.state(), ConnectionState::Connecting);
}

#[tokio::test]
async fn test_listener_kept_while_connecting() {
    let mut h = Harness::new(&[(PRINTER, Outbound::Hang)]);
    h.manager.start();
    h.manager.connect(RemoteDevice::from_address(PRINTER));
    let _peer = h.inbound(PHONE);

    h.expect_events(&[
        Event::StateChanged(ConnectionState::Listening),
        Event::StateChanged(ConnectionState::Connecting),
        Event::DeviceName(PHONE.to_string()),
        Event::StateChanged(ConnectionState::Connected),
    ])
    .await;
    h.expect_quiet().await;
}

#[tokio::test]
async fn test_bind_failure_keeps_outbound_working() {
    let mut h = Harness::build(&[(PRINTER, Outbound::Accept)], true);
    h.manager.start();
    h.expect_events(&[Event::StateChanged(ConnectionState::Listening)])
        .await;
    h.expect_quiet().await;

    let _link = h.connect_to_printer().await;
}

// ============================================================================
// DATA
// ============================================================================

#[tokio::test]
async fn test_write_prefixes_prologue() {
    let mut h = Harness::new(&[(PRINTER, Outbound::Accept)]);
    let mut link = h.connect_to_printer().await;

    h.manager.write(&[0x1B, 0x40]).await;

    let bytes = read_exactly(&mut link, 7).await;
    assert_eq!(bytes, [0x1C, 0x2E, 0x1B, 0x74, 0x10, 0x1B, 0x40]);
    h.expect_events(&[Event::DataWritten(vec![0x1B, 0x40])]).await;
}

#[tokio::test]
async fn test_write_while_not_connected_is_noop() {
    let mut h = Harness::new(&[]);
    h.manager.write(b"nobody home").await;
    h.manager.print(&PrintJob::text("hi", Default::default()).unwrap()).await;
    h.expect_quiet().await;
}

#[tokio::test]
async fn test_write_while_listening_or_connecting_is_dropped() {
    let mut h = Harness::new(&[(PRINTER, Outbound::Hang)]);
    let job = PrintJob::text("early", Default::default()).unwrap();

    h.manager.start();
    h.expect_events(&[Event::StateChanged(ConnectionState::Listening)])
        .await;
    h.manager.write(b"while listening").await;
    h.manager.print(&job).await;
    h.expect_quiet().await;

    h.manager.connect(RemoteDevice::from_address(PRINTER));
    h.expect_events(&[Event::StateChanged(ConnectionState::Connecting)])
        .await;
    h.manager.write(b"while connecting").await;
    h.manager.print(&job).await;
    h.expect_quiet().await;

    let mut peer = h.inbound(PHONE);
    h.expect_events(&[
        Event::DeviceName(PHONE.to_string()),
        Event::StateChanged(ConnectionState::Connected),
    ])
    .await;

    h.manager.write(&[0x1B, 0x40]).await;
    h.expect_events(&[Event::DataWritten(vec![0x1B, 0x40])]).await;

    let bytes = read_exactly(&mut peer, PROLOGUE.len() + 2).await;
    assert_eq!(bytes, [&PROLOGUE[..], &[0x1B, 0x40]].concat());

    // Nothing buffered from before the link came up
    let mut extra = [0u8; 1];
    let more = timeout(Duration::from_millis(200), peer.read(&mut extra)).await;
    assert!(more.is_err(), "unexpected bytes after first write: {:?}", more);
}

#[tokio::test]
async fn test_print_writes_frames_in_order() {
    let mut h = Harness::new(&[(PRINTER, Outbound::Accept)]);
    let mut link = h.connect_to_printer().await;

    let job = PrintJob::text("Hi", Default::default()).unwrap();
    h.manager.print(&job).await;

    let mut expected = Vec::new();
    for frame in &job {
        expected.extend_from_slice(&PROLOGUE);
        expected.extend_from_slice(frame);
    }
    let bytes = read_exactly(&mut link, expected.len()).await;
    assert_eq!(bytes, expected);

    h.expect_events(&[
        Event::DataWritten(b"Hi".to_vec()),
        Event::DataWritten(vec![0x0A]),
        Event::DataWritten(b"\n\n".to_vec()),
    ])
    .await;
}

#[tokio::test]
async fn test_data_received() {
    let mut h = Harness::new(&[(PRINTER, Outbound::Accept)]);
    let mut link = h.connect_to_printer().await;

    link.write_all(b"OK").await.unwrap();
    h.expect_events(&[Event::DataReceived(b"OK".to_vec())]).await;
}

#[tokio::test]
async fn test_clones_share_state() {
    let mut h = Harness::new(&[]);
    let other = h.manager.clone();
    other.start();
    h.expect_events(&[Event::StateChanged(ConnectionState::Listening)])
        .await;
    assert_eq!(h.manager.state(), ConnectionState::Listening);
}
