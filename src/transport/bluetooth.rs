//! # Bluetooth RFCOMM Transport
//!
//! Mini thermal printers speak the Serial Port Profile (SPP): a plain byte
//! stream over an RFCOMM channel. This module talks to BlueZ directly through
//! `AF_BLUETOOTH` sockets, registered with the Tokio reactor, so no
//! `/dev/rfcommN` binding is needed.
//!
//! ## Bluetooth Setup (Linux)
//!
//! The printer must be paired before an outbound connection can succeed:
//!
//! ```bash
//! $ bluetoothctl
//! [bluetooth]# scan on
//! # Look for "MTP-II", "MPT-II" or similar; note the address
//! [bluetooth]# pair 00:11:22:XX:XX:XX
//! [bluetooth]# trust 00:11:22:XX:XX:XX
//! ```
//!
//! ## Listening
//!
//! [`RfcommAdapter::listen`] binds an RFCOMM socket on the configured channel
//! and, unless disabled, advertises it with `sdptool add --channel=N SP` so
//! that phones and other hosts can find the Serial Port service. Advertising
//! needs `bluetoothd` in compatibility mode (`-C`); when it fails the
//! listener still works for peers that already know the channel.
//!
//! The record is added once per adapter (and its clones), not once per
//! listener: the manager rebinds after every lost or failed link, and each
//! `sdptool add` creates a new record that lives as long as `bluetoothd`.
//!
//! ## Socket Layout
//!
//! ```text
//! struct sockaddr_rc {
//!     sa_family_t rc_family;    // AF_BLUETOOTH
//!     bdaddr_t    rc_bdaddr;    // 6 bytes, least significant first
//!     uint8_t     rc_channel;   // 1-30
//! };
//! ```

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, ready};

use async_trait::async_trait;
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::process::Command;

use super::{Acceptor, Adapter, RemoteDevice, ServiceRecord};
use crate::error::PrinterError;

/// `BTPROTO_RFCOMM` from `<bluetooth/bluetooth.h>`
const BTPROTO_RFCOMM: libc::c_int = 3;

/// Pending connections queued by the kernel
const LISTEN_BACKLOG: libc::c_int = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct SockaddrRc {
    rc_family: libc::sa_family_t,
    rc_bdaddr: [u8; 6],
    rc_channel: u8,
}

impl SockaddrRc {
    fn new(bdaddr: [u8; 6], channel: u8) -> Self {
        Self {
            rc_family: libc::AF_BLUETOOTH as libc::sa_family_t,
            rc_bdaddr: bdaddr,
            rc_channel: channel,
        }
    }

    const LEN: libc::socklen_t = mem::size_of::<SockaddrRc>() as libc::socklen_t;
}

// ============================================================================
// ADDRESSES
// ============================================================================

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return false;
    }
    parts
        .iter()
        .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Parse `XX:XX:XX:XX:XX:XX` into a kernel `bdaddr_t` (byte order reversed).
pub fn parse_bdaddr(mac: &str) -> Option<[u8; 6]> {
    if !is_valid_mac(mac) {
        return None;
    }
    let mut bdaddr = [0u8; 6];
    for (slot, part) in bdaddr.iter_mut().rev().zip(mac.split(':')) {
        *slot = u8::from_str_radix(part, 16).ok()?;
    }
    Some(bdaddr)
}

/// Format a kernel `bdaddr_t` as `XX:XX:XX:XX:XX:XX`.
pub fn format_bdaddr(bdaddr: &[u8; 6]) -> String {
    bdaddr
        .iter()
        .rev()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

// ============================================================================
// SOCKETS
// ============================================================================

fn register_fd(fd: OwnedFd) -> io::Result<AsyncFd<OwnedFd>> {
    AsyncFd::try_new(fd).map_err(|e| e.into_parts().1)
}

fn rfcomm_socket() -> io::Result<OwnedFd> {
    let fd = unsafe {
        libc::socket(
            libc::AF_BLUETOOTH,
            libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            BTPROTO_RFCOMM,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn bind_listener(channel: u8) -> io::Result<OwnedFd> {
    let fd = rfcomm_socket()?;
    // BDADDR_ANY: accept on every local adapter
    let addr = SockaddrRc::new([0; 6], channel);

    let rc = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            (&addr as *const SockaddrRc).cast(),
            SockaddrRc::LEN,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    let rc = unsafe { libc::listen(fd.as_raw_fd(), LISTEN_BACKLOG) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(fd)
}

async fn connect_socket(bdaddr: [u8; 6], channel: u8) -> io::Result<AsyncFd<OwnedFd>> {
    let fd = rfcomm_socket()?;
    let addr = SockaddrRc::new(bdaddr, channel);

    let rc = unsafe {
        libc::connect(
            fd.as_raw_fd(),
            (&addr as *const SockaddrRc).cast(),
            SockaddrRc::LEN,
        )
    };
    let pending = if rc < 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINPROGRESS) {
            return Err(err);
        }
        true
    } else {
        false
    };

    let fd = register_fd(fd)?;
    if pending {
        // Writable once the baseband link is up or has failed
        let _guard = fd.writable().await?;
        take_socket_error(fd.get_ref())?;
    }
    Ok(fd)
}

fn take_socket_error(fd: &OwnedFd) -> io::Result<()> {
    let mut err: libc::c_int = 0;
    let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            (&mut err as *mut libc::c_int).cast(),
            &mut len,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    if err != 0 {
        return Err(io::Error::from_raw_os_error(err));
    }
    Ok(())
}

// ============================================================================
// ADAPTER
// ============================================================================

/// # RFCOMM Adapter
///
/// The local BlueZ radio.
///
/// ## Example
///
/// ```no_run
/// use minithermal::transport::{Adapter, RemoteDevice, ServiceRecord, RfcommAdapter};
/// use tokio::io::AsyncWriteExt;
///
/// # async fn demo() -> Result<(), minithermal::PrinterError> {
/// let adapter = RfcommAdapter::new();
/// let printer = RemoteDevice::from_address("00:11:22:33:44:55");
/// let mut link = adapter.connect(&printer, &ServiceRecord::default()).await?;
/// link.write_all(&[0x1B, 0x40]).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RfcommAdapter {
    register_sdp: bool,
    sdp_registered: Arc<AtomicBool>,
}

impl RfcommAdapter {
    /// Adapter that advertises listeners over SDP.
    pub fn new() -> Self {
        Self {
            register_sdp: true,
            sdp_registered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Adapter that binds listeners without touching the SDP database.
    pub fn without_sdp() -> Self {
        Self {
            register_sdp: false,
            sdp_registered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether this listen should add the SDP record. At most one caller
    /// wins until [`release_sdp`](Self::release_sdp).
    fn claim_sdp(&self) -> bool {
        self.register_sdp && !self.sdp_registered.swap(true, Ordering::AcqRel)
    }

    /// Registration failed; let the next listen try again.
    fn release_sdp(&self) {
        self.sdp_registered.store(false, Ordering::Release);
    }
}

impl Default for RfcommAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn sdp_add_command(channel: u8) -> Command {
    let mut cmd = Command::new("sdptool");
    cmd.arg("add")
        .arg(format!("--channel={}", channel))
        .arg("SP")
        .kill_on_drop(true);
    cmd
}

fn scan_off_command() -> Command {
    let mut cmd = Command::new("bluetoothctl");
    cmd.args(["scan", "off"]).kill_on_drop(true);
    cmd
}

/// Add the SPP record. Returns whether `sdptool` succeeded.
async fn register_service(service: &ServiceRecord) -> bool {
    match sdp_add_command(service.channel).output().await {
        Ok(out) if out.status.success() => {
            tracing::debug!(channel = service.channel, "registered SDP record");
            true
        }
        Ok(out) => {
            tracing::warn!(
                channel = service.channel,
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "sdptool could not register {}",
                service.name
            );
            false
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to run sdptool");
            false
        }
    }
}

#[async_trait]
impl Adapter for RfcommAdapter {
    type Stream = RfcommStream;
    type Acceptor = RfcommAcceptor;

    async fn cancel_discovery(&self) {
        match scan_off_command().output().await {
            Ok(_) => tracing::trace!("discovery stopped"),
            Err(e) => tracing::debug!(error = %e, "could not stop discovery"),
        }
    }

    async fn listen(&self, service: &ServiceRecord) -> Result<RfcommAcceptor, PrinterError> {
        let fd = bind_listener(service.channel).map_err(|e| {
            PrinterError::Bind(format!("RFCOMM channel {}: {}", service.channel, e))
        })?;
        let inner = register_fd(fd)
            .map_err(|e| PrinterError::Bind(format!("Failed to register socket: {}", e)))?;

        if self.claim_sdp() && !register_service(service).await {
            self.release_sdp();
        }

        tracing::info!(channel = service.channel, uuid = %service.uuid, "listening for {}", service.name);
        Ok(RfcommAcceptor { inner })
    }

    async fn connect(
        &self,
        device: &RemoteDevice,
        service: &ServiceRecord,
    ) -> Result<RfcommStream, PrinterError> {
        let bdaddr = parse_bdaddr(&device.address).ok_or_else(|| {
            PrinterError::Connect(format!("Invalid Bluetooth address: {}", device.address))
        })?;

        let inner = connect_socket(bdaddr, service.channel)
            .await
            .map_err(|e| PrinterError::Connect(format!("{}: {}", device, e)))?;
        Ok(RfcommStream { inner })
    }
}

// ============================================================================
// ACCEPTOR
// ============================================================================

/// Listening RFCOMM socket.
#[derive(Debug)]
pub struct RfcommAcceptor {
    inner: AsyncFd<OwnedFd>,
}

#[async_trait]
impl Acceptor for RfcommAcceptor {
    type Stream = RfcommStream;

    async fn accept(&mut self) -> Result<(RfcommStream, RemoteDevice), PrinterError> {
        loop {
            let mut guard = self.inner.readable().await?;

            let accepted = guard.try_io(|inner| {
                let mut peer = SockaddrRc::new([0; 6], 0);
                let mut len = SockaddrRc::LEN;
                let fd = unsafe {
                    libc::accept4(
                        inner.as_raw_fd(),
                        (&mut peer as *mut SockaddrRc).cast(),
                        &mut len,
                        libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                    )
                };
                if fd < 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok((unsafe { OwnedFd::from_raw_fd(fd) }, peer))
            });

            match accepted {
                Ok(Ok((fd, peer))) => {
                    let device = RemoteDevice::from_address(format_bdaddr(&peer.rc_bdaddr));
                    let inner = register_fd(fd)?;
                    return Ok((RfcommStream { inner }, device));
                }
                Ok(Err(e)) => {
                    return Err(PrinterError::Transport(format!("accept failed: {}", e)));
                }
                Err(_would_block) => continue,
            }
        }
    }
}

// ============================================================================
// STREAM
// ============================================================================

/// Connected RFCOMM socket.
#[derive(Debug)]
pub struct RfcommStream {
    inner: AsyncFd<OwnedFd>,
}

impl AsyncRead for RfcommStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.inner.poll_read_ready(cx))?;

            let unfilled = buf.initialize_unfilled();
            let read = guard.try_io(|inner| {
                let n = unsafe {
                    libc::read(
                        inner.as_raw_fd(),
                        unfilled.as_mut_ptr().cast(),
                        unfilled.len(),
                    )
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });

            match read {
                Ok(Ok(n)) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for RfcommStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.inner.poll_write_ready(cx))?;

            let written = guard.try_io(|inner| {
                let n = unsafe {
                    libc::send(
                        inner.as_raw_fd(),
                        buf.as_ptr().cast(),
                        buf.len(),
                        libc::MSG_NOSIGNAL,
                    )
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });

            match written {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // send(2) hands bytes straight to the kernel
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let rc = unsafe { libc::shutdown(self.inner.as_raw_fd(), libc::SHUT_WR) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOTCONN) {
                return Poll::Ready(Err(err));
            }
        }
        Poll::Ready(Ok(()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
