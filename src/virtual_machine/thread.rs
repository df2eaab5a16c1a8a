//! Per-thread control blocks and the UDP handshake.
//!
//! Every thread owns a program counter, a wait status and, when the
//! instance is networked, a non-blocking UDP socket bound to
//! `ip:(port + index)`. `ask` and `answer` never block: a thread that is
//! still waiting on its peer keeps its program counter and the executor
//! retries the same instruction on its next step.

use crate::types::wide::U256;
use crate::virtual_machine::config::NetConfig;
use crate::virtual_machine::errors::Fault;
use crate::{debug, warn};
use std::fmt;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

/// Byte sent by `ask` to wake a peer waiting in `answer`.
pub const PROBE: u8 = 0x01;

/// Wait status of a thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadStatus {
    Running,
    /// Probe sent, acknowledgment not yet received.
    AwaitingReply,
    /// Listening for a probe.
    AwaitingProbe,
}

impl ThreadStatus {
    pub fn is_waiting(self) -> bool {
        self != ThreadStatus::Running
    }
}

/// Decoded network-address operand: IPv4, big-endian port and two
/// reserved bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetAddress {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub reserved: [u8; 2],
}

impl NetAddress {
    pub const BYTES: usize = 8;

    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self {
            ip,
            port,
            reserved: [0; 2],
        }
    }

    /// Decodes an 8-byte operand. Returns `None` for any other length.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let bytes: &[u8; Self::BYTES] = bytes.try_into().ok()?;
        Some(Self {
            ip: Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]),
            port: u16::from_be_bytes([bytes[4], bytes[5]]),
            reserved: [bytes[6], bytes[7]],
        })
    }

    pub fn encode(&self) -> [u8; Self::BYTES] {
        let mut out = [0u8; Self::BYTES];
        out[..4].copy_from_slice(&self.ip.octets());
        out[4..6].copy_from_slice(&self.port.to_be_bytes());
        out[6..].copy_from_slice(&self.reserved);
        out
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reserved = u16::from_be_bytes(self.reserved);
        write!(f, "{{{} / {} / {}}}", self.ip, self.port, reserved)
    }
}

/// Control block of one thread.
#[derive(Debug)]
pub struct ThreadControl {
    pc: U256,
    status: ThreadStatus,
    locked: bool,
    socket: Option<UdpSocket>,
    last_received: u8,
}

impl ThreadControl {
    /// Creates the control block of thread `index`, binding its socket when
    /// `net` is given.
    ///
    /// A thread whose socket cannot be bound is locked and never runs.
    pub fn open(index: usize, net: Option<&NetConfig>) -> Self {
        let mut control = Self {
            pc: U256::ZERO,
            status: ThreadStatus::Running,
            locked: false,
            socket: None,
            last_received: 0,
        };
        if let Some(net) = net {
            match bind(index, net) {
                Ok(socket) => control.socket = Some(socket),
                Err(reason) => {
                    warn!("thread {index}: {reason}, thread locked");
                    control.locked = true;
                }
            }
        }
        control
    }

    pub fn pc(&self) -> U256 {
        self.pc
    }

    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    pub fn is_waiting(&self) -> bool {
        self.status.is_waiting()
    }

    /// True when the thread's socket setup failed.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Last byte received by `ask`.
    pub fn last_received(&self) -> u8 {
        self.last_received
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Sets the program counter. The executor still advances it after the
    /// step, so the instruction after `target` runs next.
    pub fn jump(&mut self, target: U256) {
        self.pc = target;
    }

    /// Prepares the thread for a fresh run from instruction 0.
    pub(crate) fn rewind(&mut self) {
        self.pc = U256::ZERO;
        self.status = ThreadStatus::Running;
    }

    /// Moves past the instruction that just ran.
    pub(crate) fn advance(&mut self) {
        self.pc = self.pc.increment();
    }

    /// Closes the socket.
    pub(crate) fn close(&mut self) {
        self.socket = None;
        self.status = ThreadStatus::Running;
    }

    /// One step of `ask`: sends the probe if none is outstanding, then
    /// checks for the acknowledgment.
    pub fn ask(&mut self, thread: usize, peer: &NetAddress) -> Result<(), Fault> {
        let socket = self.socket.as_ref().ok_or(Fault::NoSocket { thread })?;
        if !self.status.is_waiting() {
            if let Err(err) = socket.send_to(&[PROBE], peer.socket_addr()) {
                debug!("thread {thread}: probe to {peer} failed: {err}");
            }
            self.status = ThreadStatus::AwaitingReply;
        }

        if let Some((byte, from)) = try_recv(socket, thread) {
            debug!("thread {thread}: acknowledged by {from}");
            self.last_received = byte;
            self.status = ThreadStatus::Running;
        }
        Ok(())
    }

    /// One step of `answer`: checks for a probe and acknowledges its sender.
    pub fn answer(&mut self, thread: usize) -> Result<(), Fault> {
        let socket = self.socket.as_ref().ok_or(Fault::NoSocket { thread })?;
        self.status = ThreadStatus::AwaitingProbe;

        if let Some((byte, from)) = try_recv(socket, thread) {
            if let Err(err) = socket.send_to(&[byte], from) {
                debug!("thread {thread}: acknowledgment to {from} failed: {err}");
            }
            self.status = ThreadStatus::Running;
        }
        Ok(())
    }
}

fn bind(index: usize, net: &NetConfig) -> Result<UdpSocket, String> {
    let port = if net.port == 0 {
        0
    } else {
        u16::try_from(index)
            .ok()
            .and_then(|offset| net.port.checked_add(offset))
            .ok_or_else(|| format!("port {} + {index} out of range", net.port))?
    };
    let addr = SocketAddrV4::new(net.ip, port);
    let socket = UdpSocket::bind(addr).map_err(|e| format!("bind {addr} failed: {e}"))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| format!("set_nonblocking on {addr} failed: {e}"))?;
    Ok(socket)
}

/// Non-blocking receive of one datagram. Empty datagrams and errors count
/// as nothing received.
fn try_recv(socket: &UdpSocket, thread: usize) -> Option<(u8, SocketAddr)> {
    let mut buf = [0u8; 1];
    match socket.recv_from(&mut buf) {
        Ok((0, _)) => None,
        Ok((_, from)) => Some((buf[0], from)),
        Err(err) if err.kind() == ErrorKind::WouldBlock => None,
        Err(err) => {
            debug!("thread {thread}: receive failed: {err}");
            None
        }
    }
}
