//! The command set accepted by the multiplexer's single input queue (spec §4.2).

use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use tokio::sync::oneshot;

/// An opaque reference to a socket owned by the multiplexer. Handles are never reused
/// while live; once `Close`d the slot may be handed out again under a new generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketHandle {
    pub(crate) slot: usize,
    pub(crate) generation: u64,
}

#[derive(Debug)]
pub enum MuxError {
    Io(io::Error),
    /// The per-socket send buffer is full; resubmit the write after a delay.
    WouldBlock,
    /// The deadline elapsed before the operation completed.
    Timeout,
    /// The handle doesn't name a socket the multiplexer currently owns.
    UnknownHandle,
    /// The multiplexer has been `Kill`ed.
    Shutdown,
}

impl From<io::Error> for MuxError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl std::fmt::Display for MuxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::WouldBlock => write!(f, "send buffer full"),
            Self::Timeout => write!(f, "operation timed out"),
            Self::UnknownHandle => write!(f, "unknown socket handle"),
            Self::Shutdown => write!(f, "multiplexer shut down"),
        }
    }
}

impl std::error::Error for MuxError {}

/// One datagram or stream read result.
#[derive(Debug)]
pub struct ReadResult {
    pub bytes: Vec<u8>,
    /// The datagram's sender, for UDP sockets. `None` for TCP reads.
    pub from: Option<SocketAddr>,
}

pub enum Command {
    CreateUdp {
        local_addr: SocketAddr,
        reply: oneshot::Sender<Result<SocketHandle, MuxError>>,
    },
    CreateTcp {
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        reply: oneshot::Sender<Result<SocketHandle, MuxError>>,
    },
    /// `remote` is required for unconnected UDP sends and ignored for TCP.
    Write {
        handle: SocketHandle,
        bytes: Vec<u8>,
        remote: Option<SocketAddr>,
        reply: oneshot::Sender<Result<(), MuxError>>,
    },
    Read {
        handle: SocketHandle,
        max_bytes: usize,
        deadline: Instant,
        reply: oneshot::Sender<Result<ReadResult, MuxError>>,
    },
    Close {
        handle: SocketHandle,
    },
    Kill,
    GetLocalIps {
        reply: oneshot::Sender<Result<Vec<std::net::IpAddr>, MuxError>>,
    },
    LocalAddr {
        handle: SocketHandle,
        reply: oneshot::Sender<Result<SocketAddr, MuxError>>,
    },
}
