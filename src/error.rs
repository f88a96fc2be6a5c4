//! The closed set of error kinds a caller of this crate ever sees (spec §7).

use std::fmt;
use std::io;

use crate::codec::CodecError;

/// Errors surfaced by a mapper operation (`map`/`refresh`/`unmap`) or by `discover`.
#[derive(Debug)]
pub enum Error {
    /// A request or response failed to (de)serialize.
    Codec(CodecError),
    /// The request timed out waiting for a correlated reply.
    Timeout,
    /// The destination is unreachable (ICMP unreachable, or no route).
    Unreachable(io::Error),
    /// The peer actively refused the connection (TCP `ECONNREFUSED`).
    ConnectionRefused,
    /// The peer reset an established connection.
    ConnectionReset,
    /// The gateway multiplexer was killed while this operation was outstanding.
    Shutdown,
    /// The gateway rejected the request with its own native result/error code.
    ServerFailure(ServerFailureCode),
    /// A client-side precondition was violated before any packet was sent.
    InvalidArgument(&'static str),
    /// Discovery found no gateway willing to respond to any probe.
    NoGatewayFound,
}

/// The protocol-native failure code carried by [`Error::ServerFailure`].
///
/// PCP and NAT-PMP both have small closed numeric result-code sets; UPnP-IGD SOAP
/// faults carry a `errorCode`/`errorDescription` pair instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFailureCode {
    Pcp(crate::codec::pcp::ResultCode),
    NatPmp(u16),
    UpnpSoap { error_code: u16, description: String },
}

impl Error {
    /// Whether retrying this error under the protocol's retry schedule is sensible.
    ///
    /// Codec and usage errors are never retried (spec §7 "Propagation"): the bytes we
    /// would send again are exactly as malformed or as disallowed as before. Transport
    /// timeouts and unreachability are transient by nature. Server failures are
    /// retried only when the code itself indicates a transient condition.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Timeout | Error::Unreachable(_) | Error::ConnectionReset => true,
            Error::ServerFailure(code) => code.is_transient(),
            Error::Codec(_)
            | Error::ConnectionRefused
            | Error::Shutdown
            | Error::InvalidArgument(_)
            | Error::NoGatewayFound => false,
        }
    }
}

impl ServerFailureCode {
    fn is_transient(&self) -> bool {
        use crate::codec::pcp::ResultCode::*;
        match self {
            ServerFailureCode::Pcp(code) => matches!(
                code,
                NetworkFailure | NoResources | UserExQuota | CannotProvideExternal
            ),
            // Unsupported-version/opcode/not-authorized are permanent; everything else
            // (busy/server-error-ish) is given a chance to recover.
            ServerFailureCode::NatPmp(result) => !matches!(result, 1 | 2 | 5),
            ServerFailureCode::UpnpSoap { error_code, .. } => {
                // 501 Action Failed and 714/715 (no such entry/wildcards) are treated as
                // transient busy responses; anything else (e.g. 401 Invalid Action, 402
                // Invalid Args, 606 Action not authorized) is permanent.
                matches!(error_code, 501 | 714 | 715)
            }
        }
    }
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        Self::Codec(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => Self::Timeout,
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused,
            io::ErrorKind::ConnectionReset => Self::ConnectionReset,
            _ => Self::Unreachable(err),
        }
    }
}

impl From<crate::mux::MuxError> for Error {
    fn from(err: crate::mux::MuxError) -> Self {
        match err {
            crate::mux::MuxError::Io(err) => err.into(),
            crate::mux::MuxError::WouldBlock => Self::Timeout,
            crate::mux::MuxError::Timeout => Self::Timeout,
            crate::mux::MuxError::UnknownHandle => Self::Shutdown,
            crate::mux::MuxError::Shutdown => Self::Shutdown,
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::Codec(a), Error::Codec(b)) => a == b,
            (Error::Timeout, Error::Timeout) => true,
            (Error::Unreachable(a), Error::Unreachable(b)) => a.kind() == b.kind(),
            (Error::ConnectionRefused, Error::ConnectionRefused) => true,
            (Error::ConnectionReset, Error::ConnectionReset) => true,
            (Error::Shutdown, Error::Shutdown) => true,
            (Error::ServerFailure(a), Error::ServerFailure(b)) => a == b,
            (Error::InvalidArgument(a), Error::InvalidArgument(b)) => a == b,
            (Error::NoGatewayFound, Error::NoGatewayFound) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Codec(err) => write!(f, "codec error: {err}"),
            Error::Timeout => write!(f, "operation timed out waiting for a reply"),
            Error::Unreachable(err) => write!(f, "gateway unreachable: {err}"),
            Error::ConnectionRefused => write!(f, "connection refused by gateway"),
            Error::ConnectionReset => write!(f, "connection reset by gateway"),
            Error::Shutdown => write!(f, "gateway multiplexer was shut down"),
            Error::ServerFailure(code) => write!(f, "gateway rejected the request: {code:?}"),
            Error::InvalidArgument(field) => write!(f, "invalid argument: {field}"),
            Error::NoGatewayFound => write!(f, "no responsive gateway was found"),
        }
    }
}

impl std::error::Error for Error {}
