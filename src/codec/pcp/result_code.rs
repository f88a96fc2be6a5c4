use std::fmt;

use crate::codec::util::{Deserialize, Deserializer, Serialize, Serializer};
use crate::codec::util::Result;
use crate::codec::CodecError;

/// PCP result codes (RFC 6887 §7.4).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultCode {
    Success = 0,
    UnsuppVersion = 1,
    NotAuthorized = 2,
    MalformedRequest = 3,
    UnsuppOpcode = 4,
    UnsuppOption = 5,
    MalformedOption = 6,
    NetworkFailure = 7,
    NoResources = 8,
    UnsuppProtocol = 9,
    UserExQuota = 10,
    CannotProvideExternal = 11,
    AddressMismatch = 12,
    ExcessiveRemotePeers = 13,
}

impl ResultCode {
    pub const fn explain(&self) -> &'static str {
        use ResultCode::*;
        match self {
            Success => "Success",
            UnsuppVersion => "The PCP server does not recognize this version",
            NotAuthorized => "Operation disabled for this client, or server policy refuses it",
            MalformedRequest => "The request could not be successfully parsed",
            UnsuppOpcode => "Unsupported opcode",
            UnsuppOption => "Unsupported option",
            MalformedOption => "Malformed option",
            NetworkFailure => "The server or the device it controls has a network failure",
            NoResources => "Well-formed request, but the server lacks resources right now",
            UnsuppProtocol => "Unsupported transport protocol",
            UserExQuota => "This mapping would exceed the subscriber's port quota",
            CannotProvideExternal => "The suggested external port/address cannot be provided",
            AddressMismatch => "The request's source address doesn't match the client IP field",
            ExcessiveRemotePeers => "The server could not create the filters in this request",
        }
    }

    /// Whether this result comes with a usable lifetime value.
    ///
    /// RFC 6887 §8.3: on success, the lifetime field carries the granted lifetime; on
    /// error it instead carries a "retry no sooner than this many seconds" interval.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}: {}", self.explain())
    }
}

impl Deserialize for ResultCode {
    fn deserialize(data: &mut Deserializer<'_>) -> Result<Self> {
        match data.deserialize::<u8>()? {
            0 => Ok(Self::Success),
            1 => Ok(Self::UnsuppVersion),
            2 => Ok(Self::NotAuthorized),
            3 => Ok(Self::MalformedRequest),
            4 => Ok(Self::UnsuppOpcode),
            5 => Ok(Self::UnsuppOption),
            6 => Ok(Self::MalformedOption),
            7 => Ok(Self::NetworkFailure),
            8 => Ok(Self::NoResources),
            9 => Ok(Self::UnsuppProtocol),
            10 => Ok(Self::UserExQuota),
            11 => Ok(Self::CannotProvideExternal),
            12 => Ok(Self::AddressMismatch),
            13 => Ok(Self::ExcessiveRemotePeers),
            n => Err(CodecError::UnknownResultCode(n)),
        }
    }
}

impl Serialize for ResultCode {
    fn serialize<const S: usize>(self, buffer: &mut Serializer<S>) -> Result<()> {
        buffer.serialize(self as u8)?;
        Ok(())
    }
}
