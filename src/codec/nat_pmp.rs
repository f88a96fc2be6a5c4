//! NAT-PMP (RFC 6886) wire encoding. Unlike PCP there's no transaction ID: requests and
//! responses are correlated purely by opcode and send order, which is why spec §4.1.2
//! requires callers to keep at most one outstanding NAT-PMP request per gateway.

use std::fmt;
use std::net::Ipv4Addr;

use crate::codec::util::{Deserializer, Result as CodecResult, Serializer};

/// RFC 6886 §1: "the NAT gateway MUST listen for both multicast and unicast UDP packets
/// on port 5351". Shared with PCP.
pub const SERVER_PORT: u16 = 5351;

pub const VERSION: u8 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NatPmpOpcode {
    ExternalAddress = 0,
    MapUdp = 1,
    MapTcp = 2,
}

impl NatPmpOpcode {
    fn from_request_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::ExternalAddress),
            1 => Some(Self::MapUdp),
            2 => Some(Self::MapTcp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NatPmpError {
    Truncated,
    UnsupportedVersion(u8),
    UnknownOpcode(u8),
    NotAResponse,
    UnknownResultCode(u16),
}

impl fmt::Display for NatPmpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "message truncated"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported version {v}"),
            Self::UnknownOpcode(op) => write!(f, "unknown opcode {op}"),
            Self::NotAResponse => write!(f, "response opcode did not have the reply bit set"),
            Self::UnknownResultCode(c) => write!(f, "unknown result code {c}"),
        }
    }
}

impl std::error::Error for NatPmpError {}

/// RFC 6886 §3.5's five result codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultCode {
    Success,
    UnsupportedVersion,
    NotAuthorizedOrRefused,
    NetworkFailure,
    OutOfResources,
    UnsupportedOpcode,
}

impl ResultCode {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    fn from_u16(value: u16) -> Result<Self, NatPmpError> {
        match value {
            0 => Ok(Self::Success),
            1 => Ok(Self::UnsupportedVersion),
            2 => Ok(Self::NotAuthorizedOrRefused),
            3 => Ok(Self::NetworkFailure),
            4 => Ok(Self::OutOfResources),
            5 => Ok(Self::UnsupportedOpcode),
            n => Err(NatPmpError::UnknownResultCode(n)),
        }
    }

    fn as_u16(self) -> u16 {
        self as u16
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Request {
    ExternalAddress,
    MapUdp { internal_port: u16, suggested_external_port: u16, lifetime_seconds: u32 },
    MapTcp { internal_port: u16, suggested_external_port: u16, lifetime_seconds: u32 },
}

impl Request {
    pub fn opcode(&self) -> NatPmpOpcode {
        match self {
            Self::ExternalAddress => NatPmpOpcode::ExternalAddress,
            Self::MapUdp { .. } => NatPmpOpcode::MapUdp,
            Self::MapTcp { .. } => NatPmpOpcode::MapTcp,
        }
    }

    pub fn encode(&self) -> heapless::Vec<u8, 12> {
        let mut buffer = Serializer::<12>::new();
        let _ = buffer.serialize(VERSION);
        let _ = buffer.serialize(self.opcode() as u8);
        match self {
            Self::ExternalAddress => {}
            Self::MapUdp { internal_port, suggested_external_port, lifetime_seconds }
            | Self::MapTcp { internal_port, suggested_external_port, lifetime_seconds } => {
                let _ = buffer.push(&[0u8; 2]); // reserved
                let _ = buffer.serialize(*internal_port);
                let _ = buffer.serialize(*suggested_external_port);
                let _ = buffer.serialize(*lifetime_seconds);
            }
        }
        buffer.into_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NatPmpError> {
        if bytes.len() < 2 {
            return Err(NatPmpError::Truncated);
        }
        let mut data = Deserializer::new(bytes);
        let version: u8 = data.deserialize().map_err(|_| NatPmpError::Truncated)?;
        if version != VERSION {
            return Err(NatPmpError::UnsupportedVersion(version));
        }
        let opcode_byte: u8 = data.deserialize().map_err(|_| NatPmpError::Truncated)?;
        let opcode = NatPmpOpcode::from_request_byte(opcode_byte).ok_or(NatPmpError::UnknownOpcode(opcode_byte))?;
        match opcode {
            NatPmpOpcode::ExternalAddress => Ok(Self::ExternalAddress),
            NatPmpOpcode::MapUdp | NatPmpOpcode::MapTcp => {
                fn as_codec<T>(r: CodecResult<T>) -> Result<T, NatPmpError> {
                    r.map_err(|_| NatPmpError::Truncated)
                }
                data.skip(2).map_err(|_| NatPmpError::Truncated)?;
                let internal_port: u16 = as_codec(data.deserialize())?;
                let suggested_external_port: u16 = as_codec(data.deserialize())?;
                let lifetime_seconds: u32 = as_codec(data.deserialize())?;
                Ok(if opcode == NatPmpOpcode::MapUdp {
                    Self::MapUdp { internal_port, suggested_external_port, lifetime_seconds }
                } else {
                    Self::MapTcp { internal_port, suggested_external_port, lifetime_seconds }
                })
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Response {
    ExternalAddress { result_code: ResultCode, epoch_seconds: u32, external_addr: Ipv4Addr },
    MapUdp(MappingResponse),
    MapTcp(MappingResponse),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MappingResponse {
    pub result_code: ResultCode,
    pub epoch_seconds: u32,
    pub internal_port: u16,
    pub external_port: u16,
    pub lifetime_seconds: u32,
}

impl Response {
    pub fn result_code(&self) -> ResultCode {
        match self {
            Self::ExternalAddress { result_code, .. } => *result_code,
            Self::MapUdp(m) | Self::MapTcp(m) => m.result_code,
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NatPmpError> {
        if bytes.len() < 2 {
            return Err(NatPmpError::Truncated);
        }
        let mut data = Deserializer::new(bytes);
        let version: u8 = data.deserialize().map_err(|_| NatPmpError::Truncated)?;
        if version != VERSION {
            return Err(NatPmpError::UnsupportedVersion(version));
        }
        let opcode_byte: u8 = data.deserialize().map_err(|_| NatPmpError::Truncated)?;
        if opcode_byte & 0x80 == 0 {
            return Err(NatPmpError::NotAResponse);
        }
        let opcode = NatPmpOpcode::from_request_byte(opcode_byte & 0x7f)
            .ok_or(NatPmpError::UnknownOpcode(opcode_byte & 0x7f))?;

        fn as_codec<T>(r: CodecResult<T>) -> Result<T, NatPmpError> {
            r.map_err(|_| NatPmpError::Truncated)
        }
        let result_value: u16 = as_codec(data.deserialize())?;
        let result_code = ResultCode::from_u16(result_value)?;
        let epoch_seconds: u32 = as_codec(data.deserialize())?;

        match opcode {
            NatPmpOpcode::ExternalAddress => {
                let octets: [u8; 4] = as_codec(data.deserialize())?;
                Ok(Self::ExternalAddress { result_code, epoch_seconds, external_addr: octets.into() })
            }
            NatPmpOpcode::MapUdp | NatPmpOpcode::MapTcp => {
                let internal_port: u16 = as_codec(data.deserialize())?;
                let external_port: u16 = as_codec(data.deserialize())?;
                let lifetime_seconds: u32 = as_codec(data.deserialize())?;
                let mapping = MappingResponse { result_code, epoch_seconds, internal_port, external_port, lifetime_seconds };
                Ok(if opcode == NatPmpOpcode::MapUdp { Self::MapUdp(mapping) } else { Self::MapTcp(mapping) })
            }
        }
    }

    /// Only used by tests and fakes: a real gateway is the one encoding responses.
    #[cfg(test)]
    fn encode(&self) -> heapless::Vec<u8, 16> {
        let mut buffer = Serializer::<16>::new();
        let (opcode, result_code, epoch_seconds) = match self {
            Self::ExternalAddress { result_code, epoch_seconds, .. } => (0u8, *result_code, *epoch_seconds),
            Self::MapUdp(m) => (1u8, m.result_code, m.epoch_seconds),
            Self::MapTcp(m) => (2u8, m.result_code, m.epoch_seconds),
        };
        let _ = buffer.serialize(VERSION);
        let _ = buffer.serialize(opcode | 0x80);
        let _ = buffer.serialize(result_code.as_u16());
        let _ = buffer.serialize(epoch_seconds);
        match self {
            Self::ExternalAddress { external_addr, .. } => {
                let _ = buffer.push(&external_addr.octets());
            }
            Self::MapUdp(m) | Self::MapTcp(m) => {
                let _ = buffer.serialize(m.internal_port);
                let _ = buffer.serialize(m.external_port);
                let _ = buffer.serialize(m.lifetime_seconds);
            }
        }
        buffer.into_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_udp_request_encodes_to_twelve_bytes() {
        let request = Request::MapUdp { internal_port: 6881, suggested_external_port: 6881, lifetime_seconds: 3600 };
        let encoded = request.encode();
        assert_eq!(encoded.len(), 12);
        assert_eq!(Request::decode(&encoded).unwrap(), request);
    }

    #[test]
    fn external_address_request_encodes_to_two_bytes() {
        let encoded = Request::ExternalAddress.encode();
        assert_eq!(encoded.as_slice(), &[0, 0]);
    }

    #[test]
    fn mapping_response_round_trips() {
        let response = Response::MapTcp(MappingResponse {
            result_code: ResultCode::Success,
            epoch_seconds: 42,
            internal_port: 22,
            external_port: 2222,
            lifetime_seconds: 3600,
        });
        let encoded = response.encode();
        assert_eq!(Response::decode(&encoded).unwrap(), response);
    }

    #[test]
    fn error_result_code_is_not_success() {
        let response = Response::ExternalAddress {
            result_code: ResultCode::OutOfResources,
            epoch_seconds: 0,
            external_addr: Ipv4Addr::UNSPECIFIED,
        };
        assert!(!response.result_code().is_success());
    }

    #[test]
    fn request_bytes_rejected_as_response() {
        let bytes = Request::ExternalAddress.encode();
        assert_eq!(Response::decode(&bytes), Err(NatPmpError::NotAResponse));
    }

    #[test]
    fn truncated_message_is_rejected() {
        assert_eq!(Request::decode(&[0]), Err(NatPmpError::Truncated));
    }
}
