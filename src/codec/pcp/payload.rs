//! The per-opcode payloads that follow a PCP header (RFC 6887 §11, §12, §14.1, §14.2).

use std::net::Ipv6Addr;

use crate::codec::util::{Deserializer, Result, Serializer};
use crate::codec::CodecError;

/// The `MAP` opcode's request and response payload (RFC 6887 §11, §14.2). Both share
/// the same 36-byte layout; a response additionally carries the 24-byte header common
/// to every PCP response before this payload begins.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                 Mapping Nonce (96 bits)                      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Protocol    |          Reserved (24 bits)                  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |        Internal Port          |       Suggested External     |
/// |                                |              Port            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           Suggested External IP Address (128 bits)           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapPayload {
    pub nonce: [u8; 12],
    pub protocol: u8,
    pub internal_port: u16,
    pub suggested_external_port: u16,
    pub suggested_external_addr: Ipv6Addr,
}

impl MapPayload {
    pub const SIZE: usize = 36;

    /// RFC 6887 §11's two request-time constraints, and the symmetric rule the server
    /// applies on replies: a mapping for "all protocols" (protocol 0) has no port, and a
    /// lifetime-zero (delete) request carries no internal port either.
    pub fn validate(&self, lifetime: u32) -> Result<()> {
        if self.protocol == 0 && self.internal_port != 0 {
            return Err(CodecError::ConstraintViolation("internal_port must be 0 when protocol is 0"));
        }
        if self.internal_port == 0 && lifetime != 0 {
            return Err(CodecError::ConstraintViolation("lifetime must be 0 when internal_port is 0"));
        }
        Ok(())
    }

    pub fn encode<const S: usize>(&self, buffer: &mut Serializer<S>) -> Result<()> {
        buffer.push(&self.nonce)?;
        buffer.serialize(self.protocol)?;
        buffer.push(&[0u8; 3])?; // reserved
        buffer.serialize(self.internal_port)?;
        buffer.serialize(self.suggested_external_port)?;
        buffer.serialize(self.suggested_external_addr)?;
        Ok(())
    }

    pub fn decode(data: &mut Deserializer<'_>) -> Result<Self> {
        let nonce: [u8; 12] = data.deserialize()?;
        let protocol: u8 = data.deserialize()?;
        data.skip(3)?;
        let internal_port: u16 = data.deserialize()?;
        let suggested_external_port: u16 = data.deserialize()?;
        let suggested_external_addr: Ipv6Addr = data.deserialize()?;
        Ok(Self { nonce, protocol, internal_port, suggested_external_port, suggested_external_addr })
    }
}

/// The `PEER` opcode's request and response payload (RFC 6887 §12, §14.3): everything a
/// `MAP` payload carries, plus the remote peer's port and address.
///
/// ```text
/// <MapPayload's 36 bytes>
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |       Remote Peer Port       |     Reserved (16 bits)        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |               Remote Peer IP Address (128 bits)              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerPayload {
    pub map: MapPayload,
    pub remote_port: u16,
    pub remote_addr: Ipv6Addr,
}

impl PeerPayload {
    pub const SIZE: usize = MapPayload::SIZE + 20;

    pub fn encode<const S: usize>(&self, buffer: &mut Serializer<S>) -> Result<()> {
        self.map.encode(buffer)?;
        buffer.serialize(self.remote_port)?;
        buffer.push(&[0u8; 2])?; // reserved
        buffer.serialize(self.remote_addr)?;
        Ok(())
    }

    pub fn decode(data: &mut Deserializer<'_>) -> Result<Self> {
        let map = MapPayload::decode(data)?;
        let remote_port: u16 = data.deserialize()?;
        data.skip(2)?;
        let remote_addr: Ipv6Addr = data.deserialize()?;
        Ok(Self { map, remote_port, remote_addr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::util::Serializer;

    fn sample_map() -> MapPayload {
        MapPayload {
            nonce: [7; 12],
            protocol: 6,
            internal_port: 8080,
            suggested_external_port: 8080,
            suggested_external_addr: Ipv6Addr::UNSPECIFIED,
        }
    }

    #[test]
    fn map_payload_round_trips() {
        let payload = sample_map();
        let mut buffer = Serializer::<64>::new();
        payload.encode(&mut buffer).unwrap();
        assert_eq!(buffer.len(), MapPayload::SIZE);
        let mut d = Deserializer::new(buffer.as_slice());
        assert_eq!(MapPayload::decode(&mut d).unwrap(), payload);
    }

    #[test]
    fn map_payload_rejects_port_with_all_protocols() {
        let mut payload = sample_map();
        payload.protocol = 0;
        assert!(payload.validate(120).is_err());
    }

    #[test]
    fn map_payload_rejects_nonzero_lifetime_on_delete() {
        let mut payload = sample_map();
        payload.internal_port = 0;
        assert!(payload.validate(120).is_err());
        assert!(payload.validate(0).is_ok());
    }

    #[test]
    fn peer_payload_round_trips() {
        let payload = PeerPayload {
            map: sample_map(),
            remote_port: 443,
            remote_addr: "2001:db8::9".parse().unwrap(),
        };
        let mut buffer = Serializer::<96>::new();
        payload.encode(&mut buffer).unwrap();
        assert_eq!(buffer.len(), PeerPayload::SIZE);
        let mut d = Deserializer::new(buffer.as_slice());
        assert_eq!(PeerPayload::decode(&mut d).unwrap(), payload);
    }
}
