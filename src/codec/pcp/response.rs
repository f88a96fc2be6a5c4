//! The PCP response message: 24-byte header (result code, lifetime, epoch), the same
//! opcode-specific payload as the request, and an option list (RFC 6887 §7.2, §14).

use std::net::Ipv6Addr;

use super::epoch::Epoch;
use super::option::PcpOption;
use super::payload::{MapPayload, PeerPayload};
use super::result_code::ResultCode;
use super::{OpCode, MAX_PACKET_SIZE, VERSION};
use crate::codec::util::{Deserializer, Result, Serializer};
use crate::codec::CodecError;

#[derive(Clone, Debug, PartialEq)]
pub enum ResponsePayload {
    Announce,
    Map(MapPayload),
    Peer(PeerPayload),
}

impl ResponsePayload {
    pub fn opcode(&self) -> OpCode {
        match self {
            Self::Announce => OpCode::Announce,
            Self::Map(_) => OpCode::Map,
            Self::Peer(_) => OpCode::Peer,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub result_code: ResultCode,
    pub lifetime: u32,
    pub epoch: Epoch,
    pub payload: ResponsePayload,
    pub options: Vec<PcpOption>,
}

impl Response {
    fn encoded_size(&self) -> usize {
        let payload_len = match &self.payload {
            ResponsePayload::Announce => 0,
            ResponsePayload::Map(_) => MapPayload::SIZE,
            ResponsePayload::Peer(_) => PeerPayload::SIZE,
        };
        24 + payload_len + self.options.iter().map(PcpOption::size).sum::<usize>()
    }

    pub fn encode(&self) -> Result<heapless::Vec<u8, MAX_PACKET_SIZE>> {
        if self.encoded_size() > MAX_PACKET_SIZE {
            return Err(CodecError::OversizedMessage);
        }
        let mut buffer = Serializer::<MAX_PACKET_SIZE>::new();
        buffer.serialize(VERSION)?;
        buffer.serialize(self.payload.opcode() as u8 | 0x80)?; // R bit set
        buffer.push(&[0u8])?; // reserved
        buffer.serialize(self.result_code)?;
        buffer.serialize(self.lifetime)?;
        buffer.serialize(self.epoch.0)?;
        buffer.push(&[0u8; 12])?; // reserved
        match &self.payload {
            ResponsePayload::Announce => {}
            ResponsePayload::Map(map) => map.encode(&mut buffer)?,
            ResponsePayload::Peer(peer) => peer.encode(&mut buffer)?,
        }
        for option in &self.options {
            option.encode(&mut buffer)?;
        }
        Ok(buffer.into_vec())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 24 {
            return Err(CodecError::TruncatedMessage);
        }
        if bytes.len() > MAX_PACKET_SIZE {
            return Err(CodecError::OversizedMessage);
        }
        let mut data = Deserializer::new(bytes);
        let version: u8 = data.deserialize()?;
        if version != VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let opcode_byte: u8 = data.deserialize()?;
        if opcode_byte & 0x80 == 0 {
            return Err(CodecError::MalformedHeader); // R bit clear: this is a request
        }
        let opcode = OpCode::try_from(opcode_byte & 0x7f)?;
        data.skip(1)?;
        let result_code: ResultCode = data.deserialize()?;
        let lifetime: u32 = data.deserialize()?;
        let epoch_value: u32 = data.deserialize()?;
        data.skip(12)?;

        let payload = match opcode {
            OpCode::Announce => ResponsePayload::Announce,
            OpCode::Map => ResponsePayload::Map(MapPayload::decode(&mut data)?),
            OpCode::Peer => ResponsePayload::Peer(PeerPayload::decode(&mut data)?),
        };

        let mut options = Vec::new();
        while !data.is_empty() {
            options.push(PcpOption::decode(&mut data)?);
        }

        Ok(Self { result_code, lifetime, epoch: Epoch(epoch_value), payload, options })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_payload() -> MapPayload {
        MapPayload {
            nonce: [9; 12],
            protocol: 17,
            internal_port: 5353,
            suggested_external_port: 5353,
            suggested_external_addr: Ipv6Addr::UNSPECIFIED,
        }
    }

    fn sample() -> Response {
        Response {
            result_code: ResultCode::Success,
            lifetime: 7200,
            epoch: Epoch(123_456),
            payload: ResponsePayload::Map(map_payload()),
            options: Vec::new(),
        }
    }

    #[test]
    fn map_response_round_trips() {
        let response = sample();
        let encoded = response.encode().unwrap();
        assert_eq!(Response::decode(&encoded).unwrap(), response);
    }

    #[test]
    fn response_bit_is_set_on_the_wire() {
        let encoded = sample().encode().unwrap();
        assert_eq!(encoded[1] & 0x80, 0x80);
    }

    #[test]
    fn request_bytes_are_rejected_by_response_decode() {
        let mut bytes = sample().encode().unwrap();
        bytes[1] &= 0x7f;
        assert_eq!(Response::decode(&bytes), Err(CodecError::MalformedHeader));
    }

    #[test]
    fn error_response_carries_result_code() {
        let mut response = sample();
        response.result_code = ResultCode::NetworkFailure;
        response.payload = ResponsePayload::Map(MapPayload { internal_port: 0, ..map_payload() });
        let encoded = response.encode().unwrap();
        let decoded = Response::decode(&encoded).unwrap();
        assert!(!decoded.result_code.is_success());
    }
}
