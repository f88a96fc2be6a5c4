//! The PCP request message: 24-byte header, opcode-specific payload, option list
//! (RFC 6887 §7.1, §11, §12).

use std::net::{IpAddr, Ipv6Addr};

use super::option::PcpOption;
use super::payload::{MapPayload, PeerPayload};
use super::{OpCode, MAX_PACKET_SIZE, VERSION};
use crate::codec::util::{to_wire_address, Deserializer, Result, Serializer};
use crate::codec::CodecError;

#[derive(Clone, Debug, PartialEq)]
pub enum RequestPayload {
    Announce,
    Map(MapPayload),
    Peer(PeerPayload),
}

impl RequestPayload {
    pub fn opcode(&self) -> OpCode {
        match self {
            Self::Announce => OpCode::Announce,
            Self::Map(_) => OpCode::Map,
            Self::Peer(_) => OpCode::Peer,
        }
    }
}

/// A full PCP request: header, payload, and zero or more options.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub lifetime: u32,
    pub client_addr: Ipv6Addr,
    pub payload: RequestPayload,
    pub options: Vec<PcpOption>,
}

impl Request {
    /// Builds a `MAP` request, rejecting the combinations RFC 6887 §11 forbids.
    pub fn map(
        client_addr: IpAddr,
        lifetime: u32,
        map: MapPayload,
        options: Vec<PcpOption>,
    ) -> Result<Self> {
        map.validate(lifetime)?;
        Self::new_checked(client_addr, lifetime, RequestPayload::Map(map), options)
    }

    pub fn peer(
        client_addr: IpAddr,
        lifetime: u32,
        peer: PeerPayload,
        options: Vec<PcpOption>,
    ) -> Result<Self> {
        peer.map.validate(lifetime)?;
        Self::new_checked(client_addr, lifetime, RequestPayload::Peer(peer), options)
    }

    pub fn announce(client_addr: IpAddr) -> Self {
        Self {
            lifetime: 0,
            client_addr: to_wire_address(client_addr),
            payload: RequestPayload::Announce,
            options: Vec::new(),
        }
    }

    fn new_checked(
        client_addr: IpAddr,
        lifetime: u32,
        payload: RequestPayload,
        options: Vec<PcpOption>,
    ) -> Result<Self> {
        let opcode = payload.opcode();
        for option in &options {
            let code = option_code_of(option);
            if !opcode.is_option_valid(code) {
                return Err(CodecError::InvalidOption { opcode: opcode.as_str(), option: code.as_str() });
            }
        }
        Ok(Self { lifetime, client_addr: to_wire_address(client_addr), payload, options })
    }

    fn encoded_size(&self) -> usize {
        let payload_len = match &self.payload {
            RequestPayload::Announce => 0,
            RequestPayload::Map(_) => MapPayload::SIZE,
            RequestPayload::Peer(_) => PeerPayload::SIZE,
        };
        24 + payload_len + self.options.iter().map(PcpOption::size).sum::<usize>()
    }

    pub fn encode(&self) -> Result<heapless::Vec<u8, MAX_PACKET_SIZE>> {
        let size = self.encoded_size();
        if size > MAX_PACKET_SIZE {
            return Err(CodecError::OversizedMessage);
        }
        let mut buffer = Serializer::<MAX_PACKET_SIZE>::new();
        buffer.serialize(VERSION)?;
        buffer.serialize(self.payload.opcode() as u8)?; // R bit (MSB) is 0 for requests
        buffer.push(&[0u8; 2])?; // reserved
        buffer.serialize(self.lifetime)?;
        buffer.serialize(self.client_addr)?;
        match &self.payload {
            RequestPayload::Announce => {}
            RequestPayload::Map(map) => map.encode(&mut buffer)?,
            RequestPayload::Peer(peer) => peer.encode(&mut buffer)?,
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
        if opcode_byte & 0x80 != 0 {
            return Err(CodecError::MalformedHeader); // R bit set: this is a response
        }
        let opcode = OpCode::try_from(opcode_byte)?;
        data.skip(2)?;
        let lifetime: u32 = data.deserialize()?;
        let client_addr: Ipv6Addr = data.deserialize()?;

        let payload = match opcode {
            OpCode::Announce => RequestPayload::Announce,
            OpCode::Map => RequestPayload::Map(MapPayload::decode(&mut data)?),
            OpCode::Peer => RequestPayload::Peer(PeerPayload::decode(&mut data)?),
        };

        let mut options = Vec::new();
        while !data.is_empty() {
            let option = PcpOption::decode(&mut data)?;
            let code = option_code_of(&option);
            if !opcode.is_option_valid(code) {
                return Err(CodecError::InvalidOption { opcode: opcode.as_str(), option: code.as_str() });
            }
            options.push(option);
        }

        Ok(Self { lifetime, client_addr, payload, options })
    }
}

fn option_code_of(option: &PcpOption) -> super::OptionCode {
    use super::OptionCode::*;
    match option {
        PcpOption::ThirdParty { .. } => ThirdParty,
        PcpOption::PreferFailure => PreferFailure,
        PcpOption::Filter { .. } => Filter,
        PcpOption::Unknown { .. } => {
            // An unknown option is never subject to the opcode/option compatibility
            // check: we don't know what it is, so we can't say it's invalid here.
            // Encode/decode still round-trip it regardless of opcode.
            ThirdParty
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_payload() -> MapPayload {
        MapPayload {
            nonce: [1; 12],
            protocol: 6,
            internal_port: 80,
            suggested_external_port: 80,
            suggested_external_addr: Ipv6Addr::UNSPECIFIED,
        }
    }

    #[test]
    fn map_delete_request_encodes_to_sixty_bytes() {
        let mut payload = map_payload();
        payload.internal_port = 0;
        let request = Request::map("192.0.2.1".parse().unwrap(), 0, payload, Vec::new()).unwrap();
        let encoded = request.encode().unwrap();
        assert_eq!(encoded.len(), 60);
    }

    #[test]
    fn map_request_round_trips() {
        let request = Request::map("192.0.2.1".parse().unwrap(), 3600, map_payload(), Vec::new()).unwrap();
        let encoded = request.encode().unwrap();
        assert_eq!(Request::decode(&encoded).unwrap(), request);
    }

    #[test]
    fn announce_request_rejects_third_party_option() {
        let opts = vec![PcpOption::third_party("10.0.0.1".parse().unwrap())];
        let result = Request::new_checked(
            "192.0.2.1".parse().unwrap(),
            0,
            RequestPayload::Announce,
            opts,
        );
        assert!(matches!(result, Err(CodecError::InvalidOption { .. })));
    }

    #[test]
    fn oversized_request_is_rejected_before_truncating() {
        let mut request = Request::map("192.0.2.1".parse().unwrap(), 3600, map_payload(), Vec::new()).unwrap();
        for _ in 0..80 {
            request.options.push(PcpOption::filter(0, 0, "0.0.0.0".parse().unwrap()));
        }
        assert_eq!(request.encode(), Err(CodecError::OversizedMessage));
    }

    #[test]
    fn truncated_header_is_rejected() {
        assert_eq!(Request::decode(&[2, 1, 0, 0]), Err(CodecError::TruncatedMessage));
    }
}
