//! PCP option header + the three option payloads defined by RFC 6887 §7.3/§13,
//! plus a catch-all that preserves an unrecognized option's bytes unchanged.

use std::net::Ipv6Addr;

use super::OptionCode;
use crate::codec::util::{to_wire_address, Deserializer, Result, Serializer};
use crate::codec::CodecError;

/// Pads `len` up to the next multiple of 4, as every PCP option must be on the wire.
pub const fn padded(len: usize) -> usize {
    (len + 3) & !3
}

/// One decoded/to-be-encoded PCP option.
#[derive(Clone, Debug, PartialEq)]
pub enum PcpOption {
    ThirdParty { internal_addr: Ipv6Addr },
    PreferFailure,
    Filter { prefix: u8, remote_port: u16, remote_addr: Ipv6Addr },
    /// An option this crate doesn't know how to interpret, preserved byte-for-byte so
    /// it survives a decode/encode round trip untouched.
    Unknown { code: u8, payload: Vec<u8> },
}

impl PcpOption {
    fn code_byte(&self) -> u8 {
        match self {
            Self::ThirdParty { .. } => OptionCode::ThirdParty as u8,
            Self::PreferFailure => OptionCode::PreferFailure as u8,
            Self::Filter { .. } => OptionCode::Filter as u8,
            Self::Unknown { code, .. } => *code,
        }
    }

    fn payload_len(&self) -> usize {
        match self {
            Self::ThirdParty { .. } => 16,
            Self::PreferFailure => 0,
            Self::Filter { .. } => 20,
            Self::Unknown { payload, .. } => payload.len(),
        }
    }

    /// Total encoded size, header plus payload plus 4-byte padding.
    pub fn size(&self) -> usize {
        4 + padded(self.payload_len())
    }

    pub fn encode<const S: usize>(&self, buffer: &mut Serializer<S>) -> Result<()> {
        buffer.serialize(self.code_byte())?;
        buffer.serialize(0u8)?; // reserved
        buffer.serialize(self.payload_len() as u16)?;
        match self {
            Self::ThirdParty { internal_addr } => {
                buffer.serialize(*internal_addr)?;
            }
            Self::PreferFailure => {}
            Self::Filter { prefix, remote_port, remote_addr } => {
                buffer.serialize(0u8)?; // reserved
                buffer.serialize(*prefix)?;
                buffer.serialize(*remote_port)?;
                buffer.serialize(*remote_addr)?;
            }
            Self::Unknown { payload, .. } => {
                buffer.push(payload)?;
            }
        }
        let pad = padded(self.payload_len()) - self.payload_len();
        if pad > 0 {
            buffer.push(&[0u8; 3][..pad])?;
        }
        Ok(())
    }

    pub fn decode(data: &mut Deserializer<'_>) -> Result<Self> {
        if data.remaining() < 4 {
            return Err(CodecError::TruncatedMessage);
        }
        let code: u8 = data.deserialize()?;
        let _reserved: u8 = data.deserialize()?;
        let length: u16 = data.deserialize()?;
        let length = length as usize;

        let option = match OptionCode::try_from_byte(code) {
            Some(OptionCode::ThirdParty) => {
                if length != 16 {
                    return Err(CodecError::InvalidOptionLength { option: "THIRD_PARTY", length });
                }
                let addr: Ipv6Addr = data.deserialize()?;
                Self::ThirdParty { internal_addr: addr }
            }
            Some(OptionCode::PreferFailure) => {
                if length != 0 {
                    return Err(CodecError::InvalidOptionLength { option: "PREFER_FAILURE", length });
                }
                Self::PreferFailure
            }
            Some(OptionCode::Filter) => {
                if length != 20 {
                    return Err(CodecError::InvalidOptionLength { option: "FILTER", length });
                }
                let _reserved: u8 = data.deserialize()?;
                let prefix: u8 = data.deserialize()?;
                let remote_port: u16 = data.deserialize()?;
                let remote_addr: Ipv6Addr = data.deserialize()?;
                Self::Filter { prefix, remote_port, remote_addr }
            }
            None => {
                let payload = data.advance(length)?.to_vec();
                Self::Unknown { code, payload }
            }
        };

        let pad = padded(length) - length;
        if pad > 0 {
            data.advance(pad)?;
        }
        Ok(option)
    }

    pub fn third_party(internal_addr: std::net::IpAddr) -> Self {
        Self::ThirdParty { internal_addr: to_wire_address(internal_addr) }
    }

    pub fn prefer_failure() -> Self {
        Self::PreferFailure
    }

    pub fn filter(prefix: u8, remote_port: u16, remote_addr: std::net::IpAddr) -> Self {
        Self::Filter { prefix, remote_port, remote_addr: to_wire_address(remote_addr) }
    }
}

impl OptionCode {
    fn try_from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::ThirdParty),
            2 => Some(Self::PreferFailure),
            3 => Some(Self::Filter),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::util::Serializer;

    #[test]
    fn prefer_failure_round_trips() {
        let opt = PcpOption::prefer_failure();
        let mut buffer = Serializer::<64>::new();
        opt.encode(&mut buffer).unwrap();
        assert_eq!(buffer.len(), 4); // header only, already 4-byte aligned
        let mut d = Deserializer::new(buffer.as_slice());
        assert_eq!(PcpOption::decode(&mut d).unwrap(), opt);
    }

    #[test]
    fn filter_round_trips_with_no_padding_needed() {
        let opt = PcpOption::filter(24, 443, "203.0.113.9".parse().unwrap());
        let mut buffer = Serializer::<64>::new();
        opt.encode(&mut buffer).unwrap();
        assert_eq!(buffer.len(), opt.size());
        assert_eq!(opt.size() % 4, 0);
        let mut d = Deserializer::new(buffer.as_slice());
        assert_eq!(PcpOption::decode(&mut d).unwrap(), opt);
    }

    #[test]
    fn unknown_option_preserves_payload() {
        let mut buffer = Serializer::<64>::new();
        buffer.serialize(200u8).unwrap(); // an option code nobody defines
        buffer.serialize(0u8).unwrap();
        buffer.serialize(3u16).unwrap();
        buffer.push(&[1, 2, 3]).unwrap();
        buffer.push(&[0]).unwrap(); // padding to 4-byte boundary
        let mut d = Deserializer::new(buffer.as_slice());
        let decoded = PcpOption::decode(&mut d).unwrap();
        assert_eq!(decoded, PcpOption::Unknown { code: 200, payload: vec![1, 2, 3] });
        let mut reencoded = Serializer::<64>::new();
        decoded.encode(&mut reencoded).unwrap();
        assert_eq!(reencoded.as_slice(), buffer.as_slice());
    }

    #[test]
    fn truncated_option_header_is_rejected() {
        let mut d = Deserializer::new(&[1, 0]);
        assert_eq!(PcpOption::decode(&mut d), Err(CodecError::TruncatedMessage));
    }
}
