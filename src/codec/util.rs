//! Zero-allocation (de)serialization helpers shared by every wire codec.
//!
//! This is the teacher's own `core::util` pattern (a `Serializer`/`Deserializer` pair of
//! traits driving fixed-capacity `heapless::Vec` buffers) generalized so the same traits
//! serve PCP, NAT-PMP and the small binary pieces of UPnP alike.

use std::net::Ipv6Addr;

use super::CodecError;

pub type Result<T> = core::result::Result<T, CodecError>;

#[repr(transparent)]
pub struct Deserializer<'a>(&'a [u8]);

impl<'a> Deserializer<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self(bytes)
    }

    pub fn remaining(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn skip(&mut self, by: usize) -> Result<&mut Self> {
        self.advance(by)?;
        Ok(self)
    }

    pub fn advance(&mut self, by: usize) -> Result<&'a [u8]> {
        if self.0.len() < by {
            return Err(CodecError::TruncatedMessage);
        }
        let (taken, rest) = self.0.split_at(by);
        self.0 = rest;
        Ok(taken)
    }

    pub fn advance_all(&mut self) -> &'a [u8] {
        let all = self.0;
        self.0 = &[];
        all
    }

    pub fn deserialize<T: Deserialize>(&mut self) -> Result<T> {
        T::deserialize(self)
    }
}

pub trait Deserialize: Sized {
    fn deserialize(data: &mut Deserializer<'_>) -> Result<Self>;
}

impl<const S: usize> Deserialize for [u8; S] {
    fn deserialize(data: &mut Deserializer<'_>) -> Result<Self> {
        let slice = data.advance(S)?;
        Ok(slice.try_into().expect("advance(S) yields exactly S bytes"))
    }
}

impl Deserialize for u8 {
    fn deserialize(data: &mut Deserializer<'_>) -> Result<Self> {
        Ok(data.advance(1)?[0])
    }
}

impl Deserialize for u16 {
    fn deserialize(data: &mut Deserializer<'_>) -> Result<Self> {
        data.deserialize().map(u16::from_be_bytes)
    }
}

impl Deserialize for u32 {
    fn deserialize(data: &mut Deserializer<'_>) -> Result<Self> {
        data.deserialize().map(u32::from_be_bytes)
    }
}

impl Deserialize for Ipv6Addr {
    fn deserialize(data: &mut Deserializer<'_>) -> Result<Self> {
        data.deserialize().map(<[u8; 16]>::into)
    }
}

/// A `heapless`-backed output buffer; `SIZE` is the maximum encoded length, which for
/// every message in this crate is known at compile time (PCP caps at
/// [`super::pcp::MAX_PACKET_SIZE`], NAT-PMP messages are all small fixed sizes).
#[repr(transparent)]
pub struct Serializer<const SIZE: usize>(heapless::Vec<u8, SIZE>);

impl<const SIZE: usize> Serializer<SIZE> {
    pub fn new() -> Self {
        Self(heapless::Vec::new())
    }

    pub fn push(&mut self, data: &[u8]) -> Result<&mut Self> {
        self.0
            .extend_from_slice(data)
            .map_err(|_| CodecError::OversizedMessage)?;
        Ok(self)
    }

    pub fn serialize<T: Serialize>(&mut self, value: T) -> Result<&mut Self> {
        value.serialize(self)?;
        Ok(self)
    }

    pub fn into_vec(self) -> heapless::Vec<u8, SIZE> {
        self.0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const SIZE: usize> Default for Serializer<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Serialize {
    fn serialize<const S: usize>(self, buffer: &mut Serializer<S>) -> Result<()>;
}

impl Serialize for &[u8] {
    fn serialize<const S: usize>(self, buffer: &mut Serializer<S>) -> Result<()> {
        buffer.push(self)?;
        Ok(())
    }
}

impl<const SIZE: usize> Serialize for [u8; SIZE] {
    fn serialize<const S: usize>(self, buffer: &mut Serializer<S>) -> Result<()> {
        buffer.push(&self)?;
        Ok(())
    }
}

impl Serialize for u8 {
    fn serialize<const S: usize>(self, buffer: &mut Serializer<S>) -> Result<()> {
        buffer.push(&[self])?;
        Ok(())
    }
}

impl Serialize for u16 {
    fn serialize<const S: usize>(self, buffer: &mut Serializer<S>) -> Result<()> {
        buffer.push(&self.to_be_bytes())?;
        Ok(())
    }
}

impl Serialize for u32 {
    fn serialize<const S: usize>(self, buffer: &mut Serializer<S>) -> Result<()> {
        buffer.push(&self.to_be_bytes())?;
        Ok(())
    }
}

impl Serialize for Ipv6Addr {
    fn serialize<const S: usize>(self, buffer: &mut Serializer<S>) -> Result<()> {
        buffer.push(&self.octets())?;
        Ok(())
    }
}

/// Renders an IPv4 or IPv6 address as the 16-byte PCP/NAT-PMP-style wire form: an IPv6
/// address is used directly, an IPv4 address is represented via its IPv4-mapped form
/// (`::ffff:a.b.c.d`), as required throughout spec §4.1.1.
pub fn to_wire_address(addr: std::net::IpAddr) -> Ipv6Addr {
    match addr {
        std::net::IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        std::net::IpAddr::V6(v6) => v6,
    }
}

/// The inverse of [`to_wire_address`]: collapses an IPv4-mapped IPv6 address back down
/// to its `IpAddr::V4` form, leaving genuine IPv6 addresses untouched.
pub fn from_wire_address(addr: Ipv6Addr) -> std::net::IpAddr {
    match addr.to_ipv4_mapped() {
        Some(v4) => std::net::IpAddr::V4(v4),
        None => std::net::IpAddr::V6(addr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn wire_address_round_trip_v4() {
        let v4 = Ipv4Addr::new(192, 168, 1, 101);
        let wire = to_wire_address(v4.into());
        assert_eq!(wire, Ipv6Addr::new(0, 0, 0, 0, 0, 0xffff, 0xc0a8, 0x0165));
        assert_eq!(from_wire_address(wire), std::net::IpAddr::V4(v4));
    }

    #[test]
    fn wire_address_round_trip_v6() {
        let v6: Ipv6Addr = "2001:db8::1".parse().unwrap();
        assert_eq!(from_wire_address(to_wire_address(v6.into())), std::net::IpAddr::from(v6));
    }
}
