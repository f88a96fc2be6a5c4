//! The four mapper drivers and the `Mapper` tagged enum that lets the discovery engine
//! hand back a uniform handle regardless of which protocol answered (spec §4.4, §9).
//!
//! Grounded on the `Mapping` enum shape in `n0-computer-net-tools`'s portmapper
//! (`portmapper/src/mapping.rs`): one variant per concrete protocol, each wrapping a
//! driver struct, with the enum itself providing the common operation set by dispatch
//! rather than by trait object (so each driver keeps its own extra constructor
//! arguments instead of being squeezed through one object-safe shape).

mod nat_pmp;
mod pcp;
#[cfg(test)]
mod test_support;
mod upnp_common;
mod upnp_firewall;
mod upnp_port;

pub use nat_pmp::NatPmpMapper;
pub use pcp::PcpMapper;
pub use upnp_firewall::UpnpFirewallMapper;
pub use upnp_port::UpnpPortMapper;

use crate::error::Error;
use crate::types::{MappedPort, PortType};

/// The common shape every concrete driver in this module implements. `Mapper` dispatches
/// to it rather than boxing a `dyn MapperDriver`, since discovery always knows exactly
/// which protocol produced a given candidate and nothing here needs dynamic dispatch.
pub trait MapperDriver {
    async fn map(
        &mut self,
        ty: PortType,
        internal_port: u16,
        external_hint: u16,
        lifetime: u32,
    ) -> Result<MappedPort, Error>;
    async fn refresh(&mut self, port: &MappedPort, lifetime: u32) -> Result<MappedPort, Error>;
    async fn unmap(&mut self, port: &MappedPort) -> Result<(), Error>;
}

impl MapperDriver for NatPmpMapper {
    async fn map(&mut self, ty: PortType, internal_port: u16, external_hint: u16, lifetime: u32) -> Result<MappedPort, Error> {
        NatPmpMapper::map(self, ty, internal_port, external_hint, lifetime).await
    }
    async fn refresh(&mut self, port: &MappedPort, lifetime: u32) -> Result<MappedPort, Error> {
        NatPmpMapper::refresh(self, port, lifetime).await
    }
    async fn unmap(&mut self, port: &MappedPort) -> Result<(), Error> {
        NatPmpMapper::unmap(self, port).await
    }
}

impl MapperDriver for PcpMapper {
    async fn map(&mut self, ty: PortType, internal_port: u16, external_hint: u16, lifetime: u32) -> Result<MappedPort, Error> {
        PcpMapper::map(self, ty, internal_port, external_hint, lifetime).await
    }
    async fn refresh(&mut self, port: &MappedPort, lifetime: u32) -> Result<MappedPort, Error> {
        PcpMapper::refresh(self, port, lifetime).await
    }
    async fn unmap(&mut self, port: &MappedPort) -> Result<(), Error> {
        PcpMapper::unmap(self, port).await
    }
}

impl MapperDriver for UpnpPortMapper {
    async fn map(&mut self, ty: PortType, internal_port: u16, external_hint: u16, lifetime: u32) -> Result<MappedPort, Error> {
        UpnpPortMapper::map(self, ty, internal_port, external_hint, lifetime).await
    }
    async fn refresh(&mut self, port: &MappedPort, lifetime: u32) -> Result<MappedPort, Error> {
        UpnpPortMapper::refresh(self, port, lifetime).await
    }
    async fn unmap(&mut self, port: &MappedPort) -> Result<(), Error> {
        UpnpPortMapper::unmap(self, port).await
    }
}

impl MapperDriver for UpnpFirewallMapper {
    async fn map(&mut self, ty: PortType, internal_port: u16, external_hint: u16, lifetime: u32) -> Result<MappedPort, Error> {
        UpnpFirewallMapper::map(self, ty, internal_port, external_hint, lifetime).await
    }
    async fn refresh(&mut self, port: &MappedPort, lifetime: u32) -> Result<MappedPort, Error> {
        UpnpFirewallMapper::refresh(self, port, lifetime).await
    }
    async fn unmap(&mut self, port: &MappedPort) -> Result<(), Error> {
        UpnpFirewallMapper::unmap(self, port).await
    }
}

/// A discovered gateway, tagged by which protocol it speaks. `map`/`refresh`/`unmap`
/// dispatch to whichever driver this instance wraps.
pub enum Mapper {
    NatPmp(NatPmpMapper),
    Pcp(PcpMapper),
    UpnpIgdPort(UpnpPortMapper),
    UpnpIgdFirewall(UpnpFirewallMapper),
}

impl Mapper {
    pub async fn map(
        &mut self,
        ty: PortType,
        internal_port: u16,
        external_hint: u16,
        lifetime: u32,
    ) -> Result<MappedPort, Error> {
        match self {
            Mapper::NatPmp(driver) => driver.map(ty, internal_port, external_hint, lifetime).await,
            Mapper::Pcp(driver) => driver.map(ty, internal_port, external_hint, lifetime).await,
            Mapper::UpnpIgdPort(driver) => driver.map(ty, internal_port, external_hint, lifetime).await,
            Mapper::UpnpIgdFirewall(driver) => driver.map(ty, internal_port, external_hint, lifetime).await,
        }
    }

    pub async fn refresh(&mut self, port: &MappedPort, lifetime: u32) -> Result<MappedPort, Error> {
        match self {
            Mapper::NatPmp(driver) => driver.refresh(port, lifetime).await,
            Mapper::Pcp(driver) => driver.refresh(port, lifetime).await,
            Mapper::UpnpIgdPort(driver) => driver.refresh(port, lifetime).await,
            Mapper::UpnpIgdFirewall(driver) => driver.refresh(port, lifetime).await,
        }
    }

    pub async fn unmap(&mut self, port: &MappedPort) -> Result<(), Error> {
        match self {
            Mapper::NatPmp(driver) => driver.unmap(port).await,
            Mapper::Pcp(driver) => driver.unmap(port).await,
            Mapper::UpnpIgdPort(driver) => driver.unmap(port).await,
            Mapper::UpnpIgdFirewall(driver) => driver.unmap(port).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapper_driver_trait_is_object_shaped_for_dispatch_only() {
        // Compile-time check that every driver implements the common trait; the enum
        // dispatch above is what's actually used at runtime.
        fn assert_impl<T: MapperDriver>() {}
        assert_impl::<NatPmpMapper>();
        assert_impl::<PcpMapper>();
        assert_impl::<UpnpPortMapper>();
        assert_impl::<UpnpFirewallMapper>();
    }
}
