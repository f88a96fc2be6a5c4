//! The shared data model (spec §3): port types, mapped ports, and the small
//! IANA-protocol-number type the wire codecs need.

use std::fmt;
use std::net::IpAddr;

/// Transport protocol of a mapping.
///
/// PCP and NAT-PMP both ultimately carry this down to a protocol number on the wire
/// (`6` for TCP, `17` for UDP); UPnP-IGD carries it as the literal string `"TCP"`/`"UDP"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortType {
    Tcp,
    Udp,
}

impl PortType {
    /// The IANA protocol number used by PCP and NAT-PMP.
    pub const fn protocol_number(self) -> u8 {
        match self {
            Self::Tcp => 6,
            Self::Udp => 17,
        }
    }

    /// The literal string UPnP-IGD SOAP actions expect for `NewProtocol`.
    pub const fn as_upnp_str(self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_upnp_str())
    }
}

/// Which driver owns a [`MappedPort`], so `refresh`/`unmap` route back to the right one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProtocolTag {
    NatPmp,
    Pcp,
    UpnpIgdPort,
    UpnpIgdFirewall,
}

/// An immutable record of a successfully obtained (or refreshed) port mapping.
///
/// Constructed only by the mapper drivers; the caller owns the value, the driver keeps
/// a weak back-reference (by `protocol_tag` plus the key fields) to route a later
/// `refresh`/`unmap` call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MappedPort {
    pub port_type: PortType,
    pub internal_port: u16,
    pub external_port: u16,
    pub external_address: IpAddr,
    pub lifetime_seconds: u32,
    pub protocol_tag: ProtocolTag,
}

impl MappedPort {
    /// Validates the invariants spec.md §3 places on a `MappedPort`.
    ///
    /// `external_port == 0` is only valid for transient states (a mapping still being
    /// negotiated); a driver must never hand a zero external port back to a caller as a
    /// finished mapping.
    pub fn is_valid(&self) -> bool {
        (1..=65535).contains(&self.internal_port)
    }
}

/// All the upper-layer protocol numbers PCP/NAT-PMP ever need to produce or accept.
///
/// RFC 6887 reserves `0` ([`Self::Hopopt`]) to mean "all protocols" and otherwise treats
/// the field as an opaque IANA protocol number; nothing in this crate interprets any
/// value other than TCP/UDP/all, so everything else round-trips through [`Self::Other`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProtocolNumber {
    /// `0` — all protocols (used by PCP delete requests and `internal_port == 0` map requests).
    Hopopt,
    Tcp,
    Udp,
    Other(u8),
}

impl ProtocolNumber {
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Hopopt => 0,
            Self::Tcp => 6,
            Self::Udp => 17,
            Self::Other(n) => n,
        }
    }
}

impl From<u8> for ProtocolNumber {
    fn from(byte: u8) -> Self {
        match byte {
            0 => Self::Hopopt,
            6 => Self::Tcp,
            17 => Self::Udp,
            n => Self::Other(n),
        }
    }
}

impl From<PortType> for ProtocolNumber {
    fn from(ty: PortType) -> Self {
        match ty {
            PortType::Tcp => Self::Tcp,
            PortType::Udp => Self::Udp,
        }
    }
}

/// The four recognized UPnP-IGD service types (spec §4.3.2), used to tag a discovered
/// endpoint with which kind of mapper driver it needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpnpServiceKind {
    WanIpConnection1,
    WanIpConnection2,
    WanPppConnection1,
    WanIpv6FirewallControl1,
}

impl UpnpServiceKind {
    /// Matches a `serviceType` string found in a device descriptor, e.g.
    /// `urn:schemas-upnp-org:service:WANIPConnection:2`.
    pub fn from_service_type(service_type: &str) -> Option<Self> {
        match service_type {
            "urn:schemas-upnp-org:service:WANIPConnection:1" => Some(Self::WanIpConnection1),
            "urn:schemas-upnp-org:service:WANIPConnection:2" => Some(Self::WanIpConnection2),
            "urn:schemas-upnp-org:service:WANPPPConnection:1" => Some(Self::WanPppConnection1),
            "urn:schemas-upnp-org:service:WANIPv6FirewallControl:1" => {
                Some(Self::WanIpv6FirewallControl1)
            }
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WanIpConnection1 => "urn:schemas-upnp-org:service:WANIPConnection:1",
            Self::WanIpConnection2 => "urn:schemas-upnp-org:service:WANIPConnection:2",
            Self::WanPppConnection1 => "urn:schemas-upnp-org:service:WANPPPConnection:1",
            Self::WanIpv6FirewallControl1 => {
                "urn:schemas-upnp-org:service:WANIPv6FirewallControl:1"
            }
        }
    }

    pub const fn is_firewall(self) -> bool {
        matches!(self, Self::WanIpv6FirewallControl1)
    }
}

/// A UPnP-IGD control endpoint discovered via SSDP + descriptor fetch (spec §3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpnpEndpoint {
    pub host: String,
    pub control_path: String,
    pub service_type: UpnpServiceKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_number_round_trips_known_values() {
        assert_eq!(ProtocolNumber::from(0), ProtocolNumber::Hopopt);
        assert_eq!(ProtocolNumber::from(6), ProtocolNumber::Tcp);
        assert_eq!(ProtocolNumber::from(17), ProtocolNumber::Udp);
        assert_eq!(ProtocolNumber::from(42), ProtocolNumber::Other(42));
        assert_eq!(ProtocolNumber::Other(42).as_u8(), 42);
    }

    #[test]
    fn mapped_port_validity() {
        let valid = MappedPort {
            port_type: PortType::Tcp,
            internal_port: 80,
            external_port: 8080,
            external_address: "203.0.113.1".parse().unwrap(),
            lifetime_seconds: 7200,
            protocol_tag: ProtocolTag::Pcp,
        };
        assert!(valid.is_valid());

        let invalid = MappedPort {
            internal_port: 0,
            ..valid
        };
        assert!(!invalid.is_valid());
    }

    #[test]
    fn upnp_service_kind_from_str() {
        assert_eq!(
            UpnpServiceKind::from_service_type("urn:schemas-upnp-org:service:WANIPConnection:2"),
            Some(UpnpServiceKind::WanIpConnection2)
        );
        assert_eq!(UpnpServiceKind::from_service_type("bogus"), None);
    }
}
