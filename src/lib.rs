//! Discovers NAT/firewall gateways on the local network and obtains port mappings from
//! them, speaking whichever of PCP, NAT-PMP, or UPnP-IGD the gateway understands.
//!
//! > The Port Control Protocol allows an IPv6 or IPv4 host to control how incoming
//! IPv6 or IPv4 packets are translated and forwarded by a Network Address Translator
//! (NAT) or simple firewall. The aim of this protocol is to replace the older NAT-PMP
//! by allowing a host to optimize its outgoing NAT keepalive messages.
//! >
//! >~ *from [RFC 6887](https://tools.ietf.org/html/rfc6887)*
//!
//! # Getting started
//!
//! [`discover`] probes the local network and returns one [`Mapper`] per gateway it
//! found, already classified by which protocol it speaks. Each `Mapper` exposes the
//! same three operations regardless of protocol:
//!
//! ```no_run
//! # async fn example() -> Result<(), gatewaymap::Error> {
//! use std::sync::Arc;
//! use gatewaymap::net::{NetworkFacility, TokioNetwork};
//! use gatewaymap::{discover, DiscoveryOptions, PortType};
//!
//! let net: Arc<dyn NetworkFacility> = Arc::new(TokioNetwork::spawn());
//! let mut gateways = discover(&net, DiscoveryOptions::default()).await;
//! let gateway = gateways.first_mut().ok_or(gatewaymap::Error::NoGatewayFound)?;
//!
//! let mapping = gateway.map(PortType::Tcp, 8080, 0, 3600).await?;
//! // ... later ...
//! gateway.unmap(&mapping).await?;
//! # Ok(())
//! # }
//! ```
//!
//! A failed `map`/`refresh`/`unmap` returns a typed [`Error`]; nothing here panics on a
//! misbehaving gateway.

pub mod codec;
pub mod discovery;
pub mod error;
mod mapper;
pub mod mux;
pub mod net;
pub mod retry;
pub mod types;

pub use discovery::{discover, DiscoveryOptions};
pub use error::{Error, ServerFailureCode};
pub use mapper::{Mapper, MapperDriver, NatPmpMapper, PcpMapper, UpnpFirewallMapper, UpnpPortMapper};
pub use types::{MappedPort, PortType, ProtocolNumber, ProtocolTag, UpnpEndpoint, UpnpServiceKind};
