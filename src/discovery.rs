//! Gateway discovery (spec §4.3): for each local address, probe for a NAT-PMP/PCP
//! gateway at the conventional `.1` candidate and run an SSDP M-SEARCH sweep for
//! UPnP-IGD control points, fanning both out concurrently with `futures::future::join_all`
//! rather than `tokio::spawn` — the futures below borrow `net` and `opts`, and `JoinSet`
//! would need `'static` ownership of both to actually spawn them onto the runtime.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::codec::nat_pmp::{self, NatPmpOpcode};
use crate::codec::pcp::{self, MapPayload, OpCode as PcpOpCode};
use crate::codec::upnp::{descriptor, ssdp};
use crate::error::Error;
use crate::mapper::{Mapper, NatPmpMapper, PcpMapper, UpnpFirewallMapper, UpnpPortMapper};
use crate::net::NetworkFacility;
use crate::retry::{run_with_retry, RetrySchedule};
use crate::types::{UpnpEndpoint, UpnpServiceKind};

/// Tunables for one `discover` call. The defaults match spec §4.3's literal numbers;
/// callers on a slow or congested LAN may want to widen them.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryOptions {
    /// `MX` value sent in every SSDP M-SEARCH request (clamped to 1-5 by the codec).
    pub ssdp_mx: u8,
    /// How long a NAT-PMP/PCP probe may retry a single gateway candidate before giving
    /// up on it. RFC 6887's own backoff schedule has no ceiling short of 1024s per
    /// retry; this is the practical wall-clock budget discovery is willing to spend per
    /// candidate, overriding `RetrySchedule`'s `mrc` as the thing that actually bites.
    pub gateway_probe_budget: Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self { ssdp_mx: 3, gateway_probe_budget: Duration::from_secs(10) }
    }
}

/// RFC 6887 §8.1: at most 9 retransmissions per request before giving up.
const MAX_RETRIES: usize = 9;
const PROBE_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(300);
const SSDP_READ_CHUNK: usize = 4096;

/// Probes each local address's conventional gateway for NAT-PMP/PCP support and sweeps
/// SSDP for UPnP-IGD control points, returning the union of everything found.
pub async fn discover(net: &Arc<dyn NetworkFacility>, opts: DiscoveryOptions) -> Vec<Mapper> {
    let local_ips = net.local_ips().await.unwrap_or_default();
    if local_ips.is_empty() {
        return Vec::new();
    }

    let gateway_futures = local_ips.iter().copied().map(|ip| probe_gateway(net, ip, opts));
    let ssdp_futures = local_ips.iter().copied().map(|ip| ssdp_sweep(net, ip, opts));

    let (gateway_results, ssdp_results) =
        futures::join!(futures::future::join_all(gateway_futures), futures::future::join_all(ssdp_futures));

    let mut mappers: Vec<Mapper> = gateway_results.into_iter().flatten().collect();
    mappers.extend(ssdp_results.into_iter().flatten());
    mappers
}

/// Replaces a routable local address's last IPv4 octet with `1`, the fallback
/// heuristic spec §4.3.1 names for when no platform default-gateway query is
/// available. A real default-gateway lookup needs a platform-specific crate the
/// teacher and the rest of the pack never pull in; this crate sticks to the
/// dependency-free heuristic and documents the gap (see DESIGN.md).
fn candidate_gateway(local_ip: IpAddr) -> Option<IpAddr> {
    match local_ip {
        IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified() => {
            let [a, b, c, _] = v4.octets();
            Some(IpAddr::V4(Ipv4Addr::new(a, b, c, 1)))
        }
        _ => None,
    }
}

async fn probe_gateway(net: &Arc<dyn NetworkFacility>, local_ip: IpAddr, opts: DiscoveryOptions) -> Option<Mapper> {
    let gateway_ip = candidate_gateway(local_ip)?;
    let local_addr = SocketAddr::new(local_ip, 0);
    let gateway = SocketAddr::new(gateway_ip, nat_pmp::SERVER_PORT);
    let socket = net.create_udp(local_addr).await.ok()?;

    let schedule = RetrySchedule { mrc: MAX_RETRIES, overall_timeout: Some(opts.gateway_probe_budget) };
    let classification = run_with_retry(schedule, |_attempt| {
        classify_gateway(net.as_ref(), socket, local_ip, gateway)
    })
    .await;
    net.close(socket).await;

    match classification.ok()? {
        GatewayKind::Pcp => {
            PcpMapper::connect(Arc::clone(net), SocketAddr::new(local_ip, 0), local_ip, gateway_ip)
                .await
                .ok()
                .map(Mapper::Pcp)
        }
        GatewayKind::NatPmp => {
            NatPmpMapper::connect(Arc::clone(net), SocketAddr::new(local_ip, 0), gateway_ip)
                .await
                .ok()
                .map(Mapper::NatPmp)
        }
    }
}

enum GatewayKind {
    Pcp,
    NatPmp,
}

/// Sends one NAT-PMP external-address request and one PCP no-op MAP request (lifetime
/// and internal port both zero) to the same candidate and classifies the gateway by
/// which one answers meaningfully (spec §4.3.1). A PCP response whose version the
/// codec accepts classifies as PCP regardless of its result code — `UNSUPP_VERSION`
/// still proves the box speaks PCP's framing, just not this crate's version of it,
/// which in practice never happens since both sides implement RFC 6887 v2 — while a
/// gateway that only ever answers the NAT-PMP probe classifies as NAT-PMP-only.
async fn classify_gateway(
    net: &dyn NetworkFacility,
    socket: crate::mux::SocketHandle,
    local_ip: IpAddr,
    gateway: SocketAddr,
) -> Result<GatewayKind, Error> {
    let pcp_probe = MapPayload {
        nonce: [0u8; 12],
        protocol: 0,
        internal_port: 0,
        suggested_external_port: 0,
        suggested_external_addr: crate::codec::util::to_wire_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
    };
    let pcp_request = pcp::Request::map(local_ip, 0, pcp_probe, Vec::new())?;
    net.write(socket, pcp_request.encode()?.to_vec(), Some(gateway)).await?;
    let deadline = Instant::now() + PROBE_ATTEMPT_TIMEOUT;
    if let Ok(read) = net.read(socket, pcp::MAX_PACKET_SIZE, deadline).await {
        if let Ok(response) = pcp::Response::decode(&read.bytes) {
            if response.payload.opcode() == PcpOpCode::Map {
                return Ok(GatewayKind::Pcp);
            }
        }
    }

    let nat_pmp_request = nat_pmp::Request::ExternalAddress;
    net.write(socket, nat_pmp_request.encode().to_vec(), Some(gateway)).await?;
    let deadline = Instant::now() + PROBE_ATTEMPT_TIMEOUT;
    let read = net.read(socket, 16, deadline).await?;
    let response = nat_pmp::Response::decode(&read.bytes).map_err(|_| Error::Timeout)?;
    if response.opcode() == NatPmpOpcode::ExternalAddress {
        Ok(GatewayKind::NatPmp)
    } else {
        Err(Error::Timeout)
    }
}

trait ResponseOpcode {
    fn opcode(&self) -> NatPmpOpcode;
}

impl ResponseOpcode for nat_pmp::Response {
    fn opcode(&self) -> NatPmpOpcode {
        match self {
            nat_pmp::Response::ExternalAddress { .. } => NatPmpOpcode::ExternalAddress,
            nat_pmp::Response::MapUdp(_) => NatPmpOpcode::MapUdp,
            nat_pmp::Response::MapTcp(_) => NatPmpOpcode::MapTcp,
        }
    }
}

/// Runs the three-search-target SSDP sweep (spec §4.3.2) from one local address and
/// returns a `Mapper` for every recognized service type found in every distinct
/// `LOCATION` that answered.
async fn ssdp_sweep(net: &Arc<dyn NetworkFacility>, local_ip: IpAddr, opts: DiscoveryOptions) -> Vec<Mapper> {
    let search_targets = [
        "upnp:rootdevice",
        UpnpServiceKind::WanIpConnection1.as_str(),
        UpnpServiceKind::WanIpConnection2.as_str(),
    ];
    let multicast = match local_ip {
        IpAddr::V4(_) => ssdp::MULTICAST_V4,
        IpAddr::V6(_) => ssdp::MULTICAST_V6,
    };
    let Ok(multicast_addr) = multicast.parse::<SocketAddr>() else { return Vec::new() };

    let Ok(socket) = net.create_udp(SocketAddr::new(local_ip, 0)).await else { return Vec::new() };
    for target in search_targets {
        let datagram = ssdp::build_search_request(target, opts.ssdp_mx);
        let _ = net.write(socket, datagram, Some(multicast_addr)).await;
    }

    let collect_deadline = Instant::now() + Duration::from_secs(opts.ssdp_mx as u64 + 1);
    let mut locations = HashSet::new();
    loop {
        let Ok(read) = net.read(socket, SSDP_READ_CHUNK, collect_deadline).await else { break };
        if let Ok(response) = ssdp::parse_search_response(&read.bytes) {
            if let Some(location) = response.location {
                locations.insert(location);
            }
        }
    }
    net.close(socket).await;

    let mut mappers = Vec::new();
    for location in locations {
        mappers.extend(fetch_endpoints(net, local_ip, &location).await);
    }
    mappers
}

/// Fetches and parses the device descriptor at `location` and builds one `Mapper` per
/// recognized service found in it.
async fn fetch_endpoints(net: &Arc<dyn NetworkFacility>, local_ip: IpAddr, location: &str) -> Vec<Mapper> {
    let Some((host, remote_addr, path)) = parse_location(location) else { return Vec::new() };
    let Ok(body) = fetch_http(net, SocketAddr::new(local_ip, 0), remote_addr, &host, &path).await else {
        return Vec::new();
    };
    let Ok(services) = descriptor::parse_device_descriptor(&body) else { return Vec::new() };

    services
        .into_iter()
        .filter_map(|service| {
            let kind = UpnpServiceKind::from_service_type(&service.service_type)?;
            let endpoint = UpnpEndpoint { host: host.clone(), control_path: service.control_url, service_type: kind };
            Some(build_mapper(net, local_ip, remote_addr, endpoint))
        })
        .collect()
}

fn build_mapper(net: &Arc<dyn NetworkFacility>, local_ip: IpAddr, remote_addr: SocketAddr, endpoint: UpnpEndpoint) -> Mapper {
    let local_addr = SocketAddr::new(local_ip, 0);
    if endpoint.service_type.is_firewall() {
        Mapper::UpnpIgdFirewall(UpnpFirewallMapper::new(Arc::clone(net), local_addr, remote_addr, endpoint, local_ip))
    } else {
        Mapper::UpnpIgdPort(UpnpPortMapper::new(Arc::clone(net), local_addr, remote_addr, endpoint, local_ip))
    }
}

/// Splits a `LOCATION` URL of the form `http://host[:port]/path` into the `Host`
/// header value, the socket address to connect to, and the request path. Only
/// literal-IP hosts are supported: resolving a hostname would need a DNS client this
/// crate otherwise has no use for, and every UPnP-IGD implementation in the wild
/// advertises a bare IP address here.
fn parse_location(location: &str) -> Option<(String, SocketAddr, String)> {
    let rest = location.strip_prefix("http://")?;
    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    };
    let authority_with_port = if authority.contains(':') { authority.to_string() } else { format!("{authority}:80") };
    let remote_addr: SocketAddr = authority_with_port.parse().ok()?;
    Some((authority.to_string(), remote_addr, path.to_string()))
}

async fn fetch_http(
    net: &Arc<dyn NetworkFacility>,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    host: &str,
    path: &str,
) -> Result<Vec<u8>, Error> {
    let socket = net.create_tcp(local_addr, remote_addr).await?;
    let request = format!("GET {path} HTTP/1.1\r\nHost: {host}\r\nConnection: Close\r\n\r\n");
    net.write(socket, request.into_bytes(), None).await?;

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut response = Vec::new();
    loop {
        match net.read(socket, SSDP_READ_CHUNK, deadline).await {
            Ok(chunk) if chunk.bytes.is_empty() => break,
            Ok(chunk) => response.extend_from_slice(&chunk.bytes),
            Err(_) => break,
        }
    }
    net.close(socket).await;

    let text = String::from_utf8_lossy(&response);
    let body_start = text.find("\r\n\r\n").map(|idx| idx + 4).unwrap_or(0);
    Ok(response[body_start..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_gateway_uses_the_dot_one_heuristic() {
        let local = "192.168.1.42".parse().unwrap();
        assert_eq!(candidate_gateway(local), Some("192.168.1.1".parse().unwrap()));
    }

    #[test]
    fn candidate_gateway_skips_loopback() {
        assert_eq!(candidate_gateway("127.0.0.1".parse().unwrap()), None);
    }

    #[test]
    fn parse_location_splits_host_port_and_path() {
        let (host, addr, path) = parse_location("http://192.168.1.1:5000/rootDesc.xml").unwrap();
        assert_eq!(host, "192.168.1.1:5000");
        assert_eq!(addr, "192.168.1.1:5000".parse().unwrap());
        assert_eq!(path, "/rootDesc.xml");
    }

    #[test]
    fn parse_location_defaults_to_port_80() {
        let (_, addr, path) = parse_location("http://192.168.1.1/desc.xml").unwrap();
        assert_eq!(addr, "192.168.1.1:80".parse().unwrap());
        assert_eq!(path, "/desc.xml");
    }

    #[test]
    fn parse_location_rejects_non_http_scheme() {
        assert!(parse_location("https://192.168.1.1/desc.xml").is_none());
    }
}
