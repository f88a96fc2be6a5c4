//! NAT-PMP mapper driver (RFC 6886 §3.3). No transaction IDs: `&mut self` access to one
//! driver instance per gateway is what keeps "at most one outstanding request per opcode"
//! true, since nothing else can issue a second request through the same instance while
//! one is in flight.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::codec::nat_pmp::{NatPmpOpcode, Request, Response, ResultCode, SERVER_PORT};
use crate::error::{Error, ServerFailureCode};
use crate::mux::SocketHandle;
use crate::net::NetworkFacility;
use crate::retry::{run_with_retry, RetrySchedule};
use crate::types::{MappedPort, PortType, ProtocolTag};

const PER_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(250);
const OVERALL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct NatPmpMapper {
    net: Arc<dyn NetworkFacility>,
    gateway_ip: IpAddr,
    socket: SocketHandle,
    /// Fetched once via opcode 0 and cached for the mapping's lifetime (spec §4.4.1):
    /// re-querying it on every `map`/`refresh` would be one more round trip for a value
    /// that can't change without the gateway's epoch resetting too.
    external_address: Option<IpAddr>,
}

impl NatPmpMapper {
    pub async fn connect(net: Arc<dyn NetworkFacility>, local_addr: SocketAddr, gateway_ip: IpAddr) -> Result<Self, Error> {
        let socket = net.create_udp(local_addr).await?;
        Ok(Self { net, gateway_ip, socket, external_address: None })
    }

    async fn cached_external_address(&mut self) -> Result<IpAddr, Error> {
        if let Some(addr) = self.external_address {
            return Ok(addr);
        }
        let addr = match self.roundtrip(Request::ExternalAddress).await? {
            Response::ExternalAddress { result_code, external_addr, .. } => {
                Self::check_result(result_code)?;
                IpAddr::V4(external_addr)
            }
            _ => return Err(Error::Timeout),
        };
        self.external_address = Some(addr);
        Ok(addr)
    }

    async fn roundtrip(&mut self, request: Request) -> Result<Response, Error> {
        let bytes = request.encode();
        let gateway = SocketAddr::new(self.gateway_ip, SERVER_PORT);
        let opcode = request.opcode();
        let schedule = RetrySchedule::bounded(OVERALL_TIMEOUT);
        let net = self.net.clone();
        let socket = self.socket;
        run_with_retry(schedule, |_attempt| {
            let bytes = bytes.clone();
            let net = net.clone();
            async move {
                net.write(socket, bytes.to_vec(), Some(gateway)).await?;
                let deadline = Instant::now() + PER_ATTEMPT_TIMEOUT;
                let read = net.read(socket, 16, deadline).await?;
                let response = Response::decode(&read.bytes).map_err(|_| Error::Timeout)?;
                if response.opcode_matches(opcode) {
                    Ok(response)
                } else {
                    Err(Error::Timeout)
                }
            }
        })
        .await
    }

    pub(crate) fn check_result(code: ResultCode) -> Result<(), Error> {
        if code.is_success() {
            Ok(())
        } else {
            Err(Error::ServerFailure(ServerFailureCode::NatPmp(code as u16)))
        }
    }

    async fn map_request(
        &mut self,
        ty: PortType,
        internal_port: u16,
        suggested_external_port: u16,
        lifetime: u32,
    ) -> Result<MappedPort, Error> {
        let request = match ty {
            PortType::Udp => Request::MapUdp { internal_port, suggested_external_port, lifetime_seconds: lifetime },
            PortType::Tcp => Request::MapTcp { internal_port, suggested_external_port, lifetime_seconds: lifetime },
        };
        let response = self.roundtrip(request).await?;
        let mapping = match response {
            Response::MapUdp(m) | Response::MapTcp(m) => m,
            Response::ExternalAddress { .. } => return Err(Error::Timeout),
        };
        Self::check_result(mapping.result_code)?;
        let external_address = self.cached_external_address().await?;
        Ok(MappedPort {
            port_type: ty,
            internal_port: mapping.internal_port,
            external_port: mapping.external_port,
            external_address,
            lifetime_seconds: mapping.lifetime_seconds,
            protocol_tag: ProtocolTag::NatPmp,
        })
    }

    pub async fn map(&mut self, ty: PortType, internal_port: u16, external_hint: u16, lifetime: u32) -> Result<MappedPort, Error> {
        self.map_request(ty, internal_port, external_hint, lifetime).await
    }

    pub async fn refresh(&mut self, port: &MappedPort, lifetime: u32) -> Result<MappedPort, Error> {
        self.map_request(port.port_type, port.internal_port, port.external_port, lifetime).await
    }

    pub async fn unmap(&mut self, port: &MappedPort) -> Result<(), Error> {
        // RFC 6886 §3.3.1: a deletion request repeats the internal port with lifetime 0.
        self.map_request(port.port_type, port.internal_port, 0, 0).await.map(|_| ())
    }
}

trait OpcodeMatch {
    fn opcode_matches(&self, opcode: NatPmpOpcode) -> bool;
}

impl OpcodeMatch for Response {
    fn opcode_matches(&self, opcode: NatPmpOpcode) -> bool {
        matches!(
            (self, opcode),
            (Response::ExternalAddress { .. }, NatPmpOpcode::ExternalAddress)
                | (Response::MapUdp(_), NatPmpOpcode::MapUdp)
                | (Response::MapTcp(_), NatPmpOpcode::MapTcp)
        )
    }
}

/// Fetches the gateway's external address, the first step of NAT-PMP discovery
/// (spec §4.3.1): a gateway that answers this opcode at all is NAT-PMP-capable.
pub async fn probe_external_address(
    net: &Arc<dyn NetworkFacility>,
    local_addr: SocketAddr,
    gateway_ip: IpAddr,
) -> Result<IpAddr, Error> {
    let mut mapper = NatPmpMapper::connect(Arc::clone(net), local_addr, gateway_ip).await?;
    mapper.cached_external_address().await
}
