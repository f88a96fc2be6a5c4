//! PCP mapper driver (RFC 6887 §11, §14).
//!
//! Each request carries its own nonce, so unlike NAT-PMP, PCP correlates replies
//! without needing to serialize requests through `&mut self` — the nonce check alone
//! rejects a stray reply from a previous request. The epoch check still applies: a
//! rewound epoch means the server forgot this mapping (most likely a reboot) and the
//! caller needs to re-`map` rather than `refresh`.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::codec::pcp::{Epoch, MapPayload, Request, Response, ResponsePayload, ResultCode, SERVER_PORT};
use crate::error::{Error, ServerFailureCode};
use crate::mux::SocketHandle;
use crate::net::NetworkFacility;
use crate::retry::{run_with_retry, RetrySchedule};
use crate::types::{MappedPort, PortType, ProtocolTag};

const PER_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(250);
const OVERALL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct PcpMapper {
    net: Arc<dyn NetworkFacility>,
    client_addr: IpAddr,
    gateway_ip: IpAddr,
    socket: SocketHandle,
    epoch: Option<(Epoch, Instant)>,
    /// The nonce of the mapping this driver instance currently owns, set by `map` and
    /// reused by `refresh`/`unmap` so the server recognizes them as the same mapping.
    nonce: Option<[u8; 12]>,
}

impl PcpMapper {
    pub async fn connect(
        net: Arc<dyn NetworkFacility>,
        local_addr: SocketAddr,
        client_addr: IpAddr,
        gateway_ip: IpAddr,
    ) -> Result<Self, Error> {
        let socket = net.create_udp(local_addr).await?;
        Ok(Self { net, client_addr, gateway_ip, socket, epoch: None, nonce: None })
    }

    fn fresh_nonce() -> [u8; 12] {
        let mut nonce = [0u8; 12];
        rand::thread_rng().fill(&mut nonce);
        nonce
    }

    /// Returns `true` if the epoch indicates the server lost its mapping state since
    /// the last reply this driver saw.
    fn note_epoch(&mut self, epoch: Epoch, observed_at: Instant) -> bool {
        let lost_state = match self.epoch {
            Some((previous, previous_at)) => {
                let elapsed = observed_at.saturating_duration_since(previous_at).as_secs() as u32;
                !epoch.validate(previous, elapsed)
            }
            None => false,
        };
        self.epoch = Some((epoch, observed_at));
        lost_state
    }

    async fn roundtrip(&mut self, request: Request, expected_nonce: [u8; 12]) -> Result<Response, Error> {
        let bytes = request.encode()?;
        let gateway = SocketAddr::new(self.gateway_ip, SERVER_PORT);
        let schedule = RetrySchedule::bounded(OVERALL_TIMEOUT);
        let net = self.net.clone();
        let socket = self.socket;
        let response = run_with_retry(schedule, |_attempt| {
            let bytes = bytes.clone();
            let net = net.clone();
            async move {
                net.write(socket, bytes.to_vec(), Some(gateway)).await?;
                let deadline = Instant::now() + PER_ATTEMPT_TIMEOUT;
                let read = net.read(socket, crate::codec::pcp::MAX_PACKET_SIZE, deadline).await?;
                let response = Response::decode(&read.bytes)?;
                if response_nonce(&response) == Some(expected_nonce) {
                    Ok(response)
                } else {
                    Err(Error::Timeout)
                }
            }
        })
        .await?;
        self.note_epoch(response.epoch, Instant::now());
        Ok(response)
    }

    fn check_result(code: ResultCode) -> Result<(), Error> {
        if code.is_success() {
            Ok(())
        } else {
            Err(Error::ServerFailure(ServerFailureCode::Pcp(code)))
        }
    }

    async fn map_with_nonce(
        &mut self,
        ty: PortType,
        internal_port: u16,
        suggested_external_port: u16,
        lifetime: u32,
        nonce: [u8; 12],
    ) -> Result<MappedPort, Error> {
        let payload = MapPayload {
            nonce,
            protocol: ty.protocol_number(),
            internal_port,
            suggested_external_port,
            suggested_external_addr: crate::codec::util::to_wire_address(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)),
        };
        let request = Request::map(self.client_addr, lifetime, payload, Vec::new())?;
        let response = self.roundtrip(request, nonce).await?;
        Self::check_result(response.result_code)?;
        let map = match response.payload {
            ResponsePayload::Map(map) => map,
            _ => return Err(Error::Timeout),
        };
        Ok(MappedPort {
            port_type: ty,
            internal_port: map.internal_port,
            external_port: map.suggested_external_port,
            external_address: crate::codec::util::from_wire_address(map.suggested_external_addr),
            lifetime_seconds: response.lifetime,
            protocol_tag: ProtocolTag::Pcp,
        })
    }

    pub async fn map(&mut self, ty: PortType, internal_port: u16, external_hint: u16, lifetime: u32) -> Result<MappedPort, Error> {
        let nonce = Self::fresh_nonce();
        let result = self.map_with_nonce(ty, internal_port, external_hint, lifetime, nonce).await?;
        self.nonce = Some(nonce);
        Ok(result)
    }

    /// Refreshing a PCP mapping re-sends the nonce `map` picked so the server
    /// recognizes it as the same mapping rather than allocating a new one (RFC 6887
    /// §11), falling back to a fresh nonce if this instance never saw the original
    /// `map` call (e.g. after process restart, where the caller only has the
    /// `MappedPort` value saved elsewhere).
    pub async fn refresh(&mut self, port: &MappedPort, lifetime: u32) -> Result<MappedPort, Error> {
        let nonce = self.nonce.unwrap_or_else(Self::fresh_nonce);
        let result = self.map_with_nonce(port.port_type, port.internal_port, port.external_port, lifetime, nonce).await?;
        self.nonce = Some(nonce);
        Ok(result)
    }

    pub async fn unmap(&mut self, port: &MappedPort) -> Result<(), Error> {
        let nonce = self.nonce.unwrap_or_else(Self::fresh_nonce);
        self.map_with_nonce(port.port_type, port.internal_port, port.external_port, 0, nonce).await.map(|_| ())
    }
}

fn response_nonce(response: &Response) -> Option<[u8; 12]> {
    match &response.payload {
        ResponsePayload::Map(map) => Some(map.nonce),
        ResponsePayload::Peer(peer) => Some(peer.map.nonce),
        ResponsePayload::Announce => None,
    }
}
