//! UPnP-IGD `WANIPv6FirewallControl` pinhole driver (IPv6 has no NAT to traverse, but
//! a default-deny firewall still needs an explicit pinhole opened).

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::codec::upnp::soap::{self, SoapOutcome};
use crate::error::{Error, ServerFailureCode};
use crate::mapper::upnp_common::soap_round_trip;
use crate::net::NetworkFacility;
use crate::types::{MappedPort, PortType, ProtocolTag, UpnpEndpoint};

pub struct UpnpFirewallMapper {
    net: Arc<dyn NetworkFacility>,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    endpoint: UpnpEndpoint,
    internal_client: IpAddr,
    /// The `UniqueID` the gateway returned for the pinhole this instance owns,
    /// needed to `DeletePinhole`/re-confirm it later.
    unique_id: Option<String>,
}

impl UpnpFirewallMapper {
    pub fn new(
        net: Arc<dyn NetworkFacility>,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        endpoint: UpnpEndpoint,
        internal_client: IpAddr,
    ) -> Self {
        Self { net, local_addr, remote_addr, endpoint, internal_client, unique_id: None }
    }

    async fn call(&self, request: Vec<u8>) -> Result<SoapOutcome, Error> {
        soap_round_trip(&self.net, self.local_addr, self.remote_addr, request).await
    }

    fn outcome_to_error(outcome: SoapOutcome) -> Error {
        match outcome {
            SoapOutcome::Fault { error_code, description } => {
                Error::ServerFailure(ServerFailureCode::UpnpSoap { error_code, description })
            }
            SoapOutcome::Success(_) => Error::Timeout,
        }
    }

    pub async fn map(&mut self, ty: PortType, internal_port: u16, external_hint: u16, lifetime: u32) -> Result<MappedPort, Error> {
        let request = soap::add_pinhole(
            &self.endpoint.host,
            &self.endpoint.control_path,
            self.endpoint.service_type.as_str(),
            None,
            external_hint,
            self.internal_client,
            internal_port,
            ty,
            lifetime as i64,
        )?;
        match self.call(request).await? {
            SoapOutcome::Success(args) => {
                self.unique_id = args.into_iter().find(|(name, _)| name == "NewUniqueID").map(|(_, v)| v);
                Ok(MappedPort {
                    port_type: ty,
                    internal_port,
                    external_port: external_hint,
                    external_address: self.internal_client,
                    lifetime_seconds: lifetime,
                    protocol_tag: ProtocolTag::UpnpIgdFirewall,
                })
            }
            outcome @ SoapOutcome::Fault { .. } => Err(Self::outcome_to_error(outcome)),
        }
    }

    /// A pinhole has no native "refresh" action; the common pattern (and what the
    /// teacher's own NAT-PMP/PCP refresh-by-re-request shape mirrors) is to just open
    /// it again with the new lifetime, which most `WANIPv6FirewallControl`
    /// implementations treat as idempotent for an identical 5-tuple.
    pub async fn refresh(&mut self, port: &MappedPort, lifetime: u32) -> Result<MappedPort, Error> {
        self.map(port.port_type, port.internal_port, port.external_port, lifetime).await
    }

    pub async fn unmap(&mut self, _port: &MappedPort) -> Result<(), Error> {
        let Some(unique_id) = self.unique_id.take() else {
            // Nothing this instance opened; treat as already closed.
            return Ok(());
        };
        let request = soap::delete_pinhole(
            &self.endpoint.host,
            &self.endpoint.control_path,
            self.endpoint.service_type.as_str(),
            &unique_id,
        );
        match self.call(request).await? {
            SoapOutcome::Success(_) => Ok(()),
            outcome @ SoapOutcome::Fault { .. } => Err(Self::outcome_to_error(outcome)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::test_support::ScriptedNetwork;
    use crate::types::UpnpServiceKind;

    fn endpoint() -> UpnpEndpoint {
        UpnpEndpoint {
            host: "[2001:db8::1]:1780".to_string(),
            control_path: "/control?WANIPv6FirewallControl".to_string(),
            service_type: UpnpServiceKind::WanIpv6FirewallControl1,
        }
    }

    fn http_ok(body: &str) -> Vec<u8> {
        format!("HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\n\r\n{body}").into_bytes()
    }

    #[tokio::test]
    async fn map_reports_the_clients_own_address_not_the_gateways() {
        let add_pinhole_response = http_ok(
            "<?xml version=\"1.0\"?><s:Envelope><s:Body><u:AddPinholeResponse>\
             <NewUniqueID>7</NewUniqueID></u:AddPinholeResponse></s:Body></s:Envelope>",
        );
        let net: Arc<dyn NetworkFacility> = Arc::new(ScriptedNetwork::new(vec![add_pinhole_response]));
        let local_addr: SocketAddr = "[2001:db8::5]:0".parse().unwrap();
        let remote_addr: SocketAddr = "[2001:db8::1]:1780".parse().unwrap();
        let internal_client: IpAddr = "2001:db8::5".parse().unwrap();
        let mut mapper = UpnpFirewallMapper::new(net, local_addr, remote_addr, endpoint(), internal_client);

        let mapped = mapper.map(PortType::Tcp, 443, 443, 3600).await.unwrap();

        assert_eq!(mapped.external_address, internal_client);
        assert_ne!(mapped.external_address, remote_addr.ip());
    }
}
