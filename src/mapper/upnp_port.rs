//! UPnP-IGD `WANIPConnection`/`WANPPPConnection` port-mapping driver.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::codec::upnp::soap::{self, SoapOutcome};
use crate::error::{Error, ServerFailureCode};
use crate::mapper::upnp_common::soap_round_trip;
use crate::net::NetworkFacility;
use crate::types::{MappedPort, PortType, ProtocolTag, UpnpEndpoint};

/// RFC-less convention most IGD implementations follow: a lease duration of 0 means
/// "no expiry". This crate always requests a concrete duration so every mapping it
/// creates is naturally cleaned up by the gateway if `unmap` is never called.
const DEFAULT_DESCRIPTION: &str = "gatewaymap";

pub struct UpnpPortMapper {
    net: Arc<dyn NetworkFacility>,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    endpoint: UpnpEndpoint,
    internal_client: IpAddr,
}

impl UpnpPortMapper {
    pub fn new(
        net: Arc<dyn NetworkFacility>,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        endpoint: UpnpEndpoint,
        internal_client: IpAddr,
    ) -> Self {
        Self { net, local_addr, remote_addr, endpoint, internal_client }
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
        let request = soap::add_port_mapping(
            &self.endpoint.host,
            &self.endpoint.control_path,
            self.endpoint.service_type.as_str(),
            None,
            external_hint,
            ty,
            internal_port,
            self.internal_client,
            true,
            DEFAULT_DESCRIPTION,
            lifetime as i64,
        )?;
        match self.call(request).await? {
            SoapOutcome::Success(_) => {
                let external_address = self.external_ip_address().await?;
                Ok(MappedPort {
                    port_type: ty,
                    internal_port,
                    external_port: external_hint,
                    external_address,
                    lifetime_seconds: lifetime,
                    protocol_tag: ProtocolTag::UpnpIgdPort,
                })
            }
            outcome @ SoapOutcome::Fault { .. } => Err(Self::outcome_to_error(outcome)),
        }
    }

    pub async fn refresh(&mut self, port: &MappedPort, lifetime: u32) -> Result<MappedPort, Error> {
        self.map(port.port_type, port.internal_port, port.external_port, lifetime).await
    }

    pub async fn unmap(&mut self, port: &MappedPort) -> Result<(), Error> {
        let request = soap::delete_port_mapping(
            &self.endpoint.host,
            &self.endpoint.control_path,
            self.endpoint.service_type.as_str(),
            None,
            port.external_port,
            port.port_type,
        );
        match self.call(request).await? {
            SoapOutcome::Success(_) => Ok(()),
            outcome @ SoapOutcome::Fault { .. } => Err(Self::outcome_to_error(outcome)),
        }
    }

    /// `GetExternalIPAddress` — not part of the common driver trait (it has no
    /// `MappedPort` to return), but every discovered `WANIPConnection` endpoint
    /// supports it and `map`/`refresh` call it to populate a mapping's
    /// `external_address` precisely instead of reporting the gateway's own address.
    pub async fn external_ip_address(&self) -> Result<IpAddr, Error> {
        let request = soap::get_external_ip_address(
            &self.endpoint.host,
            &self.endpoint.control_path,
            self.endpoint.service_type.as_str(),
        );
        match self.call(request).await? {
            SoapOutcome::Success(args) => args
                .into_iter()
                .find(|(name, _)| name == "NewExternalIPAddress")
                .and_then(|(_, value)| value.parse().ok())
                .ok_or(Error::Timeout),
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
            host: "192.0.2.1:1780".to_string(),
            control_path: "/control?WANIPConnection".to_string(),
            service_type: UpnpServiceKind::WanIpConnection1,
        }
    }

    fn http_ok(body: &str) -> Vec<u8> {
        format!("HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\n\r\n{body}").into_bytes()
    }

    #[tokio::test]
    async fn map_reports_the_gateways_external_ip_not_its_own_address() {
        let add_port_mapping_response = http_ok(
            "<?xml version=\"1.0\"?><s:Envelope><s:Body>\
             <u:AddPortMappingResponse></u:AddPortMappingResponse></s:Body></s:Envelope>",
        );
        let get_external_ip_response = http_ok(
            "<?xml version=\"1.0\"?><s:Envelope><s:Body><u:GetExternalIPAddressResponse>\
             <NewExternalIPAddress>203.0.113.9</NewExternalIPAddress>\
             </u:GetExternalIPAddressResponse></s:Body></s:Envelope>",
        );
        let net: Arc<dyn NetworkFacility> =
            Arc::new(ScriptedNetwork::new(vec![add_port_mapping_response, get_external_ip_response]));
        let local_addr: SocketAddr = "10.0.0.5:0".parse().unwrap();
        let remote_addr: SocketAddr = "192.0.2.1:1780".parse().unwrap();
        let mut mapper = UpnpPortMapper::new(net, local_addr, remote_addr, endpoint(), "10.0.0.5".parse().unwrap());

        let mapped = mapper.map(PortType::Tcp, 8080, 9090, 3600).await.unwrap();

        assert_eq!(mapped.external_address, "203.0.113.9".parse::<IpAddr>().unwrap());
        assert_ne!(mapped.external_address, remote_addr.ip());
    }
}
