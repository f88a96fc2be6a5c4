//! The SOAP-over-HTTP-over-TCP round trip shared by the port-mapping and firewall
//! pinhole drivers: open a connection, write the request, read until the peer closes
//! (the request always carries `Connection: Close`), parse.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::codec::upnp::soap::{self, SoapOutcome};
use crate::error::Error;
use crate::net::NetworkFacility;

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_RESPONSE_BYTES: usize = 64 * 1024;

pub async fn soap_round_trip(
    net: &Arc<dyn NetworkFacility>,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    request: Vec<u8>,
) -> Result<SoapOutcome, Error> {
    let handle = net.create_tcp(local_addr, remote_addr).await?;
    let write_result = net.write(handle, request, None).await;
    if let Err(err) = write_result {
        net.close(handle).await;
        return Err(err.into());
    }

    let deadline = Instant::now() + RESPONSE_TIMEOUT;
    let mut response = Vec::new();
    loop {
        match net.read(handle, MAX_RESPONSE_BYTES, deadline).await {
            Ok(chunk) if chunk.bytes.is_empty() => break,
            Ok(chunk) => response.extend_from_slice(&chunk.bytes),
            Err(crate::mux::MuxError::Timeout) => break,
            Err(err) => {
                net.close(handle).await;
                return Err(err.into());
            }
        }
    }
    net.close(handle).await;
    soap::parse_http_response(&response)
}
