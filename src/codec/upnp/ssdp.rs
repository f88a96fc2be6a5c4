//! SSDP M-SEARCH datagram construction and response parsing (UPnP Device Architecture
//! §1.3.2). This is HTTP-over-UDP: the datagram bodies look like HTTP/1.1 messages but
//! travel as single UDP payloads with no connection semantics.

use std::fmt::Write as _;

use crate::codec::CodecError;

pub const MULTICAST_V4: &str = "239.255.255.250:1900";
pub const MULTICAST_V6: &str = "[ff02::c]:1900";

/// Builds an M-SEARCH datagram body for one search target. `mx` is clamped to the
/// 1-5 range the UPnP Device Architecture allows.
pub fn build_search_request(search_target: &str, mx: u8) -> Vec<u8> {
    let mx = mx.clamp(1, 5);
    let mut request = String::new();
    let _ = write!(request, "M-SEARCH * HTTP/1.1\r\n");
    let _ = write!(request, "HOST: 239.255.255.250:1900\r\n");
    let _ = write!(request, "MAN: \"ssdp:discover\"\r\n");
    let _ = write!(request, "MX: {mx}\r\n");
    let _ = write!(request, "ST: {search_target}\r\n");
    request.push_str("\r\n");
    request.into_bytes()
}

/// The headers this crate cares about from an SSDP response datagram.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchResponse {
    pub location: Option<String>,
    pub search_target: Option<String>,
    pub unique_service_name: Option<String>,
    pub server: Option<String>,
}

/// Parses an HTTP/1.1-style response datagram for the `LOCATION`, `ST`, `USN`, `SERVER`
/// headers. Header names are matched case-insensitively per RFC 7230; unknown headers
/// are ignored.
pub fn parse_search_response(datagram: &[u8]) -> Result<SearchResponse, CodecError> {
    let text = std::str::from_utf8(datagram).map_err(|_| CodecError::MalformedText("SSDP response"))?;
    let mut lines = text.split("\r\n");
    let status_line = lines.next().ok_or(CodecError::MalformedText("SSDP response"))?;
    if !status_line.starts_with("HTTP/1.1 200") && !status_line.starts_with("HTTP/1.0 200") {
        return Err(CodecError::MalformedText("SSDP status line"));
    }

    let mut response = SearchResponse::default();
    for line in lines {
        let Some((name, value)) = line.split_once(':') else { continue };
        let value = value.trim().to_string();
        match name.trim().to_ascii_uppercase().as_str() {
            "LOCATION" => response.location = Some(value),
            "ST" => response.search_target = Some(value),
            "USN" => response.unique_service_name = Some(value),
            "SERVER" => response.server = Some(value),
            _ => {}
        }
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_request_quotes_man_header() {
        let request = build_search_request("upnp:rootdevice", 3);
        let text = String::from_utf8(request).unwrap();
        assert!(text.contains("MAN: \"ssdp:discover\"\r\n"));
        assert!(text.contains("MX: 3\r\n"));
        assert!(text.contains("ST: upnp:rootdevice\r\n"));
    }

    #[test]
    fn search_request_clamps_mx() {
        let request = build_search_request("upnp:rootdevice", 9);
        let text = String::from_utf8(request).unwrap();
        assert!(text.contains("MX: 5\r\n"));
    }

    #[test]
    fn parses_location_and_service_headers() {
        let datagram = b"HTTP/1.1 200 OK\r\n\
            CACHE-CONTROL: max-age=1800\r\n\
            LOCATION: http://192.168.1.1:5000/rootDesc.xml\r\n\
            ST: urn:schemas-upnp-org:service:WANIPConnection:1\r\n\
            USN: uuid:1234::urn:schemas-upnp-org:service:WANIPConnection:1\r\n\
            SERVER: Linux/1.0 UPnP/1.1 router/1.0\r\n\r\n";
        let response = parse_search_response(datagram).unwrap();
        assert_eq!(response.location.as_deref(), Some("http://192.168.1.1:5000/rootDesc.xml"));
        assert_eq!(response.search_target.as_deref(), Some("urn:schemas-upnp-org:service:WANIPConnection:1"));
        assert!(response.unique_service_name.is_some());
        assert!(response.server.is_some());
    }

    #[test]
    fn rejects_non_200_status() {
        let datagram = b"HTTP/1.1 404 Not Found\r\n\r\n";
        assert!(parse_search_response(datagram).is_err());
    }
}
