//! Byte-exact HTTP/SOAP request construction and response parsing for UPnP-IGD's
//! WANIPConnection/WANPPPConnection/WANIPv6FirewallControl services.
//!
//! The wire form is fixed: routers in the field match `SOAPAction` and body text as
//! literal substrings, so nothing here is allowed to vary run to run for the same
//! arguments (field order, quoting, namespace spelling all matter).

use std::fmt::Write as _;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::codec::CodecError;
use crate::error::Error;
use crate::types::PortType;

/// The SOAP envelope namespace this crate emits. RFC 6887 has nothing to say about
/// this; UPnP vendors in the wild are lenient, but the exact byte sequence is kept
/// stable because some golden-test fixtures pin it. See the design notes for why this
/// is 2003/05 (SOAP 1.2) dressed up with a 1.1-style `encodingStyle` attribute: it's
/// mismatched on purpose, carried over unchanged rather than "fixed".
const SOAP_ENVELOPE_NS: &str = "http://www.w3.org/2003/05/soap-envelope/";
const SOAP_ENCODING_NS: &str = "http://schemas.xmlsoap.org/soap/encoding/";

/// An ordered `(element name, value)` pair to emit as a SOAP argument.
pub type Arg = (&'static str, String);

/// Renders an IPv4 address as a dotted quad (the default `Display` impl already does
/// exactly this).
pub fn render_ipv4(addr: Ipv4Addr) -> String {
    addr.to_string()
}

/// Renders an IPv6 address the way UPnP-IGD expects: lowercase colon-separated groups
/// with leading zeros stripped per group, with no `::` compression applied even when
/// groups are all zero.
pub fn render_ipv6(addr: Ipv6Addr) -> String {
    addr.segments()
        .iter()
        .map(|seg| format!("{seg:x}"))
        .collect::<Vec<_>>()
        .join(":")
}

pub fn render_ip(addr: IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => render_ipv4(v4),
        IpAddr::V6(v6) => render_ipv6(v6),
    }
}

fn escape_xml_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn render_args(args: &[Arg]) -> String {
    let mut body = String::new();
    for (name, value) in args {
        let _ = write!(body, "<{name}>{}</{name}>", escape_xml_text(value));
    }
    body
}

/// Builds the SOAP XML body for `action` on `service_type`, with `args` rendered as
/// child elements in the order given.
fn soap_body(action: &str, service_type: &str, args: &[Arg]) -> String {
    let parts = [
        "<?xml version=\"1.0\"?>".to_string(),
        format!(
            "<s:Envelope xmlns:s=\"{SOAP_ENVELOPE_NS}\" s:encodingStyle=\"{SOAP_ENCODING_NS}\">"
        ),
        "<s:Body>".to_string(),
        format!("<u:{action} xmlns:u=\"{service_type}\">"),
        render_args(args),
        format!("</u:{action}>"),
        "</s:Body>".to_string(),
        "</s:Envelope>".to_string(),
        String::new(),
    ];
    parts.join("\r\n")
}

/// Builds the full HTTP/1.1 request (headers + body) for one SOAP action (spec §4.1.3).
pub fn build_request(host: &str, control_path: &str, service_type: &str, action: &str, args: &[Arg]) -> Vec<u8> {
    let body = soap_body(action, service_type, args);
    let mut request = String::new();
    let _ = write!(request, "POST {control_path} HTTP/1.1\r\n");
    let _ = write!(request, "Host: {host}\r\n");
    let _ = write!(request, "Content-Type: text/xml\r\n");
    let _ = write!(request, "SOAPAction: {service_type}#{action}\r\n");
    let _ = write!(request, "Connection: Close\r\n");
    let _ = write!(request, "Cache-Control: no-cache\r\n");
    let _ = write!(request, "Pragma: no-cache\r\n");
    let _ = write!(request, "Content-Length: {}\r\n", body.len());
    request.push_str("\r\n");
    request.push_str(&body);
    request.into_bytes()
}

fn require_nonzero_port(port: u16) -> Result<(), Error> {
    if port == 0 {
        return Err(Error::InvalidArgument("internalPort"));
    }
    Ok(())
}

fn require_nonnegative_lease(lease_seconds: i64) -> Result<(), Error> {
    if lease_seconds < 0 {
        return Err(Error::InvalidArgument("lifetime"));
    }
    Ok(())
}

fn remote_host_arg(remote_host: Option<IpAddr>) -> String {
    remote_host.map(render_ip).unwrap_or_default()
}

pub fn get_external_ip_address(host: &str, control_path: &str, service_type: &str) -> Vec<u8> {
    build_request(host, control_path, service_type, "GetExternalIPAddress", &[])
}

#[allow(clippy::too_many_arguments)]
pub fn add_port_mapping(
    host: &str,
    control_path: &str,
    service_type: &str,
    remote_host: Option<IpAddr>,
    external_port: u16,
    protocol: PortType,
    internal_port: u16,
    internal_client: IpAddr,
    enabled: bool,
    description: &str,
    lease_seconds: i64,
) -> Result<Vec<u8>, Error> {
    require_nonzero_port(internal_port)?;
    require_nonnegative_lease(lease_seconds)?;
    let args = [
        ("NewRemoteHost", remote_host_arg(remote_host)),
        ("NewExternalPort", external_port.to_string()),
        ("NewProtocol", protocol.as_upnp_str().to_string()),
        ("NewInternalPort", internal_port.to_string()),
        ("NewInternalClient", render_ip(internal_client)),
        ("NewEnabled", if enabled { "1" } else { "0" }.to_string()),
        ("NewPortMappingDescription", description.to_string()),
        ("NewLeaseDuration", lease_seconds.to_string()),
    ];
    Ok(build_request(host, control_path, service_type, "AddPortMapping", &args))
}

#[allow(clippy::too_many_arguments)]
pub fn add_any_port_mapping(
    host: &str,
    control_path: &str,
    service_type: &str,
    remote_host: Option<IpAddr>,
    external_port: u16,
    protocol: PortType,
    internal_port: u16,
    internal_client: IpAddr,
    enabled: bool,
    description: &str,
    lease_seconds: i64,
) -> Result<Vec<u8>, Error> {
    require_nonzero_port(internal_port)?;
    require_nonnegative_lease(lease_seconds)?;
    let args = [
        ("NewRemoteHost", remote_host_arg(remote_host)),
        ("NewExternalPort", external_port.to_string()),
        ("NewProtocol", protocol.as_upnp_str().to_string()),
        ("NewInternalPort", internal_port.to_string()),
        ("NewInternalClient", render_ip(internal_client)),
        ("NewEnabled", if enabled { "1" } else { "0" }.to_string()),
        ("NewPortMappingDescription", description.to_string()),
        ("NewLeaseDuration", lease_seconds.to_string()),
    ];
    Ok(build_request(host, control_path, service_type, "AddAnyPortMapping", &args))
}

pub fn delete_port_mapping(
    host: &str,
    control_path: &str,
    service_type: &str,
    remote_host: Option<IpAddr>,
    external_port: u16,
    protocol: PortType,
) -> Vec<u8> {
    let args = [
        ("NewRemoteHost", remote_host_arg(remote_host)),
        ("NewExternalPort", external_port.to_string()),
        ("NewProtocol", protocol.as_upnp_str().to_string()),
    ];
    build_request(host, control_path, service_type, "DeletePortMapping", &args)
}

#[allow(clippy::too_many_arguments)]
pub fn add_pinhole(
    host: &str,
    control_path: &str,
    service_type: &str,
    remote_host: Option<IpAddr>,
    remote_port: u16,
    internal_client: IpAddr,
    internal_port: u16,
    protocol: PortType,
    lease_seconds: i64,
) -> Result<Vec<u8>, Error> {
    require_nonzero_port(internal_port)?;
    require_nonnegative_lease(lease_seconds)?;
    let args = [
        ("NewRemoteHost", remote_host_arg(remote_host)),
        ("NewRemotePort", remote_port.to_string()),
        ("NewInternalClient", render_ip(internal_client)),
        ("NewInternalPort", internal_port.to_string()),
        ("NewProtocol", (protocol.protocol_number() as u16).to_string()),
        ("NewLeaseTime", lease_seconds.to_string()),
    ];
    Ok(build_request(host, control_path, service_type, "AddPinhole", &args))
}

pub fn delete_pinhole(host: &str, control_path: &str, service_type: &str, unique_id: &str) -> Vec<u8> {
    let args = [("NewUniqueID", unique_id.to_string())];
    build_request(host, control_path, service_type, "DeletePinhole", &args)
}

pub fn get_outbound_pinhole_timeout(
    host: &str,
    control_path: &str,
    service_type: &str,
    remote_host: Option<IpAddr>,
    remote_port: u16,
    internal_client: IpAddr,
    internal_port: u16,
    protocol: PortType,
) -> Vec<u8> {
    let args = [
        ("NewRemoteHost", remote_host_arg(remote_host)),
        ("NewRemotePort", remote_port.to_string()),
        ("NewInternalClient", render_ip(internal_client)),
        ("NewInternalPort", internal_port.to_string()),
        ("NewProtocol", (protocol.protocol_number() as u16).to_string()),
    ];
    build_request(host, control_path, service_type, "GetOutboundPinholeTimeout", &args)
}

/// A parsed SOAP response: either the action's response arguments (as raw text, keyed
/// by element name) or a UPnP error `(errorCode, errorDescription)`.
#[derive(Debug, Clone, PartialEq)]
pub enum SoapOutcome {
    Success(Vec<(String, String)>),
    Fault { error_code: u16, description: String },
}

/// Pulls the HTTP body out of a response and hands it to [`parse_soap_body`]. Expects
/// `bytes` to be the full response including status line and headers.
pub fn parse_http_response(bytes: &[u8]) -> Result<SoapOutcome, Error> {
    let text = std::str::from_utf8(bytes).map_err(|_| CodecError::MalformedText("http response"))?;
    let body = text
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or(text);
    parse_soap_body(body)
}

/// Parses a bare SOAP body (no HTTP framing) into either the action's arguments or a
/// fault. This is a small hand-rolled scan rather than a full XML parser: SOAP action
/// responses are flat (no nested elements below the argument level), so extracting
/// `<Name>value</Name>` pairs by literal tag search is sufficient and avoids pulling
/// in a DOM for a one-level structure.
pub fn parse_soap_body(body: &str) -> Result<SoapOutcome, Error> {
    if let Some(detail_start) = body.find("<errorCode>") {
        let rest = &body[detail_start..];
        let code = extract_tag_text(rest, "errorCode")
            .and_then(|s| s.trim().parse::<u16>().ok())
            .ok_or(CodecError::MalformedText("UPnP fault errorCode"))?;
        let description = extract_tag_text(rest, "errorDescription").unwrap_or_default();
        return Ok(SoapOutcome::Fault { error_code: code, description });
    }

    let body_start = body.find("<s:Body>").or_else(|| body.find("<SOAP-ENV:Body>"));
    let Some(start) = body_start else {
        return Err(Error::Codec(CodecError::MalformedText("SOAP body")));
    };
    let mut args = Vec::new();
    let mut cursor = start;
    while let Some(open) = body[cursor..].find('<') {
        let open = cursor + open;
        let Some(tag_end) = body[open..].find('>') else { break };
        let tag_end = open + tag_end;
        let tag = &body[open + 1..tag_end];
        if tag.starts_with('/') || tag.contains(' ') || tag.contains(':') {
            cursor = tag_end + 1;
            continue;
        }
        let close_tag = format!("</{tag}>");
        let Some(close_rel) = body[tag_end + 1..].find(&close_tag) else {
            cursor = tag_end + 1;
            continue;
        };
        let value = &body[tag_end + 1..tag_end + 1 + close_rel];
        args.push((tag.to_string(), value.to_string()));
        cursor = tag_end + 1 + close_rel + close_tag.len();
    }
    Ok(SoapOutcome::Success(args))
}

fn extract_tag_text(haystack: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = haystack.find(&open)? + open.len();
    let end = haystack[start..].find(&close)? + start;
    Some(haystack[start..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_external_ip_address_matches_expected_content_length() {
        let request = get_external_ip_address("fake", "/controllink", "service:type");
        let text = String::from_utf8(request).unwrap();
        assert!(text.contains("Content-Length: 262\r\n"));
        assert!(text.starts_with("POST /controllink HTTP/1.1\r\n"));
        assert!(text.contains("SOAPAction: service:type#GetExternalIPAddress\r\n"));
    }

    #[test]
    fn delete_port_mapping_ipv4_matches_expected_content_length() {
        let request = delete_port_mapping(
            "fake",
            "/controllink",
            "service:type",
            Some("1.2.3.4".parse().unwrap()),
            15,
            PortType::Tcp,
        );
        let text = String::from_utf8(request).unwrap();
        assert!(text.contains("Content-Length: 361\r\n"));
        assert!(text.contains(
            "<NewRemoteHost>1.2.3.4</NewRemoteHost><NewExternalPort>15</NewExternalPort><NewProtocol>TCP</NewProtocol>"
        ));
    }

    #[test]
    fn delete_port_mapping_ipv6_strips_leading_zeros_without_compression() {
        let addr: Ipv6Addr = "0102:0304:0506:0708:090a:0b0c:0d0e:0f10".parse().unwrap();
        assert_eq!(render_ipv6(addr), "102:304:506:708:90a:b0c:d0e:f10");
    }

    #[test]
    fn add_port_mapping_matches_expected_content_length() {
        let request = add_port_mapping(
            "fake",
            "/controllink",
            "service:type",
            Some("1.2.3.4".parse().unwrap()),
            15,
            PortType::Tcp,
            12345,
            "5.6.7.8".parse().unwrap(),
            true,
            "desc",
            1000,
        )
        .unwrap();
        let text = String::from_utf8(request).unwrap();
        assert!(text.contains("Content-Length: 567\r\n"));
    }

    #[test]
    fn add_port_mapping_rejects_zero_internal_port() {
        let result = add_port_mapping(
            "fake", "/controllink", "service:type", None, 15, PortType::Tcp, 0,
            "5.6.7.8".parse().unwrap(), true, "desc", 1000,
        );
        assert_eq!(result, Err(Error::InvalidArgument("internalPort")));
    }

    #[test]
    fn add_port_mapping_rejects_negative_lease() {
        let result = add_port_mapping(
            "fake", "/controllink", "service:type", None, 15, PortType::Tcp, 12345,
            "5.6.7.8".parse().unwrap(), true, "desc", -1,
        );
        assert_eq!(result, Err(Error::InvalidArgument("lifetime")));
    }

    #[test]
    fn parses_success_response_arguments() {
        let response = "HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\n\r\n\
            <?xml version=\"1.0\"?><s:Envelope><s:Body><u:GetExternalIPAddressResponse>\
            <NewExternalIPAddress>203.0.113.9</NewExternalIPAddress>\
            </u:GetExternalIPAddressResponse></s:Body></s:Envelope>";
        let outcome = parse_http_response(response.as_bytes()).unwrap();
        match outcome {
            SoapOutcome::Success(args) => {
                assert_eq!(args, vec![("NewExternalIPAddress".to_string(), "203.0.113.9".to_string())]);
            }
            SoapOutcome::Fault { .. } => panic!("expected success"),
        }
    }

    #[test]
    fn parses_fault_response() {
        let body = "<s:Envelope><s:Body><s:Fault><detail><UPnPError>\
            <errorCode>718</errorCode><errorDescription>ConflictInMappingEntry</errorDescription>\
            </UPnPError></detail></s:Fault></s:Body></s:Envelope>";
        let outcome = parse_soap_body(body).unwrap();
        assert_eq!(outcome, SoapOutcome::Fault { error_code: 718, description: "ConflictInMappingEntry".to_string() });
    }
}
