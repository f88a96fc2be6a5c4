//! UPnP device descriptor parsing: walks `device/deviceList/.../serviceList/service`
//! and records `{serviceType, controlURL, SCPDURL, eventSubURL}` for each service
//! found, anywhere in the (possibly nested) device tree.
//!
//! Tolerant by construction: `quick_xml`'s `local_name()` already strips whatever
//! namespace prefix an ancestor element declared, and any element this parser doesn't
//! recognize is simply skipped rather than rejected.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::codec::CodecError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub service_type: String,
    pub control_url: String,
    pub scpd_url: String,
    pub event_sub_url: String,
}

/// Parses a UPnP root device descriptor and returns every `<service>` entry found,
/// regardless of how deeply it's nested under `deviceList`.
pub fn parse_device_descriptor(xml: &[u8]) -> Result<Vec<ServiceDescriptor>, CodecError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut services = Vec::new();
    let mut current: Option<ServiceDescriptor> = None;
    let mut tag_stack: Vec<Vec<u8>> = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|_| CodecError::MalformedText("device descriptor"))?;
        match event {
            Event::Start(start) => {
                let local = start.local_name().as_ref().to_vec();
                if local == b"service" {
                    current = Some(ServiceDescriptor::default());
                }
                tag_stack.push(local);
            }
            Event::Empty(start) => {
                // A self-closing `<service/>` never carries any of the fields we
                // want; nothing to record, but it can't start a new context either.
                let _ = start.local_name();
            }
            Event::Text(text) => {
                if let Some(service) = current.as_mut() {
                    if let Some(tag) = tag_stack.last() {
                        let value = text
                            .unescape()
                            .map_err(|_| CodecError::MalformedText("device descriptor"))?
                            .into_owned();
                        match tag.as_slice() {
                            b"serviceType" => service.service_type = value,
                            b"controlURL" => service.control_url = value,
                            b"SCPDURL" => service.scpd_url = value,
                            b"eventSubURL" => service.event_sub_url = value,
                            _ => {}
                        }
                    }
                }
            }
            Event::End(end) => {
                let local = end.local_name().as_ref().to_vec();
                tag_stack.pop();
                if local == b"service" {
                    if let Some(service) = current.take() {
                        services.push(service);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(services)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:InternetGatewayDevice:1</deviceType>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:WANDevice:1</deviceType>
        <deviceList>
          <device>
            <deviceType>urn:schemas-upnp-org:device:WANConnectionDevice:1</deviceType>
            <serviceList>
              <service>
                <serviceType>urn:schemas-upnp-org:service:WANIPConnection:1</serviceType>
                <serviceId>urn:upnp-org:serviceId:WANIPConn1</serviceId>
                <controlURL>/ctl/IPConn</controlURL>
                <eventSubURL>/evt/IPConn</eventSubURL>
                <SCPDURL>/WANIPCn.xml</SCPDURL>
              </service>
            </serviceList>
          </device>
        </deviceList>
      </device>
    </deviceList>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:Layer3Forwarding:1</serviceType>
        <controlURL>/ctl/L3F</controlURL>
        <eventSubURL>/evt/L3F</eventSubURL>
        <SCPDURL>/Layer3F.xml</SCPDURL>
      </service>
    </serviceList>
  </device>
</root>"#;

    #[test]
    fn finds_services_nested_arbitrarily_deep() {
        let services = parse_device_descriptor(DESCRIPTOR.as_bytes()).unwrap();
        assert_eq!(services.len(), 2);
        assert!(services.iter().any(|s| s.service_type == "urn:schemas-upnp-org:service:WANIPConnection:1"
            && s.control_url == "/ctl/IPConn"
            && s.event_sub_url == "/evt/IPConn"
            && s.scpd_url == "/WANIPCn.xml"));
    }

    #[test]
    fn ignores_unknown_sibling_elements() {
        let xml = br#"<service><serviceType>urn:x</serviceType><unknownVendorTag>ignored</unknownVendorTag><controlURL>/ctl</controlURL><eventSubURL>/evt</eventSubURL><SCPDURL>/s.xml</SCPDURL></service>"#;
        let services = parse_device_descriptor(xml).unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].control_url, "/ctl");
    }

    #[test]
    fn malformed_xml_is_rejected() {
        assert!(parse_device_descriptor(b"<service><serviceType unterminated").is_err());
    }
}
