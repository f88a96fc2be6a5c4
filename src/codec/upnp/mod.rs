//! UPnP-IGD's three text wire formats: SSDP discovery datagrams, HTTP/SOAP control
//! requests, and the XML device descriptor fetched from a discovered `LOCATION`.

pub mod descriptor;
pub mod soap;
pub mod ssdp;

pub use descriptor::ServiceDescriptor;
pub use soap::SoapOutcome;
pub use ssdp::SearchResponse;
