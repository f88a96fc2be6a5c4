//! PCP (RFC 6887) wire encoding: header, options, and the `MAP`/`PEER`/`ANNOUNCE` payloads.

mod epoch;
mod op_code;
mod option;
mod option_code;
mod payload;
mod request;
mod response;
mod result_code;

pub use epoch::Epoch;
pub use op_code::OpCode;
pub use option::PcpOption;
pub use option_code::OptionCode;
pub use payload::{MapPayload, PeerPayload};
pub use request::{Request, RequestPayload};
pub use response::{Response, ResponsePayload};
pub use result_code::ResultCode;

/// RFC 6887 §7: "Value 2 for the current version of this specification."
pub const VERSION: u8 = 2;

/// RFC 6887 §7: "PCP...MUST NOT exceed 1100 octets".
pub const MAX_PACKET_SIZE: usize = 1100;

/// RFC 6887 §19.1: the well-known port both client and server use.
pub const SERVER_PORT: u16 = 5351;

/// RFC 6887 §8.1.1's default initial and maximum retransmission timings.
pub const IRT_SECONDS: u32 = 3;
pub const MRC: u32 = 0;
pub const MRT_SECONDS: u32 = 1024;
pub const MRD_SECONDS: u32 = 0;
