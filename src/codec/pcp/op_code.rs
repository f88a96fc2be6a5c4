use super::OptionCode;
use crate::codec::util::{Deserialize, Deserializer, Serialize, Serializer};
use crate::codec::util::Result;
use crate::codec::CodecError;

/// The PCP operation (RFC 6887 §7.1). In requests this names the operation to perform;
/// in responses it says which operation the response refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpCode {
    Announce = 0,
    Map = 1,
    Peer = 2,
}

impl OpCode {
    /// The [`OptionCode`]s that may legally accompany this opcode (RFC 6887 §7.3).
    pub const fn valid_options(&self) -> &'static [OptionCode] {
        use OptionCode::*;
        match self {
            Self::Announce => &[],
            Self::Map => &[ThirdParty, PreferFailure, Filter],
            Self::Peer => &[ThirdParty],
        }
    }

    pub fn is_option_valid(&self, option: OptionCode) -> bool {
        self.valid_options().contains(&option)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Announce => "ANNOUNCE",
            Self::Map => "MAP",
            Self::Peer => "PEER",
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = CodecError;

    fn try_from(byte: u8) -> core::result::Result<Self, Self::Error> {
        match byte {
            0 => Ok(Self::Announce),
            1 => Ok(Self::Map),
            2 => Ok(Self::Peer),
            n => Err(CodecError::UnknownOpcode(n)),
        }
    }
}

impl Deserialize for OpCode {
    fn deserialize(data: &mut Deserializer<'_>) -> Result<Self> {
        let byte: u8 = data.deserialize()?;
        Self::try_from(byte)
    }
}

impl Serialize for OpCode {
    fn serialize<const S: usize>(self, buffer: &mut Serializer<S>) -> Result<()> {
        buffer.serialize(self as u8)?;
        Ok(())
    }
}
