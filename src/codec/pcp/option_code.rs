use crate::codec::util::{Deserialize, Deserializer, Serialize, Serializer};
use crate::codec::util::Result;
use crate::codec::CodecError;

/// The `OptionCode` field of a PCP option header (RFC 6887 §7.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionCode {
    ThirdParty = 1,
    PreferFailure = 2,
    Filter = 3,
}

impl OptionCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ThirdParty => "THIRD_PARTY",
            Self::PreferFailure => "PREFER_FAILURE",
            Self::Filter => "FILTER",
        }
    }
}

impl Deserialize for OptionCode {
    fn deserialize(data: &mut Deserializer<'_>) -> Result<Self> {
        match data.deserialize::<u8>()? {
            1 => Ok(Self::ThirdParty),
            2 => Ok(Self::PreferFailure),
            3 => Ok(Self::Filter),
            n => Err(CodecError::UnknownOptionCode(n)),
        }
    }
}

impl Serialize for OptionCode {
    fn serialize<const S: usize>(self, buffer: &mut Serializer<S>) -> Result<()> {
        buffer.serialize(self as u8)?;
        Ok(())
    }
}
