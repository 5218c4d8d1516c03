use std::num::ParseIntError;
use std::ops::Deref;
use std::str::FromStr;

/// Octets given in hex on the command line. Spaces are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Hex(Vec<u8>);

impl FromStr for Hex {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.replace(' ', "");

        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map(Self)
    }
}

impl Deref for Hex {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Hex> for Vec<u8> {
    fn from(Hex(bytes): Hex) -> Self {
        bytes
    }
}

/// Parses an octet written in decimal, or in hex with a `0x` prefix.
pub(crate) fn parse_byte(s: &str) -> Result<u8, ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(h) => u8::from_str_radix(h, 16),
        None => s.parse(),
    }
}
