use std::fmt;

use crate::error::{Acknowledgement, Error, Result};

/// Status Word (SW1-SW2) trailing every APDU response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct StatusWord {
    pub sw1: u8,
    pub sw2: u8,
}

/// How a status word is to be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `90 00`
    Success,

    /// `62 XX` or `63 XX`. The response is still handed to the caller.
    Warning,

    /// `64 FF`: the secure element is unable to process anything.
    HardwareError,

    /// Anything else.
    Failed,
}

impl StatusWord {
    pub const SUCCESS: Self = Self::new(0x90, 0x00);

    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Reads the trailing two octets of the response.
    /// Returns `None` if the response is too short to hold a status word.
    pub fn from_response(response: &[u8]) -> Option<Self> {
        match response {
            [.., sw1, sw2] => Some(Self::new(*sw1, *sw2)),
            _ => None,
        }
    }

    pub const fn to_u16(self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    pub const fn outcome(self) -> Outcome {
        match (self.sw1, self.sw2) {
            (0x90, 0x00) => Outcome::Success,
            (0x62, _) | (0x63, _) => Outcome::Warning,
            (0x64, 0xFF) => Outcome::HardwareError,
            _ => Outcome::Failed,
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self.outcome(), Outcome::Success)
    }

    /// Gets a description of this status word
    pub const fn description(&self) -> &'static str {
        match (self.sw1, self.sw2) {
            (0x90, 0x00) => "Success",
            (0x61, _) => "More data available",
            (0x62, 0x81) => "Part of returned data may be corrupted",
            (0x62, 0x82) => "End of file reached before reading Le bytes",
            (0x62, 0x83) => "Selected file invalidated",
            (0x62, 0x84) => "FCI not formatted according to ISO 7816-4",
            (0x62, _) => "Warning, non-volatile memory unchanged",
            (0x63, n) if (n & 0xF0) == 0xC0 => "Counter value",
            (0x63, _) => "Warning, non-volatile memory changed",
            (0x64, 0xFF) => "Secure element unavailable",
            (0x64, _) => "Execution error, non-volatile memory unchanged",
            (0x65, 0x81) => "Memory failure",
            (0x67, 0x00) => "Wrong length",
            (0x68, 0x81) => "Logical channel not supported",
            (0x69, 0x82) => "Security status not satisfied",
            (0x69, 0x85) => "Conditions of use not satisfied",
            (0x69, 0x86) => "Command not allowed",
            (0x69, 0x99) => "Applet selection failed",
            (0x6A, 0x81) => "Function not supported",
            (0x6A, 0x82) => "File not found",
            (0x6A, 0x86) => "Incorrect parameters P1-P2",
            (0x6A, 0x88) => "Referenced data not found",
            (0x6D, 0x00) => "Instruction code not supported or invalid",
            (0x6E, 0x00) => "Class not supported",
            (0x6F, 0x00) => "No precise diagnosis",
            _ => "Unknown status word",
        }
    }
}

impl From<(u8, u8)> for StatusWord {
    fn from((sw1, sw2): (u8, u8)) -> Self {
        Self::new(sw1, sw2)
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X} {:02X}", self.sw1, self.sw2)
    }
}

/// Classifies a SELECT response. Warnings are accepted along with success.
pub(crate) fn check_select(response: &[u8]) -> Result<Outcome> {
    let sw = StatusWord::from_response(response).ok_or(Error::MalformedResponse(response.len()))?;

    match sw.outcome() {
        outcome @ (Outcome::Success | Outcome::Warning) => Ok(outcome),
        Outcome::HardwareError => Err(Error::Hardware(sw)),
        Outcome::Failed => Err(Error::Rejected(sw)),
    }
}

/// Checks a MANAGE CHANNEL OPEN response, which must end with exactly `90 00`.
pub(crate) fn check_acknowledgement(response: &[u8]) -> Result<()> {
    match StatusWord::from_response(response) {
        Some(sw) if sw.is_success() => Ok(()),
        Some(sw) => Err(Error::ManageChannelRejected(Acknowledgement::Status(sw))),
        None => Err(Error::ManageChannelRejected(Acknowledgement::Truncated(
            response.len(),
        ))),
    }
}
