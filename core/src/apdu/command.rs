use crate::apdu::{self, ins};
use crate::error::{Error, Result};

const MANAGE_CHANNEL_P1_OPEN: u8 = 0x00;
const MANAGE_CHANNEL_P1_CLOSE: u8 = 0x80;

const SELECT_P1_BY_NAME: u8 = 0x04;

/// First CLA of the further interindustry classes (GlobalPlatform Table 11-12).
const CLA_FURTHER_INTERINDUSTRY: u8 = 0x40;

/// An APDU command to be transmitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    le: Option<u8>,
    payload: Option<Vec<u8>>,
}

impl Command {
    /// Constructs an command with CLA, INS, P1, and P2.
    /// No payloads will be transmitted or received.
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            le: None,
            payload: None,
        }
    }

    /// Constructs an command with CLA, INS, P1, P2, and Le.
    pub fn new_with_le(cla: u8, ins: u8, p1: u8, p2: u8, le: u8) -> Self {
        Self {
            le: Some(le),
            ..Self::new(cla, ins, p1, p2)
        }
    }

    /// Constructs an command with CLA, INS, P1, P2, Le, and a payload.
    /// The payload must not exceed 255 octets, as Lc is a single octet.
    pub fn new_with_payload_le(
        cla: u8,
        ins: u8,
        p1: u8,
        p2: u8,
        le: u8,
        payload: Vec<u8>,
    ) -> Result<Self> {
        if payload.len() > u8::MAX as usize {
            return Err(Error::AidTooLong(payload.len()));
        }

        Ok(Self {
            le: Some(le),
            payload: Some(payload),
            ..Self::new(cla, ins, p1, p2)
        })
    }

    /// Constructs a `MANAGE CHANNEL` command that asks the card to open a logical channel.
    /// The card answers with the assigned channel number, hence Le = 1.
    pub fn manage_channel_open() -> Self {
        Self::new_with_le(
            apdu::CLA_DEFAULT,
            ins::MANAGE_CHANNEL,
            MANAGE_CHANNEL_P1_OPEN,
            0x00,
            0x01,
        )
    }

    /// Constructs a `MANAGE CHANNEL` command closing the logical channel, sent on that channel.
    pub fn manage_channel_close(channel: u8) -> Result<Self> {
        Ok(Self::new_with_le(
            cla_for_channel(channel)?,
            ins::MANAGE_CHANNEL,
            MANAGE_CHANNEL_P1_CLOSE,
            channel,
            0x00,
        ))
    }

    /// Constructs a `SELECT` command choosing an application by its AID.
    /// Le is zero, so the card may answer with as much FCI as it likes.
    pub fn select_by_name(cla: u8, p2: u8, aid: &[u8]) -> Result<Self> {
        Self::new_with_payload_le(cla, ins::SELECT_FILE, SELECT_P1_BY_NAME, p2, 0x00, aid.to_vec())
    }

    pub fn cla(&self) -> u8 {
        self.cla
    }

    pub fn ins(&self) -> u8 {
        self.ins
    }

    pub fn p1(&self) -> u8 {
        self.p1
    }

    pub fn p2(&self) -> u8 {
        self.p2
    }

    /// Converts the command into octets.
    pub fn into_bytes(self) -> Vec<u8> {
        let Self {
            cla,
            ins,
            p1,
            p2,
            le,
            payload,
        } = self;

        let mut buffer: Vec<u8> = vec![cla, ins, p1, p2];
        if let Some(mut p) = payload {
            buffer.push(p.len() as u8);
            buffer.append(&mut p);
        }

        if let Some(l) = le {
            buffer.push(l);
        }

        buffer
    }
}

impl From<Command> for Vec<u8> {
    fn from(command: Command) -> Self {
        command.into_bytes()
    }
}

/// Encodes a logical channel number into a CLA byte.
///
/// Channels 1 to 3 use the first interindustry classes (the number itself), channels 4 to 19 use
/// the further interindustry classes starting at `0x40`. The basic channel and anything beyond the
/// last slot are rejected.
pub fn cla_for_channel(channel: u8) -> Result<u8> {
    match channel {
        1..=3 => Ok(channel),
        4..=19 => Ok(CLA_FURTHER_INTERINDUSTRY + (channel - 4)),
        _ => Err(Error::InvalidChannel(channel)),
    }
}

/// Extracts the logical channel number a CLA byte addresses.
/// Returns `None` for proprietary classes (b8 set).
pub fn channel_from_cla(cla: u8) -> Option<u8> {
    match cla & 0x80 {
        0 if cla & CLA_FURTHER_INTERINDUSTRY == 0 => Some(cla & 0x03),
        0 => Some(4 + (cla & 0x0F)),
        _ => None,
    }
}
