//! In-process secure element, answering channel management and application selection.
//!
//! Useful to exercise the engine without hardware: it keeps its own channel bookkeeping, so
//! opening and closing logical channels behaves like a card supporting all 19 of them.

use std::collections::BTreeSet;

use crate::apdu::{channel_from_cla, ins, StatusWord};
use crate::channel::{ChannelAllocator, BASIC_CHANNEL};
use crate::transport::{Transport, TransportError};

const SW_LOGICAL_CHANNEL_NOT_SUPPORTED: StatusWord = StatusWord::new(0x68, 0x81);
const SW_WRONG_LENGTH: StatusWord = StatusWord::new(0x67, 0x00);
const SW_FUNCTION_NOT_SUPPORTED: StatusWord = StatusWord::new(0x6A, 0x81);
const SW_FILE_NOT_FOUND: StatusWord = StatusWord::new(0x6A, 0x82);
const SW_INCORRECT_P1_P2: StatusWord = StatusWord::new(0x6A, 0x86);
const SW_INS_NOT_SUPPORTED: StatusWord = StatusWord::new(0x6D, 0x00);
const SW_CLA_NOT_SUPPORTED: StatusWord = StatusWord::new(0x6E, 0x00);

/// FCI template tag.
const TAG_FCI: u8 = 0x6F;
/// DF name tag inside the FCI.
const TAG_DF_NAME: u8 = 0x84;

/// A software secure element.
#[derive(Debug, Default)]
pub struct Simulator {
    applets: BTreeSet<Vec<u8>>,
    channels: ChannelAllocator,
    connected: bool,
}

impl Simulator {
    /// Creates a simulator without any applet installed.
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a simulator with the applets installed.
    pub fn with_applets<I>(aids: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self {
            applets: aids.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Installs an applet, making it selectable by the AID.
    pub fn install(&mut self, aid: Vec<u8>) {
        self.applets.insert(aid);
    }

    /// Processes a command as the card would.
    pub fn process(&mut self, command: &[u8]) -> Vec<u8> {
        let (cla, ins, p1, p2, body) = match command {
            [cla, ins, p1, p2, body @ ..] => (*cla, *ins, *p1, *p2, body),
            _ => return status(SW_WRONG_LENGTH),
        };

        let channel = match channel_from_cla(cla) {
            Some(channel) => channel,
            None => return status(SW_CLA_NOT_SUPPORTED),
        };

        if !self.channels.is_open(channel) {
            return status(SW_LOGICAL_CHANNEL_NOT_SUPPORTED);
        }

        match ins {
            ins::MANAGE_CHANNEL => self.manage_channel(channel, p1, p2),
            ins::SELECT_FILE => self.select(p1, body),
            _ => status(SW_INS_NOT_SUPPORTED),
        }
    }

    fn manage_channel(&mut self, channel: u8, p1: u8, p2: u8) -> Vec<u8> {
        match p1 {
            0x00 => match self.channels.allocate_next() {
                Ok(number) => {
                    debug!("Simulator opened logical channel {}", number);

                    let mut response = vec![number];
                    response.extend(status(StatusWord::SUCCESS));
                    response
                }
                Err(_) => status(SW_FUNCTION_NOT_SUPPORTED),
            },
            0x80 => {
                let target = match p2 {
                    0 => channel,
                    n => n,
                };

                if target == BASIC_CHANNEL || !self.channels.is_open(target) {
                    return status(SW_LOGICAL_CHANNEL_NOT_SUPPORTED);
                }

                debug!("Simulator closed logical channel {}", target);
                self.channels.release(target);

                status(StatusWord::SUCCESS)
            }
            _ => status(SW_INCORRECT_P1_P2),
        }
    }

    fn select(&self, p1: u8, body: &[u8]) -> Vec<u8> {
        if p1 != 0x04 {
            return status(SW_INCORRECT_P1_P2);
        }

        let aid = match body {
            [lc, rest @ ..] if rest.len() >= *lc as usize => &rest[..*lc as usize],
            _ => return status(SW_WRONG_LENGTH),
        };

        if !self.applets.contains(aid) {
            return status(SW_FILE_NOT_FOUND);
        }

        // The DF name must fit into a single octet length inside the FCI.
        let (Ok(fci_len), Ok(aid_len)) = (u8::try_from(aid.len() + 2), u8::try_from(aid.len()))
        else {
            return status(SW_WRONG_LENGTH);
        };

        let mut response = vec![TAG_FCI, fci_len, TAG_DF_NAME, aid_len];
        response.extend_from_slice(aid);
        response.extend(status(StatusWord::SUCCESS));
        response
    }
}

impl Transport for Simulator {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.connected = true;

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send_receive(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        match self.connected {
            true => Ok(self.process(command)),
            _ => Err(TransportError::NotConnected),
        }
    }
}

fn status(sw: StatusWord) -> Vec<u8> {
    vec![sw.sw1, sw.sw2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu::Command;

    const AID: [u8; 7] = [0xA0, 0x00, 0x00, 0x00, 0x03, 0x10, 0x10];

    #[test]
    fn test_select_installed() {
        let mut sim = Simulator::with_applets([AID.to_vec()]);
        let response = sim.process(&Command::select_by_name(0x00, 0x00, &AID).unwrap().into_bytes());

        assert_eq!(
            vec![0x6F, 0x09, 0x84, 0x07, 0xA0, 0x00, 0x00, 0x00, 0x03, 0x10, 0x10, 0x90, 0x00],
            response,
        );
    }

    #[test]
    fn test_select_unknown() {
        let mut sim = Simulator::new();
        let response = sim.process(&Command::select_by_name(0x00, 0x00, &AID).unwrap().into_bytes());

        assert_eq!(vec![0x6A, 0x82], response);
    }

    #[test]
    fn test_open_and_close() {
        let mut sim = Simulator::new();

        assert_eq!(
            vec![0x01, 0x90, 0x00],
            sim.process(&Command::manage_channel_open().into_bytes()),
        );
        assert_eq!(
            vec![0x02, 0x90, 0x00],
            sim.process(&Command::manage_channel_open().into_bytes()),
        );
        assert_eq!(
            vec![0x90, 0x00],
            sim.process(&Command::manage_channel_close(1).unwrap().into_bytes()),
        );
        assert_eq!(
            vec![0x68, 0x81],
            sim.process(&Command::manage_channel_close(1).unwrap().into_bytes()),
        );
        assert_eq!(
            vec![0x01, 0x90, 0x00],
            sim.process(&Command::manage_channel_open().into_bytes()),
        );
    }

    #[test]
    fn test_exhausted() {
        let mut sim = Simulator::new();
        for _ in 0..19 {
            sim.process(&Command::manage_channel_open().into_bytes());
        }

        assert_eq!(
            vec![0x6A, 0x81],
            sim.process(&Command::manage_channel_open().into_bytes()),
        );
    }

    #[test]
    fn test_select_aid_too_long_for_fci() {
        let mut sim = Simulator::with_applets([vec![0xA0; 253], vec![0xA0; 254]]);

        let select = Command::select_by_name(0x00, 0x00, &[0xA0; 253]).unwrap();
        let response = sim.process(&select.into_bytes());
        assert_eq!(&[TAG_FCI, 0xFF, TAG_DF_NAME, 0xFD], &response[..4]);
        assert_eq!(&[0x90, 0x00], &response[response.len() - 2..]);

        let select = Command::select_by_name(0x00, 0x00, &[0xA0; 254]).unwrap();
        let response = sim.process(&select.into_bytes());
        assert_eq!(vec![0x67, 0x00], response);
    }

    #[test]
    fn test_closed_channel() {
        let mut sim = Simulator::with_applets([AID.to_vec()]);
        let response = sim.process(&Command::select_by_name(0x45, 0x00, &AID).unwrap().into_bytes());

        assert_eq!(vec![0x68, 0x81], response);
    }

    #[test]
    fn test_malformed() {
        let mut sim = Simulator::new();

        assert_eq!(vec![0x67, 0x00], sim.process(&[0x00, 0xA4]));
        assert_eq!(vec![0x6D, 0x00], sim.process(&[0x00, 0xB0, 0x00, 0x00, 0x00]));
        assert_eq!(vec![0x6E, 0x00], sim.process(&[0x80, 0xA4, 0x04, 0x00, 0x00]));
    }

    #[test]
    fn test_requires_connection() {
        let mut sim = Simulator::new();

        assert!(matches!(
            sim.send_receive(&[0x00, 0x70, 0x00, 0x00, 0x01]),
            Err(TransportError::NotConnected)
        ));

        sim.connect().unwrap();
        assert!(sim.is_connected());
        assert_eq!(
            vec![0x01, 0x90, 0x00],
            sim.send_receive(&[0x00, 0x70, 0x00, 0x00, 0x01]).unwrap(),
        );
    }
}
