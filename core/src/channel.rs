//! Bookkeeping of the channels opened on the secure element.

use crate::apdu::MAX_CHANNELS;
use crate::error::{Error, Result};

/// Number of the basic channel, which is always available.
pub const BASIC_CHANNEL: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ChannelKind {
    Basic,
    Logical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ChannelState {
    Closed,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Channel {
    pub number: u8,
    pub kind: ChannelKind,
    pub state: ChannelState,
}

impl Channel {
    /// Describes the channel of the number in the given state.
    pub fn new(number: u8, state: ChannelState) -> Self {
        Self {
            number,
            kind: match number {
                BASIC_CHANNEL => ChannelKind::Basic,
                _ => ChannelKind::Logical,
            },
            state,
        }
    }
}

/// Tracks which logical channels are open.
/// The basic channel is never allocated nor released through this tracker.
#[derive(Debug, Default)]
pub struct ChannelAllocator {
    opened: [bool; MAX_CHANNELS as usize],
}

impl ChannelAllocator {
    pub fn new() -> Self {
        Default::default()
    }

    /// Marks the lowest free logical channel as open and returns its number.
    pub fn allocate_next(&mut self) -> Result<u8> {
        let number = self.next_free().ok_or(Error::NoChannelAvailable)?;
        self.opened[number as usize] = true;

        Ok(number)
    }

    /// Marks the logical channel assigned by the card as open.
    /// A channel already open stays with its current holder.
    pub fn claim(&mut self, number: u8) -> Result<()> {
        match number {
            1..=19 if self.opened[number as usize] => Err(Error::ChannelInUse(number)),
            1..=19 => {
                self.opened[number as usize] = true;
                Ok(())
            }
            _ => Err(Error::InvalidChannel(number)),
        }
    }

    /// Frees the channel. Releasing a closed channel or the basic channel does nothing.
    pub fn release(&mut self, number: u8) {
        if number != BASIC_CHANNEL && number < MAX_CHANNELS {
            self.opened[number as usize] = false;
        }
    }

    /// Frees every logical channel.
    pub fn clear(&mut self) {
        self.opened = Default::default();
    }

    pub fn is_open(&self, number: u8) -> bool {
        match number {
            BASIC_CHANNEL => true,
            _ => self.opened.get(number as usize).copied().unwrap_or(false),
        }
    }

    pub fn has_free(&self) -> bool {
        self.next_free().is_some()
    }

    /// Lists the basic channel followed by the open logical channels, in ascending order.
    pub fn channels(&self) -> Vec<Channel> {
        (0..MAX_CHANNELS)
            .filter(|n| self.is_open(*n))
            .map(|n| Channel::new(n, ChannelState::Open))
            .collect()
    }

    fn next_free(&self) -> Option<u8> {
        (1..MAX_CHANNELS).find(|n| !self.opened[*n as usize])
    }
}
