//! APDU construction, class byte encoding and status word interpretation.

mod command;
pub(crate) mod ins;
mod status;

pub use command::{channel_from_cla, cla_for_channel, Command};
pub use status::{Outcome, StatusWord};

pub(crate) use status::{check_acknowledgement, check_select};

/// CLA of the basic channel.
pub const CLA_DEFAULT: u8 = 0x00;

/// Number of channel slots, basic channel included.
pub const MAX_CHANNELS: u8 = 20;
