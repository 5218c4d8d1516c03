//! A crate to mediate access to a secure element: open and close channels, select applications
//! and exchange APDUs through a pluggable transport.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use secure_element::{SecureElement, Simulator};
//!
//! let aid = vec![0xA0, 0x00, 0x00, 0x00, 0x03, 0x10, 0x10];
//! let se = SecureElement::new(Simulator::with_applets([aid.clone()]));
//! se.init(Some(Arc::new(|_: bool, _: &str| {}))).unwrap();
//!
//! let channel = se.open_logical_channel(&aid, 0x00).unwrap();
//! assert_eq!(1, channel.channel_number);
//!
//! se.close_channel(channel.channel_number).unwrap();
//! ```

#[macro_use]
mod log;

#[cfg(feature = "pcsc")]
pub mod pcsc;

pub mod apdu;
pub mod channel;
pub mod engine;
pub mod error;
pub mod simulator;
pub mod socket;
pub mod transport;

pub use engine::{LogicalChannelResponse, SecureElement, StateChangeCallback};
pub use error::{Error, ErrorKind, Result};
pub use simulator::Simulator;
pub use socket::{SocketConfig, SocketTransport};
pub use transport::{Transport, TransportError};
