//! PC/SC transport for the secure element engine.
//! Can be enabled by turning `pcsc` feature on.
//!
//! ## What is PC/SC?
//! PC/SC (Personal Computer/Smart Card) is an abstraction layer for communicating with Smart Cards
//! from Windows. Using this layer, applications can connect to any devices that supports PC/SC,
//! without depending on their driver implementation. Windows and macOS supports PC/SC by themselves,
//! Linux also supports by installing pcsc-lite shared library.
//!
//! Refer the documentation of pcsc-rust for details:
//! <https://github.com/bluetech/pcsc-rust>
//!
//! ## Usage
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use secure_element::pcsc::Context;
//! use secure_element::SecureElement;
//!
//! let ctx = Context::try_new().unwrap();
//! let device = ctx.open().unwrap();
//! let card = device.connect(&ctx).unwrap();
//!
//! let se = SecureElement::new(card);
//! se.init(Some(Arc::new(|connected: bool, reason: &str| {
//!     println!("connected={connected} ({reason})");
//! })))
//! .unwrap();
//! ```

use std::ffi::{CStr, CString};
use std::thread::sleep;
use std::time::Duration;

use pcsc::{Attribute, Card, Protocols, Scope, ShareMode, MAX_BUFFER_SIZE};

use crate::transport::{Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Error occurred while communicating with PC/SC: {0}")]
    PcscError(#[from] pcsc::Error),

    #[error("Reader not found on PC/SC service")]
    ReaderNotFound,
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

/// PC/SC context.
pub struct Context {
    ctx: pcsc::Context,
}

impl Context {
    /// Creates a PC/SC context in user scope.
    pub fn try_new() -> Result<Self> {
        Ok(Self {
            ctx: pcsc::Context::establish(Scope::User).map_err(Error::PcscError)?,
        })
    }

    /// Finds a PC/SC device, then opens a connection to them.
    pub fn open(&self) -> Result<Device> {
        let mut buf = [0u8; 2048];

        Ok(Device::new(
            self.ctx
                .list_readers(&mut buf)
                .map_err(Error::PcscError)?
                .next()
                .ok_or(Error::ReaderNotFound)?,
        ))
    }
}

/// PC/SC device handle.
pub struct Device {
    reader: CString,
}

impl Device {
    fn new(reader: &CStr) -> Self {
        debug!("Using device: {}", reader.to_str().unwrap_or_default());

        Self {
            reader: reader.to_owned(),
        }
    }

    /// Connects to the secure element behind the device after waiting them.
    pub fn connect(&self, ctx: &Context) -> Result<PcscCard> {
        let mut card = PcscCard {
            ctx: ctx.ctx.clone(),
            reader: self.reader.clone(),
            card: None,
        };

        card.wait()?;

        Ok(card)
    }
}

/// A secure element to be communicated through PC/SC.
pub struct PcscCard {
    ctx: pcsc::Context,
    reader: CString,
    card: Option<Card>,
}

impl PcscCard {
    /// Reads the Answer To Reset of the connected card.
    pub fn atr(&self) -> Result<Vec<u8>> {
        match &self.card {
            Some(card) => Ok(card.get_attribute_owned(Attribute::AtrString)?),
            None => Err(Error::PcscError(pcsc::Error::NoSmartcard)),
        }
    }

    fn wait(&mut self) -> Result<()> {
        // Waits for the card, polling for each seconds.
        debug!("Waiting for a card");

        loop {
            match self
                .ctx
                .connect(&self.reader, ShareMode::Shared, Protocols::ANY)
            {
                Ok(card) => {
                    debug!("Connected to your card");
                    self.card = Some(card);

                    return Ok(());
                }
                Err(pcsc::Error::NoSmartcard) => {
                    info!("Still waiting for your card...");
                    sleep(Duration::from_secs(1));
                }
                Err(e) => return Err(Error::PcscError(e)),
            }
        }
    }
}

impl Transport for PcscCard {
    fn connect(&mut self) -> std::result::Result<(), TransportError> {
        match self.card {
            Some(_) => Ok(()),
            None => Ok(self.wait()?),
        }
    }

    fn is_connected(&self) -> bool {
        self.card.is_some()
    }

    /// Transmits an APDU command to the card, then receives a response from them.
    fn send_receive(&mut self, tx: &[u8]) -> std::result::Result<Vec<u8>, TransportError> {
        let card = self.card.as_ref().ok_or(TransportError::NotConnected)?;

        let mut rx = [0u8; MAX_BUFFER_SIZE];
        match card.transmit(tx, &mut rx) {
            Ok(rx) => Ok(Vec::from(rx)),
            Err(e @ (pcsc::Error::RemovedCard | pcsc::Error::ResetCard)) => {
                self.card = None;

                Err(Error::PcscError(e).into())
            }
            Err(e) => Err(Error::PcscError(e).into()),
        }
    }
}
