//! The contract of the link carrying APDUs to the secure element.
//!
//! A transport knows nothing about channels or status words: it opens the link, tells whether the
//! link is up, and exchanges raw octets. Implementations are expected to serialise access to the
//! physical link themselves; the engine never issues overlapping exchanges on one transport.

/// Errors reported by a [`Transport`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("The transport is not connected")]
    NotConnected,

    #[error("The secure element closed the connection")]
    Disconnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "pcsc")]
    #[error("Error occurred while communicating with PC/SC: {0}")]
    Pcsc(#[from] crate::pcsc::Error),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// A link to the secure element, supplied by the host environment.
pub trait Transport: Send {
    /// Opens the link. Connecting an already connected transport is allowed.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Determines whether the link is up.
    fn is_connected(&self) -> bool;

    /// Transmits the command octets, then receives the response octets.
    fn send_receive(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError>;
}

impl<T> Transport for Box<T>
where
    T: Transport + ?Sized,
{
    fn connect(&mut self) -> Result<(), TransportError> {
        (**self).connect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn send_receive(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).send_receive(command)
    }
}
