use crate::apdu::StatusWord;
use crate::transport::TransportError;

/// Errors returned by the secure element engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("The state change callback must not be null")]
    NullCallback,

    #[error("The secure element is not initialized; call init first")]
    NotInitialized,

    #[error("Error occurred while communicating with the secure element: {0}")]
    Transport(#[from] TransportError),

    #[error("Could not connect to the secure element: {0}")]
    Connect(#[source] TransportError),

    #[error("MANAGE CHANNEL was not acknowledged ({0})")]
    ManageChannelRejected(Acknowledgement),

    #[error("Invalid channel number: {0}")]
    InvalidChannel(u8),

    #[error("The secure element assigned channel {0}, which is already open")]
    ChannelInUse(u8),

    #[error("The secure element reported a hardware error ({0})")]
    Hardware(StatusWord),

    #[error("The secure element rejected the command ({0}: {desc})", desc = .0.description())]
    Rejected(StatusWord),

    #[error("Malformed response of {0} octet(s) without a status word")]
    MalformedResponse(usize),

    #[error("AID of {0} octets does not fit into a single command")]
    AidTooLong(usize),

    #[error("No logical channel is available")]
    NoChannelAvailable,
}

/// What the card answered to MANAGE CHANNEL instead of `90 00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    Status(StatusWord),
    Truncated(usize),
}

impl std::fmt::Display for Acknowledgement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status(sw) => write!(f, "status {sw}"),
            Self::Truncated(len) => write!(f, "{len} octet(s) received"),
        }
    }
}

/// Coarse classification of [`Error`], as seen by callers of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ErrorKind {
    NullCallback,
    NotInitialized,
    IoError,
    Failed,
    NoChannelAvailable,
}

impl Error {
    /// Collapses the error into the kind reported to callers.
    pub fn kind(&self) -> ErrorKind {
        use ErrorKind::*;

        match self {
            Self::NullCallback => NullCallback,
            Self::NotInitialized => NotInitialized,
            Self::Transport(_)
            | Self::Connect(_)
            | Self::ManageChannelRejected(_)
            | Self::InvalidChannel(_)
            | Self::ChannelInUse(_)
            | Self::Hardware(_) => IoError,
            Self::Rejected(_) | Self::MalformedResponse(_) | Self::AidTooLong(_) => Failed,
            Self::NoChannelAvailable => NoChannelAvailable,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
