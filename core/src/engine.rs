//! The secure element engine: channel management and APDU exchange over a [`Transport`].

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::apdu::{
    self, check_acknowledgement, check_select, cla_for_channel, Command, Outcome, StatusWord,
};
use crate::channel::{Channel, ChannelAllocator};
use crate::error::{Error, Result};
use crate::transport::Transport;

const REASON_INIT: &str = "init";
const REASON_RESET: &str = "reset";

/// Receives notifications when the secure element goes up or down.
pub trait StateChangeCallback: Send + Sync {
    fn on_state_change(&self, connected: bool, reason: &str);
}

impl<F> StateChangeCallback for F
where
    F: Fn(bool, &str) + Send + Sync,
{
    fn on_state_change(&self, connected: bool, reason: &str) {
        self(connected, reason)
    }
}

/// Result of opening a logical channel.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct LogicalChannelResponse {
    /// Number of the channel assigned by the secure element, 1 to 19.
    pub channel_number: u8,

    /// Response to the SELECT command, status word included.
    pub select_response: Vec<u8>,
}

/// The transport together with the channels opened through it.
/// Held under a single lock so that one operation sees a consistent view of both.
struct Link<T> {
    transport: T,
    channels: ChannelAllocator,
}

impl<T> Link<T>
where
    T: Transport,
{
    fn ensure_connected(&mut self) -> Result<()> {
        if !self.transport.is_connected() {
            info!("Transport is not connected, connecting");
            self.transport.connect().map_err(|e| {
                error!("Could not connect to the secure element: {}", e);
                Error::Connect(e)
            })?;
        }

        Ok(())
    }

    fn exchange(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        debug!("TX: {}", hex::encode(command));

        let response = self.transport.send_receive(command)?;

        debug!("RX: {}", hex::encode(&response));

        Ok(response)
    }

    /// Closes a channel the secure element opened but the caller will never get.
    /// Failures are only logged; the caller gets the error that caused the abandon.
    fn abandon(&mut self, channel: u8) {
        let result = Command::manage_channel_close(channel)
            .and_then(|command| self.exchange(&command.into_bytes()));

        if let Err(_e) = result {
            warn!("Could not close abandoned channel {}: {}", channel, _e);
        }
    }
}

/// Mediates access to a secure element.
///
/// All operations take `&self` and may be called from several threads at once: channel
/// bookkeeping and the transport are guarded by a lock held for a whole operation, so two
/// concurrent callers never end up with the same channel.
pub struct SecureElement<T> {
    link: Mutex<Link<T>>,
    callback: RwLock<Option<Arc<dyn StateChangeCallback>>>,
}

impl<T> SecureElement<T>
where
    T: Transport,
{
    /// Creates an engine communicating through the transport.
    /// The engine refuses to operate until [`SecureElement::init`] is called.
    pub fn new(transport: T) -> Self {
        Self {
            link: Mutex::new(Link {
                transport,
                channels: ChannelAllocator::new(),
            }),
            callback: RwLock::new(None),
        }
    }

    /// Registers the callback, replacing any previous one, then notifies it the secure element is
    /// up.
    pub fn init(&self, callback: Option<Arc<dyn StateChangeCallback>>) -> Result<()> {
        info!("init");

        let callback = callback.ok_or(Error::NullCallback)?;
        *self
            .callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&callback));

        callback.on_state_change(true, REASON_INIT);

        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.callback().is_ok()
    }

    /// Gets the Answer To Reset of the secure element.
    /// Retrieving the ATR is left to the transport layer, so this is always empty.
    pub fn get_atr(&self) -> Result<Vec<u8>> {
        info!("getAtr");
        self.callback()?;

        Ok(Vec::new())
    }

    /// Determines whether the secure element is present, which it always is once initialized.
    pub fn is_card_present(&self) -> Result<bool> {
        info!("isCardPresent");
        self.callback()?;

        Ok(true)
    }

    /// Forgets every logical channel, then notifies the callback the secure element went down and
    /// came back.
    pub fn reset(&self) -> Result<()> {
        info!("reset");
        let callback = self.callback()?;

        self.lock().channels.clear();

        callback.on_state_change(false, REASON_RESET);
        callback.on_state_change(true, REASON_RESET);

        Ok(())
    }

    /// Transmits the command as-is and returns the raw response.
    /// Status words are not interpreted here.
    pub fn transmit(&self, command: &[u8]) -> Result<Vec<u8>> {
        info!("transmit ({} octets)", command.len());
        self.callback()?;

        self.lock().exchange(command)
    }

    /// Selects the application on the basic channel, returning the SELECT response.
    pub fn open_basic_channel(&self, aid: &[u8], p2: u8) -> Result<Vec<u8>> {
        info!("openBasicChannel p2={:#04x}", p2);
        self.callback()?;

        let select = Command::select_by_name(apdu::CLA_DEFAULT, p2, aid)?;

        let mut link = self.lock();
        link.ensure_connected()?;

        let response = link.exchange(&select.into_bytes())?;
        log_outcome(check_select(&response)?);

        Ok(response)
    }

    /// Asks the secure element for a logical channel, then selects the application on it.
    ///
    /// The channel is recorded as open only once SELECT succeeded. If SELECT fails, the channel
    /// the secure element assigned is closed again before the error is returned.
    pub fn open_logical_channel(&self, aid: &[u8], p2: u8) -> Result<LogicalChannelResponse> {
        info!("openLogicalChannel p2={:#04x}", p2);
        self.callback()?;

        // Rejects an oversized AID before a channel is opened for it.
        Command::select_by_name(apdu::CLA_DEFAULT, p2, aid)?;

        let mut link = self.lock();
        if !link.channels.has_free() {
            warn!("Every logical channel is in use");
            return Err(Error::NoChannelAvailable);
        }

        link.ensure_connected()?;

        debug!("Sending MANAGE CHANNEL");
        let response = link.exchange(&Command::manage_channel_open().into_bytes())?;
        check_acknowledgement(&response)?;

        let channel_number = response[0];
        let cla = cla_for_channel(channel_number).map_err(|e| {
            error!("Invalid channel {}", channel_number);
            e
        })?;

        // The first holder keeps the channel, so nothing is sent on it.
        if link.channels.is_open(channel_number) {
            error!("Channel {} is already open", channel_number);
            return Err(Error::ChannelInUse(channel_number));
        }

        debug!("Sending SELECT on channel {}", channel_number);
        let result = Command::select_by_name(cla, p2, aid)
            .and_then(|select| link.exchange(&select.into_bytes()))
            .and_then(|response| check_select(&response).map(|outcome| (outcome, response)));

        match result {
            Ok((outcome, select_response)) => {
                log_outcome(outcome);
                link.channels.claim(channel_number)?;

                Ok(LogicalChannelResponse {
                    channel_number,
                    select_response,
                })
            }
            Err(e) => {
                link.abandon(channel_number);

                Err(e)
            }
        }
    }

    /// Closes the logical channel on the secure element and frees its number.
    /// The basic channel cannot be closed and is rejected like any number outside 1 to 19.
    pub fn close_channel(&self, channel_number: u8) -> Result<()> {
        info!("closeChannel {}", channel_number);
        self.callback()?;

        let command = Command::manage_channel_close(channel_number)?;

        let mut link = self.lock();
        let response = link.exchange(&command.into_bytes())?;

        if !response.starts_with(&[0x90, 0x00]) {
            error!("Closing channel {} failed", channel_number);

            return Err(match StatusWord::from_response(&response) {
                Some(sw) => Error::Rejected(sw),
                None => Error::MalformedResponse(response.len()),
            });
        }

        link.channels.release(channel_number);

        Ok(())
    }

    /// Lists the basic channel and the logical channels currently open.
    pub fn open_channels(&self) -> Vec<Channel> {
        self.lock().channels.channels()
    }

    fn callback(&self) -> Result<Arc<dyn StateChangeCallback>> {
        self.callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::NotInitialized)
    }

    fn lock(&self) -> MutexGuard<'_, Link<T>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> fmt::Debug for SecureElement<T>
where
    T: Transport,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureElement")
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

fn log_outcome(outcome: Outcome) {
    if outcome == Outcome::Warning {
        info!("SELECT completed with a warning");
    }
}
