use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use secure_element::{StateChangeCallback, Transport, TransportError};

/// What the scripted transport went through, shared with the test after the transport moved into
/// the engine.
#[derive(Debug, Default)]
pub struct Log {
    pub sent: Vec<Vec<u8>>,
    pub connects: usize,
}

/// A transport replying with canned responses, in order.
#[derive(Debug)]
pub struct ScriptedTransport {
    responses: VecDeque<Result<Vec<u8>, ()>>,
    connected: bool,
    refuse_connect: bool,
    log: Arc<Mutex<Log>>,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn new<I>(responses: I) -> (Self, Arc<Mutex<Log>>)
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self::with_results(responses.into_iter().map(Ok))
    }

    pub fn with_results<I>(responses: I) -> (Self, Arc<Mutex<Log>>)
    where
        I: IntoIterator<Item = Result<Vec<u8>, ()>>,
    {
        let log = Arc::new(Mutex::new(Log::default()));
        let transport = Self {
            responses: responses.into_iter().collect(),
            connected: true,
            refuse_connect: false,
            log: Arc::clone(&log),
        };

        (transport, log)
    }

    /// A transport failing every exchange.
    pub fn broken() -> (Self, Arc<Mutex<Log>>) {
        Self::with_results([])
    }

    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    pub fn refusing_connect(mut self) -> Self {
        self.connected = false;
        self.refuse_connect = true;
        self
    }
}

impl Transport for ScriptedTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.log.lock().unwrap().connects += 1;

        match self.refuse_connect {
            true => Err(TransportError::other("connection refused")),
            _ => {
                self.connected = true;
                Ok(())
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send_receive(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.log.lock().unwrap().sent.push(command.to_vec());

        match self.responses.pop_front() {
            Some(Ok(response)) => Ok(response),
            _ => Err(TransportError::other("link failure")),
        }
    }
}

/// Records every state change notification.
#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Mutex<Vec<(bool, String)>>,
}

impl StateChangeCallback for Recorder {
    fn on_state_change(&self, connected: bool, reason: &str) {
        self.events
            .lock()
            .unwrap()
            .push((connected, reason.to_string()));
    }
}

#[allow(dead_code)]
pub fn bytes(s: &str) -> Vec<u8> {
    hex::decode(s.replace(' ', "")).unwrap()
}
