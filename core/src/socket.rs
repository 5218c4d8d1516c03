//! Socket transport, talking to a secure element (usually a simulator) over TCP.
//!
//! Each command is written as-is and the next chunk read from the stream is taken as the whole
//! response, the way secure element simulators frame their replies.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::transport::{Transport, TransportError};

const DEFAULT_ADDRESS: &str = "127.0.0.1:8080";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_RESPONSE_SIZE: usize = 2500;

/// Settings of a [`SocketTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SocketConfig {
    /// `host:port` of the secure element.
    pub address: String,
    pub connect_timeout: Duration,
    /// `None` blocks until the secure element answers.
    pub read_timeout: Option<Duration>,
    pub max_response_size: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
        }
    }
}

/// A transport over a TCP connection.
#[derive(Debug)]
pub struct SocketTransport {
    config: SocketConfig,
    stream: Option<TcpStream>,
}

impl SocketTransport {
    /// Creates a disconnected transport; the connection is opened by [`Transport::connect`].
    pub fn new(config: SocketConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    /// Drops the connection, if any.
    pub fn disconnect(&mut self) {
        self.stream = None;
    }

    fn open_stream(&self) -> Result<TcpStream, TransportError> {
        let mut last_error = None;

        for address in self.config.address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&address, self.config.connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(self.config.read_timeout)?;
                    stream.set_nodelay(true)?;

                    return Ok(stream);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(match last_error {
            Some(e) => e.into(),
            None => TransportError::other(format!(
                "No address resolved for {}",
                self.config.address
            )),
        })
    }
}

impl Default for SocketTransport {
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl Transport for SocketTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Ok(());
        }

        info!("Connecting to the secure element at {}", self.config.address);
        self.stream = Some(self.open_stream()?);

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn send_receive(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let mut buf = vec![0u8; self.config.max_response_size];

        let result = stream
            .write_all(command)
            .and_then(|_| stream.read(&mut buf));

        match result {
            Ok(0) => {
                warn!("The secure element closed the connection");
                self.disconnect();

                Err(TransportError::Disconnected)
            }
            Ok(len) => {
                debug!("Received {} octet(s)", len);
                buf.truncate(len);

                Ok(buf)
            }
            Err(e) => {
                self.disconnect();

                Err(e.into())
            }
        }
    }
}
