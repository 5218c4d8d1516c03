use std::time::Duration;

use clap::ValueEnum;
use secure_element::{Simulator, SocketConfig, SocketTransport, Transport, TransportError};

use crate::{Cli, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Kind {
    /// In-process secure element
    Simulator,

    /// Secure element listening on a TCP socket
    Socket,

    /// First PC/SC reader, waiting for a card (requires the pcsc feature)
    Pcsc,
}

/// Opens the transport chosen on the command line.
pub(crate) fn open(cli: &Cli) -> Result<Box<dyn Transport>> {
    let mut transport: Box<dyn Transport> = match cli.transport {
        Kind::Simulator => Box::new(Simulator::with_applets(
            cli.applets.iter().cloned().map(Vec::<u8>::from),
        )),
        Kind::Socket => Box::new(SocketTransport::new(SocketConfig {
            address: cli.address.clone(),
            read_timeout: Some(Duration::from_secs(cli.timeout)),
            ..Default::default()
        })),
        Kind::Pcsc => open_pcsc()?,
    };

    transport.connect()?;

    Ok(transport)
}

#[cfg(feature = "pcsc")]
fn open_pcsc() -> Result<Box<dyn Transport>> {
    use secure_element::pcsc::Context;

    let open = || -> std::result::Result<_, secure_element::pcsc::Error> {
        let ctx = Context::try_new()?;
        let device = ctx.open()?;

        device.connect(&ctx)
    };

    Ok(Box::new(open().map_err(TransportError::from)?))
}

#[cfg(not(feature = "pcsc"))]
fn open_pcsc() -> Result<Box<dyn Transport>> {
    Err(TransportError::other("Built without PC/SC support, rebuild with the pcsc feature").into())
}
