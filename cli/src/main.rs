mod args;
mod shell;
mod transport;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use secure_element::{SecureElement, Transport};

use crate::args::{parse_byte, Hex};
use crate::transport::Kind;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("The secure element returned an error: {0}")]
    SecureElement(#[from] secure_element::Error),

    #[error("Error occurred on the transport: {0}")]
    Transport(#[from] secure_element::TransportError),

    #[error("Could not serialise the output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not read the input: {0}")]
    Io(#[from] std::io::Error),
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

#[derive(Parser)]
#[command(version, about = "Open channels, select applets and exchange APDUs with a secure element")]
pub(crate) struct Cli {
    /// Link to the secure element
    #[arg(short, long, value_enum, default_value_t = Kind::Simulator)]
    transport: Kind,

    /// Address of the secure element, for the socket transport
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    address: String,

    /// Seconds to wait for a response, for the socket transport
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// AID of an applet installed on the simulator, in hex (repeatable)
    #[arg(long = "applet")]
    applets: Vec<Hex>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Debug level output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the Answer To Reset
    Atr,

    /// Tell whether the secure element is present
    Present,

    /// Reset the secure element
    Reset,

    /// Transmit a raw APDU and print the response
    Transmit {
        /// Command APDU in hex
        apdu: Hex,
    },

    /// Select an applet on the basic channel
    Select {
        /// AID in hex
        aid: Hex,

        /// P2 of the SELECT command (decimal or 0x-prefixed hex)
        #[arg(long, default_value = "0", value_parser = parse_byte)]
        p2: u8,
    },

    /// Open a logical channel and select an applet on it
    Open {
        /// AID in hex
        aid: Hex,

        /// P2 of the SELECT command (decimal or 0x-prefixed hex)
        #[arg(long, default_value = "0", value_parser = parse_byte)]
        p2: u8,

        /// Leave the channel open on exit
        #[arg(long)]
        keep: bool,
    },

    /// Close a logical channel
    Close {
        /// Channel number, 1 to 19
        channel: u8,
    },

    /// Run commands interactively, keeping channels open between them
    Shell,
}

#[derive(Serialize)]
struct Opened {
    channel_number: u8,
    select_response: String,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = match verbose {
        true => EnvFilter::new("debug"),
        _ => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let se = SecureElement::new(transport::open(&cli)?);
    se.init(Some(Arc::new(|connected: bool, reason: &str| {
        tracing::info!(connected, reason, "State changed");
    })))?;

    let json = cli.json;

    match cli.command {
        Commands::Atr => print(json, "atr", &hex::encode(se.get_atr()?)),
        Commands::Present => print(json, "present", &se.is_card_present()?),
        Commands::Reset => {
            se.reset()?;
            print(json, "reset", &true)
        }
        Commands::Transmit { apdu } => print(json, "response", &hex::encode(se.transmit(&apdu)?)),
        Commands::Select { aid, p2 } => print(
            json,
            "response",
            &hex::encode(se.open_basic_channel(&aid, p2)?),
        ),
        Commands::Open { aid, p2, keep } => {
            let response = se.open_logical_channel(&aid, p2)?;
            let opened = Opened {
                channel_number: response.channel_number,
                select_response: hex::encode(&response.select_response),
            };

            print(json, "channel", &opened)?;

            match keep {
                true => Ok(()),
                _ => Ok(se.close_channel(response.channel_number)?),
            }
        }
        Commands::Close { channel } => {
            se.close_channel(channel)?;
            print(json, "closed", &channel)
        }
        Commands::Shell => shell::run(&se, json),
    }
}

/// Prints the value, as a one-field JSON object if asked to.
pub(crate) fn print<T>(json: bool, key: &str, value: &T) -> Result<()>
where
    T: Serialize,
{
    let value = serde_json::to_value(value)?;

    match json {
        true => {
            let mut object = serde_json::Map::new();
            object.insert(key.to_string(), value);

            println!("{}", serde_json::Value::Object(object));
        }
        _ => match value {
            serde_json::Value::String(s) => println!("{s}"),
            v => println!("{v}"),
        },
    }

    Ok(())
}

pub(crate) type Engine = SecureElement<Box<dyn Transport>>;
