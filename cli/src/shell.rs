//! Interactive shell, so that logical channels survive between commands.

use dialoguer::Input;

use crate::args::{parse_byte, Hex};
use crate::{print, Engine, Result};

const HELP: &str = "\
open <aid> [p2]     open a logical channel and select the applet
select <aid> [p2]   select the applet on the basic channel
close <channel>     close a logical channel
tx <apdu>           transmit a raw APDU
reset               reset the secure element
atr                 print the Answer To Reset
channels            list the open channels
quit                leave the shell";

enum Line {
    Open(Hex, u8),
    Select(Hex, u8),
    Close(u8),
    Transmit(Hex),
    Reset,
    Atr,
    Channels,
    Help,
    Quit,
    Empty,
}

impl std::str::FromStr for Line {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let words = s.split_whitespace().collect::<Vec<_>>();
        let hex = |s: &str| s.parse::<Hex>().map_err(|e| format!("invalid hex '{s}': {e}"));
        let byte = |s: Option<&&str>| match s {
            Some(s) => parse_byte(s).map_err(|e| format!("invalid octet '{s}': {e}")),
            None => Ok(0),
        };

        Ok(match words.as_slice() {
            [] => Self::Empty,
            ["open", aid, rest @ ..] => Self::Open(hex(*aid)?, byte(rest.first())?),
            ["select", aid, rest @ ..] => Self::Select(hex(*aid)?, byte(rest.first())?),
            ["close", n] => Self::Close(byte(Some(n))?),
            ["tx", apdu @ ..] if !apdu.is_empty() => Self::Transmit(hex(apdu.concat().as_str())?),
            ["reset"] => Self::Reset,
            ["atr"] => Self::Atr,
            ["channels"] => Self::Channels,
            ["help"] | ["?"] => Self::Help,
            ["quit"] | ["exit"] => Self::Quit,
            _ => return Err(format!("unknown command '{s}', try 'help'")),
        })
    }
}

/// Reads commands until `quit` or the end of the input.
pub(crate) fn run(se: &Engine, json: bool) -> Result<()> {
    loop {
        let input = Input::<String>::new()
            .with_prompt("se")
            .allow_empty(true)
            .interact_text()?;

        let line = match input.parse::<Line>() {
            Ok(line) => line,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        match execute(se, json, line) {
            Ok(true) => continue,
            Ok(false) => return Ok(()),
            Err(e) => eprintln!("Error: {e}"),
        }
    }
}

/// Runs one command, returning whether to keep reading.
fn execute(se: &Engine, json: bool, line: Line) -> Result<bool> {
    match line {
        Line::Open(aid, p2) => {
            let response = se.open_logical_channel(&aid, p2)?;
            print(json, "channel", &response.channel_number)?;
            print(json, "response", &hex::encode(response.select_response))?;
        }
        Line::Select(aid, p2) => {
            print(json, "response", &hex::encode(se.open_basic_channel(&aid, p2)?))?
        }
        Line::Close(n) => se.close_channel(n)?,
        Line::Transmit(apdu) => print(json, "response", &hex::encode(se.transmit(&apdu)?))?,
        Line::Reset => se.reset()?,
        Line::Atr => print(json, "atr", &hex::encode(se.get_atr()?))?,
        Line::Channels => print(json, "channels", &se.open_channels())?,
        Line::Help => println!("{HELP}"),
        Line::Quit => return Ok(false),
        Line::Empty => {}
    }

    Ok(true)
}
