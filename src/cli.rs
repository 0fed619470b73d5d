//! Command line interface for the `hvac-bridge` binary.
//!
//! Kept free of library types so the build script can include it to render
//! the man page.

use clap::{Parser, Subcommand, ValueEnum};

/// Command line arguments for the `hvac-bridge` binary.
#[derive(Debug, Parser)]
#[command(
    name = "hvac-bridge",
    version,
    about = "Query and control an air conditioner behind a TCP serial gateway"
)]
pub struct Cli {
    /// Gateway host name or address.
    #[arg(long, global = true, default_value = "127.0.0.1")]
    pub host: String,
    /// Gateway TCP port.
    #[arg(short, long, global = true, default_value_t = 8899)]
    pub port: u16,
    /// Status layout spoken by the unit.
    #[arg(long, global = true, value_enum, default_value_t = Revision::Classic)]
    pub revision: Revision,
    /// Response and status timeout in milliseconds.
    #[arg(long, global = true, default_value_t = 5000)]
    pub timeout_ms: u64,
    /// Print and accept enum values as numeric codes.
    #[arg(long, global = true)]
    pub numeric_enums: bool,
    #[command(subcommand)]
    pub command: Command,
}

/// Protocol revision selectable on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Revision {
    Classic,
    Extended,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll the unit once and print every datapoint as JSON.
    Status,
    /// Print one datapoint.
    Get {
        /// Datapoint name, e.g. `targetTemperature`.
        datapoint: String,
        /// Wait for a new status snapshot instead of using cached data.
        #[arg(long)]
        fresh: bool,
    },
    /// Write one datapoint and report whether the unit confirmed it.
    Set {
        /// Datapoint name, e.g. `mode`.
        datapoint: String,
        /// New value: `on`/`off`, a number or an enum name.
        value: String,
    },
    /// Print status updates until interrupted.
    Watch,
    /// Send a raw command frame and print the response.
    Raw {
        /// Command byte in hex, e.g. `41`.
        #[arg(value_parser = parse_byte)]
        command: u8,
        /// Payload bytes in hex, e.g. `0102ff`.
        #[arg(value_parser = parse_hex)]
        payload: Option<HexBytes>,
        /// Return once written instead of waiting for a response.
        #[arg(long)]
        no_response: bool,
    },
}

/// Byte string parsed from hex.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HexBytes(pub Vec<u8>);

fn parse_byte(input: &str) -> Result<u8, String> {
    let digits = input.trim_start_matches("0x");
    u8::from_str_radix(digits, 16).map_err(|error| format!("invalid hex byte {input:?}: {error}"))
}

fn parse_hex(input: &str) -> Result<HexBytes, String> {
    let digits: Vec<char> = input
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in {input:?}"));
    }
    digits
        .chunks(2)
        .map(|pair| parse_byte(&pair.iter().collect::<String>()))
        .collect::<Result<Vec<u8>, String>>()
        .map(HexBytes)
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use rstest::rstest;

    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "hvac-bridge",
            "set",
            "mode",
            "cool",
            "--host",
            "10.1.1.9",
            "--revision",
            "extended",
        ]);
        assert_eq!(cli.host, "10.1.1.9");
        assert_eq!(cli.revision, Revision::Extended);
        assert!(matches!(
            cli.command,
            Command::Set { ref datapoint, ref value } if datapoint == "mode" && value == "cool"
        ));
    }

    #[test]
    fn raw_command_takes_hex() {
        let cli = Cli::parse_from(["hvac-bridge", "raw", "0x41", "01:ff"]);
        let Command::Raw {
            command, payload, ..
        } = cli.command
        else {
            panic!("expected raw command");
        };
        assert_eq!(command, 0x41);
        assert_eq!(payload, Some(HexBytes(vec![0x01, 0xFF])));
    }

    #[rstest]
    #[case("abc")]
    #[case("zz")]
    fn bad_hex_is_rejected(#[case] input: &str) {
        assert!(parse_hex(input).is_err());
    }
}
