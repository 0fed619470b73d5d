//! `hvac-bridge` command line tool.
//!
//! Connects to the gateway, runs one subcommand and prints the result as
//! JSON.

mod cli;

use std::{error::Error, process::ExitCode, time::Duration};

use clap::Parser;
use cli::{Cli, Command, HexBytes, Revision};
use hvac_bridge::{
    BridgeConfig,
    BridgeEvent,
    DatapointId,
    EnumRepresentation,
    HvacBridge,
    ProtocolRevision,
    QueryOptions,
    RawCommand,
    SetOptions,
    Value,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("hvac-bridge: {error}");
            ExitCode::FAILURE
        }
    }
}

fn config_from(cli: &Cli) -> BridgeConfig {
    let timeout = Duration::from_millis(cli.timeout_ms);
    let revision = match cli.revision {
        Revision::Classic => ProtocolRevision::Classic,
        Revision::Extended => ProtocolRevision::Extended,
    };
    let representation = if cli.numeric_enums {
        EnumRepresentation::numeric()
    } else {
        EnumRepresentation::default()
    };
    BridgeConfig::new(cli.host.clone(), cli.port)
        .revision(revision)
        .representation(representation)
        .request_timeout(timeout)
        .status_timeout(timeout)
        .auto_reconnect(matches!(cli.command, Command::Watch))
}

/// Interpret a command line value the way JSON would.
fn parse_value(input: &str) -> Value {
    match input.trim() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        text => text
            .parse::<f64>()
            .map_or_else(|_| Value::from(text), Value::Number),
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let timeout = Duration::from_millis(cli.timeout_ms);
    let bridge = HvacBridge::new(config_from(&cli));
    bridge.connect().await?;
    let outcome = execute(&bridge, cli.command, timeout).await;
    bridge.disconnect().await;
    outcome
}

async fn execute(bridge: &HvacBridge, command: Command, timeout: Duration) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Status => {
            bridge.request_status(bridge.snapshot().version, timeout).await?;
            println!("{}", serde_json::to_string_pretty(&bridge.snapshot())?);
        }
        Command::Get { datapoint, fresh } => {
            let datapoint: DatapointId = datapoint.parse()?;
            let options = QueryOptions {
                require_fresh: fresh,
                timeout: Some(timeout),
            };
            let value = bridge.query(datapoint, options).await?;
            println!("{}", serde_json::to_string(&value)?);
        }
        Command::Set { datapoint, value } => {
            let datapoint: DatapointId = datapoint.parse()?;
            let options = SetOptions {
                refresh: true,
                timeout: Some(timeout),
            };
            let outcome = bridge.set(datapoint, parse_value(&value), options).await?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
        Command::Watch => watch(bridge).await?,
        Command::Raw {
            command,
            payload,
            no_response,
        } => {
            let HexBytes(payload) = payload.unwrap_or(HexBytes(Vec::new()));
            let mut raw = RawCommand::new(command, payload);
            if no_response {
                raw = raw.fire_and_forget();
            }
            if let Some(frame) = bridge.send_command(raw).await? {
                let payload: String = frame.payload.iter().map(|b| format!("{b:02x}")).collect();
                println!(
                    "{}",
                    serde_json::json!({
                        "sequence": frame.sequence,
                        "command": format!("{:02x}", frame.command),
                        "payload": payload,
                    })
                );
            }
        }
    }
    Ok(())
}

async fn watch(bridge: &HvacBridge) -> Result<(), Box<dyn Error>> {
    let mut events = bridge.subscribe();
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(BridgeEvent::StatusData { values, version, .. }) => {
                    println!("{}", serde_json::json!({ "version": version, "values": values }));
                }
                Ok(BridgeEvent::Disconnected) => tracing::warn!("gateway connection lost"),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}
