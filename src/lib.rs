#![doc(html_root_url = "https://docs.rs/hvac_bridge/latest")]
//! Public API for the `hvac_bridge` library.
//!
//! This crate talks to an air conditioning unit through a TCP serial
//! gateway: it frames commands, keeps the connection alive, correlates
//! responses by sequence number and caches decoded status snapshots.

pub mod bridge;
pub mod cache;
pub mod codec;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod datapoint;
pub mod error;
pub mod event;
pub mod frame;
pub mod metrics;
pub mod sequence;
pub mod status;
pub mod value;

pub use bridge::{
    Confirmation,
    HvacBridge,
    QueryOptions,
    RawCommand,
    SetOptions,
    SetOutcome,
    Snapshot,
};
pub use codec::{ChecksumScheme, FrameError, HvacFrameCodec};
pub use config::BridgeConfig;
pub use connection::{ConnectionState, Connector, SocketOptions, TcpConnector};
pub use datapoint::{DatapointId, DatapointValue};
pub use error::{BridgeError, Result};
pub use event::BridgeEvent;
pub use frame::DecodedFrame;
pub use status::{ProtocolRevision, StatusValues};
pub use value::{EnumRepresentation, FanSpeed, Mode, SwingMode, Value, ValueError};
