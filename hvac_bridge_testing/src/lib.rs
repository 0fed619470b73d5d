//! Test support for `hvac_bridge`.
//!
//! [`FakeGateway`] stands in for the TCP serial gateway and the unit behind
//! it, [`StatusBuilder`] renders status payloads and [`logger`] captures log
//! output.
//!
//! ```rust,no_run
//! use hvac_bridge::{BridgeConfig, HvacBridge};
//! use hvac_bridge_testing::FakeGateway;
//!
//! # async fn example() -> std::io::Result<()> {
//! let gateway = FakeGateway::start().await?;
//! let bridge = HvacBridge::new(BridgeConfig::new("127.0.0.1", gateway.port()));
//! # Ok(())
//! # }
//! ```

pub mod gateway;
pub mod logging;
pub mod status;

pub use gateway::{Behaviour, FakeGateway};
pub use logging::{LoggerHandle, logger};
pub use status::StatusBuilder;
