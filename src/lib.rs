#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # Z-Wave boiler adaptor
//!
//! Adaptor between a Z-Wave boiler relay and the apps of a home-automation bridge.
//!
//! The bridge runs one adaptor process per device. On one side sits a comms service
//! that speaks Z-Wave command classes to the relay; on the other, apps that consume
//! named characteristics. The adaptor keeps the relay's last known state and
//! translates between the two:
//!
//! - **Thermostat mode (class 64)**: `mode` reports become `binary_sensor` pushes,
//!   and app `on`/`off` commands become `Set` requests.
//! - **Node status (class 0)**: `isFailed` reports drive the `connected` characteristic.
//! - **Polling**: after the device is attached, reachability is probed on a timer.
//! - **Lifecycle**: `stopped`, `starting`, `running` and `error` are reported to the
//!   bridge manager.
//!
//! All traffic is JSON. Malformed input is logged and dropped; nothing a peer sends
//! can stop the adaptor.
//!
//! ## Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use tokio::sync::mpsc;
//! use zwave_boiler::{AdaptorConfig, AdaptorHost, ChannelTransport, HostEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AdaptorConfig::from_json(r#"{"id": "BID7", "address": "12"}"#)?;
//!     let (transport, mut outbound) = ChannelTransport::new();
//!     let (events, inbound) = mpsc::unbounded_channel();
//!
//!     let host = AdaptorHost::new(config, transport, inbound)?;
//!     let adaptor = tokio::spawn(host.run());
//!
//!     events.send(HostEvent::Configure(json!({})))?;
//!     events.send(HostEvent::Zwave(json!({"content": "init"})))?;
//!
//!     while let Some(message) = outbound.recv().await {
//!         println!("{} <- {}", message.destination(), message.to_json()?);
//!     }
//!
//!     adaptor.await?;
//!     Ok(())
//! }
//! ```

/// Device state and message handlers
pub mod adaptor;
/// Error types and handling
pub mod error;
/// Event loop that drives an adaptor
pub mod host;
/// Wire message structures and decoding
pub mod protocol;
/// Timer registration
pub mod scheduler;
/// Outbound message delivery
pub mod transport;
/// Type definitions and configuration
pub mod types;

// Re-export the main types for convenient usage
pub use adaptor::{AdaptorState, BoilerAdaptor};
pub use error::{AdaptorError, Result};
pub use host::{AdaptorHost, EventSource, HostEvent, StreamSource};
pub use protocol::{AppMessage, ZwaveMessage, ZwaveRequest};
pub use scheduler::{Scheduler, TimerExpiry, TimerKind, TokioScheduler};
pub use transport::{ChannelTransport, Outbound, Transport};
pub use types::{AdaptorConfig, Characteristic, LifecycleState, StateAction, SwitchState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Adaptor name advertised to apps unless configured otherwise
pub const MODULE_NAME: &str = "boiler-control";

/// Default seconds between reachability polls
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

/// Seconds between the comms service attaching the device and the first poll
pub const INIT_POLL_DELAY_SECS: u64 = 30;
