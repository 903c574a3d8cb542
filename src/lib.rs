//! # Fieldlog Core Library
//!
//! A serial register poller and cycle logger for industrial field devices:
//! - Register clients behind a negotiated capability trait (offline stub,
//!   Modbus RTU over serial)
//! - Bus connection with bounded connect retries and per-read
//!   retry/reconnect policy
//! - Acquisition sessions writing append-only JSON-lines cycle logs
//! - File-based session tracker for cross-process status visibility
//! - CLI with exit codes for automation
//!
//! ## Example
//!
//! ```rust,no_run
//! use fieldlog_core::{ClientBackend, DefaultClientFactory, ModbusBus, PortConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PortConfig::new("p1", "/dev/ttyUSB0", 9600, 1);
//!     let factory = DefaultClientFactory::new(ClientBackend::Stub);
//!     let mut bus = ModbusBus::new(config, Box::new(factory));
//!
//!     bus.connect().await?;
//!     let response = bus.read_holding_registers(0, 10).await?;
//!     println!("Registers: {:?}", response.values);
//!     bus.close().await;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::ExitCodes;
pub use crate::config::{PortAction, Settings, SettingsError};
pub use crate::core::bus::{BusError, ModbusBus, PortConfig};
pub use crate::core::logger::{CycleLogWriter, LogRecord, WriterError};
pub use crate::core::session::{AcquisitionSession, SessionError};
pub use crate::core::tracker::{SessionState, SessionTracker, TrackerError};
pub use crate::core::transport::{
    AdapterError, CallShape, ClientBackend, ClientFactory, DefaultClientFactory, ReadCall,
    RegisterClient, RegisterResponse, RtuClient, SerialFlowControl, SerialParity, StubClient,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
