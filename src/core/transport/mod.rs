//! Transport adapter layer for register clients
//!
//! Supports:
//! - Offline deterministic stub client (no hardware required)
//! - Modbus RTU client over a serial port
//!
//! Clients differ in which call shapes their register-read operation
//! accepts; the bus negotiates the shape through an ordered fallback chain
//! (see [`CallShape::NEGOTIATION_ORDER`]).

mod serial;
mod stub;

pub use serial::{RtuClient, SerialFlowControl, SerialParity};
pub use stub::StubClient;

use crate::core::bus::PortConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Adapter-specific construction parameters beyond the base link settings
pub type ExtraParams = HashMap<String, toml::Value>;

/// Transport adapter error types
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The register-read call shape is not accepted by this client
    #[error("Call shape not accepted: {0}")]
    SignatureRejected(&'static str),

    /// Construction rejected adapter-specific extra parameters
    #[error("Invalid client parameters: {0}")]
    InvalidParams(String),

    /// The link could not be opened
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Operation requires an open link
    #[error("Not connected")]
    NotConnected,

    /// Protocol-level read failure
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unknown client backend name
    #[error("Unknown client backend '{0}'")]
    UnknownBackend(String),
}

/// Register-read call shape, in negotiation terms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    /// Address + count + unit-style identifier
    WithUnit,
    /// Address + count + slave-style identifier
    WithSlave,
    /// Address + count only
    AddressCount,
    /// Bare positional address and count
    Positional,
}

impl CallShape {
    /// Fallback order for signature negotiation
    pub const NEGOTIATION_ORDER: [CallShape; 4] = [
        CallShape::WithUnit,
        CallShape::WithSlave,
        CallShape::AddressCount,
        CallShape::Positional,
    ];

    /// Build the concrete call for this shape
    pub fn call(self, address: u16, count: u16, id: u8) -> ReadCall {
        match self {
            CallShape::WithUnit => ReadCall::WithUnit {
                address,
                count,
                unit: id,
            },
            CallShape::WithSlave => ReadCall::WithSlave {
                address,
                count,
                slave: id,
            },
            CallShape::AddressCount => ReadCall::AddressCount { address, count },
            CallShape::Positional => ReadCall::Positional(address, count),
        }
    }
}

/// A register-read call in one of the accepted signature shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCall {
    /// Address + count + unit-style identifier
    WithUnit {
        /// Register start address
        address: u16,
        /// Number of registers
        count: u16,
        /// Unit identifier
        unit: u8,
    },
    /// Address + count + slave-style identifier
    WithSlave {
        /// Register start address
        address: u16,
        /// Number of registers
        count: u16,
        /// Slave identifier
        slave: u8,
    },
    /// Address + count, no identifier
    AddressCount {
        /// Register start address
        address: u16,
        /// Number of registers
        count: u16,
    },
    /// Bare positional address and count
    Positional(u16, u16),
}

impl ReadCall {
    /// Shape of this call
    pub fn shape(&self) -> CallShape {
        match self {
            ReadCall::WithUnit { .. } => CallShape::WithUnit,
            ReadCall::WithSlave { .. } => CallShape::WithSlave,
            ReadCall::AddressCount { .. } => CallShape::AddressCount,
            ReadCall::Positional(..) => CallShape::Positional,
        }
    }

    /// Register start address
    pub fn address(&self) -> u16 {
        match *self {
            ReadCall::WithUnit { address, .. }
            | ReadCall::WithSlave { address, .. }
            | ReadCall::AddressCount { address, .. }
            | ReadCall::Positional(address, _) => address,
        }
    }

    /// Number of registers
    pub fn count(&self) -> u16 {
        match *self {
            ReadCall::WithUnit { count, .. }
            | ReadCall::WithSlave { count, .. }
            | ReadCall::AddressCount { count, .. }
            | ReadCall::Positional(_, count) => count,
        }
    }

    /// Device identifier carried by the call, if the shape has one
    pub fn identifier(&self) -> Option<u8> {
        match *self {
            ReadCall::WithUnit { unit, .. } => Some(unit),
            ReadCall::WithSlave { slave, .. } => Some(slave),
            ReadCall::AddressCount { .. } | ReadCall::Positional(..) => None,
        }
    }
}

/// Response of a register read
#[derive(Debug, Clone)]
pub struct RegisterResponse {
    /// Decoded register values
    pub values: Vec<u16>,
    /// Open structured view of the response, suitable for logging
    pub detail: serde_json::Value,
    /// Device-reported error, if the response signals one
    pub error: Option<String>,
}

impl RegisterResponse {
    /// Whether the response signals a device-side error
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Capability trait implemented by all register clients
#[async_trait]
pub trait RegisterClient: Send {
    /// Open the link
    async fn connect(&mut self) -> Result<(), AdapterError>;

    /// Close the link
    async fn close(&mut self) -> Result<(), AdapterError>;

    /// Check if the link is open
    fn is_connected(&self) -> bool;

    /// Whether this client implements the register-read operation
    fn supports_register_read(&self) -> bool {
        true
    }

    /// Perform one register read using the given call shape
    ///
    /// Clients fail with [`AdapterError::SignatureRejected`] for shapes they
    /// do not accept; any other error is a genuine read failure.
    async fn read_registers(&mut self, call: ReadCall) -> Result<RegisterResponse, AdapterError>;

    /// Get connection info string
    fn connection_info(&self) -> String;
}

/// Client backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientBackend {
    /// Offline deterministic stand-in
    Stub,
    /// Modbus RTU over a serial port
    Rtu,
}

impl fmt::Display for ClientBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stub => write!(f, "stub"),
            Self::Rtu => write!(f, "rtu"),
        }
    }
}

impl FromStr for ClientBackend {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stub" => Ok(Self::Stub),
            "rtu" => Ok(Self::Rtu),
            other => Err(AdapterError::UnknownBackend(other.to_string())),
        }
    }
}

/// Factory for register clients
///
/// Implementations take adapter-specific parameters from `extra`, never from
/// the configuration's own map, so construction can be retried with base
/// parameters only when the extras are rejected.
pub trait ClientFactory: Send + Sync {
    /// Construct a client for the configured link
    fn build(
        &self,
        config: &PortConfig,
        extra: Option<&ExtraParams>,
    ) -> Result<Box<dyn RegisterClient>, AdapterError>;
}

/// Factory selecting a built-in client by backend
pub struct DefaultClientFactory {
    backend: ClientBackend,
}

impl DefaultClientFactory {
    /// Create a factory for the given backend
    pub fn new(backend: ClientBackend) -> Self {
        Self { backend }
    }
}

impl ClientFactory for DefaultClientFactory {
    fn build(
        &self,
        config: &PortConfig,
        extra: Option<&ExtraParams>,
    ) -> Result<Box<dyn RegisterClient>, AdapterError> {
        match self.backend {
            ClientBackend::Stub => Ok(Box::new(StubClient::new(config))),
            ClientBackend::Rtu => Ok(Box::new(RtuClient::new(config, extra)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiation_order() {
        assert_eq!(CallShape::NEGOTIATION_ORDER[0], CallShape::WithUnit);
        assert_eq!(CallShape::NEGOTIATION_ORDER[3], CallShape::Positional);
    }

    #[test]
    fn test_call_shape_build() {
        let call = CallShape::WithSlave.call(10, 2, 7);
        assert_eq!(call.shape(), CallShape::WithSlave);
        assert_eq!(call.address(), 10);
        assert_eq!(call.count(), 2);
        assert_eq!(call.identifier(), Some(7));

        let call = CallShape::Positional.call(10, 2, 7);
        assert_eq!(call.identifier(), None);
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("stub".parse::<ClientBackend>().ok(), Some(ClientBackend::Stub));
        assert_eq!("RTU".parse::<ClientBackend>().ok(), Some(ClientBackend::Rtu));
        assert!("telnet".parse::<ClientBackend>().is_err());
    }
}
