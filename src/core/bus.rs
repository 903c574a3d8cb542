//! Bus connection for register-based field devices
//!
//! Owns one link to one device and carries the resilience policy around it:
//! bounded connect retries, per-read retries with optional reconnect, and
//! call-shape negotiation against heterogeneous client implementations.

use crate::core::transport::{
    AdapterError, CallShape, ClientFactory, ExtraParams, RegisterClient, RegisterResponse,
    SerialParity,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration of one physical port
///
/// Immutable for a run once loaded from settings, except for explicit
/// operator overrides applied before the bus connects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfig {
    /// Unique port id
    pub id: String,
    /// Device path, e.g. COM3 or /dev/ttyUSB0
    pub device: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Parity
    #[serde(default)]
    pub parity: SerialParity,
    /// Stop bits (1, 2)
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// Data bits (5-8)
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Link timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: f64,
    /// Seconds between polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,
    /// Unit identifier of the target device
    pub unit_id: u8,
    /// Register start address for polls
    #[serde(default)]
    pub read_address: u16,
    /// Number of registers per poll
    #[serde(default = "default_read_count")]
    pub read_count: u16,
    /// Index of the value of interest within the read block
    #[serde(default)]
    pub value_index: usize,
    /// Whether this port may be used for cycles
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Connect attempts before giving up (minimum 1)
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    /// Seconds between failed connect attempts
    #[serde(default = "default_connect_retry_delay")]
    pub connect_retry_delay_secs: f64,
    /// Read attempts before giving up (minimum 1)
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,
    /// Seconds between failed read attempts
    #[serde(default = "default_read_retry_delay")]
    pub read_retry_delay_secs: f64,
    /// Reconnect the link before retrying a failed read
    #[serde(default = "default_enabled")]
    pub reconnect_on_read_error: bool,
    /// Adapter-specific extra parameters
    #[serde(default)]
    pub extra_params: ExtraParams,
}

fn default_stop_bits() -> u8 {
    1
}
fn default_data_bits() -> u8 {
    8
}
fn default_timeout() -> f64 {
    1.0
}
fn default_poll_interval() -> f64 {
    1.0
}
fn default_read_count() -> u16 {
    1
}
fn default_enabled() -> bool {
    true
}
fn default_connect_retries() -> u32 {
    3
}
fn default_connect_retry_delay() -> f64 {
    1.0
}
fn default_read_retries() -> u32 {
    1
}
fn default_read_retry_delay() -> f64 {
    0.2
}

impl PortConfig {
    /// Create a port configuration with default link and retry policy
    pub fn new(id: &str, device: &str, baud_rate: u32, unit_id: u8) -> Self {
        Self {
            id: id.to_string(),
            device: device.to_string(),
            baud_rate,
            parity: SerialParity::None,
            stop_bits: default_stop_bits(),
            data_bits: default_data_bits(),
            timeout_secs: default_timeout(),
            poll_interval_secs: default_poll_interval(),
            unit_id,
            read_address: 0,
            read_count: default_read_count(),
            value_index: 0,
            enabled: true,
            connect_retries: default_connect_retries(),
            connect_retry_delay_secs: default_connect_retry_delay(),
            read_retries: default_read_retries(),
            read_retry_delay_secs: default_read_retry_delay(),
            reconnect_on_read_error: true,
            extra_params: ExtraParams::new(),
        }
    }

    /// Link timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs.max(0.0))
    }

    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs.max(0.0))
    }

    /// Delay between failed connect attempts
    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.connect_retry_delay_secs.max(0.0))
    }

    /// Delay between failed read attempts
    pub fn read_retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.read_retry_delay_secs.max(0.0))
    }
}

/// Bus error types
#[derive(Error, Debug)]
pub enum BusError {
    /// Link could not be established after exhausting retries
    #[error("Connection failed for {device}: {source}")]
    ConnectionFailed {
        /// Device path of the port
        device: String,
        /// Last underlying cause
        #[source]
        source: AdapterError,
    },

    /// Read attempted without a connected client
    #[error("Client not connected")]
    NotConnected,

    /// The client does not implement register reads
    #[error("Client does not implement register reads")]
    UnsupportedOperation,

    /// Register read failed after exhausting retries
    #[error("Read failed on {device}: {source}")]
    ReadFailed {
        /// Device path of the port
        device: String,
        /// Last underlying cause
        #[source]
        source: AdapterError,
    },
}

/// One bus connection to one device
pub struct ModbusBus {
    config: PortConfig,
    factory: Box<dyn ClientFactory>,
    client: Option<Box<dyn RegisterClient>>,
    call_shape: Option<CallShape>,
}

impl ModbusBus {
    /// Create a bus for the given port; no link is opened yet
    pub fn new(config: PortConfig, factory: Box<dyn ClientFactory>) -> Self {
        Self {
            config,
            factory,
            client: None,
            call_shape: None,
        }
    }

    /// Port configuration this bus was built from
    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    /// Whether a client is held and reports an open link
    pub fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(|c| c.is_connected())
    }

    /// Construct and open a client for the configured link
    ///
    /// Retries up to `connect_retries` times, sleeping `connect_retry_delay`
    /// between failed attempts. On exhaustion the last underlying cause is
    /// preserved and no partially-open client is retained.
    pub async fn connect(&mut self) -> Result<(), BusError> {
        let attempts = self.config.connect_retries.max(1);
        let mut attempt = 1;
        loop {
            match self.try_connect().await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    self.client = None;
                    if attempt >= attempts {
                        tracing::error!(
                            "Connect failed after {} attempt(s) for {}: {}",
                            attempts,
                            self.config.device,
                            err
                        );
                        return Err(BusError::ConnectionFailed {
                            device: self.config.device.clone(),
                            source: err,
                        });
                    }
                    tracing::debug!(
                        "Connect attempt {}/{} failed for {}: {}",
                        attempt,
                        attempts,
                        self.config.device,
                        err
                    );
                    tokio::time::sleep(self.config.connect_retry_delay()).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn try_connect(&mut self) -> Result<(), AdapterError> {
        let extra = if self.config.extra_params.is_empty() {
            None
        } else {
            Some(&self.config.extra_params)
        };

        let mut client = match self.factory.build(&self.config, extra) {
            Ok(client) => client,
            Err(AdapterError::InvalidParams(reason)) if extra.is_some() => {
                tracing::warn!(
                    "Client factory rejected extra params ({}); retrying with base parameters only",
                    reason
                );
                self.factory.build(&self.config, None)?
            }
            Err(err) => return Err(err),
        };

        client.connect().await?;
        self.client = Some(client);
        Ok(())
    }

    /// Best-effort teardown
    ///
    /// Errors from the underlying close are logged and swallowed so session
    /// shutdown stays unconditional.
    pub async fn close(&mut self) {
        if let Some(mut client) = self.client.take() {
            if let Err(err) = client.close().await {
                tracing::warn!(
                    "Error closing client for {} (ignored): {}",
                    self.config.device,
                    err
                );
            }
        }
    }

    /// Read a block of holding registers
    ///
    /// Retries up to `read_retries` times, sleeping `read_retry_delay`
    /// between attempts; with `reconnect_on_read_error` set, the link is
    /// closed and reopened before each retry. The call shape is negotiated
    /// on the first read and reused afterwards.
    pub async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<RegisterResponse, BusError> {
        {
            let client = self.client.as_ref().ok_or(BusError::NotConnected)?;
            if !client.supports_register_read() {
                return Err(BusError::UnsupportedOperation);
            }
        }

        let attempts = self.config.read_retries.max(1);
        let mut attempt = 1;
        loop {
            match self.try_read(address, count).await {
                Ok(resp) => return Ok(resp),
                Err(err) => {
                    if attempt >= attempts {
                        tracing::error!(
                            "Read failed after {} attempt(s) on {}: {}",
                            attempts,
                            self.config.device,
                            err
                        );
                        return Err(BusError::ReadFailed {
                            device: self.config.device.clone(),
                            source: err,
                        });
                    }
                    tracing::debug!(
                        "Read attempt {}/{} failed on {}: {}",
                        attempt,
                        attempts,
                        self.config.device,
                        err
                    );
                    if self.config.reconnect_on_read_error {
                        self.close().await;
                        if let Err(conn_err) = self.connect().await {
                            tracing::error!("Reconnect failed: {}", conn_err);
                            // No further retry opportunity left; surface now.
                            if attempt + 1 >= attempts {
                                return Err(conn_err);
                            }
                        }
                    }
                    tokio::time::sleep(self.config.read_retry_delay()).await;
                    attempt += 1;
                }
            }
        }
    }

    /// One read attempt, negotiating the call shape if not yet known
    async fn try_read(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<RegisterResponse, AdapterError> {
        let unit_id = self.config.unit_id;
        let shapes: Vec<CallShape> = match self.call_shape {
            Some(shape) => vec![shape],
            None => CallShape::NEGOTIATION_ORDER.to_vec(),
        };

        let client = self.client.as_mut().ok_or(AdapterError::NotConnected)?;

        for shape in shapes {
            match client.read_registers(shape.call(address, count, unit_id)).await {
                Ok(resp) => {
                    if self.call_shape.is_none() {
                        tracing::debug!(
                            "Negotiated call shape {:?} for {}",
                            shape,
                            self.config.device
                        );
                    }
                    self.call_shape = Some(shape);
                    if resp.is_error() {
                        let reason = resp
                            .error
                            .unwrap_or_else(|| "unspecified device error".to_string());
                        return Err(AdapterError::Protocol(format!(
                            "Device error response: {reason}"
                        )));
                    }
                    return Ok(resp);
                }
                // Fall through the chain only on a signature mismatch, and
                // only while still negotiating.
                Err(AdapterError::SignatureRejected(reason)) if self.call_shape.is_none() => {
                    tracing::trace!("Call shape {:?} rejected: {}", shape, reason);
                }
                Err(err) => return Err(err),
            }
        }

        Err(AdapterError::SignatureRejected(
            "no accepted register-read call shape",
        ))
    }
}
