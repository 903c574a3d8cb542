//! Offline stub client
//!
//! Deterministic stand-in for hardware so cycles can be exercised without a
//! device on the line. Register values count up from the read address and a
//! sample counter increments on every read.

use super::{AdapterError, ReadCall, RegisterClient, RegisterResponse};
use crate::core::bus::PortConfig;
use async_trait::async_trait;
use serde_json::json;

/// Offline deterministic register client
pub struct StubClient {
    device: String,
    connected: bool,
    counter: u64,
}

impl StubClient {
    /// Create a stub client for the configured device path
    pub fn new(config: &PortConfig) -> Self {
        Self {
            device: config.device.clone(),
            connected: false,
            counter: 0,
        }
    }
}

#[async_trait]
impl RegisterClient for StubClient {
    async fn connect(&mut self) -> Result<(), AdapterError> {
        self.connected = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), AdapterError> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn read_registers(&mut self, call: ReadCall) -> Result<RegisterResponse, AdapterError> {
        if !self.connected {
            return Err(AdapterError::NotConnected);
        }

        match call {
            ReadCall::WithUnit {
                address,
                count,
                unit,
            } => {
                self.counter += 1;
                let values: Vec<u16> = (0..count).map(|i| address.wrapping_add(i)).collect();
                let detail = json!({
                    "address": address,
                    "count": count,
                    "unit": unit,
                    "values": values.clone(),
                    "sample": self.counter,
                });
                Ok(RegisterResponse {
                    values,
                    detail,
                    error: None,
                })
            }
            _ => Err(AdapterError::SignatureRejected(
                "stub client takes address, count and unit",
            )),
        }
    }

    fn connection_info(&self) -> String {
        format!("stub://{}", self.device)
    }
}
