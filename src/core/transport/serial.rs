//! Modbus RTU client over a serial port

use super::{AdapterError, ExtraParams, ReadCall, RegisterClient, RegisterResponse};
use crate::core::bus::PortConfig;
use crate::core::protocol::{self, ResponseFrame};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::str::FromStr;
use std::time::Duration;

/// Serial port parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SerialParity {
    /// No parity
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

impl SerialParity {
    /// One-letter display form (N/O/E)
    pub fn letter(&self) -> char {
        match self {
            Self::None => 'N',
            Self::Odd => 'O',
            Self::Even => 'E',
        }
    }
}

impl FromStr for SerialParity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "n" => Ok(Self::None),
            "odd" | "o" => Ok(Self::Odd),
            "even" | "e" => Ok(Self::Even),
            other => Err(format!("Invalid parity '{other}' (expected none, odd or even)")),
        }
    }
}

/// Serial port flow control type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SerialFlowControl {
    /// No flow control
    #[default]
    None,
    /// Hardware flow control (RTS/CTS)
    Hardware,
    /// Software flow control (XON/XOFF)
    Software,
}

impl FromStr for SerialFlowControl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "hardware" | "hw" => Ok(Self::Hardware),
            "software" | "sw" => Ok(Self::Software),
            other => Err(format!(
                "Invalid flow control '{other}' (expected none, hardware or software)"
            )),
        }
    }
}

/// Hardware-backed Modbus RTU register client
pub struct RtuClient {
    device: String,
    baud_rate: u32,
    data_bits: u8,
    stop_bits: u8,
    parity: SerialParity,
    flow_control: SerialFlowControl,
    timeout: Duration,
    unit_id: u8,
    port: Option<Box<dyn SerialPort>>,
}

impl RtuClient {
    /// Create an RTU client from the port configuration
    ///
    /// `extra` carries adapter-specific parameters; unrecognized keys fail
    /// with [`AdapterError::InvalidParams`] so the caller can retry with
    /// base parameters only.
    pub fn new(config: &PortConfig, extra: Option<&ExtraParams>) -> Result<Self, AdapterError> {
        let mut flow_control = SerialFlowControl::None;
        if let Some(extra) = extra {
            for (key, value) in extra {
                match key.as_str() {
                    "flow_control" => {
                        let text = value.as_str().ok_or_else(|| {
                            AdapterError::InvalidParams("flow_control must be a string".to_string())
                        })?;
                        flow_control = text.parse().map_err(AdapterError::InvalidParams)?;
                    }
                    other => {
                        return Err(AdapterError::InvalidParams(format!(
                            "unrecognized client parameter '{other}'"
                        )));
                    }
                }
            }
        }

        Ok(Self {
            device: config.device.clone(),
            baud_rate: config.baud_rate,
            data_bits: config.data_bits,
            stop_bits: config.stop_bits,
            parity: config.parity,
            flow_control,
            timeout: config.timeout(),
            unit_id: config.unit_id,
            port: None,
        })
    }
}

#[async_trait]
impl RegisterClient for RtuClient {
    async fn connect(&mut self) -> Result<(), AdapterError> {
        let data_bits = match self.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        };

        let stop_bits = match self.stop_bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        };

        let parity = match self.parity {
            SerialParity::Odd => Parity::Odd,
            SerialParity::Even => Parity::Even,
            SerialParity::None => Parity::None,
        };

        let flow_control = match self.flow_control {
            SerialFlowControl::Hardware => FlowControl::Hardware,
            SerialFlowControl::Software => FlowControl::Software,
            SerialFlowControl::None => FlowControl::None,
        };

        let port = serialport::new(&self.device, self.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(flow_control)
            .timeout(self.timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => AdapterError::PortNotFound(self.device.clone()),
                serialport::ErrorKind::Io(io_kind) => match io_kind {
                    std::io::ErrorKind::PermissionDenied => {
                        AdapterError::PermissionDenied(self.device.clone())
                    }
                    _ => AdapterError::ConnectFailed(e.to_string()),
                },
                _ => AdapterError::ConnectFailed(e.to_string()),
            })?;

        self.port = Some(port);
        tracing::debug!("Opened {}", self.connection_info());

        Ok(())
    }

    async fn close(&mut self) -> Result<(), AdapterError> {
        self.port = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    async fn read_registers(&mut self, call: ReadCall) -> Result<RegisterResponse, AdapterError> {
        let unit = match call {
            ReadCall::WithUnit { unit, .. } => unit,
            // The frame carries the identifier, so shapes without one work too.
            ReadCall::AddressCount { .. } | ReadCall::Positional(..) => self.unit_id,
            ReadCall::WithSlave { .. } => {
                return Err(AdapterError::SignatureRejected(
                    "RTU client addresses devices by unit id",
                ));
            }
        };
        let address = call.address();
        let count = call.count();

        let port = self.port.as_mut().ok_or(AdapterError::NotConnected)?;

        let request = protocol::build_read_request(unit, address, count);
        tracing::trace!("TX {}", protocol::format_frame(&request));
        port.write_all(&request)?;
        port.flush()?;

        // Normal response: unit + func + byte count + data + CRC.
        // Exception responses are always 5 bytes.
        let mut expected = 5 + 2 * count as usize;
        let mut buf = vec![0u8; expected];
        let mut filled = 0;
        while filled < expected {
            match port.read(&mut buf[filled..expected]) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    if filled >= 2 && buf[1] & 0x80 != 0 {
                        expected = 5;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => return Err(AdapterError::Io(e)),
            }
        }

        let frame = &buf[..filled];
        tracing::trace!("RX {}", protocol::format_frame(frame));

        match protocol::parse_read_response(frame) {
            Ok(ResponseFrame::Data(data)) => {
                let values = protocol::parse_registers(&data);
                let detail = json!({
                    "address": address,
                    "count": count,
                    "unit": unit,
                    "registers": values.clone(),
                });
                Ok(RegisterResponse {
                    values,
                    detail,
                    error: None,
                })
            }
            Ok(ResponseFrame::Exception(code)) => Ok(RegisterResponse {
                values: Vec::new(),
                detail: json!({
                    "address": address,
                    "count": count,
                    "unit": unit,
                    "exception": code.name(),
                }),
                error: Some(code.name().to_string()),
            }),
            Err(err) => Err(AdapterError::Protocol(err.to_string())),
        }
    }

    fn connection_info(&self) -> String {
        format!(
            "{} @ {} baud ({}{}{})",
            self.device,
            self.baud_rate,
            self.data_bits,
            self.parity.letter(),
            self.stop_bits
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bus::PortConfig;

    #[test]
    fn test_parity_from_str() {
        assert_eq!("n".parse::<SerialParity>().ok(), Some(SerialParity::None));
        assert_eq!("even".parse::<SerialParity>().ok(), Some(SerialParity::Even));
        assert!("x".parse::<SerialParity>().is_err());
    }

    #[test]
    fn test_rtu_rejects_unknown_extra_params() {
        let config = PortConfig::new("p1", "/dev/ttyUSB0", 9600, 1);
        let mut extra = ExtraParams::new();
        extra.insert("retry_budget".to_string(), toml::Value::Integer(3));

        let result = RtuClient::new(&config, Some(&extra));
        assert!(matches!(result, Err(AdapterError::InvalidParams(_))));
    }

    #[test]
    fn test_rtu_accepts_flow_control_param() {
        let config = PortConfig::new("p1", "/dev/ttyUSB0", 9600, 1);
        let mut extra = ExtraParams::new();
        extra.insert(
            "flow_control".to_string(),
            toml::Value::String("hardware".to_string()),
        );

        let client = RtuClient::new(&config, Some(&extra)).unwrap();
        assert_eq!(client.flow_control, SerialFlowControl::Hardware);
    }

    #[tokio::test]
    async fn test_rtu_read_requires_connect() {
        let config = PortConfig::new("p1", "/dev/ttyUSB0", 9600, 1);
        let mut client = RtuClient::new(&config, None).unwrap();

        let result = client
            .read_registers(crate::core::transport::CallShape::WithUnit.call(0, 1, 1))
            .await;
        assert!(matches!(result, Err(AdapterError::NotConnected)));
    }

    #[tokio::test]
    async fn test_rtu_rejects_slave_shape() {
        let config = PortConfig::new("p1", "/dev/ttyUSB0", 9600, 1);
        let mut client = RtuClient::new(&config, None).unwrap();

        let result = client
            .read_registers(crate::core::transport::CallShape::WithSlave.call(0, 1, 1))
            .await;
        assert!(matches!(result, Err(AdapterError::SignatureRejected(_))));
    }
}
