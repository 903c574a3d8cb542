//! Modbus RTU framing for the register read path
//!
//! Only the request/response shapes the acquisition core needs: building
//! read-holding-registers requests and decoding the matching responses,
//! including exception frames.

use super::checksum;
use thiserror::Error;

/// Read Holding Registers function code (0x03)
pub const READ_HOLDING_REGISTERS: u8 = 0x03;

/// Modbus exception codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    SlaveDeviceFailure = 0x04,
    Acknowledge = 0x05,
    SlaveDeviceBusy = 0x06,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetDeviceFailedToRespond = 0x0B,
}

impl ExceptionCode {
    /// Get exception from u8
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(ExceptionCode::IllegalFunction),
            0x02 => Some(ExceptionCode::IllegalDataAddress),
            0x03 => Some(ExceptionCode::IllegalDataValue),
            0x04 => Some(ExceptionCode::SlaveDeviceFailure),
            0x05 => Some(ExceptionCode::Acknowledge),
            0x06 => Some(ExceptionCode::SlaveDeviceBusy),
            0x08 => Some(ExceptionCode::MemoryParityError),
            0x0A => Some(ExceptionCode::GatewayPathUnavailable),
            0x0B => Some(ExceptionCode::GatewayTargetDeviceFailedToRespond),
            _ => None,
        }
    }

    /// Get name of exception
    pub fn name(&self) -> &'static str {
        match self {
            ExceptionCode::IllegalFunction => "Illegal Function",
            ExceptionCode::IllegalDataAddress => "Illegal Data Address",
            ExceptionCode::IllegalDataValue => "Illegal Data Value",
            ExceptionCode::SlaveDeviceFailure => "Slave Device Failure",
            ExceptionCode::Acknowledge => "Acknowledge",
            ExceptionCode::SlaveDeviceBusy => "Slave Device Busy",
            ExceptionCode::MemoryParityError => "Memory Parity Error",
            ExceptionCode::GatewayPathUnavailable => "Gateway Path Unavailable",
            ExceptionCode::GatewayTargetDeviceFailedToRespond => "Gateway Target Failed to Respond",
        }
    }
}

/// Frame decode errors
#[derive(Error, Debug)]
pub enum FrameError {
    /// Frame shorter than the minimum RTU frame
    #[error("Frame too short ({0} bytes)")]
    TooShort(usize),

    /// Trailing CRC does not match the frame body
    #[error("CRC mismatch")]
    CrcMismatch,

    /// Response carries an unexpected function code
    #[error("Unexpected function code 0x{0:02X}")]
    UnexpectedFunction(u8),

    /// Byte count field disagrees with the frame length
    #[error("Incomplete register data")]
    Truncated,
}

/// Decoded read response: register data bytes or a device exception
#[derive(Debug, Clone)]
pub enum ResponseFrame {
    /// Successful response with the raw register bytes
    Data(Vec<u8>),
    /// Device-side exception response
    Exception(ExceptionCode),
}

/// Build a read-holding-registers RTU request frame
pub fn build_read_request(unit_id: u8, start_address: u16, quantity: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8);
    frame.push(unit_id);
    frame.push(READ_HOLDING_REGISTERS);
    frame.extend_from_slice(&start_address.to_be_bytes());
    frame.extend_from_slice(&quantity.to_be_bytes());

    let crc = checksum::crc16_modbus(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());

    frame
}

/// Parse a read-holding-registers RTU response frame
pub fn parse_read_response(data: &[u8]) -> Result<ResponseFrame, FrameError> {
    if data.len() < 5 {
        return Err(FrameError::TooShort(data.len()));
    }

    if !checksum::verify_crc16_modbus(data) {
        return Err(FrameError::CrcMismatch);
    }

    let function_code = data[1];

    // Exception response (bit 7 set)
    if function_code & 0x80 != 0 {
        let exception =
            ExceptionCode::from_u8(data[2]).unwrap_or(ExceptionCode::SlaveDeviceFailure);
        return Ok(ResponseFrame::Exception(exception));
    }

    if function_code != READ_HOLDING_REGISTERS {
        return Err(FrameError::UnexpectedFunction(function_code));
    }

    let byte_count = data[2] as usize;
    if data.len() < 3 + byte_count + 2 {
        return Err(FrameError::Truncated);
    }

    Ok(ResponseFrame::Data(data[3..3 + byte_count].to_vec()))
}

/// Extract register values from response data
pub fn parse_registers(data: &[u8]) -> Vec<u16> {
    data.chunks(2)
        .map(|chunk| {
            if chunk.len() == 2 {
                u16::from_be_bytes([chunk[0], chunk[1]])
            } else {
                0
            }
        })
        .collect()
}

/// Format an RTU frame for display
pub fn format_frame(data: &[u8]) -> String {
    if data.len() < 4 {
        return format!("Invalid RTU frame: {}", hex::encode(data));
    }
    format!(
        "RTU: Unit={:02X} Func={:02X} Data={} CRC={:04X}",
        data[0],
        data[1],
        hex::encode(&data[2..data.len() - 2]),
        u16::from_le_bytes([data[data.len() - 2], data[data.len() - 1]])
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_read_request() {
        let frame = build_read_request(1, 0, 10);
        assert_eq!(frame.len(), 8);
        assert_eq!(frame[0], 1); // Unit ID
        assert_eq!(frame[1], 3); // Function code
        assert!(checksum::verify_crc16_modbus(&frame));
    }

    #[test]
    fn test_parse_read_response_data() {
        // Unit 1, func 3, 4 bytes: registers 100 and 300
        let mut frame = vec![0x01, 0x03, 0x04, 0x00, 0x64, 0x01, 0x2C];
        let crc = checksum::crc16_modbus(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());

        match parse_read_response(&frame) {
            Ok(ResponseFrame::Data(data)) => assert_eq!(parse_registers(&data), vec![100, 300]),
            other => panic!("unexpected parse result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_read_response_exception() {
        let mut frame = vec![0x01, 0x83, 0x02];
        let crc = checksum::crc16_modbus(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());

        match parse_read_response(&frame) {
            Ok(ResponseFrame::Exception(code)) => {
                assert_eq!(code, ExceptionCode::IllegalDataAddress);
            }
            other => panic!("unexpected parse result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_read_response_crc_mismatch() {
        let mut frame = vec![0x01, 0x03, 0x02, 0x00, 0x01];
        let crc = checksum::crc16_modbus(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame[3] ^= 0xFF;

        assert!(matches!(
            parse_read_response(&frame),
            Err(FrameError::CrcMismatch)
        ));
    }
}
