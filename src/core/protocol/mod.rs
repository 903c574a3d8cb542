//! Protocol layer for the serial register link
//!
//! Provides Modbus RTU framing for the read path and the CRC-16 it needs.
//! The acquisition core never touches frames directly; only the
//! hardware-backed client uses this module.

pub mod checksum;
pub mod modbus;

pub use modbus::{
    build_read_request, format_frame, parse_read_response, parse_registers, ExceptionCode,
    FrameError, ResponseFrame,
};
