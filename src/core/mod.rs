//! Core module containing the acquisition path of Fieldlog
//!
//! This module provides:
//! - Transport adapter layer with stub and Modbus RTU register clients
//! - Bus connection with connect/read retry and call-shape negotiation
//! - Cycle log writer (append-only JSON lines)
//! - Acquisition session lifecycle
//! - File-based session tracker for cross-process status visibility
//! - Modbus RTU framing for the read path

pub mod bus;
pub mod logger;
pub mod protocol;
pub mod session;
pub mod tracker;
pub mod transport;
