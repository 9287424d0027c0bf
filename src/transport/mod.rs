//! Byte-level access to the Modbus line.
//!
//! [`Transport`] is the capability the transaction engine needs: write a
//! frame, read a bounded number of bytes, read until the line goes quiet.
//! [`SerialTransport`] drives a real serial device; [`MockTransport`]
//! replays scripted replies for tests.

pub mod mock;
pub mod serial;

use async_trait::async_trait;
use std::time::Duration;

use crate::modbus::Frame;
use crate::utils::error::ModbusError;

pub use mock::{MockReply, MockTransport};
pub use serial::{available_ports, SerialTransport};

#[async_trait]
pub trait Transport: Send {
    /// Write every byte of `frame` and flush.
    async fn write(&mut self, frame: &Frame) -> Result<(), ModbusError>;

    /// Read exactly `expected` bytes.
    ///
    /// Fails with [`ModbusError::Timeout`] carrying the bytes received so
    /// far if `timeout` elapses first.
    async fn read_exact(&mut self, expected: usize, timeout: Duration) -> Result<Vec<u8>, ModbusError>;

    /// Read until `quiet` passes without a new byte after at least one byte
    /// has arrived, or until `timeout` elapses.
    async fn read_until_idle(&mut self, quiet: Duration, timeout: Duration) -> Result<Vec<u8>, ModbusError>;

    /// Drop stale input left on the line by an earlier exchange.
    fn clear_input(&mut self) -> Result<(), ModbusError>;

    /// Release the device. Safe to call more than once.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}
