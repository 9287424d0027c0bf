use async_trait::async_trait;
use log::{debug, error, info, warn};
use serialport::{ClearBuffer, SerialPort, SerialPortType};
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::Transport;
use crate::config::settings::ParityConfig;
use crate::modbus::codec::MAX_FRAME_LEN;
use crate::modbus::Frame;
use crate::utils::error::ModbusError;

/// Read slice used while polling the device; bounds how long a cancellation
/// can go unnoticed inside a read.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Serial line access.
///
/// The timeout given to [`SerialTransport::open`] bounds writes. Reads are
/// bounded by the timeout their caller passes in, polled in short slices.
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    port_name: String,
    timeout: Duration,
    cancel: CancellationToken,
}

impl SerialTransport {
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        parity: &ParityConfig,
        timeout_ms: u64,
    ) -> Result<Self, ModbusError> {
        info!("Connecting to Modbus RTU port: {}", port_name);
        info!("Configuration: {} baud, 8 data bits, {} parity, 1 stop bit", baud_rate, parity);

        let port = serialport::new(port_name, baud_rate)
            .timeout(POLL_INTERVAL)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(parity.into())
            .open()
            .map_err(|e| {
                error!("Failed to open serial port {}: {}", port_name, e);
                ModbusError::PortUnavailable(format!("{}: {}", port_name, e))
            })?;

        info!("Modbus RTU connection established successfully");
        Ok(Self {
            port: Some(port),
            port_name: port_name.to_string(),
            timeout: Duration::from_millis(timeout_ms),
            cancel: CancellationToken::new(),
        })
    }

    /// Abort in-progress reads when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, ModbusError> {
        self.port
            .as_mut()
            .ok_or_else(|| ModbusError::IoError(format!("port {} is closed", self.port_name)))
    }

    /// One bounded read; `Ok(0)` when nothing arrived within the poll slice.
    fn poll_read(&mut self, buffer: &mut [u8]) -> Result<usize, ModbusError> {
        let port = self.port_mut()?;
        match port.read(buffer) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(ModbusError::IoError(format!("Read failed: {}", e))),
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write(&mut self, frame: &Frame) -> Result<(), ModbusError> {
        let write_timeout = self.timeout;
        let port = self.port_mut()?;

        // The poll slice is too short for a long frame at low baud rates.
        port.set_timeout(write_timeout)
            .map_err(|e| ModbusError::IoError(format!("Cannot set write timeout: {}", e)))?;
        let written = port
            .write_all(frame)
            .map_err(|e| ModbusError::IoError(format!("Write failed: {}", e)))
            .and_then(|_| {
                port.flush()
                    .map_err(|e| ModbusError::IoError(format!("Flush failed: {}", e)))
            });
        port.set_timeout(POLL_INTERVAL)
            .map_err(|e| ModbusError::IoError(format!("Cannot restore read timeout: {}", e)))?;

        written
    }

    async fn read_exact(&mut self, expected: usize, timeout: Duration) -> Result<Vec<u8>, ModbusError> {
        let mut response = Vec::with_capacity(expected);
        let mut buffer = [0u8; MAX_FRAME_LEN];
        let start_time = Instant::now();

        while response.len() < expected {
            if self.cancel.is_cancelled() {
                return Err(ModbusError::Cancelled { partial: response });
            }
            if start_time.elapsed() >= timeout {
                return Err(ModbusError::Timeout { partial: response });
            }

            let wanted = (expected - response.len()).min(buffer.len());
            match self.poll_read(&mut buffer[..wanted])? {
                0 => tokio::task::yield_now().await,
                n => {
                    debug!("Raw data received: {} ({} bytes)", hex::encode_upper(&buffer[..n]), n);
                    response.extend_from_slice(&buffer[..n]);
                }
            }
        }

        Ok(response)
    }

    async fn read_until_idle(&mut self, quiet: Duration, timeout: Duration) -> Result<Vec<u8>, ModbusError> {
        let mut response = Vec::new();
        let mut buffer = [0u8; MAX_FRAME_LEN];
        let start_time = Instant::now();
        let mut last_byte_time = start_time;

        loop {
            if self.cancel.is_cancelled() {
                return Err(ModbusError::Cancelled { partial: response });
            }
            if !response.is_empty() && last_byte_time.elapsed() >= quiet {
                break;
            }
            if start_time.elapsed() >= timeout {
                if response.is_empty() {
                    return Err(ModbusError::Timeout { partial: response });
                }
                break;
            }

            match self.poll_read(&mut buffer)? {
                0 => tokio::task::yield_now().await,
                n => {
                    debug!("Raw data received: {} ({} bytes)", hex::encode_upper(&buffer[..n]), n);
                    response.extend_from_slice(&buffer[..n]);
                    last_byte_time = Instant::now();
                }
            }
        }

        Ok(response)
    }

    fn clear_input(&mut self) -> Result<(), ModbusError> {
        let port = self.port_mut()?;
        port.clear(ClearBuffer::Input)
            .map_err(|e| ModbusError::IoError(format!("Clear failed: {}", e)))
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("Serial port {} closed", self.port_name);
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Human-readable description of every serial port on the system.
pub fn available_ports() -> Result<Vec<String>, ModbusError> {
    let ports = serialport::available_ports()
        .map_err(|e| ModbusError::IoError(format!("Cannot enumerate serial ports: {}", e)))?;

    if ports.is_empty() {
        warn!("No serial ports found");
    }

    Ok(ports
        .into_iter()
        .map(|port| match port.port_type {
            SerialPortType::UsbPort(usb_info) => {
                let mut line = port.port_name;
                if let Some(manufacturer) = usb_info.manufacturer {
                    line.push_str(&format!(" ({})", manufacturer));
                }
                if let Some(serial_number) = usb_info.serial_number {
                    line.push_str(&format!(" [{}]", serial_number));
                }
                line
            }
            _ => port.port_name,
        })
        .collect())
}
