//! RTU framing: CRC append/verify and parsing of textual byte messages.

use std::fmt;
use std::ops::Deref;

use super::crc::{crc16_modbus, crc_bytes};
use crate::utils::error::ModbusError;

/// Minimum decodable frame: one payload byte plus the two CRC bytes.
pub const MIN_FRAME_LEN: usize = 3;

/// Maximum RTU frame size on the wire.
pub const MAX_FRAME_LEN: usize = 256;

/// Payload bytes of one message, before framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalMessage {
    bytes: Vec<u8>,
    line: usize,
}

impl LogicalMessage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, line: 0 }
    }

    /// Attach the 1-based source line the message was parsed from.
    pub fn with_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Bytes as they travel on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame(Vec<u8>);

impl Frame {
    /// Wrap bytes verbatim, without computing a checksum.
    pub fn raw(bytes: Vec<u8>) -> Self {
        Frame(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Frame(bytes)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(&self.0))
    }
}

/// Append the CRC-16/MODBUS checksum, low byte first.
pub fn encode(payload: &[u8]) -> Result<Frame, ModbusError> {
    if payload.is_empty() {
        return Err(ModbusError::InvalidPayload("empty message".to_string()));
    }
    if payload.len() + 2 > MAX_FRAME_LEN {
        return Err(ModbusError::InvalidPayload(format!(
            "{} bytes exceeds the {} byte frame limit",
            payload.len(),
            MAX_FRAME_LEN - 2
        )));
    }

    let mut frame = Vec::with_capacity(payload.len() + 2);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&crc_bytes(payload));
    Ok(Frame(frame))
}

/// Verify the trailing checksum and return the payload.
pub fn decode(raw: &[u8]) -> Result<Vec<u8>, ModbusError> {
    if raw.len() < MIN_FRAME_LEN {
        return Err(ModbusError::TooShort { len: raw.len() });
    }

    let data_len = raw.len() - 2;
    let received = u16::from_le_bytes([raw[data_len], raw[data_len + 1]]);
    let expected = crc16_modbus(&raw[..data_len]);

    if received != expected {
        return Err(ModbusError::ChecksumMismatch { expected, received });
    }

    Ok(raw[..data_len].to_vec())
}

/// Parse one byte literal: `0xNN` hex or plain decimal.
pub fn parse_token(token: &str, position: usize) -> Result<u8, ModbusError> {
    let parsed = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(digits) if digits.bytes().all(|b| b.is_ascii_hexdigit()) => u8::from_str_radix(digits, 16).ok(),
        Some(_) => None,
        None if token.bytes().all(|b| b.is_ascii_digit()) => token.parse::<u8>().ok(),
        None => None,
    };
    parsed.ok_or_else(|| ModbusError::parse(position, token))
}

/// Parse one line of a message source.
///
/// Blank lines and `#` comments produce `Ok(None)`. Token positions in
/// errors are 1-based.
pub fn parse_line(line: &str, line_number: usize) -> Result<Option<LogicalMessage>, ModbusError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let bytes = trimmed
        .split_whitespace()
        .enumerate()
        .map(|(index, token)| parse_token(token, index + 1))
        .collect::<Result<Vec<u8>, _>>()?;

    Ok(Some(LogicalMessage::new(bytes).with_line(line_number)))
}
