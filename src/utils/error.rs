use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModbusError {
    #[error("Invalid token '{token}' at position {position}")]
    ParseError { position: usize, token: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Serial port unavailable: {0}")]
    PortUnavailable(String),

    #[error("Timeout occurred ({} bytes received)", .partial.len())]
    Timeout { partial: Vec<u8> },

    #[error("CRC checksum mismatch (expected 0x{expected:04X}, received 0x{received:04X})")]
    ChecksumMismatch { expected: u16, received: u16 },

    #[error("Response too short: {len} bytes")]
    TooShort { len: usize },

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Cancelled")]
    Cancelled { partial: Vec<u8> },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Classification of a failed transaction, as carried by a
/// [`TransactionResult`](crate::modbus::transaction::TransactionResult).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    InvalidPayload,
    PortUnavailable,
    Timeout,
    ChecksumMismatch,
    TooShort,
    Io,
    Cancelled,
    Config,
}

impl ModbusError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModbusError::ParseError { .. } => ErrorKind::Parse,
            ModbusError::InvalidPayload(_) => ErrorKind::InvalidPayload,
            ModbusError::PortUnavailable(_) => ErrorKind::PortUnavailable,
            ModbusError::Timeout { .. } => ErrorKind::Timeout,
            ModbusError::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            ModbusError::TooShort { .. } => ErrorKind::TooShort,
            ModbusError::IoError(_) => ErrorKind::Io,
            ModbusError::Cancelled { .. } => ErrorKind::Cancelled,
            ModbusError::ConfigError(_) => ErrorKind::Config,
        }
    }

    /// Bytes received before the error, if any.
    pub fn partial(&self) -> &[u8] {
        match self {
            ModbusError::Timeout { partial } | ModbusError::Cancelled { partial } => partial,
            _ => &[],
        }
    }

    pub fn parse(position: usize, token: impl Into<String>) -> Self {
        ModbusError::ParseError {
            position,
            token: token.into(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Parse => "ParseError",
            ErrorKind::InvalidPayload => "InvalidPayload",
            ErrorKind::PortUnavailable => "PortUnavailable",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::ChecksumMismatch => "ChecksumMismatch",
            ErrorKind::TooShort => "TooShort",
            ErrorKind::Io => "IOError",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Config => "ConfigError",
        };
        f.write_str(name)
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => ModbusError::Timeout {
                partial: Vec::new(),
            },
            _ => ModbusError::IoError(err.to_string()),
        }
    }
}

impl From<toml::de::Error> for ModbusError {
    fn from(err: toml::de::Error) -> Self {
        ModbusError::ConfigError(format!("TOML error: {}", err))
    }
}
