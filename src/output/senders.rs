use colored::Colorize;
use log::{debug, error, info};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::formatters::{format_bytes, format_exchange};
use crate::modbus::transaction::{Direction, PacketSink, TransactionResult};
use crate::utils::error::ModbusError;

/// Destination for the outcome of each transaction.
pub trait ResultSender: Send {
    /// Called before the first transaction of every pass.
    fn begin_pass(&mut self) -> Result<(), ModbusError> {
        Ok(())
    }

    fn send(&mut self, result: &TransactionResult) -> Result<(), ModbusError>;

    /// A source line that could not be turned into a message.
    fn parse_error(&mut self, _line: usize, _error: &ModbusError) -> Result<(), ModbusError> {
        Ok(())
    }

    fn sender_type(&self) -> &str;
}

/// Prints `TX`/`RX` lines, the way an operator watches the bus.
pub struct ConsoleSender {
    out: Box<dyn Write + Send>,
    verbose: bool,
}

impl ConsoleSender {
    pub fn new(out: Box<dyn Write + Send>, verbose: bool) -> Self {
        Self { out, verbose }
    }

    pub fn stdout(verbose: bool) -> Self {
        Self::new(Box::new(std::io::stdout()), verbose)
    }
}

impl ResultSender for ConsoleSender {
    fn send(&mut self, result: &TransactionResult) -> Result<(), ModbusError> {
        if self.verbose {
            writeln!(self.out, "{}: {}", Direction::Tx, format_bytes(result.sent()))?;
        }
        match result {
            TransactionResult::Success { received, .. } => {
                writeln!(self.out, "\t{}: {}", Direction::Rx, format_bytes(received))?;
            }
            TransactionResult::Failure { reason, .. } => {
                writeln!(self.out, "{}", format!("Error: {}", reason).red())?;
            }
        }
        self.out.flush()?;
        Ok(())
    }

    fn parse_error(&mut self, line: usize, error: &ModbusError) -> Result<(), ModbusError> {
        writeln!(self.out, "{}", format!("Error: line {}: {}", line, error).red())?;
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "console"
    }
}

/// Writes one exchange line per transaction. The file is truncated at the
/// start of every pass so it always mirrors the latest cycle.
pub struct FileSender {
    file_path: PathBuf,
    file: Option<File>,
}

impl FileSender {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
            file: None,
        }
    }

    fn open_error(&self, e: std::io::Error) -> ModbusError {
        error!("Failed to open file {}: {}", self.file_path.display(), e);
        ModbusError::IoError(format!("File open error: {}: {}", self.file_path.display(), e))
    }
}

impl ResultSender for FileSender {
    fn begin_pass(&mut self) -> Result<(), ModbusError> {
        let file = File::create(&self.file_path).map_err(|e| self.open_error(e))?;
        debug!("Destination file {} truncated", self.file_path.display());
        self.file = Some(file);
        Ok(())
    }

    fn send(&mut self, result: &TransactionResult) -> Result<(), ModbusError> {
        if self.file.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.file_path)
                .map_err(|e| self.open_error(e))?;
            self.file = Some(file);
        }

        if let Some(file) = self.file.as_mut() {
            writeln!(file, "{}", format_exchange(result)).map_err(|e| {
                error!("Failed to write to file {}: {}", self.file_path.display(), e);
                ModbusError::IoError(format!("File write error: {}", e))
            })?;
        }
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "file"
    }
}

/// Forwards raw frames to the `log` facade at debug level.
#[derive(Debug, Default)]
pub struct LogPacketSink;

impl PacketSink for LogPacketSink {
    fn record(&mut self, direction: Direction, bytes: &[u8]) {
        debug!("{} ({} bytes): {}", direction, bytes.len(), hex::encode_upper(bytes));
    }
}

/// Frames built in CRC-only mode, printed without touching the line.
///
/// Source lines that failed to parse come first, in the same form the
/// console uses during a session.
pub fn print_frames<W: Write>(
    out: &mut W,
    parse_errors: &[(usize, ModbusError)],
    frames: &[Result<Vec<u8>, ModbusError>],
) -> Result<(), ModbusError> {
    for (line, error) in parse_errors {
        writeln!(out, "{}", format!("Error: line {}: {}", line, error).red())?;
    }
    for frame in frames {
        match frame {
            Ok(bytes) => writeln!(out, "{}: {}", Direction::Tx, format_bytes(bytes))?,
            Err(e) => writeln!(out, "{}", format!("Error: {}", e).red())?,
        }
    }
    info!("Built {} frame(s) without transmitting", frames.len());
    Ok(())
}
