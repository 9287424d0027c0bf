use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::modbus::codec::{parse_line, LogicalMessage};
use crate::utils::error::ModbusError;

/// Messages parsed from one read of a source, plus the lines that failed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MessageBatch {
    pub messages: Vec<LogicalMessage>,
    /// `(line number, error)` for every malformed line.
    pub errors: Vec<(usize, ModbusError)>,
}

impl MessageBatch {
    /// Parse text with one message per line.
    pub fn parse(text: &str) -> Self {
        let mut batch = MessageBatch::default();
        for (index, line) in text.lines().enumerate() {
            let line_number = index + 1;
            match parse_line(line, line_number) {
                Ok(Some(message)) => batch.messages.push(message),
                Ok(None) => {}
                Err(e) => {
                    warn!("Skipping line {}: {}", line_number, e);
                    batch.errors.push((line_number, e));
                }
            }
        }
        batch
    }
}

/// Something that yields the messages of a session, read afresh on every
/// pass.
pub trait MessageSource: Send + Sync {
    fn load(&self) -> Result<MessageBatch, ModbusError>;

    fn describe(&self) -> String;
}

/// A single message given on the command line.
#[derive(Debug, Clone)]
pub struct InlineSource {
    text: String,
}

impl InlineSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl MessageSource for InlineSource {
    fn load(&self) -> Result<MessageBatch, ModbusError> {
        Ok(MessageBatch::parse(&self.text))
    }

    fn describe(&self) -> String {
        "inline message".to_string()
    }
}

/// A text file, one message per line; `#` lines and blank lines are skipped.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl MessageSource for FileSource {
    fn load(&self) -> Result<MessageBatch, ModbusError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            ModbusError::IoError(format!("Cannot read {}: {}", self.path.display(), e))
        })?;
        let batch = MessageBatch::parse(&content);
        debug!(
            "Loaded {} message(s) from {} ({} malformed line(s))",
            batch.messages.len(),
            self.path.display(),
            batch.errors.len()
        );
        Ok(batch)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
