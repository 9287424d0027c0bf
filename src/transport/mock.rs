use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::Transport;
use crate::modbus::Frame;
use crate::utils::error::ModbusError;

/// What the simulated device does in answer to one written frame.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Put these bytes on the line.
    Respond(Vec<u8>),
    /// Stay silent; reads time out.
    Silence,
    /// Reads fail with an I/O error.
    ReadError(String),
    /// The write itself fails.
    WriteError(String),
}

/// Scripted in-memory transport for tests.
///
/// Every write consumes the next [`MockReply`]; once the script is
/// exhausted the fallback reply is used.
pub struct MockTransport {
    script: VecDeque<MockReply>,
    fallback: MockReply,
    line: VecDeque<u8>,
    read_error: Option<String>,
    written: Vec<Vec<u8>>,
    open: bool,
    cancel: Option<(usize, CancellationToken)>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            fallback: MockReply::Silence,
            line: VecDeque::new(),
            read_error: None,
            written: Vec::new(),
            open: true,
            cancel: None,
        }
    }

    pub fn with_replies(replies: impl IntoIterator<Item = MockReply>) -> Self {
        let mut transport = Self::new();
        transport.script.extend(replies);
        transport
    }

    /// Reply used after the script runs out.
    pub fn with_fallback(mut self, reply: MockReply) -> Self {
        self.fallback = reply;
        self
    }

    /// Cancel `token` when the `writes`-th frame is written; reads for that
    /// frame then report cancellation.
    pub fn cancel_on_write(mut self, writes: usize, token: CancellationToken) -> Self {
        self.cancel = Some((writes, token));
        self
    }

    /// Frames written so far, oldest first.
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|(_, token)| token.is_cancelled())
    }

    fn drain(&mut self, count: usize) -> Vec<u8> {
        let count = count.min(self.line.len());
        self.line.drain(..count).collect()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write(&mut self, frame: &Frame) -> Result<(), ModbusError> {
        if !self.open {
            return Err(ModbusError::IoError("port is closed".to_string()));
        }

        let reply = self.script.pop_front().unwrap_or_else(|| self.fallback.clone());
        if let MockReply::WriteError(message) = reply {
            return Err(ModbusError::IoError(message));
        }

        self.written.push(frame.to_vec());
        if let Some((writes, token)) = &self.cancel {
            if self.written.len() == *writes {
                token.cancel();
            }
        }

        self.line.clear();
        self.read_error = None;
        match reply {
            MockReply::Respond(bytes) => self.line.extend(bytes),
            MockReply::ReadError(message) => self.read_error = Some(message),
            MockReply::Silence | MockReply::WriteError(_) => {}
        }
        Ok(())
    }

    async fn read_exact(&mut self, expected: usize, _timeout: Duration) -> Result<Vec<u8>, ModbusError> {
        if let Some(message) = &self.read_error {
            return Err(ModbusError::IoError(message.clone()));
        }
        let partial = self.drain(expected);
        if self.cancelled() {
            return Err(ModbusError::Cancelled { partial });
        }
        if partial.len() < expected {
            return Err(ModbusError::Timeout { partial });
        }
        Ok(partial)
    }

    async fn read_until_idle(&mut self, _quiet: Duration, _timeout: Duration) -> Result<Vec<u8>, ModbusError> {
        if let Some(message) = &self.read_error {
            return Err(ModbusError::IoError(message.clone()));
        }
        let partial = self.drain(self.line.len());
        if self.cancelled() {
            return Err(ModbusError::Cancelled { partial });
        }
        if partial.is_empty() {
            return Err(ModbusError::Timeout { partial });
        }
        Ok(partial)
    }

    fn clear_input(&mut self) -> Result<(), ModbusError> {
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
