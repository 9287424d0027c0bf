//! One request/response exchange over a [`Transport`].

use log::{debug, warn};
use std::fmt;
use std::time::{Duration, Instant};

use super::codec::{decode, encode, Frame, LogicalMessage};
use super::protocol::{expected_response_len, is_exception, EXCEPTION_RESPONSE_LEN, RESPONSE_HEADER_LEN};
use crate::transport::Transport;
use crate::utils::error::{ErrorKind, ModbusError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Tx,
    Rx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Tx => f.write_str("TX"),
            Direction::Rx => f.write_str("RX"),
        }
    }
}

/// Receives every raw frame put on or taken off the line, whatever the
/// outcome of the transaction.
pub trait PacketSink: Send {
    fn record(&mut self, direction: Direction, bytes: &[u8]);
}

/// In-memory record of frames, oldest first.
pub type PacketLog = Vec<(Direction, Vec<u8>)>;

impl PacketSink for PacketLog {
    fn record(&mut self, direction: Direction, bytes: &[u8]) {
        self.push((direction, bytes.to_vec()));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionResult {
    Success { sent: Frame, received: Frame },
    Failure { sent: Frame, reason: ModbusError },
}

impl TransactionResult {
    pub fn sent(&self) -> &Frame {
        match self {
            TransactionResult::Success { sent, .. } | TransactionResult::Failure { sent, .. } => sent,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TransactionResult::Success { .. })
    }

    /// Failure classification; `None` for a successful exchange.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            TransactionResult::Success { .. } => None,
            TransactionResult::Failure { reason, .. } => Some(reason.kind()),
        }
    }
}

/// Lifecycle of the transaction currently (or last) handled by the engine.
///
/// `Rejected` marks a message that could not be framed and never reached
/// the line; `Invalid` a response that arrived but failed validation;
/// `Abandoned` an exchange cut short by cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Encoding,
    Sending,
    AwaitingResponse,
    Decoding,
    Completed,
    TimedOut,
    TransportError,
    Invalid,
    Rejected,
    Abandoned,
}

pub struct TransactionEngine {
    response_timeout: Duration,
    quiet_period: Duration,
    state: TransactionState,
}

impl TransactionEngine {
    pub fn new(response_timeout: Duration, quiet_period: Duration) -> Self {
        Self {
            response_timeout,
            quiet_period,
            state: TransactionState::Idle,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    fn transition(&mut self, next: TransactionState) {
        debug!("Transaction state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run one exchange. No retries are attempted.
    ///
    /// With `skip_crc` the message bytes go out verbatim and the response
    /// is accepted without checksum validation. Returns `None` only when
    /// the exchange was abandoned because of cancellation.
    pub async fn execute(
        &mut self,
        transport: &mut dyn Transport,
        sink: &mut dyn PacketSink,
        message: &LogicalMessage,
        skip_crc: bool,
    ) -> Option<TransactionResult> {
        self.state = TransactionState::Idle;
        self.transition(TransactionState::Encoding);

        let sent = match frame_message(message, skip_crc) {
            Ok(frame) => frame,
            Err(reason) => {
                self.transition(TransactionState::Rejected);
                return Some(TransactionResult::Failure {
                    sent: Frame::raw(message.bytes().to_vec()),
                    reason,
                });
            }
        };

        self.transition(TransactionState::Sending);
        if let Err(e) = transport.clear_input() {
            warn!("Could not clear stale input: {}", e);
        }
        sink.record(Direction::Tx, &sent);
        if let Err(reason) = transport.write(&sent).await {
            self.transition(TransactionState::TransportError);
            return Some(TransactionResult::Failure { sent, reason });
        }

        self.transition(TransactionState::AwaitingResponse);
        let response = match expected_response_len(&sent) {
            Some(expected) => self.read_response(transport, expected).await,
            None => {
                transport
                    .read_until_idle(self.quiet_period, self.response_timeout)
                    .await
            }
        };

        let received = match response {
            Ok(bytes) => bytes,
            Err(reason) => {
                if !reason.partial().is_empty() {
                    sink.record(Direction::Rx, reason.partial());
                }
                return match reason {
                    ModbusError::Cancelled { .. } => {
                        self.transition(TransactionState::Abandoned);
                        None
                    }
                    ModbusError::Timeout { .. } => {
                        self.transition(TransactionState::TimedOut);
                        Some(TransactionResult::Failure { sent, reason })
                    }
                    _ => {
                        self.transition(TransactionState::TransportError);
                        Some(TransactionResult::Failure { sent, reason })
                    }
                };
            }
        };
        sink.record(Direction::Rx, &received);

        self.transition(TransactionState::Decoding);
        if !skip_crc {
            if let Err(reason) = decode(&received) {
                self.transition(TransactionState::Invalid);
                return Some(TransactionResult::Failure { sent, reason });
            }
        }

        self.transition(TransactionState::Completed);
        Some(TransactionResult::Success {
            sent,
            received: Frame::raw(received),
        })
    }

    /// Read a response of known length, switching to the short exception
    /// layout when the device flags an exception in the function byte.
    async fn read_response(
        &self,
        transport: &mut dyn Transport,
        expected: usize,
    ) -> Result<Vec<u8>, ModbusError> {
        let start_time = Instant::now();
        let mut response = transport
            .read_exact(RESPONSE_HEADER_LEN, self.response_timeout)
            .await?;

        let total = if is_exception(response[1]) {
            EXCEPTION_RESPONSE_LEN
        } else {
            expected
        };

        if total > response.len() {
            let remaining = self.response_timeout.saturating_sub(start_time.elapsed());
            match transport.read_exact(total - response.len(), remaining).await {
                Ok(tail) => response.extend(tail),
                Err(e) => return Err(prefixed(response, e)),
            }
        }

        Ok(response)
    }
}

fn frame_message(message: &LogicalMessage, skip_crc: bool) -> Result<Frame, ModbusError> {
    if skip_crc {
        if message.is_empty() {
            return Err(ModbusError::InvalidPayload("empty message".to_string()));
        }
        Ok(Frame::raw(message.bytes().to_vec()))
    } else {
        encode(message.bytes())
    }
}

/// Put already-received header bytes in front of an error's partial data.
fn prefixed(mut head: Vec<u8>, err: ModbusError) -> ModbusError {
    match err {
        ModbusError::Timeout { partial } => {
            head.extend(partial);
            ModbusError::Timeout { partial: head }
        }
        ModbusError::Cancelled { partial } => {
            head.extend(partial);
            ModbusError::Cancelled { partial: head }
        }
        other => other,
    }
}
