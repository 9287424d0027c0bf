//! Modbus RTU Message Sender
//!
//! Reads byte messages from a file or the command line, frames them with a
//! CRC-16/MODBUS checksum, sends them over a serial line and records the
//! responses. The pieces, leaves first: the frame codec in [`modbus`], the
//! serial [`transport`], the transaction engine in [`modbus::transaction`]
//! and the session runner in [`services`].

pub mod cli;
pub mod config;
pub mod modbus;
pub mod output;
pub mod services;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use modbus::transaction::{Direction, PacketSink, TransactionEngine, TransactionResult};
pub use modbus::{Frame, LogicalMessage};
pub use output::{ConsoleSender, FileSender, ResultSender};
pub use services::{FileSource, InlineSource, MessageSource, SessionOptions, SessionReport, SessionRunner};
pub use transport::{MockReply, MockTransport, SerialTransport, Transport};
pub use utils::error::{ErrorKind, ModbusError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
