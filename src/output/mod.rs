pub mod formatters;
pub mod senders;

pub use formatters::{format_bytes, format_exchange};
pub use senders::{ConsoleSender, FileSender, LogPacketSink, ResultSender};
