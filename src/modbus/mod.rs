pub mod codec;
pub mod crc;
pub mod protocol;
pub mod transaction;

pub use codec::{decode, encode, parse_line, parse_token, Frame, LogicalMessage};
pub use crc::crc16_modbus;
pub use protocol::{expected_response_len, FunctionCode};
pub use transaction::{Direction, PacketSink, TransactionEngine, TransactionResult, TransactionState};
