use crate::modbus::transaction::TransactionResult;

/// Separator between the sent and received halves of an exchange line.
pub const EXCHANGE_SEPARATOR: &str = "    ->    ";

/// `0x01 - 0x03 - 0x00` style rendering of raw bytes.
pub fn format_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("0x{:02X}", b))
        .collect::<Vec<_>>()
        .join(" - ")
}

/// Received bytes, or `Error: <message>` for a failed exchange.
pub fn format_outcome(result: &TransactionResult) -> String {
    match result {
        TransactionResult::Success { received, .. } => format_bytes(received),
        TransactionResult::Failure { reason, .. } => format!("Error: {}", reason),
    }
}

/// One destination-file line, without the trailing newline.
pub fn format_exchange(result: &TransactionResult) -> String {
    format!(
        "{}{}{}",
        format_bytes(result.sent()),
        EXCHANGE_SEPARATOR,
        format_outcome(result)
    )
}
