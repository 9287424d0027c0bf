//! Integration tests for the message sender
//!
//! Drive the public API end to end with a scripted transport: file-backed
//! sources, destination files and the command-line binary.

use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use modbus_sender::modbus::transaction::PacketLog;
use modbus_sender::modbus::{crc16_modbus, encode};
use modbus_sender::services::MessageBatch;
use modbus_sender::*;

fn runner(continuous: bool, cancel: CancellationToken) -> SessionRunner {
    let engine = TransactionEngine::new(Duration::from_millis(50), Duration::from_millis(5));
    let options = SessionOptions {
        continuous,
        interval: Duration::from_millis(1),
        skip_crc: false,
    };
    SessionRunner::new(engine, options, cancel)
}

fn reply(payload: &[u8]) -> MockReply {
    MockReply::Respond(encode(payload).unwrap().into_bytes())
}

#[test]
fn test_reference_frame() {
    let frame = encode(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]).unwrap();
    assert_eq!(frame.as_bytes(), &[0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A]);
    assert_eq!(crc16_modbus(&frame), 0);
}

#[tokio::test]
async fn test_file_session_writes_destination() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("messages.txt");
    let output = dir.path().join("responses.txt");
    std::fs::write(
        &input,
        "# read one register\n\n0x01 0x03 0x00 0x00 0x00 0x01\n0x01 0x06 0x00 0x01 0x00 0x03\n",
    )
    .unwrap();

    let mut transport = MockTransport::with_replies([
        reply(&[0x01, 0x03, 0x02, 0x00, 0x2A]),
        MockReply::Silence,
    ]);
    let mut packets = PacketLog::new();
    let mut senders: Vec<Box<dyn ResultSender>> = vec![Box::new(FileSender::new(&output))];

    let report = runner(false, CancellationToken::new())
        .run(&FileSource::new(&input), &mut transport, &mut packets, &mut senders)
        .await
        .unwrap();

    assert_eq!(report.results.len(), 2);
    assert_eq!(report.successes(), 1);
    assert_eq!(report.results[1].error_kind(), Some(ErrorKind::Timeout));

    let content = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(
        lines,
        vec![
            "0x01 - 0x03 - 0x00 - 0x00 - 0x00 - 0x01 - 0x84 - 0x0A    ->    0x01 - 0x03 - 0x02 - 0x00 - 0x2A - 0x39 - 0x9B",
            "0x01 - 0x06 - 0x00 - 0x01 - 0x00 - 0x03 - 0x98 - 0x0B    ->    Error: Timeout occurred (0 bytes received)",
        ]
    );

    // Every attempt reaches the packet sink, replies included.
    let directions: Vec<Direction> = packets.iter().map(|(d, _)| *d).collect();
    assert_eq!(directions, vec![Direction::Tx, Direction::Rx, Direction::Tx]);
}

/// Serves a different message on every load, like a file edited between
/// passes.
struct ChangingSource {
    loads: AtomicUsize,
}

impl MessageSource for ChangingSource {
    fn load(&self) -> Result<MessageBatch, ModbusError> {
        let pass = self.loads.fetch_add(1, Ordering::SeqCst) as u8;
        Ok(MessageBatch::parse(&format!("{} 0x06 0x00 0x01 0x00 0x01", pass + 1)))
    }

    fn describe(&self) -> String {
        "changing source".to_string()
    }
}

#[tokio::test]
async fn test_continuous_session_rereads_source_each_pass() {
    let source = ChangingSource { loads: AtomicUsize::new(0) };
    let cancel = CancellationToken::new();
    let mut transport = MockTransport::new()
        .with_fallback(MockReply::Silence)
        .cancel_on_write(4, cancel.clone());
    let mut packets = PacketLog::new();
    let mut senders: Vec<Box<dyn ResultSender>> = Vec::new();

    let report = runner(true, cancel)
        .run(&source, &mut transport, &mut packets, &mut senders)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.results.len(), 3);
    let addresses: Vec<u8> = transport.written().iter().map(|frame| frame[0]).collect();
    assert_eq!(addresses, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_cancellation_from_another_task() {
    let cancel = CancellationToken::new();
    let source = InlineSource::new("0x01 0x03 0x00 0x00 0x00 0x01");
    let mut transport = MockTransport::new().with_fallback(reply(&[0x01, 0x03, 0x02, 0x00, 0x2A]));
    let mut packets = PacketLog::new();
    let mut senders: Vec<Box<dyn ResultSender>> = Vec::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        runner(true, cancel).run(&source, &mut transport, &mut packets, &mut senders),
    )
    .await
    .expect("session did not stop after cancellation")
    .unwrap();

    assert!(report.cancelled);
    assert!(report.passes >= 1);
    assert_eq!(report.results.len(), report.passes);
    assert!(report.results.iter().all(|r| r.is_success()));
}

#[tokio::test]
async fn test_unreadable_source_aborts_before_sending() {
    let mut transport = MockTransport::new();
    let mut packets = PacketLog::new();
    let mut senders: Vec<Box<dyn ResultSender>> = Vec::new();

    let result = runner(false, CancellationToken::new())
        .run(&FileSource::new("/nonexistent/messages.txt"), &mut transport, &mut packets, &mut senders)
        .await;

    assert!(matches!(result, Err(ModbusError::IoError(_))));
    assert!(transport.written().is_empty());
}

#[test]
fn test_binary_requires_message_or_file() {
    let output = Command::new(env!("CARGO_BIN_EXE_modbus-sender"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("You must provide a message or a file"));
}

#[test]
fn test_binary_reports_missing_file() {
    let output = Command::new(env!("CARGO_BIN_EXE_modbus-sender"))
        .args(["-f", "definitely-missing.txt"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("definitely-missing.txt' does not exist"));
}

#[test]
fn test_binary_crc_mode_prints_frames() {
    let output = Command::new(env!("CARGO_BIN_EXE_modbus-sender"))
        .args(["--crc", "-m", "0x01 0x03 0x00 0x00 0x00 0x01"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "TX: 0x01 - 0x03 - 0x00 - 0x00 - 0x00 - 0x01 - 0x84 - 0x0A"
    );
}

#[test]
fn test_binary_fails_when_port_cannot_be_opened() {
    let output = Command::new(env!("CARGO_BIN_EXE_modbus-sender"))
        .args(["-m", "0x01 0x03 0x00 0x00 0x00 0x01", "-p", "/dev/no-such-serial-port"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Serial port unavailable"));
}

#[test]
fn test_binary_crc_mode_reports_bad_line_as_input_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_modbus-sender"))
        .args(["--crc", "-m", "0x01 0xZZ"])
        .output()
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("Error: line 1: "));
    assert!(!stdout.contains("Configuration error"));
}
