use clap::{Arg, ArgAction, Command};
use log::info;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, InputSource};
use crate::modbus::codec::encode;
use crate::modbus::transaction::TransactionEngine;
use crate::output::senders::{print_frames, ConsoleSender, FileSender, LogPacketSink, ResultSender};
use crate::services::{FileSource, InlineSource, MessageSource, SessionOptions, SessionReport, SessionRunner};
use crate::transport::{available_ports, SerialTransport, Transport};
use crate::utils::error::ModbusError;

pub fn build_cli() -> Command {
    Command::new("modbus-sender")
        .version(crate::VERSION)
        .about("Communicate with devices through serial using Modbus protocol.")
        .arg(
            Arg::new("message")
                .short('m')
                .long("message")
                .value_name("BYTES")
                .help("message to send"),
        )
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("PATH")
                .help("path to file where to get messages to send (if '-m' is provided, this argument is ignored)"),
        )
        .arg(
            Arg::new("destination")
                .short('d')
                .long("destination")
                .value_name("PATH")
                .help("destination file for responses. Optional, if not provided the responses are printed on the console"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("DEVICE")
                .help("serial port to use"),
        )
        .arg(
            Arg::new("baudrate")
                .short('b')
                .long("baudrate")
                .value_name("BAUD")
                .help("baud rate (default 9600)"),
        )
        .arg(
            Arg::new("parity")
                .long("parity")
                .value_name("PARITY")
                .value_parser(["none", "even", "odd"])
                .help("parity bit (default none)"),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_name("MS")
                .help("response timeout in milliseconds (default 1000)"),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .value_name("MS")
                .help("pause between passes in continuous mode (default 50)"),
        )
        .arg(
            Arg::new("continuous")
                .short('c')
                .long("continuous")
                .action(ArgAction::SetTrue)
                .help("send messages continuously"),
        )
        .arg(
            Arg::new("skip-crc")
                .short('s')
                .long("skip-crc")
                .action(ArgAction::SetTrue)
                .help("send messages as given, without appending or checking a CRC"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("print sent messages"),
        )
        .arg(
            Arg::new("crc")
                .long("crc")
                .action(ArgAction::SetTrue)
                .help("only build and print the framed messages, do not transmit"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("TOML configuration file; command-line options take precedence"),
        )
        .arg(
            Arg::new("list-ports")
                .long("list-ports")
                .action(ArgAction::SetTrue)
                .help("list available serial ports and exit"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .value_parser(["error", "warn", "info", "debug", "trace"])
                .help("diagnostic log level (default warn, or RUST_LOG)"),
        )
}

pub fn list_ports() -> Result<(), ModbusError> {
    let ports = available_ports()?;
    println!("Available Serial Ports:");
    if ports.is_empty() {
        println!("   No serial ports found");
    }
    for (index, port) in ports.iter().enumerate() {
        println!("   {}. {}", index + 1, port);
    }
    Ok(())
}

pub fn message_source(input: &InputSource) -> Box<dyn MessageSource> {
    match input {
        InputSource::Inline(text) => Box::new(InlineSource::new(text.clone())),
        InputSource::File(path) => Box::new(FileSource::new(path)),
    }
}

/// Frame every message of the source and print it without opening a port.
pub fn crc_only(config: &Config, source: &dyn MessageSource) -> Result<(), ModbusError> {
    let batch = source.load()?;
    let mut frames = Vec::with_capacity(batch.messages.len());

    for message in &batch.messages {
        if config.skip_crc {
            frames.push(Ok(message.bytes().to_vec()));
        } else {
            frames.push(encode(message.bytes()).map(|frame| frame.into_bytes()));
        }
    }

    print_frames(&mut std::io::stdout(), &batch.errors, &frames)
}

/// Open the port, run the session and release the port whatever the
/// outcome.
pub async fn send_messages(
    config: &Config,
    source: &dyn MessageSource,
    cancel: CancellationToken,
) -> Result<SessionReport, ModbusError> {
    let mut senders: Vec<Box<dyn ResultSender>> = vec![Box::new(ConsoleSender::stdout(config.verbose))];
    if let Some(destination) = &config.destination {
        info!("Writing responses to {}", destination.display());
        senders.push(Box::new(FileSender::new(destination)));
    }

    let mut transport = SerialTransport::open(
        &config.serial_port,
        config.baud_rate,
        &config.parity,
        config.timeout_ms,
    )?
    .with_cancellation(cancel.clone());

    let engine = TransactionEngine::new(config.timeout(), config.quiet_period());
    let options = SessionOptions {
        continuous: config.continuous,
        interval: config.interval(),
        skip_crc: config.skip_crc,
    };
    let mut runner = SessionRunner::new(engine, options, cancel);
    let mut sink = LogPacketSink;

    let report = runner
        .run(source, &mut transport, &mut sink, &mut senders)
        .await;

    transport.close();
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_flags_default_to_off() {
        let matches = build_cli().try_get_matches_from(["modbus-sender", "-m", "0x01"]).unwrap();
        assert!(!matches.get_flag("continuous"));
        assert!(!matches.get_flag("crc"));
        assert_eq!(matches.get_one::<String>("message").map(String::as_str), Some("0x01"));
    }

    #[test]
    fn test_unknown_parity_is_rejected_by_parser() {
        let result = build_cli().try_get_matches_from(["modbus-sender", "--parity", "mark"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_crc_only_does_not_need_a_port() {
        let config = Config::default();
        let source = InlineSource::new("0x01 0x03 0x00 0x00 0x00 0x01");
        assert!(crc_only(&config, &source).is_ok());
    }
}
