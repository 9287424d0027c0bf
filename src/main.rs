use anyhow::Result;
use colored::Colorize;
use log::{debug, info};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

use modbus_sender::cli::commands::{self, build_cli};
use modbus_sender::utils::error::ModbusError;
use modbus_sender::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let mut cli = build_cli();
    let matches = cli.get_matches_mut();

    let default_level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("warn");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    if matches.get_flag("list-ports") {
        return report(commands::list_ports().map_err(Into::into));
    }

    let config = match Config::from_matches(&matches) {
        Ok(config) => config,
        Err(e) => cli.error(clap::error::ErrorKind::InvalidValue, red(&e)).exit(),
    };
    let input = match config.input_source() {
        Ok(input) => input,
        Err(e) => cli.error(clap::error::ErrorKind::MissingRequiredArgument, red(&e)).exit(),
    };
    let source = commands::message_source(&input);

    if config.crc_only {
        return report(commands::crc_only(&config, source.as_ref()).map_err(Into::into));
    }

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!();
            info!("Interrupt received, stopping after the current transaction");
            watcher.cancel();
        }
    });

    let outcome = commands::send_messages(&config, source.as_ref(), cancel).await;
    report(outcome.map(|session| {
        debug!(
            "Session ran from {} to {}",
            session.started_at.format("%Y-%m-%d %H:%M:%S%.3f"),
            session.finished_at.format("%Y-%m-%d %H:%M:%S%.3f")
        );
    }).map_err(Into::into))
}

fn red(err: &ModbusError) -> String {
    err.to_string().red().to_string()
}

fn report(outcome: Result<()>) -> ExitCode {
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.to_string().red());
            ExitCode::FAILURE
        }
    }
}
