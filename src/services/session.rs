use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::source::MessageSource;
use crate::modbus::transaction::{PacketSink, TransactionEngine, TransactionResult};
use crate::output::senders::ResultSender;
use crate::transport::Transport;
use crate::utils::error::ModbusError;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub continuous: bool,
    pub interval: Duration,
    pub skip_crc: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            continuous: false,
            interval: Duration::from_millis(50),
            skip_crc: false,
        }
    }
}

/// Everything a session produced, in transmission order.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub results: Vec<TransactionResult>,
    pub passes: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SessionReport {
    fn start() -> Self {
        let now = Utc::now();
        Self {
            results: Vec::new(),
            passes: 0,
            cancelled: false,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn successes(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.results.len() - self.successes()
    }
}

pub struct SessionRunner {
    engine: TransactionEngine,
    options: SessionOptions,
    cancel: CancellationToken,
}

impl SessionRunner {
    pub fn new(engine: TransactionEngine, options: SessionOptions, cancel: CancellationToken) -> Self {
        Self {
            engine,
            options,
            cancel,
        }
    }

    /// Send every message of `source` in order, once, or repeatedly in
    /// continuous mode until the cancellation token fires.
    ///
    /// Transaction failures are recorded and never stop the session. A
    /// source that cannot be read on the first pass, or a sender that
    /// cannot write, aborts it.
    pub async fn run(
        &mut self,
        source: &dyn MessageSource,
        transport: &mut dyn Transport,
        sink: &mut dyn PacketSink,
        senders: &mut [Box<dyn ResultSender>],
    ) -> Result<SessionReport, ModbusError> {
        let mut report = SessionReport::start();
        info!("Starting session from {}", source.describe());

        loop {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let batch = match source.load() {
                Ok(batch) => batch,
                Err(e) if report.passes == 0 => return Err(e),
                Err(e) => {
                    warn!("Skipping pass {}: {}", report.passes + 1, e);
                    if !self.wait_interval().await {
                        report.cancelled = true;
                        break;
                    }
                    continue;
                }
            };

            for sender in senders.iter_mut() {
                sender.begin_pass()?;
                for (line, error) in &batch.errors {
                    sender.parse_error(*line, error)?;
                }
            }

            for message in &batch.messages {
                if self.cancel.is_cancelled() {
                    break;
                }

                let result = match self
                    .engine
                    .execute(transport, sink, message, self.options.skip_crc)
                    .await
                {
                    Some(result) => result,
                    None => {
                        warn!("Transaction for line {} abandoned on cancellation", message.line());
                        break;
                    }
                };

                for sender in senders.iter_mut() {
                    if let Err(e) = sender.send(&result) {
                        warn!("{} sender failed: {}", sender.sender_type(), e);
                        return Err(e);
                    }
                }
                report.results.push(result);
            }

            report.passes += 1;
            debug!("Pass {} finished, {} result(s) so far", report.passes, report.results.len());

            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if !self.options.continuous {
                break;
            }
            if !self.wait_interval().await {
                report.cancelled = true;
                break;
            }
        }

        report.finished_at = Utc::now();
        info!(
            "Session finished: {} pass(es), {} succeeded, {} failed{}",
            report.passes,
            report.successes(),
            report.failures(),
            if report.cancelled { " (cancelled)" } else { "" }
        );
        Ok(report)
    }

    /// Sleep between passes; `false` if cancelled meanwhile.
    async fn wait_interval(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.options.interval) => true,
        }
    }
}
