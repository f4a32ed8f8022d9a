//! Background delivery of spooled items to the downstream relay

use std::io;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error, info, warn};

use crate::smtp::SmtpClient;
use crate::spool::{ItemId, RetryState, SpoolError, SpoolStore};

/// Opens connections to the downstream relay
pub trait Connector: Send + Sync {
    fn connect(&self) -> io::Result<TcpStream>;
}

/// Connects to a fixed host and port, trying every resolved address
#[derive(Debug, Clone)]
pub struct TcpConnector {
    pub host: String,
    pub port: u16,
}

impl TcpConnector {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_owned(),
            port,
        }
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> io::Result<TcpStream> {
        TcpStream::connect((self.host.as_str(), self.port))
    }
}

/// When failed items are tried again, and when they are given up on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait after the first failure; doubled after each further failure
    pub base: Duration,
    /// Upper bound for the wait
    pub max: Duration,
    /// Failures after which an item is quarantined; 0 retries forever
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(60),
            max: Duration::from_secs(3600),
            max_attempts: 20,
        }
    }
}

impl RetryPolicy {
    /// Try every item again on every pass, forever
    pub fn every_pass() -> Self {
        Self {
            base: Duration::ZERO,
            max: Duration::ZERO,
            max_attempts: 0,
        }
    }

    /// How long to wait after `attempts` failures
    pub fn backoff(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        2u32.checked_pow(attempts - 1)
            .and_then(|factor| self.base.checked_mul(factor))
            .unwrap_or(self.max)
            .min(self.max)
    }

    pub fn is_due(&self, retry: &RetryState, now: DateTime<Utc>) -> bool {
        let Some(last) = retry.last_attempt else {
            return true;
        };
        TimeDelta::from_std(self.backoff(retry.attempts))
            .ok()
            .and_then(|wait| last.checked_add_signed(wait))
            .is_some_and(|due| now >= due)
    }

    pub fn is_exhausted(&self, retry: &RetryState) -> bool {
        self.max_attempts != 0 && retry.attempts >= self.max_attempts
    }
}

/// What one delivery pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub delivered: usize,
    pub failed: usize,
    /// Items skipped because their backoff had not elapsed
    pub deferred: usize,
    pub quarantined: usize,
}

impl PassReport {
    pub fn is_idle(&self) -> bool {
        *self == PassReport::default()
    }
}

/// Drains a spool into the downstream relay
pub struct DeliveryAgent {
    spool: Arc<dyn SpoolStore>,
    connector: Box<dyn Connector>,
    hostname: String,
    policy: RetryPolicy,
    interval: Duration,
}

impl DeliveryAgent {
    /// Default delay between passes
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);

    pub fn new(spool: Arc<dyn SpoolStore>, connector: Box<dyn Connector>, hostname: &str) -> Self {
        Self {
            spool,
            connector,
            hostname: hostname.to_owned(),
            policy: RetryPolicy::default(),
            interval: Self::DEFAULT_INTERVAL,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run passes forever on a dedicated thread
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("spool-delivery".to_string())
            .spawn(move || self.run_forever())
    }

    /// Sleep, run a pass, repeat. Errors end the pass, never the loop.
    pub fn run_forever(&self) {
        info!(interval = ?self.interval, "spool delivery started");
        loop {
            thread::sleep(self.interval);
            match self.run_pass() {
                Ok(report) if report.is_idle() => {}
                Ok(report) => info!(
                    delivered = report.delivered,
                    failed = report.failed,
                    deferred = report.deferred,
                    quarantined = report.quarantined,
                    "delivery pass finished"
                ),
                Err(e) => error!("can't scan spool: {e}"),
            }
        }
    }

    /// Attempt every pending item once.
    ///
    /// Only the listing happens under the spool's lock; loading, sending
    /// and removal of each item do not.
    pub fn run_pass(&self) -> Result<PassReport, SpoolError> {
        let mut report = PassReport::default();
        let now = Utc::now();

        for item in self.spool.list_pending()? {
            if !self.policy.is_due(&item.retry, now) {
                report.deferred += 1;
                continue;
            }

            debug!(id = %item.id, "processing spool item");
            match self.deliver(&item.id) {
                Ok(()) => match self.spool.remove_by_id(&item.id) {
                    Ok(()) => {
                        info!(id = %item.id, "delivered");
                        report.delivered += 1;
                    }
                    Err(e) => error!(id = %item.id, "delivered but not removed: {e}"),
                },
                Err(SpoolError::NotFound(_)) => {
                    warn!(id = %item.id, "spool item vanished before delivery");
                }
                Err(e) => {
                    warn!(id = %item.id, "delivery failed: {e}");
                    report.failed += 1;
                    if self.note_failure(&item.id) {
                        report.quarantined += 1;
                    }
                }
            }
        }
        Ok(report)
    }

    fn deliver(&self, id: &ItemId) -> Result<(), SpoolError> {
        let message = self.spool.load(id)?;
        let stream = self.connector.connect()?;
        SmtpClient::from_tcp(stream, &self.hostname)?.send(&message)?;
        Ok(())
    }

    /// Record a failed attempt; returns whether the item was quarantined
    fn note_failure(&self, id: &ItemId) -> bool {
        let retry = match self.spool.record_failure(id, Utc::now()) {
            Ok(retry) => retry,
            Err(e) => {
                error!(%id, "can't record failed attempt: {e}");
                return false;
            }
        };
        if !self.policy.is_exhausted(&retry) {
            return false;
        }

        match self.spool.quarantine(id) {
            Ok(()) => {
                error!(%id, attempts = retry.attempts, "giving up on spool item");
                true
            }
            Err(e) => {
                error!(%id, "can't quarantine spool item: {e}");
                false
            }
        }
    }
}
