//! Periodic delivery of the binding store to the collector
//!
//! Every cycle snapshots the store, serializes it once and POSTs it with up
//! to [`MAX_ATTEMPTS`] attempts, sleeping `attempt * 2` backoff units between
//! them. Failures never stop the loop. While the collector is unreachable the
//! log is kept quiet: the first failure is reported, then every 5th.

use crate::{
    cache::BindingStore,
    metrics::{LAST_REPORT_SUCCESS, REPORT_CONSECUTIVE_FAILURES, REPORTS_TOTAL},
    model::Report,
};
use chrono::Utc;
use futures::FutureExt;
use reqwest::{Client, StatusCode, Url, header::CONTENT_TYPE};
use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Delivery attempts per report cycle
pub const MAX_ATTEMPTS: u32 = 3;

/// One backoff unit, the wait after attempt `n` is `2 * n` units
pub const BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Why a single delivery attempt failed
#[derive(Debug, Error)]
pub enum DeliveryFailure {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("received non-success status code: {0}")]
    Status(StatusCode),
}

impl DeliveryFailure {
    /// Connection refused, DNS failure, unreachable network or timeout
    #[must_use]
    pub fn is_server_unavailable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_connect() || e.is_timeout(),
            Self::Status(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to marshal report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to create request: {0}")]
    Request(#[source] reqwest::Error),
    #[error("failed to send report after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: DeliveryFailure },
    #[error("report delivery cancelled")]
    Cancelled,
}

impl ReportError {
    #[must_use]
    pub fn is_server_unavailable(&self) -> bool {
        match self {
            Self::Exhausted { last, .. } => last.is_server_unavailable(),
            _ => false,
        }
    }
}

/// A report accepted by the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivered {
    pub status: StatusCode,
    pub attempts: u32,
    pub entries: usize,
}

/// How loudly to log an unavailable collector after `failures` failed cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnavailableLog {
    First,
    Periodic,
    Suppressed,
}

const fn unavailable_log(failures: u32, initial: bool) -> UnavailableLog {
    if initial || failures == 1 {
        UnavailableLog::First
    } else if failures % 5 == 0 {
        UnavailableLog::Periodic
    } else {
        UnavailableLog::Suppressed
    }
}

/// Wait before retrying after attempt number `attempt`
#[must_use]
pub fn backoff_delay(unit: Duration, attempt: u32) -> Duration {
    unit.saturating_mul(attempt.saturating_mul(2))
}

#[derive(Debug)]
pub struct Reporter {
    store: Arc<BindingStore>,
    client: Client,
    endpoint: Url,
    interval: Duration,
    backoff_unit: Duration,
    failure_count: u32,
}

impl Reporter {
    /// Build a reporter whose requests time out after `timeout`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(
        store: Arc<BindingStore>,
        endpoint: Url,
        interval: Duration,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            store,
            client,
            endpoint,
            interval,
            backoff_unit: BACKOFF_UNIT,
            failure_count: 0,
        })
    }

    #[must_use]
    pub const fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Failed cycles since the last successful delivery
    #[must_use]
    pub const fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Report immediately, then once per interval until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            interval = ?self.interval,
            endpoint = %self.endpoint,
            "starting HTTP reporter"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut initial = true;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // a panic inside one cycle must not stop reporting
            let cycle = AssertUnwindSafe(self.run_cycle(initial, &cancel))
                .catch_unwind()
                .await;
            if let Err(panic_info) = cycle {
                error!("panic in report cycle: {panic_info:?}");
            }
            initial = false;
        }

        info!("stopping HTTP reporter");
    }

    /// Send one report and update the failure bookkeeping
    ///
    /// # Errors
    ///
    /// Returns the cycle's [`ReportError`], already logged
    pub async fn run_cycle(
        &mut self,
        initial: bool,
        cancel: &CancellationToken,
    ) -> Result<Delivered, ReportError> {
        match self.send_report(cancel).await {
            Ok(delivered) => {
                self.failure_count = 0;
                REPORT_CONSECUTIVE_FAILURES.set(0);
                REPORTS_TOTAL.with_label_values(&["success"]).inc();
                LAST_REPORT_SUCCESS.set(Utc::now().timestamp());
                info!(
                    endpoint = %self.endpoint,
                    status = delivered.status.as_u16(),
                    ingress_count = delivered.entries,
                    "report sent successfully"
                );
                Ok(delivered)
            }
            Err(ReportError::Cancelled) => {
                debug!("report cycle cancelled");
                Err(ReportError::Cancelled)
            }
            Err(e) => {
                self.handle_report_error(&e, initial);
                Err(e)
            }
        }
    }

    fn handle_report_error(&mut self, err: &ReportError, initial: bool) {
        self.failure_count = self.failure_count.saturating_add(1);
        REPORT_CONSECUTIVE_FAILURES.set(i64::from(self.failure_count));
        REPORTS_TOTAL.with_label_values(&["error"]).inc();

        if err.is_server_unavailable() {
            match unavailable_log(self.failure_count, initial) {
                UnavailableLog::First => {
                    info!(endpoint = %self.endpoint, "waiting for report server to be available");
                }
                UnavailableLog::Periodic => debug!(
                    failures = self.failure_count,
                    endpoint = %self.endpoint,
                    "report server still unavailable"
                ),
                UnavailableLog::Suppressed => trace!(
                    endpoint = %self.endpoint,
                    "report server not reachable, will retry"
                ),
            }
            return;
        }

        match err {
            ReportError::Exhausted { attempts, .. } => warn!(
                error = %err,
                endpoint = %self.endpoint,
                attempts,
                initial,
                "failed to send report after retries"
            ),
            _ if initial => error!(error = %err, "failed to send initial report"),
            _ => error!(error = %err, "failed to send periodic report"),
        }
    }

    /// Snapshot the store and deliver it, retrying up to [`MAX_ATTEMPTS`] times
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Cancelled`] as soon as `cancel` fires, otherwise
    /// the reason delivery failed.
    pub async fn send_report(&self, cancel: &CancellationToken) -> Result<Delivered, ReportError> {
        let report = Report {
            cluster: self.store.cluster_name().to_string(),
            entries: self.store.snapshot().await,
        };
        let body = serde_json::to_vec(&report)?;
        let entries = report.entries.len();

        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(ReportError::Cancelled);
            }

            let request = self
                .client
                .post(self.endpoint.clone())
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());

            let result = tokio::select! {
                () = cancel.cancelled() => return Err(ReportError::Cancelled),
                result = request.send() => result,
            };

            let failure = match result {
                Ok(response) if response.status().is_success() => {
                    return Ok(Delivered {
                        status: response.status(),
                        attempts: attempt,
                        entries,
                    });
                }
                Ok(response) => DeliveryFailure::Status(response.status()),
                Err(e) if e.is_builder() => return Err(ReportError::Request(e)),
                Err(e) => DeliveryFailure::Transport(e),
            };

            if attempt >= MAX_ATTEMPTS {
                return Err(ReportError::Exhausted {
                    attempts: attempt,
                    last: failure,
                });
            }

            let backoff = backoff_delay(self.backoff_unit, attempt);
            if failure.is_server_unavailable() {
                trace!(attempt, ?backoff, error = %failure, "report server not reachable");
            } else {
                debug!(attempt, ?backoff, error = %failure, "retrying after failed delivery");
            }

            tokio::select! {
                () = cancel.cancelled() => return Err(ReportError::Cancelled),
                () = time::sleep(backoff) => {}
            }

            attempt += 1;
        }
    }
}
