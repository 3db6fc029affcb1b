//! Retrying statement executor
//!
//! Runs a database operation under a bounded retry policy:
//! - transient (connectivity / timeout class) failures are retried
//! - structural failures are returned immediately
//! - the caller's cancellation stops retries and in-flight attempts

use crate::errors::{AppError, Result};
use crate::metrics;
use backoff::backoff::Backoff;
use sea_orm::{ConnAcquireErr, ConnectionTrait, DbErr, ExecResult, QueryResult, RuntimeErr, Statement};
use std::future::{pending, Future};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Bounded retry policy: `attempts` tries, waiting `delay * backoff^(n-1)` before the n-th retry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
    backoff: f64,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration, backoff: f64) -> Result<Self> {
        if attempts == 0 {
            return Err(AppError::Configuration {
                message: "retry attempts must be at least 1".to_string(),
            });
        }
        if !backoff.is_finite() || backoff < 1.0 {
            return Err(AppError::Configuration {
                message: format!("retry backoff must be a finite multiplier >= 1, got {}", backoff),
            });
        }

        Ok(Self { attempts, delay, backoff })
    }

    /// Single attempt, no waiting
    pub fn no_retry() -> Self {
        Self { attempts: 1, delay: Duration::ZERO, backoff: 1.0 }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn backoff(&self) -> f64 {
        self.backoff
    }

    /// Fresh delay schedule for one operation
    pub fn schedule(&self) -> RetrySchedule {
        RetrySchedule { policy: *self, retries: 0 }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 3, delay: Duration::from_millis(100), backoff: 2.0 }
    }
}

/// Delay schedule of a [`RetryPolicy`]; yields `None` once every attempt is used
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    policy: RetryPolicy,
    retries: u32,
}

impl Backoff for RetrySchedule {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries + 1 >= self.policy.attempts {
            return None;
        }
        let factor = self.policy.backoff.powi(self.retries.min(i32::MAX as u32) as i32);
        self.retries += 1;
        Some(scaled_delay(self.policy.delay, factor))
    }

    fn reset(&mut self) {
        self.retries = 0;
    }
}

/// Ceiling for a single backoff sleep
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// `delay * factor`, saturating at [`MAX_RETRY_DELAY`]
fn scaled_delay(delay: Duration, factor: f64) -> Duration {
    if delay.is_zero() {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor)
        .map_or(MAX_RETRY_DELAY, |scaled| scaled.min(MAX_RETRY_DELAY))
}

/// Caller-side cancellation: an explicit signal, a deadline, or both
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    signal: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Fires the [`Cancellation`] it was created with
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Cancellation {
    /// Never fires
    pub fn none() -> Self {
        Self::default()
    }

    /// Cancellation controlled through the returned handle
    pub fn channel() -> (CancelHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, Self { signal: Some(rx), deadline: None })
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self { signal: None, deadline: Some(deadline) }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Tighten (never relax) the deadline
    pub fn and_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn is_cancelled(&self) -> bool {
        let signalled = self.signal.as_ref().map(|rx| *rx.borrow()).unwrap_or(false);
        let expired = self.deadline.map(|d| Instant::now() >= d).unwrap_or(false);
        signalled || expired
    }

    /// Resolves once cancelled; pending forever otherwise
    pub async fn cancelled(&self) {
        let signal = async {
            match self.signal.clone() {
                Some(mut rx) => {
                    let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
                    if closed {
                        // handle dropped without cancelling
                        pending::<()>().await;
                    }
                }
                None => pending::<()>().await,
            }
        };

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            _ = signal => {}
            _ = deadline => {}
        }
    }
}

/// Whether a database error is worth retrying
pub fn is_transient(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(ConnAcquireErr::Timeout) |
        DbErr::ConnectionAcquire(ConnAcquireErr::ConnectionClosed) => true,
        DbErr::Conn(_) => true,
        DbErr::Exec(RuntimeErr::SqlxError(e)) | DbErr::Query(RuntimeErr::SqlxError(e)) => {
            is_transient_sqlx(e)
        }
        _ => false,
    }
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) |
        sqlx::Error::Tls(_) |
        sqlx::Error::Protocol(_) |
        sqlx::Error::PoolTimedOut |
        sqlx::Error::PoolClosed |
        sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db.code().map(|c| is_transient_sqlstate(&c)).unwrap_or(false),
        _ => false,
    }
}

/// Connection exceptions, server shutdown, too many connections, statement timeout
fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "53300" | "57P01" | "57P02" | "57P03" | "57014")
}

/// Runs statements under a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct Executor {
    policy: RetryPolicy,
}

impl Executor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Drive `attempt` until it succeeds, fails structurally, exhausts the policy, or is cancelled
    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        cancel: &Cancellation,
        mut attempt: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, DbErr>>,
    {
        let mut schedule = self.policy.schedule();
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                metrics::record_db_operation(operation, "cancelled", None);
                return Err(AppError::Cancelled { operation });
            }

            attempts += 1;
            let started = Instant::now();

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    metrics::record_db_operation(operation, "cancelled", None);
                    return Err(AppError::Cancelled { operation });
                }
                outcome = attempt() => outcome,
            };
            let elapsed = started.elapsed();

            let err = match outcome {
                Ok(value) => {
                    debug!(operation, attempts, elapsed_ms = elapsed.as_millis() as u64, "Statement executed");
                    metrics::record_db_operation(operation, "ok", Some(elapsed));
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !is_transient(&err) {
                metrics::record_db_operation(operation, "error", Some(elapsed));
                return Err(AppError::Store { operation, source: err });
            }

            let Some(delay) = schedule.next_backoff() else {
                warn!(operation, attempts, error = %err, "Retries exhausted");
                metrics::record_db_operation(operation, "exhausted", Some(elapsed));
                return Err(AppError::RetriesExhausted { operation, attempts, source: err });
            };

            warn!(
                operation,
                attempt = attempts,
                max_attempts = self.policy.attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient database failure, retrying"
            );
            metrics::record_db_retry(operation);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    metrics::record_db_operation(operation, "cancelled", None);
                    return Err(AppError::Cancelled { operation });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Run a statement expected to return at most one row
    pub async fn query_one<C: ConnectionTrait>(
        &self,
        operation: &'static str,
        cancel: &Cancellation,
        conn: &C,
        stmt: Statement,
    ) -> Result<Option<QueryResult>> {
        self.run(operation, cancel, || conn.query_one(stmt.clone())).await
    }

    pub async fn query_all<C: ConnectionTrait>(
        &self,
        operation: &'static str,
        cancel: &Cancellation,
        conn: &C,
        stmt: Statement,
    ) -> Result<Vec<QueryResult>> {
        self.run(operation, cancel, || conn.query_all(stmt.clone())).await
    }

    /// Run a statement for its affected-row count
    pub async fn execute<C: ConnectionTrait>(
        &self,
        operation: &'static str,
        cancel: &Cancellation,
        conn: &C,
        stmt: Statement,
    ) -> Result<ExecResult> {
        self.run(operation, cancel, || conn.execute(stmt.clone())).await
    }
}
