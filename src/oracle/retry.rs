use std::fmt;
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RATE_LIMIT_BACKOFF_MS: u64 = 2000;
const DEFAULT_TRANSIENT_BACKOFF_MS: u64 = 1000;

/// Blocking pause between attempts; swapped for a recorder in tests.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Classified failure of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// HTTP 429; retried after the rate-limit backoff.
    RateLimited(String),
    /// Timeouts, transport failures, 5xx; retried after the transient backoff.
    Transient(String),
    /// Anything else; never retried.
    Fatal(String),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::RateLimited(msg) => write!(f, "rate limited: {msg}"),
            AttemptError::Transient(msg) | AttemptError::Fatal(msg) => f.write_str(msg),
        }
    }
}

/// Bounded retry with fixed backoff per failure class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub rate_limit_backoff: Duration,
    pub transient_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            rate_limit_backoff: Duration::from_millis(DEFAULT_RATE_LIMIT_BACKOFF_MS),
            transient_backoff: Duration::from_millis(DEFAULT_TRANSIENT_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Run `op` until it succeeds, fails fatally, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub fn run<T, F>(&self, sleeper: &dyn Sleeper, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> std::result::Result<T, AttemptError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let backoff = match op(attempt) {
                Ok(value) => return Ok(value),
                Err(AttemptError::Fatal(msg)) => return Err(Error::Oracle(msg)),
                Err(e @ AttemptError::RateLimited(_)) => {
                    let backoff = self.rate_limit_backoff;
                    last_error = Some(e);
                    backoff
                }
                Err(e @ AttemptError::Transient(_)) => {
                    let backoff = self.transient_backoff;
                    last_error = Some(e);
                    backoff
                }
            };

            if attempt < max_attempts {
                warn!(
                    attempt,
                    max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %last_error.as_ref().map(ToString::to_string).unwrap_or_default(),
                    "retrying repair oracle after transient error"
                );
                sleeper.sleep(backoff);
            }
        }

        Err(Error::Oracle(format!(
            "all {max_attempts} attempt(s) failed; last error: {}",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}
