//! Exponential backoff with jitter for outbound calls.
//!
//! An operation is retried until it succeeds, returns [Error::Permanent], or the policy's
//! elapsed-time budget would be exceeded by the next sleep. When the budget runs out, the last
//! error is returned unchanged.

use rand::Rng;
use serde::Deserialize;
use std::{fmt::Display, future::Future, time::Duration};
use tokio::time::Instant;
use tracing::debug;

/// Outcome of a failed attempt.
#[derive(Debug)]
pub enum Error<E> {
    /// The attempt may succeed if repeated.
    Transient(E),
    /// Repeating the attempt cannot help.
    Permanent(E),
}

impl<E> Error<E> {
    pub fn permanent(err: E) -> Self {
        Self::Permanent(err)
    }

    pub fn into_inner(self) -> E {
        match self {
            Self::Transient(err) | Self::Permanent(err) => err,
        }
    }
}

impl<E> From<E> for Error<E> {
    fn from(err: E) -> Self {
        Self::Transient(err)
    }
}

/// Backoff parameters.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Delay before the first retry.
    pub initial_ms: u64,
    /// Upper bound on any single delay (before jitter).
    pub max_interval_ms: u64,
    /// Growth factor applied after each retry.
    pub multiplier: f64,
    /// Each delay is drawn uniformly from `[d * (1 - r), d * (1 + r)]`.
    pub randomization: f64,
    /// Total time budget for all attempts. `None` retries until the caller drops the future.
    pub max_elapsed_secs: Option<u64>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            initial_ms: 500,
            max_interval_ms: 60_000,
            multiplier: 1.5,
            randomization: 0.5,
            max_elapsed_secs: Some(15 * 60),
        }
    }
}

impl Policy {
    /// Returns the nominal (un-jittered) delay before retry number `retry` (starting at 0).
    fn interval(&self, retry: u32) -> Duration {
        let max = self.max_interval_ms as f64;
        let scaled = self.initial_ms as f64 * self.multiplier.max(1.0).powi(retry as i32);
        Duration::from_millis(scaled.min(max) as u64)
    }

    /// Applies jitter to a nominal delay.
    fn jitter(&self, interval: Duration, rng: &mut impl Rng) -> Duration {
        let r = self.randomization.clamp(0.0, 1.0);
        if r == 0.0 || interval.is_zero() {
            return interval;
        }
        let millis = interval.as_millis() as f64;
        let delta = millis * r;
        Duration::from_millis(rng.gen_range((millis - delta)..=(millis + delta)) as u64)
    }

    /// Runs `operation` until it succeeds, fails permanently, or the time budget is spent.
    pub async fn retry<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error<E>>>,
        E: Display,
    {
        let start = Instant::now();
        let deadline = self
            .max_elapsed_secs
            .map(|secs| start + Duration::from_secs(secs));
        let mut retries = 0u32;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(Error::Permanent(err)) => return Err(err),
                Err(Error::Transient(err)) => err,
            };

            // Stop if the next attempt would start past the deadline
            let delay = self.jitter(self.interval(retries), &mut rand::thread_rng());
            if let Some(deadline) = deadline {
                if Instant::now() + delay > deadline {
                    return Err(err);
                }
            }
            retries = retries.saturating_add(1);
            debug!(retries, ?delay, error = %err, "retrying operation");
            tokio::time::sleep(delay).await;
        }
    }
}
