//! Bounded retry with a pluggable backoff shape.
//!
//! Every bring-up step retries with its own ceiling and pacing. One policy
//! type covers them all: attempt counts and delays come from config, and
//! the loop sleeps between attempts but not after the last.

use std::time::Duration;

use crate::error::Result;

/// Delay shape between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Re-attempt immediately.
    None,
    /// Constant delay between attempts.
    Fixed(Duration),
    /// Ramped delay: (attempt + 1) × step, attempt counted from 0.
    LinearRamp(Duration),
}

impl Backoff {
    /// Delay to insert after failed attempt number `attempt` (0-based).
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        match self {
            Backoff::None => None,
            Backoff::Fixed(d) => Some(*d),
            Backoff::LinearRamp(step) => Some(*step * (attempt + 1)),
        }
    }
}

/// A bounded retry budget: ceiling plus pacing.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn immediate(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts,
            backoff: Backoff::None,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    pub fn ramped(max_attempts: u32, step: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            backoff: Backoff::LinearRamp(step),
        }
    }
}

/// Run `op` up to the policy's ceiling, sleeping per the backoff shape
/// between attempts. Non-retryable errors propagate immediately; the last
/// attempt's error propagates when the budget is exhausted.
pub fn retry<T>(policy: RetryPolicy, mut op: impl FnMut(u32) -> Result<T>) -> Result<T> {
    debug_assert!(policy.max_attempts > 0);
    let mut attempt = 0;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if !err.retryable() => return Err(err),
            Err(err) => {
                if attempt + 1 >= policy.max_attempts {
                    return Err(err);
                }
                if let Some(delay) = policy.backoff.delay_after(attempt) {
                    std::thread::sleep(delay);
                }
                attempt += 1;
            }
        }
    }
}
