//! Retry policy for flaky collaborators.

use std::fmt::Display;
use std::time::Duration;

/// How often, and how patiently, to retry a fallible operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first (minimum 1).
    pub attempts: u32,
    /// Pause after a failed attempt.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// A policy that tries exactly once.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// `op` receives the 1-based attempt number, so callers can run
    /// recovery steps (such as a power cycle) before retrying. Blocks the
    /// calling thread between attempts.
    pub fn run<T, E, F>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        E: Display,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => {
                    tracing::error!("{} failed after {} attempts: {}", what, attempts, e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("{} failed (attempt {}/{}): {}", what, attempt, attempts, e);
                    std::thread::sleep(self.delay);
                    attempt += 1;
                }
            }
        }
    }
}
