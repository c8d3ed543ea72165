// src/source/retry.rs

//! Retry policy and shared request governor for catalog reads.

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Instant;

use crate::error::{AppError, Result};
use crate::models::{RetryConfig, SourceConfig};

/// Bounded exponential backoff for one logical read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Retry without waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Delay after the `failures`-th consecutive failure (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Every attempt passes through `governor`; a transient failure pushes
    /// the governor's next slot back so all workers slow down together.
    pub async fn run<T, F, Fut>(&self, governor: &Governor, context: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut failures = 0;
        loop {
            let result = {
                let _permit = governor.acquire().await?;
                op().await
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && failures + 1 < self.max_attempts => {
                    failures += 1;
                    let delay = self.delay_for(failures);
                    log::warn!(
                        "{}: attempt {}/{} failed: {}. Retrying in {:?}",
                        context,
                        failures,
                        self.max_attempts,
                        e,
                        delay
                    );
                    governor.back_off(delay);
                }
                Err(e) => {
                    if e.is_transient() {
                        log::error!(
                            "{}: giving up after {} attempts: {}",
                            context,
                            self.max_attempts,
                            e
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Rate limiter shared by every worker talking to the catalog.
///
/// Caps requests in flight and spaces request starts by a minimum interval.
#[derive(Debug)]
pub struct Governor {
    permits: Semaphore,
    spacing: Duration,
    next_slot: Mutex<Instant>,
    issued: AtomicUsize,
}

impl Governor {
    pub fn new(max_concurrent: usize, spacing: Duration) -> Self {
        Self {
            permits: Semaphore::new(max_concurrent.max(1)),
            spacing,
            next_slot: Mutex::new(Instant::now()),
            issued: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(
            config.max_concurrent,
            Duration::from_millis(config.request_delay_ms),
        )
    }

    /// No spacing and no practical concurrency cap.
    pub fn unlimited() -> Self {
        Self::new(usize::from(u16::MAX), Duration::ZERO)
    }

    /// Wait for a request slot.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        let wait = {
            let now = Instant::now();
            let mut next = self
                .next_slot
                .lock()
                .map_err(|_| AppError::source("governor", "slot lock poisoned"))?;
            let start = (*next).max(now);
            *next = start + self.spacing;
            start - now
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| AppError::source("governor", e))?;
        self.issued.fetch_add(1, Ordering::Relaxed);
        Ok(permit)
    }

    /// Delay every subsequent request start by at least `delay` from now.
    pub fn back_off(&self, delay: Duration) {
        if let Ok(mut next) = self.next_slot.lock() {
            let until = Instant::now() + delay;
            if until > *next {
                *next = until;
            }
        }
    }

    /// Requests started so far.
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::Relaxed)
    }
}
