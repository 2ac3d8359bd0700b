//! Fixed-delay polling with an injectable clock.
//!
//! Convergence phases drive a [`Poller`] explicitly:
//!
//! ```ignore
//! let mut poller = Poller::new(&clock, &ctx, interval, deadline, "pod readiness");
//! loop {
//!     poller.tick().await?;
//!     if sample().await? {
//!         break;
//!     }
//! }
//! ```
//!
//! The first tick returns immediately, so the first sample is taken without
//! delay. Every later tick sleeps one interval (clamped to the deadline) and
//! fails with a timeout once the deadline has been reached.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::context::Context;
use crate::error::{CtlError, Result};

/// Source of time for polling loops.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock that advances only when slept on.
///
/// Sleeping moves the clock forward by the requested duration and yields to
/// the scheduler, so simulated timeouts elapse without real waiting.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Virtual time passed since creation.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }

    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

/// One polling loop's schedule.
pub struct Poller<'a, C: Clock + ?Sized> {
    clock: &'a C,
    ctx: &'a Context,
    interval: Duration,
    deadline: Instant,
    started: Instant,
    what: String,
    samples: u32,
}

impl<'a, C: Clock + ?Sized> Poller<'a, C> {
    pub fn new(
        clock: &'a C,
        ctx: &'a Context,
        interval: Duration,
        deadline: Instant,
        what: impl Into<String>,
    ) -> Self {
        Self {
            clock,
            ctx,
            interval,
            deadline,
            started: clock.now(),
            what: what.into(),
            samples: 0,
        }
    }

    /// Wait until the next sample is due.
    pub async fn tick(&mut self) -> Result<()> {
        if self.ctx.is_canceled() {
            return Err(self.ctx.done().await);
        }

        if self.samples > 0 {
            let now = self.clock.now();
            if now >= self.deadline {
                return Err(CtlError::Timeout {
                    what: self.what.clone(),
                    after: now.duration_since(self.started),
                });
            }

            let wait = self.interval.min(self.deadline - now);
            tokio::select! {
                biased;
                err = self.ctx.done() => return Err(err),
                _ = self.clock.sleep(wait) => {}
            }
        }

        self.samples += 1;
        Ok(())
    }

    /// Samples taken so far.
    pub fn samples(&self) -> u32 {
        self.samples
    }
}
