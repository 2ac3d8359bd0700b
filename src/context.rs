//! Cooperative cancellation for operations.
//!
//! A [`Context`] is handed to every operation. Blocking points (API calls,
//! command execution, poll sleeps) race their work against [`Context::done`]
//! so a canceled operation stops at the next wait instead of running on.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{CtlError, Result};

/// Cancellation signal plus an optional deadline.
///
/// Clones, and contexts derived with [`Context::with_timeout`], share one
/// cancellation signal.
#[derive(Debug, Clone)]
pub struct Context {
    canceled: Arc<watch::Sender<bool>>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is only canceled explicitly.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            canceled: Arc::new(tx),
            deadline: None,
        }
    }

    /// Derive a context that also expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            canceled: Arc::clone(&self.canceled),
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
        }
    }

    /// Cancel every operation using this context.
    pub fn cancel(&self) {
        if !self.canceled.send_replace(true) {
            info!("Context canceled");
        }
    }

    pub fn is_canceled(&self) -> bool {
        *self.canceled.borrow() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the context is canceled or its deadline passes.
    pub async fn done(&self) -> CtlError {
        let mut rx = self.canceled.subscribe();
        let canceled = async move {
            loop {
                let canceled_now = *rx.borrow_and_update();
                if canceled_now {
                    break;
                }
                // The sender lives as long as `self`, so this only fails on teardown.
                if rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = canceled => CtlError::Canceled("context canceled".to_string()),
                _ = tokio::time::sleep_until(deadline) => {
                    CtlError::Canceled("context deadline exceeded".to_string())
                }
            },
            None => {
                canceled.await;
                CtlError::Canceled("context canceled".to_string())
            }
        }
    }

    /// Run `fut` unless the context is canceled first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            res = fut => res,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancels a context when the process receives a termination signal.
pub struct SignalHandler {
    ctx: Context,
}

impl SignalHandler {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Wait for SIGINT or SIGTERM, then cancel.
    #[cfg(unix)]
    pub async fn run(self) {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                self.ctx.cancel();
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
        self.ctx.cancel();
    }

    /// Wait for Ctrl-C, then cancel.
    #[cfg(not(unix))]
    pub async fn run(self) {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C");
        }
        self.ctx.cancel();
    }
}
