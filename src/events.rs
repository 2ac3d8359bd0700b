//! Progress notifications from long-running operations.
//!
//! An operation owns an [`EventSink`] and pushes events into a bounded queue;
//! the caller drains the matching [`EventStream`] on its own task. Sends wait
//! for queue space instead of dropping events, unless the sink is bound to a
//! [`Context`] that gets canceled. The stream ends once the operation drops
//! its sink.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::context::Context;
use crate::error::{CtlError, ErrorKind};
use crate::replace::{ReplacePhase, ReplacementTarget};
use crate::status::{ClusterStatusResult, Divergence};

/// Queue capacity used by the CLI.
pub const DEFAULT_EVENT_CAPACITY: usize = 10;

/// Event type categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Progress,
    Status,
    Error,
    Completion,
}

/// Structured data attached to an event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Final aggregated cluster status.
    ClusterStatus(ClusterStatusResult),
    /// Two members disagree about one node.
    Divergence(Divergence),
    /// A replacement entered a new phase.
    Phase {
        phase: ReplacePhase,
        target: Option<ReplacementTarget>,
    },
}

/// Error information carried on an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&CtlError> for EventError {
    fn from(err: &CtlError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// A single notification.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<EventPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EventError>,
}

impl Event {
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            message: message.into(),
            payload: None,
            error: None,
        }
    }

    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_error(mut self, err: &CtlError) -> Self {
        self.error = Some(err.into());
        self
    }
}

/// Create a bounded event queue.
pub fn channel(capacity: usize) -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        EventSink {
            tx: Some(tx),
            ctx: None,
        },
        EventStream { rx },
    )
}

/// Producer half of an event queue.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<mpsc::Sender<Event>>,
    ctx: Option<Context>,
}

impl EventSink {
    /// A sink that discards everything.
    pub fn discard() -> Self {
        Self { tx: None, ctx: None }
    }

    /// Stop waiting for queue space once `ctx` is canceled.
    ///
    /// Events that do not fit after cancellation are dropped, leaving the
    /// operation to fail at its next cancellation check.
    pub fn bound_to(mut self, ctx: &Context) -> Self {
        self.ctx = Some(ctx.clone());
        self
    }

    /// Send an event, waiting for queue space.
    ///
    /// A consumer that went away is not an operation failure; the event is
    /// dropped and the operation carries on.
    pub async fn send(&self, event: Event) {
        let Some(tx) = &self.tx else {
            return;
        };
        let delivered = match &self.ctx {
            Some(ctx) => tokio::select! {
                biased;
                sent = tx.send(event) => sent.is_ok(),
                _ = ctx.done() => {
                    debug!("Context canceled while the event queue is full, dropping event");
                    return;
                }
            },
            None => tx.send(event).await.is_ok(),
        };
        if !delivered {
            debug!("Event consumer closed, dropping event");
        }
    }

    pub async fn progress(&self, message: impl Into<String>) {
        self.send(Event::new(EventKind::Progress, message)).await;
    }

    pub async fn status(&self, message: impl Into<String>, payload: EventPayload) {
        self.send(Event::new(EventKind::Status, message).with_payload(payload))
            .await;
    }

    pub async fn error(&self, message: impl Into<String>, err: &CtlError) {
        self.send(Event::new(EventKind::Error, message).with_error(err))
            .await;
    }

    pub async fn completion(&self, message: impl Into<String>, payload: Option<EventPayload>) {
        let mut event = Event::new(EventKind::Completion, message);
        event.payload = payload;
        self.send(event).await;
    }
}

/// Consumer half of an event queue.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<Event>,
}

impl EventStream {
    /// Next event, or `None` once every sink has been dropped and the queue is empty.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Drain the stream to its end.
    pub async fn collect(mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            events.push(event);
        }
        events
    }
}
