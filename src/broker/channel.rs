//! # Channel registry entry and its consumer task.
//!
//! Each channel owns a handler list and, while the broker runs, a bounded
//! queue drained by exactly one consumer task.
//!
//! ## What the consumer guarantees
//! - Messages of one channel are dispatched one at a time, in FIFO order.
//! - All handlers of a message run concurrently; the next message is taken
//!   only after every handler of the current one finished.
//! - Errors and panics inside handlers are caught, logged and counted
//!   (isolation); they never stop the consumer.
//! - Cancellation is observed only between messages: an in-flight dispatch
//!   always completes.
//!
//! ## Diagram
//! ```text
//!   rx.recv() ──► snapshot handlers ──► join_all([h1, h2, ... hN])
//!       ▲                                   │ Ok(None)      → consumed += 1
//!       │                                   │ Ok(Some(v))   → consumed += 1, auto-reply
//!       │                                   │ Err(e)        → errors += 1 (warn)
//!       │                                   │ panic         → errors += 1 (error)
//!       └───────────────────────────────────┘
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Message;
use super::stats::Stats;
use crate::error::HandlerError;
use crate::handlers::{HandlerRef, Sink};
use crate::lifecycle::panic_message;

/// Registry entry of one channel.
pub(crate) struct Channel {
    /// Shared with the consumer; new handlers are seen by the next message.
    pub(crate) handlers: Arc<RwLock<Vec<HandlerRef>>>,
    /// Present only while a consumer is running.
    pub(crate) queue: Option<mpsc::Sender<Message>>,
}

impl Channel {
    pub(crate) fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
            queue: None,
        }
    }

    pub(crate) fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Messages currently waiting in the queue.
    pub(crate) fn queued(&self) -> usize {
        self.queue
            .as_ref()
            .map_or(0, |tx| tx.max_capacity() - tx.capacity())
    }
}

/// State moved into a consumer task.
pub(crate) struct Consumer {
    pub(crate) channel: Arc<str>,
    pub(crate) handlers: Arc<RwLock<Vec<HandlerRef>>>,
    pub(crate) stats: Arc<Stats>,
    pub(crate) replies: Weak<dyn Sink>,
}

impl Consumer {
    /// Drains `rx` until the token is cancelled or every sender is gone.
    pub(crate) async fn run(self, mut rx: mpsc::Receiver<Message>, token: CancellationToken) {
        tracing::trace!(channel = %self.channel, "consumer started");
        loop {
            let msg = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };
            self.dispatch(msg).await;
        }
        tracing::trace!(channel = %self.channel, "consumer exited");
    }

    async fn dispatch(&self, msg: Message) {
        let handlers: Vec<HandlerRef> = self.handlers.read().clone();
        let msg = &msg;

        let outcomes = join_all(handlers.iter().map(|h| async move {
            let outcome = AssertUnwindSafe(h.handle(msg)).catch_unwind().await;
            (h, outcome)
        }))
        .await;

        for (handler, outcome) in outcomes {
            match outcome {
                Ok(Ok(reply)) => {
                    self.stats.consumed();
                    if let Some(value) = reply {
                        self.reply(msg, handler, value).await;
                    }
                }
                Ok(Err(err)) => {
                    self.stats.error();
                    tracing::warn!(
                        channel = %self.channel,
                        handler = handler.name(),
                        label = err.as_label(),
                        error = %err,
                        "handler failed"
                    );
                }
                Err(panic) => {
                    self.stats.error();
                    let err = HandlerError::Panicked {
                        info: panic_message(panic.as_ref()),
                    };
                    tracing::error!(
                        channel = %self.channel,
                        handler = handler.name(),
                        label = err.as_label(),
                        error = %err,
                        "handler panicked"
                    );
                }
            }
        }
    }

    /// Publishes a handler's return value to the requester, if any.
    async fn reply(&self, msg: &Message, handler: &HandlerRef, value: Value) {
        let Some((reply_to, correlation_id)) = msg.reply_route() else {
            return;
        };
        let Some(sink) = self.replies.upgrade() else {
            return;
        };

        let reply = Message::new(value).with_correlation_id(correlation_id);
        if let Err(err) = sink.publish_message(reply_to, reply).await {
            tracing::warn!(
                channel = %self.channel,
                handler = handler.name(),
                reply_to = %reply_to,
                error = %err,
                "auto-reply failed"
            );
        }
    }
}
