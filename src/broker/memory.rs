//! # MemoryBroker: in-process broker with request/reply.
//!
//! [`MemoryBroker`] keeps every channel in a concurrent map. While running,
//! each channel has a bounded queue and one consumer task (see the
//! [`channel`](super::channel) module for dispatch semantics).
//!
//! ## Lifecycle
//! ```text
//!   new() ──► idle ──start()──► running ──stop()──► idle ──start()──► ...
//!                      │                   │
//!                      │                   ├─ cancel token, drop queues and pending requests
//!                      │                   └─ join consumers within cfg.grace, abort the rest
//!                      └─ spawn one consumer per known channel
//! ```
//!
//! - Channels created while running get their consumer immediately.
//! - Statistics survive `stop()`; queued messages do not.
//! - `publish`/`request` on an idle broker fail with [`BrokerError::NotRunning`].
//!
//! ## Locking
//! The lifecycle mutex is always taken before a channel map entry, and
//! neither is held across an `.await`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use serde_json::{Value, json};
//! use scopebus::{Broker, BrokerConfig, HandlerError, HandlerFn, MemoryBroker, Message};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = MemoryBroker::new(BrokerConfig::default());
//!     broker.subscriber("math.double", HandlerFn::arc(|msg: Message| async move {
//!         let n = msg.payload["n"].as_i64().unwrap_or_default();
//!         Ok::<Option<Value>, HandlerError>(Some(json!(n * 2)))
//!     }))?;
//!
//!     broker.start().await?;
//!     let answer = broker
//!         .request("math.double", json!({"n": 21}), Duration::from_millis(500))
//!         .await?;
//!     assert_eq!(answer, json!(42));
//!     broker.stop().await?;
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::channel::{Channel, Consumer};
use super::stats::{ChannelStats, Stats, StatsSnapshot};
use super::{Broker, Message, REPLY_PREFIX};
use crate::config::{Backpressure, BrokerConfig};
use crate::error::BrokerError;
use crate::handlers::{HandlerDescriptor, HandlerRef, Publisher, Sink};
use crate::lifecycle;

/// In-process broker. Cloning is cheap and yields a handle to the same broker.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

/// Consumer tasks of one running period.
struct Workers {
    token: CancellationToken,
    runtime: Handle,
    handles: Vec<(Arc<str>, JoinHandle<()>)>,
}

struct Inner {
    id: Uuid,
    reply_channel: String,
    cfg: BrokerConfig,
    channels: DashMap<Arc<str>, Channel>,
    running: AtomicBool,
    lifecycle: Mutex<Option<Workers>>,
    pending: DashMap<String, oneshot::Sender<Value>>,
    stats: Arc<Stats>,
    this: Weak<Inner>,
}

/// Removes a pending request slot however `request` exits.
struct PendingGuard<'a> {
    pending: &'a DashMap<String, oneshot::Sender<Value>>,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.id);
    }
}

impl MemoryBroker {
    /// Creates an idle broker.
    pub fn new(cfg: BrokerConfig) -> Self {
        let id = Uuid::new_v4();
        let inner = Arc::new_cyclic(|this| Inner {
            id,
            reply_channel: format!("{REPLY_PREFIX}{id}"),
            cfg,
            channels: DashMap::new(),
            running: AtomicBool::new(false),
            lifecycle: Mutex::new(None),
            pending: DashMap::new(),
            stats: Arc::new(Stats::default()),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Unique id of this broker instance.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Private channel replies to this broker's requests are published on.
    pub fn reply_channel(&self) -> &str {
        &self.inner.reply_channel
    }

    /// Configuration this broker was built with.
    pub fn config(&self) -> &BrokerConfig {
        &self.inner.cfg
    }

    /// [`Broker::request`] with [`BrokerConfig::request_timeout`].
    pub async fn request_default(
        &self,
        channel: &str,
        payload: Value,
    ) -> Result<Value, BrokerError> {
        self.request(channel, payload, self.inner.cfg.request_timeout).await
    }

    /// Starts the broker, awaits `body`, and stops the broker on every exit path.
    ///
    /// A panic inside `body` is re-raised after the broker has stopped. A
    /// failing stop is returned as the error.
    pub async fn run_scoped<Fut, T>(&self, body: Fut) -> Result<T, BrokerError>
    where
        Fut: Future<Output = T>,
    {
        self.start().await?;
        lifecycle::guarded(body, || self.stop()).await
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

impl Inner {
    /// Creates the queue and consumer for `channel`, returning the sender.
    fn spawn_consumer(
        &self,
        name: &Arc<str>,
        channel: &mut Channel,
        workers: &mut Workers,
    ) -> mpsc::Sender<Message> {
        let (tx, rx) = mpsc::channel(self.cfg.queue_capacity());
        channel.queue = Some(tx.clone());

        let replies: Weak<dyn Sink> = self.this.clone();
        let consumer = Consumer {
            channel: Arc::clone(name),
            handlers: Arc::clone(&channel.handlers),
            stats: Arc::clone(&self.stats),
            replies,
        };
        let handle = workers
            .runtime
            .spawn(consumer.run(rx, workers.token.child_token()));
        workers.handles.push((Arc::clone(name), handle));
        tx
    }

    /// Spawns consumers for every known channel and flips to running.
    fn launch(&self, runtime: Handle) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.is_some() {
            return false;
        }

        let mut workers = Workers {
            token: CancellationToken::new(),
            runtime,
            handles: Vec::with_capacity(self.channels.len()),
        };
        for mut entry in self.channels.iter_mut() {
            let name = Arc::clone(entry.key());
            self.spawn_consumer(&name, entry.value_mut(), &mut workers);
        }
        *lifecycle = Some(workers);
        self.running.store(true, Ordering::Release);
        true
    }

    /// Flips to idle and detaches everything a running period owns.
    fn detach(&self) -> Option<Workers> {
        let mut lifecycle = self.lifecycle.lock();
        let workers = lifecycle.take()?;

        self.running.store(false, Ordering::Release);
        for mut entry in self.channels.iter_mut() {
            entry.value_mut().queue = None;
        }
        let dropped = self.pending.len();
        self.pending.clear();
        if dropped > 0 {
            tracing::debug!(broker = %self.id, dropped, "pending requests cancelled by stop");
        }
        Some(workers)
    }

    /// Returns the sender and handler count for `channel`. `None` when the
    /// channel is unknown or has no handlers; no channel or consumer is
    /// created on this path.
    fn route(&self, channel: &str) -> Result<Option<(mpsc::Sender<Message>, usize)>, BrokerError> {
        if let Some(entry) = self.channels.get(channel) {
            if let Some(tx) = &entry.queue {
                let count = entry.handler_count();
                return Ok((count > 0).then(|| (tx.clone(), count)));
            }
        }

        let mut lifecycle = self.lifecycle.lock();
        let workers = lifecycle.as_mut().ok_or(BrokerError::NotRunning)?;
        let Some(mut entry) = self.channels.get_mut(channel) else {
            return Ok(None);
        };
        let count = entry.handler_count();
        if count == 0 {
            return Ok(None);
        }
        let name = Arc::clone(entry.key());
        let tx = match entry.queue.clone() {
            Some(tx) => tx,
            None => self.spawn_consumer(&name, entry.value_mut(), workers),
        };
        Ok(Some((tx, count)))
    }

    async fn enqueue(
        &self,
        channel: &str,
        tx: &mpsc::Sender<Message>,
        message: Message,
    ) -> Result<(), BrokerError> {
        let full = || BrokerError::QueueFull {
            channel: channel.to_string(),
            capacity: self.cfg.queue_capacity(),
        };
        let closed = || BrokerError::ChannelClosed {
            channel: channel.to_string(),
        };

        let res = match self.cfg.backpressure {
            Backpressure::Reject => tx.try_send(message).map_err(|e| match e {
                TrySendError::Full(_) => full(),
                TrySendError::Closed(_) => closed(),
            }),
            Backpressure::Block { .. } => match self.cfg.block_timeout() {
                Some(deadline) => tx
                    .send_timeout(message, deadline)
                    .await
                    .map_err(|e| match e {
                        SendTimeoutError::Timeout(_) => full(),
                        SendTimeoutError::Closed(_) => closed(),
                    }),
                None => tx.send(message).await.map_err(|_| closed()),
            },
        };

        if let Err(err) = &res {
            self.stats.error();
            tracing::warn!(
                broker = %self.id,
                channel,
                label = err.as_label(),
                error = %err,
                "publish rejected"
            );
        }
        res
    }

    /// Hands a reply to the waiting requester. Returns 1 if someone was waiting.
    fn resolve(&self, message: Message) -> usize {
        let Some(correlation_id) = message.correlation_id.as_deref() else {
            tracing::debug!(broker = %self.id, "reply without correlation id dropped");
            return 0;
        };
        match self.pending.remove(correlation_id) {
            Some((_, waiter)) => {
                if waiter.send(message.payload).is_err() {
                    tracing::debug!(
                        broker = %self.id,
                        correlation_id,
                        "requester gone, reply dropped"
                    );
                    return 0;
                }
                1
            }
            None => {
                tracing::debug!(broker = %self.id, correlation_id, "late or unknown reply dropped");
                0
            }
        }
    }

    async fn publish(&self, channel: &str, message: Message) -> Result<usize, BrokerError> {
        if channel.is_empty() {
            return Err(BrokerError::EmptyChannel);
        }
        if !self.running.load(Ordering::Acquire) {
            return Err(BrokerError::NotRunning);
        }
        if channel == self.reply_channel {
            return Ok(self.resolve(message));
        }

        let Some((tx, count)) = self.route(channel)? else {
            tracing::trace!(broker = %self.id, channel, "no handlers, message not enqueued");
            return Ok(0);
        };
        self.enqueue(channel, &tx, message).await?;
        self.stats.published();
        tracing::trace!(broker = %self.id, channel, handlers = count, "message enqueued");
        Ok(count)
    }
}

#[async_trait]
impl Sink for Inner {
    async fn publish_message(
        &self,
        channel: &str,
        message: Message,
    ) -> Result<usize, BrokerError> {
        self.publish(channel, message).await
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn subscriber(&self, channel: &str, handler: HandlerRef) -> Result<(), BrokerError> {
        if channel.is_empty() {
            return Err(BrokerError::EmptyChannel);
        }
        let inner = &self.inner;
        let mut lifecycle = inner.lifecycle.lock();
        let mut entry = inner
            .channels
            .entry(Arc::from(channel))
            .or_insert_with(Channel::new);
        entry.handlers.write().push(Arc::clone(&handler));

        if let Some(workers) = lifecycle.as_mut() {
            if entry.queue.is_none() {
                let name = Arc::clone(entry.key());
                inner.spawn_consumer(&name, entry.value_mut(), workers);
            }
        }
        tracing::debug!(
            broker = %inner.id,
            channel,
            handler = handler.name(),
            "handler registered"
        );
        Ok(())
    }

    fn publisher(&self, channel: &str, handler: HandlerRef) -> HandlerRef {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let sink: Weak<dyn Sink> = weak;
        Arc::new(Publisher::new(handler, channel, sink))
    }

    async fn publish(&self, channel: &str, message: Message) -> Result<usize, BrokerError> {
        self.inner.publish(channel, message).await
    }

    async fn request(
        &self,
        channel: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, BrokerError> {
        let inner = &self.inner;
        let correlation_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        inner.pending.insert(correlation_id.clone(), tx);
        let _slot = PendingGuard {
            pending: &inner.pending,
            id: &correlation_id,
        };

        let message = Message::new(payload)
            .with_correlation_id(correlation_id.clone())
            .with_reply_to(inner.reply_channel.clone());
        let exchange = async {
            let delivered = inner.publish(channel, message).await?;
            tracing::debug!(
                broker = %inner.id,
                channel,
                correlation_id = %correlation_id,
                delivered,
                "request sent"
            );
            rx.await.map_err(|_| BrokerError::RequestCancelled {
                channel: channel.to_string(),
            })
        };

        // The deadline covers a blocked enqueue as well as the reply wait.
        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::RequestTimeout {
                channel: channel.to_string(),
                timeout,
            }),
        }
    }

    async fn start(&self) -> Result<(), BrokerError> {
        let runtime = Handle::try_current().map_err(|e| BrokerError::Transport {
            reason: e.to_string(),
        })?;
        if self.inner.launch(runtime) {
            tracing::info!(
                broker = %self.inner.id,
                channels = self.inner.channels.len(),
                "broker started"
            );
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        let Some(workers) = self.inner.detach() else {
            return Ok(());
        };
        workers.token.cancel();

        let grace = self.inner.cfg.grace;
        let mut handles = workers.handles;
        let joined = tokio::time::timeout(grace, async {
            for (_, handle) in handles.iter_mut() {
                let _ = handle.await;
            }
        })
        .await;

        match joined {
            Ok(()) => {
                tracing::info!(broker = %self.inner.id, "broker stopped");
                Ok(())
            }
            Err(_) => {
                let stuck: Vec<String> = handles
                    .iter()
                    .filter(|(_, handle)| !handle.is_finished())
                    .map(|(name, handle)| {
                        handle.abort();
                        name.to_string()
                    })
                    .collect();
                tracing::warn!(
                    broker = %self.inner.id,
                    ?grace,
                    ?stuck,
                    "consumers exceeded stop grace and were aborted"
                );
                Err(BrokerError::GraceExceeded { grace, stuck })
            }
        }
    }

    async fn ping(&self, _timeout: Duration) -> bool {
        true
    }

    fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    fn stats(&self) -> StatsSnapshot {
        let (published, consumed, errors) = self.inner.stats.counters();
        let per_channel: BTreeMap<String, ChannelStats> = self
            .inner
            .channels
            .iter()
            .map(|entry| {
                let stats = ChannelStats {
                    subscribers: entry.handler_count(),
                    queued: entry.queued(),
                };
                (entry.key().to_string(), stats)
            })
            .collect();

        StatsSnapshot {
            published,
            consumed,
            errors,
            channels: per_channel.len(),
            subscribers: per_channel.values().map(|c| c.subscribers).sum(),
            running: self.is_running(),
            per_channel,
        }
    }

    fn subscribers(&self) -> BTreeMap<String, Vec<HandlerDescriptor>> {
        self.inner
            .channels
            .iter()
            .map(|entry| {
                let descriptors: Vec<HandlerDescriptor> =
                    entry.handlers.read().iter().map(|h| h.descriptor()).collect();
                (entry.key().to_string(), descriptors)
            })
            .collect()
    }
}
