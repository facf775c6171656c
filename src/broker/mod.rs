//! # Brokers
//!
//! A broker owns named channels and delivers every message published on a
//! channel to every handler registered there.
//!
//! ## Contents
//! - [`Broker`] the capability set the router talks to (local or remote)
//! - [`MemoryBroker`] the in-process implementation
//! - [`Message`] what travels on a channel
//! - [`StatsSnapshot`] / [`ChannelStats`] counters and per-channel state
//!
//! ## In-memory engine
//! ```text
//!   publish(ch, msg)
//!        │  backpressure: Reject → QueueFull │ Block{timeout} → wait
//!        ▼
//!   [bounded FIFO "ch"] ──► consumer task "ch"
//!                                  │ snapshot handlers
//!                                  ├──► h1.handle(&msg) ┐
//!                                  ├──► h2.handle(&msg) ├ join_all, each catch_unwind
//!                                  └──► hN.handle(&msg) ┘
//!                                  │ Ok(Some(v)) && reply_to → publish(reply_to, v)
//!
//!   request(ch, payload, timeout)
//!        ├─ pending[correlation_id] = oneshot
//!        ├─ publish(ch, {payload, correlation_id, reply_to: "_reply.<broker-id>"})
//!        └─ await oneshot ──timeout──► RequestTimeout (slot removed)
//! ```

mod channel;
mod memory;
mod message;
mod stats;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BrokerError;
use crate::handlers::{HandlerDescriptor, HandlerRef};

pub use memory::MemoryBroker;
pub use message::Message;
pub use stats::{ChannelStats, StatsSnapshot};

/// Prefix of every broker's private reply channel.
pub const REPLY_PREFIX: &str = "_reply.";

/// Capability set of a message broker.
///
/// The router holds brokers as `Arc<dyn Broker>`; a remote transport
/// substitutes for [`MemoryBroker`] by implementing this trait.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Short implementation name for logs.
    fn kind(&self) -> &'static str {
        "broker"
    }

    /// Registers `handler` on `channel`, creating the channel if needed.
    ///
    /// Every handler of a channel receives every message published there.
    fn subscriber(&self, channel: &str, handler: HandlerRef) -> Result<(), BrokerError>;

    /// Wraps `handler` so its non-null result is published to `channel`.
    fn publisher(&self, channel: &str, handler: HandlerRef) -> HandlerRef;

    /// Enqueues a message and returns the number of handlers registered at
    /// enqueue time (0 when the channel has none, nothing is enqueued then).
    async fn publish(&self, channel: &str, message: Message) -> Result<usize, BrokerError>;

    /// Publishes `payload` as a request and waits for the first reply.
    async fn request(
        &self,
        channel: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, BrokerError>;

    /// Starts consumers. Idempotent.
    async fn start(&self) -> Result<(), BrokerError>;

    /// Stops consumers and drops queued messages. Idempotent.
    async fn stop(&self) -> Result<(), BrokerError>;

    /// Establishes connectivity; for local brokers the same as [`Broker::start`].
    async fn connect(&self) -> Result<(), BrokerError> {
        self.start().await
    }

    /// Health check.
    async fn ping(&self, timeout: Duration) -> bool;

    fn is_running(&self) -> bool;

    fn stats(&self) -> StatsSnapshot;

    /// Channel → descriptors of its handlers, in registration order.
    fn subscribers(&self) -> BTreeMap<String, Vec<HandlerDescriptor>>;
}
