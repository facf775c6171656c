//! # Publisher wrapper
//!
//! [`Publisher`] decorates a handler so that its result is forwarded: after
//! the wrapped handler succeeds with a non-null value, that value is
//! published to a target channel on the broker that built the wrapper.
//!
//! ```text
//!   message ──► inner.handle() ──Ok(Some(v))──► sink.publish_message(target, v)
//!                      │
//!                      └──Err(e)──► nothing published, e returned to the consumer
//! ```
//!
//! The wrapper holds the broker weakly, so a handler registered on its own
//! broker does not keep that broker alive.

use std::sync::Weak;

use async_trait::async_trait;
use serde_json::Value;

use super::{Handler, HandlerDescriptor, HandlerRef};
use crate::broker::Message;
use crate::error::{BrokerError, HandlerError};

/// Anything a [`Publisher`] can forward results to.
///
/// Implemented by [`MemoryBroker`](crate::MemoryBroker) internals; remote
/// brokers implement it for whatever type their own wrapper should hold.
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    /// Enqueues one message, honoring the broker's backpressure policy.
    async fn publish_message(&self, channel: &str, message: Message)
    -> Result<usize, BrokerError>;
}

/// Handler wrapper that republishes the inner handler's result.
pub struct Publisher {
    inner: HandlerRef,
    target: String,
    sink: Weak<dyn Sink>,
}

impl Publisher {
    /// Wraps `inner`; results go to `target` through `sink`.
    pub fn new(inner: HandlerRef, target: impl Into<String>, sink: Weak<dyn Sink>) -> Self {
        Self {
            inner,
            target: target.into(),
            sink,
        }
    }

    /// Channel results are published to.
    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl Handler for Publisher {
    async fn handle(&self, msg: &Message) -> Result<Option<Value>, HandlerError> {
        let result = self.inner.handle(msg).await?;

        if let Some(value) = result.as_ref().filter(|v| !v.is_null()) {
            let sink = self.sink.upgrade().ok_or(BrokerError::NotRunning)?;
            let delivered = sink
                .publish_message(&self.target, Message::new(value.clone()))
                .await?;
            tracing::trace!(
                handler = self.inner.name(),
                target = %self.target,
                delivered,
                "forwarded handler result"
            );
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn module(&self) -> &str {
        self.inner.module()
    }

    fn descriptor(&self) -> HandlerDescriptor {
        self.inner.descriptor()
    }
}
