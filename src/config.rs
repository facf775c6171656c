//! # Broker configuration.
//!
//! Provides [`BrokerConfig`], the settings of one [`MemoryBroker`](crate::MemoryBroker).
//!
//! ## Sentinel values
//! - `max_queue_size = 0` → clamped to 1 (a channel always holds one message)
//! - `grace = 0s` → consumers are aborted immediately on stop
//! - `Backpressure::Block { timeout: 0s }` → publishers wait without deadline

use std::time::Duration;

/// What `publish` does when the target channel is at capacity.
///
/// The policy is per broker and applies to every publish path: plain
/// `publish`, the request leg of `request`, automatic RPC replies and
/// [`Publisher`](crate::Publisher) results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Backpressure {
    /// Fail fast with [`BrokerError::QueueFull`](crate::BrokerError::QueueFull).
    #[default]
    Reject,
    /// Suspend the publisher until space frees up or `timeout` elapses
    /// (`Duration::ZERO` = no deadline). A missed deadline is reported as
    /// `QueueFull`.
    Block {
        /// Maximum wait for queue space.
        timeout: Duration,
    },
}

/// Configuration for an in-memory broker.
///
/// ## Field semantics
/// - `max_queue_size`: per-channel FIFO capacity (min 1)
/// - `backpressure`: full-queue policy, see [`Backpressure`]
/// - `grace`: how long `stop()` waits for consumers before aborting them
/// - `request_timeout`: default deadline used by `request_default`
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Capacity of every channel queue.
    pub max_queue_size: usize,

    /// Full-queue policy.
    pub backpressure: Backpressure,

    /// Upper bound for `stop()`.
    ///
    /// On stop the consumers are cancelled; a consumer that is in the middle
    /// of dispatching a message finishes that message first. Consumers still
    /// running after `grace` are aborted and reported in
    /// `BrokerError::GraceExceeded`.
    pub grace: Duration,

    /// Default deadline for request/reply calls.
    pub request_timeout: Duration,
}

impl BrokerConfig {
    /// Returns the per-channel capacity clamped to a minimum of 1.
    #[inline]
    pub fn queue_capacity(&self) -> usize {
        self.max_queue_size.max(1)
    }

    /// Returns the blocking deadline as an `Option`.
    ///
    /// - `None` → wait without deadline (or the policy is `Reject`)
    /// - `Some(d)` → give up after `d`
    #[inline]
    pub fn block_timeout(&self) -> Option<Duration> {
        match self.backpressure {
            Backpressure::Block { timeout } if timeout > Duration::ZERO => Some(timeout),
            _ => None,
        }
    }

    /// Sets the channel capacity.
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Sets the full-queue policy.
    pub fn with_backpressure(mut self, policy: Backpressure) -> Self {
        self.backpressure = policy;
        self
    }

    /// Sets the stop grace period.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
}

impl Default for BrokerConfig {
    /// Default configuration:
    ///
    /// - `max_queue_size = 1000`
    /// - `backpressure = Reject`
    /// - `grace = 5s`
    /// - `request_timeout = 500ms`
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            backpressure: Backpressure::Reject,
            grace: Duration::from_secs(5),
            request_timeout: Duration::from_millis(500),
        }
    }
}
