//! Broker counters and their serializable snapshot.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters shared by the broker and its consumers.
///
/// Counters are never reset; they survive `stop()`/`start()` cycles.
#[derive(Debug, Default)]
pub(crate) struct Stats {
    published: AtomicU64,
    consumed: AtomicU64,
    errors: AtomicU64,
}

impl Stats {
    pub(crate) fn published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn consumed(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn counters(&self) -> (u64, u64, u64) {
        (
            self.published.load(Ordering::Relaxed),
            self.consumed.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
        )
    }
}

/// Per-channel part of a [`StatsSnapshot`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    /// Registered handlers.
    pub subscribers: usize,
    /// Messages waiting in the queue (0 while stopped).
    pub queued: usize,
}

/// Point-in-time view of a broker.
///
/// `published` counts successful enqueues, `consumed` successful handler
/// invocations and `errors` failed or panicked invocations plus rejected
/// publishes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub published: u64,
    pub consumed: u64,
    pub errors: u64,
    /// Number of known channels.
    pub channels: usize,
    /// Handlers across all channels.
    pub subscribers: usize,
    pub running: bool,
    pub per_channel: BTreeMap<String, ChannelStats>,
}
