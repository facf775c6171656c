//! Router lifecycle state.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of an [`EventBus`](crate::EventBus).
///
/// ```text
///   Idle ──start()──► Starting ──ok──► Running ──stop()──► Stopping ──► Idle
///                         └──────────err──────────────────────────────► Idle
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BusState {
    Idle = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl BusState {
    pub fn as_str(self) -> &'static str {
        match self {
            BusState::Idle => "idle",
            BusState::Starting => "starting",
            BusState::Running => "running",
            BusState::Stopping => "stopping",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => BusState::Starting,
            2 => BusState::Running,
            3 => BusState::Stopping,
            _ => BusState::Idle,
        }
    }
}

impl fmt::Display for BusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free holder read on every publish.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(BusState::Idle as u8))
    }

    pub(crate) fn get(&self) -> BusState {
        BusState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: BusState) {
        self.0.store(state as u8, Ordering::Release);
    }
}
