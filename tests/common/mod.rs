#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use scopebus::{HandlerError, HandlerFn, HandlerRef, Message};
use serde_json::Value;
use tokio::sync::{Semaphore, mpsc};
use tracing_subscriber::EnvFilter;

/// Routes library logs to the test writer (`RUST_LOG=scopebus=trace`).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `cond` until it holds; panics after two seconds.
pub async fn eventually(cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Records every payload it receives.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Value>>>);

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler(&self) -> HandlerRef {
        let seen = Arc::clone(&self.0);
        HandlerFn::named("recorder", move |msg: Message| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().push(msg.payload);
                Ok::<Option<Value>, HandlerError>(None)
            }
        })
        .shared()
    }

    pub fn seen(&self) -> Vec<Value> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }
}

/// A handler that parks inside every message until released.
pub struct Gate {
    pub handler: HandlerRef,
    pub entered: mpsc::UnboundedReceiver<()>,
    pub release: Arc<Semaphore>,
}

impl Gate {
    pub fn new() -> Self {
        let (tx, entered) = mpsc::unbounded_channel();
        let release = Arc::new(Semaphore::new(0));
        let permits = Arc::clone(&release);
        let handler = HandlerFn::named("gate", move |_msg: Message| {
            let tx = tx.clone();
            let permits = Arc::clone(&permits);
            async move {
                let _ = tx.send(());
                permits
                    .acquire()
                    .await
                    .map_err(|e| HandlerError::failed(e.to_string()))?
                    .forget();
                Ok::<Option<Value>, HandlerError>(None)
            }
        })
        .shared();

        Self {
            handler,
            entered,
            release,
        }
    }

    /// Waits until the consumer is parked inside the handler.
    pub async fn wait_entered(&mut self) {
        tokio::time::timeout(Duration::from_secs(2), self.entered.recv())
            .await
            .expect("gate never entered");
    }
}
