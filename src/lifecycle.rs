//! Scoped start/stop.
//!
//! [`guarded`] runs a body future and then a stop future, whatever the body
//! did: returned normally, returned an error inside its output, or panicked.
//! A panic is re-raised only after stop has completed.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

/// Awaits `body`, then always awaits `stop()`.
///
/// - body finished → the stop result decides (`Ok(value)` or the stop error)
/// - body panicked → stop runs, its failure is logged, the panic resumes
pub(crate) async fn guarded<T, E, Fut, Stop, StopFut>(body: Fut, stop: Stop) -> Result<T, E>
where
    Fut: Future<Output = T>,
    Stop: FnOnce() -> StopFut,
    StopFut: Future<Output = Result<(), E>>,
    E: Display,
{
    let outcome = AssertUnwindSafe(body).catch_unwind().await;
    let stopped = stop().await;

    match outcome {
        Ok(value) => stopped.map(|()| value),
        Err(panic) => {
            tracing::error!(panic = %panic_message(panic.as_ref()), "scoped body panicked");
            if let Err(err) = stopped {
                tracing::warn!(error = %err, "stop after panic failed");
            }
            std::panic::resume_unwind(panic)
        }
    }
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
