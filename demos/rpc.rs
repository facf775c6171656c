//! # Example: request/reply
//!
//! A calculator handler answers requests by returning a value; a request to a
//! channel nobody serves times out.
//!
//! ## Run
//! ```bash
//! cargo run --example rpc
//! ```

use std::time::Duration;

use scopebus::{Broker, BrokerConfig, HandlerError, HandlerFn, MemoryBroker, Message};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let broker = MemoryBroker::new(BrokerConfig::default());
    broker.subscriber(
        "rpc.calculate",
        HandlerFn::arc(|msg: Message| async move {
            let a = msg.payload["a"]
                .as_i64()
                .ok_or_else(|| HandlerError::failed("missing 'a'"))?;
            let b = msg.payload["b"]
                .as_i64()
                .ok_or_else(|| HandlerError::failed("missing 'b'"))?;
            Ok::<Option<Value>, HandlerError>(Some(json!({ "result": a + b })))
        }),
    )?;
    broker.start().await?;

    let reply = broker
        .request(
            "rpc.calculate",
            json!({ "a": 10, "b": 20 }),
            Duration::from_secs(1),
        )
        .await?;
    println!("10 + 20 = {}", reply["result"]);

    match broker.request_default("rpc.unknown", json!({})).await {
        Err(err) if err.is_timeout() => println!("as expected: {err}"),
        other => println!("unexpected: {other:?}"),
    }

    broker.stop().await?;
    Ok(())
}
