//! # Example: basic publish/subscribe
//!
//! Two handlers on one channel of a [`MemoryBroker`]; every message reaches both.
//!
//! ## Run
//! ```bash
//! RUST_LOG=scopebus=debug cargo run --example basic_pubsub --features logging
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
        "events.user.created",
        HandlerFn::named("send_welcome_email", |msg: Message| async move {
            println!("[mailer] welcome {}", msg.payload["username"]);
            Ok::<Option<Value>, HandlerError>(None)
        })
        .shared(),
    )?;
    broker.subscriber(
        "events.user.created",
        HandlerFn::named("update_directory", |msg: Message| async move {
            println!("[directory] add {}", msg.payload["username"]);
            Ok::<Option<Value>, HandlerError>(None)
        })
        .shared(),
    )?;
    #[cfg(feature = "logging")]
    broker.subscriber(
        "events.user.created",
        std::sync::Arc::new(scopebus::LogHandler::new()),
    )?;

    broker
        .run_scoped(async {
            for name in ["alice", "bob"] {
                let delivered = broker
                    .publish(
                        "events.user.created",
                        Message::new(json!({ "username": name })),
                    )
                    .await?;
                println!("published {name} to {delivered} handler(s)");
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            println!("{}", serde_json::to_string_pretty(&broker.stats())?);
            Ok::<(), Box<dyn std::error::Error>>(())
        })
        .await??;

    Ok(())
}
