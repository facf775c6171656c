//! # Example: scope routing
//!
//! The same handler is registered on both brokers of an [`EventBus`]; each
//! envelope is delivered by exactly one of them, picked by its scope.
//!
//! ## Run
//! ```bash
//! RUST_LOG=scopebus=trace cargo run --example scopes
//! ```

use std::time::Duration;

use scopebus::{BrokerConfig, Envelope, EventBus, HandlerError, HandlerFn, Message, Scope};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bus = EventBus::in_memory(BrokerConfig::default());
    bus.subscribe(
        "config.reloaded",
        HandlerFn::arc(|msg: Message| async move {
            println!(
                "[{}] config reloaded: {}",
                msg.payload["scope"], msg.payload["data"]
            );
            Ok::<Option<Value>, HandlerError>(None)
        }),
    )?;

    bus.run_scoped(async {
        for scope in [Scope::Process, Scope::App] {
            let ev = Envelope::new("config-service", "config.reloaded")?
                .with_scope(scope)
                .with_json(json!({ "version": 7 }))?;
            bus.publish(&ev).await?;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        println!("process broker: {:?}", bus.process_broker().stats());
        println!("app broker:     {:?}", bus.app_broker().stats());
        Ok::<(), Box<dyn std::error::Error>>(())
    })
    .await??;

    Ok(())
}
