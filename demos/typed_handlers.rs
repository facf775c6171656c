//! # Example: typed handlers
//!
//! Handlers declared over [`EventData`] payloads receive them already decoded;
//! a payload of the wrong shape never reaches the handler body.
//!
//! ## Run
//! ```bash
//! cargo run --example typed_handlers
//! ```

use std::sync::Arc;
use std::time::Duration;

use scopebus::{
    BrokerConfig, Envelope, EventBus, EventData, HandlerError, MemoryBroker, Scope, TypedEvent,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize, Deserialize)]
struct OrderPlaced {
    order_id: String,
    amount: f64,
}

impl EventData for OrderPlaced {
    const TYPE: &'static str = "order.placed";
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheInvalidated {
    key: String,
}

impl EventData for CacheInvalidated {
    const TYPE: &'static str = "cache.invalidated";
    const SCOPE: Scope = Scope::Process;
}

async fn charge(ev: TypedEvent<OrderPlaced>) -> Result<Option<Value>, HandlerError> {
    println!(
        "charging {:.2} for order {} (event {})",
        ev.data.amount,
        ev.data.order_id,
        ev.envelope.id()
    );
    Ok(None)
}

async fn evict(ev: TypedEvent<CacheInvalidated>) -> Result<Option<Value>, HandlerError> {
    println!("evicting '{}'", ev.data.key);
    Ok(None)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bus = EventBus::builder(
        Arc::new(MemoryBroker::default()),
        Arc::new(MemoryBroker::new(BrokerConfig::default())),
    )
    .with_event::<OrderPlaced, _, _>(charge)
    .with_event::<CacheInvalidated, _, _>(evict)
    .build()?;

    for (event_type, handlers) in bus.get_handlers() {
        println!("{event_type}: {handlers:?}");
    }

    bus.run_scoped(async {
        let order = OrderPlaced {
            order_id: "A-1001".into(),
            amount: 99.5,
        };
        bus.publish(&Envelope::from_data("shop", &order)?).await?;
        bus.publish(&Envelope::from_data("shop", &CacheInvalidated { key: "orders".into() })?)
            .await?;

        // Wrong shape: counted as a handler error, `charge` is not called.
        let broken = Envelope::new("shop", OrderPlaced::TYPE)?.with_json(json!({ "order_id": 1 }))?;
        bus.publish(&broken).await?;

        tokio::time::sleep(Duration::from_millis(50)).await;
        println!("app broker errors: {}", bus.app_broker().stats().errors);
        Ok::<(), Box<dyn std::error::Error>>(())
    })
    .await??;

    Ok(())
}
