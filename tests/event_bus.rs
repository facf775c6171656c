mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use scopebus::{
    Broker, BrokerConfig, BrokerError, BusError, BusState, Envelope, EventBus, EventData,
    HandlerDescriptor, HandlerError, HandlerFn, HandlerRef, MemoryBroker, Message, Scope,
    StatsSnapshot, ValidationError,
};

use common::{Recorder, eventually, init_tracing};

/// Broker double whose lifecycle calls can be made to fail.
#[derive(Default)]
struct FlakyBroker {
    running: AtomicBool,
    fail_start: bool,
    fail_stop: Option<&'static str>,
    fail_subscribe: bool,
    stop_calls: parking_lot::Mutex<usize>,
}

impl FlakyBroker {
    fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    fn failing_stop(reason: &'static str) -> Self {
        Self {
            fail_stop: Some(reason),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Broker for FlakyBroker {
    fn kind(&self) -> &'static str {
        "flaky"
    }

    fn subscriber(&self, _channel: &str, _handler: HandlerRef) -> Result<(), BrokerError> {
        if self.fail_subscribe {
            return Err(BrokerError::Transport {
                reason: "subscribe refused".into(),
            });
        }
        Ok(())
    }

    fn publisher(&self, _channel: &str, handler: HandlerRef) -> HandlerRef {
        handler
    }

    async fn publish(&self, _channel: &str, _message: Message) -> Result<usize, BrokerError> {
        Ok(0)
    }

    async fn request(
        &self,
        channel: &str,
        _payload: Value,
        timeout: Duration,
    ) -> Result<Value, BrokerError> {
        Err(BrokerError::RequestTimeout {
            channel: channel.to_string(),
            timeout,
        })
    }

    async fn start(&self) -> Result<(), BrokerError> {
        if self.fail_start {
            return Err(BrokerError::Transport {
                reason: "connection refused".into(),
            });
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        *self.stop_calls.lock() += 1;
        self.running.store(false, Ordering::SeqCst);
        match self.fail_stop {
            Some(reason) => Err(BrokerError::Transport {
                reason: reason.into(),
            }),
            None => Ok(()),
        }
    }

    async fn ping(&self, _timeout: Duration) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stats(&self) -> StatsSnapshot {
        StatsSnapshot::default()
    }

    fn subscribers(&self) -> BTreeMap<String, Vec<HandlerDescriptor>> {
        BTreeMap::new()
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct UserCreated {
    username: String,
}

impl EventData for UserCreated {
    const TYPE: &'static str = "user.created";
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheInvalidated {
    key: String,
}

impl EventData for CacheInvalidated {
    const TYPE: &'static str = "cache.invalidated";
    const SCOPE: Scope = Scope::Process;
}

#[tokio::test]
async fn test_scope_routes_to_one_broker() {
    init_tracing();
    let bus = EventBus::in_memory(BrokerConfig::default());
    let rec = Recorder::new();
    bus.subscribe("order.created", rec.handler()).unwrap();
    bus.start().await.unwrap();

    let local = Envelope::new("orders", "order.created")
        .unwrap()
        .with_scope(Scope::Process);
    let shared = Envelope::new("orders", "order.created").unwrap();

    assert_eq!(bus.publish(&local).await.unwrap(), 1);
    assert_eq!(bus.publish(&shared).await.unwrap(), 1);
    eventually(|| rec.len() == 2).await;

    assert_eq!(bus.process_broker().stats().published, 1);
    assert_eq!(bus.app_broker().stats().published, 1);

    let ids: Vec<&str> = rec
        .seen()
        .iter()
        .filter_map(|v| v["id"].as_str())
        .map(|id| if id == local.id() { "local" } else { "shared" })
        .collect();
    assert!(ids.contains(&"local") && ids.contains(&"shared"));
    bus.stop().await.unwrap();
}

#[tokio::test]
async fn test_delivered_payload_equals_envelope() {
    let bus = EventBus::in_memory(BrokerConfig::default());
    let rec = Recorder::new();
    bus.subscribe("user.created", rec.handler()).unwrap();
    bus.start().await.unwrap();

    let ev = Envelope::new("users", "user.created")
        .unwrap()
        .with_json(json!({"username": "alice"}))
        .unwrap()
        .with_extension("tenant", json!("acme"));
    bus.publish(&ev).await.unwrap();

    eventually(|| rec.len() == 1).await;
    let received = Envelope::from_value(rec.seen().remove(0)).unwrap();
    assert_eq!(received, ev);
    bus.stop().await.unwrap();
}

#[tokio::test]
async fn test_publish_requires_running_bus() {
    let bus = EventBus::in_memory(BrokerConfig::default());
    let ev = Envelope::new("svc", "a.b").unwrap();
    assert!(matches!(
        bus.publish(&ev).await.unwrap_err(),
        BusError::NotRunning
    ));

    bus.start().await.unwrap();
    assert_eq!(bus.publish(&ev).await.unwrap(), 0);
    bus.stop().await.unwrap();

    assert!(matches!(
        bus.publish(&ev).await.unwrap_err(),
        BusError::NotRunning
    ));
}

#[tokio::test]
async fn test_empty_event_type_is_rejected() {
    let bus = EventBus::in_memory(BrokerConfig::default());
    let err = bus.subscribe("", Recorder::new().handler()).unwrap_err();
    assert!(matches!(
        err,
        BusError::Validation(ValidationError::MissingType)
    ));
}

#[tokio::test]
async fn test_app_start_failure_rolls_back_process() {
    let process = Arc::new(MemoryBroker::default());
    let app = Arc::new(FlakyBroker::failing_start());
    let bus = EventBus::new(process.clone(), app);

    let err = bus.start().await.unwrap_err();
    match &err {
        BusError::BrokerStart {
            scope,
            source,
            rollback,
        } => {
            assert_eq!(*scope, Scope::App);
            assert!(source.to_string().contains("connection refused"));
            assert!(rollback.is_none());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("connection refused"));
    assert!(!process.is_running());
    assert_eq!(bus.state(), BusState::Idle);
}

#[tokio::test]
async fn test_failed_rollback_is_reported_with_start_error() {
    let process = Arc::new(FlakyBroker::failing_stop("process stuck"));
    let app = Arc::new(FlakyBroker::failing_start());
    let bus = EventBus::new(process.clone(), app);

    let err = bus.start().await.unwrap_err();
    match &err {
        BusError::BrokerStart {
            scope,
            source,
            rollback: Some(rollback),
        } => {
            assert_eq!(*scope, Scope::App);
            assert!(source.to_string().contains("connection refused"));
            assert_eq!(rollback.scope, Scope::Process);
            assert!(rollback.error.to_string().contains("process stuck"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let text = err.to_string();
    assert!(text.contains("connection refused"), "{text}");
    assert!(text.contains("rollback of process broker failed"), "{text}");
    assert!(text.contains("process stuck"), "{text}");
    assert_eq!(*process.stop_calls.lock(), 1);
    assert_eq!(bus.state(), BusState::Idle);
}

#[tokio::test]
async fn test_process_start_failure_leaves_app_untouched() {
    let process = Arc::new(FlakyBroker::failing_start());
    let app = Arc::new(FlakyBroker::default());
    let bus = EventBus::new(process, app.clone());

    let err = bus.start().await.unwrap_err();
    assert!(matches!(
        err,
        BusError::BrokerStart {
            scope: Scope::Process,
            ..
        }
    ));
    assert!(!app.is_running());
    assert_eq!(bus.state(), BusState::Idle);
}

#[tokio::test]
async fn test_subscribe_refused_by_one_broker_keeps_registry_consistent() {
    let process = Arc::new(MemoryBroker::default());
    let app = Arc::new(FlakyBroker {
        fail_subscribe: true,
        ..FlakyBroker::default()
    });
    let bus = EventBus::new(process.clone(), app);
    let rec = Recorder::new();

    let err = bus.subscribe("order.created", rec.handler()).unwrap_err();
    assert!(
        matches!(err, BusError::Broker { scope: Scope::App, .. }),
        "unexpected error: {err}"
    );

    let on_process = process.subscribers();
    assert_eq!(on_process.values().map(Vec::len).sum::<usize>(), 1);
    let handlers = bus.get_handlers();
    assert_eq!(handlers["order.created"].len(), 1);
    assert_eq!(
        handlers["order.created"][0].function_name,
        on_process.values().next().unwrap()[0].function_name
    );
}

#[tokio::test]
async fn test_stop_attempts_both_and_aggregates() {
    let process = Arc::new(FlakyBroker::failing_stop("local down"));
    let app = Arc::new(FlakyBroker::failing_stop("remote down"));
    let bus = EventBus::new(process.clone(), app.clone());
    bus.start().await.unwrap();

    let err = bus.stop().await.unwrap_err();
    let BusError::BrokerStop { failures } = &err else {
        panic!("unexpected error: {err}");
    };
    let scopes: Vec<Scope> = failures.iter().map(|f| f.scope).collect();
    assert_eq!(scopes, vec![Scope::Process, Scope::App]);
    assert!(err.to_string().contains("local down"));
    assert!(err.to_string().contains("remote down"));
    assert_eq!(*process.stop_calls.lock(), 1);
    assert_eq!(*app.stop_calls.lock(), 1);
    assert_eq!(bus.state(), BusState::Idle);
}

#[tokio::test]
async fn test_lifecycle_is_idempotent() {
    let bus = EventBus::in_memory(BrokerConfig::default());
    assert_eq!(bus.state(), BusState::Idle);
    bus.stop().await.unwrap();

    bus.start().await.unwrap();
    bus.start().await.unwrap();
    assert_eq!(bus.state(), BusState::Running);
    assert!(bus.process_broker().is_running());
    assert!(bus.app_broker().is_running());

    bus.stop().await.unwrap();
    bus.stop().await.unwrap();
    assert_eq!(bus.state(), BusState::Idle);
    assert!(!bus.process_broker().is_running());
}

#[tokio::test]
async fn test_typed_handler_receives_decoded_event() {
    let bus = EventBus::in_memory(BrokerConfig::default());
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe_event::<UserCreated, _, _>(move |ev| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().push((ev.envelope.source().to_string(), ev.data));
            Ok::<Option<Value>, HandlerError>(None)
        }
    })
    .unwrap();
    bus.start().await.unwrap();

    let ev = Envelope::from_data(
        "users",
        &UserCreated {
            username: "alice".into(),
        },
    )
    .unwrap();
    assert_eq!(ev.scope(), Scope::App);
    bus.publish(&ev).await.unwrap();

    eventually(|| seen.lock().len() == 1).await;
    let (source, data) = seen.lock().remove(0);
    assert_eq!(source, "users");
    assert_eq!(data.username, "alice");
    bus.stop().await.unwrap();
}

#[tokio::test]
async fn test_typed_handler_accepts_named_argument() {
    let broker = MemoryBroker::default();
    let bus = EventBus::new(Arc::new(broker.clone()), Arc::new(MemoryBroker::default()));
    let hits = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&hits);
    bus.subscribe_event::<CacheInvalidated, _, _>(move |ev| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().push(ev.data.key);
            Ok::<Option<Value>, HandlerError>(None)
        }
    })
    .unwrap();
    bus.start().await.unwrap();

    let ev = Envelope::from_data("cache", &CacheInvalidated { key: "k1".into() }).unwrap();
    assert_eq!(ev.scope(), Scope::Process);
    bus.publish(&ev).await.unwrap();

    // A transport passing arguments by name wraps the envelope.
    let named = Message::new(json!({ "event": ev.to_value() }));
    broker
        .publish("events.cache.invalidated", named)
        .await
        .unwrap();

    eventually(|| hits.lock().len() == 2).await;
    assert_eq!(*hits.lock(), vec!["k1".to_string(), "k1".to_string()]);
    bus.stop().await.unwrap();
}

#[tokio::test]
async fn test_conversion_failure_counts_as_error() {
    let bus = EventBus::in_memory(BrokerConfig::default());
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    bus.subscribe_event::<UserCreated, _, _>(move |_ev| {
        let flag = Arc::clone(&flag);
        async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<Option<Value>, HandlerError>(None)
        }
    })
    .unwrap();
    bus.start().await.unwrap();

    let bad = Envelope::new("users", "user.created")
        .unwrap()
        .with_json(json!({"nickname": 42}))
        .unwrap();
    bus.publish(&bad).await.unwrap();

    eventually(|| bus.app_broker().stats().errors == 1).await;
    assert!(!called.load(Ordering::SeqCst));
    bus.stop().await.unwrap();
}

#[tokio::test]
async fn test_handler_registry_and_builder() {
    let named = HandlerFn::named("send_welcome_email", |_msg: Message| async {
        Ok::<Option<Value>, HandlerError>(None)
    })
    .with_module("mailer")
    .shared();

    let bus = EventBus::builder(
        Arc::new(MemoryBroker::default()),
        Arc::new(MemoryBroker::default()),
    )
    .with_handler("user.created", named)
    .with_handler("user.created", Recorder::new().handler())
    .with_event::<CacheInvalidated, _, _>(|_ev| async {
        Ok::<Option<Value>, HandlerError>(None)
    })
    .build()
    .unwrap();

    let handlers = bus.get_handlers();
    assert_eq!(handlers.len(), 2);
    assert_eq!(
        handlers["user.created"][0],
        HandlerDescriptor {
            function_name: "send_welcome_email".into(),
            module: "mailer".into(),
        }
    );
    assert_eq!(handlers["user.created"][1].function_name, "recorder");
    assert!(handlers["cache.invalidated"][0].module.starts_with("event_bus"));

    for broker in [bus.process_broker(), bus.app_broker()] {
        assert_eq!(broker.subscribers()["events.user.created"].len(), 2);
    }
}

#[tokio::test]
async fn test_builder_rejects_empty_event_type() {
    let result = EventBus::builder(
        Arc::new(MemoryBroker::default()),
        Arc::new(MemoryBroker::default()),
    )
    .with_handler("", Recorder::new().handler())
    .build();
    assert!(matches!(result, Err(BusError::Validation(_))));
}

#[tokio::test]
async fn test_run_scoped_stops_after_panic() {
    let bus = Arc::new(EventBus::in_memory(BrokerConfig::default()));
    let inner = Arc::clone(&bus);
    let outcome = tokio::spawn(async move {
        inner
            .run_scoped::<_, ()>(async {
                assert_eq!(inner.state(), BusState::Running);
                panic!("body failed");
            })
            .await
    })
    .await;

    assert!(outcome.unwrap_err().is_panic());
    assert_eq!(bus.state(), BusState::Idle);
    assert!(!bus.app_broker().is_running());
}
