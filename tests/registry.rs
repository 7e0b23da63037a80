use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use filament::registry::{event_name, EventRegistry, EVENT_CONNECTION_LOST, EVENT_READY};
use filament::ShardEvent;

fn dispatch_event(name: &str) -> ShardEvent {
    ShardEvent::Dispatch {
        shard: 0,
        event: name.to_string(),
        seq: Some(1),
        data: json!({}),
    }
}

#[tokio::test]
async fn test_handlers_run_in_registration_order() {
    let registry = EventRegistry::new();
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    for label in ["first", "second", "third"] {
        let log = Arc::clone(&log);
        registry.on_fn("MESSAGE_CREATE", move |_| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(label);
                Ok(())
            }
        });
    }

    registry.dispatch(&dispatch_event("MESSAGE_CREATE")).await;
    assert_eq!(*log.lock(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_handler_error_does_not_stop_later_handlers() {
    let registry = EventRegistry::new();
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let reported: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    {
        let reported = Arc::clone(&reported);
        registry.set_error_hook(move |event, err| {
            reported.lock().push(format!("{event}: {err}"));
        });
    }

    registry.on_fn("GUILD_CREATE", |_| async move {
        Err(anyhow::anyhow!("handler exploded"))
    });
    {
        let log = Arc::clone(&log);
        registry.on_fn("GUILD_CREATE", move |_| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push("survivor");
                Ok(())
            }
        });
    }

    registry.dispatch(&dispatch_event("GUILD_CREATE")).await;
    assert_eq!(*log.lock(), vec!["survivor"]);
    assert_eq!(*reported.lock(), vec!["GUILD_CREATE: handler exploded"]);
}

#[tokio::test]
async fn test_on_any_sees_every_event() {
    let registry = EventRegistry::new();
    let count = Arc::new(Mutex::new(0usize));

    {
        let count = Arc::clone(&count);
        registry.on_fn(filament::registry::ANY_EVENT, move |_| {
            let count = Arc::clone(&count);
            async move {
                *count.lock() += 1;
                Ok(())
            }
        });
    }

    registry.dispatch(&dispatch_event("MESSAGE_CREATE")).await;
    registry
        .dispatch(&ShardEvent::ConnectionLost { shard: 2 })
        .await;
    registry
        .dispatch(&ShardEvent::Ready {
            shard: 0,
            session_id: "s".into(),
            user: None,
        })
        .await;

    assert_eq!(*count.lock(), 3);
}

#[test]
fn test_lifecycle_events_have_stable_names() {
    assert_eq!(
        event_name(&ShardEvent::Ready {
            shard: 0,
            session_id: "s".into(),
            user: None,
        }),
        EVENT_READY
    );
    assert_eq!(
        event_name(&ShardEvent::ConnectionLost { shard: 1 }),
        EVENT_CONNECTION_LOST
    );
    assert_eq!(event_name(&dispatch_event("TYPING_START")), "TYPING_START");
}
