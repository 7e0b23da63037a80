//! Event handler registry
//!
//! Handlers subscribe by event name (`MESSAGE_CREATE`, `READY`, ...) or to
//! everything at once. Dispatch is sequential per event; a handler that
//! returns an error is reported through the error hook and never stops the
//! remaining handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::error;

use filament_gateway::ShardEvent;

/// Pseudo-name subscribing a handler to every event
pub const ANY_EVENT: &str = "*";

/// Names used for lifecycle events that are not dispatches
pub const EVENT_READY: &str = "READY";
pub const EVENT_RESUMED: &str = "RESUMED";
pub const EVENT_CONNECTION_LOST: &str = "CONNECTION_LOST";

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: ShardEvent) -> anyhow::Result<()>;
}

/// Adapter so plain async functions can be registered directly
struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(ShardEvent) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, event: ShardEvent) -> anyhow::Result<()> {
        (self.0)(event).await
    }
}

type ErrorHook = Box<dyn Fn(&str, &anyhow::Error) + Send + Sync>;

#[derive(Default)]
pub struct EventRegistry {
    handlers: Mutex<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
    error_hook: Mutex<Option<ErrorHook>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event name
    pub fn on(&self, event: &str, handler: impl EventHandler + 'static) {
        self.handlers
            .lock()
            .entry(event.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Register an async function for one event name
    pub fn on_fn<F, Fut>(&self, event: &str, f: F)
    where
        F: Fn(ShardEvent) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on(event, FnHandler(f));
    }

    /// Register a handler that receives every event
    pub fn on_any(&self, handler: impl EventHandler + 'static) {
        self.on(ANY_EVENT, handler);
    }

    /// Replace the default error log with a custom hook
    pub fn set_error_hook(&self, hook: impl Fn(&str, &anyhow::Error) + Send + Sync + 'static) {
        *self.error_hook.lock() = Some(Box::new(hook));
    }

    /// Run every handler subscribed to this event, in registration order
    pub async fn dispatch(&self, event: &ShardEvent) {
        let name = event_name(event);
        let targets: Vec<Arc<dyn EventHandler>> = {
            let handlers = self.handlers.lock();
            let mut targets = Vec::new();
            if let Some(list) = handlers.get(name) {
                targets.extend(list.iter().cloned());
            }
            if let Some(list) = handlers.get(ANY_EVENT) {
                targets.extend(list.iter().cloned());
            }
            targets
        };

        for handler in targets {
            if let Err(err) = handler.handle(event.clone()).await {
                match &*self.error_hook.lock() {
                    Some(hook) => hook(name, &err),
                    None => error!(event = %name, error = %err, "event handler failed"),
                }
            }
        }
    }
}

/// The name a [`ShardEvent`] is dispatched under
pub fn event_name(event: &ShardEvent) -> &str {
    match event {
        ShardEvent::Ready { .. } => EVENT_READY,
        ShardEvent::Resumed { .. } => EVENT_RESUMED,
        ShardEvent::ConnectionLost { .. } => EVENT_CONNECTION_LOST,
        ShardEvent::Dispatch { event, .. } => event.as_str(),
    }
}
