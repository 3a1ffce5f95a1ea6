//! Event handler registry
//!
//! Handlers live in the process, not on the wire: reconnecting never
//! registers anything twice. Each `subscribe` call yields an independent
//! handle with its own queue; dropping the handle unsubscribes it.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, warn};

type HandlerId = u64;

#[derive(Default)]
struct RegistryInner {
    next_id: HandlerId,
    handlers: HashMap<String, Vec<(HandlerId, mpsc::UnboundedSender<Value>)>>,
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // A panicking handler elsewhere must not take event delivery down
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a typed handler for `event`.
    pub fn subscribe<T: DeserializeOwned>(&self, event: &str) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.lock();
            inner.next_id += 1;
            let id = inner.next_id;
            inner.handlers.entry(event.to_string()).or_default().push((id, tx));
            id
        };
        debug!(event, handler_id = id, "Handler registered");
        Subscription {
            event: event.to_string(),
            id,
            rx,
            registry: self.clone(),
            _marker: PhantomData,
        }
    }

    fn unsubscribe(&self, event: &str, id: HandlerId) {
        let mut inner = self.lock();
        if let Some(list) = inner.handlers.get_mut(event) {
            list.retain(|(hid, _)| *hid != id);
            if list.is_empty() {
                inner.handlers.remove(event);
            }
        }
    }

    /// Deliver `payload` to every live handler of `event`. Returns how many
    /// handlers received it.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        let mut inner = self.lock();
        let Some(list) = inner.handlers.get_mut(event) else {
            return 0;
        };
        list.retain(|(_, tx)| tx.send(payload.clone()).is_ok());
        list.len()
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.lock().handlers.get(event).map_or(0, Vec::len)
    }
}

/// Disposable typed handle. Dropping it removes the handler.
pub struct Subscription<T> {
    event: String,
    id: HandlerId,
    rx: mpsc::UnboundedReceiver<Value>,
    registry: HandlerRegistry,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Subscription<T> {
    /// Next payload that deserializes as `T`. Malformed payloads are logged
    /// and skipped.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let value = self.rx.recv().await?;
            match serde_json::from_value::<T>(value) {
                Ok(event) => return Some(event),
                Err(e) => warn!(event = %self.event, error = %e, "Skipping malformed payload"),
            }
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.registry.unsubscribe(&self.event, self.id);
    }
}
