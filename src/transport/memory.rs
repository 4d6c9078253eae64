//! In-memory [`Transport`] with scripted acknowledgements.
//!
//! `MemoryTransport` keeps listeners in a plain map and lets the caller play
//! the server side: dispatch push events, answer pending acks, or install a
//! responder that answers every emit synchronously. Listener counts are
//! exposed so tests can assert that subscriptions were torn down.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::trace;

use super::{AckCallback, EventHandler, ListenerId, Transport, DISCONNECT_EVENT};

type Responder = Arc<dyn Fn(&str, &Value) -> Option<Value> + Send + Sync>;

/// Cloneable handle to an in-process event channel.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    next_listener: u64,
    listeners: HashMap<String, Vec<Listener>>,
    pending: VecDeque<PendingAck>,
    emitted: Vec<EmittedMessage>,
    responder: Option<Responder>,
}

struct Listener {
    id: ListenerId,
    once: bool,
    handler: EventHandler,
}

/// Message recorded by [`MemoryTransport::emit`].
#[derive(Clone, Debug, PartialEq)]
pub struct EmittedMessage {
    /// Event name the message was emitted under.
    pub event: String,
    /// Payload as handed to the transport.
    pub payload: Value,
}

/// Emitted message still waiting for its acknowledgement.
pub struct PendingAck {
    /// Event name the message was emitted under.
    pub event: String,
    /// Payload as handed to the transport.
    pub payload: Value,
    ack: AckCallback,
}

impl PendingAck {
    /// Invokes the acknowledgement callback with `response`.
    pub fn reply(self, response: Value) {
        (self.ack)(response);
    }
}

impl fmt::Debug for PendingAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAck")
            .field("event", &self.event)
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

impl MemoryTransport {
    /// Creates a transport with no listeners and no responder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every subsequent emit synchronously.
    ///
    /// When the responder returns `None` the ack stays pending and can be
    /// answered later through [`MemoryTransport::take_pending`].
    pub fn with_responder<F>(self, responder: F) -> Self
    where
        F: Fn(&str, &Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.lock().responder = Some(Arc::new(responder));
        self
    }

    /// Removes the installed responder.
    pub fn clear_responder(&self) {
        self.lock().responder = None;
    }

    /// Delivers `payload` to every listener registered for `event`.
    ///
    /// Returns the number of handlers invoked. `once` listeners are removed
    /// before any handler runs.
    pub fn dispatch(&self, event: &str, payload: Value) -> usize {
        let handlers: Vec<EventHandler> = {
            let mut inner = self.lock();
            let Some(listeners) = inner.listeners.get_mut(event) else {
                return 0;
            };
            let handlers = listeners
                .iter()
                .map(|listener| Arc::clone(&listener.handler))
                .collect();
            listeners.retain(|listener| !listener.once);
            if listeners.is_empty() {
                inner.listeners.remove(event);
            }
            handlers
        };

        trace!(event = "memory_dispatch", name = event, handlers = handlers.len());
        for handler in &handlers {
            handler(payload.clone());
        }
        handlers.len()
    }

    /// Fires the reserved disconnect event with `reason`.
    pub fn disconnect(&self, reason: impl Into<String>) -> usize {
        self.dispatch(DISCONNECT_EVENT, Value::String(reason.into()))
    }

    /// Number of listeners currently registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.lock().listeners.get(event).map_or(0, Vec::len)
    }

    /// Number of listeners registered across all events.
    pub fn total_listener_count(&self) -> usize {
        self.lock().listeners.values().map(Vec::len).sum()
    }

    /// Number of emitted messages whose ack has not been invoked.
    pub fn pending_ack_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Drains every ack that is still waiting for a reply.
    pub fn take_pending(&self) -> Vec<PendingAck> {
        self.lock().pending.drain(..).collect()
    }

    /// Removes the oldest pending ack, if any.
    pub fn next_pending(&self) -> Option<PendingAck> {
        self.lock().pending.pop_front()
    }

    /// Every message emitted so far, oldest first.
    pub fn emitted(&self) -> Vec<EmittedMessage> {
        self.lock().emitted.clone()
    }

    fn register(&self, event: &str, handler: EventHandler, once: bool) -> ListenerId {
        let mut inner = self.lock();
        inner.next_listener += 1;
        let id = ListenerId::new(inner.next_listener);
        inner
            .listeners
            .entry(event.to_string())
            .or_default()
            .push(Listener { id, once, handler });
        id
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for MemoryTransport {
    fn emit(&self, event: &str, payload: Value, ack: AckCallback) {
        let responder = {
            let mut inner = self.lock();
            inner.emitted.push(EmittedMessage {
                event: event.to_string(),
                payload: payload.clone(),
            });
            inner.responder.clone()
        };

        if let Some(response) = responder.and_then(|responder| responder(event, &payload)) {
            ack(response);
            return;
        }

        self.lock().pending.push_back(PendingAck {
            event: event.to_string(),
            payload,
            ack,
        });
    }

    fn on(&self, event: &str, handler: EventHandler) -> ListenerId {
        self.register(event, handler, false)
    }

    fn once(&self, event: &str, handler: EventHandler) -> ListenerId {
        self.register(event, handler, true)
    }

    fn off(&self, event: &str, id: ListenerId) {
        let mut inner = self.lock();
        if let Some(listeners) = inner.listeners.get_mut(event) {
            listeners.retain(|listener| listener.id != id);
            if listeners.is_empty() {
                inner.listeners.remove(event);
            }
        }
    }
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("MemoryTransport")
            .field("listeners", &inner.listeners.len())
            .field("pending", &inner.pending.len())
            .field("emitted", &inner.emitted.len())
            .finish()
    }
}
