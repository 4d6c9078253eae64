//! Event transport consumed by the socket adapter.
//!
//! The adapter does not speak any wire protocol itself. It drives a duplex
//! event channel through the [`Transport`] trait: emit with an
//! acknowledgement callback, plus `on`/`once`/`off` subscriptions keyed by
//! event name. The reserved [`DISCONNECT_EVENT`] carries the disconnect
//! reason as its payload.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// In-process transport used by tests and demos.
pub mod memory;

/// Reserved event fired when the transport loses its connection.
pub const DISCONNECT_EVENT: &str = "disconnect";
/// Reserved event fired once the transport is connected.
pub const CONNECT_EVENT: &str = "connect";

/// Push-event handler shared between every name it is registered for.
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// One-shot acknowledgement callback attached to a single emitted message.
pub type AckCallback = Box<dyn FnOnce(Value) + Send>;

/// Identifies one registered listener so it can be removed again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Wraps a transport-assigned listener number.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the transport-assigned listener number.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Duplex event channel driven by the adapter.
///
/// Implementations are expected to be cheap handles: the adapter clones them
/// into every subscription it creates and never closes the underlying
/// connection.
pub trait Transport: Send + Sync {
    /// Sends `payload` under `event`.
    ///
    /// `ack` must be invoked at most once, when the peer replies.
    fn emit(&self, event: &str, payload: Value, ack: AckCallback);

    /// Registers `handler` for every future occurrence of `event`.
    fn on(&self, event: &str, handler: EventHandler) -> ListenerId;

    /// Registers `handler` for the next occurrence of `event` only.
    fn once(&self, event: &str, handler: EventHandler) -> ListenerId;

    /// Removes a listener previously returned by [`Transport::on`] or
    /// [`Transport::once`]. Unknown ids are ignored.
    fn off(&self, event: &str, id: ListenerId);
}

impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    fn emit(&self, event: &str, payload: Value, ack: AckCallback) {
        (**self).emit(event, payload, ack)
    }

    fn on(&self, event: &str, handler: EventHandler) -> ListenerId {
        (**self).on(event, handler)
    }

    fn once(&self, event: &str, handler: EventHandler) -> ListenerId {
        (**self).once(event, handler)
    }

    fn off(&self, event: &str, id: ListenerId) {
        (**self).off(event, id)
    }
}
