//! Response stream operator: push events as a lazy latest-value stream.
//!
//! A [`ResponseStream`] registers one shared handler for all of its event
//! names the first time it is polled. The handler feeds a single slot: an
//! event arriving while a pull is pending is claimed by that pull, and an
//! event arriving with nobody waiting replaces whatever unclaimed value was
//! there before. Dropping the stream removes every listener it registered.

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use futures_util::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::transport::{ListenerId, Transport};

#[derive(Default)]
struct Slot {
    /// Value handed to the pull that was waiting when it arrived.
    claimed: Option<Value>,
    /// Most recent value that arrived with no pull waiting.
    latest: Option<Value>,
    waiting: bool,
    waker: Option<Waker>,
}

#[derive(Clone, Default)]
struct SharedSlot(Arc<Mutex<Slot>>);

impl SharedSlot {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, payload: Value) {
        let waker = {
            let mut slot = self.lock();
            if slot.waiting {
                slot.waiting = false;
                slot.claimed = Some(payload);
                slot.waker.take()
            } else {
                slot.latest = Some(payload);
                None
            }
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    fn take_or_wait(&self, waker: &Waker) -> Option<Value> {
        let mut slot = self.lock();
        if let Some(value) = slot.claimed.take().or_else(|| slot.latest.take()) {
            return Some(value);
        }
        slot.waiting = true;
        slot.waker = Some(waker.clone());
        None
    }
}

/// Infinite stream of payloads pushed under one or more event names.
///
/// `D` is the payload type; the default `Value` passes payloads through
/// untouched. Payloads that fail to decode into `D` are logged and skipped.
pub struct ResponseStream<T, D = Value>
where
    T: Transport,
{
    transport: T,
    events: Vec<String>,
    slot: SharedSlot,
    listeners: Vec<(String, ListenerId)>,
    subscribed: bool,
    _payload: PhantomData<fn() -> D>,
}

impl<T, D> ResponseStream<T, D>
where
    T: Transport,
{
    /// Repeated names are kept once, at their first position.
    pub(crate) fn new(transport: T, mut events: Vec<String>) -> Self {
        let mut seen = HashSet::new();
        events.retain(|event| seen.insert(event.clone()));
        Self {
            transport,
            events,
            slot: SharedSlot::default(),
            listeners: Vec::new(),
            subscribed: false,
            _payload: PhantomData,
        }
    }

    /// Event names feeding this stream.
    pub fn event_names(&self) -> &[String] {
        &self.events
    }

    /// Whether the first pull already registered the listeners.
    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    fn subscribe(&mut self) {
        let slot = self.slot.clone();
        let handler: crate::transport::EventHandler =
            Arc::new(move |payload| slot.deliver(payload));
        for event in &self.events {
            let id = self.transport.on(event, Arc::clone(&handler));
            self.listeners.push((event.clone(), id));
        }
        self.subscribed = true;
        debug!(event = "response_subscribed", names = ?self.events);
    }

    fn unsubscribe(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        for (event, id) in self.listeners.drain(..) {
            self.transport.off(&event, id);
        }
        debug!(event = "response_unsubscribed", names = ?self.events);
    }
}

impl<T, D> Stream for ResponseStream<T, D>
where
    T: Transport + Unpin,
    D: DeserializeOwned,
{
    type Item = D;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<D>> {
        let this = self.get_mut();
        if !this.subscribed {
            this.subscribe();
        }

        while let Some(payload) = this.slot.take_or_wait(cx.waker()) {
            match serde_json::from_value::<D>(payload) {
                Ok(decoded) => return Poll::Ready(Some(decoded)),
                Err(err) => {
                    warn!(
                        event = "response_payload_skipped",
                        names = ?this.events,
                        error = %err
                    );
                }
            }
        }
        Poll::Pending
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, None)
    }
}

impl<T, D> Drop for ResponseStream<T, D>
where
    T: Transport,
{
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl<T, D> fmt::Debug for ResponseStream<T, D>
where
    T: Transport,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseStream")
            .field("events", &self.events)
            .field("subscribed", &self.subscribed)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
