//! Request operator: one emit + ack exchange turned into a single result.
//!
//! Each call races the acknowledgement against a timer and against the
//! transport's disconnect event. Whichever fires first settles the call; the
//! losers are dropped together when the race returns, so no timer or
//! listener outlives the call.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::error::{classify, RequestError};
use crate::transport::{ListenerId, Transport, DISCONNECT_EVENT};

/// How an acknowledgement without a `data` field is treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AckPayload {
    /// `data` must be present; its absence is a protocol violation.
    Required,
    /// The event has no success payload; an empty ack resolves to `null`.
    Empty,
}

/// Disconnect listener registered for the lifetime of one request.
struct PendingRequest<'a, T: Transport + ?Sized> {
    transport: &'a T,
    listener: ListenerId,
}

impl<'a, T: Transport + ?Sized> PendingRequest<'a, T> {
    fn register(transport: &'a T, disconnected: oneshot::Sender<Value>) -> Self {
        let disconnected = Arc::new(Mutex::new(Some(disconnected)));
        let listener = transport.once(
            DISCONNECT_EVENT,
            Arc::new(move |reason| {
                let sender = disconnected
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(sender) = sender {
                    let _ = sender.send(reason);
                }
            }),
        );
        Self {
            transport,
            listener,
        }
    }
}

impl<T: Transport + ?Sized> Drop for PendingRequest<'_, T> {
    fn drop(&mut self) {
        self.transport.off(DISCONNECT_EVENT, self.listener);
    }
}

/// Emits `payload` under `event` and waits for the first of ack, timeout or
/// disconnect.
pub(crate) async fn send_request<T>(
    transport: &T,
    event: &str,
    payload: Value,
    timeout: Duration,
    expect: AckPayload,
) -> Result<Value, RequestError>
where
    T: Transport + ?Sized,
{
    let (ack_tx, ack_rx) = oneshot::channel();
    let (disconnect_tx, disconnect_rx) = oneshot::channel();

    let registration = PendingRequest::register(transport, disconnect_tx);
    transport.emit(
        event,
        payload,
        Box::new(move |response| {
            // The receiver is gone once the call settled another way.
            let _ = ack_tx.send(response);
        }),
    );

    let timer = tokio::time::sleep(timeout);
    tokio::pin!(timer);

    let outcome = tokio::select! {
        biased;
        Ok(response) = ack_rx => interpret_ack(response, expect),
        Ok(reason) = disconnect_rx => {
            debug!(event = "request_disconnected", name = event, reason = %reason);
            Err(RequestError::Disconnected { reason })
        }
        _ = &mut timer => {
            debug!(
                event = "request_timeout",
                name = event,
                timeout_ms = timeout.as_millis() as u64
            );
            Err(RequestError::timeout(timeout))
        }
    };
    drop(registration);

    if let Err(error) = &outcome {
        if !error.is_transient() {
            debug!(event = "request_failed", name = event, kind = ?error.kind());
        }
    }
    outcome
}

/// Splits an acknowledgement into success data or a classified failure.
///
/// `null`, `false`, `0` and `""` in the `error` field count as no error. With
/// [`AckPayload::Empty`] any `data` field is ignored.
pub(crate) fn interpret_ack(response: Value, expect: AckPayload) -> Result<Value, RequestError> {
    let mut fields = match response {
        Value::Object(fields) => fields,
        Value::Null if expect == AckPayload::Empty => return Ok(Value::Null),
        other => {
            warn!(event = "ack_not_an_object", response = %other);
            return Err(RequestError::ProtocolViolation { response: other });
        }
    };

    if fields.get("error").is_some_and(is_set) {
        return Err(classify(fields.remove("error").unwrap_or_default()));
    }
    match expect {
        AckPayload::Empty => Ok(Value::Null),
        AckPayload::Required => match fields.remove("data") {
            Some(data) => Ok(data),
            None => {
                let response = Value::Object(fields);
                warn!(event = "ack_missing_data", response = %response);
                Err(RequestError::ProtocolViolation { response })
            }
        },
    }
}

fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
