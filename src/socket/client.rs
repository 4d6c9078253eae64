//! Socket facade combining the request and response operators.
//!
//! `Socket` closes over one transport handle and a request timeout. It holds
//! no other state: every request owns its own registrations and every
//! response stream owns its own listeners.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::retry::{retry_async, RetryPolicy};
use crate::socket::error::RequestError;
use crate::socket::proto::{
    CommitData, CommitResponseData, Cursor, JoinRoomData, JoinRoomResponseData, ListenEvent,
    MoveCursorRequest, RequestEvent, SocketIoRequest, SocketIoRequestData, SocketIoResponse,
};
use crate::socket::request::{send_request, AckPayload};
use crate::socket::response::ResponseStream;
use crate::transport::Transport;

/// Default settings applied by [`Socket::new`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SocketDefaults;

impl SocketDefaults {
    /// Acknowledgement timeout of the Scrapbox client.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(90_000);
}

/// Per-socket configuration.
#[derive(Clone, Debug)]
pub struct SocketOptions {
    /// How long a request waits for its acknowledgement.
    pub request_timeout: Duration,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            request_timeout: SocketDefaults::REQUEST_TIMEOUT,
        }
    }
}

/// Request/response and push-stream access over one transport.
#[derive(Clone, Debug)]
pub struct Socket<T> {
    transport: T,
    request_timeout: Duration,
}

impl<T> Socket<T>
where
    T: Transport + Clone + Unpin + 'static,
{
    /// Wraps a connected transport with default options.
    pub fn new(transport: T) -> Self {
        Self::with_options(transport, SocketOptions::default())
    }

    /// Wraps a connected transport with explicit options.
    pub fn with_options(transport: T, options: SocketOptions) -> Self {
        Self {
            transport,
            request_timeout: options.request_timeout,
        }
    }

    /// Overrides the acknowledgement timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Current acknowledgement timeout.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Returns the wrapped transport handle.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends a typed request and decodes its acknowledgement.
    ///
    /// A success payload that does not decode into `E::Response` resolves as
    /// [`RequestError::Unexpected`] carrying the raw payload.
    pub async fn request<E>(&self, data: &E::Data) -> Result<E::Response, RequestError>
    where
        E: RequestEvent,
    {
        // Events without a success payload decode from `null`.
        let expect = if E::HAS_RESPONSE_DATA {
            AckPayload::Required
        } else {
            AckPayload::Empty
        };
        let payload = encode_payload(data)?;
        let value = send_request(
            &self.transport,
            E::NAME,
            payload,
            self.request_timeout,
            expect,
        )
        .await?;
        decode_response(E::NAME, value)
    }

    /// Sends a raw payload under `event` and returns the raw `data` field.
    pub async fn request_raw(&self, event: &str, payload: Value) -> Result<Value, RequestError> {
        send_request(
            &self.transport,
            event,
            payload,
            self.request_timeout,
            AckPayload::Required,
        )
        .await
    }

    /// Sends a typed request, retrying timeouts and disconnects per `policy`.
    ///
    /// A timed-out or disconnected attempt may still have been applied by the
    /// server. Resending a commit after that can fail with
    /// `NotFastForwardError` even though the first attempt landed.
    pub async fn request_with_retry<E>(
        &self,
        data: &E::Data,
        policy: &RetryPolicy,
    ) -> Result<E::Response, RequestError>
    where
        E: RequestEvent,
    {
        retry_async(
            policy,
            move |attempt| {
                debug!(event = "request_attempt", name = E::NAME, attempt);
                self.request::<E>(data)
            },
            RequestError::is_transient,
        )
        .await
    }

    /// Typed stream of one push event.
    pub fn response<E>(&self) -> ResponseStream<T, E::Data>
    where
        E: ListenEvent,
    {
        ResponseStream::new(self.transport.clone(), vec![E::NAME.to_string()])
    }

    /// Raw stream fed by every name in `events`.
    pub fn response_raw<I, S>(&self, events: I) -> ResponseStream<T, Value>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ResponseStream::new(
            self.transport.clone(),
            events.into_iter().map(Into::into).collect(),
        )
    }

    /// Commits page changes and returns the new commit id.
    pub async fn commit(&self, commit: CommitData) -> Result<CommitResponseData, RequestError> {
        let response = self
            .request::<SocketIoRequest>(&SocketIoRequestData::Commit(commit))
            .await?;
        match response {
            SocketIoResponse::Commit(data) => Ok(data),
            other => Err(mismatched_response(other)),
        }
    }

    /// Joins a page or project room.
    pub async fn join_room(
        &self,
        room: JoinRoomData,
    ) -> Result<JoinRoomResponseData, RequestError> {
        let response = self
            .request::<SocketIoRequest>(&SocketIoRequestData::JoinRoom(room))
            .await?;
        match response {
            SocketIoResponse::JoinRoom(data) => Ok(data),
            other => Err(mismatched_response(other)),
        }
    }

    /// Moves the local cursor. The acknowledgement has no success payload.
    pub async fn move_cursor(&self, cursor: &MoveCursorRequest) -> Result<(), RequestError> {
        self.request::<Cursor>(cursor).await
    }
}

fn encode_payload<D: Serialize>(data: &D) -> Result<Value, RequestError> {
    serde_json::to_value(data).map_err(|err| RequestError::InvalidPayload {
        message: err.to_string(),
    })
}

fn decode_response<R: DeserializeOwned>(event: &str, value: Value) -> Result<R, RequestError> {
    match serde_json::from_value::<R>(value.clone()) {
        Ok(decoded) => Ok(decoded),
        Err(err) => {
            warn!(event = "response_decode_failed", name = event, error = %err);
            Err(RequestError::Unexpected { value })
        }
    }
}

fn mismatched_response(response: SocketIoResponse) -> RequestError {
    let value = match serde_json::to_value(&response) {
        Ok(value) => value,
        Err(err) => {
            warn!(event = "response_encode_failed", error = %err, response = ?response);
            Value::Null
        }
    };
    RequestError::Unexpected { value }
}
