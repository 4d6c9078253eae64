//! Result taxonomy for socket requests.
//!
//! Every request resolves to `Result<T, RequestError>`. Failures are split
//! into allow-listed domain rejections sent by the server, unexpected error
//! payloads, protocol violations, timeouts and disconnects. [`classify`] is
//! the pure function deciding whether an error payload is a domain error.

use std::fmt;
use std::time::Duration;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Allow-listed discriminants of server-side business rejections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DomainErrorKind {
    /// Generic rejection raised by the socket server while applying a commit.
    SocketIo,
    /// A page with the same title already exists.
    DuplicateTitle,
    /// The commit's parent is not the page's latest commit.
    NotFastForward,
}

impl DomainErrorKind {
    /// Every recognized kind.
    pub const ALL: [DomainErrorKind; 3] = [
        DomainErrorKind::SocketIo,
        DomainErrorKind::DuplicateTitle,
        DomainErrorKind::NotFastForward,
    ];

    /// Wire discriminant of this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            DomainErrorKind::SocketIo => "SocketIOError",
            DomainErrorKind::DuplicateTitle => "DuplicateTitleError",
            DomainErrorKind::NotFastForward => "NotFastForwardError",
        }
    }

    /// Looks up a wire discriminant in the allow-list.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for DomainErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-signalled business rejection, kept exactly as received.
#[derive(Clone, Debug, PartialEq)]
pub struct DomainError {
    kind: DomainErrorKind,
    payload: Map<String, Value>,
}

impl DomainError {
    /// Recognizes an error payload carrying an allow-listed `name` or `kind`.
    ///
    /// Returns the payload untouched when it is not a domain error.
    pub fn from_value(value: Value) -> Result<Self, Value> {
        let payload = match value {
            Value::Object(payload) => payload,
            other => return Err(other),
        };
        let kind = ["name", "kind"]
            .iter()
            .filter_map(|field| payload.get(*field).and_then(Value::as_str))
            .find_map(DomainErrorKind::from_name);
        match kind {
            Some(kind) => Ok(Self { kind, payload }),
            None => Err(Value::Object(payload)),
        }
    }

    /// Allow-listed discriminant of this rejection.
    pub fn kind(&self) -> DomainErrorKind {
        self.kind
    }

    /// Human-readable `message` field, when the server sent one.
    pub fn message(&self) -> Option<&str> {
        self.payload.get("message").and_then(Value::as_str)
    }

    /// The payload as received, including its discriminant.
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Returns the payload as a JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.payload)
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => write!(f, "{}: {message}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl Serialize for DomainError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.payload.serialize(serializer)
    }
}

/// Failure outcome of a socket request.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum RequestError {
    /// Allow-listed business rejection from the server.
    #[error("domain error: {0}")]
    Domain(DomainError),

    /// Any other error payload reported in an acknowledgement.
    #[error("unexpected error: {value}")]
    Unexpected { value: Value },

    /// The acknowledgement carried neither `data` nor `error`.
    #[error("acknowledgement carries neither data nor error: {response}")]
    ProtocolViolation { response: Value },

    /// No acknowledgement arrived within the configured window.
    #[error("Timeout: exceeded {}ms", .timeout.as_millis())]
    Timeout { timeout: Duration },

    /// The transport disconnected before the acknowledgement arrived.
    #[error("disconnected before acknowledgement: {reason}")]
    Disconnected { reason: Value },

    /// The typed request payload could not be encoded as JSON.
    #[error("invalid request payload: {message}")]
    InvalidPayload { message: String },
}

/// Discriminant of a [`RequestError`], for matching without payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// [`RequestError::Domain`] with its allow-listed kind.
    Domain(DomainErrorKind),
    /// [`RequestError::Unexpected`].
    Unexpected,
    /// [`RequestError::ProtocolViolation`].
    ProtocolViolation,
    /// [`RequestError::Timeout`].
    Timeout,
    /// [`RequestError::Disconnected`].
    Disconnected,
    /// [`RequestError::InvalidPayload`].
    InvalidPayload,
}

impl RequestError {
    /// Payload-free discriminant of this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            RequestError::Domain(error) => FailureKind::Domain(error.kind()),
            RequestError::Unexpected { .. } => FailureKind::Unexpected,
            RequestError::ProtocolViolation { .. } => FailureKind::ProtocolViolation,
            RequestError::Timeout { .. } => FailureKind::Timeout,
            RequestError::Disconnected { .. } => FailureKind::Disconnected,
            RequestError::InvalidPayload { .. } => FailureKind::InvalidPayload,
        }
    }

    /// Whether the same request may succeed when sent again unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RequestError::Timeout { .. } | RequestError::Disconnected { .. }
        )
    }

    pub(crate) fn timeout(timeout: Duration) -> Self {
        RequestError::Timeout { timeout }
    }
}

impl Serialize for RequestError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RequestError::Domain(error) => error.serialize(serializer),
            RequestError::Unexpected { value }
            | RequestError::ProtocolViolation { response: value } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("kind", "UnexpectedError")?;
                map.serialize_entry("value", value)?;
                map.end()
            }
            RequestError::Timeout { .. } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("kind", "TimeoutError")?;
                map.serialize_entry("message", &self.to_string())?;
                map.end()
            }
            RequestError::Disconnected { reason } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("kind", "DisconnectError")?;
                map.serialize_entry("message", reason)?;
                map.end()
            }
            RequestError::InvalidPayload { message } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("kind", "InvalidPayloadError")?;
                map.serialize_entry("message", message)?;
                map.end()
            }
        }
    }
}

/// Splits an acknowledgement error payload into domain or unexpected.
pub fn classify(error: Value) -> RequestError {
    match DomainError::from_value(error) {
        Ok(domain) => RequestError::Domain(domain),
        Err(value) => RequestError::Unexpected { value },
    }
}

/// `{ ok, value }` view of a request result.
#[derive(Debug)]
pub struct ResultEnvelope<'a, T>(pub &'a Result<T, RequestError>);

impl<T: Serialize> Serialize for ResultEnvelope<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        match self.0 {
            Ok(value) => {
                map.serialize_entry("ok", &true)?;
                map.serialize_entry("value", value)?;
            }
            Err(error) => {
                map.serialize_entry("ok", &false)?;
                map.serialize_entry("value", error)?;
            }
        }
        map.end()
    }
}
