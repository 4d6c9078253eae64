//! Connection bootstrap for the Scrapbox socket.
//!
//! Opening the underlying transport is left to a [`Connector`]; this module
//! waits for the transport's first `connect` or `disconnect` event and keeps
//! the resulting [`Socket`] in a caller-owned [`SocketCell`] so a process
//! connects at most once.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{oneshot, OnceCell};
use tracing::{debug, info, warn};

use crate::socket::client::{Socket, SocketOptions};
use crate::transport::{ListenerId, Transport, CONNECT_EVENT, DISCONNECT_EVENT};

/// Origin the Scrapbox socket is served from.
pub const SCRAPBOX_ENDPOINT: &str = "https://scrapbox.io";
/// Delay between reconnection attempts of the Scrapbox client.
pub const DEFAULT_RECONNECTION_DELAY: Duration = Duration::from_millis(5_000);

/// Options handed to a [`Connector`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Origin the transport connects to.
    pub endpoint: String,
    /// Delay the transport waits before each reconnection attempt.
    pub reconnection_delay: Duration,
    /// Transport names the client may use, in preference order.
    pub transports: Vec<String>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            endpoint: SCRAPBOX_ENDPOINT.to_string(),
            reconnection_delay: DEFAULT_RECONNECTION_DELAY,
            transports: vec!["websocket".to_string()],
        }
    }
}

impl ConnectOptions {
    /// Sets an explicit endpoint, e.g. for a staging server.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end().to_string();
        self
    }

    /// Overrides the delay between reconnection attempts.
    pub fn with_reconnection_delay(mut self, delay: Duration) -> Self {
        self.reconnection_delay = delay;
        self
    }
}

/// Errors produced while establishing the socket connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The connector could not create a transport.
    #[error("failed to open transport: {0}")]
    Open(String),

    /// The transport disconnected before it reported `connect`.
    #[error("disconnected before connect: {reason}")]
    Disconnected { reason: Value },
}

/// Creates transports for [`connect`].
///
/// `open` must not fire `connect` synchronously; the handshake listeners are
/// registered after it returns.
pub trait Connector {
    type Transport: Transport + Clone + Unpin + 'static;

    /// Creates a transport that starts connecting to `options.endpoint`.
    fn open(&self, options: &ConnectOptions) -> Result<Self::Transport, ConnectError>;
}

struct HandshakeListeners<'a, T: Transport + ?Sized> {
    transport: &'a T,
    connect: ListenerId,
    disconnect: ListenerId,
}

impl<T: Transport + ?Sized> Drop for HandshakeListeners<'_, T> {
    fn drop(&mut self) {
        self.transport.off(CONNECT_EVENT, self.connect);
        self.transport.off(DISCONNECT_EVENT, self.disconnect);
    }
}

enum Handshake {
    Connected,
    Disconnected(Value),
}

/// Waits for the first `connect` or `disconnect` event of `transport`.
pub async fn wait_until_connected<T>(transport: &T) -> Result<(), ConnectError>
where
    T: Transport + ?Sized,
{
    let (tx, rx) = oneshot::channel();
    let tx = Arc::new(Mutex::new(Some(tx)));

    let settle = move |outcome: Handshake| {
        let sender = tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(sender) = sender {
            let _ = sender.send(outcome);
        }
    };
    let on_disconnect = settle.clone();

    let _listeners = HandshakeListeners {
        transport,
        connect: transport.once(CONNECT_EVENT, Arc::new(move |_| settle(Handshake::Connected))),
        disconnect: transport.once(
            DISCONNECT_EVENT,
            Arc::new(move |reason| on_disconnect(Handshake::Disconnected(reason))),
        ),
    };

    match rx.await {
        Ok(Handshake::Connected) => {
            debug!(event = "socket_connected");
            Ok(())
        }
        Ok(Handshake::Disconnected(reason)) => {
            warn!(event = "socket_connect_failed", reason = %reason);
            Err(ConnectError::Disconnected { reason })
        }
        Err(_) => Err(ConnectError::Disconnected {
            reason: Value::String("handshake listeners dropped by transport".to_string()),
        }),
    }
}

/// Opens a transport through `connector` and waits until it is connected.
pub async fn connect<C>(connector: &C, options: &ConnectOptions) -> Result<C::Transport, ConnectError>
where
    C: Connector,
{
    info!(
        event = "socket_connecting",
        endpoint = %options.endpoint,
        transports = ?options.transports
    );
    let transport = connector.open(options)?;
    wait_until_connected(&transport).await?;
    Ok(transport)
}

/// Caller-owned, once-initialized socket handle.
///
/// Concurrent callers of [`SocketCell::get_or_connect`] share a single
/// connection attempt. A failed attempt leaves the cell empty so the next
/// call tries again.
pub struct SocketCell<T> {
    cell: OnceCell<Socket<T>>,
}

impl<T> SocketCell<T>
where
    T: Transport + Clone + Unpin + 'static,
{
    /// Creates an empty cell.
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Returns the socket when a previous call connected it.
    pub fn get(&self) -> Option<&Socket<T>> {
        self.cell.get()
    }

    /// Returns the connected socket, connecting through `connector` first if
    /// needed.
    pub async fn get_or_connect<C>(
        &self,
        connector: &C,
        options: &ConnectOptions,
        socket_options: SocketOptions,
    ) -> Result<&Socket<T>, ConnectError>
    where
        C: Connector<Transport = T>,
    {
        self.cell
            .get_or_try_init(|| async move {
                let transport = connect(connector, options).await?;
                Ok::<_, ConnectError>(Socket::with_options(transport, socket_options))
            })
            .await
    }
}

impl<T> Default for SocketCell<T>
where
    T: Transport + Clone + Unpin + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SocketCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketCell")
            .field("connected", &self.cell.initialized())
            .finish()
    }
}
