//! Typed Rust adapter for the Scrapbox realtime socket.
//!
//! The crate is organized by layer:
//! - `transport`: the event-emitter seam and an in-memory implementation.
//! - `socket`: request/acknowledgement and push-stream operators, message
//!   schemas, and the `Socket` facade.
//! - `bootstrap`: connect handshake and the once-initialized socket cell.
//! - `retry`: opt-in retry helpers for transient request failures.

/// Connection handshake and shared socket handle.
pub mod bootstrap;
/// Retry helpers for requests that timed out or were disconnected.
pub mod retry;
/// Socket facade, operators, and protocol types.
pub mod socket;
/// Transport abstraction over an acknowledging event emitter.
pub mod transport;

pub use socket::client::{Socket, SocketOptions};
pub use socket::error::{DomainError, DomainErrorKind, RequestError};
pub use transport::Transport;
