//! Socket adapter modules.
//!
//! - `client`: the [`Socket`](client::Socket) facade and its options.
//! - `request`: acknowledgement vs timeout vs disconnect race.
//! - `response`: latest-value push-event streams.
//! - `error`: result taxonomy and error classification.
//! - `proto`: message schemas and typed event descriptors.

/// Facade over one transport.
pub mod client;
/// Request outcomes and domain-error classification.
pub mod error;
/// Socket message schemas.
pub mod proto;
mod request;
/// Push-event stream type.
pub mod response;
