//! # Transport Abstraction
//!
//! A minimal, async interface for delivering one call to a remote address and
//! awaiting its reply.
//!
//! ## Philosophy
//!
//! - **Request-Response**: "send a call, await a result" is the only interaction.
//! - **Failures are results**: a transport never panics or hangs on a dead peer;
//!   it reports `FailureReason::Unreachable`. Timeouts are applied by the caller.

use std::fmt;

use crate::address::Address;
use crate::error::CallResult;
use crate::error::FailureReason;
use crate::value::Value;

pub mod local;
pub mod tcp;

/// Errors that occur at the network/transport layer.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// No endpoint is known for the destination.
    NoRoute(Address),
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// A frame could not be encoded or decoded.
    Codec(String),
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRoute(addr) => write!(f, "No route to {}", addr),
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Codec(msg) => write!(f, "Codec error: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

impl From<TransportError> for FailureReason {
    fn from(e: TransportError) -> Self {
        FailureReason::Unreachable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// A mechanism to deliver a call to a peer and receive its result.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends `method(args)` to `dest` and waits for the reply.
    ///
    /// # invariants
    /// - Must return the remote result, success or failure, unchanged.
    /// - Must return `Err(FailureReason::Unreachable)` if the network fails.
    async fn call(&self, dest: &Address, method: &str, args: Vec<Value>) -> CallResult;

    /// True if this transport knows how to reach `dest` at all.
    ///
    /// A `true` answer does not mean the peer is up.
    fn has_route(&self, _dest: &Address) -> bool {
        true
    }
}
