//! # Error Definitions
//!
//! Two families live here:
//!
//! - `FailureReason` is what a caller sees when a call does not produce a value.
//!   It crosses the wire, so it carries only owned, serializable data.
//! - `DispatchError` and `ReplyError` are local operational errors. Dispatch
//!   errors are turned into a `FailureReason` and sent back to the caller; they
//!   never bring the node down.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::value::DecodeError;
use crate::value::Value;

/// Outcome of a single call as seen by the caller.
pub type CallResult = std::result::Result<Value, FailureReason>;

/// Reasons a call failed (the "Err" side of a reply).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The method name had no `prefix.` part.
    MalformedMethod(String),
    /// No handler is registered under the prefix.
    NoSuchHandler(String),
    /// A reflected object has no method with this name.
    MethodNotFound(String),
    /// A reflected method was called with the wrong number of arguments.
    BadArgumentCount { expected: usize, found: usize },
    /// An argument did not have the expected shape.
    Decode(String),
    /// A forwarding handler had nobody to forward to.
    NoDestinations,
    /// The destination could not be reached.
    Unreachable(String),
    /// No reply arrived within the call timeout.
    Timeout,
    /// The handler released the request without replying.
    Dropped,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedMethod(m) => write!(f, "malformed method name '{}'", m),
            Self::NoSuchHandler(p) => write!(f, "no handler registered for '{}'", p),
            Self::MethodNotFound(m) => write!(f, "method '{}' not found", m),
            Self::BadArgumentCount { expected, found } => {
                write!(f, "expected {} argument(s), got {}", expected, found)
            }
            Self::Decode(msg) => write!(f, "bad argument: {}", msg),
            Self::NoDestinations => write!(f, "no destinations to forward to"),
            Self::Unreachable(msg) => write!(f, "destination unreachable: {}", msg),
            Self::Timeout => write!(f, "call timed out"),
            Self::Dropped => write!(f, "request dropped without a reply"),
        }
    }
}

impl std::error::Error for FailureReason {}

impl From<DecodeError> for FailureReason {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Routing failures inside the handler registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The method name has no separator.
    MalformedMethod(String),
    /// Nothing is registered under this prefix.
    NoSuchHandler(String),
    /// A handler is already registered under this prefix.
    DuplicatePrefix(String),
    /// The reflected object has no such method.
    MethodNotFound(String),
    /// Arity mismatch on a reflected method.
    BadArgumentCount { expected: usize, found: usize },
    /// Type mismatch on a reflected method.
    BadArgument(DecodeError),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedMethod(m) => write!(f, "malformed method name '{}'", m),
            Self::NoSuchHandler(p) => write!(f, "no handler registered for '{}'", p),
            Self::DuplicatePrefix(p) => write!(f, "a handler is already registered for '{}'", p),
            Self::MethodNotFound(m) => write!(f, "method '{}' not found", m),
            Self::BadArgumentCount { expected, found } => {
                write!(f, "expected {} argument(s), got {}", expected, found)
            }
            Self::BadArgument(e) => write!(f, "bad argument: {}", e),
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<DecodeError> for DispatchError {
    fn from(e: DecodeError) -> Self {
        Self::BadArgument(e)
    }
}

impl From<DispatchError> for FailureReason {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::MalformedMethod(m) => Self::MalformedMethod(m),
            DispatchError::NoSuchHandler(p) => Self::NoSuchHandler(p),
            // registration-only, dispatch never produces it
            DispatchError::DuplicatePrefix(p) => Self::NoSuchHandler(p),
            DispatchError::MethodNotFound(m) => Self::MethodNotFound(m),
            DispatchError::BadArgumentCount { expected, found } => {
                Self::BadArgumentCount { expected, found }
            }
            DispatchError::BadArgument(e) => Self::Decode(e.to_string()),
        }
    }
}

/// The single-reply primitive refused a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyError {
    /// A reply was already sent for this request.
    AlreadyReplied { request: u64 },
}

impl fmt::Display for ReplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyReplied { request } => {
                write!(f, "request {} has already been replied to", request)
            }
        }
    }
}

impl std::error::Error for ReplyError {}
