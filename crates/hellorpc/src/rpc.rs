//! # RPC Manager
//!
//! Routes inbound calls to handlers by method-name prefix and issues outbound
//! calls on their behalf.
//!
//! ## Routing
//!
//! A method name is split at its first `.`: `HwRpc.Test` goes to whatever is
//! registered under `HwRpc`, which sees the method `Test`. Two kinds of entries
//! share the registry:
//!
//! - **Handlers** implement `RpcHandler` and receive the request token, so they
//!   may reply later (after outbound calls resolve).
//! - **Objects** implement `Reflect`; their return value is the reply.
//!
//! ## Invariants
//!
//! - Prefixes are registered once and never removed. Re-registration is refused.
//! - Dispatch runs the handler synchronously on the calling task.
//! - Every call that enters through `deliver_call` yields exactly one result.
//! - Every channel passed to `invoke` is closed exactly once, at the latest
//!   when the call timeout expires.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;

use crate::address::Address;
use crate::channel::Channel;
use crate::error::CallResult;
use crate::error::DispatchError;
use crate::error::FailureReason;
use crate::error::ReplyError;
use crate::reflect::MethodTable;
use crate::reflect::Reflect;
use crate::request::RequestState;
use crate::request::await_reply;
use crate::transport::Transport;
use crate::value::Value;

/// Separator between prefix and method.
pub const METHOD_SEPARATOR: char = '.';

/// How long an outbound call may take before its channel is closed with `Timeout`.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Who sent an inbound call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Caller {
    /// Another node on the overlay.
    Remote(Address),
    /// A call originating on this node.
    Local,
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(addr) => write!(f, "{}", addr),
            Self::Local => write!(f, "local"),
        }
    }
}

/// An endpoint for calls under one prefix.
pub trait RpcHandler: Send + Sync + 'static {
    /// Handles `prefix.method(args)`.
    ///
    /// `method` is the part after the first `.`. The handler must eventually
    /// reply through `rpc.send_result` or `rpc.send_failure`, now or from a
    /// continuation.
    fn handle_rpc(
        &self,
        rpc: &Rpc,
        caller: &Caller,
        method: &str,
        args: Vec<Value>,
        request: RequestState,
    );
}

#[derive(Clone)]
enum Entry {
    Handler(Arc<dyn RpcHandler>),
    Object(Arc<MethodTable>),
}

/// Splits `prefix.rest` at the first separator.
pub fn split_method(name: &str) -> Result<(&str, &str), DispatchError> {
    match name.split_once(METHOD_SEPARATOR) {
        Some((prefix, rest)) if !prefix.is_empty() => Ok((prefix, rest)),
        _ => Err(DispatchError::MalformedMethod(name.to_string())),
    }
}

/// The handler registry together with the outbound-call primitive.
pub struct Rpc {
    local: Address,
    transport: Arc<dyn Transport>,
    handlers: DashMap<String, Entry>,
    call_timeout: Duration,
}

impl Rpc {
    pub fn new(local: Address, transport: Arc<dyn Transport>) -> Self {
        Self::with_timeout(local, transport, DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_timeout(local: Address, transport: Arc<dyn Transport>, call_timeout: Duration) -> Self {
        Self {
            local,
            transport,
            handlers: DashMap::new(),
            call_timeout,
        }
    }

    /// The address outbound calls are sent from.
    pub fn local_address(&self) -> Address {
        self.local
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// True if the transport has a route to `dest`.
    pub fn has_route(&self, dest: &Address) -> bool {
        self.transport.has_route(dest)
    }

    /// Registers `handler` for every method under `prefix`.
    pub fn add_handler(&self, prefix: &str, handler: Arc<dyn RpcHandler>) -> Result<(), DispatchError> {
        self.insert(prefix, Entry::Handler(handler))
    }

    /// Registers a reflected object for every method under `prefix`.
    pub fn add_object<T: Reflect>(&self, prefix: &str, object: Arc<T>) -> Result<(), DispatchError> {
        self.insert(prefix, Entry::Object(Arc::new(object.method_table())))
    }

    /// True if something is registered under `prefix`.
    pub fn has_handler(&self, prefix: &str) -> bool {
        self.handlers.contains_key(prefix)
    }

    fn insert(&self, prefix: &str, entry: Entry) -> Result<(), DispatchError> {
        if prefix.is_empty() || prefix.contains(METHOD_SEPARATOR) {
            return Err(DispatchError::MalformedMethod(prefix.to_string()));
        }

        match self.handlers.entry(prefix.to_string()) {
            MapEntry::Occupied(_) => Err(DispatchError::DuplicatePrefix(prefix.to_string())),
            MapEntry::Vacant(slot) => {
                slot.insert(entry);
                tracing::debug!(prefix, "registered rpc handler");
                Ok(())
            }
        }
    }

    /// Routes one call to its handler.
    ///
    /// On `Err` no handler has run and `request` is untouched; the caller
    /// decides how to report it. Reflected objects are answered before this
    /// returns.
    pub fn dispatch(
        &self,
        caller: &Caller,
        method_name: &str,
        args: Vec<Value>,
        request: RequestState,
    ) -> Result<(), DispatchError> {
        let (prefix, method) = split_method(method_name)?;

        // clone the entry out so handlers may touch the registry
        let entry = self
            .handlers
            .get(prefix)
            .map(|e| e.value().clone())
            .ok_or_else(|| DispatchError::NoSuchHandler(prefix.to_string()))?;

        match entry {
            Entry::Handler(handler) => {
                handler.handle_rpc(self, caller, method, args, request);
                Ok(())
            }
            Entry::Object(table) => {
                let value = table.invoke(method, args)?;
                self.reply(&request, Ok(value));
                Ok(())
            }
        }
    }

    /// Entry point for inbound calls.
    ///
    /// Dispatches synchronously, answers dispatch errors on the caller's
    /// behalf, and returns a future for the one result.
    pub fn deliver_call(
        &self,
        caller: Caller,
        method_name: &str,
        args: Vec<Value>,
    ) -> impl Future<Output = CallResult> + Send + use<> {
        let (request, rx) = RequestState::new();

        if let Err(e) = self.dispatch(&caller, method_name, args, request.clone()) {
            tracing::warn!(%caller, method = method_name, error = %e, "dispatch failed");
            self.reply(&request, Err(e.into()));
        }
        drop(request);

        await_reply(rx)
    }

    /// Sends `value` as the reply to `request`.
    pub fn send_result(&self, request: &RequestState, value: Value) -> Result<(), ReplyError> {
        request.complete(Ok(value))
    }

    /// Sends `reason` as the failed reply to `request`.
    pub fn send_failure(&self, request: &RequestState, reason: FailureReason) -> Result<(), ReplyError> {
        request.complete(Err(reason))
    }

    fn reply(&self, request: &RequestState, result: CallResult) {
        if let Err(e) = request.complete(result) {
            tracing::debug!(error = %e, "reply suppressed");
        }
    }

    /// Starts `method(args)` on `dest`; the result is delivered to `channel`.
    ///
    /// Returns immediately. Must be called from within a tokio runtime.
    pub fn invoke(&self, dest: Address, channel: Channel<CallResult>, method: &str, args: Vec<Value>) {
        let transport = self.transport.clone();
        let timeout = self.call_timeout;
        let method = method.to_string();

        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, transport.call(&dest, &method, args)).await {
                Ok(result) => result,
                Err(_) => Err(FailureReason::Timeout),
            };

            if let Err(reason) = &result {
                tracing::warn!(%dest, method = %method, %reason, "outbound call failed");
            }

            if let Err(e) = channel.deliver(result) {
                tracing::debug!(%dest, method = %method, error = %e, "outbound result discarded");
            }
        });
    }

    /// Calls `method(args)` on `dest` and waits for the result.
    pub async fn call(&self, dest: Address, method: &str, args: Vec<Value>) -> CallResult {
        let channel = Channel::new();
        self.invoke(dest, channel.clone(), method, args);
        channel
            .recv()
            .await
            .unwrap_or(Err(FailureReason::Dropped))
    }
}
