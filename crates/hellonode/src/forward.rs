//! # Forwarding Handler
//!
//! Fans an inbound call out to every address on the destination list and
//! answers the original caller once.
//!
//! ## States (per inbound call)
//!
//! - **Idle**: nothing sent.
//! - **AwaitingAny**: one outbound call per destination, each with its own
//!   channel, all tagged with the same request token.
//! - **Replied**: terminal. The caller has its one answer.
//!
//! ## Policy
//!
//! - **First success wins**: the first outbound success is forwarded. Later
//!   closures are logged and dropped.
//! - **All failed**: when every destination has failed, the last failure is
//!   forwarded, so the caller is never left waiting.
//! - **Nobody to ask**: an empty list answers `NoDestinations` at once.

use std::sync::Arc;
use std::sync::Mutex;

use hellorpc::Address;
use hellorpc::CallResult;
use hellorpc::Caller;
use hellorpc::Channel;
use hellorpc::FailureReason;
use hellorpc::RequestState;
use hellorpc::Rpc;
use hellorpc::RpcHandler;
use hellorpc::Value;
use hellorpc::value;

use crate::destinations::DestinationList;

/// Method invoked on each destination.
pub const FORWARD_METHOD: &str = "HW.Test";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FanOutState {
    Idle,
    AwaitingAny { outstanding: usize },
    Replied,
}

/// Bookkeeping shared by the channels of one inbound call.
struct FanOut {
    request: RequestState,
    state: Mutex<FanOutState>,
}

impl FanOut {
    fn new(request: RequestState) -> Arc<Self> {
        Arc::new(Self {
            request,
            state: Mutex::new(FanOutState::Idle),
        })
    }

    fn start(&self, outstanding: usize) {
        *self.lock() = FanOutState::AwaitingAny { outstanding };
    }

    /// Records one outbound result and replies if it settles the call.
    fn settle(&self, from: Address, result: CallResult) {
        let reply = {
            let mut state = self.lock();
            match *state {
                FanOutState::AwaitingAny { outstanding } => {
                    let remaining = outstanding.saturating_sub(1);
                    if result.is_ok() || remaining == 0 {
                        *state = FanOutState::Replied;
                        Some(result)
                    } else {
                        *state = FanOutState::AwaitingAny { outstanding: remaining };
                        tracing::debug!(%from, remaining, "forward failed, waiting on others");
                        None
                    }
                }
                FanOutState::Replied => {
                    tracing::debug!(%from, request = self.request.id(), "late forward reply suppressed");
                    None
                }
                FanOutState::Idle => {
                    tracing::warn!(%from, "forward reply before fan-out started");
                    None
                }
            }
        };

        if let Some(result) = reply {
            tracing::info!(%from, request = self.request.id(), ok = result.is_ok(), "forwarding reply");
            if let Err(e) = self.request.complete(result) {
                tracing::warn!(error = %e, "forward reply rejected");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FanOutState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Forwards every call to the addresses on a shared `DestinationList`.
pub struct ForwardingHandler {
    destinations: DestinationList,
    method: String,
}

impl ForwardingHandler {
    pub fn new(destinations: DestinationList) -> Self {
        Self::with_method(destinations, FORWARD_METHOD)
    }

    /// Forwards to `method` instead of `HW.Test`.
    pub fn with_method(destinations: DestinationList, method: impl Into<String>) -> Self {
        Self {
            destinations,
            method: method.into(),
        }
    }

    pub fn destinations(&self) -> &DestinationList {
        &self.destinations
    }
}

impl RpcHandler for ForwardingHandler {
    fn handle_rpc(&self, rpc: &Rpc, caller: &Caller, method: &str, args: Vec<Value>, request: RequestState) {
        tracing::info!(%caller, method, request = request.id(), "forward: inbound call");

        let key = match value::arg(&args, 0).and_then(Value::as_bytes) {
            Ok(bytes) => Value::Bytes(bytes.to_vec()),
            Err(e) => {
                tracing::warn!(%caller, method, error = %e, "forward: undecodable argument");
                if let Err(e) = rpc.send_failure(&request, FailureReason::from(e)) {
                    tracing::debug!(error = %e, "forward reply not sent");
                }
                return;
            }
        };

        let targets = self.destinations.snapshot();
        if targets.is_empty() {
            tracing::info!(request = request.id(), "forward: no destinations");
            if let Err(e) = rpc.send_failure(&request, FailureReason::NoDestinations) {
                tracing::debug!(error = %e, "forward reply not sent");
            }
            return;
        }

        let fan_out = FanOut::new(request);
        fan_out.start(targets.len());

        for dest in targets {
            let channel: Channel<CallResult> = Channel::new();
            let settle = fan_out.clone();
            // a fresh channel cannot already have a callback
            let _ = channel.on_close(move |result| settle.settle(dest, result));
            rpc.invoke(dest, channel, &self.method, vec![key.clone()]);
        }
    }
}
