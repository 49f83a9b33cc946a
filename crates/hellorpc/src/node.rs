//! Node identity and connection lifecycle.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::address::Address;
use crate::rpc::Rpc;

/// Where a node is in its connection lifecycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Offline,
    Connecting,
    Connected,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Offline => "offline",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// A participant on the overlay: an address, its RPC manager, and its state.
///
/// `Disconnected` is terminal; once reached, `connect` does nothing.
pub struct Node {
    address: Address,
    rpc: Arc<Rpc>,
    state: watch::Sender<ConnectionState>,
}

impl Node {
    pub fn new(rpc: Arc<Rpc>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Offline);
        Self {
            address: rpc.local_address(),
            rpc,
            state,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn rpc(&self) -> &Arc<Rpc> {
        &self.rpc
    }

    pub fn con_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Moves the node online.
    pub fn connect(&self) {
        self.transition(ConnectionState::Connecting);
        self.transition(ConnectionState::Connected);
    }

    /// Moves the node to the terminal `Disconnected` state.
    pub fn disconnect(&self) {
        self.transition(ConnectionState::Disconnected);
    }

    /// A receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Resolves once the node is disconnected.
    pub async fn wait_disconnected(&self) {
        let mut rx = self.subscribe();
        // the sender lives in `self`, so the channel cannot close under us
        let _ = rx.wait_for(|s| *s == ConnectionState::Disconnected).await;
    }

    fn transition(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == ConnectionState::Disconnected || *current == next {
                return false;
            }
            tracing::info!(address = %self.address, from = %current, to = %next, "connection state");
            *current = next;
            true
        });
    }
}
