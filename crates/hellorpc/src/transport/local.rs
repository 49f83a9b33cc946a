//! In-process overlay.
//!
//! Nodes attach their `Rpc` under their address; calls between attached nodes
//! go straight through `Rpc::deliver_call`. Used by tests and single-process
//! demos.

use std::sync::Arc;
use std::sync::Weak;

use dashmap::DashMap;

use crate::address::Address;
use crate::error::CallResult;
use crate::error::FailureReason;
use crate::rpc::Caller;
use crate::rpc::Rpc;
use crate::transport::Transport;
use crate::transport::TransportError;
use crate::value::Value;

/// Shared switchboard for in-process nodes.
#[derive(Clone, Default)]
pub struct LocalOverlay {
    nodes: Arc<DashMap<Address, Weak<Rpc>>>,
}

impl LocalOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that sends from `from` through this overlay.
    pub fn transport(&self, from: Address) -> Arc<dyn Transport> {
        Arc::new(LocalTransport {
            from,
            nodes: self.nodes.clone(),
        })
    }

    /// Makes `rpc` reachable under its local address.
    pub fn attach(&self, rpc: &Arc<Rpc>) {
        self.nodes.insert(rpc.local_address(), Arc::downgrade(rpc));
    }

    /// Makes `address` unreachable.
    pub fn detach(&self, address: &Address) {
        self.nodes.remove(address);
    }

    /// Builds an `Rpc` for `address` wired to this overlay and attaches it.
    pub fn spawn_rpc(&self, address: Address) -> Arc<Rpc> {
        let rpc = Arc::new(Rpc::new(address, self.transport(address)));
        self.attach(&rpc);
        rpc
    }
}

struct LocalTransport {
    from: Address,
    nodes: Arc<DashMap<Address, Weak<Rpc>>>,
}

#[async_trait::async_trait]
impl Transport for LocalTransport {
    fn has_route(&self, dest: &Address) -> bool {
        self.nodes.contains_key(dest)
    }

    async fn call(&self, dest: &Address, method: &str, args: Vec<Value>) -> CallResult {
        let target = self.nodes.get(dest).and_then(|w| w.value().upgrade());
        let Some(rpc) = target else {
            return Err(FailureReason::from(TransportError::NoRoute(*dest)));
        };

        let reply = rpc.deliver_call(Caller::Remote(self.from), method, args);
        drop(rpc);
        reply.await
    }
}
