//! One-shot caller used by `hw-call`.

use std::sync::Arc;

use hellorpc::Address;
use hellorpc::CallResult;
use hellorpc::Rpc;
use hellorpc::Value;

use crate::config::NodeConfig;

/// Builds an `Rpc` that routes through the peers in `config`. It serves nothing.
pub fn outbound_rpc(config: &NodeConfig) -> Rpc {
    let local = config.address_or_random();
    Rpc::with_timeout(local, Arc::new(config.tcp_transport(local)), config.rpc_timeout())
}

/// Sends `payload` to `method` on `dest` and waits for the reply.
pub async fn call_once(rpc: &Rpc, dest: Address, method: &str, payload: &[u8]) -> CallResult {
    tracing::info!(%dest, method, bytes = payload.len(), "calling");
    rpc.call(dest, method, vec![Value::Bytes(payload.to_vec())]).await
}

/// Renders a reply for the terminal: bytes as text, anything else as JSON.
pub fn render(value: &Value) -> String {
    match value {
        Value::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Value::Str(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{:?}", other)),
    }
}
