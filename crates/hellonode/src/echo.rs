//! Direct-reply handler: answers every call with its first argument.

use hellorpc::Caller;
use hellorpc::FailureReason;
use hellorpc::RequestState;
use hellorpc::Rpc;
use hellorpc::RpcHandler;
use hellorpc::Value;
use hellorpc::value;

/// Logs the call and replies with argument 0 unchanged.
///
/// Argument 0 must be bytes; anything else fails that one call with a
/// `Decode` failure.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoHandler;

impl RpcHandler for EchoHandler {
    fn handle_rpc(&self, rpc: &Rpc, caller: &Caller, method: &str, mut args: Vec<Value>, request: RequestState) {
        let decoded = value::arg(&args, 0).and_then(Value::as_bytes);
        let reply = match decoded {
            Ok(bytes) => {
                tracing::info!(%caller, method, payload = %String::from_utf8_lossy(bytes), "echo");
                rpc.send_result(&request, args.swap_remove(0))
            }
            Err(e) => {
                tracing::warn!(%caller, method, error = %e, "echo: undecodable argument");
                rpc.send_failure(&request, FailureReason::from(e))
            }
        };

        if let Err(e) = reply {
            tracing::debug!(error = %e, "echo reply not sent");
        }
    }
}
