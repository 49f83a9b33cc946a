//! # hellorpc
//!
//! Prefix-routed RPC for overlay nodes.
//!
//! ## Architecture
//!
//! ```text
//!  inbound call ──► Rpc::deliver_call ──► registry (prefix) ──► RpcHandler / MethodTable
//!                                                                   │
//!                      RequestState ◄── send_result ◄───────────────┤
//!                                                                   │ invoke
//!                                                                   ▼
//!                      Channel::on_close ◄── deliver ◄── Transport::call (remote)
//! ```
//!
//! - `rpc`: registry, dispatch, and the outbound `invoke` primitive.
//! - `channel`: the single-slot correlation channel outbound results land in.
//! - `request`: the per-call reply token; first reply wins.
//! - `reflect`: name-based dispatch for objects without an explicit handler.
//! - `transport`: how calls reach other nodes (in-process or TCP).
//! - `node`: connection lifecycle.

pub mod address;
pub mod channel;
pub mod error;
pub mod node;
pub mod reflect;
pub mod request;
pub mod rpc;
pub mod transport;
pub mod value;

pub use address::Address;
pub use address::AddressParseError;
pub use channel::Channel;
pub use channel::ChannelError;
pub use error::CallResult;
pub use error::DispatchError;
pub use error::FailureReason;
pub use error::ReplyError;
pub use node::ConnectionState;
pub use node::Node;
pub use reflect::MethodTable;
pub use reflect::Reflect;
pub use request::RequestState;
pub use rpc::Caller;
pub use rpc::Rpc;
pub use rpc::RpcHandler;
pub use transport::Transport;
pub use value::DecodeError;
pub use value::Value;
