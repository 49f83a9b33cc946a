//! # hellonode
//!
//! Three small overlay programs built on `hellorpc`, plus a one-shot client.
//!
//! - `hw-echo`: answers `HwRpc.*` with the first argument.
//! - `hw-forward`: relays `HwRpc.*` to addresses typed at the console and
//!   answers `HW.*` with the first argument.
//! - `hw-reflect`: answers `HwRpc.Test` through a reflected object.
//! - `hw-call`: sends one call and prints the reply.

pub mod client;
pub mod config;
pub mod console;
pub mod destinations;
pub mod echo;
pub mod forward;
pub mod reflected;
pub mod shell;

/// Prefix every node variant serves.
pub const SERVICE_PREFIX: &str = "HwRpc";

/// Prefix of the data endpoint the forwarding node also serves.
pub const DATA_PREFIX: &str = "HW";
