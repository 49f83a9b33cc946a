//! Reflection-style endpoint: plain methods, found by name.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use hellorpc::MethodTable;
use hellorpc::Reflect;

/// Answers `prefix.Test(bytes)` with the same bytes.
#[derive(Debug, Default)]
pub struct HelloReflect {
    calls: AtomicU64,
}

impl HelloReflect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn test(&self, arg: Vec<u8>) -> Vec<u8> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        tracing::info!(payload = %String::from_utf8_lossy(&arg), "rpc handler called through reflection");
        arg
    }

    /// Number of successful `Test` calls so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Reflect for HelloReflect {
    fn method_table(self: Arc<Self>) -> MethodTable {
        MethodTable::new("HelloReflect").method("Test", move |arg: Vec<u8>| self.test(arg))
    }
}
