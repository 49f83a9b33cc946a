//! # Reflection Dispatch
//!
//! Objects that do not implement `RpcHandler` can still be registered under a
//! prefix. They publish a `MethodTable`, and a call to `prefix.Name` resolves to
//! the entry literally named `Name`.
//!
//! ## Conventions
//!
//! - **Naming**: exact, case-sensitive match on the part after the first `.`.
//! - **Signature**: one argument in, one value out, no request token. The
//!   registry turns the return value into the reply.
//! - **Validation**: strict. The argument count must be exactly one and the
//!   argument must convert to the declared parameter type. Violations are
//!   dispatch errors reported to the caller; the object is unaffected.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::DispatchError;
use crate::value::FromValue;
use crate::value::IntoValue;
use crate::value::Value;

type Method = Box<dyn Fn(Value) -> Result<Value, DispatchError> + Send + Sync + 'static>;

/// Arity every reflected method has.
pub const REFLECTED_ARITY: usize = 1;

/// Name-indexed methods of a reflected object.
pub struct MethodTable {
    type_name: &'static str,
    methods: BTreeMap<String, Method>,
}

impl MethodTable {
    pub fn new(type_name: &'static str) -> Self {
        Self { type_name, methods: BTreeMap::new() }
    }

    /// Adds a method taking one `A` and returning an `R`.
    ///
    /// A later entry with the same name replaces the earlier one.
    pub fn method<A, R, F>(mut self, name: &str, f: F) -> Self
    where
        A: FromValue,
        R: IntoValue,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        let method: Method = Box::new(move |arg| {
            let arg = A::from_value(arg)?;
            Ok(f(arg).into_value())
        });
        self.methods.insert(name.to_string(), method);
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Method names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Looks up `name` and calls it with `args`.
    pub fn invoke(&self, name: &str, mut args: Vec<Value>) -> Result<Value, DispatchError> {
        let method = self
            .methods
            .get(name)
            .ok_or_else(|| DispatchError::MethodNotFound(format!("{}::{}", self.type_name, name)))?;

        if args.len() != REFLECTED_ARITY {
            return Err(DispatchError::BadArgumentCount {
                expected: REFLECTED_ARITY,
                found: args.len(),
            });
        }

        let arg = args.remove(0);
        method(arg)
    }
}

/// An object whose methods are found by name.
pub trait Reflect: Send + Sync + 'static {
    /// Builds the method table. The closures hold on to `self`.
    fn method_table(self: Arc<Self>) -> MethodTable;
}
