//! The operator-maintained list of forwarding destinations.

use std::sync::Arc;
use std::sync::RwLock;

use hellorpc::Address;

/// Append-only, shared list of addresses.
///
/// The console appends while dispatch reads. Readers take a snapshot copy, so a
/// dispatch sees exactly the entries appended before its snapshot and never
/// blocks on later input.
#[derive(Clone, Debug, Default)]
pub struct DestinationList {
    inner: Arc<RwLock<Vec<Address>>>,
}

impl DestinationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, address: Address) {
        self.write().push(address);
    }

    /// A copy of the current entries, in insertion order.
    pub fn snapshot(&self) -> Vec<Address> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Address>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Address>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FromIterator<Address> for DestinationList {
    fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
        Self { inner: Arc::new(RwLock::new(iter.into_iter().collect())) }
    }
}
