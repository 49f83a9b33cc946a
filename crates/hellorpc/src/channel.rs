//! # Correlation Channel
//!
//! A single-slot box that receives exactly one result and hands it to exactly
//! one continuation.
//!
//! ## Lifecycle
//!
//! `Empty → Filled → Closed`. A `deliver` fills and closes the channel in one
//! step. The close callback fires once, on whichever side completes the pair:
//!
//! - callback registered first: it runs on the delivering task, inside `deliver`.
//! - result delivered first: the callback runs inside `on_close`.
//!
//! ## Invariants
//!
//! - At most one delivery. Later deliveries return `AlreadyClosed` and change nothing.
//! - At most one callback. It is never invoked while the internal lock is held.

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;

use tokio::sync::oneshot;

type Callback<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// Misuse of a correlation channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// A result was already delivered.
    AlreadyClosed,
    /// A close callback was already registered.
    CallbackAlreadySet,
    /// Every handle was dropped before a value arrived.
    Abandoned,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyClosed => write!(f, "channel already closed"),
            Self::CallbackAlreadySet => write!(f, "close callback already registered"),
            Self::Abandoned => write!(f, "channel dropped before delivery"),
        }
    }
}

impl std::error::Error for ChannelError {}

enum Slot<T> {
    /// Nothing delivered yet, maybe a callback waiting.
    Empty(Option<Callback<T>>),
    /// Delivered, callback not yet registered.
    Filled(T),
    /// Delivered and handed to the callback.
    Closed,
}

/// Single-use asynchronous result slot.
///
/// Cloning yields another handle to the same slot, so one clone can be given to
/// the sender while another registers the continuation.
pub struct Channel<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self { slot: self.slot.clone() }
    }
}

impl<T: Send + 'static> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Channel<T> {
    pub fn new() -> Self {
        Self { slot: Arc::new(Mutex::new(Slot::Empty(None))) }
    }

    /// Stores `value` and closes the channel, firing the callback if one is set.
    pub fn deliver(&self, value: T) -> Result<(), ChannelError> {
        let callback = {
            let mut slot = self.lock();
            match std::mem::replace(&mut *slot, Slot::Closed) {
                Slot::Empty(Some(callback)) => callback,
                Slot::Empty(None) => {
                    *slot = Slot::Filled(value);
                    return Ok(());
                }
                filled @ Slot::Filled(_) => {
                    *slot = filled;
                    return Err(ChannelError::AlreadyClosed);
                }
                Slot::Closed => return Err(ChannelError::AlreadyClosed),
            }
        };

        callback(value);
        Ok(())
    }

    /// Registers the continuation that receives the delivered value.
    ///
    /// If the value is already here, `callback` runs before this returns.
    pub fn on_close<F>(&self, callback: F) -> Result<(), ChannelError>
    where
        F: FnOnce(T) + Send + 'static,
    {
        let value = {
            let mut slot = self.lock();
            match std::mem::replace(&mut *slot, Slot::Closed) {
                Slot::Empty(None) => {
                    *slot = Slot::Empty(Some(Box::new(callback)));
                    return Ok(());
                }
                waiting @ Slot::Empty(Some(_)) => {
                    *slot = waiting;
                    return Err(ChannelError::CallbackAlreadySet);
                }
                Slot::Filled(value) => value,
                Slot::Closed => return Err(ChannelError::CallbackAlreadySet),
            }
        };

        callback(value);
        Ok(())
    }

    /// True once a value has been delivered.
    pub fn is_closed(&self) -> bool {
        !matches!(&*self.lock(), Slot::Empty(_))
    }

    /// Awaits the delivered value.
    ///
    /// This uses up the close callback, so it cannot be combined with `on_close`.
    pub async fn recv(self) -> Result<T, ChannelError> {
        let (tx, rx) = oneshot::channel();
        self.on_close(move |value| {
            let _ = tx.send(value);
        })?;
        drop(self);
        rx.await.map_err(|_| ChannelError::Abandoned)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slot<T>> {
        // callbacks run outside the lock, a poisoned slot is still consistent
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
