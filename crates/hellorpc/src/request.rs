//! Per-call reply token.

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tokio::sync::oneshot;

use crate::error::CallResult;
use crate::error::FailureReason;
use crate::error::ReplyError;
use crate::value::Value;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque token identifying one inbound call and the route back to its caller.
///
/// Handlers may clone it freely (a forwarding handler tags every outbound
/// channel with it), but only the first reply through any clone is accepted.
/// When the last clone is dropped without a reply the caller observes
/// `FailureReason::Dropped`.
#[derive(Clone)]
pub struct RequestState {
    id: u64,
    reply: Arc<Mutex<Option<oneshot::Sender<CallResult>>>>,
}

impl RequestState {
    /// Creates a request token and the receiver its single reply arrives on.
    pub fn new() -> (Self, oneshot::Receiver<CallResult>) {
        let (tx, rx) = oneshot::channel();
        let state = Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            reply: Arc::new(Mutex::new(Some(tx))),
        };
        (state, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// True once any clone has replied.
    pub fn is_replied(&self) -> bool {
        self.lock().is_none()
    }

    /// Replies with `value`. Same as `Rpc::send_result`, usable from continuations.
    pub fn send_result(&self, value: Value) -> Result<(), ReplyError> {
        self.complete(Ok(value))
    }

    /// Replies with a failure.
    pub fn send_failure(&self, reason: FailureReason) -> Result<(), ReplyError> {
        self.complete(Err(reason))
    }

    /// Sends the one reply for this request.
    pub fn complete(&self, result: CallResult) -> Result<(), ReplyError> {
        let tx = self
            .lock()
            .take()
            .ok_or(ReplyError::AlreadyReplied { request: self.id })?;

        if tx.send(result).is_err() {
            tracing::debug!(request = self.id, "caller went away before the reply");
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<oneshot::Sender<CallResult>>> {
        self.reply.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestState")
            .field("id", &self.id)
            .field("replied", &self.is_replied())
            .finish()
    }
}

/// Awaits the reply for a request, mapping an abandoned request to `Dropped`.
pub async fn await_reply(rx: oneshot::Receiver<CallResult>) -> CallResult {
    rx.await.unwrap_or(Err(FailureReason::Dropped))
}
