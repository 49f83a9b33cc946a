//! # TCP Transport
//!
//! Carries calls between processes as newline-delimited JSON frames.
//!
//! ## Architecture
//!
//! - **Client side** (`TcpTransport`): one persistent `Link` per destination.
//!   Each link owns a pump task that reads replies and routes them to the
//!   pending call with the same sequence number.
//! - **Server side** (`serve`): accepts connections, hands every `Call` frame to
//!   `Rpc::deliver_call`, and writes the `Reply` whenever it resolves. Replies on
//!   one connection may come back out of order.
//!
//! ## Limits
//!
//! A frame longer than `MAX_FRAME_LEN` bytes ends the connection it arrived on.
//!
//! ## Routing
//!
//! Endpoints come from a static table (`add_route`). There is no discovery; a
//! destination without a route fails with `Unreachable`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use serde::Deserialize;
use serde::Serialize;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use crate::address::Address;
use crate::error::CallResult;
use crate::error::FailureReason;
use crate::rpc::Caller;
use crate::rpc::Rpc;
use crate::transport;
use crate::transport::Transport;
use crate::transport::TransportError;
use crate::value::Value;

/// Longest accepted frame, newline excluded.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// One line on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Frame {
    Call {
        seq: u64,
        from: Address,
        method: String,
        args: Vec<Value>,
    },
    Reply {
        seq: u64,
        result: CallResult,
    },
}

impl Frame {
    /// Serializes the frame followed by `\n`.
    pub fn encode(&self) -> transport::Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    pub fn decode(line: &str) -> transport::Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

/// Reads one newline-terminated frame of at most `limit` bytes.
///
/// Returns `None` on a clean end of stream.
pub(crate) async fn read_frame<R>(reader: &mut R, limit: usize) -> transport::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let read = reader.take(limit as u64 + 1).read_until(b'\n', &mut line).await?;
    if read == 0 {
        return Ok(None);
    }

    if line.last() != Some(&b'\n') {
        if line.len() > limit {
            return Err(TransportError::Codec(format!("frame longer than {} bytes", limit)));
        }
        return Err(TransportError::ConnectionLost("stream closed mid-frame".into()));
    }

    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line)
        .map(Some)
        .map_err(|e| TransportError::Codec(e.to_string()))
}

type Pending = DashMap<u64, oneshot::Sender<CallResult>>;

/// Drops the pending entry for `seq` when the call ends, however it ends.
struct PendingGuard<'a> {
    pending: &'a Pending,
    seq: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.seq);
    }
}

/// A connection to one destination with its reply pump.
struct Link {
    writer: Mutex<OwnedWriteHalf>,
    pending: Arc<Pending>,
    alive: Arc<AtomicBool>,
}

impl Link {
    /// Connects and spawns the pump task.
    async fn connect(endpoint: SocketAddr) -> transport::Result<Self> {
        let stream = TcpStream::connect(endpoint)
            .await
            .map_err(|e| TransportError::ConnectionLost(format!("{}: {}", endpoint, e)))?;
        let (read_half, write_half) = stream.into_split();

        let pending: Arc<Pending> = Arc::new(DashMap::new());
        let alive = Arc::new(AtomicBool::new(true));

        let pump_pending = pending.clone();
        let pump_alive = alive.clone();

        tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            let error = loop {
                match read_frame(&mut reader, MAX_FRAME_LEN).await {
                    Ok(Some(line)) => {
                        if let Err(e) = Self::handle_line(&line, &pump_pending) {
                            tracing::warn!(%endpoint, error = %e, "bad frame from peer");
                            break e;
                        }
                    }
                    Ok(None) => break TransportError::ConnectionLost("stream closed".into()),
                    Err(e) => {
                        tracing::warn!(%endpoint, error = %e, "transport error in pump");
                        break e;
                    }
                }
            };

            pump_alive.store(false, Ordering::SeqCst);
            Self::notify_all_pending(&pump_pending, &error);
        });

        Ok(Self {
            writer: Mutex::new(write_half),
            pending,
            alive,
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Routes one reply line to its waiting call.
    fn handle_line(line: &str, pending: &Pending) -> transport::Result<()> {
        let Frame::Reply { seq, result } = Frame::decode(line)? else {
            return Err(TransportError::Codec("expected Reply frame".into()));
        };

        // no entry: a late reply for a call that already gave up
        if let Some((_, tx)) = pending.remove(&seq) {
            let _ = tx.send(result);
        }
        Ok(())
    }

    fn notify_all_pending(pending: &Pending, error: &TransportError) {
        let keys: Vec<u64> = pending.iter().map(|e| *e.key()).collect();
        for key in keys {
            if let Some((_, tx)) = pending.remove(&key) {
                let _ = tx.send(Err(FailureReason::from(error.clone())));
            }
        }
    }

    async fn call(&self, frame: Frame, seq: u64) -> CallResult {
        let line = frame.encode().map_err(FailureReason::from)?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, tx);
        // also runs when the caller gives up on this future
        let _guard = PendingGuard { pending: &self.pending, seq };

        // the pump may have drained `pending` just before our insert
        if !self.is_alive() {
            return Err(TransportError::ConnectionLost("link closed".into()).into());
        }

        let written = self.writer.lock().await.write_all(&line).await;
        if let Err(e) = written {
            self.alive.store(false, Ordering::SeqCst);
            return Err(TransportError::from(e).into());
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(TransportError::ConnectionLost("link closed".into()).into()),
        }
    }
}

/// Client half of the TCP transport.
pub struct TcpTransport {
    local: Address,
    routes: DashMap<Address, SocketAddr>,
    links: DashMap<Address, Arc<Link>>,
    seq_gen: AtomicU64,
}

impl TcpTransport {
    pub fn new(local: Address) -> Self {
        Self {
            local,
            routes: DashMap::new(),
            links: DashMap::new(),
            seq_gen: AtomicU64::new(1),
        }
    }

    pub fn local(&self) -> Address {
        self.local
    }

    /// Records where `address` can be reached. Replaces any earlier route.
    pub fn add_route(&self, address: Address, endpoint: SocketAddr) {
        self.routes.insert(address, endpoint);
    }

    pub fn route(&self, address: &Address) -> Option<SocketAddr> {
        self.routes.get(address).map(|e| *e.value())
    }

    /// Calls still waiting for a reply, over all links.
    pub fn pending_calls(&self) -> usize {
        self.links.iter().map(|link| link.pending.len()).sum()
    }

    /// Returns a live link to `dest`, reconnecting if the last one died.
    ///
    /// No lock is held while connecting, so a slow destination never delays
    /// calls to the others. When two calls connect at once the first link
    /// stored wins and the other is dropped.
    async fn link(&self, dest: &Address) -> transport::Result<Arc<Link>> {
        let endpoint = self.route(dest).ok_or(TransportError::NoRoute(*dest))?;

        if let Some(link) = self.links.get(dest).filter(|link| link.is_alive()) {
            return Ok(link.value().clone());
        }

        tracing::debug!(%dest, %endpoint, "opening link");
        let fresh = Arc::new(Link::connect(endpoint).await?);

        let mut slot = self.links.entry(*dest).or_insert_with(|| fresh.clone());
        if !slot.is_alive() {
            *slot = fresh;
        }
        Ok(slot.value().clone())
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    fn has_route(&self, dest: &Address) -> bool {
        self.routes.contains_key(dest)
    }

    async fn call(&self, dest: &Address, method: &str, args: Vec<Value>) -> CallResult {
        let link = self.link(dest).await?;
        let seq = self.seq_gen.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::Call {
            seq,
            from: self.local,
            method: method.to_string(),
            args,
        };
        link.call(frame, seq).await
    }
}

/// Accepts connections on `listener` and answers their calls through `rpc`.
///
/// Runs until the task is aborted or accepting fails.
pub async fn serve(listener: TcpListener, rpc: Arc<Rpc>) -> transport::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::debug!(%peer, "accepted connection");
        tokio::spawn(handle_connection(stream, peer, rpc.clone()));
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, rpc: Arc<Rpc>) {
    let (read_half, mut write_half) = stream.into_split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let writer = tokio::spawn(async move {
        while let Some(line) = out_rx.recv().await {
            if let Err(e) = write_half.write_all(&line).await {
                tracing::warn!(%peer, error = %e, "failed to write reply");
                break;
            }
        }
    });

    let mut reader = BufReader::new(read_half);
    loop {
        let line = match read_frame(&mut reader, MAX_FRAME_LEN).await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "closing connection");
                break;
            }
        };

        let (seq, from, method, args) = match Frame::decode(&line) {
            Ok(Frame::Call { seq, from, method, args }) => (seq, from, method, args),
            Ok(Frame::Reply { seq, .. }) => {
                tracing::warn!(%peer, seq, "unexpected Reply frame on server connection");
                continue;
            }
            Err(e) => {
                tracing::warn!(%peer, error = %e, "undecodable frame");
                continue;
            }
        };

        let reply = rpc.deliver_call(Caller::Remote(from), &method, args);
        let out = out_tx.clone();
        tokio::spawn(async move {
            let frame = Frame::Reply { seq, result: reply.await };
            match frame.encode() {
                Ok(bytes) => {
                    let _ = out.send(bytes);
                }
                Err(e) => tracing::warn!(seq, error = %e, "failed to encode reply"),
            }
        });
    }

    // outstanding replies still hold senders; the writer ends when they finish
    drop(out_tx);
    let _ = writer.await;
}
