//! Per-connection outbound queue with buffered byte accounting
//!
//! The arena never touches a socket directly. It pushes serialized frames into
//! an [`Outbound`]; the connection's writer task drains them through the
//! matching [`FrameReceiver`]. Bytes count as buffered from the moment they are
//! queued until the writer has handed them to the socket.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::ws::protocol::ServerMsg;

/// Droppable frames are skipped while a connection has more than this queued
pub const DROP_BUFFER_BYTES: usize = 256_000;

/// A reliable send that would exceed this aborts the connection
pub const RELIABLE_CEILING_BYTES: usize = 4 * 1024 * 1024;

/// Frame queued for the writer task
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(Arc<str>),
    Close { code: u16, reason: &'static str },
}

/// Result of a reliable send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Connection already closing, frame discarded
    Closed,
    /// Buffer ceiling exceeded, connection aborted
    Overflow,
}

struct LinkState {
    buffered: AtomicUsize,
    closing: AtomicBool,
    shutdown: watch::Sender<bool>,
}

/// Sending half held by the arena and the connection task
#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<Frame>,
    link: Arc<LinkState>,
}

/// Receiving half owned by the writer task
pub struct FrameReceiver {
    rx: mpsc::UnboundedReceiver<Frame>,
    link: Arc<LinkState>,
}

impl Outbound {
    pub fn channel() -> (Outbound, FrameReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        let link = Arc::new(LinkState {
            buffered: AtomicUsize::new(0),
            closing: AtomicBool::new(false),
            shutdown,
        });
        (
            Outbound {
                tx,
                link: link.clone(),
            },
            FrameReceiver { rx, link },
        )
    }

    /// Bytes queued but not yet written to the socket
    pub fn buffered_bytes(&self) -> usize {
        self.link.buffered.load(Ordering::Acquire)
    }

    pub fn is_closing(&self) -> bool {
        self.link.closing.load(Ordering::Acquire)
    }

    /// Queue a frame regardless of backpressure, up to the hard ceiling
    pub fn send_reliable(&self, text: Arc<str>) -> Delivery {
        if self.is_closing() {
            return Delivery::Closed;
        }
        if self.buffered_bytes() + text.len() > RELIABLE_CEILING_BYTES {
            self.abort();
            return Delivery::Overflow;
        }
        self.push(text);
        Delivery::Queued
    }

    /// Queue a frame unless this connection is already backed up.
    /// Returns whether the frame was queued.
    pub fn send_droppable(&self, text: Arc<str>) -> bool {
        if self.is_closing() || self.buffered_bytes() > DROP_BUFFER_BYTES {
            return false;
        }
        self.push(text);
        true
    }

    /// Serialize and send a single message reliably
    pub fn send_msg(&self, msg: &ServerMsg) -> Delivery {
        match encode(msg) {
            Some(text) => self.send_reliable(text),
            None => Delivery::Closed,
        }
    }

    /// Queue a close frame behind everything already queued; later sends are discarded
    pub fn close(&self, code: u16, reason: &'static str) {
        if self.link.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.tx.send(Frame::Close { code, reason });
    }

    /// Tear the connection down immediately, discarding queued frames
    pub fn abort(&self) {
        self.link.closing.store(true, Ordering::Release);
        self.link.shutdown.send_replace(true);
    }

    /// Resolves to true once the writer stopped or the connection was aborted
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.link.shutdown.subscribe()
    }

    fn push(&self, text: Arc<str>) {
        let len = text.len();
        self.link.buffered.fetch_add(len, Ordering::AcqRel);
        if self.tx.send(Frame::Text(text)).is_err() {
            self.link.buffered.fetch_sub(len, Ordering::AcqRel);
        }
    }
}

impl FrameReceiver {
    /// Next queued frame, `None` once every sender is gone or the link was aborted
    pub async fn recv(&mut self) -> Option<Frame> {
        let mut shutdown = self.link.shutdown.subscribe();
        if *shutdown.borrow_and_update() {
            return None;
        }
        tokio::select! {
            frame = self.rx.recv() => frame,
            _ = shutdown.changed() => None,
        }
    }

    /// Record that a text frame of `len` bytes reached the socket
    pub fn written(&self, len: usize) {
        let _ = self
            .link
            .buffered
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |b| Some(b.saturating_sub(len)));
    }

    /// Signal every watcher that this connection is done writing
    pub fn finish(&self) {
        self.link.closing.store(true, Ordering::Release);
        self.link.shutdown.send_replace(true);
    }

    /// Pop a frame without waiting
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }
}

/// Serialize a message once for fan-out
pub fn encode(msg: &ServerMsg) -> Option<Arc<str>> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server message");
            None
        }
    }
}
