//! The per-connection response ordering engine.
//!
//! A connection carrying pipelined requests must put responses on the wire
//! in request-arrival order even though handlers complete in any order. The
//! pipeline keeps a FIFO of in-flight slots, one per message. Only the slot
//! at the head may write to the socket; every other slot's output lands in
//! that slot's private buffer and is flushed when the slot reaches the
//! head. Head status comes from arrival order alone, never from completion
//! time.
//!
//! A slot is retired (popped) only after it was at the head and its output
//! has been fully flushed. When every slot has retired and some message
//! along the way asked for `Connection: close`, the write half is shut
//! down.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, trace, warn};

use crate::connection::ActivityMonitor;
use crate::protocol::SendError;

/// Where a write ended up: on the wire, or parked in the slot's buffer
/// until the slot reaches the head of the queue.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Wire,
    Buffered,
}

/// One connection's ordering engine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Pipeline {
    shared: Arc<Shared>,
}

struct Shared {
    inner: Mutex<Inner>,
    drained: Notify,
    monitor: ActivityMonitor,
}

struct Inner {
    sink: Box<dyn AsyncWrite + Send + Unpin>,
    queue: VecDeque<Slot>,
    next_id: u64,
    close_when_done: bool,
    closed: bool,
}

struct Slot {
    id: u64,
    buffer: BytesMut,
    ended: bool,
}

/// The write-side binding of one in-flight message.
pub struct WriteHandle {
    pipeline: Pipeline,
    id: u64,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

impl fmt::Debug for WriteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteHandle").field("id", &self.id).finish()
    }
}

impl Pipeline {
    pub fn new<W>(sink: W, monitor: ActivityMonitor) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    sink: Box::new(sink),
                    queue: VecDeque::new(),
                    next_id: 0,
                    close_when_done: false,
                    closed: false,
                }),
                drained: Notify::new(),
                monitor,
            }),
        }
    }

    /// Admits a newly parsed message at the tail of the queue.
    pub async fn register(&self) -> WriteHandle {
        let mut inner = self.shared.inner.lock().await;
        let id = inner.next_id;
        inner.next_id += 1;
        inner.queue.push_back(Slot { id, buffer: BytesMut::new(), ended: false });
        self.shared.monitor.begin_write();
        trace!(slot = id, depth = inner.queue.len(), "registered in-flight message");
        WriteHandle { pipeline: self.clone(), id }
    }

    /// Requests connection shutdown once the queue drains.
    pub async fn mark_close_when_done(&self) {
        let mut inner = self.shared.inner.lock().await;
        inner.close_when_done = true;
    }

    async fn write(&self, id: u64, bytes: Bytes) -> Result<WriteOutcome, SendError> {
        if bytes.is_empty() {
            return Ok(WriteOutcome::Wire);
        }
        let mut inner = self.shared.inner.lock().await;
        if inner.closed {
            return Err(SendError::Closed);
        }

        if let Some(head) = inner.queue.front_mut()
            && head.id == id
        {
            let pending =
                if head.buffer.is_empty() { None } else { Some(head.buffer.split().freeze()) };
            if let Some(pending) = pending
                && let Err(e) = inner.write_to_sink(&self.shared.monitor, pending).await
            {
                return Err(self.abort(&mut inner, e));
            }
            if let Err(e) = inner.write_to_sink(&self.shared.monitor, bytes).await {
                return Err(self.abort(&mut inner, e));
            }
            return Ok(WriteOutcome::Wire);
        }

        let Some(slot) = inner.queue.iter_mut().find(|slot| slot.id == id) else {
            return Err(SendError::Closed);
        };
        slot.buffer.extend_from_slice(&bytes);
        trace!(slot = id, buffered = slot.buffer.len(), "buffered bytes behind head of queue");
        Ok(WriteOutcome::Buffered)
    }

    /// Marks the message fully written and flushes every completed head
    /// in arrival order, retiring each one.
    async fn end(&self, id: u64) -> Result<(), SendError> {
        let mut inner = self.shared.inner.lock().await;
        if inner.closed {
            return Err(SendError::Closed);
        }

        if let Some(slot) = inner.queue.iter_mut().find(|slot| slot.id == id) {
            slot.ended = true;
        } else {
            return Err(SendError::Closed);
        }

        // drain: pop ended slots off the head, oldest first
        while inner.queue.front().is_some_and(|slot| slot.ended) {
            let Some(slot) = inner.queue.pop_front() else { break };
            if !slot.buffer.is_empty()
                && let Err(e) = inner.write_to_sink(&self.shared.monitor, slot.buffer.freeze()).await
            {
                self.shared.monitor.end_write();
                return Err(self.abort(&mut inner, e));
            }
            self.shared.monitor.end_write();
            debug!(slot = slot.id, "retired fully flushed message");
        }

        // a still-in-progress slot that just became head releases its
        // backlog now so its later direct writes stay ordered behind it
        let backlog = inner.queue.front_mut().and_then(|head| {
            if head.buffer.is_empty() { None } else { Some(head.buffer.split().freeze()) }
        });
        if let Some(backlog) = backlog
            && let Err(e) = inner.write_to_sink(&self.shared.monitor, backlog).await
        {
            return Err(self.abort(&mut inner, e));
        }

        if let Err(e) = inner.sink.flush().await {
            return Err(self.abort(&mut inner, SendError::io(e)));
        }

        if inner.queue.is_empty() {
            self.shared.drained.notify_waiters();
            if inner.close_when_done {
                debug!("queue drained with close requested, shutting down write half");
                inner.sink.shutdown().await.map_err(SendError::io)?;
                inner.closed = true;
            }
        }
        Ok(())
    }

    /// Closes the pipeline after a sink failure: every in-flight slot is
    /// released so `drained()` waiters and the idle accounting unblock.
    fn abort(&self, inner: &mut Inner, error: SendError) -> SendError {
        warn!(%error, "write half failed, releasing all in-flight messages");
        inner.closed = true;
        while let Some(slot) = inner.queue.pop_front() {
            self.shared.monitor.end_write();
            debug!(slot = slot.id, "dropping in-flight message after sink failure");
        }
        self.shared.drained.notify_waiters();
        error
    }

    /// Resolves once the queue is empty and everything is on the wire.
    pub async fn drained(&self) {
        loop {
            let notified = self.shared.drained.notified();
            {
                let inner = self.shared.inner.lock().await;
                if inner.queue.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Shuts the write half down regardless of queue state. Buffered
    /// output of unfinished messages is dropped.
    pub async fn shutdown(&self) {
        let mut inner = self.shared.inner.lock().await;
        if !inner.closed {
            let _ = inner.sink.shutdown().await;
            inner.closed = true;
            while let Some(slot) = inner.queue.pop_front() {
                self.shared.monitor.end_write();
                debug!(slot = slot.id, "dropping in-flight message on shutdown");
            }
            self.shared.drained.notify_waiters();
        }
    }
}

impl Inner {
    async fn write_to_sink(&mut self, monitor: &ActivityMonitor, bytes: Bytes) -> Result<(), SendError> {
        self.sink.write_all(&bytes).await.map_err(SendError::io)?;
        monitor.touch();
        Ok(())
    }
}

impl WriteHandle {
    /// Accepts `bytes` for this message; they reach the wire immediately
    /// only when the message is at the head of the queue.
    pub async fn write(&self, bytes: Bytes) -> Result<WriteOutcome, SendError> {
        self.pipeline.write(self.id, bytes).await
    }

    /// Declares this message fully written.
    pub async fn end(&self) -> Result<(), SendError> {
        self.pipeline.end(self.id).await
    }

    pub async fn mark_close_when_done(&self) {
        self.pipeline.mark_close_when_done().await;
    }
}
