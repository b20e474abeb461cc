// src/stream/broadcaster.rs

//! Per-task fan-out of output chunks.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::stream::chunk::{Chunk, ChunkKind};
use crate::stream::subscription::ChunkStream;
use crate::types::{ReplayPolicy, TaskId};

/// Fans out one task's output to every attached [`ChunkStream`].
///
/// All mutation goes through a single mutex, and `publish` forwards to the
/// subscribers while holding it, so every subscriber observes chunks in
/// publish order. The lock is never held across an `.await`.
#[derive(Debug)]
pub struct Broadcaster {
    task_id: TaskId,
    replay: ReplayPolicy,
    max_log_bytes: usize,
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    log: VecDeque<Chunk>,
    log_bytes: usize,
    /// Chunks evicted from the front of `log` to respect `max_log_bytes`.
    evicted: u64,
    subscribers: Vec<Subscriber>,
    /// Streams not yet dropped, including ones still draining after close.
    live_streams: HashSet<u64>,
    next_subscriber_id: u64,
    closed: bool,
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<Chunk>,
}

impl Broadcaster {
    pub fn new(task_id: TaskId, replay: ReplayPolicy, max_log_bytes: usize) -> Arc<Self> {
        Arc::new(Self {
            task_id,
            replay,
            max_log_bytes,
            inner: Mutex::new(Inner::default()),
        })
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a chunk and forward it to every current subscriber.
    ///
    /// Returns the assigned sequence number, or `None` once closed.
    pub fn publish(&self, kind: ChunkKind, text: impl Into<Arc<str>>) -> Option<u64> {
        let mut inner = self.lock();
        if inner.closed {
            trace!(task_id = %self.task_id, "publish after close ignored");
            return None;
        }
        Some(self.publish_locked(&mut inner, kind, text.into()))
    }

    fn publish_locked(&self, inner: &mut Inner, kind: ChunkKind, text: Arc<str>) -> u64 {
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let chunk = Chunk {
            task_id: self.task_id.clone(),
            seq,
            kind,
            text,
        };

        // A failed send means the receiver is gone; drop that subscriber.
        inner
            .subscribers
            .retain(|sub| sub.tx.send(chunk.clone()).is_ok());

        inner.log_bytes += chunk.weight();
        inner.log.push_back(chunk);
        while inner.log_bytes > self.max_log_bytes && inner.log.len() > 1 {
            if let Some(old) = inner.log.pop_front() {
                inner.log_bytes -= old.weight();
                inner.evicted += 1;
            }
        }

        seq
    }

    /// Attach a new subscriber.
    ///
    /// With [`ReplayPolicy::Buffered`] the retained log is queued first, all
    /// under the same lock as live publishing, so nothing is duplicated or
    /// skipped at the boundary. After [`close`](Self::close) the returned
    /// stream is already ended; it still carries the final notice (alone, or
    /// after the replayed log).
    pub fn subscribe(self: &Arc<Self>) -> ChunkStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();

        // Receiver is still local; sends cannot fail.
        match self.replay {
            ReplayPolicy::Buffered => {
                for chunk in inner.log.iter() {
                    let _ = tx.send(chunk.clone());
                }
            }
            // The sentinel is the newest entry and is never evicted.
            ReplayPolicy::None if inner.closed => {
                if let Some(sentinel) = inner.log.back() {
                    let _ = tx.send(sentinel.clone());
                }
            }
            ReplayPolicy::None => {}
        }

        if inner.closed {
            debug!(task_id = %self.task_id, "subscribe after close; returning ended stream");
            return ChunkStream::detached(rx);
        }

        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        inner.subscribers.push(Subscriber { id, tx });
        inner.live_streams.insert(id);
        debug!(
            task_id = %self.task_id,
            subscriber = id,
            subscribers = inner.subscribers.len(),
            "subscriber attached"
        );

        ChunkStream::attached(rx, id, Arc::downgrade(self))
    }

    /// Detach a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, subscriber_id: u64) {
        let mut inner = self.lock();
        inner.subscribers.retain(|sub| sub.id != subscriber_id);
        if inner.live_streams.remove(&subscriber_id) {
            debug!(
                task_id = %self.task_id,
                subscriber = subscriber_id,
                subscribers = inner.live_streams.len(),
                "subscriber detached"
            );
        }
    }

    /// Publish the final sentinel and end every subscriber's stream.
    ///
    /// Only the first call has any effect; it returns `true`.
    pub fn close(&self, kind: ChunkKind, text: impl Into<Arc<str>>) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }
        self.publish_locked(&mut inner, kind, text.into());
        inner.closed = true;
        // Dropping the senders ends each stream once it has drained.
        let ended = std::mem::take(&mut inner.subscribers);
        debug!(
            task_id = %self.task_id,
            subscribers = ended.len(),
            chunks = inner.next_seq,
            "broadcaster closed"
        );
        true
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Streams handed out by `subscribe` that have not been dropped yet.
    pub fn subscriber_count(&self) -> usize {
        self.lock().live_streams.len()
    }

    /// Total number of chunks ever published (including evicted ones).
    pub fn published_count(&self) -> u64 {
        self.lock().next_seq
    }

    /// Copy of the retained log, oldest first.
    pub fn log_snapshot(&self) -> Vec<Chunk> {
        self.lock().log.iter().cloned().collect()
    }

    /// Number of chunks dropped from the log to stay under the byte budget.
    pub fn evicted_count(&self) -> u64 {
        self.lock().evicted
    }
}
