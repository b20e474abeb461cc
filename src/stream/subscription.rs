// src/stream/subscription.rs

use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use futures_util::stream::Stream;
use tokio::sync::mpsc;

use crate::stream::broadcaster::Broadcaster;
use crate::stream::chunk::Chunk;

/// A live view of one task's output.
///
/// Yields chunks in publish order and ends (`None`) once the broadcaster is
/// closed and everything queued has been read. Dropping the stream detaches
/// it from the broadcaster; it never affects the running process.
#[derive(Debug)]
pub struct ChunkStream {
    rx: mpsc::UnboundedReceiver<Chunk>,
    subscription: Option<(u64, Weak<Broadcaster>)>,
}

impl ChunkStream {
    pub(crate) fn attached(
        rx: mpsc::UnboundedReceiver<Chunk>,
        subscriber_id: u64,
        broadcaster: Weak<Broadcaster>,
    ) -> Self {
        Self {
            rx,
            subscription: Some((subscriber_id, broadcaster)),
        }
    }

    /// A stream that is not registered anywhere; it only drains what was
    /// already queued on `rx`.
    pub(crate) fn detached(rx: mpsc::UnboundedReceiver<Chunk>) -> Self {
        Self {
            rx,
            subscription: None,
        }
    }

    /// Wait for the next chunk.
    pub async fn recv(&mut self) -> Option<Chunk> {
        self.rx.recv().await
    }
}

impl Stream for ChunkStream {
    type Item = Chunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Chunk>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        if let Some((id, broadcaster)) = self.subscription.take() {
            if let Some(broadcaster) = broadcaster.upgrade() {
                broadcaster.unsubscribe(id);
            }
        }
    }
}
