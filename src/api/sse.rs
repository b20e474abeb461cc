// src/api/sse.rs

//! Rendering a [`ChunkStream`] as Server-Sent Events.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{Stream, StreamExt};

use crate::stream::{Chunk, ChunkKind, ChunkStream};

/// One `data:` event per chunk, `id:` set to the sequence number.
///
/// Uses the default event type so a plain `EventSource.onmessage` sees
/// every chunk.
pub fn chunk_event(chunk: &Chunk) -> Event {
    Event::default()
        .id(chunk.seq.to_string())
        .data(wire_text(chunk))
}

/// The `data:` payload. Process output is tagged with its stream; system and
/// error notices already carry their own prefix.
fn wire_text(chunk: &Chunk) -> String {
    let text = sanitize(&chunk.text);
    match chunk.kind {
        ChunkKind::Stdout => format!("[stdout] {text}"),
        ChunkKind::Stderr => format!("[stderr] {text}"),
        ChunkKind::System | ChunkKind::Error => text,
    }
}

/// A bare `\r` would be read as a line break by the browser's SSE parser.
fn sanitize(text: &str) -> String {
    text.replace('\r', "")
}

/// The SSE response for one subscription. It ends when the task's
/// broadcaster closes; dropping it (peer gone) unsubscribes.
pub fn chunk_sse(
    stream: ChunkStream,
    keep_alive: Duration,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = stream.map(|chunk| Ok::<_, Infallible>(chunk_event(&chunk)));
    Sse::new(events).keep_alive(KeepAlive::new().interval(keep_alive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskId;

    fn chunk(kind: ChunkKind, text: &str) -> Chunk {
        Chunk {
            task_id: TaskId::from("t"),
            seq: 0,
            kind,
            text: text.into(),
        }
    }

    #[test]
    fn carriage_returns_are_dropped() {
        assert_eq!(sanitize("50%\r75%\r100%"), "50%75%100%");
        assert_eq!(sanitize("plain"), "plain");
    }

    #[test]
    fn output_is_tagged_with_its_stream() {
        assert_eq!(wire_text(&chunk(ChunkKind::Stdout, "hi")), "[stdout] hi");
        assert_eq!(wire_text(&chunk(ChunkKind::Stderr, "oops\r")), "[stderr] oops");
        assert_eq!(
            wire_text(&chunk(ChunkKind::System, "[system] process exited with code 0")),
            "[system] process exited with code 0"
        );
        assert_eq!(
            wire_text(&chunk(ChunkKind::Error, "[error] failed to start process: x")),
            "[error] failed to start process: x"
        );
    }
}
