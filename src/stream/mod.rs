// src/stream/mod.rs

//! Output broadcasting.
//!
//! - [`chunk`] defines the unit of output delivered to observers.
//! - [`broadcaster`] holds one task's log and subscriber set.
//! - [`subscription`] is the consumer side: a [`ChunkStream`] per observer.

pub mod broadcaster;
pub mod chunk;
pub mod subscription;

pub use broadcaster::Broadcaster;
pub use chunk::{Chunk, ChunkKind};
pub use subscription::ChunkStream;
