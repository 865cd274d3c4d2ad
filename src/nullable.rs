//! Flat functions over a queue that may be absent.
//!
//! Existing callers hold an optional queue and want plain `bool`/`usize` answers instead of
//! errors. Every function here accepts `None` without complaint: mutators report `false` or do
//! nothing, and `size` reports 0.

use crate::error::QueueError;
use crate::queue::Queue;

fn require<'a>(queue: Option<&'a mut Queue>, op: &str) -> Result<&'a mut Queue, QueueError> {
    queue.ok_or_else(|| {
        log::debug!("{} called without a queue", op);
        QueueError::InvalidQueue
    })
}

/// Creates an empty queue, or `None` if it could not be allocated.
pub fn new() -> Option<Queue> {
    Queue::with_capacity(0).ok()
}

/// Releases the queue and everything in it. Does nothing for `None`.
pub fn free(queue: Option<Queue>) {
    if let Some(queue) = queue {
        queue.free();
    }
}

/// Returns true if `value` was copied onto the front of the queue.
pub fn insert_head(queue: Option<&mut Queue>, value: &str) -> bool {
    require(queue, "insert_head")
        .and_then(|queue| queue.insert_head(value))
        .is_ok()
}

/// Returns true if `value` was copied onto the back of the queue.
pub fn insert_tail(queue: Option<&mut Queue>, value: &str) -> bool {
    require(queue, "insert_tail")
        .and_then(|queue| queue.insert_tail(value))
        .is_ok()
}

/// Returns true if a node was removed from the front of the queue.
///
/// When `out` is given, the removed string is copied into it: at most `out.len() - 1` bytes,
/// always followed by a NUL, with the remainder zero-filled. Truncation is silent.
pub fn remove_head(queue: Option<&mut Queue>, out: Option<&mut [u8]>) -> bool {
    require(queue, "remove_head")
        .and_then(|queue| queue.remove_head_into(out))
        .is_ok()
}

pub fn size(queue: Option<&Queue>) -> usize {
    queue.map_or(0, Queue::size)
}

pub fn reverse(queue: Option<&mut Queue>) {
    if let Some(queue) = queue {
        queue.reverse();
    }
}

pub fn sort(queue: Option<&mut Queue>) {
    if let Some(queue) = queue {
        queue.sort();
    }
}
