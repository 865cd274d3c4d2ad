use std::collections::TryReserveError;

/// Reasons a queue operation can fail. None of these are fatal: the queue is left exactly as it
/// was before the call, and the caller decides whether to retry.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The operation was handed no queue at all.
    #[error("no queue to operate on")]
    InvalidQueue,
    /// Storage for a new node could not be obtained.
    #[error("could not allocate a queue node")]
    NodeAlloc(#[source] TryReserveError),
    /// Storage for the copied string could not be obtained.
    #[error("could not allocate {len} bytes for the stored string")]
    PayloadAlloc {
        len: usize,
        #[source]
        source: TryReserveError,
    },
    /// Removal was requested from a queue with nothing in it.
    #[error("queue is empty")]
    Empty,
}

impl QueueError {
    pub fn is_alloc_failure(&self) -> bool {
        matches!(self, QueueError::NodeAlloc(_) | QueueError::PayloadAlloc { .. })
    }
}

/// A broken structural invariant, as reported by [`Queue::check_invariants`].
///
/// [`Queue::check_invariants`]: crate::Queue::check_invariants
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("size is {size} but head present = {head}, tail present = {tail}")]
    Ends { size: usize, head: bool, tail: bool },
    #[error("chain from head links to a released node")]
    DanglingLink,
    #[error("chain from head does not terminate")]
    Cycle,
    #[error("size is {recorded} but {reachable} nodes are reachable from head")]
    SizeMismatch { recorded: usize, reachable: usize },
    #[error("last node reachable from head is not the tail")]
    TailNotLast,
    #[error("{live} nodes are live but only {reachable} are reachable from head")]
    Leaked { live: usize, reachable: usize },
}
