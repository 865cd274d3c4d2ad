//! A queue of owned strings on a singly-linked chain: insert at either end, remove from the
//! head, reverse and stable-sort in place.
//!
//! [`Queue`] is the native API. The [`nullable`] module offers the same operations over an
//! `Option<Queue>` handle with `bool` results, for callers that treat "no queue" as a value.

mod arena;
mod error;
mod fault;
pub mod nullable;
mod queue;

pub use crate::error::{QueueError, Violation};
pub use crate::queue::{IntoIter, Iter, Queue};
