use std::fmt;

use crate::arena::{Arena, Node, NodeId};
use crate::error::{QueueError, Violation};
use crate::fault;

/// A queue of owned strings kept in a singly-linked chain of nodes.
///
/// Every inserted string is copied into storage owned by the queue, so later changes to the
/// caller's string never show up here. Nodes live in an arena and link to each other by index;
/// `head`, `tail` and `size` are only ever changed together, through `relink`.
pub struct Queue {
    nodes: Arena,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    size: usize,
}

impl Queue {
    /// Creates an empty queue. Nothing is allocated until the first insert.
    pub fn new() -> Self {
        Queue {
            nodes: Arena::new(),
            head: None,
            tail: None,
            size: 0,
        }
    }

    /// Creates an empty queue with room for `capacity` nodes, failing instead of aborting if the
    /// room cannot be reserved.
    pub fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
        let nodes = Arena::try_with_capacity(capacity).map_err(|source| {
            log::debug!("could not reserve {} queue nodes: {}", capacity, source);
            QueueError::NodeAlloc(source)
        })?;
        Ok(Queue {
            nodes,
            head: None,
            tail: None,
            size: 0,
        })
    }

    /// Builds a queue by inserting every item at the tail, stopping at the first failure.
    pub fn try_from_iter<I, S>(items: I) -> Result<Self, QueueError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut queue = Queue::new();
        queue.try_extend(items)?;
        Ok(queue)
    }

    /// Inserts every item at the tail. Items inserted before a failure stay in the queue.
    pub fn try_extend<I, S>(&mut self, items: I) -> Result<(), QueueError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for item in items {
            self.insert_tail(item.as_ref())?;
        }
        Ok(())
    }

    /// Releases every node head to tail, then the queue itself.
    pub fn free(mut self) {
        let released = self.clear();
        log::debug!("freed queue and {} nodes", released);
    }

    /// Releases every node, head to tail, leaving an empty queue. Returns how many were released.
    pub fn clear(&mut self) -> usize {
        let mut released = 0;
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let node = self.nodes.release(id);
            cursor = node.next;
            released += 1;
        }
        self.nodes.clear();
        self.relink(None, None, 0);
        released
    }

    /// Copies `value` into a new node at the front of the queue.
    pub fn insert_head(&mut self, value: &str) -> Result<(), QueueError> {
        let id = self.alloc_node(value)?;
        self.link_head(id);
        Ok(())
    }

    /// Copies `value` into a new node at the back of the queue.
    pub fn insert_tail(&mut self, value: &str) -> Result<(), QueueError> {
        let id = self.alloc_node(value)?;
        self.link_tail(id);
        Ok(())
    }

    /// Detaches the front node and hands back its string.
    pub fn remove_head(&mut self) -> Result<String, QueueError> {
        let id = self.head.ok_or(QueueError::Empty)?;
        let node = self.nodes.release(id);
        let tail = match node.next {
            Some(_) => self.tail,
            None => None,
        };
        self.relink(node.next, tail, self.size - 1);
        Ok(node.value)
    }

    /// Detaches the front node, copying its string into `out` when one is given.
    ///
    /// At most `out.len() - 1` bytes are copied and the rest of `out` is zero-filled, so the
    /// result is always NUL-terminated within the buffer. Longer strings are cut short without
    /// complaint. An empty buffer receives nothing.
    pub fn remove_head_into(&mut self, out: Option<&mut [u8]>) -> Result<(), QueueError> {
        let value = self.remove_head()?;
        if let Some(out) = out {
            let copied = copy_nul_terminated(value.as_bytes(), out);
            if copied < value.len() {
                log::trace!("truncated removed string from {} to {} bytes", value.len(), copied);
            }
        }
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn peek_head(&self) -> Option<&str> {
        self.head.map(|id| self.nodes.node(id).value.as_str())
    }

    pub fn peek_tail(&self) -> Option<&str> {
        self.tail.map(|id| self.nodes.node(id).value.as_str())
    }

    /// Reverses the order of the queue in place. No node is allocated or released.
    pub fn reverse(&mut self) {
        if self.size < 2 {
            log::trace!("reverse of {} nodes is a no-op", self.size);
            return;
        }
        let (old_head, old_tail) = (self.head, self.tail);
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(id) = cursor {
            cursor = std::mem::replace(&mut self.nodes.node_mut(id).next, prev);
            prev = Some(id);
        }
        self.relink(old_tail, old_head, self.size);
    }

    /// Sorts the queue in ascending byte order, keeping equal strings in their current order.
    ///
    /// This is a bottom-up merge sort over the chain itself: runs of width 1, 2, 4, ... are cut
    /// off, merged and spliced back until a single pass merges everything. Only links move.
    pub fn sort(&mut self) {
        if self.size < 2 {
            log::trace!("sort of {} nodes is a no-op", self.size);
            return;
        }
        let mut width = 1;
        loop {
            let mut rest = self.head;
            let mut head = None;
            let mut tail: Option<NodeId> = None;
            let mut merges = 0;
            while let Some(left) = rest {
                merges += 1;
                let right = self.split_after(left, width);
                rest = match right {
                    Some(right) => self.split_after(right, width),
                    None => None,
                };
                let (run_head, run_tail) = self.merge(Some(left), right);
                match tail {
                    Some(tail) => self.nodes.node_mut(tail).next = run_head,
                    None => head = run_head,
                }
                tail = run_tail;
            }
            self.relink(head, tail, self.size);
            if merges <= 1 {
                break;
            }
            width *= 2;
        }
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            nodes: &self.nodes,
            cursor: self.head,
            remaining: self.size,
        }
    }

    /// Walks the chain and reports the first broken structural invariant, if any.
    pub fn check_invariants(&self) -> Result<(), Violation> {
        let live = self.nodes.occupied();
        match (self.size, self.head, self.tail) {
            (0, None, None) if live == 0 => return Ok(()),
            (0, None, None) => return Err(Violation::Leaked { live, reachable: 0 }),
            (0, _, _) | (_, None, _) | (_, _, None) => {
                return Err(Violation::Ends {
                    size: self.size,
                    head: self.head.is_some(),
                    tail: self.tail.is_some(),
                })
            }
            _ => {}
        }

        let mut reachable = 0;
        let mut last = None;
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let node = self.nodes.get(id).ok_or(Violation::DanglingLink)?;
            reachable += 1;
            if reachable > live {
                return Err(Violation::Cycle);
            }
            last = Some(id);
            cursor = node.next;
        }
        if reachable != self.size {
            return Err(Violation::SizeMismatch {
                recorded: self.size,
                reachable,
            });
        }
        if last != self.tail {
            return Err(Violation::TailNotLast);
        }
        if live != reachable {
            return Err(Violation::Leaked { live, reachable });
        }
        Ok(())
    }

    // Obtains the node slot first, then the payload. The slot is only reserved, so a payload
    // failure leaves nothing to undo.
    fn alloc_node(&mut self, value: &str) -> Result<NodeId, QueueError> {
        if let Err(source) = self.nodes.try_reserve_one() {
            log::debug!("node allocation failed: {}", source);
            return Err(QueueError::NodeAlloc(source));
        }
        let value = duplicate(value)?;
        Ok(self.nodes.insert(Node { value, next: None }))
    }

    fn link_head(&mut self, id: NodeId) {
        self.nodes.node_mut(id).next = self.head;
        let tail = self.tail.or(Some(id));
        self.relink(Some(id), tail, self.size + 1);
    }

    fn link_tail(&mut self, id: NodeId) {
        if let Some(tail) = self.tail {
            self.nodes.node_mut(tail).next = Some(id);
        }
        let head = self.head.or(Some(id));
        self.relink(head, Some(id), self.size + 1);
    }

    /// The one place `head`, `tail` and `size` change.
    fn relink(&mut self, head: Option<NodeId>, tail: Option<NodeId>, size: usize) {
        self.head = head;
        self.tail = tail;
        self.size = size;
        log::trace!("relink head={:?} tail={:?} size={}", head, tail, size);
        debug_assert_eq!(self.check_invariants(), Ok(()));
    }

    // Cuts the chain after `count` nodes starting at `start` and returns what followed.
    fn split_after(&mut self, start: NodeId, count: usize) -> Option<NodeId> {
        let mut last = start;
        for _ in 1..count {
            match self.nodes.node(last).next {
                Some(next) => last = next,
                None => return None,
            }
        }
        self.nodes.node_mut(last).next.take()
    }

    // Merges two terminated runs into one, returning its first and last node. Ties go to `left`.
    fn merge(
        &mut self,
        mut left: Option<NodeId>,
        mut right: Option<NodeId>,
    ) -> (Option<NodeId>, Option<NodeId>) {
        let mut head = None;
        let mut tail: Option<NodeId> = None;
        loop {
            let picked = match (left, right) {
                (Some(l), Some(r)) if self.nodes.node(r).value < self.nodes.node(l).value => {
                    right = self.nodes.node(r).next;
                    r
                }
                (Some(l), _) => {
                    left = self.nodes.node(l).next;
                    l
                }
                (None, Some(r)) => {
                    right = self.nodes.node(r).next;
                    r
                }
                (None, None) => break,
            };
            match tail {
                Some(tail) => self.nodes.node_mut(tail).next = Some(picked),
                None => head = Some(picked),
            }
            tail = Some(picked);
        }
        (head, tail)
    }
}

fn duplicate(value: &str) -> Result<String, QueueError> {
    let mut copy = String::new();
    fault::payload_alloc()
        .and_then(|()| copy.try_reserve_exact(value.len()))
        .map_err(|source| {
            log::debug!("could not allocate {} bytes for string: {}", value.len(), source);
            QueueError::PayloadAlloc {
                len: value.len(),
                source,
            }
        })?;
    copy.push_str(value);
    Ok(copy)
}

/// Copies as much of `src` as fits ahead of a terminating NUL and zero-fills the rest of `dst`.
/// Returns how many bytes of `src` were copied.
pub(crate) fn copy_nul_terminated(src: &[u8], dst: &mut [u8]) -> usize {
    let room = match dst.len().checked_sub(1) {
        Some(room) => room,
        None => return 0,
    };
    let copied = src.len().min(room);
    dst[..copied].copy_from_slice(&src[..copied]);
    for byte in &mut dst[copied..] {
        *byte = 0;
    }
    copied
}

impl Default for Queue {
    fn default() -> Self {
        Queue::new()
    }
}

impl Clone for Queue {
    /// Deep copy into a fresh, compact arena.
    fn clone(&self) -> Self {
        let mut copy = Queue::new();
        for value in self {
            let id = copy.nodes.insert(Node {
                value: value.to_string(),
                next: None,
            });
            copy.link_tail(id);
        }
        copy
    }
}

impl PartialEq for Queue {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.iter().eq(other.iter())
    }
}

impl Eq for Queue {}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, value) in self.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, "]")
    }
}

/// Borrowing iterator over the queue, head to tail.
pub struct Iter<'a> {
    nodes: &'a Arena,
    cursor: Option<NodeId>,
    remaining: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let id = self.cursor?;
        let node = self.nodes.node(id);
        self.cursor = node.next;
        self.remaining -= 1;
        Some(node.value.as_str())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a Queue {
    type Item = &'a str;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

/// Owning iterator that drains the queue from the head.
pub struct IntoIter(Queue);

impl Iterator for IntoIter {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.0.remove_head().ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.0.size, Some(self.0.size))
    }
}

impl ExactSizeIterator for IntoIter {}

impl IntoIterator for Queue {
    type Item = String;
    type IntoIter = IntoIter;

    fn into_iter(self) -> IntoIter {
        IntoIter(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn queue_of(values: &[&str]) -> Queue {
        Queue::try_from_iter(values.iter()).unwrap()
    }

    fn drain(queue: &mut Queue) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(value) = queue.remove_head() {
            out.push(value);
        }
        out
    }

    #[test]
    fn new_queue_is_empty() {
        init_logging();
        let queue = Queue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.size(), 0);
        assert_eq!(queue.peek_head(), None);
        assert_eq!(queue.peek_tail(), None);
        assert_eq!(queue.check_invariants(), Ok(()));
    }

    #[test]
    fn insert_head_on_empty_sets_both_ends() {
        init_logging();
        let mut queue = Queue::new();
        queue.insert_head("only").unwrap();
        assert_eq!(queue.peek_head(), Some("only"));
        assert_eq!(queue.peek_tail(), Some("only"));
        assert_eq!(queue.head, queue.tail);
        assert_eq!(queue.size(), 1);
    }

    #[test]
    fn insert_tail_on_empty_sets_both_ends() {
        init_logging();
        let mut queue = Queue::new();
        queue.insert_tail("only").unwrap();
        assert_eq!(queue.head, queue.tail);
        assert_eq!(queue.nodes.node(queue.head.unwrap()).next, None);
    }

    #[test]
    fn insert_head_then_remove_head_round_trips() {
        init_logging();
        let mut queue = queue_of(&["a", "b"]);
        queue.insert_head("fresh").unwrap();
        assert_eq!(queue.remove_head().unwrap(), "fresh");
        assert_eq!(queue.size(), 2);
        assert_eq!(drain(&mut queue), vec!["a", "b"]);
    }

    #[test]
    fn stored_string_is_a_copy() {
        init_logging();
        let mut source = String::from("hello");
        let mut queue = Queue::new();
        queue.insert_tail(&source).unwrap();
        source.push_str(" world");
        source.make_ascii_uppercase();
        assert_eq!(queue.remove_head().unwrap(), "hello");
    }

    #[test]
    fn remove_from_empty_reports_empty() {
        init_logging();
        let mut queue = Queue::new();
        assert!(matches!(queue.remove_head(), Err(QueueError::Empty)));
        let mut buf = [7u8; 4];
        assert!(matches!(
            queue.remove_head_into(Some(&mut buf[..])),
            Err(QueueError::Empty)
        ));
        assert_eq!(buf, [7u8; 4]);
    }

    #[test]
    fn removing_last_node_clears_both_ends() {
        init_logging();
        let mut queue = queue_of(&["a"]);
        queue.remove_head().unwrap();
        assert_eq!(queue.head, None);
        assert_eq!(queue.tail, None);
        assert_eq!(queue.nodes.occupied(), 0);
    }

    #[test]
    fn remove_into_truncates_and_terminates() {
        init_logging();
        let mut queue = queue_of(&["abcdef", "xy", "z"]);

        let mut small = [0xffu8; 4];
        queue.remove_head_into(Some(&mut small[..])).unwrap();
        assert_eq!(&small, b"abc\0");

        let mut large = [0xffu8; 6];
        queue.remove_head_into(Some(&mut large[..])).unwrap();
        assert_eq!(&large, b"xy\0\0\0\0");

        let mut empty: [u8; 0] = [];
        queue.remove_head_into(Some(&mut empty[..])).unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn remove_into_without_buffer_still_removes() {
        init_logging();
        let mut queue = queue_of(&["a", "b"]);
        queue.remove_head_into(None).unwrap();
        assert_eq!(queue.peek_head(), Some("b"));
        assert_eq!(queue.size(), 1);
    }

    #[test]
    fn node_alloc_failure_leaves_queue_untouched() {
        init_logging();
        let mut queue = queue_of(&["a", "b"]);
        fault::fail_next_node();
        let err = queue.insert_head("c").unwrap_err();
        assert!(matches!(err, QueueError::NodeAlloc(_)));
        assert!(err.is_alloc_failure());
        fault::fail_next_node();
        assert!(queue.insert_tail("c").is_err());
        assert_eq!(queue.size(), 2);
        assert_eq!(queue.nodes.occupied(), 2);
        assert_eq!(queue.check_invariants(), Ok(()));
        assert_eq!(drain(&mut queue), vec!["a", "b"]);
    }

    #[test]
    fn payload_alloc_failure_leaves_queue_untouched() {
        init_logging();
        let mut queue = queue_of(&["a"]);
        fault::fail_next_payload();
        match queue.insert_tail("long value") {
            Err(QueueError::PayloadAlloc { len, .. }) => assert_eq!(len, 10),
            other => panic!("expected payload failure, got {:?}", other),
        }
        assert_eq!(queue.size(), 1);
        assert_eq!(queue.nodes.occupied(), 1);
        assert_eq!(queue.peek_tail(), Some("a"));

        // The failure is one-shot; a retry goes through.
        queue.insert_tail("long value").unwrap();
        assert_eq!(drain(&mut queue), vec!["a", "long value"]);
    }

    #[test]
    fn oversized_capacity_is_an_error() {
        init_logging();
        assert!(matches!(
            Queue::with_capacity(usize::MAX),
            Err(QueueError::NodeAlloc(_))
        ));
        assert!(Queue::with_capacity(16).unwrap().is_empty());
    }

    #[test]
    fn reverse_swaps_ends_and_links() {
        init_logging();
        let mut queue = queue_of(&["a", "b", "c", "d"]);
        let (head, tail) = (queue.head, queue.tail);
        queue.reverse();
        assert_eq!(queue.head, tail);
        assert_eq!(queue.tail, head);
        assert_eq!(queue.iter().collect::<Vec<_>>(), vec!["d", "c", "b", "a"]);
        assert_eq!(queue.nodes.occupied(), 4);
    }

    #[test]
    fn reverse_and_sort_leave_short_queues_alone() {
        init_logging();
        let mut empty = Queue::new();
        empty.reverse();
        empty.sort();
        assert!(empty.is_empty());

        let mut single = queue_of(&["z"]);
        let id = single.head;
        single.reverse();
        single.sort();
        assert_eq!(single.head, id);
        assert_eq!(single.tail, id);
    }

    #[test]
    fn sort_orders_bytewise() {
        init_logging();
        let mut queue = queue_of(&["pear", "Apple", "apple", "", "banana", "a"]);
        queue.sort();
        assert_eq!(
            queue.iter().collect::<Vec<_>>(),
            vec!["", "Apple", "a", "apple", "banana", "pear"]
        );
        assert_eq!(queue.peek_tail(), Some("pear"));
    }

    #[test]
    fn sort_keeps_equal_nodes_in_order() {
        init_logging();
        let mut queue = queue_of(&["b", "a", "b", "a", "b"]);
        let ids: Vec<NodeId> = {
            let mut ids = Vec::new();
            let mut cursor = queue.head;
            while let Some(id) = cursor {
                ids.push(id);
                cursor = queue.nodes.node(id).next;
            }
            ids
        };
        queue.sort();
        let mut sorted = Vec::new();
        let mut cursor = queue.head;
        while let Some(id) = cursor {
            sorted.push(id);
            cursor = queue.nodes.node(id).next;
        }
        assert_eq!(sorted, vec![ids[1], ids[3], ids[0], ids[2], ids[4]]);
    }

    #[test]
    fn sort_handles_odd_run_lengths() {
        init_logging();
        for len in 2..40 {
            let values: Vec<String> = (0..len).map(|i| format!("{:03}", (i * 17) % 41)).collect();
            let mut queue = Queue::try_from_iter(&values).unwrap();
            queue.sort();
            let mut expected = values.clone();
            expected.sort();
            assert_eq!(queue.iter().collect::<Vec<_>>(), expected);
        }
    }

    #[test]
    fn clear_releases_everything() {
        init_logging();
        let mut queue = queue_of(&["a", "b", "c"]);
        assert_eq!(queue.clear(), 3);
        assert!(queue.is_empty());
        assert_eq!(queue.nodes.occupied(), 0);
        assert_eq!(queue.clear(), 0);
        queue.insert_tail("again").unwrap();
        assert_eq!(queue.size(), 1);
    }

    #[test]
    fn freed_slots_are_reused_by_inserts() {
        init_logging();
        let mut queue = queue_of(&["a", "b"]);
        let first = queue.head;
        queue.remove_head().unwrap();
        queue.insert_tail("c").unwrap();
        assert_eq!(queue.tail, first);
        assert_eq!(queue.iter().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn invariant_checker_catches_corruption() {
        init_logging();
        let mut queue = queue_of(&["a", "b", "c"]);

        queue.size = 2;
        assert_eq!(
            queue.check_invariants(),
            Err(Violation::SizeMismatch {
                recorded: 2,
                reachable: 3
            })
        );
        queue.size = 3;

        let tail = queue.tail;
        queue.tail = queue.head;
        assert_eq!(queue.check_invariants(), Err(Violation::TailNotLast));
        queue.tail = tail;

        let (head, last) = (queue.head.unwrap(), queue.tail.unwrap());
        queue.nodes.node_mut(last).next = Some(head);
        assert_eq!(queue.check_invariants(), Err(Violation::Cycle));
        queue.nodes.node_mut(last).next = None;

        queue.head = None;
        assert!(matches!(
            queue.check_invariants(),
            Err(Violation::Ends { size: 3, head: false, tail: true })
        ));
        queue.head = Some(head);
        assert_eq!(queue.check_invariants(), Ok(()));
    }

    #[test]
    fn display_and_debug() {
        init_logging();
        let queue = queue_of(&["x", "y"]);
        assert_eq!(queue.to_string(), "[x, y]");
        assert_eq!(format!("{:?}", queue), r#"["x", "y"]"#);
        assert_eq!(Queue::new().to_string(), "[]");
    }
}
