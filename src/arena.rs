use std::collections::TryReserveError;

/// Stable handle to a node slot. Handles are only meaningful for the arena that issued them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(usize);

/// One element of the chain: an owned copy of the caller's string and the link to the next node.
#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub(crate) value: String,
    pub(crate) next: Option<NodeId>,
}

#[derive(Clone, Debug)]
enum Slot {
    Occupied(Node),
    Vacant { next_free: Option<NodeId> },
}

/// Backing storage for queue nodes. Released slots are threaded onto a free list and handed out
/// again before the arena grows.
#[derive(Clone, Debug, Default)]
pub(crate) struct Arena {
    slots: Vec<Slot>,
    free: Option<NodeId>,
    occupied: usize,
}

impl Arena {
    pub(crate) fn new() -> Self {
        Arena {
            slots: Vec::new(),
            free: None,
            occupied: 0,
        }
    }

    pub(crate) fn try_with_capacity(capacity: usize) -> Result<Self, TryReserveError> {
        let mut arena = Arena::new();
        arena.slots.try_reserve_exact(capacity)?;
        Ok(arena)
    }

    /// Makes sure the next `insert` will not need to allocate.
    pub(crate) fn try_reserve_one(&mut self) -> Result<(), TryReserveError> {
        crate::fault::node_alloc()?;
        if self.free.is_none() {
            self.slots.try_reserve(1)?;
        }
        Ok(())
    }

    pub(crate) fn insert(&mut self, node: Node) -> NodeId {
        self.occupied += 1;
        match self.free {
            Some(id) => {
                self.free = match self.slots[id.0] {
                    Slot::Vacant { next_free } => next_free,
                    Slot::Occupied(_) => unreachable!("free list points at an occupied slot"),
                };
                self.slots[id.0] = Slot::Occupied(node);
                id
            }
            None => {
                self.slots.push(Slot::Occupied(node));
                NodeId(self.slots.len() - 1)
            }
        }
    }

    /// Takes the node out of its slot and returns the slot to the free list.
    pub(crate) fn release(&mut self, id: NodeId) -> Node {
        let slot = std::mem::replace(
            &mut self.slots[id.0],
            Slot::Vacant {
                next_free: self.free,
            },
        );
        match slot {
            Slot::Occupied(node) => {
                self.free = Some(id);
                self.occupied -= 1;
                node
            }
            Slot::Vacant { .. } => panic!("double release of node slot {}", id.0),
        }
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node> {
        match self.slots.get(id.0) {
            Some(Slot::Occupied(node)) => Some(node),
            _ => None,
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        match &self.slots[id.0] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => panic!("link to released node slot {}", id.0),
        }
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match &mut self.slots[id.0] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => panic!("link to released node slot {}", id.0),
        }
    }

    /// Number of live nodes, whether or not they are reachable from a head.
    pub(crate) fn occupied(&self) -> usize {
        self.occupied
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free = None;
        self.occupied = 0;
    }
}
