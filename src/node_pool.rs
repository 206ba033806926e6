//! Search node allocation for the path engine.
//!
//! Nodes are pooled per query with a fixed budget taken from the filter. The
//! pool hashes polygon refs into buckets so revisiting a polygon finds its
//! existing node; running out of nodes is not an error, the search just stops
//! expanding and reports a partial result.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use glam::Vec3;

use crate::PolyRef;

const HASH_BUCKETS: usize = 256;
const NO_NODE: u16 = u16::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeFlags(u8);

impl NodeFlags {
    pub(crate) const NONE: NodeFlags = NodeFlags(0);
    pub(crate) const OPEN: NodeFlags = NodeFlags(1);
    pub(crate) const CLOSED: NodeFlags = NodeFlags(2);

    pub(crate) fn contains(self, other: NodeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub(crate) fn insert(&mut self, other: NodeFlags) {
        self.0 |= other.0;
    }

    pub(crate) fn remove(&mut self, other: NodeFlags) {
        self.0 &= !other.0;
    }
}

/// One A* search node.
#[derive(Debug, Clone)]
pub(crate) struct SearchNode {
    /// Position the node was entered at (portal midpoint or endpoint).
    pub pos: Vec3,
    /// Accumulated cost from the start.
    pub cost: f32,
    /// Pool index of the node we came from.
    pub parent: Option<u16>,
    pub flags: NodeFlags,
    pub poly: PolyRef,
    /// Next node in the same hash bucket.
    next: u16,
}

/// Fixed-budget node pool keyed by polygon ref.
pub(crate) struct NodePool {
    nodes: Vec<SearchNode>,
    first: [u16; HASH_BUCKETS],
    max_nodes: usize,
}

impl NodePool {
    pub(crate) fn new(max_nodes: u32) -> NodePool {
        let max_nodes = (max_nodes as usize).min(NO_NODE as usize - 1);
        NodePool {
            nodes: Vec::with_capacity(64.min(max_nodes)),
            first: [NO_NODE; HASH_BUCKETS],
            max_nodes,
        }
    }

    #[inline]
    fn bucket(poly: PolyRef) -> usize {
        // Fibonacci hash on the packed id.
        let h = poly.id().wrapping_mul(0x9e37_79b9_7f4a_7c15);
        (h >> 56) as usize % HASH_BUCKETS
    }

    /// Existing node for `poly`, if one was allocated this query.
    pub(crate) fn find(&self, poly: PolyRef) -> Option<u16> {
        let mut i = self.first[Self::bucket(poly)];
        while i != NO_NODE {
            if self.nodes[i as usize].poly == poly {
                return Some(i);
            }
            i = self.nodes[i as usize].next;
        }
        None
    }

    /// Node for `poly`, allocating on first sight.
    ///
    /// `None` when the budget is exhausted; the caller treats that as the
    /// frontier closing and finishes with what it has.
    pub(crate) fn find_or_alloc(&mut self, poly: PolyRef) -> Option<u16> {
        if let Some(i) = self.find(poly) {
            return Some(i);
        }
        if self.nodes.len() >= self.max_nodes {
            return None;
        }
        let bucket = Self::bucket(poly);
        let index = self.nodes.len() as u16;
        self.nodes.push(SearchNode {
            pos: Vec3::ZERO,
            cost: 0.0,
            parent: None,
            flags: NodeFlags::NONE,
            poly,
            next: self.first[bucket],
        });
        self.first[bucket] = index;
        Some(index)
    }

    pub(crate) fn node(&self, index: u16) -> &SearchNode {
        &self.nodes[index as usize]
    }

    pub(crate) fn node_mut(&mut self, index: u16) -> &mut SearchNode {
        &mut self.nodes[index as usize]
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }
}

#[derive(Debug, Clone, Copy)]
struct HeapNode {
    index: u16,
    total: f32,
}

impl PartialEq for HeapNode {
    fn eq(&self, other: &Self) -> bool {
        self.total == other.total
    }
}

impl Eq for HeapNode {}

impl PartialOrd for HeapNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the BinaryHeap pops the cheapest node first.
        other.total.total_cmp(&self.total)
    }
}

/// Min-heap over open search nodes.
///
/// Stale entries are tolerated: a node re-pushed with a better total leaves
/// its old entry behind, and the pop loop skips entries whose node is no
/// longer flagged open.
pub(crate) struct OpenList {
    heap: BinaryHeap<HeapNode>,
}

impl OpenList {
    pub(crate) fn new() -> OpenList {
        OpenList {
            heap: BinaryHeap::new(),
        }
    }

    pub(crate) fn push(&mut self, index: u16, total: f32) {
        self.heap.push(HeapNode { index, total });
    }

    /// Pops the cheapest node that is still flagged open.
    pub(crate) fn pop(&mut self, pool: &NodePool) -> Option<u16> {
        while let Some(entry) = self.heap.pop() {
            if pool.node(entry.index).flags.contains(NodeFlags::OPEN) {
                return Some(entry.index);
            }
        }
        None
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_dedupes_by_poly_ref() {
        let mut pool = NodePool::new(16);
        let r = PolyRef::encode(1, 2, 3);
        let a = pool.find_or_alloc(r).unwrap();
        let b = pool.find_or_alloc(r).unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn pool_respects_budget() {
        let mut pool = NodePool::new(2);
        assert!(pool.find_or_alloc(PolyRef::encode(0, 0, 1)).is_some());
        assert!(pool.find_or_alloc(PolyRef::encode(0, 0, 2)).is_some());
        assert!(pool.find_or_alloc(PolyRef::encode(0, 0, 3)).is_none());
    }

    #[test]
    fn open_list_pops_cheapest_live_node() {
        let mut pool = NodePool::new(8);
        let a = pool.find_or_alloc(PolyRef::encode(0, 0, 1)).unwrap();
        let b = pool.find_or_alloc(PolyRef::encode(0, 0, 2)).unwrap();
        pool.node_mut(a).flags.insert(NodeFlags::OPEN);
        pool.node_mut(b).flags.insert(NodeFlags::OPEN);

        let mut open = OpenList::new();
        open.push(a, 5.0);
        open.push(b, 2.0);
        assert_eq!(open.pop(&pool), Some(b));

        // Closing a node makes its stale heap entry invisible.
        pool.node_mut(a).flags.remove(NodeFlags::OPEN);
        assert_eq!(open.pop(&pool), None);
    }
}
