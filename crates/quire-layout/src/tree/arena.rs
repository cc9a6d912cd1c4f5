use std::ops::{Index, IndexMut};

use crate::diag::{LayoutResult, bail};
use crate::geom::Abs;

use super::{Node, NodeId};

/// Owns all nodes of a layout tree.
#[derive(Debug, Default, Clone)]
pub struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

impl Arena {
    /// An empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of live nodes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether there are no live nodes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores a node and returns its handle.
    pub fn alloc(&mut self, node: Node) -> NodeId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId { index, generation: slot.generation };
        }
        self.slots.push(Slot { generation: 0, node: Some(node) });
        NodeId { index: self.slots.len() as u32 - 1, generation: 0 }
    }

    /// Frees a single node. Its links are not touched.
    pub(crate) fn free(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(node)
    }

    /// Whether the handle refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// The node behind a handle, if it is still alive.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    /// Mutable access to the node behind a handle.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    /// The node behind a handle or a stale-handle error.
    pub fn checked(&self, id: NodeId) -> LayoutResult<&Node> {
        match self.get(id) {
            Some(node) => Ok(node),
            None => bail!(StaleHandle, "node {:?} does not exist anymore", id),
        }
    }

    /// Handles to all live nodes, in slot order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.node
                .as_ref()
                .map(|_| NodeId { index: i as u32, generation: slot.generation })
        })
    }

    /// Iterates over the children of a node.
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children { arena: self, next: self.get(id).and_then(|node| node.first) }
    }

    /// Inserts a detached node as a child of `parent`, before `before` or
    /// at the end if `before` is `None`.
    pub(crate) fn link(&mut self, id: NodeId, parent: NodeId, before: Option<NodeId>) {
        debug_assert!(self[id].upper.is_none(), "node {id:?} is still linked");
        let prev = match before {
            Some(before) => self[before].prev,
            None => self[parent].last,
        };
        {
            let node = &mut self[id];
            node.upper = Some(parent);
            node.prev = prev;
            node.next = before;
        }
        match prev {
            Some(prev) => self[prev].next = Some(id),
            None => self[parent].first = Some(id),
        }
        match before {
            Some(before) => self[before].prev = Some(id),
            None => self[parent].last = Some(id),
        }
    }

    /// Inserts a detached node as a child of `parent` right after `after`,
    /// or at the front if `after` is `None`.
    pub(crate) fn link_after(&mut self, id: NodeId, parent: NodeId, after: Option<NodeId>) {
        let before = match after {
            Some(after) => self[after].next,
            None => self[parent].first,
        };
        self.link(id, parent, before);
    }

    /// Detaches a node from its parent and siblings. Its children stay.
    pub(crate) fn unlink(&mut self, id: NodeId) {
        let node = &mut self[id];
        let (upper, prev, next) = (node.upper.take(), node.prev.take(), node.next.take());
        let Some(upper) = upper else { return };
        match prev {
            Some(prev) => self[prev].next = next,
            None => self[upper].first = next,
        }
        match next {
            Some(next) => self[next].prev = prev,
            None => self[upper].last = prev,
        }
    }

    /// The node and all of its descendants, in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![];
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.get(current) else { continue };
            out.push(current);
            let mut child = node.last;
            while let Some(c) = child {
                stack.push(c);
                child = self[c].prev;
            }
        }
        out
    }

    /// Detaches a node and frees it together with its subtree. Returns the
    /// freed nodes.
    pub(crate) fn free_subtree(&mut self, id: NodeId) -> Vec<(NodeId, Node)> {
        self.unlink(id);
        self.descendants(id)
            .into_iter()
            .filter_map(|d| self.free(d).map(|node| (d, node)))
            .collect()
    }

    /// Moves a node and its subtree by the given offsets.
    pub(crate) fn shift(&mut self, id: NodeId, dx: Abs, dy: Abs) {
        if dx == Abs::zero() && dy == Abs::zero() {
            return;
        }
        for d in self.descendants(id) {
            let node = &mut self[d];
            node.frame = node.frame.translate(dx, dy);
        }
    }
}

impl Index<NodeId> for Arena {
    type Output = Node;

    #[track_caller]
    fn index(&self, id: NodeId) -> &Node {
        match self.get(id) {
            Some(node) => node,
            None => panic!("stale node handle {id:?}"),
        }
    }
}

impl IndexMut<NodeId> for Arena {
    #[track_caller]
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("stale node handle {id:?}"),
        }
    }
}

/// An iterator over the children of a node.
///
/// The next sibling is looked up lazily, so the iterator must not outlive
/// structural changes. Collect it first when mutating.
pub struct Children<'a> {
    arena: &'a Arena,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.arena.get(current).and_then(|node| node.next);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::ErrorKind;
    use crate::tree::NodeKind;

    fn node() -> Node {
        Node::new(NodeKind::Body)
    }

    #[test]
    fn test_arena_detects_stale_handles() {
        let mut arena = Arena::new();
        let a = arena.alloc(node());
        assert!(arena.free(a).is_some());
        let b = arena.alloc(node());
        assert_ne!(a, b);
        assert!(arena.get(a).is_none());
        assert!(arena.get(b).is_some());
        assert_eq!(arena.checked(a).unwrap_err().kind, ErrorKind::StaleHandle);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_arena_link_and_unlink() {
        let mut arena = Arena::new();
        let parent = arena.alloc(node());
        let [a, b, c] = [(); 3].map(|_| arena.alloc(node()));
        arena.link(a, parent, None);
        arena.link(c, parent, None);
        arena.link_after(b, parent, Some(a));
        assert_eq!(arena.children(parent).collect::<Vec<_>>(), [a, b, c]);
        arena.unlink(a);
        assert_eq!(arena[parent].first, Some(b));
        assert_eq!(arena[b].prev, None);
        arena.unlink(c);
        assert_eq!(arena[parent].last, Some(b));
        assert_eq!(arena.children(parent).collect::<Vec<_>>(), [b]);
    }

    #[test]
    fn test_arena_free_subtree() {
        let mut arena = Arena::new();
        let root = arena.alloc(node());
        let child = arena.alloc(node());
        let grandchild = arena.alloc(node());
        arena.link(child, root, None);
        arena.link(grandchild, child, None);
        let freed = arena.free_subtree(child);
        assert_eq!(freed.len(), 2);
        assert!(!arena.contains(grandchild));
        assert_eq!(arena[root].first, None);
        assert_eq!(arena.len(), 1);
    }
}
