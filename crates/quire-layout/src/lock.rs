//! Scoped reentrancy guards.

use std::ops::{Deref, DerefMut};

use crate::layout::Layout;
use crate::tree::NodeId;

/// Which counter a [`Lock`] holds.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum LockKind {
    Join,
    Col,
}

/// Holds a join or column lock on a node for as long as it lives.
///
/// The guard dereferences to the layout, so work under the lock goes through
/// it. Dropping the guard releases the lock on every exit path.
pub(crate) struct Lock<'a> {
    layout: &'a mut Layout,
    node: NodeId,
    kind: LockKind,
}

impl<'a> Lock<'a> {
    /// Acquires the join lock of `node`.
    pub fn join(layout: &'a mut Layout, node: NodeId) -> Self {
        Self::acquire(layout, node, LockKind::Join)
    }

    /// Acquires the column lock of `node`.
    pub fn col(layout: &'a mut Layout, node: NodeId) -> Self {
        Self::acquire(layout, node, LockKind::Col)
    }

    fn acquire(layout: &'a mut Layout, node: NodeId, kind: LockKind) -> Self {
        if let Some(n) = layout.arena.get_mut(node) {
            match kind {
                LockKind::Join => n.locks.join += 1,
                LockKind::Col => n.locks.col += 1,
            }
        }
        Self { layout, node, kind }
    }
}

impl Deref for Lock<'_> {
    type Target = Layout;

    fn deref(&self) -> &Layout {
        self.layout
    }
}

impl DerefMut for Lock<'_> {
    fn deref_mut(&mut self) -> &mut Layout {
        self.layout
    }
}

impl Drop for Lock<'_> {
    fn drop(&mut self) {
        // The node may have been freed while locked if a caller misbehaved.
        if let Some(n) = self.layout.arena.get_mut(self.node) {
            let counter = match self.kind {
                LockKind::Join => &mut n.locks.join,
                LockKind::Col => &mut n.locks.col,
            };
            *counter = counter.saturating_sub(1);
        }
    }
}

/// Counts the nesting depth of section formatting while it lives.
pub(crate) struct DepthGuard<'a> {
    layout: &'a mut Layout,
}

impl<'a> DepthGuard<'a> {
    pub fn new(layout: &'a mut Layout) -> Self {
        layout.depth += 1;
        Self { layout }
    }
}

impl Deref for DepthGuard<'_> {
    type Target = Layout;

    fn deref(&self) -> &Layout {
        self.layout
    }
}

impl DerefMut for DepthGuard<'_> {
    fn deref_mut(&mut self) -> &mut Layout {
        self.layout
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.layout.depth -= 1;
    }
}
