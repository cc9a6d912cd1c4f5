//! Read-only navigation over the layout tree.

use std::cmp::Ordering;

use super::{Arena, NodeId, NodeKind};

impl Arena {
    /// The node's kind.
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self[id].kind
    }

    /// The strict ancestors of a node, innermost first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut next = self.get(id).and_then(|node| node.upper);
        std::iter::from_fn(move || {
            let current = next?;
            next = self[current].upper;
            Some(current)
        })
    }

    /// The node itself followed by its ancestors up to (and including) the
    /// page.
    fn up_to_page(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut next = Some(id);
        std::iter::from_fn(move || {
            let current = next?;
            next = match self[current].kind {
                NodeKind::Page(_) | NodeKind::Root => None,
                _ => self[current].upper,
            };
            Some(current)
        })
    }

    pub fn is_section(&self, id: NodeId) -> bool {
        matches!(self[id].kind, NodeKind::Section(_))
    }

    pub fn is_column(&self, id: NodeId) -> bool {
        matches!(self[id].kind, NodeKind::Column)
    }

    pub fn is_content(&self, id: NodeId) -> bool {
        matches!(self[id].kind, NodeKind::Content(_))
    }

    pub fn is_table(&self, id: NodeId) -> bool {
        matches!(self[id].kind, NodeKind::Table)
    }

    pub fn is_page(&self, id: NodeId) -> bool {
        matches!(self[id].kind, NodeKind::Page(_))
    }

    pub fn is_footer(&self, id: NodeId) -> bool {
        matches!(self[id].kind, NodeKind::Footer)
    }

    pub fn is_header(&self, id: NodeId) -> bool {
        matches!(self[id].kind, NodeKind::Header)
    }

    pub fn is_footnote(&self, id: NodeId) -> bool {
        matches!(self[id].kind, NodeKind::Footnote(_))
    }

    pub fn is_footnote_container(&self, id: NodeId) -> bool {
        matches!(self[id].kind, NodeKind::FootnoteContainer)
    }

    pub fn is_fly(&self, id: NodeId) -> bool {
        matches!(self[id].kind, NodeKind::Fly(_))
    }

    /// Whether the node is the body of a column.
    pub fn is_col_body(&self, id: NodeId) -> bool {
        matches!(self[id].kind, NodeKind::Body)
            && self[id].upper.is_some_and(|up| self.is_column(up))
    }

    /// Whether the node is the body of a page.
    pub fn is_page_body(&self, id: NodeId) -> bool {
        matches!(self[id].kind, NodeKind::Body)
            && self[id].upper.is_some_and(|up| self.is_page(up))
    }

    /// Whether the node is a section that was removed from the document.
    pub fn is_zombie(&self, id: NodeId) -> bool {
        self[id].is_zombie()
    }

    /// The page the node is on, which may be the node itself.
    pub fn find_page(&self, id: NodeId) -> Option<NodeId> {
        self.up_to_page(id).find(|&n| self.is_page(n))
    }

    /// The innermost section frame containing the node, which may be the
    /// node itself.
    pub fn find_sect(&self, id: NodeId) -> Option<NodeId> {
        self.up_to_page(id).find(|&n| self.is_section(n))
    }

    /// The innermost section frame strictly containing the node.
    pub fn find_outer_sect(&self, id: NodeId) -> Option<NodeId> {
        self[id].upper.and_then(|up| self.find_sect(up))
    }

    /// The innermost table containing the node, which may be the node itself.
    pub fn find_table(&self, id: NodeId) -> Option<NodeId> {
        self.up_to_page(id).find(|&n| self.is_table(n))
    }

    /// The innermost footnote containing the node.
    pub fn find_footnote(&self, id: NodeId) -> Option<NodeId> {
        self.up_to_page(id).find(|&n| self.is_footnote(n))
    }

    /// The header or footer containing the node.
    pub fn find_header_footer(&self, id: NodeId) -> Option<NodeId> {
        self.up_to_page(id).find(|&n| self.is_header(n) || self.is_footer(n))
    }

    /// The fly containing the node.
    pub fn find_fly(&self, id: NodeId) -> Option<NodeId> {
        self.up_to_page(id).find(|&n| self.is_fly(n))
    }

    pub fn in_sect(&self, id: NodeId) -> bool {
        self.find_sect(id).is_some()
    }

    pub fn in_table(&self, id: NodeId) -> bool {
        self.up_to_page(id)
            .any(|n| matches!(self[n].kind, NodeKind::Table | NodeKind::Cell))
    }

    pub fn in_footnote(&self, id: NodeId) -> bool {
        self.up_to_page(id).any(|n| {
            matches!(self[n].kind, NodeKind::Footnote(_) | NodeKind::FootnoteContainer)
        })
    }

    pub fn in_fly(&self, id: NodeId) -> bool {
        self.find_fly(id).is_some()
    }

    /// Whether the node flows in the body of a page.
    pub fn in_doc_body(&self, id: NodeId) -> bool {
        !self.in_footnote(id) && self.up_to_page(id).any(|n| self.is_page_body(n))
    }

    /// Whether `ancestor` strictly contains `id`.
    pub fn is_lower_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    /// The columns of a section, in order. Empty without columns.
    pub fn columns(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id).filter(|&c| self.is_column(c)).collect()
    }

    /// Whether the node is subdivided into columns.
    pub fn has_columns(&self, id: NodeId) -> bool {
        self[id].first.is_some_and(|first| self.is_column(first))
    }

    /// The body of a column.
    pub fn column_body(&self, column: NodeId) -> Option<NodeId> {
        self.children(column).find(|&c| matches!(self[c].kind, NodeKind::Body))
    }

    /// The footnote container of a column or page.
    pub fn footnote_container(&self, boss: NodeId) -> Option<NodeId> {
        self.children(boss).find(|&c| self.is_footnote_container(c))
    }

    /// The body of a page.
    pub fn page_body(&self, page: NodeId) -> Option<NodeId> {
        self.children(page).find(|&c| self.is_page_body(c))
    }

    /// Where the flow of a frame starts: the first column body for a
    /// columned frame, otherwise the frame itself.
    pub fn first_leaf(&self, id: NodeId) -> NodeId {
        self[id]
            .first
            .filter(|&first| self.is_column(first))
            .and_then(|column| self.column_body(column))
            .unwrap_or(id)
    }

    /// Where the flow of a frame ends: the last column body for a columned
    /// frame, otherwise the frame itself.
    pub fn last_leaf(&self, id: NodeId) -> NodeId {
        self.columns(id)
            .last()
            .and_then(|&column| self.column_body(column))
            .unwrap_or(id)
    }

    /// The next sibling that is not a zombie section.
    pub fn next_alive(&self, id: NodeId) -> Option<NodeId> {
        let mut next = self[id].next;
        while let Some(n) = next.filter(|&n| self.is_zombie(n)) {
            next = self[n].next;
        }
        next
    }

    /// The previous sibling that is not a zombie section.
    pub fn prev_alive(&self, id: NodeId) -> Option<NodeId> {
        let mut prev = self[id].prev;
        while let Some(p) = prev.filter(|&p| self.is_zombie(p)) {
            prev = self[p].prev;
        }
        prev
    }

    /// The first flow frame inside the node.
    ///
    /// Footnotes are skipped for sections unless `with_notes` is set.
    pub fn contains_any(&self, id: NodeId, with_notes: bool) -> Option<NodeId> {
        let skip_notes = self.is_section(id) && !with_notes;
        self.find_inside(id, |arena, n| {
            if skip_notes && arena.is_footnote_container(n) {
                Visit::Skip
            } else if arena[n].is_flow() {
                Visit::Found
            } else {
                Visit::Descend
            }
        })
    }

    /// The first content frame inside the node.
    pub fn contains_content(&self, id: NodeId) -> Option<NodeId> {
        self.find_inside(id, |arena, n| {
            if arena.is_content(n) { Visit::Found } else { Visit::Descend }
        })
    }

    fn find_inside(
        &self,
        id: NodeId,
        mut visit: impl FnMut(&Self, NodeId) -> Visit,
    ) -> Option<NodeId> {
        let mut stack: Vec<NodeId> = self.children(id).collect();
        stack.reverse();
        while let Some(n) = stack.pop() {
            match visit(self, n) {
                Visit::Found => return Some(n),
                Visit::Skip => {}
                Visit::Descend => {
                    let start = stack.len();
                    stack.extend(self.children(n));
                    stack[start..].reverse();
                }
            }
        }
        None
    }

    /// Whether the node's first child is absent or a flow frame.
    pub fn is_layout_leaf(&self, id: NodeId) -> bool {
        !self.is_content(id)
            && self.walk_lower(id, true).is_none_or(|first| self[first].is_flow())
    }

    /// The next layout leaf after this node in document order.
    pub fn next_layout_leaf(&self, id: NodeId) -> Option<NodeId> {
        self.layout_leaf(id, true)
    }

    /// The previous layout leaf before this node in document order.
    pub fn prev_layout_leaf(&self, id: NodeId) -> Option<NodeId> {
        self.layout_leaf(id, false)
    }

    fn layout_leaf(&self, start: NodeId, fwd: bool) -> Option<NodeId> {
        let mut current = start;
        let mut going_up = !fwd;
        loop {
            let lower = if going_up { None } else { self.walk_lower(current, fwd) };
            let going_down = lower.is_some();
            let mut going_sideways = false;
            let step = match lower {
                Some(lower) => lower,
                None => match self.walk_sibling(current, fwd) {
                    Some(sibling) => {
                        going_sideways = true;
                        sibling
                    }
                    None => self.walk_upper(current)?,
                },
            };
            going_up = !going_sideways && !going_down;
            current = step;

            if current != start
                && !self.is_content(current)
                && self.walk_lower(current, true).is_none_or(|l| self[l].is_flow())
                && !self.is_lower_of(start, current)
            {
                return Some(current);
            }
        }
    }

    // Flies are not part of the flow of their page.
    fn walk_lower(&self, id: NodeId, fwd: bool) -> Option<NodeId> {
        if self.is_content(id) {
            return None;
        }
        if fwd {
            self.children(id).find(|&c| !self.is_fly(c))
        } else {
            let mut last = self[id].last;
            while let Some(l) = last.filter(|&l| self.is_fly(l)) {
                last = self[l].prev;
            }
            last
        }
    }

    fn walk_sibling(&self, id: NodeId, fwd: bool) -> Option<NodeId> {
        if self.is_fly(id) {
            return None;
        }
        let step = |n: NodeId| if fwd { self[n].next } else { self[n].prev };
        let mut sibling = step(id);
        while let Some(s) = sibling.filter(|&s| self.is_fly(s)) {
            sibling = step(s);
        }
        sibling
    }

    fn walk_upper(&self, id: NodeId) -> Option<NodeId> {
        if self.is_fly(id) { None } else { self[id].upper }
    }

    /// Compares the position of two nodes in document order.
    pub fn doc_order(&self, a: NodeId, b: NodeId) -> Ordering {
        let path = |id: NodeId| {
            let mut path: Vec<usize> = std::iter::once(id)
                .chain(self.ancestors(id))
                .map(|n| {
                    std::iter::successors(self[n].prev, |&p| self[p].prev).count()
                })
                .collect();
            path.reverse();
            path
        };
        path(a).cmp(&path(b))
    }

    /// The section frame whose follow is `id`.
    pub fn find_master(&self, id: NodeId) -> Option<NodeId> {
        self.ids().find(|&n| {
            self[n].section().is_some_and(|data| data.follow == Some(id))
        })
    }
}

enum Visit {
    Found,
    Skip,
    Descend,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PageDescId;
    use crate::tree::{ContentData, Node, PageData, Source};

    fn content(arena: &mut Arena, parent: NodeId) -> NodeId {
        let source = Source::Paragraph(crate::model::ParagraphId(0));
        let id = arena.alloc(Node::new(NodeKind::Content(ContentData { source })));
        arena.link(id, parent, None);
        id
    }

    fn page(arena: &mut Arena, root: NodeId) -> (NodeId, NodeId) {
        let data = PageData { desc: PageDescId(0), footnote_page: false };
        let page = arena.alloc(Node::new(NodeKind::Page(data)));
        arena.link(page, root, None);
        let body = arena.alloc(Node::new(NodeKind::Body));
        arena.link(body, page, None);
        (page, body)
    }

    #[test]
    fn test_layout_leaves_across_pages() {
        let mut arena = Arena::new();
        let root = arena.alloc(Node::new(NodeKind::Root));
        let (_, body1) = page(&mut arena, root);
        let (_, body2) = page(&mut arena, root);
        let a = content(&mut arena, body1);
        let b = content(&mut arena, body2);
        assert!(arena.is_layout_leaf(body1));
        assert_eq!(arena.next_layout_leaf(a), Some(body2));
        assert_eq!(arena.prev_layout_leaf(b), Some(body1));
        assert_eq!(arena.next_layout_leaf(b), None);
        assert_eq!(arena.doc_order(a, b), Ordering::Less);
        assert!(arena.in_doc_body(a));
    }

    #[test]
    fn test_contains_any_skips_notes_of_sections() {
        let mut arena = Arena::new();
        let root = arena.alloc(Node::new(NodeKind::Root));
        let (_, body) = page(&mut arena, root);
        let data = crate::tree::SectionData::new(crate::model::SectionId(0));
        let sect = arena.alloc(Node::new(NodeKind::Section(data)));
        arena.link(sect, body, None);
        let cont = arena.alloc(Node::new(NodeKind::FootnoteContainer));
        arena.link(cont, sect, None);
        let note = content(&mut arena, cont);
        assert_eq!(arena.contains_any(sect, false), None);
        assert_eq!(arena.contains_any(sect, true), Some(note));
        assert_eq!(arena.contains_content(sect), Some(note));
        assert_eq!(arena.find_sect(note), Some(sect));
        assert!(arena.in_footnote(note));
    }
}
