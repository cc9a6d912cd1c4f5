use crate::diag::{LayoutResult, bail};
use crate::geom::Abs;
use crate::layout::Layout;
use crate::lock::Lock;
use crate::model::SectionId;
use crate::tree::{NodeId, Validity};

impl Layout {
    /// Takes the content of `next` into `id` and destroys `next`. `id`
    /// inherits the follow of `next`.
    pub fn merge_next(&mut self, id: NodeId, next: NodeId) -> LayoutResult<()> {
        let own = self.live_section(id)?.section;
        let other = self.section_data(next)?.section;
        if own != other {
            bail!(
                InvalidArgument,
                "section frames {:?} and {:?} belong to different sections",
                id,
                next
            );
        }
        if next == id || self.is_master_of(next, id) {
            bail!(
                InvalidArgument,
                "section frame {:?} does not come after {:?}",
                next,
                id;
                hint: "merging takes the follow or the next sibling"
            );
        }
        if self.arena[id].next != Some(next) && self.follow_of(id) != Some(next) {
            bail!(
                InvalidArgument,
                "section frame {:?} neither follows nor succeeds {:?}",
                next,
                id
            );
        }
        if !self.merge_next_impl(id, next) {
            bail!(InvalidArgument, "section frame {:?} is locked", next);
        }
        Ok(())
    }

    /// Empties a section frame and turns it into a zombie.
    ///
    /// With `remove`, the frame is also destroyed. Otherwise it stays in the
    /// tree with zero height until the deletion worklist picks it up.
    pub fn del_empty(&mut self, id: NodeId, remove: bool) -> LayoutResult<()> {
        self.section_data(id)?;
        let locks = self.arena[id].locks;
        self.del_empty_impl(id, remove);
        if remove && locks.col == 0 && self.arena.contains(id) {
            self.free_frame(id);
        }
        Ok(())
    }

    /// Takes a section frame out of the tree without destroying it.
    pub fn cut_section(&mut self, id: NodeId) -> LayoutResult<()> {
        self.section_data(id)?;
        if self.arena[id].upper.is_none() {
            bail!(InvalidArgument, "section frame {:?} is not placed", id);
        }
        self.cut_impl(id, true);
        Ok(())
    }

    pub(crate) fn merge_next_impl(&mut self, id: NodeId, next: NodeId) -> bool {
        if self.arena[next].locks.join > 0 {
            return false;
        }
        let (own, other) = (self.section_of(id), self.section_of(next));
        if own.is_none() || own != other {
            self.anomaly(Some(next), "merging section frames of different sections".into());
            return false;
        }
        if next == id || self.is_master_of(next, id) {
            self.anomaly(Some(next), "merging a section frame into its own follow".into());
            return false;
        }
        let saved = self.save_content(next, None);
        if !saved.is_empty() {
            let leaf = self.arena.last_leaf(id);
            self.restore_content(saved, leaf, None);
        }
        let follow = self.follow_of(next);
        self.set_follow(next, None);
        self.set_follow(id, follow);
        if self.arena[next].upper.is_some() {
            self.cut_impl(next, true);
        }
        self.free_frame(next);
        self.invalidate(id, Validity::SIZE);
        tracing::trace!(?id, ?next, "merged section frames");
        true
    }

    pub(crate) fn del_empty_impl(&mut self, id: NodeId, remove: bool) {
        if self.arena[id].locks.col > 0 {
            if remove {
                self.anomaly(Some(id), "removing a column-locked section frame".into());
            }
            return;
        }
        let placed = self.arena[id].upper.is_some();
        if placed {
            let next = self.find_next_flow(id).map(|n| self.first_content_of(n));
            let prev = self.flow_prev(id).map(|p| self.last_content_of(p));
            if let Some(observer) = self.observer.as_mut() {
                observer.flow_relation_changed(next.flatten(), prev.flatten());
            }
            self.cut_impl(id, remove);
        }
        if let Some(master) = self.arena.find_master(id) {
            let follow = self.follow_of(id);
            self.set_follow(master, follow);
            if follow.is_none() && self.arena[master].locks.col == 0 {
                self.invalidate(master, Validity::SIZE);
            }
        }
        self.set_follow(id, None);
        if placed {
            let node = &mut self.arena[id];
            node.frame.height = Abs::zero();
            node.prt.height = Abs::zero();
            let zombie = node.is_zombie();
            if !remove {
                self.insert_empty_sct(id);
            } else if zombie {
                self.remove_from_list(id);
            }
            if let Some(data) = self.arena[id].section_mut() {
                data.section = None;
            }
            tracing::trace!(?id, remove, "emptied section frame");
        }
    }

    /// Whether `master` comes before `id` in the follow chain.
    fn is_master_of(&self, master: NodeId, id: NodeId) -> bool {
        let mut current = self.arena.find_master(id);
        for _ in 0..self.arena.len() {
            match current {
                Some(m) if m == master => return true,
                Some(m) if m != id => current = self.arena.find_master(m),
                _ => return false,
            }
        }
        false
    }

    /// `frame` if it is a live frame of `section`.
    fn frame_of(&self, frame: Option<NodeId>, section: SectionId) -> Option<NodeId> {
        frame.filter(|&f| self.arena.contains(f) && self.section_of(f) == Some(section))
    }

    /// The first content frame at or inside a flow frame.
    fn first_content_of(&self, id: NodeId) -> Option<NodeId> {
        if self.arena.is_content(id) { Some(id) } else { self.arena.contains_content(id) }
    }

    /// The last content frame at or inside a flow frame.
    fn last_content_of(&self, id: NodeId) -> Option<NodeId> {
        if self.arena.is_content(id) {
            return Some(id);
        }
        self.arena
            .descendants(id)
            .into_iter()
            .filter(|&d| self.arena.is_content(d) && !self.arena.in_footnote(d))
            .last()
    }

    pub(crate) fn cut_impl(&mut self, id: NodeId, remove: bool) {
        match self.arena.next_alive(id) {
            Some(next) => self.invalidate(next, Validity::PRT | Validity::POS),
            None => {
                self.invalidate_next_pos(id);
                if self.arena.prev_alive(id).is_none() {
                    self.superfluous = true;
                }
            }
        }
        let mut up = self.arena[id].upper;
        let height = self.arena[id].frame.height;
        if remove {
            self.arena.unlink(id);
            if let Some(u) = up
                && self.arena.is_footnote(u)
                && self.arena[u].first.is_none()
                && self.arena[u].locks.col == 0
                && self.arena[u].upper.is_some()
            {
                self.free_frame(u);
                up = None;
            }
        }
        if let Some(up) = up
            && height > Abs::zero()
        {
            if !remove {
                let node = &mut self.arena[id];
                node.frame.height = Abs::zero();
                node.prt.height = Abs::zero();
            }
            self.shrink_frame(up, height, false);
            self.invalidate_upper_sizes(up);
        }
    }

    /// Dissolves a section frame whose section went away.
    ///
    /// With `save`, the content survives: it joins a neighbouring frame of
    /// the enclosing section `parent`, merging the neighbours if they end up
    /// adjacent, or a new frame of `parent`, or the frame's upper. A frame
    /// that was already placed becomes a zombie for the deletion worklist.
    pub(crate) fn move_content_and_delete(
        &mut self,
        del: NodeId,
        save: bool,
        parent: Option<SectionId>,
    ) {
        let Some(up) = self.arena[del].upper else {
            self.free_frame(del);
            return;
        };
        let prv = self.arena[del].prev;
        let mut parent = parent;
        if let Some(tab) = self.arena.find_table(del)
            && self.arena.find_sect(tab).is_some_and(|s| self.section_of(s) == parent)
        {
            parent = None;
        }
        let (prv_sct, nxt_sct) = match parent {
            Some(_) => (
                self.flow_prev(del)
                    .and_then(|p| self.last_content_of(p))
                    .and_then(|c| self.arena.find_sect(c)),
                self.find_next_flow(del)
                    .and_then(|n| self.first_content_of(n))
                    .and_then(|c| self.arena.find_sect(c)),
            ),
            None => (None, None),
        };
        let columned = self.arena.has_columns(del);
        let placed = self.arena[del].frame.has_area();
        let content = self.save_content(del, None);
        let saved = if save {
            content
        } else {
            for frame in content {
                self.free_frame(frame);
            }
            vec![]
        };

        let target = Rehome { up, prv, parent, prv_sct, nxt_sct, columned };
        let footnote = Some(up).filter(|&u| !saved.is_empty() && self.arena.is_footnote(u));
        let (prv_sct, nxt_sct) = match footnote {
            Some(ftn) => Lock::col(self, ftn).rehome(del, placed, target, saved),
            None => self.rehome(del, placed, target, saved),
        };

        if let (Some(prev), Some(next)) = (prv_sct, nxt_sct)
            && prev != next
            && self.arena.contains(prev)
            && self.arena.contains(next)
            && self.arena[prev].locks.join == 0
        {
            self.merge_next_impl(prev, next);
        }
        tracing::debug!(?del, save, "dissolved section frame");
    }

    /// Destroys or zombifies `del` and puts its saved content where the
    /// enclosing section continues. Returns the neighbouring frames of the
    /// enclosing section that may need merging.
    fn rehome(
        &mut self,
        del: NodeId,
        placed: bool,
        target: Rehome,
        saved: Vec<NodeId>,
    ) -> (Option<NodeId>, Option<NodeId>) {
        let Rehome { mut up, mut prv, parent, mut prv_sct, nxt_sct, columned } = target;
        self.del_empty_impl(del, !placed);
        if !placed && self.arena.contains(del) {
            self.free_frame(del);
        }

        if let Some(parent) = parent {
            if let Some(next) = self.frame_of(nxt_sct, parent) {
                up = self.arena.first_leaf(next);
                prv = None;
                prv_sct = self.frame_of(prv_sct, parent);
            } else if let Some(prev) = self.frame_of(prv_sct, parent) {
                up = self.arena.last_leaf(prev);
                prv = self.arena[up].last;
                prv_sct = None;
            } else {
                if !saved.is_empty() {
                    let new = self.new_section_frame(parent);
                    let after = prv
                        .filter(|&p| self.arena.get(p).is_some_and(|n| n.upper == Some(up)));
                    self.arena.link_after(new, up, after);
                    self.init_section(new);
                    self.make_pos(new);
                    up = self.arena.first_leaf(new);
                    prv = None;
                }
                prv_sct = None;
            }
        }

        if !saved.is_empty() {
            if columned {
                for &frame in &saved {
                    self.invalidate(frame, Validity::all());
                }
            }
            let prv = prv.filter(|&p| self.arena.get(p).is_some_and(|n| n.upper == Some(up)));
            let before = match prv {
                Some(p) => self.arena[p].next,
                None => self.arena[up].first,
            };
            self.restore_content(saved, up, before);
        }
        (prv_sct, nxt_sct)
    }
}

/// Where the content of a dissolved section frame goes.
struct Rehome {
    up: NodeId,
    prv: Option<NodeId>,
    parent: Option<SectionId>,
    prv_sct: Option<NodeId>,
    nxt_sct: Option<NodeId>,
    columned: bool,
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::model::{Document, Paragraph, SectionDescriptor};
    use crate::observer::FlowObserver;
    use crate::section::tests::layout_with;

    type Relations = Rc<RefCell<Vec<(Option<NodeId>, Option<NodeId>)>>>;

    struct Recorder(Relations);

    impl FlowObserver for Recorder {
        fn flow_relation_changed(&mut self, next: Option<NodeId>, prev: Option<NodeId>) {
            self.0.borrow_mut().push((next, prev));
        }
    }

    #[test]
    fn test_del_empty_keeps_zombie_for_worklist() {
        let mut doc = Document::new();
        let section = doc.add_section(SectionDescriptor::new());
        let (mut layout, body) = layout_with(doc);
        let sect = layout.create_section(section, body, None).unwrap();
        layout.del_empty(sect, false).unwrap();
        assert!(layout.arena.is_zombie(sect));
        assert!(layout.in_delete_list(sect));
        assert_eq!(layout.arena[sect].upper, Some(body));

        layout.run();
        assert_eq!(layout.pending_deletions(), 0);
        assert!(!layout.arena.contains(sect));
    }

    #[test]
    fn test_del_empty_tells_observer_about_neighbours() {
        let mut doc = Document::new();
        let section = doc.add_section(SectionDescriptor::new());
        let para = doc.add_paragraph(Paragraph::new(Abs::raw(1000)));
        let (mut layout, body) = layout_with(doc);
        let before = layout.insert_content(para, body, None).unwrap();
        let sect = layout.create_section(section, body, None).unwrap();
        layout.insert_content(para, sect, None).unwrap();
        let after = layout.insert_content(para, body, None).unwrap();

        let relations = Relations::default();
        layout.set_observer(Box::new(Recorder(relations.clone())));
        layout.del_empty(sect, true).unwrap();
        assert_eq!(*relations.borrow(), vec![(Some(after), Some(before))]);
        assert!(!layout.arena.contains(sect));
        assert_eq!(layout.children(body).unwrap(), vec![before, after]);
    }

    #[test]
    #[cfg(not(feature = "strict"))]
    fn test_merge_refuses_foreign_sections() {
        let mut doc = Document::new();
        let first = doc.add_section(SectionDescriptor::new());
        let second = doc.add_section(SectionDescriptor::new());
        let (mut layout, body) = layout_with(doc);
        let a = layout.create_section(first, body, None).unwrap();
        let b = layout.create_section(second, body, None).unwrap();
        assert!(!layout.merge_next_impl(a, b));
        assert!(layout.arena.contains(b));
        assert_eq!(layout.warnings().len(), 1);
    }

    #[test]
    #[cfg(not(feature = "strict"))]
    fn test_merge_into_itself_keeps_content() {
        let mut doc = Document::new();
        let section = doc.add_section(SectionDescriptor::new());
        let para = doc.add_paragraph(Paragraph::new(Abs::raw(1000)));
        let (mut layout, body) = layout_with(doc);
        let sect = layout.create_section(section, body, None).unwrap();
        let content = layout.insert_content(para, sect, None).unwrap();
        let follow = layout.create_follow(sect).unwrap();

        assert!(!layout.merge_next_impl(sect, sect));
        assert!(!layout.merge_next_impl(follow, sect));
        assert_eq!(layout.warnings().len(), 2);
        assert_eq!(layout.follow_of(sect), Some(follow));
        assert_eq!(layout.follow_of(follow), None);
        assert_eq!(layout.arena[content].upper, Some(sect));
    }
}
