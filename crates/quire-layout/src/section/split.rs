use crate::diag::{LayoutResult, bail};
use crate::layout::Layout;
use crate::tree::{NodeId, Validity};

impl Layout {
    /// Pastes a detached section frame into `parent` before `sibling`.
    pub fn paste_section(
        &mut self,
        id: NodeId,
        parent: NodeId,
        sibling: Option<NodeId>,
    ) -> LayoutResult<()> {
        self.live_section(id)?;
        if self.arena[id].upper.is_some() {
            bail!(InvalidArgument, "section frame {:?} is already placed", id);
        }
        self.arena.checked(parent)?;
        if let Some(sibling) = sibling
            && self.arena.checked(sibling)?.upper != Some(parent)
        {
            bail!(InvalidArgument, "node {:?} is not a child of {:?}", sibling, parent);
        }
        self.paste_section_impl(id, parent, sibling);
        Ok(())
    }

    /// Whether `id`'s section is declared inside `other`'s section, so that
    /// pasting `id` into `other` must split `other`.
    pub fn has_to_break(&self, id: NodeId, other: NodeId) -> LayoutResult<bool> {
        self.section_data(id)?;
        self.section_data(other)?;
        Ok(self.has_to_break_impl(id, other))
    }

    /// Splits a section frame at `frame`. With `after`, everything behind
    /// `frame` moves into the new frame, otherwise `frame` and everything
    /// behind it does. Returns the new frame, which continues this one.
    pub fn split_sect(
        &mut self,
        id: NodeId,
        frame: NodeId,
        after: bool,
    ) -> LayoutResult<Option<NodeId>> {
        self.live_section(id)?;
        self.arena.checked(frame)?;
        Ok(self.split_sect_impl(id, frame, after))
    }

    pub(crate) fn paste_section_impl(
        &mut self,
        id: NodeId,
        parent: NodeId,
        sibling: Option<NodeId>,
    ) {
        let mut sibling = sibling;
        let sect = self.arena.find_sect(parent).filter(|&s| {
            !self.arena.find_table(parent).is_some_and(|t| self.arena.is_lower_of(t, s))
        });
        match sect.filter(|&s| self.has_to_break_impl(id, s)) {
            Some(outer) => self.break_outer(id, outer, parent, &mut sibling),
            None => self.arena.link(id, parent, sibling),
        }

        self.invalidate(id, Validity::all());
        if let Some(sibling) = sibling {
            self.invalidate(sibling, Validity::POS | Validity::PRT);
        }
        let height = self.arena[id].frame.height;
        if height > crate::geom::Abs::zero()
            && let Some(up) = self.arena[id].upper
        {
            self.grow_frame(up, height, false);
        }
        if self.arena.find_master(id).is_none()
            && let Some(prev) = self.arena[id].prev
        {
            self.invalidate(prev, Validity::SIZE);
        }
        self.invalidate_next_pos(id);
    }

    /// Puts `id` behind `outer` and moves everything from `sibling` on into
    /// a second piece of `outer` behind `id`.
    fn break_outer(
        &mut self,
        id: NodeId,
        outer: NodeId,
        parent: NodeId,
        sibling: &mut Option<NodeId>,
    ) {
        if self.arena.is_col_body(parent)
            && let Some(mut col) = self.arena[parent].upper
        {
            // At the end of a column the break moves to the next column that
            // has content.
            while sibling.is_none() {
                let Some(next) = self.arena[col].next else { break };
                col = next;
                *sibling = self.arena.column_body(col).and_then(|b| self.arena[b].first);
            }
            if let Some(sib) = *sibling
                && let Some(sib_up) = self.arena[sib].upper
            {
                let mut next = self.arena[col].next;
                while let Some(c) = next {
                    if let Some(body) = self.arena.column_body(c) {
                        let saved = self.save_content(body, None);
                        self.restore_content(saved, sib_up, None);
                    }
                    next = self.arena[c].next;
                }
            }
        }

        let Some(outer_up) = self.arena[outer].upper else {
            self.anomaly(Some(outer), "splitting an unplaced section frame".into());
            return;
        };
        self.arena.link_after(id, outer_up, Some(outer));

        if let Some(sib) = *sibling
            && let Some(section) = self.section_of(outer)
        {
            let second = self.new_section_frame(section);
            let follow = self.follow_of(outer);
            self.set_follow(second, follow);
            self.set_follow(outer, None);
            if follow.is_some() {
                self.invalidate(outer, Validity::SIZE);
            }
            self.arena.link_after(second, outer_up, Some(id));
            let mut moving = vec![];
            let mut next = Some(sib);
            while let Some(n) = next {
                next = self.arena[n].next;
                moving.push(n);
            }
            let old_up = self.arena[sib].upper;
            for m in moving {
                self.arena.unlink(m);
                self.arena.link(m, second, None);
                self.invalidate(m, Validity::POS);
            }
            if let Some(old_up) = old_up {
                self.invalidate_upper_sizes(old_up);
            }
            self.init_section(second);
            self.make_pos(second);
            tracing::debug!(?outer, ?second, "split outer section around inner one");
        }

        if self.arena[outer].first.is_none() {
            let parent = self.section_of(outer).and_then(|s| self.doc.section(s)?.parent);
            self.move_content_and_delete(outer, false, parent);
        }
    }

    pub(crate) fn has_to_break_impl(&self, id: NodeId, other: NodeId) -> bool {
        let (Some(own), Some(target)) = (self.section_of(id), self.section_of(other)) else {
            return false;
        };
        self.doc.section_chain(own).skip(1).any(|s| s == target)
    }

    pub(crate) fn split_sect_impl(
        &mut self,
        id: NodeId,
        frame: NodeId,
        after: bool,
    ) -> Option<NodeId> {
        let other = if after { self.find_next_flow(frame) } else { self.flow_prev(frame) }?;
        if self.arena.find_outer_sect(other) != Some(id) {
            return None;
        }
        let section = self.section_of(id)?;
        let up = self.arena[id].upper?;
        let start = if after { other } else { frame };
        let saved = self.save_content(id, Some(start));
        if saved.is_empty() {
            return None;
        }
        let new = self.new_section_frame(section);
        self.arena.link_after(new, up, Some(id));
        self.init_section(new);
        self.make_pos(new);
        let leaf = self.arena.first_leaf(new);
        self.restore_content(saved, leaf, None);
        self.invalidate(id, Validity::SIZE);
        let follow = self.follow_of(id);
        if follow.is_some() {
            self.set_follow(new, follow);
            self.set_follow(id, None);
        }
        tracing::debug!(?id, ?new, "split section frame");
        Some(new)
    }
}
