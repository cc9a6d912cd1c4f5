use crate::diag::LayoutResult;
use crate::layout::Layout;
use crate::model::{NoteKind, SectionId};
use crate::notes::Layouter;
use crate::tree::{NodeId, NodeKind, Validity};

use super::FindMode;

impl Layout {
    /// Whether a section frame fills all the space up to its deadline.
    ///
    /// A frame with a follow always does. When `check_follow` is set, only
    /// follows that still hold something count. Otherwise a frame fills its
    /// space when it holds footnotes that are not collected at its end.
    pub fn to_maximize(&self, id: NodeId, check_follow: bool) -> LayoutResult<bool> {
        self.section_data(id)?;
        Ok(self.to_maximize_impl(id, check_follow))
    }

    /// The first footnote container in the columns of a section frame.
    pub fn contains_ftn_cont(&self, id: NodeId) -> LayoutResult<Option<NodeId>> {
        self.section_data(id)?;
        Ok(self.contains_ftn_cont_after(id, None))
    }

    /// Invalidates the position of the first footnote content of a section
    /// frame.
    pub fn invalidate_ftn_pos(&mut self, id: NodeId) -> LayoutResult<()> {
        self.section_data(id)?;
        if let Some(cont) = self.contains_ftn_cont_after(id, None)
            && let Some(content) = self.arena.contains_content(cont)
        {
            self.invalidate(content, Validity::POS);
        }
        Ok(())
    }

    /// Formats the footnotes held by the columns of a section frame.
    pub fn calc_ftn_content(&mut self, id: NodeId) -> LayoutResult<()> {
        self.section_data(id)?;
        self.calc_ftn_content_impl(id);
        Ok(())
    }

    /// Finds the last content of a section frame. See [`FindMode`].
    pub fn find_last_content(&self, id: NodeId, mode: FindMode) -> LayoutResult<Option<NodeId>> {
        self.section_data(id)?;
        Ok(self.find_last_content_impl(id, mode))
    }

    /// Takes the endnotes out of the columns of a section chain, starting at
    /// `id`, and hands them to `layouter`.
    pub fn collect_endnotes(&mut self, id: NodeId, layouter: &mut Layouter) -> LayoutResult<()> {
        self.live_section(id)?;
        self.collect_endnotes_impl(id, layouter);
        Ok(())
    }

    /// Appends the endnotes held by `layouter` to the end of `id`.
    pub fn insert_endnotes(&mut self, id: NodeId, layouter: &mut Layouter) -> LayoutResult<()> {
        self.live_section(id)?;
        if !self.arena.has_columns(id) {
            self.chg_columns(id);
        }
        layouter.insert_into(self, id);
        Ok(())
    }

    /// Recomputes the column geometry of a section frame and, with
    /// `follows`, of all frames after it.
    pub fn refresh_columns(&mut self, id: NodeId, follows: bool) -> LayoutResult<()> {
        self.section_data(id)?;
        self.column_refresh(id, follows);
        Ok(())
    }

    /// Whether a section frame holds neither flow content nor footnotes.
    pub fn is_superfluous(&self, id: NodeId) -> LayoutResult<bool> {
        self.section_data(id)?;
        Ok(self.is_superfluous_impl(id))
    }

    /// Whether the section of a frame is `section` or declared inside it.
    pub fn is_descendant_from(&self, id: NodeId, section: SectionId) -> LayoutResult<bool> {
        self.section_data(id)?;
        Ok(self.is_descendant_from_impl(id, section))
    }

    pub(crate) fn to_maximize_impl(&self, id: NodeId, check_follow: bool) -> bool {
        if let Some(follow) = self.follow_of(id) {
            if !check_follow {
                return true;
            }
            let mut next = Some(follow);
            while let Some(f) = next
                && self.is_superfluous_impl(f)
            {
                next = self.follow_of(f);
            }
            if next.is_some() {
                return true;
            }
        }
        let Some(data) = self.section_flags(id) else { return false };
        if data.ftn_at_end {
            return false;
        }
        let first = self.contains_ftn_cont_after(id, None);
        if !data.endn_at_end {
            return first.is_some();
        }
        let mut cont = first;
        while let Some(c) = cont {
            if self.arena.children(c).any(|f| self.note_kind(f) == Some(NoteKind::Footnote)) {
                return true;
            }
            cont = self.contains_ftn_cont_after(id, Some(c));
        }
        false
    }

    /// The first footnote container in a column after the one holding
    /// `after`.
    pub(crate) fn contains_ftn_cont_after(
        &self,
        id: NodeId,
        after: Option<NodeId>,
    ) -> Option<NodeId> {
        let columns = self.arena.columns(id);
        let start = match after {
            Some(cont) => {
                let col = self.arena.get(cont)?.upper?;
                columns.iter().position(|&c| c == col)? + 1
            }
            None => 0,
        };
        columns[start..]
            .iter()
            .find_map(|&c| self.arena.footnote_container(c))
    }

    pub(crate) fn calc_ftn_content_impl(&mut self, id: NodeId) {
        let mut cont = self.contains_ftn_cont_after(id, None);
        while let Some(c) = cont {
            self.format_container(c);
            cont = self.contains_ftn_cont_after(id, Some(c));
        }
    }

    pub(crate) fn note_kind(&self, ftn: NodeId) -> Option<NoteKind> {
        self.doc.note(self.footnote_data(ftn)?.note).map(|n| n.kind)
    }

    pub(crate) fn is_superfluous_impl(&self, id: NodeId) -> bool {
        self.arena.contains_any(id, false).is_none()
            && self.contains_ftn_cont_after(id, None).is_none()
    }

    pub(crate) fn is_descendant_from_impl(&self, id: NodeId, section: SectionId) -> bool {
        self.section_of(id).is_some_and(|own| self.doc.is_descendant(own, section))
    }

    /// The section whose end collects the endnotes of `id`.
    fn end_section(&self, id: NodeId) -> Option<SectionId> {
        let own = self.section_of(id)?;
        let data = self.section_flags(id)?;
        if !data.endn_at_end {
            return Some(own);
        }
        self.doc
            .section_chain(own)
            .find(|&s| self.doc.section(s).is_some_and(|d| d.endnotes_at_end))
            .or(Some(own))
    }

    pub(crate) fn find_last_content_impl(&self, id: NodeId, mode: FindMode) -> Option<NodeId> {
        let mut sect = id;
        if mode != FindMode::Own {
            let target = self.end_section(id);
            let mut guard = self.arena.len();
            loop {
                guard = guard.checked_sub(1)?;
                while let Some(f) = self.follow_of(sect) {
                    if f == id {
                        break;
                    }
                    sect = f;
                }
                let mut next = self.find_next_flow(sect);
                while let Some(n) = next
                    && self.arena.is_zombie(n)
                {
                    next = self.find_next_flow(n);
                }
                match (next, target) {
                    (Some(n), Some(target))
                        if self.arena.is_section(n) && self.is_descendant_from_impl(n, target) =>
                    {
                        sect = n;
                    }
                    _ => break,
                }
            }
        }

        let mut found = None;
        let mut note = None;
        let mut check = mode == FindMode::Endnote;
        loop {
            self.last_content_in(sect, &mut found, &mut note, &mut check);
            if found.is_some()
                || mode == FindMode::Own
                || (mode == FindMode::MyLast && sect == id)
            {
                break;
            }
            match self.arena.find_master(sect) {
                Some(master) => sect = master,
                None => break,
            }
        }
        if mode == FindMode::Endnote {
            return note.and_then(|n| self.arena.contains_content(n));
        }
        found
    }

    /// Searches the lowers of `lay` backwards for content. Footnotes are
    /// skipped, but while `check` is set the first footnote met is recorded
    /// and the check continues as long as it is an endnote.
    fn last_content_in(
        &self,
        lay: NodeId,
        found: &mut Option<NodeId>,
        note: &mut Option<NodeId>,
        check: &mut bool,
    ) {
        let lowers: Vec<NodeId> = self.arena.children(lay).collect();
        for &frame in lowers.iter().rev() {
            if found.is_some() {
                return;
            }
            match self.arena.kind(frame) {
                NodeKind::Content(_) => *found = Some(frame),
                NodeKind::Footnote(_) => {
                    if *check {
                        *note = Some(frame);
                        *check = self.note_kind(frame) == Some(NoteKind::Endnote);
                    }
                }
                _ => self.last_content_in(frame, found, note, check),
            }
        }
    }

    /// Finds the next endnote frame in the columns of `sect` and, when a
    /// layouter is given, of its follows. Continuation pieces met on the way
    /// go to the layouter; without one, they end the search.
    pub(crate) fn find_endnote_impl(
        &mut self,
        sect: &mut NodeId,
        empty: &mut bool,
        mut layouter: Option<&mut Layouter>,
    ) -> Option<NodeId> {
        let mut current = if *empty { self.follow_of(*sect) } else { Some(*sect) };
        while let Some(s) = current {
            for col in self.arena.columns(s) {
                let Some(cont) = self.arena.footnote_container(col) else { continue };
                let notes: Vec<NodeId> = self.arena.children(cont).collect();
                for ftn in notes {
                    if self.note_kind(ftn) != Some(NoteKind::Endnote) {
                        continue;
                    }
                    if self.footnote_data(ftn).is_some_and(|d| d.master.is_some()) {
                        match layouter.as_deref_mut() {
                            Some(layouter) => layouter.collect_endnote(self, ftn),
                            None => return None,
                        }
                    } else {
                        return Some(ftn);
                    }
                }
            }
            *sect = s;
            current = if layouter.is_some() { self.follow_of(s) } else { None };
            *empty = true;
        }
        None
    }

    pub(crate) fn collect_endnotes_impl(&mut self, id: NodeId, layouter: &mut Layouter) {
        let mut sect = id;
        let mut empty = false;
        while let Some(note) =
            self.find_endnote_impl(&mut sect, &mut empty, Some(&mut *layouter))
        {
            layouter.collect_endnote(self, note);
        }
        if layouter.has_endnotes() {
            self.column_refresh(id, true);
        }
    }

    /// Whether endnotes collected at the end of this section sit in a frame
    /// that is not the tail of the chain.
    pub(crate) fn endnotes_misplaced(&self, id: NodeId) -> bool {
        if self.follow_of(id).is_none() || !self.is_endnote_at_my_end(id) {
            return false;
        }
        self.arena
            .columns(id)
            .into_iter()
            .filter_map(|c| self.arena.footnote_container(c))
            .flat_map(|cont| self.arena.children(cont))
            .any(|f| self.note_kind(f) == Some(NoteKind::Endnote))
    }
}
