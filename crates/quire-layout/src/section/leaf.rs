use quire_utils::option_eq;

use crate::diag::LayoutResult;
use crate::layout::Layout;
use crate::model::PageDescId;
use crate::tree::{ContentData, NodeId, NodeKind, Source, Validity};

use super::MakePage;

/// Pages the forward search inserts at most before it gives up.
const MAX_INSERTED_PAGES: usize = 2;

impl Layout {
    /// The layout leaf where content of `frame`'s section continues after
    /// `frame`'s leaf, creating follows and pages as `make_page` allows.
    pub fn next_sct_leaf(
        &mut self,
        frame: NodeId,
        make_page: MakePage,
    ) -> LayoutResult<Option<NodeId>> {
        self.arena.checked(frame)?;
        Ok(self.next_sct_leaf_impl(frame, make_page))
    }

    /// The layout leaf where content of `frame`'s section continues before
    /// `frame`'s leaf, creating a master if needed.
    pub fn prev_sct_leaf(&mut self, frame: NodeId) -> LayoutResult<Option<NodeId>> {
        self.arena.checked(frame)?;
        Ok(self.prev_sct_leaf_impl(frame))
    }

    /// Whether `frame` may leave section frame `id` towards the next leaf.
    pub fn move_allowed(&mut self, id: NodeId, frame: NodeId) -> LayoutResult<bool> {
        self.section_data(id)?;
        self.arena.checked(frame)?;
        Ok(self.move_allowed_impl(id, frame))
    }

    /// The previous frame in flow order, looking through enclosing sections
    /// and their columns. `None` if earlier columns still hold content.
    pub fn ind_prev_frame(&self, frame: NodeId) -> LayoutResult<Option<NodeId>> {
        self.arena.checked(frame)?;
        Ok(self.ind_prev(frame))
    }

    /// The next frame in flow order, looking through enclosing sections and
    /// their columns. `None` if later columns still hold content.
    pub fn ind_next_frame(&self, frame: NodeId) -> LayoutResult<Option<NodeId>> {
        self.arena.checked(frame)?;
        Ok(self.ind_next(frame))
    }

    /// Whether `frame` asks for a page style that `page` does not have.
    pub fn wrong_page_desc(&self, frame: NodeId, page: NodeId) -> LayoutResult<bool> {
        self.arena.checked(frame)?;
        self.arena.checked(page)?;
        Ok(self.wrong_page_desc_impl(frame, page))
    }

    pub(crate) fn next_sct_leaf_impl(
        &mut self,
        frame: NodeId,
        make_page: MakePage,
    ) -> Option<NodeId> {
        let up = self.arena[frame].upper?;
        if self.arena.is_col_body(frame)
            && let Some(next) = up_next(self, frame)
        {
            return self.arena.column_body(next);
        }
        if self.arena.is_col_body(up)
            && let Some(next) = up_next(self, up)
        {
            return self.arena.column_body(next);
        }
        if self.arena.in_table(up) || self.arena.find_header_footer(frame).is_some() {
            return None;
        }

        let sect = self.arena.find_outer_sect(frame)?;
        let mut wrong_page = false;
        if let Some(follow) = self.follow_of(sect)
            && self.arena.in_doc_body(sect)
        {
            match self.follow_shortcut(sect, follow, frame) {
                Some(Ok(leaf)) => return Some(leaf),
                Some(Err(())) => wrong_page = true,
                None => {}
            }
        }

        let body = self.arena.in_doc_body(frame);
        let own_page = self.arena.find_page(frame);
        let note_page = own_page.is_some_and(|p| self.is_note_page(p));
        let in_footnote = self.arena.in_footnote(frame);
        let mut leaf = if wrong_page {
            None
        } else if self.arena.is_table(frame) {
            let descendants = self.arena.descendants(frame);
            let last = descendants.into_iter().rfind(|&d| self.arena.is_content(d));
            match last.and_then(|l| self.arena[l].upper) {
                Some(cell) => self.arena.next_layout_leaf(cell),
                None => self.arena.next_layout_leaf(frame),
            }
        } else {
            let mut l = self.arena.next_layout_leaf(frame);
            if self.arena.is_column(frame) {
                while let Some(x) = l
                    && self.arena.is_lower_of(x, frame)
                {
                    l = self.arena.next_layout_leaf(x);
                }
            }
            l
        };
        let mut old_leaf = None;
        let mut inserted = 0;
        loop {
            if let Some(l) = leaf {
                let page = self.arena.find_page(l);
                if !note_page && page.is_some_and(|p| self.is_note_page(p)) {
                    leaf = None;
                    continue;
                }
                let leaf_sect = self.arena.find_sect(l);
                if (body && !self.arena.in_doc_body(l))
                    || in_footnote != self.arena.in_footnote(l)
                    || self.arena.in_table(l)
                    || leaf_sect.is_some_and(|s| !option_eq(self.follow_of(sect), s))
                {
                    old_leaf = Some(l);
                    leaf = self.arena.next_layout_leaf(l);
                    continue;
                }
                if page.is_some_and(|p| self.wrong_page_desc_impl(frame, p)) {
                    if wrong_page {
                        break;
                    }
                    leaf = None;
                    wrong_page = true;
                    old_leaf = None;
                    continue;
                }
            } else if !self.arena.in_fly(sect)
                && matches!(make_page, MakePage::Append | MakePage::Insert)
                && inserted < MAX_INSERTED_PAGES
            {
                inserted += 1;
                let after = old_leaf.and_then(|l| self.arena.find_page(l)).or(own_page);
                let desc = if wrong_page { self.wanted_page_desc(frame) } else { None };
                self.insert_page(after, desc);
                leaf = match old_leaf {
                    Some(old) => self.arena.next_layout_leaf(old),
                    None => self.arena.next_layout_leaf(frame),
                };
                continue;
            }
            break;
        }
        let leaf = leaf?;

        let mut first = self.arena[leaf].first;
        while let Some(f) = first
            && self.arena.is_zombie(f)
        {
            first = self.arena[f].next;
        }
        let new = match first {
            Some(f) if option_eq(self.follow_of(sect), f) => f,
            _ if make_page == MakePage::NoSection => return Some(leaf),
            _ => self.create_follow_in(sect, leaf)?,
        };
        Some(self.arena.first_leaf(new))
    }

    /// Checks whether the existing follow of `sect` sits in the leaf right
    /// after `frame`'s one. `Err` if it does but on a page of the wrong
    /// style.
    fn follow_shortcut(
        &self,
        sect: NodeId,
        follow: NodeId,
        frame: NodeId,
    ) -> Option<Result<NodeId, ()>> {
        let hit = if self.arena[sect].next == Some(follow) {
            true
        } else {
            let up = self.arena[sect].upper?;
            let column = self.arena.is_col_body(up).then(|| self.arena[up].upper).flatten();
            let tmp = match column.and_then(|c| self.arena[c].next) {
                Some(next) => Some(next),
                None => self.arena.find_page(sect).and_then(|p| self.arena[p].next),
            }?;
            let fup = self.arena[follow].upper?;
            let fcol = self.arena.is_col_body(fup).then(|| self.arena[fup].upper).flatten();
            let target = match fcol {
                Some(col) if self.arena[col].prev.is_some() => Some(col),
                _ => self.arena.find_page(fup),
            };
            target == Some(tmp)
        };
        if !hit {
            return None;
        }
        let page = self.arena.find_page(follow)?;
        if self.wrong_page_desc_impl(frame, page) {
            Some(Err(()))
        } else {
            Some(Ok(self.arena.first_leaf(follow)))
        }
    }

    /// Creates the follow of `sect` at the start of `leaf`. Flow frames
    /// that were left behind `sect` move behind the new follow.
    fn create_follow_in(&mut self, sect: NodeId, leaf: NodeId) -> Option<NodeId> {
        let new = self.create_follow(sect)?;
        let first = self.arena[leaf].first;
        self.arena.link(new, leaf, first);
        self.init_section(new);
        self.make_pos(new);

        if let Some(tmp) = self.arena[sect].next
            && self.follow_of(sect) != Some(tmp)
        {
            let old_up = self.arena[tmp].upper;
            let mut moving = vec![];
            let mut next = Some(tmp);
            while let Some(n) = next {
                next = self.arena[n].next;
                moving.push(n);
            }
            let before = self.arena[new].next;
            for m in moving {
                self.arena.unlink(m);
                self.arena.link(m, leaf, before);
                self.invalidate(m, Validity::POS);
            }
            if let Some(old_up) = old_up {
                self.invalidate_upper_sizes(old_up);
            }
        }
        if self.follow_of(new).is_some() {
            self.simple_format(new);
        }
        tracing::debug!(?sect, follow = ?new, ?leaf, "created follow");
        Some(new)
    }

    pub(crate) fn prev_sct_leaf_impl(&mut self, frame: NodeId) -> Option<NodeId> {
        let up = self.arena[frame].upper?;
        let col = if self.arena.is_col_body(frame) {
            Some(up)
        } else if self.arena.is_col_body(up) {
            self.arena[up].upper
        } else {
            None
        };
        let mut fallback = None;
        let mut jump = false;
        if let Some(mut c) = col
            && self.arena[c].prev.is_some()
        {
            while let Some(prev) = self.arena[c].prev {
                c = prev;
                let body = self.arena.column_body(c)?;
                if self.arena[body].first.is_some() {
                    if jump {
                        self.move_bwd_jump = true;
                    }
                    return Some(body);
                }
                jump = true;
            }
            fallback = self.arena.column_body(c);
        }
        if jump {
            self.move_bwd_jump = true;
        }

        if (self.arena.in_table(frame) && !self.arena.is_table(frame))
            || self.arena.find_header_footer(frame).is_some()
        {
            return fallback;
        }
        let sect = self.arena.find_outer_sect(frame)?;
        if self.arena.is_table(frame) && self.arena.in_table(sect) {
            return fallback;
        }
        let mut prv = self.ind_prev(sect);
        while let Some(p) = prv
            && self.arena.is_zombie(p)
        {
            prv = self.arena[p].prev;
        }
        if prv.is_some() {
            return fallback;
        }

        let body = self.arena.in_doc_body(frame);
        let fly = self.arena.in_fly(frame);
        let mut leaf = self.arena.prev_layout_leaf(frame);
        let mut prev_leaf = None;
        while let Some(l) = leaf {
            if self.arena.in_table(l) || self.arena.in_sect(l) {
                leaf = self.arena.prev_layout_leaf(l);
            } else if body && self.arena.in_doc_body(l) {
                let mut first = self.arena[l].first;
                while let Some(f) = first
                    && self.arena.is_zombie(f)
                {
                    first = self.arena[f].next;
                }
                if first.is_some() {
                    break;
                }
                prev_leaf = Some(l);
                leaf = self.arena.prev_layout_leaf(l);
                if leaf.is_some() {
                    self.move_bwd_jump = true;
                }
            } else if fly {
                break;
            } else {
                leaf = self.arena.prev_layout_leaf(l);
            }
        }
        let leaf = match leaf.or(prev_leaf) {
            Some(l) => l,
            None => return fallback,
        };

        let mut master = None;
        if let Some(mut last) = self.arena[leaf].last
            && self.arena.is_section(last)
        {
            while self.arena.is_zombie(last)
                && let Some(p) = self.arena[last].prev.filter(|&p| self.arena.is_section(p))
            {
                last = p;
            }
            if option_eq(self.follow_of(last), sect) {
                master = Some(last);
            }
        }

        match master {
            None => {
                let new = self.create_master_before(sect)?;
                self.arena.link(new, leaf, None);
                self.init_section(new);
                self.make_pos(new);
                let first = self.arena.first_leaf(new);
                if self.arena.has_columns(new) {
                    self.simple_format(new);
                } else {
                    self.format(new);
                }
                tracing::debug!(?sect, master = ?new, ?leaf, "created master");
                Some(first)
            }
            Some(master) => {
                let mut found = self.arena.first_leaf(master);
                if self.arena.is_col_body(found) {
                    let mut last_filled = found;
                    let mut body = found;
                    while let Some(next) = up_next(self, body) {
                        let Some(b) = self.arena.column_body(next) else { break };
                        body = b;
                        if self.arena[b].first.is_some() {
                            last_filled = b;
                        }
                    }
                    if found != last_filled {
                        found = last_filled;
                        self.move_bwd_jump = true;
                    }
                }
                Some(found)
            }
        }
    }

    pub(crate) fn move_allowed_impl(&mut self, id: NodeId, frame: NodeId) -> bool {
        if self.follow_of(id).is_some() {
            return true;
        }
        if let Some(up) = self.arena[frame].upper
            && self.arena.is_col_body(up)
            && up_next(self, up).is_some()
        {
            return true;
        }
        if self.arena.in_footnote(frame) {
            if self.arena.in_footnote(id) {
                let outer = self.arena[id].upper.and_then(|u| self.arena.find_sect(u));
                return match outer {
                    Some(outer) => !self.growable_impl(id) && self.move_allowed_impl(outer, id),
                    None => true,
                };
            }
            let ftn = self.arena.find_footnote(frame);
            let column = ftn.and_then(|f| self.arena[f].upper).and_then(|c| self.arena[c].upper);
            if let (Some(ftn), Some(column)) = (ftn, column)
                && self.arena.is_column(column)
                && self.arena[column].next.is_some()
            {
                let has_prev = self.arena[column].prev.is_some()
                    || self.arena.prev_alive(frame).is_some()
                    || self.arena[ftn].prev.is_some()
                    || self
                        .arena
                        .column_body(column)
                        .is_some_and(|b| self.arena[b].first.is_some());
                let collects = self.section_flags(id).is_some_and(|d| d.ftn_at_end);
                if has_prev && (collects || !self.growable_impl(id)) {
                    return true;
                }
            }
        }
        if self.arena[id].locks.col == 0 && self.growable_impl(id) {
            return false;
        }
        if self.arena.in_table(id)
            || (!self.arena.in_doc_body(id) && self.arena.find_header_footer(id).is_some())
        {
            return false;
        }
        // Flies are not chained, so nothing follows them.
        !self.arena.in_fly(id)
    }

    pub(crate) fn ind_prev(&self, frame: NodeId) -> Option<NodeId> {
        if let Some(prev) = self.arena[frame].prev {
            return Some(prev);
        }
        let up = self.arena[frame].upper?;
        let mut found = if self.arena.is_section(up) {
            self.ind_prev(up)
        } else if self.arena.is_col_body(up) {
            let column = self.arena[up].upper?;
            let sect = self.arena[column].upper.filter(|&s| self.arena.is_section(s))?;
            let mut col = self.arena[column].prev;
            while let Some(c) = col {
                if self.arena.column_body(c).is_some_and(|b| self.arena[b].first.is_some()) {
                    return None;
                }
                col = self.arena[c].prev;
            }
            self.ind_prev(sect)
        } else {
            None
        };
        while let Some(f) = found
            && self.arena.is_zombie(f)
        {
            found = self.ind_prev(f);
        }
        found
    }

    pub(crate) fn ind_next(&self, frame: NodeId) -> Option<NodeId> {
        if let Some(next) = self.arena[frame].next {
            return Some(next);
        }
        let up = self.arena[frame].upper?;
        let mut found = if self.arena.is_section(up) {
            self.ind_next(up)
        } else if self.arena.is_col_body(up) {
            let column = self.arena[up].upper?;
            let sect = self.arena[column].upper.filter(|&s| self.arena.is_section(s))?;
            let mut col = self.arena[column].next;
            while let Some(c) = col {
                if self.arena.column_body(c).is_some_and(|b| self.arena[b].first.is_some()) {
                    return None;
                }
                col = self.arena[c].next;
            }
            self.ind_next(sect)
        } else {
            None
        };
        while let Some(f) = found
            && self.arena.is_zombie(f)
        {
            found = self.ind_next(f);
        }
        found
    }

    /// The page style the first paragraph of a flow frame asks for.
    pub(crate) fn wanted_page_desc(&self, frame: NodeId) -> Option<PageDescId> {
        let content = if self.arena.is_content(frame) {
            Some(frame)
        } else {
            self.arena.contains_content(frame)
        }?;
        match self.arena.kind(content) {
            NodeKind::Content(ContentData { source: Source::Paragraph(p) }) => {
                self.doc.paragraph(*p)?.page_desc
            }
            _ => None,
        }
    }

    pub(crate) fn wrong_page_desc_impl(&self, frame: NodeId, page: NodeId) -> bool {
        let Some(wanted) = self.wanted_page_desc(frame) else { return false };
        match self.arena.kind(page) {
            NodeKind::Page(data) => data.desc != wanted,
            _ => false,
        }
    }

    fn is_note_page(&self, page: NodeId) -> bool {
        matches!(self.arena.kind(page), NodeKind::Page(data) if data.footnote_page)
    }
}

/// The column after the one holding the column body `body`.
fn up_next(layout: &Layout, body: NodeId) -> Option<NodeId> {
    layout.arena[body].upper.and_then(|c| layout.arena[c].next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Abs;
    use crate::model::{Document, Paragraph, SectionDescriptor};
    use crate::section::tests::{layout_with, test_page};

    #[test]
    fn test_next_sct_leaf_appends_page_and_follow() {
        let mut doc = Document::new();
        let section = doc.add_section(SectionDescriptor::new());
        let para = doc.add_paragraph(Paragraph::new(Abs::raw(1000)));
        let (mut layout, body) = layout_with(doc);
        let sect = layout.create_section(section, body, None).unwrap();
        let content = layout.insert_content(para, sect, None).unwrap();

        assert_eq!(layout.next_sct_leaf(content, MakePage::None), Ok(None));
        assert_eq!(layout.pages().len(), 1);

        let leaf = layout.next_sct_leaf(content, MakePage::Append).unwrap().unwrap();
        let pages = layout.pages();
        assert_eq!(pages.len(), 2);
        let follow = layout.follow(sect).unwrap().unwrap();
        assert_eq!(leaf, follow);
        assert_eq!(layout.arena[follow].upper, layout.arena.page_body(pages[1]));

        // A second search finds the existing follow.
        assert_eq!(layout.next_sct_leaf(content, MakePage::Append), Ok(Some(follow)));
        assert_eq!(layout.pages().len(), 2);
    }

    #[test]
    fn test_next_sct_leaf_without_section_returns_bare_leaf() {
        let mut doc = Document::new();
        let section = doc.add_section(SectionDescriptor::new());
        let para = doc.add_paragraph(Paragraph::new(Abs::raw(1000)));
        let (mut layout, body) = layout_with(doc);
        let sect = layout.create_section(section, body, None).unwrap();
        let content = layout.insert_content(para, sect, None).unwrap();
        let page = layout.append_page(crate::model::PageDescId(0)).unwrap();
        let next = layout.page_body(page).unwrap();
        assert_eq!(layout.next_sct_leaf(content, MakePage::NoSection), Ok(Some(next)));
        assert_eq!(layout.follow(sect), Ok(None));
    }

    #[test]
    fn test_ind_prev_and_next_look_through_sections() {
        let mut doc = Document::new();
        let section = doc.add_section(SectionDescriptor::new());
        let para = doc.add_paragraph(Paragraph::new(Abs::raw(1000)));
        let (mut layout, body) = layout_with(doc);
        let before = layout.insert_content(para, body, None).unwrap();
        let sect = layout.create_section(section, body, None).unwrap();
        let inside = layout.insert_content(para, sect, None).unwrap();
        let after = layout.insert_content(para, body, None).unwrap();
        assert_eq!(layout.ind_prev_frame(inside), Ok(Some(before)));
        assert_eq!(layout.ind_next_frame(inside), Ok(Some(after)));
        assert_eq!(layout.ind_prev_frame(before), Ok(None));
    }

    #[test]
    fn test_ind_next_stops_at_filled_column() {
        let mut doc = Document::new();
        let section = doc.add_section(SectionDescriptor::new().with_columns(2, Abs::zero()));
        let para = doc.add_paragraph(Paragraph::new(Abs::raw(1000)));
        let (mut layout, body) = layout_with(doc);
        let sect = layout.create_section(section, body, None).unwrap();
        let after = layout.insert_content(para, body, None).unwrap();
        let first = layout.insert_content(para, sect, None).unwrap();
        assert_eq!(layout.ind_next_frame(first), Ok(Some(after)));

        let columns = layout.arena.columns(sect);
        let second = layout.arena.column_body(columns[1]).unwrap();
        layout.insert_content(para, second, None).unwrap();
        assert_eq!(layout.ind_next_frame(first), Ok(None));
    }

    #[test]
    fn test_wrong_page_desc_compares_styles() {
        let mut doc = Document::new();
        doc.add_page_desc(test_page());
        let landscape = doc.add_page_desc(crate::model::PageDesc {
            width: Abs::raw(12000),
            height: Abs::raw(10000),
            ..test_page()
        });
        let para = doc.add_paragraph(Paragraph {
            page_desc: Some(landscape),
            ..Paragraph::new(Abs::raw(1000))
        });
        let plain = doc.add_paragraph(Paragraph::new(Abs::raw(1000)));
        let (mut layout, body) = layout_with(doc);
        let page = layout.pages()[0];
        let content = layout.insert_content(para, body, None).unwrap();
        let other = layout.insert_content(plain, body, None).unwrap();
        let wide = layout.append_page(landscape).unwrap();
        assert_eq!(layout.wrong_page_desc(content, page), Ok(true));
        assert_eq!(layout.wrong_page_desc(content, wide), Ok(false));
        assert_eq!(layout.wrong_page_desc(other, page), Ok(false));
    }

    #[test]
    fn test_move_allowed_until_tail_can_grow() {
        let mut doc = Document::new();
        let section = doc.add_section(SectionDescriptor::new());
        let para = doc.add_paragraph(Paragraph::new(Abs::raw(1000)));
        let (mut layout, body) = layout_with(doc);
        let sect = layout.create_section(section, body, None).unwrap();
        let content = layout.insert_content(para, sect, None).unwrap();
        layout.run();
        // The section still has room on its page.
        assert_eq!(layout.move_allowed(sect, content), Ok(false));
        let follow = layout.create_follow(sect).unwrap();
        assert_eq!(layout.move_allowed(sect, content), Ok(true));
        assert_eq!(layout.follow(sect), Ok(Some(follow)));
    }
}
