//! The page host: formats pages and moves flow frames between leaves.

use crate::geom::{Abs, Rect};
use crate::layout::Layout;
use crate::section::MakePage;
use crate::tree::{NodeId, NodeKind, Source, Validity};

impl Layout {
    /// Formats a page and everything on it.
    pub(crate) fn format_page(&mut self, page: NodeId) {
        self.layout_page_parts(page);
        let parts: Vec<NodeId> = self.arena.children(page).collect();
        for part in parts {
            if !self.arena.contains(part) {
                continue;
            }
            match self.arena.kind(part) {
                NodeKind::Header | NodeKind::Body | NodeKind::Footer => self.format_lowers(part),
                NodeKind::FootnoteContainer => self.format_container(part),
                NodeKind::Fly(_) => self.format_fly(part),
                _ => {}
            }
        }
        self.layout_page_parts(page);
    }

    /// Positions a page and sizes its header, body, footnotes and footer.
    pub(crate) fn layout_page_parts(&mut self, page: NodeId) {
        let NodeKind::Page(data) = self.arena.kind(page).clone() else { return };
        let style = self.page_style(data.desc);
        let y = self.arena[page].prev.map(|p| self.arena[p].frame.bottom()).unwrap_or_default();
        let mut height = style.height;
        if self.settings.browse_mode {
            height.set_max(self.arena[page].frame.height);
        }
        self.place(page, Rect::new(Abs::zero(), y, style.width, height));
        let prt = Rect::new(
            style.margin_left,
            style.margin_top,
            (style.width - style.margin_left - style.margin_right).max(Abs::zero()),
            (height - style.margin_top - style.margin_bottom).max(Abs::zero()),
        );
        self.arena[page].prt = prt;
        self.validate(page, Validity::all());

        let area = self.arena[page].prt_abs();
        let mut top = area.y;
        let mut bottom = area.bottom();
        let mut body = None;
        let mut container = None;
        let parts: Vec<NodeId> = self.arena.children(page).collect();
        for &part in &parts {
            match self.arena.kind(part) {
                NodeKind::Header => {
                    let h = self.arena[part].frame.height.max(style.header.unwrap_or_default());
                    self.place_part(part, Rect::new(area.x, top, area.width, h));
                    top += h;
                }
                NodeKind::Footer => {
                    let h = self.arena[part].frame.height.max(style.footer.unwrap_or_default());
                    bottom -= h;
                    self.place_part(part, Rect::new(area.x, bottom, area.width, h));
                }
                NodeKind::Body => body = Some(part),
                NodeKind::FootnoteContainer => container = Some(part),
                _ => {}
            }
        }
        if let Some(cont) = container {
            let h = if data.footnote_page {
                bottom - top
            } else {
                self.container_height(cont).min((bottom - top).max(Abs::zero()))
            };
            bottom -= h;
            self.place_part(cont, Rect::new(area.x, bottom, area.width, h));
        }
        if let Some(body) = body {
            let h = (bottom - top).max(Abs::zero());
            self.place_part(body, Rect::new(area.x, top, area.width, h));
        }
    }

    /// Places a layout part whose print area covers its whole frame.
    pub(crate) fn place_part(&mut self, id: NodeId, rect: Rect) {
        self.place(id, rect);
        self.arena[id].prt = Rect::new(Abs::zero(), Abs::zero(), rect.width, rect.height);
        self.validate(id, Validity::all());
    }

    /// Moves a node with its subtree to the rect's position and gives it the
    /// rect's size.
    pub(crate) fn place(&mut self, id: NodeId, rect: Rect) {
        let frame = self.arena[id].frame;
        self.arena.shift(id, rect.x - frame.x, rect.y - frame.y);
        let node = &mut self.arena[id];
        node.frame.width = rect.width;
        node.frame.height = rect.height;
    }

    /// Formats the flow frames of a layout leaf.
    pub(crate) fn format_lowers(&mut self, leaf: NodeId) {
        let mut child = self.arena.get(leaf).and_then(|node| node.first);
        let mut budget = 4 * self.arena.len() + 16;
        while let Some(c) = child {
            budget -= 1;
            if budget == 0 {
                self.anomaly(Some(leaf), "flow formatting does not terminate".into());
                return;
            }
            let next = self.arena[c].next;
            self.format_flow(c);
            if !self.arena.contains(leaf) {
                return;
            }
            let still_here = self.arena.get(c).is_some_and(|node| node.upper == Some(leaf));
            child = if still_here {
                self.arena[c].next
            } else {
                next.filter(|&n| self.arena.get(n).is_some_and(|node| node.upper == Some(leaf)))
            };
        }
    }

    /// Formats a single flow frame.
    pub(crate) fn format_flow(&mut self, id: NodeId) {
        match self.arena.kind(id) {
            NodeKind::Content(_) => self.format_content(id),
            NodeKind::Table => self.format_table(id),
            NodeKind::Section(_) => self.format_section_flow(id),
            _ => {}
        }
    }

    /// The height a content frame wants.
    pub(crate) fn content_height(&self, id: NodeId) -> Abs {
        let NodeKind::Content(data) = self.arena.kind(id) else {
            return self.arena[id].frame.height;
        };
        match data.source {
            Source::Paragraph(p) => self.doc.paragraph(p).map(|p| p.height).unwrap_or_default(),
            Source::NoteBody(n) => {
                let share = self.arena[id].upper.and_then(|up| match self.arena.kind(up) {
                    NodeKind::Footnote(f) => f.share,
                    _ => None,
                });
                share.or_else(|| self.doc.note(n).map(|n| n.height)).unwrap_or_default()
            }
        }
    }

    /// Where the next flow frame in `id`'s leaf starts: under the previous
    /// sibling or at the top of the print area.
    fn flow_top(&self, id: NodeId) -> Abs {
        match self.arena.prev_alive(id) {
            Some(prev) => self.arena[prev].frame.bottom(),
            None => self.arena[id].upper.map(|up| self.arena[up].prt_abs().y).unwrap_or_default(),
        }
    }

    /// Puts a flow frame at its place in its leaf. Returns whether it moved.
    pub(crate) fn make_pos(&mut self, id: NodeId) -> bool {
        let Some(up) = self.arena[id].upper else { return false };
        let x = self.arena[up].prt_abs().x;
        let y = self.flow_top(id);
        let frame = self.arena[id].frame;
        self.validate(id, Validity::POS);
        if frame.x == x && frame.y == y {
            return false;
        }
        self.arena.shift(id, x - frame.x, y - frame.y);
        true
    }

    fn format_content(&mut self, id: NodeId) {
        let Some(up) = self.arena[id].upper else { return };
        let old = self.arena[id].frame;
        let was_sized = self.is_valid(id, Validity::SIZE);
        let area = self.arena[up].prt_abs();
        let height = self.content_height(id);
        let rect = Rect::new(area.x, self.flow_top(id), area.width, height);
        self.place(id, rect);
        self.arena[id].prt = Rect::new(Abs::zero(), Abs::zero(), rect.width, rect.height);
        self.validate(id, Validity::all());
        if was_sized && old.height > height {
            self.shrink_frame(up, old.height - height, false);
        }
        self.settle(id);
    }

    fn format_table(&mut self, id: NodeId) {
        let Some(up) = self.arena[id].upper else { return };
        let old = self.arena[id].frame;
        let area = self.arena[up].prt_abs();
        let y = self.flow_top(id);
        self.place(id, Rect::new(area.x, y, area.width, old.height));
        let cells: Vec<NodeId> = self.arena.children(id).collect();
        let count = cells.len().max(1) as i64;
        let width = area.width / count;
        let mut height = Abs::zero();
        for (i, &cell) in cells.iter().enumerate() {
            let x = area.x + width * i as i64;
            let w = if i + 1 == cells.len() { area.right() - x } else { width };
            let h = self.arena[cell].frame.height;
            self.place_part(cell, Rect::new(x, y, w, h));
            self.format_lowers(cell);
            let extent = self.lower_extent(cell);
            self.place_part(cell, Rect::new(x, y, w, extent));
            height.set_max(extent);
        }
        self.arena[id].frame.height = height;
        self.arena[id].prt = Rect::new(Abs::zero(), Abs::zero(), area.width, height);
        self.validate(id, Validity::all());
        if old.height > height && old.height > Abs::zero() {
            self.shrink_frame(up, old.height - height, false);
        }
        self.settle(id);
    }

    fn format_fly(&mut self, fly: NodeId) {
        self.format_lowers(fly);
        if matches!(self.arena.kind(fly), NodeKind::Fly(data) if data.auto_grow) {
            let extent = self.lower_extent(fly);
            let node = &mut self.arena[fly];
            node.frame.height = extent;
            node.prt.height = extent;
        }
        self.validate(fly, Validity::all());
    }

    /// The height of the stacked flow frames of a leaf.
    pub(crate) fn lower_extent(&self, leaf: NodeId) -> Abs {
        self.arena.children(leaf).map(|c| self.arena[c].frame.height).sum()
    }

    /// Makes a freshly formatted flow frame fit: asks the leaf to grow when
    /// the frame overflows, moves it forward when that is not enough and
    /// backward when the previous leaf has room.
    fn settle(&mut self, id: NodeId) {
        let Some(up) = self.arena[id].upper else { return };
        let bottom = self.arena[id].frame.bottom();
        let deadline = self.prt_bottom(up);
        if bottom > deadline {
            let need = bottom - deadline;
            let got = self.grow_frame(up, need, false);
            if got < need
                && self.arena.contains(id)
                && self.arena[id]
                    .upper
                    .is_some_and(|up| self.arena[id].frame.bottom() > self.prt_bottom(up))
                && self.can_move_fwd(id)
            {
                self.move_fwd(id);
            }
        } else if self.arena.prev_alive(id).is_none() {
            self.move_bwd(id);
        }
    }

    /// Whether some flow content precedes the frame on its page.
    pub(crate) fn flow_prev(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        loop {
            if let Some(prev) = self.arena.prev_alive(current) {
                return Some(prev);
            }
            let up = self.arena[current].upper?;
            if self.arena.is_section(up) {
                current = up;
            } else if self.arena.is_col_body(up) {
                let column = self.arena[up].upper?;
                let mut col = self.arena[column].prev;
                while let Some(c) = col {
                    if let Some(last) = self.arena.column_body(c).and_then(|b| self.arena[b].last) {
                        return Some(last);
                    }
                    col = self.arena[c].prev;
                }
                current = self.arena[column].upper.filter(|&s| self.arena.is_section(s))?;
            } else {
                return None;
            }
        }
    }

    /// Whether a flow frame may leave its leaf for the next one.
    pub(crate) fn can_move_fwd(&mut self, id: NodeId) -> bool {
        let in_table = self
            .arena
            .ancestors(id)
            .any(|a| matches!(self.arena.kind(a), NodeKind::Table | NodeKind::Cell));
        if in_table || !self.arena.in_doc_body(id) {
            return false;
        }
        if let Some(sect) = self.arena.find_outer_sect(id)
            && !self.move_allowed_impl(sect, id)
        {
            return false;
        }
        self.flow_prev(id).is_some()
    }

    /// Moves a frame and its following siblings to the start of the next
    /// leaf.
    pub(crate) fn move_fwd(&mut self, id: NodeId) -> bool {
        let Some(up) = self.arena[id].upper else { return false };
        let leaf = if self.arena.in_sect(up) {
            self.next_sct_leaf_impl(id, MakePage::Append)
        } else {
            self.next_body_leaf(id, MakePage::Append)
        };
        let Some(leaf) = leaf.filter(|&l| l != up && !self.arena.is_lower_of(l, id)) else {
            return false;
        };
        let Some(up) = self.arena[id].upper else { return false };
        let mut frames = vec![id];
        let mut next = self.arena[id].next;
        while let Some(n) = next {
            if !self.arena.is_zombie(n) {
                frames.push(n);
            }
            next = self.arena[n].next;
        }
        let height: Abs = frames.iter().map(|&f| self.arena[f].frame.height).sum();
        let before = self.arena[leaf].first;
        for &frame in &frames {
            self.arena.unlink(frame);
            self.arena.link(frame, leaf, before);
            self.invalidate(frame, Validity::POS);
        }
        tracing::trace!(?id, ?leaf, moved = frames.len(), "moved forward");
        if self.arena.contains(up) {
            self.shrink_frame(up, height, false);
            self.invalidate_upper_sizes(up);
        }
        self.invalidate_upper_sizes(leaf);
        true
    }

    /// Moves the first frame of a leaf to the end of the previous leaf if
    /// it fits there.
    pub(crate) fn move_bwd(&mut self, id: NodeId) -> bool {
        let Some(up) = self.arena[id].upper else { return false };
        let in_table = self
            .arena
            .ancestors(id)
            .any(|a| matches!(self.arena.kind(a), NodeKind::Table | NodeKind::Cell));
        if in_table || !self.arena.in_doc_body(id) {
            return false;
        }
        let need = self.arena[id].frame.height + self.note_demand(id);
        let target = if self.arena.is_col_body(up) || self.arena.is_section(up) {
            // Within a section the column distribution decides.
            let column_up = self.arena.is_col_body(up).then(|| self.arena[up].upper).flatten();
            if column_up.is_some_and(|c| self.arena[c].prev.is_some()) {
                return false;
            }
            let Some(sect) = self.arena.find_sect(up) else { return false };
            if self.ind_prev(sect).is_some() {
                return false;
            }
            if self.arena.find_master(sect).is_none() {
                // A new master would be created on the previous page.
                let Some(prev) = self.prev_body_leaf(sect) else { return false };
                if self.leaf_room(prev) < need {
                    return false;
                }
            }
            self.prev_sct_leaf_impl(id)
        } else if self.arena.is_page_body(up) {
            self.prev_body_leaf(id)
        } else {
            None
        };
        let Some(leaf) = target.filter(|&l| l != up) else { return false };
        if self.leaf_room(leaf) < need {
            return false;
        }
        self.arena.unlink(id);
        self.arena.link(id, leaf, None);
        self.invalidate(id, Validity::POS);
        tracing::trace!(?id, ?leaf, "moved backward");
        if self.arena.contains(up) {
            self.shrink_frame(up, need, false);
            self.invalidate_upper_sizes(up);
            if let Some(first) = self.arena[up].first {
                self.invalidate(first, Validity::POS);
            }
        }
        self.invalidate_upper_sizes(leaf);
        true
    }

    /// How much more flow a leaf can take.
    pub(crate) fn leaf_room(&mut self, leaf: NodeId) -> Abs {
        let top = self.arena[leaf].prt_abs().y;
        let used = self
            .arena
            .children(leaf)
            .filter(|&c| !self.arena.is_zombie(c))
            .last()
            .map_or(top, |last| self.arena[last].frame.bottom());
        let slack = (self.prt_bottom(leaf) - used).max(Abs::zero());
        slack + self.grow_frame(leaf, Abs::MAX, true)
    }

    /// The next page body after the frame's own one.
    pub(crate) fn next_body_leaf(&mut self, id: NodeId, make_page: MakePage) -> Option<NodeId> {
        let own = self.arena.find_page(id)?;
        let mut inserted = false;
        loop {
            let mut leaf = self.arena.next_layout_leaf(id);
            while let Some(l) = leaf {
                let page = self.arena.find_page(l);
                let note_page = page.is_some_and(
                    |p| matches!(self.arena.kind(p), NodeKind::Page(d) if d.footnote_page),
                );
                if self.arena.is_page_body(l) && page != Some(own) && !note_page {
                    return Some(l);
                }
                leaf = self.arena.next_layout_leaf(l);
            }
            if inserted || !matches!(make_page, MakePage::Append | MakePage::Insert) {
                return None;
            }
            self.insert_page(Some(own), None);
            inserted = true;
        }
    }

    /// The previous page body before the frame's own one.
    pub(crate) fn prev_body_leaf(&self, id: NodeId) -> Option<NodeId> {
        let own = self.arena.find_page(id);
        let mut leaf = self.arena.prev_layout_leaf(id);
        while let Some(l) = leaf {
            if self.arena.is_page_body(l) && self.arena.find_page(l) != own {
                return Some(l);
            }
            leaf = self.arena.prev_layout_leaf(l);
        }
        None
    }

    /// The next frame in flow order, leaving sections if necessary.
    pub(crate) fn find_next_flow(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        loop {
            if let Some(next) = self.arena.next_alive(current) {
                return Some(next);
            }
            let up = self.arena.get(current)?.upper?;
            if self.arena.is_section(up) {
                current = up;
            } else if self.arena.is_col_body(up) {
                let column = self.arena[up].upper?;
                let mut col = self.arena[column].next;
                while let Some(c) = col {
                    let first = self.arena.column_body(c).and_then(|b| self.arena[b].first);
                    if first.is_some() {
                        return first;
                    }
                    col = self.arena[c].next;
                }
                current = self.arena[column].upper?;
            } else {
                return None;
            }
        }
    }

    /// Asks a layout node to grow by `delta`. Returns how much it grew or,
    /// in test mode, how much it could grow.
    pub(crate) fn grow_frame(&mut self, id: NodeId, delta: Abs, test: bool) -> Abs {
        if delta <= Abs::zero() || !self.arena.contains(id) {
            return Abs::zero();
        }
        match self.arena.kind(id).clone() {
            NodeKind::Section(_) => self.grow_section(id, delta, test),
            NodeKind::Body if self.arena.is_col_body(id) => {
                let section = self.arena[id].upper.and_then(|c| self.arena[c].upper);
                section.map_or(Abs::zero(), |s| self.grow_frame(s, delta, test))
            }
            NodeKind::Column => {
                let section = self.arena[id].upper;
                section.map_or(Abs::zero(), |s| self.grow_frame(s, delta, test))
            }
            NodeKind::Body if self.settings.browse_mode => {
                if !test && let Some(page) = self.arena[id].upper {
                    self.arena[page].frame.height += delta;
                    self.layout_page_parts(page);
                }
                delta
            }
            NodeKind::Header | NodeKind::Footer => self.grow_part(id, delta, test),
            NodeKind::Cell => {
                if !test {
                    self.resize_cell(id, self.arena[id].frame.height + delta);
                }
                delta
            }
            NodeKind::Fly(data) if data.auto_grow => {
                if !test {
                    let node = &mut self.arena[id];
                    node.frame.height += delta;
                    node.prt.height += delta;
                }
                delta
            }
            NodeKind::Footnote(_) | NodeKind::FootnoteContainer => {
                if !test {
                    let node = &mut self.arena[id];
                    node.frame.height += delta;
                    node.prt.height += delta;
                }
                delta
            }
            _ => Abs::zero(),
        }
    }

    /// Asks a layout node to shrink by `delta`. Returns how much it shrank
    /// or, in test mode, how much it could shrink.
    pub(crate) fn shrink_frame(&mut self, id: NodeId, delta: Abs, test: bool) -> Abs {
        if delta <= Abs::zero() || !self.arena.contains(id) {
            return Abs::zero();
        }
        match self.arena.kind(id).clone() {
            NodeKind::Section(_) => self.shrink_section(id, delta, test),
            NodeKind::Body if self.arena.is_col_body(id) => {
                let section = self.arena[id].upper.and_then(|c| self.arena[c].upper);
                section.map_or(Abs::zero(), |s| self.shrink_frame(s, delta, test))
            }
            NodeKind::Header | NodeKind::Footer => self.shrink_part(id, delta, test),
            NodeKind::Cell => {
                let dist = delta.min(self.arena[id].frame.height);
                if !test {
                    self.resize_cell(id, self.arena[id].frame.height - dist);
                }
                dist
            }
            NodeKind::Fly(data) if data.auto_grow => {
                let dist = delta.min(self.arena[id].frame.height);
                if !test {
                    let node = &mut self.arena[id];
                    node.frame.height -= dist;
                    node.prt.height -= dist;
                }
                dist
            }
            _ => Abs::zero(),
        }
    }

    fn resize_cell(&mut self, cell: NodeId, height: Abs) {
        let node = &mut self.arena[cell];
        node.frame.height = height;
        node.prt.height = height;
        if let Some(table) = node.upper {
            let tallest = self
                .arena
                .children(table)
                .map(|c| self.arena[c].frame.height)
                .max()
                .unwrap_or_default();
            let node = &mut self.arena[table];
            node.frame.height = tallest;
            node.prt.height = tallest;
        }
    }

    /// Headers and footers take space from the body, down to half of the
    /// page's print area.
    fn grow_part(&mut self, part: NodeId, delta: Abs, test: bool) -> Abs {
        let Some(page) = self.arena[part].upper else { return Abs::zero() };
        let Some(body) = self.arena.page_body(page) else { return Abs::zero() };
        let floor = self.arena[page].prt.height / 2;
        let avail = (self.arena[body].frame.height - floor).max(Abs::zero());
        let grow = delta.min(avail);
        if !test && grow > Abs::zero() {
            self.arena[part].frame.height += grow;
            self.layout_page_parts(page);
            if let Some(first) = self.arena[body].first {
                self.invalidate(first, Validity::POS);
            }
        }
        grow
    }

    fn shrink_part(&mut self, part: NodeId, delta: Abs, test: bool) -> Abs {
        let Some(page) = self.arena[part].upper else { return Abs::zero() };
        let NodeKind::Page(data) = self.arena.kind(page) else { return Abs::zero() };
        let style = self.page_style(data.desc);
        let min = if self.arena.is_header(part) { style.header } else { style.footer };
        let height = self.arena[part].frame.height;
        let dist = delta.min(height - min.unwrap_or_default()).max(Abs::zero());
        if !test && dist > Abs::zero() {
            self.arena[part].frame.height -= dist;
            self.layout_page_parts(page);
        }
        dist
    }

    /// Detaches the flow frames of `lay` from `start` on (or all of them),
    /// walking through all columns of a columned frame.
    pub(crate) fn save_content(&mut self, lay: NodeId, start: Option<NodeId>) -> Vec<NodeId> {
        let leaves: Vec<NodeId> = if self.arena.has_columns(lay) {
            self.arena
                .columns(lay)
                .into_iter()
                .filter_map(|c| self.arena.column_body(c))
                .collect()
        } else {
            vec![lay]
        };
        let mut saved = vec![];
        let mut saving = start.is_none();
        for leaf in leaves {
            let children: Vec<NodeId> = self.arena.children(leaf).collect();
            for child in children {
                saving |= Some(child) == start;
                if saving {
                    self.arena.unlink(child);
                    saved.push(child);
                }
            }
        }
        saved
    }

    /// Reattaches saved flow frames under `parent` before `before`.
    pub(crate) fn restore_content(
        &mut self,
        saved: Vec<NodeId>,
        parent: NodeId,
        before: Option<NodeId>,
    ) {
        for frame in saved {
            self.arena.link(frame, parent, before);
            self.invalidate(frame, Validity::all());
        }
        self.invalidate_upper_sizes(parent);
    }
}
