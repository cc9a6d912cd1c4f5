use crate::diag::LayoutResult;
use crate::geom::Abs;
use crate::layout::Layout;
use crate::lock::{DepthGuard, Lock};
use crate::notes::Layouter;
use crate::tree::{NodeId, NodeKind, Validity};

use super::FindMode;

impl Layout {
    /// Brings a section frame's position and size up to date.
    pub fn format_section(&mut self, id: NodeId) -> LayoutResult<()> {
        self.section_data(id)?;
        let mut this = DepthGuard::new(self);
        this.make_all(id);
        Ok(())
    }

    /// Stretches a section frame down to its deadline without touching its
    /// content.
    pub fn simple_format_section(&mut self, id: NodeId) -> LayoutResult<()> {
        self.live_section(id)?;
        self.simple_format(id);
        Ok(())
    }

    /// Clips a section frame at its deadline, growing the upper first if
    /// `grow` is set.
    pub fn check_clipping(&mut self, id: NodeId, grow: bool, maximize: bool) -> LayoutResult<()> {
        self.live_section(id)?;
        self.check_clipping_impl(id, grow, maximize);
        Ok(())
    }

    /// Grows a section frame by up to `delta`. In test mode nothing changes
    /// and the result tells how much growth would be granted.
    pub fn grow(&mut self, id: NodeId, delta: Abs, test: bool) -> LayoutResult<Abs> {
        self.live_section(id)?;
        if delta <= Abs::zero() {
            return Ok(Abs::zero());
        }
        Ok(self.grow_section(id, delta, test))
    }

    /// Shrinks a section frame by up to `delta`.
    pub fn shrink(&mut self, id: NodeId, delta: Abs, test: bool) -> LayoutResult<Abs> {
        self.live_section(id)?;
        if delta <= Abs::zero() {
            return Ok(Abs::zero());
        }
        Ok(self.shrink_section(id, delta, test))
    }

    /// Whether a section frame has room to grow, either towards its deadline
    /// or by growing its upper.
    pub fn growable(&mut self, id: NodeId) -> LayoutResult<bool> {
        self.live_section(id)?;
        Ok(self.growable_impl(id))
    }

    /// How much the content of a section frame exceeds its print area.
    /// Negative overflow is reported only with `over_size`.
    pub fn undersize(&mut self, id: NodeId, over_size: bool) -> LayoutResult<Abs> {
        self.live_section(id)?;
        Ok(self.undersize_impl(id, over_size))
    }

    /// For a frame that fills its space, how far its bottom is from the
    /// bottom of its upper's print area.
    pub fn calc_min_diff(&self, id: NodeId) -> LayoutResult<Option<Abs>> {
        self.live_section(id)?;
        if !self.to_maximize_impl(id, true) {
            return Ok(None);
        }
        let Some(up) = self.arena[id].upper else { return Ok(None) };
        Ok(Some(self.prt_bottom(up) - self.arena[id].frame.bottom()))
    }

    /// Whether the frame may show its columns unbalanced: it has several
    /// columns and its section turned column balancing off.
    pub fn is_balanced_section(&self, id: NodeId) -> LayoutResult<bool> {
        self.section_data(id)?;
        let multi = self.arena.columns(id).len() > 1;
        Ok(multi && self.descriptor(id).is_some_and(|desc| !desc.balance))
    }

    /// The height the content of a section frame needs.
    pub fn inner_height(&self, id: NodeId) -> LayoutResult<Abs> {
        self.arena.checked(id)?;
        Ok(self.inner_height_impl(id))
    }

    /// Formats a section frame met in the flow, then its content.
    pub(crate) fn format_section_flow(&mut self, id: NodeId) {
        if self.depth > self.settings.max_format_depth {
            return;
        }
        let mut this = DepthGuard::new(self);
        this.invalidate(id, Validity::POS);
        this.make_all(id);
        if !this.settled(id) {
            return;
        }
        if !this.arena.has_columns(id) || this.to_maximize_impl(id, false) {
            this.calc_content(id);
        }
        if this.settled(id) && this.needs_refit(id) {
            this.invalidate(id, Validity::SIZE);
            this.make_all(id);
        }
    }

    /// Whether a section frame is still alive, placed and not a zombie.
    fn settled(&self, id: NodeId) -> bool {
        self.arena.get(id).is_some_and(|node| node.upper.is_some() && !node.is_zombie())
    }

    /// Whether the size of a section frame no longer matches its content or
    /// its deadline.
    fn needs_refit(&self, id: NodeId) -> bool {
        if !self.is_valid(id, Validity::SIZE) {
            return true;
        }
        let node = &self.arena[id];
        let Some(up) = node.upper else { return false };
        if node.frame.bottom() > self.prt_bottom(up) {
            return true;
        }
        if self.to_maximize_impl(id, false) || self.arena.has_columns(id) {
            return false;
        }
        let undersized = node.section().is_some_and(|d| d.undersized);
        let want = node.top_margin() + self.inner_height_impl(id);
        want != node.frame.height && !(undersized && want > node.frame.height)
    }

    /// Merges adjacent follows, formats the frame and deletes it if it ended
    /// up superfluous.
    #[tracing::instrument(level = "trace", skip(self))]
    pub(crate) fn make_all(&mut self, id: NodeId) {
        let Some(node) = self.arena.get(id) else { return };
        let (locks, zombie) = (node.locks, node.is_zombie());
        let positioned = node.upper.is_none() || node.valid.contains(Validity::POS);
        if locks.join > 0 || locks.col > 0 {
            return;
        }
        if self.depth > self.settings.max_format_depth {
            self.anomaly(Some(id), "section formatting nests too deep".into());
            return;
        }
        if zombie {
            if !positioned {
                self.make_pos(id);
            }
            self.validate(id, Validity::all());
            return;
        }

        {
            let mut this = Lock::join(self, id);
            while let Some(next) = this.arena[id].next
                && this.follow_of(id) == Some(next)
            {
                if !this.merge_next_impl(id, next) {
                    break;
                }
            }
            if this.settings.browse_mode && this.grow_section(id, Abs::MAX, true) > Abs::zero() {
                while let Some(follow) = this.follow_of(id) {
                    if !this.merge_next_impl(id, follow) {
                        break;
                    }
                }
            }

            if !this.is_valid(id, Validity::POS) && this.to_maximize_impl(id, false) {
                this.invalidate(id, Validity::SIZE);
            }
            let mut rounds = 0;
            while !this.is_valid(id, Validity::all()) && rounds < 4 {
                rounds += 1;
                if !this.is_valid(id, Validity::POS) {
                    let moved = this.make_pos(id);
                    if moved && this.arena[id].upper.is_some_and(|up| {
                        this.arena[id].frame.bottom() > this.prt_bottom(up)
                    }) {
                        this.invalidate(id, Validity::SIZE);
                    }
                }
                this.format(id);
            }
            if this.endnotes_misplaced(id) {
                let mut layouter = Layouter::new();
                let mut locked = Lock::col(&mut this, id);
                locked.collect_endnotes_impl(id, &mut layouter);
                let tail = locked.chain_of(id).last().copied().unwrap_or(id);
                layouter.insert_into(&mut locked, tail);
            }
        }

        if self.arena.contains(id) && !self.arena.is_zombie(id) && self.is_superfluous_impl(id) {
            self.del_empty_impl(id, false);
        }
    }

    /// Computes the print area and the size of a section frame.
    pub(crate) fn format(&mut self, id: NodeId) {
        if self.arena.is_zombie(id) {
            self.validate(id, Validity::all());
            return;
        }
        let (left, right) = self.descriptor(id).map(|d| (d.left, d.right)).unwrap_or_default();
        if !self.is_valid(id, Validity::PRT) {
            self.validate(id, Validity::PRT);
            self.set_x_margins(id, left, right);
            if self.arena[id].top_margin() != Abs::zero() {
                self.invalidate(id, Validity::SIZE);
                if let Some(first) = self.arena.contains_any(id, false) {
                    self.invalidate(first, Validity::POS);
                }
            }
            self.set_y_margins(id, Abs::zero(), Abs::zero());
        }
        if self.is_valid(id, Validity::SIZE) {
            return;
        }

        let old_height = self.arena[id].frame.height;
        let up = self.arena[id].upper;
        {
            let mut this = Lock::col(self, id);
            this.validate(id, Validity::SIZE);
            let mut maximize = this.to_maximize_impl(id, false);
            let columned = this.arena.has_columns(id);
            if let Some(up) = up {
                let width = this.arena[up].prt.width;
                this.arena[id].frame.width = width;
                this.set_x_margins(id, left, right);
                if columned {
                    this.adjust_columns(id);
                }
                let browse = this.settings.browse_mode;
                this.check_clipping_impl(id, browse, maximize);
                maximize = this.to_maximize_impl(id, false);
            }

            if maximize {
                if columned {
                    this.format_width_cols(id, true);
                }
            } else {
                let top = this.arena[id].top_margin();
                let mut remaining = top;
                if columned {
                    let upper_height = up.map(|u| this.arena[u].frame.height).unwrap_or_default();
                    let height = if upper_height > Abs::zero() {
                        this.format_width_cols(id, false)
                    } else {
                        this.arena[id].prt.height
                    };
                    this.delete_empty_follows(id);
                    maximize = this.to_maximize_impl(id, false);
                    remaining += height;
                } else {
                    remaining += this.inner_height_impl(id);
                    maximize = this.follow_of(id).is_some();
                }

                let height = this.arena[id].frame.height;
                let mut diff = height - remaining;
                if diff < Abs::zero()
                    && let Some(up) = up
                {
                    let mut deadline = this.prt_bottom(up);
                    let bottom = this.arena[id].frame.bottom() - diff;
                    let overflow = bottom - deadline;
                    if overflow > Abs::zero() {
                        deadline += this.grow_frame(up, overflow, true);
                        let overflow = bottom - deadline;
                        if overflow > Abs::zero() {
                            diff += overflow;
                        }
                        diff.set_min(Abs::zero());
                    }
                }
                if diff != Abs::zero() {
                    this.arena[id].frame.height = remaining;
                    this.set_y_margins(id, top, Abs::zero());
                    this.invalidate_next_pos(id);
                    if columned {
                        this.adjust_columns(id);
                    }
                }
            }
            if up.is_some() {
                this.check_clipping_impl(id, true, maximize);
            }
        }

        let shrunk = old_height - self.arena[id].frame.height;
        if shrunk > Abs::zero()
            && let Some(up) = up
            && !self.arena.is_footer(up)
        {
            self.shrink_frame(up, shrunk, false);
        }
        if self.section_flags(id).is_some_and(|d| d.undersized) {
            self.validate(id, Validity::PRT);
        }
        tracing::trace!(?id, height = ?self.arena[id].frame.height, "formatted section");
    }

    /// Destroys the follows of a frame that hold nothing anymore.
    fn delete_empty_follows(&mut self, id: NodeId) {
        while let Some(follow) = self.follow_of(id) {
            if self.arena.contains_content(follow).is_some()
                || self.arena.contains_any(follow, true).is_some()
            {
                break;
            }
            self.del_empty_impl(follow, false);
            if self.follow_of(id) == Some(follow) {
                break;
            }
        }
    }

    pub(crate) fn simple_format(&mut self, id: NodeId) {
        let node = &self.arena[id];
        if node.locks.join > 0 || node.locks.col > 0 {
            return;
        }
        let Some(up) = node.upper else { return };
        let mut this = Lock::join(self, id);
        this.make_pos(id);
        let deadline = this.prt_bottom(up);
        if deadline >= this.arena[id].frame.bottom() {
            this.arena[id].frame.set_bottom(deadline);
            let top = this.arena[id].top_margin().min(this.arena[id].frame.height);
            this.set_y_margins(id, top, Abs::zero());
        }
        drop(this);
        self.column_refresh(id, false);
    }

    pub(crate) fn check_clipping_impl(&mut self, id: NodeId, grow: bool, maximize: bool) {
        let Some(up) = self.arena[id].upper else { return };
        let mut deadline = self.prt_bottom(up);
        if grow {
            let mut diff = self.arena[id].frame.bottom() - deadline;
            if !maximize {
                diff += self.undersize_impl(id, false);
            }
            if diff > Abs::zero() {
                deadline += self.grow_frame(up, diff, false);
                if self.arena[id].upper.is_none() {
                    return;
                }
            }
        }

        let frame = self.arena[id].frame;
        let diff = frame.bottom() - deadline;
        let undersized = !maximize && diff >= Abs::zero();
        if let Some(data) = self.arena[id].section_mut() {
            data.undersized = undersized;
        }
        let top_margin = self.arena[id].top_margin();
        let calc = (undersized || maximize) && (diff != Abs::zero() || top_margin > frame.height);
        let extra = !calc && !grow && self.needs_extra_clip(id);

        if calc || extra {
            if deadline < frame.y {
                deadline = frame.y;
            }
            let old = self.arena[id].prt;
            self.arena[id].frame.set_bottom(deadline);
            let top = top_margin.min(self.arena[id].frame.height);
            self.set_y_margins(id, top, Abs::zero());
            let changed = old.height != self.arena[id].prt.height;
            if (changed || extra) && self.arena[id].first.is_some() {
                if self.arena.has_columns(id) {
                    self.column_refresh(id, false);
                    self.calc_content(id);
                } else if !maximize {
                    self.calc_content(id);
                } else {
                    let lowers: Vec<NodeId> = self.arena.children(id).collect();
                    for lower in lowers {
                        self.invalidate(lower, Validity::POS);
                    }
                }
            }
        }
    }

    /// Whether a frame that collects notes has to be clipped although its
    /// size did not change: its endnotes sit before its last content, or an
    /// empty follow is about to take over.
    fn needs_extra_clip(&mut self, id: NodeId) -> bool {
        let Some(data) = self.section_flags(id) else { return false };
        if !data.any_note_at_end() || self.arena.in_footnote(id) {
            return false;
        }
        let endnote = if data.endn_at_end {
            let (mut sect, mut empty) = (id, false);
            self.find_endnote_impl(&mut sect, &mut empty, None)
        } else {
            None
        };
        match endnote {
            Some(note) => {
                let boss = self.arena[note].upper.and_then(|c| self.arena[c].upper);
                let last = self.find_last_content_impl(id, FindMode::LastContent);
                let last_boss = last.and_then(|c| {
                    self.arena
                        .ancestors(c)
                        .find(|&a| self.arena.is_column(a) || self.arena.is_page(a))
                });
                boss.zip(last_boss).is_some_and(|(a, b)| self.arena.doc_order(a, b).is_lt())
            }
            None => {
                self.follow_of(id).is_some_and(|f| self.arena.contains_any(f, false).is_none())
            }
        }
    }

    /// Formats all flow frames inside a section frame.
    pub(crate) fn calc_content(&mut self, id: NodeId) {
        if self.arena.has_columns(id) {
            for col in self.arena.columns(id) {
                if let Some(body) = self.arena.column_body(col) {
                    self.format_lowers(body);
                }
            }
            self.calc_ftn_content_impl(id);
        } else {
            self.format_lowers(id);
        }
    }

    pub(crate) fn undersize_impl(&mut self, id: NodeId, over_size: bool) -> Abs {
        let diff = self.inner_height_impl(id) - self.arena[id].prt.height;
        let undersized = diff > Abs::zero();
        if let Some(data) = self.arena[id].section_mut() {
            data.undersized = undersized;
        }
        if diff <= Abs::zero() && !over_size { Abs::zero() } else { diff }
    }

    pub(crate) fn inner_height_impl(&self, id: NodeId) -> Abs {
        let Some(first) = self.arena[id].first else { return Abs::zero() };
        if matches!(self.arena.kind(first), NodeKind::Column | NodeKind::Cell) {
            return self
                .arena
                .children(id)
                .map(|c| {
                    let node = &self.arena[c];
                    self.inner_height_impl(c) + node.frame.height - node.prt.height
                })
                .max()
                .unwrap_or_default();
        }
        self.arena
            .children(id)
            .map(|c| {
                let node = &self.arena[c];
                let mut h = node.frame.height;
                match node.kind {
                    NodeKind::Content(_) => {
                        let want = self.content_height(c);
                        if want > node.prt.height {
                            h += want - node.prt.height;
                        }
                    }
                    NodeKind::Table => {}
                    _ => h += self.inner_height_impl(c) - node.prt.height,
                }
                h
            })
            .sum()
    }

    /// The lowest position a section frame may reach: the bottom of the
    /// print area of the first upper outside of any section.
    pub(crate) fn deadline(&self, id: NodeId) -> Abs {
        let mut up = self.arena[id].upper;
        while let Some(u) = up
            && self.arena.in_sect(u)
        {
            if self.arena.is_section(u) {
                up = self.arena[u].upper;
            } else if self.arena.is_col_body(u)
                && let Some(sect) = self.arena[u].upper.and_then(|c| self.arena[c].upper)
                && self.arena.is_section(sect)
            {
                up = self.arena[sect].upper;
            } else {
                break;
            }
        }
        match up {
            Some(up) => self.prt_bottom(up),
            None => self.arena[id].frame.bottom(),
        }
    }

    pub(crate) fn growable_impl(&mut self, id: NodeId) -> bool {
        if self.deadline(id) > self.arena[id].frame.bottom() {
            return true;
        }
        let Some(up) = self.arena[id].upper else { return false };
        self.grow_frame(up, Abs::MAX, true) > Abs::zero()
    }

    pub(crate) fn grow_section(&mut self, id: NodeId, dist: Abs, test: bool) -> Abs {
        let node = &self.arena[id];
        let fixed = node.section().is_none_or(|d| d.fixed_size);
        if node.locks.col > 0 || fixed {
            return Abs::zero();
        }
        let dist = dist.min(Abs::MAX - node.frame.height);
        if dist <= Abs::zero() {
            return Abs::zero();
        }
        let columns = self.arena.columns(id).len();
        let balance = self.descriptor(id).is_some_and(|d| d.balance);
        let allowed = columns <= 1 || !balance || self.settings.browse_mode;
        if !allowed {
            if !test {
                self.invalidate(id, Validity::SIZE);
            }
            return Abs::zero();
        }

        let up = self.arena[id].upper;
        let mut grow = if self.arena.in_footnote(id) {
            Abs::zero()
        } else {
            self.deadline(id) - self.arena[id].frame.bottom()
        };
        let space = grow;
        if grow < dist
            && let Some(up) = up
        {
            grow += self.grow_frame(up, Abs::MAX, true);
        }
        grow.set_min(dist);

        if grow <= Abs::zero() {
            if !test {
                self.invalidate(id, Validity::SIZE);
            }
            return Abs::zero();
        }
        if test {
            return grow;
        }

        if space < grow
            && let Some(up) = up
        {
            let got = self.grow_frame(up, grow - space, false);
            if dist != space + got {
                self.invalidate(id, Validity::SIZE);
            }
        }
        let node = &mut self.arena[id];
        node.frame.height += grow;
        node.prt.height += grow;
        if columns > 1 {
            for col in self.arena.columns(id) {
                self.invalidate(col, Validity::SIZE);
            }
            self.invalidate(id, Validity::SIZE);
        }
        if columns > 0 {
            self.adjust_columns(id);
        }
        match self.arena.next_alive(id) {
            Some(next) => self.invalidate(next, Validity::POS),
            None if self.settings.consider_wrap_on_object_position => self.invalidate_next_pos(id),
            None => {}
        }
        tracing::trace!(?id, ?grow, "section grew");
        grow
    }

    pub(crate) fn shrink_section(&mut self, id: NodeId, dist: Abs, test: bool) -> Abs {
        let node = &self.arena[id];
        let fixed = node.section().is_none_or(|d| d.fixed_size);
        if node.first.is_none() || node.locks.col > 0 || fixed {
            return Abs::zero();
        }
        if self.to_maximize_impl(id, false) {
            if !test {
                self.invalidate(id, Validity::SIZE);
            }
            return Abs::zero();
        }
        let dist = dist.min(self.arena[id].frame.height);
        let columns = self.arena.columns(id).len();
        if columns > 1 && self.descriptor(id).is_some_and(|d| d.balance) {
            if !test {
                self.invalidate(id, Validity::SIZE);
            }
            return dist;
        }
        if !test {
            let node = &mut self.arena[id];
            node.frame.height -= dist;
            node.prt.height = (node.prt.height - dist).max(Abs::zero());
            if let Some(up) = self.arena[id].upper
                && !self.arena.is_footer(up)
            {
                self.shrink_frame(up, dist, false);
            }
            if columns > 0 {
                for col in self.arena.columns(id) {
                    self.invalidate(col, Validity::SIZE);
                }
                self.adjust_columns(id);
            }
            if let Some(next) = self.arena.next_alive(id) {
                self.invalidate(next, Validity::POS);
            }
            tracing::trace!(?id, ?dist, "section shrank");
        }
        dist
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Document, Note, NoteKind, Paragraph, SectionDescriptor};
    use crate::section::tests::layout_with;

    #[test]
    fn test_shrink_single_column_section() {
        let mut doc = Document::new();
        let section = doc.add_section(SectionDescriptor::new());
        let para = doc.add_paragraph(Paragraph::new(Abs::raw(1000)));
        let (mut layout, body) = layout_with(doc);
        let sect = layout.create_section(section, body, None).unwrap();
        layout.insert_content(para, sect, None).unwrap();
        layout.run();
        assert_eq!(layout.arena[sect].frame.height, Abs::raw(1000));

        assert_eq!(layout.shrink(sect, Abs::raw(400), true).unwrap(), Abs::raw(400));
        assert_eq!(layout.arena[sect].frame.height, Abs::raw(1000));
        assert_eq!(layout.shrink(sect, Abs::raw(400), false).unwrap(), Abs::raw(400));
        assert_eq!(layout.arena[sect].frame.height, Abs::raw(600));
    }

    #[test]
    fn test_balanced_shrink_only_invalidates() {
        let mut doc = Document::new();
        let section = doc.add_section(SectionDescriptor::new().with_columns(3, Abs::zero()));
        let para = doc.add_paragraph(Paragraph::new(Abs::raw(3000)));
        let (mut layout, body) = layout_with(doc);
        let sect = layout.create_section(section, body, None).unwrap();
        for _ in 0..3 {
            layout.insert_content(para, sect, None).unwrap();
        }
        layout.run();
        assert_eq!(layout.arena[sect].frame.height, Abs::raw(3000));
        assert!(layout.is_valid(sect, Validity::SIZE));

        assert_eq!(layout.shrink(sect, Abs::raw(500), false).unwrap(), Abs::raw(500));
        assert_eq!(layout.arena[sect].frame.height, Abs::raw(3000));
        assert!(!layout.is_valid(sect, Validity::SIZE));
    }

    #[test]
    fn test_inner_height_of_columns_is_tallest_column() {
        let mut doc = Document::new();
        let section = doc.add_section(
            SectionDescriptor::new().with_columns(2, Abs::raw(200)).with_balance(false),
        );
        let para = doc.add_paragraph(Paragraph::new(Abs::raw(4000)));
        let (mut layout, body) = layout_with(doc);
        let sect = layout.create_section(section, body, None).unwrap();
        for _ in 0..3 {
            layout.insert_content(para, sect, None).unwrap();
        }
        layout.run();
        assert!(layout.is_balanced_section(sect).unwrap());
        assert_eq!(layout.inner_height(sect).unwrap(), Abs::raw(8000));
        assert_eq!(layout.calc_min_diff(sect).unwrap(), None);
    }

    #[test]
    fn test_empty_follow_clips_endnote_collector() {
        let mut doc = Document::new();
        let section = doc.add_section(SectionDescriptor::new().with_endnotes_at_end(true));
        let para = doc.add_paragraph(Paragraph::new(Abs::raw(1000)));
        let (mut layout, body) = layout_with(doc);
        let sect = layout.create_section(section, body, None).unwrap();
        layout.insert_content(para, sect, None).unwrap();
        layout.run();
        assert!(!layout.needs_extra_clip(sect));

        layout.create_follow(sect).unwrap();
        layout.arena[sect].frame.height = Abs::raw(1000);
        assert!(layout.needs_extra_clip(sect));
        layout.check_clipping_impl(sect, false, false);
        assert_eq!(layout.arena[sect].frame.bottom(), layout.prt_bottom(body));
    }

    #[test]
    fn test_endnote_before_last_column_needs_clip() {
        let mut doc = Document::new();
        let note = doc.add_note(Note { kind: NoteKind::Endnote, height: Abs::raw(300) });
        let section = doc.add_section(
            SectionDescriptor::new()
                .with_columns(2, Abs::zero())
                .with_balance(false)
                .with_endnotes_at_end(true),
        );
        let para = doc.add_paragraph(Paragraph::new(Abs::raw(1000)));
        let (mut layout, body) = layout_with(doc);
        let sect = layout.create_section(section, body, None).unwrap();
        let columns = layout.arena.columns(sect);
        for &col in &columns {
            let col_body = layout.arena.column_body(col).unwrap();
            layout.insert_content(para, col_body, None).unwrap();
        }
        assert!(!layout.needs_extra_clip(sect));

        // An endnote left in the first column while content goes on in the
        // second one.
        let cont = layout.ensure_container(columns[0]);
        let ftn = layout.new_footnote(note);
        layout.arena.link(ftn, cont, None);
        assert!(layout.needs_extra_clip(sect));

        // Moved to the last column, the note is where it belongs.
        layout.arena.unlink(ftn);
        let cont = layout.ensure_container(columns[1]);
        layout.arena.link(ftn, cont, None);
        assert!(!layout.needs_extra_clip(sect));
    }
}
