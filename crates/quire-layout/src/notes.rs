//! Footnotes and endnotes: where note frames live and how they are sized.

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::geom::{Abs, Rect};
use crate::layout::Layout;
use crate::model::{NoteId, NoteKind, PageDescId};
use crate::tree::{ContentData, FootnoteData, Node, NodeId, NodeKind, Source, Validity};

/// Collects the endnotes of a section chain so that they can be re-inserted
/// at the end of the chain's tail.
#[derive(Debug, Default, Clone)]
pub struct Layouter {
    endnotes: Vec<NodeId>,
}

impl Layouter {
    /// Creates an empty layouter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any endnotes are waiting for re-insertion.
    pub fn has_endnotes(&self) -> bool {
        !self.endnotes.is_empty()
    }

    /// The collected endnote frames, detached from the tree.
    pub fn endnotes(&self) -> &[NodeId] {
        &self.endnotes
    }

    /// Takes an endnote frame out of its container.
    ///
    /// The frame absorbs the content of its continuation pieces. A piece
    /// that continues another one stays where it is until its master is
    /// collected.
    pub(crate) fn collect_endnote(&mut self, layout: &mut Layout, note: NodeId) {
        if self.endnotes.contains(&note) || !layout.arena.is_footnote(note) {
            return;
        }
        if layout.arena[note].upper.is_some() {
            while let Some(next) = layout.footnote_data(note).and_then(|d| d.follow) {
                let after = layout.footnote_data(next).and_then(|d| d.follow);
                layout.free_frame(next);
                if let Some(after) = after
                    && let NodeKind::Footnote(data) = &mut layout.arena[after].kind
                {
                    data.master = Some(note);
                }
                if let NodeKind::Footnote(data) = &mut layout.arena[note].kind {
                    data.follow = after;
                }
            }
            if let NodeKind::Footnote(data) = &mut layout.arena[note].kind {
                data.share = None;
            }
            if layout.footnote_data(note).is_some_and(|d| d.master.is_some()) {
                return;
            }
            let cont = layout.arena[note].upper;
            layout.arena.unlink(note);
            if let Some(cont) = cont {
                layout.container_changed(cont);
            }
        } else {
            let same = layout.footnote_data(note).map(|d| d.note);
            if self
                .endnotes
                .iter()
                .any(|&e| layout.footnote_data(e).map(|d| d.note) == same)
            {
                layout.free_frame(note);
                return;
            }
        }
        tracing::trace!(?note, "collected endnote");
        self.endnotes.push(note);
    }

    /// Appends the collected endnotes to the last column of `sect`.
    pub(crate) fn insert_into(&mut self, layout: &mut Layout, sect: NodeId) {
        let Some(col) = layout.arena.columns(sect).last().copied() else { return };
        let cont = layout.ensure_container(col);
        for note in self.endnotes.drain(..) {
            if layout.arena.contains(note) && layout.arena[note].upper.is_none() {
                layout.arena.link(note, cont, None);
            }
        }
        layout.container_changed(cont);
    }
}

impl Layout {
    pub(crate) fn footnote_data(&self, id: NodeId) -> Option<&FootnoteData> {
        match self.arena.get(id)?.kind() {
            NodeKind::Footnote(data) => Some(data),
            _ => None,
        }
    }

    /// The height of a footnote frame's stacked content.
    pub(crate) fn footnote_height(&self, ftn: NodeId) -> Abs {
        self.arena
            .children(ftn)
            .map(|c| match self.arena.kind(c) {
                NodeKind::Content(_) => self.content_height(c),
                _ => self.arena[c].frame.height,
            })
            .sum()
    }

    /// The height a footnote container needs for its footnotes.
    pub(crate) fn container_height(&self, cont: NodeId) -> Abs {
        self.arena.children(cont).map(|f| self.footnote_height(f)).sum()
    }

    /// Stacks the footnotes of a container and their content.
    pub(crate) fn format_container(&mut self, cont: NodeId) {
        let area = self.arena[cont].prt_abs();
        let mut y = area.y;
        let notes: Vec<NodeId> = self.arena.children(cont).collect();
        for ftn in notes {
            let start = y;
            let lowers: Vec<NodeId> = self.arena.children(ftn).collect();
            for c in lowers {
                let h = match self.arena.kind(c) {
                    NodeKind::Content(_) => self.content_height(c),
                    _ => self.arena[c].frame.height,
                };
                self.place_part(c, Rect::new(area.x, y, area.width, h));
                y += h;
            }
            self.place_part(ftn, Rect::new(area.x, start, area.width, y - start));
        }
        self.validate(cont, Validity::all());
    }

    /// The container for a page or column, created on demand.
    pub(crate) fn ensure_container(&mut self, boss: NodeId) -> NodeId {
        if let Some(cont) = self.arena.footnote_container(boss) {
            return cont;
        }
        let cont = self.arena.alloc(Node::new(NodeKind::FootnoteContainer));
        let before = if self.arena.is_page(boss) {
            self.arena
                .children(boss)
                .find(|&c| matches!(self.arena.kind(c), NodeKind::Footer | NodeKind::Fly(_)))
        } else {
            None
        };
        self.arena.link(cont, boss, before);
        cont
    }

    /// Lets the owner of a container see that its notes changed.
    pub(crate) fn container_changed(&mut self, cont: NodeId) {
        let Some(boss) = self.arena.get(cont).and_then(|node| node.upper) else { return };
        if self.arena.is_column(boss) {
            if let Some(sect) = self.arena[boss].upper {
                self.invalidate(sect, Validity::SIZE);
                self.invalidate_upper_sizes(sect);
            }
        } else if let Some(body) = self.arena.page_body(boss) {
            let flows: Vec<NodeId> = self.arena.children(body).collect();
            for flow in flows {
                if self.arena.is_section(flow) {
                    self.invalidate(flow, Validity::SIZE);
                }
            }
            if let Some(first) = self.arena[body].first {
                self.invalidate(first, Validity::POS);
            }
        }
    }

    /// Where a note anchored in `content` is placed: a column or a page.
    ///
    /// Footnotes go to the column of their anchor unless that column only
    /// exists to collect notes at the end of a section that does not collect
    /// footnotes, and to the page otherwise. Endnotes go to the tail of the
    /// nearest section that collects them, or to the note pages at the end
    /// of the document.
    pub(crate) fn note_boss(&mut self, content: NodeId, kind: NoteKind) -> Option<NodeId> {
        let ancestors: Vec<NodeId> = self.arena.ancestors(content).collect();
        match kind {
            NoteKind::Footnote => {
                for a in ancestors {
                    if self.arena.is_column(a) {
                        let sole = self.arena[a].prev.is_none() && self.arena[a].next.is_none();
                        let sect = self.arena[a].upper;
                        let collects = sect
                            .and_then(|s| self.section_flags(s))
                            .is_some_and(|d| d.ftn_at_end);
                        if sole && !collects {
                            continue;
                        }
                        return Some(a);
                    }
                    if self.arena.is_page(a) {
                        return Some(a);
                    }
                }
                None
            }
            NoteKind::Endnote => {
                let owner = ancestors
                    .into_iter()
                    .find(|&a| self.arena.is_section(a) && self.is_endnote_at_my_end(a));
                if let Some(sect) = owner
                    && !self.arena.in_footnote(sect)
                {
                    let tail = self.chain_of(sect).last().copied().unwrap_or(sect);
                    if self.is_attached(tail)
                        && let Some(col) = self.arena.columns(tail).last().copied()
                    {
                        return Some(col);
                    }
                }
                Some(self.endnote_page())
            }
        }
    }

    /// The note page at the end of the document, created on demand.
    fn endnote_page(&mut self) -> NodeId {
        let pages = self.pages();
        let last = pages.last().copied();
        if let Some(page) = last
            && matches!(self.arena.kind(page), NodeKind::Page(data) if data.footnote_page)
        {
            return page;
        }
        let desc = last
            .and_then(|p| match self.arena.kind(p) {
                NodeKind::Page(data) => Some(data.desc),
                _ => None,
            })
            .unwrap_or(PageDescId(0));
        let page = self.build_page(desc, true);
        self.arena.link_after(page, self.root, last);
        tracing::debug!(?page, "created note page");
        page
    }

    pub(crate) fn new_footnote(&mut self, note: NoteId) -> NodeId {
        let ftn = self.arena.alloc(Node::new(NodeKind::Footnote(FootnoteData {
            note,
            master: None,
            follow: None,
            share: None,
        })));
        let body = self.arena.alloc(Node::new(NodeKind::Content(ContentData {
            source: Source::NoteBody(note),
        })));
        self.arena.link(body, ftn, None);
        ftn
    }

    /// Extra height a flow frame brings along for the footnotes anchored in
    /// it that land at the bottom of its page.
    pub(crate) fn note_demand(&self, id: NodeId) -> Abs {
        if self.arena.ancestors(id).any(|a| self.arena.is_column(a)) {
            return Abs::zero();
        }
        self.arena
            .descendants(id)
            .into_iter()
            .filter_map(|c| match self.arena.kind(c) {
                NodeKind::Content(ContentData { source: Source::Paragraph(p) }) => {
                    self.doc.paragraph(*p)
                }
                _ => None,
            })
            .flat_map(|p| p.notes.iter())
            .filter_map(|&n| self.doc.note(n))
            .filter(|n| n.kind == NoteKind::Footnote)
            .map(|n| n.height)
            .sum()
    }

    /// Puts a footnote frame for every note anchored in the flow into the
    /// right container, in anchor order, and drops frames of notes that lost
    /// their anchor.
    #[tracing::instrument(skip_all)]
    pub(crate) fn place_notes(&mut self) {
        self.rejoin_notes();

        let mut anchors = vec![];
        let mut existing: FxHashMap<NoteId, NodeId> = FxHashMap::default();
        for n in self.arena.descendants(self.root) {
            match self.arena.kind(n) {
                NodeKind::Content(ContentData { source: Source::Paragraph(p) }) => {
                    if self.arena.in_footnote(n) || self.arena.find_header_footer(n).is_some() {
                        continue;
                    }
                    if let Some(paragraph) = self.doc.paragraph(*p) {
                        anchors.extend(paragraph.notes.iter().map(|&note| (n, note)));
                    }
                }
                NodeKind::Footnote(data) if data.master.is_none() => {
                    existing.insert(data.note, n);
                }
                _ => {}
            }
        }

        let mut seen: FxHashSet<NoteId> = FxHashSet::default();
        let mut plan: IndexMap<NodeId, Vec<NodeId>> = IndexMap::new();
        for (content, note) in anchors {
            if !seen.insert(note) {
                continue;
            }
            let Some(kind) = self.doc.note(note).map(|n| n.kind) else { continue };
            let Some(boss) = self.note_boss(content, kind) else { continue };
            let cont = self.ensure_container(boss);
            let ftn = match existing.remove(&note) {
                Some(ftn) => ftn,
                None => self.new_footnote(note),
            };
            plan.entry(cont).or_default().push(ftn);
        }

        let mut touched: FxHashSet<NodeId> = FxHashSet::default();
        for (_, stale) in existing {
            if let Some(cont) = self.arena[stale].upper {
                touched.insert(cont);
            }
            self.free_frame(stale);
        }
        for (&cont, notes) in &plan {
            let current: Vec<NodeId> = self.arena.children(cont).collect();
            if current != *notes {
                touched.insert(cont);
                for &ftn in notes {
                    if let Some(old) = self.arena[ftn].upper.filter(|&old| old != cont) {
                        touched.insert(old);
                    }
                    self.arena.unlink(ftn);
                    self.arena.link(ftn, cont, None);
                }
            }
        }

        let containers: Vec<NodeId> = self
            .arena
            .descendants(self.root)
            .into_iter()
            .filter(|&n| self.arena.is_footnote_container(n))
            .collect();
        for cont in containers {
            if self.arena[cont].first.is_none() {
                self.container_changed(cont);
                self.free_frame(cont);
                touched.remove(&cont);
            }
        }
        for cont in touched {
            if self.arena.contains(cont) {
                self.container_changed(cont);
            }
        }

        self.split_overflowing_notes();
        for page in self.pages() {
            self.layout_page_parts(page);
            if let Some(cont) = self.arena.footnote_container(page) {
                self.format_container(cont);
            }
        }
    }

    /// Merges all continuation pieces back into their masters.
    fn rejoin_notes(&mut self) {
        let masters: Vec<NodeId> = self
            .arena
            .descendants(self.root)
            .into_iter()
            .filter(|&n| {
                self.footnote_data(n).is_some_and(|d| {
                    d.master.is_none() && (d.follow.is_some() || d.share.is_some())
                })
            })
            .collect();
        for ftn in masters {
            while let Some(next) = self.footnote_data(ftn).and_then(|d| d.follow) {
                let after = self.footnote_data(next).and_then(|d| d.follow);
                if let Some(cont) = self.arena[next].upper {
                    self.container_changed(cont);
                }
                self.free_frame(next);
                if let NodeKind::Footnote(data) = &mut self.arena[ftn].kind {
                    data.follow = after;
                }
            }
            if let NodeKind::Footnote(data) = &mut self.arena[ftn].kind {
                data.share = None;
            }
        }
    }

    /// Page footnote areas take at most half of the page. Notes beyond that
    /// continue on the next page.
    fn split_overflowing_notes(&mut self) {
        let mut budget = 64;
        let mut page = self.arena[self.root].first;
        while let Some(p) = page {
            let note_page =
                matches!(self.arena.kind(p), NodeKind::Page(data) if data.footnote_page);
            if !note_page && let Some(cont) = self.arena.footnote_container(p) {
                let max = self.arena[p].prt.height / 2;
                let mut used = Abs::zero();
                let notes: Vec<NodeId> = self.arena.children(cont).collect();
                for (i, &ftn) in notes.iter().enumerate() {
                    let h = self.footnote_height(ftn);
                    if used + h <= max {
                        used += h;
                        continue;
                    }
                    if budget == 0 {
                        self.anomaly(Some(ftn), "footnotes do not fit on any page".into());
                        break;
                    }
                    budget -= 1;
                    let next = match self.arena[p].next {
                        Some(next) => next,
                        None => self.insert_page(Some(p), None),
                    };
                    let target = self.ensure_container(next);
                    let before = self.arena[target].first;
                    let mut moving = notes[i + 1..].to_vec();
                    match self.split_footnote(ftn, max - used) {
                        Some(piece) => moving.insert(0, piece),
                        None => moving.insert(0, ftn),
                    }
                    for m in moving {
                        self.arena.unlink(m);
                        self.arena.link(m, target, before);
                    }
                    self.container_changed(cont);
                    self.container_changed(target);
                    break;
                }
            }
            page = self.arena[p].next;
        }
    }

    /// Splits a footnote frame so that it keeps `keep` of its height. The
    /// rest goes into a new, detached continuation piece.
    pub(crate) fn split_footnote(&mut self, ftn: NodeId, keep: Abs) -> Option<NodeId> {
        let data = self.footnote_data(ftn)?.clone();
        let total = self.footnote_height(ftn);
        if keep <= Abs::zero() || keep >= total {
            return None;
        }
        let piece = self.new_footnote(data.note);
        if let NodeKind::Footnote(piece_data) = &mut self.arena[piece].kind {
            piece_data.master = Some(ftn);
            piece_data.follow = data.follow;
            piece_data.share = Some(total - keep);
        }
        if let Some(old) = data.follow
            && let NodeKind::Footnote(old_data) = &mut self.arena[old].kind
        {
            old_data.master = Some(piece);
        }
        if let NodeKind::Footnote(own) = &mut self.arena[ftn].kind {
            own.follow = Some(piece);
            own.share = Some(keep);
        }
        tracing::trace!(?ftn, ?piece, ?keep, "split footnote");
        Some(piece)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Document, Note, Paragraph, SectionDescriptor};
    use crate::section::tests::layout_with;

    #[test]
    fn test_split_footnote_shares_height() {
        let mut doc = Document::new();
        let note = doc.add_note(Note { kind: NoteKind::Footnote, height: Abs::raw(1000) });
        let (mut layout, _) = layout_with(doc);
        let ftn = layout.new_footnote(note);
        assert_eq!(layout.footnote_height(ftn), Abs::raw(1000));
        assert_eq!(layout.split_footnote(ftn, Abs::raw(1000)), None);
        assert_eq!(layout.split_footnote(ftn, Abs::zero()), None);

        let piece = layout.split_footnote(ftn, Abs::raw(400)).unwrap();
        assert_eq!(layout.footnote_height(ftn), Abs::raw(400));
        assert_eq!(layout.footnote_height(piece), Abs::raw(600));
        assert_eq!(layout.footnote_data(ftn).unwrap().follow, Some(piece));
        assert_eq!(layout.footnote_data(piece).unwrap().master, Some(ftn));
    }

    #[test]
    fn test_note_boss_of_columns() {
        let mut doc = Document::new();
        let collecting = doc.add_section(SectionDescriptor::new().with_endnotes_at_end(true));
        let columned = doc.add_section(SectionDescriptor::new().with_columns(2, Abs::zero()));
        let para = doc.add_paragraph(Paragraph::new(Abs::raw(500)));
        let (mut layout, body) = layout_with(doc);
        let page = layout.pages()[0];

        let sect = layout.create_section(collecting, body, None).unwrap();
        let content = layout.insert_content(para, sect, None).unwrap();
        let column = layout.arena.columns(sect)[0];
        // The only column of a section that does not collect footnotes
        // leaves them to the page.
        assert_eq!(layout.note_boss(content, NoteKind::Footnote), Some(page));
        assert_eq!(layout.note_boss(content, NoteKind::Endnote), Some(column));

        let sect = layout.create_section(columned, body, None).unwrap();
        let content = layout.insert_content(para, sect, None).unwrap();
        let column = layout.arena.columns(sect)[0];
        assert_eq!(layout.note_boss(content, NoteKind::Footnote), Some(column));
        let notes = layout.note_boss(content, NoteKind::Endnote).unwrap();
        assert!(matches!(layout.arena.kind(notes), NodeKind::Page(data) if data.footnote_page));
        assert_eq!(layout.pages().last(), Some(&notes));
    }

    #[test]
    fn test_layouter_collects_each_note_once() {
        let mut doc = Document::new();
        let note = doc.add_note(Note { kind: NoteKind::Endnote, height: Abs::raw(300) });
        let (mut layout, _) = layout_with(doc);
        let ftn = layout.new_footnote(note);
        let twin = layout.new_footnote(note);
        let mut layouter = Layouter::new();
        layouter.collect_endnote(&mut layout, ftn);
        layouter.collect_endnote(&mut layout, ftn);
        layouter.collect_endnote(&mut layout, twin);
        assert_eq!(layouter.endnotes(), &[ftn]);
        assert!(!layout.arena.contains(twin));
    }
}
