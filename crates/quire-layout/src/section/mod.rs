//! Section frames: the physical pieces of a logical section.
//!
//! A logical section is realized by a chain of section frames. The first
//! frame is the master; every other frame is the follow of its predecessor.
//! Frames are split and merged as their content flows between pages and
//! columns.

mod leaf;
mod merge;
mod notes;
mod size;
mod split;

use crate::diag::{LayoutResult, bail};
use crate::geom::{Abs, Rect};
use crate::layout::Layout;
use crate::model::{SectionAttr, SectionDescriptor, SectionId};
use crate::tree::{Node, NodeId, NodeKind, SectionData, Validity};

/// Which content [`Layout::find_last_content`] looks for.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FindMode {
    /// The last content of the frame itself.
    Own,
    /// The first content of the first endnote in the chain's tail.
    Endnote,
    /// The last content of the whole chain, including nested sections that
    /// follow it.
    LastContent,
    /// Like [`LastContent`](Self::LastContent), but never looks further back
    /// than the frame itself.
    MyLast,
}

/// Whether a leaf search may create pages and section frames.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MakePage {
    /// Never create pages.
    None,
    /// Append a page when no leaf is left.
    Append,
    /// Insert a page when no leaf is left.
    Insert,
    /// Return the bare leaf without creating a follow in it.
    NoSection,
}

impl Layout {
    /// Creates a section frame for `section` and pastes it into `parent`
    /// before `before`.
    ///
    /// Pasting into a section that the new one is declared inside of splits
    /// that section around the new frame.
    pub fn create_section(
        &mut self,
        section: SectionId,
        parent: NodeId,
        before: Option<NodeId>,
    ) -> LayoutResult<NodeId> {
        if self.doc.section(section).is_none() {
            bail!(UnknownItem, "section {:?} does not exist", section);
        }
        if self.doc.is_in_special_area(section) {
            bail!(
                InvalidArgument,
                "section {:?} does not live in the document body",
                section;
                hint: "sections held by the undo history or the clipboard have no frames"
            );
        }
        let node = self.arena.checked(parent)?;
        let parent = match node.kind {
            NodeKind::Section(_) => self.arena.first_leaf(parent),
            NodeKind::Body
            | NodeKind::Cell
            | NodeKind::Header
            | NodeKind::Footer
            | NodeKind::Fly(_)
            | NodeKind::Footnote(_) => parent,
            _ => bail!(WrongKind, "cannot place a section into a {}", node.kind.name()),
        };
        if let Some(before) = before
            && self.arena.checked(before)?.upper != Some(parent)
        {
            bail!(InvalidArgument, "node {:?} is not a child of {:?}", before, parent);
        }
        let id = self.new_section_frame(section);
        self.paste_section_impl(id, parent, before);
        self.init_section(id);
        tracing::debug!(?id, ?section, "created section frame");
        Ok(id)
    }

    /// Destroys a section frame. The master of the frame takes over its
    /// follow.
    ///
    /// Locked frames are left alone.
    pub fn destroy_section(&mut self, id: NodeId) -> LayoutResult<()> {
        let locks = self.section_node(id)?.locks;
        if locks.join > 0 || locks.col > 0 {
            self.anomaly(Some(id), "refusing to destroy a locked section frame".into());
            return Ok(());
        }
        if self.arena[id].upper.is_some() {
            self.cut_impl(id, true);
        }
        self.free_frame(id);
        Ok(())
    }

    /// The frame continuing a section frame.
    pub fn follow(&self, id: NodeId) -> LayoutResult<Option<NodeId>> {
        Ok(self.section_data(id)?.follow)
    }

    /// The frame a section frame continues.
    pub fn master(&self, id: NodeId) -> LayoutResult<Option<NodeId>> {
        self.section_data(id)?;
        Ok(self.arena.find_master(id))
    }

    /// The whole chain a section frame belongs to, from the master to the
    /// tail.
    pub fn chain(&self, id: NodeId) -> LayoutResult<Vec<NodeId>> {
        self.section_data(id)?;
        Ok(self.chain_of(id))
    }

    /// The node of a section frame.
    fn section_node(&self, id: NodeId) -> LayoutResult<&Node> {
        let node = self.arena.checked(id)?;
        if node.section().is_none() {
            bail!(WrongKind, "expected a section, found {}", node.kind.name());
        }
        Ok(node)
    }

    /// The state of a section frame.
    pub(crate) fn section_data(&self, id: NodeId) -> LayoutResult<&SectionData> {
        match self.section_node(id)?.section() {
            Some(data) => Ok(data),
            None => bail!(WrongKind, "expected a section"),
        }
    }

    /// Like [`section_data`](Self::section_data), but also refuses zombies.
    pub(crate) fn live_section(&self, id: NodeId) -> LayoutResult<&SectionData> {
        let data = self.section_data(id)?;
        if data.section.is_none() {
            bail!(
                InvalidArgument,
                "section frame {:?} belongs to a removed section",
                id;
                hint: "it is destroyed at the end of the current layout pass"
            );
        }
        Ok(data)
    }

    pub(crate) fn chain_of(&self, id: NodeId) -> Vec<NodeId> {
        let mut master = id;
        while let Some(m) = self.arena.find_master(master) {
            master = m;
        }
        let mut chain = vec![master];
        while let Some(next) = self.follow_of(chain[chain.len() - 1]) {
            if chain.contains(&next) {
                break;
            }
            chain.push(next);
        }
        chain
    }

    pub(crate) fn follow_of(&self, id: NodeId) -> Option<NodeId> {
        self.arena.get(id)?.section()?.follow
    }

    pub(crate) fn section_of(&self, id: NodeId) -> Option<SectionId> {
        self.arena.get(id)?.section()?.section
    }

    pub(crate) fn section_flags(&self, id: NodeId) -> Option<&SectionData> {
        self.arena.get(id)?.section()
    }

    /// The descriptor behind a section frame. `None` for zombies.
    pub(crate) fn descriptor(&self, id: NodeId) -> Option<&SectionDescriptor> {
        self.doc.section(self.section_of(id)?)
    }

    /// Allocates a detached section frame with its note flags computed.
    pub(crate) fn new_section_frame(&mut self, section: SectionId) -> NodeId {
        let id = self.arena.alloc(Node::new(NodeKind::Section(SectionData::new(section))));
        self.calc_ftn_at_end_flag(id);
        self.calc_endn_at_end_flag(id);
        id
    }

    /// Gives a freshly pasted frame its starting geometry and its columns.
    pub(crate) fn init_section(&mut self, id: NodeId) {
        let Some(up) = self.arena[id].upper else { return };
        let width = self.arena[up].prt.width;
        let (left, right, columns) = self
            .descriptor(id)
            .map(|desc| (desc.left, desc.right, desc.column_count()))
            .unwrap_or((Abs::zero(), Abs::zero(), 1));
        let node = &mut self.arena[id];
        node.frame.width = width;
        node.frame.height = Abs::zero();
        let inner = (width - left - right).max(Abs::zero());
        node.prt = Rect::new(left, Abs::zero(), inner, Abs::zero());
        let notes = node.section().is_some_and(|data| data.any_note_at_end());
        if (columns > 1 || notes) && !self.arena.in_footnote(id) {
            self.chg_columns(id);
        }
    }

    /// Creates the follow of `master`, which takes over the master's old
    /// follow. The new frame is detached.
    pub(crate) fn create_follow(&mut self, master: NodeId) -> Option<NodeId> {
        let section = self.section_of(master)?;
        let new = self.new_section_frame(section);
        let old = self.follow_of(master);
        self.set_follow(new, old);
        self.set_follow(master, Some(new));
        if old.is_none() {
            self.simple_format(master);
        }
        if self.arena[master].locks.col == 0 {
            self.invalidate(master, Validity::SIZE);
        }
        Some(new)
    }

    /// Creates a new master in front of `follow`. The new frame is detached.
    pub(crate) fn create_master_before(&mut self, follow: NodeId) -> Option<NodeId> {
        let section = self.section_of(follow)?;
        let new = self.new_section_frame(section);
        if let Some(master) = self.arena.find_master(follow) {
            self.set_follow(master, Some(new));
        }
        self.set_follow(new, Some(follow));
        Some(new)
    }

    /// Recomputes whether footnotes are collected at the section end.
    ///
    /// Enclosing sections are consulted until one collects its footnotes or
    /// numbers them on its own.
    pub(crate) fn calc_ftn_at_end_flag(&mut self, id: NodeId) {
        let Some(section) = self.section_of(id) else { return };
        let mut chain = self.doc.section_chain(section);
        let (mut at_end, mut own) = chain
            .next()
            .and_then(|s| self.doc.section(s))
            .map(|desc| (desc.footnotes.at_section_end(), desc.footnotes.own_numbering()))
            .unwrap_or_default();
        for outer in chain {
            if at_end || own {
                break;
            }
            let Some(desc) = self.doc.section(outer) else { break };
            if desc.footnotes.at_section_end() {
                at_end = true;
                own |= desc.footnotes.own_numbering();
            }
        }
        if let Some(data) = self.arena[id].section_mut() {
            data.ftn_at_end = at_end;
            data.own_ftn_num = own;
        }
    }

    /// Recomputes whether endnotes are collected at the section end.
    pub(crate) fn calc_endn_at_end_flag(&mut self, id: NodeId) {
        let Some(section) = self.section_of(id) else { return };
        let at_end = self
            .doc
            .section_chain(section)
            .any(|s| self.doc.section(s).is_some_and(|desc| desc.endnotes_at_end));
        if let Some(data) = self.arena[id].section_mut() {
            data.endn_at_end = at_end;
        }
    }

    /// Whether the section itself (not an enclosing one) collects endnotes.
    pub(crate) fn is_endnote_at_my_end(&self, id: NodeId) -> bool {
        self.descriptor(id).is_some_and(|desc| desc.endnotes_at_end)
    }

    /// Reacts to a changed section attribute.
    pub(crate) fn update_attr(&mut self, id: NodeId, attr: SectionAttr) {
        if self.arena.is_zombie(id) {
            return;
        }
        let in_footnote = self.arena.in_footnote(id);
        let mut size = false;
        match attr {
            SectionAttr::Format => {
                if !in_footnote {
                    self.calc_ftn_at_end_flag(id);
                    self.calc_endn_at_end_flag(id);
                    self.chg_columns(id);
                }
                self.invalidate(id, Validity::PRT);
                size = true;
            }
            SectionAttr::Columns => {
                if !in_footnote {
                    self.chg_columns(id);
                    size = true;
                }
            }
            SectionAttr::FootnotePlacement => {
                if !in_footnote {
                    let old = self.section_flags(id).map(|data| data.ftn_at_end);
                    self.calc_ftn_at_end_flag(id);
                    if old != self.section_flags(id).map(|data| data.ftn_at_end) {
                        self.chg_columns(id);
                        size = true;
                    }
                }
            }
            SectionAttr::EndnotesAtEnd => {
                if !in_footnote {
                    let old = self.section_flags(id).map(|data| data.endn_at_end);
                    self.calc_endn_at_end_flag(id);
                    if old != self.section_flags(id).map(|data| data.endn_at_end) {
                        self.chg_columns(id);
                    }
                    size = true;
                }
            }
            SectionAttr::Balance => size = true,
            SectionAttr::Spacing => {
                self.invalidate(id, Validity::PRT);
                size = true;
            }
        }
        if size {
            self.invalidate(id, Validity::SIZE);
            self.invalidate_upper_sizes(id);
        }
        tracing::trace!(?id, ?attr, "updated section attributes");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::Settings;
    use crate::lock::Lock;
    use crate::model::{Document, FootnotePlacement, PageDesc, PageDescId, Paragraph};

    /// A page with a 8000 x 10000 twips body at (1000, 1000).
    pub(crate) fn test_page() -> PageDesc {
        PageDesc {
            width: Abs::raw(10000),
            height: Abs::raw(12000),
            margin_top: Abs::raw(1000),
            margin_bottom: Abs::raw(1000),
            margin_left: Abs::raw(1000),
            margin_right: Abs::raw(1000),
            ..PageDesc::default()
        }
    }

    /// Lays out `doc` on a single page. Returns the layout and the page body.
    pub(crate) fn layout_with(mut doc: Document) -> (Layout, NodeId) {
        if doc.page_desc(PageDescId(0)).is_none() {
            doc.add_page_desc(test_page());
        }
        let mut layout = Layout::new(doc, Settings::default());
        let page = layout.append_page(PageDescId(0)).unwrap();
        let body = layout.page_body(page).unwrap();
        (layout, body)
    }

    #[test]
    fn test_create_follow_takes_over_old_follow() {
        let mut doc = Document::new();
        let section = doc.add_section(SectionDescriptor::new());
        let (mut layout, body) = layout_with(doc);
        let sect = layout.create_section(section, body, None).unwrap();
        let first = layout.create_follow(sect).unwrap();
        let second = layout.create_follow(sect).unwrap();
        assert_eq!(layout.follow(sect), Ok(Some(second)));
        assert_eq!(layout.follow(second), Ok(Some(first)));
        assert_eq!(layout.chain(first).unwrap(), [sect, second, first]);
        assert_eq!(layout.master(first), Ok(Some(second)));
    }

    #[test]
    fn test_create_master_before_links_into_chain() {
        let mut doc = Document::new();
        let section = doc.add_section(SectionDescriptor::new());
        let (mut layout, body) = layout_with(doc);
        let sect = layout.create_section(section, body, None).unwrap();
        let follow = layout.create_follow(sect).unwrap();
        let middle = layout.create_master_before(follow).unwrap();
        assert_eq!(layout.chain(sect).unwrap(), [sect, middle, follow]);
    }

    #[test]
    fn test_footnote_flags_inherit_from_outer_section() {
        let mut doc = Document::new();
        let outer = doc.add_section(
            SectionDescriptor::new().with_footnotes(FootnotePlacement::AtSectionEndOwnNumbering),
        );
        let inner = doc.add_section(SectionDescriptor::new().with_parent(outer));
        let (mut layout, body) = layout_with(doc);
        let sect = layout.create_section(inner, body, None).unwrap();
        let data = layout.section_data(sect).unwrap();
        assert!(data.ftn_at_end);
        assert!(data.own_ftn_num);
        assert!(!data.endn_at_end);
        // Collecting notes at the end needs a column to hold the container.
        assert_eq!(layout.arena.columns(sect).len(), 1);
    }

    #[test]
    fn test_update_columns_rebuilds_subtree() {
        let mut doc = Document::new();
        let section = doc.add_section(SectionDescriptor::new());
        let para = doc.add_paragraph(Paragraph::new(Abs::raw(500)));
        let (mut layout, body) = layout_with(doc);
        let sect = layout.create_section(section, body, None).unwrap();
        let content = layout.insert_content(para, sect, None).unwrap();
        assert!(!layout.arena.has_columns(sect));

        layout.doc_mut().section_mut(section).unwrap().columns = 3;
        layout.update_section(section, SectionAttr::Columns).unwrap();
        let columns = layout.arena.columns(sect);
        assert_eq!(columns.len(), 3);
        let first = layout.arena.column_body(columns[0]).unwrap();
        assert_eq!(layout.arena[content].upper, Some(first));
        assert!(!layout.is_valid(sect, Validity::SIZE));
    }

    #[test]
    fn test_special_area_sections_get_no_frames() {
        let mut doc = Document::new();
        let section = doc.add_section(
            SectionDescriptor::new().with_area(crate::model::NodeArea::Clipboard),
        );
        let (mut layout, body) = layout_with(doc);
        let err = layout.create_section(section, body, None).unwrap_err();
        assert_eq!(err.kind, crate::diag::ErrorKind::InvalidArgument);
        assert_eq!(err.hints.len(), 1);
        assert!(layout.children(body).unwrap().is_empty());
    }

    #[test]
    #[cfg(not(feature = "strict"))]
    fn test_locked_frame_is_not_destroyed() {
        let mut doc = Document::new();
        let section = doc.add_section(SectionDescriptor::new());
        let (mut layout, body) = layout_with(doc);
        let sect = layout.create_section(section, body, None).unwrap();
        {
            let mut locked = Lock::join(&mut layout, sect);
            locked.destroy_section(sect).unwrap();
        }
        assert!(layout.node(sect).is_ok());
        assert_eq!(layout.arena[sect].locks.join, 0);
        assert_eq!(layout.warnings().len(), 1);
        layout.destroy_section(sect).unwrap();
        assert!(layout.node(sect).is_err());
    }
}
