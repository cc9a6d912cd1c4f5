use std::fmt::{self, Debug, Formatter};

use indexmap::IndexSet;
use quire_utils::hash128;

use crate::config::Settings;
use crate::diag::{EcoString, LayoutResult, Sink, Warning, bail, eco_format};
use crate::geom::{Abs, Rect};
use crate::model::{Document, PageDesc, PageDescId, ParagraphId, SectionAttr, SectionId};
use crate::observer::FlowObserver;
use crate::tree::{
    Arena, ContentData, FlyData, Node, NodeId, NodeKind, PageData, Source, Validity,
};

/// A layout tree together with everything needed to keep it in shape.
///
/// The layout owns the [`Document`] it realizes. Edits are made through
/// [`doc_mut`](Self::doc_mut) and announced through the notification methods
/// (for example [`update_section`](Self::update_section)); afterwards,
/// [`run`](Self::run) brings the tree back into a settled state.
pub struct Layout {
    pub(crate) arena: Arena,
    pub(crate) root: NodeId,
    pub(crate) doc: Document,
    pub(crate) settings: Settings,
    /// Emptied section frames awaiting destruction.
    pub(crate) destroy: IndexSet<NodeId>,
    pub(crate) observer: Option<Box<dyn FlowObserver>>,
    pub(crate) sink: Sink,
    /// Nesting depth of section formatting.
    pub(crate) depth: usize,
    /// Set when a backward move skipped empty columns or pages.
    pub(crate) move_bwd_jump: bool,
    /// Set when a page may have become superfluous.
    pub(crate) superfluous: bool,
}

impl Layout {
    /// Creates an empty layout for a document.
    pub fn new(doc: Document, settings: Settings) -> Self {
        let mut arena = Arena::new();
        let root = arena.alloc(Node::new(NodeKind::Root));
        Self {
            arena,
            root,
            doc,
            settings,
            destroy: IndexSet::new(),
            observer: None,
            sink: Sink::default(),
            depth: 0,
            move_bwd_jump: false,
            superfluous: false,
        }
    }

    /// The document being laid out.
    pub fn doc(&self) -> &Document {
        &self.doc
    }

    /// Mutable access to the document. Announce changes afterwards.
    pub fn doc_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// The layout settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Read access to the tree.
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// The root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// A node of the tree.
    pub fn node(&self, id: NodeId) -> LayoutResult<&Node> {
        self.arena.checked(id)
    }

    /// The pages, in order.
    pub fn pages(&self) -> Vec<NodeId> {
        self.arena.children(self.root).collect()
    }

    /// The children of a node, in order.
    pub fn children(&self, id: NodeId) -> LayoutResult<Vec<NodeId>> {
        self.arena.checked(id)?;
        Ok(self.arena.children(id).collect())
    }

    /// The frame of a node in absolute coordinates.
    pub fn frame(&self, id: NodeId) -> LayoutResult<Rect> {
        Ok(self.arena.checked(id)?.frame)
    }

    /// Anomalies recorded so far.
    pub fn warnings(&self) -> &[Warning] {
        self.sink.warnings()
    }

    /// Installs an observer for reading order changes.
    pub fn set_observer(&mut self, observer: Box<dyn FlowObserver>) {
        self.observer = Some(observer);
    }

    /// Whether a section frame waits in the deletion worklist.
    pub fn in_delete_list(&self, id: NodeId) -> bool {
        self.destroy.contains(&id)
    }

    /// The number of section frames waiting in the deletion worklist.
    pub fn pending_deletions(&self) -> usize {
        self.destroy.len()
    }

    /// All frames of a section, in document order.
    pub fn section_frames(&self, section: SectionId) -> Vec<NodeId> {
        let mut frames: Vec<NodeId> = self
            .arena
            .ids()
            .filter(|&n| {
                self.arena[n].section().is_some_and(|d| d.section == Some(section))
                    && self.is_attached(n)
            })
            .collect();
        frames.sort_by(|&a, &b| self.arena.doc_order(a, b));
        frames
    }

    /// Whether the node hangs below the root.
    pub(crate) fn is_attached(&self, id: NodeId) -> bool {
        id == self.root || self.arena.ancestors(id).any(|a| a == self.root)
    }

    /// Appends a page in the given style.
    pub fn append_page(&mut self, desc: PageDescId) -> LayoutResult<NodeId> {
        if self.doc.page_desc(desc).is_none() {
            bail!(UnknownItem, "page style {:?} does not exist", desc);
        }
        let last = self.arena[self.root].last;
        Ok(self.insert_page(last, Some(desc)))
    }

    /// The body of a page.
    pub fn page_body(&self, page: NodeId) -> LayoutResult<NodeId> {
        self.arena.checked(page)?;
        match self.arena.page_body(page) {
            Some(body) => Ok(body),
            None => bail!(WrongKind, "expected a page, found {}", self.arena.kind(page).name()),
        }
    }

    /// Inserts a new page after `after` (or at the front). Without a style,
    /// the page continues the style of its predecessor.
    pub(crate) fn insert_page(
        &mut self,
        after: Option<NodeId>,
        desc: Option<PageDescId>,
    ) -> NodeId {
        let desc = desc
            .or_else(|| {
                let prev = after?;
                let NodeKind::Page(data) = self.arena.kind(prev) else { return None };
                let style = self.doc.page_desc(data.desc)?;
                Some(style.follow.unwrap_or(data.desc))
            })
            .unwrap_or(PageDescId(0));
        let page = self.build_page(desc, false);
        self.arena.link_after(page, self.root, after);
        tracing::debug!(?page, ?desc, "inserted page");
        page
    }

    /// Builds a detached page with its header, body and footer.
    pub(crate) fn build_page(&mut self, desc: PageDescId, footnote_page: bool) -> NodeId {
        let style = self.page_style(desc);
        let page = self.arena.alloc(Node::new(NodeKind::Page(PageData { desc, footnote_page })));
        let mut parts = vec![];
        if style.header.is_some() && !footnote_page {
            parts.push(NodeKind::Header);
        }
        parts.push(NodeKind::Body);
        if style.footer.is_some() && !footnote_page {
            parts.push(NodeKind::Footer);
        }
        for kind in parts {
            let part = self.arena.alloc(Node::new(kind));
            self.arena.link(part, page, None);
        }
        page
    }

    /// The style of a page, falling back to the default style.
    pub(crate) fn page_style(&self, desc: PageDescId) -> PageDesc {
        self.doc.page_desc(desc).cloned().unwrap_or_default()
    }

    /// Resolves where flow children of `parent` actually go.
    fn flow_parent(&self, parent: NodeId) -> LayoutResult<NodeId> {
        let node = self.arena.checked(parent)?;
        match node.kind {
            NodeKind::Body
            | NodeKind::Cell
            | NodeKind::Header
            | NodeKind::Footer
            | NodeKind::Fly(_)
            | NodeKind::Footnote(_) => Ok(parent),
            NodeKind::Section(_) => Ok(self.arena.first_leaf(parent)),
            _ => bail!(
                WrongKind,
                "cannot place flowing content into a {}",
                node.kind.name();
                hint: "content goes into bodies, cells, sections, headers, footers and flies"
            ),
        }
    }

    fn check_sibling(&self, parent: NodeId, before: Option<NodeId>) -> LayoutResult<()> {
        if let Some(before) = before
            && self.arena.checked(before)?.upper != Some(parent)
        {
            bail!(InvalidArgument, "node {:?} is not a child of {:?}", before, parent);
        }
        Ok(())
    }

    /// Inserts a content frame for a paragraph into `parent` before `before`.
    pub fn insert_content(
        &mut self,
        paragraph: ParagraphId,
        parent: NodeId,
        before: Option<NodeId>,
    ) -> LayoutResult<NodeId> {
        if self.doc.paragraph(paragraph).is_none() {
            bail!(UnknownItem, "paragraph {:?} does not exist", paragraph);
        }
        let parent = self.flow_parent(parent)?;
        self.check_sibling(parent, before)?;
        let source = Source::Paragraph(paragraph);
        let id = self.arena.alloc(Node::new(NodeKind::Content(ContentData { source })));
        self.arena.link(id, parent, before);
        self.flow_inserted(id);
        Ok(id)
    }

    /// Inserts a table with the given number of cells.
    pub fn insert_table(
        &mut self,
        parent: NodeId,
        before: Option<NodeId>,
        cells: usize,
    ) -> LayoutResult<NodeId> {
        if cells == 0 {
            bail!(InvalidArgument, "a table needs at least one cell");
        }
        let parent = self.flow_parent(parent)?;
        self.check_sibling(parent, before)?;
        let table = self.arena.alloc(Node::new(NodeKind::Table));
        for _ in 0..cells {
            let cell = self.arena.alloc(Node::new(NodeKind::Cell));
            self.arena.link(cell, table, None);
        }
        self.arena.link(table, parent, before);
        self.flow_inserted(table);
        Ok(table)
    }

    /// Anchors a free-standing frame to a page.
    pub fn add_fly(&mut self, page: NodeId, rect: Rect, auto_grow: bool) -> LayoutResult<NodeId> {
        if !self.arena.checked(page).is_ok_and(|_| self.arena.is_page(page)) {
            bail!(WrongKind, "flies are anchored to pages");
        }
        let mut node = Node::new(NodeKind::Fly(FlyData { auto_grow }));
        node.frame = rect;
        node.prt = Rect::new(Abs::zero(), Abs::zero(), rect.width, rect.height);
        let fly = self.arena.alloc(node);
        self.arena.link(fly, page, None);
        Ok(fly)
    }

    /// Removes a content frame or table from the tree.
    pub fn remove_content(&mut self, id: NodeId) -> LayoutResult<()> {
        let node = self.arena.checked(id)?;
        if !matches!(node.kind, NodeKind::Content(_) | NodeKind::Table) {
            bail!(WrongKind, "expected content, found {}", node.kind.name());
        }
        let upper = node.upper;
        let height = node.frame.height;
        self.invalidate_next_pos(id);
        self.free_frame(id);
        if let Some(upper) = upper {
            self.shrink_frame(upper, height, false);
            self.invalidate_upper_sizes(upper);
        }
        Ok(())
    }

    /// Announces that a paragraph's height changed.
    pub fn set_paragraph_height(
        &mut self,
        paragraph: ParagraphId,
        height: Abs,
    ) -> LayoutResult<()> {
        let Some(para) = self.doc.paragraph_mut(paragraph) else {
            bail!(UnknownItem, "paragraph {:?} does not exist", paragraph);
        };
        para.height = height;
        let frames: Vec<NodeId> = self
            .arena
            .ids()
            .filter(|&n| {
                matches!(
                    self.arena.kind(n),
                    NodeKind::Content(c) if c.source == Source::Paragraph(paragraph)
                )
            })
            .collect();
        for frame in frames {
            self.invalidate(frame, Validity::SIZE);
            self.invalidate_upper_sizes(frame);
        }
        Ok(())
    }

    /// Announces that a section's attributes changed.
    pub fn update_section(&mut self, section: SectionId, attr: SectionAttr) -> LayoutResult<()> {
        if self.doc.section(section).is_none() {
            bail!(UnknownItem, "section {:?} does not exist", section);
        }
        let inherited = matches!(
            attr,
            SectionAttr::Format | SectionAttr::FootnotePlacement | SectionAttr::EndnotesAtEnd
        );
        let frames: Vec<NodeId> = self
            .arena
            .ids()
            .filter(|&n| {
                self.arena[n].section().and_then(|d| d.section).is_some_and(|s| {
                    s == section || (inherited && self.doc.is_descendant(s, section))
                })
            })
            .collect();
        for frame in frames {
            self.update_attr(frame, attr);
        }
        Ok(())
    }

    /// Removes a section from the document and dissolves its frames.
    ///
    /// With `save_content`, the section's content is kept and flows on in
    /// the surrounding section or body. Otherwise it is dropped.
    pub fn remove_section(&mut self, section: SectionId, save_content: bool) -> LayoutResult<()> {
        if self.doc.section(section).is_none() {
            bail!(UnknownItem, "section {:?} does not exist", section);
        }
        let mut frames = self.section_frames(section);
        let parent = self.doc.section(section).and_then(|desc| desc.parent);
        self.doc.remove_section(section);
        // Tails first, so that each master sees its follow go away.
        frames.reverse();
        for frame in frames {
            if self.arena.contains(frame) {
                self.move_content_and_delete(frame, save_content, parent);
            }
        }
        Ok(())
    }

    /// Registers a section frame for deferred destruction.
    pub(crate) fn insert_empty_sct(&mut self, id: NodeId) {
        self.destroy.insert(id);
    }

    /// Drops a section frame from the deletion worklist.
    pub(crate) fn remove_from_list(&mut self, id: NodeId) {
        self.destroy.shift_remove(&id);
    }

    /// Destroys the section frames in the deletion worklist that are still
    /// empty.
    #[tracing::instrument(skip_all)]
    pub(crate) fn delete_empty_sections(&mut self) {
        while let Some(sect) = self.destroy.shift_remove_index(0) {
            let Some(node) = self.arena.get(sect) else { continue };
            let locked = node.locks.join > 0 || node.locks.col > 0;
            let (has_area, zombie, upper) = (node.frame.has_area(), node.is_zombie(), node.upper);
            if locked {
                self.anomaly(Some(sect), "locked section frame in the deletion worklist".into());
                continue;
            }
            if has_area || self.arena.contains_content(sect).is_some() {
                if zombie {
                    self.anomaly(Some(sect), "zombie section frame is not empty".into());
                }
                continue;
            }
            tracing::trace!(?sect, "destroying empty section frame");
            self.free_frame(sect);
            let Some(upper) = upper.filter(|&up| self.arena.contains(up)) else { continue };
            if self.arena[upper].first.is_none() {
                if self.arena.is_page_body(upper) {
                    self.superfluous = true;
                } else if self.arena.is_footnote(upper) && self.arena[upper].locks.col == 0 {
                    self.free_frame(upper);
                }
            }
        }
    }

    /// Frees a node and its subtree. Section frames inside it detach from
    /// their chains as if destroyed one by one.
    pub(crate) fn free_frame(&mut self, id: NodeId) {
        let sections: Vec<NodeId> = self
            .arena
            .descendants(id)
            .into_iter()
            .filter(|&n| self.arena.is_section(n))
            .collect();
        for &sect in sections.iter().rev() {
            self.unchain(sect);
        }
        self.arena.free_subtree(id);
    }

    /// Takes a section frame out of its chain and the worklist.
    pub(crate) fn unchain(&mut self, id: NodeId) {
        self.remove_from_list(id);
        let follow = self.arena[id].section().and_then(|d| d.follow);
        if let Some(master) = self.arena.find_master(id) {
            self.set_follow(master, follow);
            if follow.is_none() {
                self.invalidate(master, Validity::SIZE);
            }
        }
        self.set_follow(id, None);
    }

    /// Lays the tree out until it settles. Returns the number of passes.
    #[tracing::instrument(skip_all)]
    pub fn run(&mut self) -> usize {
        let max = self.settings.max_passes.max(1);
        let mut last = None;
        for pass in 1..=max {
            self.format_document();
            self.place_notes();
            self.delete_empty_sections();
            self.remove_superfluous_pages();
            let print = self.fingerprint();
            tracing::debug!(pass, "layout pass finished");
            if last == Some(print) {
                return pass;
            }
            last = Some(print);
        }
        let message = eco_format!("layout did not settle after {max} passes");
        tracing::warn!("{message}");
        self.sink.warn(Warning::new(None, message));
        max
    }

    fn format_document(&mut self) {
        let mut page = self.arena[self.root].first;
        while let Some(p) = page {
            self.format_page(p);
            page = self.arena.get(p).and_then(|node| node.next);
        }
    }

    /// Drops trailing pages without content and note pages without notes.
    fn remove_superfluous_pages(&mut self) {
        self.superfluous = false;
        let pages = self.pages();
        for &page in pages.iter().skip(1).rev() {
            let NodeKind::Page(data) = self.arena.kind(page) else { continue };
            let notes = self
                .arena
                .footnote_container(page)
                .is_some_and(|cont| self.arena[cont].first.is_some());
            if notes {
                break;
            }
            if !data.footnote_page {
                let body = self.arena.page_body(page);
                if body.is_some_and(|b| self.arena[b].first.is_some()) {
                    break;
                }
            }
            tracing::debug!(?page, "removing superfluous page");
            self.free_frame(page);
        }
    }

    /// A hash over the geometry and structure of the whole tree.
    pub(crate) fn fingerprint(&self) -> u128 {
        let items: Vec<_> = self
            .arena
            .descendants(self.root)
            .into_iter()
            .map(|n| {
                let node = &self.arena[n];
                let section = node.section().map(|d| (d.section, d.follow.is_some()));
                let depth = self.arena.ancestors(n).count();
                (depth, node.kind.name(), node.frame, node.prt, section)
            })
            .collect();
        hash128(&(items, self.destroy.len()))
    }

    /// Records a condition that indicates a bug. The caller degrades to a
    /// no-op afterwards.
    pub(crate) fn anomaly(&mut self, node: Option<NodeId>, message: EcoString) {
        tracing::warn!(?node, "layout anomaly: {message}");
        self.sink.warn(Warning::new(node, message.clone()));
        if cfg!(feature = "strict") {
            panic!("layout anomaly: {message}");
        }
    }

    pub(crate) fn invalidate(&mut self, id: NodeId, bits: Validity) {
        if let Some(node) = self.arena.get_mut(id) {
            node.invalidate(bits);
        }
    }

    pub(crate) fn validate(&mut self, id: NodeId, bits: Validity) {
        if let Some(node) = self.arena.get_mut(id) {
            node.validate(bits);
        }
    }

    pub(crate) fn is_valid(&self, id: NodeId, bits: Validity) -> bool {
        self.arena.get(id).is_some_and(|node| node.valid.contains(bits))
    }

    /// Invalidates the position of the next frame in flow order.
    pub(crate) fn invalidate_next_pos(&mut self, id: NodeId) {
        if let Some(next) = self.find_next_flow(id) {
            self.invalidate(next, Validity::POS);
        }
    }

    /// Invalidates the size of every section frame containing `id`.
    pub(crate) fn invalidate_upper_sizes(&mut self, id: NodeId) {
        let sections: Vec<NodeId> = std::iter::once(id)
            .chain(self.arena.ancestors(id))
            .filter(|&n| self.arena.is_section(n))
            .collect();
        for sect in sections {
            self.invalidate(sect, Validity::SIZE);
        }
    }

    /// Lets the flow see a freshly linked frame.
    pub(crate) fn flow_inserted(&mut self, id: NodeId) {
        if let Some(next) = self.arena.next_alive(id) {
            self.invalidate(next, Validity::POS | Validity::PRT);
        }
        if let Some(upper) = self.arena[id].upper {
            self.invalidate_upper_sizes(upper);
        }
    }

    pub(crate) fn set_follow(&mut self, id: NodeId, follow: Option<NodeId>) {
        if let Some(data) = self.arena.get_mut(id).and_then(|node| node.section_mut()) {
            data.follow = follow;
        }
    }

    pub(crate) fn set_y_margins(&mut self, id: NodeId, top: Abs, bottom: Abs) {
        let node = &mut self.arena[id];
        node.prt.y = top;
        node.prt.height = (node.frame.height - top - bottom).max(Abs::zero());
    }

    pub(crate) fn set_x_margins(&mut self, id: NodeId, left: Abs, right: Abs) {
        let node = &mut self.arena[id];
        node.prt.x = left;
        node.prt.width = (node.frame.width - left - right).max(Abs::zero());
    }

    /// The bottom edge of a node's print area.
    pub(crate) fn prt_bottom(&self, id: NodeId) -> Abs {
        self.arena[id].prt_abs().bottom()
    }
}

impl Debug for Layout {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        fn write_node(
            layout: &Layout,
            f: &mut Formatter,
            id: NodeId,
            depth: usize,
        ) -> fmt::Result {
            writeln!(f, "{:indent$}{:?} {:?}", "", id, layout.arena[id], indent = depth * 2)?;
            for child in layout.arena.children(id) {
                write_node(layout, f, child, depth + 1)?;
            }
            Ok(())
        }
        f.debug_struct("Layout")
            .field("tree", &quire_utils::debug(|f| write_node(self, f, self.root, 0)))
            .field("pending_deletions", &self.destroy)
            .finish()
    }
}
