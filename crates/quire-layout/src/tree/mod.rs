//! The layout tree.
//!
//! Nodes live in an [`Arena`] and refer to each other through
//! generation-checked [`NodeId`]s. A node's frame is stored in absolute
//! coordinates, its print area relative to the frame.

mod arena;
mod navigate;

pub use self::arena::{Arena, Children};

use std::fmt::{self, Debug, Formatter};

use bitflags::bitflags;

use crate::geom::{Abs, Rect};
use crate::model::{NoteId, PageDescId, ParagraphId, SectionId};

/// A handle to a node in the layout tree.
///
/// Handles stay valid until their node is freed. A freed slot is reused with
/// a new generation, so old handles can be detected instead of silently
/// aliasing a different node.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

bitflags! {
    /// Which parts of a node's geometry are up to date.
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct Validity: u8 {
        const POS = 1 << 0;
        const SIZE = 1 << 1;
        const PRT = 1 << 2;
    }
}

/// Reentrancy counters.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Locks {
    /// Held while the node is being formatted, split or merged.
    pub join: u32,
    /// Held while the node's columns are being recomputed.
    pub col: u32,
}

/// A node in the layout tree.
#[derive(Clone)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) upper: Option<NodeId>,
    pub(crate) first: Option<NodeId>,
    pub(crate) last: Option<NodeId>,
    pub(crate) prev: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
    pub(crate) frame: Rect,
    pub(crate) prt: Rect,
    pub(crate) valid: Validity,
    pub(crate) locks: Locks,
}

impl Node {
    /// A detached node of the given kind with empty geometry.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            upper: None,
            first: None,
            last: None,
            prev: None,
            next: None,
            frame: Rect::zero(),
            prt: Rect::zero(),
            valid: Validity::empty(),
            locks: Locks::default(),
        }
    }

    /// What kind of node this is.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// The parent.
    pub fn upper(&self) -> Option<NodeId> {
        self.upper
    }

    /// The first child.
    pub fn first(&self) -> Option<NodeId> {
        self.first
    }

    /// The last child.
    pub fn last(&self) -> Option<NodeId> {
        self.last
    }

    /// The previous sibling.
    pub fn prev(&self) -> Option<NodeId> {
        self.prev
    }

    /// The next sibling.
    pub fn next(&self) -> Option<NodeId> {
        self.next
    }

    /// The frame in absolute coordinates.
    pub fn frame(&self) -> Rect {
        self.frame
    }

    /// The print area, relative to the frame.
    pub fn prt(&self) -> Rect {
        self.prt
    }

    /// The print area in absolute coordinates.
    pub fn prt_abs(&self) -> Rect {
        self.prt.translate(self.frame.x, self.frame.y)
    }

    /// The top margin: the distance between frame and print area top.
    pub fn top_margin(&self) -> Abs {
        self.prt.y
    }

    /// Which parts of the geometry are up to date.
    pub fn validity(&self) -> Validity {
        self.valid
    }

    /// The node's lock counters.
    pub fn locks(&self) -> Locks {
        self.locks
    }

    /// The section data, if this is a section frame.
    pub fn section(&self) -> Option<&SectionData> {
        match &self.kind {
            NodeKind::Section(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn section_mut(&mut self) -> Option<&mut SectionData> {
        match &mut self.kind {
            NodeKind::Section(data) => Some(data),
            _ => None,
        }
    }

    /// Whether this is a flow frame: content, a table or a section.
    pub fn is_flow(&self) -> bool {
        matches!(self.kind, NodeKind::Content(_) | NodeKind::Table | NodeKind::Section(_))
    }

    /// Whether this is a section frame whose section was removed.
    pub fn is_zombie(&self) -> bool {
        self.section().is_some_and(|data| data.section.is_none())
    }

    pub(crate) fn invalidate(&mut self, bits: Validity) {
        self.valid.remove(bits);
    }

    pub(crate) fn validate(&mut self, bits: Validity) {
        self.valid.insert(bits);
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:?} {:?}", self.kind, self.frame)
    }
}

/// The kind of a node and its kind-specific data.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// The root of the tree. Its children are pages.
    Root,
    /// A page: an optional header, the body, an optional footnote container
    /// and an optional footer. Flies are appended after those.
    Page(PageData),
    Header,
    Footer,
    /// Holds flowing content, either of a page or of a column.
    Body,
    /// A column of a section: a body and an optional footnote container.
    Column,
    /// Holds the footnotes of a page or a column.
    FootnoteContainer,
    Footnote(FootnoteData),
    Section(SectionData),
    /// A table. Its children are cells laid out side by side.
    Table,
    Cell,
    /// A free-standing frame anchored to a page.
    Fly(FlyData),
    Content(ContentData),
}

impl NodeKind {
    /// A short name for the kind, used in messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Page(_) => "page",
            Self::Header => "header",
            Self::Footer => "footer",
            Self::Body => "body",
            Self::Column => "column",
            Self::FootnoteContainer => "footnote container",
            Self::Footnote(_) => "footnote",
            Self::Section(_) => "section",
            Self::Table => "table",
            Self::Cell => "cell",
            Self::Fly(_) => "fly",
            Self::Content(_) => "content",
        }
    }
}

/// Page data.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct PageData {
    pub desc: PageDescId,
    /// A page at the end of the document holding only notes.
    pub footnote_page: bool,
}

/// Footnote data.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct FootnoteData {
    pub note: NoteId,
    /// The piece this one continues.
    pub master: Option<NodeId>,
    /// The piece continuing this one.
    pub follow: Option<NodeId>,
    /// The part of the note's height this piece shows, if it was split.
    pub share: Option<Abs>,
}

/// The state of a section frame.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct SectionData {
    /// The section realized by this frame. `None` for a zombie.
    pub section: Option<SectionId>,
    /// The frame continuing this one.
    pub follow: Option<NodeId>,
    /// Footnotes are collected at the end of the section.
    pub ftn_at_end: bool,
    /// Endnotes are collected at the end of the section.
    pub endn_at_end: bool,
    /// The section numbers its footnotes on its own.
    pub own_ftn_num: bool,
    /// The frame is clipped at its deadline and smaller than its content.
    pub undersized: bool,
    /// The frame never changes its height on its own.
    pub fixed_size: bool,
}

impl SectionData {
    pub(crate) fn new(section: SectionId) -> Self {
        Self {
            section: Some(section),
            follow: None,
            ftn_at_end: false,
            endn_at_end: false,
            own_ftn_num: false,
            undersized: false,
            fixed_size: false,
        }
    }

    /// Whether any notes are collected at the end of the section.
    pub fn any_note_at_end(&self) -> bool {
        self.ftn_at_end || self.endn_at_end
    }
}

/// Fly data.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct FlyData {
    /// The fly takes the height of its content.
    pub auto_grow: bool,
}

/// Content data.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ContentData {
    pub source: Source,
}

/// Where a content frame's text comes from.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Source {
    Paragraph(ParagraphId),
    NoteBody(NoteId),
}
