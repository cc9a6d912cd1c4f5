//! The document collaborator: the logical content the layout realizes.
//!
//! The layout only reads from the document. Changes are made here first and
//! then announced to the layout through [`Layout`](crate::Layout)'s
//! notification methods.

use serde::{Deserialize, Serialize};

use crate::geom::Abs;

macro_rules! id_type {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(
            Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

id_type! {
    /// Identifies a [`SectionDescriptor`].
    SectionId
}

id_type! {
    /// Identifies a [`Paragraph`].
    ParagraphId
}

id_type! {
    /// Identifies a [`Note`].
    NoteId
}

id_type! {
    /// Identifies a [`PageDesc`].
    PageDescId
}

/// Where the footnotes of a section are placed.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FootnotePlacement {
    /// At the bottom of the page (or column) or at the end of the document.
    #[default]
    AtPageOrDocEnd,
    /// Collected at the end of the section.
    AtSectionEnd,
    /// At the end of the section, with a numbering sequence of their own.
    AtSectionEndOwnNumbering,
    /// At the end of the section, with their own numbering and format.
    AtSectionEndOwnNumberingAndFormat,
}

impl FootnotePlacement {
    /// Whether the notes are collected at the end of the section.
    pub fn at_section_end(self) -> bool {
        self != Self::AtPageOrDocEnd
    }

    /// Whether the section numbers its notes on its own.
    pub fn own_numbering(self) -> bool {
        matches!(
            self,
            Self::AtSectionEndOwnNumbering | Self::AtSectionEndOwnNumberingAndFormat
        )
    }
}

/// The area of the document a node lives in.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeArea {
    /// The visible document body.
    #[default]
    Body,
    /// Content kept alive by the undo history.
    Undo,
    /// Content held by the clipboard.
    Clipboard,
}

/// The logical properties of a section.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SectionDescriptor {
    /// The number of columns. Zero and one both mean a single column.
    pub columns: u16,
    /// The gap between adjacent columns.
    pub gutter: Abs,
    /// Whether content is distributed evenly over the columns. When unset,
    /// the columns are filled one after another.
    pub balance: bool,
    /// Spacing between the section and its parent's left edge.
    pub left: Abs,
    /// Spacing between the section and its parent's right edge.
    pub right: Abs,
    /// Where the section's footnotes go.
    pub footnotes: FootnotePlacement,
    /// Whether endnotes are collected at the end of the section.
    pub endnotes_at_end: bool,
    /// The section this one is declared inside of.
    pub parent: Option<SectionId>,
    /// The area of the document the section lives in.
    pub area: NodeArea,
}

impl SectionDescriptor {
    /// A single-column section with default properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the column count and gutter.
    pub fn with_columns(mut self, columns: u16, gutter: Abs) -> Self {
        self.columns = columns;
        self.gutter = gutter;
        self
    }

    /// Sets whether the columns are balanced.
    pub fn with_balance(mut self, balance: bool) -> Self {
        self.balance = balance;
        self
    }

    /// Sets the left and right spacing.
    pub fn with_spacing(mut self, left: Abs, right: Abs) -> Self {
        self.left = left;
        self.right = right;
        self
    }

    /// Sets the footnote placement.
    pub fn with_footnotes(mut self, footnotes: FootnotePlacement) -> Self {
        self.footnotes = footnotes;
        self
    }

    /// Sets whether endnotes are collected at the section end.
    pub fn with_endnotes_at_end(mut self, endnotes_at_end: bool) -> Self {
        self.endnotes_at_end = endnotes_at_end;
        self
    }

    /// Declares the section as nested into another one.
    pub fn with_parent(mut self, parent: SectionId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets the node area.
    pub fn with_area(mut self, area: NodeArea) -> Self {
        self.area = area;
        self
    }

    /// The effective column count.
    pub fn column_count(&self) -> usize {
        usize::from(self.columns.max(1))
    }
}

impl Default for SectionDescriptor {
    fn default() -> Self {
        Self {
            columns: 1,
            gutter: Abs::zero(),
            balance: true,
            left: Abs::zero(),
            right: Abs::zero(),
            footnotes: FootnotePlacement::AtPageOrDocEnd,
            endnotes_at_end: false,
            parent: None,
            area: NodeArea::Body,
        }
    }
}

/// Which attributes of a section changed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SectionAttr {
    /// Anything may have changed.
    Format,
    /// The column count or gutter.
    Columns,
    /// The balance flag.
    Balance,
    /// The footnote placement.
    FootnotePlacement,
    /// The endnote placement.
    EndnotesAtEnd,
    /// The left/right spacing.
    Spacing,
}

/// A paragraph of flowing content.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Paragraph {
    /// The laid out height of the paragraph.
    pub height: Abs,
    /// The notes anchored in the paragraph, in reading order.
    #[serde(default)]
    pub notes: Vec<NoteId>,
    /// A page style the paragraph must start on.
    #[serde(default)]
    pub page_desc: Option<PageDescId>,
}

impl Paragraph {
    /// A paragraph of the given height without notes.
    pub fn new(height: Abs) -> Self {
        Self { height, notes: vec![], page_desc: None }
    }
}

/// The kind of a note.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoteKind {
    Footnote,
    Endnote,
}

/// A footnote or endnote.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Note {
    pub kind: NoteKind,
    /// The height of the note's body.
    pub height: Abs,
}

/// A page style.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PageDesc {
    pub width: Abs,
    pub height: Abs,
    pub margin_top: Abs,
    pub margin_bottom: Abs,
    pub margin_left: Abs,
    pub margin_right: Abs,
    /// The minimum header height, if the page has a header.
    pub header: Option<Abs>,
    /// The minimum footer height, if the page has a footer.
    pub footer: Option<Abs>,
    /// The style of the page after this one.
    pub follow: Option<PageDescId>,
}

impl Default for PageDesc {
    fn default() -> Self {
        // A4 with 2cm margins.
        Self {
            width: Abs::raw(11906),
            height: Abs::raw(16838),
            margin_top: Abs::raw(1134),
            margin_bottom: Abs::raw(1134),
            margin_left: Abs::raw(1134),
            margin_right: Abs::raw(1134),
            header: None,
            footer: None,
            follow: None,
        }
    }
}

/// The logical document.
#[derive(Debug, Default, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Document {
    sections: Vec<Option<SectionDescriptor>>,
    paragraphs: Vec<Paragraph>,
    notes: Vec<Note>,
    page_descs: Vec<PageDesc>,
}

impl Document {
    /// An empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a section descriptor.
    pub fn add_section(&mut self, desc: SectionDescriptor) -> SectionId {
        self.sections.push(Some(desc));
        SectionId(self.sections.len() as u32 - 1)
    }

    /// The descriptor of a section, if it wasn't removed.
    pub fn section(&self, id: SectionId) -> Option<&SectionDescriptor> {
        self.sections.get(id.index()).and_then(Option::as_ref)
    }

    /// Mutable access to a section descriptor.
    pub fn section_mut(&mut self, id: SectionId) -> Option<&mut SectionDescriptor> {
        self.sections.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Removes a section. Sections nested into it move up to its parent.
    pub fn remove_section(&mut self, id: SectionId) -> Option<SectionDescriptor> {
        let removed = self.sections.get_mut(id.index())?.take()?;
        for desc in self.sections.iter_mut().flatten() {
            if desc.parent == Some(id) {
                desc.parent = removed.parent;
            }
        }
        Some(removed)
    }

    /// The section and its ancestors, innermost first.
    pub fn section_chain(&self, id: SectionId) -> impl Iterator<Item = SectionId> + '_ {
        let mut next = self.section(id).map(|_| id);
        // Bounded to survive malformed parent cycles.
        let mut budget = self.sections.len();
        std::iter::from_fn(move || {
            let current = next?;
            budget = budget.checked_sub(1)?;
            next = self.section(current).and_then(|desc| desc.parent);
            Some(current)
        })
    }

    /// Whether `id` is `ancestor` or declared (transitively) inside of it.
    pub fn is_descendant(&self, id: SectionId, ancestor: SectionId) -> bool {
        self.section_chain(id).any(|s| s == ancestor)
    }

    /// Whether the section lives outside of the visible body.
    pub fn is_in_special_area(&self, id: SectionId) -> bool {
        self.section(id).is_some_and(|desc| desc.area != NodeArea::Body)
    }

    /// Adds a paragraph.
    pub fn add_paragraph(&mut self, paragraph: Paragraph) -> ParagraphId {
        self.paragraphs.push(paragraph);
        ParagraphId(self.paragraphs.len() as u32 - 1)
    }

    /// A paragraph.
    pub fn paragraph(&self, id: ParagraphId) -> Option<&Paragraph> {
        self.paragraphs.get(id.index())
    }

    /// Mutable access to a paragraph.
    pub fn paragraph_mut(&mut self, id: ParagraphId) -> Option<&mut Paragraph> {
        self.paragraphs.get_mut(id.index())
    }

    /// Adds a note.
    pub fn add_note(&mut self, note: Note) -> NoteId {
        self.notes.push(note);
        NoteId(self.notes.len() as u32 - 1)
    }

    /// A note.
    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.notes.get(id.index())
    }

    /// Adds a page style.
    pub fn add_page_desc(&mut self, desc: PageDesc) -> PageDescId {
        self.page_descs.push(desc);
        PageDescId(self.page_descs.len() as u32 - 1)
    }

    /// A page style.
    pub fn page_desc(&self, id: PageDescId) -> Option<&PageDesc> {
        self.page_descs.get(id.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_section_reparents_children() {
        let mut doc = Document::new();
        let outer = doc.add_section(SectionDescriptor::new());
        let middle = doc.add_section(SectionDescriptor::new().with_parent(outer));
        let inner = doc.add_section(SectionDescriptor::new().with_parent(middle));
        assert!(doc.is_descendant(inner, outer));
        assert!(doc.remove_section(middle).is_some());
        assert_eq!(doc.section(inner).unwrap().parent, Some(outer));
        assert_eq!(doc.section_chain(inner).collect::<Vec<_>>(), [inner, outer]);
        assert!(doc.remove_section(middle).is_none());
    }

    #[test]
    fn test_footnote_placement_flags() {
        assert!(!FootnotePlacement::AtPageOrDocEnd.at_section_end());
        assert!(FootnotePlacement::AtSectionEnd.at_section_end());
        assert!(!FootnotePlacement::AtSectionEnd.own_numbering());
        assert!(FootnotePlacement::AtSectionEndOwnNumberingAndFormat.own_numbering());
    }

    #[test]
    fn test_special_area() {
        let mut doc = Document::new();
        let body = doc.add_section(SectionDescriptor::new());
        let undo = doc.add_section(SectionDescriptor::new().with_area(NodeArea::Undo));
        assert!(!doc.is_in_special_area(body));
        assert!(doc.is_in_special_area(undo));
    }

    #[test]
    fn test_document_from_json() {
        let doc: Document = serde_json::from_str(
            r#"{
                "sections": [{ "columns": 2, "balance": false }],
                "paragraphs": [{ "height": 240 }]
            }"#,
        )
        .unwrap();
        let desc = doc.section(SectionId(0)).unwrap();
        assert_eq!(desc.column_count(), 2);
        assert!(!desc.balance);
        assert_eq!(doc.paragraph(ParagraphId(0)).unwrap().height, Abs::raw(240));
    }
}
