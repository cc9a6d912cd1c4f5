use quire_layout::diag::ErrorKind;
use quire_layout::geom::{Abs, Rect};
use quire_layout::model::{
    Document, NodeArea, Note, NoteKind, PageDesc, PageDescId, Paragraph, ParagraphId,
    SectionDescriptor, SectionId,
};
use quire_layout::tree::{NodeId, NodeKind, Validity};
use quire_layout::{FindMode, Layout, Layouter, Settings};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn page_desc() -> PageDesc {
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

/// Builds a layout with one page and returns it with the page's body.
fn setup(mut doc: Document) -> (Layout, NodeId) {
    init_tracing();
    if doc.page_desc(PageDescId(0)).is_none() {
        doc.add_page_desc(page_desc());
    }
    let mut layout = Layout::new(doc, Settings::default());
    let page = layout.append_page(PageDescId(0)).unwrap();
    let body = layout.page_body(page).unwrap();
    (layout, body)
}

fn paragraphs(doc: &mut Document, heights: &[i64]) -> Vec<ParagraphId> {
    heights.iter().map(|&h| doc.add_paragraph(Paragraph::new(Abs::raw(h)))).collect()
}

fn height(layout: &Layout, id: NodeId) -> Abs {
    layout.frame(id).unwrap().height
}

/// Every frame of the section is reachable from the master, and every link
/// points back.
fn assert_chain(layout: &Layout, section: SectionId) {
    let frames = layout.section_frames(section);
    let Some(&master) = frames.first() else { return };
    assert_eq!(layout.master(master).unwrap(), None);
    assert_eq!(layout.chain(master).unwrap(), frames);
    for pair in frames.windows(2) {
        assert_eq!(layout.follow(pair[0]).unwrap(), Some(pair[1]));
        assert_eq!(layout.master(pair[1]).unwrap(), Some(pair[0]));
    }
}

/// The frame ends at or above the bottom of its upper's print area.
fn assert_below_upper(layout: &Layout, frame: NodeId) {
    let upper = layout.node(frame).unwrap().upper().unwrap();
    let deadline = layout.node(upper).unwrap().prt_abs().bottom();
    let bottom = layout.frame(frame).unwrap().bottom();
    assert!(bottom <= deadline, "{frame:?} ends at {bottom:?} below {deadline:?}");
}

/// A single-column section with three paragraphs that do not fit on one
/// page.
fn overflowing_section() -> (Layout, SectionId, Vec<ParagraphId>, NodeId, Vec<NodeId>) {
    let mut doc = Document::new();
    let section = doc.add_section(SectionDescriptor::new());
    let paras = paragraphs(&mut doc, &[4000, 4000, 4000]);
    let (mut layout, body) = setup(doc);
    let sect = layout.create_section(section, body, None).unwrap();
    let contents = paras
        .iter()
        .map(|&p| layout.insert_content(p, sect, None).unwrap())
        .collect();
    layout.run();
    (layout, section, paras, sect, contents)
}

#[test]
fn test_overflowing_section_continues_on_next_page() {
    let (layout, section, _, master, contents) = overflowing_section();
    let pages = layout.pages();
    assert_eq!(pages.len(), 2);

    let follow = layout.follow(master).unwrap().unwrap();
    assert_eq!(layout.chain(master).unwrap(), vec![master, follow]);
    assert_chain(&layout, section);
    assert_eq!(layout.children(master).unwrap(), contents[..2]);
    assert_eq!(layout.children(follow).unwrap(), contents[2..]);
    let second_body = layout.page_body(pages[1]).unwrap();
    assert_eq!(layout.node(follow).unwrap().upper(), Some(second_body));

    // The master fills its page, the tail only takes what it needs.
    assert_eq!(height(&layout, master), Abs::raw(10000));
    assert_eq!(layout.frame(master).unwrap().bottom(), Abs::raw(11000));
    assert_eq!(height(&layout, follow), Abs::raw(4000));
    assert!(layout.to_maximize(master, true).unwrap());
    assert!(!layout.to_maximize(follow, true).unwrap());
    assert_eq!(layout.calc_min_diff(master).unwrap(), Some(Abs::zero()));
    assert_eq!(layout.calc_min_diff(follow).unwrap(), None);
}

#[test]
fn test_section_frames_stay_above_deadline() {
    let (layout, section, ..) = overflowing_section();
    let frames = layout.section_frames(section);
    assert_eq!(frames.len(), 2);
    for frame in frames {
        assert_below_upper(&layout, frame);
    }
}

#[test]
fn test_growth_requests_in_test_mode_are_inert() {
    let (mut layout, _, _, master, _) = overflowing_section();
    let follow = layout.follow(master).unwrap().unwrap();
    let before = layout.frame(follow).unwrap();

    assert_eq!(layout.grow(master, Abs::zero(), true).unwrap(), Abs::zero());
    assert_eq!(layout.grow(follow, Abs::zero(), true).unwrap(), Abs::zero());
    assert_eq!(layout.grow(follow, Abs::raw(1000), true).unwrap(), Abs::raw(1000));
    assert_eq!(layout.frame(follow).unwrap(), before);
    assert!(layout.growable(follow).unwrap());
}

#[test]
fn test_section_pulls_back_content_when_room_appears() {
    let (mut layout, section, paras, master, contents) = overflowing_section();
    let follow = layout.follow(master).unwrap().unwrap();
    layout.set_paragraph_height(paras[0], Abs::raw(1000)).unwrap();
    layout.run();

    assert_eq!(layout.children(master).unwrap(), contents);
    assert_eq!(layout.follow(master).unwrap(), None);
    assert_eq!(layout.node(follow).unwrap_err().kind, ErrorKind::StaleHandle);
    assert_eq!(layout.section_frames(section), vec![master]);
    assert_eq!(height(&layout, master), Abs::raw(9000));
    assert_eq!(layout.pages().len(), 1);
    assert_eq!(layout.pending_deletions(), 0);
}

#[test]
fn test_destroying_the_tail_unlinks_the_master() {
    let (mut layout, _, _, master, _) = overflowing_section();
    let follow = layout.follow(master).unwrap().unwrap();
    assert!(layout.node(master).unwrap().validity().contains(Validity::SIZE));

    layout.destroy_section(follow).unwrap();
    assert_eq!(layout.follow(master).unwrap(), None);
    assert_eq!(layout.chain(master).unwrap(), vec![master]);
    assert!(!layout.node(master).unwrap().validity().contains(Validity::SIZE));
    assert_eq!(layout.node(follow).unwrap_err().kind, ErrorKind::StaleHandle);
}

#[test]
fn test_removed_section_leaves_tracked_zombies() {
    let (mut layout, section, _, master, contents) = overflowing_section();
    let follow = layout.follow(master).unwrap().unwrap();
    let first_body = layout.node(master).unwrap().upper().unwrap();

    layout.remove_section(section, true).unwrap();
    for frame in [master, follow] {
        assert!(layout.node(frame).unwrap().is_zombie());
        assert!(layout.in_delete_list(frame));
    }
    let lowers = layout.children(first_body).unwrap();
    assert_eq!(lowers[..2], contents[..2]);

    layout.run();
    assert_eq!(layout.pending_deletions(), 0);
    assert!(layout.node(master).is_err());
    assert!(layout.node(follow).is_err());
    assert!(layout.section_frames(section).is_empty());
    assert_eq!(layout.node(contents[0]).unwrap().upper(), Some(first_body));
}

#[test]
fn test_tail_finds_its_master_leaf() {
    let (mut layout, section, _, master, contents) = overflowing_section();
    let follow = layout.follow(master).unwrap().unwrap();
    assert_eq!(layout.prev_sct_leaf(contents[2]).unwrap(), Some(master));
    assert_eq!(layout.section_frames(section), vec![master, follow]);

    assert_eq!(layout.undersize(master, true).unwrap(), Abs::raw(-2000));
    assert_eq!(layout.undersize(follow, false).unwrap(), Abs::zero());
    assert_eq!(layout.inner_height(master).unwrap(), Abs::raw(8000));

    layout.check_clipping(follow, false, false).unwrap();
    assert_below_upper(&layout, follow);
}

#[test]
fn test_cut_section_can_be_pasted_elsewhere() {
    let mut doc = Document::new();
    let section = doc.add_section(SectionDescriptor::new());
    let paras = paragraphs(&mut doc, &[1000, 2000]);
    let (mut layout, body) = setup(doc);
    let first = layout.insert_content(paras[0], body, None).unwrap();
    let sect = layout.create_section(section, body, None).unwrap();
    layout.insert_content(paras[1], sect, None).unwrap();
    layout.run();
    assert_eq!(layout.frame(sect).unwrap().y, Abs::raw(2000));

    layout.cut_section(sect).unwrap();
    assert_eq!(layout.node(sect).unwrap().upper(), None);
    assert_eq!(
        layout.cut_section(sect).unwrap_err().kind,
        ErrorKind::InvalidArgument,
    );
    layout.paste_section(sect, body, Some(first)).unwrap();
    assert_eq!(layout.children(body).unwrap(), vec![sect, first]);

    layout.run();
    assert_eq!(layout.frame(sect).unwrap().y, Abs::raw(1000));
    assert_eq!(layout.frame(first).unwrap().y, Abs::raw(3000));
}

#[test]
fn test_tables_and_flies_are_placed() {
    let mut doc = Document::new();
    let para = doc.add_paragraph(Paragraph::new(Abs::raw(1500)));
    let (mut layout, body) = setup(doc);
    let page = layout.pages()[0];
    let table = layout.insert_table(body, None, 2).unwrap();
    let cells = layout.children(table).unwrap();
    assert_eq!(cells.len(), 2);
    layout.insert_content(para, cells[1], None).unwrap();
    layout.run();
    assert_eq!(height(&layout, table), Abs::raw(1500));

    let err = layout.insert_table(body, None, 0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
    let rect = Rect::new(Abs::raw(2000), Abs::raw(2000), Abs::raw(3000), Abs::raw(1000));
    assert_eq!(layout.add_fly(body, rect, false).unwrap_err().kind, ErrorKind::WrongKind);
    let fly = layout.add_fly(page, rect, false).unwrap();
    assert_eq!(layout.frame(fly).unwrap(), rect);
}

#[test]
fn test_unbalanced_columns_fill_in_order() {
    let mut doc = Document::new();
    let section = doc.add_section(
        SectionDescriptor::new().with_columns(3, Abs::raw(300)).with_balance(false),
    );
    let paras = paragraphs(&mut doc, &[4000, 4000, 4000, 4000]);
    let (mut layout, body) = setup(doc);
    let sect = layout.create_section(section, body, None).unwrap();
    for &p in &paras {
        layout.insert_content(p, sect, None).unwrap();
    }
    layout.run();

    assert!(layout.is_balanced_section(sect).unwrap());
    assert_eq!(layout.section_frames(section), vec![sect]);
    assert_eq!(height(&layout, sect), Abs::raw(8000));
    let counts: Vec<usize> = layout
        .children(sect)
        .unwrap()
        .into_iter()
        .map(|col| {
            let body = layout.children(col).unwrap()[0];
            layout.children(body).unwrap().len()
        })
        .collect();
    assert_eq!(counts, vec![2, 2, 0]);
}

#[test]
fn test_nested_section_splits_outer_one() {
    let mut doc = Document::new();
    let outer_section = doc.add_section(SectionDescriptor::new());
    let inner_section = doc.add_section(SectionDescriptor::new().with_parent(outer_section));
    let paras = paragraphs(&mut doc, &[1000, 1000, 1000, 500]);
    let (mut layout, body) = setup(doc);
    let outer = layout.create_section(outer_section, body, None).unwrap();
    let contents: Vec<NodeId> = paras[..3]
        .iter()
        .map(|&p| layout.insert_content(p, outer, None).unwrap())
        .collect();

    let inner = layout.create_section(inner_section, outer, Some(contents[1])).unwrap();
    let lowers = layout.children(body).unwrap();
    assert_eq!(lowers.len(), 3);
    assert_eq!(lowers[..2], [outer, inner]);
    let second = lowers[2];
    assert!(layout.has_to_break(inner, outer).unwrap());
    assert!(layout.is_descendant_from(inner, outer_section).unwrap());
    assert_eq!(layout.children(outer).unwrap(), contents[..1]);
    assert_eq!(layout.children(second).unwrap(), contents[1..]);
    assert_eq!(layout.follow(outer).unwrap(), None);
    assert_eq!(layout.follow(second).unwrap(), None);
    assert_eq!(layout.master(second).unwrap(), None);
    assert_eq!(layout.master(inner).unwrap(), None);

    layout.insert_content(paras[3], inner, None).unwrap();
    layout.run();
    assert_eq!(layout.section_frames(outer_section), vec![outer, second]);
    assert_eq!(layout.section_frames(inner_section), vec![inner]);
    assert_eq!(height(&layout, inner), Abs::raw(500));
}

#[test]
fn test_split_and_merge_restore_the_frame() {
    let mut doc = Document::new();
    let section = doc.add_section(SectionDescriptor::new());
    let paras = paragraphs(&mut doc, &[1000, 1000, 1000]);
    let (mut layout, body) = setup(doc);
    let sect = layout.create_section(section, body, None).unwrap();
    let contents: Vec<NodeId> =
        paras.iter().map(|&p| layout.insert_content(p, sect, None).unwrap()).collect();
    layout.run();

    let new = layout.split_sect(sect, contents[0], true).unwrap().unwrap();
    assert_eq!(layout.children(sect).unwrap(), contents[..1]);
    assert_eq!(layout.children(new).unwrap(), contents[1..]);
    assert_eq!(layout.children(body).unwrap(), vec![sect, new]);

    layout.merge_next(sect, new).unwrap();
    assert_eq!(layout.children(sect).unwrap(), contents);
    assert_eq!(layout.children(body).unwrap(), vec![sect]);
    assert!(layout.node(new).is_err());

    // Nothing left behind the last frame.
    assert_eq!(layout.split_sect(sect, contents[2], true).unwrap(), None);
}

#[test]
fn test_split_frame_takes_over_the_follow() {
    let (mut layout, section, _, master, contents) = overflowing_section();
    let follow = layout.follow(master).unwrap().unwrap();

    let new = layout.split_sect(master, contents[0], true).unwrap().unwrap();
    assert_eq!(layout.follow(master).unwrap(), None);
    assert_eq!(layout.follow(new).unwrap(), Some(follow));
    assert_eq!(layout.children(new).unwrap(), contents[1..2]);

    layout.merge_next(master, new).unwrap();
    assert_eq!(layout.follow(master).unwrap(), Some(follow));
    assert_eq!(layout.children(master).unwrap(), contents[..2]);
    assert_chain(&layout, section);
}

#[test]
fn test_merge_refuses_frames_that_do_not_come_after() {
    let (mut layout, section, _, master, contents) = overflowing_section();
    let follow = layout.follow(master).unwrap().unwrap();

    let err = layout.merge_next(master, master).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
    let err = layout.merge_next(follow, master).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
    assert_eq!(layout.chain(master).unwrap(), vec![master, follow]);
    assert_eq!(layout.children(master).unwrap(), contents[..2]);
    assert_eq!(layout.children(follow).unwrap(), contents[2..]);
    assert_chain(&layout, section);

    layout.merge_next(master, follow).unwrap();
    assert_eq!(layout.follow(master).unwrap(), None);
    assert_eq!(layout.children(master).unwrap(), contents);
    assert_eq!(layout.node(follow).unwrap_err().kind, ErrorKind::StaleHandle);
}

#[test]
fn test_footer_section_does_not_shrink_footer() {
    let mut doc = Document::new();
    doc.add_page_desc(PageDesc { footer: Some(Abs::raw(500)), ..page_desc() });
    let section = doc.add_section(SectionDescriptor::new());
    let para = doc.add_paragraph(Paragraph::new(Abs::raw(2000)));
    let (mut layout, _) = setup(doc);
    let page = layout.pages()[0];
    let footer = layout
        .children(page)
        .unwrap()
        .into_iter()
        .find(|&c| matches!(layout.node(c).unwrap().kind(), NodeKind::Footer))
        .unwrap();

    let sect = layout.create_section(section, footer, None).unwrap();
    layout.insert_content(para, sect, None).unwrap();
    layout.run();
    assert_eq!(height(&layout, sect), Abs::raw(2000));
    assert_eq!(height(&layout, footer), Abs::raw(2000));

    layout.set_paragraph_height(para, Abs::raw(500)).unwrap();
    layout.run();
    assert_eq!(height(&layout, sect), Abs::raw(500));
    assert_eq!(height(&layout, footer), Abs::raw(2000));
}

#[test]
fn test_endnotes_collected_at_section_end() {
    let mut doc = Document::new();
    let note = doc.add_note(Note { kind: NoteKind::Endnote, height: Abs::raw(500) });
    let section = doc.add_section(SectionDescriptor::new().with_endnotes_at_end(true));
    let para = doc.add_paragraph(Paragraph { notes: vec![note], ..Paragraph::new(Abs::raw(1000)) });
    let (mut layout, body) = setup(doc);
    let sect = layout.create_section(section, body, None).unwrap();
    layout.insert_content(para, sect, None).unwrap();
    layout.run();

    let column = layout.children(sect).unwrap()[0];
    let cont = layout.contains_ftn_cont(sect).unwrap().unwrap();
    assert_eq!(layout.node(cont).unwrap().upper(), Some(column));
    let ftn = layout.children(cont).unwrap()[0];
    let note_body = layout.children(ftn).unwrap()[0];
    assert_eq!(layout.find_last_content(sect, FindMode::Endnote).unwrap(), Some(note_body));
    assert!(!layout.is_superfluous(sect).unwrap());

    let mut layouter = Layouter::new();
    layout.collect_endnotes(sect, &mut layouter).unwrap();
    assert_eq!(layouter.endnotes(), &[ftn]);
    assert_eq!(layout.node(ftn).unwrap().upper(), None);

    layout.insert_endnotes(sect, &mut layouter).unwrap();
    assert!(!layouter.has_endnotes());
    let cont = layout.contains_ftn_cont(sect).unwrap().unwrap();
    assert_eq!(layout.node(ftn).unwrap().upper(), Some(cont));
}

#[test]
fn test_empty_section_is_dropped() {
    let mut doc = Document::new();
    let section = doc.add_section(SectionDescriptor::new());
    let (mut layout, body) = setup(doc);
    let sect = layout.create_section(section, body, None).unwrap();
    assert!(layout.is_superfluous(sect).unwrap());
    layout.run();
    assert_eq!(layout.pending_deletions(), 0);
    assert!(layout.node(sect).is_err());
    assert!(layout.children(body).unwrap().is_empty());
}

#[test]
fn test_invalid_requests_are_refused() {
    let mut doc = Document::new();
    let section = doc.add_section(SectionDescriptor::new());
    let hidden = doc.add_section(SectionDescriptor::new().with_area(NodeArea::Undo));
    let para = doc.add_paragraph(Paragraph::new(Abs::raw(1000)));
    let (mut layout, body) = setup(doc);
    let content = layout.insert_content(para, body, None).unwrap();

    let err = layout.create_section(SectionId(42), body, None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownItem);
    let err = layout.create_section(section, content, None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::WrongKind);
    let err = layout.create_section(hidden, body, None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
    assert!(!err.hints.is_empty());
    assert_eq!(layout.follow(content).unwrap_err().kind, ErrorKind::WrongKind);
    assert_eq!(layout.append_page(PageDescId(3)).unwrap_err().kind, ErrorKind::UnknownItem);

    layout.remove_content(content).unwrap();
    assert_eq!(layout.node(content).unwrap_err().kind, ErrorKind::StaleHandle);
    let err = layout.insert_content(para, content, None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::StaleHandle);
}

#[test]
fn test_layout_from_fixture() {
    let settings = Settings::from_toml("max-passes = 16\n").unwrap();
    assert_eq!(settings.max_passes, 16);
    assert!(Settings::from_toml("max-pages = 3").is_err());

    let doc: Document = serde_json::from_str(
        r#"{
            "sections": [{ "columns": 2, "gutter": 200 }],
            "paragraphs": [{ "height": 3000 }, { "height": 3000 }],
            "page-descs": [{
                "width": 10000, "height": 12000,
                "margin-top": 1000, "margin-bottom": 1000,
                "margin-left": 1000, "margin-right": 1000
            }]
        }"#,
    )
    .unwrap();
    assert!(doc.section(SectionId(0)).is_some_and(|d| d.balance));

    let mut layout = Layout::new(doc, settings);
    let page = layout.append_page(PageDescId(0)).unwrap();
    let body = layout.page_body(page).unwrap();
    let sect = layout.create_section(SectionId(0), body, None).unwrap();
    for p in [ParagraphId(0), ParagraphId(1)] {
        layout.insert_content(p, sect, None).unwrap();
    }
    let passes = layout.run();
    assert!(passes <= 16);
    assert!(!layout.is_balanced_section(sect).unwrap());
    assert_eq!(height(&layout, sect), Abs::raw(3000));
    assert_eq!(layout.pages().len(), 1);
    assert!(layout.warnings().is_empty());
}
