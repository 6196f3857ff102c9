//! The layout tree: `Document` -> `Block` -> (`Block`s | `Line`s of `Text`/
//! `Input`), grounded on the original implementation's
//! `layout/document_layout.py`, `layout/block_layout.py`,
//! `layout/line_layout.py`, `layout/text_layout.py` and
//! `layout/input_layout.py`. Font measurement goes through egui's
//! `Galley` (teacher's approach in the original `tab.rs`) rather than the
//! original's Tk-style font metrics object.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use eframe::egui::{Color32, Context, FontFamily, FontId, Galley};

use crate::dom::{NodeRef, NodeType};
use crate::draw::{DrawCommand, DrawLine, DrawRect, DrawText};
use crate::rect::Rect;

pub const HSTEP: f32 = 13.0;
pub const VSTEP: f32 = 17.0;
pub const WIDTH: f32 = 800.0;
pub const HEIGHT: f32 = 600.0;
pub const INPUT_WIDTH_PX: f32 = 200.0;

const BLOCK_ELEMENTS: [&str; 37] = [
    "html", "body", "article", "section", "nav", "aside", "h1", "h2", "h3", "h4", "h5", "h6", "hgroup", "header",
    "footer", "address", "p", "hr", "pre", "blockquote", "ol", "ul", "menu", "li", "dl", "dt", "dd", "figure",
    "figcaption", "main", "div", "table", "form", "fieldset", "legend", "details", "summary",
];

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Block,
    Inline,
}

pub enum LayoutKind {
    Document,
    Block,
    Line,
    Text { word: String, galley: Option<Arc<Galley>> },
    Input,
}

pub struct LayoutNode {
    pub kind: LayoutKind,
    pub dom: Option<NodeRef>,
    pub parent: Option<Weak<RefCell<LayoutNode>>>,
    pub previous: Option<Weak<RefCell<LayoutNode>>>,
    pub children: Vec<Rc<RefCell<LayoutNode>>>,
    pub rect: Rect,
}

pub type LayoutRef = Rc<RefCell<LayoutNode>>;

fn new_node(kind: LayoutKind, dom: Option<NodeRef>, parent: Option<&LayoutRef>, previous: Option<&LayoutRef>) -> LayoutRef {
    Rc::new(RefCell::new(LayoutNode {
        kind,
        dom,
        parent: parent.map(Rc::downgrade),
        previous: previous.map(Rc::downgrade),
        children: Vec::new(),
        rect: Rect::new(0.0, 0.0, 0.0, 0.0),
    }))
}

/// Builds and lays out the whole document tree for `dom_root` within
/// `width`. Mirrors `DocumentLayout.layout`.
pub fn layout_document(dom_root: NodeRef, ctx: &Context, width: f32) -> LayoutRef {
    let doc = new_node(LayoutKind::Document, None, None, None);
    doc.borrow_mut().rect = Rect::from_pos_size(HSTEP, VSTEP, width - 2.0 * HSTEP, 0.0);

    let child = new_node(LayoutKind::Block, Some(dom_root), Some(&doc), None);
    doc.borrow_mut().children.push(child.clone());
    layout_block(&child, ctx);

    let child_height = child.borrow().rect.height();
    let mut doc_mut = doc.borrow_mut();
    doc_mut.rect = Rect::from_pos_size(doc_mut.rect.left, doc_mut.rect.top, doc_mut.rect.width(), child_height);
    drop(doc_mut);
    doc
}

fn layout_mode(dom: &NodeRef) -> Mode {
    let dom_ref = dom.borrow();
    match &dom_ref.node_type {
        NodeType::Text(_) => Mode::Inline,
        NodeType::Element(_) => {
            let has_block_child = dom_ref.children.iter().any(|c| {
                let c = c.borrow();
                matches!(&c.node_type, NodeType::Element(e) if BLOCK_ELEMENTS.contains(&e.tag.as_str()))
            });
            if has_block_child {
                Mode::Block
            } else if !dom_ref.children.is_empty() || matches!(dom_ref.tag(), Some("input") | Some("button")) {
                Mode::Inline
            } else {
                Mode::Block
            }
        }
    }
}

fn layout_block(node: &LayoutRef, ctx: &Context) {
    let parent = node.borrow().parent.as_ref().and_then(Weak::upgrade).expect("block has parent");
    let x = parent.borrow().rect.left;
    let width = parent.borrow().rect.width();

    let y = match node.borrow().previous.as_ref().and_then(Weak::upgrade) {
        Some(prev) => prev.borrow().rect.bottom,
        None => parent.borrow().rect.top,
    };
    node.borrow_mut().rect = Rect::from_pos_size(x, y, width, 0.0);

    let dom = node.borrow().dom.clone().expect("block has dom node");
    let mode = layout_mode(&dom);

    if mode == Mode::Block {
        let mut previous: Option<LayoutRef> = None;
        for child_dom in dom.borrow().children.clone() {
            let child = new_node(LayoutKind::Block, Some(child_dom), Some(node), previous.as_ref());
            node.borrow_mut().children.push(child.clone());
            previous = Some(child);
        }
        for child in node.borrow().children.clone() {
            layout_block(&child, ctx);
        }
        let height: f32 = node.borrow().children.iter().map(|c| c.borrow().rect.height()).sum();
        let mut n = node.borrow_mut();
        n.rect = Rect::from_pos_size(n.rect.left, n.rect.top, n.rect.width(), height);
    } else {
        recurse_inline(node, &dom, ctx);
        for child in node.borrow().children.clone() {
            layout_line(&child);
        }
        let height: f32 = node.borrow().children.iter().map(|c| c.borrow().rect.height()).sum();
        let mut n = node.borrow_mut();
        n.rect = Rect::from_pos_size(n.rect.left, n.rect.top, n.rect.width(), height);
    }
}

fn recurse_inline(block: &LayoutRef, dom: &NodeRef, ctx: &Context) {
    new_line(block);
    recurse(block, dom, ctx);
}

fn recurse(block: &LayoutRef, dom: &NodeRef, ctx: &Context) {
    let dom_ref = dom.borrow();
    match &dom_ref.node_type {
        NodeType::Text(text) => {
            for word in text.split_whitespace() {
                add_word(block, dom, word, ctx);
            }
        }
        NodeType::Element(e) => {
            let tag = e.tag.clone();
            let children = dom_ref.children.clone();
            drop(dom_ref);
            match tag.as_str() {
                "br" => new_line(block),
                "input" | "button" => add_input(block, dom, ctx),
                _ => {
                    for child in children {
                        recurse(block, &child, ctx);
                    }
                }
            }
        }
    }
}

fn style_of(dom: &NodeRef, key: &str, default: &str) -> String {
    dom.borrow().style.get(key).cloned().unwrap_or_else(|| default.to_string())
}

fn resolved_font(dom: &NodeRef, ctx: &Context) -> (FontId, f32) {
    let weight = style_of(dom, "font-weight", "normal");
    let style = style_of(dom, "font-style", "normal");
    let size_px: f32 = style_of(dom, "font-size", "16px").trim_end_matches("px").parse().unwrap_or(16.0);
    let size = (size_px * 0.75).round();

    let font_name = format!("sans{weight}{style}");
    let font_id = FontId::new(size, FontFamily::Name(Arc::from(font_name)));
    let space_galley = ctx.fonts_mut(|f| f.layout_no_wrap(" ".to_string(), font_id.clone(), Color32::BLACK));
    (font_id, space_galley.size().x)
}

fn measure(ctx: &Context, text: &str, font_id: &FontId) -> Arc<Galley> {
    ctx.fonts_mut(|f| f.layout_no_wrap(text.to_string(), font_id.clone(), Color32::BLACK))
}

fn add_word(block: &LayoutRef, dom: &NodeRef, word: &str, ctx: &Context) {
    let (font_id, space_width) = resolved_font(dom, ctx);
    let galley = measure(ctx, word, &font_id);
    let word_width = galley.size().x;

    let line = block.borrow().children.last().cloned().expect("new_line called before word");
    let previous = line.borrow().children.last().cloned();

    let line_rect = line.borrow().rect;
    let total_width = match &previous {
        Some(prev) => prev.borrow().rect.right + space_width + word_width,
        None => line_rect.left + word_width,
    };

    let (line, previous) = if total_width > line_rect.left + line_rect.width() {
        new_line(block);
        (block.borrow().children.last().cloned().unwrap(), None)
    } else {
        (line, previous)
    };

    let x = match &previous {
        Some(prev) => prev.borrow().rect.right + space_width,
        None => line.borrow().rect.left,
    };

    let text_node = new_node(LayoutKind::Text { word: word.to_string(), galley: Some(galley.clone()) }, Some(dom.clone()), Some(&line), previous.as_ref());
    text_node.borrow_mut().rect = Rect::from_pos_size(x, 0.0, word_width, galley.size().y);
    line.borrow_mut().children.push(text_node);
}

fn add_input(block: &LayoutRef, dom: &NodeRef, ctx: &Context) {
    let (font_id, space_width) = resolved_font(dom, ctx);
    let line_height = measure(ctx, "x", &font_id).size().y;

    let line = block.borrow().children.last().cloned().expect("new_line called before input");
    let previous = line.borrow().children.last().cloned();
    let line_rect = line.borrow().rect;

    let tentative_x = match &previous {
        Some(prev) => prev.borrow().rect.right + space_width,
        None => line_rect.left,
    };

    let (line, previous) = if tentative_x + INPUT_WIDTH_PX > line_rect.left + line_rect.width() {
        new_line(block);
        (block.borrow().children.last().cloned().unwrap(), None)
    } else {
        (line, previous)
    };

    let x = match &previous {
        Some(prev) => prev.borrow().rect.right + space_width,
        None => line.borrow().rect.left,
    };

    let input_node = new_node(LayoutKind::Input, Some(dom.clone()), Some(&line), previous.as_ref());
    input_node.borrow_mut().rect = Rect::from_pos_size(x, 0.0, INPUT_WIDTH_PX, line_height);
    line.borrow_mut().children.push(input_node);
}

fn new_line(block: &LayoutRef) {
    let dom = block.borrow().dom.clone();
    let previous = block.borrow().children.last().cloned();
    let line = new_node(LayoutKind::Line, dom, Some(block), previous.as_ref());
    let block_rect = block.borrow().rect;
    line.borrow_mut().rect = Rect::from_pos_size(block_rect.left, 0.0, block_rect.width(), 0.0);
    block.borrow_mut().children.push(line);
}

/// Positions a line's words/inputs on a shared baseline, mirroring
/// `LineLayout.layout`: `1.25 * ascent` down from the line top to the
/// baseline, `1.25 * descent` below it to the next line's top.
fn layout_line(line: &LayoutRef) {
    let y = match line.borrow().previous.as_ref().and_then(Weak::upgrade) {
        Some(prev) => prev.borrow().rect.bottom,
        None => line.borrow().parent.as_ref().and_then(Weak::upgrade).unwrap().borrow().rect.top,
    };

    let children = line.borrow().children.clone();
    if children.is_empty() {
        let mut l = line.borrow_mut();
        l.rect = Rect::from_pos_size(l.rect.left, y, l.rect.width(), 1.25 * VSTEP);
        return;
    }

    let (max_ascent, max_descent) = children
        .iter()
        .map(|c| {
            let c = c.borrow();
            match &c.kind {
                LayoutKind::Text { galley: Some(g), .. } => {
                    let glyph = &g.rows[0].row.glyphs[0];
                    (glyph.font_ascent, glyph.font_height - glyph.font_ascent)
                }
                _ => (c.rect.height(), 0.0),
            }
        })
        .fold((0.0_f32, 0.0_f32), |(a, d), (ca, cd)| (a.max(ca), d.max(cd)));

    let baseline = y + 1.25 * max_ascent;
    for child in &children {
        let mut c = child.borrow_mut();
        let top = baseline - max_ascent;
        let height = c.rect.height();
        c.rect = Rect::from_pos_size(c.rect.left, top, c.rect.width(), height);
    }

    let height = 1.25 * (max_ascent + max_descent);
    let mut l = line.borrow_mut();
    l.rect = Rect::from_pos_size(l.rect.left, y, l.rect.width(), height);
}

fn input_text(dom: &NodeRef) -> String {
    let dom_ref = dom.borrow();
    match dom_ref.tag() {
        Some("input") => dom_ref.attr("value").unwrap_or("").to_string(),
        Some("button") => {
            if dom_ref.children.len() == 1 {
                if let NodeType::Text(t) = &dom_ref.children[0].borrow().node_type {
                    return t.clone();
                }
            }
            String::new()
        }
        _ => String::new(),
    }
}

/// Paints a node and its children into `out`. `Input` boxes need a live
/// `Context` to re-measure their value text, so paint always takes one
/// rather than caching a galley at layout time (the value can change
/// without a relayout, e.g. while typing), grounded on `input_layout.py`'s
/// `paint`.
pub fn paint_with_ctx(node: &LayoutRef, ctx: &Context, out: &mut Vec<DrawCommand>) {
    let n = node.borrow();

    if let Some(dom) = &n.dom {
        if let Some(bg) = dom.borrow().style.get("background-color") {
            if bg != "transparent" {
                if let Ok(color) = csscolorparser::parse(bg) {
                    let [r, g, b, a] = color.to_rgba8();
                    out.push(DrawCommand::Rect(DrawRect { rect: n.rect, color: Color32::from_rgba_unmultiplied(r, g, b, a) }));
                }
            }
        }
    }

    match &n.kind {
        LayoutKind::Text { galley: Some(galley), .. } => {
            out.push(DrawCommand::Text(DrawText { x: n.rect.left, y: n.rect.top, galley: galley.clone() }));
        }
        LayoutKind::Input => {
            if let Some(dom) = &n.dom {
                let (font_id, _) = resolved_font(dom, ctx);
                let text = input_text(dom);
                let galley = measure(ctx, &text, &font_id);
                out.push(DrawCommand::Text(DrawText { x: n.rect.left, y: n.rect.top, galley: galley.clone() }));

                if dom.borrow().tag().is_some() && matches!(&dom.borrow().node_type, NodeType::Element(e) if e.is_focus) {
                    let cx = n.rect.left + galley.size().x;
                    out.push(DrawCommand::Line(DrawLine {
                        p0: eframe::egui::Pos2::new(cx, n.rect.top),
                        p1: eframe::egui::Pos2::new(cx, n.rect.bottom),
                        color: Color32::BLACK,
                        width: 1.0,
                    }));
                }
            }
        }
        _ => {}
    }

    drop(n);
    for child in &node.borrow().children {
        paint_with_ctx(child, ctx, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html_parser::HtmlParser;

    #[test]
    fn block_children_stack_with_nonoverlapping_y_ranges() {
        let ctx = Context::default();
        let dom = HtmlParser::new("<div><p>one</p><p>two</p></div>").parse();
        let doc = layout_document(dom, &ctx, WIDTH);
        let root_block = doc.borrow().children[0].clone();
        let div_block = root_block.borrow().children[0].clone();
        assert_eq!(div_block.borrow().children.len(), 2);

        let first = div_block.borrow().children[0].clone();
        let second = div_block.borrow().children[1].clone();
        assert!(second.borrow().rect.top >= first.borrow().rect.bottom - 0.001);
    }

    #[test]
    fn document_height_equals_root_block_height() {
        let ctx = Context::default();
        let dom = HtmlParser::new("<p>hello world</p>").parse();
        let doc = layout_document(dom, &ctx, WIDTH);
        let root_block = doc.borrow().children[0].clone();
        assert_eq!(doc.borrow().rect.height(), root_block.borrow().rect.height());
    }
}
