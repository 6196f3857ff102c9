//! A document unit: one URL, one DOM, one CSS rule set, one CSP, one JS
//! context. Grounded on the original implementation's `content/frame.py`.
//! A `Tab` owns a tree of these (the root frame plus one per `<iframe>`);
//! the split keeps `Tab` itself free of DOM-shaped state so it can host
//! iframes without growing new document-level fields.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::str::FromStr;
use std::sync::Arc;

use eframe::egui::Context as EguiContext;
use lazy_static::lazy_static;

use crate::css_parser::CssParser;
use crate::csp::ContentSecurityPolicy;
use crate::dom::{tree_to_list, NodeRef, NodeType};
use crate::draw::DrawCommand;
use crate::html_parser::HtmlParser;
use crate::js_context::JsContext;
use crate::layout::{self, LayoutRef};
use crate::network::RequestType;
use crate::selector::Selector;
use crate::services::Services;
use crate::tab::Tab;
use crate::url::Url;

lazy_static! {
    static ref DEFAULT_STYLE_SHEET: Vec<(Selector, BTreeMap<String, String>)> =
        CssParser::new(include_str!("../assets/browser.css")).parse().expect("built-in stylesheet must parse");

    static ref INHERITED_PROPERTIES: BTreeMap<&'static str, &'static str> = BTreeMap::from([
        ("color", "black"),
        ("font-size", "16px"),
        ("font-weight", "normal"),
        ("font-style", "normal"),
    ]);
}

pub type FrameRef = Rc<RefCell<Frame>>;

pub struct Frame {
    pub url: Option<Url>,
    pub nodes: Option<NodeRef>,
    pub rules: Vec<(Selector, BTreeMap<String, String>)>,
    pub csp: Option<ContentSecurityPolicy>,
    pub js_context: Option<JsContext>,
    pub layout_root: Option<LayoutRef>,
    pub display_list: Vec<DrawCommand>,
    pub child_frames: Vec<FrameRef>,
    pub parent_frame: Option<Weak<RefCell<Frame>>>,
    pub tab: Weak<RefCell<Tab>>,
    pub services: Arc<Services>,
    needs_render: bool,
}

impl Frame {
    pub fn new_root(tab: Weak<RefCell<Tab>>, services: Arc<Services>) -> FrameRef {
        Rc::new(RefCell::new(Frame {
            url: None,
            nodes: None,
            rules: Vec::new(),
            csp: None,
            js_context: None,
            layout_root: None,
            display_list: Vec::new(),
            child_frames: Vec::new(),
            parent_frame: None,
            tab,
            services,
            needs_render: false,
        }))
    }

    pub fn new_child(parent: &FrameRef) -> FrameRef {
        let (tab, services) = {
            let p = parent.borrow();
            (p.tab.clone(), p.services.clone())
        };
        let child = Rc::new(RefCell::new(Frame {
            url: None,
            nodes: None,
            rules: Vec::new(),
            csp: None,
            js_context: None,
            layout_root: None,
            display_list: Vec::new(),
            child_frames: Vec::new(),
            parent_frame: Some(Rc::downgrade(parent)),
            tab,
            services,
            needs_render: false,
        }));
        child
    }

    pub fn set_needs_render(&mut self) {
        self.needs_render = true;
    }

    pub fn needs_render(&self) -> bool {
        self.needs_render
    }

    /// Fetch-parse-cascade-script-iframe pipeline, grounded on
    /// `Frame.load` in the original implementation. Redirects are already
    /// resolved by `http::fetch`/`Url::request`; a failed load falls back
    /// to `about:blank` the same way the URL layer does for missing
    /// `Location` headers.
    pub fn load(self_ref: &FrameRef, raw_url: &str) {
        Frame::load_with_payload(self_ref, raw_url, None);
    }

    /// Same pipeline as [`Frame::load`], but POSTs `payload` (used by form
    /// submission) instead of issuing a plain GET.
    pub fn load_with_payload(self_ref: &FrameRef, raw_url: &str, payload: Option<String>) {
        let referrer = self_ref.borrow().url.clone();
        let resolved = match &referrer {
            Some(base) => base.resolve(raw_url).unwrap_or_else(|_| Url::parse("about:blank").unwrap()),
            None => Url::parse(raw_url).unwrap_or_else(|_| Url::parse("about:blank").unwrap()),
        };

        let services = self_ref.borrow().services.clone();

        let response = services
            .network
            .request_sync(&services, resolved.clone(), RequestType::PageLoad, referrer.clone(), payload)
            .unwrap_or_else(|_| crate::http::Response { status: 200, headers: Default::default(), body: String::new(), csp: None });

        {
            let mut f = self_ref.borrow_mut();
            f.url = Some(resolved.clone());
            f.csp = response.csp.clone();
            f.display_list.clear();
            f.layout_root = None;
            f.child_frames.clear();
        }

        let root = HtmlParser::new(response.body).parse();
        self_ref.borrow_mut().nodes = Some(root.clone());

        let mut rules = DEFAULT_STYLE_SHEET.clone();
        let mut stylesheet_links = Vec::new();
        let mut script_srcs_and_inline = Vec::new();
        let mut iframe_nodes = Vec::new();
        let mut flat = Vec::new();
        tree_to_list(&root, &mut flat);
        for node in &flat {
            let n = node.borrow();
            if let NodeType::Element(e) = &n.node_type {
                match e.tag.as_str() {
                    "link" if e.attributes.get("rel").map(|s| s.as_str()) == Some("stylesheet") => {
                        if let Some(href) = e.attributes.get("href") {
                            stylesheet_links.push(href.clone());
                        }
                    }
                    "script" => {
                        script_srcs_and_inline.push((e.attributes.get("src").cloned(), node.clone()));
                    }
                    "iframe" => {
                        iframe_nodes.push(node.clone());
                    }
                    _ => {}
                }
            }
        }

        let csp = self_ref.borrow().csp.clone();

        // Stylesheets load concurrently (dispatched up front, collected in
        // order) honoring CSP `style-src`.
        let mut receivers = Vec::new();
        for href in &stylesheet_links {
            if let Some(csp) = &csp {
                if !csp.allows_style(href) {
                    continue;
                }
            }
            if let Ok(style_url) = resolved.resolve(href) {
                let rx = services.network.dispatch(&services, style_url, RequestType::Stylesheet, Some(resolved.clone()), None);
                receivers.push(rx);
            }
        }
        for rx in receivers {
            if let Ok(resp) = rx.recv() {
                if let Ok(r) = resp.result {
                    if let Ok(mut parsed) = CssParser::new(&r.body).parse() {
                        rules.append(&mut parsed);
                    }
                }
            }
        }

        rules.sort_by_key(|(selector, _)| selector.priority());
        style(&root, &rules);

        {
            let mut f = self_ref.borrow_mut();
            f.rules = rules;
        }

        // First paint before scripts run, matching the original pipeline.
        Frame::render(self_ref, None, layout::WIDTH);

        let frame_id = services.next_frame_id();
        let js = JsContext::new(Rc::downgrade(self_ref), frame_id).expect("embedded JS runtime must initialize");
        self_ref.borrow_mut().js_context = Some(js);
        if let Some(js) = self_ref.borrow().js_context.as_ref() {
            let _ = js.setup_frame_hierarchy(
                self_ref.borrow().parent_frame.as_ref().and_then(|p| p.upgrade()).and_then(|p| p.borrow().js_context.as_ref().map(|c| c.frame_id)),
                top_frame_id(self_ref),
            );
        }
        if let Some(parent) = self_ref.borrow().parent_frame.as_ref().and_then(|p| p.upgrade()) {
            if let Some(parent_js) = parent.borrow().js_context.as_ref() {
                let _ = parent_js.add_child_frame(frame_id);
            }
        }

        // Scripts run synchronously, in document order, each honoring
        // CSP `script-src`.
        for (src, node) in &script_srcs_and_inline {
            let code = match src {
                Some(href) => {
                    if let Some(csp) = &csp {
                        if !csp.allows_script(href) {
                            continue;
                        }
                    }
                    let Ok(script_url) = resolved.resolve(href) else { continue };
                    match services.network.request_sync(&services, script_url, RequestType::Script, Some(resolved.clone()), None) {
                        Ok(r) => r.body,
                        Err(_) => continue,
                    }
                }
                None => {
                    if let Some(csp) = &csp {
                        if !csp.allows_inline_script() {
                            continue;
                        }
                    }
                    inline_text(node)
                }
            };
            if let Some(js) = self_ref.borrow().js_context.as_ref() {
                js.run(src.as_deref().unwrap_or("inline"), &code);
            }
        }

        // iframes load recursively, wiring parent/top/frames hierarchy.
        for iframe in iframe_nodes {
            let src = iframe.borrow().attr("src").map(|s| s.to_string());
            let Some(src) = src else { continue };
            if let Some(csp) = &csp {
                if !csp.allows_frame(&src) {
                    continue;
                }
            }
            let child = Frame::new_child(self_ref);
            Frame::load(&child, &src);
            let child_frame_id = child.borrow().js_context.as_ref().map(|c| c.frame_id);
            if let Some(id) = child_frame_id {
                if let NodeType::Element(e) = &mut iframe.borrow_mut().node_type {
                    e.child_frame = Some(id);
                }
            }
            self_ref.borrow_mut().child_frames.push(child);
        }

        Frame::render(self_ref, None, layout::WIDTH);
    }

    /// Re-runs layout and paint against the current DOM/style state. Called
    /// after the initial load and whenever `innerHTML` mutation or a resize
    /// marks the frame dirty.
    pub fn render(self_ref: &FrameRef, ctx: Option<&EguiContext>, width: f32) {
        let Some(root) = self_ref.borrow().nodes.clone() else { return };
        let owned_ctx;
        let ctx = match ctx {
            Some(c) => c,
            None => {
                owned_ctx = EguiContext::default();
                &owned_ctx
            }
        };
        let layout_root = layout::layout_document(root, ctx, width);
        let mut display_list = Vec::new();
        layout::paint_with_ctx(&layout_root, ctx, &mut display_list);

        let mut f = self_ref.borrow_mut();
        f.layout_root = Some(layout_root);
        f.display_list = display_list;
        f.needs_render = false;
    }

    /// Document height in points, used by the tab to clamp scroll and by
    /// the compositor to size the scrollbar thumb.
    pub fn document_height(&self) -> f32 {
        self.layout_root.as_ref().map(|r| r.borrow().rect.height()).unwrap_or(0.0)
    }

    /// This frame's local display list plus every child `<iframe>`'s,
    /// translated into this frame's coordinate space and clipped to the
    /// iframe's layout box. Straddling commands are kept whole; commands
    /// entirely outside the box are dropped (rect-based clipping only).
    pub fn composed_display_list(&self) -> Vec<DrawCommand> {
        let mut out = self.display_list.clone();
        for child in &self.child_frames {
            let child_id = child.borrow().js_context.as_ref().map(|c| c.frame_id);
            let Some(child_id) = child_id else { continue };
            let Some(rect) = self.iframe_rect_for(child_id) else { continue };
            let child_commands = child.borrow().composed_display_list();
            for cmd in child_commands {
                let translated = cmd.translated(rect.left, rect.top);
                if translated.bottom() < rect.top || translated.top() > rect.bottom {
                    continue;
                }
                out.push(translated);
            }
        }
        out
    }

    fn iframe_rect_for(&self, child_frame_id: u64) -> Option<crate::rect::Rect> {
        let layout_root = self.layout_root.as_ref()?;
        find_iframe_rect(layout_root, child_frame_id)
    }
}

fn find_iframe_rect(node: &LayoutRef, child_frame_id: u64) -> Option<crate::rect::Rect> {
    let n = node.borrow();
    if let Some(dom) = &n.dom {
        if let NodeType::Element(e) = &dom.borrow().node_type {
            if e.tag == "iframe" && e.child_frame == Some(child_frame_id) {
                return Some(n.rect);
            }
        }
    }
    for child in &n.children {
        if let Some(rect) = find_iframe_rect(child, child_frame_id) {
            return Some(rect);
        }
    }
    None
}

fn top_frame_id(frame: &FrameRef) -> Option<u64> {
    let mut current = frame.clone();
    loop {
        let parent = current.borrow().parent_frame.as_ref().and_then(|p| p.upgrade());
        match parent {
            Some(p) => current = p,
            None => break,
        }
    }
    if Rc::ptr_eq(&current, frame) {
        None
    } else {
        current.borrow().js_context.as_ref().map(|c| c.frame_id)
    }
}

fn inline_text(node: &NodeRef) -> String {
    let n = node.borrow();
    n.children.iter().filter_map(|c| match &c.borrow().node_type {
        NodeType::Text(t) => Some(t.clone()),
        NodeType::Element(_) => None,
    }).collect::<Vec<_>>().join("")
}

/// Cascades `rules` (already sorted ascending by selector priority) over
/// `node` and its descendants, applying inheritance and inline `style`
/// attributes last, and resolving percentage `font-size` against the
/// parent's resolved size. Grounded on `Tab::style` in the teacher's
/// `tab.rs`.
fn style(node: &NodeRef, rules: &[(Selector, BTreeMap<String, String>)]) {
    let parent = node.borrow().parent();

    let mut resolved = BTreeMap::new();
    for (prop, default) in INHERITED_PROPERTIES.iter() {
        let value = match &parent {
            Some(p) => p.borrow().style.get(*prop).cloned().unwrap_or_else(|| default.to_string()),
            None => default.to_string(),
        };
        resolved.insert(prop.to_string(), value);
    }

    for (selector, declarations) in rules {
        if selector.matches(node) {
            for (k, v) in declarations {
                resolved.insert(k.clone(), v.clone());
            }
        }
    }

    let inline_style = match &node.borrow().node_type {
        NodeType::Element(e) => e.attributes.get("style").cloned(),
        NodeType::Text(_) => None,
    };
    if let Some(style_str) = inline_style {
        if let Ok(pairs) = CssParser::new(&style_str).body() {
            for (k, v) in pairs {
                resolved.insert(k, v);
            }
        }
    }

    if let Some(size) = resolved.get("font-size").cloned() {
        if let Some(pct) = size.strip_suffix('%') {
            if let Ok(pct) = f32::from_str(pct) {
                let parent_px = parent
                    .as_ref()
                    .and_then(|p| p.borrow().style.get("font-size").cloned())
                    .unwrap_or_else(|| INHERITED_PROPERTIES["font-size"].to_string());
                if let Ok(parent_px) = f32::from_str(parent_px.trim_end_matches("px")) {
                    resolved.insert("font-size".to_string(), format!("{}px", parent_px * pct / 100.0));
                }
            }
        } else if let Some(em) = size.strip_suffix("em") {
            if let Ok(em) = f32::from_str(em) {
                let parent_px = parent
                    .as_ref()
                    .and_then(|p| p.borrow().style.get("font-size").cloned())
                    .unwrap_or_else(|| INHERITED_PROPERTIES["font-size"].to_string());
                if let Ok(parent_px) = f32::from_str(parent_px.trim_end_matches("px")) {
                    resolved.insert("font-size".to_string(), format!("{}px", parent_px * em));
                }
            }
        }
    }

    node.borrow_mut().style = resolved;

    let children = node.borrow().children.clone();
    for child in children {
        style(&child, rules);
    }
}
