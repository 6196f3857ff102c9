//! The mediator between the UI thread and a frame tree: owns the
//! `TaskRunner`, scroll offset, history stack, focus, and viewport size,
//! and delegates DOM/CSS/layout/JS ownership to the root `Frame`. Grounded
//! on the original implementation's `content/tab.py`.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::commit::CommitData;
use crate::dom::{NodeRef, NodeType};
use crate::frame::{Frame, FrameRef};
use crate::layout::{self, LayoutRef, HEIGHT, VSTEP};
use crate::services::Services;
use crate::task::TaskRunner;

pub(crate) const SCROLL_STEP: f32 = 100.0;

pub type TabRef = Rc<RefCell<Tab>>;

pub struct Tab {
    pub id: u64,
    pub services: Arc<Services>,
    pub root_frame: FrameRef,
    pub frames: Vec<FrameRef>,
    pub task_runner: TaskRunner,
    pub scroll: f32,
    pub history: Vec<String>,
    pub focus: Option<NodeRef>,
    pub width: f32,
    pub height: f32,
}

impl Tab {
    pub fn new(id: u64, services: Arc<Services>) -> TabRef {
        Rc::new_cyclic(|weak: &std::rc::Weak<RefCell<Tab>>| {
            let root_frame = Frame::new_root(weak.clone(), services.clone());
            RefCell::new(Tab {
                id,
                services,
                frames: vec![root_frame.clone()],
                root_frame,
                task_runner: TaskRunner::new(),
                scroll: 0.0,
                history: Vec::new(),
                focus: None,
                width: layout::WIDTH,
                height: HEIGHT,
            })
        })
    }

    /// Discards the old frame tree and builds a fresh root `Frame`,
    /// mirroring `Tab.load` discarding `self.nodes`/`self.document` in the
    /// original. Pushes onto `history` unless `push_history` is false (used
    /// by `go_back`).
    pub fn load(self_ref: &TabRef, url: &str, push_history: bool) {
        Tab::load_with_payload(self_ref, url, None, push_history);
    }

    pub fn load_with_payload(self_ref: &TabRef, url: &str, payload: Option<String>, push_history: bool) {
        if push_history {
            let current = self_ref.borrow().root_frame.borrow().url.as_ref().map(|u| u.to_string());
            if let Some(current) = current {
                self_ref.borrow_mut().history.push(current);
            }
        }
        Tab::load_fresh_frame(self_ref, url, payload);
    }

    fn load_fresh_frame(self_ref: &TabRef, url: &str, payload: Option<String>) {
        let services = self_ref.borrow().services.clone();
        let weak = Rc::downgrade(self_ref);
        let fresh_root = Frame::new_root(weak, services);

        {
            let mut tab = self_ref.borrow_mut();
            tab.root_frame = fresh_root.clone();
            tab.frames = vec![fresh_root.clone()];
            tab.scroll = 0.0;
            tab.focus = None;
        }

        Frame::load_with_payload(&fresh_root, url, payload);
        register_frames(self_ref, &fresh_root);
    }

    pub fn go_back(self_ref: &TabRef) {
        let previous = self_ref.borrow_mut().history.pop();
        if let Some(url) = previous {
            Tab::load(self_ref, &url, false);
        }
    }

    /// Runs at most one queued `Task` and drains any JS callbacks (timer
    /// fires, XHR completions, delivered `postMessage`s) handed back from
    /// background threads for every frame in this tab. Call once per tick
    /// from the tab's main thread.
    pub fn tick(&mut self) {
        self.task_runner.run_one();
        for frame in &self.frames {
            if let Some(js) = frame.borrow().js_context.as_ref() {
                js.poll_callbacks();
            }
        }
    }

    pub fn scroll_down(&mut self) {
        let max_y = (self.root_frame.borrow().document_height() + 2.0 * VSTEP - self.height).max(0.0);
        self.scroll = (self.scroll + SCROLL_STEP).min(max_y);
    }

    pub fn scroll_up(&mut self) {
        self.scroll = (self.scroll - SCROLL_STEP).max(0.0);
    }

    pub fn scroll_to(&mut self, y: f32) {
        let max_y = (self.root_frame.borrow().document_height() + 2.0 * VSTEP - self.height).max(0.0);
        self.scroll = y.clamp(0.0, max_y);
    }

    pub fn resize(self_ref: &TabRef, width: f32, height: f32) {
        let mut tab = self_ref.borrow_mut();
        tab.width = width;
        tab.height = height;
        for frame in &tab.frames {
            frame.borrow_mut().set_needs_render();
        }
    }

    /// Walks the root frame's layout tree for the element under
    /// `(x, y + scroll)`, then walks up from there looking for an `<a
    /// href>` (navigate), `<input>` (focus), or a `<button>` inside a
    /// `<form>` (submit). Mirrors `Tab.click` in the original.
    pub fn click(self_ref: &TabRef, x: f32, y: f32) {
        let (layout_root, scroll) = {
            let tab = self_ref.borrow();
            (tab.root_frame.borrow().layout_root.clone(), tab.scroll)
        };
        let Some(layout_root) = layout_root else { return };

        let target_y = y + scroll;
        let mut hits = Vec::new();
        collect_hits(&layout_root, x, target_y, &mut hits);
        let Some(hit) = hits.last().cloned() else { return };
        let Some(mut current) = hit.borrow().dom.clone() else { return };

        loop {
            let (tag, href, is_input, is_button) = {
                let n = current.borrow();
                match &n.node_type {
                    NodeType::Element(e) => (
                        e.tag.clone(),
                        e.attributes.get("href").cloned(),
                        e.tag == "input",
                        e.tag == "button",
                    ),
                    NodeType::Text(_) => (String::new(), None, false, false),
                }
            };

            if tag == "a" {
                if let Some(href) = href {
                    let root_frame = self_ref.borrow().root_frame.clone();
                    if !dispatch_event(&root_frame, "click", &current) {
                        return;
                    }
                    Tab::load(self_ref, &href, true);
                    return;
                }
            } else if is_input {
                let root_frame = self_ref.borrow().root_frame.clone();
                if !dispatch_event(&root_frame, "click", &current) {
                    return;
                }
                clear_focus(self_ref);
                if let NodeType::Element(e) = &mut current.borrow_mut().node_type {
                    e.attributes.insert("value".to_string(), String::new());
                    e.is_focus = true;
                }
                self_ref.borrow_mut().focus = Some(current.clone());
                self_ref.borrow().root_frame.borrow_mut().set_needs_render();
                return;
            } else if is_button {
                if let Some(form) = find_ancestor_form(&current) {
                    let root_frame = self_ref.borrow().root_frame.clone();
                    if !dispatch_event(&root_frame, "click", &current) {
                        return;
                    }
                    Tab::submit_form(self_ref, &form);
                    return;
                }
            }

            let parent = current.borrow().parent();
            match parent {
                Some(p) => current = p,
                None => break,
            }
        }
    }

    /// Collects every `<input name=…>` descendant of `form`, percent-encodes
    /// name and value (matching `urllib.parse.quote` in the original), joins
    /// as `application/x-www-form-urlencoded`, and POSTs to the form's
    /// resolved `action`.
    pub fn submit_form(self_ref: &TabRef, form: &NodeRef) {
        let mut flat = Vec::new();
        crate::dom::tree_to_list(form, &mut flat);

        let mut pairs = Vec::new();
        for node in &flat {
            let n = node.borrow();
            if let NodeType::Element(e) = &n.node_type {
                if e.tag == "input" {
                    if let Some(name) = e.attributes.get("name") {
                        let value = e.attributes.get("value").cloned().unwrap_or_default();
                        pairs.push(format!(
                            "{}={}",
                            utf8_percent_encode(name, NON_ALPHANUMERIC),
                            utf8_percent_encode(&value, NON_ALPHANUMERIC)
                        ));
                    }
                }
            }
        }
        let body = pairs.join("&");

        let action = match &form.borrow().node_type {
            NodeType::Element(e) => e.attributes.get("action").cloned().unwrap_or_default(),
            NodeType::Text(_) => return,
        };

        let referrer = self_ref.borrow().root_frame.borrow().url.clone();
        let Some(referrer) = referrer else { return };
        let Ok(action_url) = referrer.resolve(&action) else { return };

        self_ref.borrow_mut().history.push(referrer.to_string());

        let services = self_ref.borrow().services.clone();
        let weak = Rc::downgrade(self_ref);
        let fresh_root = Frame::new_root(weak, services);
        Frame::load_with_payload(&fresh_root, &action_url.to_string(), Some(body));

        let mut tab = self_ref.borrow_mut();
        tab.root_frame = fresh_root.clone();
        tab.frames = vec![fresh_root];
        tab.scroll = 0.0;
    }

    pub fn keypress(&mut self, ch: char) {
        let Some(focus) = self.focus.clone() else { return };
        if !dispatch_event(&self.root_frame, "keydown", &focus) {
            return;
        }
        if let NodeType::Element(e) = &mut focus.borrow_mut().node_type {
            let mut value = e.attributes.get("value").cloned().unwrap_or_default();
            value.push(ch);
            e.attributes.insert("value".to_string(), value);
        }
        self.root_frame.borrow_mut().set_needs_render();
    }

    pub fn backspace(&mut self) {
        let Some(focus) = self.focus.clone() else { return };
        if let NodeType::Element(e) = &mut focus.borrow_mut().node_type {
            let mut value = e.attributes.get("value").cloned().unwrap_or_default();
            value.pop();
            e.attributes.insert("value".to_string(), value);
        }
        self.root_frame.borrow_mut().set_needs_render();
    }

    /// Renders any frame still marked dirty, then packages the composed
    /// display list for the compositor, mirroring `Tab._commit`.
    pub fn commit(self_ref: &TabRef) -> CommitData {
        let needs_render = self_ref.borrow().frames.iter().any(|f| f.borrow().needs_render());
        if needs_render {
            let width = self_ref.borrow().width;
            for frame in self_ref.borrow().frames.clone() {
                if frame.borrow().needs_render() {
                    Frame::render(&frame, None, width);
                }
            }
        }

        let tab = self_ref.borrow();
        CommitData {
            display_list: tab.root_frame.borrow().composed_display_list(),
            document_height: tab.root_frame.borrow().document_height(),
            scroll: tab.scroll,
            url: tab.root_frame.borrow().url.as_ref().map(|u| u.to_string()),
            tab_id: tab.id,
        }
    }
}

/// Dispatches a JS event to `elt` through the root frame's `JsContext`,
/// returning whether the default action should proceed. Frames with no
/// `JsContext` (unscripted pages) always allow the default action.
fn dispatch_event(root_frame: &FrameRef, event_type: &str, elt: &NodeRef) -> bool {
    root_frame.borrow().js_context.as_ref().map(|js| js.dispatch_event(event_type, elt)).unwrap_or(true)
}

fn clear_focus(tab: &TabRef) {
    if let Some(focus) = tab.borrow().focus.clone() {
        if let NodeType::Element(e) = &mut focus.borrow_mut().node_type {
            e.is_focus = false;
        }
    }
}

fn find_ancestor_form(node: &NodeRef) -> Option<NodeRef> {
    let mut current = node.borrow().parent();
    while let Some(n) = current {
        if let NodeType::Element(e) = &n.borrow().node_type {
            if e.tag == "form" {
                return Some(n.clone());
            }
        }
        current = n.borrow().parent();
    }
    None
}

fn collect_hits(node: &LayoutRef, x: f32, y: f32, out: &mut Vec<LayoutRef>) {
    let contains = node.borrow().rect.contains_point(x, y);
    if contains {
        out.push(node.clone());
    }
    for child in &node.borrow().children {
        collect_hits(child, x, y, out);
    }
}

fn register_frames(tab: &TabRef, frame: &FrameRef) {
    for child in frame.borrow().child_frames.clone() {
        tab.borrow_mut().frames.push(child.clone());
        register_frames(tab, &child);
    }
}
