//! Per-frame JavaScript execution context, grounded on the original
//! implementation's `scripting/js_context.py`: every `Frame` owns one, each
//! with its own `frame_id`, its own `window`, and same-origin-gated access
//! to other frames' windows.
//!
//! The original embeds a Python interpreter (dukpy) and exports Python
//! methods as globals that `runtime.js` wires into `window`/`document`.
//! Here the interpreter is `rquickjs`; the wiring is the same shape, just
//! with Rust closures standing in for the exported methods.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use rquickjs::{Context, Function, Runtime};

use crate::css_parser::CssParser;
use crate::dom::{tree_to_list, NodeRef};
use crate::frame::Frame;

const RUNTIME_JS: &str = include_str!("../assets/runtime.js");

/// Messages a background thread (a `setTimeout` timer, an async XHR, a
/// cross-frame `postMessage`) hands back to the frame's own thread, where
/// the interpreter actually lives. `JsContext::poll_callbacks` drains these
/// once per tick, the same point the original schedules a `Task` from a
/// timer/network thread back onto `tab.task_runner`.
pub enum PendingCallback {
    Timeout { handle: u64 },
    XhrOnload { handle: u64, body: String },
    Message { data: String, origin: String, source_frame_id: u64 },
}

struct HandleTable {
    node_to_handle: HashMap<usize, u64>,
    handle_to_node: HashMap<u64, NodeRef>,
    next: u64,
}

impl HandleTable {
    fn new() -> Self {
        Self { node_to_handle: HashMap::new(), handle_to_node: HashMap::new(), next: 0 }
    }

    fn get_handle(&mut self, node: &NodeRef) -> u64 {
        let key = Rc::as_ptr(node) as usize;
        if let Some(handle) = self.node_to_handle.get(&key) {
            return *handle;
        }
        let handle = self.next;
        self.next += 1;
        self.node_to_handle.insert(key, handle);
        self.handle_to_node.insert(handle, node.clone());
        handle
    }

    fn resolve(&self, handle: u64) -> Option<NodeRef> {
        self.handle_to_node.get(&handle).cloned()
    }
}

pub struct JsContext {
    pub frame_id: u64,
    pub discarded: Rc<RefCell<bool>>,
    handles: Rc<RefCell<HandleTable>>,
    runtime: Runtime,
    context: Context,
    callback_tx: crossbeam_channel::Sender<PendingCallback>,
    callback_rx: crossbeam_channel::Receiver<PendingCallback>,
}

/// Finds the frame with the given `frame_id` among `frame` and its tab's
/// other frames, mirroring `_find_frame_by_id` in the original.
fn find_frame_by_id(frame: &Rc<RefCell<Frame>>, frame_id: u64) -> Option<Rc<RefCell<Frame>>> {
    let own_id = frame.borrow().js_context.as_ref().map(|c| c.frame_id);
    if own_id == Some(frame_id) {
        return Some(frame.clone());
    }
    let tab = frame.borrow().tab.upgrade()?;
    let tab = tab.borrow();
    tab.frames
        .iter()
        .find(|f| f.borrow().js_context.as_ref().map(|c| c.frame_id) == Some(frame_id))
        .cloned()
}

fn is_same_origin(a: &Rc<RefCell<Frame>>, b: &Rc<RefCell<Frame>>) -> bool {
    let a = a.borrow();
    let b = b.borrow();
    match (&a.url, &b.url) {
        (Some(au), Some(bu)) => au.origin() == bu.origin(),
        _ => false,
    }
}

impl JsContext {
    /// Builds a fresh interpreter for `frame`, exports the host bridge
    /// functions, evaluates `runtime.js`, and initializes `window`/`document`.
    /// `frame` must already be reachable as a `Weak` back-reference from the
    /// `Frame` that is about to own this context.
    pub fn new(frame: Weak<RefCell<Frame>>, frame_id: u64) -> rquickjs::Result<JsContext> {
        let runtime = Runtime::new()?;
        let context = Context::full(&runtime)?;
        let handles = Rc::new(RefCell::new(HandleTable::new()));
        let discarded = Rc::new(RefCell::new(false));
        let (callback_tx, callback_rx) = crossbeam_channel::unbounded();

        context.with(|ctx| -> rquickjs::Result<()> {
            let globals = ctx.globals();

            globals.set("log", Function::new(ctx.clone(), |msg: String| println!("{msg}"))?)?;

            {
                let frame = frame.clone();
                let handles = handles.clone();
                globals.set(
                    "querySelectorAll",
                    Function::new(ctx.clone(), move |target_frame_id: u64, selector_text: String| -> Vec<u64> {
                        let Some(self_frame) = frame.upgrade() else { return Vec::new() };
                        let target = find_frame_by_id(&self_frame, target_frame_id).unwrap_or_else(|| self_frame.clone());
                        if !Rc::ptr_eq(&target, &self_frame) && !is_same_origin(&self_frame, &target) {
                            println!("SecurityError: blocked cross-origin querySelectorAll");
                            return Vec::new();
                        }
                        let Some(root) = target.borrow().nodes.clone() else { return Vec::new() };
                        let Ok(selector) = CssParser::new(&selector_text).selector() else { return Vec::new() };
                        let mut out = Vec::new();
                        tree_to_list(&root, &mut out);
                        let mut handles = handles.borrow_mut();
                        out.into_iter()
                            .filter(|n| n.borrow().is_element() && selector.matches(n))
                            .map(|n| handles.get_handle(&n))
                            .collect()
                    })?,
                )?;
            }

            {
                let handles = handles.clone();
                globals.set(
                    "getAttribute",
                    Function::new(ctx.clone(), move |handle: u64, attr: String| -> String {
                        handles
                            .borrow()
                            .resolve(handle)
                            .and_then(|n| n.borrow().attr(&attr).map(|s| s.to_string()))
                            .unwrap_or_default()
                    })?,
                )?;
            }

            {
                let frame = frame.clone();
                let handles = handles.clone();
                globals.set(
                    "innerHTML_set",
                    Function::new(ctx.clone(), move |handle: u64, value: String| {
                        let doc = crate::html_parser::HtmlParser::new(format!("<html><body>{value}</body></html>")).parse();
                        let body = doc.borrow().children.first().cloned();
                        let Some(body) = body else { return };
                        let new_children = body.borrow().children.clone();
                        let Some(elt) = handles.borrow().resolve(handle) else { return };
                        for child in &new_children {
                            child.borrow_mut().parent = Some(Rc::downgrade(&elt));
                        }
                        elt.borrow_mut().children = new_children;
                        if let Some(frame) = frame.upgrade() {
                            frame.borrow_mut().set_needs_render();
                        }
                    })?,
                )?;
            }

            {
                let frame = frame.clone();
                globals.set(
                    "XMLHttpRequest_send",
                    Function::new(
                        ctx.clone(),
                        move |request_frame_id: u64, method: String, url: String, data: String, is_async: bool, handle: u64| -> String {
                            let Some(self_frame) = frame.upgrade() else { return "403 Forbidden".into() };
                            let request_frame = find_frame_by_id(&self_frame, request_frame_id).unwrap_or_else(|| self_frame.clone());

                            let url_obj = match crate::url::Url::parse(&url) {
                                Ok(u) => u,
                                Err(_) => return "403 Forbidden".into(),
                            };

                            let request_frame_url = request_frame.borrow().url.clone();
                            let Some(request_frame_url) = request_frame_url else { return "403 Forbidden".into() };
                            if url_obj.origin() != request_frame_url.origin() {
                                return "403 Forbidden".into();
                            }

                            let csp = request_frame.borrow().csp.clone();
                            if let Some(csp) = &csp {
                                if !csp.allows_connect(&url) {
                                    println!("CSP blocked XMLHttpRequest to: {url}");
                                    return "403 Forbidden".into();
                                }
                            }

                            let services = request_frame.borrow().services.clone();
                            let payload = if method.eq_ignore_ascii_case("GET") || data.is_empty() { None } else { Some(data.as_str()) };

                            let run_load = {
                                let request_frame_url = request_frame_url.clone();
                                let services = services.clone();
                                let url_obj = url_obj.clone();
                                let payload = payload.map(|s| s.to_string());
                                move || -> String {
                                    url_obj
                                        .request(&services, Some(&request_frame_url), payload.as_deref())
                                        .map(|r| r.body)
                                        .unwrap_or_default()
                                }
                            };

                            if !is_async {
                                return run_load();
                            }

                            // Only `Send` data crosses into the spawned thread: the
                            // fetch itself (`run_load`, closed over `Url`/`Arc<Services>`)
                            // and a channel back to this frame's own thread, where the
                            // interpreter (not `Send`) actually lives.
                            let callback_tx = self_frame.borrow().js_context.as_ref().map(|c| c.callback_tx.clone());
                            std::thread::spawn(move || {
                                let body = run_load();
                                if let Some(tx) = callback_tx {
                                    let _ = tx.send(PendingCallback::XhrOnload { handle, body });
                                }
                            });
                            String::new()
                        },
                    )?,
                )?;
            }

            {
                let frame = frame.clone();
                globals.set(
                    "setTimeoutHost",
                    Function::new(ctx.clone(), move |handle: u64, time_ms: f64| {
                        let Some(self_frame) = frame.upgrade() else { return };
                        let tx = self_frame.borrow().js_context.as_ref().map(|c| c.callback_tx.clone());
                        let Some(tx) = tx else { return };
                        std::thread::spawn(move || {
                            std::thread::sleep(std::time::Duration::from_millis(time_ms.max(0.0) as u64));
                            let _ = tx.send(PendingCallback::Timeout { handle });
                        });
                    })?,
                )?;
            }

            {
                let frame = frame.clone();
                globals.set(
                    "postMessage",
                    Function::new(ctx.clone(), move |target_frame_id: u64, message: String, target_origin: String| {
                        let Some(self_frame) = frame.upgrade() else { return };
                        let Some(target_frame) = find_frame_by_id(&self_frame, target_frame_id) else { return };
                        if target_frame.borrow().js_context.is_none() {
                            return;
                        }
                        if target_origin != "*" {
                            let target_url = target_frame.borrow().url.clone();
                            if target_url.map(|u| u.origin()) != Some(target_origin) {
                                return;
                            }
                        }
                        let source_origin = self_frame.borrow().url.as_ref().map(|u| u.origin()).unwrap_or_default();
                        let source_frame_id = self_frame.borrow().js_context.as_ref().map(|c| c.frame_id).unwrap_or(0);
                        let tx = target_frame.borrow().js_context.as_ref().map(|c| c.callback_tx.clone());
                        if let Some(tx) = tx {
                            let _ = tx.send(PendingCallback::Message { data: message, origin: source_origin, source_frame_id });
                        }
                    })?,
                )?;
            }

            {
                let frame = frame.clone();
                globals.set(
                    "getLocationHref",
                    Function::new(ctx.clone(), move |target_frame_id: u64| -> String {
                        let Some(self_frame) = frame.upgrade() else { return String::new() };
                        let target = find_frame_by_id(&self_frame, target_frame_id).unwrap_or(self_frame);
                        target.borrow().url.as_ref().map(|u| u.to_string()).unwrap_or_default()
                    })?,
                )?;
            }

            {
                let frame = frame.clone();
                globals.set(
                    "setLocationHref",
                    Function::new(ctx.clone(), move |target_frame_id: u64, url: String| {
                        let Some(self_frame) = frame.upgrade() else { return };
                        let target = find_frame_by_id(&self_frame, target_frame_id).unwrap_or_else(|| self_frame.clone());
                        if !Rc::ptr_eq(&target, &self_frame) && !is_same_origin(&self_frame, &target) {
                            println!("SecurityError: blocked cross-origin navigation");
                            return;
                        }
                        Frame::load(&target, &url);
                    })?,
                )?;
            }

            ctx.eval::<(), _>(RUNTIME_JS)?;
            ctx.eval::<(), _>(format!("__initWindow({frame_id});"))?;

            let origin = frame.upgrade().and_then(|f| f.borrow().url.as_ref().map(|u| u.origin())).unwrap_or_default();
            ctx.eval::<(), _>(format!("window._setOrigin({origin:?});"))?;
            ctx.eval::<(), _>(format!("__initDocument({frame_id});"))?;

            Ok(())
        })?;

        Ok(JsContext { frame_id, discarded, handles, runtime, context, callback_tx, callback_rx })
    }

    /// Sets `window.parent`/`window.top`, called once a frame's place in the
    /// tab's frame tree is known (after an `<iframe>`'s child frame loads).
    pub fn setup_frame_hierarchy(&self, parent_id: Option<u64>, top_id: Option<u64>) -> rquickjs::Result<()> {
        self.context.with(|ctx| -> rquickjs::Result<()> {
            match parent_id {
                Some(id) => ctx.eval::<(), _>(format!("window._setParent({id});"))?,
                None => ctx.eval::<(), _>("window._setParent(null);")?,
            }
            match top_id {
                Some(id) => ctx.eval::<(), _>(format!("window._setTop({id});"))?,
                None => ctx.eval::<(), _>("window._setTop(null);")?,
            }
            Ok(())
        })
    }

    pub fn add_child_frame(&self, child_id: u64) -> rquickjs::Result<()> {
        self.context.with(|ctx| ctx.eval::<(), _>(format!("window._addFrame({child_id});")))
    }

    /// Runs a `<script>`'s source, logging (not propagating) JS errors the
    /// way a browser's console would, mirroring `JSContext.run`.
    pub fn run(&self, script_name: &str, code: &str) {
        let result: rquickjs::Result<()> = self.context.with(|ctx| ctx.eval::<(), _>(code));
        if let Err(e) = result {
            println!("Script {script_name} error: {e}");
        }
    }

    pub fn get_handle(&self, node: &NodeRef) -> u64 {
        self.handles.borrow_mut().get_handle(node)
    }

    /// Dispatches a DOM event to `elt`, returning whether the default action
    /// should proceed (`dispatchEvent` returned truthy, i.e. no listener
    /// called `preventDefault`).
    pub fn dispatch_event(&self, event_type: &str, elt: &NodeRef) -> bool {
        let handle = self.handles.borrow_mut().get_handle(elt);
        let result: rquickjs::Result<bool> = self.context.with(|ctx| {
            let func: Function = ctx.globals().get("__dispatchEventInternal")?;
            func.call((handle, event_type))
        });
        result.unwrap_or(true)
    }

    fn dispatch_xhr_onload(&self, handle: u64, body: &str) {
        if *self.discarded.borrow() {
            return;
        }
        let _: rquickjs::Result<()> = self.context.with(|ctx| {
            let func: Function = ctx.globals().get("__runXHROnload")?;
            func.call((body, handle))
        });
    }

    fn dispatch_set_timeout(&self, handle: u64) {
        if *self.discarded.borrow() {
            return;
        }
        let _: rquickjs::Result<()> = self.context.with(|ctx| {
            let func: Function = ctx.globals().get("__runSetTimeout")?;
            func.call((handle,))
        });
    }

    fn dispatch_message(&self, data: &str, origin: &str, source_frame_id: u64) {
        if *self.discarded.borrow() {
            return;
        }
        let _: rquickjs::Result<()> = self.context.with(|ctx| {
            let func: Function = ctx.globals().get("__runMessage")?;
            func.call((data, origin, source_frame_id))
        });
    }

    /// Drains callbacks handed back by timer/XHR threads and runs them
    /// against the (single-threaded) interpreter. Call once per tab tick,
    /// the same point `task_runner.run` drains scheduled `Task`s.
    pub fn poll_callbacks(&self) {
        while let Ok(cb) = self.callback_rx.try_recv() {
            match cb {
                PendingCallback::Timeout { handle } => self.dispatch_set_timeout(handle),
                PendingCallback::XhrOnload { handle, body } => self.dispatch_xhr_onload(handle, &body),
                PendingCallback::Message { data, origin, source_frame_id } => {
                    self.dispatch_message(&data, &origin, source_frame_id)
                }
            }
        }
    }

    pub fn discard(&self) {
        *self.discarded.borrow_mut() = true;
    }
}
