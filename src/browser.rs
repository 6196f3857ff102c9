//! The top-level `eframe::App`: owns every tab's `MainThreadHandle`, the
//! chrome, and the shared commit channel, grounded on the original
//! implementation's `core/browser.py`. The separate `CompositorThread` the
//! original runs is folded into `update()` here, since `eframe` owns the GPU
//! surface and painting from any thread but the UI thread isn't possible.

use std::collections::HashMap;
use std::sync::Arc;

use eframe::egui;
use egui::{Color32, Context, Event, Key, Pos2, Rect as EguiRect, Shape, Stroke, StrokeKind};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::chrome::{Chrome, ChromeAction};
use crate::commit::CommitData;
use crate::draw::DrawCommand;
use crate::layout::VSTEP;
use crate::main_thread::{EventType, MainThreadHandle};
use crate::services::Services;
use crate::tab::SCROLL_STEP;

const SCROLLBAR_WIDTH: f32 = 12.0;
const SCROLLBAR_MARGIN: f32 = 2.0;
const SCROLLBAR_MIN_THUMB: f32 = 30.0;

pub struct Browser {
    services: Arc<Services>,
    chrome: Chrome,
    tabs: Vec<u64>,
    threads: HashMap<u64, MainThreadHandle>,
    active_tab: usize,
    next_tab_id: u64,
    commit_tx: Sender<CommitData>,
    commit_rx: Receiver<CommitData>,
    active_commit: Option<CommitData>,
    content_focused: bool,
    width: f32,
    height: f32,
}

impl Browser {
    pub fn new(cc: &eframe::CreationContext<'_>, services: Arc<Services>, initial_url: String) -> Self {
        cc.egui_ctx.set_visuals(egui::Visuals::light());
        let chrome = Chrome::new(&cc.egui_ctx);
        let (commit_tx, commit_rx) = unbounded();

        let mut browser = Browser {
            services,
            chrome,
            tabs: Vec::new(),
            threads: HashMap::new(),
            active_tab: 0,
            next_tab_id: 0,
            commit_tx,
            commit_rx,
            active_commit: None,
            content_focused: false,
            width: crate::layout::WIDTH,
            height: crate::layout::HEIGHT,
        };
        browser.new_tab(&initial_url);
        browser
    }

    fn new_tab(&mut self, url: &str) {
        let id = self.next_tab_id;
        self.next_tab_id += 1;
        let handle = MainThreadHandle::spawn(id, self.services.clone(), url.to_string(), self.commit_tx.clone());
        self.threads.insert(id, handle);
        self.tabs.push(id);
        self.active_tab = self.tabs.len() - 1;
        self.active_commit = None;
        self.chrome.blur();
    }

    fn active_tab_id(&self) -> Option<u64> {
        self.tabs.get(self.active_tab).copied()
    }

    fn post_to_active(&self, event: EventType) {
        if let Some(id) = self.active_tab_id() {
            if let Some(handle) = self.threads.get(&id) {
                handle.post_event(event);
            }
        }
    }

    /// Keeps only the active tab's most recent commit, mirroring the
    /// original's `UI_commands` queue filtering by `id(self.active_tab)`.
    fn process_commits(&mut self) {
        let active = self.active_tab_id();
        while let Ok(commit) = self.commit_rx.try_recv() {
            if Some(commit.tab_id) == active {
                self.active_commit = Some(commit);
            }
        }
    }

    fn handle_chrome_action(&mut self, action: ChromeAction) {
        match action {
            ChromeAction::NewTab => self.new_tab("about:blank"),
            ChromeAction::GoBack => self.post_to_active(EventType::GoBack),
            ChromeAction::SwitchTab(index) => {
                if index < self.tabs.len() {
                    self.active_tab = index;
                    self.active_commit = None;
                }
            }
            ChromeAction::Load(url) => self.post_to_active(EventType::Load { url, payload: None }),
        }
    }

    fn handle_click(&mut self, x: f32, y: f32) {
        if y < self.chrome.bottom {
            if let Some(action) = self.chrome.click(x, y, self.tabs.len()) {
                self.handle_chrome_action(action);
            }
            self.content_focused = false;
        } else {
            self.chrome.blur();
            self.content_focused = true;
            self.post_to_active(EventType::Click { x, y: y - self.chrome.bottom });
        }
    }

    fn handle_text(&mut self, text: &str) {
        for ch in text.chars() {
            if !(' '..='\u{7f}').contains(&ch) {
                continue;
            }
            if self.chrome.keypress(ch) {
                continue;
            }
            if self.content_focused {
                self.post_to_active(EventType::Keypress { ch });
            }
        }
    }

    fn handle_backspace(&mut self) {
        if self.chrome.backspace() {
            return;
        }
        if self.content_focused {
            self.post_to_active(EventType::Backspace);
        }
    }

    fn handle_enter(&mut self) {
        if let Some(action) = self.chrome.enter() {
            self.handle_chrome_action(action);
        }
    }

    fn handle_scroll(&mut self, delta_y: f32) {
        let Some(commit) = &self.active_commit else { return };
        let viewport = (self.height - self.chrome.bottom).max(0.0);
        let max_y = (commit.document_height + 2.0 * VSTEP - viewport).max(0.0);
        let new_scroll = (commit.scroll - delta_y).clamp(0.0, max_y);
        self.post_to_active(EventType::ScrollTo { y: new_scroll });
    }

    fn handle_resize(&mut self, width: f32, height: f32) {
        if width == self.width && height == self.height {
            return;
        }
        self.width = width;
        self.height = height;
        self.post_to_active(EventType::Resize { width, height: (height - self.chrome.bottom).max(0.0) });
    }

    fn paint(&self, ctx: &Context) {
        let painter = ctx.layer_painter(egui::LayerId::background());
        painter.rect_filled(EguiRect::from_min_size(Pos2::ZERO, egui::vec2(self.width, self.height)), 0.0, Color32::WHITE);

        if let Some(commit) = &self.active_commit {
            let viewport = (self.height - self.chrome.bottom).max(0.0);
            let clip = EguiRect::from_min_max(
                Pos2::new(0.0, self.chrome.bottom),
                Pos2::new(self.width, self.height),
            );
            let content_painter = painter.with_clip_rect(clip);
            paint_commands(&content_painter, &commit.display_list, 0.0, self.chrome.bottom - commit.scroll);
            draw_scrollbar(&painter, self.width, self.chrome.bottom, viewport, commit.document_height);
        }

        let chrome_cmds = self.chrome.paint(ctx, self.width, self.tabs.len(), self.active_tab, self.active_commit.as_ref().and_then(|c| c.url.as_deref()));
        paint_commands(&painter, &chrome_cmds, 0.0, 0.0);
    }
}

fn paint_commands(painter: &egui::Painter, cmds: &[DrawCommand], dx: f32, dy: f32) {
    for cmd in cmds {
        match cmd.translated(dx, dy) {
            DrawCommand::Text(t) => {
                painter.add(Shape::galley(Pos2::new(t.x, t.y), t.galley, Color32::BLACK));
            }
            DrawCommand::Rect(r) => {
                let rect = EguiRect::from_min_max(Pos2::new(r.rect.left, r.rect.top), Pos2::new(r.rect.right, r.rect.bottom));
                painter.rect_filled(rect, 0.0, r.color);
            }
            DrawCommand::Line(l) => {
                painter.line_segment([l.p0, l.p1], Stroke::new(l.width, l.color));
            }
            DrawCommand::Outline(o) => {
                let rect = EguiRect::from_min_max(Pos2::new(o.rect.left, o.rect.top), Pos2::new(o.rect.right, o.rect.bottom));
                painter.rect_stroke(rect, 0.0, Stroke::new(o.width, o.color), StrokeKind::Middle);
            }
        }
    }
}

/// Mirrors `CompositorThread._draw_scrollbar`: a 12px track on the right
/// edge, drawn only when the document overflows the viewport.
fn draw_scrollbar(painter: &egui::Painter, width: f32, chrome_bottom: f32, viewport_height: f32, document_height: f32) {
    let max_y = (document_height + 2.0 * VSTEP - viewport_height).max(0.0);
    if max_y <= 0.0 {
        return;
    }

    let track_x = width - SCROLLBAR_WIDTH;
    let track_rect = EguiRect::from_min_size(Pos2::new(track_x, chrome_bottom), egui::vec2(SCROLLBAR_WIDTH, viewport_height));
    painter.rect_filled(track_rect, 0.0, Color32::from_rgba_unmultiplied(220, 220, 220, 255));

    let thumb_height = (viewport_height * viewport_height / document_height.max(1.0)).max(SCROLLBAR_MIN_THUMB).min(viewport_height);
    let thumb_rect = EguiRect::from_min_size(
        Pos2::new(track_x + SCROLLBAR_MARGIN, chrome_bottom),
        egui::vec2(SCROLLBAR_WIDTH - 2.0 * SCROLLBAR_MARGIN, thumb_height),
    );
    painter.rect_filled(thumb_rect, 0.0, Color32::from_rgba_unmultiplied(150, 150, 150, 255));
}

impl eframe::App for Browser {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        let screen = ctx.screen_rect();
        self.handle_resize(screen.width(), screen.height());

        let events = ctx.input(|i| i.events.clone());
        let scroll_delta = ctx.input(|i| i.smooth_scroll_delta.y);

        for event in events {
            match event {
                Event::PointerButton { pos, button: egui::PointerButton::Primary, pressed: true, .. } => {
                    self.handle_click(pos.x, pos.y);
                }
                Event::Text(text) => self.handle_text(&text),
                Event::Key { key: Key::Backspace, pressed: true, .. } => self.handle_backspace(),
                Event::Key { key: Key::Enter, pressed: true, .. } => self.handle_enter(),
                Event::Key { key: Key::ArrowDown, pressed: true, .. } => self.post_to_active(EventType::ScrollDown),
                Event::Key { key: Key::ArrowUp, pressed: true, .. } => self.post_to_active(EventType::ScrollUp),
                _ => {}
            }
        }
        if scroll_delta.abs() > 0.0 {
            self.handle_scroll(scroll_delta);
        }

        self.process_commits();
        self.paint(ctx);

        ctx.request_repaint_after(std::time::Duration::from_millis(16));
    }

    fn on_exit(&mut self) {
        self.services.network.shutdown();
    }
}
