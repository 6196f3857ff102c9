//! Fixed-pixel-geometry browser chrome (tab bar + URL bar), grounded on the
//! original implementation's `ui/chrome.py`. Geometry is derived once from a
//! 20px font's metrics, same as the original derives its rectangles from
//! `get_font(20, "normal", "roman").metrics()`/`measure()`.

use eframe::egui::{Color32, Context, FontFamily, FontId, Galley, Pos2};
use std::sync::Arc;

use crate::draw::{DrawCommand, DrawLine, DrawOutline, DrawRect, DrawText};
use crate::layout::WIDTH;
use crate::rect::Rect;

const PADDING: f32 = 5.0;

fn font_id() -> FontId {
    FontId::new(20.0, FontFamily::Name(Arc::from("sansnormalnormal")))
}

fn measure(ctx: &Context, text: &str, font: &FontId) -> Arc<Galley> {
    ctx.fonts_mut(|f| f.layout_no_wrap(text.to_string(), font.clone(), Color32::BLACK))
}

/// An action a chrome click/Enter can trigger, handled by whatever owns the
/// tab list (the `Browser` app).
pub enum ChromeAction {
    NewTab,
    GoBack,
    SwitchTab(usize),
    Load(String),
}

enum Focus {
    AddressBar,
}

pub struct Chrome {
    font: FontId,
    font_height: f32,
    tab_width: f32,
    pub newtab_rect: Rect,
    pub back_rect: Rect,
    pub address_rect: Rect,
    pub tabbar_top: f32,
    pub tabbar_bottom: f32,
    pub bottom: f32,
    focus: Option<Focus>,
    address_bar: String,
}

impl Chrome {
    pub fn new(ctx: &Context) -> Self {
        let font = font_id();
        let font_height = measure(ctx, "x", &font).size().y;

        let tabbar_top = 0.0;
        let tabbar_bottom = font_height + 2.0 * PADDING;

        let plus_width = measure(ctx, "+", &font).size().x + 2.0 * PADDING;
        let newtab_rect = Rect::new(PADDING, PADDING, PADDING + plus_width, PADDING + font_height);

        let urlbar_top = tabbar_bottom;
        let urlbar_bottom = urlbar_top + font_height + 2.0 * PADDING;
        let bottom = urlbar_bottom;

        let back_width = measure(ctx, "<", &font).size().x + 2.0 * PADDING;
        let back_rect = Rect::new(PADDING, urlbar_top + PADDING, PADDING + back_width, urlbar_bottom - PADDING);

        let address_rect = Rect::new(back_rect.right + PADDING, urlbar_top + PADDING, WIDTH - PADDING, urlbar_bottom - PADDING);

        let tab_width = measure(ctx, "Tab X", &font).size().x + 2.0 * PADDING;

        Chrome {
            font,
            font_height,
            tab_width,
            newtab_rect,
            back_rect,
            address_rect,
            tabbar_top,
            tabbar_bottom,
            bottom,
            focus: None,
            address_bar: String::new(),
        }
    }

    fn tab_rect(&self, index: usize) -> Rect {
        let tabs_start = self.newtab_rect.right + PADDING;
        Rect::new(
            tabs_start + self.tab_width * index as f32,
            self.tabbar_top,
            tabs_start + self.tab_width * (index as f32 + 1.0),
            self.tabbar_bottom,
        )
    }

    /// Builds this frame's chrome display list. `active_url` is the active
    /// tab's committed URL (the UI thread reads this from `active_commit`,
    /// never from the tab itself, so chrome painting never blocks on the
    /// tab's main thread).
    pub fn paint(&self, ctx: &Context, width: f32, tab_count: usize, active_tab: usize, active_url: Option<&str>) -> Vec<DrawCommand> {
        let mut cmds = Vec::new();

        cmds.push(DrawCommand::Outline(DrawOutline { rect: self.newtab_rect, color: Color32::BLACK, width: 1.0 }));
        cmds.push(text_cmd(ctx, &self.font, self.newtab_rect.left + PADDING, self.newtab_rect.top, "+"));

        cmds.push(DrawCommand::Rect(DrawRect { rect: Rect::from_pos_size(0.0, 0.0, width, self.bottom), color: Color32::WHITE }));
        cmds.push(line_cmd(0.0, self.bottom, width, self.bottom));

        for i in 0..tab_count {
            let bounds = self.tab_rect(i);
            cmds.push(line_cmd(bounds.left, 0.0, bounds.left, bounds.bottom));
            cmds.push(text_cmd(ctx, &self.font, bounds.left + PADDING, bounds.top + PADDING, &format!("Tab {i}")));
            if i == active_tab {
                cmds.push(line_cmd(0.0, bounds.bottom, bounds.left, bounds.bottom));
                cmds.push(line_cmd(bounds.right, bounds.bottom, width, bounds.bottom));
            }
        }

        cmds.push(DrawCommand::Outline(DrawOutline { rect: self.back_rect, color: Color32::BLACK, width: 1.0 }));
        cmds.push(text_cmd(ctx, &self.font, self.back_rect.left + PADDING, self.back_rect.top, "<"));

        cmds.push(DrawCommand::Outline(DrawOutline { rect: self.address_rect, color: Color32::BLACK, width: 1.0 }));
        match self.focus {
            Some(Focus::AddressBar) => {
                cmds.push(text_cmd(ctx, &self.font, self.address_rect.left + PADDING, self.address_rect.top, &self.address_bar));
                let w = measure(ctx, &self.address_bar, &self.font).size().x;
                let x = self.address_rect.left + PADDING + w;
                cmds.push(DrawCommand::Line(DrawLine {
                    p0: Pos2::new(x, self.address_rect.top),
                    p1: Pos2::new(x, self.address_rect.bottom),
                    color: Color32::RED,
                    width: 1.0,
                }));
            }
            None => {
                let url = active_url.unwrap_or("");
                cmds.push(text_cmd(ctx, &self.font, self.address_rect.left + PADDING, self.address_rect.top, url));
            }
        }

        cmds
    }

    pub fn click(&mut self, x: f32, y: f32, tab_count: usize) -> Option<ChromeAction> {
        if self.newtab_rect.contains_point(x, y) {
            return Some(ChromeAction::NewTab);
        }
        if self.back_rect.contains_point(x, y) {
            return Some(ChromeAction::GoBack);
        }
        if self.address_rect.contains_point(x, y) {
            self.focus = Some(Focus::AddressBar);
            self.address_bar.clear();
            return None;
        }
        for i in 0..tab_count {
            if self.tab_rect(i).contains_point(x, y) {
                return Some(ChromeAction::SwitchTab(i));
            }
        }
        None
    }

    pub fn keypress(&mut self, ch: char) -> bool {
        if matches!(self.focus, Some(Focus::AddressBar)) {
            self.address_bar.push(ch);
            true
        } else {
            false
        }
    }

    pub fn backspace(&mut self) -> bool {
        if matches!(self.focus, Some(Focus::AddressBar)) && !self.address_bar.is_empty() {
            self.address_bar.pop();
            true
        } else {
            false
        }
    }

    pub fn enter(&mut self) -> Option<ChromeAction> {
        if matches!(self.focus, Some(Focus::AddressBar)) {
            self.focus = None;
            return Some(ChromeAction::Load(self.address_bar.clone()));
        }
        None
    }

    pub fn blur(&mut self) {
        self.focus = None;
    }

    pub fn is_focused(&self) -> bool {
        self.focus.is_some()
    }
}

fn text_cmd(ctx: &Context, font: &FontId, x: f32, y: f32, text: &str) -> DrawCommand {
    DrawCommand::Text(DrawText { x, y, galley: measure(ctx, text, font) })
}

fn line_cmd(x0: f32, y0: f32, x1: f32, y1: f32) -> DrawCommand {
    DrawCommand::Line(DrawLine { p0: Pos2::new(x0, y0), p1: Pos2::new(x1, y1), color: Color32::BLACK, width: 1.0 })
}
