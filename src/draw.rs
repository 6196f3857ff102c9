//! Display-list commands, grounded on the teacher's `DrawText`/`DrawRect`/
//! `DrawCommand` shapes in `tab.rs`, extended with `DrawLine`/`DrawOutline`
//! for scrollbars and focus rings.

use std::sync::Arc;

use eframe::egui::{Color32, Galley, Pos2};

use crate::rect::Rect;

#[derive(Clone)]
pub struct DrawText {
    pub x: f32,
    pub y: f32,
    pub galley: Arc<Galley>,
}

#[derive(Clone)]
pub struct DrawRect {
    pub rect: Rect,
    pub color: Color32,
}

#[derive(Clone)]
pub struct DrawLine {
    pub p0: Pos2,
    pub p1: Pos2,
    pub color: Color32,
    pub width: f32,
}

#[derive(Clone)]
pub struct DrawOutline {
    pub rect: Rect,
    pub color: Color32,
    pub width: f32,
}

#[derive(Clone)]
pub enum DrawCommand {
    Text(DrawText),
    Rect(DrawRect),
    Line(DrawLine),
    Outline(DrawOutline),
}

impl DrawCommand {
    pub fn top(&self) -> f32 {
        match self {
            DrawCommand::Text(t) => t.y,
            DrawCommand::Rect(r) => r.rect.top,
            DrawCommand::Line(l) => l.p0.y.min(l.p1.y),
            DrawCommand::Outline(o) => o.rect.top,
        }
    }

    pub fn bottom(&self) -> f32 {
        match self {
            DrawCommand::Text(t) => t.y + t.galley.rect.height(),
            DrawCommand::Rect(r) => r.rect.bottom,
            DrawCommand::Line(l) => l.p0.y.max(l.p1.y),
            DrawCommand::Outline(o) => o.rect.bottom,
        }
    }

    /// Translates a command by `(dx, dy)`, used to place a child frame's
    /// (e.g. an `<iframe>`'s) local display list into its parent's space.
    pub fn translated(&self, dx: f32, dy: f32) -> DrawCommand {
        match self {
            DrawCommand::Text(t) => DrawCommand::Text(DrawText { x: t.x + dx, y: t.y + dy, galley: t.galley.clone() }),
            DrawCommand::Rect(r) => DrawCommand::Rect(DrawRect { rect: r.rect.translated(dx, dy), color: r.color }),
            DrawCommand::Line(l) => DrawCommand::Line(DrawLine {
                p0: Pos2::new(l.p0.x + dx, l.p0.y + dy),
                p1: Pos2::new(l.p1.x + dx, l.p1.y + dy),
                color: l.color,
                width: l.width,
            }),
            DrawCommand::Outline(o) => {
                DrawCommand::Outline(DrawOutline { rect: o.rect.translated(dx, dy), color: o.color, width: o.width })
            }
        }
    }
}
