//! Pointer overlay drawn on top of the replayed document.
//!
//! Decorations live in a layer appended to the body and expire against the
//! timeline's virtual clock, so nothing outlives a stopped replay.

use std::collections::VecDeque;

use crate::dom::{Document, NodeId, Rect};

pub use crate::dom::POINTER_LAYER_ID;

const OVERLAY_CLASS: &str = "sr-overlay";
const CURSOR_CLASS: &str = "sr-pointer";
const TRAIL_CLASS: &str = "sr-trail";
const RIPPLE_CLASS: &str = "sr-ripple";
const OUTLINE_CLASS: &str = "sr-outline";

const TRAIL_TTL_MS: f64 = 600.0;
const RIPPLE_TTL_MS: f64 = 500.0;
const OUTLINE_TTL_MS: f64 = 700.0;
const MAX_TRAIL: usize = 24;

#[derive(Debug, Clone, Copy)]
struct Decoration {
    node: NodeId,
    expires_at: f64,
}

#[derive(Debug, Default)]
pub struct Overlay {
    layer: Option<NodeId>,
    cursor: Option<NodeId>,
    trail: VecDeque<Decoration>,
    transient: Vec<Decoration>,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the overlay layer to the body of `doc`. Re-attaching replaces
    /// any previous layer.
    pub fn attach(&mut self, doc: &mut Document) {
        self.detach(doc);
        let Some(body) = doc.body() else {
            return;
        };
        let layer = doc.create_element("div");
        doc.set_attr(layer, "id", POINTER_LAYER_ID);
        doc.set_attr(layer, "class", OVERLAY_CLASS);
        doc.set_attr(layer, "aria-hidden", "true");
        doc.set_attr(
            layer,
            "style",
            "position:fixed;inset:0;pointer-events:none;z-index:2147483647",
        );
        doc.append_child(body, layer);

        let cursor = doc.create_element("div");
        doc.set_attr(cursor, "class", CURSOR_CLASS);
        doc.set_attr(cursor, "style", "display:none");
        doc.append_child(layer, cursor);

        self.layer = Some(layer);
        self.cursor = Some(cursor);
    }

    pub fn is_attached(&self) -> bool {
        self.layer.is_some()
    }

    /// Moves the cursor and leaves a fading trail dot behind it.
    pub fn move_cursor(&mut self, doc: &mut Document, x: f64, y: f64, at: f64) {
        let (Some(layer), Some(cursor)) = (self.layer, self.cursor) else {
            return;
        };
        doc.set_attr(cursor, "style", &position_style(x, y));

        let dot = doc.create_element("div");
        doc.set_attr(dot, "class", TRAIL_CLASS);
        doc.set_attr(dot, "style", &position_style(x, y));
        doc.append_child(layer, dot);
        self.trail.push_back(Decoration {
            node: dot,
            expires_at: at + TRAIL_TTL_MS,
        });
        while self.trail.len() > MAX_TRAIL {
            if let Some(old) = self.trail.pop_front() {
                doc.detach(old.node);
            }
        }
    }

    pub fn ripple(&mut self, doc: &mut Document, x: f64, y: f64, at: f64) {
        self.add_transient(doc, RIPPLE_CLASS, &position_style(x, y), at + RIPPLE_TTL_MS);
    }

    /// Outlines the clicked element's box.
    pub fn outline(&mut self, doc: &mut Document, rect: Rect, at: f64) {
        if !rect.has_area() {
            return;
        }
        let style = format!(
            "left:{}px;top:{}px;width:{}px;height:{}px",
            rect.left, rect.top, rect.width, rect.height
        );
        self.add_transient(doc, OUTLINE_CLASS, &style, at + OUTLINE_TTL_MS);
    }

    /// Removes decorations whose lifetime ended at or before `now`.
    pub fn expire(&mut self, doc: &mut Document, now: f64) {
        while self.trail.front().is_some_and(|d| d.expires_at <= now) {
            if let Some(old) = self.trail.pop_front() {
                doc.detach(old.node);
            }
        }
        self.transient.retain(|d| {
            if d.expires_at <= now {
                doc.detach(d.node);
                false
            } else {
                true
            }
        });
    }

    /// Drops every trail dot, ripple and outline; the cursor stays.
    pub fn clear_transient(&mut self, doc: &mut Document) {
        for d in self.trail.drain(..).chain(self.transient.drain(..)) {
            doc.detach(d.node);
        }
    }

    pub fn detach(&mut self, doc: &mut Document) {
        self.clear_transient(doc);
        if let Some(layer) = self.layer.take() {
            doc.detach(layer);
        }
        self.cursor = None;
    }

    /// Live trail dots, ripples and outlines.
    pub fn decoration_count(&self) -> usize {
        self.trail.len() + self.transient.len()
    }

    fn add_transient(&mut self, doc: &mut Document, class: &str, style: &str, expires_at: f64) {
        let Some(layer) = self.layer else {
            return;
        };
        let node = doc.create_element("div");
        doc.set_attr(node, "class", class);
        doc.set_attr(node, "style", style);
        doc.append_child(layer, node);
        self.transient.push(Decoration { node, expires_at });
    }
}

fn position_style(x: f64, y: f64) -> String {
    format!("left:{x}px;top:{y}px")
}
