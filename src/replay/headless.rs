//! An in-memory surface: renders into a [`Document`] and records what the
//! replay did to it.

use std::collections::HashMap;

use futures::future::{self, BoxFuture};

use crate::dom::{Document, NodeId, Rect, ScrollOffset, Viewport};
use crate::path::path_of;

use super::surface::{
    DispatchOutcome, FrameLoad, Sandbox, Surface, SurfaceError, SyntheticEvent, SyntheticKind,
};

/// How a child frame source behaves when loaded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FrameBehavior {
    #[default]
    Load,
    Fail,
    /// Never settles.
    Hang,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedEvent {
    pub target: String,
    pub event: SyntheticEvent,
}

#[derive(Debug, Default)]
pub struct HeadlessSurface {
    doc: Document,
    sandbox: Option<Sandbox>,
    viewport: Viewport,
    rects: HashMap<String, Rect>,
    frames: HashMap<String, FrameBehavior>,
    default_frame: FrameBehavior,
    fail_render: Option<String>,
    renders: usize,
    dispatched: Vec<DispatchedEvent>,
    navigations: Vec<String>,
    focused: Option<NodeId>,
    root_scroll: ScrollOffset,
    element_scroll: HashMap<NodeId, ScrollOffset>,
    frame_loads: Vec<String>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layout for the element at `path` in whatever document is rendered.
    pub fn with_rect(mut self, path: impl Into<String>, rect: Rect) -> Self {
        self.rects.insert(path.into(), rect);
        self
    }

    pub fn with_frame(mut self, src: impl Into<String>, behavior: FrameBehavior) -> Self {
        self.frames.insert(src.into(), behavior);
        self
    }

    pub fn with_default_frame(mut self, behavior: FrameBehavior) -> Self {
        self.default_frame = behavior;
        self
    }

    pub fn failing_render(mut self, reason: impl Into<String>) -> Self {
        self.fail_render = Some(reason.into());
        self
    }

    pub fn sandbox(&self) -> Option<Sandbox> {
        self.sandbox
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn render_count(&self) -> usize {
        self.renders
    }

    pub fn dispatched(&self) -> &[DispatchedEvent] {
        &self.dispatched
    }

    /// Links followed by synthesized clicks.
    pub fn navigations(&self) -> &[String] {
        &self.navigations
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    pub fn root_scroll(&self) -> ScrollOffset {
        self.root_scroll
    }

    pub fn element_scroll(&self, node: NodeId) -> Option<ScrollOffset> {
        self.element_scroll.get(&node).copied()
    }

    pub fn frame_loads(&self) -> &[String] {
        &self.frame_loads
    }
}

impl Surface for HeadlessSurface {
    fn set_sandbox(&mut self, sandbox: Sandbox) {
        self.sandbox = Some(sandbox);
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn render(&mut self, html: &str) -> BoxFuture<'static, Result<(), SurfaceError>> {
        if let Some(reason) = &self.fail_render {
            return Box::pin(future::ready(Err(SurfaceError::RenderFailed(reason.clone()))));
        }
        self.doc = Document::parse(html);
        self.renders += 1;
        self.focused = None;
        self.root_scroll = ScrollOffset::default();
        self.element_scroll.clear();
        Box::pin(future::ready(Ok(())))
    }

    fn document(&self) -> &Document {
        &self.doc
    }

    fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    fn client_size(&self) -> Viewport {
        self.viewport
    }

    fn bounding_rect(&self, node: NodeId) -> Option<Rect> {
        self.rects.get(&path_of(&self.doc, node)).copied()
    }

    fn dispatch(&mut self, target: NodeId, event: SyntheticEvent) -> DispatchOutcome {
        self.dispatched.push(DispatchedEvent {
            target: path_of(&self.doc, target),
            event,
        });
        if event.kind == SyntheticKind::Click {
            let link = self
                .doc
                .closest(target, |el| el.tag() == "a" && el.has_attr("href"));
            if let Some(href) = link.and_then(|a| self.doc.attr(a, "href")) {
                if event.prevent_navigation {
                    return DispatchOutcome {
                        default_prevented: true,
                    };
                }
                self.navigations.push(href.to_string());
            }
        }
        DispatchOutcome::default()
    }

    fn focus(&mut self, node: NodeId) {
        self.focused = Some(node);
    }

    fn scroll_root_to(&mut self, offset: ScrollOffset) {
        self.root_scroll = offset;
    }

    fn scroll_element_to(&mut self, node: NodeId, offset: ScrollOffset) {
        self.element_scroll.insert(node, offset);
    }

    fn load_frame(&mut self, _frame: NodeId, src: &str) -> BoxFuture<'static, FrameLoad> {
        self.frame_loads.push(src.to_string());
        let behavior = self.frames.get(src).unwrap_or(&self.default_frame).clone();
        match behavior {
            FrameBehavior::Load => Box::pin(future::ready(FrameLoad::Loaded)),
            FrameBehavior::Fail => Box::pin(future::ready(FrameLoad::Failed(format!(
                "{src} refused to load"
            )))),
            FrameBehavior::Hang => Box::pin(future::pending::<FrameLoad>()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prevented_click_does_not_navigate() {
        let mut surface = HeadlessSurface::new();
        let _ = surface.render(r#"<body><a id="go" href="/next"><span>go</span></a></body>"#);
        let link = surface.document().get_element_by_id("go").unwrap();
        let span = surface.document().element_children(link).next().unwrap();

        let mut click = SyntheticEvent::new(SyntheticKind::Click);
        click.prevent_navigation = true;
        assert!(surface.dispatch(span, click).default_prevented);
        assert!(surface.navigations().is_empty());

        click.prevent_navigation = false;
        surface.dispatch(span, click);
        assert_eq!(surface.navigations(), ["/next".to_string()]);
        assert_eq!(surface.dispatched()[0].target, "a:nth-of-type(1) > span:nth-of-type(1)");
    }
}
