//! The isolated surface a replay renders into.

use futures::future::BoxFuture;
use thiserror::Error;

use crate::dom::{Document, NodeId, Rect, ScrollOffset, Viewport};

const BASE_SANDBOX_TOKENS: &[&str] = &[
    "allow-same-origin",
    "allow-forms",
    "allow-modals",
    "allow-popups",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("Surface is detached")]
    Detached,

    #[error("Render failed: {0}")]
    RenderFailed(String),
}

/// Sandbox attribute set of the isolated surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sandbox {
    pub allow_scripts: bool,
}

impl Sandbox {
    pub fn new(allow_scripts: bool) -> Self {
        Self { allow_scripts }
    }

    pub fn tokens(&self) -> Vec<&'static str> {
        let mut tokens = BASE_SANDBOX_TOKENS.to_vec();
        if self.allow_scripts {
            tokens.push("allow-scripts");
        }
        tokens
    }

    pub fn attribute_value(&self) -> String {
        self.tokens().join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntheticKind {
    PointerDown,
    MouseDown,
    PointerUp,
    MouseUp,
    Click,
    Input,
    Change,
}

impl SyntheticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SyntheticKind::PointerDown => "pointerdown",
            SyntheticKind::MouseDown => "mousedown",
            SyntheticKind::PointerUp => "pointerup",
            SyntheticKind::MouseUp => "mouseup",
            SyntheticKind::Click => "click",
            SyntheticKind::Input => "input",
            SyntheticKind::Change => "change",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticEvent {
    pub kind: SyntheticKind,
    pub client_x: f64,
    pub client_y: f64,
    /// Suppress the default navigation of a link for this event only.
    pub prevent_navigation: bool,
}

impl SyntheticEvent {
    pub fn new(kind: SyntheticKind) -> Self {
        Self {
            kind,
            client_x: 0.0,
            client_y: 0.0,
            prevent_navigation: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchOutcome {
    pub default_prevented: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameLoad {
    Loaded,
    Failed(String),
}

/// An isolated rendering surface.
///
/// `render` and `load_frame` return futures that must not borrow the
/// surface, so callers can release any lock before awaiting them.
pub trait Surface: Send + 'static {
    fn set_sandbox(&mut self, sandbox: Sandbox);
    fn set_viewport(&mut self, viewport: Viewport);
    /// Replaces the surface content; resolves once the document has loaded.
    fn render(&mut self, html: &str) -> BoxFuture<'static, Result<(), SurfaceError>>;
    fn document(&self) -> &Document;
    fn document_mut(&mut self) -> &mut Document;
    fn client_size(&self) -> Viewport;
    fn bounding_rect(&self, node: NodeId) -> Option<Rect>;
    fn dispatch(&mut self, target: NodeId, event: SyntheticEvent) -> DispatchOutcome;
    fn focus(&mut self, node: NodeId);
    fn scroll_root_to(&mut self, offset: ScrollOffset);
    fn scroll_element_to(&mut self, node: NodeId, offset: ScrollOffset);
    fn load_frame(&mut self, frame: NodeId, src: &str) -> BoxFuture<'static, FrameLoad>;
}
