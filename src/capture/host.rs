//! The live page as seen by the recorder.
//!
//! A host exposes its document and layout through [`PageView`] and accepts
//! registrations for structural changes, interaction listeners and navigation
//! events through [`CaptureHost`]. Signals are delivered to the registered
//! callback together with a read-only view of the page.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::dom::{Document, NodeId, Rect, ScrollOffset, Viewport};

use super::history::HistoryInterception;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Registration rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Visible => "visible",
            Visibility::Hidden => "hidden",
        }
    }
}

/// Read access to the page.
pub trait PageView {
    fn document(&self) -> &Document;
    fn location(&self) -> Url;
    fn user_agent(&self) -> String;
    fn viewport(&self) -> Viewport;
    fn bounding_rect(&self, node: NodeId) -> Option<Rect>;
    /// `None` addresses the scrolling root.
    fn scroll_offset(&self, node: Option<NodeId>) -> ScrollOffset;
    fn visibility(&self) -> Visibility;
    /// Source a child frame actually loaded, when known.
    fn frame_resolved_src(&self, frame: NodeId) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    Attributes {
        name: String,
        old_value: Option<String>,
    },
    /// `target` is the text node itself.
    CharacterData { old_value: Option<String> },
    ChildList {
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
        previous_sibling: Option<NodeId>,
        next_sibling: Option<NodeId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub kind: MutationKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomEventKind {
    Click,
    PointerMove,
    Input,
    Change,
    Scroll,
    Submit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTarget {
    Document,
    Node(NodeId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DomEvent {
    pub kind: DomEventKind,
    pub target: EventTarget,
    pub client_x: f64,
    pub client_y: f64,
    pub button: Option<i16>,
    pub is_trusted: bool,
    pub default_prevented: bool,
}

impl DomEvent {
    pub fn new(kind: DomEventKind, target: EventTarget) -> Self {
        Self {
            kind,
            target,
            client_x: 0.0,
            client_y: 0.0,
            button: None,
            is_trusted: true,
            default_prevented: false,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.client_x = x;
        self.client_y = y;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationKind {
    HashChange,
    PopState,
    BeforeUnload,
    PageHide,
    PageShow,
    VisibilityChange,
}

impl NavigationKind {
    pub const ALL: [NavigationKind; 6] = [
        NavigationKind::HashChange,
        NavigationKind::PopState,
        NavigationKind::BeforeUnload,
        NavigationKind::PageHide,
        NavigationKind::PageShow,
        NavigationKind::VisibilityChange,
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavigationSignal {
    pub kind: NavigationKind,
    /// Page lifecycle events only.
    pub persisted: Option<bool>,
    /// Pop state only.
    pub state: Option<Value>,
}

impl NavigationSignal {
    pub fn new(kind: NavigationKind) -> Self {
        Self {
            kind,
            persisted: None,
            state: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Mutations(Vec<MutationRecord>),
    Dom(DomEvent),
    Navigation(NavigationSignal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserveOptions {
    pub subtree: bool,
    pub child_list: bool,
    pub attributes: bool,
    pub attribute_old_value: bool,
    pub character_data: bool,
    pub character_data_old_value: bool,
}

impl ObserveOptions {
    pub fn everything() -> Self {
        Self {
            subtree: true,
            child_list: true,
            attributes: true,
            attribute_old_value: true,
            character_data: true,
            character_data_old_value: true,
        }
    }

    pub fn accepts(&self, kind: &MutationKind) -> bool {
        match kind {
            MutationKind::Attributes { .. } => self.attributes,
            MutationKind::CharacterData { .. } => self.character_data,
            MutationKind::ChildList { .. } => self.child_list,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenTarget {
    Document,
    Window,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Mutations(ObserveOptions),
    Listener {
        kind: DomEventKind,
        target: ListenTarget,
        capture: bool,
        passive: bool,
    },
    Navigation(NavigationKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

pub type SignalCallback = Arc<dyn Fn(&dyn PageView, &Signal) + Send + Sync>;

/// A page the recorder can attach to.
pub trait CaptureHost: PageView {
    fn register(
        &mut self,
        registration: Registration,
        callback: SignalCallback,
    ) -> Result<ListenerId, HostError>;

    /// Returns false when `id` was not registered.
    fn unregister(&mut self, id: ListenerId) -> bool;

    fn history(&mut self) -> &mut dyn HistoryInterception;
}
