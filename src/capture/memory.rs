//! A headless page for driving the recorder without a browser.
//!
//! Every mutating operation updates the document and delivers the matching
//! signal to registered callbacks synchronously.

use std::collections::HashMap;

use serde_json::Value;
use url::Url;

use crate::dom::{Document, NodeId, Rect, ScrollOffset, Selector, Viewport};

use super::history::{HistoryApi, HistoryInterception, InterceptableHistory, SessionHistory};
use super::host::{
    CaptureHost, DomEvent, DomEventKind, EventTarget, HostError, ListenerId, MutationKind,
    MutationRecord, NavigationKind, NavigationSignal, PageView, Registration, Signal,
    SignalCallback, Visibility,
};

const DEFAULT_USER_AGENT: &str = concat!("domreel/", env!("CARGO_PKG_VERSION"));

pub struct MemoryPage {
    doc: Document,
    history: InterceptableHistory<SessionHistory>,
    user_agent: String,
    viewport: Viewport,
    visibility: Visibility,
    rects: HashMap<NodeId, Rect>,
    root_scroll: ScrollOffset,
    element_scroll: HashMap<NodeId, ScrollOffset>,
    frame_sources: HashMap<NodeId, String>,
    registrations: Vec<(ListenerId, Registration, SignalCallback)>,
    next_listener: u64,
}

impl MemoryPage {
    pub fn new(url: &str, html: &str) -> Result<Self, HostError> {
        let url = Url::parse(url)?;
        Ok(Self {
            doc: Document::parse(html),
            history: InterceptableHistory::new(SessionHistory::new(url)),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport: Viewport::default(),
            visibility: Visibility::Visible,
            rects: HashMap::new(),
            root_scroll: ScrollOffset::default(),
            element_scroll: HashMap::new(),
            frame_sources: HashMap::new(),
            registrations: Vec::new(),
            next_listener: 1,
        })
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.doc.get_element_by_id(id)
    }

    pub fn select(&self, selector: &str) -> Option<NodeId> {
        let selector = Selector::parse(selector).ok()?;
        self.doc.query_selector(&selector)
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_history_intercepted(&self) -> bool {
        self.history.is_installed()
    }

    // Layout

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn set_rect(&mut self, node: NodeId, rect: Rect) {
        self.rects.insert(node, rect);
    }

    pub fn set_frame_src(&mut self, frame: NodeId, src: impl Into<String>) {
        self.frame_sources.insert(frame, src.into());
    }

    // Structural changes

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let old_value = self.doc.attr(node, name).map(str::to_string);
        if self.doc.set_attr(node, name, value) {
            self.notify(MutationRecord {
                target: node,
                kind: MutationKind::Attributes {
                    name: name.to_ascii_lowercase(),
                    old_value,
                },
            });
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        if let Some(old_value) = self.doc.remove_attr(node, name) {
            self.notify(MutationRecord {
                target: node,
                kind: MutationKind::Attributes {
                    name: name.to_ascii_lowercase(),
                    old_value: Some(old_value),
                },
            });
        }
    }

    pub fn set_text(&mut self, text_node: NodeId, data: &str) {
        let old_value = self.doc.text(text_node).map(str::to_string);
        if self.doc.set_text(text_node, data) {
            self.notify(MutationRecord {
                target: text_node,
                kind: MutationKind::CharacterData { old_value },
            });
        }
    }

    /// Parses `html` and appends it to `parent`.
    pub fn append_html(&mut self, parent: NodeId, html: &str) -> Vec<NodeId> {
        let previous_sibling = self.doc.last_child(parent);
        let added = self.doc.parse_fragment(parent, html);
        if !added.is_empty() {
            self.notify(MutationRecord {
                target: parent,
                kind: MutationKind::ChildList {
                    added: added.clone(),
                    removed: Vec::new(),
                    previous_sibling,
                    next_sibling: None,
                },
            });
        }
        added
    }

    pub fn remove(&mut self, node: NodeId) -> bool {
        let Some(parent) = self.doc.parent(node) else {
            return false;
        };
        let previous_sibling = self.doc.previous_sibling(node);
        let next_sibling = self.doc.next_sibling(node);
        self.doc.detach(node);
        self.notify(MutationRecord {
            target: parent,
            kind: MutationKind::ChildList {
                added: Vec::new(),
                removed: vec![node],
                previous_sibling,
                next_sibling,
            },
        });
        true
    }

    pub fn replace_children(&mut self, node: NodeId, html: &str) -> Vec<NodeId> {
        let removed = self.doc.remove_children(node);
        let added = self.doc.parse_fragment(node, html);
        self.notify(MutationRecord {
            target: node,
            kind: MutationKind::ChildList {
                added: added.clone(),
                removed,
                previous_sibling: None,
                next_sibling: None,
            },
        });
        added
    }

    // Interaction

    pub fn click(&mut self, node: NodeId, x: f64, y: f64) {
        let mut event = DomEvent::new(DomEventKind::Click, EventTarget::Node(node)).at(x, y);
        event.button = Some(0);
        self.dispatch(event);
    }

    pub fn move_pointer(&mut self, target: EventTarget, x: f64, y: f64) {
        self.dispatch(DomEvent::new(DomEventKind::PointerMove, target).at(x, y));
    }

    /// Sets a control's live value and fires `input`.
    pub fn type_value(&mut self, node: NodeId, value: &str) {
        self.doc.set_value(node, value);
        self.dispatch(DomEvent::new(DomEventKind::Input, EventTarget::Node(node)));
    }

    pub fn commit_change(&mut self, node: NodeId) {
        self.dispatch(DomEvent::new(DomEventKind::Change, EventTarget::Node(node)));
    }

    pub fn submit(&mut self, form: NodeId, prevented: bool) {
        let mut event = DomEvent::new(DomEventKind::Submit, EventTarget::Node(form));
        event.default_prevented = prevented;
        self.dispatch(event);
    }

    pub fn scroll_root(&mut self, left: f64, top: f64) {
        self.root_scroll = ScrollOffset::new(left, top);
        self.dispatch(DomEvent::new(DomEventKind::Scroll, EventTarget::Document));
    }

    pub fn scroll_element(&mut self, node: NodeId, left: f64, top: f64) {
        self.element_scroll.insert(node, ScrollOffset::new(left, top));
        self.dispatch(DomEvent::new(DomEventKind::Scroll, EventTarget::Node(node)));
    }

    pub fn dispatch(&mut self, event: DomEvent) {
        self.deliver(&Signal::Dom(event));
    }

    // Navigation

    pub fn set_hash(&mut self, fragment: &str) {
        self.history.inner_mut().set_fragment(fragment);
        self.navigate(NavigationSignal::new(NavigationKind::HashChange));
    }

    pub fn push_state(&mut self, state: Value, url: Option<&str>) -> Result<(), HostError> {
        self.history.push_state(state, url)
    }

    pub fn replace_state(&mut self, state: Value, url: Option<&str>) -> Result<(), HostError> {
        self.history.replace_state(state, url)
    }

    /// Steps back in history and fires `popstate`. Returns false at the
    /// first entry.
    pub fn go_back(&mut self) -> bool {
        let Some(state) = self.history.inner_mut().back() else {
            return false;
        };
        let mut signal = NavigationSignal::new(NavigationKind::PopState);
        signal.state = Some(state);
        self.navigate(signal);
        true
    }

    pub fn set_visibility(&mut self, visibility: Visibility) {
        self.visibility = visibility;
        self.navigate(NavigationSignal::new(NavigationKind::VisibilityChange));
    }

    pub fn before_unload(&mut self) {
        self.navigate(NavigationSignal::new(NavigationKind::BeforeUnload));
    }

    pub fn page_hide(&mut self, persisted: bool) {
        let mut signal = NavigationSignal::new(NavigationKind::PageHide);
        signal.persisted = Some(persisted);
        self.navigate(signal);
    }

    pub fn page_show(&mut self, persisted: bool) {
        let mut signal = NavigationSignal::new(NavigationKind::PageShow);
        signal.persisted = Some(persisted);
        self.navigate(signal);
    }

    fn navigate(&mut self, signal: NavigationSignal) {
        self.deliver(&Signal::Navigation(signal));
    }

    fn notify(&mut self, record: MutationRecord) {
        self.deliver(&Signal::Mutations(vec![record]));
    }

    fn deliver(&self, signal: &Signal) {
        for (_, registration, callback) in &self.registrations {
            match (registration, signal) {
                (Registration::Mutations(options), Signal::Mutations(records)) => {
                    let accepted: Vec<MutationRecord> = records
                        .iter()
                        .filter(|r| options.accepts(&r.kind))
                        .cloned()
                        .collect();
                    if !accepted.is_empty() {
                        callback(self, &Signal::Mutations(accepted));
                    }
                }
                (Registration::Listener { kind, .. }, Signal::Dom(event)) if *kind == event.kind => {
                    callback(self, signal);
                }
                (Registration::Navigation(kind), Signal::Navigation(nav)) if *kind == nav.kind => {
                    callback(self, signal);
                }
                _ => {}
            }
        }
    }
}

impl PageView for MemoryPage {
    fn document(&self) -> &Document {
        &self.doc
    }

    fn location(&self) -> Url {
        self.history.current_url().clone()
    }

    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn bounding_rect(&self, node: NodeId) -> Option<Rect> {
        self.rects.get(&node).copied()
    }

    fn scroll_offset(&self, node: Option<NodeId>) -> ScrollOffset {
        match node {
            Some(node) => self.element_scroll.get(&node).copied().unwrap_or_default(),
            None => self.root_scroll,
        }
    }

    fn visibility(&self) -> Visibility {
        self.visibility
    }

    fn frame_resolved_src(&self, frame: NodeId) -> Option<String> {
        self.frame_sources.get(&frame).cloned()
    }
}

impl CaptureHost for MemoryPage {
    fn register(
        &mut self,
        registration: Registration,
        callback: SignalCallback,
    ) -> Result<ListenerId, HostError> {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.registrations.push((id, registration, callback));
        Ok(id)
    }

    fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.registrations.len();
        self.registrations.retain(|(existing, _, _)| *existing != id);
        self.registrations.len() != before
    }

    fn history(&mut self) -> &mut dyn HistoryInterception {
        &mut self.history
    }
}
