//! Timeline events as they appear in an exported payload.
//!
//! Wire shape: `{ "id", "type", "at", "timeOffsetMs", "data" }` where `type`
//! selects the shape of `data`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dom::Viewport;

use super::session::RedactionStats;

pub const INITIAL_SNAPSHOT_REASON: &str = "initial";
pub const RECORDING_STOPPED_ACTION: &str = "recording_stopped";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Capture-order sequence number, strictly increasing.
    pub id: u64,
    /// Monotonic clock sample at capture, in milliseconds.
    pub at: f64,
    /// Milliseconds since recording start.
    pub time_offset_ms: f64,
    #[serde(flatten)]
    pub body: EventBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Snapshot,
    Meta,
    Mutation,
    Interaction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventBody {
    Snapshot(Snapshot),
    Meta(Meta),
    Mutation(Mutation),
    #[serde(rename = "event")]
    Interaction(Interaction),
}

impl EventBody {
    pub fn kind(&self) -> EventKind {
        match self {
            EventBody::Snapshot(_) => EventKind::Snapshot,
            EventBody::Meta(_) => EventKind::Meta,
            EventBody::Mutation(_) => EventKind::Mutation,
            EventBody::Interaction(_) => EventKind::Interaction,
        }
    }

    pub fn is_meta(&self) -> bool {
        matches!(self, EventBody::Meta(_))
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        self.body.kind()
    }
}

/// Full document state at recording start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub reason: String,
    pub url: String,
    pub viewport: Viewport,
    #[serde(rename = "iframeSummary", default)]
    pub frames: Vec<FrameDescriptor>,
    pub html: String,
}

/// A child frame as found at recording start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameDescriptor {
    pub path: String,
    #[serde(rename = "src", default)]
    pub declared_src: Option<String>,
    #[serde(rename = "currentSrc", default)]
    pub resolved_src: Option<String>,
    #[serde(default)]
    pub is_cross_origin: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropped_event_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redaction_stats: Option<RedactionStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    /// Path of the mutated element.
    pub target: String,
    /// Intent markers emitted before this mutation.
    #[serde(default)]
    pub intent_seq: u64,
    #[serde(flatten)]
    pub change: MutationChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mutationType")]
pub enum MutationChange {
    #[serde(rename = "attributes", rename_all = "camelCase")]
    Attributes {
        attribute_name: String,
        #[serde(default)]
        old_value: Option<String>,
        #[serde(default)]
        new_value: Option<String>,
    },
    /// Text node edit; `target` is the parent element.
    #[serde(rename = "characterData", rename_all = "camelCase")]
    CharacterData {
        #[serde(default)]
        child_index: Option<usize>,
        #[serde(default)]
        old_value: Option<String>,
        #[serde(default)]
        new_value: Option<String>,
    },
    #[serde(rename = "childList", rename_all = "camelCase")]
    ChildList {
        #[serde(default)]
        added_nodes: Vec<SerializedNode>,
        #[serde(default)]
        removed_nodes: Vec<SerializedNode>,
        #[serde(rename = "targetInnerHTML", default)]
        target_inner_html: Option<String>,
    },
    /// A mutation under a blocked subtree; nothing else is kept.
    #[serde(rename = "blocked")]
    Blocked,
}

impl MutationChange {
    pub fn name(&self) -> &'static str {
        match self {
            MutationChange::Attributes { .. } => "attributes",
            MutationChange::CharacterData { .. } => "characterData",
            MutationChange::ChildList { .. } => "childList",
            MutationChange::Blocked => "blocked",
        }
    }
}

/// A node added or removed by a child-list mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "nodeType", rename_all = "camelCase")]
pub enum SerializedNode {
    Text {
        #[serde(rename = "textContent", default)]
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Element {
        tag_name: String,
        #[serde(default)]
        path: Option<String>,
        #[serde(rename = "outerHTML", default)]
        outer_html: String,
    },
    /// Comments and other nodes that cannot be replayed individually.
    #[serde(other)]
    Other,
}

/// Recorded interaction, navigation or history event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum Interaction {
    #[serde(rename = "click")]
    Click(Pointer),
    #[serde(rename = "mousemove")]
    PointerMove(Pointer),
    #[serde(rename = "input")]
    Input(ValueChange),
    #[serde(rename = "change")]
    Change(ValueChange),
    #[serde(rename = "scroll")]
    Scroll(ScrollPosition),
    #[serde(rename = "submit")]
    Submit(Submit),
    #[serde(rename = "intent_marker")]
    IntentMarker(IntentMarker),
    #[serde(rename = "navigation_intent")]
    NavigationIntent(NavigationIntent),
    #[serde(rename = "hashchange")]
    HashChange(PageLocation),
    #[serde(rename = "popstate")]
    PopState(PageLocation),
    #[serde(rename = "beforeunload")]
    BeforeUnload(PageLocation),
    #[serde(rename = "pagehide")]
    PageHide(PageLocation),
    #[serde(rename = "pageshow")]
    PageShow(PageLocation),
    #[serde(rename = "visibilitychange")]
    VisibilityChange(PageLocation),
    #[serde(rename = "history_pushstate")]
    HistoryPush(HistoryChange),
    #[serde(rename = "history_replacestate")]
    HistoryReplace(HistoryChange),
    /// An interaction on a blocked element; only its type is kept.
    #[serde(rename = "blocked")]
    Blocked(BlockedInteraction),
    #[serde(other)]
    Unknown,
}

impl Interaction {
    pub fn event_type(&self) -> &'static str {
        match self {
            Interaction::Click(_) => "click",
            Interaction::PointerMove(_) => "mousemove",
            Interaction::Input(_) => "input",
            Interaction::Change(_) => "change",
            Interaction::Scroll(_) => "scroll",
            Interaction::Submit(_) => "submit",
            Interaction::IntentMarker(_) => "intent_marker",
            Interaction::NavigationIntent(_) => "navigation_intent",
            Interaction::HashChange(_) => "hashchange",
            Interaction::PopState(_) => "popstate",
            Interaction::BeforeUnload(_) => "beforeunload",
            Interaction::PageHide(_) => "pagehide",
            Interaction::PageShow(_) => "pageshow",
            Interaction::VisibilityChange(_) => "visibilitychange",
            Interaction::HistoryPush(_) => "history_pushstate",
            Interaction::HistoryReplace(_) => "history_replacestate",
            Interaction::Blocked(_) => "blocked",
            Interaction::Unknown => "unknown",
        }
    }

    /// Path of the element the interaction targeted, when it has one.
    pub fn target(&self) -> Option<&str> {
        match self {
            Interaction::Click(p) | Interaction::PointerMove(p) => Some(&p.target),
            Interaction::Input(v) | Interaction::Change(v) => Some(&v.target),
            Interaction::Scroll(s) => Some(&s.target),
            Interaction::Submit(s) => Some(&s.target),
            Interaction::IntentMarker(m) => Some(&m.target),
            Interaction::NavigationIntent(n) => Some(&n.target),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pointer {
    pub target: String,
    #[serde(default)]
    pub current_target: Option<String>,
    #[serde(default)]
    pub is_trusted: Option<bool>,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub viewport_width: Option<f64>,
    #[serde(default)]
    pub viewport_height: Option<f64>,
    #[serde(default)]
    pub target_offset_x: Option<f64>,
    #[serde(default)]
    pub target_offset_y: Option<f64>,
    #[serde(default)]
    pub target_width: Option<f64>,
    #[serde(default)]
    pub target_height: Option<f64>,
    #[serde(default)]
    pub button: Option<i16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueChange {
    pub target: String,
    #[serde(default)]
    pub current_target: Option<String>,
    #[serde(default)]
    pub is_trusted: Option<bool>,
    /// `None` when the target is not a form control.
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollPosition {
    pub target: String,
    #[serde(default)]
    pub is_trusted: Option<bool>,
    #[serde(default)]
    pub scroll_x: f64,
    #[serde(default)]
    pub scroll_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submit {
    pub target: String,
    #[serde(default)]
    pub is_trusted: Option<bool>,
    #[serde(default)]
    pub prevented: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentMarker {
    pub intent_type: String,
    pub intent_seq: u64,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationIntent {
    pub target: String,
    pub href: String,
    #[serde(default)]
    pub pathname: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub target_blank: bool,
    #[serde(default)]
    pub same_origin: bool,
}

/// Page location around a navigation or lifecycle event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLocation {
    pub href: String,
    /// Path plus query string.
    #[serde(default)]
    pub pathname: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub visibility_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persisted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryChange {
    /// Location after the call.
    pub href: String,
    /// URL argument of the call, resolved against the previous location.
    pub target_url: String,
    #[serde(default)]
    pub state: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedInteraction {
    pub blocked_event_type: String,
}
