//! The capture engine.
//!
//! A [`Recorder`] attaches to a [`CaptureHost`], turns its signals into a
//! bounded, redacted event log and hands the result out as a
//! [`SessionPayload`]. The log lives in a [`CaptureCore`] shared with every
//! callback the recorder installs on the host.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use url::Url;
use uuid::Uuid;

use crate::clock::{Clock, MonotonicClock};
use crate::config::{Config, ConfigPatch, Limits};
use crate::dom::{Document, NodeId};
use crate::path::{path_of, DOCUMENT_PATH};
use crate::payload::{
    BlockedInteraction, EventBody, FrameDescriptor, HistoryChange, IntentMarker, Interaction, Meta,
    NavigationIntent, PageIdentity, PageLocation, Pointer, RecordingConfig, ScrollPosition,
    SessionPayload, Snapshot, Submit, ValueChange, INITIAL_SNAPSHOT_REASON,
    PAYLOAD_SCHEMA_VERSION, RECORDING_STOPPED_ACTION,
};
use crate::privacy::{classify_form_control, mask_value, CompiledPolicy, FormControl, Redactor};

use super::describe::MutationDescriber;
use super::history::{HistoryCall, HistoryCallKind};
use super::host::{
    CaptureHost, DomEvent, DomEventKind, EventTarget, ListenTarget, ListenerId, MutationRecord,
    NavigationKind, NavigationSignal, ObserveOptions, PageView, Registration, Signal,
    SignalCallback,
};
use super::log::CaptureLog;
use super::throttle::{Pace, Throttle};

/// Element ids of the recorder's own UI, excluded from capture by default.
pub const TOOL_UI_IDS: &[&str] = &[
    "__sr_snippet_panel__",
    "__sr_snippet_replay_modal__",
    "__sr_snippet_style__",
];

/// Returns true for nodes the recorder must not observe.
pub type IgnorePredicate = Arc<dyn Fn(&Document, NodeId) -> bool + Send + Sync>;

pub fn ignore_none() -> IgnorePredicate {
    Arc::new(|_: &Document, _: NodeId| false)
}

/// Ignores every node inside an element whose id is in `ids`.
pub fn ignore_subtrees<I, S>(ids: I) -> IgnorePredicate
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
    Arc::new(move |doc: &Document, node: NodeId| {
        doc.closest(node, |el| el.id().is_some_and(|id| ids.iter().any(|i| i == id)))
            .is_some()
    })
}

#[derive(Clone)]
pub struct RecorderOptions {
    pub clock: Arc<dyn Clock>,
    pub ignore: IgnorePredicate,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(MonotonicClock::new()),
            ignore: ignore_subtrees(TOOL_UI_IDS.iter().copied()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lane {
    Pointer = 0,
    Input = 1,
    Change = 2,
    Scroll = 3,
}

/// An interaction waiting in a rate-limited lane.
#[derive(Debug, Clone)]
struct Staged {
    interaction: Interaction,
    masked: bool,
}

fn lanes(limits: &Limits) -> [Throttle<String, Staged>; 4] {
    [
        Throttle::new(Pace::Sample, limits.pointer_sample_interval_ms),
        Throttle::new(Pace::Debounce, limits.input_debounce_ms),
        Throttle::new(Pace::Debounce, limits.input_debounce_ms),
        Throttle::new(Pace::Debounce, limits.scroll_debounce_ms),
    ]
}

struct CaptureState {
    recording: bool,
    started: bool,
    config: Config,
    policy: CompiledPolicy,
    log: CaptureLog,
    intent_seq: u64,
    lanes: [Throttle<String, Staged>; 4],
    session_id: Uuid,
    created_at: DateTime<Utc>,
    page: PageIdentity,
}

impl CaptureState {
    fn new(config: Config) -> Self {
        Self {
            recording: false,
            started: false,
            policy: CompiledPolicy::compile(&config.privacy),
            log: CaptureLog::new(0.0, config.limits.max_events),
            intent_seq: 0,
            lanes: lanes(&config.limits),
            session_id: Uuid::new_v4(),
            created_at: Utc::now(),
            page: PageIdentity::default(),
            config,
        }
    }

    fn reset(&mut self, now: f64, page: PageIdentity) {
        self.log = CaptureLog::new(now, self.config.limits.max_events);
        self.intent_seq = 0;
        self.lanes = lanes(&self.config.limits);
        self.session_id = Uuid::new_v4();
        self.created_at = Utc::now();
        self.page = page;
        self.started = true;
    }

    fn apply_config(&mut self, patch: &ConfigPatch) {
        self.config.merge(patch);
        self.policy = CompiledPolicy::compile(&self.config.privacy);
        let limits = &self.config.limits;
        self.lanes[Lane::Pointer as usize].set_window(limits.pointer_sample_interval_ms);
        self.lanes[Lane::Input as usize].set_window(limits.input_debounce_ms);
        self.lanes[Lane::Change as usize].set_window(limits.input_debounce_ms);
        self.lanes[Lane::Scroll as usize].set_window(limits.scroll_debounce_ms);
        self.log.set_max_events(limits.max_events);
    }

    fn emit_staged(&mut self, staged: Staged, at: f64) {
        let marker = match &staged.interaction {
            Interaction::Input(change) => Some(("input", change.target.clone())),
            Interaction::Change(change) => Some(("change", change.target.clone())),
            _ => None,
        };
        let stored = self
            .log
            .append(at, EventBody::Interaction(staged.interaction))
            .is_some();
        if stored && staged.masked {
            self.log.stats.masked_input_events += 1;
        }
        if let Some((intent_type, target)) = marker {
            self.intent_marker(at, intent_type, target);
        }
    }

    fn intent_marker(&mut self, at: f64, intent_type: &str, target: String) {
        self.intent_seq += 1;
        let marker = IntentMarker {
            intent_type: intent_type.to_string(),
            intent_seq: self.intent_seq,
            target,
        };
        self.log
            .append(at, EventBody::Interaction(Interaction::IntentMarker(marker)));
    }

    fn emit_all(&mut self, mut items: Vec<(Staged, f64)>) {
        items.sort_by(|a, b| a.1.total_cmp(&b.1));
        for (staged, at) in items {
            self.emit_staged(staged, at);
        }
    }

    /// Emits pending lane items whose window has closed.
    fn drain_due(&mut self, now: f64) {
        let due: Vec<(Staged, f64)> = self.lanes.iter_mut().filter_map(|l| l.poll(now)).collect();
        self.emit_all(due);
    }

    fn flush_lanes(&mut self, now: f64, except: Option<Lane>) {
        let pending: Vec<(Staged, f64)> = self
            .lanes
            .iter_mut()
            .enumerate()
            .filter(|(i, _)| except.map(|e| e as usize != *i).unwrap_or(true))
            .filter_map(|(_, lane)| lane.take_pending(now))
            .collect();
        self.emit_all(pending);
    }

    fn stage(&mut self, lane: Lane, key: String, staged: Staged, now: f64) {
        let ready = self.lanes[lane as usize].offer(key, staged, now);
        if ready.is_empty() {
            return;
        }
        self.flush_lanes(now, Some(lane));
        for (staged, at) in ready {
            self.emit_staged(staged, at);
        }
    }

    /// Appends a record after flushing every pending lane.
    fn record(&mut self, now: f64, body: EventBody) -> Option<u64> {
        self.flush_lanes(now, None);
        self.log.append(now, body)
    }

    fn payload(&self) -> SessionPayload {
        SessionPayload {
            version: PAYLOAD_SCHEMA_VERSION,
            session_id: Some(self.session_id),
            created_at: Some(self.created_at),
            page: self.page.clone(),
            recording_config: Some(RecordingConfig {
                privacy: self.config.privacy.clone(),
                limits: self.config.limits.clone(),
            }),
            dropped_event_count: self.log.dropped(),
            redaction_stats: self.log.stats,
            event_count: self.log.len(),
            events: self.log.events().to_vec(),
        }
    }
}

/// State shared between a recorder and the callbacks it installs.
pub(crate) struct CaptureCore {
    clock: Arc<dyn Clock>,
    ignore: IgnorePredicate,
    state: Mutex<CaptureState>,
}

impl CaptureCore {
    fn handle(&self, page: &dyn PageView, signal: &Signal) {
        let now = self.clock.now_ms();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.recording {
            return;
        }
        state.drain_due(now);
        match signal {
            Signal::Mutations(records) => self.on_mutations(state, page, records, now),
            Signal::Dom(event) => self.on_dom_event(state, page, event, now),
            Signal::Navigation(signal) => on_navigation(state, page, signal, now),
        }
    }

    fn on_mutations(
        &self,
        state: &mut CaptureState,
        page: &dyn PageView,
        records: &[MutationRecord],
        now: f64,
    ) {
        for record in records {
            let described = MutationDescriber {
                doc: page.document(),
                policy: &state.policy,
                ignore: &*self.ignore,
                max_bytes: state.config.limits.max_mutation_payload_bytes,
                stats: &mut state.log.stats,
            }
            .describe(record, state.intent_seq);
            if let Some(mutation) = described {
                state.record(now, EventBody::Mutation(mutation));
            }
        }
    }

    fn on_dom_event(
        &self,
        state: &mut CaptureState,
        page: &dyn PageView,
        event: &DomEvent,
        now: f64,
    ) {
        let doc = page.document();
        let node = match event.target {
            EventTarget::Node(node) => Some(node),
            EventTarget::Document => None,
        };
        if let Some(node) = node {
            if (self.ignore)(doc, node) {
                return;
            }
            if state.policy.is_blocked(doc, node, None) {
                state.log.stats.blocked_node_events += 1;
                let blocked = BlockedInteraction {
                    blocked_event_type: dom_event_type(event.kind).to_string(),
                };
                state.record(now, EventBody::Interaction(Interaction::Blocked(blocked)));
                return;
            }
        }
        let target = node
            .map(|n| path_of(doc, n))
            .unwrap_or_else(|| DOCUMENT_PATH.to_string());
        let is_trusted = Some(event.is_trusted);

        match event.kind {
            DomEventKind::Click => {
                let pointer = pointer_data(page, event, node, target.clone());
                state.record(now, EventBody::Interaction(Interaction::Click(pointer)));
                state.intent_marker(now, "click", target);
                if let Some(intent) = node.and_then(|n| navigation_intent(page, n)) {
                    state.record(
                        now,
                        EventBody::Interaction(Interaction::NavigationIntent(intent)),
                    );
                }
            }
            DomEventKind::PointerMove => {
                let pointer = pointer_data(page, event, node, target);
                let staged = Staged {
                    interaction: Interaction::PointerMove(pointer),
                    masked: false,
                };
                state.stage(Lane::Pointer, String::new(), staged, now);
            }
            DomEventKind::Input | DomEventKind::Change => {
                let (value, masked) = extract_value(doc, &state.policy, node);
                let change = ValueChange {
                    target: target.clone(),
                    current_target: Some(DOCUMENT_PATH.to_string()),
                    is_trusted,
                    value,
                };
                let (lane, interaction) = if event.kind == DomEventKind::Input {
                    (Lane::Input, Interaction::Input(change))
                } else {
                    (Lane::Change, Interaction::Change(change))
                };
                state.stage(lane, target, Staged { interaction, masked }, now);
            }
            DomEventKind::Scroll => {
                let element = node.filter(|n| !doc.is_tag(*n, "html") && !doc.is_tag(*n, "body"));
                let offset = page.scroll_offset(element);
                let target = match element {
                    Some(_) => target,
                    None => DOCUMENT_PATH.to_string(),
                };
                let scroll = ScrollPosition {
                    target: target.clone(),
                    is_trusted,
                    scroll_x: offset.left,
                    scroll_y: offset.top,
                };
                let staged = Staged {
                    interaction: Interaction::Scroll(scroll),
                    masked: false,
                };
                state.stage(Lane::Scroll, target, staged, now);
            }
            DomEventKind::Submit => {
                let submit = Submit {
                    target: target.clone(),
                    is_trusted,
                    prevented: event.default_prevented,
                };
                state.record(now, EventBody::Interaction(Interaction::Submit(submit)));
                state.intent_marker(now, "submit", target);
            }
        }
    }

    fn record_history(&self, call: &HistoryCall) {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        if !state.recording {
            return;
        }
        state.drain_due(now);
        let change = HistoryChange {
            href: call.href.clone(),
            target_url: call.target_url.clone(),
            state: call.state.clone(),
        };
        let interaction = match call.kind {
            HistoryCallKind::Push => Interaction::HistoryPush(change),
            HistoryCallKind::Replace => Interaction::HistoryReplace(change),
        };
        state.record(now, EventBody::Interaction(interaction));
    }
}

fn dom_event_type(kind: DomEventKind) -> &'static str {
    match kind {
        DomEventKind::Click => "click",
        DomEventKind::PointerMove => "mousemove",
        DomEventKind::Input => "input",
        DomEventKind::Change => "change",
        DomEventKind::Scroll => "scroll",
        DomEventKind::Submit => "submit",
    }
}

fn on_navigation(state: &mut CaptureState, page: &dyn PageView, signal: &NavigationSignal, now: f64) {
    let location = page_location(page, signal);
    let interaction = match signal.kind {
        NavigationKind::HashChange => Interaction::HashChange(location),
        NavigationKind::PopState => Interaction::PopState(location),
        NavigationKind::BeforeUnload => Interaction::BeforeUnload(location),
        NavigationKind::PageHide => Interaction::PageHide(location),
        NavigationKind::PageShow => Interaction::PageShow(location),
        NavigationKind::VisibilityChange => Interaction::VisibilityChange(location),
    };
    state.record(now, EventBody::Interaction(interaction));
}

fn page_location(page: &dyn PageView, signal: &NavigationSignal) -> PageLocation {
    let url = page.location();
    PageLocation {
        href: url.to_string(),
        pathname: path_and_query(&url),
        hash: hash_of(&url),
        visibility_state: Some(page.visibility().as_str().to_string()),
        persisted: signal.persisted,
        state: signal.state.clone(),
    }
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}

fn hash_of(url: &Url) -> String {
    url.fragment()
        .filter(|f| !f.is_empty())
        .map(|f| format!("#{f}"))
        .unwrap_or_default()
}

fn pointer_data(
    page: &dyn PageView,
    event: &DomEvent,
    node: Option<NodeId>,
    target: String,
) -> Pointer {
    let viewport = page.viewport();
    let rect = node
        .and_then(|n| page.bounding_rect(n))
        .filter(|r| r.has_area());
    Pointer {
        target,
        current_target: Some(DOCUMENT_PATH.to_string()),
        is_trusted: Some(event.is_trusted),
        x: event.client_x,
        y: event.client_y,
        viewport_width: Some(viewport.width),
        viewport_height: Some(viewport.height),
        target_offset_x: rect.map(|r| event.client_x - r.left),
        target_offset_y: rect.map(|r| event.client_y - r.top),
        target_width: rect.map(|r| r.width),
        target_height: rect.map(|r| r.height),
        button: event.button,
    }
}

fn navigation_intent(page: &dyn PageView, node: NodeId) -> Option<NavigationIntent> {
    let doc = page.document();
    let anchor = doc.closest(node, |el| el.tag() == "a" && el.has_attr("href"))?;
    let href = doc.attr(anchor, "href")?;
    let location = page.location();
    let resolved = match location.join(href) {
        Ok(url) => url,
        Err(err) => {
            tracing::debug!(href, error = %err, "Unresolvable link target");
            return None;
        }
    };
    let target_blank = doc
        .attr(anchor, "target")
        .is_some_and(|t| t.eq_ignore_ascii_case("_blank"));
    Some(NavigationIntent {
        target: path_of(doc, anchor),
        pathname: resolved.path().to_string(),
        hash: hash_of(&resolved),
        target_blank,
        same_origin: resolved.origin() == location.origin(),
        href: resolved.to_string(),
    })
}

/// Value of a form control as it may be stored, and whether it was masked.
fn extract_value(
    doc: &Document,
    policy: &CompiledPolicy,
    node: Option<NodeId>,
) -> (Option<String>, bool) {
    let Some(node) = node.filter(|n| classify_form_control(doc, *n) != FormControl::None) else {
        return (None, false);
    };
    let value = doc.value(node).unwrap_or_default();
    if !value.is_empty() && policy.classify(doc, node, None).is_masked() {
        (Some(mask_value(&value)), true)
    } else {
        (Some(value), false)
    }
}

fn take_snapshot<P: PageView + ?Sized>(
    page: &P,
    policy: &CompiledPolicy,
    ignore: &IgnorePredicate,
) -> (Snapshot, u64) {
    let doc = page.document();
    let (html, report) = Redactor::new(doc, policy)
        .skipping(&**ignore)
        .document_html();
    let location = page.location();
    let frames = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|n| doc.is_tag(*n, "iframe") || doc.is_tag(*n, "frame"))
        .filter(|n| !ignore(doc, *n) && !policy.is_blocked(doc, *n, None))
        .map(|frame| describe_frame(page, &location, frame))
        .collect();
    let snapshot = Snapshot {
        reason: INITIAL_SNAPSHOT_REASON.to_string(),
        url: location.to_string(),
        viewport: page.viewport(),
        frames,
        html,
    };
    let redacted = (report.blocked + report.masked_text + report.masked_values) as u64;
    (snapshot, redacted)
}

fn describe_frame<P: PageView + ?Sized>(page: &P, location: &Url, frame: NodeId) -> FrameDescriptor {
    let doc = page.document();
    let declared_src = doc
        .attr(frame, "src")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let resolved_src = page.frame_resolved_src(frame).or_else(|| {
        declared_src
            .as_deref()
            .and_then(|src| location.join(src).ok())
            .map(|url| url.to_string())
    });
    let is_cross_origin = resolved_src
        .as_deref()
        .and_then(|src| Url::parse(src).ok())
        .filter(|url| url.scheme() != "about")
        .is_some_and(|url| url.origin() != location.origin());
    FrameDescriptor {
        path: path_of(doc, frame),
        declared_src,
        resolved_src,
        is_cross_origin,
    }
}

/// Records one page session at a time.
pub struct Recorder {
    core: Arc<CaptureCore>,
    listeners: Vec<ListenerId>,
    /// Set when this recorder installed the history hook it must remove.
    owns_history: bool,
}

impl Recorder {
    pub fn new(config: Config) -> Self {
        Self::with_options(config, RecorderOptions::default())
    }

    pub fn with_options(config: Config, options: RecorderOptions) -> Self {
        Self {
            core: Arc::new(CaptureCore {
                clock: options.clock,
                ignore: options.ignore,
                state: Mutex::new(CaptureState::new(config)),
            }),
            listeners: Vec::new(),
            owns_history: false,
        }
    }

    pub fn config(&self) -> Config {
        self.core.state.lock().config.clone()
    }

    /// Merges `patch` into the running configuration and returns the result.
    pub fn apply_config(&self, patch: &ConfigPatch) -> Config {
        let mut state = self.core.state.lock();
        state.apply_config(patch);
        state.config.clone()
    }

    pub fn is_recording(&self) -> bool {
        self.core.state.lock().recording
    }

    /// Starts recording `host`. Does nothing if already recording.
    pub fn start(&mut self, host: &mut dyn CaptureHost) {
        let now = self.core.clock.now_ms();
        {
            let mut guard = self.core.state.lock();
            let state = &mut *guard;
            if state.recording {
                tracing::debug!("Recorder already started");
                return;
            }
            let page = PageIdentity {
                href: host.location().to_string(),
                agent: host.user_agent(),
            };
            state.reset(now, page);
            let (snapshot, redacted) = take_snapshot(host, &state.policy, &self.core.ignore);
            state.log.stats.redacted_serialized_nodes += redacted;
            state.log.append(now, EventBody::Snapshot(snapshot));
            state.recording = true;
        }

        let core = Arc::clone(&self.core);
        let callback: SignalCallback =
            Arc::new(move |page: &dyn PageView, signal: &Signal| core.handle(page, signal));
        for registration in registrations() {
            match host.register(registration.clone(), Arc::clone(&callback)) {
                Ok(id) => self.listeners.push(id),
                Err(err) => {
                    tracing::warn!(error = %err, ?registration, "Failed to attach capture listener");
                }
            }
        }

        let core = Arc::clone(&self.core);
        let installed = host
            .history()
            .install(Arc::new(move |call: &HistoryCall| core.record_history(call)));
        if !installed {
            tracing::debug!("History interception already installed");
        }
        self.owns_history = installed;
        tracing::info!(listeners = self.listeners.len(), "Recording started");
    }

    /// Detaches from `host` and writes the closing meta event. Does nothing
    /// if not recording.
    pub fn stop(&mut self, host: &mut dyn CaptureHost) {
        if !self.is_recording() {
            return;
        }
        for id in self.listeners.drain(..) {
            if !host.unregister(id) {
                tracing::debug!(listener = %id, "Listener already removed");
            }
        }
        if std::mem::take(&mut self.owns_history) {
            host.history().uninstall();
        }

        let now = self.core.clock.now_ms();
        let mut state = self.core.state.lock();
        state.flush_lanes(now, None);
        let meta = Meta {
            action: RECORDING_STOPPED_ACTION.to_string(),
            dropped_event_count: Some(state.log.dropped()),
            redaction_stats: Some(state.log.stats),
        };
        state.log.append(now, EventBody::Meta(meta));
        state.recording = false;
        tracing::info!(
            events = state.log.len(),
            dropped = state.log.dropped(),
            "Recording stopped"
        );
    }

    /// Emits rate-limited events whose window has closed. Hosts with timers
    /// call this when they fire.
    pub fn tick(&self) {
        let now = self.core.clock.now_ms();
        let mut state = self.core.state.lock();
        if state.recording {
            state.drain_due(now);
        }
    }

    /// Everything captured so far, or `None` before the first start.
    pub fn payload(&self) -> Option<SessionPayload> {
        let state = self.core.state.lock();
        state.started.then(|| state.payload())
    }
}

fn registrations() -> Vec<Registration> {
    let mut registrations = vec![Registration::Mutations(ObserveOptions::everything())];
    for kind in [
        DomEventKind::Click,
        DomEventKind::PointerMove,
        DomEventKind::Input,
        DomEventKind::Change,
        DomEventKind::Submit,
        DomEventKind::Scroll,
    ] {
        registrations.push(Registration::Listener {
            kind,
            target: ListenTarget::Document,
            capture: true,
            passive: kind != DomEventKind::Submit,
        });
    }
    registrations.extend(NavigationKind::ALL.into_iter().map(Registration::Navigation));
    registrations
}
