//! Session capture: host abstraction, event log and the recorder.

pub mod describe;
pub mod history;
pub mod host;
pub mod log;
pub mod memory;
pub mod recorder;
pub mod throttle;

pub use describe::TRUNCATED_HTML;
pub use history::{
    HistoryApi, HistoryCall, HistoryCallKind, HistoryHook, HistoryInterception,
    InterceptableHistory, SessionHistory,
};
pub use host::{
    CaptureHost, DomEvent, DomEventKind, EventTarget, HostError, ListenTarget, ListenerId,
    MutationKind, MutationRecord, NavigationKind, NavigationSignal, ObserveOptions, PageView,
    Registration, Signal, SignalCallback, Visibility,
};
pub use log::CaptureLog;
pub use memory::MemoryPage;
pub use recorder::{
    ignore_none, ignore_subtrees, IgnorePredicate, Recorder, RecorderOptions, TOOL_UI_IDS,
};
