//! Session payload schema: the JSON contract between capture and replay.

pub mod event;
pub mod session;

pub use event::{
    BlockedInteraction, Event, EventBody, EventKind, FrameDescriptor, HistoryChange,
    IntentMarker, Interaction, Meta, Mutation, MutationChange, NavigationIntent, PageLocation,
    Pointer, ScrollPosition, SerializedNode, Snapshot, Submit, ValueChange,
    INITIAL_SNAPSHOT_REASON, RECORDING_STOPPED_ACTION,
};
pub use session::{
    PageIdentity, PayloadError, RecordingConfig, RedactionStats, SessionPayload,
    PAYLOAD_SCHEMA_VERSION,
};
