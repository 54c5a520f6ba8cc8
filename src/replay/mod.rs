//! Session replay: sanitized rendering, mutation patching and timed
//! interaction playback.

pub mod frames;
pub mod headless;
pub mod interact;
pub mod overlay;
pub mod patch;
pub mod replayer;
pub mod sanitize;
pub mod surface;
pub mod timeline;

pub use frames::{FrameRestoreReport, FRAME_RESTORE_WAIT, PLACEHOLDER_ATTRIBUTE};
pub use headless::{DispatchedEvent, FrameBehavior, HeadlessSurface};
pub use interact::{apply_interaction, map_pointer};
pub use overlay::{Overlay, POINTER_LAYER_ID};
pub use patch::{apply_mutation, PatchOutcome};
pub use replayer::{
    PlayOptions, PlaybackOutcome, PlaybackState, PlaybackStatus, ReplayError, Replayer,
};
pub use sanitize::{sanitize_document_html, sanitize_tree};
pub use surface::{
    DispatchOutcome, FrameLoad, Sandbox, Surface, SurfaceError, SyntheticEvent, SyntheticKind,
};
pub use timeline::{
    build_timeline, clamp_speed, run_timeline, step_delay, PlaybackReport, StepApplier,
    TimelineOutcome, MIN_SPEED,
};
