pub mod analysis;
pub mod capture;
pub mod clock;
pub mod config;
pub mod dom;
pub mod path;
pub mod payload;
pub mod privacy;
pub mod replay;

pub use analysis::{Analysis, BehaviorSummarizer};
pub use capture::{CaptureHost, MemoryPage, PageView, Recorder, RecorderOptions};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{Config, ConfigError, ConfigPatch, ScriptMode};
pub use dom::{Document, NodeId};
pub use payload::{Event, EventBody, PayloadError, SessionPayload};
pub use privacy::CompiledPolicy;
pub use replay::{
    HeadlessSurface, PlayOptions, PlaybackOutcome, PlaybackState, ReplayError, Replayer, Surface,
};
