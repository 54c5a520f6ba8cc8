mod settings;

pub use settings::{
    Config, ConfigError, ConfigPatch, Limits, LimitsPatch, PrivacyConfig, PrivacyPatch,
    ReplayConfig, ReplayPatch, ScriptMode, EXAMPLE_CONFIG, MIN_MAX_EVENTS,
    MIN_MUTATION_PAYLOAD_BYTES, MIN_POINTER_SAMPLE_INTERVAL_MS,
};
