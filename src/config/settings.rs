use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("domreel.toml.example");

pub const MIN_MAX_EVENTS: usize = 1000;
pub const MIN_MUTATION_PAYLOAD_BYTES: usize = 2000;
pub const MIN_POINTER_SAMPLE_INTERVAL_MS: u64 = 1;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Engine configuration shared by the recorder and the replayer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Redaction policy applied at every capture site
    pub privacy: PrivacyConfig,
    /// Replay surface behavior
    pub replay: ReplayConfig,
    /// Capture buffering and throttling limits
    pub limits: Limits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivacyConfig {
    /// Mask the value of every text-like form control
    pub mask_all_inputs: bool,
    /// Elements (and their subtrees) whose content is never captured
    pub block_selectors: Vec<String>,
    /// Elements whose text content is replaced with a marker
    pub mask_text_selectors: Vec<String>,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            mask_all_inputs: true,
            block_selectors: [
                ".rr-block",
                ".rr-mask",
                ".clarity-mask",
                "[data-clarity-mask='true']",
                "[data-rr-block='true']",
                "[data-sr-block='true']",
                "[data-private='true']",
                "[data-sensitive='true']",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            mask_text_selectors: [
                ".rr-mask",
                ".clarity-mask",
                "[data-rr-mask='true']",
                "[data-clarity-mask='true']",
                "[data-sr-mask='true']",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Whether recorded page scripts may run inside the replay surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptMode {
    On,
    #[default]
    Off,
}

impl ScriptMode {
    pub fn allows_scripts(self) -> bool {
        self == ScriptMode::On
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplayConfig {
    pub script_mode: ScriptMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Limits {
    /// Non-meta events kept before new ones are dropped and counted
    pub max_events: usize,
    /// Largest serialized mutation fragment kept verbatim
    #[serde(alias = "maxMutationHtmlBytes")]
    pub max_mutation_payload_bytes: usize,
    /// Minimum spacing between recorded pointer moves
    #[serde(alias = "mousemoveSampleMs")]
    pub pointer_sample_interval_ms: u64,
    pub scroll_debounce_ms: u64,
    pub input_debounce_ms: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_events: 20_000,
            max_mutation_payload_bytes: 120_000,
            pointer_sample_interval_ms: 20,
            scroll_debounce_ms: 120,
            input_debounce_ms: 120,
        }
    }
}

/// Partial privacy settings; absent fields keep the current value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyPatch {
    pub mask_all_inputs: Option<bool>,
    pub block_selectors: Option<Vec<String>>,
    pub mask_text_selectors: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayPatch {
    #[serde(default, deserialize_with = "deserialize_script_mode")]
    pub script_mode: Option<ScriptMode>,
}

/// Numeric limits arrive as JSON numbers, possibly fractional; they are
/// floored and clamped on merge.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitsPatch {
    pub max_events: Option<f64>,
    #[serde(alias = "maxMutationHtmlBytes")]
    pub max_mutation_payload_bytes: Option<f64>,
    #[serde(alias = "mousemoveSampleMs")]
    pub pointer_sample_interval_ms: Option<f64>,
    pub scroll_debounce_ms: Option<f64>,
    pub input_debounce_ms: Option<f64>,
}

/// A partial configuration as accepted by `apply_config`.
///
/// Unknown keys are ignored; recognized sections merge shallowly.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    pub privacy: Option<PrivacyPatch>,
    pub replay: Option<ReplayPatch>,
    pub limits: Option<LimitsPatch>,
}

fn deserialize_script_mode<'de, D>(deserializer: D) -> Result<Option<ScriptMode>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Flag(true)) => Some(ScriptMode::On),
        Some(Raw::Flag(false)) => Some(ScriptMode::Off),
        Some(Raw::Text(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "on" => Some(ScriptMode::On),
            "off" => Some(ScriptMode::Off),
            _ => None,
        },
        None => None,
    })
}

fn clean_selectors(selectors: &[String]) -> Vec<String> {
    selectors
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn clamp_count(value: Option<f64>, current: usize, min: usize) -> usize {
    match value.filter(|v| v.is_finite()) {
        Some(v) => (v.floor().max(0.0) as usize).max(min),
        None => current,
    }
}

fn clamp_ms(value: Option<f64>, current: u64, min: u64) -> u64 {
    match value.filter(|v| v.is_finite()) {
        Some(v) => (v.floor().max(0.0) as u64).max(min),
        None => current,
    }
}

impl ConfigPatch {
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load a patch from a `.json` or `.toml` file, by extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::from_json_str(&contents)
        } else {
            Self::from_toml_str(&contents)
        }
    }
}

impl Config {
    /// Apply a partial configuration on top of this one
    pub fn merge(&mut self, patch: &ConfigPatch) {
        // Privacy: selector lists replace wholesale
        if let Some(privacy) = &patch.privacy {
            if let Some(mask_all_inputs) = privacy.mask_all_inputs {
                self.privacy.mask_all_inputs = mask_all_inputs;
            }
            if let Some(block) = &privacy.block_selectors {
                self.privacy.block_selectors = clean_selectors(block);
            }
            if let Some(mask_text) = &privacy.mask_text_selectors {
                self.privacy.mask_text_selectors = clean_selectors(mask_text);
            }
        }

        if let Some(replay) = &patch.replay {
            if let Some(script_mode) = replay.script_mode {
                self.replay.script_mode = script_mode;
            }
        }

        // Limits: floored, then clamped to their minimums
        if let Some(limits) = &patch.limits {
            self.limits.max_events =
                clamp_count(limits.max_events, self.limits.max_events, MIN_MAX_EVENTS);
            self.limits.max_mutation_payload_bytes = clamp_count(
                limits.max_mutation_payload_bytes,
                self.limits.max_mutation_payload_bytes,
                MIN_MUTATION_PAYLOAD_BYTES,
            );
            self.limits.pointer_sample_interval_ms = clamp_ms(
                limits.pointer_sample_interval_ms,
                self.limits.pointer_sample_interval_ms,
                MIN_POINTER_SAMPLE_INTERVAL_MS,
            );
            self.limits.scroll_debounce_ms =
                clamp_ms(limits.scroll_debounce_ms, self.limits.scroll_debounce_ms, 0);
            self.limits.input_debounce_ms =
                clamp_ms(limits.input_debounce_ms, self.limits.input_debounce_ms, 0);
        }
    }

    pub fn merged(&self, patch: &ConfigPatch) -> Config {
        let mut config = self.clone();
        config.merge(patch);
        config
    }

    /// Defaults with an optional patch file applied
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        if let Some(path) = path {
            config.merge(&ConfigPatch::load(path)?);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.privacy.mask_all_inputs);
        assert_eq!(config.privacy.block_selectors.len(), 8);
        assert_eq!(config.privacy.mask_text_selectors.len(), 5);
        assert_eq!(config.replay.script_mode, ScriptMode::Off);
        assert_eq!(config.limits.max_events, 20_000);
        assert_eq!(config.limits.pointer_sample_interval_ms, 20);
    }

    #[test]
    fn test_merge_is_shallow_and_ignores_unknown_keys() {
        let patch = ConfigPatch::from_json_str(
            r#"{
                "privacy": { "maskAllInputs": false, "blockSelectors": [" .secret ", ""] },
                "replay": { "scriptMode": "on" },
                "unknown": { "anything": 1 }
            }"#,
        )
        .unwrap();
        let config = Config::default().merged(&patch);
        assert!(!config.privacy.mask_all_inputs);
        assert_eq!(config.privacy.block_selectors, vec![".secret".to_string()]);
        assert_eq!(
            config.privacy.mask_text_selectors,
            PrivacyConfig::default().mask_text_selectors
        );
        assert_eq!(config.replay.script_mode, ScriptMode::On);
        assert_eq!(config.limits, Limits::default());
    }

    #[test]
    fn test_limits_are_floored_and_clamped() {
        let patch = ConfigPatch::from_json_str(
            r#"{ "limits": {
                "maxEvents": 10,
                "maxMutationPayloadBytes": 4096.9,
                "pointerSampleIntervalMs": 0,
                "scrollDebounceMs": -5,
                "inputDebounceMs": 33.7
            } }"#,
        )
        .unwrap();
        let config = Config::default().merged(&patch);
        assert_eq!(config.limits.max_events, MIN_MAX_EVENTS);
        assert_eq!(config.limits.max_mutation_payload_bytes, 4096);
        assert_eq!(config.limits.pointer_sample_interval_ms, 1);
        assert_eq!(config.limits.scroll_debounce_ms, 0);
        assert_eq!(config.limits.input_debounce_ms, 33);
    }

    #[test]
    fn test_legacy_limit_names_and_boolean_script_mode() {
        let patch = ConfigPatch::from_json_str(
            r#"{ "limits": { "maxMutationHtmlBytes": 5000, "mousemoveSampleMs": 50 },
                 "replay": { "scriptMode": true } }"#,
        )
        .unwrap();
        let config = Config::default().merged(&patch);
        assert_eq!(config.limits.max_mutation_payload_bytes, 5000);
        assert_eq!(config.limits.pointer_sample_interval_ms, 50);
        assert_eq!(config.replay.script_mode, ScriptMode::On);

        let bogus = ConfigPatch::from_json_str(r#"{ "replay": { "scriptMode": "maybe" } }"#).unwrap();
        assert_eq!(config.merged(&bogus).replay.script_mode, ScriptMode::On);
    }

    #[test]
    fn test_example_config_parses() {
        let patch = ConfigPatch::from_toml_str(EXAMPLE_CONFIG).unwrap();
        let config = Config::default().merged(&patch);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempdir().unwrap();
        let toml_path = dir.path().join("domreel.toml");
        fs::write(&toml_path, "[limits]\nmaxEvents = 5000\n").unwrap();
        assert_eq!(Config::load(Some(&toml_path)).unwrap().limits.max_events, 5000);

        let json_path = dir.path().join("domreel.json");
        fs::write(&json_path, r#"{"limits":{"maxEvents":6000}}"#).unwrap();
        assert_eq!(Config::load(Some(&json_path)).unwrap().limits.max_events, 6000);

        fs::write(&json_path, "{not json").unwrap();
        assert!(matches!(Config::load(Some(&json_path)), Err(ConfigError::Json(_))));
    }
}
