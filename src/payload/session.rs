use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{Limits, PrivacyConfig};

use super::event::{Event, EventBody, Snapshot};

pub const PAYLOAD_SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported payload version {0}")]
    UnsupportedVersion(u32),

    #[error("Invalid payload: {0}")]
    Invalid(String),
}

/// Redaction counters accumulated over one recording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedactionStats {
    pub masked_input_events: u64,
    pub masked_mutation_values: u64,
    pub redacted_serialized_nodes: u64,
    pub blocked_node_events: u64,
    pub blocked_mutations: u64,
    pub truncated_mutation_html: u64,
}

impl RedactionStats {
    pub fn total(&self) -> u64 {
        self.masked_input_events
            + self.masked_mutation_values
            + self.redacted_serialized_nodes
            + self.blocked_node_events
            + self.blocked_mutations
            + self.truncated_mutation_html
    }
}

/// The page a recording was taken from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageIdentity {
    #[serde(default)]
    pub href: String,
    #[serde(default, alias = "userAgent")]
    pub agent: String,
}

/// Configuration in effect while recording, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingConfig {
    #[serde(default)]
    pub privacy: PrivacyConfig,
    #[serde(default)]
    pub limits: Limits,
}

/// An exported recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page: PageIdentity,
    #[serde(default)]
    pub recording_config: Option<RecordingConfig>,
    #[serde(default)]
    pub dropped_event_count: u64,
    #[serde(default)]
    pub redaction_stats: RedactionStats,
    #[serde(default)]
    pub event_count: usize,
    pub events: Vec<Event>,
}

fn default_version() -> u32 {
    PAYLOAD_SCHEMA_VERSION
}

impl SessionPayload {
    pub fn from_json_str(contents: &str) -> Result<Self, PayloadError> {
        let payload: SessionPayload = serde_json::from_str(contents)?;
        payload.validate()?;
        Ok(payload)
    }

    pub fn from_json_value(value: serde_json::Value) -> Result<Self, PayloadError> {
        let payload: SessionPayload = serde_json::from_value(value)?;
        payload.validate()?;
        Ok(payload)
    }

    pub fn to_json_pretty(&self) -> Result<String, PayloadError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn read_from_path(path: &Path) -> Result<Self, PayloadError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn write_to_path(&self, path: &Path) -> Result<(), PayloadError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Checks the shape a replay depends on. A payload without a snapshot
    /// is still loadable; playing it fails later.
    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.version == 0 || self.version > PAYLOAD_SCHEMA_VERSION {
            return Err(PayloadError::UnsupportedVersion(self.version));
        }
        let snapshots = self
            .events
            .iter()
            .filter(|e| matches!(e.body, EventBody::Snapshot(_)))
            .count();
        if snapshots > 1 {
            return Err(PayloadError::Invalid(format!(
                "expected one snapshot event, found {snapshots}"
            )));
        }
        if snapshots == 1 && !matches!(self.events.first().map(|e| &e.body), Some(EventBody::Snapshot(_))) {
            return Err(PayloadError::Invalid(
                "snapshot must be the first event".to_string(),
            ));
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.events.iter().find_map(|event| match &event.body {
            EventBody::Snapshot(snapshot) => Some(snapshot),
            _ => None,
        })
    }

    /// `session-recording-YYYYMMDD-HHMMSS.json`, from `created_at` or now.
    pub fn default_file_name(&self) -> String {
        let at = self.created_at.unwrap_or_else(Utc::now);
        format!("session-recording-{}.json", at.format("%Y%m%d-%H%M%S"))
    }
}
