//! Behavior analysis hook.
//!
//! The engines never call a summarizer; hosts that want one plug it in and
//! feed it exported payloads.

use serde::{Deserialize, Serialize};

use crate::payload::SessionPayload;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Structured digest of the session.
    pub summary: serde_json::Value,
    /// Prompt text derived from the digest.
    pub prompt: String,
}

/// Turns a recorded session into an analysis request.
pub trait BehaviorSummarizer: Send + Sync {
    fn summarize(&self, payload: &SessionPayload) -> Analysis;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{EventKind, PageIdentity};
    use serde_json::json;

    struct CountingSummarizer;

    impl BehaviorSummarizer for CountingSummarizer {
        fn summarize(&self, payload: &SessionPayload) -> Analysis {
            let interactions = payload
                .events
                .iter()
                .filter(|e| e.kind() == EventKind::Interaction)
                .count();
            Analysis {
                summary: json!({ "href": payload.page.href, "interactions": interactions }),
                prompt: format!("Describe {interactions} interactions on {}", payload.page.href),
            }
        }
    }

    #[test]
    fn test_summarizer_is_object_safe() {
        let payload = SessionPayload {
            version: 1,
            session_id: None,
            created_at: None,
            page: PageIdentity {
                href: "https://shop.example/".into(),
                agent: "test".into(),
            },
            recording_config: None,
            dropped_event_count: 0,
            redaction_stats: Default::default(),
            event_count: 0,
            events: Vec::new(),
        };
        let summarizer: Box<dyn BehaviorSummarizer> = Box::new(CountingSummarizer);
        let analysis = summarizer.summarize(&payload);
        assert_eq!(analysis.summary["interactions"], 0);
        assert!(analysis.prompt.contains("shop.example"));
    }
}
