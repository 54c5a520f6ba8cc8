//! Replay engine: loads a payload, renders its snapshot into a surface and
//! plays the timeline back.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ConfigPatch};
use crate::payload::{Event, EventBody, PayloadError, SessionPayload};
use crate::privacy::CompiledPolicy;

use super::frames::restore_frames;
use super::interact::apply_interaction;
use super::overlay::Overlay;
use super::patch::{apply_mutation, PatchOutcome};
use super::sanitize::sanitize_document_html;
use super::surface::{Sandbox, Surface, SurfaceError};
use super::timeline::{build_timeline, run_timeline, PlaybackReport, StepApplier, TimelineOutcome};

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] PayloadError),

    #[error("No payload loaded")]
    NotLoaded,

    #[error("Payload has no snapshot event")]
    MissingSnapshot,

    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Loaded,
    Playing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackOutcome {
    Completed(PlaybackReport),
    Stopped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    /// How the most recent run ended, if one has.
    pub last_outcome: Option<PlaybackOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayOptions {
    /// Playback rate; clamped to at least 0.1.
    pub speed: f64,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self { speed: 1.0 }
    }
}

impl PlayOptions {
    pub fn at_speed(speed: f64) -> Self {
        Self { speed }
    }
}

/// Applies timeline steps to a shared surface.
struct SurfaceApplier<S> {
    surface: Arc<Mutex<S>>,
    policy: CompiledPolicy,
    allow_scripts: bool,
    overlay: Overlay,
}

impl<S: Surface> SurfaceApplier<S> {
    fn apply_now(&mut self, event: &Event) {
        let mut surface = self.surface.lock();
        self.overlay
            .expire(surface.document_mut(), event.time_offset_ms);
        match &event.body {
            EventBody::Mutation(mutation) => {
                let outcome = apply_mutation(surface.document_mut(), mutation, self.allow_scripts);
                if outcome != PatchOutcome::Applied {
                    tracing::debug!(
                        event_id = event.id,
                        outcome = ?outcome,
                        "Mutation not applied"
                    );
                }
            }
            EventBody::Interaction(interaction) => {
                apply_interaction(
                    &mut *surface,
                    &mut self.overlay,
                    &self.policy,
                    interaction,
                    event.time_offset_ms,
                );
            }
            EventBody::Snapshot(_) | EventBody::Meta(_) => {}
        }
    }

    fn finish(&mut self) {
        let mut surface = self.surface.lock();
        self.overlay.clear_transient(surface.document_mut());
    }
}

#[async_trait]
impl<S: Surface> StepApplier for SurfaceApplier<S> {
    async fn apply(&mut self, event: &Event) {
        self.apply_now(event);
        // Let the surface settle before the next delay is scheduled.
        tokio::task::yield_now().await;
    }
}

/// Plays recorded sessions into a surface it owns.
///
/// State machine: `Idle -> Loaded -> Playing -> Loaded`. Stopping or
/// finishing a run returns to `Loaded` so the session can be played again.
pub struct Replayer<S: Surface> {
    surface: Arc<Mutex<S>>,
    payload: Option<Arc<SessionPayload>>,
    config: Config,
    apply_mutations: bool,
    status: Arc<watch::Sender<PlaybackStatus>>,
    generation: Arc<AtomicU64>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    cursor: Arc<AtomicUsize>,
}

impl<S: Surface> Replayer<S> {
    pub fn new(surface: S, config: Config) -> Self {
        let (status, _) = watch::channel(PlaybackStatus::default());
        Self {
            surface: Arc::new(Mutex::new(surface)),
            payload: None,
            config,
            apply_mutations: true,
            status: Arc::new(status),
            generation: Arc::new(AtomicU64::new(0)),
            cancel: CancellationToken::new(),
            task: None,
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replaces the loaded session. An invalid payload leaves the replayer
    /// untouched.
    pub fn load(&mut self, payload: SessionPayload) -> Result<(), ReplayError> {
        payload.validate()?;
        if self.state() == PlaybackState::Playing {
            self.stop();
        }
        tracing::info!(
            events = payload.events.len(),
            session_id = ?payload.session_id,
            "Loaded session"
        );
        self.payload = Some(Arc::new(payload));
        self.cursor.store(0, Ordering::SeqCst);
        self.status.send_replace(PlaybackStatus {
            state: PlaybackState::Loaded,
            last_outcome: None,
        });
        Ok(())
    }

    pub fn load_json(&mut self, contents: &str) -> Result<(), ReplayError> {
        let payload = SessionPayload::from_json_str(contents)?;
        self.load(payload)
    }

    /// Renders the snapshot and starts playing. Returns once the snapshot
    /// has rendered; the timeline continues in the background.
    pub async fn play(&mut self, options: PlayOptions) -> Result<(), ReplayError> {
        if self.state() == PlaybackState::Playing {
            return Ok(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::debug!(error = %err, "Previous playback task ended abnormally");
            }
        }

        let payload = self.payload.clone().ok_or(ReplayError::NotLoaded)?;
        let snapshot = payload.snapshot().ok_or(ReplayError::MissingSnapshot)?;
        let timeline = build_timeline(&payload.events, self.apply_mutations);
        if timeline.is_empty() {
            tracing::info!("Session has no replayable events");
            return Ok(());
        }

        let allow_scripts = self.config.replay.script_mode.allows_scripts();
        let html = sanitize_document_html(&snapshot.html, Some(&snapshot.url), allow_scripts);
        let render = {
            let mut surface = self.surface.lock();
            surface.set_sandbox(Sandbox::new(allow_scripts));
            surface.set_viewport(snapshot.viewport);
            surface.render(&html)
        };
        if let Err(err) = render.await {
            tracing::warn!(error = %err, "Snapshot render failed");
            self.status.send_replace(PlaybackStatus {
                state: PlaybackState::Loaded,
                last_outcome: Some(PlaybackOutcome::Failed(err.to_string())),
            });
            return Err(err.into());
        }

        let mut overlay = Overlay::new();
        overlay.attach(self.surface.lock().document_mut());
        let mut applier = SurfaceApplier {
            surface: Arc::clone(&self.surface),
            policy: CompiledPolicy::compile(&self.config.privacy),
            allow_scripts,
            overlay,
        };

        self.cancel = CancellationToken::new();
        self.cursor.store(0, Ordering::SeqCst);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.status.send_replace(PlaybackStatus {
            state: PlaybackState::Playing,
            last_outcome: None,
        });
        tracing::info!(
            steps = timeline.len(),
            speed = options.speed,
            mutations = self.apply_mutations,
            "Replay started"
        );

        let surface = Arc::clone(&self.surface);
        let frames = snapshot.frames.clone();
        let cancel = self.cancel.clone();
        let cursor = Arc::clone(&self.cursor);
        let status = Arc::clone(&self.status);
        let generations = Arc::clone(&self.generation);
        let speed = options.speed;

        self.task = Some(tokio::spawn(async move {
            let (frames_report, outcome) = tokio::join!(
                restore_frames(&surface, &frames, &cancel),
                run_timeline(&timeline, speed, &mut applier, &cancel, &cursor),
            );
            applier.finish();
            tracing::debug!(
                restored = frames_report.restored,
                placeholders = frames_report.placeholders,
                missing = frames_report.missing,
                "Frames restored"
            );

            if generations.load(Ordering::SeqCst) != generation {
                return;
            }
            let outcome = match outcome {
                TimelineOutcome::Completed(report) => {
                    tracing::info!(applied = report.applied.len(), "Replay completed");
                    PlaybackOutcome::Completed(report)
                }
                TimelineOutcome::Cancelled(_) => PlaybackOutcome::Stopped,
            };
            status.send_replace(PlaybackStatus {
                state: PlaybackState::Loaded,
                last_outcome: Some(outcome),
            });
        }));
        Ok(())
    }

    /// Cancels any pending step and rewinds. Safe to call in any state.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cursor.store(0, Ordering::SeqCst);

        let was_playing = self.state() == PlaybackState::Playing;
        let state = if self.payload.is_some() {
            PlaybackState::Loaded
        } else {
            PlaybackState::Idle
        };
        self.status.send_modify(|status| {
            status.state = state;
            if was_playing {
                status.last_outcome = Some(PlaybackOutcome::Stopped);
            }
        });
        if was_playing {
            tracing::info!("Replay stopped");
        }
    }

    /// Merges `patch` into the configuration used by the next `play`.
    pub fn apply_config(&mut self, patch: &ConfigPatch) -> Config {
        self.config.merge(patch);
        self.config.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether recorded mutations are replayed (on by default).
    pub fn set_apply_mutations(&mut self, enabled: bool) {
        self.apply_mutations = enabled;
    }

    pub fn state(&self) -> PlaybackState {
        self.status.borrow().state
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackStatus> {
        self.status.subscribe()
    }

    /// Resolves once no run is in progress.
    pub async fn wait_until_idle(&self) -> PlaybackStatus {
        let mut rx = self.status.subscribe();
        let status = match rx.wait_for(|status| status.state != PlaybackState::Playing).await {
            Ok(status) => status.clone(),
            Err(_) => self.status(),
        };
        status
    }

    /// Index of the next timeline step.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    pub fn payload(&self) -> Option<&SessionPayload> {
        self.payload.as_deref()
    }

    pub fn surface(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.surface)
    }
}

impl<S: Surface> Drop for Replayer<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::headless::HeadlessSurface;
    use serde_json::json;

    fn payload() -> SessionPayload {
        SessionPayload::from_json_value(json!({
            "version": 1,
            "page": { "href": "https://shop.example/", "agent": "test" },
            "events": [
                { "id": 1, "type": "snapshot", "at": 0.0, "timeOffsetMs": 0.0, "data": {
                    "reason": "initial", "url": "https://shop.example/",
                    "viewport": { "width": 800.0, "height": 600.0 },
                    "html": "<html><head></head><body><div id=\"pane\"></div></body></html>"
                }},
                { "id": 2, "type": "event", "at": 100.0, "timeOffsetMs": 100.0, "data": {
                    "eventType": "scroll", "target": "#pane", "scrollX": 0.0, "scrollY": 30.0
                }},
                { "id": 3, "type": "mutation", "at": 400.0, "timeOffsetMs": 400.0, "data": {
                    "target": "#pane", "mutationType": "attributes",
                    "attributeName": "class", "newValue": "open"
                }}
            ]
        }))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_to_completion() {
        let mut replayer = Replayer::new(HeadlessSurface::new(), Config::default());
        assert_eq!(replayer.state(), PlaybackState::Idle);
        replayer.load(payload()).unwrap();
        assert_eq!(replayer.state(), PlaybackState::Loaded);

        replayer.play(PlayOptions::default()).await.unwrap();
        assert_eq!(replayer.state(), PlaybackState::Playing);
        let status = replayer.wait_until_idle().await;

        assert_eq!(status.state, PlaybackState::Loaded);
        let Some(PlaybackOutcome::Completed(report)) = status.last_outcome.clone() else {
            panic!("expected completion, got {:?}", status.last_outcome);
        };
        assert_eq!(report.applied, vec![2, 3]);
        assert_eq!(report.scheduled_delay, std::time::Duration::from_millis(300));

        let surface = replayer.surface();
        let surface = surface.lock();
        let pane = surface.document().get_element_by_id("pane").unwrap();
        assert_eq!(surface.document().attr(pane, "class"), Some("open"));
        assert_eq!(surface.sandbox(), Some(Sandbox::new(false)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_requires_a_payload() {
        let mut replayer = Replayer::new(HeadlessSurface::new(), Config::default());
        assert!(matches!(
            replayer.play(PlayOptions::default()).await,
            Err(ReplayError::NotLoaded)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let mut replayer = Replayer::new(HeadlessSurface::new(), Config::default());
        replayer.load(payload()).unwrap();
        replayer.play(PlayOptions::default()).await.unwrap();

        replayer.stop();
        replayer.stop();
        let status = replayer.status();
        assert_eq!(status.state, PlaybackState::Loaded);
        assert_eq!(status.last_outcome, Some(PlaybackOutcome::Stopped));
        assert_eq!(replayer.cursor(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_payload_keeps_loaded_session() {
        let mut replayer = Replayer::new(HeadlessSurface::new(), Config::default());
        replayer.load(payload()).unwrap();
        let mut broken = payload();
        broken.version = 9;
        assert!(matches!(
            replayer.load(broken),
            Err(ReplayError::InvalidPayload(PayloadError::UnsupportedVersion(9)))
        ));
        assert_eq!(replayer.payload().map(|p| p.events.len()), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_failure_is_reported() {
        let surface = HeadlessSurface::new().failing_render("boom");
        let mut replayer = Replayer::new(surface, Config::default());
        replayer.load(payload()).unwrap();
        let err = replayer.play(PlayOptions::default()).await.unwrap_err();
        assert!(matches!(err, ReplayError::Surface(SurfaceError::RenderFailed(_))));
        assert_eq!(replayer.state(), PlaybackState::Loaded);
    }
}
