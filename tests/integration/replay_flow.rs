//! Playback of recorded sessions into the headless surface

use std::time::Duration;

use domreel::replay::{FrameBehavior, SyntheticKind, PLACEHOLDER_ATTRIBUTE, POINTER_LAYER_ID};
use domreel::{
    Config, HeadlessSurface, PlayOptions, PlaybackOutcome, PlaybackState, Replayer,
    SessionPayload, Surface,
};

use serde_json::json;

use super::common::fixtures::{
    checkout_page, framed_payload, manual_recorder, payload_with, timed_payload, PAGE_URL,
};

async fn play_to_end(
    replayer: &mut Replayer<HeadlessSurface>,
    speed: f64,
) -> (Vec<u64>, Duration) {
    replayer.play(PlayOptions::at_speed(speed)).await.unwrap();
    let status = replayer.wait_until_idle().await;
    assert_eq!(status.state, PlaybackState::Loaded);
    let Some(PlaybackOutcome::Completed(report)) = status.last_outcome.clone() else {
        panic!("Expected a completed run, got {:?}", status.last_outcome);
    };
    (report.applied, report.scheduled_delay)
}

/// Test that speed scales the schedule without reordering it
#[tokio::test(start_paused = true)]
async fn test_speed_scales_schedule() {
    let mut replayer = Replayer::new(HeadlessSurface::new(), Config::default());
    replayer.load(timed_payload()).unwrap();

    let (order, normal) = play_to_end(&mut replayer, 1.0).await;
    let (fast_order, fast) = play_to_end(&mut replayer, 2.0).await;

    assert_eq!(order, vec![2, 3, 4, 5]);
    assert_eq!(fast_order, order);
    assert_eq!(normal, Duration::from_millis(600));
    assert_eq!(fast, Duration::from_millis(300));
}

/// Test the end state of the surface after a full run
#[tokio::test(start_paused = true)]
async fn test_surface_state_after_replay() {
    let mut replayer = Replayer::new(HeadlessSurface::new(), Config::default());
    replayer.load(timed_payload()).unwrap();
    play_to_end(&mut replayer, 4.0).await;

    let surface = replayer.surface();
    let surface = surface.lock();
    let doc = surface.document();
    let cart = doc.get_element_by_id("cart").unwrap();
    assert_eq!(doc.text_content(cart), "SocksHat");
    assert_eq!(surface.root_scroll().top, 40.0);
    assert!(surface
        .dispatched()
        .iter()
        .any(|d| d.target == "#buy" && d.event.kind == SyntheticKind::Click));
    assert_eq!(surface.sandbox().map(|s| s.allow_scripts), Some(false));
}

/// Test that mutations can be left out of the timeline
#[tokio::test(start_paused = true)]
async fn test_replay_without_mutations() {
    let mut replayer = Replayer::new(HeadlessSurface::new(), Config::default());
    replayer.set_apply_mutations(false);
    replayer.load(timed_payload()).unwrap();

    let (order, _) = play_to_end(&mut replayer, 1.0).await;
    assert_eq!(order, vec![2, 4, 5]);

    let surface = replayer.surface();
    let surface = surface.lock();
    let cart = surface.document().get_element_by_id("cart").unwrap();
    assert_eq!(surface.document().text_content(cart), "Socks");
}

/// Test that stopping mid-run cancels the remaining steps
#[tokio::test(start_paused = true)]
async fn test_stop_mid_run() {
    let mut replayer = Replayer::new(HeadlessSurface::new(), Config::default());
    replayer.load(timed_payload()).unwrap();
    replayer.play(PlayOptions::default()).await.unwrap();
    assert_eq!(replayer.state(), PlaybackState::Playing);

    tokio::time::sleep(Duration::from_millis(150)).await;
    replayer.stop();
    let status = replayer.status();
    assert_eq!(status.state, PlaybackState::Loaded);
    assert_eq!(status.last_outcome, Some(PlaybackOutcome::Stopped));
    assert_eq!(replayer.cursor(), 0);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let surface = replayer.surface();
    let surface = surface.lock();
    assert_eq!(surface.root_scroll().top, 120.0);
    assert!(surface.dispatched().is_empty());
    assert_eq!(replayer.status().last_outcome, Some(PlaybackOutcome::Stopped));
}

/// Test frame restoration with a cross-origin frame that never loads
#[tokio::test(start_paused = true)]
async fn test_hanging_frame_gets_placeholder() {
    let surface =
        HeadlessSurface::new().with_frame("https://ads.example/slot", FrameBehavior::Hang);
    let mut replayer = Replayer::new(surface, Config::default());
    replayer.load(framed_payload()).unwrap();

    replayer.play(PlayOptions::default()).await.unwrap();
    let status = replayer.wait_until_idle().await;
    assert!(matches!(
        status.last_outcome,
        Some(PlaybackOutcome::Completed(_))
    ));

    let surface = replayer.surface();
    let surface = surface.lock();
    let doc = surface.document();
    let ad = doc.get_element_by_id("ad").unwrap();
    let chat = doc.get_element_by_id("chat").unwrap();
    assert_eq!(doc.attr(ad, PLACEHOLDER_ATTRIBUTE), Some("true"));
    assert_eq!(doc.attr(ad, "src"), None);
    assert_eq!(doc.attr(chat, "src"), Some("https://shop.example/chat"));
    assert_eq!(doc.attr(chat, PLACEHOLDER_ATTRIBUTE), None);
    assert_eq!(surface.frame_loads().len(), 2);
}

/// Test that a recorded session survives export and replays
#[tokio::test(start_paused = true)]
async fn test_recorded_session_round_trip() {
    let (mut recorder, clock) = manual_recorder(Config::default());
    let mut page = checkout_page();
    recorder.start(&mut page);
    clock.advance(40.0);
    let buy = page.element_by_id("buy").unwrap();
    page.click(buy, 3.0, 4.0);
    clock.advance(30.0);
    let email = page.element_by_id("email").unwrap();
    page.type_value(email, "jo@shop.example");
    clock.advance(300.0);
    recorder.stop(&mut page);
    let payload = recorder.payload().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(payload.default_file_name());
    payload.write_to_path(&path).unwrap();
    let restored = SessionPayload::read_from_path(&path).unwrap();
    assert_eq!(restored, payload);

    let mut replayer = Replayer::new(HeadlessSurface::new(), Config::default());
    replayer.load(restored).unwrap();
    play_to_end(&mut replayer, 1.0).await;

    let surface = replayer.surface();
    let surface = surface.lock();
    let doc = surface.document();
    let email = doc.get_element_by_id("email").unwrap();
    let replayed = doc.value(email).unwrap();
    assert!(!replayed.contains("jo@shop.example"));
    assert_eq!(replayed.chars().count(), "jo@shop.example".chars().count());
    assert!(surface.dispatched().iter().any(|d| d.target == "#buy"));
}

/// Test that body-level paths address page elements, not the pointer layer
#[tokio::test(start_paused = true)]
async fn test_pointer_layer_does_not_shift_paths() {
    let payload = payload_with(vec![
        json!({ "id": 1, "type": "snapshot", "at": 0.0, "timeOffsetMs": 0.0, "data": {
            "reason": "initial",
            "url": PAGE_URL,
            "viewport": { "width": 800.0, "height": 600.0 },
            "html": "<html><head></head><body><main>page</main></body></html>",
        }}),
        json!({ "id": 2, "type": "mutation", "at": 10.0, "timeOffsetMs": 10.0, "data": {
            "target": "body",
            "mutationType": "childList",
            "addedNodes": [{ "nodeType": "element", "tagName": "div", "outerHTML": "<div>new</div>" }],
            "removedNodes": [],
        }}),
        json!({ "id": 3, "type": "mutation", "at": 20.0, "timeOffsetMs": 20.0, "data": {
            "target": "div:nth-of-type(1)",
            "mutationType": "attributes",
            "attributeName": "class",
            "newValue": "shown",
        }}),
    ]);

    let mut replayer = Replayer::new(HeadlessSurface::new(), Config::default());
    replayer.load(payload).unwrap();
    let (order, _) = play_to_end(&mut replayer, 1.0).await;
    assert_eq!(order, vec![2, 3]);

    let surface = replayer.surface();
    let surface = surface.lock();
    let doc = surface.document();
    let layer = doc.get_element_by_id(POINTER_LAYER_ID).unwrap();
    assert_ne!(doc.attr(layer, "class"), Some("shown"));
    assert!(doc.is_connected(layer));

    let body = doc.body().unwrap();
    let added = doc
        .element_children(body)
        .find(|node| doc.text_content(*node) == "new")
        .unwrap();
    assert_eq!(doc.attr(added, "class"), Some("shown"));
}
