//! Redaction at capture time and during replay

use domreel::payload::{Interaction, MutationChange};
use domreel::privacy::{BLOCKED_ATTRIBUTE, REDACTED_TEXT};
use domreel::{
    Config, ConfigPatch, EventBody, HeadlessSurface, MemoryPage, PlayOptions, Replayer, Surface,
};
use serde_json::json;

use super::common::fixtures::{checkout_page, manual_recorder, payload_with, PAGE_URL};

/// Test that the initial snapshot never carries blocked or typed content
#[test]
fn test_snapshot_redaction() {
    let (mut recorder, _clock) = manual_recorder(Config::default());
    let mut page = checkout_page();
    // Typed before recording starts, so only the snapshot can leak it.
    let pw = page.element_by_id("pw").unwrap();
    page.type_value(pw, "hunter2");
    recorder.start(&mut page);
    recorder.stop(&mut page);

    let payload = recorder.payload().unwrap();
    let snapshot = payload.snapshot().unwrap();
    assert!(!snapshot.html.contains("hunter2"));
    assert!(snapshot.html.contains(r#"value="*******""#));
    assert!(!snapshot.html.contains("4111"));
    assert!(snapshot.html.contains(BLOCKED_ATTRIBUTE));
    assert!(!snapshot.html.contains("recorder ui"));
    assert!(payload.redaction_stats.redacted_serialized_nodes >= 1);
}

/// Test masked text and a custom block selector applied via a patch
#[test]
fn test_patched_selectors() {
    let (mut recorder, _clock) = manual_recorder(Config::default());
    let patch = ConfigPatch::from_json_str(
        r##"{ "privacy": { "blockSelectors": ["#cart"], "maskTextSelectors": [".name"] } }"##,
    )
    .unwrap();
    let config = recorder.apply_config(&patch);
    assert_eq!(config.privacy.block_selectors, vec!["#cart".to_string()]);

    let mut page = MemoryPage::new(
        PAGE_URL,
        r#"<body><p class="name">Jane Doe</p><ul id="cart"><li>Socks</li></ul></body>"#,
    )
    .unwrap();
    recorder.start(&mut page);
    let cart = page.element_by_id("cart").unwrap();
    page.append_html(cart, "<li>Gift for Jane</li>");
    recorder.stop(&mut page);

    let payload = recorder.payload().unwrap();
    let snapshot = payload.snapshot().unwrap();
    assert!(snapshot.html.contains(REDACTED_TEXT));
    assert!(!snapshot.html.contains("Jane"));
    assert!(!snapshot.html.contains("Socks"));

    let mutation = payload
        .events
        .iter()
        .find_map(|e| match &e.body {
            EventBody::Mutation(m) => Some(m),
            _ => None,
        })
        .unwrap();
    assert_eq!(mutation.target, "#cart");
    assert_eq!(mutation.change, MutationChange::Blocked);
    assert_eq!(payload.redaction_stats.blocked_mutations, 1);
    assert!(!payload.to_json_pretty().unwrap().contains("Gift"));
}

/// Test that plain fields are recorded verbatim when masking is turned off
#[test]
fn test_unmasked_inputs_when_disabled() {
    let (mut recorder, clock) = manual_recorder(Config::default());
    let patch = ConfigPatch::from_json_str(r#"{ "privacy": { "maskAllInputs": false } }"#).unwrap();
    recorder.apply_config(&patch);
    let mut page = MemoryPage::new(
        PAGE_URL,
        r#"<body><input id="q" name="q"><input id="pw" type="password"></body>"#,
    )
    .unwrap();
    recorder.start(&mut page);
    let q = page.element_by_id("q").unwrap();
    page.type_value(q, "wool socks");
    let pw = page.element_by_id("pw").unwrap();
    page.type_value(pw, "hunter2");
    clock.advance(500.0);
    recorder.stop(&mut page);

    let payload = recorder.payload().unwrap();
    let values: Vec<(String, Option<String>)> = payload
        .events
        .iter()
        .filter_map(|e| match &e.body {
            EventBody::Interaction(Interaction::Input(change)) => {
                Some((change.target.clone(), change.value.clone()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        values,
        vec![
            ("#q".to_string(), Some("wool socks".to_string())),
            ("#pw".to_string(), Some("*******".to_string())),
        ]
    );
    assert_eq!(payload.redaction_stats.masked_input_events, 1);
}

/// Test that replay masks plain values the replaying policy protects
#[tokio::test(start_paused = true)]
async fn test_replay_never_unmasks() {
    let payload = payload_with(vec![
        json!({ "id": 1, "type": "snapshot", "at": 0.0, "timeOffsetMs": 0.0, "data": {
            "reason": "initial",
            "url": PAGE_URL,
            "viewport": { "width": 800.0, "height": 600.0 },
            "html": r#"<html><head></head><body><input id="pw" type="password"></body></html>"#,
        }}),
        json!({ "id": 2, "type": "event", "at": 10.0, "timeOffsetMs": 10.0, "data": {
            "eventType": "input", "target": "#pw", "value": "hunter2",
        }}),
    ]);

    let mut replayer = Replayer::new(HeadlessSurface::new(), Config::default());
    replayer.load(payload).unwrap();
    replayer.play(PlayOptions::default()).await.unwrap();
    replayer.wait_until_idle().await;

    let surface = replayer.surface();
    let surface = surface.lock();
    let pw = surface.document().get_element_by_id("pw").unwrap();
    assert_eq!(surface.document().value(pw).as_deref(), Some("*******"));
}
