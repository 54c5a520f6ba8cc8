//! Recording flows against the in-memory checkout page

use std::sync::Arc;

use domreel::capture::{CaptureHost, EventTarget, HistoryCall, HistoryInterception, TRUNCATED_HTML};
use domreel::config::Limits;
use domreel::payload::{Interaction, MutationChange, SerializedNode};
use domreel::{Config, EventBody, SessionPayload};
use serde_json::json;

use super::common::fixtures::{checkout_page, manual_recorder};

fn interactions(payload: &SessionPayload) -> Vec<&Interaction> {
    payload
        .events
        .iter()
        .filter_map(|e| match &e.body {
            EventBody::Interaction(interaction) => Some(interaction),
            _ => None,
        })
        .collect()
}

fn limited(limits: Limits) -> Config {
    Config {
        limits,
        ..Config::default()
    }
}

/// Test a click followed by typing into a password field
#[test]
fn test_click_and_masked_password() {
    let (mut recorder, clock) = manual_recorder(Config::default());
    let mut page = checkout_page();
    recorder.start(&mut page);

    clock.advance(50.0);
    let buy = page.element_by_id("buy").unwrap();
    page.click(buy, 10.0, 20.0);

    clock.advance(30.0);
    let pw = page.element_by_id("pw").unwrap();
    page.type_value(pw, "secret123");

    clock.advance(200.0);
    recorder.tick();
    recorder.stop(&mut page);

    let payload = recorder.payload().unwrap();
    assert!(matches!(payload.events[0].body, EventBody::Snapshot(_)));
    assert!(payload.events.windows(2).all(|w| w[0].id < w[1].id));
    assert!(payload.events.last().unwrap().body.is_meta());

    let seen = interactions(&payload);
    let click = seen
        .iter()
        .find_map(|i| match i {
            Interaction::Click(pointer) => Some(pointer),
            _ => None,
        })
        .unwrap();
    assert_eq!(click.target, "#buy");
    assert_eq!((click.x, click.y), (10.0, 20.0));

    let input = seen
        .iter()
        .find_map(|i| match i {
            Interaction::Input(change) => Some(change),
            _ => None,
        })
        .unwrap();
    assert_eq!(input.target, "#pw");
    assert_eq!(input.value.as_deref(), Some("*********"));

    let markers: Vec<(String, u64)> = seen
        .iter()
        .filter_map(|i| match i {
            Interaction::IntentMarker(m) => Some((m.intent_type.clone(), m.intent_seq)),
            _ => None,
        })
        .collect();
    assert_eq!(markers, vec![("click".to_string(), 1), ("input".to_string(), 2)]);

    // The debounced input is stamped when its window closed.
    let input_event = payload
        .events
        .iter()
        .find(|e| matches!(e.body, EventBody::Interaction(Interaction::Input(_))))
        .unwrap();
    assert_eq!(input_event.time_offset_ms, 200.0);

    assert_eq!(payload.redaction_stats.masked_input_events, 1);
    let json = payload.to_json_pretty().unwrap();
    assert!(!json.contains("secret123"));
}

/// Test that start and stop are idempotent and fully detach
#[test]
fn test_start_stop_idempotent() {
    let (mut recorder, _clock) = manual_recorder(Config::default());
    let mut page = checkout_page();

    recorder.start(&mut page);
    let attached = page.registration_count();
    assert!(attached > 0);
    recorder.start(&mut page);
    assert_eq!(page.registration_count(), attached);
    assert!(page.is_history_intercepted());

    recorder.stop(&mut page);
    recorder.stop(&mut page);
    assert_eq!(page.registration_count(), 0);
    assert!(!page.is_history_intercepted());
    assert!(!recorder.is_recording());

    // Activity after stop is not captured.
    let buy = page.element_by_id("buy").unwrap();
    page.click(buy, 1.0, 1.0);
    page.push_state(json!(null), Some("/after")).unwrap();

    let payload = recorder.payload().unwrap();
    let metas = payload.events.iter().filter(|e| e.body.is_meta()).count();
    assert_eq!(metas, 1);
    assert!(interactions(&payload).is_empty());
}

/// Test that the event bound drops and counts overflow
#[test]
fn test_event_bound_counts_drops() {
    let (mut recorder, _clock) = manual_recorder(limited(Limits {
        max_events: 5,
        ..Limits::default()
    }));
    let mut page = checkout_page();
    recorder.start(&mut page);

    let buy = page.element_by_id("buy").unwrap();
    for i in 0..10 {
        page.set_attribute(buy, "data-n", &i.to_string());
    }
    recorder.stop(&mut page);

    let payload = recorder.payload().unwrap();
    let kept = payload.events.iter().filter(|e| !e.body.is_meta()).count();
    assert_eq!(kept, 5);
    assert_eq!(payload.dropped_event_count, 6);

    let Some(EventBody::Meta(meta)) = payload.events.last().map(|e| &e.body) else {
        panic!("Expected closing meta event");
    };
    assert_eq!(meta.dropped_event_count, Some(6));
}

/// Test that oversized mutation fragments are replaced
#[test]
fn test_oversized_fragment_truncated() {
    let (mut recorder, _clock) = manual_recorder(limited(Limits {
        max_mutation_payload_bytes: 64,
        ..Limits::default()
    }));
    let mut page = checkout_page();
    recorder.start(&mut page);

    let cart = page.element_by_id("cart").unwrap();
    let long = format!("<li>{}</li>", "x".repeat(200));
    page.append_html(cart, &long);
    recorder.stop(&mut page);

    let payload = recorder.payload().unwrap();
    let added = payload
        .events
        .iter()
        .find_map(|e| match &e.body {
            EventBody::Mutation(m) => match &m.change {
                MutationChange::ChildList { added_nodes, .. } => Some(added_nodes.clone()),
                _ => None,
            },
            _ => None,
        })
        .unwrap();
    let [SerializedNode::Element { outer_html, .. }] = added.as_slice() else {
        panic!("Expected one added element, got {added:?}");
    };
    assert_eq!(outer_html, TRUNCATED_HTML);
    assert_eq!(payload.redaction_stats.truncated_mutation_html, 1);
}

/// Test interactions on blocked content and on the recorder's own panel
#[test]
fn test_blocked_and_tool_ui_interactions() {
    let (mut recorder, clock) = manual_recorder(Config::default());
    let mut page = checkout_page();
    recorder.start(&mut page);

    clock.advance(10.0);
    let card = page.element_by_id("card").unwrap();
    page.click(card, 5.0, 5.0);
    let panel = page.element_by_id("__sr_snippet_panel__").unwrap();
    page.click(panel, 5.0, 5.0);
    recorder.stop(&mut page);

    let payload = recorder.payload().unwrap();
    let seen = interactions(&payload);
    assert_eq!(seen.len(), 1);
    let Interaction::Blocked(blocked) = seen[0] else {
        panic!("Expected a blocked marker, got {:?}", seen[0]);
    };
    assert_eq!(blocked.blocked_event_type, "click");
    assert_eq!(payload.redaction_stats.blocked_node_events, 1);
}

/// Test navigation and history capture
#[test]
fn test_navigation_and_history() {
    let (mut recorder, clock) = manual_recorder(Config::default());
    let mut page = checkout_page();
    recorder.start(&mut page);

    clock.advance(10.0);
    let help = page.element_by_id("help").unwrap();
    page.click(help, 2.0, 2.0);
    page.set_hash("faq");
    page.push_state(json!({ "step": 2 }), Some("/checkout/review")).unwrap();
    recorder.stop(&mut page);

    let payload = recorder.payload().unwrap();
    let seen = interactions(&payload);

    let intent = seen
        .iter()
        .find_map(|i| match i {
            Interaction::NavigationIntent(n) => Some(n),
            _ => None,
        })
        .unwrap();
    assert_eq!(intent.target, "#help");
    assert_eq!(intent.pathname, "/help");
    assert_eq!(intent.hash, "#faq");
    assert!(intent.same_origin);
    assert!(!intent.target_blank);

    let hash = seen
        .iter()
        .find_map(|i| match i {
            Interaction::HashChange(location) => Some(location),
            _ => None,
        })
        .unwrap();
    assert_eq!(hash.hash, "#faq");

    let push = seen
        .iter()
        .find_map(|i| match i {
            Interaction::HistoryPush(change) => Some(change),
            _ => None,
        })
        .unwrap();
    assert_eq!(push.href, "https://shop.example/checkout/review");
    assert_eq!(push.state, json!({ "step": 2 }));
}

/// Test that stopping leaves a history hook installed by someone else
#[test]
fn test_stop_keeps_foreign_history_hook() {
    let (mut recorder, _clock) = manual_recorder(Config::default());
    let mut page = checkout_page();
    assert!(page.history().install(Arc::new(|_: &HistoryCall| {})));

    recorder.start(&mut page);
    recorder.stop(&mut page);
    assert!(page.is_history_intercepted());

    assert!(page.history().uninstall());
    recorder.start(&mut page);
    assert!(page.is_history_intercepted());
    recorder.stop(&mut page);
    assert!(!page.is_history_intercepted());
}

/// Test that pointer moves are sampled and the last one is flushed on stop
#[test]
fn test_pointer_moves_sampled() {
    let (mut recorder, clock) = manual_recorder(Config::default());
    let mut page = checkout_page();
    recorder.start(&mut page);

    for i in 0..5 {
        page.move_pointer(EventTarget::Document, i as f64, i as f64);
        clock.advance(2.0);
    }
    recorder.stop(&mut page);

    let payload = recorder.payload().unwrap();
    let moves: Vec<f64> = interactions(&payload)
        .iter()
        .filter_map(|i| match i {
            Interaction::PointerMove(p) => Some(p.x),
            _ => None,
        })
        .collect();
    assert_eq!(moves, vec![0.0, 4.0]);
}
