//! Pages, recorders and payloads used across the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use domreel::capture::{ignore_subtrees, TOOL_UI_IDS};
use domreel::{Config, ManualClock, MemoryPage, Recorder, RecorderOptions, SessionPayload};
use serde_json::{json, Value};
use uuid::Uuid;

pub const PAGE_URL: &str = "https://shop.example/checkout";

/// Checkout page with a button, a password field, a link, a blocked panel
/// and the recorder's own panel.
pub const CHECKOUT_HTML: &str = r#"<!doctype html>
<html><head><title>Checkout</title></head>
<body>
<main>
  <h1>Checkout</h1>
  <form id="login">
    <input id="email" name="email" type="email" value="">
    <input id="pw" name="password" type="password" value="">
    <button id="buy" type="submit">Buy</button>
  </form>
  <a id="help" href="/help#faq">Help</a>
  <ul id="cart"><li>Socks</li><li>Hat</li></ul>
  <div id="card" data-sr-block="true">4111 1111 1111 1111</div>
</main>
<div id="__sr_snippet_panel__">recorder ui</div>
</body></html>"#;

/// Fixed session id used by hand-built payloads
pub fn fixed_session_id() -> Uuid {
    Uuid::from_u128(0x5e55_1011)
}

pub fn checkout_page() -> MemoryPage {
    MemoryPage::new(PAGE_URL, CHECKOUT_HTML)
        .expect("Valid test page URL")
        .with_user_agent("domreel-tests/1.0")
}

/// A recorder driven by a manual clock starting at 1000 ms
pub fn manual_recorder(config: Config) -> (Recorder, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_at(1000.0));
    let options = RecorderOptions {
        clock: clock.clone(),
        ignore: ignore_subtrees(TOOL_UI_IDS.iter().copied()),
    };
    (Recorder::with_options(config, options), clock)
}

fn event(id: u64, offset: f64, kind: &str, data: Value) -> Value {
    json!({ "id": id, "type": kind, "at": 5000.0 + offset, "timeOffsetMs": offset, "data": data })
}

fn snapshot_event(html: &str, frames: Value) -> Value {
    event(
        1,
        0.0,
        "snapshot",
        json!({
            "reason": "initial",
            "url": PAGE_URL,
            "viewport": { "width": 1000.0, "height": 800.0 },
            "iframeSummary": frames,
            "html": html,
        }),
    )
}

/// Wraps events into a complete payload
pub fn payload_with(events: Vec<Value>) -> SessionPayload {
    let created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    SessionPayload::from_json_value(json!({
        "version": 1,
        "sessionId": fixed_session_id(),
        "createdAt": created_at,
        "page": { "href": PAGE_URL, "userAgent": "domreel-tests/1.0" },
        "droppedEventCount": 0,
        "redactionStats": {},
        "eventCount": events.len(),
        "events": events,
    }))
    .expect("Fixture payload is valid")
}

/// A short session: scroll, a list mutation, a click and a late scroll
pub fn timed_payload() -> SessionPayload {
    payload_with(vec![
        snapshot_event(
            r#"<html><head></head><body><ul id="cart"><li>Socks</li></ul><button id="buy">Buy</button></body></html>"#,
            json!([]),
        ),
        event(
            2,
            100.0,
            "event",
            json!({ "eventType": "scroll", "target": "document", "scrollX": 0.0, "scrollY": 120.0 }),
        ),
        event(
            3,
            300.0,
            "mutation",
            json!({
                "target": "#cart",
                "mutationType": "childList",
                "addedNodes": [{ "nodeType": "element", "tagName": "li", "outerHTML": "<li>Hat</li>" }],
                "removedNodes": [],
            }),
        ),
        event(
            4,
            300.0,
            "event",
            json!({ "eventType": "click", "target": "#buy", "x": 10.0, "y": 20.0,
                    "viewportWidth": 1000.0, "viewportHeight": 800.0 }),
        ),
        event(
            5,
            700.0,
            "event",
            json!({ "eventType": "scroll", "target": "document", "scrollX": 0.0, "scrollY": 40.0 }),
        ),
        event(6, 800.0, "meta", json!({ "action": "recording_stopped", "droppedEventCount": 0 })),
    ])
}

/// A session whose snapshot embeds a cross-origin and a same-origin frame
pub fn framed_payload() -> SessionPayload {
    payload_with(vec![
        snapshot_event(
            r#"<html><head></head><body><iframe id="ad"></iframe><iframe id="chat"></iframe><p id="p">x</p></body></html>"#,
            json!([
                { "path": "#ad", "src": "https://ads.example/slot", "currentSrc": "https://ads.example/slot", "isCrossOrigin": true },
                { "path": "#chat", "src": "/chat", "currentSrc": "https://shop.example/chat", "isCrossOrigin": false },
            ]),
        ),
        event(
            2,
            50.0,
            "event",
            json!({ "eventType": "scroll", "target": "document", "scrollX": 0.0, "scrollY": 10.0 }),
        ),
    ])
}
