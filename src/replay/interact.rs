//! Re-enacts recorded interactions on the surface.

use crate::dom::{Document, NodeId, ScrollOffset};
use crate::path::{resolve, DOCUMENT_PATH};
use crate::payload::{Interaction, Pointer, ScrollPosition, ValueChange};
use crate::privacy::{looks_masked, mask_value, CompiledPolicy, Redaction};

use super::overlay::Overlay;
use super::surface::{Surface, SyntheticEvent, SyntheticKind};

/// A recorded target spanning at least this share of the recorded viewport
/// in either dimension is mapped by viewport ratio instead of by target offset.
const FULL_VIEWPORT_SHARE: f64 = 0.92;

const CLICK_SEQUENCE: [SyntheticKind; 5] = [
    SyntheticKind::PointerDown,
    SyntheticKind::MouseDown,
    SyntheticKind::PointerUp,
    SyntheticKind::MouseUp,
    SyntheticKind::Click,
];

/// Replays one interaction. Returns `false` when nothing was done.
pub fn apply_interaction<S: Surface + ?Sized>(
    surface: &mut S,
    overlay: &mut Overlay,
    policy: &CompiledPolicy,
    interaction: &Interaction,
    at: f64,
) -> bool {
    match interaction {
        Interaction::PointerMove(pointer) => {
            let (x, y) = map_pointer(surface, pointer);
            overlay.move_cursor(surface.document_mut(), x, y, at);
            true
        }
        Interaction::Click(pointer) => replay_click(surface, overlay, pointer, at),
        Interaction::Input(change) => replay_value(surface, policy, change, SyntheticKind::Input),
        Interaction::Change(change) => replay_value(surface, policy, change, SyntheticKind::Change),
        Interaction::Scroll(scroll) => replay_scroll(surface, scroll),
        _ => false,
    }
}

/// Maps recorded client coordinates onto the surface.
///
/// Target-relative when the target still has a box and was narrower and
/// shorter than the recorded viewport, otherwise scaled by the viewport
/// ratio, otherwise unchanged.
pub fn map_pointer<S: Surface + ?Sized>(surface: &S, pointer: &Pointer) -> (f64, f64) {
    let doc = surface.document();
    let target = resolve(doc, &pointer.target).filter(|node| !is_root_element(doc, *node));

    if let (Some(node), Some(dx), Some(dy)) =
        (target, pointer.target_offset_x, pointer.target_offset_y)
    {
        if !is_full_viewport(pointer) {
            if let Some(rect) = surface.bounding_rect(node).filter(|r| r.has_area()) {
                let sx = scale(rect.width, pointer.target_width);
                let sy = scale(rect.height, pointer.target_height);
                return (rect.left + dx * sx, rect.top + dy * sy);
            }
        }
    }

    let client = surface.client_size();
    match (pointer.viewport_width, pointer.viewport_height) {
        (Some(vw), Some(vh)) if vw > 0.0 && vh > 0.0 && client.is_usable() => (
            pointer.x * client.width / vw,
            pointer.y * client.height / vh,
        ),
        _ => (pointer.x, pointer.y),
    }
}

fn scale(current: f64, recorded: Option<f64>) -> f64 {
    match recorded {
        Some(recorded) if recorded > 0.0 => current / recorded,
        _ => 1.0,
    }
}

fn is_full_viewport(pointer: &Pointer) -> bool {
    match (
        pointer.target_width,
        pointer.target_height,
        pointer.viewport_width,
        pointer.viewport_height,
    ) {
        (Some(tw), Some(th), Some(vw), Some(vh)) if vw > 0.0 && vh > 0.0 => {
            tw >= vw * FULL_VIEWPORT_SHARE || th >= vh * FULL_VIEWPORT_SHARE
        }
        _ => false,
    }
}

fn is_root_element(doc: &Document, node: NodeId) -> bool {
    doc.is_tag(node, "html") || doc.is_tag(node, "body")
}

fn replay_click<S: Surface + ?Sized>(
    surface: &mut S,
    overlay: &mut Overlay,
    pointer: &Pointer,
    at: f64,
) -> bool {
    let (x, y) = map_pointer(surface, pointer);
    overlay.move_cursor(surface.document_mut(), x, y, at);
    overlay.ripple(surface.document_mut(), x, y, at);

    let Some(target) = resolve(surface.document(), &pointer.target) else {
        tracing::debug!(target = %pointer.target, "Click target not found");
        return true;
    };
    if let Some(rect) = surface.bounding_rect(target) {
        overlay.outline(surface.document_mut(), rect, at);
    }

    let in_link = surface
        .document()
        .closest(target, |el| el.tag() == "a" && el.has_attr("href"))
        .is_some();
    surface.focus(target);
    for kind in CLICK_SEQUENCE {
        let mut event = SyntheticEvent::new(kind);
        event.client_x = x;
        event.client_y = y;
        event.prevent_navigation = in_link && kind == SyntheticKind::Click;
        surface.dispatch(target, event);
    }
    true
}

fn replay_value<S: Surface + ?Sized>(
    surface: &mut S,
    policy: &CompiledPolicy,
    change: &ValueChange,
    kind: SyntheticKind,
) -> bool {
    let Some(target) = resolve(surface.document(), &change.target) else {
        return false;
    };
    if let Some(value) = change.value.as_deref() {
        match policy.classify(surface.document(), target, None) {
            Redaction::Block => return false,
            Redaction::MaskValue | Redaction::MaskText if !looks_masked(value) => {
                surface.document_mut().set_value(target, &mask_value(value));
            }
            _ => {
                surface.document_mut().set_value(target, value);
            }
        }
    }
    surface.dispatch(target, SyntheticEvent::new(kind));
    true
}

fn replay_scroll<S: Surface + ?Sized>(surface: &mut S, scroll: &ScrollPosition) -> bool {
    let offset = ScrollOffset::new(scroll.scroll_x, scroll.scroll_y);
    if scroll.target == DOCUMENT_PATH {
        surface.scroll_root_to(offset);
        return true;
    }
    let Some(target) = resolve(surface.document(), &scroll.target) else {
        return false;
    };
    if is_root_element(surface.document(), target) {
        surface.scroll_root_to(offset);
    } else {
        surface.scroll_element_to(target, offset);
    }
    true
}
