//! Restores child frames recorded in the snapshot.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::dom::{Document, NodeId};
use crate::path::resolve;
use crate::payload::FrameDescriptor;

use super::surface::{FrameLoad, Surface};

/// How long a frame may take to load before it counts as failed.
pub const FRAME_RESTORE_WAIT: Duration = Duration::from_millis(1800);

pub const PLACEHOLDER_ATTRIBUTE: &str = "data-sr-placeholder";

const PLACEHOLDER_TITLE: &str = "Frame unavailable";
const PLACEHOLDER_DOC: &str = concat!(
    "<!doctype html><html><body style=\"margin:0;display:flex;align-items:center;",
    "justify-content:center;font:13px sans-serif;color:#666;background:#f4f4f4\">",
    "3rd-party frame could not be restored.</body></html>"
);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameRestoreReport {
    pub restored: usize,
    pub placeholders: usize,
    /// Descriptors whose frame element no longer resolves.
    pub missing: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameWatch {
    Loaded,
    Failed(String),
    TimedOut,
    Cancelled,
}

/// Points every recorded frame back at its source and waits for each to
/// settle. Cross-origin frames that fail or time out get a placeholder.
pub async fn restore_frames<S: Surface>(
    surface: &Arc<Mutex<S>>,
    frames: &[FrameDescriptor],
    cancel: &CancellationToken,
) -> FrameRestoreReport {
    let mut report = FrameRestoreReport::default();
    let mut pending: Vec<(NodeId, bool, BoxFuture<'static, FrameLoad>)> = Vec::new();
    {
        let mut guard = surface.lock();
        for frame in frames {
            let Some(src) = frame
                .resolved_src
                .as_deref()
                .or(frame.declared_src.as_deref())
                .filter(|src| !src.is_empty())
            else {
                continue;
            };
            let Some(node) = resolve(guard.document(), &frame.path)
                .filter(|node| guard.document().is_tag(*node, "iframe"))
            else {
                tracing::debug!(path = %frame.path, "Recorded frame not found");
                report.missing += 1;
                continue;
            };
            guard.document_mut().set_attr(node, "src", src);
            let load = guard.load_frame(node, src);
            pending.push((node, frame.is_cross_origin, load));
        }
    }

    let (targets, loads): (Vec<_>, Vec<_>) = pending
        .into_iter()
        .map(|(node, cross_origin, load)| ((node, cross_origin), watch_frame(load, cancel)))
        .unzip();
    let outcomes = join_all(loads).await;

    let mut guard = surface.lock();
    for ((node, cross_origin), outcome) in targets.into_iter().zip(outcomes) {
        match outcome {
            FrameWatch::Loaded => report.restored += 1,
            FrameWatch::Cancelled => {}
            FrameWatch::Failed(_) | FrameWatch::TimedOut if cross_origin => {
                tracing::debug!(outcome = ?outcome, "Replacing cross-origin frame with placeholder");
                install_placeholder(guard.document_mut(), node);
                report.placeholders += 1;
            }
            FrameWatch::Failed(reason) => {
                tracing::debug!(reason = %reason, "Same-origin frame failed to load");
            }
            FrameWatch::TimedOut => {
                tracing::debug!("Same-origin frame did not load in time");
            }
        }
    }
    report
}

pub async fn watch_frame(load: BoxFuture<'static, FrameLoad>, cancel: &CancellationToken) -> FrameWatch {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => FrameWatch::Cancelled,
        result = tokio::time::timeout(FRAME_RESTORE_WAIT, load) => match result {
            Ok(FrameLoad::Loaded) => FrameWatch::Loaded,
            Ok(FrameLoad::Failed(reason)) => FrameWatch::Failed(reason),
            Err(_) => FrameWatch::TimedOut,
        },
    }
}

/// Swaps a frame's content for an inert notice.
pub fn install_placeholder(doc: &mut Document, frame: NodeId) {
    doc.remove_attr(frame, "src");
    doc.set_attr(frame, "srcdoc", PLACEHOLDER_DOC);
    doc.set_attr(frame, "title", PLACEHOLDER_TITLE);
    doc.set_attr(frame, PLACEHOLDER_ATTRIBUTE, "true");
}
