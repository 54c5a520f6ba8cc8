//! Applies recorded mutations to the rendered replay document.
//!
//! The rendered tree drifts from the recorded one whenever replay skipped
//! something. Every step here tolerates that: an unresolvable target or
//! removed node is skipped, never an error.

use crate::capture::TRUNCATED_HTML;
use crate::dom::scripting::is_script_attr;
use crate::dom::{Document, NodeId};
use crate::path::{path_of, resolve};
use crate::payload::{Mutation, MutationChange, SerializedNode};

use super::sanitize::sanitize_tree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    /// The change was refused by render-time sanitization.
    Dropped,
    /// The target (or the node to change) is not in the rendered tree.
    Unresolved,
    /// The mutation carries nothing to apply.
    Ignored,
}

pub fn apply_mutation(doc: &mut Document, mutation: &Mutation, allow_scripts: bool) -> PatchOutcome {
    let Some(target) = resolve(doc, &mutation.target) else {
        tracing::debug!(
            target = %mutation.target,
            kind = mutation.change.name(),
            "Mutation target not found"
        );
        return PatchOutcome::Unresolved;
    };

    match &mutation.change {
        MutationChange::Attributes {
            attribute_name,
            new_value,
            ..
        } => apply_attribute(doc, target, attribute_name, new_value.as_deref(), allow_scripts),
        MutationChange::CharacterData {
            child_index,
            new_value,
            ..
        } => apply_text(doc, target, *child_index, new_value.as_deref().unwrap_or_default()),
        MutationChange::ChildList {
            added_nodes,
            removed_nodes,
            target_inner_html,
        } => apply_child_list(
            doc,
            target,
            added_nodes,
            removed_nodes,
            target_inner_html.as_deref(),
            allow_scripts,
        ),
        MutationChange::Blocked => PatchOutcome::Ignored,
    }
}

fn apply_attribute(
    doc: &mut Document,
    target: NodeId,
    name: &str,
    value: Option<&str>,
    allow_scripts: bool,
) -> PatchOutcome {
    if name.eq_ignore_ascii_case("autofocus") {
        return PatchOutcome::Dropped;
    }
    match value {
        Some(value) => {
            if !allow_scripts && is_script_attr(name, value) {
                return PatchOutcome::Dropped;
            }
            doc.set_attr(target, name, value);
        }
        None => {
            doc.remove_attr(target, name);
        }
    }
    PatchOutcome::Applied
}

fn apply_text(doc: &mut Document, target: NodeId, child_index: Option<usize>, value: &str) -> PatchOutcome {
    match child_index {
        Some(index) => match doc.children(target).get(index).copied() {
            Some(child) if doc.is_text(child) => {
                doc.set_text(child, value);
                PatchOutcome::Applied
            }
            _ => PatchOutcome::Unresolved,
        },
        None => {
            doc.set_text_content(target, value);
            PatchOutcome::Applied
        }
    }
}

fn apply_child_list(
    doc: &mut Document,
    target: NodeId,
    added: &[SerializedNode],
    removed: &[SerializedNode],
    inner_html: Option<&str>,
    allow_scripts: bool,
) -> PatchOutcome {
    let has_other = added
        .iter()
        .chain(removed.iter())
        .any(|node| matches!(node, SerializedNode::Other));
    if has_other {
        if let Some(html) = inner_html.filter(|html| can_replace_inner(doc, target, html)) {
            doc.set_inner_html(target, html);
            sanitize_tree(doc, target, allow_scripts);
            return PatchOutcome::Applied;
        }
    }

    // Resolve every removed node first: detaching shifts the nth-of-type
    // positions the later paths were recorded against.
    let mut doomed: Vec<NodeId> = Vec::new();
    for node in removed {
        let found = match node {
            SerializedNode::Element { path: Some(path), .. } => {
                resolve(doc, path).filter(|n| doc.parent(*n) == Some(target))
            }
            SerializedNode::Text { text } => doc
                .children(target)
                .iter()
                .copied()
                .find(|child| {
                    doc.is_text(*child)
                        && doc.text(*child) == Some(text.as_str())
                        && !doomed.contains(child)
                }),
            _ => None,
        };
        match found {
            Some(found) if !doomed.contains(&found) => doomed.push(found),
            _ => tracing::debug!(target = %path_of(doc, target), "Removed node not found"),
        }
    }
    let mut changed = false;
    for node in doomed {
        changed |= doc.detach(node);
    }

    for node in added {
        match node {
            SerializedNode::Element { outer_html, .. } => {
                if outer_html.is_empty() || outer_html == TRUNCATED_HTML {
                    continue;
                }
                for created in doc.parse_fragment(target, outer_html) {
                    sanitize_tree(doc, created, allow_scripts);
                    changed = true;
                }
            }
            SerializedNode::Text { text } => {
                let created = doc.create_text(text.as_str());
                changed |= doc.append_child(target, created);
            }
            SerializedNode::Other => {}
        }
    }

    if changed {
        PatchOutcome::Applied
    } else {
        PatchOutcome::Unresolved
    }
}

/// Inner-HTML replacement never touches the document skeleton and never
/// installs a truncation marker.
fn can_replace_inner(doc: &Document, target: NodeId, html: &str) -> bool {
    let skeleton = Some(target) == doc.body()
        || Some(target) == doc.document_element()
        || doc.is_tag(target, "html")
        || doc.is_tag(target, "body");
    !skeleton && html != TRUNCATED_HTML
}
