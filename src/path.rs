//! Structural node paths.
//!
//! A path is the order-based address of an element, stable across a
//! serialize/parse cycle of the same document:
//!
//! - the document node is `"document"`;
//! - an element with a non-empty `id` is `#id`;
//! - the body is `"body"`;
//! - any other element is a chain of `tag:nth-of-type(i)` segments joined by
//!   `" > "`, anchored at the body's children. Elements outside the body
//!   start with the bare segment `html`;
//! - text, comments and other non-element nodes are `"non-element"`, which
//!   never resolves.
//!
//! Resolution is tolerant: any segment that no longer exists yields `None`.

use crate::dom::{Document, NodeId};

pub const DOCUMENT_PATH: &str = "document";
pub const NON_ELEMENT_PATH: &str = "non-element";
pub const BODY_PATH: &str = "body";

const SEPARATOR: &str = " > ";

pub fn path_of(doc: &Document, node: NodeId) -> String {
    if node == doc.root() {
        return DOCUMENT_PATH.to_string();
    }
    let Some(el) = doc.element(node) else {
        return NON_ELEMENT_PATH.to_string();
    };
    if let Some(id) = el.id() {
        return format!("#{id}");
    }
    let body = doc.body();
    if Some(node) == body {
        return BODY_PATH.to_string();
    }

    let mut segments = Vec::new();
    let mut current = node;
    loop {
        let tag = doc.tag_name(current).unwrap_or_default();
        match doc.parent_element(current) {
            Some(parent) => {
                let index = doc.nth_of_type(current).unwrap_or(1);
                segments.push(format!("{tag}:nth-of-type({index})"));
                if Some(parent) == body {
                    break;
                }
                current = parent;
            }
            None => {
                segments.push(tag.to_string());
                break;
            }
        }
    }
    segments.reverse();
    segments.join(SEPARATOR)
}

/// Resolves `path` inside `doc`.
///
/// `"document"` resolves to the document element, the node a replay scrolls
/// or addresses when the recording targeted the document itself. Paths may
/// also start with an `#id` anchor followed by child segments.
pub fn resolve(doc: &Document, path: &str) -> Option<NodeId> {
    let path = path.trim();
    match path {
        "" | NON_ELEMENT_PATH => return None,
        DOCUMENT_PATH => return doc.document_element(),
        BODY_PATH => return doc.body(),
        _ => {}
    }

    let mut segments = path.split(SEPARATOR).map(str::trim);
    let first = segments.next()?;
    let mut current = if let Some(id) = first.strip_prefix('#') {
        doc.get_element_by_id(id)?
    } else if first == "html" {
        doc.document_element()?
    } else if first == BODY_PATH {
        doc.body()?
    } else {
        let body = doc.body()?;
        step(doc, body, first)?
    };
    for segment in segments {
        current = step(doc, current, segment)?;
    }
    Some(current)
}

fn step(doc: &Document, parent: NodeId, segment: &str) -> Option<NodeId> {
    let (tag, index) = parse_segment(segment)?;
    doc.indexed_children(parent)
        .filter(|c| doc.is_tag(*c, tag))
        .nth(index - 1)
}

fn parse_segment(segment: &str) -> Option<(&str, usize)> {
    let (tag, rest) = segment.split_once(":nth-of-type(")?;
    let index: usize = rest.strip_suffix(')')?.trim().parse().ok()?;
    if tag.is_empty() || index == 0 {
        return None;
    }
    Some((tag, index))
}

/// Path of the element that sat among `parent`'s children right after
/// `previous_sibling` before being removed.
///
/// `earlier_same_tag` counts same-tag nodes removed from the same position
/// earlier in the same batch.
pub fn sibling_path(
    doc: &Document,
    parent: NodeId,
    tag: &str,
    previous_sibling: Option<NodeId>,
    earlier_same_tag: usize,
) -> Option<String> {
    if !doc.is_element(parent) {
        return None;
    }
    let children = doc.children(parent);
    let upto = previous_sibling
        .and_then(|prev| children.iter().position(|c| *c == prev))
        .map(|i| i + 1)
        .unwrap_or(0);
    let preceding = children[..upto].iter().filter(|c| doc.is_tag(**c, tag)).count();
    let segment = format!("{tag}:nth-of-type({})", preceding + earlier_same_tag + 1);
    if Some(parent) == doc.body() {
        return Some(segment);
    }
    let prefix = if Some(parent) == doc.document_element() {
        "html".to_string()
    } else {
        let p = path_of(doc, parent);
        if p == NON_ELEMENT_PATH || p == DOCUMENT_PATH {
            return None;
        }
        p
    };
    Some(format!("{prefix}{SEPARATOR}{segment}"))
}
