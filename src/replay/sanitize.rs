//! Render-time sanitization of recorded markup.
//!
//! Recorded HTML is untrusted. It is cleaned again before it reaches the
//! surface regardless of what the recorder already removed.

use crate::capture::TOOL_UI_IDS;
use crate::dom::scripting::is_script_attr;
use crate::dom::{Document, NodeId};

use super::overlay::POINTER_LAYER_ID;

const PREFETCH_RELS: &[&str] = &["preload", "modulepreload", "prefetch"];

/// Parses a recorded document, sanitizes it and injects `<base href>`.
pub fn sanitize_document_html(raw: &str, base: Option<&str>, allow_scripts: bool) -> String {
    let mut doc = Document::parse(raw);
    let root = doc.root();
    let removed = sanitize_tree(&mut doc, root, allow_scripts);
    if removed > 0 {
        tracing::debug!(removed, "Sanitized recorded document");
    }
    if let Some(base) = base.map(str::trim).filter(|b| !b.is_empty()) {
        inject_base(&mut doc, base);
    }
    doc.to_html()
}

/// Sanitizes `root` and its subtree in place. Returns the number of nodes
/// and attributes removed.
///
/// Preload/prefetch links, `autofocus`, the recorder's own UI and any stale
/// pointer layer are always removed. Scripts, inline handlers and
/// `javascript:` URLs are removed unless `allow_scripts` is set.
pub fn sanitize_tree(doc: &mut Document, root: NodeId, allow_scripts: bool) -> usize {
    let mut nodes = vec![root];
    nodes.extend(doc.descendants(root));

    let mut removed = 0;
    for node in nodes {
        let Some(el) = doc.element(node) else {
            continue;
        };
        let drop_node = (el.tag() == "script" && !allow_scripts)
            || (el.tag() == "link" && is_prefetch_link(el.attr("rel")))
            || el
                .id()
                .is_some_and(|id| id == POINTER_LAYER_ID || TOOL_UI_IDS.contains(&id));
        if drop_node {
            if doc.detach(node) {
                removed += 1;
            }
            continue;
        }

        let stripped: Vec<String> = el
            .attrs()
            .iter()
            .filter(|(name, value)| {
                name == "autofocus" || (!allow_scripts && is_script_attr(name, value))
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in stripped {
            doc.remove_attr(node, &name);
            removed += 1;
        }
    }
    removed
}

fn is_prefetch_link(rel: Option<&str>) -> bool {
    rel.is_some_and(|rel| {
        rel.split_ascii_whitespace()
            .any(|token| PREFETCH_RELS.iter().any(|p| token.eq_ignore_ascii_case(p)))
    })
}

fn inject_base(doc: &mut Document, href: &str) {
    let Some(head) = doc.head() else {
        return;
    };
    let existing = doc
        .element_children(head)
        .find(|child| doc.is_tag(*child, "base") && doc.attr(*child, "href").is_some());
    if existing.is_some() {
        return;
    }
    let base = doc.create_element("base");
    doc.set_attr(base, "href", href);
    let first = doc.first_child(head);
    doc.insert_before(head, base, first);
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORDED: &str = r#"<html><head><link rel="preload" href="/a.js"><title>t</title></head>
<body><script>evil()</script><a href="javascript:void(0)" onclick="x()">l</a>
<input autofocus name="q"><div id="__sr_snippet_panel__">panel</div></body></html>"#;

    #[test]
    fn test_scripts_off() {
        let html = sanitize_document_html(RECORDED, Some("https://shop.example/cart"), false);
        assert!(html.contains(r#"<head><base href="https://shop.example/cart"><title>"#));
        assert!(!html.contains("preload"));
        assert!(!html.contains("evil"));
        assert!(!html.contains("javascript:"));
        assert!(!html.contains("onclick"));
        assert!(!html.contains("autofocus"));
        assert!(!html.contains("panel"));
        assert!(html.contains(r#"<input name="q">"#));
    }

    #[test]
    fn test_scripts_on_keeps_handlers() {
        let html = sanitize_document_html(RECORDED, None, true);
        assert!(html.contains("evil()"));
        assert!(html.contains(r#"onclick="x()""#));
        assert!(!html.contains("autofocus"));
        assert!(!html.contains("<base"));
    }

    #[test]
    fn test_existing_base_is_kept() {
        let html = sanitize_document_html(
            r#"<html><head><base href="/root/"></head><body></body></html>"#,
            Some("https://x.example/"),
            false,
        );
        assert_eq!(html.matches("<base").count(), 1);
        assert!(html.contains(r#"href="/root/""#));
    }
}
