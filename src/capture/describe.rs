//! Turns raw mutation records into stored mutation descriptions.

use crate::dom::{Document, NodeId, NodeKind};
use crate::dom::scripting::is_script_attr;
use crate::path::{path_of, sibling_path, NON_ELEMENT_PATH};
use crate::payload::{Mutation, MutationChange, RedactionStats, SerializedNode};
use crate::privacy::{mask_value, CompiledPolicy, Redaction, RedactionReport, Redactor, REDACTED_TEXT};

use super::host::{MutationKind, MutationRecord};

/// Replaces a serialized fragment over the size limit.
pub const TRUNCATED_HTML: &str = r#"<div data-sr-truncated="true">[truncated]</div>"#;

pub type IgnoreFn<'a> = &'a (dyn Fn(&Document, NodeId) -> bool + Send + Sync);

pub struct MutationDescriber<'a> {
    pub doc: &'a Document,
    pub policy: &'a CompiledPolicy,
    pub ignore: IgnoreFn<'a>,
    pub max_bytes: usize,
    pub stats: &'a mut RedactionStats,
}

impl MutationDescriber<'_> {
    /// Describes one record, or `None` when it is suppressed.
    pub fn describe(&mut self, record: &MutationRecord, intent_seq: u64) -> Option<Mutation> {
        let doc = self.doc;
        let target = match record.kind {
            MutationKind::CharacterData { .. } => doc.parent(record.target)?,
            _ => record.target,
        };
        if (self.ignore)(doc, target) || self.is_tool_ui_only(record) {
            return None;
        }

        let target_path = path_of(doc, target);
        if target_path == NON_ELEMENT_PATH {
            return None;
        }
        if self.policy.is_blocked(doc, record.target, None) {
            self.stats.blocked_mutations += 1;
            return Some(Mutation {
                target: target_path,
                intent_seq,
                change: MutationChange::Blocked,
            });
        }

        let change = match &record.kind {
            MutationKind::Attributes { name, old_value } => {
                self.describe_attribute(record.target, name, old_value.as_deref())?
            }
            MutationKind::CharacterData { old_value } => {
                self.describe_text(record.target, old_value.as_deref())
            }
            MutationKind::ChildList {
                added,
                removed,
                previous_sibling,
                ..
            } => self.describe_child_list(target, added, removed, *previous_sibling),
        };
        Some(Mutation {
            target: target_path,
            intent_seq,
            change,
        })
    }

    fn is_tool_ui_only(&self, record: &MutationRecord) -> bool {
        let MutationKind::ChildList { added, removed, .. } = &record.kind else {
            return false;
        };
        let nodes: Vec<NodeId> = added.iter().chain(removed.iter()).copied().collect();
        !nodes.is_empty() && nodes.iter().all(|node| (self.ignore)(self.doc, *node))
    }

    fn describe_attribute(
        &mut self,
        node: NodeId,
        name: &str,
        old_value: Option<&str>,
    ) -> Option<MutationChange> {
        let new_value = self.doc.attr(node, name).map(str::to_string);
        if is_script_attr(name, new_value.as_deref().unwrap_or_default()) {
            tracing::debug!(attribute = name, "Skipping script attribute mutation");
            return None;
        }
        let (old_value, new_value) = match self.policy.classify(self.doc, node, Some(name)) {
            Redaction::MaskText => {
                self.stats.masked_mutation_values += 1;
                (
                    old_value.map(|_| REDACTED_TEXT.to_string()),
                    new_value.map(|_| REDACTED_TEXT.to_string()),
                )
            }
            Redaction::MaskValue => {
                self.stats.masked_mutation_values += 1;
                (old_value.map(mask_value), new_value.as_deref().map(mask_value))
            }
            _ => (old_value.map(str::to_string), new_value),
        };
        Some(MutationChange::Attributes {
            attribute_name: name.to_string(),
            old_value,
            new_value,
        })
    }

    fn describe_text(&mut self, node: NodeId, old_value: Option<&str>) -> MutationChange {
        let new_value = self.doc.text(node).unwrap_or_default().to_string();
        let in_textarea = self
            .doc
            .parent(node)
            .is_some_and(|parent| self.doc.is_tag(parent, "textarea"));
        let (old_value, new_value) = match self.policy.classify(self.doc, node, None) {
            Redaction::MaskText => {
                self.stats.masked_mutation_values += 1;
                (
                    old_value.map(|_| REDACTED_TEXT.to_string()),
                    REDACTED_TEXT.to_string(),
                )
            }
            Redaction::MaskValue if in_textarea => {
                self.stats.masked_mutation_values += 1;
                (old_value.map(mask_value), mask_value(&new_value))
            }
            _ => (old_value.map(str::to_string), new_value),
        };
        MutationChange::CharacterData {
            child_index: self.doc.child_index(node),
            old_value,
            new_value: Some(new_value),
        }
    }

    fn describe_child_list(
        &mut self,
        target: NodeId,
        added: &[NodeId],
        removed: &[NodeId],
        previous_sibling: Option<NodeId>,
    ) -> MutationChange {
        let mut needs_fallback = false;

        let mut added_nodes = Vec::with_capacity(added.len());
        for node in added {
            if (self.ignore)(self.doc, *node) {
                continue;
            }
            let described = self.serialize(*node, None, None);
            needs_fallback |= described == SerializedNode::Other;
            added_nodes.push(described);
        }

        let mut removed_nodes = Vec::with_capacity(removed.len());
        let mut earlier: Vec<String> = Vec::new();
        for node in removed {
            if (self.ignore)(self.doc, *node) {
                continue;
            }
            let path = self.doc.tag_name(*node).and_then(|tag| {
                let earlier_same_tag = earlier.iter().filter(|t| t.as_str() == tag).count();
                earlier.push(tag.to_string());
                sibling_path(self.doc, target, tag, previous_sibling, earlier_same_tag)
            });
            let described = self.serialize(*node, Some(target), path);
            needs_fallback |= described == SerializedNode::Other;
            removed_nodes.push(described);
        }

        let target_inner_html = if needs_fallback {
            let ignore = self.ignore;
            let (html, report) = Redactor::new(self.doc, self.policy)
                .skipping(ignore)
                .inner_html(target);
            self.count_report(report);
            Some(self.limit(html))
        } else {
            None
        };

        MutationChange::ChildList {
            added_nodes,
            removed_nodes,
            target_inner_html,
        }
    }

    fn serialize(
        &mut self,
        node: NodeId,
        context: Option<NodeId>,
        removed_path: Option<String>,
    ) -> SerializedNode {
        let doc = self.doc;
        match doc.kind(node) {
            NodeKind::Text(_) => {
                let (text, report) = Redactor::new(doc, self.policy)
                    .with_context(context)
                    .text(node);
                self.count_report(report);
                SerializedNode::Text { text }
            }
            NodeKind::Element(el) => {
                let ignore = self.ignore;
                let (html, report) = Redactor::new(doc, self.policy)
                    .with_context(context)
                    .skipping(ignore)
                    .outer_html(node);
                self.count_report(report);
                let path = match removed_path {
                    Some(path) => Some(path),
                    None if doc.is_connected(node) => Some(path_of(doc, node)),
                    None => None,
                };
                SerializedNode::Element {
                    tag_name: el.tag().to_string(),
                    path,
                    outer_html: self.limit(html),
                }
            }
            _ => SerializedNode::Other,
        }
    }

    fn count_report(&mut self, report: RedactionReport) {
        if report.redacted() {
            self.stats.redacted_serialized_nodes += 1;
        }
    }

    fn limit(&mut self, html: String) -> String {
        if html.len() > self.max_bytes {
            self.stats.truncated_mutation_html += 1;
            TRUNCATED_HTML.to_string()
        } else {
            html
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn never(_: &Document, _: NodeId) -> bool {
        false
    }

    fn describe(doc: &Document, record: MutationRecord, max_bytes: usize) -> (Option<Mutation>, RedactionStats) {
        let policy = CompiledPolicy::default();
        let mut stats = RedactionStats::default();
        let mutation = MutationDescriber {
            doc,
            policy: &policy,
            ignore: &never,
            max_bytes,
            stats: &mut stats,
        }
        .describe(&record, 3);
        (mutation, stats)
    }

    #[test]
    fn test_removed_element_gets_pre_removal_path() {
        let mut doc = Document::parse("<body><ul><li>a</li><li>b</li><li>c</li></ul></body>");
        let ul = doc.element_children(doc.body().unwrap()).next().unwrap();
        let items: Vec<NodeId> = doc.element_children(ul).collect();
        doc.detach(items[1]);
        let record = MutationRecord {
            target: ul,
            kind: MutationKind::ChildList {
                added: vec![],
                removed: vec![items[1]],
                previous_sibling: Some(items[0]),
                next_sibling: Some(items[2]),
            },
        };
        let (mutation, _) = describe(&doc, record, 10_000);
        let mutation = mutation.unwrap();
        assert_eq!(mutation.target, "ul:nth-of-type(1)");
        assert_eq!(mutation.intent_seq, 3);
        let MutationChange::ChildList { removed_nodes, target_inner_html, .. } = mutation.change else {
            panic!("expected child list");
        };
        assert_eq!(
            removed_nodes,
            vec![SerializedNode::Element {
                tag_name: "li".into(),
                path: Some("ul:nth-of-type(1) > li:nth-of-type(2)".into()),
                outer_html: "<li>b</li>".into(),
            }]
        );
        assert_eq!(target_inner_html, None);
    }

    #[test]
    fn test_oversized_fragment_is_truncated() {
        let mut doc = Document::parse("<body><div id=\"feed\"></div></body>");
        let feed = doc.get_element_by_id("feed").unwrap();
        let big = format!("<p>{}</p>", "x".repeat(5000));
        let added = doc.parse_fragment(feed, &big);
        let record = MutationRecord {
            target: feed,
            kind: MutationKind::ChildList {
                added,
                removed: vec![],
                previous_sibling: None,
                next_sibling: None,
            },
        };
        let (mutation, stats) = describe(&doc, record, 2000);
        let MutationChange::ChildList { added_nodes, .. } = mutation.unwrap().change else {
            panic!("expected child list");
        };
        let SerializedNode::Element { outer_html, .. } = &added_nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(outer_html, TRUNCATED_HTML);
        assert_eq!(stats.truncated_mutation_html, 1);
    }

    #[test]
    fn test_comment_forces_inner_html_fallback() {
        let mut doc = Document::parse("<body><div id=\"box\"><b>k</b></div></body>");
        let boxed = doc.get_element_by_id("box").unwrap();
        let comment = doc.create_comment("note");
        doc.append_child(boxed, comment);
        let record = MutationRecord {
            target: boxed,
            kind: MutationKind::ChildList {
                added: vec![comment],
                removed: vec![],
                previous_sibling: None,
                next_sibling: None,
            },
        };
        let (mutation, _) = describe(&doc, record, 10_000);
        let MutationChange::ChildList { added_nodes, target_inner_html, .. } = mutation.unwrap().change else {
            panic!("expected child list");
        };
        assert_eq!(added_nodes, vec![SerializedNode::Other]);
        assert_eq!(target_inner_html.as_deref(), Some("<b>k</b><!--note-->"));
    }

    #[test]
    fn test_blocked_and_masked_changes() {
        let mut doc = Document::parse(
            r#"<body><div class="rr-block" id="card">1</div><p data-sr-mask="true" id="name">Jane</p></body>"#,
        );
        let card = doc.get_element_by_id("card").unwrap();
        doc.set_attr(card, "title", "4111");
        let (blocked, stats) = describe(
            &doc,
            MutationRecord {
                target: card,
                kind: MutationKind::Attributes {
                    name: "title".into(),
                    old_value: None,
                },
            },
            10_000,
        );
        assert_eq!(blocked.unwrap().change, MutationChange::Blocked);
        assert_eq!(stats.blocked_mutations, 1);

        let name = doc.get_element_by_id("name").unwrap();
        let text = doc.children(name)[0];
        doc.set_text(text, "John");
        let (masked, stats) = describe(
            &doc,
            MutationRecord {
                target: text,
                kind: MutationKind::CharacterData {
                    old_value: Some("Jane".into()),
                },
            },
            10_000,
        );
        let masked = masked.unwrap();
        assert_eq!(masked.target, "#name");
        assert_eq!(
            masked.change,
            MutationChange::CharacterData {
                child_index: Some(0),
                old_value: Some(REDACTED_TEXT.into()),
                new_value: Some(REDACTED_TEXT.into()),
            }
        );
        assert_eq!(stats.masked_mutation_values, 1);
    }

    #[test]
    fn test_script_attribute_mutation_is_skipped() {
        let mut doc = Document::parse(r#"<body><a id="l" href="/x">x</a></body>"#);
        let link = doc.get_element_by_id("l").unwrap();
        doc.set_attr(link, "onclick", "steal()");
        let (mutation, _) = describe(
            &doc,
            MutationRecord {
                target: link,
                kind: MutationKind::Attributes {
                    name: "onclick".into(),
                    old_value: None,
                },
            },
            10_000,
        );
        assert!(mutation.is_none());
    }
}
