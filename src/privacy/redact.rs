//! Serialization with the redaction policy applied.
//!
//! Every capture site that emits markup (the initial snapshot, added and
//! removed mutation nodes, inner-HTML fallbacks) goes through [`Redactor`],
//! so a node is masked the same way wherever it is captured. Scripts, inline
//! handlers, `javascript:` URLs and `autofocus` never leave the page.

use crate::dom::html::{escape_text, is_void, write_start_tag, RAW_TEXT_ELEMENTS};
use crate::dom::scripting::is_script_attr;
use crate::dom::{Document, ElementData, NodeId, NodeKind};

use super::policy::{
    classify_form_control, mask_value, CompiledPolicy, FormControl, Redaction, BLOCKED_TEXT,
    REDACTED_TEXT,
};

/// Attribute marking a blocked element placeholder.
pub const BLOCKED_ATTRIBUTE: &str = "data-sr-blocked";

const BLOCKED_KEEP_ATTRIBUTES: &[&str] = &["id", "class", "style"];

/// Counts of what a serialization pass redacted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedactionReport {
    pub blocked: usize,
    pub masked_text: usize,
    pub masked_values: usize,
    /// Scripts and script-bearing attributes removed.
    pub stripped: usize,
}

impl RedactionReport {
    pub fn redacted(&self) -> bool {
        self.blocked + self.masked_text + self.masked_values > 0
    }
}

pub type SkipFn<'a> = &'a (dyn Fn(&Document, NodeId) -> bool + Send + Sync);

pub struct Redactor<'a> {
    doc: &'a Document,
    policy: &'a CompiledPolicy,
    context: Option<NodeId>,
    skip: Option<SkipFn<'a>>,
    report: RedactionReport,
}

impl<'a> Redactor<'a> {
    pub fn new(doc: &'a Document, policy: &'a CompiledPolicy) -> Self {
        Self {
            doc,
            policy,
            context: None,
            skip: None,
            report: RedactionReport::default(),
        }
    }

    /// Former parent of a detached node being serialized.
    pub fn with_context(mut self, context: Option<NodeId>) -> Self {
        self.context = context;
        self
    }

    /// Nodes for which `skip` returns true are omitted with their subtree.
    pub fn skipping(mut self, skip: SkipFn<'a>) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn document_html(mut self) -> (String, RedactionReport) {
        let mut out = String::new();
        let root = self.doc.root();
        self.write_node(root, &mut out);
        (out, self.report)
    }

    pub fn outer_html(mut self, node: NodeId) -> (String, RedactionReport) {
        let mut out = String::new();
        self.write_node(node, &mut out);
        (out, self.report)
    }

    pub fn inner_html(mut self, node: NodeId) -> (String, RedactionReport) {
        let mut out = String::new();
        let doc = self.doc;
        for child in doc.children(node) {
            self.write_node(*child, &mut out);
        }
        (out, self.report)
    }

    /// Redacted character data of a text node, unescaped.
    pub fn text(mut self, node: NodeId) -> (String, RedactionReport) {
        let text = self.doc.text(node).unwrap_or_default().to_string();
        let out = self.redact_text(node, &text);
        (out, self.report)
    }

    fn skipped(&self, node: NodeId) -> bool {
        self.skip.map(|skip| skip(self.doc, node)).unwrap_or(false)
    }

    fn parent_tag(&self, node: NodeId) -> Option<&'a str> {
        let parent = self.doc.parent(node).or(self.context)?;
        self.doc.tag_name(parent)
    }

    fn redact_text(&mut self, node: NodeId, text: &str) -> String {
        match self.policy.classify_in(self.doc, node, self.context, None) {
            Redaction::Block => {
                self.report.blocked += 1;
                BLOCKED_TEXT.to_string()
            }
            Redaction::MaskText if !text.trim().is_empty() => {
                self.report.masked_text += 1;
                REDACTED_TEXT.to_string()
            }
            Redaction::MaskValue if self.parent_tag(node) == Some("textarea") && !text.is_empty() => {
                self.report.masked_values += 1;
                mask_value(text)
            }
            _ => text.to_string(),
        }
    }

    fn write_node(&mut self, node: NodeId, out: &mut String) {
        if self.skipped(node) {
            return;
        }
        let doc = self.doc;
        match doc.kind(node) {
            NodeKind::Document => {
                for child in doc.children(node) {
                    self.write_node(*child, out);
                }
            }
            NodeKind::Doctype(name) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(if name.is_empty() { "html" } else { name });
                out.push('>');
            }
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::Text(text) => {
                let redacted = self.redact_text(node, text);
                let raw = self
                    .parent_tag(node)
                    .map(|t| RAW_TEXT_ELEMENTS.contains(&t))
                    .unwrap_or(false);
                if raw {
                    out.push_str(&redacted);
                } else {
                    out.push_str(&escape_text(&redacted));
                }
            }
            NodeKind::Element(el) => self.write_element(node, el, out),
        }
    }

    fn write_element(&mut self, node: NodeId, el: &ElementData, out: &mut String) {
        let tag = el.tag();
        if tag == "script" {
            self.report.stripped += 1;
            return;
        }

        let decision = self.policy.classify_in(self.doc, node, self.context, None);
        if decision == Redaction::Block {
            self.report.blocked += 1;
            let kept = el
                .attrs()
                .iter()
                .filter(|(name, _)| BLOCKED_KEEP_ATTRIBUTES.contains(&name.as_str()))
                .map(|(n, v)| (n.as_str(), v.as_str()))
                .chain(std::iter::once((BLOCKED_ATTRIBUTE, "1")));
            write_start_tag(out, tag, kept);
            if !is_void(tag) {
                out.push_str(BLOCKED_TEXT);
                close_tag(out, tag);
            }
            return;
        }

        let control = classify_form_control(self.doc, node);
        let text_input = tag == "input" && control == FormControl::Text;
        let mut attrs: Vec<(String, String)> = Vec::with_capacity(el.attrs().len() + 1);
        for (name, value) in el.attrs() {
            if is_script_attr(name, value) || name == "autofocus" {
                self.report.stripped += 1;
                continue;
            }
            if text_input && name == "value" {
                continue;
            }
            if tag == "option" && name == "selected" && decision.is_masked() {
                continue;
            }
            let scoped = self
                .policy
                .classify_in(self.doc, node, self.context, Some(name));
            let value = match scoped {
                Redaction::MaskText => {
                    self.report.masked_text += 1;
                    REDACTED_TEXT.to_string()
                }
                Redaction::MaskValue => {
                    self.report.masked_values += 1;
                    mask_value(value)
                }
                _ => value.clone(),
            };
            attrs.push((name.clone(), value));
        }

        if text_input {
            let live = self.doc.value(node).unwrap_or_default();
            if !live.is_empty() || el.has_attr("value") {
                let value = if decision.is_masked() && !live.is_empty() {
                    self.report.masked_values += 1;
                    mask_value(&live)
                } else {
                    live
                };
                attrs.push(("value".to_string(), value));
            }
        }

        write_start_tag(out, tag, attrs.iter().map(|(n, v)| (n.as_str(), v.as_str())));
        if is_void(tag) {
            return;
        }

        if tag == "textarea" {
            let live = self.doc.value(node).unwrap_or_default();
            let value = if decision.is_masked() && !live.is_empty() {
                self.report.masked_values += 1;
                mask_value(&live)
            } else {
                live
            };
            out.push_str(&escape_text(&value));
        } else {
            let doc = self.doc;
            for child in doc.children(node) {
                self.write_node(*child, out);
            }
        }
        close_tag(out, tag);
    }
}

fn close_tag(out: &mut String, tag: &str) {
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}
