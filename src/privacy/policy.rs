//! Redaction decisions.
//!
//! [`CompiledPolicy::classify`] is evaluated at every capture site (snapshot,
//! attribute and text diffs, serialized mutation nodes, interaction values)
//! and once at replay time, so the same node always gets the same answer.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::PrivacyConfig;
use crate::dom::{Document, NodeId, SelectorSet};

pub const REDACTED_TEXT: &str = "[redacted]";
pub const BLOCKED_TEXT: &str = "[blocked]";

/// Attributes that carry human-readable text.
pub const TEXT_BEARING_ATTRIBUTES: &[&str] = &[
    "title",
    "alt",
    "aria-label",
    "aria-description",
    "placeholder",
    "value",
];

const SECRET_INPUT_TYPES: &[&str] = &["password", "email", "tel"];

const TOGGLE_INPUT_TYPES: &[&str] = &[
    "checkbox", "radio", "file", "button", "submit", "reset", "image", "color", "range",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redaction {
    /// Drop the content entirely.
    Block,
    /// Replace text with [`REDACTED_TEXT`].
    MaskText,
    /// Replace a form value with a length-preserving filler.
    MaskValue,
    Pass,
}

impl Redaction {
    pub fn is_masked(self) -> bool {
        matches!(self, Redaction::MaskText | Redaction::MaskValue)
    }
}

/// What kind of value a form control holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormControl {
    /// Free text typed by the user.
    Text,
    /// On/off state, file pickers and buttons. Never value-masked.
    Toggle,
    /// A choice among options.
    Selector,
    None,
}

pub fn classify_form_control(doc: &Document, node: NodeId) -> FormControl {
    let Some(el) = doc.element(node) else {
        return FormControl::None;
    };
    match el.tag() {
        "textarea" => FormControl::Text,
        "select" => FormControl::Selector,
        "input" => match el.input_type() {
            Some(t) if TOGGLE_INPUT_TYPES.contains(&t.as_str()) => FormControl::Toggle,
            _ => FormControl::Text,
        },
        _ => FormControl::None,
    }
}

fn secret_name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)password|passwd|token|secret|otp|ssn").ok())
        .as_ref()
}

/// Whether a form control's type, name, id or autocomplete hint suggests it
/// holds a secret.
pub fn is_secret_field(doc: &Document, node: NodeId) -> bool {
    let Some(el) = doc.element(node) else {
        return false;
    };
    if let Some(input_type) = el.input_type() {
        if SECRET_INPUT_TYPES.contains(&input_type.as_str()) {
            return true;
        }
    }
    let Some(pattern) = secret_name_pattern() else {
        return true;
    };
    ["name", "id", "autocomplete"]
        .iter()
        .filter_map(|attr| el.attr(attr))
        .any(|value| pattern.is_match(value))
}

/// Filler characters tried in order by [`mask_value`].
const MASK_FILLERS: [char; 4] = ['*', '•', '#', 'x'];

/// Length-preserving filler that shares no character with `value`.
pub fn mask_value(value: &str) -> String {
    let filler = MASK_FILLERS
        .iter()
        .copied()
        .find(|c| !value.contains(*c))
        .or_else(|| ('\u{2580}'..='\u{259f}').find(|c| !value.contains(*c)))
        .unwrap_or('\u{2588}');
    std::iter::repeat(filler).take(value.chars().count()).collect()
}

/// Whether `value` already looks like the output of a masking step.
pub fn looks_masked(value: &str) -> bool {
    let mut chars = value.chars();
    let repeated = match chars.next() {
        Some(first) if MASK_FILLERS.contains(&first) => chars.all(|c| c == first),
        _ => false,
    };
    value == REDACTED_TEXT || value == BLOCKED_TEXT || repeated
}

/// Privacy configuration with its selector lists compiled.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    mask_all_inputs: bool,
    block: SelectorSet,
    mask_text: SelectorSet,
}

impl Default for CompiledPolicy {
    fn default() -> Self {
        Self::compile(&PrivacyConfig::default())
    }
}

impl CompiledPolicy {
    pub fn compile(config: &PrivacyConfig) -> Self {
        Self {
            mask_all_inputs: config.mask_all_inputs,
            block: SelectorSet::compile(&config.block_selectors),
            mask_text: SelectorSet::compile(&config.mask_text_selectors),
        }
    }

    pub fn classify(&self, doc: &Document, node: NodeId, attribute: Option<&str>) -> Redaction {
        self.classify_in(doc, node, None, attribute)
    }

    /// Like [`classify`](Self::classify), for a node that may already be
    /// detached: `context` stands in for its former parent.
    pub fn classify_in(
        &self,
        doc: &Document,
        node: NodeId,
        context: Option<NodeId>,
        attribute: Option<&str>,
    ) -> Redaction {
        let chain = lineage(doc, node, context);
        if chain.is_empty() {
            return Redaction::Pass;
        }
        if chain.iter().any(|el| self.block.matches(doc, *el)) {
            return Redaction::Block;
        }
        if chain.iter().any(|el| self.mask_text.matches(doc, *el)) {
            return match attribute {
                None => Redaction::MaskText,
                Some(attr) if is_text_bearing(attr) => Redaction::MaskText,
                Some(_) => Redaction::Pass,
            };
        }
        let control = chain
            .iter()
            .copied()
            .map(|el| (el, classify_form_control(doc, el)))
            .find(|(_, kind)| *kind != FormControl::None);
        match control {
            Some((el, FormControl::Text | FormControl::Selector))
                if self.mask_all_inputs || is_secret_field(doc, el) =>
            {
                match attribute {
                    None => Redaction::MaskValue,
                    Some(attr) if attr.eq_ignore_ascii_case("value") => Redaction::MaskValue,
                    Some(_) => Redaction::Pass,
                }
            }
            _ => Redaction::Pass,
        }
    }

    pub fn is_blocked(&self, doc: &Document, node: NodeId, context: Option<NodeId>) -> bool {
        self.classify_in(doc, node, context, None) == Redaction::Block
    }
}

fn is_text_bearing(attr: &str) -> bool {
    TEXT_BEARING_ATTRIBUTES
        .iter()
        .any(|a| a.eq_ignore_ascii_case(attr))
}

/// Inclusive element ancestry of `node`, nearest first. A detached node
/// continues through `context`.
fn lineage(doc: &Document, node: NodeId, context: Option<NodeId>) -> Vec<NodeId> {
    let mut chain = Vec::new();
    let mut current = Some(node);
    let mut context = context.filter(|_| !doc.is_connected(node));
    while let Some(id) = current {
        if doc.is_element(id) {
            chain.push(id);
        }
        current = match doc.parent(id) {
            Some(parent) => Some(parent),
            None => context.take().filter(|c| *c != id),
        };
    }
    chain
}
