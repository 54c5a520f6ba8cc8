use std::fmt;

/// Id of the replay pointer layer. It takes no part in sibling indexing, so
/// structural paths and `:nth-of-type` never count it.
pub const POINTER_LAYER_ID: &str = "__sr_pointer_layer__";

/// Handle to a node inside one [`Document`] arena.
///
/// Ids are never reused within a document; detached nodes keep their id and
/// can be re-attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Element name, attributes and live form state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    tag: String,
    attrs: Vec<(String, String)>,
    /// Live value of a form control, diverging from its markup once edited.
    value: Option<String>,
}

impl ElementData {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
            value: None,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attrs(&self) -> &[(String, String)] {
        &self.attrs
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        match self.attrs.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attrs.push((name, value.to_string())),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self
            .attrs
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.attrs.remove(pos).1)
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id").filter(|id| !id.is_empty())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|classes| classes.split_ascii_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn live_value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Lowercased `type` attribute of an `input`, defaulting to `text`.
    pub fn input_type(&self) -> Option<String> {
        if self.tag != "input" {
            return None;
        }
        Some(
            self.attr("type")
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "text".to_string()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Doctype(String),
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Slot {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An arena-backed document tree.
///
/// Slot 0 is always the document node. Mutating operations keep parent and
/// child links consistent and refuse to create cycles.
#[derive(Debug, Clone)]
pub struct Document {
    slots: Vec<Slot>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            slots: vec![Slot {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Whether `id` was allocated by this document.
    pub fn owns(&self, id: NodeId) -> bool {
        id.0 < self.slots.len()
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        self.slots.push(Slot {
            kind,
            parent: None,
            children: Vec::new(),
        });
        NodeId(self.slots.len() - 1)
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeKind::Element(ElementData::new(tag)))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text(text.into()))
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Comment(text.into()))
    }

    pub fn create_doctype(&mut self, name: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Doctype(name.into()))
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.slots[id.0].kind
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.slots.get(id.0)?.kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.slots.get_mut(id.0)?.kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.slots.get(id.0).map(|s| &s.kind), Some(NodeKind::Text(_)))
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(ElementData::tag)
    }

    pub fn is_tag(&self, id: NodeId, tag: &str) -> bool {
        self.tag_name(id)
            .map(|t| t.eq_ignore_ascii_case(tag))
            .unwrap_or(false)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots.get(id.0)?.parent
    }

    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).filter(|p| self.is_element(*p))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slots
            .get(id.0)
            .map(|s| s.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |c| self.is_element(*c))
    }

    /// Element children that count towards sibling indexes.
    pub fn indexed_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.element_children(id)
            .filter(move |c| self.attr(*c, "id") != Some(POINTER_LAYER_ID))
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).last().copied()
    }

    /// Position of `id` within its parent's child list.
    pub fn child_index(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.child_index(id)?;
        index
            .checked_sub(1)
            .and_then(|i| self.children(parent).get(i).copied())
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.child_index(id)?;
        self.children(parent).get(index + 1).copied()
    }

    /// Inclusive containment, like `Node.contains`.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor || self.ancestors(node).any(|a| a == ancestor)
    }

    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: self.parent(id),
        }
    }

    /// Nearest inclusive ancestor element satisfying `predicate`.
    pub fn closest(&self, id: NodeId, predicate: impl Fn(&ElementData) -> bool) -> Option<NodeId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|n| self.element(*n).map(&predicate).unwrap_or(false))
    }

    /// Descendants in tree order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        id == self.root() || self.ancestors(id).any(|a| a == self.root())
    }

    pub fn document_element(&self) -> Option<NodeId> {
        self.element_children(self.root()).next()
    }

    pub fn head(&self) -> Option<NodeId> {
        let html = self.document_element()?;
        self.element_children(html).find(|c| self.is_tag(*c, "head"))
    }

    pub fn body(&self) -> Option<NodeId> {
        let html = self.document_element()?;
        self.element_children(html).find(|c| self.is_tag(*c, "body"))
    }

    /// First connected element, in tree order, whose `id` equals `id`.
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        if id.is_empty() {
            return None;
        }
        self.descendants(self.root())
            .into_iter()
            .find(|n| self.element(*n).and_then(ElementData::id) == Some(id))
    }

    /// Detaches `child` from its current parent and appends it to `parent`.
    ///
    /// Returns `false` (leaving the tree untouched) when the move would make a
    /// node its own ancestor.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        self.insert_before(parent, child, None)
    }

    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) -> bool {
        if !self.owns(parent) || !self.owns(child) || child == self.root() {
            return false;
        }
        if self.contains(child, parent) {
            return false;
        }
        if let Some(r) = reference {
            if self.parent(r) != Some(parent) || r == child {
                return false;
            }
        }
        self.detach(child);
        let index = reference
            .and_then(|r| self.slots[parent.0].children.iter().position(|c| *c == r))
            .unwrap_or(self.slots[parent.0].children.len());
        self.slots[parent.0].children.insert(index, child);
        self.slots[child.0].parent = Some(parent);
        true
    }

    /// Removes `id` from its parent. Returns `false` if it was not attached.
    pub fn detach(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.parent(id) else {
            return false;
        };
        self.slots[parent.0].children.retain(|c| *c != id);
        self.slots[id.0].parent = None;
        true
    }

    /// Detaches and returns every child of `id`.
    pub fn remove_children(&mut self, id: NodeId) -> Vec<NodeId> {
        let Some(slot) = self.slots.get_mut(id.0) else {
            return Vec::new();
        };
        let children = std::mem::take(&mut slot.children);
        for child in &children {
            self.slots[child.0].parent = None;
        }
        children
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attr(name)
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> bool {
        match self.element_mut(id) {
            Some(el) => {
                el.set_attr(name, value);
                true
            }
            None => false,
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        self.element_mut(id)?.remove_attr(name)
    }

    /// Character data of a text or comment node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.slots.get(id.0)?.kind {
            NodeKind::Text(t) | NodeKind::Comment(t) => Some(t),
            _ => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, data: &str) -> bool {
        match self.slots.get_mut(id.0).map(|s| &mut s.kind) {
            Some(NodeKind::Text(t)) | Some(NodeKind::Comment(t)) => {
                *t = data.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn text_content(&self, id: NodeId) -> String {
        if let NodeKind::Text(t) = self.kind(id) {
            return t.clone();
        }
        self.descendants(id)
            .into_iter()
            .filter_map(|n| match self.kind(n) {
                NodeKind::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replaces all children of an element with a single text node, or
    /// rewrites the data of a text node.
    pub fn set_text_content(&mut self, id: NodeId, text: &str) {
        if self.set_text(id, text) {
            return;
        }
        if !self.is_element(id) {
            return;
        }
        self.remove_children(id);
        if !text.is_empty() {
            let node = self.create_text(text);
            self.append_child(id, node);
        }
    }

    /// Current value of a form control (`input`, `textarea`, `select`).
    pub fn value(&self, id: NodeId) -> Option<String> {
        let el = self.element(id)?;
        if let Some(live) = el.live_value() {
            return Some(live.to_string());
        }
        match el.tag() {
            "input" => {
                let fallback = match el.input_type().as_deref() {
                    Some("checkbox") | Some("radio") => "on",
                    _ => "",
                };
                Some(el.attr("value").unwrap_or(fallback).to_string())
            }
            "textarea" => Some(self.text_content(id)),
            "select" => {
                let options: Vec<NodeId> = self
                    .descendants(id)
                    .into_iter()
                    .filter(|n| self.is_tag(*n, "option"))
                    .collect();
                let chosen = options
                    .iter()
                    .copied()
                    .find(|o| self.attr(*o, "selected").is_some())
                    .or_else(|| options.first().copied());
                Some(chosen.map(|o| self.option_value(o)).unwrap_or_default())
            }
            _ => None,
        }
    }

    fn option_value(&self, option: NodeId) -> String {
        match self.attr(option, "value") {
            Some(v) => v.to_string(),
            None => self.text_content(option).trim().to_string(),
        }
    }

    /// Assigns the live value of a form control. Returns `false` for other
    /// nodes.
    pub fn set_value(&mut self, id: NodeId, value: &str) -> bool {
        match self.element_mut(id) {
            Some(el) if matches!(el.tag(), "input" | "textarea" | "select") => {
                el.value = Some(value.to_string());
                true
            }
            _ => false,
        }
    }

    /// 1-based index among same-tag element siblings.
    pub fn nth_of_type(&self, id: NodeId) -> Option<usize> {
        let tag = self.tag_name(id)?;
        let Some(parent) = self.parent(id) else {
            return Some(1);
        };
        let mut index = 0;
        for sibling in self.indexed_children(parent) {
            if self.is_tag(sibling, tag) {
                index += 1;
            }
            if sibling == id {
                return Some(index);
            }
        }
        None
    }

    /// Deep-copies `node` from `source` into this arena as a detached subtree.
    pub fn import(&mut self, source: &Document, node: NodeId) -> NodeId {
        let kind = match source.kind(node) {
            NodeKind::Document => NodeKind::Comment(String::new()),
            other => other.clone(),
        };
        let copy = self.alloc(kind);
        for child in source.children(node) {
            let child_copy = self.import(source, *child);
            self.append_child(copy, child_copy);
        }
        copy
    }
}

/// Iterator over the ancestors of a node, nearest first.
pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.doc.parent(current);
        Some(current)
    }
}
