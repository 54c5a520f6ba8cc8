//! Tolerant HTML parsing and serialization for [`Document`].
//!
//! The parser accepts the markup produced by browsers' `outerHTML` and
//! hand-written fixtures. It is not a conforming HTML5 tree builder: it
//! handles void and raw-text elements, entity decoding, and the implied end
//! tags that commonly appear in real pages, and otherwise nests tags as
//! written. Unclosed elements are closed at end of input.

use super::node::{Document, NodeId, NodeKind};

pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content is not markup.
pub const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Elements whose content is text with entity references.
pub const RCDATA_ELEMENTS: &[&str] = &["textarea", "title"];

const METADATA_ELEMENTS: &[&str] = &["base", "link", "meta", "noscript", "script", "style", "title"];

const CLOSES_PARAGRAPH: &[&str] = &[
    "address", "article", "aside", "blockquote", "div", "dl", "fieldset", "figure", "footer",
    "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "main", "nav", "ol", "p", "pre",
    "section", "table", "ul",
];

pub fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Doctype(String),
    StartTag {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    EndTag(String),
    Comment(String),
    Text(String),
}

struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
    raw_until: Option<String>,
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            raw_until: None,
        }
    }

    fn raw_text(&mut self, tag: &str) -> Option<Token> {
        let src = self.src;
        let rest = &src[self.pos..];
        let close = format!("</{tag}");
        let end = find_ascii_case_insensitive(rest, &close).unwrap_or(rest.len());
        let text = &rest[..end];
        self.pos += end;
        if text.is_empty() {
            return None;
        }
        let text = if RCDATA_ELEMENTS.contains(&tag) {
            decode_entities(text)
        } else {
            text.to_string()
        };
        Some(Token::Text(text))
    }

    fn start_tag(&mut self, rest: &str) -> Token {
        let bytes = rest.as_bytes();
        let len = bytes.len();
        let mut i = 1;
        while i < len && is_tag_name_byte(bytes[i]) {
            i += 1;
        }
        let name = rest[1..i].to_ascii_lowercase();
        let mut attrs: Vec<(String, String)> = Vec::new();
        let mut self_closing = false;
        loop {
            while i < len && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= len {
                break;
            }
            match bytes[i] {
                b'>' => {
                    i += 1;
                    break;
                }
                b'/' => {
                    i += 1;
                    if i < len && bytes[i] == b'>' {
                        self_closing = true;
                        i += 1;
                        break;
                    }
                    continue;
                }
                _ => {}
            }
            let start = i;
            while i < len
                && !bytes[i].is_ascii_whitespace()
                && !matches!(bytes[i], b'=' | b'>' | b'/')
            {
                i += 1;
            }
            if start == i {
                i += 1;
                continue;
            }
            let attr_name = rest[start..i].to_ascii_lowercase();
            while i < len && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            let mut value = String::new();
            if i < len && bytes[i] == b'=' {
                i += 1;
                while i < len && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                if i < len && (bytes[i] == b'"' || bytes[i] == b'\'') {
                    let quote = bytes[i];
                    i += 1;
                    let value_start = i;
                    while i < len && bytes[i] != quote {
                        i += 1;
                    }
                    value = decode_entities(&rest[value_start..i]);
                    if i < len {
                        i += 1;
                    }
                } else {
                    let value_start = i;
                    while i < len && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                        i += 1;
                    }
                    value = decode_entities(&rest[value_start..i]);
                }
            }
            if !attrs.iter().any(|(n, _)| *n == attr_name) {
                attrs.push((attr_name, value));
            }
        }
        self.pos += i;
        if !self_closing && (RAW_TEXT_ELEMENTS.contains(&name.as_str()) || RCDATA_ELEMENTS.contains(&name.as_str())) {
            self.raw_until = Some(name.clone());
        }
        Token::StartTag {
            name,
            attrs,
            self_closing,
        }
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            if self.pos >= self.src.len() {
                return None;
            }
            if let Some(tag) = self.raw_until.take() {
                match self.raw_text(&tag) {
                    Some(token) => return Some(token),
                    None => continue,
                }
            }
            let src = self.src;
            let rest = &src[self.pos..];
            let second = rest.as_bytes().get(1).copied();

            if let Some(body) = rest.strip_prefix("<!--") {
                let (comment, consumed) = match body.find("-->") {
                    Some(end) => (&body[..end], 4 + end + 3),
                    None => (body, rest.len()),
                };
                self.pos += consumed;
                return Some(Token::Comment(comment.to_string()));
            }

            if rest.starts_with("<!") || rest.starts_with("<?") {
                let end = rest.find('>').unwrap_or(rest.len());
                let body = &rest[2..end];
                self.pos += (end + 1).min(rest.len());
                let token = match body.get(..7) {
                    Some(prefix) if prefix.eq_ignore_ascii_case("doctype") => {
                        Token::Doctype(body[7..].trim().to_string())
                    }
                    _ => Token::Comment(body.to_string()),
                };
                return Some(token);
            }

            if rest.starts_with("</") && rest.as_bytes().get(2).is_some_and(u8::is_ascii_alphabetic) {
                let end = rest.find('>').unwrap_or(rest.len());
                let name: String = rest[2..end]
                    .bytes()
                    .take_while(|b| is_tag_name_byte(*b))
                    .map(|b| b.to_ascii_lowercase() as char)
                    .collect();
                self.pos += (end + 1).min(rest.len());
                return Some(Token::EndTag(name));
            }

            if rest.starts_with('<') && second.is_some_and(|b| b.is_ascii_alphabetic()) {
                return Some(self.start_tag(rest));
            }

            let first = rest.chars().next().map(char::len_utf8).unwrap_or(1);
            let end = rest[first..].find('<').map(|i| i + first).unwrap_or(rest.len());
            self.pos += end;
            return Some(Token::Text(decode_entities(&rest[..end])));
        }
    }
}

fn is_tag_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b':' || b == b'_'
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.len() > hay.len() {
        return None;
    }
    (0..=hay.len() - needle.len()).find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

/// Decodes the named and numeric character references found in real markup.
/// Unknown references are kept verbatim.
pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .get(1..)
            .and_then(|after| after.find(';').filter(|semi| *semi <= 10).map(|semi| (&after[..semi], semi)))
            .and_then(|(name, semi)| decode_reference(name).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 2..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => None,
    }
}

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
    out
}

pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
    out
}

/// Writes an opening tag with the given attributes.
pub(crate) fn write_start_tag<'a>(
    out: &mut String,
    tag: &str,
    attrs: impl IntoIterator<Item = (&'a str, &'a str)>,
) {
    out.push('<');
    out.push_str(tag);
    for (name, value) in attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out.push('>');
}

impl Document {
    /// Parses a full document, synthesizing `html`, `head` and `body` when
    /// the markup omits them.
    pub fn parse(html: &str) -> Document {
        let mut doc = Document::new();
        let root = doc.root();
        build_tree(&mut doc, root, html, true);
        doc.normalize_skeleton();
        doc
    }

    /// Parses `html` as a fragment and appends the resulting nodes to
    /// `parent`, returning the top-level nodes created.
    pub fn parse_fragment(&mut self, parent: NodeId, html: &str) -> Vec<NodeId> {
        build_tree(self, parent, html, false)
    }

    /// Replaces the children of `id` with the parsed fragment.
    pub fn set_inner_html(&mut self, id: NodeId, html: &str) -> Vec<NodeId> {
        self.remove_children(id);
        self.parse_fragment(id, html)
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(id) {
            self.write_node(*child, &mut out);
        }
        out
    }

    /// Serializes the whole document, doctype included.
    pub fn to_html(&self) -> String {
        self.outer_html(self.root())
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Document => {
                for child in self.children(id) {
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
                let raw = self
                    .parent(id)
                    .and_then(|p| self.tag_name(p))
                    .map(|t| RAW_TEXT_ELEMENTS.contains(&t))
                    .unwrap_or(false);
                if raw {
                    out.push_str(text);
                } else {
                    out.push_str(&escape_text(text));
                }
            }
            NodeKind::Element(el) => {
                write_start_tag(out, el.tag(), el.attrs().iter().map(|(n, v)| (n.as_str(), v.as_str())));
                if is_void(el.tag()) {
                    return;
                }
                for child in self.children(id) {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(el.tag());
                out.push('>');
            }
        }
    }

    fn normalize_skeleton(&mut self) {
        let root = self.root();
        let found = self.element_children(root).find(|c| self.is_tag(*c, "html"));
        let html = match found {
            Some(html) => html,
            None => {
                let html = self.create_element("html");
                let movable: Vec<NodeId> = self
                    .children(root)
                    .iter()
                    .copied()
                    .filter(|c| !matches!(self.kind(*c), NodeKind::Doctype(_)))
                    .collect();
                self.append_child(root, html);
                for node in movable {
                    self.append_child(html, node);
                }
                html
            }
        };
        let stray: Vec<NodeId> = self
            .element_children(root)
            .filter(|c| *c != html)
            .collect();
        for node in stray {
            self.append_child(html, node);
        }

        let found = self.element_children(html).find(|c| self.is_tag(*c, "head"));
        let head = match found {
            Some(head) => head,
            None => {
                let head = self.create_element("head");
                let leading: Vec<NodeId> = self
                    .children(html)
                    .iter()
                    .copied()
                    .take_while(|c| match self.kind(*c) {
                        NodeKind::Element(el) => METADATA_ELEMENTS.contains(&el.tag()),
                        NodeKind::Text(t) => t.trim().is_empty(),
                        _ => true,
                    })
                    .filter(|c| self.is_element(*c))
                    .collect();
                let first = self.first_child(html);
                self.insert_before(html, head, first);
                for node in leading {
                    self.append_child(head, node);
                }
                head
            }
        };

        if self.body().is_none() {
            let body = self.create_element("body");
            let content: Vec<NodeId> = self
                .children(html)
                .iter()
                .copied()
                .filter(|c| *c != head)
                .collect();
            self.append_child(html, body);
            for node in content {
                self.append_child(body, node);
            }
        }
    }
}

fn top_is(doc: &Document, stack: &[NodeId], names: &[&str]) -> bool {
    stack
        .last()
        .and_then(|n| doc.tag_name(*n))
        .map(|t| names.contains(&t))
        .unwrap_or(false)
}

fn close_implied(doc: &Document, stack: &mut Vec<NodeId>, tag: &str) {
    match tag {
        "li" => {
            let open_li = stack
                .iter()
                .rposition(|n| doc.is_tag(*n, "li"))
                .filter(|pos| !stack[*pos..].iter().any(|n| doc.is_tag(*n, "ul") || doc.is_tag(*n, "ol")));
            if let Some(pos) = open_li.filter(|pos| *pos > 0) {
                stack.truncate(pos);
            }
        }
        "dt" | "dd" => {
            if top_is(doc, stack, &["dt", "dd"]) {
                stack.pop();
            }
        }
        "option" => {
            if top_is(doc, stack, &["option"]) {
                stack.pop();
            }
        }
        "optgroup" => {
            if top_is(doc, stack, &["option"]) {
                stack.pop();
            }
            if top_is(doc, stack, &["optgroup"]) {
                stack.pop();
            }
        }
        "td" | "th" => {
            if top_is(doc, stack, &["td", "th"]) {
                stack.pop();
            }
        }
        "tr" => {
            if top_is(doc, stack, &["td", "th"]) {
                stack.pop();
            }
            if top_is(doc, stack, &["tr"]) {
                stack.pop();
            }
        }
        _ => {}
    }
    if CLOSES_PARAGRAPH.contains(&tag) && top_is(doc, stack, &["p"]) {
        stack.pop();
    }
}

fn build_tree(doc: &mut Document, base: NodeId, html: &str, document_mode: bool) -> Vec<NodeId> {
    let existing = doc.children(base).len();
    let mut stack = vec![base];
    for token in Tokenizer::new(html) {
        let current = stack.last().copied().unwrap_or(base);
        match token {
            Token::Doctype(name) => {
                if document_mode && stack.len() == 1 {
                    let node = doc.create_doctype(name);
                    doc.append_child(base, node);
                }
            }
            Token::Comment(text) => {
                let node = doc.create_comment(text);
                doc.append_child(current, node);
            }
            Token::Text(text) => {
                if text.is_empty() {
                    continue;
                }
                let merged = doc
                    .last_child(current)
                    .filter(|last| doc.is_text(*last))
                    .map(|last| {
                        let joined = format!("{}{}", doc.text(last).unwrap_or_default(), text);
                        doc.set_text(last, &joined)
                    })
                    .unwrap_or(false);
                if !merged {
                    let node = doc.create_text(text);
                    doc.append_child(current, node);
                }
            }
            Token::StartTag {
                name,
                attrs,
                self_closing,
            } => {
                close_implied(doc, &mut stack, &name);
                let parent = stack.last().copied().unwrap_or(base);
                let node = doc.create_element(&name);
                for (attr, value) in &attrs {
                    doc.set_attr(node, attr, value);
                }
                doc.append_child(parent, node);
                if !self_closing && !is_void(&name) {
                    stack.push(node);
                }
            }
            Token::EndTag(name) => {
                if let Some(pos) = stack.iter().rposition(|n| *n != base && doc.is_tag(*n, &name)) {
                    stack.truncate(pos);
                }
            }
        }
    }
    doc.children(base)[existing.min(doc.children(base).len())..].to_vec()
}
