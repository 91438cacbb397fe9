//! Mutable document tree used by the HTML capability.
//!
//! The publisher never sees parser events; it walks and edits this tree and
//! hands it back to [`Document::to_html`] for serialization. Children are
//! owned `Vec<Node>`s, so splicing an include or inserting a `<meta>` is plain
//! vector surgery.
//!
//! Serialization follows HTML5 rules rather than XML: void elements are written
//! without a closing tag, and the contents of `script`/`style` are written raw.

use std::fmt::Write;

/// Elements that never have children or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose text content is written without escaping.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name))
}

pub fn is_raw_text_element(name: &str) -> bool {
    RAW_TEXT_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Doctype(String),
    Element(Element),
    Text(String),
    Comment(String),
}

impl Node {
    pub fn text(value: impl Into<String>) -> Self {
        Node::Text(value.into())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    /// Attributes in source order. Names are kept as written.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Lower-cased tag name, used as the key for handler dispatch.
    pub fn tag(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Concatenated text of all direct text children.
    pub fn text_content(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                Node::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Depth-first search for the first element (self included) whose `id` matches.
    pub fn find_by_id(&self, id: &str) -> Option<&Element> {
        if self.attr("id") == Some(id) {
            return Some(self);
        }
        self.children
            .iter()
            .filter_map(Node::as_element)
            .find_map(|child| child.find_by_id(id))
    }
}

/// A parsed document: the top-level node list (doctype, comments, root element).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub children: Vec<Node>,
}

impl Document {
    pub fn has_doctype(&self) -> bool {
        self.children.iter().any(|n| matches!(n, Node::Doctype(_)))
    }

    pub fn root_index(&self) -> Option<usize> {
        self.children
            .iter()
            .position(|n| matches!(n, Node::Element(_)))
    }

    pub fn root_element(&self) -> Option<&Element> {
        self.children.iter().find_map(Node::as_element)
    }

    /// Insert `<!DOCTYPE html>` before the root element unless one exists.
    pub fn ensure_doctype(&mut self) {
        if self.has_doctype() {
            return;
        }
        let at = self.root_index().unwrap_or(0);
        self.children.insert(at, Node::Doctype("html".to_string()));
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            write_node(&mut out, node, false);
        }
        out
    }
}

/// Serialize a list of nodes as an HTML fragment.
pub fn fragment_to_html(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(&mut out, node, false);
    }
    out
}

fn write_node(out: &mut String, node: &Node, raw: bool) {
    match node {
        Node::Doctype(d) => {
            let _ = write!(out, "<!DOCTYPE {}>", d);
        }
        Node::Comment(c) => {
            let _ = write!(out, "<!--{}-->", c);
        }
        Node::Text(t) if raw => out.push_str(t),
        Node::Text(t) => out.push_str(&escape_text(t)),
        Node::Element(e) => write_element(out, e),
    }
}

fn write_element(out: &mut String, element: &Element) {
    out.push('<');
    out.push_str(&element.name);
    for (k, v) in &element.attributes {
        let _ = write!(out, " {}=\"{}\"", k, escape_attr(v));
    }
    out.push('>');
    if is_void_element(&element.name) {
        return;
    }
    let raw = is_raw_text_element(&element.name);
    for child in &element.children {
        write_node(out, child, raw);
    }
    let _ = write!(out, "</{}>", element.name);
}

pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
    out
}
