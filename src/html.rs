//! HTML capability: source text → [`Document`] tree.
//!
//! The publisher depends only on the [`HtmlParser`] trait. The shipped
//! implementation, [`Html5Parser`], runs the html5ever tokenizer (the HTML5
//! tokenization algorithm, so character references, bare `&` and stray `<`
//! behave as in a browser) and assembles the tree itself:
//!
//! - void elements (`<meta charset="utf-8">`) never open a scope
//! - `script`/`style` bodies are tokenized as raw text up to the closing tag
//! - stray or mismatched end tags close the nearest matching open element
//! - an explicit `/>` closes any element, so inline SVG keeps its shape
//!
//! It is not the HTML5 tree builder (no implied `<tbody>`, no auto-closing
//! `<p>`, no synthesized `<head>`/`<body>`): templates and include fragments
//! come back with exactly the structure they were written with.

use crate::dom::{Document, Element, Node, is_void_element};
use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Doctype, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer,
    TokenizerOpts,
};
use log::trace;
use std::cell::RefCell;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HtmlError {
    #[error("HTML parse error at byte {position}: {message}")]
    Parse { position: usize, message: String },
}

/// Parses bytes into a mutable element tree.
pub trait HtmlParser {
    fn parse_document(&self, source: &str) -> Result<Document, HtmlError>;

    /// Parse a fragment (no doctype expected) into a node list.
    fn parse_fragment(&self, source: &str) -> Result<Vec<Node>, HtmlError> {
        Ok(self.parse_document(source)?.children)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Html5Parser;

impl HtmlParser for Html5Parser {
    fn parse_document(&self, source: &str) -> Result<Document, HtmlError> {
        let tree = RefCell::new(TreeBuilder::default());
        {
            let input = BufferQueue::default();
            input.push_back(StrTendril::from_slice(source));
            let tokenizer = Tokenizer::new(TreeSink { tree: &tree }, TokenizerOpts::default());
            let _ = tokenizer.feed(&input);
            tokenizer.end();
        }
        Ok(Document {
            children: tree.into_inner().finish(),
        })
    }
}

struct TreeSink<'a> {
    tree: &'a RefCell<TreeBuilder>,
}

impl TokenSink for TreeSink<'_> {
    type Handle = ();

    fn process_token(&self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        let mut tree = self.tree.borrow_mut();
        match token {
            Token::TagToken(tag) => match tag.kind {
                TagKind::StartTag => {
                    let raw = raw_kind(&tag.name);
                    let self_closing = tag.self_closing;
                    let element = element_from(tag);
                    if self_closing {
                        tree.push_element(element);
                    } else {
                        tree.open(element);
                        if let Some(kind) = raw {
                            return TokenSinkResult::RawData(kind);
                        }
                    }
                }
                TagKind::EndTag => tree.close(&tag.name),
            },
            Token::CharacterTokens(text) => tree.push(Node::Text(text.to_string())),
            Token::NullCharacterToken => tree.push(Node::text("\u{fffd}")),
            Token::CommentToken(comment) => tree.push(Node::Comment(comment.to_string())),
            Token::DoctypeToken(doctype) => tree.push(Node::Doctype(doctype_text(&doctype))),
            Token::ParseError(message) => trace!("lenient HTML: {}", message),
            Token::EOFToken => {}
        }
        TokenSinkResult::Continue
    }
}

/// Tokenizer state for the body of elements whose content is not markup.
fn raw_kind(name: &str) -> Option<RawKind> {
    match name {
        "script" => Some(RawKind::ScriptData),
        "style" | "xmp" | "iframe" | "noembed" | "noframes" => Some(RawKind::Rawtext),
        "title" | "textarea" => Some(RawKind::Rcdata),
        _ => None,
    }
}

fn element_from(tag: Tag) -> Element {
    Element {
        name: tag.name.to_string(),
        attributes: tag
            .attrs
            .into_iter()
            .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
            .collect(),
        children: Vec::new(),
    }
}

fn doctype_text(doctype: &Doctype) -> String {
    let mut text = doctype
        .name
        .as_ref()
        .map(|name| name.to_string())
        .unwrap_or_else(|| "html".to_string());
    match (&doctype.public_id, &doctype.system_id) {
        (Some(public), Some(system)) => {
            text.push_str(&format!(" PUBLIC \"{}\" \"{}\"", public, system));
        }
        (Some(public), None) => text.push_str(&format!(" PUBLIC \"{}\"", public)),
        (None, Some(system)) => text.push_str(&format!(" SYSTEM \"{}\"", system)),
        (None, None) => {}
    }
    text
}

#[derive(Default)]
struct TreeBuilder {
    open: Vec<Element>,
    top: Vec<Node>,
}

impl TreeBuilder {
    fn push(&mut self, node: Node) {
        let siblings = match self.open.last_mut() {
            Some(parent) => &mut parent.children,
            None => &mut self.top,
        };
        if let Node::Text(text) = &node
            && let Some(Node::Text(previous)) = siblings.last_mut()
        {
            previous.push_str(text);
            return;
        }
        siblings.push(node);
    }

    fn push_element(&mut self, element: Element) {
        self.push(Node::Element(element));
    }

    fn open(&mut self, element: Element) {
        if is_void_element(&element.name) {
            self.push_element(element);
        } else {
            self.open.push(element);
        }
    }

    fn close(&mut self, name: &str) {
        if is_void_element(name) {
            return;
        }
        let Some(at) = self
            .open
            .iter()
            .rposition(|e| e.name.eq_ignore_ascii_case(name))
        else {
            return;
        };
        while self.open.len() > at {
            if let Some(element) = self.open.pop() {
                self.push_element(element);
            }
        }
    }

    fn finish(mut self) -> Vec<Node> {
        while let Some(element) = self.open.pop() {
            self.push_element(element);
        }
        self.top
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Document {
        Html5Parser.parse_document(source).unwrap()
    }

    fn root(doc: &Document) -> &Element {
        doc.root_element().unwrap()
    }

    #[test]
    fn parses_doctype_and_root() {
        let doc = parse("<!DOCTYPE html>\n<html><head></head><body></body></html>");
        assert_eq!(doc.children[0], Node::Doctype("html".into()));
        assert_eq!(root(&doc).name, "html");
    }

    #[test]
    fn void_elements_do_not_swallow_siblings() {
        let doc = parse(r#"<head><meta charset="utf-8"><title>T</title></head>"#);
        let head = root(&doc);
        let names: Vec<&str> = head
            .children
            .iter()
            .filter_map(Node::as_element)
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["meta", "title"]);
    }

    #[test]
    fn script_body_is_captured_verbatim() {
        let doc = parse("<body><script>if (a < b && c) { go(); }</script><p>x</p></body>");
        let body = root(&doc);
        let script = body.children[0].as_element().unwrap();
        assert_eq!(script.text_content(), "if (a < b && c) { go(); }");
        assert_eq!(body.children[1].as_element().unwrap().name, "p");
    }

    #[test]
    fn entities_are_decoded_in_text_and_attributes() {
        let doc = parse(r#"<p title="a &amp; b">x &lt; y&nbsp;&#65;&#x42;</p>"#);
        let p = root(&doc);
        assert_eq!(p.attr("title"), Some("a & b"));
        assert_eq!(p.text_content(), "x < y\u{a0}AB");
    }

    #[test]
    fn unknown_entities_are_kept() {
        let doc = parse("<p title=\"&bogus;\">&bogus; &notanentity done</p>");
        let p = root(&doc);
        assert_eq!(p.text_content(), "&bogus; &notanentity done");
        assert_eq!(p.attr("title"), Some("&bogus;"));
    }

    #[test]
    fn full_named_entity_table_is_available() {
        let doc = parse("<p>&hearts;&rarr;&Omega;&eacute;</p>");
        assert_eq!(root(&doc).text_content(), "\u{2665}\u{2192}\u{3a9}\u{e9}");
    }

    // =========================================================================
    // Bare ampersands and angle brackets
    // =========================================================================

    #[test]
    fn bare_ampersands_are_text() {
        let doc = parse("<html><body><p>Tom & Jerry</p><p>AT&T</p></body></html>");
        let body = root(&doc).children[0].as_element().unwrap();
        let texts: Vec<String> = body
            .children
            .iter()
            .filter_map(Node::as_element)
            .map(Element::text_content)
            .collect();
        assert_eq!(texts, vec!["Tom & Jerry", "AT&T"]);
        assert_eq!(
            doc.to_html(),
            "<html><body><p>Tom &amp; Jerry</p><p>AT&amp;T</p></body></html>"
        );
    }

    #[test]
    fn stray_less_than_is_text() {
        let doc = parse("<p>1 < 2</p><p>b</p>");
        let p = doc.children[0].as_element().unwrap();
        assert_eq!(p.text_content(), "1 < 2");
        assert!(p.children.iter().all(|n| matches!(n, Node::Text(_))));
        assert_eq!(doc.to_html(), "<p>1 &lt; 2</p><p>b</p>");
    }

    #[test]
    fn query_string_ampersands_survive_in_attributes() {
        let doc = parse("<a href=\"/s?a=1&b=2&copy=3\">x</a>");
        assert_eq!(root(&doc).attr("href"), Some("/s?a=1&b=2&copy=3"));
    }

    #[test]
    fn explicit_self_closing_keeps_svg_flat() {
        let doc = parse("<svg><path d=\"M0\"/><circle r=\"1\"/></svg>");
        let svg = root(&doc);
        assert_eq!(svg.children.len(), 2);
        assert!(svg.children.iter().all(|n| n.as_element().is_some_and(|e| e.children.is_empty())));
    }

    #[test]
    fn mismatched_end_tag_closes_nearest_open_element() {
        let doc = parse("<div><span>a</div><p>b</p>");
        let div = doc.children[0].as_element().unwrap();
        assert_eq!(div.name, "div");
        assert_eq!(div.children[0].as_element().unwrap().name, "span");
        assert_eq!(doc.children[1].as_element().unwrap().name, "p");
    }

    #[test]
    fn valueless_attributes_are_accepted() {
        let doc = parse("<script defer src=\"app.js\"></script>");
        let script = root(&doc);
        assert_eq!(script.attr("src"), Some("app.js"));
        assert!(script.attr("defer").is_some());
    }

    #[test]
    fn fragment_parsing_returns_all_top_level_nodes() {
        let nodes = Html5Parser
            .parse_fragment("<h1>Title</h1>\n<p>Body</p>")
            .unwrap();
        let elements: Vec<&str> = nodes
            .iter()
            .filter_map(Node::as_element)
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(elements, vec!["h1", "p"]);
    }

    #[test]
    fn serialization_roundtrips_simple_document() {
        let source = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"></head><body><p class=\"x\">Hi &amp; bye</p></body></html>";
        assert_eq!(parse(source).to_html(), source);
    }
}
