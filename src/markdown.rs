//! Markdown capability: text + link callback → document nodes.
//!
//! Markdown includes are converted to HTML with pulldown-cmark and the result
//! is parsed back into [`Node`]s so it can be spliced into the including
//! document. Link destinations are offered to the caller's callback first,
//! which is how included prose gets its internal links pointed at published
//! URLs.

use crate::dom::Node;
use crate::html::{Html5Parser, HtmlError, HtmlParser};
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, html as md_html};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarkdownError {
    #[error("converted markdown is not parseable: {0}")]
    Html(#[from] HtmlError),
}

pub trait MarkdownConverter {
    /// Convert `text` into nodes. `resolve_link` receives every link
    /// destination and returns a replacement, or `None` to keep it.
    fn convert(
        &self,
        text: &str,
        resolve_link: &mut dyn FnMut(&str) -> Option<String>,
    ) -> Result<Vec<Node>, MarkdownError>;
}

#[derive(Debug, Clone, Copy)]
pub struct CommonMarkConverter {
    options: Options,
}

impl Default for CommonMarkConverter {
    fn default() -> Self {
        Self {
            options: Options::ENABLE_TABLES
                | Options::ENABLE_STRIKETHROUGH
                | Options::ENABLE_FOOTNOTES,
        }
    }
}

impl MarkdownConverter for CommonMarkConverter {
    fn convert(
        &self,
        text: &str,
        resolve_link: &mut dyn FnMut(&str) -> Option<String>,
    ) -> Result<Vec<Node>, MarkdownError> {
        let parser = Parser::new_ext(text, self.options).map(|event| match event {
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                id,
            }) => {
                let dest_url = match resolve_link(&dest_url) {
                    Some(resolved) => CowStr::from(resolved),
                    None => dest_url,
                };
                Event::Start(Tag::Link {
                    link_type,
                    dest_url,
                    title,
                    id,
                })
            }
            other => other,
        });

        let mut body_html = String::new();
        md_html::push_html(&mut body_html, parser);
        Ok(Html5Parser.parse_fragment(&body_html)?)
    }
}
