//! Per-document, per-language rendering.
//!
//! The tree is walked depth-first. For every element a pre-visit handler may
//! replace it outright (includes), then its attributes are localized, its
//! children are visited, and finally a post-visit handler rewrites references
//! now that the subtree is settled. Handlers are looked up by lower-case tag
//! name in two independent tables.

use super::context::relative_url;
use super::{BuildContext, BuildEvent, PublishError};
use crate::config::SiteConfig;
use crate::css::{rewrite_urls, serialize};
use crate::dom::{Element, Node, is_raw_text_element};
use crate::headers::ResponseHeaders;
use crate::html::HtmlParser;
use crate::markdown::MarkdownConverter;
use crate::resources::{IMAGESET_EXTENSION, ResourceStore, SHARED_TABLE, STRINGS_SUFFIX};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// `rel` value of a `<link>` that is replaced by the document it points at.
pub const INCLUDE_REL: &str = "x-sitebuilder-include";
/// How many include links may be nested inside one another. A document that
/// includes itself, directly or through others, stops here with
/// [`PublishError::IncludeDepth`].
pub const MAX_INCLUDE_DEPTH: usize = 32;

const IMAGESET_CONTENTS: &str = "Contents.json";

type PreVisit<'a> = fn(&mut Renderer<'a>, &Element) -> Result<Option<Vec<Node>>, PublishError>;
type PostVisit<'a> = fn(&mut Renderer<'a>, &mut Element) -> Result<(), PublishError>;

fn pre_visit_handler<'a>(tag: &str) -> Option<PreVisit<'a>> {
    match tag {
        "link" => Some(Renderer::expand_include),
        _ => None,
    }
}

fn post_visit_handler<'a>(tag: &str) -> Option<PostVisit<'a>> {
    match tag {
        "base" => Some(Renderer::visit_base),
        "head" => Some(Renderer::visit_head),
        "img" | "script" => Some(Renderer::visit_src),
        "link" => Some(Renderer::visit_link),
        "a" => Some(Renderer::visit_anchor),
        "style" => Some(Renderer::visit_style),
        _ => None,
    }
}

pub struct Renderer<'a> {
    html: &'a dyn HtmlParser,
    markdown: &'a dyn MarkdownConverter,
    store: &'a mut ResourceStore,
    ctx: &'a mut BuildContext,
    config: &'a SiteConfig,
    lang: &'a str,
    url_path: String,
    file: PathBuf,
    /// Strings table named after the top-level document.
    strings_table: String,
    /// Source currently being traversed; changes while inside an include.
    document: Url,
    base_url: Url,
    include_depth: usize,
}

impl<'a> Renderer<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        html: &'a dyn HtmlParser,
        markdown: &'a dyn MarkdownConverter,
        store: &'a mut ResourceStore,
        ctx: &'a mut BuildContext,
        config: &'a SiteConfig,
        lang: &'a str,
        source: &Path,
        url_path: &str,
    ) -> Result<Self, PublishError> {
        let document = Url::from_file_path(source)
            .map_err(|_| PublishError::SiteRoot(source.to_path_buf()))?;
        let file = ctx.file_for(url_path);
        let base_url = ctx.www_url(&file.to_string_lossy())?;
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            html,
            markdown,
            store,
            ctx,
            config,
            lang,
            url_path: url_path.to_string(),
            file,
            strings_table: format!("{}{}", stem, STRINGS_SUFFIX),
            document,
            base_url,
            include_depth: 0,
        })
    }

    /// Parse, rewrite and write the page, recording its headers.
    pub fn render(&mut self, text: &str) -> Result<(), PublishError> {
        let mut document = self.html.parse_document(text)?;
        document.ensure_doctype();
        self.visit_children(&mut document.children)?;

        let dest = self.ctx.www_dir.join(&self.file);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, document.to_html())?;
        debug!("rendered {} ({})", self.url_path, self.lang);

        let url_path = self.url_path.clone();
        self.ctx
            .record(&url_path, self.file.clone(), ResponseHeaders::page());
        self.ctx.emit(BuildEvent::PageRendered {
            url_path,
            language: self.lang.to_string(),
        });
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Traversal
    // -------------------------------------------------------------------------

    fn visit_children(&mut self, nodes: &mut Vec<Node>) -> Result<(), PublishError> {
        let mut i = 0;
        while i < nodes.len() {
            let replacement = match &nodes[i] {
                Node::Element(element) => match pre_visit_handler(&element.tag()) {
                    Some(handler) => handler(self, element)?,
                    None => None,
                },
                _ => None,
            };
            if let Some(replacement) = replacement {
                // Already traversed (or deliberately not) by the handler.
                let count = replacement.len();
                nodes.splice(i..=i, replacement);
                i += count;
                continue;
            }

            match &mut nodes[i] {
                Node::Element(element) => self.visit_element(element)?,
                Node::Text(text) => self.localize(text),
                _ => {}
            }
            i += 1;
        }
        Ok(())
    }

    fn visit_element(&mut self, element: &mut Element) -> Result<(), PublishError> {
        for (name, value) in element.attributes.iter_mut() {
            if name.eq_ignore_ascii_case("style") {
                *value = self.rewrite_inline_css(value)?;
            } else {
                self.localize(value);
            }
        }
        if !is_raw_text_element(&element.name) {
            self.visit_children(&mut element.children)?;
        }
        if let Some(handler) = post_visit_handler(&element.tag()) {
            handler(self, element)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Localization
    // -------------------------------------------------------------------------

    /// `\text` → `text`; `.key` → the key's string for the current language,
    /// or unchanged when no table has it.
    fn localize(&self, text: &mut String) {
        if let Some(rest) = text.strip_prefix('\\') {
            *text = rest.to_string();
        } else if let Some(key) = text.strip_prefix('.')
            && let Some(value) = self.localized_string(key)
        {
            *text = value;
        }
    }

    fn localized_string(&self, key: &str) -> Option<String> {
        [self.strings_table.as_str(), SHARED_TABLE]
            .iter()
            .find_map(|table| self.store.strings(self.lang, table)?.get(key).cloned())
    }

    // -------------------------------------------------------------------------
    // Includes
    // -------------------------------------------------------------------------

    fn expand_include(&mut self, element: &Element) -> Result<Option<Vec<Node>>, PublishError> {
        let is_include = element
            .attr("rel")
            .is_some_and(|rel| rel.eq_ignore_ascii_case(INCLUDE_REL));
        if !is_include {
            return Ok(None);
        }
        let href = element.attr("href").unwrap_or_default().to_string();
        let document = self.document.to_file_path().unwrap_or_default();
        let not_found = || PublishError::IncludeNotFound {
            href: href.clone(),
            document: document.clone(),
        };

        let mut target = self.document.join(&href)?;
        let fragment = target.fragment().map(str::to_string);
        target.set_fragment(None);
        let path = target.to_file_path().map_err(|_| not_found())?;
        let text = match fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        if self.include_depth >= MAX_INCLUDE_DEPTH {
            return Err(PublishError::IncludeDepth { href: href.clone() });
        }
        debug!("including {} into {}", href, self.url_path);

        let markdown = match element.attr("type") {
            Some(kind) => kind.eq_ignore_ascii_case("text/markdown"),
            None => matches!(
                crate::resources::extension_str(&path).as_deref(),
                Some("md") | Some("markdown")
            ),
        };

        let outer = std::mem::replace(&mut self.document, target);
        self.include_depth += 1;
        let result = if markdown {
            self.include_markdown(&text)
        } else {
            self.include_html(&text, fragment.as_deref())
        };
        self.include_depth -= 1;
        self.document = outer;

        match result? {
            Some(nodes) => Ok(Some(nodes)),
            None => Err(not_found()),
        }
    }

    fn include_html(
        &mut self,
        text: &str,
        id: Option<&str>,
    ) -> Result<Option<Vec<Node>>, PublishError> {
        let included = self.html.parse_document(text)?;
        let element = match id {
            Some(id) => included
                .children
                .iter()
                .filter_map(Node::as_element)
                .find_map(|e| e.find_by_id(id)),
            None => included.root_element(),
        };
        let Some(element) = element else {
            return Ok(None);
        };
        let mut nodes = vec![Node::Element(element.clone())];
        self.visit_children(&mut nodes)?;
        Ok(Some(nodes))
    }

    /// Converted Markdown is spliced in as-is; only its links are rewritten.
    fn include_markdown(&self, text: &str) -> Result<Option<Vec<Node>>, PublishError> {
        let nodes = self
            .markdown
            .convert(text, &mut |href: &str| self.forward_link(href))?;
        Ok(Some(nodes))
    }

    // -------------------------------------------------------------------------
    // Post-visit handlers
    // -------------------------------------------------------------------------

    fn visit_base(&mut self, base: &mut Element) -> Result<(), PublishError> {
        if let Some(href) = base.attr("href") {
            self.base_url = self.base_url.join(href)?;
        }
        Ok(())
    }

    fn visit_head(&mut self, head: &mut Element) -> Result<(), PublishError> {
        let indentation = match head.children.first() {
            Some(Node::Text(text)) => text.clone(),
            _ => String::new(),
        };
        let children: Vec<&Element> = head.children.iter().filter_map(Node::as_element).collect();
        let has_charset = children
            .iter()
            .any(|e| e.tag() == "meta" && e.attr("charset").is_some());
        let has_icon = children
            .iter()
            .any(|e| e.tag() == "link" && rel_contains(e, "icon"));

        if !has_charset {
            head.children.insert(
                0,
                Node::Element(Element::new("meta").with_attr("charset", "utf-8")),
            );
            head.children.insert(0, Node::text(indentation.clone()));
        }

        if !has_icon {
            for name in self.site_icons() {
                let Some(href) = self.resource_href(&name)? else {
                    continue;
                };
                let Some(id) = self.store.lookup(self.lang, &name, None) else {
                    continue;
                };
                let metadata = self.store.get(id);
                let mut link = Element::new("link")
                    .with_attr("rel", "icon")
                    .with_attr("type", metadata.content_type());
                if let Some(sizes) = metadata.image.as_ref().and_then(|i| i.sizes()) {
                    link.set_attr("sizes", sizes);
                }
                link.set_attr("href", href);

                let at = head.children.len().saturating_sub(1);
                head.children.insert(at, Node::Element(link));
                head.children.insert(at, Node::text(indentation.clone()));
            }
        }
        Ok(())
    }

    fn visit_src(&mut self, element: &mut Element) -> Result<(), PublishError> {
        if let Some(src) = element.attr("src").map(str::to_string)
            && let Some(href) = self.resource_href(&src)?
        {
            element.set_attr("src", href);
        }
        Ok(())
    }

    fn visit_link(&mut self, link: &mut Element) -> Result<(), PublishError> {
        let Some(href) = link.attr("href").map(str::to_string) else {
            return Ok(());
        };
        let rewritten = if rel_contains(link, "stylesheet") || rel_contains(link, "icon") {
            self.resource_href(&href)?
        } else {
            self.forward_link(&href)
        };
        if let Some(rewritten) = rewritten {
            link.set_attr("href", rewritten);
        }
        Ok(())
    }

    fn visit_anchor(&mut self, anchor: &mut Element) -> Result<(), PublishError> {
        if let Some(href) = anchor.attr("href").map(str::to_string)
            && let Some(rewritten) = self.forward_link(&href)
        {
            anchor.set_attr("href", rewritten);
        }
        Ok(())
    }

    fn visit_style(&mut self, style: &mut Element) -> Result<(), PublishError> {
        let mut css = String::new();
        for child in &style.children {
            match child {
                Node::Text(text) => css.push_str(text),
                _ => {
                    return Err(PublishError::StyleChildren {
                        document: self.document.to_file_path().unwrap_or_default(),
                    });
                }
            }
        }
        let rewritten = self.rewrite_inline_css(&css)?;
        if rewritten != css {
            style.children = vec![Node::Text(rewritten)];
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // References
    // -------------------------------------------------------------------------

    /// Publish resource `name` and return its URL relative to the page.
    fn resource_href(&mut self, name: &str) -> Result<Option<String>, PublishError> {
        let Some(url_path) = self.ctx.publish_resource(self.store, name, self.lang)? else {
            return Ok(None);
        };
        let target = self.ctx.www_url(&url_path)?;
        Ok(Some(relative_url(&self.base_url, &target)))
    }

    /// Rewrite resource references in a `style` attribute or `<style>` body.
    /// Returns the input unchanged when nothing resolved.
    fn rewrite_inline_css(&mut self, css: &str) -> Result<String, PublishError> {
        let mut tokens = self.store.tokenize(css);
        let replaced = rewrite_urls(&mut tokens, |url| self.resource_href(url))?;
        if replaced.is_empty() {
            Ok(css.to_string())
        } else {
            Ok(serialize(&tokens))
        }
    }

    /// Map a hyperlink to another sitemap source onto its published URL,
    /// relative to the page. Document targets stay in the current language.
    fn forward_link(&self, href: &str) -> Option<String> {
        // Same-page fragments must not turn into links to the page file.
        if href.starts_with('#') {
            return None;
        }
        let target = self.document.join(href).ok()?;
        if target.scheme() != "file" {
            return None;
        }
        let forward = self.ctx.forward.get(target.path())?;
        let path = if forward.document {
            self.ctx.localized_path(&forward.path, self.lang)
        } else {
            forward.path.clone()
        };
        let mut published = self.ctx.www_url(&path).ok()?;
        published.set_query(target.query());
        published.set_fragment(target.fragment());
        Some(relative_url(&self.base_url, &published))
    }

    /// Logical names of the images listed in the configured icon set.
    fn site_icons(&self) -> Vec<String> {
        let Some(icon) = &self.config.icon else {
            return Vec::new();
        };
        let set = format!("{}.{}", icon, IMAGESET_EXTENSION);
        let contents = self
            .store
            .lookup(self.lang, IMAGESET_CONTENTS, Some(&set))
            .and_then(|id| self.store.get(id).value.as_ref());
        let Some(contents) = contents else {
            warn!("icon set {} has no decodable {}", set, IMAGESET_CONTENTS);
            return Vec::new();
        };
        contents
            .get("images")
            .and_then(|images| images.as_array())
            .map(|images| {
                images
                    .iter()
                    .filter_map(|image| image.get("filename")?.as_str())
                    .map(|filename| format!("{}/{}", set, filename))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn rel_contains(element: &Element, value: &str) -> bool {
    element
        .attr("rel")
        .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case(value)))
}
