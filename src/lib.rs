//! # Sitebuilder
//!
//! A static site builder for localized, content-addressed HTML sites. A
//! sitemap maps published URL paths to source files; HTML sources are rendered
//! once per language, everything they reference is published by content hash,
//! and the result is a self-contained build directory plus a sync script.
//!
//! # Architecture: One Build, Five Phases
//!
//! ```text
//! 1. Setup      site.yaml        →  builds/<label>/{www,s3}
//! 2. Discover   site/            →  ResourceStore   (hashes, metadata, languages)
//! 3. Publish    sitemap          →  www/            (pages, files, _resources/)
//! 4. Deploy     artifacts        →  s3/sync.sh
//! 5. Finish     label            →  builds/latest
//! ```
//!
//! Every build starts from scratch. Nothing is cached between builds, so the
//! output depends only on the site directory and the configuration.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `site.yaml` loading, merging over stock defaults, validation |
//! | [`resources`] | Resource discovery, hashing, metadata extraction, localized lookup, stylesheet rewriting |
//! | [`sitemap`] | Decodes the sitemap resource into ordered source and redirect entries |
//! | [`publish`] | Build orchestration, per-document rendering, resource publication |
//! | [`headers`] | Content types and per-artifact response headers |
//! | [`deploy`] | `sync.sh` emission from the published artifacts |
//! | [`dom`] | Mutable document tree and HTML serialization |
//! | [`html`] | `HtmlParser` capability and its html5ever implementation |
//! | [`css`] | `CssTokenizer` capability, tokens and the shared url-rewrite pass |
//! | [`markdown`] | `MarkdownConverter` capability and its pulldown-cmark implementation |
//! | [`output`] | CLI output formatting for builds and checks |
//!
//! # Design Decisions
//!
//! ## Content-Addressed Resources
//!
//! Images, stylesheets and scripts are published as `_resources/<sha256>.<ext>`
//! and served with `Cache-Control: max-age=31536000, immutable`. Identical
//! bytes referenced from many pages or languages are written once. Pages
//! themselves are never cached, so a deploy takes effect on the next request.
//!
//! Stylesheets are rewritten before they are hashed: a `url()` naming another
//! resource is replaced with that resource's hashed name. Changing an image
//! therefore changes the hash of every stylesheet that uses it.
//!
//! ## Localization by Convention
//!
//! A `<lang>.lproj/` directory holds one language's overrides. Any resource
//! looked up for a language falls back to the global one of the same name.
//! In templates, a text node or attribute starting with `.` is a string key,
//! looked up in `<page>.strings.yaml` and then `Localizable.strings.yaml`.
//! A leading `\` escapes the dot. Unknown keys are left in place so missing
//! translations stay visible.
//!
//! ## Two-Pass Publishing
//!
//! The sitemap is read twice. The first pass records where every source will
//! be published; the second renders. A link from one page to another's
//! source file is rewritten to the target's published URL (in the same
//! language) regardless of sitemap order.
//!
//! ## Parsers Behind Traits
//!
//! The publisher only sees [`html::HtmlParser`], [`css::CssTokenizer`] and
//! [`markdown::MarkdownConverter`]. The shipped implementations are
//! deliberately small; tests swap in fakes to exercise the publisher alone.

pub mod config;
pub mod css;
pub mod deploy;
pub mod dom;
pub mod headers;
pub mod html;
pub mod markdown;
pub mod output;
pub mod publish;
pub mod resources;
pub mod sitemap;

#[cfg(test)]
pub(crate) mod test_helpers;
