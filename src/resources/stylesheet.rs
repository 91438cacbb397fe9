//! Recursive stylesheet rewriting.
//!
//! `url()` references that resolve to a registered resource are replaced by
//! the target's content-addressed file name (`<hash>.<ext>`). Every published
//! resource lives flat in `_resources/`, so that name is also the correct
//! relative URL from the rewritten stylesheet. Referenced stylesheets are
//! rewritten first, so the hash a parent embeds is the hash of the child's
//! final bytes.

use super::{ResourceError, ResourceId, ResourceMetadata, ResourceStore};
use crate::css::{rewrite_urls, serialize};
use log::debug;
use std::path::Path;

impl ResourceStore {
    /// Rewrite the on-disk stylesheet at `path` for `lang`.
    ///
    /// Returns the original entry when nothing was rewritten, otherwise a new
    /// in-memory entry whose `references` lists the logical names replaced.
    /// Results are memoized per (path, language).
    pub fn rewrite_css(&mut self, path: &Path, lang: &str) -> Result<ResourceId, ResourceError> {
        let key = (path.to_path_buf(), lang.to_string());
        if let Some(&id) = self.rewritten.get(&key) {
            return Ok(id);
        }
        if !self.rewriting.insert(key.clone()) {
            return Err(ResourceError::StylesheetCycle {
                path: path.to_path_buf(),
                lang: lang.to_string(),
            });
        }
        let result = self.rewrite_css_uncached(path, lang);
        self.rewriting.remove(&key);
        let id = result?;
        self.rewritten.insert(key, id);
        Ok(id)
    }

    fn rewrite_css_uncached(&mut self, path: &Path, lang: &str) -> Result<ResourceId, ResourceError> {
        let source = self
            .entries
            .iter()
            .position(|m| m.source_path() == Some(path))
            .map(ResourceId)
            .ok_or_else(|| ResourceError::UnknownStylesheet(path.to_path_buf()))?;

        let bytes = std::fs::read(path)?;
        let css = String::from_utf8_lossy(&bytes);
        let mut tokens = self.tokenize(&css);
        let references = rewrite_urls(&mut tokens, |url| self.stylesheet_reference(url, lang))?;
        if references.is_empty() {
            return Ok(source);
        }

        let name = self.get(source).name.clone();
        debug!(
            "rewrote {} ({}): {} reference(s)",
            path.display(),
            lang,
            references.len()
        );
        let metadata =
            ResourceMetadata::generated(&name, serialize(&tokens).into_bytes(), references);
        // Generated entries are reachable only through the memo, never by name.
        let id = ResourceId(self.entries.len());
        self.entries.push(metadata);
        Ok(id)
    }

    /// Replacement for one `url()` value, rewriting nested stylesheets first.
    fn stylesheet_reference(
        &mut self,
        url: &str,
        lang: &str,
    ) -> Result<Option<String>, ResourceError> {
        let Some(id) = self.lookup(lang, url, None) else {
            return Ok(None);
        };
        let id = self.resolve_stylesheet(id, lang)?;
        Ok(Some(self.get(id).published_name()))
    }

    /// Map an on-disk stylesheet entry to its rewritten form; other entries
    /// pass through.
    pub fn resolve_stylesheet(
        &mut self,
        id: ResourceId,
        lang: &str,
    ) -> Result<ResourceId, ResourceError> {
        let metadata = self.get(id);
        match metadata.source_path() {
            Some(path) if metadata.is_stylesheet() => {
                let path = path.to_path_buf();
                self.rewrite_css(&path, lang)
            }
            _ => Ok(id),
        }
    }
}
