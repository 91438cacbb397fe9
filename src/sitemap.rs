//! Sitemap: the published path → source mapping that drives the build.
//!
//! The sitemap is an ordinary global resource (JSON or YAML) whose top-level
//! `paths` mapping lists every published URL path:
//!
//! ```yaml
//! paths:
//!   /: index.html
//!   /about/: about.html
//!   /docs/manual.pdf: downloads/manual.pdf
//!   /old-about.html: "-> /about/"
//! ```
//!
//! Values starting with `->` are redirects; everything else is a source path
//! relative to the site root. Entry order is document order.

use serde_json::Value;
use thiserror::Error;

pub const REDIRECT_PREFIX: &str = "->";

#[derive(Error, Debug, PartialEq)]
pub enum SitemapError {
    #[error("Sitemap resource not found: {0}")]
    NotFound(String),
    #[error("Sitemap {0} is not a JSON or YAML document")]
    NotDecoded(String),
    #[error("Sitemap {0} has no top-level `paths` mapping")]
    MissingPaths(String),
    #[error("Sitemap path {0:?} must start with '/'")]
    RelativePath(String),
    #[error("Sitemap path {0:?} contains a '.' or '..' segment")]
    DotSegment(String),
    #[error("Sitemap entry {0:?} must map to a string")]
    InvalidTarget(String),
    #[error("Sitemap redirect {0:?} has an empty target")]
    EmptyRedirect(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapTarget {
    /// Site-relative source path.
    Source(String),
    /// Redirect location (absolute URL or URL path).
    Redirect(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapEntry {
    /// Published absolute URL path.
    pub path: String,
    pub target: SitemapTarget,
}

impl SitemapEntry {
    pub fn source(&self) -> Option<&str> {
        match &self.target {
            SitemapTarget::Source(s) => Some(s),
            SitemapTarget::Redirect(_) => None,
        }
    }

    pub fn is_html(&self) -> bool {
        self.source()
            .map(|s| s.to_ascii_lowercase().ends_with(".html"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sitemap {
    pub entries: Vec<SitemapEntry>,
}

impl Sitemap {
    /// Decode the `paths` mapping of a sitemap resource's value.
    pub fn from_value(name: &str, value: &Value) -> Result<Self, SitemapError> {
        let paths = value
            .get("paths")
            .and_then(Value::as_object)
            .ok_or_else(|| SitemapError::MissingPaths(name.to_string()))?;

        let entries = paths
            .iter()
            .map(|(path, target)| parse_entry(path, target))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    pub fn sources(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter_map(|e| e.source().map(|s| (e.path.as_str(), s)))
    }

    pub fn redirects(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|e| match &e.target {
            SitemapTarget::Redirect(to) => Some((e.path.as_str(), to.as_str())),
            SitemapTarget::Source(_) => None,
        })
    }
}

fn parse_entry(path: &str, target: &Value) -> Result<SitemapEntry, SitemapError> {
    if !path.starts_with('/') {
        return Err(SitemapError::RelativePath(path.to_string()));
    }
    // Published paths become files under www/ and keys in the bucket.
    if path.split('/').any(|segment| segment == "." || segment == "..") {
        return Err(SitemapError::DotSegment(path.to_string()));
    }
    let target = target
        .as_str()
        .ok_or_else(|| SitemapError::InvalidTarget(path.to_string()))?;
    let target = match target.strip_prefix(REDIRECT_PREFIX) {
        Some(location) => {
            let location = location.trim();
            if location.is_empty() {
                return Err(SitemapError::EmptyRedirect(path.to_string()));
            }
            SitemapTarget::Redirect(location.to_string())
        }
        None => SitemapTarget::Source(target.trim().to_string()),
    };
    Ok(SitemapEntry {
        path: path.to_string(),
        target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_document_order() {
        let yaml = "paths:\n  /z.html: z.html\n  /a.html: a.html\n  /m/: m.html\n";
        let value: Value = serde_yaml_ng::from_str(yaml).unwrap();
        let sitemap = Sitemap::from_value("sitemap.yaml", &value).unwrap();
        let paths: Vec<&str> = sitemap.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/z.html", "/a.html", "/m/"]);
    }

    #[test]
    fn redirect_prefix_marks_redirects() {
        let value = json!({"paths": {"/old.html": "->  /new.html ", "/new.html": "new.html"}});
        let sitemap = Sitemap::from_value("s.json", &value).unwrap();
        assert_eq!(
            sitemap.entries[0].target,
            SitemapTarget::Redirect("/new.html".into())
        );
        assert_eq!(sitemap.redirects().collect::<Vec<_>>(), vec![("/old.html", "/new.html")]);
        assert_eq!(sitemap.sources().collect::<Vec<_>>(), vec![("/new.html", "new.html")]);
    }

    #[test]
    fn html_detection_uses_source_extension() {
        let value = json!({"paths": {"/": "index.HTML", "/f.pdf": "f.pdf", "/r": "-> /"}});
        let sitemap = Sitemap::from_value("s.json", &value).unwrap();
        let html: Vec<bool> = sitemap.entries.iter().map(SitemapEntry::is_html).collect();
        assert_eq!(html, vec![true, false, false]);
    }

    #[test]
    fn missing_paths_is_an_error() {
        let err = Sitemap::from_value("s.json", &json!({"Paths": {}})).unwrap_err();
        assert_eq!(err, SitemapError::MissingPaths("s.json".into()));
    }

    #[test]
    fn relative_published_path_is_an_error() {
        let err = Sitemap::from_value("s.json", &json!({"paths": {"a.html": "a.html"}}))
            .unwrap_err();
        assert_eq!(err, SitemapError::RelativePath("a.html".into()));
    }

    #[test]
    fn dot_segments_in_published_paths_are_errors() {
        for path in ["/../etc/passwd", "/a/./b.html", "/docs/..", "/."] {
            let value = json!({"paths": {path: "a.html"}});
            let err = Sitemap::from_value("s.json", &value).unwrap_err();
            assert_eq!(err, SitemapError::DotSegment(path.into()), "{path}");
        }
        // Dots inside a segment are ordinary names
        let value = json!({"paths": {"/..hidden/a..b.html": "a.html"}});
        assert!(Sitemap::from_value("s.json", &value).is_ok());
    }

    #[test]
    fn non_string_target_is_an_error() {
        let err =
            Sitemap::from_value("s.json", &json!({"paths": {"/a": 3}})).unwrap_err();
        assert_eq!(err, SitemapError::InvalidTarget("/a".into()));
    }

    #[test]
    fn empty_redirect_is_an_error() {
        let err =
            Sitemap::from_value("s.json", &json!({"paths": {"/a": "->"}})).unwrap_err();
        assert_eq!(err, SitemapError::EmptyRedirect("/a".into()));
    }
}
