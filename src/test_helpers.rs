//! Shared test utilities for the sitebuilder test suite.
//!
//! Provides byte-level image fixtures and a small builder for throwaway site
//! directories.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let site = SiteBuilder::new()
//!     .config("languages: [en, fr]\n")
//!     .file("index.html", "<html><head></head><body>.title</body></html>")
//!     .file("fr.lproj/index.strings.yaml", "fr:\n  title: Bonjour\n")
//!     .bytes("logo.png", &minimal_png(10, 20))
//!     .sitemap(&[("/", "index.html"), ("/old.html", "-> /")])
//!     .build();
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// =========================================================================
// Image fixtures
// =========================================================================

/// Signature plus an `IHDR` chunk declaring `width`×`height`. Enough for
/// dimension probing; not a decodable image.
pub fn minimal_png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    // bit depth, colour type, compression, filter, interlace
    bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes
}

/// SOI, a JFIF APP0 segment, a baseline SOF0 declaring `width`×`height`, EOI.
pub fn minimal_jpeg(width: u16, height: u16) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8];
    bytes.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
    bytes.extend_from_slice(b"JFIF\0");
    bytes.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
    bytes.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08]);
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.push(0x03);
    for component in 1..=3u8 {
        bytes.extend_from_slice(&[component, 0x11, 0x00]);
    }
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes
}

// =========================================================================
// Filesystem fixtures
// =========================================================================

/// Write `bytes` to `root/relative`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, bytes: &[u8]) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, bytes).unwrap();
    path
}

/// Builds a site directory in a temp dir. `site.yaml` is always written
/// (empty unless [`SiteBuilder::config`] is called); the sitemap only when
/// [`SiteBuilder::sitemap`] is.
#[derive(Default)]
pub struct SiteBuilder {
    config: String,
    files: Vec<(String, Vec<u8>)>,
}

impl SiteBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, yaml: &str) -> Self {
        self.config = yaml.to_string();
        self
    }

    pub fn file(self, relative: &str, text: &str) -> Self {
        self.bytes(relative, text.as_bytes())
    }

    pub fn bytes(mut self, relative: &str, bytes: &[u8]) -> Self {
        self.files.push((relative.to_string(), bytes.to_vec()));
        self
    }

    /// Write `sitemap.yaml` with the given `(path, target)` entries in order.
    pub fn sitemap(self, entries: &[(&str, &str)]) -> Self {
        let mut yaml = String::from("paths:\n");
        if entries.is_empty() {
            yaml = String::from("paths: {}\n");
        }
        for (path, target) in entries {
            yaml.push_str(&format!("  {:?}: {:?}\n", path, target));
        }
        self.file("sitemap.yaml", &yaml)
    }

    pub fn build(self) -> TempDir {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "site.yaml", self.config.as_bytes());
        for (relative, bytes) in &self.files {
            write_file(tmp.path(), relative, bytes);
        }
        tmp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::dimensions::{jpeg_dimensions, png_dimensions};

    #[test]
    fn fixtures_report_their_dimensions() {
        let png = png_dimensions(&minimal_png(10, 20)).unwrap();
        assert_eq!((png.width, png.height), (Some(10), Some(20)));
        let jpeg = jpeg_dimensions(&minimal_jpeg(640, 480)).unwrap();
        assert_eq!((jpeg.width, jpeg.height), (Some(640), Some(480)));
    }

    #[test]
    fn sitemap_entries_keep_order_and_quote() {
        let site = SiteBuilder::new()
            .sitemap(&[("/z", "z.html"), ("/a", "-> /z")])
            .build();
        let yaml = fs::read_to_string(site.path().join("sitemap.yaml")).unwrap();
        assert_eq!(yaml, "paths:\n  \"/z\": \"z.html\"\n  \"/a\": \"-> /z\"\n");
        assert!(site.path().join("site.yaml").exists());
    }
}
