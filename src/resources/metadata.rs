//! Per-resource metadata, built once when a file is registered.

use super::ResourceError;
use super::dimensions::{self, ImageInfo};
use super::strings::{self, StringsTable};
use crate::headers::content_type_for_extension;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::io;
use std::path::{Path, PathBuf};

/// Sentinel language for resources outside any `.lproj` bundle.
pub const GLOBAL: &str = "global";

/// Handle into the store's entry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) usize);

/// Where a resource's bytes come from. Rewritten stylesheets are the only
/// in-memory resources.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceOrigin {
    Source(PathBuf),
    Generated(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceMetadata {
    /// Logical name, e.g. `logo.png` or `AppIcon.imageset/icon-32.png`.
    pub name: String,
    /// Lower-case extension without the dot; empty when the name has none.
    pub extension: String,
    /// SHA-256 of the final bytes, lower-case hex.
    pub hash: String,
    pub origin: ResourceOrigin,
    pub image: Option<ImageInfo>,
    /// Decoded `.json` / `.yaml` content.
    pub value: Option<Value>,
    pub strings: Option<StringsTable>,
    /// Logical names referenced by a rewritten stylesheet.
    pub references: Option<Vec<String>>,
}

impl ResourceMetadata {
    /// Build metadata for an on-disk file registered under `lang`.
    pub fn from_source(
        name: &str,
        path: &Path,
        lang: &str,
        bytes: &[u8],
    ) -> Result<Self, ResourceError> {
        let extension = extension_of(name);
        let mut metadata = Self {
            name: name.to_string(),
            extension,
            hash: hash_bytes(bytes),
            origin: ResourceOrigin::Source(path.to_path_buf()),
            image: None,
            value: None,
            strings: None,
            references: None,
        };

        if lang != GLOBAL && strings::is_strings_table(name) {
            metadata.strings = Some(strings::load_strings(name, lang, bytes)?);
            return Ok(metadata);
        }

        match metadata.extension.as_str() {
            "json" => {
                let value =
                    serde_json::from_slice(bytes).map_err(|source| ResourceError::Json {
                        name: name.to_string(),
                        source,
                    })?;
                metadata.value = Some(value);
            }
            "yaml" | "yml" => {
                let value =
                    serde_yaml_ng::from_slice(bytes).map_err(|source| ResourceError::Yaml {
                        name: name.to_string(),
                        source,
                    })?;
                metadata.value = Some(value);
            }
            ext => metadata.image = dimensions::read_dimensions(ext, bytes),
        }
        Ok(metadata)
    }

    /// Metadata for a rewritten stylesheet held in memory.
    pub fn generated(name: &str, bytes: Vec<u8>, references: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            extension: extension_of(name),
            hash: hash_bytes(&bytes),
            origin: ResourceOrigin::Generated(bytes),
            image: None,
            value: None,
            strings: None,
            references: Some(references),
        }
    }

    pub fn source_path(&self) -> Option<&Path> {
        match &self.origin {
            ResourceOrigin::Source(path) => Some(path),
            ResourceOrigin::Generated(_) => None,
        }
    }

    pub fn is_stylesheet(&self) -> bool {
        self.extension == "css"
    }

    pub fn content_type(&self) -> &'static str {
        content_type_for_extension(&self.extension)
    }

    /// Content-addressed file name: `<hash>.<ext>`.
    pub fn published_name(&self) -> String {
        if self.extension.is_empty() {
            self.hash.clone()
        } else {
            format!("{}.{}", self.hash, self.extension)
        }
    }

    pub fn bytes(&self) -> io::Result<Cow<'_, [u8]>> {
        match &self.origin {
            ResourceOrigin::Source(path) => std::fs::read(path).map(Cow::Owned),
            ResourceOrigin::Generated(bytes) => Ok(Cow::Borrowed(bytes)),
        }
    }
}

/// SHA-256 of `bytes` as lower-case hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Lower-case final extension of a logical name, without the dot.
pub fn extension_of(name: &str) -> String {
    let file = name.rsplit('/').next().unwrap_or(name);
    Path::new(file)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}
