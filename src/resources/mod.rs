//! Resource store: discovery registration, hashing and localized lookup.
//!
//! Every non-HTML file the build can reference is registered here once, up
//! front, under a language bucket:
//!
//! ```text
//! site/
//! ├── logo.png                   → global  "logo.png"
//! ├── AppIcon.imageset/          → global  "AppIcon.imageset/Contents.json", …
//! ├── en.lproj/
//! │   ├── Localizable.strings.yaml → en    "Localizable.strings.yaml" (strings table)
//! │   └── img/logo.png             → en    "logo.png"
//! └── fr.lproj/…
//! ```
//!
//! Logical names are bare file names (plus the image-set directory for
//! image-set members), so `lookup("en", "logo.png")` finds the English
//! override and `lookup("de", "logo.png")` falls back to the global file.
//! When two files in one bucket share a name, the first registered wins.
//!
//! Metadata is extracted at registration (see [`metadata`]) and never changes
//! afterwards. The only lazily created entries are rewritten stylesheets,
//! produced by [`ResourceStore::rewrite_css`].

pub mod dimensions;
pub mod metadata;
pub mod strings;
mod stylesheet;

pub use dimensions::ImageInfo;
pub use metadata::{GLOBAL, ResourceId, ResourceMetadata, ResourceOrigin};
pub use strings::{SHARED_TABLE, STRINGS_SUFFIX, StringsTable};

use crate::css::{CssToken, CssTokenizer, StandardTokenizer};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

pub const LPROJ_EXTENSION: &str = "lproj";
pub const IMAGESET_EXTENSION: &str = "imageset";

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("{name}: invalid JSON: {source}")]
    Json {
        name: String,
        source: serde_json::Error,
    },
    #[error("{name}: invalid YAML: {source}")]
    Yaml {
        name: String,
        source: serde_yaml_ng::Error,
    },
    #[error("{name} must have a top level key for '{lang}'")]
    MissingLanguageKey { name: String, lang: String },
    #[error("Stylesheet cycle: {path} ({lang}) references itself")]
    StylesheetCycle { path: PathBuf, lang: String },
    #[error("Not a registered stylesheet: {0}")]
    UnknownStylesheet(PathBuf),
}

pub struct ResourceStore {
    entries: Vec<ResourceMetadata>,
    /// language → logical name → entries in registration order
    index: HashMap<String, HashMap<String, Vec<ResourceId>>>,
    /// (stylesheet source, language) → rewrite result
    rewritten: HashMap<(PathBuf, String), ResourceId>,
    rewriting: HashSet<(PathBuf, String)>,
    tokenizer: Arc<dyn CssTokenizer>,
}

impl Default for ResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::with_tokenizer(Arc::new(StandardTokenizer))
    }

    pub fn with_tokenizer(tokenizer: Arc<dyn CssTokenizer>) -> Self {
        let mut index = HashMap::new();
        index.insert(GLOBAL.to_string(), HashMap::new());
        Self {
            entries: Vec::new(),
            index,
            rewritten: HashMap::new(),
            rewriting: HashSet::new(),
            tokenizer,
        }
    }

    /// Register a discovered path: a `.lproj` bundle, an `.imageset` bundle,
    /// or a single file.
    pub fn add_resource(&mut self, path: &Path) -> Result<(), ResourceError> {
        if path.is_dir() {
            match extension_str(path).as_deref() {
                Some(LPROJ_EXTENSION) => return self.add_localization(path),
                Some(IMAGESET_EXTENSION) => return self.add_imageset(path, GLOBAL),
                _ => {}
            }
        }
        self.add_file(path, GLOBAL, None).map(|_| ())
    }

    fn add_localization(&mut self, bundle: &Path) -> Result<(), ResourceError> {
        let lang = bundle
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.index.entry(lang.clone()).or_default();
        debug!("localization bundle {} ({})", bundle.display(), lang);

        let mut walker = WalkDir::new(bundle)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e));
        while let Some(entry) = walker.next() {
            let entry = entry?;
            if entry.file_type().is_dir() {
                if extension_str(entry.path()).as_deref() == Some(IMAGESET_EXTENSION) {
                    self.add_imageset(entry.path(), &lang)?;
                    walker.skip_current_dir();
                }
                continue;
            }
            self.add_file(entry.path(), &lang, None)?;
        }
        Ok(())
    }

    fn add_imageset(&mut self, set: &Path, lang: &str) -> Result<(), ResourceError> {
        let subdirectory = file_name(set);
        let mut files: Vec<PathBuf> = std::fs::read_dir(set)?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| !t.is_dir()).unwrap_or(false))
            .map(|e| e.path())
            .filter(|p| !file_name(p).starts_with('.'))
            .collect();
        files.sort();
        for file in files {
            self.add_file(&file, lang, Some(&subdirectory))?;
        }
        Ok(())
    }

    fn add_file(
        &mut self,
        path: &Path,
        lang: &str,
        subdirectory: Option<&str>,
    ) -> Result<ResourceId, ResourceError> {
        let name = match subdirectory {
            Some(dir) => format!("{}/{}", dir, file_name(path)),
            None => file_name(path),
        };
        let bytes = std::fs::read(path)?;
        let metadata = ResourceMetadata::from_source(&name, path, lang, &bytes)?;
        Ok(self.register(lang, metadata))
    }

    fn register(&mut self, lang: &str, metadata: ResourceMetadata) -> ResourceId {
        let id = ResourceId(self.entries.len());
        self.index
            .entry(lang.to_string())
            .or_default()
            .entry(metadata.name.clone())
            .or_default()
            .push(id);
        self.entries.push(metadata);
        id
    }

    /// Find `name` (optionally inside `subdirectory`) for `lang`, falling
    /// back to the global bucket.
    pub fn lookup(&self, lang: &str, name: &str, subdirectory: Option<&str>) -> Option<ResourceId> {
        let key = match subdirectory {
            Some(dir) => format!("{}/{}", dir, name),
            None => name.to_string(),
        };
        let hit = self
            .index
            .get(lang)
            .and_then(|bucket| bucket.get(&key))
            .and_then(|ids| ids.first().copied());
        match hit {
            Some(id) => Some(id),
            None if lang != GLOBAL => self.lookup(GLOBAL, name, subdirectory),
            None => None,
        }
    }

    pub fn get(&self, id: ResourceId) -> &ResourceMetadata {
        &self.entries[id.0]
    }

    pub fn find(&self, lang: &str, name: &str) -> Option<&ResourceMetadata> {
        self.lookup(lang, name, None).map(|id| self.get(id))
    }

    /// The flattened strings table `table` for `lang`, if one was registered.
    pub fn strings(&self, lang: &str, table: &str) -> Option<&StringsTable> {
        self.find(lang, table).and_then(|m| m.strings.as_ref())
    }

    /// Languages with a bucket, `global` included.
    pub fn languages(&self) -> Vec<&str> {
        let mut langs: Vec<&str> = self.index.keys().map(String::as_str).collect();
        langs.sort();
        langs
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tokenize(&self, css: &str) -> Vec<CssToken> {
        self.tokenizer.tokenize(css)
    }
}

pub(crate) fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub(crate) fn extension_str(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{minimal_png, write_file};
    use tempfile::TempDir;

    fn store_for(root: &Path, entries: &[&str]) -> ResourceStore {
        let mut store = ResourceStore::new();
        for entry in entries {
            store.add_resource(&root.join(entry)).unwrap();
        }
        store
    }

    // =========================================================================
    // Registration
    // =========================================================================

    #[test]
    fn plain_file_is_global() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "logo.png", &minimal_png(4, 4));
        let store = store_for(tmp.path(), &["logo.png"]);
        let id = store.lookup(GLOBAL, "logo.png", None).unwrap();
        assert_eq!(store.get(id).name, "logo.png");
        assert_eq!(store.get(id).image.unwrap().width, Some(4));
    }

    #[test]
    fn lproj_registers_nested_leaves_under_language() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "fr.lproj/img/logo.png", &minimal_png(2, 2));
        write_file(tmp.path(), "fr.lproj/Localizable.strings.yaml", b"fr:\n  hi: Salut\n");
        write_file(tmp.path(), "fr.lproj/.hidden.png", b"x");
        let store = store_for(tmp.path(), &["fr.lproj"]);

        assert!(store.lookup("fr", "logo.png", None).is_some());
        assert!(store.lookup(GLOBAL, "logo.png", None).is_none());
        assert!(store.lookup("fr", ".hidden.png", None).is_none());
        assert_eq!(
            store.strings("fr", SHARED_TABLE).unwrap()["hi"],
            "Salut"
        );
    }

    #[test]
    fn imageset_members_are_prefixed_with_set_name() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "AppIcon.imageset/Contents.json", br#"{"images": []}"#);
        write_file(tmp.path(), "AppIcon.imageset/icon-16.png", &minimal_png(16, 16));
        let store = store_for(tmp.path(), &["AppIcon.imageset"]);

        assert!(
            store
                .lookup(GLOBAL, "icon-16.png", Some("AppIcon.imageset"))
                .is_some()
        );
        assert!(store.lookup(GLOBAL, "AppIcon.imageset/Contents.json", None).is_some());
        assert!(store.lookup(GLOBAL, "icon-16.png", None).is_none());
    }

    #[test]
    fn imageset_inside_lproj_uses_bundle_language() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "de.lproj/AppIcon.imageset/icon.png", &minimal_png(8, 8));
        let store = store_for(tmp.path(), &["de.lproj"]);
        assert!(store.lookup("de", "icon.png", Some("AppIcon.imageset")).is_some());
        assert!(store.lookup("de", "icon.png", None).is_none());
    }

    #[test]
    fn strings_table_without_language_key_fails_registration() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "en.lproj/index.strings.yaml", b"fr:\n  a: b\n");
        let err = ResourceStore::new()
            .add_resource(&tmp.path().join("en.lproj"))
            .unwrap_err();
        assert!(matches!(err, ResourceError::MissingLanguageKey { .. }));
    }

    // =========================================================================
    // Lookup & fallback
    // =========================================================================

    #[test]
    fn lookup_prefers_language_then_global() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "banner.txt", b"global");
        write_file(tmp.path(), "en.lproj/banner.txt", b"english");
        write_file(tmp.path(), "fr.lproj/other.txt", b"french");
        let store = store_for(tmp.path(), &["banner.txt", "en.lproj", "fr.lproj"]);

        let read = |lang: &str| {
            store
                .lookup(lang, "banner.txt", None)
                .map(|id| store.get(id).bytes().unwrap().into_owned())
        };
        assert_eq!(read("en").as_deref(), Some(&b"english"[..]));
        assert_eq!(read("fr").as_deref(), Some(&b"global"[..]));
        assert_eq!(read(GLOBAL).as_deref(), Some(&b"global"[..]));
        assert_eq!(store.lookup("en", "missing.txt", None), None);
        assert_eq!(store.lookup(GLOBAL, "other.txt", None), None);
    }

    #[test]
    fn first_registration_wins_within_a_bucket() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "en.lproj/a/logo.txt", b"first");
        write_file(tmp.path(), "en.lproj/b/logo.txt", b"second");
        let store = store_for(tmp.path(), &["en.lproj"]);
        let id = store.lookup("en", "logo.txt", None).unwrap();
        assert_eq!(store.get(id).bytes().unwrap().as_ref(), b"first");
    }

    #[test]
    fn identical_bytes_hash_identically_across_registrations() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "a.png", &minimal_png(3, 3));
        write_file(tmp.path(), "b.png", &minimal_png(3, 3));
        let forward = store_for(tmp.path(), &["a.png", "b.png"]);
        let reverse = store_for(tmp.path(), &["b.png", "a.png"]);
        let hash = |s: &ResourceStore, n: &str| s.find(GLOBAL, n).unwrap().hash.clone();
        assert_eq!(hash(&forward, "a.png"), hash(&forward, "b.png"));
        assert_eq!(hash(&forward, "a.png"), hash(&reverse, "a.png"));
    }

    #[test]
    fn languages_lists_all_buckets() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "en.lproj/x.txt", b"x");
        let store = store_for(tmp.path(), &["en.lproj"]);
        assert_eq!(store.languages(), vec!["en", "global"]);
        assert_eq!(store.len(), 1);
    }
}
