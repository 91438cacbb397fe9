//! Per-build state and resource publication.
//!
//! A [`BuildContext`] is created when the publish phase starts and dropped
//! when the build ends. The tables both sitemap passes share live here and
//! are passed down by `&mut`.

use super::{BuildEvent, PublishError};
use crate::headers::{HeaderTable, ResponseHeaders};
use crate::resources::{ResourceOrigin, ResourceStore};
use log::debug;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use url::Url;

/// Directory under `www/` holding content-addressed resources.
pub const RESOURCES_DIR: &str = "_resources";

/// Origin used to do URL arithmetic on published paths.
const WWW_ROOT: &str = "https://www.invalid/";

/// Where a sitemap source ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardUrl {
    /// Published path for the default language, e.g. `/about/`.
    pub path: String,
    /// Rendered per language (as opposed to copied once).
    pub document: bool,
}

/// A file written under `www/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedArtifact {
    /// URL path key into the header table.
    pub url_path: String,
    /// Location relative to `www/`.
    pub file: PathBuf,
}

pub struct BuildContext {
    pub www_dir: PathBuf,
    pub index_name: String,
    pub default_language: String,
    /// `file:` URL of the site root; sources resolve against it.
    pub source_root: Url,
    pub www_root: Url,
    /// Source URL path → forward URL. Filled completely before any link is rewritten.
    pub forward: HashMap<String, ForwardUrl>,
    /// Published file name (`<hash>.<ext>`) → published URL path.
    pub published: HashMap<String, String>,
    pub headers: HeaderTable,
    /// Published path → redirect location, in sitemap order.
    pub redirects: Vec<(String, String)>,
    pub artifacts: Vec<PublishedArtifact>,
    events: Option<Sender<BuildEvent>>,
}

impl BuildContext {
    pub fn new(
        site_root: &Path,
        www_dir: &Path,
        index_name: &str,
        default_language: &str,
        events: Option<Sender<BuildEvent>>,
    ) -> Result<Self, PublishError> {
        let source_root = Url::from_directory_path(site_root)
            .map_err(|_| PublishError::SiteRoot(site_root.to_path_buf()))?;
        Ok(Self {
            www_dir: www_dir.to_path_buf(),
            index_name: index_name.to_string(),
            default_language: default_language.to_string(),
            source_root,
            www_root: Url::parse(WWW_ROOT)?,
            forward: HashMap::new(),
            published: HashMap::new(),
            headers: HeaderTable::new(),
            redirects: Vec::new(),
            artifacts: Vec::new(),
            events,
        })
    }

    pub fn emit(&self, event: BuildEvent) {
        if let Some(tx) = &self.events {
            // The printer may have gone away; progress is best-effort.
            let _ = tx.send(event);
        }
    }

    /// Key for the forward table: the source's URL path under the site root.
    pub fn source_key(&self, source: &str) -> Result<String, PublishError> {
        Ok(self.source_root.join(source)?.path().to_string())
    }

    /// URL path a document is published at for `lang`. Non-default languages
    /// live under `/<lang>/`.
    pub fn localized_path(&self, path: &str, lang: &str) -> String {
        if lang == self.default_language {
            path.to_string()
        } else {
            format!("/{}/{}", lang, path.trim_start_matches('/'))
        }
    }

    pub fn www_url(&self, url_path: &str) -> Result<Url, PublishError> {
        Ok(self.www_root.join(url_path.trim_start_matches('/'))?)
    }

    /// File under `www/` for a URL path; directory paths get the index file.
    pub fn file_for(&self, url_path: &str) -> PathBuf {
        let relative = url_path.trim_start_matches('/');
        if relative.is_empty() || relative.ends_with('/') {
            PathBuf::from(relative).join(&self.index_name)
        } else {
            PathBuf::from(relative)
        }
    }

    pub fn record(&mut self, url_path: &str, file: PathBuf, headers: ResponseHeaders) {
        self.headers.insert(url_path.to_string(), headers);
        self.artifacts.push(PublishedArtifact {
            url_path: url_path.to_string(),
            file,
        });
    }

    /// Copy or write the resource `name` (as seen from `lang`) into
    /// `_resources/`, once per distinct content hash and extension. Returns its URL path, or
    /// `None` when the name does not resolve.
    pub fn publish_resource(
        &mut self,
        store: &mut ResourceStore,
        name: &str,
        lang: &str,
    ) -> Result<Option<String>, PublishError> {
        let Some(id) = store.lookup(lang, name, None) else {
            return Ok(None);
        };
        let id = store.resolve_stylesheet(id, lang)?;
        if let Some(url_path) = self.published.get(&store.get(id).published_name()) {
            return Ok(Some(url_path.clone()));
        }

        if let Some(references) = store.get(id).references.clone() {
            for reference in references {
                self.publish_resource(store, &reference, lang)?;
            }
        }

        let metadata = store.get(id);
        let published_name = metadata.published_name();
        let file = Path::new(RESOURCES_DIR).join(&published_name);
        let dest = self.www_dir.join(&file);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        match &metadata.origin {
            ResourceOrigin::Source(path) => {
                fs::copy(path, &dest)?;
            }
            ResourceOrigin::Generated(bytes) => fs::write(&dest, bytes)?,
        }

        let url_path = format!("/{}/{}", RESOURCES_DIR, published_name);
        debug!("published {} ({}) as {}", name, lang, url_path);
        self.record(&url_path, file, ResponseHeaders::resource(&metadata.extension));
        self.published.insert(published_name, url_path.clone());
        self.emit(BuildEvent::ResourcePublished {
            name: name.to_string(),
            url_path: url_path.clone(),
        });
        Ok(Some(url_path))
    }
}

/// Relative reference from `base` to `target`, falling back to the absolute
/// form across origins.
pub fn relative_url(base: &Url, target: &Url) -> String {
    match base.make_relative(target) {
        Some(relative) if !relative.is_empty() => relative,
        Some(_) => target
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|last| !last.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| "./".to_string()),
        None => target.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{minimal_png, write_file};
    use tempfile::TempDir;

    fn context(site: &Path, www: &Path) -> BuildContext {
        BuildContext::new(site, www, "index.html", "en", None).unwrap()
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    // =========================================================================
    // URL arithmetic
    // =========================================================================

    #[test]
    fn relative_urls_between_pages() {
        let base = url("https://www.invalid/en/docs/index.html");
        assert_eq!(
            relative_url(&base, &url("https://www.invalid/_resources/a.png")),
            "../../_resources/a.png"
        );
        assert_eq!(
            relative_url(&base, &url("https://www.invalid/en/docs/other.html?x=1#top")),
            "other.html?x=1#top"
        );
        assert_eq!(
            relative_url(&base, &url("https://example.com/x")),
            "https://example.com/x"
        );
    }

    #[test]
    fn relative_url_to_self_is_never_empty() {
        let page = url("https://www.invalid/about.html");
        assert_eq!(relative_url(&page, &page), "about.html");
        let dir = url("https://www.invalid/docs/");
        assert_eq!(relative_url(&dir, &dir), "./");
    }

    #[test]
    fn localized_paths_prefix_non_default_languages() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(tmp.path(), tmp.path());
        assert_eq!(ctx.localized_path("/about.html", "en"), "/about.html");
        assert_eq!(ctx.localized_path("/about.html", "fr"), "/fr/about.html");
        assert_eq!(ctx.localized_path("/", "fr"), "/fr/");
    }

    #[test]
    fn directory_paths_get_index_file() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(tmp.path(), tmp.path());
        assert_eq!(ctx.file_for("/"), PathBuf::from("index.html"));
        assert_eq!(ctx.file_for("/docs/"), PathBuf::from("docs/index.html"));
        assert_eq!(ctx.file_for("/a/b.pdf"), PathBuf::from("a/b.pdf"));
    }

    #[test]
    fn source_keys_normalize_relative_segments() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(tmp.path(), tmp.path());
        assert_eq!(
            ctx.source_key("pages/../about.html").unwrap(),
            ctx.source_key("about.html").unwrap()
        );
    }

    // =========================================================================
    // publish_resource
    // =========================================================================

    #[test]
    fn identical_content_is_published_once() {
        let site = TempDir::new().unwrap();
        let www = TempDir::new().unwrap();
        write_file(site.path(), "a.png", &minimal_png(7, 7));
        write_file(site.path(), "b.png", &minimal_png(7, 7));
        let mut store = ResourceStore::new();
        store.add_resource(&site.path().join("a.png")).unwrap();
        store.add_resource(&site.path().join("b.png")).unwrap();
        let mut ctx = context(site.path(), www.path());

        let a = ctx.publish_resource(&mut store, "a.png", "en").unwrap().unwrap();
        let b = ctx.publish_resource(&mut store, "b.png", "en").unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(ctx.artifacts.len(), 1);
        assert_eq!(fs::read_dir(www.path().join(RESOURCES_DIR)).unwrap().count(), 1);
        assert_eq!(
            ctx.headers[&a].cache_control,
            "max-age=31536000, immutable"
        );
    }

    #[test]
    fn identical_bytes_with_different_extensions_publish_separately() {
        let site = TempDir::new().unwrap();
        let www = TempDir::new().unwrap();
        write_file(site.path(), "same.css", b"plain words");
        write_file(site.path(), "same.txt", b"plain words");
        let mut store = ResourceStore::new();
        store.add_resource(&site.path().join("same.css")).unwrap();
        store.add_resource(&site.path().join("same.txt")).unwrap();
        let mut ctx = context(site.path(), www.path());

        let css = ctx.publish_resource(&mut store, "same.css", "en").unwrap().unwrap();
        let txt = ctx.publish_resource(&mut store, "same.txt", "en").unwrap().unwrap();
        assert_ne!(css, txt);
        assert!(css.ends_with(".css"));
        assert!(txt.ends_with(".txt"));
        assert_eq!(ctx.artifacts.len(), 2);
        assert_eq!(ctx.headers[&css].content_type, "text/css");
        assert_eq!(ctx.headers[&txt].content_type, "text/plain");
        assert_eq!(
            fs::read_to_string(www.path().join(txt.trim_start_matches('/'))).unwrap(),
            "plain words"
        );
    }

    #[test]
    fn unknown_names_are_not_published() {
        let site = TempDir::new().unwrap();
        let www = TempDir::new().unwrap();
        let mut store = ResourceStore::new();
        let mut ctx = context(site.path(), www.path());
        assert_eq!(ctx.publish_resource(&mut store, "nope.png", "en").unwrap(), None);
        assert!(ctx.artifacts.is_empty());
    }

    #[test]
    fn stylesheets_publish_their_references() {
        let site = TempDir::new().unwrap();
        let www = TempDir::new().unwrap();
        write_file(site.path(), "bg.png", &minimal_png(7, 7));
        write_file(site.path(), "site.css", b"a{background:url(bg.png)}");
        let mut store = ResourceStore::new();
        store.add_resource(&site.path().join("bg.png")).unwrap();
        store.add_resource(&site.path().join("site.css")).unwrap();
        let mut ctx = context(site.path(), www.path());

        let css_url = ctx
            .publish_resource(&mut store, "site.css", "en")
            .unwrap()
            .unwrap();
        let png_hash = store.find("en", "bg.png").unwrap().hash.clone();
        assert_eq!(ctx.artifacts.len(), 2);
        let written =
            fs::read_to_string(www.path().join(css_url.trim_start_matches('/'))).unwrap();
        assert_eq!(written, format!("a{{background:url({}.png)}}", png_hash));
        assert!(www.path().join(RESOURCES_DIR).join(format!("{}.png", png_hash)).exists());
    }
}
