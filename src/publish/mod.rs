//! Build orchestration.
//!
//! A build runs five phases in order, each finishing before the next starts:
//!
//! 1. **Setup**: load `site.yaml`, pick the build label, recreate
//!    `<builds>/<label>/{www,s3}`.
//! 2. **Discover**: walk the site root and register every resource with a
//!    fresh [`ResourceStore`].
//! 3. **Publish**: decode the sitemap, fill the forward table (pass 1), then
//!    render documents, copy files and record redirects (pass 2).
//! 4. **Deploy script**: write `s3/sync.sh` from the artifacts and headers.
//! 5. **Finish**: point `<builds>/latest` at the new build (skipped in debug).
//!
//! Per-build tables live in a [`BuildContext`] that is created in phase 3 and
//! dropped with the build, so nothing leaks from one build into the next.

mod context;
mod document;

pub use context::{BuildContext, ForwardUrl, PublishedArtifact, RESOURCES_DIR, relative_url};

use crate::config::{ConfigError, SiteConfig, load_config};
use crate::css::{CssTokenizer, StandardTokenizer};
use crate::deploy::{DeployError, write_deploy_script};
use crate::headers::{HeaderTable, ResponseHeaders};
use crate::html::{Html5Parser, HtmlError, HtmlParser};
use crate::markdown::{CommonMarkConverter, MarkdownConverter, MarkdownError};
use crate::resources::{
    GLOBAL, IMAGESET_EXTENSION, LPROJ_EXTENSION, ResourceError, ResourceStore, extension_str,
    is_hidden,
};
use crate::sitemap::{Sitemap, SitemapError, SitemapTarget};
use document::Renderer;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use thiserror::Error;
use walkdir::WalkDir;

/// Label used for debug builds.
pub const DEBUG_LABEL: &str = "debug";
/// Symlink under the builds root pointing at the newest release build.
pub const LATEST_LINK: &str = "latest";

/// Extensions never registered as resources during discovery.
const DISCOVERY_SKIPPED_EXTENSIONS: &[&str] = &["html"];

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),
    #[error("Sitemap error: {0}")]
    Sitemap(#[from] SitemapError),
    #[error("HTML error: {0}")]
    Html(#[from] HtmlError),
    #[error("Markdown error: {0}")]
    Markdown(#[from] MarkdownError),
    #[error("Deploy script error: {0}")]
    Deploy(#[from] DeployError),
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
    #[error("Include {href:?} in {} not found", document.display())]
    IncludeNotFound { href: String, document: PathBuf },
    #[error("Include {href:?} nested too deeply")]
    IncludeDepth { href: String },
    #[error("<style> in {} has element children", document.display())]
    StyleChildren { document: PathBuf },
    #[error("Site root is not a usable directory: {}", .0.display())]
    SiteRoot(PathBuf),
}

/// Progress events, sent to an optional listener while the build runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    Started {
        label: String,
        build_dir: PathBuf,
    },
    Discovered {
        resources: usize,
        languages: Vec<String>,
    },
    PageRendered {
        url_path: String,
        language: String,
    },
    FileCopied {
        url_path: String,
    },
    ResourcePublished {
        name: String,
        url_path: String,
    },
    Redirect {
        from: String,
        to: String,
    },
    MissingSource {
        source: String,
        language: Option<String>,
    },
    DeployScript {
        path: PathBuf,
        commands: usize,
    },
    LatestUpdated {
        label: String,
    },
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub site_root: PathBuf,
    pub builds_root: PathBuf,
    /// Explicit label; otherwise `debug` or a random one.
    pub label: Option<String>,
    pub debug: bool,
}

impl BuildOptions {
    pub fn new(site_root: impl Into<PathBuf>, builds_root: impl Into<PathBuf>) -> Self {
        Self {
            site_root: site_root.into(),
            builds_root: builds_root.into(),
            label: None,
            debug: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub label: String,
    pub build_dir: PathBuf,
    pub www_dir: PathBuf,
    pub headers: HeaderTable,
    pub redirects: Vec<(String, String)>,
    pub artifacts: Vec<PublishedArtifact>,
    pub pages: usize,
    pub files: usize,
    pub resources: usize,
    pub missing: Vec<String>,
}

/// Result of [`check`]: what a build would see, without writing anything.
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub entries: usize,
    pub redirects: usize,
    pub resources: usize,
    pub languages: Vec<String>,
    /// Sitemap sources that do not exist on disk.
    pub missing: Vec<String>,
}

pub struct Publisher {
    options: BuildOptions,
    html: Box<dyn HtmlParser>,
    markdown: Box<dyn MarkdownConverter>,
    tokenizer: Arc<dyn CssTokenizer>,
    events: Option<Sender<BuildEvent>>,
}

impl Publisher {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            html: Box::new(Html5Parser),
            markdown: Box::new(CommonMarkConverter::default()),
            tokenizer: Arc::new(StandardTokenizer),
            events: None,
        }
    }

    pub fn with_html_parser(mut self, parser: Box<dyn HtmlParser>) -> Self {
        self.html = parser;
        self
    }

    pub fn with_markdown_converter(mut self, converter: Box<dyn MarkdownConverter>) -> Self {
        self.markdown = converter;
        self
    }

    pub fn with_css_tokenizer(mut self, tokenizer: Arc<dyn CssTokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    pub fn with_events(mut self, events: Sender<BuildEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: BuildEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Run every phase and return what was produced.
    pub fn build(&mut self) -> Result<BuildSummary, PublishError> {
        // Setup
        let site_root = self
            .options
            .site_root
            .canonicalize()
            .map_err(|_| PublishError::SiteRoot(self.options.site_root.clone()))?;
        let config = load_config(&site_root)?;
        let label = self.label();
        fs::create_dir_all(&self.options.builds_root)?;
        let builds_root = self.options.builds_root.canonicalize()?;
        let build_dir = builds_root.join(&label);
        if build_dir.exists() {
            debug!("removing previous build {}", build_dir.display());
            fs::remove_dir_all(&build_dir)?;
        }
        let www_dir = build_dir.join("www");
        let s3_dir = build_dir.join("s3");
        fs::create_dir_all(&www_dir)?;
        fs::create_dir_all(&s3_dir)?;
        info!("building {} into {}", site_root.display(), build_dir.display());
        self.emit(BuildEvent::Started {
            label: label.clone(),
            build_dir: build_dir.clone(),
        });

        // Discover
        let mut store = ResourceStore::with_tokenizer(Arc::clone(&self.tokenizer));
        discover(&site_root, &builds_root, &config, &mut store)?;
        self.emit(BuildEvent::Discovered {
            resources: store.len(),
            languages: config.languages.clone(),
        });

        // Publish
        let sitemap = load_sitemap(&store, &config)?;
        let mut ctx = BuildContext::new(
            &site_root,
            &www_dir,
            &config.index_name,
            config.default_language(),
            self.events.clone(),
        )?;
        let counts = self.publish(&site_root, &config, &sitemap, &mut store, &mut ctx)?;

        // Deploy script
        let commands = write_deploy_script(
            &s3_dir,
            &ctx.artifacts,
            &ctx.headers,
            &ctx.redirects,
            config.deploy.target.as_deref(),
        )?;
        self.emit(BuildEvent::DeployScript {
            path: s3_dir.join(crate::deploy::SCRIPT_NAME),
            commands,
        });

        // Finish
        if !self.options.debug {
            update_latest(&builds_root, &label)?;
            self.emit(BuildEvent::LatestUpdated {
                label: label.clone(),
            });
        }

        let resources = ctx.published.len();
        Ok(BuildSummary {
            label,
            build_dir,
            www_dir,
            headers: ctx.headers,
            redirects: ctx.redirects,
            artifacts: ctx.artifacts,
            pages: counts.pages,
            files: counts.files,
            resources,
            missing: counts.missing,
        })
    }

    fn label(&self) -> String {
        match (&self.options.label, self.options.debug) {
            (Some(label), _) => label.clone(),
            (None, true) => DEBUG_LABEL.to_string(),
            (None, false) => random_label(),
        }
    }

    fn publish(
        &self,
        site_root: &Path,
        config: &SiteConfig,
        sitemap: &Sitemap,
        store: &mut ResourceStore,
        ctx: &mut BuildContext,
    ) -> Result<PublishCounts, PublishError> {
        // Pass 1: every source's destination is known before any link is rewritten.
        for entry in &sitemap.entries {
            if let Some(source) = entry.source() {
                let key = ctx.source_key(source)?;
                ctx.forward.insert(
                    key,
                    ForwardUrl {
                        path: entry.path.clone(),
                        document: entry.is_html(),
                    },
                );
            }
        }

        // Pass 2
        let mut counts = PublishCounts::default();
        for entry in &sitemap.entries {
            let source = match &entry.target {
                SitemapTarget::Source(source) => source.as_str(),
                SitemapTarget::Redirect(to) => {
                    ctx.redirects.push((entry.path.clone(), to.clone()));
                    ctx.emit(BuildEvent::Redirect {
                        from: entry.path.clone(),
                        to: to.clone(),
                    });
                    continue;
                }
            };
            let source_path = site_root.join(source);
            if entry.is_html() {
                for lang in &config.languages {
                    let url_path = ctx.localized_path(&entry.path, lang);
                    let text = match fs::read(&source_path) {
                        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                            warn!("{} not found, skipping {} ({})", source, url_path, lang);
                            ctx.emit(BuildEvent::MissingSource {
                                source: source.to_string(),
                                language: Some(lang.clone()),
                            });
                            counts.missing.push(source.to_string());
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    };
                    let mut renderer = Renderer::new(
                        self.html.as_ref(),
                        self.markdown.as_ref(),
                        store,
                        ctx,
                        config,
                        lang,
                        &source_path,
                        &url_path,
                    )?;
                    renderer.render(&text)?;
                    counts.pages += 1;
                }
            } else if source_path.is_file() {
                let file = ctx.file_for(&entry.path);
                let dest = ctx.www_dir.join(&file);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(&source_path, &dest)?;
                let extension = extension_str(&file).unwrap_or_default();
                ctx.record(&entry.path, file, ResponseHeaders::file(&extension));
                ctx.emit(BuildEvent::FileCopied {
                    url_path: entry.path.clone(),
                });
                counts.files += 1;
            } else {
                warn!("{} not found, skipping {}", source, entry.path);
                ctx.emit(BuildEvent::MissingSource {
                    source: source.to_string(),
                    language: None,
                });
                counts.missing.push(source.to_string());
            }
        }
        counts.missing.dedup();
        Ok(counts)
    }
}

#[derive(Debug, Default)]
struct PublishCounts {
    pages: usize,
    files: usize,
    missing: Vec<String>,
}

/// Load configuration, discover resources and decode the sitemap without
/// writing anything. Reports sitemap sources that are missing on disk.
pub fn check(site_root: &Path) -> Result<CheckReport, PublishError> {
    let site_root = site_root
        .canonicalize()
        .map_err(|_| PublishError::SiteRoot(site_root.to_path_buf()))?;
    let config = load_config(&site_root)?;
    let mut store = ResourceStore::new();
    // Nothing is written, so there is no builds root to skip.
    discover(&site_root, Path::new(""), &config, &mut store)?;
    let sitemap = load_sitemap(&store, &config)?;

    let mut missing: Vec<String> = sitemap
        .sources()
        .map(|(_, source)| source)
        .filter(|source| !site_root.join(source).is_file())
        .map(str::to_string)
        .collect();
    missing.dedup();
    Ok(CheckReport {
        entries: sitemap.entries.len(),
        redirects: sitemap.redirects().count(),
        resources: store.len(),
        languages: config.languages.clone(),
        missing,
    })
}

/// Register every resource under `site_root` with `store`.
///
/// Dotfiles, the builds root, `exclude`d names and HTML files are skipped.
/// `.lproj` and `.imageset` directories are handed over whole.
pub fn discover(
    site_root: &Path,
    builds_root: &Path,
    config: &SiteConfig,
    store: &mut ResourceStore,
) -> Result<(), PublishError> {
    let mut walker = WalkDir::new(site_root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e) && e.path() != builds_root);

    while let Some(entry) = walker.next() {
        let entry = entry?;
        let path = entry.path();
        let relative = path
            .strip_prefix(site_root)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        if config.exclude.iter().any(|name| name.trim_end_matches('/') == relative) {
            debug!("excluded {}", relative);
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }

        let extension = extension_str(path);
        if entry.file_type().is_dir() {
            if matches!(
                extension.as_deref(),
                Some(LPROJ_EXTENSION) | Some(IMAGESET_EXTENSION)
            ) {
                store.add_resource(path)?;
                walker.skip_current_dir();
            }
            continue;
        }
        if extension
            .as_deref()
            .is_some_and(|ext| DISCOVERY_SKIPPED_EXTENSIONS.contains(&ext))
        {
            continue;
        }
        store.add_resource(path)?;
    }
    debug!("discovered {} resources", store.len());
    Ok(())
}

fn load_sitemap(store: &ResourceStore, config: &SiteConfig) -> Result<Sitemap, PublishError> {
    let metadata = store
        .find(GLOBAL, &config.sitemap)
        .ok_or_else(|| SitemapError::NotFound(config.sitemap.clone()))?;
    let value = metadata
        .value
        .as_ref()
        .ok_or_else(|| SitemapError::NotDecoded(config.sitemap.clone()))?;
    Ok(Sitemap::from_value(&config.sitemap, value)?)
}

/// 40 hex digits from 20 random bytes.
pub fn random_label() -> String {
    let bytes: [u8; 20] = rand::random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Point `<builds_root>/latest` at `label` by creating the link under a
/// temporary name and renaming it over the old one.
fn update_latest(builds_root: &Path, label: &str) -> Result<(), PublishError> {
    let temp = builds_root.join(format!(".{}-{}", LATEST_LINK, label));
    if fs::symlink_metadata(&temp).is_ok() {
        fs::remove_file(&temp)?;
    }
    symlink_dir(Path::new(label), &temp)?;
    fs::rename(&temp, builds_root.join(LATEST_LINK))?;
    Ok(())
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}
