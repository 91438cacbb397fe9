//! Site configuration module.
//!
//! Handles loading, validating, and merging `site.yaml`. The file sits at the
//! site root and marks the directory as a site:
//!
//! ```text
//! site/
//! ├── site.yaml                # This file
//! ├── sitemap.yaml             # Published path → source mapping
//! ├── index.html
//! ├── AppIcon.imageset/
//! ├── en.lproj/
//! └── fr.lproj/
//! ```
//!
//! ## Configuration Options
//!
//! ```yaml
//! # All options are optional - defaults shown below
//!
//! languages: [en]          # First entry is the default language
//! sitemap: sitemap.yaml    # Logical name of the sitemap resource
//! icon: null               # Image-set name for synthesized <link rel="icon">
//! index_name: index.html   # File written for directory URL paths
//! exclude: []              # Site-relative names skipped during discovery
//!
//! deploy:
//!   target: null           # Default s3://bucket[/prefix] for sync.sh
//! ```
//!
//! User values are merged over the stock defaults key by key, so a file may
//! override just the values it cares about. Unknown keys are rejected to
//! catch typos early.

use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const CONFIG_FILE: &str = "site.yaml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("No site.yaml found in {0}")]
    Missing(String),
}

/// Site configuration loaded from `site.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Language codes; the first is the default and renders at the root.
    pub languages: Vec<String>,
    /// Logical name of the sitemap resource.
    pub sitemap: String,
    /// Image-set (without `.imageset`) used for synthesized page icons.
    pub icon: Option<String>,
    /// File name substituted for directory-style URL paths.
    pub index_name: String,
    /// Site-relative paths skipped during discovery.
    pub exclude: Vec<String>,
    pub deploy: DeployConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string()],
            sitemap: "sitemap.yaml".to_string(),
            icon: None,
            index_name: "index.html".to_string(),
            exclude: Vec::new(),
            deploy: DeployConfig::default(),
        }
    }
}

/// Deploy script settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeployConfig {
    /// Fallback destination when `sync.sh` is run without an argument.
    pub target: Option<String>,
}

impl SiteConfig {
    /// The first configured language.
    pub fn default_language(&self) -> &str {
        self.languages.first().map(String::as_str).unwrap_or("en")
    }

    /// Validate config values are usable for a build.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.languages.is_empty() {
            return Err(ConfigError::Validation(
                "languages must list at least one language".into(),
            ));
        }
        for (i, lang) in self.languages.iter().enumerate() {
            if lang.is_empty() || lang.contains(['/', '\\', '.']) || lang == "global" {
                return Err(ConfigError::Validation(format!(
                    "languages: {:?} is not a usable language code",
                    lang
                )));
            }
            if self.languages[..i].contains(lang) {
                return Err(ConfigError::Validation(format!(
                    "languages: {:?} is listed twice",
                    lang
                )));
            }
        }
        if self.sitemap.trim().is_empty() {
            return Err(ConfigError::Validation("sitemap must not be empty".into()));
        }
        if self.index_name.is_empty() || self.index_name.contains('/') {
            return Err(ConfigError::Validation(
                "index_name must be a plain file name".into(),
            ));
        }
        if let Some(target) = &self.deploy.target
            && !target.starts_with("s3://")
        {
            return Err(ConfigError::Validation(
                "deploy.target must be an s3:// URL".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a YAML mapping.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<Value, ConfigError> {
    Ok(serde_yaml_ng::to_value(SiteConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Mappings are merged key-by-key (overlay keys override base keys).
/// - Non-mapping values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_yaml(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Mapping(mut base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_val) => merge_yaml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_map.insert(key, merged);
            }
            Value::Mapping(base_map)
        }
        // An empty file parses as null and overrides nothing.
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Load `site.yaml` from a directory as a raw YAML value.
///
/// Returns `Ok(None)` if no `site.yaml` exists in the directory.
/// Returns `Err` if the file exists but contains invalid YAML.
pub fn load_raw_config(path: &Path) -> Result<Option<Value>, ConfigError> {
    let config_path = path.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: Value = serde_yaml_ng::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(base: Value, overlay: Option<Value>) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_yaml(base, ov),
        None => base,
    };
    let config: SiteConfig = serde_yaml_ng::from_value(merged)?;
    config.validate()?;
    Ok(config)
}

/// Load config from `site.yaml` in the site root.
///
/// Unlike optional per-directory config, the file is required: it is what
/// makes a directory a site.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    let overlay = load_raw_config(root)?
        .ok_or_else(|| ConfigError::Missing(root.display().to_string()))?;
    resolve_config(stock_defaults_value()?, Some(overlay))
}

/// Returns a fully-commented stock `site.yaml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_yaml() -> &'static str {
    r##"# Sitebuilder Configuration
# =========================
# Place this file at the root of the site as site.yaml.
# Values shown below are the defaults. Unknown keys will cause an error.

# Languages to render, in order. The first one is the default language: its
# pages are published at the site root, the others under /<lang>/.
# Each language may have a <lang>.lproj bundle with strings and overrides.
languages:
  - en

# Logical name of the sitemap resource. It maps every published path to a
# source file, or to a redirect when the value starts with "->":
#
#   paths:
#     /: index.html
#     /old.html: "-> /"
sitemap: sitemap.yaml

# Image-set (directory <icon>.imageset with a Contents.json) used to add
# <link rel="icon"> tags to pages that declare none.
icon: null

# File written for published paths that end in "/".
index_name: index.html

# Site-relative names skipped while discovering resources.
exclude: []

deploy:
  # Default destination for s3/sync.sh when run without an argument,
  # e.g. s3://my-bucket/site
  target: null
"##
}
