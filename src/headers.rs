//! Response headers for every published artifact.
//!
//! The build records one [`ResponseHeaders`] per URL path. The table is handed
//! to the deploy-script emitter (as `aws s3 cp` flags) and exposed in the
//! build summary for anything that serves `www/` locally.

use std::collections::BTreeMap;

pub const PAGE_CACHE_CONTROL: &str = "no-cache";
pub const FILE_CACHE_CONTROL: &str = "max-age=86400";
pub const RESOURCE_CACHE_CONTROL: &str = "max-age=31536000, immutable";

/// Already in the past, so pages are revalidated on every request.
pub const EXPIRED: &str = "Thu, 01 Jan 1970 00:00:01 GMT";

pub const HTML_PAGE: &str = "text/html; charset=utf-8";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// URL path (`/about.html`, `/_resources/<hash>.png`) → headers.
pub type HeaderTable = BTreeMap<String, ResponseHeaders>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeaders {
    pub content_type: String,
    pub cache_control: String,
    pub expires: Option<String>,
}

impl ResponseHeaders {
    /// Rendered HTML documents.
    pub fn page() -> Self {
        Self {
            content_type: HTML_PAGE.to_string(),
            cache_control: PAGE_CACHE_CONTROL.to_string(),
            expires: Some(EXPIRED.to_string()),
        }
    }

    /// Files copied verbatim from the sitemap.
    pub fn file(extension: &str) -> Self {
        Self {
            content_type: content_type_for_extension(extension).to_string(),
            cache_control: FILE_CACHE_CONTROL.to_string(),
            expires: None,
        }
    }

    /// Content-addressed resources under `_resources/`.
    pub fn resource(extension: &str) -> Self {
        Self {
            content_type: content_type_for_extension(extension).to_string(),
            cache_control: RESOURCE_CACHE_CONTROL.to_string(),
            expires: None,
        }
    }
}

/// Content type for a lower-case extension without the dot.
pub fn content_type_for_extension(extension: &str) -> &'static str {
    match extension {
        "html" | "htm" => HTML_PAGE,
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "xml" => "application/xml",
        "json" => "application/json",
        "yaml" | "yml" => "text/yaml",
        "pdf" => "application/pdf",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        _ => OCTET_STREAM,
    }
}
