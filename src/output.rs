//! CLI output formatting for builds and checks.
//!
//! # Information-First Display
//!
//! Every line leads with the published URL path, the thing a visitor sees,
//! with sources and languages as secondary context. Resources are shown by
//! logical name so the content-addressed file name does not have to be
//! decoded by eye.
//!
//! # Output Format
//!
//! ## Make
//!
//! ```text
//! Building 3f2a9c1e… → builds/3f2a9c1e…
//! Discovered 14 resources (en, fr)
//! /about.html [en]
//!     Resource: logo.png → /_resources/9b1e….png
//! /fr/about.html [fr]
//! /docs/manual.pdf
//! /old.html → /about.html
//! Warning: missing source gone.html [fr]
//! Deploy script: builds/3f2a9c1e…/s3/sync.sh (7 commands)
//! latest → 3f2a9c1e…
//!
//! Published 2 pages, 1 file, 3 resources, 1 redirect
//! ```
//!
//! ## Check
//!
//! ```text
//! Sitemap: 4 entries (1 redirect)
//! Resources: 14 (en, fr)
//! Missing: gone.html
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::publish::{BuildEvent, BuildSummary, CheckReport};

// ============================================================================
// Shared helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `1 page`, `2 pages`.
fn plural(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}

// ============================================================================
// Make: progress events
// ============================================================================

/// Format a single build progress event as display lines.
pub fn format_build_event(event: &BuildEvent) -> Vec<String> {
    match event {
        BuildEvent::Started { label, build_dir } => {
            vec![format!("Building {} → {}", label, build_dir.display())]
        }
        BuildEvent::Discovered {
            resources,
            languages,
        } => vec![format!(
            "Discovered {} ({})",
            plural(*resources, "resource", "resources"),
            languages.join(", ")
        )],
        BuildEvent::PageRendered { url_path, language } => {
            vec![format!("{} [{}]", url_path, language)]
        }
        BuildEvent::FileCopied { url_path } => vec![url_path.clone()],
        BuildEvent::ResourcePublished { name, url_path } => {
            vec![format!("{}Resource: {} → {}", indent(1), name, url_path)]
        }
        BuildEvent::Redirect { from, to } => vec![format!("{} → {}", from, to)],
        BuildEvent::MissingSource { source, language } => match language {
            Some(lang) => vec![format!("Warning: missing source {} [{}]", source, lang)],
            None => vec![format!("Warning: missing source {}", source)],
        },
        BuildEvent::DeployScript { path, commands } => vec![format!(
            "Deploy script: {} ({})",
            path.display(),
            plural(*commands, "command", "commands")
        )],
        BuildEvent::LatestUpdated { label } => vec![format!("latest → {}", label)],
    }
}

/// Format the closing summary of a build.
pub fn format_summary(summary: &BuildSummary) -> Vec<String> {
    let mut lines = vec![
        String::new(),
        format!(
            "Published {}, {}, {}, {}",
            plural(summary.pages, "page", "pages"),
            plural(summary.files, "file", "files"),
            plural(summary.resources, "resource", "resources"),
            plural(summary.redirects.len(), "redirect", "redirects"),
        ),
    ];
    if !summary.missing.is_empty() {
        lines.push(format!(
            "{}Missing sources: {}",
            indent(1),
            summary.missing.join(", ")
        ));
    }
    lines.push(format!("{}Output: {}", indent(1), summary.www_dir.display()));
    lines
}

pub fn print_summary(summary: &BuildSummary) {
    for line in format_summary(summary) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Format the result of `check`.
pub fn format_check_report(report: &CheckReport) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Sitemap: {} ({})",
            plural(report.entries, "entry", "entries"),
            plural(report.redirects, "redirect", "redirects")
        ),
        format!("Resources: {} ({})", report.resources, report.languages.join(", ")),
    ];
    if report.missing.is_empty() {
        lines.push("All sources present".to_string());
    } else {
        lines.push(format!("Missing: {}", report.missing.join(", ")));
    }
    lines
}

pub fn print_check_report(report: &CheckReport) {
    for line in format_check_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
