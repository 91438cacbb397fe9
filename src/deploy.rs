//! Deploy script emission.
//!
//! The build never uploads anything. Instead it writes `s3/sync.sh`, a plain
//! shell script of `aws s3 cp` commands, next to a zero-byte `s3/empty` file
//! used as the body of redirect objects:
//!
//! ```text
//! builds/<label>/
//! ├── www/...
//! └── s3/
//!     ├── sync.sh    # ./sync.sh s3://bucket/prefix
//!     └── empty
//! ```
//!
//! One command per published artifact carries the headers recorded for it;
//! one command per redirect writes `empty` with `--website-redirect`.

use crate::headers::HeaderTable;
use crate::publish::PublishedArtifact;
use log::debug;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const SCRIPT_NAME: &str = "sync.sh";
pub const EMPTY_NAME: &str = "empty";

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No headers recorded for {0}")]
    MissingHeaders(String),
}

/// Write `sync.sh` and `empty` into `s3_dir`. Returns the number of `aws`
/// commands emitted.
pub fn write_deploy_script(
    s3_dir: &Path,
    artifacts: &[PublishedArtifact],
    headers: &HeaderTable,
    redirects: &[(String, String)],
    default_target: Option<&str>,
) -> Result<usize, DeployError> {
    let (script, commands) = render_script(artifacts, headers, redirects, default_target)?;
    fs::create_dir_all(s3_dir)?;
    let script_path = s3_dir.join(SCRIPT_NAME);
    fs::write(&script_path, script)?;
    fs::write(s3_dir.join(EMPTY_NAME), b"")?;
    make_executable(&script_path)?;
    debug!("wrote {} ({} commands)", script_path.display(), commands);
    Ok(commands)
}

/// The script text and its command count.
pub fn render_script(
    artifacts: &[PublishedArtifact],
    headers: &HeaderTable,
    redirects: &[(String, String)],
    default_target: Option<&str>,
) -> Result<(String, usize), DeployError> {
    let mut out = String::new();
    out.push_str("#!/bin/sh\n");
    out.push_str("# Generated by sitebuilder. Usage: sync.sh s3://bucket[/prefix]\n");
    out.push_str("set -e\n\n");
    match default_target {
        Some(target) => {
            let _ = writeln!(out, "TARGET=\"${{1:-{}}}\"", target.replace('"', "\\\""));
        }
        None => out.push_str("TARGET=\"${1:?usage: sync.sh s3://bucket[/prefix]}\"\n"),
    }
    out.push_str("TARGET=\"${TARGET%/}\"\n");
    out.push_str("KEYROOT=\"$(printf '%s' \"$TARGET\" | sed 's|^s3://[^/]*||')\"\n");
    out.push_str("HERE=\"$(cd \"$(dirname \"$0\")\" && pwd)\"\n");
    out.push_str("WWW=\"$HERE/../www\"\n");
    out.push_str("EMPTY=\"$HERE/empty\"\n\n");

    let mut commands = 0;
    for artifact in artifacts {
        let header = headers
            .get(&artifact.url_path)
            .ok_or_else(|| DeployError::MissingHeaders(artifact.url_path.clone()))?;
        let key = shell_quote(&artifact.file.to_string_lossy().replace('\\', "/"));
        let _ = write!(
            out,
            "aws s3 cp \"$WWW/\"{key} \"$TARGET/\"{key} --content-type {} --cache-control {}",
            shell_quote(&header.content_type),
            shell_quote(&header.cache_control),
            key = key,
        );
        if let Some(expires) = &header.expires {
            let _ = write!(out, " --expires {}", shell_quote(expires));
        }
        out.push('\n');
        commands += 1;
    }

    for (from, to) in redirects {
        let key = shell_quote(from.trim_start_matches('/'));
        let location = if is_absolute_url(to) {
            shell_quote(to)
        } else if to.starts_with('/') {
            format!("\"$KEYROOT\"{}", shell_quote(to))
        } else {
            // Relative targets are read from the key root.
            format!("\"$KEYROOT\"{}", shell_quote(&format!("/{to}")))
        };
        let _ = writeln!(
            out,
            "aws s3 cp \"$EMPTY\" \"$TARGET/\"{} --website-redirect {}",
            key, location
        );
        commands += 1;
    }
    Ok((out, commands))
}

/// Single-quote `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

fn is_absolute_url(location: &str) -> bool {
    location.split_once("://").is_some_and(|(scheme, _)| {
        !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c))
    })
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
