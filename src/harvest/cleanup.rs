//! Removal of npm security placeholders from the mirrored dataset.
//!
//! After a takedown npm republishes the name as `0.0.1-security`, which
//! carries no malicious code.

use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info};

pub const NPM_PLACEHOLDER_PREFIX: &str = "0.0.1-security";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub packages_removed: usize,
    pub versions_removed: usize,
}

/// Walks `<root>/<package>/<version>/` and deletes placeholder versions.
///
/// A package whose only version is a placeholder is removed entirely.
/// A missing `root` is not an error.
pub fn prune_npm_placeholders(root: &Path) -> io::Result<PruneReport> {
    let mut report = PruneReport::default();
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(report),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let package_dir = entry?.path();
        if !package_dir.is_dir() {
            continue;
        }

        let mut versions = Vec::new();
        for version in fs::read_dir(&package_dir)? {
            let version = version?;
            if version.file_type()?.is_dir() {
                versions.push(version.file_name().to_string_lossy().into_owned());
            }
        }

        let placeholders: Vec<&String> = versions
            .iter()
            .filter(|v| v.starts_with(NPM_PLACEHOLDER_PREFIX))
            .collect();

        if placeholders.is_empty() {
            debug!(package = %package_dir.display(), "No placeholder versions");
        } else if versions.len() == 1 {
            info!(package = %package_dir.display(), "Removing placeholder-only package");
            fs::remove_dir_all(&package_dir)?;
            report.packages_removed += 1;
        } else {
            for version in placeholders {
                let version_dir = package_dir.join(version);
                info!(path = %version_dir.display(), "Removing placeholder version");
                fs::remove_dir_all(&version_dir)?;
                report.versions_removed += 1;
            }
        }
    }

    Ok(report)
}
