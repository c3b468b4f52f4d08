//! Advisory feed over a local checkout of the OSV malicious-packages repository.
//!
//! Layout: `<root>/osv/malicious/<ecosystem dir>/**/<ID>.json`. Cloning and
//! pulling the checkout happens outside this crate.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::model::{AdvisoryRecord, Ecosystem};
use crate::traits::{AdvisoryFeed, FeedError};

pub struct OsvDirectoryFeed {
    root: PathBuf,
    ecosystems: Vec<Ecosystem>,
}

impl OsvDirectoryFeed {
    pub fn new(root: impl Into<PathBuf>, ecosystems: Vec<Ecosystem>) -> Self {
        Self {
            root: root.into(),
            ecosystems,
        }
    }

    pub fn ecosystem_dir(&self, ecosystem: Ecosystem) -> PathBuf {
        self.root
            .join("osv")
            .join("malicious")
            .join(ecosystem.osv_dir())
    }
}

fn read_advisory(path: &Path) -> Option<AdvisoryRecord> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read advisory file");
            return None;
        }
    };
    let value: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Skipping unparsable advisory file");
            return None;
        }
    };
    let record = AdvisoryRecord::from_osv_json(&value);
    if record.is_none() {
        warn!(path = %path.display(), "Advisory file is not a JSON object");
    }
    record
}

impl AdvisoryFeed for OsvDirectoryFeed {
    fn feed_name(&self) -> &str {
        "osv-directory"
    }

    fn entries(&self) -> Result<Box<dyn Iterator<Item = AdvisoryRecord> + Send + '_>, FeedError> {
        if !self.root.is_dir() {
            return Err(FeedError::MissingRoot(self.root.display().to_string()));
        }

        let dirs: Vec<PathBuf> = self
            .ecosystems
            .iter()
            .map(|&ecosystem| self.ecosystem_dir(ecosystem))
            .filter(|dir| {
                let present = dir.is_dir();
                if !present {
                    debug!(dir = %dir.display(), "No advisories for ecosystem");
                }
                present
            })
            .collect();

        let entries = dirs
            .into_iter()
            .flat_map(|dir| WalkDir::new(dir).sort_by_file_name().into_iter())
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Failed to walk advisory directory");
                    None
                }
            })
            .filter(|entry| {
                entry.file_type().is_file()
                    && entry.path().extension().is_some_and(|ext| ext == "json")
            })
            .filter_map(|entry| read_advisory(entry.path()));

        Ok(Box::new(entries))
    }
}
