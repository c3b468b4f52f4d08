//! Write-through set of advisory IDs that were fully handled.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::harvest::ledger::write_json_atomic;
use crate::model::{DataSource, Ecosystem};

pub fn processed_path(records_dir: &Path, source: DataSource) -> PathBuf {
    records_dir.join(format!("processed_{}_ids.json", source))
}

/// Persisted as `{"<manager>": ["<advisory id>", ...]}`.
///
/// Every [`mark_processed`](Self::mark_processed) rewrites the whole file, so
/// a crash loses at most the advisory in flight.
#[derive(Debug)]
pub struct ProcessedAdvisoryIndex {
    path: PathBuf,
    ids: BTreeMap<String, BTreeSet<String>>,
}

impl ProcessedAdvisoryIndex {
    /// Loads the set for `source`; a missing or corrupt file yields an empty set.
    pub fn load(records_dir: &Path, source: DataSource) -> Self {
        let path = processed_path(records_dir, source);
        let ids = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Processed-ID file is corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Processed-ID file is unreadable, starting empty");
                BTreeMap::new()
            }
        };

        let index = Self { path, ids };
        debug!(path = %index.path.display(), count = index.len(), "Loaded processed advisory IDs");
        index
    }

    pub fn contains(&self, manager: Ecosystem, advisory_id: &str) -> bool {
        self.ids
            .get(manager.as_str())
            .is_some_and(|ids| ids.contains(advisory_id))
    }

    /// Records `advisory_id` and persists the full set immediately.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be written; the ID stays in
    /// memory either way.
    pub fn mark_processed(&mut self, manager: Ecosystem, advisory_id: &str) -> io::Result<()> {
        let inserted = self
            .ids
            .entry(manager.as_str().to_string())
            .or_default()
            .insert(advisory_id.to_string());
        if !inserted {
            return Ok(());
        }
        write_json_atomic(&self.path, &self.ids)
    }

    pub fn len(&self) -> usize {
        self.ids.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
