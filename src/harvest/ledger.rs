//! Per-source package ledgers and the cross-source "already collected" index.
//!
//! Each (data source, package manager) pair owns one JSON file,
//! `<records_dir>/<source>_<manager>_packages.json`, keyed by package name.
//! Writes are read-modify-write with an atomic replace; a single writer per
//! records directory is assumed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{now_timestamp, DataSource, Ecosystem, PackageRecord};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger '{path}' is not valid JSON: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode package record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Ledger I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerMetadata {
    pub data_source: String,
    pub package_manager: String,
    pub created_at: String,
    pub last_updated: String,
}

/// On-disk ledger. Package entries stay untyped so fields written by other
/// tools survive a merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub metadata: LedgerMetadata,
    #[serde(default)]
    pub packages: Map<String, Value>,
}

pub fn ledger_path(records_dir: &Path, source: DataSource, ecosystem: Ecosystem) -> PathBuf {
    records_dir.join(format!("{}_{}_packages.json", source, ecosystem))
}

impl Ledger {
    pub fn empty(source: DataSource, ecosystem: Ecosystem) -> Self {
        let now = now_timestamp();
        Self {
            metadata: LedgerMetadata {
                data_source: source.to_string(),
                package_manager: ecosystem.to_string(),
                created_at: now.clone(),
                last_updated: now,
            },
            packages: Map::new(),
        }
    }

    /// Reads a ledger. `Ok(None)` when the file does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>, LedgerError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| LedgerError::Corrupt {
                path: path.display().to_string(),
                source,
            })
    }

    /// Merges `record` into `packages[record.package_name]`.
    pub fn merge_record(&mut self, record: &PackageRecord) -> Result<(), LedgerError> {
        let incoming = serde_json::to_value(record)?;

        let Value::Object(fields) = incoming else {
            return Ok(());
        };

        match self.packages.get_mut(&record.package_name) {
            Some(Value::Object(existing)) => merge_fields(existing, fields),
            _ => {
                self.packages
                    .insert(record.package_name.clone(), Value::Object(fields));
            }
        }
        Ok(())
    }

    pub fn package_names(&self) -> impl Iterator<Item = &String> {
        self.packages.keys()
    }
}

/// Field-level merge. An empty incoming value never blanks a populated one;
/// nested objects merge key by key.
fn merge_fields(existing: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        match existing.get_mut(&key) {
            None => {
                existing.insert(key, value);
            }
            Some(current) => match (current, value) {
                (Value::Object(current), Value::Object(nested)) => merge_fields(current, nested),
                (current, value) => {
                    if !is_empty(&value) || is_empty(current) {
                        *current = value;
                    }
                }
            },
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.values().all(is_empty),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Serializes `value` with 2-space indentation and atomically replaces `path`.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Names already gathered, per ecosystem, across every ledger loaded so far.
#[derive(Debug)]
pub struct CollectedPackageIndex {
    records_dir: PathBuf,
    collected: HashMap<Ecosystem, HashSet<String>>,
}

impl CollectedPackageIndex {
    pub fn new(records_dir: impl Into<PathBuf>) -> Self {
        Self {
            records_dir: records_dir.into(),
            collected: HashMap::new(),
        }
    }

    /// Unions the package names of every `sources` ledger for `ecosystem`.
    ///
    /// Unreadable or corrupt ledgers contribute nothing and are logged.
    pub fn load(&mut self, sources: &[DataSource], ecosystem: Ecosystem) -> &HashSet<String> {
        let mut names = HashSet::new();
        for &source in sources {
            let path = ledger_path(&self.records_dir, source, ecosystem);
            match Ledger::read(&path) {
                Ok(Some(ledger)) => names.extend(ledger.package_names().cloned()),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable ledger"),
            }
        }
        debug!(ecosystem = %ecosystem, count = names.len(), "Loaded collected packages");
        self.collected.insert(ecosystem, names);
        &self.collected[&ecosystem]
    }

    pub fn contains(&self, ecosystem: Ecosystem, package_name: &str) -> bool {
        self.collected
            .get(&ecosystem)
            .is_some_and(|names| names.contains(package_name))
    }

    /// Merges `record` into the `(source, ecosystem)` ledger and rewrites it.
    ///
    /// A corrupt ledger is copied to `<ledger>.corrupt` and replaced by a
    /// fresh one.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the ledger cannot be read or written.
    pub fn upsert(
        &mut self,
        source: DataSource,
        ecosystem: Ecosystem,
        record: &PackageRecord,
    ) -> Result<(), LedgerError> {
        let path = ledger_path(&self.records_dir, source, ecosystem);

        let mut ledger = match Ledger::read(&path) {
            Ok(Some(ledger)) => ledger,
            Ok(None) => Ledger::empty(source, ecosystem),
            Err(LedgerError::Corrupt { source: cause, .. }) => {
                let backup = path.with_extension("json.corrupt");
                warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    error = %cause,
                    "Ledger is corrupt, starting from an empty one"
                );
                fs::copy(&path, &backup)?;
                Ledger::empty(source, ecosystem)
            }
            Err(e) => return Err(e),
        };

        ledger.merge_record(record)?;

        let now = now_timestamp();
        if ledger.metadata.created_at.is_empty() {
            ledger.metadata.created_at = now.clone();
        }
        ledger.metadata.data_source = source.to_string();
        ledger.metadata.package_manager = ecosystem.to_string();
        ledger.metadata.last_updated = now;

        write_json_atomic(&path, &ledger)?;

        self.collected
            .entry(ecosystem)
            .or_default()
            .insert(record.package_name.clone());
        Ok(())
    }
}
