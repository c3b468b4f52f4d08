//! Resumable collection pipeline.
//!
//! This module provides the [`CollectionPipeline`] coordinator that walks an
//! [`AdvisoryFeed`] and, for every affected package:
//! - skips it when any ledger already lists it
//! - resolves and downloads one artifact per affected version
//! - merges a [`PackageRecord`](crate::model::PackageRecord) into the source ledger
//!
//! An advisory is marked processed only after all of its packages were
//! recorded, so a killed run redoes at most the advisory in flight.

use std::collections::HashSet;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::harvest::ledger::{CollectedPackageIndex, LedgerError};
use crate::harvest::processed::ProcessedAdvisoryIndex;
use crate::harvest::{record, selector, versions};
use crate::model::{AdvisoryRecord, ArtifactDescriptor, DataSource, Ecosystem};
use crate::traits::{AdvisoryFeed, ArtifactStore, FeedError, VersionResolver};

// ============================================================================
// Pipeline Types
// ============================================================================

/// Result of the download step for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// At least one artifact was written under `path`.
    Success { path: PathBuf, files: Vec<PathBuf> },

    /// Nothing was written; the package is still recorded.
    Failed(String),

    /// A ledger already lists the package; nothing was attempted.
    AlreadyCollected,
}

/// Counters for one pass over a feed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Advisories yielded by the feed
    pub advisories_seen: usize,

    /// Advisories handled and marked processed during this run
    pub advisories_processed: usize,

    /// Advisories skipped because an earlier run processed them
    pub advisories_skipped: usize,

    /// Advisories without any recognised ecosystem
    pub advisories_unresolved: usize,

    /// Packages written to a ledger
    pub packages_recorded: usize,

    /// Packages with at least one saved artifact
    pub packages_downloaded: usize,

    /// Packages skipped because a ledger already lists them
    pub packages_already_collected: usize,

    /// Packages recorded without download info
    pub download_failures: usize,

    /// Artifact files written
    pub artifacts_saved: usize,

    /// Wall time of the run (milliseconds)
    pub total_duration_ms: u64,
}

// ============================================================================
// Pipeline Errors
// ============================================================================

/// Failures that stop a run. Per-package download problems never surface here.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Advisory feed failed: {0}")]
    Feed(#[from] FeedError),

    #[error("Ledger write failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Processed-ID write failed: {0}")]
    ProcessedIndex(#[source] io::Error),
}

/// Joins `relative` under `root`, rejecting `..`, absolute and prefix components.
fn safe_child(root: &Path, relative: &Path) -> Result<PathBuf, String> {
    let escapes = relative.components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes || relative.as_os_str().is_empty() {
        return Err(format!("path '{}' escapes the dataset root", relative.display()));
    }
    Ok(root.join(relative))
}

// ============================================================================
// Pipeline Executor
// ============================================================================

/// Sequential, resumable collector over one data source.
///
/// Artifacts are mirrored to
/// `<dataset_dir>/<manager>/<package>/<version>/<file>`, with `/` in scoped
/// package names written as `##`.
///
/// # Example
///
/// ```ignore
/// let mut pipeline = CollectionPipeline::new(resolver, store, DataSource::Osv, "records", "dataset")
///     .with_timeout(Duration::from_secs(120));
/// let summary = pipeline.run(&OsvDirectoryFeed::new("malicious-packages", vec![Ecosystem::Pip])).await?;
/// println!("recorded {} packages", summary.packages_recorded);
/// ```
pub struct CollectionPipeline<R, S>
where
    R: VersionResolver,
    S: ArtifactStore,
{
    resolver: R,
    store: S,

    /// Ledger family records are written to
    source: DataSource,

    /// Root of the mirrored artifacts
    dataset_dir: PathBuf,

    /// Timeout for each resolver lookup and each artifact fetch (default: 5 minutes)
    stage_timeout: Duration,

    collected: CollectedPackageIndex,
    processed: ProcessedAdvisoryIndex,
}

impl<R, S> CollectionPipeline<R, S>
where
    R: VersionResolver,
    S: ArtifactStore,
{
    /// Creates a pipeline and loads both indices from `records_dir`.
    ///
    /// The collected index unions the ledgers of every data source, so a
    /// package fetched through one feed is not fetched again through another.
    pub fn new(
        resolver: R,
        store: S,
        source: DataSource,
        records_dir: impl Into<PathBuf>,
        dataset_dir: impl Into<PathBuf>,
    ) -> Self {
        let records_dir = records_dir.into();
        let processed = ProcessedAdvisoryIndex::load(&records_dir, source);
        let mut collected = CollectedPackageIndex::new(records_dir);
        for ecosystem in Ecosystem::ALL {
            collected.load(&DataSource::ALL, ecosystem);
        }

        Self {
            resolver,
            store,
            source,
            dataset_dir: dataset_dir.into(),
            stage_timeout: Duration::from_secs(300),
            collected,
            processed,
        }
    }

    /// Sets the timeout applied to each resolver and store call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn collected(&self) -> &CollectedPackageIndex {
        &self.collected
    }

    pub fn processed(&self) -> &ProcessedAdvisoryIndex {
        &self.processed
    }

    /// Directory holding every mirrored version of `package_name`.
    pub fn package_dir(&self, ecosystem: Ecosystem, package_name: &str) -> Result<PathBuf, String> {
        let root = self.dataset_dir.join(ecosystem.as_str());
        safe_child(&root, Path::new(&package_name.replace('/', "##")))
    }

    /// Runs one full pass over `feed`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the feed cannot be opened or a ledger or
    /// the processed-ID file cannot be written. Download failures are
    /// recorded, not returned.
    #[instrument(skip(self, feed), fields(feed = feed.feed_name(), source = %self.source))]
    pub async fn run(&mut self, feed: &dyn AdvisoryFeed) -> Result<RunSummary, PipelineError> {
        let start = Instant::now();
        let mut summary = RunSummary::default();

        info!("Starting collection run");
        for advisory in feed.entries()? {
            summary.advisories_seen += 1;
            self.process_advisory(&advisory, &mut summary).await?;
        }

        summary.total_duration_ms = start.elapsed().as_millis() as u64;
        info!(
            seen = summary.advisories_seen,
            processed = summary.advisories_processed,
            skipped = summary.advisories_skipped,
            recorded = summary.packages_recorded,
            downloaded = summary.packages_downloaded,
            failures = summary.download_failures,
            duration_ms = summary.total_duration_ms,
            "Collection run completed"
        );
        Ok(summary)
    }

    async fn process_advisory(
        &mut self,
        advisory: &AdvisoryRecord,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        let id = advisory.advisory_id.as_str();

        let Some(manager) = advisory.primary_ecosystem() else {
            warn!(advisory = %id, "No supported ecosystem in advisory");
            summary.advisories_unresolved += 1;
            return Ok(());
        };

        if self.processed.contains(manager, id) {
            debug!(advisory = %id, "Advisory already processed");
            summary.advisories_skipped += 1;
            return Ok(());
        }

        for affected in &advisory.affected {
            let Some(ecosystem) = affected.ecosystem() else {
                debug!(advisory = %id, ecosystem = %affected.ecosystem, "Unsupported ecosystem");
                continue;
            };
            let name = affected.package_name.as_str();
            if name.is_empty() {
                warn!(advisory = %id, "Affected entry without a package name");
                continue;
            }

            let affected_versions = versions::extract(affected);
            let outcome = if self.collected.contains(ecosystem, name) {
                DownloadOutcome::AlreadyCollected
            } else {
                self.download(ecosystem, name, &affected_versions).await
            };

            let download_path = match outcome {
                DownloadOutcome::AlreadyCollected => {
                    info!(advisory = %id, package = %name, "Package already collected");
                    summary.packages_already_collected += 1;
                    continue;
                }
                DownloadOutcome::Success { path, files } => {
                    summary.packages_downloaded += 1;
                    summary.artifacts_saved += files.len();
                    Some(path)
                }
                DownloadOutcome::Failed(reason) => {
                    warn!(advisory = %id, package = %name, reason = %reason, "Download failed, recording metadata only");
                    summary.download_failures += 1;
                    None
                }
            };

            let mut package =
                record::from_advisory(self.source, advisory, affected, affected_versions);
            if let Some(path) = download_path {
                package.mark_downloaded(path.display().to_string());
            }
            self.collected.upsert(self.source, ecosystem, &package)?;
            summary.packages_recorded += 1;
        }

        if id.is_empty() {
            warn!("Advisory without an id cannot be marked processed");
        } else {
            self.processed
                .mark_processed(manager, id)
                .map_err(PipelineError::ProcessedIndex)?;
        }
        summary.advisories_processed += 1;
        Ok(())
    }

    /// Resolves, selects and saves one artifact per affected version.
    async fn download(
        &self,
        ecosystem: Ecosystem,
        package_name: &str,
        affected_versions: &[String],
    ) -> DownloadOutcome {
        let package_dir = match self.package_dir(ecosystem, package_name) {
            Ok(dir) => dir,
            Err(reason) => return DownloadOutcome::Failed(reason),
        };

        let lookup = timeout(
            self.stage_timeout,
            self.resolver.list_artifacts(package_name, ecosystem),
        )
        .await;
        let artifacts = match lookup {
            Err(_) => {
                return DownloadOutcome::Failed(format!(
                    "artifact lookup timed out after {}s",
                    self.stage_timeout.as_secs()
                ))
            }
            Ok(Err(e)) => return DownloadOutcome::Failed(e.to_string()),
            Ok(Ok(artifacts)) => artifacts,
        };

        let groups = group_by_version(artifacts, affected_versions);
        if groups.is_empty() {
            return DownloadOutcome::Failed("no artifact matches the affected versions".to_string());
        }

        let mut saved = Vec::new();
        let mut last_failure = String::new();
        for (version, candidates) in &groups {
            let chosen = match selector::select(candidates) {
                Ok(chosen) => chosen,
                Err(e) => {
                    last_failure = e.to_string();
                    continue;
                }
            };

            let relative = Path::new(version.as_deref().unwrap_or("unknown")).join(&chosen.filename);
            let destination = match safe_child(&package_dir, &relative) {
                Ok(path) => path,
                Err(reason) => {
                    warn!(package = %package_name, reason = %reason, "Rejected artifact path");
                    last_failure = reason;
                    continue;
                }
            };

            debug!(package = %package_name, url = %chosen.url, candidates = candidates.len(), "Fetching selected artifact");
            match timeout(self.stage_timeout, self.store.fetch_and_save(chosen, &destination)).await {
                Ok(Ok(true)) => saved.push(destination),
                Ok(Ok(false)) => last_failure = format!("{} was not downloadable", chosen.url),
                Ok(Err(e)) => last_failure = format!("{}: {}", chosen.url, e),
                Err(_) => {
                    last_failure = format!(
                        "{} timed out after {}s",
                        chosen.url,
                        self.stage_timeout.as_secs()
                    )
                }
            }
        }

        if saved.is_empty() {
            DownloadOutcome::Failed(last_failure)
        } else {
            DownloadOutcome::Success {
                path: package_dir,
                files: saved,
            }
        }
    }
}

/// Keeps candidates whose version is affected and groups them by version in
/// first-seen order. Unversioned candidates always match.
fn group_by_version(
    artifacts: Vec<ArtifactDescriptor>,
    affected_versions: &[String],
) -> Vec<(Option<String>, Vec<ArtifactDescriptor>)> {
    let mut seen = HashSet::new();
    let mut groups: Vec<(Option<String>, Vec<ArtifactDescriptor>)> = Vec::new();

    for artifact in artifacts {
        let matches = artifact
            .version
            .as_deref()
            .map_or(true, |v| versions::covers(affected_versions, v));
        if !matches {
            continue;
        }
        if seen.insert(artifact.version.clone()) {
            groups.push((artifact.version.clone(), vec![artifact]));
        } else if let Some((_, group)) = groups.iter_mut().find(|(v, _)| *v == artifact.version) {
            group.push(artifact);
        }
    }

    groups
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::ledger::{ledger_path, Ledger};
    use crate::harvest::processed::processed_path;
    use crate::model::PackageRecord;
    use crate::sources::StaticFeed;
    use crate::traits::{ResolveError, StoreError};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    // Mock resolver for testing
    #[derive(Default)]
    struct MockResolver {
        artifacts: HashMap<String, Vec<ArtifactDescriptor>>,
        delay: Option<Duration>,
    }

    impl MockResolver {
        fn with(mut self, name: &str, files: &[(&str, &str)]) -> Self {
            let descriptors = files
                .iter()
                .map(|(version, filename)| {
                    ArtifactDescriptor::new(
                        format!("https://files.example.org/{}", filename),
                        Some(version.to_string()),
                    )
                })
                .collect();
            self.artifacts.insert(name.to_string(), descriptors);
            self
        }
    }

    #[async_trait]
    impl VersionResolver for MockResolver {
        async fn list_artifacts(
            &self,
            package_name: &str,
            _ecosystem: Ecosystem,
        ) -> Result<Vec<ArtifactDescriptor>, ResolveError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.artifacts
                .get(package_name)
                .cloned()
                .ok_or_else(|| ResolveError::InvalidResponse(format!("unknown package {}", package_name)))
        }
    }

    // Mock store that writes a marker file and remembers fetched URLs
    #[derive(Default, Clone)]
    struct MockStore {
        fetched: Arc<Mutex<Vec<String>>>,
        refuse: bool,
    }

    impl MockStore {
        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ArtifactStore for MockStore {
        async fn fetch_and_save(
            &self,
            descriptor: &ArtifactDescriptor,
            destination: &Path,
        ) -> Result<bool, StoreError> {
            self.fetched.lock().unwrap().push(descriptor.url.clone());
            if self.refuse {
                return Ok(false);
            }
            fs::create_dir_all(destination.parent().unwrap())?;
            fs::write(destination, descriptor.url.as_bytes())?;
            Ok(true)
        }
    }

    fn advisory(value: Value) -> AdvisoryRecord {
        AdvisoryRecord::from_osv_json(&value).unwrap()
    }

    fn foo_advisory() -> AdvisoryRecord {
        advisory(json!({
            "id": "MAL-2025-001",
            "summary": "Malicious code in foo (PyPI)",
            "modified": "2025-01-02T00:00:00Z",
            "affected": [{"package": {"ecosystem": "PyPI", "name": "foo"}, "versions": ["1.2.3"]}]
        }))
    }

    fn foo_resolver() -> MockResolver {
        MockResolver::default().with(
            "foo",
            &[
                ("1.2.3", "foo-1.2.3.tar.gz"),
                ("1.2.3", "foo-1.2.3-py3-none-any.whl"),
            ],
        )
    }

    struct Fixture {
        _dir: TempDir,
        records: PathBuf,
        dataset: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let records = dir.path().join("records");
        let dataset = dir.path().join("dataset");
        Fixture {
            _dir: dir,
            records,
            dataset,
        }
    }

    fn read_ledger(records: &Path, source: DataSource, ecosystem: Ecosystem) -> Option<Ledger> {
        Ledger::read(&ledger_path(records, source, ecosystem)).unwrap()
    }

    #[tokio::test]
    async fn test_collects_single_tarball_and_marks_processed() {
        let fx = fixture();
        let store = MockStore::default();
        let mut pipeline = CollectionPipeline::new(
            foo_resolver(),
            store.clone(),
            DataSource::Osv,
            &fx.records,
            &fx.dataset,
        );

        let feed = StaticFeed::new("test", vec![foo_advisory()]);
        let summary = pipeline.run(&feed).await.unwrap();

        assert_eq!(store.fetched(), vec!["https://files.example.org/foo-1.2.3.tar.gz"]);
        assert_eq!(summary.advisories_processed, 1);
        assert_eq!(summary.packages_downloaded, 1);
        assert_eq!(summary.artifacts_saved, 1);
        assert!(fx.dataset.join("pip/foo/1.2.3/foo-1.2.3.tar.gz").exists());

        let ledger = read_ledger(&fx.records, DataSource::Osv, Ecosystem::Pip).unwrap();
        assert_eq!(ledger.packages.len(), 1);
        let entry: PackageRecord = serde_json::from_value(ledger.packages["foo"].clone()).unwrap();
        assert_eq!(entry.affected_version, "1.2.3");
        assert_eq!(entry.osv_id, "MAL-2025-001");
        assert!(!entry.collection_time.is_empty());
        assert!(!entry.download_info.download_time.is_empty());
        assert!(entry.download_info.download_path.ends_with("foo"));

        let processed: Value =
            serde_json::from_slice(&fs::read(processed_path(&fx.records, DataSource::Osv)).unwrap())
                .unwrap();
        assert_eq!(processed["pip"], json!(["MAL-2025-001"]));
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let fx = fixture();
        let feed = StaticFeed::new("test", vec![foo_advisory()]);

        let first_store = MockStore::default();
        let mut first =
            CollectionPipeline::new(foo_resolver(), first_store.clone(), DataSource::Osv, &fx.records, &fx.dataset);
        first.run(&feed).await.unwrap();
        assert_eq!(first_store.fetched().len(), 1);

        let ledger_file = ledger_path(&fx.records, DataSource::Osv, Ecosystem::Pip);
        let before = fs::read(&ledger_file).unwrap();

        let second_store = MockStore::default();
        let mut second =
            CollectionPipeline::new(foo_resolver(), second_store.clone(), DataSource::Osv, &fx.records, &fx.dataset);
        let summary = second.run(&feed).await.unwrap();

        assert!(second_store.fetched().is_empty());
        assert_eq!(summary.advisories_skipped, 1);
        assert_eq!(summary.packages_recorded, 0);
        assert_eq!(fs::read(&ledger_file).unwrap(), before);
    }

    #[tokio::test]
    async fn test_package_known_from_other_source_is_not_refetched() {
        let fx = fixture();
        let mut snyk_index = CollectedPackageIndex::new(&fx.records);
        snyk_index
            .upsert(DataSource::Snyk, Ecosystem::Pip, &PackageRecord::new("foo"))
            .unwrap();

        let store = MockStore::default();
        let mut pipeline =
            CollectionPipeline::new(foo_resolver(), store.clone(), DataSource::Osv, &fx.records, &fx.dataset);
        let summary = pipeline.run(&StaticFeed::new("test", vec![foo_advisory()])).await.unwrap();

        assert!(store.fetched().is_empty());
        assert_eq!(summary.packages_already_collected, 1);
        assert!(read_ledger(&fx.records, DataSource::Osv, Ecosystem::Pip).is_none());
        assert!(pipeline.processed().contains(Ecosystem::Pip, "MAL-2025-001"));
    }

    #[tokio::test]
    async fn test_download_failure_still_records_package() {
        let fx = fixture();
        let store = MockStore {
            refuse: true,
            ..Default::default()
        };
        let mut pipeline =
            CollectionPipeline::new(foo_resolver(), store.clone(), DataSource::Osv, &fx.records, &fx.dataset);
        let summary = pipeline.run(&StaticFeed::new("test", vec![foo_advisory()])).await.unwrap();

        assert_eq!(store.fetched().len(), 1);
        assert_eq!(summary.download_failures, 1);
        assert_eq!(summary.packages_recorded, 1);

        let ledger = read_ledger(&fx.records, DataSource::Osv, Ecosystem::Pip).unwrap();
        let entry = &ledger.packages["foo"];
        assert_eq!(entry["download_info"]["download_time"], "");
        assert_eq!(entry["download_info"]["download_path"], "");
        assert_eq!(entry["collection_time"], "");
        assert_eq!(entry["overview"], "Malicious code in foo (PyPI)");
        assert!(pipeline.processed().contains(Ecosystem::Pip, "MAL-2025-001"));
    }

    #[tokio::test]
    async fn test_resolver_error_and_range_only_versions() {
        let fx = fixture();
        let resolver = MockResolver::default().with("ranged", &[("0.5.0", "ranged-0.5.0.tar.gz")]);
        let store = MockStore::default();
        let mut pipeline =
            CollectionPipeline::new(resolver, store.clone(), DataSource::Osv, &fx.records, &fx.dataset);

        let feed = StaticFeed::new(
            "test",
            vec![
                advisory(json!({
                    "id": "MAL-1",
                    "affected": [{"package": {"ecosystem": "npm", "name": "unknown-to-registry"},
                                  "ranges": [{"type": "SEMVER", "events": [{"introduced": "0"}]}]}]
                })),
                advisory(json!({
                    "id": "MAL-2",
                    "affected": [{"package": {"ecosystem": "npm", "name": "ranged"},
                                  "ranges": [{"type": "SEMVER", "events": [{"introduced": "1.0.0"}, {"fixed": "2.0.0"}]}]}]
                })),
            ],
        );
        let summary = pipeline.run(&feed).await.unwrap();

        assert!(store.fetched().is_empty());
        assert_eq!(summary.download_failures, 2);
        let ledger = read_ledger(&fx.records, DataSource::Osv, Ecosystem::Npm).unwrap();
        assert_eq!(ledger.packages["unknown-to-registry"]["all_versions"], json!(["all versions"]));
        assert_eq!(ledger.packages["ranged"]["all_versions"], json!([">=1.0.0", "<2.0.0"]));
        assert_eq!(ledger.packages["ranged"]["affected_version"], ">=1.0.0");
    }

    #[tokio::test]
    async fn test_all_versions_downloads_one_file_per_version() {
        let fx = fixture();
        let resolver = MockResolver::default().with(
            "@evil/pkg",
            &[
                ("1.0.0", "pkg-1.0.0.tgz"),
                ("1.0.1", "pkg-1.0.1.tgz"),
                ("1.0.0", "pkg-1.0.0.zip"),
            ],
        );
        let store = MockStore::default();
        let mut pipeline =
            CollectionPipeline::new(resolver, store.clone(), DataSource::Osv, &fx.records, &fx.dataset);

        let feed = StaticFeed::new(
            "test",
            vec![advisory(json!({
                "id": "MAL-3",
                "affected": [{"package": {"ecosystem": "npm", "name": "@evil/pkg"},
                              "ranges": [{"events": [{"introduced": "0"}]}]}]
            }))],
        );
        let summary = pipeline.run(&feed).await.unwrap();

        assert_eq!(
            store.fetched(),
            vec![
                "https://files.example.org/pkg-1.0.0.zip",
                "https://files.example.org/pkg-1.0.1.tgz"
            ]
        );
        assert_eq!(summary.artifacts_saved, 2);
        assert!(fx.dataset.join("npm/@evil##pkg/1.0.1/pkg-1.0.1.tgz").exists());
    }

    #[tokio::test]
    async fn test_slow_resolver_times_out_without_aborting_run() {
        let fx = fixture();
        let resolver = MockResolver {
            delay: Some(Duration::from_millis(200)),
            ..foo_resolver()
        };
        let store = MockStore::default();
        let mut pipeline =
            CollectionPipeline::new(resolver, store.clone(), DataSource::Osv, &fx.records, &fx.dataset)
                .with_timeout(Duration::from_millis(10));

        let summary = pipeline.run(&StaticFeed::new("test", vec![foo_advisory()])).await.unwrap();
        assert_eq!(summary.download_failures, 1);
        assert_eq!(summary.advisories_processed, 1);
        assert!(store.fetched().is_empty());
    }

    #[tokio::test]
    async fn test_unresolvable_and_nameless_entries() {
        let fx = fixture();
        let store = MockStore::default();
        let mut pipeline =
            CollectionPipeline::new(foo_resolver(), store.clone(), DataSource::Osv, &fx.records, &fx.dataset);

        let feed = StaticFeed::new(
            "test",
            vec![
                advisory(json!({"id": "X-1", "affected": [{"package": {"ecosystem": "crates.io", "name": "a"}}]})),
                advisory(json!({"id": "MAL-4", "affected": [
                    {"package": {"ecosystem": "PyPI", "name": ""}},
                    {"package": {"ecosystem": "Hackage", "name": "b"}}
                ]})),
            ],
        );
        let summary = pipeline.run(&feed).await.unwrap();

        assert_eq!(summary.advisories_unresolved, 1);
        assert_eq!(summary.advisories_processed, 1);
        assert_eq!(summary.packages_recorded, 0);
        assert!(pipeline.processed().contains(Ecosystem::Pip, "MAL-4"));
        assert!(!pipeline.processed().contains(Ecosystem::Pip, "X-1"));
    }

    #[tokio::test]
    async fn test_duplicate_package_within_run_is_recorded_once() {
        let fx = fixture();
        let store = MockStore::default();
        let mut pipeline =
            CollectionPipeline::new(foo_resolver(), store.clone(), DataSource::Osv, &fx.records, &fx.dataset);

        let mut again = foo_advisory();
        again.advisory_id = "MAL-2025-009".to_string();
        let summary = pipeline
            .run(&StaticFeed::new("test", vec![foo_advisory(), again]))
            .await
            .unwrap();

        assert_eq!(store.fetched().len(), 1);
        assert_eq!(summary.packages_already_collected, 1);
        assert!(pipeline.collected().contains(Ecosystem::Pip, "foo"));
        assert!(pipeline.processed().contains(Ecosystem::Pip, "MAL-2025-009"));
    }

    #[tokio::test]
    async fn test_snyk_source_writes_snyk_ledger_and_id() {
        let fx = fixture();
        let resolver = MockResolver::default().with("evil", &[("0.1.0", "evil-0.1.0.tar.gz")]);
        let mut pipeline =
            CollectionPipeline::new(resolver, MockStore::default(), DataSource::Snyk, &fx.records, &fx.dataset);

        let feed = StaticFeed::new(
            "snyk-export",
            vec![advisory(json!({
                "id": "SNYK-PYTHON-EVIL-1234567",
                "affected": [{"package": {"ecosystem": "PyPI", "name": "evil"}, "versions": ["0.1.0"]}]
            }))],
        );
        pipeline.run(&feed).await.unwrap();

        assert!(read_ledger(&fx.records, DataSource::Osv, Ecosystem::Pip).is_none());
        let ledger = read_ledger(&fx.records, DataSource::Snyk, Ecosystem::Pip).unwrap();
        assert_eq!(ledger.packages["evil"]["snyk_id"], "SNYK-PYTHON-EVIL-1234567");
        assert_eq!(ledger.packages["evil"]["osv_id"], "");
        assert!(processed_path(&fx.records, DataSource::Snyk).exists());
    }

    #[tokio::test]
    async fn test_interrupted_advisory_is_redone_without_refetch() {
        let fx = fixture();
        let feed = StaticFeed::new("test", vec![foo_advisory()]);

        // a directory in place of the processed-ID file makes the write fail
        let processed_file = processed_path(&fx.records, DataSource::Osv);
        fs::create_dir_all(&processed_file).unwrap();

        let first_store = MockStore::default();
        let mut first =
            CollectionPipeline::new(foo_resolver(), first_store.clone(), DataSource::Osv, &fx.records, &fx.dataset);
        let err = first.run(&feed).await.unwrap_err();
        assert!(matches!(err, PipelineError::ProcessedIndex(_)));
        assert_eq!(first_store.fetched().len(), 1);
        assert!(read_ledger(&fx.records, DataSource::Osv, Ecosystem::Pip).is_some());

        fs::remove_dir(&processed_file).unwrap();
        assert!(!ProcessedAdvisoryIndex::load(&fx.records, DataSource::Osv)
            .contains(Ecosystem::Pip, "MAL-2025-001"));

        let second_store = MockStore::default();
        let mut second =
            CollectionPipeline::new(foo_resolver(), second_store.clone(), DataSource::Osv, &fx.records, &fx.dataset);
        let summary = second.run(&feed).await.unwrap();

        assert_eq!(summary.advisories_skipped, 0);
        assert_eq!(summary.advisories_processed, 1);
        assert_eq!(summary.packages_already_collected, 1);
        assert!(second_store.fetched().is_empty());
        assert!(ProcessedAdvisoryIndex::load(&fx.records, DataSource::Osv)
            .contains(Ecosystem::Pip, "MAL-2025-001"));
    }

    #[tokio::test]
    async fn test_ledger_write_failure_stops_run_unmarked() {
        let fx = fixture();
        fs::create_dir_all(ledger_path(&fx.records, DataSource::Osv, Ecosystem::Pip)).unwrap();

        let mut pipeline =
            CollectionPipeline::new(foo_resolver(), MockStore::default(), DataSource::Osv, &fx.records, &fx.dataset);
        let err = pipeline
            .run(&StaticFeed::new("test", vec![foo_advisory()]))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Ledger(_)));
        assert!(!pipeline.processed().contains(Ecosystem::Pip, "MAL-2025-001"));
        assert!(!processed_path(&fx.records, DataSource::Osv).exists());
    }

    #[test]
    fn test_safe_child_rejects_path_traversal() {
        let root = PathBuf::from("/tmp/dataset/pip");

        assert!(safe_child(&root, Path::new("../../etc/passwd")).is_err());
        assert!(safe_child(&root, Path::new("/etc/passwd")).is_err());
        assert!(safe_child(&root, Path::new("")).is_err());
        assert_eq!(
            safe_child(&root, Path::new("foo/1.0/foo-1.0.tar.gz")).unwrap(),
            root.join("foo/1.0/foo-1.0.tar.gz")
        );
    }

    #[test]
    fn test_group_by_version_filters_and_orders() {
        let artifacts = vec![
            ArtifactDescriptor::new("https://x/a-2.0.tar.gz", Some("2.0".to_string())),
            ArtifactDescriptor::new("https://x/a-1.0.whl", Some("1.0".to_string())),
            ArtifactDescriptor::new("https://x/a-1.0.tar.gz", Some("1.0".to_string())),
            ArtifactDescriptor::new("https://x/a.zip", None),
        ];
        let groups = group_by_version(artifacts, &["1.0".to_string()]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.as_deref(), Some("1.0"));
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, None);
    }
}
