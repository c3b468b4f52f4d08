use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use malpkg_harvester::harvest::{prune_npm_placeholders, CollectionPipeline};
use malpkg_harvester::logging::init_logging;
use malpkg_harvester::registries::{
    create_shared_client, HttpArtifactStore, NpmResolver, PyPiResolver, RegistryResolver,
};
use malpkg_harvester::sources::OsvDirectoryFeed;
use malpkg_harvester::{Config, DataSource, Ecosystem};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    let _guard = init_logging(&config);

    info!(
        osv_repo = %config.osv_repo.display(),
        records = %config.records_dir.display(),
        dataset = %config.dataset_dir.display(),
        ecosystems = ?config.ecosystems,
        "Starting malicious package harvest"
    );

    let client = create_shared_client(Duration::from_secs(config.request_timeout_secs))
        .context("failed to build HTTP client")?;
    let resolver = RegistryResolver::new(
        PyPiResolver::with_base_url(Arc::clone(&client), config.pypi_url.clone()),
        NpmResolver::with_mirrors(Arc::clone(&client), config.npm_mirrors.clone())
            .with_max_versions(config.max_npm_versions),
    );
    let store = HttpArtifactStore::with_client(client);

    let feed = OsvDirectoryFeed::new(&config.osv_repo, config.ecosystems.clone());
    let mut pipeline = CollectionPipeline::new(
        resolver,
        store,
        DataSource::Osv,
        &config.records_dir,
        &config.dataset_dir,
    )
    .with_timeout(Duration::from_secs(config.stage_timeout_secs));

    let summary = pipeline.run(&feed).await.context("collection run failed")?;

    if config.prune_npm_placeholders && config.ecosystems.contains(&Ecosystem::Npm) {
        let npm_root = config.dataset_dir.join(Ecosystem::Npm.as_str());
        let report = prune_npm_placeholders(&npm_root)
            .with_context(|| format!("failed to prune {}", npm_root.display()))?;
        info!(
            packages_removed = report.packages_removed,
            versions_removed = report.versions_removed,
            "Pruned npm placeholders"
        );
    }

    info!(
        advisories = summary.advisories_seen,
        recorded = summary.packages_recorded,
        downloaded = summary.packages_downloaded,
        artifacts = summary.artifacts_saved,
        failures = summary.download_failures,
        duration_ms = summary.total_duration_ms,
        "Harvest finished"
    );
    Ok(())
}
