use crate::model::{AdvisoryRecord, ArtifactDescriptor, Ecosystem};
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Feed root not found: {0}")]
    MissingRoot(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("No resolver for ecosystem '{0}'")]
    UnsupportedEcosystem(Ecosystem),
    #[error("Registry returned {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("Malformed registry response: {0}")]
    InvalidResponse(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Produces advisories lazily, in a stable order.
pub trait AdvisoryFeed: Send + Sync {
    /// Short name for logging (e.g., "osv-directory").
    fn feed_name(&self) -> &str;

    fn entries(&self) -> Result<Box<dyn Iterator<Item = AdvisoryRecord> + Send + '_>, FeedError>;
}

#[async_trait]
pub trait VersionResolver: Send + Sync {
    /// Lists every downloadable file the registry knows for `package_name`.
    async fn list_artifacts(
        &self,
        package_name: &str,
        ecosystem: Ecosystem,
    ) -> Result<Vec<ArtifactDescriptor>, ResolveError>;
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Fetches `descriptor` and writes it to `destination`.
    ///
    /// `Ok(false)` means the upstream refused the download (non-success status).
    async fn fetch_and_save(
        &self,
        descriptor: &ArtifactDescriptor,
        destination: &Path,
    ) -> Result<bool, StoreError>;
}
