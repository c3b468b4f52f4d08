use async_trait::async_trait;
use reqwest::Client;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::model::ArtifactDescriptor;
use crate::traits::{ArtifactStore, StoreError};

/// Downloads artifacts over HTTP and writes them to disk.
///
/// Bytes land in `<destination>.part` first and are renamed once complete, so
/// an interrupted download never leaves a truncated archive behind. An
/// existing destination counts as already saved.
pub struct HttpArtifactStore {
    client: Arc<Client>,
}

impl HttpArtifactStore {
    pub fn with_client(client: Arc<Client>) -> Self {
        Self { client }
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn fetch_and_save(
        &self,
        descriptor: &ArtifactDescriptor,
        destination: &Path,
    ) -> Result<bool, StoreError> {
        if tokio::fs::try_exists(destination).await? {
            debug!(path = %destination.display(), "Artifact already present");
            return Ok(true);
        }

        let response = self.client.get(&descriptor.url).send().await?;
        if !response.status().is_success() {
            warn!(url = %descriptor.url, status = %response.status(), "Artifact download refused");
            return Ok(false);
        }
        let bytes = response.bytes().await?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(destination);
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, destination).await?;

        info!(url = %descriptor.url, path = %destination.display(), size_bytes = bytes.len(), "Artifact saved");
        Ok(true)
    }
}
