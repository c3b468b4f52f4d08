//! PyPI JSON API resolver.
//!
//! `GET {base}/{name}/json` lists every release with its files. Packages taken
//! down for malware usually answer 404, which is reported as an error so the
//! reason lands in the logs.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::model::{ArtifactDescriptor, Ecosystem};
use crate::traits::{ResolveError, VersionResolver};

pub const DEFAULT_PYPI_URL: &str = "https://pypi.org/pypi";

pub struct PyPiResolver {
    client: Arc<Client>,
    base_url: String,
}

impl PyPiResolver {
    pub fn with_client(client: Arc<Client>) -> Self {
        Self::with_base_url(client, DEFAULT_PYPI_URL)
    }

    pub fn with_base_url(client: Arc<Client>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PyPiResponse {
    #[serde(default)]
    releases: BTreeMap<String, Vec<ReleaseFile>>,
}

#[derive(Debug, Deserialize)]
struct ReleaseFile {
    filename: String,
    url: String,
}

#[async_trait]
impl VersionResolver for PyPiResolver {
    async fn list_artifacts(
        &self,
        package_name: &str,
        _ecosystem: Ecosystem,
    ) -> Result<Vec<ArtifactDescriptor>, ResolveError> {
        let url = format!("{}/{}/json", self.base_url, package_name);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ResolveError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let body: PyPiResponse = response
            .json()
            .await
            .map_err(|e| ResolveError::InvalidResponse(e.to_string()))?;

        let artifacts: Vec<ArtifactDescriptor> = body
            .releases
            .into_iter()
            .flat_map(|(version, files)| {
                files.into_iter().map(move |file| {
                    ArtifactDescriptor::with_filename(file.url, file.filename, Some(version.clone()))
                })
            })
            .collect();

        debug!(package = %package_name, artifacts = artifacts.len(), "Resolved PyPI artifacts");
        Ok(artifacts)
    }
}
