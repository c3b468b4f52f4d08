//! npm registry resolver.
//!
//! Mirrors are tried in order; the first one that returns a packument with at
//! least one tarball wins. Only the first `max_versions` entries of the
//! packument's `versions` object are considered, in registry order.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::model::{ArtifactDescriptor, Ecosystem};
use crate::traits::{ResolveError, VersionResolver};

pub const DEFAULT_NPM_REGISTRY: &str = "https://registry.npmjs.org";
pub const DEFAULT_MAX_VERSIONS: usize = 10;

pub struct NpmResolver {
    client: Arc<Client>,
    mirrors: Vec<String>,
    max_versions: Option<usize>,
}

impl NpmResolver {
    pub fn with_client(client: Arc<Client>) -> Self {
        Self::with_mirrors(client, vec![DEFAULT_NPM_REGISTRY.to_string()])
    }

    pub fn with_mirrors(client: Arc<Client>, mirrors: Vec<String>) -> Self {
        Self {
            client,
            mirrors: mirrors
                .into_iter()
                .map(|m| m.trim_end_matches('/').to_string())
                .collect(),
            max_versions: Some(DEFAULT_MAX_VERSIONS),
        }
    }

    /// `None` considers every published version.
    pub fn with_max_versions(mut self, max_versions: Option<usize>) -> Self {
        self.max_versions = max_versions;
        self
    }

    async fn fetch_from(
        &self,
        mirror: &str,
        package_name: &str,
    ) -> Result<Vec<ArtifactDescriptor>, ResolveError> {
        let url = format!("{}/{}", mirror, package_name.replace('/', "%2F"));
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ResolveError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let packument: Packument = response
            .json()
            .await
            .map_err(|e| ResolveError::InvalidResponse(e.to_string()))?;

        let limit = self.max_versions.unwrap_or(usize::MAX);
        Ok(packument
            .versions
            .0
            .into_iter()
            .take(limit)
            .filter_map(|(key, details)| {
                let tarball = details.dist.and_then(|d| d.tarball)?;
                Some(ArtifactDescriptor::new(tarball, Some(details.version.unwrap_or(key))))
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct Packument {
    #[serde(default)]
    versions: OrderedVersions,
}

#[derive(Debug, Deserialize)]
struct VersionDetails {
    version: Option<String>,
    dist: Option<Dist>,
}

#[derive(Debug, Deserialize)]
struct Dist {
    tarball: Option<String>,
}

/// `versions` entries in document order.
#[derive(Debug, Default)]
struct OrderedVersions(Vec<(String, VersionDetails)>);

impl<'de> Deserialize<'de> for OrderedVersions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = OrderedVersions;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of version to version details")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, VersionDetails>()? {
                    entries.push(entry);
                }
                Ok(OrderedVersions(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

#[async_trait]
impl VersionResolver for NpmResolver {
    async fn list_artifacts(
        &self,
        package_name: &str,
        _ecosystem: Ecosystem,
    ) -> Result<Vec<ArtifactDescriptor>, ResolveError> {
        let mut last_error = None;

        for mirror in &self.mirrors {
            match self.fetch_from(mirror, package_name).await {
                Ok(artifacts) if !artifacts.is_empty() => {
                    debug!(package = %package_name, mirror = %mirror, artifacts = artifacts.len(), "Resolved npm artifacts");
                    return Ok(artifacts);
                }
                Ok(_) => debug!(package = %package_name, mirror = %mirror, "Mirror lists no tarballs"),
                Err(e) => {
                    warn!(package = %package_name, mirror = %mirror, error = %e, "Mirror lookup failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(Vec::new()),
        }
    }
}
