//! Registry-backed [`VersionResolver`] and [`ArtifactStore`] implementations.
//!
//! All clients share one `reqwest::Client` so connections and TLS sessions are
//! reused across registries.

pub mod npm;
pub mod pypi;
pub mod store;

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::model::{ArtifactDescriptor, Ecosystem};
use crate::traits::{ResolveError, VersionResolver};

pub use npm::NpmResolver;
pub use pypi::PyPiResolver;
pub use store::HttpArtifactStore;

const USER_AGENT: &str = concat!("malpkg-harvester/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn create_shared_client(request_timeout: Duration) -> Result<Arc<Client>, reqwest::Error> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(request_timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()?;
    Ok(Arc::new(client))
}

/// Dispatches to the resolver for each supported ecosystem.
pub struct RegistryResolver {
    pypi: PyPiResolver,
    npm: NpmResolver,
}

impl RegistryResolver {
    pub fn new(pypi: PyPiResolver, npm: NpmResolver) -> Self {
        Self { pypi, npm }
    }
}

#[async_trait]
impl VersionResolver for RegistryResolver {
    async fn list_artifacts(
        &self,
        package_name: &str,
        ecosystem: Ecosystem,
    ) -> Result<Vec<ArtifactDescriptor>, ResolveError> {
        match ecosystem {
            Ecosystem::Pip => self.pypi.list_artifacts(package_name, ecosystem).await,
            Ecosystem::Npm => self.npm.list_artifacts(package_name, ecosystem).await,
            other => Err(ResolveError::UnsupportedEcosystem(other)),
        }
    }
}
