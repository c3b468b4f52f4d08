//! Artifact selection among several files published for one version.
//!
//! Registries often ship a source tarball, a wheel and a legacy zip for the
//! same release. Only one of them is mirrored.

use crate::model::ArtifactDescriptor;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectError {
    /// The caller passed no candidates.
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Returns the candidate with the lowest extension rank
/// (tar.gz < zip < wheel < other). The first one seen wins among equal ranks.
///
/// # Errors
///
/// Returns [`SelectError::InvalidArgument`] when `candidates` is empty.
pub fn select(candidates: &[ArtifactDescriptor]) -> Result<&ArtifactDescriptor, SelectError> {
    candidates
        .iter()
        .min_by_key(|candidate| candidate.file_extension_class.rank())
        .ok_or(SelectError::InvalidArgument("no artifact candidates"))
}
