//! Harvest module - resumable collection of malicious package artifacts.
//!
//! - **Selection**: [`selector::select`] picks one artifact per version
//! - **Versions**: [`versions::extract`] turns OSV `affected[]` data into version lists
//! - **Persistence**: [`CollectedPackageIndex`] ledgers and the [`ProcessedAdvisoryIndex`]
//! - **Pipeline**: async coordinator via [`pipeline::CollectionPipeline`]
//! - **Cleanup**: [`cleanup::prune_npm_placeholders`] for npm takedown stubs

pub mod cleanup;
pub mod ledger;
pub mod pipeline;
pub mod processed;
pub mod record;
pub mod selector;
pub mod versions;

// Re-export commonly used types
pub use cleanup::{prune_npm_placeholders, PruneReport};
pub use ledger::{CollectedPackageIndex, Ledger, LedgerError, LedgerMetadata};
pub use pipeline::{CollectionPipeline, DownloadOutcome, PipelineError, RunSummary};
pub use processed::ProcessedAdvisoryIndex;
pub use selector::SelectError;
