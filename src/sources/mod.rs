//! Advisory feeds.
//!
//! - [`osv::OsvDirectoryFeed`] - local checkout of the OSV malicious-packages repository
//! - [`StaticFeed`] - records produced elsewhere (e.g. a Snyk export) replayed in memory

pub mod osv;

use crate::model::AdvisoryRecord;
use crate::traits::{AdvisoryFeed, FeedError};

pub use osv::OsvDirectoryFeed;

/// Feed over an in-memory list of advisories.
#[derive(Debug, Clone, Default)]
pub struct StaticFeed {
    name: String,
    records: Vec<AdvisoryRecord>,
}

impl StaticFeed {
    pub fn new(name: impl Into<String>, records: Vec<AdvisoryRecord>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }
}

impl AdvisoryFeed for StaticFeed {
    fn feed_name(&self) -> &str {
        &self.name
    }

    fn entries(&self) -> Result<Box<dyn Iterator<Item = AdvisoryRecord> + Send + '_>, FeedError> {
        Ok(Box::new(self.records.iter().cloned()))
    }
}
