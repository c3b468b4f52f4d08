use serde_json::Value;

use crate::model::{AdvisoryRecord, AffectedPackage, DataSource, PackageRecord};

pub const MALICIOUS_PACKAGE_TYPE: &str = "malicious";

/// Builds the ledger record for one affected package of an advisory.
///
/// The advisory ID lands in `osv_id` or `snyk_id` depending on `source`. For
/// OSV advisories `snyk_id` carries the GHSA alias instead. Download fields
/// are left empty; the pipeline fills them after a confirmed write.
pub fn from_advisory(
    source: DataSource,
    advisory: &AdvisoryRecord,
    affected: &AffectedPackage,
    versions: Vec<String>,
) -> PackageRecord {
    let cwes: Vec<&str> = affected
        .versions_raw
        .get("database_specific")
        .and_then(|db| db.get("cwes"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|cwe| cwe.get("cweId").and_then(Value::as_str))
        .filter(|id| !id.is_empty())
        .collect();

    let alias = |prefix: &str| {
        advisory
            .aliases
            .iter()
            .find(|a| a.starts_with(prefix))
            .cloned()
            .unwrap_or_default()
    };

    let (osv_id, snyk_id) = match source {
        DataSource::Osv => (advisory.advisory_id.clone(), alias("GHSA-")),
        DataSource::Snyk => (String::new(), advisory.advisory_id.clone()),
    };

    let overview = if advisory.details.is_empty() {
        advisory.summary.clone()
    } else {
        advisory.details.clone()
    };

    PackageRecord {
        package_name: affected.package_name.clone(),
        affected_version: versions.first().cloned().unwrap_or_default(),
        all_versions: versions,
        cve: alias("CVE-"),
        cwe: cwes.join(", "),
        overview,
        update_date: advisory.modified.clone(),
        package_type: MALICIOUS_PACKAGE_TYPE.to_string(),
        data_source_link: advisory.references.first().cloned().unwrap_or_default(),
        reference_links: advisory.references.clone(),
        snyk_id,
        osv_id,
        published: advisory.published.clone(),
        credit: advisory.credits.first().cloned().unwrap_or_default(),
        ..PackageRecord::default()
    }
}
