use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Timestamp layout shared by ledgers and package records.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn now_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Pip,
    Npm,
    Nuget,
    Maven,
    Go,
    Rubygems,
}

impl Ecosystem {
    pub const ALL: [Ecosystem; 6] = [
        Ecosystem::Pip,
        Ecosystem::Npm,
        Ecosystem::Nuget,
        Ecosystem::Maven,
        Ecosystem::Go,
        Ecosystem::Rubygems,
    ];

    /// Manager key used in ledger file names and the processed-ID map.
    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Pip => "pip",
            Ecosystem::Npm => "npm",
            Ecosystem::Nuget => "nuget",
            Ecosystem::Maven => "maven",
            Ecosystem::Go => "go",
            Ecosystem::Rubygems => "rubygems",
        }
    }

    /// Directory name under `osv/malicious/` in the OSV repository.
    pub fn osv_dir(&self) -> &'static str {
        match self {
            Ecosystem::Pip => "pypi",
            other => other.as_str(),
        }
    }

    /// Maps an OSV `package.ecosystem` value (or a manager alias) to an ecosystem.
    pub fn from_osv(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pypi" | "pip" | "python" => Some(Ecosystem::Pip),
            "npm" => Some(Ecosystem::Npm),
            "nuget" | "dotnet" => Some(Ecosystem::Nuget),
            "maven" | "java" => Some(Ecosystem::Maven),
            "go" | "golang" => Some(Ecosystem::Go),
            "rubygems" | "gem" | "ruby" => Some(Ecosystem::Rubygems),
            _ => None,
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ecosystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ecosystem::from_osv(s).ok_or_else(|| format!("unknown ecosystem '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Osv,
    Snyk,
}

impl DataSource {
    pub const ALL: [DataSource; 2] = [DataSource::Osv, DataSource::Snyk];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Osv => "osv",
            DataSource::Snyk => "snyk",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One known malicious package as stored in a ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageRecord {
    pub package_name: String,
    pub collection_time: String,
    pub affected_version: String,
    pub all_versions: Vec<String>,
    pub security_score: String,
    pub cve: String,
    pub cwe: String,
    pub fix_method: String,
    pub overview: String,
    pub update_date: String,
    pub package_type: String,
    pub data_source_link: String,
    pub reference_links: Vec<String>,
    pub snyk_id: String,
    pub osv_id: String,
    pub published: String,
    pub disclosed: String,
    pub credit: String,
    pub download_info: DownloadInfo,
}

impl PackageRecord {
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            ..Default::default()
        }
    }

    /// Stamps the collection and download times after a confirmed artifact write.
    pub fn mark_downloaded(&mut self, download_path: impl Into<String>) {
        let now = now_timestamp();
        self.collection_time = now.clone();
        self.download_info = DownloadInfo {
            download_time: now,
            download_path: download_path.into(),
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadInfo {
    pub download_time: String,
    pub download_path: String,
}

/// Priority class of a distribution file, by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileExtensionClass {
    #[serde(rename = "tar.gz")]
    TarGz,
    Zip,
    Wheel,
    Other,
}

impl FileExtensionClass {
    pub fn from_filename(filename: &str) -> Self {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") {
            FileExtensionClass::TarGz
        } else if lower.ends_with(".zip") {
            FileExtensionClass::Zip
        } else if lower.ends_with(".whl") {
            FileExtensionClass::Wheel
        } else {
            FileExtensionClass::Other
        }
    }

    /// Lower ranks are preferred.
    pub fn rank(&self) -> u8 {
        match self {
            FileExtensionClass::TarGz => 0,
            FileExtensionClass::Zip => 1,
            FileExtensionClass::Wheel => 2,
            FileExtensionClass::Other => 3,
        }
    }
}

/// A single downloadable file candidate for a package version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub url: String,
    pub filename: String,
    pub version: Option<String>,
    pub file_extension_class: FileExtensionClass,
}

impl ArtifactDescriptor {
    pub fn new(url: impl Into<String>, version: Option<String>) -> Self {
        let url = url.into();
        let filename = url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self::with_filename(url, filename, version)
    }

    pub fn with_filename(
        url: impl Into<String>,
        filename: impl Into<String>,
        version: Option<String>,
    ) -> Self {
        let filename = filename.into();
        Self {
            url: url.into(),
            file_extension_class: FileExtensionClass::from_filename(&filename),
            filename,
            version,
        }
    }
}

/// One advisory as read from a feed. Never mutated by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryRecord {
    pub advisory_id: String,
    pub summary: String,
    pub details: String,
    pub published: String,
    pub modified: String,
    pub aliases: Vec<String>,
    pub affected: Vec<AffectedPackage>,
    pub references: Vec<String>,
    pub credits: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AffectedPackage {
    pub package_name: String,
    pub ecosystem: String,
    pub purl: String,
    /// The raw OSV `affected[]` object (`versions`, `ranges`, `database_specific`).
    pub versions_raw: Value,
}

impl AffectedPackage {
    pub fn ecosystem(&self) -> Option<Ecosystem> {
        Ecosystem::from_osv(&self.ecosystem)
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn list_field<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

impl AdvisoryRecord {
    /// Builds a record from OSV JSON. Missing or mistyped keys become defaults;
    /// returns `None` only when `value` is not an object.
    pub fn from_osv_json(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }

        let affected = list_field(value, "affected")
            .filter(|entry| entry.is_object())
            .map(|entry| {
                let package = entry.get("package").cloned().unwrap_or(Value::Null);
                AffectedPackage {
                    package_name: str_field(&package, "name"),
                    ecosystem: str_field(&package, "ecosystem"),
                    purl: str_field(&package, "purl"),
                    versions_raw: entry.clone(),
                }
            })
            .collect();

        Some(Self {
            advisory_id: str_field(value, "id"),
            summary: str_field(value, "summary"),
            details: str_field(value, "details"),
            published: str_field(value, "published"),
            modified: str_field(value, "modified"),
            aliases: list_field(value, "aliases")
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            affected,
            references: list_field(value, "references")
                .filter_map(|r| r.get("url").and_then(Value::as_str))
                .map(str::to_string)
                .collect(),
            credits: list_field(value, "credits")
                .filter_map(|c| c.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect(),
        })
    }

    /// Manager the advisory is filed under: the first recognised affected ecosystem.
    pub fn primary_ecosystem(&self) -> Option<Ecosystem> {
        self.affected.iter().find_map(AffectedPackage::ecosystem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extension_class_from_filename() {
        assert_eq!(
            FileExtensionClass::from_filename("foo-1.0.TAR.GZ"),
            FileExtensionClass::TarGz
        );
        assert_eq!(
            FileExtensionClass::from_filename("foo-1.0-py3-none-any.whl"),
            FileExtensionClass::Wheel
        );
        assert_eq!(FileExtensionClass::from_filename("foo.zip"), FileExtensionClass::Zip);
        assert_eq!(FileExtensionClass::from_filename("foo-1.0.tgz"), FileExtensionClass::Other);
    }

    #[test]
    fn test_descriptor_filename_from_url() {
        let d = ArtifactDescriptor::new(
            "https://registry.npmjs.org/foo/-/foo-1.0.0.tgz?cache=1",
            Some("1.0.0".to_string()),
        );
        assert_eq!(d.filename, "foo-1.0.0.tgz");
        assert_eq!(d.file_extension_class, FileExtensionClass::Other);
    }

    #[test]
    fn test_ecosystem_aliases() {
        assert_eq!(Ecosystem::from_osv("PyPI"), Some(Ecosystem::Pip));
        assert_eq!(Ecosystem::from_osv("RubyGems"), Some(Ecosystem::Rubygems));
        assert_eq!(Ecosystem::from_osv("crates.io"), None);
        assert_eq!(Ecosystem::Pip.osv_dir(), "pypi");
        assert_eq!(Ecosystem::Npm.osv_dir(), "npm");
    }

    #[test]
    fn test_advisory_from_osv_json_tolerates_bad_fields() {
        let value = json!({
            "id": "MAL-2025-001",
            "summary": "Malicious code in foo (PyPI)",
            "aliases": ["GHSA-aaaa-bbbb-cccc", 7],
            "affected": [
                {"package": {"ecosystem": "PyPI", "name": "foo"}, "versions": ["1.2.3"]},
                "not an object"
            ],
            "references": [{"type": "WEB", "url": "https://example.com/foo"}, {"type": "WEB"}],
            "credits": "nobody",
        });

        let record = AdvisoryRecord::from_osv_json(&value).unwrap();
        assert_eq!(record.advisory_id, "MAL-2025-001");
        assert_eq!(record.aliases, vec!["GHSA-aaaa-bbbb-cccc"]);
        assert_eq!(record.affected.len(), 1);
        assert_eq!(record.affected[0].package_name, "foo");
        assert_eq!(record.references, vec!["https://example.com/foo"]);
        assert!(record.credits.is_empty());
        assert!(record.details.is_empty());
        assert_eq!(record.primary_ecosystem(), Some(Ecosystem::Pip));
    }

    #[test]
    fn test_advisory_from_non_object() {
        assert!(AdvisoryRecord::from_osv_json(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_package_record_defaults_on_sparse_json() {
        let record: PackageRecord =
            serde_json::from_value(json!({"package_name": "foo", "overview": "bad"})).unwrap();
        assert_eq!(record.package_name, "foo");
        assert!(record.all_versions.is_empty());
        assert!(record.download_info.download_path.is_empty());
    }
}
