use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::model::Ecosystem;
use crate::registries::npm::{DEFAULT_MAX_VERSIONS, DEFAULT_NPM_REGISTRY};
use crate::registries::pypi::DEFAULT_PYPI_URL;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub records_dir: PathBuf,
    pub dataset_dir: PathBuf,
    /// Checkout of the OSV malicious-packages repository
    pub osv_repo: PathBuf,
    pub ecosystems: Vec<Ecosystem>,
    pub pypi_url: String,
    pub npm_mirrors: Vec<String>,
    /// `None` considers every npm version
    pub max_npm_versions: Option<usize>,
    pub request_timeout_secs: u64,
    pub stage_timeout_secs: u64,
    pub prune_npm_placeholders: bool,
    pub log_to_file: bool,
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            records_dir: PathBuf::from("records"),
            dataset_dir: PathBuf::from("dataset"),
            osv_repo: PathBuf::from("malicious-packages"),
            ecosystems: vec![Ecosystem::Pip, Ecosystem::Npm],
            pypi_url: DEFAULT_PYPI_URL.to_string(),
            npm_mirrors: vec![DEFAULT_NPM_REGISTRY.to_string()],
            max_npm_versions: Some(DEFAULT_MAX_VERSIONS),
            request_timeout_secs: 60,
            stage_timeout_secs: 300,
            prune_npm_placeholders: true,
            log_to_file: false,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Config {
    /// Reads `HARVESTER_*` variables, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset or blank keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        if let Some(v) = get("HARVESTER_RECORDS_DIR") {
            config.records_dir = PathBuf::from(v);
        }
        if let Some(v) = get("HARVESTER_DATASET_DIR") {
            config.dataset_dir = PathBuf::from(v);
        }
        if let Some(v) = get("HARVESTER_OSV_REPO") {
            config.osv_repo = PathBuf::from(v);
        }
        if let Some(v) = get("HARVESTER_ECOSYSTEMS") {
            config.ecosystems = split_list(&v)
                .map(|name| {
                    Ecosystem::from_str(name).map_err(|reason| ConfigError::Invalid {
                        key: "HARVESTER_ECOSYSTEMS",
                        value: v.clone(),
                        reason,
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        if let Some(v) = get("HARVESTER_PYPI_URL") {
            config.pypi_url = v;
        }
        if let Some(v) = get("HARVESTER_NPM_MIRRORS") {
            config.npm_mirrors = split_list(&v).map(str::to_string).collect();
        }
        if let Some(v) = get("HARVESTER_MAX_NPM_VERSIONS") {
            // 0 lifts the cap
            let max: usize = parse("HARVESTER_MAX_NPM_VERSIONS", &v)?;
            config.max_npm_versions = (max > 0).then_some(max);
        }
        if let Some(v) = get("HARVESTER_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse("HARVESTER_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("HARVESTER_STAGE_TIMEOUT_SECS") {
            config.stage_timeout_secs = parse("HARVESTER_STAGE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("HARVESTER_PRUNE_NPM_PLACEHOLDERS") {
            config.prune_npm_placeholders = parse_bool("HARVESTER_PRUNE_NPM_PLACEHOLDERS", &v)?;
        }
        if let Some(v) = get("HARVESTER_LOG_TO_FILE") {
            config.log_to_file = parse_bool("HARVESTER_LOG_TO_FILE", &v)?;
        }
        if let Some(v) = get("HARVESTER_LOG_DIR") {
            config.log_dir = PathBuf::from(v);
        }

        Ok(config)
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
