use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::CatsearchError;

pub const CONFIG_FILE_NAME: &str = "catsearch.json";

pub const DEFAULT_SPECIES_URL: &str = "https://cdms.astro.uni-koeln.de/cdms/portal/json_list/species/";
pub const DEFAULT_CDMS_ENTRIES_URL: &str = "https://cdms.astro.uni-koeln.de/classic/entries/";
pub const DEFAULT_JPL_ENTRIES_URL: &str = "https://spec.jpl.nasa.gov/ftp/pub/catalog/";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub downloader: DownloaderSection,
    #[serde(default)]
    pub search: SearchSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DownloaderSection {
    #[serde(default)]
    pub species_url: Option<String>,
    #[serde(default)]
    pub cdms_entries_url: Option<String>,
    #[serde(default)]
    pub jpl_entries_url: Option<String>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub skipped_entries: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SearchSection {
    #[serde(default)]
    pub timeout_secs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloaderConfig {
    pub species_url: String,
    pub cdms_entries_url: String,
    pub jpl_entries_url: String,
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub skipped_entries: Vec<String>,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            species_url: DEFAULT_SPECIES_URL.to_string(),
            cdms_entries_url: DEFAULT_CDMS_ENTRIES_URL.to_string(),
            jpl_entries_url: DEFAULT_JPL_ENTRIES_URL.to_string(),
            concurrency: 8,
            request_timeout: Duration::from_secs(60),
            skipped_entries: default_skipped_entries(),
        }
    }
}

impl DownloaderConfig {
    /// Where the line list of a species lives, or `None` for entries that are
    /// published merged into another one.
    pub fn entry_url(&self, species_tag: i64) -> Option<String> {
        let filename = format!("c{species_tag:06}.cat");
        if self.skipped_entries.iter().any(|skipped| *skipped == filename) {
            return None;
        }
        let base = if species_tag % 1000 > 500 {
            &self.cdms_entries_url
        } else {
            &self.jpl_entries_url
        };
        Some(format!("{base}{filename}"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub downloader: DownloaderConfig,
    pub search_timeout: Option<Duration>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ConfigLoader::resolve_config(Config::default())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Read an explicit config file, or the first of `./catsearch.json` and
    /// `<config dir>/catsearch/catsearch.json` that exists. Built-in defaults
    /// apply when neither does.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CatsearchError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => match Self::default_locations().into_iter().find(|path| path.exists()) {
                Some(path) => path,
                None => return Ok(ResolvedConfig::default()),
            },
        };
        tracing::debug!("reading config {}", config_path.display());

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CatsearchError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CatsearchError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dirs) = BaseDirs::new() {
            locations.push(dirs.config_dir().join("catsearch").join(CONFIG_FILE_NAME));
        }
        locations
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        let defaults = DownloaderConfig::default();
        let section = config.downloader;
        let downloader = DownloaderConfig {
            species_url: section.species_url.unwrap_or(defaults.species_url),
            cdms_entries_url: section
                .cdms_entries_url
                .map(with_trailing_slash)
                .unwrap_or(defaults.cdms_entries_url),
            jpl_entries_url: section
                .jpl_entries_url
                .map(with_trailing_slash)
                .unwrap_or(defaults.jpl_entries_url),
            concurrency: section.concurrency.unwrap_or(defaults.concurrency).max(1),
            request_timeout: section
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            skipped_entries: section.skipped_entries.unwrap_or(defaults.skipped_entries),
        };

        let search_timeout = config
            .search
            .timeout_secs
            .and_then(timeout_from_secs);

        ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            downloader,
            search_timeout,
        }
    }
}

/// A timeout in seconds; non-positive, NaN and unrepresentably large values
/// mean no timeout.
pub fn timeout_from_secs(secs: f64) -> Option<Duration> {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

pub fn default_skipped_entries() -> Vec<String> {
    vec!["c044009.cat".to_string(), "c044012.cat".to_string()]
}

fn with_trailing_slash(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}
