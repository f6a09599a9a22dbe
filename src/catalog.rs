use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::codec;
use crate::domain::{CatalogEntry, CatalogSourceInfo, FrequencyRange};
use crate::error::CatsearchError;
use crate::filter::{FilterCriteria, FilterEngine};
use crate::store::CatalogStore;

/// A searchable catalog assembled from one or more saved files.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    store: CatalogStore,
    sources: Vec<CatalogSourceInfo>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every readable source. A missing, malformed or unrecognised file
    /// is logged and left out; the others still load.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Self {
        let mut catalog = Self::new();
        for path in paths {
            let path = path.as_ref();
            match codec::load(path) {
                Ok(loaded) => {
                    tracing::debug!(
                        "loaded {} entries from {}",
                        loaded.entries.len(),
                        path.display()
                    );
                    catalog.store.append(loaded.entries, loaded.frequency_range);
                    catalog.sources.push(CatalogSourceInfo {
                        filename: path.to_path_buf(),
                        build_datetime: loaded.build_time,
                    });
                }
                Err(err) => tracing::warn!("skipping catalog {}: {err}", path.display()),
            }
        }
        catalog
    }

    /// Wrap entries that did not come from a file, such as a fresh download.
    pub fn from_entries(entries: Vec<CatalogEntry>, frequency_range: FrequencyRange) -> Self {
        let mut store = CatalogStore::new();
        store.append(entries, frequency_range);
        Self {
            store,
            sources: Vec::new(),
        }
    }

    pub fn filter(&self, criteria: &FilterCriteria) -> Vec<CatalogEntry> {
        FilterEngine::new(&self.store).filter(criteria)
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn entries_count(&self) -> usize {
        self.store.len()
    }

    pub fn catalog(&self) -> &[CatalogEntry] {
        self.store.entries()
    }

    pub fn frequency_limits(&self) -> &[FrequencyRange] {
        self.store.frequency_ranges()
    }

    pub fn min_frequency(&self) -> f64 {
        self.store.min_frequency()
    }

    pub fn max_frequency(&self) -> f64 {
        self.store.max_frequency()
    }

    pub fn sources(&self) -> Vec<PathBuf> {
        self.sources
            .iter()
            .map(|source| source.filename.clone())
            .collect()
    }

    pub fn sources_info(&self) -> &[CatalogSourceInfo] {
        &self.sources
    }

    /// Persist entries; the codec follows the file name suffix.
    pub fn save(
        path: &Path,
        entries: &[CatalogEntry],
        frequency_range: FrequencyRange,
        build_time: Option<DateTime<Utc>>,
    ) -> Result<(), CatsearchError> {
        codec::save(path, entries, frequency_range, build_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Line;

    fn entry(tag: i64, frequencies: &[f64]) -> CatalogEntry {
        let mut entry = CatalogEntry::new(tag);
        entry.lines = frequencies
            .iter()
            .map(|frequency| Line::new(*frequency, -4.0, 5.0))
            .collect();
        entry
    }

    #[test]
    fn empty_catalog_limits() {
        let catalog = Catalog::new();
        assert!(catalog.is_empty());
        assert_eq!(catalog.min_frequency(), 0.0);
        assert_eq!(catalog.max_frequency(), f64::INFINITY);
        assert!(catalog.filter(&FilterCriteria::default()).is_empty());
    }

    #[test]
    fn load_skips_missing_sources() {
        let temp = tempfile::tempdir().unwrap();
        let good = temp.path().join("good.json");
        Catalog::save(
            &good,
            &[entry(28503, &[115271.2])],
            FrequencyRange::new(0.0, 200000.0),
            None,
        )
        .unwrap();

        let missing = temp.path().join("missing.json.gz");
        let catalog = Catalog::load(&[missing, good.clone()]);
        assert_eq!(catalog.entries_count(), 1);
        assert_eq!(catalog.sources(), vec![good]);
        assert!(catalog.sources_info()[0].build_datetime.is_some());
    }

    #[test]
    fn from_entries_is_searchable() {
        let catalog = Catalog::from_entries(
            vec![entry(2, &[10.0, 20.0]), entry(1, &[15.0])],
            FrequencyRange::new(0.0, 30.0),
        );
        assert_eq!(catalog.entries_count(), 2);
        assert!(catalog.sources().is_empty());
        let found = catalog.filter(&FilterCriteria::frequency(12.0, 18.0));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].species_tag, 1);
    }
}
