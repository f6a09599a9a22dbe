use crate::domain::{CatalogEntry, FrequencyRange, Line};
use crate::sorted::{merge_sorted, sort_unique};

/// In-memory catalog: entries sorted by species tag, each with sorted lines,
/// plus the pairwise disjoint frequency ranges the data covers.
#[derive(Debug, Clone, Default)]
pub struct CatalogStore {
    entries: Vec<CatalogEntry>,
    frequency_ranges: Vec<FrequencyRange>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn frequency_ranges(&self) -> &[FrequencyRange] {
        &self.frequency_ranges
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lowest recorded frequency, 0 when nothing is recorded.
    pub fn min_frequency(&self) -> f64 {
        self.frequency_ranges
            .iter()
            .map(|range| range.min)
            .reduce(f64::min)
            .unwrap_or(0.0)
    }

    /// Highest recorded frequency, +∞ when nothing is recorded.
    pub fn max_frequency(&self) -> f64 {
        self.frequency_ranges
            .iter()
            .map(|range| range.max)
            .reduce(f64::max)
            .unwrap_or(f64::INFINITY)
    }

    /// Add the entries of one source that covers `frequency_range`.
    ///
    /// Entries sharing a species tag with an existing entry, or with each other,
    /// are squashed into one whose lines are the deduplicated union.
    pub fn append(&mut self, new_entries: Vec<CatalogEntry>, frequency_range: FrequencyRange) {
        let mut new_entries: Vec<CatalogEntry> = new_entries
            .into_iter()
            .map(|mut entry| {
                entry.lines = sort_unique(std::mem::take(&mut entry.lines), Line::sort_key, false);
                entry
            })
            .collect();
        new_entries.sort_by_key(|entry| entry.species_tag);
        self.entries.extend(new_entries);
        // Stable, and linear on two presorted runs.
        self.entries.sort_by_key(|entry| entry.species_tag);
        self.squash_same_species_tag_entries();

        self.frequency_ranges.push(frequency_range);
        self.frequency_ranges = merge_frequency_ranges(std::mem::take(&mut self.frequency_ranges));
    }

    fn squash_same_species_tag_entries(&mut self) {
        let mut squashed: Vec<CatalogEntry> = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            match squashed.last_mut() {
                Some(last) if last.species_tag == entry.species_tag => {
                    last.absorb_metadata(&entry);
                    let lines = std::mem::take(&mut last.lines);
                    last.lines = merge_sorted(lines, entry.lines, Line::sort_key);
                }
                _ => squashed.push(entry),
            }
        }
        self.entries = squashed;
    }
}

/// Merge overlapping or touching ranges in one pass over the sorted bounds.
pub fn merge_frequency_ranges(mut ranges: Vec<FrequencyRange>) -> Vec<FrequencyRange> {
    ranges.sort_by(|a, b| a.min.total_cmp(&b.min));
    let mut merged: Vec<FrequencyRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.min <= last.max => last.max = last.max.max(range.max),
            _ => merged.push(range),
        }
    }
    merged
}
