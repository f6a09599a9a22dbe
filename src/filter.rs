//! Multi-criteria search over a [`CatalogStore`].

use std::collections::HashSet;
use std::f64::consts::LN_10;
use std::time::{Duration, Instant};

use crate::domain::{CatalogEntry, FrequencyRange, Line};
use crate::sorted::search_sorted;
use crate::store::CatalogStore;
use crate::units::{C, H, K, T0};

/// What to look for. Every `None` (or empty string) leaves that aspect
/// unconstrained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    /// MHz
    pub min_frequency: Option<f64>,
    /// MHz
    pub max_frequency: Option<f64>,
    /// log10(nm²·MHz), at `temperature`
    pub min_intensity: Option<f64>,
    /// log10(nm²·MHz), at `temperature`
    pub max_intensity: Option<f64>,
    /// K; the catalog intensity is used when unset
    pub temperature: Option<f64>,
    pub species_tag: Option<i64>,
    pub inchi: Option<String>,
    /// case-insensitive
    pub trivial_name: Option<String>,
    pub structural_formula: Option<String>,
    /// case-insensitive
    pub name: Option<String>,
    pub stoichiometric_formula: Option<String>,
    pub isotopolog: Option<String>,
    /// matches either the TeX or the HTML state
    pub state: Option<String>,
    pub degrees_of_freedom: Option<i8>,
    /// trivial name or name, case-insensitive
    pub any_name: Option<String>,
    /// structural formula, molecule symbol, stoichiometric formula or isotopolog
    pub any_formula: Option<String>,
    pub any_name_or_formula: Option<String>,
    /// Stop early and return what has been found so far.
    pub timeout: Option<Duration>,
}

impl FilterCriteria {
    pub fn frequency(min_frequency: f64, max_frequency: f64) -> Self {
        Self {
            min_frequency: Some(min_frequency),
            max_frequency: Some(max_frequency),
            ..Self::default()
        }
    }
}

/// Line intensity at `temperature`, from the catalog value at [`T0`].
///
/// Without a known number of degrees of freedom, or for a non-positive
/// temperature, or at `T0` itself, the catalog value is returned unchanged.
pub fn intensity_at(line: &Line, degrees_of_freedom: i8, temperature: f64) -> f64 {
    if degrees_of_freedom >= 0 && temperature > 0.0 && temperature != T0 {
        line.intensity
            + ((0.5 * f64::from(degrees_of_freedom) + 1.0) * (T0 / temperature).log10()
                - (1.0 / temperature - 1.0 / T0) * line.lower_state_energy * 100.0 * H * C / K)
                / LN_10
    } else {
        line.intensity
    }
}

pub struct FilterEngine<'a> {
    store: &'a CatalogStore,
}

impl<'a> FilterEngine<'a> {
    pub fn new(store: &'a CatalogStore) -> Self {
        Self { store }
    }

    /// Entries matching every criterion, each with only the matching lines.
    ///
    /// Returned lines carry the intensity at the requested temperature.
    /// Entries left without lines are dropped.
    pub fn filter(&self, criteria: &FilterCriteria) -> Vec<CatalogEntry> {
        // A timeout too large to represent is no timeout.
        let deadline = criteria
            .timeout
            .filter(|timeout| !timeout.is_zero())
            .and_then(|timeout| Instant::now().checked_add(timeout));
        self.filter_until(criteria, deadline)
    }

    fn filter_until(
        &self,
        criteria: &FilterCriteria,
        deadline: Option<Instant>,
    ) -> Vec<CatalogEntry> {
        if self.store.is_empty() {
            return Vec::new();
        }

        let window = FrequencyRange {
            min: criteria.min_frequency.unwrap_or(f64::NEG_INFINITY),
            max: criteria.max_frequency.unwrap_or(f64::INFINITY),
        };
        if window.min > window.max
            || !self
                .store
                .frequency_ranges()
                .iter()
                .any(|range| range.overlaps(&window))
        {
            return Vec::new();
        }

        let identity = IdentityQuery::new(criteria);

        let mut selected = Vec::new();
        for entry in self.store.entries() {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                tracing::debug!("filter timed out after {} entries", selected.len());
                break;
            }
            if identity.is_active() && !identity.matches(entry) {
                continue;
            }
            let lines = select_lines(entry, &window, criteria);
            if !lines.is_empty() {
                let mut found = clone_without_lines(entry);
                found.lines = lines;
                selected.push(found);
            }
        }
        drop_identical(selected)
    }
}

fn clone_without_lines(entry: &CatalogEntry) -> CatalogEntry {
    CatalogEntry {
        id: entry.id,
        species_tag: entry.species_tag,
        name: entry.name.clone(),
        trivial_name: entry.trivial_name.clone(),
        structural_formula: entry.structural_formula.clone(),
        stoichiometric_formula: entry.stoichiometric_formula.clone(),
        isotopolog: entry.isotopolog.clone(),
        molecule_symbol: entry.molecule_symbol.clone(),
        state: entry.state.clone(),
        state_html: entry.state_html.clone(),
        inchi_key: entry.inchi_key.clone(),
        degrees_of_freedom: entry.degrees_of_freedom,
        contributor: entry.contributor.clone(),
        version: entry.version.clone(),
        date_of_entry: entry.date_of_entry.clone(),
        lines: Vec::new(),
    }
}

fn select_lines(
    entry: &CatalogEntry,
    window: &FrequencyRange,
    criteria: &FilterCriteria,
) -> Vec<Line> {
    let lines = &entry.lines;
    let first = search_sorted(window.min, lines, |line| line.frequency, false) + 1;
    let last = search_sorted(window.max, lines, |line| line.frequency, true);
    let start = first.clamp(0, lines.len() as isize) as usize;
    let end = (last + 1).clamp(0, lines.len() as isize) as usize;
    if start >= end {
        return Vec::new();
    }

    let temperature = criteria.temperature.unwrap_or(f64::NEG_INFINITY);
    lines[start..end]
        .iter()
        .filter_map(|line| {
            let intensity = intensity_at(line, entry.degrees_of_freedom, temperature);
            let above = criteria.min_intensity.is_none_or(|min| min <= intensity);
            let below = criteria.max_intensity.is_none_or(|max| intensity <= max);
            (above && below).then(|| Line {
                intensity,
                ..*line
            })
        })
        .collect()
}

/// Identity predicates with the case-insensitive ones folded once.
struct IdentityQuery<'c> {
    species_tag: Option<i64>,
    inchi: Option<&'c str>,
    trivial_name: Option<String>,
    structural_formula: Option<&'c str>,
    name: Option<String>,
    stoichiometric_formula: Option<&'c str>,
    isotopolog: Option<&'c str>,
    state: Option<&'c str>,
    degrees_of_freedom: Option<i8>,
    any_name: Option<String>,
    any_formula: Option<&'c str>,
    any_name_or_formula: Option<(&'c str, String)>,
}

impl<'c> IdentityQuery<'c> {
    fn new(criteria: &'c FilterCriteria) -> Self {
        let text = |value: &'c Option<String>| value.as_deref().filter(|value| !value.is_empty());
        let folded = |value: &'c Option<String>| text(value).map(str::to_lowercase);
        Self {
            species_tag: criteria.species_tag.filter(|tag| *tag != 0),
            inchi: text(&criteria.inchi),
            trivial_name: folded(&criteria.trivial_name),
            structural_formula: text(&criteria.structural_formula),
            name: folded(&criteria.name),
            stoichiometric_formula: text(&criteria.stoichiometric_formula),
            isotopolog: text(&criteria.isotopolog),
            state: text(&criteria.state),
            degrees_of_freedom: criteria.degrees_of_freedom,
            any_name: folded(&criteria.any_name),
            any_formula: text(&criteria.any_formula),
            any_name_or_formula: text(&criteria.any_name_or_formula)
                .map(|value| (value, value.to_lowercase())),
        }
    }

    fn is_active(&self) -> bool {
        self.species_tag.is_some()
            || self.inchi.is_some()
            || self.trivial_name.is_some()
            || self.structural_formula.is_some()
            || self.name.is_some()
            || self.stoichiometric_formula.is_some()
            || self.isotopolog.is_some()
            || self.state.is_some()
            || self.degrees_of_freedom.is_some()
            || self.any_name.is_some()
            || self.any_formula.is_some()
            || self.any_name_or_formula.is_some()
    }

    fn matches(&self, entry: &CatalogEntry) -> bool {
        let exact = |field: &Option<String>, wanted: &str| field.as_deref() == Some(wanted);
        let folded = |field: &Option<String>, wanted: &str| {
            field
                .as_deref()
                .is_some_and(|value| value.to_lowercase() == wanted)
        };
        let any_name = |wanted: &str| {
            folded(&entry.trivial_name, wanted) || folded(&entry.name, wanted)
        };
        let any_formula = |wanted: &str| {
            exact(&entry.structural_formula, wanted)
                || exact(&entry.molecule_symbol, wanted)
                || exact(&entry.stoichiometric_formula, wanted)
                || exact(&entry.isotopolog, wanted)
        };

        self.species_tag.is_none_or(|tag| entry.species_tag == tag)
            && self.inchi.is_none_or(|inchi| exact(&entry.inchi_key, inchi))
            && self
                .trivial_name
                .as_deref()
                .is_none_or(|wanted| folded(&entry.trivial_name, wanted))
            && self
                .structural_formula
                .is_none_or(|wanted| exact(&entry.structural_formula, wanted))
            && self
                .name
                .as_deref()
                .is_none_or(|wanted| folded(&entry.name, wanted))
            && self
                .stoichiometric_formula
                .is_none_or(|wanted| exact(&entry.stoichiometric_formula, wanted))
            && self
                .isotopolog
                .is_none_or(|wanted| exact(&entry.isotopolog, wanted))
            && self.state.is_none_or(|wanted| {
                exact(&entry.state, wanted) || exact(&entry.state_html, wanted)
            })
            && self
                .degrees_of_freedom
                .is_none_or(|dof| entry.degrees_of_freedom == dof)
            && self
                .any_name
                .as_deref()
                .is_none_or(|wanted| any_name(wanted))
            && self
                .any_formula
                .is_none_or(|wanted| any_formula(wanted))
            && self
                .any_name_or_formula
                .as_ref()
                .is_none_or(|(wanted, wanted_folded)| {
                    any_name(wanted_folded.as_str()) || any_formula(wanted)
                })
    }
}

#[derive(PartialEq, Eq, Hash)]
struct EntryIdentity<'a> {
    id: Option<i64>,
    species_tag: i64,
    degrees_of_freedom: i8,
    fields: [Option<&'a str>; 12],
    line_count: usize,
}

impl<'a> EntryIdentity<'a> {
    fn of(entry: &'a CatalogEntry) -> Self {
        Self {
            id: entry.id,
            species_tag: entry.species_tag,
            degrees_of_freedom: entry.degrees_of_freedom,
            fields: [
                entry.name.as_deref(),
                entry.trivial_name.as_deref(),
                entry.structural_formula.as_deref(),
                entry.stoichiometric_formula.as_deref(),
                entry.isotopolog.as_deref(),
                entry.molecule_symbol.as_deref(),
                entry.state.as_deref(),
                entry.state_html.as_deref(),
                entry.inchi_key.as_deref(),
                entry.contributor.as_deref(),
                entry.version.as_deref(),
                entry.date_of_entry.as_deref(),
            ],
            line_count: entry.lines.len(),
        }
    }
}

/// Remove entries identical to an earlier one, keeping the order.
pub fn drop_identical(entries: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
    let keep: Vec<bool> = {
        let mut seen = HashSet::with_capacity(entries.len());
        entries
            .iter()
            .map(|entry| seen.insert(EntryIdentity::of(entry)))
            .collect()
    };
    if keep.iter().all(|keep| *keep) {
        return entries;
    }
    entries
        .into_iter()
        .zip(keep)
        .filter_map(|(entry, keep)| keep.then_some(entry))
        .collect()
}
