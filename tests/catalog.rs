use std::fs;

use catsearch::catalog::Catalog;
use catsearch::domain::{CatalogEntry, FrequencyRange, Line};
use catsearch::filter::{FilterCriteria, intensity_at};
use catsearch::units::T0;

fn entry(tag: i64, name: &str, dof: i8, lines: &[(f64, f64, f64)]) -> CatalogEntry {
    let mut entry = CatalogEntry::new(tag);
    entry.name = Some(name.to_string());
    entry.degrees_of_freedom = dof;
    entry.lines = lines
        .iter()
        .map(|(frequency, intensity, energy)| Line::new(*frequency, *intensity, *energy))
        .collect();
    entry
}

fn write_sources(dir: &std::path::Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let first = dir.join("low.json.gz");
    Catalog::save(
        &first,
        &[
            entry(28503, "CO", 2, &[(115271.2018, -5.0105, 0.0), (230538.0, -4.1197, 3.845)]),
            entry(18003, "H2O", 3, &[(22235.08, -4.5, 447.0)]),
        ],
        FrequencyRange::new(0.0, 250000.0),
        None,
    )
    .unwrap();

    let second = dir.join("high.json.bz2");
    Catalog::save(
        &second,
        &[
            entry(28503, "CO", 2, &[(230538.0, -4.1197, 3.845), (345795.9899, -3.6118, 11.535)]),
            entry(32504, "CH3OH", 3, &[(338408.698, -3.2, 65.0)]),
        ],
        FrequencyRange::new(200000.0, 400000.0),
        None,
    )
    .unwrap();
    (first, second)
}

#[test]
fn sources_merge_by_species_tag() {
    let temp = tempfile::tempdir().unwrap();
    let (first, second) = write_sources(temp.path());
    let catalog = Catalog::load(&[first.clone(), second.clone()]);

    assert_eq!(catalog.sources(), vec![first, second]);
    assert_eq!(catalog.entries_count(), 3);
    assert_eq!(catalog.frequency_limits(), &[FrequencyRange::new(0.0, 400000.0)]);
    assert_eq!(catalog.min_frequency(), 0.0);
    assert_eq!(catalog.max_frequency(), 400000.0);

    let tags: Vec<i64> = catalog.catalog().iter().map(|e| e.species_tag).collect();
    assert_eq!(tags, vec![18003, 28503, 32504]);
    let co = &catalog.catalog()[1];
    let frequencies: Vec<f64> = co.lines.iter().map(|line| line.frequency).collect();
    assert_eq!(frequencies, vec![115271.2018, 230538.0, 345795.9899]);
}

#[test]
fn loading_the_same_source_twice_changes_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let (first, second) = write_sources(temp.path());
    let once = Catalog::load(&[first.clone(), second.clone()]);
    let twice = Catalog::load(&[first.clone(), second.clone(), first]);
    assert_eq!(once.catalog(), twice.catalog());
    assert_eq!(once.frequency_limits(), twice.frequency_limits());
}

#[test]
fn malformed_source_is_skipped() {
    let temp = tempfile::tempdir().unwrap();
    let (first, _) = write_sources(temp.path());
    let broken = temp.path().join("broken.json");
    fs::write(&broken, "not json").unwrap();

    let catalog = Catalog::load(&[broken, first.clone()]);
    assert_eq!(catalog.sources(), vec![first]);
    assert_eq!(catalog.entries_count(), 2);
}

#[test]
fn filtered_lines_lie_in_the_window() {
    let temp = tempfile::tempdir().unwrap();
    let (first, second) = write_sources(temp.path());
    let catalog = Catalog::load(&[first, second]);

    let found = catalog.filter(&FilterCriteria::frequency(200000.0, 340000.0));
    let tags: Vec<i64> = found.iter().map(|e| e.species_tag).collect();
    assert_eq!(tags, vec![28503, 32504]);
    for entry in &found {
        assert!(!entry.lines.is_empty());
        assert!(
            entry
                .lines
                .iter()
                .all(|line| (200000.0..=340000.0).contains(&line.frequency))
        );
    }
}

#[test]
fn window_outside_the_catalog_is_empty() {
    let temp = tempfile::tempdir().unwrap();
    let (first, second) = write_sources(temp.path());
    let catalog = Catalog::load(&[first, second]);

    assert!(catalog.filter(&FilterCriteria::frequency(5e5, 6e5)).is_empty());
    let inverted = FilterCriteria {
        min_frequency: Some(300000.0),
        max_frequency: Some(100000.0),
        ..FilterCriteria::default()
    };
    assert!(catalog.filter(&inverted).is_empty());
}

#[test]
fn reference_temperature_keeps_intensities() {
    let temp = tempfile::tempdir().unwrap();
    let (first, second) = write_sources(temp.path());
    let catalog = Catalog::load(&[first, second]);

    let plain = catalog.filter(&FilterCriteria::default());
    let at_t0 = catalog.filter(&FilterCriteria {
        temperature: Some(T0),
        ..FilterCriteria::default()
    });
    assert_eq!(plain, at_t0);
}

#[test]
fn intensity_bounds_apply_at_the_requested_temperature() {
    let temp = tempfile::tempdir().unwrap();
    let (first, second) = write_sources(temp.path());
    let catalog = Catalog::load(&[first, second]);

    let criteria = FilterCriteria {
        species_tag: Some(28503),
        temperature: Some(20.0),
        min_intensity: Some(-4.0),
        ..FilterCriteria::default()
    };
    let found = catalog.filter(&criteria);
    let co = &catalog.catalog()[1];
    let expected: Vec<f64> = co
        .lines
        .iter()
        .map(|line| intensity_at(line, co.degrees_of_freedom, 20.0))
        .filter(|intensity| *intensity >= -4.0)
        .collect();
    assert!(!expected.is_empty());
    let intensities: Vec<f64> = found
        .iter()
        .flat_map(|entry| entry.lines.iter().map(|line| line.intensity))
        .collect();
    assert_eq!(intensities, expected);
}

#[test]
fn name_search_ignores_case() {
    let temp = tempfile::tempdir().unwrap();
    let (first, second) = write_sources(temp.path());
    let catalog = Catalog::load(&[first, second]);

    let found = catalog.filter(&FilterCriteria {
        any_name_or_formula: Some("ch3oh".to_string()),
        ..FilterCriteria::default()
    });
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].species_tag, 32504);
}
