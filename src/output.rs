use std::io::{self, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::Catalog;
use crate::domain::CatalogEntry;

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub filename: PathBuf,
    pub build_time: Option<DateTime<Utc>>,
}

/// Summary of a loaded catalog.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogReport {
    pub sources: Vec<SourceReport>,
    pub entries: usize,
    pub frequency: Vec<[f64; 2]>,
}

impl CatalogReport {
    pub fn new(catalog: &Catalog) -> Self {
        Self {
            sources: catalog
                .sources_info()
                .iter()
                .map(|source| SourceReport {
                    filename: source.filename.clone(),
                    build_time: source.build_datetime,
                })
                .collect(),
            entries: catalog.entries_count(),
            frequency: catalog
                .frequency_limits()
                .iter()
                .map(|range| [range.min, range.max])
                .collect(),
        }
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_entries(entries: &[CatalogEntry]) -> io::Result<()> {
        write_entries(&mut io::stdout().lock(), entries)
    }

    pub fn print_report(report: &CatalogReport) -> io::Result<()> {
        write_report(&mut io::stdout().lock(), report)
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_entries(entries: &[CatalogEntry]) -> io::Result<()> {
        Self::print_json(&entries)
    }

    pub fn print_report(report: &CatalogReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

/// One row per line: name left-aligned, frequency and intensity
/// right-aligned, each column as wide as its widest cell.
pub fn write_entries<W: Write>(out: &mut W, entries: &[CatalogEntry]) -> io::Result<()> {
    if entries.is_empty() {
        return writeln!(out, "nothing found");
    }

    let rows: Vec<(String, String, String)> = entries
        .iter()
        .flat_map(|entry| {
            let name = entry.best_name();
            entry.lines.iter().map(move |line| {
                (
                    name.clone(),
                    line.frequency.to_string(),
                    line.intensity.to_string(),
                )
            })
        })
        .collect();
    let names_width = column_width(rows.iter().map(|row| &row.0));
    let frequencies_width = column_width(rows.iter().map(|row| &row.1));
    let intensities_width = column_width(rows.iter().map(|row| &row.2));

    for (name, frequency, intensity) in &rows {
        writeln!(
            out,
            "{name:<names_width$} {frequency:>frequencies_width$} {intensity:>intensities_width$}"
        )?;
    }
    Ok(())
}

fn column_width<'a>(cells: impl Iterator<Item = &'a String>) -> usize {
    cells.map(|cell| cell.chars().count()).max().unwrap_or(0)
}

pub fn write_report<W: Write>(out: &mut W, report: &CatalogReport) -> io::Result<()> {
    for source in &report.sources {
        match source.build_time {
            Some(time) => writeln!(out, "{} (built {})", source.filename.display(), time.to_rfc3339())?,
            None => writeln!(out, "{}", source.filename.display())?,
        }
    }
    writeln!(out, "{} species", report.entries)?;
    for [min, max] in &report.frequency {
        writeln!(out, "{min} to {max} MHz")?;
    }
    Ok(())
}
