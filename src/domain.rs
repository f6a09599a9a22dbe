use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::sorted::OrderedF64;

/// A single spectral line. Intensity is referenced to [`crate::units::T0`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    /// MHz
    #[serde(deserialize_with = "nullable_f64")]
    pub frequency: f64,
    /// log10(nm²·MHz)
    #[serde(deserialize_with = "nullable_f64")]
    pub intensity: f64,
    /// cm⁻¹
    #[serde(rename = "lowerstateenergy", deserialize_with = "nullable_f64")]
    pub lower_state_energy: f64,
}

/// Sort key of a line list.
pub type LineKey = (OrderedF64, OrderedF64, OrderedF64);

impl Line {
    pub fn new(frequency: f64, intensity: f64, lower_state_energy: f64) -> Self {
        Self {
            frequency,
            intensity,
            lower_state_energy,
        }
    }

    pub fn sort_key(&self) -> LineKey {
        (
            OrderedF64(self.frequency),
            OrderedF64(self.intensity),
            OrderedF64(self.lower_state_energy),
        )
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.frequency, self.intensity, self.lower_state_energy
        )
    }
}

pub const UNKNOWN_DEGREES_OF_FREEDOM: i8 = -1;

/// One molecular species and its lines, sorted by [`Line::sort_key`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(
        default,
        deserialize_with = "lenient_integer",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<i64>,
    #[serde(rename = "speciestag", deserialize_with = "required_integer")]
    pub species_tag: i64,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    #[serde(
        rename = "trivialname",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub trivial_name: Option<String>,
    #[serde(
        rename = "structuralformula",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub structural_formula: Option<String>,
    #[serde(
        rename = "stoichiometricformula",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub stoichiometric_formula: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub isotopolog: Option<String>,
    #[serde(
        rename = "moleculesymbol",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub molecule_symbol: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub state: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub state_html: Option<String>,
    #[serde(
        rename = "inchikey",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub inchi_key: Option<String>,
    #[serde(
        rename = "degreesoffreedom",
        default = "unknown_degrees_of_freedom",
        deserialize_with = "lenient_degrees_of_freedom"
    )]
    pub degrees_of_freedom: i8,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub contributor: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<String>,
    #[serde(
        rename = "dateofentry",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_of_entry: Option<String>,
    #[serde(default)]
    pub lines: Vec<Line>,
}

fn unknown_degrees_of_freedom() -> i8 {
    UNKNOWN_DEGREES_OF_FREEDOM
}

impl CatalogEntry {
    pub fn new(species_tag: i64) -> Self {
        Self {
            id: None,
            species_tag,
            name: None,
            trivial_name: None,
            structural_formula: None,
            stoichiometric_formula: None,
            isotopolog: None,
            molecule_symbol: None,
            state: None,
            state_html: None,
            inchi_key: None,
            degrees_of_freedom: UNKNOWN_DEGREES_OF_FREEDOM,
            contributor: None,
            version: None,
            date_of_entry: None,
            lines: Vec::new(),
        }
    }

    /// Fill every optional field that is missing here from `other`.
    pub fn absorb_metadata(&mut self, other: &CatalogEntry) {
        fn fill(target: &mut Option<String>, source: &Option<String>) {
            if target.is_none() {
                target.clone_from(source);
            }
        }
        if self.id.is_none() {
            self.id = other.id;
        }
        fill(&mut self.name, &other.name);
        fill(&mut self.trivial_name, &other.trivial_name);
        fill(&mut self.structural_formula, &other.structural_formula);
        fill(&mut self.stoichiometric_formula, &other.stoichiometric_formula);
        fill(&mut self.isotopolog, &other.isotopolog);
        fill(&mut self.molecule_symbol, &other.molecule_symbol);
        fill(&mut self.state, &other.state);
        fill(&mut self.state_html, &other.state_html);
        fill(&mut self.inchi_key, &other.inchi_key);
        fill(&mut self.contributor, &other.contributor);
        fill(&mut self.version, &other.version);
        fill(&mut self.date_of_entry, &other.date_of_entry);
        if self.degrees_of_freedom < 0 {
            self.degrees_of_freedom = other.degrees_of_freedom;
        }
    }

    /// A plain-text name for display.
    pub fn best_name(&self) -> String {
        if let Some(isotopolog) = non_empty(&self.isotopolog) {
            if let Some(state) = non_empty(&self.state_html) {
                return format!("{isotopolog}, {}", strip_tags(state));
            }
            if let Some(state) = non_empty(&self.state) {
                return format!("{isotopolog}, {}", state.trim_matches('$'));
            }
            return isotopolog.to_string();
        }
        [
            &self.name,
            &self.structural_formula,
            &self.stoichiometric_formula,
            &self.trivial_name,
        ]
        .into_iter()
        .find_map(non_empty)
        .map(str::to_string)
        .unwrap_or_else(|| {
            if self.species_tag != 0 {
                self.species_tag.to_string()
            } else {
                "no name".to_string()
            }
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

fn strip_tags(markup: &str) -> String {
    let mut text = String::with_capacity(markup.len());
    let mut in_tag = false;
    for ch in markup.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    text.trim_start().to_string()
}

/// A closed frequency interval in MHz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyRange {
    pub min: f64,
    pub max: f64,
}

impl FrequencyRange {
    pub const UNBOUNDED: FrequencyRange = FrequencyRange {
        min: f64::NEG_INFINITY,
        max: f64::INFINITY,
    };

    /// Build a range from two bounds given in any order.
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn contains(&self, frequency: f64) -> bool {
        self.min <= frequency && frequency <= self.max
    }

    pub fn overlaps(&self, other: &FrequencyRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }
}

impl Default for FrequencyRange {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

impl fmt::Display for FrequencyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}] MHz", self.min, self.max)
    }
}

/// One file that contributed to a catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSourceInfo {
    pub filename: PathBuf,
    pub build_datetime: Option<DateTime<Utc>>,
}

/// serde_json writes non-finite floats as `null`; read them back as NaN.
pub(crate) fn nullable_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

// The species directory is loosely typed: numbers show up as strings and
// strings as numbers depending on the field and the server version.

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        other => Some(other.to_string()),
    })
}

fn integer_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|x| x.fract() == 0.0).map(|x| x as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_integer<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(integer_of(&Value::deserialize(deserializer)?))
}

fn required_integer<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    integer_of(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected an integer, found {value}")))
}

fn lenient_degrees_of_freedom<'de, D>(deserializer: D) -> Result<i8, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(integer_of(&Value::deserialize(deserializer)?)
        .and_then(|value| i8::try_from(value).ok())
        .unwrap_or(UNKNOWN_DEGREES_OF_FREEDOM))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_json_field_names() {
        let mut entry = CatalogEntry::new(28503);
        entry.name = Some("CO".to_string());
        entry.degrees_of_freedom = 2;
        entry.lines.push(Line::new(115271.2018, -5.0105, 0.0));

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["speciestag"], 28503);
        assert_eq!(json["degreesoffreedom"], 2);
        assert_eq!(json["lines"][0]["lowerstateenergy"], 0.0);
        assert!(json.get("trivialname").is_none());
    }

    #[test]
    fn entry_defaults_when_fields_missing() {
        let entry: CatalogEntry = serde_json::from_str(r#"{"speciestag": 18003}"#).unwrap();
        assert_eq!(entry.degrees_of_freedom, UNKNOWN_DEGREES_OF_FREEDOM);
        assert!(entry.lines.is_empty());
    }

    #[test]
    fn null_line_values_load_as_nan() {
        let line: Line = serde_json::from_str(
            r#"{"frequency": 100.0, "intensity": null, "lowerstateenergy": 1.5}"#,
        )
        .unwrap();
        assert_eq!(line.frequency, 100.0);
        assert!(line.intensity.is_nan());
    }

    #[test]
    fn loosely_typed_species_fields() {
        let entry: CatalogEntry = serde_json::from_str(
            r#"{"id": "17", "speciestag": "44004", "version": 2, "degreesoffreedom": "2"}"#,
        )
        .unwrap();
        assert_eq!(entry.id, Some(17));
        assert_eq!(entry.species_tag, 44004);
        assert_eq!(entry.version.as_deref(), Some("2"));
        assert_eq!(entry.degrees_of_freedom, 2);
    }

    #[test]
    fn missing_species_tag_is_rejected() {
        assert!(serde_json::from_str::<CatalogEntry>(r#"{"name": "CO"}"#).is_err());
    }

    #[test]
    fn best_name_preference() {
        let mut entry = CatalogEntry::new(44004);
        assert_eq!(entry.best_name(), "44004");

        entry.trivial_name = Some("nitrous oxide".to_string());
        assert_eq!(entry.best_name(), "nitrous oxide");

        entry.name = Some("N2O".to_string());
        assert_eq!(entry.best_name(), "N2O");

        entry.isotopolog = Some("N2O".to_string());
        entry.state = Some("$v_2=1$".to_string());
        assert_eq!(entry.best_name(), "N2O, v_2=1");

        entry.state_html = Some("<i>v</i><sub>2</sub>=1".to_string());
        assert_eq!(entry.best_name(), "N2O, v2=1");
    }

    #[test]
    fn absorb_metadata_fills_gaps_only() {
        let mut first = CatalogEntry::new(1);
        first.name = Some("first".to_string());
        let mut second = CatalogEntry::new(1);
        second.name = Some("second".to_string());
        second.inchi_key = Some("KEY".to_string());
        second.degrees_of_freedom = 3;

        first.absorb_metadata(&second);
        assert_eq!(first.name.as_deref(), Some("first"));
        assert_eq!(first.inchi_key.as_deref(), Some("KEY"));
        assert_eq!(first.degrees_of_freedom, 3);
    }

    #[test]
    fn frequency_range_orders_bounds() {
        let range = FrequencyRange::new(10.0, 2.0);
        assert_eq!(range.min, 2.0);
        assert!(range.contains(10.0));
        assert!(range.overlaps(&FrequencyRange::new(10.0, 20.0)));
        assert!(!range.overlaps(&FrequencyRange::new(10.5, 20.0)));
    }
}
