//! Reader for the fixed-column `.cat` line format shared by JPL and CDMS.
//!
//! ```text
//! FREQ         ERR     LGINT   DR ELO      GUP TAG   QNFMT QN'       QN"
//! F13     .4   F8 .4   F8 .4   I2F10  .4,  I3 I7     I4  6I2         6I2
//!      262.0870  0.0011-19.2529 2 5174.7303  4  180011335 1-132 2 2   1 132 2 3
//! ```

use std::ops::Range;

use crate::domain::{Line, UNKNOWN_DEGREES_OF_FREEDOM};
use crate::error::CatsearchError;

const FREQUENCY: Range<usize> = 0..13;
const INTENSITY: Range<usize> = 21..29;
const DEGREES_OF_FREEDOM: Range<usize> = 29..31;
const LOWER_STATE_ENERGY: Range<usize> = 31..41;

/// The columns of one `.cat` line this crate uses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatLine {
    pub frequency: f64,
    pub intensity: f64,
    pub degrees_of_freedom: i8,
    pub lower_state_energy: f64,
}

impl CatLine {
    pub fn to_line(&self) -> Line {
        Line::new(self.frequency, self.intensity, self.lower_state_energy)
    }
}

/// Parse one line. The frequency is mandatory; other blank numeric columns
/// become NaN, or unknown degrees of freedom.
pub fn parse_line(text: &str) -> Result<CatLine, CatsearchError> {
    let frequency = float_field(text, FREQUENCY)?
        .ok_or_else(|| CatsearchError::LineParse(format!("no frequency in {text:?}")))?;
    let intensity = float_field(text, INTENSITY)?.unwrap_or(f64::NAN);
    let degrees_of_freedom = match field(text, DEGREES_OF_FREEDOM)? {
        Some(value) => value.parse::<i8>().map_err(|err| {
            CatsearchError::LineParse(format!("degrees of freedom {value:?}: {err}"))
        })?,
        None => UNKNOWN_DEGREES_OF_FREEDOM,
    };
    let lower_state_energy = float_field(text, LOWER_STATE_ENERGY)?.unwrap_or(f64::NAN);

    Ok(CatLine {
        frequency,
        intensity,
        degrees_of_freedom,
        lower_state_energy,
    })
}

/// Parse a whole `.cat` file, skipping lines that do not parse.
pub fn parse_lines(text: &str) -> Vec<CatLine> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match parse_line(line) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                tracing::debug!("skipping line: {err}");
                None
            }
        })
        .collect()
}

fn field(text: &str, columns: Range<usize>) -> Result<Option<&str>, CatsearchError> {
    if columns.start >= text.len() {
        return Ok(None);
    }
    let end = columns.end.min(text.len());
    let value = text.get(columns.start..end).ok_or_else(|| {
        CatsearchError::LineParse(format!("columns {columns:?} split a character in {text:?}"))
    })?;
    let value = value.trim();
    Ok((!value.is_empty()).then_some(value))
}

fn float_field(text: &str, columns: Range<usize>) -> Result<Option<f64>, CatsearchError> {
    field(text, columns)?
        .map(|value| {
            value
                .parse::<f64>()
                .map_err(|err| CatsearchError::LineParse(format!("{value:?}: {err}")))
        })
        .transpose()
}
