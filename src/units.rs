//! Physical constants, unit conversions and display labels.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Reference temperature of catalog intensities, K.
pub const T0: f64 = 300.0;
/// Boltzmann constant, J/K.
pub const K: f64 = 1.380649e-23;
/// Planck constant, J·s.
pub const H: f64 = 6.62607015e-34;
/// Elementary charge, C.
pub const E: f64 = 1.602176634e-19;
/// Speed of light, m/s.
pub const C: f64 = 299792458.0;

pub fn mhz_to_ghz(frequency_mhz: f64) -> f64 {
    frequency_mhz * 1e-3
}

pub fn mhz_to_rec_cm(frequency_mhz: f64) -> f64 {
    frequency_mhz * 1e4 / C
}

pub fn mhz_to_nm(frequency_mhz: f64) -> f64 {
    C / frequency_mhz * 1e3
}

pub fn ghz_to_mhz(frequency_ghz: f64) -> f64 {
    frequency_ghz * 1e3
}

pub fn ghz_to_rec_cm(frequency_ghz: f64) -> f64 {
    frequency_ghz * 1e7 / C
}

pub fn ghz_to_nm(frequency_ghz: f64) -> f64 {
    C / frequency_ghz
}

pub fn rec_cm_to_mhz(frequency_rec_cm: f64) -> f64 {
    frequency_rec_cm * 1e-4 * C
}

pub fn rec_cm_to_ghz(frequency_rec_cm: f64) -> f64 {
    frequency_rec_cm * 1e-7 * C
}

pub fn rec_cm_to_nm(frequency_rec_cm: f64) -> f64 {
    1e7 / frequency_rec_cm
}

pub fn nm_to_mhz(wavelength_nm: f64) -> f64 {
    C / wavelength_nm * 1e3
}

pub fn nm_to_ghz(wavelength_nm: f64) -> f64 {
    C / wavelength_nm
}

pub fn nm_to_rec_cm(wavelength_nm: f64) -> f64 {
    1e7 / wavelength_nm
}

pub fn rec_cm_to_mev(energy_rec_cm: f64) -> f64 {
    1e5 * H * C / E * energy_rec_cm
}

pub fn rec_cm_to_j(energy_rec_cm: f64) -> f64 {
    1e2 * H * C * energy_rec_cm
}

pub fn mev_to_rec_cm(energy_mev: f64) -> f64 {
    1e-5 * E / H / C * energy_mev
}

pub fn j_to_rec_cm(energy_j: f64) -> f64 {
    1e-2 / H / C * energy_j
}

pub fn log10_sq_nm_mhz_to_sq_nm_mhz(intensity: f64) -> f64 {
    10f64.powf(intensity)
}

pub fn log10_sq_nm_mhz_to_log10_cm_per_molecule(intensity: f64) -> f64 {
    -10.0 + intensity - C.log10()
}

pub fn log10_sq_nm_mhz_to_cm_per_molecule(intensity: f64) -> f64 {
    10f64.powf(log10_sq_nm_mhz_to_log10_cm_per_molecule(intensity))
}

pub fn sq_nm_mhz_to_log10_sq_nm_mhz(intensity: f64) -> f64 {
    log10_or_special(intensity)
}

pub fn log10_cm_per_molecule_to_log10_sq_nm_mhz(intensity: f64) -> f64 {
    intensity + 10.0 + C.log10()
}

pub fn cm_per_molecule_to_log10_sq_nm_mhz(intensity: f64) -> f64 {
    log10_cm_per_molecule_to_log10_sq_nm_mhz(log10_or_special(intensity))
}

fn log10_or_special(value: f64) -> f64 {
    if value == 0.0 {
        f64::NEG_INFINITY
    } else if value < 0.0 {
        f64::NAN
    } else {
        value.log10()
    }
}

static HUMAN_READABLE: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("catalog", "Catalog"),
        ("lines", "Lines"),
        ("frequency", "Frequency"),
        ("intensity", "Intensity"),
        ("id", "ID"),
        ("molecule", "Molecule"),
        ("structuralformula", "Structural formula"),
        ("stoichiometricformula", "Stoichiometric formula"),
        ("moleculesymbol", "Molecule symbol"),
        ("speciestag", "Species tag"),
        ("name", "Name"),
        ("trivialname", "Trivial name"),
        ("isotopolog", "Isotopolog"),
        ("state", "State (TeX)"),
        ("state_html", "State (HTML)"),
        ("inchikey", "InChI key"),
        ("contributor", "Contributor"),
        ("version", "Version"),
        ("dateofentry", "Date of entry"),
        ("degreesoffreedom", "Degrees of freedom"),
        ("lowerstateenergy", "Lower state energy"),
    ])
});

/// Display label of a catalog field, keyed by its serialized name.
pub fn human_readable(field: &str) -> Option<&'static str> {
    HUMAN_READABLE.get(field).copied()
}
