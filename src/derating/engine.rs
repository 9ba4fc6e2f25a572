//! Pure-function code-compliance calculations: ampacity lookup, ambient
//! and bundling correction, continuous-load sizing, and the combined
//! per-conductor evaluation.
//!
//! Nothing here holds state or caches results; callers re-invoke on every
//! export so a changed service condition is always reflected.

use serde::{Deserialize, Serialize};

use super::tables::{
    AmbientBand, AmpacityRow, ALUMINUM_AMPACITY, AMBIENT_CORRECTION, BUNDLING_CORRECTION,
    COPPER_AMPACITY, STANDARD_AMPACITY_STEPS,
};
use super::DeratingError;
use crate::models::bom::{AssumptionFlag, ConductorItem};
use crate::models::enums::{ConductorMaterial, FlagSeverity, TempRating};

/// Continuous loads size at 125% of the connected load.
const CONTINUOUS_LOAD_FACTOR: f64 = 1.25;

/// Installation conditions the derating is evaluated under.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServiceConditions {
    /// Ambient temperature in °C.
    pub ambient_c: f64,
    /// Current-carrying conductors sharing the raceway or bundle.
    pub bundled_conductors: u32,
}

impl Default for ServiceConditions {
    fn default() -> Self {
        Self {
            ambient_c: 30.0,
            bundled_conductors: 3,
        }
    }
}

/// Derived compliance output attached to an exported conductor record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeratingResult {
    pub base_ampacity: f64,
    pub ambient_factor: f64,
    pub bundling_factor: f64,
    /// base × ambient × bundling, floored to the standard step at or below.
    pub derated_ampacity: f64,
    /// Load-driven minimum (125% of continuous loads), when a load is known.
    pub required_ampacity: Option<f64>,
    pub compliant: Option<bool>,
}

/// Allowable ampacity for a conductor size/metal/temperature rating.
/// An unlisted combination is a reported error, never a default.
pub fn base_ampacity(
    gauge: &str,
    material: ConductorMaterial,
    rating: TempRating,
) -> Result<f64, DeratingError> {
    let table: &[AmpacityRow] = match material {
        ConductorMaterial::Copper => COPPER_AMPACITY,
        ConductorMaterial::Aluminum => ALUMINUM_AMPACITY,
    };

    let row = table
        .iter()
        .find(|row| row.gauge == gauge)
        .ok_or_else(|| DeratingError::UndefinedCombination {
            gauge: gauge.to_string(),
            material,
            rating,
        })?;

    Ok(match rating {
        TempRating::C60 => row.c60,
        TempRating::C75 => row.c75,
        TempRating::C90 => row.c90,
    })
}

/// Ambient-temperature correction factor relative to the 30 °C baseline.
pub fn ambient_correction(rating: TempRating, ambient_c: f64) -> Result<f64, DeratingError> {
    let band: &AmbientBand = AMBIENT_CORRECTION
        .iter()
        .find(|band| ambient_c <= band.max_c)
        .ok_or(DeratingError::AmbientOutOfRange(ambient_c))?;

    let factor = match rating {
        TempRating::C60 => band.c60,
        TempRating::C75 => band.c75,
        TempRating::C90 => band.c90,
    };

    factor.ok_or(DeratingError::AmbientNotPermitted { rating, ambient_c })
}

/// Adjustment factor for the number of current-carrying conductors
/// bundled together.
pub fn bundling_correction(count: u32) -> Result<f64, DeratingError> {
    if count == 0 {
        return Err(DeratingError::InvalidConductorCount);
    }
    let (_, factor) = BUNDLING_CORRECTION
        .iter()
        .find(|(max, _)| count <= *max)
        .copied()
        .unwrap_or((u32::MAX, 0.35));
    Ok(factor)
}

/// Minimum conductor ampacity for a load: 125% when the load is
/// continuous (expected to run three hours or more).
pub fn continuous_load_sizing(load_amps: f64) -> f64 {
    load_amps * CONTINUOUS_LOAD_FACTOR
}

/// Floor an ampacity to the nearest standard step at or below it.
/// Values below the smallest step have no standard rating.
pub fn floor_to_standard_step(amps: f64) -> Option<f64> {
    STANDARD_AMPACITY_STEPS
        .iter()
        .rev()
        .find(|&&step| f64::from(step) <= amps)
        .map(|&step| f64::from(step))
}

/// Evaluate one conductor under the given conditions.
///
/// Requires material and insulation to be known; absent fields are a
/// reported error so the caller can flag the item instead of guessing.
pub fn evaluate(
    item: &ConductorItem,
    conditions: &ServiceConditions,
) -> Result<DeratingResult, DeratingError> {
    let material = item.material.ok_or(DeratingError::MissingField("material"))?;
    let insulation = item
        .insulation
        .ok_or(DeratingError::MissingField("insulation"))?;
    let rating = insulation.temp_rating();

    let base = base_ampacity(&item.gauge, material, rating)?;
    let ambient = ambient_correction(rating, conditions.ambient_c)?;
    let bundling = bundling_correction(conditions.bundled_conductors)?;

    let raw = base * ambient * bundling;
    let derated = floor_to_standard_step(raw).unwrap_or(0.0);

    let required = item.load_amps.map(|load| {
        if item.continuous {
            continuous_load_sizing(load)
        } else {
            load
        }
    });
    let compliant = required.map(|req| derated >= req);

    Ok(DeratingResult {
        base_ampacity: base,
        ambient_factor: ambient,
        bundling_factor: bundling,
        derated_ampacity: derated,
        required_ampacity: required,
        compliant,
    })
}

/// Attach fresh derating results to every conductor in an export.
///
/// An undersized conductor gets a High-severity compliance flag; a
/// conductor the tables cannot evaluate stays in the output underated,
/// also flagged High.
pub fn annotate_export(
    export: &mut crate::models::bom::BomExport,
    conditions: &ServiceConditions,
) {
    for conductor in &mut export.conductors {
        match evaluate(&conductor.item, conditions) {
            Ok(result) => {
                if result.compliant == Some(false) {
                    conductor.item.flags.push(AssumptionFlag::new(
                        "ampacity",
                        Some(format!(
                            "{}A derated < {}A required",
                            result.derated_ampacity,
                            result.required_ampacity.unwrap_or(0.0)
                        )),
                        FlagSeverity::High,
                        "Increase conductor size or reduce bundling/ambient load",
                    ));
                }
                conductor.derating = Some(result);
            }
            Err(err) => {
                tracing::warn!(
                    gauge = %conductor.item.gauge,
                    error = %err,
                    "Conductor could not be derated"
                );
                conductor.item.flags.push(AssumptionFlag::new(
                    "derating",
                    Some(err.to_string()),
                    FlagSeverity::High,
                    "Verify conductor size, metal, and insulation before pricing",
                ));
                conductor.derating = None;
            }
        }
    }
}
