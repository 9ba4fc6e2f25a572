//! Code-compliance derating: allowable-ampacity lookup, ambient and
//! bundling correction, continuous-load sizing.

pub mod engine;
mod tables;

pub use engine::{
    ambient_correction, annotate_export, base_ampacity, bundling_correction,
    continuous_load_sizing, evaluate, floor_to_standard_step, DeratingResult,
    ServiceConditions,
};

use thiserror::Error;

use crate::models::enums::{ConductorMaterial, TempRating};

/// Errors from derating lookups. All are local to the item being
/// evaluated; the pipeline reports them as flags, not failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeratingError {
    #[error("no ampacity listed for {gauge} {material} at {rating}")]
    UndefinedCombination {
        gauge: String,
        material: ConductorMaterial,
        rating: TempRating,
    },

    #[error("ambient temperature {0}°C is outside the correction table")]
    AmbientOutOfRange(f64),

    #[error("{rating} conductors are not permitted at {ambient_c}°C ambient")]
    AmbientNotPermitted {
        rating: TempRating,
        ambient_c: f64,
    },

    #[error("conductor count must be at least 1")]
    InvalidConductorCount,

    #[error("conductor is missing {0}, cannot derate")]
    MissingField(&'static str),
}
