use thiserror::Error;

use crate::enums::Axis;

/// Failures of the conversion core.
///
/// Every variant is returned straight to the caller; the core never retries
/// since the computation is deterministic on its inputs.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Malformed dose grid: {0}")]
    MalformedGrid(String),

    #[error("Missing or inconsistent reference geometry: {0}")]
    MissingGeometry(String),

    #[error("Unsupported orientation: direction {direction:?} is not axis-aligned")]
    UnsupportedOrientation { direction: [f64; 3] },

    #[error("Position {position} mm on the {axis} axis lies outside the dose table [{min}, {max}]")]
    OutsideSourceField {
        axis: Axis,
        position: f64,
        min: f64,
        max: f64,
    },

    #[error("Encoded value {value} exceeds the {bits}-bit pixel range")]
    EncodingRange { value: u64, bits: u16 },

    #[error("Unable to generate unique identifiers: {0}")]
    IdentityGeneration(String),

    #[error("Invalid {name} {value}: {reason}")]
    InvalidOption {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}

pub type Result<T, E = ConversionError> = std::result::Result<T, E>;
