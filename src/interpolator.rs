use ndarray::Array3;

use crate::enums::{Axis, Extrapolation};
use crate::error::{ConversionError, Result};

/// Distance (mm) under which a voxel center counts as sitting on a table coordinate.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Interpolation behaviour for one resampling run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResampleOptions {
    pub extrapolation: Extrapolation,
    pub tolerance: f64,
}

impl ResampleOptions {
    /// Reject a tolerance that is negative or not finite.
    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ConversionError::InvalidOption {
                name: "tolerance",
                value: self.tolerance,
                reason: "must be a finite, non-negative distance",
            });
        }
        Ok(())
    }
}

impl Default for ResampleOptions {
    fn default() -> Self {
        Self {
            extrapolation: Extrapolation::default(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Pair of lattice indices enclosing a position along one axis, and the
/// weight of the upper one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Bracket {
    pub(crate) lower: usize,
    pub(crate) upper: usize,
    pub(crate) weight: f64,
}

impl Bracket {
    fn exact(index: usize) -> Self {
        Self {
            lower: index,
            upper: index,
            weight: 0.0,
        }
    }
}

pub(crate) struct Interpolator;

impl Interpolator {
    /// Locate `position` on the sorted `coords` of `axis`.
    pub(crate) fn bracket(
        axis: Axis,
        coords: &[f64],
        position: f64,
        options: &ResampleOptions,
    ) -> Result<Bracket> {
        options.validate()?;
        let count = coords.len();
        if count < 2 {
            return Err(ConversionError::MalformedGrid(format!(
                "{axis} axis needs at least two coordinates to interpolate, got {count}"
            )));
        }
        let tolerance = options.tolerance;
        let (min, max) = (coords[0], coords[count - 1]);

        if position < min - tolerance || position > max + tolerance {
            return match options.extrapolation {
                Extrapolation::Clamp if position < min => Ok(Bracket::exact(0)),
                Extrapolation::Clamp => Ok(Bracket::exact(count - 1)),
                Extrapolation::Error => Err(ConversionError::OutsideSourceField {
                    axis,
                    position,
                    min,
                    max,
                }),
            };
        }

        // First coordinate strictly above the position.
        let upper = coords.partition_point(|c| *c <= position);
        if upper > 0 && (position - coords[upper - 1]).abs() <= tolerance {
            return Ok(Bracket::exact(upper - 1));
        }
        if upper < count && (coords[upper] - position).abs() <= tolerance {
            return Ok(Bracket::exact(upper));
        }

        let lower = upper - 1;
        Ok(Bracket {
            lower,
            upper,
            weight: (position - coords[lower]) / (coords[upper] - coords[lower]),
        })
    }

    #[inline]
    fn lerp(a: f64, b: f64, weight: f64) -> f64 {
        a.mul_add(1.0 - weight, b * weight)
    }

    /// Blend the eight lattice values of the cell picked by the brackets.
    #[inline]
    pub(crate) fn trilinear_interpolate(
        values: &Array3<f64>,
        x: Bracket,
        y: Bracket,
        z: Bracket,
    ) -> f64 {
        let v000 = values[[x.lower, y.lower, z.lower]];
        let v100 = values[[x.upper, y.lower, z.lower]];
        let v010 = values[[x.lower, y.upper, z.lower]];
        let v110 = values[[x.upper, y.upper, z.lower]];
        let v001 = values[[x.lower, y.lower, z.upper]];
        let v101 = values[[x.upper, y.lower, z.upper]];
        let v011 = values[[x.lower, y.upper, z.upper]];
        let v111 = values[[x.upper, y.upper, z.upper]];

        let v00 = Self::lerp(v000, v100, x.weight);
        let v10 = Self::lerp(v010, v110, x.weight);
        let v01 = Self::lerp(v001, v101, x.weight);
        let v11 = Self::lerp(v011, v111, x.weight);

        let v0 = Self::lerp(v00, v10, y.weight);
        let v1 = Self::lerp(v01, v11, y.weight);

        Self::lerp(v0, v1, z.weight)
    }
}
