use ndarray::{Array3, Axis as ArrayAxis};

use crate::enums::Axis;
use crate::error::{ConversionError, Result};

/// One row of a long-format dose table, already mapped to patient axes (mm).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoseSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub dose: f64,
}

/// Dose sampled on a rectilinear lattice.
///
/// Axes are strictly increasing and `values[[i, j, k]]` is the dose at
/// `(x[i], y[j], z[k])`. Immutable once built.
#[derive(Debug, Clone)]
pub struct ScalarField3D {
    axes: [Vec<f64>; 3],
    values: Array3<f64>,
}

#[derive(Debug, PartialEq)]
enum Ordering {
    Ascending,
    Descending,
}

impl ScalarField3D {
    /// Build a field from axis coordinates and a dense `(nx, ny, nz)` array.
    ///
    /// Axes may be strictly ascending or strictly descending; descending
    /// axes are reversed together with the matching array dimension.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::MalformedGrid`] if an axis has fewer than
    /// two points, repeats or reverses a coordinate, the array shape does
    /// not match the axis lengths, or a dose is negative or not finite.
    pub fn new(
        axis_x: Vec<f64>,
        axis_y: Vec<f64>,
        axis_z: Vec<f64>,
        values: Array3<f64>,
    ) -> Result<Self> {
        let mut axes = [axis_x, axis_y, axis_z];
        let expected = (axes[0].len(), axes[1].len(), axes[2].len());
        if values.dim() != expected {
            return Err(ConversionError::MalformedGrid(format!(
                "dose array has shape {:?} but the axes need {:?}",
                values.dim(),
                expected
            )));
        }

        let mut values = values;
        for axis in Axis::ALL {
            let coords = &mut axes[axis.index()];
            if Self::check_axis(axis, coords)? == Ordering::Descending {
                coords.reverse();
                values.invert_axis(ArrayAxis(axis.index()));
            }
        }
        if !values.is_standard_layout() {
            values = values.as_standard_layout().into_owned();
        }

        if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(ConversionError::MalformedGrid(format!(
                "dose value {bad} is not a non-negative finite number"
            )));
        }

        Ok(Self { axes, values })
    }

    /// Pivot long-format samples into a dense field.
    ///
    /// Every combination of the distinct x, y and z coordinates must be
    /// present exactly once.
    pub fn from_samples(samples: &[DoseSample]) -> Result<Self> {
        if let Some(bad) = samples
            .iter()
            .find(|s| !(s.x.is_finite() && s.y.is_finite() && s.z.is_finite()))
        {
            return Err(ConversionError::MalformedGrid(format!(
                "sample at ({}, {}, {}) has a non-finite coordinate",
                bad.x, bad.y, bad.z
            )));
        }

        let axis_x = Self::unique_sorted(samples.iter().map(|s| s.x));
        let axis_y = Self::unique_sorted(samples.iter().map(|s| s.y));
        let axis_z = Self::unique_sorted(samples.iter().map(|s| s.z));

        let shape = (axis_x.len(), axis_y.len(), axis_z.len());
        let mut values = Array3::<f64>::zeros(shape);
        let mut seen = Array3::<bool>::from_elem(shape, false);

        for sample in samples {
            let index = [
                Self::position_of(&axis_x, sample.x),
                Self::position_of(&axis_y, sample.y),
                Self::position_of(&axis_z, sample.z),
            ];
            if seen[index] {
                return Err(ConversionError::MalformedGrid(format!(
                    "duplicate sample at ({}, {}, {})",
                    sample.x, sample.y, sample.z
                )));
            }
            seen[index] = true;
            values[index] = sample.dose;
        }

        if let Some(((i, j, k), _)) = seen.indexed_iter().find(|(_, present)| !**present) {
            return Err(ConversionError::MalformedGrid(format!(
                "no sample at ({}, {}, {})",
                axis_x[i], axis_y[j], axis_z[k]
            )));
        }

        Self::new(axis_x, axis_y, axis_z, values)
    }

    pub fn axis(&self, axis: Axis) -> &[f64] {
        &self.axes[axis.index()]
    }

    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }

    /// Lattice dimensions (nx, ny, nz).
    pub fn dim(&self) -> (usize, usize, usize) {
        self.values.dim()
    }

    /// First and last coordinate of an axis.
    pub fn bounds(&self, axis: Axis) -> (f64, f64) {
        let coords = self.axis(axis);
        (coords[0], coords[coords.len() - 1])
    }

    fn check_axis(axis: Axis, coords: &[f64]) -> Result<Ordering> {
        if coords.len() < 2 {
            return Err(ConversionError::MalformedGrid(format!(
                "{axis} axis needs at least two coordinates, got {}",
                coords.len()
            )));
        }
        if let Some(bad) = coords.iter().find(|c| !c.is_finite()) {
            return Err(ConversionError::MalformedGrid(format!(
                "{axis} axis contains non-finite coordinate {bad}"
            )));
        }

        let ordering = if coords[1] > coords[0] {
            Ordering::Ascending
        } else {
            Ordering::Descending
        };
        for (index, pair) in coords.windows(2).enumerate() {
            let ok = match ordering {
                Ordering::Ascending => pair[1] > pair[0],
                Ordering::Descending => pair[1] < pair[0],
            };
            if !ok {
                let reason = if pair[1] == pair[0] {
                    "repeats"
                } else {
                    "breaks the ordering at"
                };
                return Err(ConversionError::MalformedGrid(format!(
                    "{axis} axis {reason} coordinate {} (index {})",
                    pair[1],
                    index + 1
                )));
            }
        }
        Ok(ordering)
    }

    fn unique_sorted(coords: impl Iterator<Item = f64>) -> Vec<f64> {
        let mut coords: Vec<f64> = coords.collect();
        coords.sort_by(f64::total_cmp);
        coords.dedup();
        coords
    }

    // `coords` was built from the same samples, so the lookup always hits.
    fn position_of(coords: &[f64], value: f64) -> usize {
        coords
            .binary_search_by(|c| c.total_cmp(&value))
            .unwrap_or_else(|insert_at| insert_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn cube() -> Array3<f64> {
        Array3::from_shape_fn((2, 3, 2), |(i, j, k)| (i * 100 + j * 10 + k) as f64)
    }

    #[test]
    fn keeps_ascending_axes_untouched() {
        let field =
            ScalarField3D::new(vec![0.0, 1.0], vec![0.0, 1.0, 2.0], vec![5.0, 6.0], cube())
                .unwrap();
        assert_eq!(field.values(), &cube());
        assert_eq!(field.bounds(Axis::Z), (5.0, 6.0));
    }

    #[test]
    fn reverses_descending_axis_with_values() {
        let field =
            ScalarField3D::new(vec![0.0, 1.0], vec![2.0, 1.0, 0.0], vec![5.0, 6.0], cube())
                .unwrap();
        assert_eq!(field.axis(Axis::Y), &[0.0, 1.0, 2.0]);
        // y = 0.0 used to be index 2
        assert_eq!(field.values()[[1, 0, 1]], 121.0);
        assert_eq!(field.values()[[1, 2, 1]], 101.0);
        assert!(field.values().is_standard_layout());

        let mut original: Vec<f64> = cube().iter().copied().collect();
        let mut permuted: Vec<f64> = field.values().iter().copied().collect();
        original.sort_by(f64::total_cmp);
        permuted.sort_by(f64::total_cmp);
        assert_eq!(original, permuted);
    }

    #[test]
    fn rejects_duplicate_coordinate() {
        let err = ScalarField3D::new(vec![0.0, 0.0], vec![0.0, 1.0, 2.0], vec![5.0, 6.0], cube())
            .unwrap_err();
        assert!(matches!(err, ConversionError::MalformedGrid(_)));
    }

    #[test]
    fn rejects_non_monotonic_axis() {
        let err = ScalarField3D::new(vec![0.0, 1.0], vec![0.0, 2.0, 1.0], vec![5.0, 6.0], cube())
            .unwrap_err();
        assert!(matches!(err, ConversionError::MalformedGrid(_)));
    }

    #[test]
    fn rejects_single_point_axis() {
        let err = ScalarField3D::new(vec![0.0], vec![0.0], vec![0.0], array![[[1.0]]])
            .unwrap_err();
        assert!(matches!(err, ConversionError::MalformedGrid(_)));
    }

    #[test]
    fn rejects_shape_mismatch() {
        let axis = vec![0.0, 1.0, 2.0];
        let err = ScalarField3D::new(axis.clone(), axis, vec![5.0, 6.0], cube()).unwrap_err();
        assert!(matches!(err, ConversionError::MalformedGrid(_)));
    }

    #[test]
    fn rejects_negative_dose() {
        let mut values = cube();
        values[[0, 0, 0]] = -1.0;
        let err =
            ScalarField3D::new(vec![0.0, 1.0], vec![0.0, 1.0, 2.0], vec![5.0, 6.0], values)
                .unwrap_err();
        assert!(matches!(err, ConversionError::MalformedGrid(_)));
    }

    fn samples() -> Vec<DoseSample> {
        let mut samples = Vec::new();
        for &z in &[1.0, -1.0] {
            for &y in &[0.5, 0.0] {
                for &x in &[2.0, 0.0, 1.0] {
                    samples.push(DoseSample {
                        x,
                        y,
                        z,
                        dose: x + 10.0 * y + 100.0 * z.max(0.0),
                    });
                }
            }
        }
        samples
    }

    #[test]
    fn pivots_unordered_samples() {
        let field = ScalarField3D::from_samples(&samples()).unwrap();
        assert_eq!(field.dim(), (3, 2, 2));
        assert_eq!(field.axis(Axis::X), &[0.0, 1.0, 2.0]);
        assert_eq!(field.axis(Axis::Z), &[-1.0, 1.0]);
        assert_eq!(field.values()[[2, 1, 1]], 2.0 + 5.0 + 100.0);
        assert_eq!(field.values()[[1, 0, 0]], 1.0);
    }

    #[test]
    fn pivot_rejects_missing_cell() {
        let mut samples = samples();
        samples.pop();
        let err = ScalarField3D::from_samples(&samples).unwrap_err();
        assert!(matches!(err, ConversionError::MalformedGrid(_)));
    }

    #[test]
    fn pivot_rejects_duplicate_sample() {
        let mut samples = samples();
        let last = samples.len() - 1;
        samples[last] = samples[0];
        let err = ScalarField3D::from_samples(&samples).unwrap_err();
        assert!(matches!(err, ConversionError::MalformedGrid(_)));
    }
}
