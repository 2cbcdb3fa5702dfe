use image::ImageBuffer;
use image::Luma;
use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::s;
use rayon::prelude::*;

use crate::enums::Orientation;
use crate::error::{ConversionError, Result};
use crate::geometry::VoxelGrid;
use crate::grid::ScalarField3D;
use crate::interpolator::{Bracket, Interpolator, ResampleOptions};

/// Dose (same unit as the source table) on the reference voxel grid,
/// indexed `[x, y, z]` by grid axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledDoseVolume {
    data: Array3<f64>,
}

impl ResampledDoseVolume {
    pub fn new(data: Array3<f64>) -> Self {
        Self { data }
    }

    /// Trilinearly resample `field` at every voxel center of `grid`.
    ///
    /// Brackets are searched once per grid line; the voxels are then filled
    /// in parallel, each one independent of the others.
    pub fn resample(
        field: &ScalarField3D,
        grid: &VoxelGrid,
        options: &ResampleOptions,
    ) -> Result<Self> {
        options.validate()?;
        let lines = (0..3)
            .map(|grid_axis| {
                let (axis, coordinates) = grid.axis_coordinates(grid_axis);
                let brackets = coordinates
                    .iter()
                    .map(|&position| {
                        Interpolator::bracket(axis, field.axis(axis), position, options)
                    })
                    .collect::<Result<Vec<Bracket>>>()?;
                Ok((axis.index(), brackets))
            })
            .collect::<Result<Vec<_>>>()?;

        // The grid validated that each patient axis is covered by exactly one grid axis.
        let mut grid_axis_of = [0; 3];
        for (grid_axis, (patient_axis, _)) in lines.iter().enumerate() {
            grid_axis_of[*patient_axis] = grid_axis;
        }

        let (nx, ny, nz) = grid.dim();
        let values = field.values();
        let data: Vec<f64> = (0..nx * ny * nz)
            .into_par_iter()
            .map(|flat| {
                let index = [flat / (ny * nz), (flat / nz) % ny, flat % nz];
                let [x, y, z] = grid_axis_of.map(|g| lines[g].1[index[g]]);
                Interpolator::trilinear_interpolate(values, x, y, z)
            })
            .collect();

        let data = Array3::from_shape_vec((nx, ny, nz), data)
            .map_err(|e| ConversionError::MalformedGrid(e.to_string()))?;
        Ok(Self::new(data))
    }

    /// Get the dimensions of the volume (nx, ny, nz)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    /// Largest dose in the volume, 0 for an empty volume.
    pub fn max(&self) -> f64 {
        self.data.par_iter().copied().reduce(|| 0.0, f64::max)
    }

    /// Render one slice as an 8-bit grayscale image scaled to the volume
    /// maximum. Returns `None` if `index` is past the end of the axis.
    pub fn preview(
        &self,
        index: usize,
        orientation: Orientation,
    ) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        if !self.is_valid_index(index, &orientation) {
            return None;
        }
        // Rows of the image run along the second remaining axis.
        let slice = match orientation {
            Orientation::Axial => self.data.slice(s![.., .., index]),
            Orientation::Coronal => self.data.slice(s![.., index, ..]),
            Orientation::Sagittal => self.data.slice(s![index, .., ..]),
        };
        Self::slice_to_image(&slice.t(), self.max())
    }

    #[inline]
    fn normalize_to_u8(value: f64, max: f64) -> u8 {
        if max <= 0.0 {
            return 0;
        }
        ((value / max) * 255.0).round().clamp(0.0, 255.0) as u8
    }

    fn slice_to_image(
        slice: &ArrayView2<'_, f64>,
        max: f64,
    ) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let (height, width) = slice.dim();
        let pixel_data: Vec<u8> = slice
            .iter()
            .map(|&v| Self::normalize_to_u8(v, max))
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }

    fn is_valid_index(&self, index: usize, orientation: &Orientation) -> bool {
        let dim = self.data.dim();
        let max_index = match orientation {
            Orientation::Axial => dim.2,
            Orientation::Coronal => dim.1,
            Orientation::Sagittal => dim.0,
        };
        index < max_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::Extrapolation;
    use approx::assert_relative_eq;

    const IDENTITY: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    /// dose = x + 2y + 3z on x,y,z ∈ {0, 2, 4}
    fn linear_field() -> ScalarField3D {
        let axis = vec![0.0, 2.0, 4.0];
        let values = Array3::from_shape_fn((3, 3, 3), |(i, j, k)| {
            2.0 * i as f64 + 4.0 * j as f64 + 6.0 * k as f64
        });
        ScalarField3D::new(axis.clone(), axis.clone(), axis, values).unwrap()
    }

    #[test]
    fn lattice_aligned_grid_returns_stored_values() {
        let field = linear_field();
        let grid = VoxelGrid::new([0.0; 3], [2.0; 3], [3, 3, 3], IDENTITY).unwrap();
        let volume = ResampledDoseVolume::resample(&field, &grid, &Default::default()).unwrap();
        assert_eq!(volume.data(), field.values());
    }

    #[test]
    fn fine_grid_interpolates_between_lattice_points() {
        let field = linear_field();
        let grid = VoxelGrid::new([0.5, 1.0, 1.5], [1.0; 3], [3, 2, 2], IDENTITY).unwrap();
        let volume = ResampledDoseVolume::resample(&field, &grid, &Default::default()).unwrap();
        for ((i, j, k), value) in volume.data().indexed_iter() {
            let [x, y, z] = grid.position(i, j, k);
            assert_relative_eq!(*value, x + 2.0 * y + 3.0 * z, epsilon = 1e-12);
        }
    }

    #[test]
    fn voxels_beyond_the_table_take_the_boundary_value() {
        let field = linear_field();
        let grid = VoxelGrid::new([-10.0, 2.0, 50.0], [1.0; 3], [1, 1, 1], IDENTITY).unwrap();
        let volume = ResampledDoseVolume::resample(&field, &grid, &Default::default()).unwrap();
        // x clamps to 0, z clamps to 4
        assert_eq!(volume.data()[[0, 0, 0]], 0.0 + 4.0 + 12.0);
    }

    #[test]
    fn voxels_beyond_the_table_fail_under_error_policy() {
        let field = linear_field();
        let grid = VoxelGrid::new([-10.0, 2.0, 2.0], [1.0; 3], [2, 1, 1], IDENTITY).unwrap();
        let options = ResampleOptions {
            extrapolation: Extrapolation::Error,
            ..Default::default()
        };
        let err = ResampledDoseVolume::resample(&field, &grid, &options).unwrap_err();
        assert!(matches!(err, ConversionError::OutsideSourceField { .. }));
    }

    #[test]
    fn negative_tolerance_is_rejected_before_resampling() {
        let field = linear_field();
        let grid = VoxelGrid::new([1.0, 1.0, 1.0], [1.0; 3], [2, 2, 2], IDENTITY).unwrap();
        let options = ResampleOptions {
            tolerance: -1.0,
            ..Default::default()
        };
        let err = ResampledDoseVolume::resample(&field, &grid, &options).unwrap_err();
        assert!(matches!(err, ConversionError::InvalidOption { .. }));
    }

    #[test]
    fn output_shape_follows_the_reference_grid() {
        let field = linear_field();
        let grid = VoxelGrid::new([0.0; 3], [0.3, 0.7, 1.1], [7, 5, 2], IDENTITY).unwrap();
        let volume = ResampledDoseVolume::resample(&field, &grid, &Default::default()).unwrap();
        assert_eq!(volume.dim(), (7, 5, 2));
    }

    #[test]
    fn permuted_reversed_axes_map_to_patient_coordinates() {
        let field = linear_field();
        // Columns run along -x, rows along z, frames along y.
        let grid = VoxelGrid::new(
            [4.0, 0.0, 0.0],
            [1.0, 2.0, 2.0],
            [5, 3, 3],
            [[-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]],
        )
        .unwrap();
        let volume = ResampledDoseVolume::resample(&field, &grid, &Default::default()).unwrap();
        for ((i, j, k), value) in volume.data().indexed_iter() {
            let [x, y, z] = grid.position(i, j, k);
            assert_relative_eq!(*value, x + 2.0 * y + 3.0 * z, epsilon = 1e-12);
        }
    }

    #[test]
    fn preview_scales_to_volume_maximum() {
        let data = Array3::from_shape_fn((4, 3, 2), |(i, j, k)| (i + j + k) as f64);
        let volume = ResampledDoseVolume::new(data);
        let image = volume.preview(1, Orientation::Axial).unwrap();
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(image.get_pixel(3, 2)[0], 255);
        assert!(image.get_pixel(0, 0)[0].abs_diff(43) <= 1);
        assert!(volume.preview(2, Orientation::Axial).is_none());
        assert_eq!(
            volume.preview(0, Orientation::Sagittal).unwrap().dimensions(),
            (3, 2)
        );
    }
}
