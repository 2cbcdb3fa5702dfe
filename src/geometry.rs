use dicom::object::InMemDicomObject;
use dicom_dictionary_std::tags;

use crate::enums::Axis;
use crate::error::{ConversionError, Result};

/// Largest deviation from a unit basis vector still treated as axis-aligned.
pub const ORIENTATION_TOLERANCE: f64 = 1e-4;

/// Largest spread between consecutive frame offsets still treated as uniform (mm).
const FRAME_SPACING_TOLERANCE: f64 = 1e-3;

/// Slice spacing (mm) of a single-frame grid without a usable Slice Thickness.
const SINGLE_FRAME_SPACING: f64 = 1.0;

/// Voxel lattice of the reference RT Dose.
///
/// Grid axis 0 runs along a row (column index), axis 1 down the columns
/// (row index) and axis 2 through the frames. Directions are snapped to
/// signed unit basis vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid {
    origin: [f64; 3],
    spacing: [f64; 3],
    counts: [usize; 3],
    directions: [[f64; 3]; 3],
}

impl VoxelGrid {
    pub fn new(
        origin: [f64; 3],
        spacing: [f64; 3],
        counts: [usize; 3],
        directions: [[f64; 3]; 3],
    ) -> Result<Self> {
        if let Some(bad) = origin.iter().find(|v| !v.is_finite()) {
            return Err(ConversionError::MissingGeometry(format!(
                "origin component {bad} is not finite"
            )));
        }
        if let Some(bad) = spacing.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(ConversionError::MissingGeometry(format!(
                "voxel spacing {bad} must be positive"
            )));
        }
        if counts.contains(&0) {
            return Err(ConversionError::MissingGeometry(format!(
                "voxel counts {counts:?} must all be positive"
            )));
        }

        let mut snapped = [[0.0; 3]; 3];
        let mut used = [false; 3];
        for (grid_axis, direction) in directions.iter().enumerate() {
            let (axis, sign) = Self::basis_of(direction)?;
            if used[axis.index()] {
                return Err(ConversionError::UnsupportedOrientation {
                    direction: *direction,
                });
            }
            used[axis.index()] = true;
            snapped[grid_axis][axis.index()] = sign;
        }

        Ok(Self {
            origin,
            spacing,
            counts,
            directions: snapped,
        })
    }

    /// Read the voxel lattice of an RT Dose object.
    ///
    /// # Errors
    ///
    /// [`ConversionError::MissingGeometry`] when a geometric attribute is
    /// absent or inconsistent, [`ConversionError::UnsupportedOrientation`]
    /// when the image is not axis-aligned.
    pub fn from_dicom(object: &InMemDicomObject) -> Result<Self> {
        let origin = Self::floats::<3>(object, tags::IMAGE_POSITION_PATIENT, "Image Position")?;
        let orientation =
            Self::floats::<6>(object, tags::IMAGE_ORIENTATION_PATIENT, "Image Orientation")?;
        let pixel_spacing = Self::floats::<2>(object, tags::PIXEL_SPACING, "Pixel Spacing")?;
        let rows = Self::count(object, tags::ROWS, "Rows")?;
        let columns = Self::count(object, tags::COLUMNS, "Columns")?;
        let frames = match object.element(tags::NUMBER_OF_FRAMES) {
            Ok(element) => element.to_int::<usize>().map_err(|e| {
                ConversionError::MissingGeometry(format!("Number of Frames is unreadable: {e}"))
            })?,
            Err(_) => 1,
        };
        if frames == 0 {
            return Err(ConversionError::MissingGeometry(
                "Number of Frames must be positive".to_string(),
            ));
        }

        let row_direction = [orientation[0], orientation[1], orientation[2]];
        let column_direction = [orientation[3], orientation[4], orientation[5]];
        let mut slice_direction = cross(row_direction, column_direction);
        let frame_spacing = Self::frame_spacing(object, frames)?;
        if frame_spacing < 0.0 {
            slice_direction = slice_direction.map(|c| -c);
        }

        Self::new(
            origin,
            // Pixel Spacing is (between rows, between columns).
            [pixel_spacing[1], pixel_spacing[0], frame_spacing.abs()],
            [columns, rows, frames],
            [row_direction, column_direction, slice_direction],
        )
    }

    /// Voxel counts (nx, ny, nz).
    pub fn dim(&self) -> (usize, usize, usize) {
        (self.counts[0], self.counts[1], self.counts[2])
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    pub fn directions(&self) -> [[f64; 3]; 3] {
        self.directions
    }

    /// Patient position of the center of voxel `(i, j, k)`.
    pub fn position(&self, i: usize, j: usize, k: usize) -> [f64; 3] {
        let steps = [i as f64, j as f64, k as f64];
        let mut position = self.origin;
        for grid_axis in 0..3 {
            for (component, value) in position.iter_mut().enumerate() {
                *value += steps[grid_axis]
                    * self.spacing[grid_axis]
                    * self.directions[grid_axis][component];
            }
        }
        position
    }

    /// Patient axis a grid axis runs along, and the coordinate of each of
    /// its voxel centers on that patient axis.
    pub fn axis_coordinates(&self, grid_axis: usize) -> (Axis, Vec<f64>) {
        let direction = self.directions[grid_axis];
        let component = direction
            .iter()
            .position(|c| *c != 0.0)
            .unwrap_or(grid_axis);
        let axis = Axis::ALL[component];
        let step = self.spacing[grid_axis] * direction[component];
        let coordinates = (0..self.counts[grid_axis])
            .map(|n| self.origin[component] + n as f64 * step)
            .collect();
        (axis, coordinates)
    }

    /// Frame offsets along the slice normal implied by the row and column
    /// directions, starting at zero.
    pub fn frame_offsets(&self) -> Vec<f64> {
        let normal = cross(self.directions[0], self.directions[1]);
        let sign = dot(normal, self.directions[2]);
        (0..self.counts[2])
            // `+ 0.0` turns a leading -0.0 into 0.0
            .map(|k| k as f64 * self.spacing[2] * sign + 0.0)
            .collect()
    }

    fn basis_of(direction: &[f64; 3]) -> Result<(Axis, f64)> {
        let unsupported = || ConversionError::UnsupportedOrientation {
            direction: *direction,
        };
        let component = direction
            .iter()
            .position(|c| (c.abs() - 1.0).abs() <= ORIENTATION_TOLERANCE)
            .ok_or_else(unsupported)?;
        let off_axis_ok = direction
            .iter()
            .enumerate()
            .all(|(n, c)| n == component || c.abs() <= ORIENTATION_TOLERANCE);
        if !off_axis_ok {
            return Err(unsupported());
        }
        Ok((Axis::ALL[component], direction[component].signum()))
    }

    fn frame_spacing(object: &InMemDicomObject, frames: usize) -> Result<f64> {
        // One frame never steps along the slice axis; the spacing only has
        // to be positive.
        if frames == 1 {
            let thickness = object
                .element(tags::SLICE_THICKNESS)
                .ok()
                .and_then(|e| e.to_float64().ok())
                .filter(|t| t.is_finite() && *t > 0.0);
            return Ok(thickness.unwrap_or(SINGLE_FRAME_SPACING));
        }

        let offsets = object
            .element(tags::GRID_FRAME_OFFSET_VECTOR)
            .map_err(|_| {
                ConversionError::MissingGeometry("Grid Frame Offset Vector is absent".to_string())
            })?
            .to_multi_float64()
            .map_err(|e| {
                ConversionError::MissingGeometry(format!(
                    "Grid Frame Offset Vector is unreadable: {e}"
                ))
            })?;

        if offsets.len() != frames {
            return Err(ConversionError::MissingGeometry(format!(
                "Grid Frame Offset Vector has {} entries for {frames} frames",
                offsets.len()
            )));
        }
        let spacing = offsets[1] - offsets[0];
        let uniform = offsets
            .windows(2)
            .all(|pair| ((pair[1] - pair[0]) - spacing).abs() <= FRAME_SPACING_TOLERANCE);
        if !uniform {
            return Err(ConversionError::MissingGeometry(
                "Grid Frame Offset Vector is not uniformly spaced".to_string(),
            ));
        }
        Ok(spacing)
    }

    fn floats<const N: usize>(
        object: &InMemDicomObject,
        tag: dicom::core::Tag,
        name: &str,
    ) -> Result<[f64; N]> {
        let values = object
            .element(tag)
            .map_err(|_| ConversionError::MissingGeometry(format!("{name} is absent")))?
            .to_multi_float64()
            .map_err(|e| ConversionError::MissingGeometry(format!("{name} is unreadable: {e}")))?;
        <[f64; N]>::try_from(values.as_slice()).map_err(|_| {
            ConversionError::MissingGeometry(format!(
                "{name} has {} values, expected {N}",
                values.len()
            ))
        })
    }

    fn count(object: &InMemDicomObject, tag: dicom::core::Tag, name: &str) -> Result<usize> {
        object
            .element(tag)
            .map_err(|_| ConversionError::MissingGeometry(format!("{name} is absent")))?
            .to_int::<usize>()
            .map_err(|e| ConversionError::MissingGeometry(format!("{name} is unreadable: {e}")))
    }
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use dicom::core::{DataElement, PrimitiveValue, VR};

    pub(crate) fn ds(values: &[f64]) -> PrimitiveValue {
        PrimitiveValue::Strs(values.iter().map(|v| v.to_string()).collect())
    }

    pub(crate) fn reference_object(offsets: &[f64]) -> InMemDicomObject {
        InMemDicomObject::from_element_iter([
            DataElement::new(tags::IMAGE_POSITION_PATIENT, VR::DS, ds(&[-10.0, -20.0, 5.0])),
            DataElement::new(
                tags::IMAGE_ORIENTATION_PATIENT,
                VR::DS,
                ds(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
            ),
            DataElement::new(tags::PIXEL_SPACING, VR::DS, ds(&[2.0, 1.0])),
            DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(3_u16)),
            DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(4_u16)),
            DataElement::new(
                tags::NUMBER_OF_FRAMES,
                VR::IS,
                PrimitiveValue::from(offsets.len().to_string()),
            ),
            DataElement::new(tags::GRID_FRAME_OFFSET_VECTOR, VR::DS, ds(offsets)),
        ])
    }

    #[test]
    fn reads_reference_lattice() {
        let grid = VoxelGrid::from_dicom(&reference_object(&[0.0, 2.5])).unwrap();
        assert_eq!(grid.dim(), (4, 3, 2));
        assert_eq!(grid.spacing(), [1.0, 2.0, 2.5]);
        assert_eq!(grid.position(3, 2, 1), [-7.0, -16.0, 7.5]);
    }

    #[test]
    fn absolute_offsets_give_the_same_spacing() {
        let grid = VoxelGrid::from_dicom(&reference_object(&[5.0, 7.5, 10.0])).unwrap();
        assert_relative_eq!(grid.spacing()[2], 2.5);
        assert_eq!(grid.frame_offsets(), vec![0.0, 2.5, 5.0]);
    }

    #[test]
    fn decreasing_offsets_flip_the_slice_direction() {
        let grid = VoxelGrid::from_dicom(&reference_object(&[0.0, -3.0])).unwrap();
        assert_eq!(grid.position(0, 0, 1), [-10.0, -20.0, 2.0]);
        assert_eq!(grid.frame_offsets(), vec![0.0, -3.0]);
    }

    #[test]
    fn single_frame_without_slice_thickness_is_accepted() {
        let mut object = reference_object(&[0.0]);
        object.put(DataElement::new(
            tags::SLICE_THICKNESS,
            VR::DS,
            PrimitiveValue::Empty,
        ));
        let grid = VoxelGrid::from_dicom(&object).unwrap();
        assert_eq!(grid.dim(), (4, 3, 1));
        assert_eq!(grid.spacing()[2], 1.0);
        assert_eq!(grid.frame_offsets(), vec![0.0]);
        assert_eq!(grid.position(3, 2, 0), [-7.0, -16.0, 5.0]);

        object.remove_element(tags::SLICE_THICKNESS);
        object.remove_element(tags::GRID_FRAME_OFFSET_VECTOR);
        assert_eq!(VoxelGrid::from_dicom(&object).unwrap().spacing()[2], 1.0);
    }

    #[test]
    fn single_frame_uses_slice_thickness() {
        let mut object = reference_object(&[0.0]);
        object.put(DataElement::new(tags::SLICE_THICKNESS, VR::DS, ds(&[3.0])));
        let grid = VoxelGrid::from_dicom(&object).unwrap();
        assert_eq!(grid.spacing()[2], 3.0);
    }

    #[test]
    fn missing_attribute_is_reported() {
        let mut object = reference_object(&[0.0, 2.5]);
        object.remove_element(tags::PIXEL_SPACING);
        let err = VoxelGrid::from_dicom(&object).unwrap_err();
        assert!(matches!(err, ConversionError::MissingGeometry(_)));
    }

    #[test]
    fn uneven_frames_are_rejected() {
        let err = VoxelGrid::from_dicom(&reference_object(&[0.0, 2.0, 5.0])).unwrap_err();
        assert!(matches!(err, ConversionError::MissingGeometry(_)));
    }

    #[test]
    fn oblique_orientation_is_rejected() {
        let mut object = reference_object(&[0.0, 2.5]);
        let s = std::f64::consts::FRAC_1_SQRT_2;
        object.put(DataElement::new(
            tags::IMAGE_ORIENTATION_PATIENT,
            VR::DS,
            ds(&[s, s, 0.0, -s, s, 0.0]),
        ));
        let err = VoxelGrid::from_dicom(&object).unwrap_err();
        assert!(matches!(err, ConversionError::UnsupportedOrientation { .. }));
    }

    #[test]
    fn zero_spacing_is_rejected() {
        let err = VoxelGrid::new(
            [0.0; 3],
            [1.0, 0.0, 1.0],
            [2, 2, 2],
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        )
        .unwrap_err();
        assert!(matches!(err, ConversionError::MissingGeometry(_)));
    }

    #[test]
    fn parallel_directions_are_rejected() {
        let err = VoxelGrid::new(
            [0.0; 3],
            [1.0; 3],
            [2, 2, 2],
            [[1.0, 0.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
        )
        .unwrap_err();
        assert!(matches!(err, ConversionError::UnsupportedOrientation { .. }));
    }

    #[test]
    fn axis_coordinates_follow_direction_sign() {
        let grid = VoxelGrid::new(
            [10.0, 0.0, 0.0],
            [2.0, 1.0, 1.0],
            [3, 2, 2],
            [[-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]],
        )
        .unwrap();
        assert_eq!(grid.axis_coordinates(0), (Axis::X, vec![10.0, 8.0, 6.0]));
        assert_eq!(grid.axis_coordinates(1).0, Axis::Z);
        assert_eq!(grid.axis_coordinates(2).0, Axis::Y);
    }
}
