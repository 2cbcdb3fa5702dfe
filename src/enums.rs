use std::fmt;

/// Patient axis of a field or grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "x"),
            Axis::Y => write!(f, "y"),
            Axis::Z => write!(f, "z"),
        }
    }
}

/// Slice plane used for preview images.
#[derive(Debug, Clone, Copy, Default)]
pub enum Orientation {
    #[default]
    Axial,
    Coronal,
    Sagittal,
}

/// What to do with a voxel center outside the dose table's coordinate range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Extrapolation {
    /// Take the value on the nearest boundary of the table.
    #[default]
    Clamp,
    /// Fail the conversion.
    Error,
}

/// Integer width of the stored dose pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PixelWidth {
    U16,
    #[default]
    U32,
}

impl PixelWidth {
    pub fn bits(self) -> u16 {
        match self {
            PixelWidth::U16 => 16,
            PixelWidth::U32 => 32,
        }
    }

    /// Largest raw value a pixel of this width can hold.
    pub fn max_value(self) -> u32 {
        match self {
            PixelWidth::U16 => u16::MAX as u32,
            PixelWidth::U32 => u32::MAX,
        }
    }
}
