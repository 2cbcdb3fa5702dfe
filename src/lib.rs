//! # dose-regrid
//!
//! This crate converts a dose distribution exported by a treatment-planning
//! system as a table into a DICOM RT Dose that lines up with an existing
//! reference RT Dose.
//!
//! The table samples the dose on its own rectilinear lattice. The reference
//! brings the voxel grid, frame of reference and dose attributes the new
//! object has to share. Conversion happens in four steps:
//!  - The table is pivoted into a [`ScalarField3D`]
//!  - The reference's voxel lattice is read into a [`VoxelGrid`]
//!  - The field is trilinearly resampled at every voxel center, in parallel
//!    using rayon
//!  - The resampled dose is quantized into unsigned integer pixels with a
//!    Dose Grid Scaling that spends the full pixel range on the maximum dose
//!
//!  The result is then written into a copy of the reference together with
//!  freshly generated identifiers. Only axis-aligned references are
//!  supported; voxel centers outside the table take the value at the
//!  nearest table boundary unless [`Extrapolation::Error`] is requested.
//!
//! # Examples
//!
//! ## Converting a dose table
//!
//! ```no_run
//! # use dose_regrid::{
//! #     ConversionOptions, DoseFile, DoseMetadata, DoseTable, ScalarField3D, TableLayout,
//! #     VoxelGrid, assemble_rt_dose, convert,
//! # };
//! let table = DoseTable::read_from_path("plan.csv", &TableLayout::default())
//!     .expect("should have read the dose table");
//! let field = ScalarField3D::from_samples(&table.samples).expect("should be a full lattice");
//!
//! let reference =
//!     DoseFile::open_reference("reference.dcm").expect("should have opened the reference");
//! let grid = VoxelGrid::from_dicom(&reference).expect("should be an axis-aligned grid");
//! let metadata = DoseMetadata::from_dicom(&reference).expect("should have a frame of reference");
//!
//! let conversion = convert(&field, &grid, &metadata, &ConversionOptions::default())
//!     .expect("should have converted the dose");
//! let output = assemble_rt_dose(
//!     &reference,
//!     &grid,
//!     &metadata,
//!     &conversion.encoded,
//!     &conversion.identity,
//!     table.patient.as_ref(),
//! )
//! .expect("should have assembled the RT Dose");
//! DoseFile::save(&output, "converted.dcm").expect("should have written the RT Dose");
//! ```

pub mod converter;
pub mod dose_file;
pub mod encoding;
pub mod enums;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod identity;
mod interpolator;
pub mod rtdose;
pub mod table;
pub mod volume;

pub use converter::{Conversion, ConversionOptions, convert};
pub use dose_file::{DoseFile, DoseFileError};
pub use encoding::{EncodedDoseVolume, EncodingOptions};
pub use enums::{Axis, Extrapolation, Orientation, PixelWidth};
pub use error::ConversionError;
pub use geometry::VoxelGrid;
pub use grid::{DoseSample, ScalarField3D};
pub use identity::OutputIdentity;
pub use interpolator::{DEFAULT_TOLERANCE, ResampleOptions};
pub use rtdose::{DoseMetadata, PatientInfo, assemble_rt_dose};
pub use table::{DoseTable, DoseTableError, TableLayout};
pub use volume::ResampledDoseVolume;
