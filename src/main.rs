use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use thiserror::Error;
use tracing::{Level, debug, error, info};

use dose_regrid::{
    Axis, ConversionError, ConversionOptions, DEFAULT_TOLERANCE, DoseFile, DoseFileError,
    DoseMetadata, DoseTable, DoseTableError, EncodingOptions, Extrapolation, Orientation,
    PixelWidth, ResampleOptions, ResampledDoseVolume, ScalarField3D, TableLayout, VoxelGrid,
    assemble_rt_dose, convert, encoding::DEFAULT_MIN_SCALE,
};

#[derive(Debug, Error)]
enum Error {
    #[error(transparent)]
    Table(#[from] DoseTableError),

    #[error(transparent)]
    File(#[from] DoseFileError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("Failed to write preview: {0}")]
    Preview(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExtrapolationArg {
    /// Use the dose at the nearest table boundary
    Clamp,
    /// Fail if a voxel lies outside the table
    Error,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BitsArg {
    #[value(name = "16")]
    Sixteen,
    #[value(name = "32")]
    ThirtyTwo,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OrientationArg {
    Axial,
    Coronal,
    Sagittal,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Convert a planning-system dose table to a DICOM RT Dose",
    long_about = None
)]
struct Args {
    /// Dose table saved as CSV (patient name, patient ID, header, samples)
    table: PathBuf,

    /// RT Dose providing the voxel grid and frame of reference
    reference: PathBuf,

    /// Where to write the converted RT Dose
    output: PathBuf,

    /// Show debug log
    #[arg(short, long)]
    debug: bool,

    /// What to do with voxels outside the dose table
    #[arg(long, value_enum, default_value_t = ExtrapolationArg::Clamp)]
    extrapolation: ExtrapolationArg,

    /// Distance (mm) at which a voxel center snaps onto a table coordinate
    #[arg(long, default_value_t = DEFAULT_TOLERANCE, value_parser = non_negative)]
    tolerance: f64,

    /// Bits per stored dose pixel
    #[arg(long, value_enum, default_value_t = BitsArg::ThirtyTwo)]
    bits: BitsArg,

    /// Smallest Dose Grid Scaling used for a non-empty dose
    #[arg(long, default_value_t = DEFAULT_MIN_SCALE, value_parser = positive)]
    min_scale: f64,

    /// Doses below this value (Gy) are stored as zero
    #[arg(long, default_value_t = 0.0, value_parser = non_negative)]
    noise_floor: f64,

    /// The table has no patient name and ID lines
    #[arg(long)]
    no_patient_header: bool,

    /// Table columns holding patient x, y and z
    #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], default_values = ["X", "Z", "Y"])]
    axis_columns: Vec<String>,

    /// Table column holding the dose
    #[arg(long, default_value = "Dose")]
    dose_column: String,

    /// Write the central slice of the converted dose as PNG
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Plane of the preview slice
    #[arg(long, value_enum, default_value_t = OrientationArg::Axial)]
    preview_orientation: OrientationArg,
}

fn non_negative(value: &str) -> Result<f64, String> {
    let value: f64 = value.parse().map_err(|e| format!("{e}"))?;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(format!("{value} is not a finite, non-negative number"))
    }
}

fn positive(value: &str) -> Result<f64, String> {
    let value: f64 = value.parse().map_err(|e| format!("{e}"))?;
    if value.is_normal() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("{value} is not a positive, finite number"))
    }
}

impl Args {
    fn layout(&self) -> TableLayout {
        let mut columns = self.axis_columns.iter().cloned();
        let mut next = |fallback: &str| columns.next().unwrap_or_else(|| fallback.to_string());
        TableLayout {
            x_column: next("X"),
            y_column: next("Z"),
            z_column: next("Y"),
            dose_column: self.dose_column.clone(),
            patient_header: !self.no_patient_header,
        }
    }

    fn options(&self) -> ConversionOptions {
        ConversionOptions {
            resample: ResampleOptions {
                extrapolation: match self.extrapolation {
                    ExtrapolationArg::Clamp => Extrapolation::Clamp,
                    ExtrapolationArg::Error => Extrapolation::Error,
                },
                tolerance: self.tolerance,
            },
            encoding: EncodingOptions {
                pixel_width: match self.bits {
                    BitsArg::Sixteen => PixelWidth::U16,
                    BitsArg::ThirtyTwo => PixelWidth::U32,
                },
                min_scale: self.min_scale,
                noise_floor: self.noise_floor,
            },
        }
    }

    fn preview_orientation(&self) -> Orientation {
        match self.preview_orientation {
            OrientationArg::Axial => Orientation::Axial,
            OrientationArg::Coronal => Orientation::Coronal,
            OrientationArg::Sagittal => Orientation::Sagittal,
        }
    }
}

fn main() {
    let args = Args::parse();

    let level = if args.debug { Level::DEBUG } else { Level::INFO };
    if let Err(e) = tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .finish(),
    ) {
        eprintln!("[ERROR] Could not set up global logging subscriber: {e}");
    }

    run(&args).unwrap_or_else(|e| {
        error!("{e}");
        std::process::exit(1);
    });
}

fn run(args: &Args) -> Result<(), Error> {
    let table = DoseTable::read_from_path(&args.table, &args.layout())?;
    let field = ScalarField3D::from_samples(&table.samples)?;
    debug!(
        dim = ?field.dim(),
        x = ?field.bounds(Axis::X),
        y = ?field.bounds(Axis::Y),
        z = ?field.bounds(Axis::Z),
        "parsed dose table"
    );

    let reference = DoseFile::open_reference(&args.reference)?;
    let grid = VoxelGrid::from_dicom(&reference)?;
    let metadata = DoseMetadata::from_dicom(&reference)?;
    debug!(
        dim = ?grid.dim(),
        origin = ?grid.origin(),
        spacing = ?grid.spacing(),
        frame_of_reference = %metadata.frame_of_reference_uid,
        "read reference grid"
    );

    let conversion = convert(&field, &grid, &metadata, &args.options())?;
    info!(
        dose_grid_scaling = conversion.encoded.scale(),
        sop_instance_uid = %conversion.identity.sop_instance_uid,
        "resampled dose onto reference grid"
    );

    let output = assemble_rt_dose(
        &reference,
        &grid,
        &metadata,
        &conversion.encoded,
        &conversion.identity,
        table.patient.as_ref(),
    )?;
    DoseFile::save(&output, &args.output)?;

    if let Some(path) = &args.preview {
        let volume = ResampledDoseVolume::new(conversion.encoded.decode());
        let orientation = args.preview_orientation();
        let (nx, ny, nz) = volume.dim();
        let index = match orientation {
            Orientation::Axial => nz / 2,
            Orientation::Coronal => ny / 2,
            Orientation::Sagittal => nx / 2,
        };
        match volume.preview(index, orientation) {
            Some(image) => {
                image.save(path)?;
                info!(path = %path.display(), "wrote preview");
            }
            None => debug!(index, "no preview slice"),
        }
    }

    Ok(())
}
