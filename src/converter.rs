use crate::encoding::{EncodedDoseVolume, EncodingOptions};
use crate::error::Result;
use crate::geometry::VoxelGrid;
use crate::grid::ScalarField3D;
use crate::identity::OutputIdentity;
use crate::interpolator::ResampleOptions;
use crate::rtdose::DoseMetadata;
use crate::volume::ResampledDoseVolume;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConversionOptions {
    pub resample: ResampleOptions,
    pub encoding: EncodingOptions,
}

/// Result of one conversion run.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub encoded: EncodedDoseVolume,
    pub identity: OutputIdentity,
}

/// Resample `field` onto `grid`, quantize it and mint the identifiers of
/// the new RT Dose.
///
/// Pure apart from the random identifiers; nothing is logged.
pub fn convert(
    field: &ScalarField3D,
    grid: &VoxelGrid,
    metadata: &DoseMetadata,
    options: &ConversionOptions,
) -> Result<Conversion> {
    let volume = ResampledDoseVolume::resample(field, grid, &options.resample)?;
    let encoded = EncodedDoseVolume::encode(&volume, &options.encoding)?;
    let identity = OutputIdentity::generate(&metadata.source_uids())?;
    Ok(Conversion { encoded, identity })
}
