use ndarray::{Array3, Zip};

use crate::enums::PixelWidth;
use crate::error::{ConversionError, Result};
use crate::volume::ResampledDoseVolume;

/// Lower bound for the dose grid scaling of a non-empty volume.
pub const DEFAULT_MIN_SCALE: f64 = 1e-12;

/// Significant digits kept in the stored scale factor. Nine digits in
/// exponent form stay within the 16 characters of a DS value.
const SCALE_DIGITS: i32 = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodingOptions {
    pub pixel_width: PixelWidth,
    pub min_scale: f64,
    /// Doses below this value are stored as zero.
    pub noise_floor: f64,
}

impl EncodingOptions {
    /// Reject a minimum scale that is not a positive normal number, or a
    /// noise floor that is negative or not finite.
    pub fn validate(&self) -> Result<()> {
        if !(self.min_scale.is_normal() && self.min_scale > 0.0) {
            return Err(ConversionError::InvalidOption {
                name: "minimum scale",
                value: self.min_scale,
                reason: "must be a positive, finite, normal number",
            });
        }
        if !self.noise_floor.is_finite() || self.noise_floor < 0.0 {
            return Err(ConversionError::InvalidOption {
                name: "noise floor",
                value: self.noise_floor,
                reason: "must be a finite, non-negative dose",
            });
        }
        Ok(())
    }
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self {
            pixel_width: PixelWidth::default(),
            min_scale: DEFAULT_MIN_SCALE,
            noise_floor: 0.0,
        }
    }
}

/// Integer dose pixels plus the factor that turns them back into dose:
/// `dose = raw * scale`.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedDoseVolume {
    data: Array3<u32>,
    scale: f64,
    pixel_width: PixelWidth,
}

impl EncodedDoseVolume {
    /// Quantize a resampled volume, spending the full pixel range on its
    /// maximum dose.
    ///
    /// An all-zero volume encodes to zeros with a scale of 1.0.
    ///
    /// # Errors
    ///
    /// [`ConversionError::EncodingRange`] if a raw value ends up outside the
    /// pixel range, which the clamp below rules out.
    pub fn encode(volume: &ResampledDoseVolume, options: &EncodingOptions) -> Result<Self> {
        options.validate()?;
        let max_raw = options.pixel_width.max_value();
        let floor = options.noise_floor;
        let peak = volume.max();
        let peak = if peak < floor { 0.0 } else { peak };
        let scale = Self::scale_for(peak, max_raw, options.min_scale)?;

        let data = Zip::from(volume.data()).par_map_collect(|&dose| {
            if dose < floor {
                0
            } else {
                (dose / scale).round().clamp(0.0, max_raw as f64) as u32
            }
        });

        if let Some(&value) = data.iter().find(|&&raw| raw > max_raw) {
            return Err(ConversionError::EncodingRange {
                value: value.into(),
                bits: options.pixel_width.bits(),
            });
        }

        Ok(Self {
            data,
            scale,
            pixel_width: options.pixel_width,
        })
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn pixel_width(&self) -> PixelWidth {
        self.pixel_width
    }

    /// Raw pixels indexed `[x, y, z]`.
    pub fn data(&self) -> &Array3<u32> {
        &self.data
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Pixels in storage order: frame by frame, row by row, column index fastest.
    pub fn frame_major_pixels(&self) -> Vec<u32> {
        self.data.view().permuted_axes([2, 1, 0]).iter().copied().collect()
    }

    /// Physical dose of every voxel.
    pub fn decode(&self) -> Array3<f64> {
        let scale = self.scale;
        self.data.mapv(|raw| raw as f64 * scale)
    }

    fn scale_for(peak: f64, max_raw: u32, min_scale: f64) -> Result<f64> {
        if peak.is_nan() || peak <= 0.0 {
            return Ok(1.0);
        }
        let scale = (peak / max_raw as f64).max(min_scale);
        representable_scale(scale).ok_or(ConversionError::InvalidOption {
            name: "dose grid scaling",
            value: scale,
            reason: "has no nine-digit decimal form",
        })
    }
}

/// Smallest value not below `scale` that survives a round trip through its
/// nine-digit decimal form, or `None` if `scale` is not a positive normal
/// number.
pub(crate) fn representable_scale(scale: f64) -> Option<f64> {
    if !(scale.is_normal() && scale > 0.0) {
        return None;
    }
    let exponent = scale.log10().floor() as i32 - (SCALE_DIGITS - 1);
    let digits = (scale / 10f64.powi(exponent)).floor();
    if !digits.is_finite() {
        return None;
    }
    // Flooring loses at most one unit in the last digit, plus rounding in
    // the division above.
    (0..4).map(|step| digits + f64::from(step)).find_map(|digits| {
        format!("{digits}e{exponent}")
            .parse::<f64>()
            .ok()
            .filter(|candidate| *candidate >= scale)
    })
}
