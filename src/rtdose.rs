use dicom::core::value::C;
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::object::{DefaultDicomObject, InMemDicomObject};
use dicom_dictionary_std::{tags, uids};

use crate::encoding::EncodedDoseVolume;
use crate::enums::PixelWidth;
use crate::error::{ConversionError, Result};
use crate::geometry::VoxelGrid;
use crate::identity::OutputIdentity;

/// Longest value a DS element may hold.
const DS_MAX_LENGTH: usize = 16;

/// Patient demographics carried over from the dose table header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientInfo {
    pub name: String,
    pub id: String,
}

/// Dosimetric and frame-of-reference attributes of the reference RT Dose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoseMetadata {
    pub frame_of_reference_uid: String,
    pub dose_units: String,
    pub dose_type: String,
    pub dose_summation_type: String,
    /// Study, series and SOP instance UIDs of the reference itself.
    pub source_uids: Vec<String>,
}

impl DoseMetadata {
    /// Read the attributes the converted dose inherits from the reference.
    ///
    /// Only the Frame of Reference UID is mandatory; the dose attributes
    /// fall back to `GY`, `PHYSICAL` and `PLAN`.
    pub fn from_dicom(object: &InMemDicomObject) -> Result<Self> {
        let frame_of_reference_uid = text(object, tags::FRAME_OF_REFERENCE_UID).ok_or_else(|| {
            ConversionError::MissingGeometry("Frame of Reference UID is absent".to_string())
        })?;

        let source_uids = [
            tags::STUDY_INSTANCE_UID,
            tags::SERIES_INSTANCE_UID,
            tags::SOP_INSTANCE_UID,
        ]
        .into_iter()
        .filter_map(|tag| text(object, tag))
        .collect();

        Ok(Self {
            frame_of_reference_uid,
            dose_units: text(object, tags::DOSE_UNITS).unwrap_or_else(|| "GY".to_string()),
            dose_type: text(object, tags::DOSE_TYPE).unwrap_or_else(|| "PHYSICAL".to_string()),
            dose_summation_type: text(object, tags::DOSE_SUMMATION_TYPE)
                .unwrap_or_else(|| "PLAN".to_string()),
            source_uids,
        })
    }

    pub fn source_uids(&self) -> Vec<&str> {
        self.source_uids.iter().map(String::as_str).collect()
    }
}

/// Build the converted RT Dose from a copy of the reference.
///
/// Spatial attributes come from `grid`, pixels and Dose Grid Scaling from
/// `encoded`, identifiers from `identity` and the frame of reference from
/// `metadata`. The reference's DVH Sequence is dropped since it describes
/// the old pixel data.
pub fn assemble_rt_dose(
    reference: &DefaultDicomObject,
    grid: &VoxelGrid,
    metadata: &DoseMetadata,
    encoded: &EncodedDoseVolume,
    identity: &OutputIdentity,
    patient: Option<&PatientInfo>,
) -> Result<DefaultDicomObject> {
    if encoded.dim() != grid.dim() {
        return Err(ConversionError::MissingGeometry(format!(
            "encoded volume {:?} does not match the reference grid {:?}",
            encoded.dim(),
            grid.dim()
        )));
    }
    let (columns, rows, frames) = grid.dim();
    let mut output = reference.clone();

    output.put(DataElement::new(
        tags::ROWS,
        VR::US,
        PrimitiveValue::from(dimension(rows, "Rows")?),
    ));
    output.put(DataElement::new(
        tags::COLUMNS,
        VR::US,
        PrimitiveValue::from(dimension(columns, "Columns")?),
    ));
    output.put(DataElement::new(
        tags::NUMBER_OF_FRAMES,
        VR::IS,
        PrimitiveValue::from(frames.to_string()),
    ));

    let directions = grid.directions();
    let spacing = grid.spacing();
    put_ds(&mut output, tags::IMAGE_POSITION_PATIENT, &grid.origin())?;
    put_ds(
        &mut output,
        tags::IMAGE_ORIENTATION_PATIENT,
        &[directions[0], directions[1]].concat(),
    )?;
    put_ds(&mut output, tags::PIXEL_SPACING, &[spacing[1], spacing[0]])?;
    put_ds(&mut output, tags::GRID_FRAME_OFFSET_VECTOR, &grid.frame_offsets())?;
    output.put(DataElement::new(
        tags::FRAME_INCREMENT_POINTER,
        VR::AT,
        PrimitiveValue::Tags(C::from_vec(vec![tags::GRID_FRAME_OFFSET_VECTOR])),
    ));

    let bits = encoded.pixel_width().bits();
    output.put(DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)));
    output.put(DataElement::new(
        tags::PHOTOMETRIC_INTERPRETATION,
        VR::CS,
        PrimitiveValue::from("MONOCHROME2"),
    ));
    output.put(DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(bits)));
    output.put(DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(bits)));
    output.put(DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(bits - 1)));
    output.put(DataElement::new(
        tags::PIXEL_REPRESENTATION,
        VR::US,
        PrimitiveValue::from(0_u16),
    ));
    put_ds(&mut output, tags::DOSE_GRID_SCALING, &[encoded.scale()])?;
    output.put(DataElement::new(tags::PIXEL_DATA, VR::OW, pixel_value(encoded)?));

    for (tag, value) in [
        (tags::DOSE_UNITS, &metadata.dose_units),
        (tags::DOSE_TYPE, &metadata.dose_type),
        (tags::DOSE_SUMMATION_TYPE, &metadata.dose_summation_type),
    ] {
        output.put(DataElement::new(tag, VR::CS, PrimitiveValue::from(value.as_str())));
    }
    for (tag, uid) in [
        (tags::FRAME_OF_REFERENCE_UID, &metadata.frame_of_reference_uid),
        (tags::STUDY_INSTANCE_UID, &identity.study_instance_uid),
        (tags::SERIES_INSTANCE_UID, &identity.series_instance_uid),
        (tags::SOP_INSTANCE_UID, &identity.sop_instance_uid),
    ] {
        output.put(DataElement::new(tag, VR::UI, PrimitiveValue::from(uid.as_str())));
    }

    if let Some(patient) = patient {
        output.put(DataElement::new(
            tags::PATIENT_NAME,
            VR::PN,
            PrimitiveValue::from(patient.name.as_str()),
        ));
        output.put(DataElement::new(
            tags::PATIENT_ID,
            VR::LO,
            PrimitiveValue::from(patient.id.as_str()),
        ));
    }

    output.remove_element(tags::DVH_SEQUENCE);

    let sop_instance_uid = even_padded(&identity.sop_instance_uid);
    output.update_meta(|meta| {
        meta.media_storage_sop_instance_uid = sop_instance_uid;
        // Native pixel data, whatever the reference was stored as.
        meta.transfer_syntax = even_padded(uids::EXPLICIT_VR_LITTLE_ENDIAN);
    });

    Ok(output)
}

/// Format a number for a DS element, switching to exponent form when the
/// plain form does not fit.
pub fn format_ds(value: f64) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    let plain = format!("{value}");
    if plain.len() <= DS_MAX_LENGTH {
        return Some(plain);
    }
    (0..=8)
        .rev()
        .map(|precision| format!("{value:.precision$e}"))
        .find(|text| text.len() <= DS_MAX_LENGTH)
}

fn put_ds(object: &mut DefaultDicomObject, tag: Tag, values: &[f64]) -> Result<()> {
    let strings = values
        .iter()
        .map(|&value| {
            format_ds(value).ok_or_else(|| {
                ConversionError::MissingGeometry(format!(
                    "{value} cannot be stored in attribute {tag}"
                ))
            })
        })
        .collect::<Result<C<String>>>()?;
    object.put(DataElement::new(tag, VR::DS, PrimitiveValue::Strs(strings)));
    Ok(())
}

fn pixel_value(encoded: &EncodedDoseVolume) -> Result<PrimitiveValue> {
    let pixels = encoded.frame_major_pixels();
    match encoded.pixel_width() {
        PixelWidth::U32 => Ok(PrimitiveValue::U32(C::from_vec(pixels))),
        PixelWidth::U16 => narrow_to_u16(pixels).map(PrimitiveValue::U16),
    }
}

fn narrow_to_u16(pixels: Vec<u32>) -> Result<C<u16>> {
    pixels
        .into_iter()
        .map(|raw| {
            u16::try_from(raw).map_err(|_| ConversionError::EncodingRange {
                value: raw.into(),
                bits: 16,
            })
        })
        .collect()
}

fn dimension(count: usize, name: &str) -> Result<u16> {
    u16::try_from(count).map_err(|_| {
        ConversionError::MissingGeometry(format!("{name} value {count} does not fit in 16 bits"))
    })
}

fn text(object: &InMemDicomObject, tag: Tag) -> Option<String> {
    let value = object.element(tag).ok()?.to_str().ok()?;
    let value = value.trim_end_matches(['\0', ' ']).trim_start();
    (!value.is_empty()).then(|| value.to_string())
}

fn even_padded(uid: &str) -> String {
    let mut uid = uid.trim_end_matches('\0').to_string();
    if uid.len() % 2 == 1 {
        uid.push('\0');
    }
    uid
}
