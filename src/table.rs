use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use thiserror::Error;
use tracing::debug;

use crate::grid::DoseSample;
use crate::rtdose::PatientInfo;

#[derive(Debug, Error)]
pub enum DoseTableError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Dose table ends before its {0}")]
    Truncated(&'static str),

    #[error("Dose table has no column named {0:?}")]
    MissingColumn(String),

    #[error("Line {line}: {value:?} in column {column:?} is not a number")]
    InvalidNumber {
        line: u64,
        column: String,
        value: String,
    },
}

/// Where the dose table keeps its data.
///
/// The planning system writes its own X, Y and Z columns; the column names
/// below say which of them holds each patient axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub x_column: String,
    pub y_column: String,
    pub z_column: String,
    pub dose_column: String,
    /// First two lines hold the patient name and ID.
    pub patient_header: bool,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            x_column: "X".to_string(),
            y_column: "Z".to_string(),
            z_column: "Y".to_string(),
            dose_column: "Dose".to_string(),
            patient_header: true,
        }
    }
}

/// Long-format dose export: one `(x, y, z, dose)` sample per line.
#[derive(Debug, Clone, PartialEq)]
pub struct DoseTable {
    pub patient: Option<PatientInfo>,
    pub samples: Vec<DoseSample>,
}

impl DoseTable {
    /// Read a dose table saved as CSV.
    pub fn read_from_path(
        path: impl AsRef<Path>,
        layout: &TableLayout,
    ) -> Result<Self, DoseTableError> {
        let file = File::open(path.as_ref())?;
        let table = Self::read(file, layout)?;
        debug!(
            path = %path.as_ref().display(),
            samples = table.samples.len(),
            "read dose table"
        );
        Ok(table)
    }

    pub fn read(reader: impl Read, layout: &TableLayout) -> Result<Self, DoseTableError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);
        let mut records = reader
            .records()
            .filter(|record| !record.as_ref().is_ok_and(Self::is_blank));

        let patient = if layout.patient_header {
            let name = Self::first_cell(records.next(), "patient name")?;
            let id = Self::first_cell(records.next(), "patient ID")?;
            Some(PatientInfo { name, id })
        } else {
            None
        };

        let header = records
            .next()
            .ok_or(DoseTableError::Truncated("column header"))??;
        let column = |name: &String| {
            header
                .iter()
                .position(|cell| cell == name.as_str())
                .ok_or_else(|| DoseTableError::MissingColumn(name.clone()))
        };
        let x = column(&layout.x_column)?;
        let y = column(&layout.y_column)?;
        let z = column(&layout.z_column)?;
        let dose = column(&layout.dose_column)?;

        let mut samples = Vec::new();
        for record in records {
            let record = record?;
            let line = record.position().map_or(0, |p| p.line());
            let number = |index: usize| -> Result<f64, DoseTableError> {
                let value = record.get(index).unwrap_or_default();
                value.parse().map_err(|_| DoseTableError::InvalidNumber {
                    line,
                    column: header.get(index).unwrap_or_default().to_string(),
                    value: value.to_string(),
                })
            };
            samples.push(DoseSample {
                x: number(x)?,
                y: number(y)?,
                z: number(z)?,
                dose: number(dose)?,
            });
        }

        Ok(Self { patient, samples })
    }

    fn is_blank(record: &StringRecord) -> bool {
        record.iter().all(str::is_empty)
    }

    fn first_cell(
        record: Option<Result<StringRecord, csv::Error>>,
        what: &'static str,
    ) -> Result<String, DoseTableError> {
        let record = record.ok_or(DoseTableError::Truncated(what))??;
        Ok(record.get(0).unwrap_or_default().to_string())
    }
}
