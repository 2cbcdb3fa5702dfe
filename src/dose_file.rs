use std::path::Path;

use dicom::object::{DefaultDicomObject, ReadError, WriteError, open_file};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum DoseFileError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: ReadError,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: WriteError,
    },
}

pub struct DoseFile;

impl DoseFile {
    /// Open the reference RT Dose the converted dose is aligned to.
    pub fn open_reference(path: impl AsRef<Path>) -> Result<DefaultDicomObject, DoseFileError> {
        let path = path.as_ref();
        let object = open_file(path).map_err(|source| DoseFileError::Read {
            path: path.display().to_string(),
            source,
        })?;
        debug!(
            path = %path.display(),
            transfer_syntax = object.meta().transfer_syntax(),
            "opened reference"
        );
        Ok(object)
    }

    /// Write a DICOM Part 10 file.
    pub fn save(object: &DefaultDicomObject, path: impl AsRef<Path>) -> Result<(), DoseFileError> {
        let path = path.as_ref();
        object
            .write_to_file(path)
            .map_err(|source| DoseFileError::Write {
                path: path.display().to_string(),
                source,
            })?;
        info!(path = %path.display(), "wrote RT Dose");
        Ok(())
    }
}
