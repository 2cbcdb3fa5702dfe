use uuid::Uuid;

use crate::error::{ConversionError, Result};

/// Root for UUID-derived UIDs (ISO/IEC 9834-8, DICOM PS3.5 B.2).
pub const UUID_UID_ROOT: &str = "2.25";

const MAX_UID_LENGTH: usize = 64;

/// Draws per identifier before giving up on finding an unused one.
const MAX_ATTEMPTS: usize = 8;

/// Identifiers minted for one converted RT Dose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputIdentity {
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub sop_instance_uid: String,
}

impl OutputIdentity {
    /// Mint fresh random UIDs that collide neither with each other nor with
    /// any of `taken`.
    pub fn generate(taken: &[&str]) -> Result<Self> {
        Self::generate_with(taken, random_uid)
    }

    /// Same as [`OutputIdentity::generate`], drawing candidates from `next`.
    ///
    /// # Errors
    ///
    /// [`ConversionError::IdentityGeneration`] if `next` yields a malformed
    /// UID or keeps repeating identifiers that are already in use.
    pub fn generate_with(taken: &[&str], mut next: impl FnMut() -> String) -> Result<Self> {
        let study_instance_uid = Self::draw(taken, &[], &mut next)?;
        let series_instance_uid = Self::draw(taken, &[study_instance_uid.as_str()], &mut next)?;
        let sop_instance_uid = Self::draw(
            taken,
            &[study_instance_uid.as_str(), series_instance_uid.as_str()],
            &mut next,
        )?;
        Ok(Self {
            study_instance_uid,
            series_instance_uid,
            sop_instance_uid,
        })
    }

    fn draw(taken: &[&str], issued: &[&str], next: &mut impl FnMut() -> String) -> Result<String> {
        let uid = (0..MAX_ATTEMPTS)
            .map(|_| next())
            .find(|candidate| {
                let candidate = candidate.as_str();
                !taken.contains(&candidate) && !issued.contains(&candidate)
            })
            .ok_or_else(|| {
                ConversionError::IdentityGeneration(format!(
                    "no unused identifier after {MAX_ATTEMPTS} attempts"
                ))
            })?;
        if !is_valid_uid(&uid) {
            return Err(ConversionError::IdentityGeneration(format!(
                "generated identifier {uid:?} is not a valid UID"
            )));
        }
        Ok(uid)
    }

    pub fn uids(&self) -> [&str; 3] {
        [
            self.study_instance_uid.as_str(),
            self.series_instance_uid.as_str(),
            self.sop_instance_uid.as_str(),
        ]
    }
}

/// A `2.25.` UID built from a random (version 4) UUID.
pub fn random_uid() -> String {
    format!("{UUID_UID_ROOT}.{}", Uuid::new_v4().as_u128())
}

/// Dot-separated numeric components without leading zeros, at most 64 characters.
pub fn is_valid_uid(uid: &str) -> bool {
    uid.len() <= MAX_UID_LENGTH
        && uid.split('.').all(|component| {
            !component.is_empty()
                && component.bytes().all(|b| b.is_ascii_digit())
                && (component == "0" || !component.starts_with('0'))
        })
}
