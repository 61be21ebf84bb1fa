//! Calibration file loading

use crate::calibration::{ExtrinsicTransform, column_major_index};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default calibration filename, resolved against the working directory.
pub const DEFAULT_CALIBRATION_FILE: &str = "H_t265_d400.txt";

/// Errors from parsing calibration text.
#[derive(Debug, Error)]
pub enum CalibrationError {
    /// Fewer than 16 values could be read. `partial` holds the values that
    /// were read, with default entries everywhere else.
    #[error("Calibration holds {read} of 16 values")]
    Incomplete {
        read: usize,
        partial: ExtrinsicTransform,
    },
}

impl ExtrinsicTransform {
    /// Load the extrinsic from a whitespace-delimited text file.
    ///
    /// Never fails: a missing file yields [`ExtrinsicTransform::default`],
    /// and a short or malformed file keeps default values for every entry
    /// it never reached. A malformed token itself reads as zero. Both cases
    /// are logged.
    pub fn load(path: impl AsRef<Path>) -> Self {
        load_from(path.as_ref())
    }

    /// Parse 16 row-major values into column-major storage.
    ///
    /// Reading stops at the first token that is not a float, and that entry
    /// is stored as 0. Running out of tokens leaves the remaining entries at
    /// their defaults. Values past the sixteenth are ignored.
    pub fn parse(text: &str) -> Result<Self, CalibrationError> {
        let mut values = Self::DEFAULT_COLUMN_MAJOR;
        let mut tokens = text.split_whitespace();

        for read in 0..16 {
            let index = column_major_index(read / 4, read % 4);
            match tokens.next().map(str::parse::<f32>) {
                Some(Ok(value)) => values[index] = value,
                failed => {
                    if failed.is_some() {
                        values[index] = 0.0;
                    }
                    return Err(CalibrationError::Incomplete {
                        read,
                        partial: Self::from_column_major(&values),
                    });
                }
            }
        }

        if tokens.next().is_some() {
            debug!("Ignoring trailing values after 16 calibration entries");
        }
        Ok(Self::from_column_major(&values))
    }
}

#[tracing::instrument(skip_all, fields(path = %path.display()))]
fn load_from(path: &Path) -> ExtrinsicTransform {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(
                "Couldn't open {} ({}); using default depth-to-tracking extrinsic",
                path.display(),
                e
            );
            return ExtrinsicTransform::default();
        }
    };

    match ExtrinsicTransform::parse(&text) {
        Ok(extrinsic) => {
            info!("Loaded extrinsic calibration from {}", path.display());
            debug!("Extrinsic: {:?}", extrinsic.matrix());
            extrinsic
        }
        Err(CalibrationError::Incomplete { read, partial }) => {
            warn!(
                "Calibration file {} holds only {} of 16 values; remaining entries keep defaults",
                path.display(),
                read
            );
            partial
        }
    }
}
