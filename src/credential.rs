//! QR credential images for inserted visitors.

use std::path::{Path, PathBuf};

use image::{ImageFormat, Luma};
use qrcode::{EcLevel, QrCode, Version};
use tracing::debug;

use crate::error::CredentialError;

/// Pixels per QR module.
pub const MODULE_SCALE: u32 = 10;

/// Symbol version tried first (21×21 modules).
pub const SYMBOL_VERSION: Version = Version::Normal(1);

/// Low error correction, roughly 7% recoverable.
pub const EC_LEVEL: EcLevel = EcLevel::L;

/// Writes one PNG per visitor into a fixed directory.
#[derive(Debug, Clone)]
pub struct CredentialImageEmitter {
    output_dir: PathBuf,
}

impl CredentialImageEmitter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `<output_dir>/<lastname>.png`, with path separators replaced.
    pub fn path_for(&self, lastname: &str) -> PathBuf {
        let stem: String = lastname
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        self.output_dir.join(format!("{stem}.png"))
    }

    /// Encode `payload` and write it to `path`, replacing any existing file.
    pub fn emit(&self, payload: &str, path: &Path) -> Result<(), CredentialError> {
        let code = QrCode::with_version(payload.as_bytes(), SYMBOL_VERSION, EC_LEVEL)
            .or_else(|_| QrCode::with_error_correction_level(payload.as_bytes(), EC_LEVEL))
            .map_err(|e| CredentialError::Encode {
                payload: payload.to_string(),
                reason: e.to_string(),
            })?;

        let image = code
            .render::<Luma<u8>>()
            .module_dimensions(MODULE_SCALE, MODULE_SCALE)
            .quiet_zone(true)
            .dark_color(Luma([0u8]))
            .light_color(Luma([255u8]))
            .build();

        image
            .save_with_format(path, ImageFormat::Png)
            .map_err(|e| CredentialError::Write {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        debug!(path = %path.display(), payload, "Credential image written");
        Ok(())
    }
}
