use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::bundle::{BundleError, PostUpgradeBundle};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("firmware directory '{}' is missing or is not a directory", .0.display())]
    MissingFirmware(PathBuf),
    #[error(transparent)]
    Bundle(#[from] BundleError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedPayload {
    pub firmware_dir: PathBuf,
    pub post_upgrade: Option<PostUpgradeBundle>,
}

impl StagedPayload {
    pub fn resolve(
        firmware_dir: &Path,
        builtin_post_upgrade: &Path,
        user_post_upgrade: Option<&Path>,
    ) -> Result<Self, PayloadError> {
        let post_upgrade = PostUpgradeBundle::resolve(builtin_post_upgrade, user_post_upgrade)?;
        if !firmware_dir.is_dir() {
            return Err(PayloadError::MissingFirmware(firmware_dir.to_path_buf()));
        }
        Ok(Self {
            firmware_dir: firmware_dir.to_path_buf(),
            post_upgrade,
        })
    }
}
