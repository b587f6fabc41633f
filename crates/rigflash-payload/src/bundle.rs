use std::path::{Path, PathBuf};

use thiserror::Error;

pub const STAGE3_DIR: &str = "upgrade";
pub const STAGE3_FILE: &str = "stage3.tgz";
pub const STAGE3_SCRIPT: &str = "stage3.sh";
pub const STAGE3_USER_SCRIPT: &str = "stage3_usr.sh";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BundleError {
    #[error("post-upgrade path '{}' is missing or is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("script 'stage3.sh' is missing in '{}'", .0.display())]
    MissingScript(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostUpgradeBundle {
    builtin: Option<PathBuf>,
    user: Option<PathBuf>,
}

impl PostUpgradeBundle {
    pub fn resolve(builtin_dir: &Path, user_dir: Option<&Path>) -> Result<Option<Self>, BundleError> {
        if let Some(user_dir) = user_dir {
            check_stage3_dir(user_dir)?;
        }
        let builtin = if builtin_dir.is_dir() {
            check_stage3_dir(builtin_dir)?;
            Some(builtin_dir.to_path_buf())
        } else {
            None
        };

        if builtin.is_none() && user_dir.is_none() {
            return Ok(None);
        }
        Ok(Some(Self {
            builtin,
            user: user_dir.map(Path::to_path_buf),
        }))
    }

    pub fn builtin(&self) -> Option<&Path> {
        self.builtin.as_deref()
    }

    pub fn user(&self) -> Option<&Path> {
        self.user.as_deref()
    }

    // Only one `stage3.sh` may be discoverable; the built-in one wins.
    pub fn relocates_user_script(&self) -> bool {
        self.builtin.is_some() && self.user.is_some()
    }
}

fn check_stage3_dir(path: &Path) -> Result<(), BundleError> {
    if !path.is_dir() {
        return Err(BundleError::NotADirectory(path.to_path_buf()));
    }
    if !path.join(STAGE3_SCRIPT).is_file() {
        return Err(BundleError::MissingScript(path.to_path_buf()));
    }
    Ok(())
}
