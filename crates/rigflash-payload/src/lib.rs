mod archive;
mod bundle;
mod staged;

pub use archive::write_stage3_archive;
pub use bundle::{
    BundleError, PostUpgradeBundle, STAGE3_DIR, STAGE3_FILE, STAGE3_SCRIPT, STAGE3_USER_SCRIPT,
};
pub use staged::{PayloadError, StagedPayload};
