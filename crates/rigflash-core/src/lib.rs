mod compat;
mod outcome;
mod request;
mod settings;
mod stage1;

pub use compat::{
    assess_board_name, CompatibilityReport, BOARD_NAME_PATH, LEGACY_BOARD_NAMES,
};
pub use outcome::{
    StopReason, UpgradeError, UpgradeOutcome, EXIT_PLATFORM, EXIT_STOP, EXIT_SUCCESS,
    EXIT_TRANSPORT,
};
pub use request::{HostnameMode, UpgradeRequest, USERNAME};
pub use settings::Settings;
pub use stage1::{
    shell_quote, PsuPowerLimit, Stage1Args, PSU_POWER_LIMIT_DEFAULT, REMOTE_TARGET_DIR,
    STAGE1_ARITY, STAGE1_SCRIPT,
};
