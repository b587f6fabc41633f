use std::fmt;

use thiserror::Error;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_TRANSPORT: i32 = 1;
pub const EXIT_STOP: i32 = 2;
pub const EXIT_PLATFORM: i32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    IncompatibleTarget { board_name: String },
    PostUpgradeBundle(String),
    LocalPayload(String),
    MacUnavailable,
    BackupFailed,
    RemoteCommandFailed { command: String, status: i32 },
    RemoteScriptFailed { status: i32 },
    DryRunComplete,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncompatibleTarget { board_name } => {
                write!(f, "remote target with board name '{board_name}' is not supported")
            }
            Self::PostUpgradeBundle(reason) => write!(f, "{reason}"),
            Self::LocalPayload(reason) => write!(f, "local payload error: {reason}"),
            Self::MacUnavailable => write!(f, "miner MAC address is not readable"),
            Self::BackupFailed => write!(f, "backup of the remote target failed"),
            Self::RemoteCommandFailed { command, status } => {
                write!(f, "remote command '{command}' failed with exit status {status}")
            }
            Self::RemoteScriptFailed { status } => {
                write!(f, "upgrade script failed with exit status {status}")
            }
            Self::DryRunComplete => write!(f, "dry run finished without upgrading"),
        }
    }
}

#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("{0:#}")]
    Transport(anyhow::Error),
    #[error("{0}")]
    Stop(StopReason),
    #[error("{0}")]
    Platform(String),
}

impl UpgradeError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Transport(_) => EXIT_TRANSPORT,
            Self::Stop(_) => EXIT_STOP,
            Self::Platform(_) => EXIT_PLATFORM,
        }
    }
}

impl From<StopReason> for UpgradeError {
    fn from(reason: StopReason) -> Self {
        Self::Stop(reason)
    }
}

#[derive(Debug)]
pub enum UpgradeOutcome {
    Success,
    DryRunSuccess,
    IncompatibleTarget { board_name: String },
    PostUpgradeBundleMissing { reason: String },
    Fatal(UpgradeError),
}

impl UpgradeOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success => EXIT_SUCCESS,
            Self::DryRunSuccess => EXIT_STOP,
            Self::IncompatibleTarget { .. } => EXIT_STOP,
            Self::PostUpgradeBundleMissing { .. } => EXIT_STOP,
            Self::Fatal(err) => err.exit_code(),
        }
    }
}

impl From<UpgradeError> for UpgradeOutcome {
    fn from(err: UpgradeError) -> Self {
        match err {
            UpgradeError::Stop(StopReason::IncompatibleTarget { board_name }) => {
                Self::IncompatibleTarget { board_name }
            }
            UpgradeError::Stop(StopReason::PostUpgradeBundle(reason)) => {
                Self::PostUpgradeBundleMissing { reason }
            }
            UpgradeError::Stop(StopReason::DryRunComplete) => Self::DryRunSuccess,
            other => Self::Fatal(other),
        }
    }
}
