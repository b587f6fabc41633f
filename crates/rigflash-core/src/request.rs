use std::path::PathBuf;

// Administrative account used for every connection; the stock firmware has no password.
pub const USERNAME: &str = "root";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HostnameMode {
    ForceKeep,
    ForceRegenerate,
    #[default]
    Conditional,
}

impl HostnameMode {
    pub fn from_flags(keep: bool, no_keep: bool) -> Self {
        if keep {
            Self::ForceKeep
        } else if no_keep {
            Self::ForceRegenerate
        } else {
            Self::Conditional
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ForceKeep => "yes",
            Self::ForceRegenerate => "no",
            Self::Conditional => "cond",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    pub hostname: String,
    pub backup: bool,
    pub nand_backup: bool,
    pub pool_user: Option<String>,
    pub psu_power_limit: Option<u32>,
    pub keep_network: bool,
    pub keep_pools: bool,
    pub keep_hostname: HostnameMode,
    pub wait: bool,
    pub dry_run: bool,
    pub post_upgrade: Option<PathBuf>,
}

impl UpgradeRequest {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            backup: false,
            nand_backup: true,
            pool_user: None,
            psu_power_limit: None,
            keep_network: true,
            keep_pools: true,
            keep_hostname: HostnameMode::Conditional,
            wait: true,
            dry_run: false,
            post_upgrade: None,
        }
    }
}
