use crate::request::{HostnameMode, UpgradeRequest};

pub const REMOTE_TARGET_DIR: &str = "/tmp/firmware";
pub const STAGE1_SCRIPT: &str = "stage1.sh";
pub const STAGE1_ARITY: usize = 7;
pub const PSU_POWER_LIMIT_DEFAULT: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsuPowerLimit {
    Default,
    // Zero on the command line; turns autotuning off.
    Disabled,
    Watts(u32),
}

impl PsuPowerLimit {
    pub fn from_option(value: Option<u32>) -> Self {
        match value {
            None => Self::Default,
            Some(0) => Self::Disabled,
            Some(watts) => Self::Watts(watts),
        }
    }

    pub fn as_arg(self) -> String {
        match self {
            Self::Default => PSU_POWER_LIMIT_DEFAULT.to_string(),
            Self::Disabled => String::new(),
            Self::Watts(watts) => watts.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage1Args {
    pub hw_id: String,
    pub pool_user: String,
    pub psu_power_limit: PsuPowerLimit,
    pub keep_network: bool,
    pub keep_hostname: HostnameMode,
    pub keep_pools: bool,
    pub dry_run: bool,
}

impl Stage1Args {
    pub fn from_request(request: &UpgradeRequest, hw_id: impl Into<String>) -> Self {
        Self {
            hw_id: hw_id.into(),
            pool_user: request.pool_user.clone().unwrap_or_default(),
            psu_power_limit: PsuPowerLimit::from_option(request.psu_power_limit),
            keep_network: request.keep_network,
            keep_hostname: request.keep_hostname,
            keep_pools: request.keep_pools,
            dry_run: request.dry_run,
        }
    }

    pub fn to_positional(&self) -> [String; STAGE1_ARITY] {
        [
            self.hw_id.clone(),
            self.pool_user.clone(),
            self.psu_power_limit.as_arg(),
            yes_no(self.keep_network).to_string(),
            self.keep_hostname.as_str().to_string(),
            yes_no(self.keep_pools).to_string(),
            yes_no(self.dry_run).to_string(),
        ]
    }

    pub fn command(&self, target_dir: &str) -> String {
        let quoted = self
            .to_positional()
            .iter()
            .map(|value| shell_quote(value))
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "cd {} && ls -l && /bin/sh {STAGE1_SCRIPT} {quoted}",
            shell_quote(target_dir)
        )
    }
}

pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
