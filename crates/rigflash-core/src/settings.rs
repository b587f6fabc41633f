use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub ssh_port: u16,
    pub connect_timeout_secs: u64,
    pub identity_file: Option<PathBuf>,
    pub firmware_dir: PathBuf,
    pub system_dir: PathBuf,
    pub post_upgrade_dir: PathBuf,
    pub backup_root: PathBuf,
    pub wait_timeout_secs: u64,
    pub probe_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ssh_port: 22,
            connect_timeout_secs: 10,
            identity_file: None,
            firmware_dir: PathBuf::from("firmware"),
            system_dir: PathBuf::from("system"),
            post_upgrade_dir: PathBuf::from("post-upgrade"),
            backup_root: PathBuf::from("backup"),
            wait_timeout_secs: 600,
            probe_interval_secs: 1,
        }
    }
}

impl Settings {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("failed to parse rigflash settings")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file: {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid settings: {}", path.display()))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}
