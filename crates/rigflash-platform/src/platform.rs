use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use rigflash_core::{shell_quote, REMOTE_TARGET_DIR};
use rigflash_remote::{remote_join, RemoteSession};
use thiserror::Error;
use tracing::debug;

pub const COMPILE_TIME_PATH: &str = "/usr/bin/compile_time";
const SUPPORTED_MODEL_PREFIX: &str = "Antminer S9";
const UTILITY_DIR: &str = "/usr/sbin";

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("{0}")]
    Stop(String),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

pub trait Platform {
    // Returns the names of the utilities that were uploaded.
    fn prepare_system(
        &self,
        session: &mut dyn RemoteSession,
        system_dir: &Path,
    ) -> Result<Vec<String>, PlatformError>;

    fn cleanup_system(&self, session: &mut dyn RemoteSession) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct AntminerPlatform {
    target_dir: String,
}

impl Default for AntminerPlatform {
    fn default() -> Self {
        Self {
            target_dir: REMOTE_TARGET_DIR.to_string(),
        }
    }
}

impl AntminerPlatform {
    fn check_miner_model(&self, session: &mut dyn RemoteSession) -> Result<(), PlatformError> {
        let Some(contents) = session.open(COMPILE_TIME_PATH)? else {
            return Err(PlatformError::Stop(format!(
                "unable to identify miner model: {COMPILE_TIME_PATH} is not readable"
            )));
        };
        let contents = String::from_utf8_lossy(&contents);
        match parse_miner_model(&contents) {
            Some(model) if model.starts_with(SUPPORTED_MODEL_PREFIX) => {
                debug!(model, "miner model supported");
                Ok(())
            }
            Some(model) => Err(PlatformError::Stop(format!(
                "unsupported miner model '{model}'"
            ))),
            None => Err(PlatformError::Stop(
                "unable to identify miner model".to_string(),
            )),
        }
    }
}

impl Platform for AntminerPlatform {
    fn prepare_system(
        &self,
        session: &mut dyn RemoteSession,
        system_dir: &Path,
    ) -> Result<Vec<String>, PlatformError> {
        self.check_miner_model(session)?;

        if !system_dir.is_dir() {
            return Err(PlatformError::Stop(format!(
                "system directory '{}' is missing",
                system_dir.display()
            )));
        }
        let utilities = list_utilities(system_dir)?;

        let mut missing = Vec::new();
        for (name, local) in utilities {
            let remote = remote_join(UTILITY_DIR, Path::new(&name));
            let probe = session.run(&format!("test -e {}", shell_quote(&remote)))?;
            if !probe.success() {
                missing.push((name, local, remote));
            }
        }
        if missing.is_empty() {
            return Ok(Vec::new());
        }

        let mut files = session.open_sftp()?;
        let mut installed = Vec::with_capacity(missing.len());
        for (name, local, remote) in missing {
            files.put(&local, &remote, &mut |_| {})?;
            files.set_mode(&remote, 0o755)?;
            debug!(utility = %name, "utility installed");
            installed.push(name);
        }
        Ok(installed)
    }

    fn cleanup_system(&self, session: &mut dyn RemoteSession) -> anyhow::Result<()> {
        let command = format!("rm -fr {}", shell_quote(&self.target_dir));
        let output = session.run(&command)?;
        if !output.success() {
            bail!(
                "cleanup command '{command}' failed: {}",
                output.stderr.trim()
            );
        }
        Ok(())
    }
}

// compile_time carries the build date followed by e.g. `Antminer S9`.
pub fn parse_miner_model(contents: &str) -> Option<&str> {
    contents
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("Antminer"))
}

fn list_utilities(system_dir: &Path) -> anyhow::Result<Vec<(String, PathBuf)>> {
    let mut utilities = Vec::new();
    for entry in fs::read_dir(system_dir)
        .with_context(|| format!("failed to read {}", system_dir.display()))?
    {
        let entry = entry.with_context(|| format!("failed to read {}", system_dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        utilities.push((entry.file_name().to_string_lossy().into_owned(), path));
    }
    utilities.sort();
    Ok(utilities)
}
