use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use rigflash_remote::RemoteSession;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

pub const BACKUP_MANIFEST_FILE: &str = "backup.toml";
const MAC_PATH: &str = "/sys/class/net/eth0/address";
const CONFIG_LIST_COMMAND: &str = "find /config -type f";
const MTD_TABLE_PATH: &str = "/proc/mtd";

pub trait Backup {
    // false when nothing usable could be captured
    fn backup(
        &self,
        session: &mut dyn RemoteSession,
        output_dir: &Path,
        identity: &str,
    ) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub mac: String,
    pub created_at: String,
    pub nand: bool,
    #[serde(default)]
    pub entries: Vec<BackupEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub path: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtdPartition {
    pub index: u32,
    pub size: u64,
    pub name: String,
}

#[derive(Debug, Clone, Copy)]
pub struct NandBackup {
    pub nand: bool,
}

impl Backup for NandBackup {
    fn backup(
        &self,
        session: &mut dyn RemoteSession,
        output_dir: &Path,
        identity: &str,
    ) -> Result<bool> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("failed to create {}", output_dir.display()))?;
        let mut entries = Vec::new();

        let listing = session.run(CONFIG_LIST_COMMAND)?;
        if listing.success() {
            for remote in listing.stdout.lines().map(str::trim).filter(|line| !line.is_empty()) {
                let Some(content) = session.open(remote)? else {
                    warn!(path = remote, "configuration file not readable, skipped");
                    continue;
                };
                let relative = remote.trim_start_matches('/');
                entries.push(store_entry(output_dir, relative, &content)?);
            }
        } else {
            warn!(status = listing.exit_status, "configuration listing failed");
        }

        if self.nand {
            let Some(table) = session.open(MTD_TABLE_PATH)? else {
                warn!("{MTD_TABLE_PATH} is not readable");
                return Ok(false);
            };
            let partitions = parse_mtd_table(&String::from_utf8_lossy(&table));
            if partitions.is_empty() {
                warn!("no NAND partitions listed in {MTD_TABLE_PATH}");
                return Ok(false);
            }
            for partition in partitions {
                let device = format!("/dev/mtd{}", partition.index);
                let Some(content) = session.open(&device)? else {
                    warn!(
                        device = %device,
                        partition = %partition.name,
                        "NAND partition not readable"
                    );
                    return Ok(false);
                };
                if content.len() as u64 != partition.size {
                    debug!(
                        partition = %partition.name,
                        expected = partition.size,
                        actual = content.len(),
                        "partition dump size differs from table"
                    );
                }
                let relative = format!(
                    "nand/{}-{}.bin",
                    partition.index,
                    sanitize_name(&partition.name)
                );
                entries.push(store_entry(output_dir, &relative, &content)?);
            }
        }

        if entries.is_empty() {
            return Ok(false);
        }

        let manifest = BackupManifest {
            mac: identity.to_string(),
            created_at: Local::now().to_rfc3339(),
            nand: self.nand,
            entries,
        };
        let manifest_path = output_dir.join(BACKUP_MANIFEST_FILE);
        let raw = toml::to_string_pretty(&manifest).context("failed to serialize backup manifest")?;
        fs::write(&manifest_path, raw)
            .with_context(|| format!("failed to write {}", manifest_path.display()))?;
        Ok(true)
    }
}

pub fn read_mac(session: &mut dyn RemoteSession) -> Result<Option<String>> {
    let raw = session
        .open(MAC_PATH)
        .context("failed to read miner MAC address")?;
    Ok(raw
        .map(|raw| String::from_utf8_lossy(&raw).trim().to_ascii_lowercase())
        .filter(|mac| !mac.is_empty()))
}

pub fn backup_output_dir(root: &Path, mac: &str, timestamp: NaiveDateTime) -> PathBuf {
    root.join(format!(
        "{}-{}",
        mac.replace(':', ""),
        timestamp.format("%Y-%m-%d_%H-%M-%S")
    ))
}

// mtd0: 01400000 00020000 "NAND.SPL"
pub fn parse_mtd_table(contents: &str) -> Vec<MtdPartition> {
    contents
        .lines()
        .filter_map(|line| {
            let (device, rest) = line.split_once(':')?;
            let index = device.trim().strip_prefix("mtd")?.parse().ok()?;
            let mut fields = rest.split_whitespace();
            let size = u64::from_str_radix(fields.next()?, 16).ok()?;
            let _erase_size = fields.next()?;
            let name = fields.collect::<Vec<_>>().join(" ");
            Some(MtdPartition {
                index,
                size,
                name: name.trim_matches('"').to_string(),
            })
        })
        .collect()
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

fn store_entry(output_dir: &Path, relative: &str, content: &[u8]) -> Result<BackupEntry> {
    let path = output_dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))?;
    debug!(path = %path.display(), size = content.len(), "backup entry stored");

    Ok(BackupEntry {
        path: relative.to_string(),
        size: content.len() as u64,
        sha256: hex::encode(Sha256::digest(content)),
    })
}
