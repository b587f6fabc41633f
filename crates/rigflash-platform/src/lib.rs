mod backup;
mod hwid;
mod platform;

pub use backup::{
    backup_output_dir, parse_mtd_table, read_mac, Backup, BackupEntry, BackupManifest,
    MtdPartition, NandBackup, BACKUP_MANIFEST_FILE,
};
pub use hwid::{generate_hw_id, IdentityProvider, RandomHwId, HW_ID_LENGTH};
pub use platform::{
    parse_miner_model, AntminerPlatform, Platform, PlatformError, COMPILE_TIME_PATH,
};

#[cfg(test)]
mod tests;
