use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rigflash_remote::{CommandOutput, RemoteFiles, RemoteSession};
use sha2::Digest;

use super::*;

static TEST_DIR_SEQ: AtomicU64 = AtomicU64::new(0);

fn test_dir() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let seq = TEST_DIR_SEQ.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "rigflash-platform-test-{}-{nanos}-{seq}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("must create test dir");
    dir
}

#[derive(Default)]
struct ScriptedSession {
    files: HashMap<String, Vec<u8>>,
    dropped_reads: Vec<String>,
    outputs: HashMap<String, CommandOutput>,
    log: Rc<RefCell<Vec<String>>>,
}

impl ScriptedSession {
    fn with_file(mut self, path: &str, content: &[u8]) -> Self {
        self.files.insert(path.to_string(), content.to_vec());
        self
    }

    fn with_dropped_read(mut self, path: &str) -> Self {
        self.dropped_reads.push(path.to_string());
        self
    }

    fn with_output(mut self, command: &str, stdout: &str, exit_status: i32) -> Self {
        self.outputs.insert(
            command.to_string(),
            CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_status,
            },
        );
        self
    }

    fn log(&self) -> Vec<String> {
        self.log.borrow().clone()
    }
}

impl RemoteSession for ScriptedSession {
    fn run(&mut self, command: &str) -> Result<CommandOutput> {
        self.log.borrow_mut().push(format!("run {command}"));
        Ok(self.outputs.get(command).cloned().unwrap_or_default())
    }

    fn open(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        self.log.borrow_mut().push(format!("open {path}"));
        if self.dropped_reads.iter().any(|dropped| dropped == path) {
            return Err(anyhow!("channel closed while reading {path}"));
        }
        Ok(self.files.get(path).cloned())
    }

    fn open_sftp(&mut self) -> Result<Box<dyn RemoteFiles>> {
        Ok(Box::new(LoggedFiles {
            log: Rc::clone(&self.log),
        }))
    }

    fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

struct LoggedFiles {
    log: Rc<RefCell<Vec<String>>>,
}

impl RemoteFiles for LoggedFiles {
    fn create_dir(&mut self, path: &str) -> Result<()> {
        self.log.borrow_mut().push(format!("mkdir {path}"));
        Ok(())
    }

    fn put(&mut self, local: &Path, remote: &str, progress: &mut dyn FnMut(u64)) -> Result<u64> {
        let size = fs::metadata(local)?.len();
        progress(size);
        self.log.borrow_mut().push(format!("put {remote}"));
        Ok(size)
    }

    fn set_mode(&mut self, path: &str, mode: u32) -> Result<()> {
        self.log.borrow_mut().push(format!("chmod {mode:o} {path}"));
        Ok(())
    }
}

const S9_COMPILE_TIME: &[u8] = b"Thu Jul 12 14:37:06 CST 2018\nAntminer S9\n";

#[test]
fn hw_id_uses_base58_alphabet() {
    let mut rng = StdRng::seed_from_u64(42);
    let id = generate_hw_id(&mut rng);
    assert_eq!(id.len(), HW_ID_LENGTH);
    assert!(id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() && !matches!(ch, '0' | 'O' | 'I' | 'l')));
    assert_ne!(id, generate_hw_id(&mut rng));
}

#[test]
fn random_hw_id_has_fixed_length() {
    assert_eq!(RandomHwId.generate().len(), HW_ID_LENGTH);
}

#[test]
fn miner_model_is_read_from_compile_time() {
    assert_eq!(
        parse_miner_model("Thu Jul 12 2018\n Antminer S9j \n"),
        Some("Antminer S9j")
    );
    assert_eq!(parse_miner_model("Thu Jul 12 2018\n"), None);
}

#[test]
fn prepare_system_uploads_missing_utilities_only() {
    let root = test_dir();
    let system = root.join("system");
    fs::create_dir_all(&system).expect("must create system dir");
    fs::write(system.join("fw_printenv"), "bin").expect("must write utility");
    fs::write(system.join("sftp-server"), "bin").expect("must write utility");

    let mut session = ScriptedSession::default()
        .with_file(COMPILE_TIME_PATH, S9_COMPILE_TIME)
        .with_output("test -e '/usr/sbin/fw_printenv'", "", 0)
        .with_output("test -e '/usr/sbin/sftp-server'", "", 1);

    let installed = AntminerPlatform::default()
        .prepare_system(&mut session, &system)
        .expect("must prepare");

    assert_eq!(installed, vec!["sftp-server".to_string()]);
    assert_eq!(
        session.log(),
        vec![
            "open /usr/bin/compile_time",
            "run test -e '/usr/sbin/fw_printenv'",
            "run test -e '/usr/sbin/sftp-server'",
            "put /usr/sbin/sftp-server",
            "chmod 755 /usr/sbin/sftp-server",
        ]
    );
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn prepare_system_stops_on_unsupported_model() {
    let root = test_dir();
    let mut session = ScriptedSession::default()
        .with_file(COMPILE_TIME_PATH, b"2019\nAntminer L3+\n");

    let err = AntminerPlatform::default()
        .prepare_system(&mut session, &root)
        .expect_err("L3+ is not supported");
    assert!(matches!(err, PlatformError::Stop(ref reason) if reason.contains("Antminer L3+")));
    assert_eq!(session.log(), vec!["open /usr/bin/compile_time"]);
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn prepare_system_stops_when_model_unknown() {
    let root = test_dir();
    let mut session = ScriptedSession::default();
    let err = AntminerPlatform::default()
        .prepare_system(&mut session, &root)
        .expect_err("missing compile_time");
    assert!(matches!(err, PlatformError::Stop(_)));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn prepare_system_stops_without_local_system_dir() {
    let root = test_dir();
    let mut session = ScriptedSession::default().with_file(COMPILE_TIME_PATH, S9_COMPILE_TIME);
    let err = AntminerPlatform::default()
        .prepare_system(&mut session, &root.join("system"))
        .expect_err("system dir is required");
    assert!(matches!(err, PlatformError::Stop(ref reason) if reason.contains("is missing")));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn cleanup_removes_target_dir() {
    let mut session = ScriptedSession::default();
    AntminerPlatform::default()
        .cleanup_system(&mut session)
        .expect("must clean");
    assert_eq!(session.log(), vec!["run rm -fr '/tmp/firmware'"]);
}

#[test]
fn cleanup_reports_failing_command() {
    let mut session = ScriptedSession::default().with_output("rm -fr '/tmp/firmware'", "", 1);
    let err = AntminerPlatform::default()
        .cleanup_system(&mut session)
        .expect_err("non-zero exit must surface");
    assert!(err.to_string().contains("cleanup command"));
}

#[test]
fn mtd_table_parses_partitions() {
    let table = "dev:    size   erasesize  name\n\
                 mtd0: 01400000 00020000 \"NAND.SPL\"\n\
                 mtd1: 00500000 00020000 \"NAND bitstream\"\n";
    assert_eq!(
        parse_mtd_table(table),
        vec![
            MtdPartition {
                index: 0,
                size: 0x0140_0000,
                name: "NAND.SPL".to_string(),
            },
            MtdPartition {
                index: 1,
                size: 0x0050_0000,
                name: "NAND bitstream".to_string(),
            },
        ]
    );
}

#[test]
fn backup_output_dir_strips_mac_colons() {
    let timestamp = NaiveDate::from_ymd_opt(2026, 10, 19)
        .and_then(|date| date.and_hms_opt(8, 30, 5))
        .expect("valid timestamp");
    assert_eq!(
        backup_output_dir(Path::new("backup"), "00:0a:35:ff:12:34", timestamp),
        PathBuf::from("backup/000a35ff1234-2026-10-19_08-30-05")
    );
}

#[test]
fn read_mac_normalizes_case() {
    let mut session =
        ScriptedSession::default().with_file("/sys/class/net/eth0/address", b"00:0A:35:FF:12:34\n");
    assert_eq!(
        read_mac(&mut session).expect("must read mac").as_deref(),
        Some("00:0a:35:ff:12:34")
    );
}

#[test]
fn read_mac_reports_missing_or_empty_address_as_none() {
    let mut missing = ScriptedSession::default();
    assert_eq!(read_mac(&mut missing).expect("must read mac"), None);

    let mut empty =
        ScriptedSession::default().with_file("/sys/class/net/eth0/address", b" \n");
    assert_eq!(read_mac(&mut empty).expect("must read mac"), None);
}

#[test]
fn read_mac_propagates_transport_errors() {
    let mut session =
        ScriptedSession::default().with_dropped_read("/sys/class/net/eth0/address");
    let err = read_mac(&mut session).expect_err("transport error must surface");
    assert!(format!("{err:#}").contains("channel closed"));
}

#[test]
fn prepare_system_propagates_compile_time_transport_error() {
    let root = test_dir();
    let mut session = ScriptedSession::default().with_dropped_read(COMPILE_TIME_PATH);
    let err = AntminerPlatform::default()
        .prepare_system(&mut session, &root)
        .expect_err("transport error must surface");
    assert!(matches!(err, PlatformError::Transport(_)));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn backup_captures_config_and_nand_with_manifest() {
    let root = test_dir();
    let output = root.join("backup");
    let mut session = ScriptedSession::default()
        .with_output("find /config -type f", "/config/network.conf\n", 0)
        .with_file("/config/network.conf", b"dhcp")
        .with_file("/proc/mtd", b"dev: size erasesize name\nmtd0: 00000004 00020000 \"NAND.SPL\"\n")
        .with_file("/dev/mtd0", b"\x00\x01\x02\x03");

    let ok = NandBackup { nand: true }
        .backup(&mut session, &output, "00:0a:35:ff:12:34")
        .expect("backup must run");
    assert!(ok);

    assert_eq!(
        fs::read(output.join("config/network.conf")).expect("config copy"),
        b"dhcp"
    );
    assert_eq!(
        fs::read(output.join("nand/0-NAND_SPL.bin")).expect("nand copy"),
        b"\x00\x01\x02\x03"
    );

    let raw = fs::read_to_string(output.join(BACKUP_MANIFEST_FILE)).expect("manifest");
    let manifest: BackupManifest = toml::from_str(&raw).expect("manifest must parse");
    assert_eq!(manifest.mac, "00:0a:35:ff:12:34");
    assert!(manifest.nand);
    assert_eq!(manifest.entries.len(), 2);
    assert_eq!(
        manifest.entries[0],
        BackupEntry {
            path: "config/network.conf".to_string(),
            size: 4,
            sha256: hex::encode(sha2::Sha256::digest(b"dhcp")),
        }
    );
    assert_eq!(manifest.entries[1].path, "nand/0-NAND_SPL.bin");
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn backup_fails_when_nand_table_is_empty() {
    let root = test_dir();
    let mut session = ScriptedSession::default()
        .with_output("find /config -type f", "", 0)
        .with_file("/proc/mtd", b"dev: size erasesize name\n");

    let ok = NandBackup { nand: true }
        .backup(&mut session, &root.join("backup"), "00:0a:35:ff:12:34")
        .expect("backup must run");
    assert!(!ok);
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn backup_without_nand_skips_partitions() {
    let root = test_dir();
    let mut session = ScriptedSession::default()
        .with_output("find /config -type f", "/config/pools.conf\n", 0)
        .with_file("/config/pools.conf", b"stratum");

    let ok = NandBackup { nand: false }
        .backup(&mut session, &root.join("backup"), "00:0a:35:ff:12:34")
        .expect("backup must run");
    assert!(ok);
    assert!(!session.log().iter().any(|entry| entry.contains("/proc/mtd")));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn backup_skips_unreadable_config_file() {
    let root = test_dir();
    let output = root.join("backup");
    let mut session = ScriptedSession::default()
        .with_output(
            "find /config -type f",
            "/config/shadow\n/config/pools.conf\n",
            0,
        )
        .with_file("/config/pools.conf", b"stratum");

    let ok = NandBackup { nand: false }
        .backup(&mut session, &output, "00:0a:35:ff:12:34")
        .expect("backup must run");
    assert!(ok);

    let raw = fs::read_to_string(output.join(BACKUP_MANIFEST_FILE)).expect("manifest");
    let manifest: BackupManifest = toml::from_str(&raw).expect("manifest must parse");
    assert_eq!(manifest.entries.len(), 1);
    assert_eq!(manifest.entries[0].path, "config/pools.conf");
    assert!(!output.join("config/shadow").exists());
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn backup_fails_when_mtd_table_is_unreadable() {
    let root = test_dir();
    let mut session = ScriptedSession::default()
        .with_output("find /config -type f", "/config/pools.conf\n", 0)
        .with_file("/config/pools.conf", b"stratum");

    let ok = NandBackup { nand: true }
        .backup(&mut session, &root.join("backup"), "00:0a:35:ff:12:34")
        .expect("backup must run");
    assert!(!ok);
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn backup_fails_when_partition_is_unreadable() {
    let root = test_dir();
    let mut session = ScriptedSession::default()
        .with_output("find /config -type f", "", 0)
        .with_file(
            "/proc/mtd",
            b"dev: size erasesize name\nmtd0: 00000004 00020000 \"NAND.SPL\"\n",
        );

    let ok = NandBackup { nand: true }
        .backup(&mut session, &root.join("backup"), "00:0a:35:ff:12:34")
        .expect("backup must run");
    assert!(!ok);
    assert!(session.log().contains(&"open /dev/mtd0".to_string()));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn backup_propagates_transport_errors() {
    let root = test_dir();
    let mut session = ScriptedSession::default()
        .with_output("find /config -type f", "/config/pools.conf\n", 0)
        .with_dropped_read("/config/pools.conf");

    NandBackup { nand: false }
        .backup(&mut session, &root.join("backup"), "00:0a:35:ff:12:34")
        .expect_err("transport error must surface");
    let _ = fs::remove_dir_all(&root);
}
