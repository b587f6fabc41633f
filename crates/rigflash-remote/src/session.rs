use std::path::Path;

use anyhow::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

// Errors returned from these methods are transport failures. A command that
// exits non-zero is reported through `exit_status`, and a file that is
// missing or unreadable comes back from `open` as `None`.
pub trait RemoteSession {
    fn run(&mut self, command: &str) -> Result<CommandOutput>;

    fn open(&mut self, path: &str) -> Result<Option<Vec<u8>>>;

    fn open_sftp(&mut self) -> Result<Box<dyn RemoteFiles>>;

    fn disconnect(&mut self) -> Result<()>;
}

pub trait RemoteFiles {
    // Succeeds when the directory already exists.
    fn create_dir(&mut self, path: &str) -> Result<()>;

    fn put(&mut self, local: &Path, remote: &str, progress: &mut dyn FnMut(u64)) -> Result<u64>;

    fn set_mode(&mut self, path: &str, mode: u32) -> Result<()>;
}

pub trait Connector {
    fn connect(&self, hostname: &str, username: &str) -> Result<Box<dyn RemoteSession>>;
}
