use std::fs::File;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use ssh2::{Channel, FileStat, Session, Sftp};
use tracing::debug;

use crate::session::{CommandOutput, Connector, RemoteFiles, RemoteSession};
use crate::transfer::{copy_with_progress, pump};

const DRAIN_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct SshConnector {
    port: u16,
    connect_timeout: Duration,
    identity_file: Option<PathBuf>,
}

impl SshConnector {
    pub fn new(port: u16, connect_timeout: Duration, identity_file: Option<PathBuf>) -> Self {
        Self {
            port,
            connect_timeout,
            identity_file,
        }
    }

    fn open_tcp(&self, hostname: &str) -> Result<TcpStream> {
        let addrs = (hostname, self.port)
            .to_socket_addrs()
            .with_context(|| format!("failed to resolve {hostname}:{}", self.port))?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(err) => {
                    debug!(%addr, error = %err, "tcp connect failed");
                    last_err = Some(err);
                }
            }
        }
        match last_err {
            Some(err) => Err(err).with_context(|| format!("failed to connect to {hostname}:{}", self.port)),
            None => Err(anyhow!("no address found for {hostname}")),
        }
    }

    fn candidate_keys(&self) -> Vec<PathBuf> {
        let mut keys = Vec::new();
        if let Some(identity) = &self.identity_file {
            keys.push(identity.clone());
        }
        if let Some(home) = std::env::var_os("HOME") {
            let ssh_dir = PathBuf::from(home).join(".ssh");
            keys.push(ssh_dir.join("id_ed25519"));
            keys.push(ssh_dir.join("id_rsa"));
        }
        keys
    }

    fn authenticate(&self, session: &Session, username: &str) -> Result<()> {
        if session.userauth_agent(username).is_ok() && session.authenticated() {
            debug!("authenticated through ssh-agent");
            return Ok(());
        }
        for key in self.candidate_keys() {
            if !key.is_file() {
                continue;
            }
            match session.userauth_pubkey_file(username, None, &key, None) {
                Ok(()) if session.authenticated() => {
                    debug!(key = %key.display(), "authenticated with key file");
                    return Ok(());
                }
                Ok(()) => {}
                Err(err) => debug!(key = %key.display(), error = %err, "key rejected"),
            }
        }

        // stock firmware ships the administrative account without a password
        if let Err(err) = session.userauth_password(username, "") {
            debug!(error = %err, "empty password rejected");
        }
        ensure!(
            session.authenticated(),
            "authentication as '{username}' failed"
        );
        Ok(())
    }
}

impl Connector for SshConnector {
    fn connect(&self, hostname: &str, username: &str) -> Result<Box<dyn RemoteSession>> {
        let tcp = self.open_tcp(hostname)?;
        let mut session = Session::new().context("failed to create SSH session")?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .with_context(|| format!("SSH handshake with {hostname} failed"))?;
        self.authenticate(&session, username)?;

        Ok(Box::new(SshSession {
            session,
            hostname: hostname.to_string(),
        }))
    }
}

struct SshSession {
    session: Session,
    hostname: String,
}

impl SshSession {
    fn exec(&mut self, command: &str) -> Result<(Vec<u8>, Vec<u8>, i32)> {
        debug!(host = %self.hostname, command, "remote exec");
        let mut channel = self
            .session
            .channel_session()
            .context("failed to open SSH channel")?;
        channel
            .exec(command)
            .with_context(|| format!("failed to execute '{command}'"))?;

        self.session.set_blocking(false);
        let drained = drain_channel(&mut channel);
        self.session.set_blocking(true);
        let (stdout, stderr) =
            drained.with_context(|| format!("failed to read output of '{command}'"))?;

        channel
            .wait_close()
            .with_context(|| format!("channel for '{command}' did not close"))?;
        let status = channel
            .exit_status()
            .with_context(|| format!("missing exit status for '{command}'"))?;
        Ok((stdout, stderr, status))
    }
}

fn drain_channel(channel: &mut Channel) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    loop {
        let progressed = pump(&mut channel.stream(0), &mut stdout)?
            | pump(&mut channel.stderr(), &mut stderr)?;
        if progressed {
            continue;
        }
        if channel.eof() {
            return Ok((stdout, stderr));
        }
        thread::sleep(DRAIN_BACKOFF);
    }
}

impl RemoteSession for SshSession {
    fn run(&mut self, command: &str) -> Result<CommandOutput> {
        let (stdout, stderr, exit_status) = self.exec(command)?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_status,
        })
    }

    fn open(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        let command = format!("cat '{}'", path.replace('\'', "'\\''"));
        let (content, stderr, status) = self.exec(&command)?;
        if status != 0 {
            debug!(
                host = %self.hostname,
                path,
                status,
                stderr = %String::from_utf8_lossy(&stderr).trim(),
                "remote file not readable"
            );
            return Ok(None);
        }
        Ok(Some(content))
    }

    fn open_sftp(&mut self) -> Result<Box<dyn RemoteFiles>> {
        let sftp = self
            .session
            .sftp()
            .with_context(|| format!("failed to start SFTP on {}", self.hostname))?;
        Ok(Box::new(SshFiles { sftp }))
    }

    fn disconnect(&mut self) -> Result<()> {
        self.session
            .disconnect(None, "rigflash session finished", None)
            .with_context(|| format!("failed to disconnect from {}", self.hostname))
    }
}

struct SshFiles {
    sftp: Sftp,
}

impl RemoteFiles for SshFiles {
    fn create_dir(&mut self, path: &str) -> Result<()> {
        let path = Path::new(path);
        if self.sftp.stat(path).is_ok() {
            return Ok(());
        }
        self.sftp
            .mkdir(path, 0o755)
            .with_context(|| format!("failed to create remote directory {}", path.display()))
    }

    fn put(&mut self, local: &Path, remote: &str, progress: &mut dyn FnMut(u64)) -> Result<u64> {
        debug!(local = %local.display(), remote, "uploading");
        let mut source =
            File::open(local).with_context(|| format!("failed to open {}", local.display()))?;
        let mut target = self
            .sftp
            .create(Path::new(remote))
            .with_context(|| format!("failed to create remote file {remote}"))?;
        copy_with_progress(&mut source, &mut target, progress)
            .with_context(|| format!("failed to upload {} to {remote}", local.display()))
    }

    fn set_mode(&mut self, path: &str, mode: u32) -> Result<()> {
        let stat = FileStat {
            size: None,
            uid: None,
            gid: None,
            perm: Some(mode),
            atime: None,
            mtime: None,
        };
        self.sftp
            .setstat(Path::new(path), stat)
            .with_context(|| format!("failed to set mode {mode:o} on {path}"))
    }
}
