use std::io::{self, Read, Write};
use std::path::{Component, Path};

use anyhow::{Context, Result};
use tracing::debug;
use walkdir::WalkDir;

use crate::session::RemoteFiles;

const CHUNK_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeUpload {
    pub dirs: usize,
    pub files: usize,
    pub bytes: u64,
}

pub fn copy_with_progress<R, W>(
    reader: &mut R,
    writer: &mut W,
    progress: &mut dyn FnMut(u64),
) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buffer = vec![0_u8; CHUNK_SIZE];
    let mut sent = 0_u64;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        writer.write_all(&buffer[..read])?;
        sent += read as u64;
        progress(sent);
    }
    writer.flush()?;
    Ok(sent)
}

// Reads what is available without blocking; true when bytes were appended.
pub(crate) fn pump<R>(reader: &mut R, sink: &mut Vec<u8>) -> io::Result<bool>
where
    R: Read + ?Sized,
{
    let mut buffer = [0_u8; 8192];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => return Ok(false),
            Ok(read) => {
                sink.extend_from_slice(&buffer[..read]);
                return Ok(true);
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

pub fn remote_join(base: &str, relative: &Path) -> String {
    let mut joined = base.trim_end_matches('/').to_string();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            joined.push('/');
            joined.push_str(&part.to_string_lossy());
        }
    }
    joined
}

pub fn local_tree_size(root: &Path) -> Result<u64> {
    let mut total = 0_u64;
    for entry in WalkDir::new(root) {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if entry.file_type().is_file() {
            total += entry
                .metadata()
                .with_context(|| format!("failed to stat {}", entry.path().display()))?
                .len();
        }
    }
    Ok(total)
}

pub fn upload_tree(
    files: &mut dyn RemoteFiles,
    local_root: &Path,
    remote_root: &str,
    progress: &mut dyn FnMut(u64),
) -> Result<TreeUpload> {
    let mut summary = TreeUpload::default();
    for entry in WalkDir::new(local_root).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", local_root.display()))?;
        let relative = entry
            .path()
            .strip_prefix(local_root)
            .with_context(|| format!("{} escapes {}", entry.path().display(), local_root.display()))?;
        let remote = remote_join(remote_root, relative);

        if entry.file_type().is_dir() {
            files.create_dir(&remote)?;
            summary.dirs += 1;
            continue;
        }

        let base = summary.bytes;
        let sent = files.put(entry.path(), &remote, &mut |current: u64| progress(base + current))?;
        debug!(remote = %remote, bytes = sent, "uploaded");
        summary.files += 1;
        summary.bytes += sent;
    }
    Ok(summary)
}
