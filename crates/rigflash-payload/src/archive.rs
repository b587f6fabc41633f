use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;
use walkdir::WalkDir;

use crate::bundle::{PostUpgradeBundle, STAGE3_DIR, STAGE3_SCRIPT, STAGE3_USER_SCRIPT};

pub fn write_stage3_archive(bundle: &PostUpgradeBundle, destination: &Path) -> Result<u64> {
    let file = File::create(destination)
        .with_context(|| format!("failed to create {}", destination.display()))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    if let Some(builtin) = bundle.builtin() {
        append_tree(&mut builder, builtin, None)?;
    }
    if let Some(user) = bundle.user() {
        let user_script = user.join(STAGE3_SCRIPT);
        let excluded = if bundle.relocates_user_script() {
            let archive_name = Path::new(STAGE3_DIR).join(STAGE3_USER_SCRIPT);
            builder
                .append_path_with_name(&user_script, &archive_name)
                .with_context(|| format!("failed to archive {}", user_script.display()))?;
            Some(user_script.as_path())
        } else {
            None
        };
        append_tree(&mut builder, user, excluded)?;
    }

    let encoder = builder
        .into_inner()
        .with_context(|| format!("failed to finish tar stream: {}", destination.display()))?;
    let file = encoder
        .finish()
        .with_context(|| format!("failed to finish gzip stream: {}", destination.display()))?;
    file.sync_all()
        .with_context(|| format!("failed to flush {}", destination.display()))?;

    let size = fs::metadata(destination)
        .with_context(|| format!("failed to stat {}", destination.display()))?
        .len();
    debug!(path = %destination.display(), size, "stage3 archive written");
    Ok(size)
}

fn append_tree<W: Write>(
    builder: &mut tar::Builder<W>,
    root: &Path,
    excluded: Option<&Path>,
) -> Result<()> {
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        let path = entry.path();
        if excluded == Some(path) {
            continue;
        }

        let relative = path
            .strip_prefix(root)
            .with_context(|| format!("{} escapes {}", path.display(), root.display()))?;
        let archive_path = Path::new(STAGE3_DIR).join(relative);
        if entry.file_type().is_dir() {
            builder
                .append_dir(&archive_path, path)
                .with_context(|| format!("failed to archive {}", path.display()))?;
        } else {
            builder
                .append_path_with_name(path, &archive_path)
                .with_context(|| format!("failed to archive {}", path.display()))?;
        }
    }
    Ok(())
}
