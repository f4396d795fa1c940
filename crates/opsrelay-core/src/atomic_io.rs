use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::time_utils::current_unix_timestamp_ms;

/// Writes `path` through a temp file + rename so readers never observe a
/// partially written file. The closure receives the open temp file.
pub fn write_atomic_with<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    if path.as_os_str().is_empty() {
        bail!("destination path cannot be empty");
    }
    if path.exists() && path.is_dir() {
        bail!("destination path '{}' is a directory", path.display());
    }

    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent_dir)
        .with_context(|| format!("failed to create {}", parent_dir.display()))?;

    let temp_path = temp_path_for(parent_dir, path);
    let result = File::create(&temp_path)
        .with_context(|| format!("failed to create temporary file {}", temp_path.display()))
        .and_then(|mut file| {
            write(&mut file)?;
            file.sync_all()
                .with_context(|| format!("failed to sync {}", temp_path.display()))
        });
    if let Err(error) = result {
        let _ = std::fs::remove_file(&temp_path);
        return Err(error);
    }

    std::fs::rename(&temp_path, path).with_context(|| {
        format!(
            "failed to rename temporary file {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;
    Ok(())
}

fn temp_path_for(parent_dir: &Path, path: &Path) -> PathBuf {
    let temp_name = format!(
        ".{}.tmp-{}-{}",
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("opsrelay"),
        std::process::id(),
        current_unix_timestamp_ms()
    );
    parent_dir.join(temp_name)
}
