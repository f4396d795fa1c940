//! Config backup archiving.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Seek, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use opsrelay_core::{current_unix_timestamp_ms, write_atomic_with};
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupConfig {
    pub paths: Vec<PathBuf>,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub archive_path: PathBuf,
    pub archived: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
    pub entry_count: usize,
}

impl BackupReport {
    pub fn render(&self) -> String {
        let mut lines = vec![format!(
            "backup archive created: {} ({} of {} paths, {} files)",
            self.archive_path.display(),
            self.archived.len(),
            self.archived.len() + self.missing.len(),
            self.entry_count
        )];
        for path in &self.missing {
            lines.push(format!("skipped missing path: {}", path.display()));
        }
        lines.join("\n")
    }
}

/// Adds every existing configured path to one deflate-compressed zip in
/// `output_dir`. Missing paths are skipped and listed in the report; the
/// archive is still written when at least one path exists. Overlapping paths
/// contribute each file once, and `output_dir` itself is never archived.
pub fn create_backup_archive(config: &BackupConfig, now_unix_ms: u64) -> Result<BackupReport> {
    if config.paths.is_empty() {
        bail!("no backup paths configured");
    }

    let mut archived = Vec::new();
    let mut missing = Vec::new();
    for path in &config.paths {
        if path.exists() {
            archived.push(path.clone());
        } else {
            warn!(path = %path.display(), "backup path missing; skipping");
            missing.push(path.clone());
        }
    }
    if archived.is_empty() {
        bail!(
            "none of the configured backup paths exist: {}",
            missing
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let archive_path = config
        .output_dir
        .join(format!("backup-{now_unix_ms}.zip"));
    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!("failed to create backup directory {}", config.output_dir.display())
    })?;
    let walker = ArchiveWalker {
        output_dir: config
            .output_dir
            .canonicalize()
            .unwrap_or_else(|_| config.output_dir.clone()),
    };
    let mut entry_count = 0usize;
    write_atomic_with(&archive_path, |file| {
        let mut zip = ZipWriter::new(file);
        let mut written = HashSet::new();
        for path in &archived {
            entry_count += walker.add_path(&mut zip, path, &mut written)?;
        }
        zip.finish().context("failed to finalize backup archive")?;
        Ok(())
    })
    .with_context(|| format!("failed to write backup archive {}", archive_path.display()))?;

    debug!(
        archive = %archive_path.display(),
        archived = archived.len(),
        missing = missing.len(),
        entry_count,
        "backup archive written"
    );
    Ok(BackupReport {
        archive_path,
        archived,
        missing,
        entry_count,
    })
}

/// Convenience wrapper stamping the archive with the current time.
pub fn create_backup_archive_now(config: &BackupConfig) -> Result<BackupReport> {
    create_backup_archive(config, current_unix_timestamp_ms())
}

struct ArchiveWalker {
    output_dir: PathBuf,
}

impl ArchiveWalker {
    fn is_output_dir(&self, path: &Path) -> bool {
        path.canonicalize()
            .map(|resolved| resolved.starts_with(&self.output_dir))
            .unwrap_or(false)
    }

    /// Returns how many files were added. Entries already in `written` are
    /// skipped.
    fn add_path<W>(
        &self,
        zip: &mut ZipWriter<W>,
        path: &Path,
        written: &mut HashSet<String>,
    ) -> Result<usize>
    where
        W: Write + Seek,
    {
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o600);

        if self.is_output_dir(path) {
            warn!(
                path = %path.display(),
                "backup path lies inside the backup directory; skipping"
            );
            return Ok(0);
        }
        if path.is_file() {
            return add_file(zip, path, options, written).map(usize::from);
        }

        let mut count = 0usize;
        let entries = WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                !entry.file_type().is_dir() || !self.is_output_dir(entry.path())
            });
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable backup entry");
                    continue;
                }
            };
            let entry_path = entry.path();
            if entry.file_type().is_file() {
                if add_file(zip, entry_path, options, written)? {
                    count += 1;
                }
            } else if entry.file_type().is_dir() {
                let name = format!("{}/", archive_entry_name(entry_path));
                if written.insert(name.clone()) {
                    zip.add_directory(name, options).with_context(|| {
                        format!("failed to add directory {}", entry_path.display())
                    })?;
                }
            }
        }
        Ok(count)
    }
}

/// Returns `false` when an entry with the same name was already written.
fn add_file<W>(
    zip: &mut ZipWriter<W>,
    path: &Path,
    options: SimpleFileOptions,
    written: &mut HashSet<String>,
) -> Result<bool>
where
    W: Write + Seek,
{
    let name = archive_entry_name(path);
    if written.contains(&name) {
        debug!(path = %path.display(), "backup entry already archived");
        return Ok(false);
    }
    let mut source =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    zip.start_file(name.as_str(), options)
        .with_context(|| format!("failed to add {}", path.display()))?;
    std::io::copy(&mut source, zip)
        .with_context(|| format!("failed to copy {} into archive", path.display()))?;
    written.insert(name);
    Ok(true)
}

/// Archive entry name for a filesystem path: root and `.`/`..` components are
/// dropped so `/etc/nginx/nginx.conf` lands at `etc/nginx/nginx.conf`.
pub fn archive_entry_name(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
