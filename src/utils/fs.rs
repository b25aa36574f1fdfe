//! File system helpers
//!
//! Atomic writes, recursive copies and the stage-then-swap primitive used to
//! replace an installation root in one step. Blocking helpers have `async`
//! counterparts that run on tokio's blocking pool.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Creates `path` and all of its parents.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    } else if !path.is_dir() {
        anyhow::bail!("Path exists but is not a directory: {}", path.display());
    }
    Ok(())
}

/// Writes `content` to `path` atomically.
///
/// The bytes go to a sibling temporary file which is synced and renamed over
/// the target, so readers never observe a partially written file.
///
/// ```rust,no_run
/// use pppackage::utils::fs::atomic_write;
/// use std::path::Path;
///
/// # fn example() -> anyhow::Result<()> {
/// atomic_write(Path::new("products/ab/cd.json"), b"{}")?;
/// # Ok(())
/// # }
/// ```
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let temp_path = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));

    {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

        file.write_all(content)
            .with_context(|| format!("Failed to write to temp file: {}", temp_path.display()))?;

        file.sync_all().with_context(|| "Failed to sync file to disk")?;
    }

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;

    Ok(())
}

/// Recursively copies the contents of `src` into `dst`.
///
/// Existing files in `dst` are overwritten. Symlinks are recreated with their
/// link target unchanged, so relative links keep pointing inside the copy.
/// Special files are skipped.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    ensure_dir(dst)?;

    for entry in walkdir::WalkDir::new(src).min_depth(1) {
        let entry =
            entry.with_context(|| format!("Failed to read directory: {}", src.display()))?;
        let relative = entry.path().strip_prefix(src)?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else if file_type.is_dir() {
            if is_symlink(&target) {
                ensure_inside(&target, dst)?;
            }
            ensure_dir(&target)?;
        } else if file_type.is_file() {
            remove_symlink(&target)?;
            fs::copy(entry.path(), &target).with_context(|| {
                format!(
                    "Failed to copy file from {} to {}",
                    entry.path().display(),
                    target.display()
                )
            })?;
        }
    }

    Ok(())
}

/// Recreates the symlink `src` at `dst`, replacing a file or link already there.
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let link = fs::read_link(src)
        .with_context(|| format!("Failed to read symlink: {}", src.display()))?;

    match fs::symlink_metadata(dst) {
        Ok(existing) if existing.is_dir() => anyhow::bail!(
            "Cannot replace directory {} with a symlink to {}",
            dst.display(),
            link.display()
        ),
        Ok(_) => fs::remove_file(dst)
            .with_context(|| format!("Failed to replace {}", dst.display()))?,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => {
            return Err(error).with_context(|| format!("Failed to inspect {}", dst.display()));
        }
    }

    create_symlink(&link, dst, src.is_dir())
        .with_context(|| format!("Failed to create symlink {} -> {}", dst.display(), link.display()))
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|metadata| metadata.file_type().is_symlink())
}

/// Directories are only merged through a symlink that resolves inside `root`.
fn ensure_inside(link: &Path, root: &Path) -> Result<()> {
    let resolved = fs::canonicalize(link)
        .with_context(|| format!("Failed to resolve symlink: {}", link.display()))?;
    let root = fs::canonicalize(root)
        .with_context(|| format!("Failed to resolve directory: {}", root.display()))?;
    if !resolved.starts_with(&root) {
        anyhow::bail!(
            "Refusing to write through {}: it resolves to {} outside {}",
            link.display(),
            resolved.display(),
            root.display()
        );
    }
    Ok(())
}

/// Removes `path` if it is a symlink, so a copy replaces the link instead of
/// writing through it.
fn remove_symlink(path: &Path) -> Result<()> {
    if is_symlink(path) {
        fs::remove_file(path).with_context(|| format!("Failed to replace {}", path.display()))?;
    }
    Ok(())
}

#[cfg(unix)]
fn create_symlink(link: &Path, path: &Path, _is_dir: bool) -> std::io::Result<()> {
    std::os::unix::fs::symlink(link, path)
}

#[cfg(windows)]
fn create_symlink(link: &Path, path: &Path, is_dir: bool) -> std::io::Result<()> {
    if is_dir {
        std::os::windows::fs::symlink_dir(link, path)
    } else {
        std::os::windows::fs::symlink_file(link, path)
    }
}

/// Copies `src` to `dst`, whether it is a file or a directory.
pub fn copy_path(src: &Path, dst: &Path) -> Result<()> {
    if src.is_dir() {
        copy_dir(src, dst)
    } else {
        if let Some(parent) = dst.parent() {
            ensure_dir(parent)?;
        }
        remove_symlink(dst)?;
        fs::copy(src, dst).with_context(|| {
            format!("Failed to copy file from {} to {}", src.display(), dst.display())
        })?;
        Ok(())
    }
}

/// Removes a directory tree; a missing directory is not an error.
pub fn remove_dir_all(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove directory: {}", path.display()))?;
    }
    Ok(())
}

/// Async [`copy_path`].
pub async fn copy_path_async(src: &Path, dst: &Path) -> Result<()> {
    let (src, dst) = (src.to_path_buf(), dst.to_path_buf());
    tokio::task::spawn_blocking(move || copy_path(&src, &dst))
        .await
        .context("Copy task panicked")?
}

/// Async [`remove_dir_all`].
pub async fn remove_dir_all_async(path: &Path) -> Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || remove_dir_all(&path))
        .await
        .context("Remove task panicked")?
}

/// Async [`atomic_write`].
pub async fn atomic_write_async(path: &Path, content: Vec<u8>) -> Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || atomic_write(&path, &content))
        .await
        .context("Write task panicked")?
}

/// A sibling directory that replaces a target directory in one step.
///
/// The staging directory starts as a copy of the target (if present). When
/// [`StagedDir::commit`] runs, the old target is moved aside, the staging
/// directory is renamed into place and the old copy is removed. Dropping an
/// uncommitted `StagedDir` deletes the staging directory and leaves the target
/// untouched.
#[derive(Debug)]
pub struct StagedDir {
    target: PathBuf,
    staging: PathBuf,
    committed: bool,
}

impl StagedDir {
    /// Creates the staging directory next to `target`.
    pub async fn prepare(target: &Path) -> Result<Self> {
        let name = target
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid destination path: {}", target.display()))?;
        let parent = target.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

        let staging =
            parent.join(format!(".{name}.staging-{}", uuid::Uuid::new_v4().simple()));
        if target.exists() {
            copy_path_async(target, &staging).await?;
        } else {
            tokio::fs::create_dir_all(&staging).await.with_context(|| {
                format!("Failed to create staging directory: {}", staging.display())
            })?;
        }

        tracing::debug!(
            target: "installer",
            "Staging {} in {}",
            target.display(),
            staging.display()
        );

        Ok(Self {
            target: target.to_path_buf(),
            staging,
            committed: false,
        })
    }

    /// The directory to write into.
    pub fn path(&self) -> &Path {
        &self.staging
    }

    /// Swaps the staging directory into place.
    pub async fn commit(mut self) -> Result<()> {
        let mut backup = self.staging.clone().into_os_string();
        backup.push(".old");
        let backup = PathBuf::from(backup);
        let had_target = self.target.exists();
        if had_target {
            tokio::fs::rename(&self.target, &backup).await.with_context(|| {
                format!("Failed to move {} aside", self.target.display())
            })?;
        }

        if let Err(error) = tokio::fs::rename(&self.staging, &self.target).await {
            let error = anyhow::Error::new(error).context(format!(
                "Failed to move staging directory into {}",
                self.target.display()
            ));
            if had_target {
                // Put the previous directory back so the destination is never left missing.
                if let Err(rollback) = tokio::fs::rename(&backup, &self.target).await {
                    return Err(restore_failed(error, &self.target, &backup, &rollback));
                }
            }
            return Err(error);
        }
        self.committed = true;

        if had_target {
            remove_dir_all_async(&backup).await?;
        }
        Ok(())
    }
}

impl Drop for StagedDir {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(error) = fs::remove_dir_all(&self.staging) {
                if error.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        target: "installer",
                        "Failed to remove staging directory {}: {}",
                        self.staging.display(),
                        error
                    );
                }
            }
        }
    }
}

/// A failed swap whose rollback failed too: the previous contents are only
/// left in `backup`.
fn restore_failed(error: anyhow::Error, target: &Path, backup: &Path, rollback: &std::io::Error) -> anyhow::Error {
    tracing::error!(
        target: "installer",
        "Failed to restore {} from {}: {}",
        target.display(),
        backup.display(),
        rollback
    );
    error.context(format!(
        "previous contents of {} remain in {} (restore failed: {rollback})",
        target.display(),
        backup.display()
    ))
}
