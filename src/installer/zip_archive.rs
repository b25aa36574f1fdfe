//! Installs zip archive products by extracting them into the root.

use super::Installer;
use crate::core::PpError;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::fs::File;
use std::path::Path;

/// Extracts zip products, refusing entries that would land outside the root.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipInstaller;

fn extract(product: &Path, root: &Path) -> Result<usize> {
    let file = File::open(product)
        .with_context(|| format!("Failed to open archive: {}", product.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to read zip archive: {}", product.display()))?;

    std::fs::create_dir_all(root)
        .with_context(|| format!("Failed to create directory: {}", root.display()))?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(PpError::BackendCommandFailure {
                operation: "zip install".to_string(),
                message: format!("entry '{}' escapes the installation root", entry.name()),
            }
            .into());
        };
        let target = root.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)
            .with_context(|| format!("Failed to create file: {}", target.display()))?;
        std::io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract {}", target.display()))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&target, std::fs::Permissions::from_mode(mode))?;
        }
    }
    Ok(archive.len())
}

impl Installer for ZipInstaller {
    fn install<'a>(&'a self, product: &'a Path, root: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let (product, root) = (product.to_path_buf(), root.to_path_buf());
            let entries = tokio::task::spawn_blocking(move || extract(&product, &root))
                .await
                .context("Zip extraction task failed")??;
            tracing::trace!(target: "installer", "Extracted {} zip entries", entries);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, content) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn test_extracts_into_root() {
        let temp = TempDir::new().unwrap();
        let product = temp.path().join("product");
        write_zip(&product, &[("bin/tool", "tool"), ("share/doc.txt", "doc")]);

        let root = temp.path().join("root");
        ZipInstaller.install(&product, &root).await.unwrap();

        assert_eq!(std::fs::read_to_string(root.join("bin/tool")).unwrap(), "tool");
        assert_eq!(std::fs::read_to_string(root.join("share/doc.txt")).unwrap(), "doc");
    }

    #[tokio::test]
    async fn test_rejects_escaping_entries() {
        let temp = TempDir::new().unwrap();
        let product = temp.path().join("product");
        write_zip(&product, &[("../evil.txt", "evil")]);

        let root = temp.path().join("root");
        let error = ZipInstaller.install(&product, &root).await.unwrap_err();
        assert!(error.to_string().contains("escapes"));
        assert!(!temp.path().join("evil.txt").exists());
    }
}
