//! Single-file transfer task
//!
//! Copies one file into the destination repository. A file that is already
//! present with the same size is treated as transferred, so the task can be
//! repeated safely after a partial failure.

use crate::core::Task;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One file to move from the source tree into the destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTransfer {
    /// Absolute path of the source file
    pub source: PathBuf,
    /// Path relative to the source root
    pub relative_path: PathBuf,
    /// Final destination path
    pub destination: PathBuf,
    /// Source size in bytes at scan time
    pub size: u64,
}

impl FileTransfer {
    /// Create a transfer of `relative_path` from `source_root` into `dest_root`
    pub fn new(source_root: &Path, dest_root: &Path, relative_path: PathBuf, size: u64) -> Self {
        Self {
            source: source_root.join(&relative_path),
            destination: dest_root.join(&relative_path),
            relative_path,
            size,
        }
    }

    /// Check if the destination already holds a file of the same size
    pub fn is_duplicate(&self) -> bool {
        match std::fs::metadata(&self.destination) {
            Ok(meta) => meta.is_file() && meta.len() == self.size,
            Err(_) => false,
        }
    }

    /// Temporary sibling the data is written to before the final rename
    fn partial_path(&self) -> PathBuf {
        let name = self
            .destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.destination.with_file_name(format!(".{}.part", name))
    }

    /// Copy into place through a temporary file. Returns bytes written.
    ///
    /// When the source no longer matches the recorded size the partial copy
    /// is discarded and `size` is refreshed from the source, so the next
    /// attempt transfers the current contents.
    pub fn copy_into_place(&mut self) -> anyhow::Result<u64> {
        if let Some(parent) = self.destination.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let partial = self.partial_path();
        let bytes = match std::fs::copy(&self.source, &partial) {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = std::fs::remove_file(&partial);
                return Err(e).with_context(|| {
                    format!("copying {} to {}", self.source.display(), partial.display())
                });
            }
        };

        if bytes != self.size {
            let _ = std::fs::remove_file(&partial);
            let expected = self.size;
            if let Ok(meta) = std::fs::metadata(&self.source) {
                self.size = meta.len();
            }
            anyhow::bail!(
                "size mismatch for {}: expected {} bytes, copied {}",
                self.relative_path.display(),
                expected,
                bytes
            );
        }

        if let Err(e) = std::fs::rename(&partial, &self.destination) {
            let _ = std::fs::remove_file(&partial);
            return Err(e).with_context(|| format!("renaming into {}", self.destination.display()));
        }

        Ok(bytes)
    }
}

impl Task for FileTransfer {
    fn attempt(&mut self) -> anyhow::Result<bool> {
        if self.is_duplicate() {
            tracing::debug!("File {} is duplicate, transfer skipped", self.relative_path.display());
            return Ok(true);
        }

        let bytes = self.copy_into_place()?;
        tracing::debug!(
            "File {}: transferred {}",
            self.relative_path.display(),
            humansize::format_size(bytes, humansize::BINARY)
        );
        Ok(true)
    }

    fn label(&self) -> String {
        self.relative_path.to_string_lossy().into_owned()
    }
}
