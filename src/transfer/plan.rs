//! Transfer planning
//!
//! Walks the source tree and turns every regular file into a
//! [`FileTransfer`] task, in file-name order.

use crate::core::BoxedTask;
use crate::error::{DispatchError, IoResultExt, Result};
use crate::transfer::FileTransfer;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Which source files become transfers
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// Include hidden files and directories
    pub include_hidden: bool,
    /// Follow symbolic links
    pub follow_symlinks: bool,
    /// Include patterns (glob, relative to the source root)
    pub include_patterns: Vec<String>,
    /// Exclude patterns (glob, relative to the source root)
    pub exclude_patterns: Vec<String>,
}

/// Files to move from one tree into another
#[derive(Debug, Clone)]
pub struct TransferPlan {
    /// Canonical source root
    pub source_root: PathBuf,
    /// Destination root
    pub destination_root: PathBuf,
    /// One transfer per file
    pub transfers: Vec<FileTransfer>,
    /// Sum of all file sizes
    pub total_bytes: u64,
    /// Entries that could not be read during the walk
    pub errors: Vec<String>,
}

impl TransferPlan {
    /// Scan `source` and plan a transfer of each file into `destination`
    pub fn scan(source: &Path, destination: &Path, options: &TransferOptions) -> Result<Self> {
        if !source.is_dir() {
            return Err(DispatchError::NotFound(source.to_path_buf()));
        }

        let source_root = source.canonicalize().with_path(source)?;
        let include = build_globset(&options.include_patterns)?;
        let exclude = build_globset(&options.exclude_patterns)?;

        let walker = WalkDir::new(&source_root)
            .follow_links(options.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || options.include_hidden || !is_hidden(e));

        let mut transfers = Vec::new();
        let mut errors = Vec::new();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!("Skipping unreadable entry: {}", err);
                    errors.push(err.to_string());
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let relative = match entry.path().strip_prefix(&source_root) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => continue,
            };

            let rel_str = relative.to_string_lossy();
            let included = include.is_empty() || include.is_match(&*rel_str);
            if !included || exclude.is_match(&*rel_str) {
                continue;
            }

            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(err) => {
                    errors.push(err.to_string());
                    continue;
                }
            };

            transfers.push(FileTransfer::new(&source_root, destination, relative, size));
        }

        let total_bytes = transfers.iter().map(|t| t.size).sum();
        tracing::info!(
            files = transfers.len(),
            "Planned transfer of {} from {}",
            humansize::format_size(total_bytes, humansize::BINARY),
            source_root.display()
        );

        Ok(Self {
            source_root,
            destination_root: destination.to_path_buf(),
            transfers,
            total_bytes,
            errors,
        })
    }

    /// Number of planned files
    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    /// Check if there is nothing to transfer
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    /// Transfers whose destination already holds the same file
    pub fn duplicates(&self) -> usize {
        self.transfers.iter().filter(|t| t.is_duplicate()).count()
    }

    /// Convert into dispatcher tasks, preserving plan order
    pub fn into_tasks(self) -> Vec<BoxedTask> {
        self.transfers
            .into_iter()
            .map(|t| Box::new(t) as BoxedTask)
            .collect()
    }

    /// Print the planned transfers
    pub fn print_listing(&self) {
        println!("=== Transfer Plan ===");
        println!("Source:      {}", self.source_root.display());
        println!("Destination: {}", self.destination_root.display());
        println!(
            "Files:       {} ({})",
            self.len(),
            humansize::format_size(self.total_bytes, humansize::BINARY)
        );
        println!("Duplicates:  {}", self.duplicates());
        println!();

        for transfer in &self.transfers {
            let marker = if transfer.is_duplicate() { "=" } else { "+" };
            println!(
                "  {} {} ({})",
                marker,
                transfer.relative_path.display(),
                humansize::format_size(transfer.size, humansize::BINARY)
            );
        }

        if !self.errors.is_empty() {
            println!("\nUnreadable entries: {}", self.errors.len());
            for error in &self.errors {
                println!("  {}", error);
            }
        }
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            DispatchError::config(format!("Invalid glob pattern '{}': {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| DispatchError::config(format!("Failed to build glob set: {}", e)))
}
