//! Asset garbage collection
//!
//! Sweeps the asset subtree of the output root:
//! - Every regular file whose `/`-normalized output-root-relative path is not
//!   in the reference set is deleted
//! - Directories left empty are then pruned, deepest first
//! - Individual failures are logged and skipped, never fatal
//!
//! Nothing outside `<output_root>/<asset_subdir>` is ever visited.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::reference::ReferenceSet;

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepResult {
    /// Files examined
    pub scanned: usize,
    /// Files kept because they are referenced
    pub retained: usize,
    /// Files deleted
    pub deleted: usize,
    /// Bytes reclaimed by deleted files
    pub bytes_reclaimed: u64,
    /// Empty directories removed
    pub dirs_removed: usize,
    /// Errors encountered (non-fatal)
    pub errors: Vec<String>,
}

/// Garbage collector for one asset subtree.
#[derive(Debug, Clone)]
pub struct AssetGc {
    output_root: PathBuf,
    asset_subdir: String,
}

impl AssetGc {
    /// `asset_subdir` is relative to `output_root`, `/`-separated, without a
    /// trailing slash.
    pub fn new(output_root: PathBuf, asset_subdir: impl Into<String>) -> Self {
        Self {
            output_root,
            asset_subdir: asset_subdir.into(),
        }
    }

    /// Absolute path of the swept directory.
    pub fn asset_dir(&self) -> PathBuf {
        self.asset_subdir
            .split('/')
            .fold(self.output_root.clone(), |acc, part| acc.join(part))
    }

    /// Delete every unreferenced file under the asset directory, then prune
    /// empty directories.
    ///
    /// A missing asset directory is a no-op. An empty reference set deletes
    /// everything under the subtree.
    pub fn sweep(&self, refs: &ReferenceSet) -> SweepResult {
        let mut result = SweepResult::default();
        let asset_dir = self.asset_dir();

        match fs::symlink_metadata(&asset_dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                tracing::warn!(path = %asset_dir.display(), "asset path is not a directory, skipping sweep");
                return result;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %asset_dir.display(), "asset directory does not exist, skipping sweep");
                return result;
            }
            Err(e) => {
                let msg = format!("Failed to stat {}: {}", asset_dir.display(), e);
                tracing::warn!("{}", msg);
                result.errors.push(msg);
                return result;
            }
        }

        tracing::debug!(referenced = refs.len(), "sweeping {}", asset_dir.display());

        self.delete_unreferenced(&asset_dir, refs, &mut result);
        self.prune_empty_dirs(&asset_dir, &mut result);

        result
    }

    fn delete_unreferenced(&self, asset_dir: &Path, refs: &ReferenceSet, result: &mut SweepResult) {
        let mut doomed = Vec::new();

        for entry in WalkDir::new(asset_dir).follow_links(false).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let msg = format!("Walk error: {}", e);
                    tracing::warn!("{}", msg);
                    result.errors.push(msg);
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                continue;
            }

            let Some(rel) = relative_key(&self.output_root, entry.path()) else {
                continue;
            };

            result.scanned += 1;
            if refs.contains(&rel) {
                tracing::debug!(path = %rel, "retained");
                result.retained += 1;
            } else {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                doomed.push((entry.into_path(), rel, size));
            }
        }

        for (path, rel, size) in doomed {
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!(path = %rel, bytes = size, "deleted unreferenced file");
                    result.deleted += 1;
                    result.bytes_reclaimed += size;
                }
                Err(e) => {
                    let msg = format!("Failed to delete {}: {}", rel, e);
                    tracing::warn!("{}", msg);
                    result.errors.push(msg);
                }
            }
        }
    }

    /// Remove directories with no remaining entries. `contents_first` yields
    /// children before their parent, so a parent emptied by this pass is
    /// removed in the same pass. The asset directory itself is kept.
    fn prune_empty_dirs(&self, asset_dir: &Path, result: &mut SweepResult) {
        for entry in WalkDir::new(asset_dir)
            .follow_links(false)
            .min_depth(1)
            .contents_first(true)
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let msg = format!("Walk error: {}", e);
                    tracing::warn!("{}", msg);
                    result.errors.push(msg);
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            let is_empty = match fs::read_dir(path) {
                Ok(mut items) => items.next().is_none(),
                Err(e) => {
                    let msg = format!("Failed to read {}: {}", path.display(), e);
                    tracing::warn!("{}", msg);
                    result.errors.push(msg);
                    continue;
                }
            };

            if !is_empty {
                continue;
            }

            match fs::remove_dir(path) {
                Ok(()) => {
                    tracing::debug!(
                        path = %relative_key(&self.output_root, path).unwrap_or_default(),
                        "removed empty directory"
                    );
                    result.dirs_removed += 1;
                }
                Err(e) => {
                    let msg = format!("Failed to remove directory {}: {}", path.display(), e);
                    tracing::warn!("{}", msg);
                    result.errors.push(msg);
                }
            }
        }
    }
}

/// Output-root-relative path of `path` joined with `/`, whatever the
/// platform separator.
pub fn relative_key(output_root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(output_root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
