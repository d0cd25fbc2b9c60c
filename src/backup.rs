//! Staging of the current build's files around a sweep
//!
//! Before the sweep, every file of the new version is staged under
//! `<output_root>/.build-keeper-staging/<version-id>/`, outside the swept
//! subtree. After the sweep, any staged file missing from the output tree is
//! put back. The staging area is discarded only once every file is back in
//! place; otherwise it is left on disk for manual recovery.
//!
//! Staging prefers a hard link and falls back to a copy. Either way the staged
//! entry outlives deletion of the original.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use keeper_model::FileRecord;

/// Counters from `stage`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Files staged by hard link
    pub linked: usize,
    /// Files staged by copy
    pub copied: usize,
    /// Files that could not be staged
    pub failed: Vec<String>,
}

impl StageReport {
    pub fn staged(&self) -> usize {
        self.linked + self.copied
    }
}

/// Counters from `restore`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Files put back into the output tree
    pub restored: usize,
    /// Files that survived the sweep and needed nothing
    pub already_present: usize,
    /// Files that could not be put back
    pub failed: Vec<String>,
}

/// Guards the files of one build across a sweep.
#[derive(Debug)]
pub struct BackupGuard {
    output_root: PathBuf,
    staging_root: PathBuf,
    staging_dir: PathBuf,
}

impl BackupGuard {
    /// `staging_root` must lie outside the swept subtree; `cycle_id` names
    /// this cycle's directory inside it.
    pub fn new(output_root: PathBuf, staging_root: PathBuf, cycle_id: &str) -> Self {
        let staging_dir = staging_root.join(cycle_id);
        Self {
            output_root,
            staging_root,
            staging_dir,
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Stage every file in `files`.
    ///
    /// Leftovers from interrupted cycles are removed first. A file that
    /// cannot be staged is logged and reported; the others are still staged.
    pub fn stage(&self, files: &[FileRecord]) -> StageReport {
        let mut report = StageReport::default();

        self.remove_stale_staging();

        for file in files {
            let rel = match rel_path(&file.path) {
                Some(rel) => rel,
                None => {
                    tracing::warn!(path = %file.path, "refusing to stage path outside the output root");
                    report.failed.push(file.path.clone());
                    continue;
                }
            };

            let source = self.output_root.join(&rel);
            let staged = self.staging_dir.join(&rel);

            match link_or_copy(&source, &staged) {
                Ok(Transfer::Linked) => {
                    tracing::debug!(path = %file.path, "staged (hard link)");
                    report.linked += 1;
                }
                Ok(Transfer::Copied) => {
                    tracing::debug!(path = %file.path, "staged (copy)");
                    report.copied += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        path = %file.path,
                        error = %e,
                        "failed to stage file; it is unprotected during this sweep"
                    );
                    report.failed.push(file.path.clone());
                }
            }
        }

        report
    }

    /// Put back every staged file of `files` that is missing from the output
    /// tree, recreating pruned parent directories.
    pub fn restore(&self, files: &[FileRecord]) -> RestoreReport {
        let mut report = RestoreReport::default();

        for file in files {
            let Some(rel) = rel_path(&file.path) else {
                continue;
            };

            let staged = self.staging_dir.join(&rel);
            if fs::symlink_metadata(&staged).is_err() {
                // Never staged; nothing to put back
                continue;
            }

            let target = self.output_root.join(&rel);
            if fs::symlink_metadata(&target).is_ok() {
                report.already_present += 1;
                continue;
            }

            match link_or_copy(&staged, &target) {
                Ok(_) => {
                    tracing::debug!(path = %file.path, "restored from staging");
                    report.restored += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %file.path, error = %e, "failed to restore file");
                    report.failed.push(file.path.clone());
                }
            }
        }

        report
    }

    /// Delete this cycle's staging directory, and the staging root if it is
    /// left empty.
    pub fn discard(self) -> io::Result<()> {
        match fs::remove_dir_all(&self.staging_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        // Fails harmlessly if another entry is still present
        let _ = fs::remove_dir(&self.staging_root);
        Ok(())
    }

    fn remove_stale_staging(&self) {
        let entries = match fs::read_dir(&self.staging_root) {
            Ok(entries) => entries,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path == self.staging_dir {
                continue;
            }
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => tracing::debug!(path = %path.display(), "removed stale staging entry"),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove stale staging entry"),
            }
        }
    }
}

enum Transfer {
    Linked,
    Copied,
}

fn link_or_copy(from: &Path, to: &Path) -> io::Result<Transfer> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::remove_file(to) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    if fs::hard_link(from, to).is_ok() {
        return Ok(Transfer::Linked);
    }
    fs::copy(from, to)?;
    Ok(Transfer::Copied)
}

/// Convert a `/`-separated record path into a relative `PathBuf`, rejecting
/// anything that could resolve outside the directory it is joined onto.
pub fn rel_path(path: &str) -> Option<PathBuf> {
    if path.is_empty() {
        return None;
    }
    let rel = PathBuf::from(path);
    let plain = rel.components().all(|c| matches!(c, Component::Normal(_)));
    if plain {
        Some(rel)
    } else {
        None
    }
}

/// Canonical form of a record path: components joined with `/`, with empty
/// and `.` segments dropped. This is the form the sweep compares against.
/// `None` when the path is empty or could resolve outside the output root.
pub fn canonical_path(path: &str) -> Option<String> {
    let mut parts = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
