//! Persisted version ledger (.build-versions.json)
//!
//! The ledger is a pretty-printed JSON array of versions, oldest first. It is
//! read once at the start of a cycle and replaced wholesale at a single
//! point; it is never patched in place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use keeper_model::Version;

/// Errors for ledger persistence
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Handle on the ledger file.
#[derive(Debug, Clone)]
pub struct VersionLedger {
    path: PathBuf,
}

impl VersionLedger {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted ledger.
    ///
    /// A missing file is an empty ledger. An unreadable or unparsable file is
    /// logged and also treated as empty: losing history only reduces
    /// retention depth.
    pub fn load(&self) -> Vec<Version> {
        match self.try_load() {
            Ok(versions) => versions,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to read version ledger, starting from an empty history"
                );
                Vec::new()
            }
        }
    }

    /// Read the persisted ledger, surfacing read and parse failures.
    pub fn try_load(&self) -> Result<Vec<Version>, LedgerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// Replace the persisted ledger (write-then-rename).
    pub fn save(&self, versions: &[Version]) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(versions)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &json)?;
        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        Ok(())
    }

    /// Delete the ledger file. A missing file is not an error.
    pub fn reset(&self) -> Result<bool, LedgerError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Append `version` and evict from the front until at most `max_versions`
/// remain.
///
/// Eviction follows ledger position only; timestamps are never compared.
/// Returns the new ledger and the evicted versions, oldest first.
pub fn append(mut ledger: Vec<Version>, version: Version, max_versions: usize) -> (Vec<Version>, Vec<Version>) {
    ledger.push(version);

    let excess = ledger.len().saturating_sub(max_versions.max(1));
    let evicted: Vec<Version> = ledger.drain(..excess).collect();

    (ledger, evicted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use keeper_model::{FileRecord, VersionId};
    use tempfile::TempDir;

    fn version(id: &str, files: &[&str]) -> Version {
        Version {
            id: VersionId::from(id),
            timestamp: Utc::now(),
            files: files
                .iter()
                .map(|p| FileRecord::new(*p, "h", 1, Utc::now()))
                .collect(),
        }
    }

    fn ids(versions: &[Version]) -> Vec<&str> {
        versions.iter().map(|v| v.id.as_str()).collect()
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = VersionLedger::new(dir.path().join(".build-versions.json"));
        assert!(ledger.load().is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".build-versions.json");
        fs::write(&path, "{ not json").unwrap();

        let ledger = VersionLedger::new(path);
        assert!(ledger.load().is_empty());
        assert!(matches!(ledger.try_load(), Err(LedgerError::Json(_))));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let ledger = VersionLedger::new(dir.path().join("nested/.build-versions.json"));
        let versions = vec![version("1-aaaaaa", &["assets/a.js"]), version("2-bbbbbb", &["assets/b.js"])];

        ledger.save(&versions).unwrap();
        let loaded = ledger.load();

        assert_eq!(ids(&loaded), vec!["1-aaaaaa", "2-bbbbbb"]);
        assert_eq!(loaded[1].files[0].path, "assets/b.js");
        assert!(!dir.path().join("nested/.build-versions.json.tmp").exists());
    }

    #[test]
    fn test_save_replaces_wholesale() {
        let dir = TempDir::new().unwrap();
        let ledger = VersionLedger::new(dir.path().join(".build-versions.json"));

        ledger.save(&[version("1-aaaaaa", &[]), version("2-bbbbbb", &[])]).unwrap();
        ledger.save(&[version("3-cccccc", &[])]).unwrap();

        assert_eq!(ids(&ledger.load()), vec!["3-cccccc"]);
    }

    #[test]
    fn test_save_failure_surfaces() {
        let dir = TempDir::new().unwrap();
        // Parent "directory" is a regular file
        fs::write(dir.path().join("blocker"), "x").unwrap();
        let ledger = VersionLedger::new(dir.path().join("blocker/.build-versions.json"));

        assert!(ledger.save(&[version("1-aaaaaa", &[])]).is_err());
    }

    #[test]
    fn test_reset() {
        let dir = TempDir::new().unwrap();
        let ledger = VersionLedger::new(dir.path().join(".build-versions.json"));

        assert!(!ledger.reset().unwrap());
        ledger.save(&[version("1-aaaaaa", &[])]).unwrap();
        assert!(ledger.reset().unwrap());
        assert!(!ledger.path().exists());
    }

    #[test]
    fn test_append_within_bound() {
        let (ledger, evicted) = append(vec![version("1", &[])], version("2", &[]), 3);
        assert_eq!(ids(&ledger), vec!["1", "2"]);
        assert!(evicted.is_empty());
    }

    #[test]
    fn test_append_evicts_oldest_first() {
        let existing = vec![version("1", &[]), version("2", &[]), version("3", &[])];
        let (ledger, evicted) = append(existing, version("4", &[]), 2);

        assert_eq!(ids(&ledger), vec!["3", "4"]);
        assert_eq!(ids(&evicted), vec!["1", "2"]);
    }

    #[test]
    fn test_append_ignores_timestamps() {
        // Front entry carries the newest timestamp; position still wins
        let mut skewed = version("skewed", &[]);
        skewed.timestamp = Utc::now() + Duration::days(365);
        let existing = vec![skewed, version("normal", &[])];

        let (ledger, evicted) = append(existing, version("new", &[]), 2);
        assert_eq!(ids(&evicted), vec!["skewed"]);
        assert_eq!(ids(&ledger), vec!["normal", "new"]);
    }

    #[test]
    fn test_bound_holds_over_many_cycles() {
        let max = 3;
        let mut ledger = Vec::new();
        for k in 1..=10 {
            let (next, _) = append(ledger, version(&k.to_string(), &[]), max);
            ledger = next;
            assert_eq!(ledger.len(), k.min(max));
        }
    }
}
