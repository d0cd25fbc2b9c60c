//! Retention cycle
//!
//! One cycle per completed build, strictly in this order:
//! IDLE → LEDGER_LOADED → VERSION_APPENDED → LEDGER_PERSISTED → SWEPT →
//! RESTORED → COMPLETE
//!
//! Every step after loading degrades to a logged warning on failure; the
//! cycle always reaches COMPLETE. Only configuration errors, raised before
//! the engine exists, stop anything.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use keeper_model::{BuildResult, FileRecord, Version, VersionId};

use crate::backup::{canonical_path, BackupGuard, RestoreReport, StageReport};
use crate::config::{ConfigError, KeeperConfig, KeeperOptions};
use crate::gc::{AssetGc, SweepResult};
use crate::ledger::{self, VersionLedger};
use crate::reference::ReferenceSet;

/// Phase of a retention cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CyclePhase {
    Idle,
    LedgerLoaded,
    VersionAppended,
    LedgerPersisted,
    Swept,
    Restored,
    Complete,
}

impl CyclePhase {
    /// Phases only ever advance by one step.
    pub fn can_transition_to(&self, target: CyclePhase) -> bool {
        matches!(
            (self, target),
            (CyclePhase::Idle, CyclePhase::LedgerLoaded)
                | (CyclePhase::LedgerLoaded, CyclePhase::VersionAppended)
                | (CyclePhase::VersionAppended, CyclePhase::LedgerPersisted)
                | (CyclePhase::LedgerPersisted, CyclePhase::Swept)
                | (CyclePhase::Swept, CyclePhase::Restored)
                | (CyclePhase::Restored, CyclePhase::Complete)
        )
    }
}

/// Everything a cycle did, beyond the `BuildResult` handed to the host.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Result returned to the host
    pub result: BuildResult,
    /// Ids of versions evicted this cycle, oldest first
    pub evicted: Vec<VersionId>,
    /// Whether the ledger was persisted
    pub ledger_saved: bool,
    /// Size of the reference set used for the sweep
    pub referenced: usize,
    /// Sweep counters
    pub sweep: SweepResult,
    /// Staging counters
    pub stage: StageReport,
    /// Restore counters
    pub restore: RestoreReport,
    /// Whether the staging area was discarded
    pub staging_discarded: bool,
    /// Non-fatal problems, in the order they happened
    pub warnings: Vec<String>,
    /// Last phase reached (always `Complete` for a returned report)
    pub phase: CyclePhase,
}

/// Runs retention cycles for one output root.
///
/// Assumes a single writer: no other process may run a cycle against the
/// same output root or ledger concurrently.
#[derive(Debug, Clone)]
pub struct RetentionEngine {
    config: KeeperConfig,
    ledger: VersionLedger,
}

impl RetentionEngine {
    pub fn new(config: KeeperConfig) -> Self {
        let ledger = VersionLedger::new(config.ledger_path.clone());
        Self { config, ledger }
    }

    /// Validate `options` against `project_root` and build an engine.
    pub fn from_options(options: &KeeperOptions, project_root: &Path) -> Result<Self, ConfigError> {
        Ok(Self::new(options.validate(project_root)?))
    }

    pub fn config(&self) -> &KeeperConfig {
        &self.config
    }

    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    /// Versions currently in the persisted ledger, oldest first.
    pub fn versions(&self) -> Vec<Version> {
        self.ledger.load()
    }

    /// Run one cycle for the files the host just produced.
    ///
    /// Returns `None` without touching the filesystem when the keeper is
    /// disabled.
    pub fn run_cycle(&self, generated: Vec<FileRecord>) -> Option<CycleReport> {
        if !self.config.enabled {
            tracing::debug!("build keeper disabled, skipping retention cycle");
            return None;
        }
        Some(self.cycle(generated))
    }

    fn cycle(&self, generated: Vec<FileRecord>) -> CycleReport {
        let mut phase = CyclePhase::Idle;
        let mut warnings = Vec::new();
        let file_count = generated.len();

        tracing::debug!("starting retention cycle");

        if let Err(e) = fs::create_dir_all(&self.config.output_root) {
            let msg = format!(
                "Failed to create output root {}: {}",
                self.config.output_root.display(),
                e
            );
            warn(&mut warnings, msg);
        }

        // Load
        let versions = self.ledger.load();
        advance(&mut phase, CyclePhase::LedgerLoaded);
        tracing::debug!(versions = versions.len(), "ledger loaded");

        // Append
        let asset_files = self.select_asset_files(generated, &mut warnings);
        tracing::debug!("asset files: {}/{}", asset_files.len(), file_count);
        let version = Version::new(asset_files);
        let version_id = version.id.clone();
        tracing::debug!(version_id = %version_id, "new version");

        let files = version.files.clone();
        let (versions, evicted) = ledger::append(versions, version, self.config.max_versions);
        for old in &evicted {
            tracing::debug!(
                version_id = %old.id,
                max_versions = self.config.max_versions,
                "evicting oldest version"
            );
        }
        advance(&mut phase, CyclePhase::VersionAppended);

        // Persist
        let ledger_saved = match self.ledger.save(&versions) {
            Ok(()) => true,
            Err(e) => {
                let msg = format!(
                    "Failed to save version ledger {}: {}; continuing with in-memory history",
                    self.ledger.path().display(),
                    e
                );
                warn(&mut warnings, msg);
                false
            }
        };
        advance(&mut phase, CyclePhase::LedgerPersisted);

        // Stage, then sweep
        let guard = BackupGuard::new(
            self.config.output_root.clone(),
            self.config.staging_root(),
            version_id.as_str(),
        );
        let stage = guard.stage(&files);
        for path in &stage.failed {
            warnings.push(format!("Not staged, unprotected during sweep: {}", path));
        }

        let refs = ReferenceSet::compute(&versions, &self.config.asset_prefix);
        tracing::debug!(referenced = refs.len(), "reference set computed");

        let gc = AssetGc::new(self.config.output_root.clone(), self.config.asset_subdir());
        let sweep = gc.sweep(&refs);
        warnings.extend(sweep.errors.iter().cloned());
        advance(&mut phase, CyclePhase::Swept);

        // Restore, then discard
        let restore = guard.restore(&files);
        if restore.restored > 0 {
            tracing::warn!(
                restored = restore.restored,
                "sweep removed files of the current build; restored them from staging"
            );
        }
        for path in &restore.failed {
            warnings.push(format!("Failed to restore: {}", path));
        }

        let staging_dir = guard.staging_dir().to_path_buf();
        let staging_discarded = if restore.failed.is_empty() {
            match guard.discard() {
                Ok(()) => true,
                Err(e) => {
                    let msg = format!(
                        "Failed to discard staging area {}: {}",
                        staging_dir.display(),
                        e
                    );
                    warn(&mut warnings, msg);
                    false
                }
            }
        } else {
            let msg = format!(
                "Keeping staging area {} for manual recovery",
                staging_dir.display()
            );
            warn(&mut warnings, msg);
            false
        };
        advance(&mut phase, CyclePhase::Restored);

        let result = BuildResult {
            version_id: version_id.to_string(),
            file_count,
            total_versions: versions.len(),
        };
        advance(&mut phase, CyclePhase::Complete);

        tracing::info!(
            version_id = %result.version_id,
            deleted = sweep.deleted,
            "versions {}/{}, cleaned files: {}",
            result.total_versions,
            self.config.max_versions,
            sweep.deleted
        );

        CycleReport {
            result,
            evicted: evicted.into_iter().map(|v| v.id).collect(),
            ledger_saved,
            referenced: refs.len(),
            sweep,
            stage,
            restore,
            staging_discarded,
            warnings,
            phase,
        }
    }

    /// Keep host files under the asset prefix, stored under their canonical
    /// path. Unsafe and duplicate paths are dropped so every path is unique
    /// within the version.
    fn select_asset_files(&self, generated: Vec<FileRecord>, warnings: &mut Vec<String>) -> Vec<FileRecord> {
        let mut seen = HashSet::new();
        let mut selected = Vec::with_capacity(generated.len());

        for mut file in generated {
            let Some(path) = canonical_path(&file.path) else {
                warn(warnings, format!("Ignoring unsafe output path: {}", file.path));
                continue;
            };
            if path != file.path {
                tracing::debug!(from = %file.path, to = %path, "canonicalized output path");
                file.path = path;
            }
            if !file.is_under(&self.config.asset_prefix) {
                continue;
            }
            if !seen.insert(file.path.clone()) {
                tracing::debug!(path = %file.path, "duplicate output path, keeping first record");
                continue;
            }
            selected.push(file);
        }

        selected
    }
}

fn advance(phase: &mut CyclePhase, next: CyclePhase) {
    debug_assert!(phase.can_transition_to(next), "{:?} -> {:?}", phase, next);
    *phase = next;
    tracing::trace!(phase = ?next, "retention cycle phase");
}

fn warn(warnings: &mut Vec<String>, msg: String) {
    tracing::warn!("{}", msg);
    warnings.push(msg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn engine(root: &Path, max_versions: u32) -> RetentionEngine {
        let options = KeeperOptions {
            max_versions: Some(max_versions),
            ..Default::default()
        };
        RetentionEngine::from_options(&options, root).unwrap()
    }

    fn produce(root: &Path, rel: &str) -> FileRecord {
        let path = root.join("dist").join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, rel).unwrap();
        FileRecord::new(rel, "h", rel.len() as u64, Utc::now())
    }

    #[test]
    fn test_phase_transitions() {
        assert!(CyclePhase::Idle.can_transition_to(CyclePhase::LedgerLoaded));
        assert!(CyclePhase::Restored.can_transition_to(CyclePhase::Complete));
        assert!(!CyclePhase::Idle.can_transition_to(CyclePhase::Swept));
        assert!(!CyclePhase::Complete.can_transition_to(CyclePhase::Idle));
        assert!(!CyclePhase::Swept.can_transition_to(CyclePhase::LedgerPersisted));
    }

    #[test]
    fn test_cycle_reaches_complete() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let files = vec![produce(root, "assets/a.js"), produce(root, "index.html")];

        let report = engine(root, 3).run_cycle(files).unwrap();

        assert_eq!(report.phase, CyclePhase::Complete);
        assert_eq!(report.result.file_count, 2);
        assert_eq!(report.result.total_versions, 1);
        assert!(report.ledger_saved);
        assert!(report.staging_discarded);
        assert!(report.warnings.is_empty());
        assert!(!root.join("dist/.build-keeper-staging").exists());
    }

    #[test]
    fn test_version_records_only_asset_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let files = vec![produce(root, "assets/a.js"), produce(root, "index.html")];

        let engine = engine(root, 3);
        engine.run_cycle(files).unwrap();

        let versions = engine.versions();
        assert_eq!(versions.len(), 1);
        let paths: Vec<_> = versions[0].files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["assets/a.js"]);
    }

    #[test]
    fn test_duplicate_and_unsafe_paths_dropped() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let a = produce(root, "assets/a.js");
        let files = vec![
            a.clone(),
            a,
            FileRecord::new("assets/../../escape.js", "h", 1, Utc::now()),
        ];

        let engine = engine(root, 3);
        let report = engine.run_cycle(files).unwrap();

        assert_eq!(engine.versions()[0].files.len(), 1);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_non_canonical_paths_stored_canonically() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        produce(root, "assets/a.js");
        let files = vec![
            FileRecord::new("assets//a.js", "h", 1, Utc::now()),
            FileRecord::new("./assets/./a.js", "h", 1, Utc::now()),
        ];

        let engine = engine(root, 3);
        let report = engine.run_cycle(files).unwrap();

        let paths: Vec<_> = engine.versions()[0].files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(paths, vec!["assets/a.js".to_string()]);
        assert_eq!(report.sweep.deleted, 0);
        assert_eq!(report.restore.restored, 0);
    }

    #[test]
    fn test_disabled_engine_does_nothing() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let options = KeeperOptions {
            enabled: Some(false),
            ..Default::default()
        };
        let engine = RetentionEngine::from_options(&options, root).unwrap();

        assert!(engine.run_cycle(vec![]).is_none());
        assert!(!root.join("dist").exists());
    }

    #[test]
    fn test_evicted_ids_reported() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let engine = engine(root, 1);

        let first = engine.run_cycle(vec![produce(root, "assets/a.js")]).unwrap();
        let second = engine.run_cycle(vec![produce(root, "assets/b.js")]).unwrap();

        assert!(first.evicted.is_empty());
        assert_eq!(second.evicted.len(), 1);
        assert_eq!(second.evicted[0].as_str(), first.result.version_id);
    }
}
