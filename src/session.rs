//! Bundler hook glue
//!
//! `BuildSession` follows a bundler's build lifecycle: names are collected
//! while the bundle is generated, and the retention cycle runs once when the
//! bundle is closed. Hosts that already know their records can call
//! `RetentionEngine::run_cycle` directly instead.

use std::collections::HashSet;

use crate::config::KeeperConfig;
use crate::engine::{CycleReport, RetentionEngine};
use crate::hash::{capture_records, normalize_rel_path, ContentHasher, Sha256Hasher};

/// Per-build state for one host build.
///
/// The session only emits `tracing` events; `KeeperConfig::verbose` has no
/// effect until the host installs a subscriber. Call
/// `logging::init(config.verbose)`, or install one built from
/// `logging::filter(config.verbose)`, before the first build.
pub struct BuildSession {
    engine: Option<RetentionEngine>,
    hasher: Box<dyn ContentHasher>,
    generated: Vec<String>,
    seen: HashSet<String>,
    complete: bool,
}

impl BuildSession {
    /// Session with the default SHA-256 hasher.
    pub fn new(config: KeeperConfig) -> Self {
        Self::with_hasher(config, Box::new(Sha256Hasher))
    }

    /// Session with a host-supplied hasher.
    pub fn with_hasher(config: KeeperConfig, hasher: Box<dyn ContentHasher>) -> Self {
        let engine = if config.enabled {
            Some(RetentionEngine::new(config))
        } else {
            None
        };
        Self {
            engine,
            hasher,
            generated: Vec::new(),
            seen: HashSet::new(),
            complete: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.engine.is_some()
    }

    /// Reset collected names and re-arm `close_bundle` for a new build.
    pub fn build_start(&mut self) {
        if self.engine.is_some() {
            tracing::debug!("build keeper armed for new build");
        }
        self.generated.clear();
        self.seen.clear();
        self.complete = false;
    }

    /// Record one generated output name (relative to the output root).
    /// Names outside the asset prefix are ignored.
    pub fn record_generated(&mut self, name: &str) {
        let Some(engine) = &self.engine else {
            return;
        };
        let rel = normalize_rel_path(name);
        if !rel.starts_with(&engine.config().asset_prefix) {
            return;
        }
        if self.seen.insert(rel.clone()) {
            self.generated.push(rel);
        }
    }

    /// Names collected so far, in discovery order.
    pub fn generated(&self) -> &[String] {
        &self.generated
    }

    /// Capture metadata for the collected names and run the retention cycle.
    ///
    /// Runs at most once per build; later calls until the next `build_start`
    /// return `None`, as does a disabled session.
    pub fn close_bundle(&mut self) -> Option<CycleReport> {
        if self.complete {
            return None;
        }
        self.complete = true;

        let engine = self.engine.as_ref()?;
        tracing::debug!(generated = self.generated.len(), "build completed, running retention");

        let records = capture_records(
            self.hasher.as_ref(),
            &engine.config().output_root,
            &self.generated,
        );
        engine.run_cycle(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeeperOptions;
    use crate::hash::FileDigest;
    use chrono::Utc;
    use std::fs;
    use std::io;
    use std::path::Path;
    use tempfile::TempDir;

    struct FixedHasher;

    impl ContentHasher for FixedHasher {
        fn digest_file(&self, path: &Path) -> io::Result<FileDigest> {
            let size = fs::metadata(path)?.len();
            Ok(FileDigest {
                hash: "fixed".to_string(),
                size,
                mtime: Utc::now(),
            })
        }
    }

    fn config(root: &Path, enabled: bool) -> KeeperConfig {
        KeeperOptions {
            enabled: Some(enabled),
            max_versions: Some(2),
            ..Default::default()
        }
        .validate(root)
        .unwrap()
    }

    fn emit(root: &Path, rel: &str) {
        let path = root.join("dist").join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel).unwrap();
    }

    #[test]
    fn test_collects_only_asset_names() {
        let dir = TempDir::new().unwrap();
        let mut session = BuildSession::new(config(dir.path(), true));

        session.build_start();
        session.record_generated("assets/a.js");
        session.record_generated("index.html");
        session.record_generated("assets/a.js");
        session.record_generated("./assets/b.css");

        assert_eq!(session.generated(), &["assets/a.js".to_string(), "assets/b.css".to_string()]);
    }

    #[test]
    fn test_close_bundle_runs_once() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        emit(root, "assets/a.js");

        let mut session = BuildSession::with_hasher(config(root, true), Box::new(FixedHasher));
        session.build_start();
        session.record_generated("assets/a.js");

        let report = session.close_bundle().unwrap();
        assert_eq!(report.result.file_count, 1);
        assert!(session.close_bundle().is_none());

        // Re-armed by the next build
        session.build_start();
        session.record_generated("assets/a.js");
        let report = session.close_bundle().unwrap();
        assert_eq!(report.result.total_versions, 2);
    }

    #[test]
    fn test_vanished_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        emit(root, "assets/a.js");

        let mut session = BuildSession::new(config(root, true));
        session.build_start();
        session.record_generated("assets/a.js");
        session.record_generated("assets/removed.js");

        let report = session.close_bundle().unwrap();
        assert_eq!(report.result.file_count, 1);
    }

    #[test]
    fn test_disabled_session_is_inert() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        emit(root, "assets/a.js");

        let mut session = BuildSession::new(config(root, false));
        assert!(!session.is_enabled());

        session.build_start();
        session.record_generated("assets/a.js");
        assert!(session.generated().is_empty());
        assert!(session.close_bundle().is_none());
        assert!(!root.join("dist/.build-versions.json").exists());
    }
}
