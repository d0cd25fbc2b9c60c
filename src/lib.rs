//! build-keeper - bounded build output retention
//!
//! Keeps the assets of the last N builds addressable in the output directory
//! and deletes asset files no retained build references. The assets of the
//! build that just finished are staged outside the swept tree for the
//! duration of every sweep, so they survive even a lost or corrupt ledger.

pub mod backup;
pub mod config;
pub mod engine;
pub mod gc;
pub mod hash;
pub mod ledger;
pub mod logging;
pub mod reference;
pub mod session;

pub use backup::{BackupGuard, RestoreReport, StageReport};
pub use config::{ConfigError, KeeperConfig, KeeperOptions};
pub use engine::{CyclePhase, CycleReport, RetentionEngine};
pub use gc::{AssetGc, SweepResult};
pub use hash::{ContentHasher, FileDigest, Sha256Hasher};
pub use ledger::{LedgerError, VersionLedger};
pub use reference::ReferenceSet;
pub use session::BuildSession;

pub use keeper_model::{BuildResult, FileRecord, Version, VersionId};
