//! build-keeper ledger model
//!
//! Types persisted in the version ledger and returned to the host after a
//! retention cycle. Serialized field names match `.build-versions.json`
//! files written by earlier releases of the tool.

pub mod record;
pub mod result;
pub mod version;

pub use record::FileRecord;
pub use result::BuildResult;
pub use version::{Version, VersionId};

/// Default asset prefix used when none is configured.
pub const DEFAULT_ASSET_PREFIX: &str = "assets/";
