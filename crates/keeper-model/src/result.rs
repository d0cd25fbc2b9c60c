//! Cycle result returned to the host

use serde::{Deserialize, Serialize};

/// Outcome of one completed retention cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    /// Id of the version created by this cycle
    pub version_id: String,

    /// Number of files the host reported for this build
    pub file_count: usize,

    /// Number of versions in the ledger after eviction
    pub total_versions: usize,
}
