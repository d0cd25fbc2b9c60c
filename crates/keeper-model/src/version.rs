//! Retained build versions

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::record::FileRecord;

/// Characters used for the random id suffix
const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of the random id suffix
const SUFFIX_LEN: usize = 6;

/// Version identifier: `<epoch-millis>-<random base36 suffix>`.
///
/// The time prefix makes ids sort roughly by creation; the suffix keeps two
/// builds started in the same millisecond apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    /// Generate a fresh id for the current instant.
    pub fn generate() -> Self {
        Self::generate_at(Utc::now())
    }

    /// Generate a fresh id with the given time prefix.
    pub fn generate_at(now: DateTime<Utc>) -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect();
        Self(format!("{}-{}", now.timestamp_millis(), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VersionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VersionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One completed build's retained footprint.
///
/// Immutable once appended to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Unique version identifier
    pub id: VersionId,

    /// When the version was created
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Files produced by the build, in discovery order
    pub files: Vec<FileRecord>,
}

impl Version {
    /// Create a new version stamped with the current time.
    pub fn new(files: Vec<FileRecord>) -> Self {
        let now = Utc::now();
        Self {
            id: VersionId::generate_at(now),
            timestamp: now,
            files,
        }
    }

    /// Files of this version that fall under `prefix`.
    pub fn asset_files<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a FileRecord> + 'a {
        self.files.iter().filter(move |f| f.is_under(prefix))
    }
}
