//! Tracked output file

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One output file captured at the end of a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the output root, always `/`-separated
    pub path: String,

    /// Hex digest of the file contents at capture time
    pub hash: String,

    /// Size in bytes at capture time
    pub size: u64,

    /// Modification time at capture time
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub mtime: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, hash: impl Into<String>, size: u64, mtime: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            hash: hash.into(),
            size,
            mtime,
        }
    }

    /// Whether this record falls under the given asset prefix.
    pub fn is_under(&self, prefix: &str) -> bool {
        self.path.starts_with(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_serializes_mtime_as_millis() {
        let mtime = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let record = FileRecord::new("assets/index-abc.js", "deadbeef", 42, mtime);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["path"], "assets/index-abc.js");
        assert_eq!(json["hash"], "deadbeef");
        assert_eq!(json["size"], 42);
        assert_eq!(json["mtime"], 1_700_000_000_123i64);
    }

    #[test]
    fn test_is_under_prefix() {
        let record = FileRecord::new("assets/js/app.js", "h", 1, Utc::now());
        assert!(record.is_under("assets/"));
        assert!(record.is_under("assets/js/"));
        assert!(!record.is_under("static/"));
    }
}
