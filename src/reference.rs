//! Referenced-file computation
//!
//! Recomputed from the in-memory ledger on every cycle and never cached.

use std::collections::HashSet;

use keeper_model::Version;

use crate::backup::canonical_path;

/// Paths under the asset prefix that some retained version still lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    paths: HashSet<String>,
}

impl ReferenceSet {
    /// Union of asset-prefixed file paths across every version, in
    /// canonical form so ledgers written with `assets//a.js` still match.
    pub fn compute(versions: &[Version], asset_prefix: &str) -> Self {
        let paths = versions
            .iter()
            .flat_map(|v| v.files.iter())
            .filter_map(|f| canonical_path(&f.path))
            .filter(|p| p.starts_with(asset_prefix))
            .collect();
        Self { paths }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

}

impl<S: Into<String>> FromIterator<S> for ReferenceSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self {
            paths: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use keeper_model::{FileRecord, VersionId};

    fn version(files: &[&str]) -> Version {
        Version {
            id: VersionId::generate(),
            timestamp: Utc::now(),
            files: files
                .iter()
                .map(|p| FileRecord::new(*p, "h", 1, Utc::now()))
                .collect(),
        }
    }

    #[test]
    fn test_union_across_versions() {
        let versions = vec![
            version(&["assets/a.js", "assets/shared.css"]),
            version(&["assets/b.js", "assets/shared.css"]),
        ];

        let refs = ReferenceSet::compute(&versions, "assets/");
        assert_eq!(refs.len(), 3);
        assert!(refs.contains("assets/a.js"));
        assert!(refs.contains("assets/b.js"));
        assert!(refs.contains("assets/shared.css"));
    }

    #[test]
    fn test_ignores_paths_outside_prefix() {
        let versions = vec![version(&["index.html", "assets/a.js", "assets-old/x.js"])];

        let refs = ReferenceSet::compute(&versions, "assets/");
        assert_eq!(refs.len(), 1);
        assert!(!refs.contains("index.html"));
        assert!(!refs.contains("assets-old/x.js"));
    }

    #[test]
    fn test_non_canonical_ledger_paths_normalized() {
        let versions = vec![version(&["assets//a.js", "./assets/b.js", "assets/../c.js"])];

        let refs = ReferenceSet::compute(&versions, "assets/");
        assert_eq!(refs.len(), 2);
        assert!(refs.contains("assets/a.js"));
        assert!(refs.contains("assets/b.js"));
    }

    #[test]
    fn test_empty_ledger() {
        let refs = ReferenceSet::compute(&[], "assets/");
        assert!(refs.is_empty());
    }
}
