//! File digests and metadata capture
//!
//! The host normally supplies hashes itself; `Sha256Hasher` is the default
//! used by the CLI and by `BuildSession`.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use keeper_model::FileRecord;

/// Content digest plus the metadata recorded alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// Hex-encoded digest of the file bytes
    pub hash: String,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub mtime: DateTime<Utc>,
}

/// Computes a content digest for one file.
pub trait ContentHasher {
    fn digest_file(&self, path: &Path) -> io::Result<FileDigest>;
}

/// SHA-256 hasher, streaming the file in fixed-size chunks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Sha256Hasher {
    const CHUNK_SIZE: usize = 64 * 1024;
}

impl ContentHasher for Sha256Hasher {
    fn digest_file(&self, path: &Path) -> io::Result<FileDigest> {
        let mut file = File::open(path)?;
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; Self::CHUNK_SIZE];
        let mut size = 0u64;
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }

        let mtime = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(FileDigest {
            hash: hex::encode(hasher.finalize()),
            size,
            mtime,
        })
    }
}

/// Build records for output-root-relative `names`.
///
/// Files that cannot be read (removed since discovery, permissions) are
/// logged and left out; one unreadable file never fails the batch.
pub fn capture_records<H, I, S>(hasher: &H, output_root: &Path, names: I) -> Vec<FileRecord>
where
    H: ContentHasher + ?Sized,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut records = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for name in names {
        let rel = normalize_rel_path(name.as_ref());
        if rel.is_empty() || !seen.insert(rel.clone()) {
            continue;
        }

        let full = output_root.join(&rel);
        match hasher.digest_file(&full) {
            Ok(digest) => {
                records.push(FileRecord::new(rel, digest.hash, digest.size, digest.mtime));
            }
            Err(e) => {
                tracing::warn!(path = %rel, error = %e, "skipping unreadable output file");
            }
        }
    }

    records
}

/// Normalize a host-supplied relative name to `/` separators, dropping
/// empty and `.` segments (so no leading `./` or `/` survives).
pub fn normalize_rel_path(name: &str) -> String {
    name.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}
