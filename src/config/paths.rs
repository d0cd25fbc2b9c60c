//! Path checks for keeper options
//!
//! Resolution is lexical: the output root may not exist yet when the
//! options are validated, so nothing here consults the filesystem.

use std::path::{Component, Path, PathBuf};

use super::ConfigError;

/// Resolve `path` against `root` and require the result to stay inside `root`.
pub fn resolve_within(root: &Path, path: &Path, field: &'static str) -> Result<PathBuf, ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(format!("{} must not be empty", field)));
    }

    let escape = || ConfigError::PathEscapesRoot {
        field,
        path: path.display().to_string(),
    };

    let root = normalize_lexically(root).ok_or_else(escape)?;
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let resolved = normalize_lexically(&joined).ok_or_else(escape)?;

    if !resolved.starts_with(&root) {
        return Err(escape());
    }
    Ok(resolved)
}

/// Collapse `.` and `..` components. Returns `None` if `..` climbs past the
/// filesystem root.
fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Some(out)
}

/// Validate an asset prefix and return it with a trailing `/`.
///
/// The prefix is compared as a string against `/`-separated record paths,
/// so it must be a plain relative path: no `..` or `.` segments, no empty
/// segments, no backslashes or drive letters.
pub fn normalize_asset_prefix(raw: &str) -> Result<String, ConfigError> {
    let invalid = |reason: &str| {
        ConfigError::Validation(format!("asset_prefix {:?} {}", raw, reason))
    };

    if raw.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if raw.contains('\\') || raw.contains(':') {
        return Err(invalid("must use '/' separators and be relative"));
    }
    if raw.starts_with('/') {
        return Err(invalid("must be relative to the output root"));
    }
    if raw.contains("//") {
        return Err(invalid("must not contain empty path segments"));
    }

    let trimmed = raw.trim_end_matches('/');
    for segment in trimmed.split('/') {
        if segment == ".." {
            return Err(invalid("must not contain '..'"));
        }
        if segment == "." {
            return Err(invalid("must not contain '.' segments"));
        }
    }

    Ok(format!("{}/", trimmed))
}
