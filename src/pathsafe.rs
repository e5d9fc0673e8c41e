//! Path-safety validation
//!
//! Every identifier and workspace-relative path crosses these checks
//! before any filesystem access. Store ids become directory names and
//! tracked paths are joined under the workspace and overlay roots, so
//! a value that slips through here can escape those roots.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Validate a store or workspace identifier.
///
/// Accepts non-empty strings of alphanumerics, `_`, `.`, `-`.
/// The literals `.` and `..` are rejected.
pub fn validate_identifier(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidIdentifier("(empty)".to_string()));
    }
    if id == "." || id == ".." {
        return Err(Error::InvalidIdentifier(id.to_string()));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(Error::InvalidIdentifier(id.to_string()));
    }
    Ok(())
}

/// Validate a workspace-relative path.
///
/// Rejects absolute paths, drive/volume prefixes, `..` segments, and
/// empty segments. Accepts `.` segments only as no-ops within an
/// otherwise valid path (they are dropped by [`normalize_rel_path`]).
pub fn validate_rel_path(rel: &str) -> Result<()> {
    if rel.is_empty() {
        return Err(Error::InvalidRelPath("(empty)".to_string()));
    }
    if rel.starts_with('/') || rel.starts_with('\\') {
        return Err(Error::InvalidRelPath(rel.to_string()));
    }

    let path = Path::new(rel);
    let mut kept = 0usize;
    for component in path.components() {
        match component {
            Component::Normal(_) => kept += 1,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::InvalidRelPath(rel.to_string()));
            }
        }
    }

    // "a//b" and trailing "/" collapse under components(); catch the
    // raw empty segment so stored paths stay canonical.
    if rel.split(['/', '\\']).any(|seg| seg.is_empty()) {
        return Err(Error::InvalidRelPath(rel.to_string()));
    }

    if kept == 0 {
        return Err(Error::InvalidRelPath(rel.to_string()));
    }

    Ok(())
}

/// Normalize a validated relative path to its canonical stored form:
/// forward-slash separators, no `.` segments.
pub fn normalize_rel_path(rel: &str) -> Result<String> {
    validate_rel_path(rel)?;

    let segments: Vec<&str> = Path::new(rel)
        .components()
        .filter_map(|c| match c {
            Component::Normal(seg) => seg.to_str(),
            _ => None,
        })
        .collect();

    Ok(segments.join("/"))
}

/// Join a normalized relative path beneath a root.
pub fn join_under(root: &Path, rel: &str) -> PathBuf {
    let mut out = root.to_path_buf();
    for seg in rel.split('/') {
        out.push(seg);
    }
    out
}
