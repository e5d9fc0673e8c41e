//! Repository discovery and identity
//!
//! The engine treats the repository fingerprint as an opaque, stable
//! string. Here it comes from libgit2: the root commit id when the
//! repository has history, otherwise a hash of the canonical workdir
//! path so freshly-initialized repos still fingerprint consistently.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::pathsafe;

/// Stable per-repository identifier source.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, repo_root: &Path) -> Result<String>;
}

/// Fingerprints via libgit2.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitFingerprinter;

impl Fingerprinter for GitFingerprinter {
    fn fingerprint(&self, repo_root: &Path) -> Result<String> {
        let repo = git2::Repository::discover(repo_root)
            .map_err(|_| Error::RepoNotFound(repo_root.to_path_buf()))?;

        if let Some(root) = root_commit_id(&repo) {
            return Ok(root);
        }

        // Empty repository: no commits to anchor on. The canonical
        // workdir path is the next most stable thing this host has.
        let workdir = repo
            .workdir()
            .ok_or_else(|| Error::RepoNotFound(repo_root.to_path_buf()))?;
        let canonical = workdir
            .canonicalize()
            .unwrap_or_else(|_| workdir.to_path_buf());
        Ok(sha256_hex(canonical.to_string_lossy().as_bytes()))
    }
}

fn root_commit_id(repo: &git2::Repository) -> Option<String> {
    let mut walk = repo.revwalk().ok()?;
    walk.push_head().ok()?;
    walk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::REVERSE)
        .ok()?;
    let first = walk.next()?.ok()?;
    Some(first.to_string())
}

/// Locate the repository root (workdir) containing `start`.
pub fn discover_repo_root(start: &Path) -> Result<PathBuf> {
    let repo = git2::Repository::discover(start)
        .map_err(|_| Error::RepoNotFound(start.to_path_buf()))?;
    let workdir = repo
        .workdir()
        .ok_or_else(|| Error::RepoNotFound(start.to_path_buf()))?;
    Ok(workdir.to_path_buf())
}

/// Compute the repo-root-relative workspace path in canonical form.
/// `cwd` equal to the root yields `"."`.
pub fn workspace_rel_path(repo_root: &Path, cwd: &Path) -> Result<String> {
    let root = repo_root
        .canonicalize()
        .unwrap_or_else(|_| repo_root.to_path_buf());
    let dir = cwd.canonicalize().unwrap_or_else(|_| cwd.to_path_buf());

    let rel = dir.strip_prefix(&root).map_err(|_| {
        Error::InvalidArgument(format!(
            "{} is not inside repository {}",
            dir.display(),
            root.display()
        ))
    })?;

    if rel.as_os_str().is_empty() {
        return Ok(".".to_string());
    }
    pathsafe::normalize_rel_path(&rel.to_string_lossy())
}

/// Deterministic workspace id: SHA-256 of `fingerprint || "|" || path`
/// in lower hex. Stable across hosts and invocations.
pub fn compute_workspace_id(fingerprint: &str, workspace_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    hasher.update(b"|");
    hasher.update(workspace_path.as_bytes());
    hex_encode(&hasher.finalize())
}

/// SHA-256 over bytes, lower hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
