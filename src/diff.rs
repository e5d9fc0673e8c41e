//! Overlay diffing
//!
//! Compares a store's overlay tree against the workspace, tracked path
//! by tracked path. The overlay plays the committed side: a path
//! present in the workspace but absent from the overlay is `added`
//! (it would enter the overlay on commit), the reverse is `removed`.
//! Directories yield one entry per leaf.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;
use similar::{ChangeTag, TextDiff};

use crate::config::DiffConfig;
use crate::error::Result;
use crate::fsx::{self, FileKind, FileSystem};
use crate::pathsafe;
use crate::store::TrackFile;

/// Per-path diff status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    Added,
    Removed,
    Modified,
    Unchanged,
}

/// One diffed leaf path.
#[derive(Debug, Clone, Serialize)]
pub struct DiffEntry {
    pub path: String,
    pub status: DiffStatus,
    pub binary: bool,
    pub additions: usize,
    pub deletions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
}

/// Diff of one store against the workspace.
#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    pub store: String,
    pub entries: Vec<DiffEntry>,
    pub additions: usize,
    pub deletions: usize,
}

impl DiffReport {
    /// Entries that differ.
    pub fn changed(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries
            .iter()
            .filter(|e| e.status != DiffStatus::Unchanged)
    }
}

/// Computes overlay diffs. Read-only.
pub struct Differ<'a> {
    fs: &'a dyn FileSystem,
    config: &'a DiffConfig,
}

impl<'a> Differ<'a> {
    pub fn new(fs: &'a dyn FileSystem, config: &'a DiffConfig) -> Self {
        Self { fs, config }
    }

    /// Diff every tracked path of a store.
    pub fn diff_store(
        &self,
        store_id: &str,
        track: &TrackFile,
        overlay_root: &Path,
        workspace_root: &Path,
    ) -> Result<DiffReport> {
        let mut entries = Vec::new();

        for tracked in &track.tracked {
            let rel = pathsafe::normalize_rel_path(&tracked.path)?;
            let source = pathsafe::join_under(overlay_root, &rel);
            let dest = pathsafe::join_under(workspace_root, &rel);
            self.diff_path(&rel, &source, &dest, &mut entries)?;
        }

        let additions = entries.iter().map(|e| e.additions).sum();
        let deletions = entries.iter().map(|e| e.deletions).sum();
        Ok(DiffReport {
            store: store_id.to_string(),
            entries,
            additions,
            deletions,
        })
    }

    fn diff_path(
        &self,
        rel: &str,
        source: &Path,
        dest: &Path,
        out: &mut Vec<DiffEntry>,
    ) -> Result<()> {
        let source_kind = self.fs.lstat(source)?.map(|s| s.kind);
        let dest_kind = self.fs.lstat(dest)?.map(|s| s.kind);

        match (source_kind, dest_kind) {
            (None, None) => Ok(()),
            (Some(FileKind::Dir), _) | (_, Some(FileKind::Dir)) => {
                for leaf in self.leaf_union(source, dest)? {
                    let leaf_rel = format!("{rel}/{leaf}");
                    self.diff_leaf(
                        &leaf_rel,
                        &pathsafe::join_under(source, &leaf),
                        &pathsafe::join_under(dest, &leaf),
                        out,
                    )?;
                }
                Ok(())
            }
            _ => self.diff_leaf(rel, source, dest, out),
        }
    }

    fn diff_leaf(
        &self,
        rel: &str,
        source: &Path,
        dest: &Path,
        out: &mut Vec<DiffEntry>,
    ) -> Result<()> {
        let source_exists = self.fs.lstat(source)?.is_some();
        let dest_exists = self.fs.lstat(dest)?.is_some();

        let entry = match (source_exists, dest_exists) {
            (false, false) => return Ok(()),
            (false, true) => {
                let bytes = self.fs.read_file(dest)?;
                let binary = is_binary(&bytes);
                DiffEntry {
                    path: rel.to_string(),
                    status: DiffStatus::Added,
                    binary,
                    additions: if binary { 0 } else { count_lines(&bytes) },
                    deletions: 0,
                    patch: None,
                }
            }
            (true, false) => {
                let bytes = self.fs.read_file(source)?;
                let binary = is_binary(&bytes);
                DiffEntry {
                    path: rel.to_string(),
                    status: DiffStatus::Removed,
                    binary,
                    additions: 0,
                    deletions: if binary { 0 } else { count_lines(&bytes) },
                    patch: None,
                }
            }
            (true, true) => {
                // Digests short-circuit the byte compare; a symlinked
                // destination resolves to the overlay file itself.
                let old_sum = fsx::checksum(self.fs, source)?;
                let new_sum = checksum_following(self.fs, dest)?;
                if old_sum == new_sum {
                    DiffEntry {
                        path: rel.to_string(),
                        status: DiffStatus::Unchanged,
                        binary: false,
                        additions: 0,
                        deletions: 0,
                        patch: None,
                    }
                } else {
                    self.modified_entry(rel, source, dest)?
                }
            }
        };

        out.push(entry);
        Ok(())
    }

    fn modified_entry(&self, rel: &str, source: &Path, dest: &Path) -> Result<DiffEntry> {
        let old_bytes = self.fs.read_file(source)?;
        let new_bytes = self.fs.read_file(dest)?;

        if is_binary(&old_bytes) || is_binary(&new_bytes) {
            return Ok(DiffEntry {
                path: rel.to_string(),
                status: DiffStatus::Modified,
                binary: true,
                additions: 0,
                deletions: 0,
                patch: None,
            });
        }

        let old_text = String::from_utf8_lossy(&old_bytes).into_owned();
        let new_text = String::from_utf8_lossy(&new_bytes).into_owned();
        let diff = TextDiff::from_lines(old_text.as_str(), new_text.as_str());

        let mut additions = 0usize;
        let mut deletions = 0usize;
        for change in diff.iter_all_changes() {
            match change.tag() {
                ChangeTag::Insert => additions += 1,
                ChangeTag::Delete => deletions += 1,
                ChangeTag::Equal => {}
            }
        }

        let too_large = (old_bytes.len() as u64) > self.config.max_patch_bytes
            || (new_bytes.len() as u64) > self.config.max_patch_bytes;
        let patch = if too_large {
            None
        } else {
            Some(
                diff.unified_diff()
                    .context_radius(self.config.context_lines)
                    .header(&format!("a/{rel}"), &format!("b/{rel}"))
                    .to_string(),
            )
        };

        Ok(DiffEntry {
            path: rel.to_string(),
            status: DiffStatus::Modified,
            binary: false,
            additions,
            deletions,
            patch,
        })
    }

    /// Relative leaf paths under either tree, sorted.
    fn leaf_union(&self, source: &Path, dest: &Path) -> Result<Vec<String>> {
        let mut leaves = BTreeSet::new();
        for root in [source, dest] {
            if matches!(self.fs.lstat(root)?, Some(s) if s.kind == FileKind::Dir) {
                collect_leaves(self.fs, root, root, &mut leaves)?;
            }
        }
        Ok(leaves.into_iter().collect())
    }
}

fn collect_leaves(
    fs: &dyn FileSystem,
    root: &Path,
    dir: &Path,
    out: &mut BTreeSet<String>,
) -> Result<()> {
    for entry in fs.read_dir(dir)? {
        let Some(stat) = fs.lstat(&entry)? else {
            continue;
        };
        if stat.kind == FileKind::Dir {
            collect_leaves(fs, root, &entry, out)?;
        } else {
            let rel = entry
                .strip_prefix(root)
                .unwrap_or(&entry)
                .to_string_lossy()
                .replace('\\', "/");
            out.insert(rel);
        }
    }
    Ok(())
}

/// Checksum that follows a symlinked file to its target content.
fn checksum_following(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    if matches!(fs.lstat(path)?, Some(s) if s.kind == FileKind::Symlink) {
        let target = fs.readlink(path)?;
        let resolved = if target.is_absolute() {
            target
        } else {
            path.parent()
                .map(|p| p.join(&target))
                .unwrap_or(target)
        };
        return fsx::checksum(fs, &resolved);
    }
    fsx::checksum(fs, path)
}

fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8000).any(|b| *b == 0)
}

fn count_lines(bytes: &[u8]) -> usize {
    if bytes.is_empty() {
        return 0;
    }
    String::from_utf8_lossy(bytes).lines().count()
}
