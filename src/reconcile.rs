//! Unapply: reversing recorded overlays
//!
//! Walks the ownership table in reverse insertion order and removes
//! exactly the artifacts the executor created. Reality is checked
//! against the record first: a path recorded as a symlink that is now
//! a plain file aborts the run unless forced, because removing it
//! would destroy something the engine did not create.

use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::fsx::{FileKind, FileSystem};
use crate::pathsafe;
use crate::state::{OverlayMode, WorkspaceState};

/// Outcome of an unapply pass.
#[derive(Debug, Clone, Default)]
pub struct UnapplyReport {
    pub removed: Vec<String>,
    pub warnings: Vec<String>,
}

/// Reverses applied overlays using recorded ownership.
pub struct Reconciler<'a> {
    fs: &'a dyn FileSystem,
}

impl<'a> Reconciler<'a> {
    pub fn new(fs: &'a dyn FileSystem) -> Self {
        Self { fs }
    }

    /// Remove overlaid artifacts from `workspace_root`.
    ///
    /// With `stores`, only entries owned by those ids are reversed
    /// (scope-selective unapply); otherwise everything goes. Entries
    /// are processed in reverse insertion order.
    pub fn unapply(
        &self,
        state: &mut WorkspaceState,
        workspace_root: &Path,
        stores: Option<&[String]>,
        force: bool,
    ) -> Result<UnapplyReport> {
        let mut selected: Vec<String> = state
            .ordered_paths()
            .into_iter()
            .filter(|rel| match (stores, state.paths.get(rel)) {
                (Some(ids), Some(owner)) => ids.iter().any(|id| id == &owner.store),
                (None, _) => true,
                _ => false,
            })
            .collect();
        selected.reverse();

        // Validate reality against the record up front so a mismatch
        // aborts before anything is removed.
        if !force {
            for rel in &selected {
                let owner = &state.paths[rel];
                let dest = pathsafe::join_under(workspace_root, rel);
                if let Some(on_disk) = self.fs.lstat(&dest)? {
                    let matches = match owner.mode {
                        OverlayMode::Symlink => on_disk.kind == FileKind::Symlink,
                        OverlayMode::Copy => on_disk.kind != FileKind::Symlink,
                    };
                    if !matches {
                        return Err(Error::StateMismatch {
                            path: rel.clone(),
                            expected: owner.mode.as_str().to_string(),
                        });
                    }
                }
            }
        }

        let mut report = UnapplyReport::default();
        for rel in selected {
            let dest = pathsafe::join_under(workspace_root, &rel);
            if self.fs.lstat(&dest)?.is_none() {
                report
                    .warnings
                    .push(format!("'{rel}' was already gone from the workspace"));
            } else {
                self.fs.remove(&dest)?;
            }
            state.remove_path(&rel);
            report.removed.push(rel);
        }

        debug!(removed = report.removed.len(), "unapply complete");
        Ok(report)
    }
}
