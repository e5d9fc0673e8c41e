//! Overlay planning
//!
//! The planner turns an ordered list of store ids, an overlay mode, and
//! the current workspace state into an [`ApplyPlan`]: an ordered
//! operation list plus any conflicts and warnings. It never touches
//! disk beyond reads; all mutation happens in the executor.
//!
//! Ordering invariant: when a later store supersedes an earlier claim
//! on the same path, the `remove` attributed to the earlier owner
//! precedes the create that replaces it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::fsx::{FileKind, FileSystem};
use crate::pathsafe;
use crate::state::{OverlayMode, WorkspaceState};
use crate::store::{MultiStoreRepository, TrackedKind};

/// A single planned filesystem operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    CreateSymlink {
        source: PathBuf,
        dest: PathBuf,
        rel_path: String,
        store: String,
    },
    Copy {
        source: PathBuf,
        dest: PathBuf,
        rel_path: String,
        store: String,
    },
    Remove {
        dest: PathBuf,
        rel_path: String,
        /// Previous owner; empty for forced removal of unmanaged paths.
        store: String,
    },
}

impl Operation {
    pub fn rel_path(&self) -> &str {
        match self {
            Operation::CreateSymlink { rel_path, .. }
            | Operation::Copy { rel_path, .. }
            | Operation::Remove { rel_path, .. } => rel_path,
        }
    }

    pub fn store(&self) -> &str {
        match self {
            Operation::CreateSymlink { store, .. }
            | Operation::Copy { store, .. }
            | Operation::Remove { store, .. } => store,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Operation::CreateSymlink { .. } => "create_symlink",
            Operation::Copy { .. } => "copy",
            Operation::Remove { .. } => "remove",
        }
    }
}

/// A path the planner refused to claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub rel_path: String,
    /// Human-readable explanation.
    pub reason: String,
    /// Machine-readable description of what is there.
    pub existing: String,
    /// Machine-readable description of what wanted in.
    pub incoming: String,
    pub store: String,
}

/// The planner's output, consumed verbatim by the executor.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyPlan {
    /// Input store order, verbatim.
    pub stores: Vec<String>,
    pub mode: OverlayMode,
    pub force: bool,
    pub operations: Vec<Operation>,
    pub conflicts: Vec<Conflict>,
    pub warnings: Vec<String>,
}

impl ApplyPlan {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Planner inputs beyond the store list.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub stores: Vec<String>,
    pub mode: OverlayMode,
    pub force: bool,
}

/// Builds apply plans. Read-only over disk and state.
pub struct Planner<'a> {
    fs: &'a dyn FileSystem,
    repos: &'a MultiStoreRepository<'a>,
    workspace_root: &'a Path,
}

impl<'a> Planner<'a> {
    pub fn new(
        fs: &'a dyn FileSystem,
        repos: &'a MultiStoreRepository<'a>,
        workspace_root: &'a Path,
    ) -> Self {
        Self {
            fs,
            repos,
            workspace_root,
        }
    }

    /// Assemble the plan for applying `request.stores` in order.
    pub fn plan(&self, request: &PlanRequest, state: &WorkspaceState) -> Result<ApplyPlan> {
        let mut plan = ApplyPlan {
            stores: request.stores.clone(),
            mode: request.mode,
            force: request.force,
            operations: Vec::new(),
            conflicts: Vec::new(),
            warnings: Vec::new(),
        };

        // rel_path -> store that claimed it earlier in this plan
        let mut owners: HashMap<String, String> = HashMap::new();

        for store_id in &request.stores {
            pathsafe::validate_identifier(store_id)?;
            let track = self.repos.load_track(store_id)?;
            let overlay_root = self.repos.overlay_root(store_id)?;

            for entry in &track.tracked {
                let rel = pathsafe::normalize_rel_path(&entry.path)?;
                let source = pathsafe::join_under(&overlay_root, &rel);
                let dest = pathsafe::join_under(self.workspace_root, &rel);

                if !self.fs.exists(&source) {
                    if entry.required {
                        plan.warnings.push(format!(
                            "store '{store_id}': required source missing for '{rel}', skipped"
                        ));
                    }
                    continue;
                }

                let incoming = match entry.kind {
                    TrackedKind::File => FileKind::File,
                    TrackedKind::Dir => FileKind::Dir,
                };

                if let Some(conflict) = self.check_conflict(
                    &rel,
                    &dest,
                    incoming,
                    request.mode,
                    store_id,
                    state,
                    request.force,
                )? {
                    plan.conflicts.push(conflict);
                    continue;
                }

                if let Some(previous) = owners.get(&rel).cloned() {
                    plan.operations.push(Operation::Remove {
                        dest: dest.clone(),
                        rel_path: rel.clone(),
                        store: previous,
                    });
                } else if request.force && self.fs.exists(&dest) {
                    plan.operations.push(Operation::Remove {
                        dest: dest.clone(),
                        rel_path: rel.clone(),
                        store: String::new(),
                    });
                }
                owners.insert(rel.clone(), store_id.clone());

                plan.operations.push(match request.mode {
                    OverlayMode::Symlink => Operation::CreateSymlink {
                        source,
                        dest,
                        rel_path: rel,
                        store: store_id.clone(),
                    },
                    OverlayMode::Copy => Operation::Copy {
                        source,
                        dest,
                        rel_path: rel,
                        store: store_id.clone(),
                    },
                });
            }
        }

        Ok(plan)
    }

    /// The conflict decision table. `force` clears every row.
    #[allow(clippy::too_many_arguments)]
    fn check_conflict(
        &self,
        rel: &str,
        dest: &Path,
        incoming: FileKind,
        mode: OverlayMode,
        store_id: &str,
        state: &WorkspaceState,
        force: bool,
    ) -> Result<Option<Conflict>> {
        if force {
            return Ok(None);
        }

        let Some(on_disk) = self.fs.lstat(dest)? else {
            return Ok(None);
        };

        let Some(owner) = state.paths.get(rel) else {
            return Ok(Some(Conflict {
                rel_path: rel.to_string(),
                reason: format!(
                    "'{rel}' exists in the workspace but is not managed by any store"
                ),
                existing: "unmanaged".to_string(),
                incoming: incoming.as_str().to_string(),
                store: store_id.to_string(),
            }));
        };

        if owner.mode != mode {
            return Ok(Some(Conflict {
                rel_path: rel.to_string(),
                reason: format!(
                    "'{rel}' was applied in {} mode but {} mode was requested",
                    owner.mode, mode
                ),
                existing: owner.mode.as_str().to_string(),
                incoming: mode.as_str().to_string(),
                store: store_id.to_string(),
            }));
        }

        match mode {
            OverlayMode::Symlink => {
                // lstat sees the link itself; anything else means the
                // artifact was replaced behind our back.
                if on_disk.kind != FileKind::Symlink || self.fs.readlink(dest).is_err() {
                    return Ok(Some(Conflict {
                        rel_path: rel.to_string(),
                        reason: format!(
                            "'{rel}' is recorded as a symlink but a {} is on disk",
                            on_disk.kind.as_str()
                        ),
                        existing: on_disk.kind.as_str().to_string(),
                        incoming: "symlink".to_string(),
                        store: store_id.to_string(),
                    }));
                }
            }
            OverlayMode::Copy => {
                if on_disk.kind != incoming {
                    return Ok(Some(Conflict {
                        rel_path: rel.to_string(),
                        reason: format!(
                            "'{rel}' is a {} on disk but the store tracks a {}",
                            on_disk.kind.as_str(),
                            incoming.as_str()
                        ),
                        existing: on_disk.kind.as_str().to_string(),
                        incoming: incoming.as_str().to_string(),
                        store: store_id.to_string(),
                    }));
                }
            }
        }

        // Managed, same mode, same type: store-to-store override.
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::fsx::RealFs;
    use crate::state::{PathOwnership, StoreScope};
    use crate::store::{StoreMeta, TrackFile, TrackedPath};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        workspace: PathBuf,
        global_root: PathBuf,
        component_root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let workspace = temp.path().join("ws");
            std::fs::create_dir_all(&workspace).unwrap();
            let global_root = temp.path().join("global/stores");
            let component_root = temp.path().join("repo/.monodev/stores");
            Self {
                _temp: temp,
                workspace,
                global_root,
                component_root,
            }
        }

        fn repos<'a>(&self, fs: &'a RealFs) -> MultiStoreRepository<'a> {
            MultiStoreRepository::new(fs, self.global_root.clone(), self.component_root.clone())
        }

        fn seed_store(&self, fs: &RealFs, id: &str, files: &[(&str, &str)]) {
            let repos = self.repos(fs);
            let meta = StoreMeta::new(
                id,
                StoreScope::Component,
                Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            );
            repos.create(id, StoreScope::Component, &meta).unwrap();
            let mut track = TrackFile::default();
            for (rel, contents) in files {
                let overlay = repos.overlay_root(id).unwrap();
                let path = pathsafe::join_under(&overlay, rel);
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(&path, contents).unwrap();
                track.upsert(TrackedPath::new(*rel, TrackedKind::File));
            }
            repos.save_track(id, &track).unwrap();
        }
    }

    fn request(stores: &[&str], mode: OverlayMode, force: bool) -> PlanRequest {
        PlanRequest {
            stores: stores.iter().map(|s| s.to_string()).collect(),
            mode,
            force,
        }
    }

    #[test]
    fn single_store_single_file() {
        let fs_ = RealFs;
        let fx = Fixture::new();
        fx.seed_store(&fs_, "s1", &[("Makefile", "all:\n\techo hi\n")]);

        let repos = fx.repos(&fs_);
        let planner = Planner::new(&fs_, &repos, &fx.workspace);
        let state = WorkspaceState::new("fp", ".");
        let plan = planner
            .plan(&request(&["s1"], OverlayMode::Symlink, false), &state)
            .unwrap();

        assert!(plan.conflicts.is_empty());
        assert!(plan.warnings.is_empty());
        assert_eq!(plan.operations.len(), 1);
        match &plan.operations[0] {
            Operation::CreateSymlink {
                rel_path, store, ..
            } => {
                assert_eq!(rel_path, "Makefile");
                assert_eq!(store, "s1");
            }
            other => panic!("expected create_symlink, got {other:?}"),
        }
    }

    #[test]
    fn later_store_supersedes_with_remove_first() {
        let fs_ = RealFs;
        let fx = Fixture::new();
        fx.seed_store(&fs_, "s1", &[("Makefile", "from s1\n")]);
        fx.seed_store(&fs_, "s2", &[("Makefile", "from s2\n")]);

        let repos = fx.repos(&fs_);
        let planner = Planner::new(&fs_, &repos, &fx.workspace);
        let state = WorkspaceState::new("fp", ".");
        let plan = planner
            .plan(&request(&["s1", "s2"], OverlayMode::Symlink, false), &state)
            .unwrap();

        let kinds: Vec<(&str, &str)> = plan
            .operations
            .iter()
            .map(|op| (op.kind_str(), op.store()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("create_symlink", "s1"),
                ("remove", "s1"),
                ("create_symlink", "s2"),
            ]
        );
    }

    #[test]
    fn unmanaged_dest_conflicts_without_force() {
        let fs_ = RealFs;
        let fx = Fixture::new();
        fx.seed_store(&fs_, "s1", &[("config.yaml", "managed: true\n")]);
        std::fs::write(fx.workspace.join("config.yaml"), "local\n").unwrap();

        let repos = fx.repos(&fs_);
        let planner = Planner::new(&fs_, &repos, &fx.workspace);
        let state = WorkspaceState::new("fp", ".");
        let plan = planner
            .plan(&request(&["s1"], OverlayMode::Symlink, false), &state)
            .unwrap();

        assert!(plan.operations.is_empty());
        assert_eq!(plan.conflicts.len(), 1);
        assert_eq!(plan.conflicts[0].existing, "unmanaged");
        assert_eq!(plan.conflicts[0].incoming, "file");
    }

    #[test]
    fn force_clears_unmanaged_with_attributed_remove() {
        let fs_ = RealFs;
        let fx = Fixture::new();
        fx.seed_store(&fs_, "s1", &[("config.yaml", "managed: true\n")]);
        std::fs::write(fx.workspace.join("config.yaml"), "local\n").unwrap();

        let repos = fx.repos(&fs_);
        let planner = Planner::new(&fs_, &repos, &fx.workspace);
        let state = WorkspaceState::new("fp", ".");
        let plan = planner
            .plan(&request(&["s1"], OverlayMode::Symlink, true), &state)
            .unwrap();

        assert!(plan.conflicts.is_empty());
        assert_eq!(plan.operations.len(), 2);
        match &plan.operations[0] {
            Operation::Remove { store, .. } => assert_eq!(store, ""),
            other => panic!("expected remove, got {other:?}"),
        }
        assert_eq!(plan.operations[1].kind_str(), "create_symlink");
    }

    #[test]
    fn required_missing_source_warns_without_abort() {
        let fs_ = RealFs;
        let fx = Fixture::new();
        fx.seed_store(&fs_, "s1", &[]);

        let repos = fx.repos(&fs_);
        let mut track = TrackFile::default();
        track.upsert(TrackedPath::new("absent.txt", TrackedKind::File));
        repos.save_track("s1", &track).unwrap();

        let planner = Planner::new(&fs_, &repos, &fx.workspace);
        let state = WorkspaceState::new("fp", ".");
        let plan = planner
            .plan(&request(&["s1"], OverlayMode::Symlink, false), &state)
            .unwrap();

        assert!(plan.operations.is_empty());
        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.warnings[0].contains("absent.txt"));
    }

    #[test]
    fn optional_missing_source_is_silent() {
        let fs_ = RealFs;
        let fx = Fixture::new();
        fx.seed_store(&fs_, "s1", &[]);

        let repos = fx.repos(&fs_);
        let mut track = TrackFile::default();
        let mut entry = TrackedPath::new("absent.txt", TrackedKind::File);
        entry.required = false;
        track.upsert(entry);
        repos.save_track("s1", &track).unwrap();

        let planner = Planner::new(&fs_, &repos, &fx.workspace);
        let state = WorkspaceState::new("fp", ".");
        let plan = planner
            .plan(&request(&["s1"], OverlayMode::Symlink, false), &state)
            .unwrap();

        assert!(plan.operations.is_empty());
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn traversal_in_track_is_fatal() {
        let fs_ = RealFs;
        let fx = Fixture::new();
        fx.seed_store(&fs_, "s1", &[]);

        // Bypass save_track validation by writing the file directly.
        let track_path = fx.component_root.join("s1/track.json");
        std::fs::write(
            &track_path,
            r#"{"schemaVersion":1,"tracked":[{"path":"../etc/passwd","kind":"file"}]}"#,
        )
        .unwrap();

        let repos = fx.repos(&fs_);
        let planner = Planner::new(&fs_, &repos, &fx.workspace);
        let state = WorkspaceState::new("fp", ".");
        let err = planner
            .plan(&request(&["s1"], OverlayMode::Symlink, false), &state)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRelPath(_)));
    }

    #[test]
    fn mode_mismatch_on_managed_path() {
        let fs_ = RealFs;
        let fx = Fixture::new();
        fx.seed_store(&fs_, "s1", &[("Makefile", "x\n")]);
        std::fs::write(fx.workspace.join("Makefile"), "x\n").unwrap();

        let mut state = WorkspaceState::new("fp", ".");
        state.insert_path(
            "Makefile".into(),
            PathOwnership {
                store: "s1".into(),
                mode: OverlayMode::Copy,
                timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
                checksum: String::new(),
            },
        );

        let repos = fx.repos(&fs_);
        let planner = Planner::new(&fs_, &repos, &fx.workspace);
        let plan = planner
            .plan(&request(&["s1"], OverlayMode::Symlink, false), &state)
            .unwrap();

        assert_eq!(plan.conflicts.len(), 1);
        assert_eq!(plan.conflicts[0].existing, "copy");
        assert_eq!(plan.conflicts[0].incoming, "symlink");
    }

    #[test]
    fn managed_symlink_replaced_by_file_conflicts() {
        let fs_ = RealFs;
        let fx = Fixture::new();
        fx.seed_store(&fs_, "s1", &[("Makefile", "x\n")]);
        // Recorded as symlink-managed, but a plain file sits there now.
        std::fs::write(fx.workspace.join("Makefile"), "replaced\n").unwrap();

        let mut state = WorkspaceState::new("fp", ".");
        state.insert_path(
            "Makefile".into(),
            PathOwnership {
                store: "s1".into(),
                mode: OverlayMode::Symlink,
                timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
                checksum: String::new(),
            },
        );

        let repos = fx.repos(&fs_);
        let planner = Planner::new(&fs_, &repos, &fx.workspace);
        let plan = planner
            .plan(&request(&["s1"], OverlayMode::Symlink, false), &state)
            .unwrap();

        assert_eq!(plan.conflicts.len(), 1);
        assert_eq!(plan.conflicts[0].existing, "file");
        assert_eq!(plan.conflicts[0].incoming, "symlink");
    }

    #[test]
    fn managed_override_same_mode_no_conflict() {
        let fs_ = RealFs;
        let fx = Fixture::new();
        fx.seed_store(&fs_, "s1", &[("Makefile", "one\n")]);
        fx.seed_store(&fs_, "s2", &[("Makefile", "two\n")]);

        let repos = fx.repos(&fs_);
        // Simulate an earlier symlink apply of s1.
        let overlay = repos.overlay_root("s1").unwrap();
        fs_.symlink(&overlay.join("Makefile"), &fx.workspace.join("Makefile"))
            .unwrap();

        let mut state = WorkspaceState::new("fp", ".");
        state.insert_path(
            "Makefile".into(),
            PathOwnership {
                store: "s1".into(),
                mode: OverlayMode::Symlink,
                timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
                checksum: String::new(),
            },
        );

        let planner = Planner::new(&fs_, &repos, &fx.workspace);
        let plan = planner
            .plan(&request(&["s2"], OverlayMode::Symlink, false), &state)
            .unwrap();

        assert!(plan.conflicts.is_empty());
        assert_eq!(plan.operations.len(), 1);
        assert_eq!(plan.operations[0].store(), "s2");
    }

    #[test]
    fn plans_are_deterministic() {
        let fs_ = RealFs;
        let fx = Fixture::new();
        fx.seed_store(&fs_, "s1", &[("a.txt", "a\n"), ("b.txt", "b\n")]);
        fx.seed_store(&fs_, "s2", &[("b.txt", "b2\n")]);

        let repos = fx.repos(&fs_);
        let planner = Planner::new(&fs_, &repos, &fx.workspace);
        let state = WorkspaceState::new("fp", ".");
        let req = request(&["s1", "s2"], OverlayMode::Copy, false);

        let first = planner.plan(&req, &state).unwrap();
        let second = planner.plan(&req, &state).unwrap();
        assert_eq!(first.operations, second.operations);
        assert_eq!(first.conflicts, second.conflicts);
    }
}
