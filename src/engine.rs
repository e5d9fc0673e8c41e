//! Engine facade
//!
//! One public method per user-visible verb. The engine resolves the
//! workspace context once at construction, then composes the store
//! repository, planner, executor, reconciler, and diff for each call.
//! The filesystem, clock, and fingerprinter are capability objects so
//! the whole apply/unapply loop runs against temp directories in tests.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::{Config, Roots};
use crate::diff::{Differ, DiffReport};
use crate::error::{Error, Result};
use crate::executor::{ExecReport, Executor};
use crate::fsx::FileSystem;
use crate::pathsafe;
use crate::planner::{ApplyPlan, PlanRequest, Planner};
use crate::reconcile::{Reconciler, UnapplyReport};
use crate::repo::{self, Fingerprinter};
use crate::state::{
    OverlayMode, RepoState, StateStore, StoreScope, WorkspaceState,
};
use crate::store::{
    MultiStoreRepository, StoreMeta, TrackFile, TrackedKind, TrackedPath,
};

/// Resolved identity of the workspace the engine operates on.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceContext {
    pub repo_root: PathBuf,
    pub workspace_root: PathBuf,
    /// Repo-root-relative workspace path ("." for the root).
    pub workspace_path: String,
    pub fingerprint: String,
    pub workspace_id: String,
}

/// The overlay engine.
pub struct Engine {
    fs: Box<dyn FileSystem>,
    clock: Box<dyn Clock>,
    roots: Roots,
    config: Config,
    context: WorkspaceContext,
}

// =============================================================================
// Result shapes
// =============================================================================

/// Summary of one store for listings.
#[derive(Debug, Clone, Serialize)]
pub struct StoreInfo {
    pub id: String,
    pub scope: StoreScope,
    pub meta: StoreMeta,
}

/// Full store description.
#[derive(Debug, Clone, Serialize)]
pub struct StoreDetails {
    pub id: String,
    pub scope: StoreScope,
    pub meta: StoreMeta,
    pub track: TrackFile,
}

/// Fields settable at store creation / update time.
#[derive(Debug, Clone, Default)]
pub struct StoreFields {
    pub description: Option<String>,
    pub owner: Option<String>,
    pub task_id: Option<String>,
    pub parent_task_id: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub store_type: Option<String>,
    pub source: Option<String>,
}

/// Report for store deletion.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteStoreReport {
    pub id: String,
    pub existed: bool,
    /// Workspace ids whose state referenced the store.
    pub scrubbed_workspaces: Vec<String>,
}

/// Options for `track`.
#[derive(Debug, Clone)]
pub struct TrackOptions {
    pub store: Option<String>,
    pub required: bool,
    pub role: Option<String>,
}

impl Default for TrackOptions {
    fn default() -> Self {
        Self {
            store: None,
            // Tracked paths are required unless marked optional.
            required: true,
            role: None,
        }
    }
}

/// Report for track/untrack.
#[derive(Debug, Clone, Serialize)]
pub struct TrackReport {
    pub store: String,
    pub changed: Vec<String>,
    pub warnings: Vec<String>,
}

/// Report for commit/prune.
#[derive(Debug, Clone, Serialize)]
pub struct CommitReport {
    pub store: String,
    pub committed: Vec<String>,
    pub pruned: Vec<String>,
    pub warnings: Vec<String>,
}

/// Options for `apply`.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Apply a single store instead of the full stack.
    pub store: Option<String>,
    pub mode: Option<OverlayMode>,
    pub force: bool,
    pub dry_run: bool,
}

/// Apply result: the plan always, the execution report when it ran.
/// A conflicted, unforced apply instead fails with
/// [`Error::Conflicts`], which carries the full plan.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutcome {
    pub workspace_id: String,
    pub mode: OverlayMode,
    pub plan: ApplyPlan,
    pub executed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<Vec<String>>,
}

/// Options for `unapply`.
#[derive(Debug, Clone, Default)]
pub struct UnapplyOptions {
    /// Restrict to one store's entries.
    pub store: Option<String>,
    /// Restrict to the stack (exclude the active store).
    pub stack_only: bool,
    pub force: bool,
}

/// Unapply result.
#[derive(Debug, Clone, Serialize)]
pub struct UnapplyOutcome {
    pub workspace_id: String,
    pub removed: Vec<String>,
    pub warnings: Vec<String>,
}

/// Per-path line in `status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusPath {
    pub path: String,
    pub store: String,
    pub mode: OverlayMode,
    /// The recorded artifact no longer exists on disk.
    pub missing: bool,
}

/// Workspace status summary.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceStatus {
    pub workspace_id: String,
    pub repo: String,
    pub workspace_path: String,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<OverlayMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_store: Option<String>,
    pub stack: Vec<String>,
    pub applied_stores: Vec<String>,
    pub paths: Vec<StatusPath>,
}

/// Summary of a persisted workspace for listings.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceSummary {
    pub workspace_id: String,
    pub repo: String,
    pub workspace_path: String,
    pub applied: bool,
    pub path_count: usize,
}

impl Engine {
    /// Resolve the workspace context from `start_dir` and build an
    /// engine over it.
    pub fn open(
        fs: Box<dyn FileSystem>,
        clock: Box<dyn Clock>,
        fingerprinter: &dyn Fingerprinter,
        global_root: PathBuf,
        start_dir: &Path,
    ) -> Result<Self> {
        let repo_root = repo::discover_repo_root(start_dir)?;
        let fingerprint = fingerprinter.fingerprint(&repo_root)?;
        let workspace_path = repo::workspace_rel_path(&repo_root, start_dir)?;
        let workspace_id = repo::compute_workspace_id(&fingerprint, &workspace_path);

        let config = Config::load_from_repo(&repo_root);
        let workspace_root = start_dir.to_path_buf();

        debug!(
            workspace = %workspace_id,
            repo = %fingerprint,
            path = %workspace_path,
            "engine opened"
        );

        Ok(Self {
            fs,
            clock,
            roots: Roots::new(global_root, repo_root.clone()),
            config,
            context: WorkspaceContext {
                repo_root,
                workspace_root,
                workspace_path,
                fingerprint,
                workspace_id,
            },
        })
    }

    pub fn context(&self) -> &WorkspaceContext {
        &self.context
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn repos(&self) -> MultiStoreRepository<'_> {
        MultiStoreRepository::new(
            self.fs.as_ref(),
            self.roots.global_stores_dir(),
            self.roots.component_stores_dir(),
        )
    }

    fn state_store(&self) -> StateStore<'_> {
        StateStore::new(self.fs.as_ref(), &self.roots.global_root)
    }

    fn load_repo_state(&self) -> Result<RepoState> {
        Ok(self
            .state_store()
            .load_repo(&self.context.fingerprint)?
            .unwrap_or_else(|| RepoState::new(self.context.fingerprint.clone())))
    }

    fn load_workspace_state(&self) -> Result<WorkspaceState> {
        Ok(self
            .state_store()
            .load_workspace(&self.context.workspace_id)?
            .unwrap_or_else(|| {
                WorkspaceState::new(
                    self.context.fingerprint.clone(),
                    self.context.workspace_path.clone(),
                )
            }))
    }

    /// Resolve the store a verb routes to: explicit id, or the repo's
    /// active store.
    fn resolve_store(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(id) = explicit {
            pathsafe::validate_identifier(id)?;
            if !self.repos().exists(id)? {
                return Err(Error::StoreNotFound(id.to_string()));
            }
            return Ok(id.to_string());
        }
        self.load_repo_state()?
            .active_store
            .ok_or(Error::NoActiveStore)
    }

    // =========================================================================
    // Store management
    // =========================================================================

    pub fn create_store(
        &self,
        id: &str,
        scope: StoreScope,
        fields: &StoreFields,
    ) -> Result<StoreInfo> {
        pathsafe::validate_identifier(id)?;
        let now = self.clock.now();
        let mut meta = StoreMeta::new(id, scope, now);
        apply_fields(&mut meta, fields);

        self.repos().create(id, scope, &meta)?;
        info!(store = id, scope = %scope, "store created");
        Ok(StoreInfo {
            id: id.to_string(),
            scope,
            meta,
        })
    }

    /// Delete a store and scrub it from every workspace and repo
    /// state. Files already overlaid into workspaces are left alone.
    pub fn delete_store(&self, id: &str) -> Result<DeleteStoreReport> {
        pathsafe::validate_identifier(id)?;
        let repos = self.repos();
        let existed = repos.exists(id)?;
        repos.delete(id)?;

        let state_store = self.state_store();
        let mut scrubbed = Vec::new();
        for workspace_id in state_store.list_workspaces()? {
            let Some(mut state) = state_store.load_workspace(&workspace_id)? else {
                continue;
            };
            let referenced = state.paths.values().any(|o| o.store == id)
                || state.stack.iter().any(|s| s == id)
                || state.active_store.as_deref() == Some(id);
            if !referenced {
                continue;
            }
            state.scrub_store(id);
            state.refresh_derived(|s| repos.scope_of(s));
            state_store.save_workspace(&workspace_id, &state)?;
            scrubbed.push(workspace_id);
        }

        for fingerprint in state_store.list_repos()? {
            let Some(mut repo_state) = state_store.load_repo(&fingerprint)? else {
                continue;
            };
            let referenced = repo_state.stack.iter().any(|s| s == id)
                || repo_state.active_store.as_deref() == Some(id);
            if referenced {
                repo_state.scrub_store(id);
                state_store.save_repo(&repo_state)?;
            }
        }

        info!(store = id, existed, "store deleted");
        Ok(DeleteStoreReport {
            id: id.to_string(),
            existed,
            scrubbed_workspaces: scrubbed,
        })
    }

    pub fn list_stores(&self) -> Result<Vec<StoreInfo>> {
        let repos = self.repos();
        let mut out = Vec::new();
        for (id, scope) in repos.list()? {
            let meta = repos.scope_repo(scope).load_meta(&id)?;
            out.push(StoreInfo { id, scope, meta });
        }
        Ok(out)
    }

    pub fn describe_store(&self, id: &str) -> Result<StoreDetails> {
        let repos = self.repos();
        let Some(scope) = repos.scope_of(id) else {
            pathsafe::validate_identifier(id)?;
            return Err(Error::StoreNotFound(id.to_string()));
        };
        Ok(StoreDetails {
            id: id.to_string(),
            scope,
            meta: repos.load_meta(id)?,
            track: repos.load_track(id)?,
        })
    }

    pub fn update_store(&self, id: &str, fields: &StoreFields) -> Result<StoreInfo> {
        let repos = self.repos();
        let Some(scope) = repos.scope_of(id) else {
            pathsafe::validate_identifier(id)?;
            return Err(Error::StoreNotFound(id.to_string()));
        };
        let mut meta = repos.load_meta(id)?;
        apply_fields(&mut meta, fields);
        meta.updated_at = self.clock.now();
        repos.save_meta(id, &meta)?;
        Ok(StoreInfo {
            id: id.to_string(),
            scope,
            meta,
        })
    }

    /// Set the active store for this repository.
    pub fn use_store(&self, id: &str) -> Result<StoreInfo> {
        pathsafe::validate_identifier(id)?;
        let repos = self.repos();
        let Some(scope) = repos.scope_of(id) else {
            return Err(Error::StoreNotFound(id.to_string()));
        };

        let mut repo_state = self.load_repo_state()?;
        repo_state.active_store = Some(id.to_string());
        self.state_store().save_repo(&repo_state)?;

        Ok(StoreInfo {
            id: id.to_string(),
            scope,
            meta: repos.load_meta(id)?,
        })
    }

    // =========================================================================
    // Track list
    // =========================================================================

    /// Add paths to a store's track list. Kind is detected from the
    /// workspace when the path exists there; new paths default to file.
    pub fn track(&self, paths: &[String], options: &TrackOptions) -> Result<TrackReport> {
        let store_id = self.resolve_store(options.store.as_deref())?;
        let repos = self.repos();
        let mut track = repos.load_track(&store_id)?;
        let now = self.clock.now();

        let mut changed = Vec::new();
        let warnings = Vec::new();
        for raw in paths {
            let rel = pathsafe::normalize_rel_path(raw)?;
            let dest = pathsafe::join_under(&self.context.workspace_root, &rel);
            let kind = match self.fs.lstat(&dest)? {
                Some(stat) if stat.kind == crate::fsx::FileKind::Dir => TrackedKind::Dir,
                _ => TrackedKind::File,
            };

            let mut entry = track
                .find(&rel)
                .cloned()
                .unwrap_or_else(|| TrackedPath::new(rel.clone(), kind));
            entry.kind = kind;
            entry.required = options.required;
            entry.role = options.role.clone().or(entry.role);
            if entry.created_at.is_none() {
                entry.created_at = Some(now);
            }
            entry.updated_at = Some(now);
            track.upsert(entry);
            changed.push(rel);
        }

        repos.save_track(&store_id, &track)?;
        Ok(TrackReport {
            store: store_id,
            changed,
            warnings,
        })
    }

    /// Remove paths from a store's track list. Overlay content is kept
    /// until `prune`.
    pub fn untrack(&self, paths: &[String], store: Option<&str>) -> Result<TrackReport> {
        let store_id = self.resolve_store(store)?;
        let repos = self.repos();
        let mut track = repos.load_track(&store_id)?;

        let mut changed = Vec::new();
        let mut warnings = Vec::new();
        for raw in paths {
            let rel = pathsafe::normalize_rel_path(raw)?;
            if track.remove(&rel) {
                changed.push(rel);
            } else {
                warnings.push(format!("'{rel}' was not tracked"));
            }
        }

        repos.save_track(&store_id, &track)?;
        Ok(TrackReport {
            store: store_id,
            changed,
            warnings,
        })
    }

    // =========================================================================
    // Commit / prune
    // =========================================================================

    /// Copy workspace content into the store's overlay for every
    /// tracked path. Paths matching an ignore glob are skipped with a
    /// warning, as are tracked paths missing from the workspace.
    pub fn commit(&self, store: Option<&str>, prune: bool) -> Result<CommitReport> {
        let store_id = self.resolve_store(store)?;
        let repos = self.repos();
        let mut track = repos.load_track(&store_id)?;
        let overlay_root = repos.overlay_root(&store_id)?;
        let now = self.clock.now();

        let mut committed = Vec::new();
        let mut warnings = Vec::new();

        for entry in &mut track.tracked {
            let rel = entry.path.clone();
            if track_is_ignored(&track.ignore, &rel) {
                warnings.push(format!("'{rel}' matches an ignore pattern, skipped"));
                continue;
            }

            let src = pathsafe::join_under(&self.context.workspace_root, &rel);
            let Some(stat) = self.fs.lstat(&src)? else {
                warnings.push(format!("'{rel}' is tracked but missing from the workspace"));
                continue;
            };

            // Committing the workspace side of a symlinked overlay
            // would copy the link back onto its own target.
            if stat.kind == crate::fsx::FileKind::Symlink {
                warnings.push(format!("'{rel}' is a symlink in the workspace, skipped"));
                continue;
            }

            let dst = pathsafe::join_under(&overlay_root, &rel);
            self.fs.remove(&dst)?;
            self.fs.copy(&src, &dst)?;
            entry.kind = if stat.kind == crate::fsx::FileKind::Dir {
                TrackedKind::Dir
            } else {
                TrackedKind::File
            };
            entry.updated_at = Some(now);
            committed.push(rel);
        }

        repos.save_track(&store_id, &track)?;

        let mut report = CommitReport {
            store: store_id.clone(),
            committed,
            pruned: Vec::new(),
            warnings,
        };
        if prune {
            let prune_report = self.prune(Some(&store_id))?;
            report.pruned = prune_report.pruned;
            report.warnings.extend(prune_report.warnings);
        }

        info!(store = %store_id, committed = report.committed.len(), "commit complete");
        Ok(report)
    }

    /// Remove overlay files that no tracked path covers.
    pub fn prune(&self, store: Option<&str>) -> Result<CommitReport> {
        let store_id = self.resolve_store(store)?;
        let repos = self.repos();
        let track = repos.load_track(&store_id)?;
        let overlay_root = repos.overlay_root(&store_id)?;

        let mut pruned = Vec::new();
        if self.fs.exists(&overlay_root) {
            let tops = self.overlay_top_entries(&overlay_root)?;
            for (rel, abs) in tops {
                let covered = track.tracked.iter().any(|t| {
                    t.path == rel || rel.starts_with(&format!("{}/", t.path))
                        || t.path.starts_with(&format!("{rel}/"))
                });
                if !covered {
                    self.fs.remove(&abs)?;
                    pruned.push(rel);
                }
            }
        }

        Ok(CommitReport {
            store: store_id,
            committed: Vec::new(),
            pruned,
            warnings: Vec::new(),
        })
    }

    /// Overlay entries at tracked-path granularity: walk down only as
    /// far as needed to compare against the track list.
    fn overlay_top_entries(&self, overlay_root: &Path) -> Result<Vec<(String, PathBuf)>> {
        let mut out = Vec::new();
        let mut stack = vec![(String::new(), overlay_root.to_path_buf())];
        while let Some((prefix, dir)) = stack.pop() {
            for entry in self.fs.read_dir(&dir)? {
                let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let rel = if prefix.is_empty() {
                    name.to_string()
                } else {
                    format!("{prefix}/{name}")
                };
                let is_dir = matches!(
                    self.fs.lstat(&entry)?,
                    Some(stat) if stat.kind == crate::fsx::FileKind::Dir
                );
                if is_dir {
                    stack.push((rel.clone(), entry.clone()));
                }
                out.push((rel, entry));
            }
        }
        // Leaf-most entries first so pruning a file wins over its dir.
        out.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Ok(out)
    }

    // =========================================================================
    // Apply / unapply
    // =========================================================================

    /// Plan and (unless `dry_run` or conflicted) execute an overlay.
    ///
    /// Full-stack apply uses the repo's stack with the active store
    /// appended last; `options.store` applies that single store.
    pub fn apply(&self, options: &ApplyOptions) -> Result<ApplyOutcome> {
        let repo_state = self.load_repo_state()?;
        let mut state = self.load_workspace_state()?;
        let repos = self.repos();

        let (stores, active) = if let Some(single) = options.store.as_deref() {
            pathsafe::validate_identifier(single)?;
            (vec![single.to_string()], single.to_string())
        } else {
            let active = repo_state.active_store.clone().ok_or(Error::NoActiveStore)?;
            let mut stores: Vec<String> = repo_state
                .stack
                .iter()
                .filter(|s| *s != &active)
                .cloned()
                .collect();
            stores.push(active.clone());
            (stores, active)
        };

        for id in &stores {
            if !repos.exists(id)? {
                return Err(Error::StoreNotFound(id.clone()));
            }
        }

        let mode = options
            .mode
            .or(state.mode)
            .unwrap_or(self.config.overlay.mode);

        let planner = Planner::new(self.fs.as_ref(), &repos, &self.context.workspace_root);
        let plan = planner.plan(
            &PlanRequest {
                stores: stores.clone(),
                mode,
                force: options.force,
            },
            &state,
        )?;

        if options.dry_run {
            return Ok(ApplyOutcome {
                workspace_id: self.context.workspace_id.clone(),
                mode,
                plan,
                executed: false,
                created: None,
                removed: None,
            });
        }
        if plan.has_conflicts() && !options.force {
            return Err(Error::Conflicts {
                plan: Box::new(plan),
            });
        }

        // Workspace inherits the repo's stack and active selection.
        state.stack = repo_state
            .stack
            .iter()
            .filter(|s| *s != &active)
            .cloned()
            .collect();
        state.active_store = Some(active.clone());
        state.active_store_scope = repos.scope_of(&active);

        let executor = Executor::new(self.fs.as_ref(), self.clock.as_ref());
        let report: ExecReport = executor.execute(
            &plan,
            &mut state,
            &repo_state,
            &self.state_store(),
            &self.context.workspace_id,
            |id| repos.scope_of(id),
        )?;

        info!(
            workspace = %self.context.workspace_id,
            stores = stores.len(),
            mode = %mode,
            "apply complete"
        );
        Ok(ApplyOutcome {
            workspace_id: self.context.workspace_id.clone(),
            mode,
            plan,
            executed: true,
            created: Some(report.created),
            removed: Some(report.removed),
        })
    }

    /// Reverse overlays recorded in workspace state.
    pub fn unapply(&self, options: &UnapplyOptions) -> Result<UnapplyOutcome> {
        let state_store = self.state_store();
        let Some(mut state) = state_store.load_workspace(&self.context.workspace_id)? else {
            return Ok(UnapplyOutcome {
                workspace_id: self.context.workspace_id.clone(),
                removed: Vec::new(),
                warnings: vec!["workspace has no recorded overlays".to_string()],
            });
        };

        let filter: Option<Vec<String>> = if let Some(store) = options.store.as_deref() {
            pathsafe::validate_identifier(store)?;
            Some(vec![store.to_string()])
        } else if options.stack_only {
            let active = state.active_store.clone();
            Some(
                state
                    .owning_stores()
                    .into_iter()
                    .filter(|s| Some(s.as_str()) != active.as_deref())
                    .collect(),
            )
        } else {
            None
        };

        let reconciler = Reconciler::new(self.fs.as_ref());
        let report: UnapplyReport = reconciler.unapply(
            &mut state,
            &self.context.workspace_root,
            filter.as_deref(),
            options.force,
        )?;

        let repos = self.repos();
        state.refresh_derived(|id| repos.scope_of(id));
        state_store.save_workspace(&self.context.workspace_id, &state)?;

        info!(
            workspace = %self.context.workspace_id,
            removed = report.removed.len(),
            "unapply complete"
        );
        Ok(UnapplyOutcome {
            workspace_id: self.context.workspace_id.clone(),
            removed: report.removed,
            warnings: report.warnings,
        })
    }

    // =========================================================================
    // Status / diff
    // =========================================================================

    pub fn status(&self) -> Result<WorkspaceStatus> {
        let state = self.load_workspace_state()?;
        let repo_state = self.load_repo_state()?;

        let mut paths = Vec::new();
        for rel in state.ordered_paths() {
            let owner = &state.paths[&rel];
            let dest = pathsafe::join_under(&self.context.workspace_root, &rel);
            paths.push(StatusPath {
                path: rel.clone(),
                store: owner.store.clone(),
                mode: owner.mode,
                missing: self.fs.lstat(&dest)?.is_none(),
            });
        }

        Ok(WorkspaceStatus {
            workspace_id: self.context.workspace_id.clone(),
            repo: self.context.fingerprint.clone(),
            workspace_path: self.context.workspace_path.clone(),
            applied: state.applied,
            mode: state.mode,
            active_store: state.active_store.or(repo_state.active_store),
            stack: repo_state.stack,
            applied_stores: state
                .applied_stores
                .iter()
                .map(|s| s.store.clone())
                .collect(),
            paths,
        })
    }

    pub fn diff(&self, store: Option<&str>) -> Result<DiffReport> {
        let store_id = self.resolve_store(store)?;
        let repos = self.repos();
        let track = repos.load_track(&store_id)?;
        let overlay_root = repos.overlay_root(&store_id)?;

        let differ = Differ::new(self.fs.as_ref(), &self.config.diff);
        differ.diff_store(
            &store_id,
            &track,
            &overlay_root,
            &self.context.workspace_root,
        )
    }

    // =========================================================================
    // Stack
    // =========================================================================

    pub fn stack_list(&self) -> Result<Vec<String>> {
        Ok(self.load_repo_state()?.stack)
    }

    pub fn stack_add(&self, id: &str) -> Result<Vec<String>> {
        pathsafe::validate_identifier(id)?;
        if !self.repos().exists(id)? {
            return Err(Error::StoreNotFound(id.to_string()));
        }
        let mut repo_state = self.load_repo_state()?;
        if repo_state.stack.iter().any(|s| s == id) {
            return Err(Error::InvalidArgument(format!(
                "store '{id}' is already on the stack"
            )));
        }
        repo_state.stack.push(id.to_string());
        self.state_store().save_repo(&repo_state)?;
        Ok(repo_state.stack)
    }

    pub fn stack_pop(&self) -> Result<Option<String>> {
        let mut repo_state = self.load_repo_state()?;
        let popped = repo_state.stack.pop();
        self.state_store().save_repo(&repo_state)?;
        Ok(popped)
    }

    pub fn stack_clear(&self) -> Result<usize> {
        let mut repo_state = self.load_repo_state()?;
        let cleared = repo_state.stack.len();
        repo_state.stack.clear();
        self.state_store().save_repo(&repo_state)?;
        Ok(cleared)
    }

    // =========================================================================
    // Workspace records
    // =========================================================================

    pub fn describe_workspace(&self, workspace_id: Option<&str>) -> Result<WorkspaceStatus> {
        match workspace_id {
            None => self.status(),
            Some(id) => {
                let state = self
                    .state_store()
                    .load_workspace(id)?
                    .ok_or_else(|| Error::WorkspaceNotFound(id.to_string()))?;
                Ok(WorkspaceStatus {
                    workspace_id: id.to_string(),
                    repo: state.repo.clone(),
                    workspace_path: state.workspace_path.clone(),
                    applied: state.applied,
                    mode: state.mode,
                    active_store: state.active_store.clone(),
                    stack: state.stack.clone(),
                    applied_stores: state
                        .applied_stores
                        .iter()
                        .map(|s| s.store.clone())
                        .collect(),
                    paths: state
                        .ordered_paths()
                        .into_iter()
                        .map(|rel| {
                            let owner = &state.paths[&rel];
                            StatusPath {
                                path: rel.clone(),
                                store: owner.store.clone(),
                                mode: owner.mode,
                                missing: false,
                            }
                        })
                        .collect(),
                })
            }
        }
    }

    pub fn list_workspaces(&self) -> Result<Vec<WorkspaceSummary>> {
        let state_store = self.state_store();
        let mut out = Vec::new();
        for id in state_store.list_workspaces()? {
            let Some(state) = state_store.load_workspace(&id)? else {
                continue;
            };
            out.push(WorkspaceSummary {
                workspace_id: id,
                repo: state.repo,
                workspace_path: state.workspace_path,
                applied: state.applied,
                path_count: state.paths.len(),
            });
        }
        out.sort_by(|a, b| a.workspace_id.cmp(&b.workspace_id));
        Ok(out)
    }

    /// Delete a workspace state record. Refused while overlays remain
    /// applied, unless forced.
    pub fn delete_workspace(&self, workspace_id: &str, force: bool) -> Result<()> {
        let state_store = self.state_store();
        let Some(state) = state_store.load_workspace(workspace_id)? else {
            return Err(Error::WorkspaceNotFound(workspace_id.to_string()));
        };
        if !state.paths.is_empty() && !force {
            return Err(Error::WorkspaceBusy);
        }
        state_store.delete_workspace(workspace_id)
    }
}

fn apply_fields(meta: &mut StoreMeta, fields: &StoreFields) {
    if let Some(v) = &fields.description {
        meta.description = Some(v.clone());
    }
    if let Some(v) = &fields.owner {
        meta.owner = Some(v.clone());
    }
    if let Some(v) = &fields.task_id {
        meta.task_id = Some(v.clone());
    }
    if let Some(v) = &fields.parent_task_id {
        meta.parent_task_id = Some(v.clone());
    }
    if let Some(v) = &fields.priority {
        meta.priority = Some(v.clone());
    }
    if let Some(v) = &fields.status {
        meta.status = Some(v.clone());
    }
    if let Some(v) = &fields.store_type {
        meta.store_type = Some(v.clone());
    }
    if let Some(v) = &fields.source {
        meta.source = Some(v.clone());
    }
}

fn track_is_ignored(patterns: &[String], rel: &str) -> bool {
    patterns.iter().any(|pattern| {
        glob::Pattern::new(pattern)
            .map(|p| p.matches(rel))
            .unwrap_or(false)
    })
}
