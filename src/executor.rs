//! Plan execution
//!
//! The executor is the only writer of the `paths` table. It applies a
//! plan in strict list order, updating the workspace state after every
//! mutation, and unwinds this invocation's work in reverse order when
//! an operation fails. Removes emitted for a superseded owner are not
//! resurrected on rollback; the state already recorded their loss when
//! the remove ran.

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::fsx::{self, FileSystem};
use crate::planner::{ApplyPlan, Operation};
use crate::state::{
    OverlayMode, PathOwnership, RepoState, StateStore, StoreScope, WorkspaceState,
};

/// Outcome of a successful execution.
#[derive(Debug, Clone, Default)]
pub struct ExecReport {
    pub created: Vec<String>,
    pub removed: Vec<String>,
}

/// Applies plans and persists the resulting state.
pub struct Executor<'a> {
    fs: &'a dyn FileSystem,
    clock: &'a dyn Clock,
}

impl<'a> Executor<'a> {
    pub fn new(fs: &'a dyn FileSystem, clock: &'a dyn Clock) -> Self {
        Self { fs, clock }
    }

    /// Execute `plan` against `state`, then atomically save the
    /// workspace and repo state files.
    pub fn execute(
        &self,
        plan: &ApplyPlan,
        state: &mut WorkspaceState,
        repo_state: &RepoState,
        state_store: &StateStore<'_>,
        workspace_id: &str,
        scope_of: impl Fn(&str) -> Option<StoreScope>,
    ) -> Result<ExecReport> {
        self.check_preconditions(plan, state)?;

        let mut applied: Vec<&Operation> = Vec::new();
        let mut report = ExecReport::default();

        for op in &plan.operations {
            if let Err(err) = self.apply_op(op, plan.mode, state, &mut report) {
                warn!(
                    op = op.kind_str(),
                    rel = op.rel_path(),
                    error = %err,
                    "operation failed, rolling back this invocation"
                );
                self.rollback(&applied, state);
                return Err(err);
            }
            applied.push(op);
        }

        state.mode = Some(plan.mode);
        state.refresh_derived(&scope_of);

        if let Err(err) = state_store
            .save_workspace(workspace_id, state)
            .and_then(|()| state_store.save_repo(repo_state))
        {
            self.rollback(&applied, state);
            return Err(Error::OperationFailed(format!(
                "state save failed after apply; on-disk overlays and recorded state \
                 may disagree, run status to reconcile: {err}"
            )));
        }

        debug!(
            workspace = workspace_id,
            created = report.created.len(),
            removed = report.removed.len(),
            "plan executed"
        );
        Ok(report)
    }

    fn check_preconditions(&self, plan: &ApplyPlan, state: &WorkspaceState) -> Result<()> {
        if plan.has_conflicts() && !plan.force {
            return Err(Error::Conflicts {
                plan: Box::new(plan.clone()),
            });
        }

        if state.applied {
            if let Some(recorded) = state.mode {
                if recorded != plan.mode {
                    return Err(Error::ModeMismatch {
                        recorded: recorded.as_str().to_string(),
                        requested: plan.mode.as_str().to_string(),
                    });
                }
            }
        }

        for op in &plan.operations {
            match op {
                Operation::CreateSymlink { source, .. } | Operation::Copy { source, .. } => {
                    if !self.fs.exists(source) {
                        return Err(Error::SourceMissing(source.clone()));
                    }
                }
                Operation::Remove { .. } => {}
            }
        }

        Ok(())
    }

    fn apply_op(
        &self,
        op: &Operation,
        mode: OverlayMode,
        state: &mut WorkspaceState,
        report: &mut ExecReport,
    ) -> Result<()> {
        match op {
            Operation::Remove { dest, rel_path, .. } => {
                self.fs.remove(dest)?;
                state.remove_path(rel_path);
                report.removed.push(rel_path.clone());
            }
            Operation::CreateSymlink {
                source,
                dest,
                rel_path,
                store,
            } => {
                if let Some(parent) = dest.parent() {
                    self.fs.mkdir_all(parent)?;
                }
                // A managed same-mode override re-applies over its own
                // artifact; clear it so the symlink call cannot collide.
                self.fs.remove(dest)?;
                self.fs.symlink(source, dest)?;
                state.insert_path(
                    rel_path.clone(),
                    PathOwnership {
                        store: store.clone(),
                        mode,
                        timestamp: self.clock.now(),
                        checksum: String::new(),
                    },
                );
                report.created.push(rel_path.clone());
            }
            Operation::Copy {
                source,
                dest,
                rel_path,
                store,
            } => {
                if let Some(parent) = dest.parent() {
                    self.fs.mkdir_all(parent)?;
                }
                self.fs.remove(dest)?;
                self.fs.copy(source, dest)?;
                let checksum = fsx::checksum(self.fs, dest)?;
                state.insert_path(
                    rel_path.clone(),
                    PathOwnership {
                        store: store.clone(),
                        mode,
                        timestamp: self.clock.now(),
                        checksum,
                    },
                );
                report.created.push(rel_path.clone());
            }
        }
        Ok(())
    }

    /// Undo this invocation's applied operations in reverse order.
    /// Best effort: failures are logged, not propagated.
    fn rollback(&self, applied: &[&Operation], state: &mut WorkspaceState) {
        for op in applied.iter().rev() {
            match op {
                Operation::CreateSymlink { dest, rel_path, .. }
                | Operation::Copy { dest, rel_path, .. } => {
                    if let Err(err) = self.fs.remove(dest) {
                        warn!(rel = %rel_path, error = %err, "rollback remove failed");
                    }
                    state.remove_path(rel_path);
                }
                // Nothing to restore; the artifact belonged to a store
                // whose loss was already recorded.
                Operation::Remove { .. } => {}
            }
        }
    }
}
