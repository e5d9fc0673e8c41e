//! monodev apply / unapply commands

use crate::engine::{ApplyOptions, Engine, UnapplyOptions};
use crate::error::{Error, Result};
use crate::output::Output;
use crate::planner::{ApplyPlan, Operation};
use crate::state::OverlayMode;

pub fn run_apply(
    engine: &Engine,
    store: Option<String>,
    mode: Option<String>,
    force: bool,
    dry_run: bool,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let mode = mode.map(|m| m.parse::<OverlayMode>()).transpose()?;
    let options = ApplyOptions {
        store,
        mode,
        force,
        dry_run,
    };

    let outcome = match engine.apply(&options) {
        Ok(outcome) => outcome,
        Err(Error::Conflicts { plan }) => {
            // Show what was refused before the error surfaces; the
            // JSON error payload already carries the plan.
            if !json && !quiet {
                print_conflicts(&plan);
            }
            return Err(Error::Conflicts { plan });
        }
        Err(err) => return Err(err),
    };

    let header = if outcome.executed {
        format!(
            "applied {} store(s) in {} mode",
            outcome.plan.stores.len(),
            outcome.mode
        )
    } else {
        format!(
            "dry run: {} operation(s), {} conflict(s)",
            outcome.plan.operations.len(),
            outcome.plan.conflicts.len()
        )
    };

    let mut output = Output::new("apply", header, &outcome)?
        .summary("workspace", outcome.workspace_id.clone())
        .summary("mode", outcome.mode.to_string())
        .summary("stores", outcome.plan.stores.join(", "))
        .warnings(&outcome.plan.warnings);

    for op in &outcome.plan.operations {
        output = output.detail(describe_op(op));
    }
    for conflict in &outcome.plan.conflicts {
        output = output.warning(format!("conflict: {}", conflict.reason));
    }
    if !outcome.executed {
        output = output.next_step("monodev apply".to_string());
    }
    output.emit(json, quiet)
}

fn describe_op(op: &Operation) -> String {
    match op {
        Operation::CreateSymlink {
            rel_path, store, ..
        } => format!("link    {rel_path} <- {store}"),
        Operation::Copy {
            rel_path, store, ..
        } => format!("copy    {rel_path} <- {store}"),
        Operation::Remove {
            rel_path, store, ..
        } => {
            if store.is_empty() {
                format!("remove  {rel_path}")
            } else {
                format!("remove  {rel_path} (was {store})")
            }
        }
    }
}

fn print_conflicts(plan: &ApplyPlan) {
    eprintln!("apply blocked by {} conflict(s):", plan.conflicts.len());
    for conflict in &plan.conflicts {
        eprintln!(
            "  {}: {} (existing: {}, incoming: {})",
            conflict.rel_path, conflict.reason, conflict.existing, conflict.incoming
        );
    }
    eprintln!("re-run with --force to claim these paths");
}

pub fn run_unapply(
    engine: &Engine,
    store: Option<String>,
    stack_only: bool,
    force: bool,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let options = UnapplyOptions {
        store,
        stack_only,
        force,
    };
    let outcome = engine.unapply(&options)?;

    let mut output = Output::new(
        "unapply",
        format!("removed {} overlay path(s)", outcome.removed.len()),
        &outcome,
    )?
    .summary("workspace", outcome.workspace_id.clone())
    .warnings(&outcome.warnings);
    for path in &outcome.removed {
        output = output.detail(path.clone());
    }
    output.emit(json, quiet)
}
