//! monodev status / diff commands

use crate::diff::DiffStatus;
use crate::engine::Engine;
use crate::error::Result;
use crate::output::Output;

pub fn run_status(engine: &Engine, json: bool, quiet: bool) -> Result<()> {
    let status = engine.status()?;

    let header = if status.applied {
        format!(
            "workspace has {} overlaid path(s)",
            status.paths.len()
        )
    } else {
        "workspace has no applied overlays".to_string()
    };

    let mut output = Output::new("status", header, &status)?
        .summary("workspace", status.workspace_id.clone())
        .summary("path", status.workspace_path.clone())
        .summary(
            "mode",
            status
                .mode
                .map(|m| m.to_string())
                .unwrap_or_else(|| "-".to_string()),
        )
        .summary(
            "active store",
            status
                .active_store
                .clone()
                .unwrap_or_else(|| "-".to_string()),
        );

    if !status.stack.is_empty() {
        output = output.summary("stack", status.stack.join(", "));
    }

    let mut missing = 0usize;
    for path in &status.paths {
        let marker = if path.missing {
            missing += 1;
            " MISSING"
        } else {
            ""
        };
        output = output.detail(format!(
            "{} <- {} [{}]{}",
            path.path, path.store, path.mode, marker
        ));
    }
    if missing > 0 {
        output = output
            .warning(format!(
                "{missing} recorded path(s) no longer exist on disk"
            ))
            .next_step("monodev unapply --force".to_string());
    }
    if status.active_store.is_none() {
        output = output.next_step("monodev use <store>".to_string());
    }

    output.emit(json, quiet)
}

pub fn run_diff(
    engine: &Engine,
    store: Option<String>,
    name_only: bool,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let report = engine.diff(store.as_deref())?;

    let changed: Vec<_> = report.changed().collect();
    let header = format!(
        "store '{}': {} changed path(s), +{} -{}",
        report.store,
        changed.len(),
        report.additions,
        report.deletions
    );

    let mut output = Output::new("diff", header, &report)?;
    for entry in &changed {
        let status = match entry.status {
            DiffStatus::Added => "added",
            DiffStatus::Removed => "removed",
            DiffStatus::Modified => "modified",
            DiffStatus::Unchanged => continue,
        };
        output = output.detail(format!("{status:9}{}", entry.path));
    }
    output.emit(json, quiet)?;

    // Patches go straight to stdout below the envelope in human mode.
    if !json && !quiet && !name_only {
        for entry in changed {
            if let Some(patch) = &entry.patch {
                println!();
                print!("{patch}");
            }
        }
    }
    Ok(())
}
