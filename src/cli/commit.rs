//! monodev commit / prune commands

use crate::engine::Engine;
use crate::error::Result;
use crate::output::Output;

pub fn run_commit(
    engine: &Engine,
    store: Option<String>,
    prune: bool,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let report = engine.commit(store.as_deref(), prune)?;

    let mut header = format!(
        "committed {} path(s) to '{}'",
        report.committed.len(),
        report.store
    );
    if !report.pruned.is_empty() {
        header.push_str(&format!(", pruned {}", report.pruned.len()));
    }

    let mut output = Output::new("commit", header, &report)?.warnings(&report.warnings);
    for path in &report.committed {
        output = output.detail(path.clone());
    }
    output.emit(json, quiet)
}

pub fn run_prune(
    engine: &Engine,
    store: Option<String>,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let report = engine.prune(store.as_deref())?;

    let mut output = Output::new(
        "prune",
        format!(
            "pruned {} overlay path(s) from '{}'",
            report.pruned.len(),
            report.store
        ),
        &report,
    )?
    .warnings(&report.warnings);
    for path in &report.pruned {
        output = output.detail(path.clone());
    }
    output.emit(json, quiet)
}
