//! monodev track / untrack commands

use crate::engine::{Engine, TrackOptions};
use crate::error::Result;
use crate::output::Output;

pub fn run_track(
    engine: &Engine,
    paths: &[String],
    store: Option<String>,
    optional: bool,
    role: Option<String>,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let options = TrackOptions {
        store,
        required: !optional,
        role,
    };
    let report = engine.track(paths, &options)?;

    let mut output = Output::new(
        "track",
        format!(
            "tracking {} path(s) in '{}'",
            report.changed.len(),
            report.store
        ),
        &report,
    )?
    .warnings(&report.warnings)
    .next_step("monodev commit");
    for path in &report.changed {
        output = output.detail(path.clone());
    }
    output.emit(json, quiet)
}

pub fn run_untrack(
    engine: &Engine,
    paths: &[String],
    store: Option<String>,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let report = engine.untrack(paths, store.as_deref())?;

    let mut output = Output::new(
        "untrack",
        format!(
            "untracked {} path(s) from '{}'",
            report.changed.len(),
            report.store
        ),
        &report,
    )?
    .warnings(&report.warnings)
    .next_step("monodev prune");
    for path in &report.changed {
        output = output.detail(path.clone());
    }
    output.emit(json, quiet)
}
