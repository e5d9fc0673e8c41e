//! monodev store commands

use crate::cli::StoreCommands;
use crate::engine::{Engine, StoreFields};
use crate::error::Result;
use crate::output::Output;
use crate::state::StoreScope;

pub fn run(engine: &Engine, command: StoreCommands, json: bool, quiet: bool) -> Result<()> {
    match command {
        StoreCommands::New {
            id,
            global,
            description,
            owner,
            task,
            store_type,
        } => {
            let scope = if global {
                StoreScope::Global
            } else {
                StoreScope::Component
            };
            let fields = StoreFields {
                description,
                owner,
                task_id: task,
                store_type,
                ..StoreFields::default()
            };
            let info = engine.create_store(&id, scope, &fields)?;
            Output::new(
                "store.new",
                format!("created {} store '{}'", info.scope, info.id),
                &info,
            )?
            .next_step(format!("monodev use {id}"))
            .emit(json, quiet)
        }

        StoreCommands::List => {
            let stores = engine.list_stores()?;
            let mut output = Output::new(
                "store.list",
                format!("{} store(s)", stores.len()),
                &stores,
            )?;
            for info in &stores {
                let description = info.meta.description.as_deref().unwrap_or("");
                output = output.detail(format!(
                    "{} [{}] {}",
                    info.id, info.scope, description
                ));
            }
            output.emit(json, quiet)
        }

        StoreCommands::Info { id } => {
            let details = engine.describe_store(&id)?;
            let mut output = Output::new(
                "store.info",
                format!("store '{}' [{}]", details.id, details.scope),
                &details,
            )?
            .summary("name", details.meta.name.clone())
            .summary("scope", details.scope.to_string())
            .summary("tracked", details.track.tracked.len().to_string());
            if let Some(description) = &details.meta.description {
                output = output.summary("description", description.clone());
            }
            for entry in &details.track.tracked {
                output = output.detail(format!(
                    "{} ({}){}",
                    entry.path,
                    entry.kind.as_str(),
                    if entry.required { "" } else { " optional" }
                ));
            }
            output.emit(json, quiet)
        }

        StoreCommands::Edit {
            id,
            description,
            owner,
            task,
            priority,
            status,
        } => {
            let fields = StoreFields {
                description,
                owner,
                task_id: task,
                priority,
                status,
                ..StoreFields::default()
            };
            let info = engine.update_store(&id, &fields)?;
            Output::new("store.edit", format!("updated store '{}'", info.id), &info)?
                .emit(json, quiet)
        }

        StoreCommands::Rm { id } => {
            let report = engine.delete_store(&id)?;
            let header = if report.existed {
                format!("deleted store '{}'", report.id)
            } else {
                format!("store '{}' did not exist", report.id)
            };
            let mut output = Output::new("store.rm", header, &report)?;
            if !report.scrubbed_workspaces.is_empty() {
                output = output.detail(format!(
                    "scrubbed from {} workspace(s)",
                    report.scrubbed_workspaces.len()
                ));
            }
            output.emit(json, quiet)
        }
    }
}

pub fn run_use(engine: &Engine, id: &str, json: bool, quiet: bool) -> Result<()> {
    let info = engine.use_store(id)?;
    Output::new(
        "use",
        format!("active store is now '{}' [{}]", info.id, info.scope),
        &info,
    )?
    .next_step("monodev track <paths...>")
    .emit(json, quiet)
}
