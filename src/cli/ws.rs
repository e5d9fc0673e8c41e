//! monodev ws commands

use crate::cli::WsCommands;
use crate::engine::Engine;
use crate::error::Result;
use crate::output::Output;

pub fn run(engine: &Engine, command: WsCommands, json: bool, quiet: bool) -> Result<()> {
    match command {
        WsCommands::List => {
            let workspaces = engine.list_workspaces()?;
            let mut output = Output::new(
                "ws.list",
                format!("{} workspace(s) recorded", workspaces.len()),
                &workspaces,
            )?;
            for ws in &workspaces {
                output = output.detail(format!(
                    "{} {} ({} path(s){})",
                    &ws.workspace_id[..12.min(ws.workspace_id.len())],
                    ws.workspace_path,
                    ws.path_count,
                    if ws.applied { ", applied" } else { "" }
                ));
            }
            output.emit(json, quiet)
        }

        WsCommands::Info { id } => {
            let status = engine.describe_workspace(id.as_deref())?;
            let mut output = Output::new(
                "ws.info",
                format!("workspace {}", status.workspace_id),
                &status,
            )?
            .summary("repo", status.repo.clone())
            .summary("path", status.workspace_path.clone())
            .summary("applied", status.applied.to_string());
            for path in &status.paths {
                output = output.detail(format!("{} <- {}", path.path, path.store));
            }
            output.emit(json, quiet)
        }

        WsCommands::Rm { id, force } => {
            engine.delete_workspace(&id, force)?;
            Output::new("ws.rm", format!("removed workspace record {id}"), &id)?
                .emit(json, quiet)
        }
    }
}
