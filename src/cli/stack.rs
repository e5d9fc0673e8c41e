//! monodev stack commands

use crate::cli::StackCommands;
use crate::engine::Engine;
use crate::error::Result;
use crate::output::Output;

pub fn run(engine: &Engine, command: StackCommands, json: bool, quiet: bool) -> Result<()> {
    match command {
        StackCommands::List => {
            let stack = engine.stack_list()?;
            let mut output = Output::new(
                "stack.list",
                format!("{} store(s) on the stack", stack.len()),
                &stack,
            )?;
            for (idx, id) in stack.iter().enumerate() {
                output = output.detail(format!("{idx}: {id}"));
            }
            output.emit(json, quiet)
        }

        StackCommands::Add { id } => {
            let stack = engine.stack_add(&id)?;
            Output::new("stack.add", format!("pushed '{id}' onto the stack"), &stack)?
                .summary("stack", stack.join(", "))
                .emit(json, quiet)
        }

        StackCommands::Pop => {
            let popped = engine.stack_pop()?;
            let header = match &popped {
                Some(id) => format!("popped '{id}'"),
                None => "stack is empty".to_string(),
            };
            Output::new("stack.pop", header, &popped)?.emit(json, quiet)
        }

        StackCommands::Clear => {
            let cleared = engine.stack_clear()?;
            Output::new(
                "stack.clear",
                format!("cleared {cleared} store(s) from the stack"),
                cleared,
            )?
            .emit(json, quiet)
        }
    }
}
