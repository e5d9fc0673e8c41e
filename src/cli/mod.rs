//! Command-line interface for monodev
//!
//! This module defines the CLI structure using clap derive macros.
//! Each subcommand is implemented in its own submodule.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::clock::SystemClock;
use crate::config;
use crate::engine::Engine;
use crate::error::Result;
use crate::fsx::RealFs;
use crate::repo::GitFingerprinter;

mod apply;
mod commit;
mod init;
mod stack;
mod status;
mod store;
mod track;
mod ws;

const ROBOT_HELP: &str = r#"monodev --robot-help

Purpose
  monodev overlays dev-only files (build scripts, editor config, task
  notes) onto monorepo workspaces without committing them. Overlays
  come from named stores and compose as a stack with later-wins
  precedence.

Quickstart (typical flow)
  monodev init
  monodev store new tooling
  monodev use tooling
  monodev track Makefile .vscode
  monodev commit
  monodev apply

Environment
  MONODEV_REPO  -> default repo path (otherwise current directory)
  MONODEV_HOME  -> user-global root (stores, workspace/repo state)

Storage layout
  <home>/stores/<id>/            Global stores
  <repo>/.monodev/stores/<id>/   Component stores (per repo)
  <home>/workspaces/<id>.json    Workspace overlay state
  <home>/repos/<fp>.json         Repo stack + active store
  .monodev.toml                  Repo config (tracked)

Output contracts
  --json   Machine-readable envelope:
           { schema_version, command, status, data, warnings, next_steps }

Exit codes
  0 success
  2 user error (bad id, unknown store, missing repo)
  3 blocked (overlay conflicts, mode mismatch)
  4 operation failed (io error, corrupt state)

Commands (high level)
  monodev init                 Initialize repo config + component root
  monodev store new|list|info|edit|rm  Store management
  monodev use <id>             Set active store for this repo
  monodev track|untrack        Edit the active store's track list
  monodev commit [--prune]     Copy workspace files into the overlay
  monodev prune                Drop overlay files for untracked paths
  monodev apply [--force] [--dry-run] [--mode symlink|copy]
  monodev unapply [--force] [--store <id>]
  monodev status               Workspace overlay status
  monodev diff [--name-only]   Overlay vs workspace per tracked path
  monodev stack list|add|pop|clear  Store stack for this repo
  monodev ws list|info|rm      Workspace state records

Modes
  symlink  Workspace paths are links into the store overlay (default)
  copy     Workspace paths are copies; checksums recorded for diff

Conflicts
  Pre-existing unmanaged paths block apply. --force claims them
  (destroying the unmanaged content). Mode and type mismatches against
  recorded state also block; --force overrides.
"#;

/// monodev - component-scoped development overlays
///
/// Overlay dev-only files onto monorepo workspaces from named,
/// stackable stores, without touching repository history.
#[derive(Parser, Debug)]
#[command(name = "monodev")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = r#"Examples:
  monodev init
  monodev store new tooling --description "Shared build tooling"
  monodev use tooling
  monodev track Makefile .vscode
  monodev commit
  monodev apply
  monodev status --json
"#)]
pub struct Cli {
    /// Path to the repository (defaults to current directory)
    #[arg(long, global = true, env = "MONODEV_REPO")]
    pub repo: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Print detailed robot-oriented help and exit
    #[arg(long, global = true)]
    pub robot_help: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize monodev in a repository
    #[command(long_about = r#"Initialize monodev state in the repo.

Creates .monodev.toml, the component store root, and a .gitignore
entry for .monodev/.

Examples:
  monodev init
"#)]
    Init,

    /// Store management
    #[command(long_about = r#"Manage overlay stores.

Examples:
  monodev store new tooling
  monodev store new scratch --global
  monodev store list
  monodev store info tooling
  monodev store rm scratch
"#)]
    Store {
        #[command(subcommand)]
        command: StoreCommands,
    },

    /// Set the active store for this repository
    #[command(long_about = r#"Route track/commit/apply to a store by default.

Examples:
  monodev use tooling
"#)]
    Use {
        /// Store id
        id: String,
    },

    /// Track workspace paths in the active store
    #[command(long_about = r#"Add paths to the active store's track list.

Examples:
  monodev track Makefile
  monodev track .vscode --role editor
  monodev track notes.md --optional
"#)]
    Track {
        /// Workspace-relative paths to track
        #[arg(required = true)]
        paths: Vec<String>,

        /// Target store (default: active store)
        #[arg(long)]
        store: Option<String>,

        /// Mark the paths optional (apply skips them silently when
        /// the overlay copy is missing)
        #[arg(long)]
        optional: bool,

        /// Role annotation (e.g. "editor", "build")
        #[arg(long)]
        role: Option<String>,
    },

    /// Stop tracking paths
    #[command(long_about = r#"Remove paths from the active store's track list.

Overlay content is kept until `monodev prune`.

Examples:
  monodev untrack notes.md
"#)]
    Untrack {
        /// Workspace-relative paths to untrack
        #[arg(required = true)]
        paths: Vec<String>,

        /// Target store (default: active store)
        #[arg(long)]
        store: Option<String>,
    },

    /// Copy workspace files into the store overlay
    #[command(long_about = r#"Capture tracked workspace files into the overlay.

Examples:
  monodev commit
  monodev commit --store tooling
  monodev commit --prune
"#)]
    Commit {
        /// Target store (default: active store)
        #[arg(long)]
        store: Option<String>,

        /// Also remove overlay files for no-longer-tracked paths
        #[arg(long)]
        prune: bool,
    },

    /// Remove overlay files for untracked paths
    #[command(long_about = r#"Drop overlay content with no tracked counterpart.

Examples:
  monodev prune
  monodev prune --store tooling
"#)]
    Prune {
        /// Target store (default: active store)
        #[arg(long)]
        store: Option<String>,
    },

    /// Apply overlays to the workspace
    #[command(long_about = r#"Apply the store stack (or one store) to the workspace.

The repo stack applies first, then the active store; later stores win
when paths collide. Conflicts with unmanaged files block the apply
unless --force.

Examples:
  monodev apply
  monodev apply --mode copy
  monodev apply --store tooling
  monodev apply --dry-run
  monodev apply --force
"#)]
    Apply {
        /// Apply a single store instead of the full stack
        #[arg(long)]
        store: Option<String>,

        /// Overlay mode: symlink or copy (default: workspace's
        /// recorded mode, else config)
        #[arg(long)]
        mode: Option<String>,

        /// Claim conflicting paths, destroying unmanaged content
        #[arg(long)]
        force: bool,

        /// Plan only; make no changes
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove applied overlays from the workspace
    #[command(long_about = r#"Reverse recorded overlays.

Examples:
  monodev unapply
  monodev unapply --store tooling
  monodev unapply --force
"#)]
    Unapply {
        /// Only remove paths owned by this store
        #[arg(long)]
        store: Option<String>,

        /// Only remove stack-owned paths, keep the active store's
        #[arg(long)]
        stack_only: bool,

        /// Remove even when on-disk reality mismatches the record
        #[arg(long)]
        force: bool,
    },

    /// Show workspace overlay status
    #[command(long_about = r#"Show a summary of the workspace overlay state.

Examples:
  monodev status
  monodev status --json
"#)]
    Status,

    /// Diff overlay content against the workspace
    #[command(long_about = r#"Compare the store overlay with the workspace.

Examples:
  monodev diff
  monodev diff --store tooling
  monodev diff --name-only
"#)]
    Diff {
        /// Store to diff (default: active store)
        #[arg(long)]
        store: Option<String>,

        /// Only list changed paths, no patches
        #[arg(long)]
        name_only: bool,
    },

    /// Store stack management
    #[command(long_about = r#"Manage the store stack applied before the active store.

Examples:
  monodev stack list
  monodev stack add base-tooling
  monodev stack pop
  monodev stack clear
"#)]
    Stack {
        #[command(subcommand)]
        command: StackCommands,
    },

    /// Workspace state records
    #[command(long_about = r#"Inspect and remove persisted workspace state.

Examples:
  monodev ws list
  monodev ws info <workspace-id>
  monodev ws rm <workspace-id>
"#)]
    Ws {
        #[command(subcommand)]
        command: WsCommands,
    },
}

/// Store subcommands
#[derive(Subcommand, Debug)]
pub enum StoreCommands {
    /// Create a new store
    #[command(long_about = r#"Create a store in the component scope (default)
or the user-global scope.

Examples:
  monodev store new tooling
  monodev store new scratch --global --description "Experiments"
"#)]
    New {
        /// Store id ([A-Za-z0-9_.-]+)
        id: String,

        /// Create in the user-global scope instead of this repo
        #[arg(long)]
        global: bool,

        /// Store description
        #[arg(long)]
        description: Option<String>,

        /// Owner annotation
        #[arg(long)]
        owner: Option<String>,

        /// Associated task id
        #[arg(long)]
        task: Option<String>,

        /// Store type annotation
        #[arg(long = "type")]
        store_type: Option<String>,
    },

    /// List stores visible from this repo
    #[command(alias = "ls")]
    List,

    /// Show store metadata and track list
    Info {
        /// Store id
        id: String,
    },

    /// Edit store metadata
    Edit {
        /// Store id
        id: String,

        /// New description
        #[arg(long)]
        description: Option<String>,

        /// New owner
        #[arg(long)]
        owner: Option<String>,

        /// New task id
        #[arg(long)]
        task: Option<String>,

        /// New priority
        #[arg(long)]
        priority: Option<String>,

        /// New status
        #[arg(long)]
        status: Option<String>,
    },

    /// Delete a store
    #[command(long_about = r#"Delete a store and scrub it from workspace state.

Files already overlaid into workspaces are left on disk; run unapply
first to remove them.

Examples:
  monodev store rm scratch
"#)]
    Rm {
        /// Store id
        id: String,
    },
}

/// Stack subcommands
#[derive(Subcommand, Debug)]
pub enum StackCommands {
    /// List the stack in apply order
    #[command(alias = "ls")]
    List,

    /// Push a store onto the stack
    Add {
        /// Store id
        id: String,
    },

    /// Pop the most recent stack entry
    Pop,

    /// Clear the stack
    Clear,
}

/// Workspace subcommands
#[derive(Subcommand, Debug)]
pub enum WsCommands {
    /// List persisted workspaces
    #[command(alias = "ls")]
    List,

    /// Show a workspace's recorded state
    Info {
        /// Workspace id (default: current workspace)
        id: Option<String>,
    },

    /// Remove a workspace state record
    #[command(long_about = r#"Remove a workspace state record.

Refused while overlays remain applied, unless --force.

Examples:
  monodev ws rm 4f1d... --force
"#)]
    Rm {
        /// Workspace id
        id: String,

        /// Remove even with applied overlays recorded
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub fn run(self) -> Result<()> {
        if self.robot_help {
            println!("{ROBOT_HELP}");
            return Ok(());
        }

        let json = self.json;
        let quiet = self.quiet;
        let start = match &self.repo {
            Some(path) => path.clone(),
            None => std::env::current_dir()
                .map_err(|err| crate::error::Error::io(".", err))?,
        };

        let Some(command) = self.command else {
            println!("{ROBOT_HELP}");
            return Ok(());
        };

        // init works before any engine context exists
        if let Commands::Init = command {
            return init::run(&start, json, quiet);
        }

        let engine = open_engine(&start)?;

        match command {
            Commands::Init => unreachable!("handled above"),
            Commands::Store { command } => store::run(&engine, command, json, quiet),
            Commands::Use { id } => store::run_use(&engine, &id, json, quiet),
            Commands::Track {
                paths,
                store,
                optional,
                role,
            } => track::run_track(&engine, &paths, store, optional, role, json, quiet),
            Commands::Untrack { paths, store } => {
                track::run_untrack(&engine, &paths, store, json, quiet)
            }
            Commands::Commit { store, prune } => {
                commit::run_commit(&engine, store, prune, json, quiet)
            }
            Commands::Prune { store } => commit::run_prune(&engine, store, json, quiet),
            Commands::Apply {
                store,
                mode,
                force,
                dry_run,
            } => apply::run_apply(&engine, store, mode, force, dry_run, json, quiet),
            Commands::Unapply {
                store,
                stack_only,
                force,
            } => apply::run_unapply(&engine, store, stack_only, force, json, quiet),
            Commands::Status => status::run_status(&engine, json, quiet),
            Commands::Diff { store, name_only } => {
                status::run_diff(&engine, store, name_only, json, quiet)
            }
            Commands::Stack { command } => stack::run(&engine, command, json, quiet),
            Commands::Ws { command } => ws::run(&engine, command, json, quiet),
        }
    }
}

fn open_engine(start: &std::path::Path) -> Result<Engine> {
    let global_root = config::resolve_global_root()?;
    Engine::open(
        Box::new(RealFs),
        Box::new(SystemClock),
        &GitFingerprinter,
        global_root,
        start,
    )
}
