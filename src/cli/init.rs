//! monodev init command implementation
//!
//! Creates the repo config, the component store root, and a
//! .gitignore entry so overlay state never reaches history.

use std::path::{Path, PathBuf};

use crate::config::{Config, COMPONENT_DIR, CONFIG_FILE};
use crate::error::{Error, Result};
use crate::output::Output;
use crate::repo;

#[derive(serde::Serialize)]
struct InitReport {
    repo_root: PathBuf,
    created_config: bool,
    created_component_root: bool,
    updated_gitignore: bool,
}

pub fn run(start: &Path, json: bool, quiet: bool) -> Result<()> {
    let repo_root = repo::discover_repo_root(start)?;

    let created_component_root = ensure_dir(&repo_root.join(COMPONENT_DIR).join("stores"))?;
    let created_config = ensure_config(&repo_root)?;
    let updated_gitignore = ensure_gitignore(&repo_root)?;

    let report = InitReport {
        repo_root: repo_root.clone(),
        created_config,
        created_component_root,
        updated_gitignore,
    };

    let mut notes = Vec::new();
    if created_config {
        notes.push(format!("created {CONFIG_FILE}"));
    }
    if created_component_root {
        notes.push(format!("created {COMPONENT_DIR}/stores/"));
    }
    if updated_gitignore {
        notes.push("updated .gitignore".to_string());
    }
    let header = if notes.is_empty() {
        "monodev init: nothing to do".to_string()
    } else {
        format!("monodev init: {}", notes.join(", "))
    };

    Output::new("init", header, &report)?
        .next_step("monodev store new <id>")
        .emit(json, quiet)
}

fn ensure_config(repo_root: &Path) -> Result<bool> {
    let config_path = repo_root.join(CONFIG_FILE);
    if config_path.exists() {
        if !config_path.is_file() {
            return Err(Error::OperationFailed(format!(
                "{CONFIG_FILE} exists but is not a file: {}",
                config_path.display()
            )));
        }
        return Ok(false);
    }

    let config = Config::default();
    config.save(&config_path)?;
    Ok(true)
}

fn ensure_gitignore(repo_root: &Path) -> Result<bool> {
    let path = repo_root.join(".gitignore");
    if path.exists() && !path.is_file() {
        return Err(Error::OperationFailed(format!(
            ".gitignore exists but is not a file: {}",
            path.display()
        )));
    }

    let existing = if path.exists() {
        std::fs::read_to_string(&path).map_err(|err| Error::io(&path, err))?
    } else {
        String::new()
    };

    if has_monodev_ignore(&existing) {
        return Ok(false);
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(".monodev/\n");
    std::fs::write(&path, updated).map_err(|err| Error::io(&path, err))?;
    Ok(true)
}

fn has_monodev_ignore(contents: &str) -> bool {
    contents.lines().any(|line| {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return false;
        }
        trimmed == ".monodev"
            || trimmed == ".monodev/"
            || trimmed == "/.monodev"
            || trimmed == "/.monodev/"
    })
}

fn ensure_dir(path: &Path) -> Result<bool> {
    if path.exists() {
        if !path.is_dir() {
            return Err(Error::OperationFailed(format!(
                "Expected directory at {}",
                path.display()
            )));
        }
        return Ok(false);
    }

    std::fs::create_dir_all(path).map_err(|err| Error::io(path, err))?;
    Ok(true)
}
