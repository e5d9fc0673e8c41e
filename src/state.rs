//! Workspace and repository state
//!
//! State is the single source of truth for what has been overlaid.
//! Workspace state lives in `<global_root>/workspaces/<workspace_id>.json`,
//! repo state in `<global_root>/repos/<fingerprint>.json`. Loads return
//! `None` for absent files; saves are atomic pretty JSON; deletes are
//! idempotent. Only the executor and reconciler mutate the `paths`
//! table; everything else reads it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fsx::FileSystem;
use crate::pathsafe;

/// Schema version stamped into workspace state files.
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// How overlay artifacts reach the workspace. Uniform per workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayMode {
    Symlink,
    Copy,
}

impl OverlayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayMode::Symlink => "symlink",
            OverlayMode::Copy => "copy",
        }
    }
}

impl std::fmt::Display for OverlayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OverlayMode {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "symlink" => Ok(OverlayMode::Symlink),
            "copy" => Ok(OverlayMode::Copy),
            _ => Err(Error::InvalidArgument(format!(
                "invalid mode '{s}': must be symlink or copy"
            ))),
        }
    }
}

/// Which scope root a store resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreScope {
    Global,
    Component,
}

impl StoreScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreScope::Global => "global",
            StoreScope::Component => "component",
        }
    }
}

impl std::fmt::Display for StoreScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ownership record: which store produced the artifact at a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathOwnership {
    /// Store id that owns this path.
    pub store: String,
    /// Mode used to create the artifact ("symlink" | "copy").
    #[serde(rename = "type")]
    pub mode: OverlayMode,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
}

/// Store id + scope pair kept for quick listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedStore {
    pub store: String,
    #[serde(rename = "type")]
    pub scope: StoreScope,
}

/// Per-workspace overlay record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceState {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Repository fingerprint (opaque).
    pub repo: String,
    /// Workspace path relative to the repo root ("." for the root).
    pub workspace_path: String,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<OverlayMode>,
    /// Stores applied before the active store, in order.
    #[serde(default)]
    pub stack: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied_stores: Vec<AppliedStore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_store: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_store_scope: Option<StoreScope>,
    /// Insertion-ordered ownership map; BTreeMap keeps serialization
    /// deterministic while `path_order` preserves apply order.
    #[serde(default)]
    pub paths: BTreeMap<String, PathOwnership>,
    /// Apply order of `paths` keys; unapply walks this in reverse.
    #[serde(default)]
    pub path_order: Vec<String>,
}

fn default_schema_version() -> u32 {
    STATE_SCHEMA_VERSION
}

impl WorkspaceState {
    pub fn new(repo: impl Into<String>, workspace_path: impl Into<String>) -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            repo: repo.into(),
            workspace_path: workspace_path.into(),
            applied: false,
            mode: None,
            stack: Vec::new(),
            applied_stores: Vec::new(),
            active_store: None,
            active_store_scope: None,
            paths: BTreeMap::new(),
            path_order: Vec::new(),
        }
    }

    /// Record ownership for a path, maintaining insertion order.
    pub fn insert_path(&mut self, rel: String, ownership: PathOwnership) {
        if !self.paths.contains_key(&rel) {
            self.path_order.push(rel.clone());
        }
        self.paths.insert(rel, ownership);
    }

    /// Drop ownership for a path.
    pub fn remove_path(&mut self, rel: &str) -> Option<PathOwnership> {
        self.path_order.retain(|p| p != rel);
        self.paths.remove(rel)
    }

    /// Paths in apply order. Entries missing from `path_order` (older
    /// state files) are appended in map order.
    pub fn ordered_paths(&self) -> Vec<String> {
        let mut seen: Vec<String> = self
            .path_order
            .iter()
            .filter(|p| self.paths.contains_key(*p))
            .cloned()
            .collect();
        for key in self.paths.keys() {
            if !seen.iter().any(|p| p == key) {
                seen.push(key.clone());
            }
        }
        seen
    }

    /// Recompute `applied` and `applied_stores` from `paths`. The
    /// derived definition is authoritative.
    pub fn refresh_derived(&mut self, scope_of: impl Fn(&str) -> Option<StoreScope>) {
        self.applied = !self.paths.is_empty();
        if !self.applied {
            self.mode = None;
        }

        let mut stores: Vec<AppliedStore> = Vec::new();
        for rel in self.ordered_paths() {
            if let Some(owner) = self.paths.get(&rel) {
                if owner.store.is_empty() {
                    continue;
                }
                if !stores.iter().any(|s| s.store == owner.store) {
                    stores.push(AppliedStore {
                        store: owner.store.clone(),
                        scope: scope_of(&owner.store).unwrap_or(StoreScope::Global),
                    });
                }
            }
        }
        self.applied_stores = stores;
    }

    /// Distinct store ids currently owning paths.
    pub fn owning_stores(&self) -> Vec<String> {
        self.applied_stores.iter().map(|s| s.store.clone()).collect()
    }

    /// Scrub every reference to a store: ownership entries, stack, and
    /// active selection. Workspace files on disk are left alone.
    pub fn scrub_store(&mut self, store_id: &str) {
        let doomed: Vec<String> = self
            .paths
            .iter()
            .filter(|(_, o)| o.store == store_id)
            .map(|(p, _)| p.clone())
            .collect();
        for rel in doomed {
            self.remove_path(&rel);
        }
        self.stack.retain(|s| s != store_id);
        if self.active_store.as_deref() == Some(store_id) {
            self.active_store = None;
            self.active_store_scope = None;
        }
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.schema_version > STATE_SCHEMA_VERSION {
            return Err(Error::StateCorrupt {
                path: path.to_path_buf(),
                reason: format!(
                    "schema version {} is newer than supported {}",
                    self.schema_version, STATE_SCHEMA_VERSION
                ),
            });
        }
        for rel in self.paths.keys() {
            pathsafe::validate_rel_path(rel).map_err(|_| Error::StateCorrupt {
                path: path.to_path_buf(),
                reason: format!("unsafe path key '{rel}'"),
            })?;
        }
        Ok(())
    }
}

/// Per-repository stack and active-store selection. Workspaces inherit
/// this at apply time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoState {
    pub fingerprint: String,
    #[serde(default)]
    pub stack: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_store: Option<String>,
}

impl RepoState {
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            stack: Vec::new(),
            active_store: None,
        }
    }

    pub fn scrub_store(&mut self, store_id: &str) {
        self.stack.retain(|s| s != store_id);
        if self.active_store.as_deref() == Some(store_id) {
            self.active_store = None;
        }
    }
}

// =============================================================================
// Persistence
// =============================================================================

/// Loads and saves workspace/repo state files.
pub struct StateStore<'a> {
    fs: &'a dyn FileSystem,
    workspaces_dir: PathBuf,
    repos_dir: PathBuf,
}

impl<'a> StateStore<'a> {
    pub fn new(fs: &'a dyn FileSystem, global_root: &Path) -> Self {
        Self {
            fs,
            workspaces_dir: global_root.join("workspaces"),
            repos_dir: global_root.join("repos"),
        }
    }

    pub fn workspace_file(&self, workspace_id: &str) -> PathBuf {
        self.workspaces_dir.join(format!("{workspace_id}.json"))
    }

    pub fn repo_file(&self, fingerprint: &str) -> PathBuf {
        self.repos_dir.join(format!("{fingerprint}.json"))
    }

    /// Load workspace state; absent file is `None`, never an error.
    pub fn load_workspace(&self, workspace_id: &str) -> Result<Option<WorkspaceState>> {
        pathsafe::validate_identifier(workspace_id)?;
        let path = self.workspace_file(workspace_id);
        let Some(bytes) = self.read_optional(&path)? else {
            return Ok(None);
        };
        let state: WorkspaceState =
            serde_json::from_slice(&bytes).map_err(|err| Error::StateCorrupt {
                path: path.clone(),
                reason: err.to_string(),
            })?;
        state.validate(&path)?;
        Ok(Some(state))
    }

    pub fn save_workspace(&self, workspace_id: &str, state: &WorkspaceState) -> Result<()> {
        pathsafe::validate_identifier(workspace_id)?;
        let path = self.workspace_file(workspace_id);
        let json = serde_json::to_string_pretty(state)?;
        self.fs.atomic_write(&path, json.as_bytes(), None)
    }

    pub fn delete_workspace(&self, workspace_id: &str) -> Result<()> {
        pathsafe::validate_identifier(workspace_id)?;
        self.fs.remove(&self.workspace_file(workspace_id))
    }

    /// List the ids of every persisted workspace state.
    pub fn list_workspaces(&self) -> Result<Vec<String>> {
        if !self.fs.exists(&self.workspaces_dir) {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in self.fs.read_dir(&self.workspaces_dir)? {
            if let Some(name) = entry.file_name().and_then(|n| n.to_str()) {
                if let Some(id) = name.strip_suffix(".json") {
                    ids.push(id.to_string());
                }
            }
        }
        Ok(ids)
    }

    /// Fingerprints of every persisted repo state.
    pub fn list_repos(&self) -> Result<Vec<String>> {
        if !self.fs.exists(&self.repos_dir) {
            return Ok(Vec::new());
        }
        let mut fingerprints = Vec::new();
        for entry in self.fs.read_dir(&self.repos_dir)? {
            if let Some(name) = entry.file_name().and_then(|n| n.to_str()) {
                if let Some(fp) = name.strip_suffix(".json") {
                    fingerprints.push(fp.to_string());
                }
            }
        }
        Ok(fingerprints)
    }

    pub fn load_repo(&self, fingerprint: &str) -> Result<Option<RepoState>> {
        let path = self.repo_file(fingerprint);
        let Some(bytes) = self.read_optional(&path)? else {
            return Ok(None);
        };
        let state = serde_json::from_slice(&bytes).map_err(|err| Error::StateCorrupt {
            path,
            reason: err.to_string(),
        })?;
        Ok(Some(state))
    }

    pub fn save_repo(&self, state: &RepoState) -> Result<()> {
        let path = self.repo_file(&state.fingerprint);
        let json = serde_json::to_string_pretty(state)?;
        self.fs.atomic_write(&path, json.as_bytes(), None)
    }

    pub fn delete_repo(&self, fingerprint: &str) -> Result<()> {
        self.fs.remove(&self.repo_file(fingerprint))
    }

    fn read_optional(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        if !self.fs.exists(path) {
            return Ok(None);
        }
        Ok(Some(self.fs.read_file(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsx::RealFs;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn ownership(store: &str) -> PathOwnership {
        PathOwnership {
            store: store.to_string(),
            mode: OverlayMode::Symlink,
            timestamp: ts(),
            checksum: String::new(),
        }
    }

    #[test]
    fn load_missing_is_none() {
        let temp = TempDir::new().unwrap();
        let fs_ = RealFs;
        let store = StateStore::new(&fs_, temp.path());
        assert!(store.load_workspace("abc123").unwrap().is_none());
        assert!(store.load_repo("fp").unwrap().is_none());
    }

    #[test]
    fn save_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let fs_ = RealFs;
        let store = StateStore::new(&fs_, temp.path());

        let mut state = WorkspaceState::new("fp-1", "svc/idx");
        state.insert_path("Makefile".into(), ownership("s1"));
        state.refresh_derived(|_| Some(StoreScope::Component));
        store.save_workspace("wsid", &state).unwrap();

        let loaded = store.load_workspace("wsid").unwrap().unwrap();
        assert_eq!(loaded.repo, "fp-1");
        assert!(loaded.applied);
        assert_eq!(loaded.paths["Makefile"].store, "s1");
        assert_eq!(loaded.applied_stores.len(), 1);
    }

    #[test]
    fn delete_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let fs_ = RealFs;
        let store = StateStore::new(&fs_, temp.path());
        store.delete_workspace("missing").unwrap();
        store.delete_repo("missing").unwrap();
    }

    #[test]
    fn corrupt_json_is_state_corrupt() {
        let temp = TempDir::new().unwrap();
        let fs_ = RealFs;
        let store = StateStore::new(&fs_, temp.path());
        fs_.atomic_write(&store.workspace_file("bad"), b"{nope", None)
            .unwrap();

        match store.load_workspace("bad") {
            Err(Error::StateCorrupt { .. }) => {}
            other => panic!("expected StateCorrupt, got {other:?}"),
        }
    }

    #[test]
    fn newer_schema_is_rejected() {
        let temp = TempDir::new().unwrap();
        let fs_ = RealFs;
        let store = StateStore::new(&fs_, temp.path());

        let mut state = WorkspaceState::new("fp", ".");
        state.schema_version = STATE_SCHEMA_VERSION + 1;
        let json = serde_json::to_string_pretty(&state).unwrap();
        fs_.atomic_write(&store.workspace_file("future"), json.as_bytes(), None)
            .unwrap();

        assert!(matches!(
            store.load_workspace("future"),
            Err(Error::StateCorrupt { .. })
        ));
    }

    #[test]
    fn refresh_derived_tracks_paths() {
        let mut state = WorkspaceState::new("fp", ".");
        state.insert_path("a".into(), ownership("s1"));
        state.insert_path("b".into(), ownership("s2"));
        state.insert_path("c".into(), ownership("s1"));
        state.mode = Some(OverlayMode::Symlink);
        state.refresh_derived(|_| Some(StoreScope::Global));

        assert!(state.applied);
        assert_eq!(state.owning_stores(), vec!["s1", "s2"]);

        state.remove_path("a");
        state.remove_path("b");
        state.remove_path("c");
        state.refresh_derived(|_| Some(StoreScope::Global));
        assert!(!state.applied);
        assert!(state.mode.is_none());
        assert!(state.applied_stores.is_empty());
    }

    #[test]
    fn scrub_store_clears_every_reference() {
        let mut state = WorkspaceState::new("fp", ".");
        state.insert_path("a".into(), ownership("s1"));
        state.insert_path("b".into(), ownership("s2"));
        state.stack = vec!["s1".into(), "s2".into()];
        state.active_store = Some("s1".into());
        state.active_store_scope = Some(StoreScope::Component);

        state.scrub_store("s1");

        assert!(!state.paths.contains_key("a"));
        assert!(state.paths.contains_key("b"));
        assert_eq!(state.stack, vec!["s2".to_string()]);
        assert!(state.active_store.is_none());
    }

    #[test]
    fn ordered_paths_follow_insertion() {
        let mut state = WorkspaceState::new("fp", ".");
        state.insert_path("z".into(), ownership("s1"));
        state.insert_path("a".into(), ownership("s1"));
        state.insert_path("m".into(), ownership("s1"));
        assert_eq!(state.ordered_paths(), vec!["z", "a", "m"]);
    }
}
