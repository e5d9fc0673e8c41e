//! Store repository
//!
//! A store lives on disk as `<root>/<id>/{meta.json, track.json,
//! overlay/...}`. Two scope roots exist: the user-global store root and
//! the per-repository component root; [`MultiStoreRepository`] routes
//! each id to the scope that owns it, preferring component over global
//! when both define the same id.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fsx::FileSystem;
use crate::pathsafe;
use crate::state::StoreScope;

pub const META_SCHEMA_VERSION: u32 = 1;
pub const TRACK_SCHEMA_VERSION: u32 = 1;

const META_FILE: &str = "meta.json";
const TRACK_FILE: &str = "track.json";
const OVERLAY_DIR: &str = "overlay";

/// Store metadata (`meta.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMeta {
    pub name: String,
    pub scope: StoreScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default = "default_meta_schema")]
    pub schema_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub store_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

fn default_meta_schema() -> u32 {
    META_SCHEMA_VERSION
}

impl StoreMeta {
    pub fn new(name: impl Into<String>, scope: StoreScope, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            scope,
            description: None,
            created_at: now,
            updated_at: now,
            schema_version: META_SCHEMA_VERSION,
            source: None,
            store_type: None,
            owner: None,
            task_id: None,
            parent_task_id: None,
            priority: None,
            status: None,
        }
    }
}

/// Kind of a tracked path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackedKind {
    File,
    Dir,
}

impl TrackedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackedKind::File => "file",
            TrackedKind::Dir => "dir",
        }
    }
}

/// One entry in a store's track list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedPath {
    /// Workspace-root-relative path, forward-slash separators.
    pub path: String,
    pub kind: TrackedKind,
    #[serde(default = "default_required", skip_serializing_if = "is_true")]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

fn default_required() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

impl TrackedPath {
    pub fn new(path: impl Into<String>, kind: TrackedKind) -> Self {
        Self {
            path: path.into(),
            kind,
            required: true,
            location: None,
            role: None,
            description: None,
            created_at: None,
            updated_at: None,
            origin: None,
        }
    }
}

/// A store's track list (`track.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackFile {
    #[serde(default = "default_track_schema")]
    pub schema_version: u32,
    #[serde(default)]
    pub tracked: Vec<TrackedPath>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

fn default_track_schema() -> u32 {
    TRACK_SCHEMA_VERSION
}

impl Default for TrackFile {
    fn default() -> Self {
        Self {
            schema_version: TRACK_SCHEMA_VERSION,
            tracked: Vec::new(),
            ignore: Vec::new(),
            notes: None,
        }
    }
}

impl TrackFile {
    pub fn find(&self, rel: &str) -> Option<&TrackedPath> {
        self.tracked.iter().find(|t| t.path == rel)
    }

    /// Insert or update an entry, keeping first-tracked order.
    pub fn upsert(&mut self, entry: TrackedPath) {
        if let Some(existing) = self.tracked.iter_mut().find(|t| t.path == entry.path) {
            *existing = entry;
        } else {
            self.tracked.push(entry);
        }
    }

    /// Remove an entry by path. Returns whether anything was removed.
    pub fn remove(&mut self, rel: &str) -> bool {
        let before = self.tracked.len();
        self.tracked.retain(|t| t.path != rel);
        before != self.tracked.len()
    }

    /// Whether a path matches one of the ignore globs.
    pub fn is_ignored(&self, rel: &str) -> bool {
        self.ignore.iter().any(|pattern| {
            glob::Pattern::new(pattern)
                .map(|p| p.matches(rel))
                .unwrap_or(false)
        })
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.schema_version > TRACK_SCHEMA_VERSION {
            return Err(Error::StateCorrupt {
                path: path.to_path_buf(),
                reason: format!(
                    "schema version {} is newer than supported {}",
                    self.schema_version, TRACK_SCHEMA_VERSION
                ),
            });
        }
        for entry in &self.tracked {
            pathsafe::validate_rel_path(&entry.path)?;
        }
        for pattern in &self.ignore {
            glob::Pattern::new(pattern).map_err(|err| {
                Error::InvalidConfig(format!("invalid ignore glob '{pattern}': {err}"))
            })?;
        }
        Ok(())
    }
}

// =============================================================================
// Single-scope repository
// =============================================================================

/// Stores under one scope root.
pub struct StoreRepository<'a> {
    fs: &'a dyn FileSystem,
    root: PathBuf,
    scope: StoreScope,
}

impl<'a> StoreRepository<'a> {
    pub fn new(fs: &'a dyn FileSystem, root: PathBuf, scope: StoreScope) -> Self {
        Self { fs, root, scope }
    }

    pub fn scope(&self) -> StoreScope {
        self.scope
    }

    pub fn store_dir(&self, id: &str) -> Result<PathBuf> {
        pathsafe::validate_identifier(id)?;
        Ok(self.root.join(id))
    }

    pub fn overlay_root(&self, id: &str) -> Result<PathBuf> {
        Ok(self.store_dir(id)?.join(OVERLAY_DIR))
    }

    pub fn exists(&self, id: &str) -> Result<bool> {
        let dir = self.store_dir(id)?;
        Ok(self.fs.exists(&dir.join(META_FILE)))
    }

    /// Ids of every store in this scope, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.fs.exists(&self.root) {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in self.fs.read_dir(&self.root)? {
            let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if pathsafe::validate_identifier(name).is_err() {
                continue;
            }
            if self.fs.exists(&entry.join(META_FILE)) {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Create a store: metadata, empty track list, empty overlay tree.
    pub fn create(&self, id: &str, meta: &StoreMeta) -> Result<()> {
        if self.exists(id)? {
            return Err(Error::StoreAlreadyExists(id.to_string()));
        }
        let dir = self.store_dir(id)?;
        self.fs.mkdir_all(&dir.join(OVERLAY_DIR))?;
        self.save_meta(id, meta)?;
        self.save_track(id, &TrackFile::default())?;
        Ok(())
    }

    /// Delete a store directory. Idempotent.
    pub fn delete(&self, id: &str) -> Result<()> {
        let dir = self.store_dir(id)?;
        self.fs.remove(&dir)
    }

    pub fn load_meta(&self, id: &str) -> Result<StoreMeta> {
        let path = self.store_dir(id)?.join(META_FILE);
        if !self.fs.exists(&path) {
            return Err(Error::StoreNotFound(id.to_string()));
        }
        let bytes = self.fs.read_file(&path)?;
        let meta: StoreMeta =
            serde_json::from_slice(&bytes).map_err(|err| Error::StateCorrupt {
                path: path.clone(),
                reason: err.to_string(),
            })?;
        if meta.schema_version > META_SCHEMA_VERSION {
            return Err(Error::StateCorrupt {
                path,
                reason: format!(
                    "schema version {} is newer than supported {}",
                    meta.schema_version, META_SCHEMA_VERSION
                ),
            });
        }
        Ok(meta)
    }

    pub fn save_meta(&self, id: &str, meta: &StoreMeta) -> Result<()> {
        let path = self.store_dir(id)?.join(META_FILE);
        let json = serde_json::to_string_pretty(meta)?;
        self.fs.atomic_write(&path, json.as_bytes(), None)
    }

    pub fn load_track(&self, id: &str) -> Result<TrackFile> {
        let path = self.store_dir(id)?.join(TRACK_FILE);
        if !self.fs.exists(&path) {
            return Err(Error::StoreNotFound(id.to_string()));
        }
        let bytes = self.fs.read_file(&path)?;
        let track: TrackFile =
            serde_json::from_slice(&bytes).map_err(|err| Error::StateCorrupt {
                path: path.clone(),
                reason: err.to_string(),
            })?;
        track.validate(&path)?;
        Ok(track)
    }

    pub fn save_track(&self, id: &str, track: &TrackFile) -> Result<()> {
        let path = self.store_dir(id)?.join(TRACK_FILE);
        track.validate(&path)?;
        let json = serde_json::to_string_pretty(track)?;
        self.fs.atomic_write(&path, json.as_bytes(), None)
    }
}

// =============================================================================
// Multi-scope repository
// =============================================================================

/// Routes store ids across the component and global scopes. Component
/// wins when both define an id; unknown ids fall back to global.
pub struct MultiStoreRepository<'a> {
    global: StoreRepository<'a>,
    component: StoreRepository<'a>,
}

impl<'a> MultiStoreRepository<'a> {
    pub fn new(
        fs: &'a dyn FileSystem,
        global_root: PathBuf,
        component_root: PathBuf,
    ) -> Self {
        Self {
            global: StoreRepository::new(fs, global_root, StoreScope::Global),
            component: StoreRepository::new(fs, component_root, StoreScope::Component),
        }
    }

    pub fn scope_repo(&self, scope: StoreScope) -> &StoreRepository<'a> {
        match scope {
            StoreScope::Global => &self.global,
            StoreScope::Component => &self.component,
        }
    }

    /// Resolve the scope that owns an id. Component over global;
    /// global when neither has it.
    pub fn resolve(&self, id: &str) -> Result<StoreScope> {
        if self.component.exists(id)? {
            Ok(StoreScope::Component)
        } else {
            Ok(StoreScope::Global)
        }
    }

    /// The scope that actually holds an id, if any.
    pub fn scope_of(&self, id: &str) -> Option<StoreScope> {
        if self.component.exists(id).unwrap_or(false) {
            Some(StoreScope::Component)
        } else if self.global.exists(id).unwrap_or(false) {
            Some(StoreScope::Global)
        } else {
            None
        }
    }

    pub fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.component.exists(id)? || self.global.exists(id)?)
    }

    /// All stores with their scope, component entries first.
    pub fn list(&self) -> Result<Vec<(String, StoreScope)>> {
        let mut out = Vec::new();
        for id in self.component.list()? {
            out.push((id, StoreScope::Component));
        }
        for id in self.global.list()? {
            if !out.iter().any(|(existing, _)| existing == &id) {
                out.push((id, StoreScope::Global));
            }
        }
        Ok(out)
    }

    fn routed(&self, id: &str) -> Result<&StoreRepository<'a>> {
        Ok(self.scope_repo(self.resolve(id)?))
    }

    pub fn load_meta(&self, id: &str) -> Result<StoreMeta> {
        self.routed(id)?.load_meta(id)
    }

    pub fn save_meta(&self, id: &str, meta: &StoreMeta) -> Result<()> {
        self.routed(id)?.save_meta(id, meta)
    }

    pub fn load_track(&self, id: &str) -> Result<TrackFile> {
        self.routed(id)?.load_track(id)
    }

    pub fn save_track(&self, id: &str, track: &TrackFile) -> Result<()> {
        self.routed(id)?.save_track(id, track)
    }

    pub fn overlay_root(&self, id: &str) -> Result<PathBuf> {
        self.routed(id)?.overlay_root(id)
    }

    pub fn create(&self, id: &str, scope: StoreScope, meta: &StoreMeta) -> Result<()> {
        // Uniqueness is per scope, but a cross-scope duplicate would
        // shadow the global store forever; refuse it.
        if self.exists(id)? {
            return Err(Error::StoreAlreadyExists(id.to_string()));
        }
        self.scope_repo(scope).create(id, meta)
    }

    /// Delete from whichever scope holds the id. Idempotent.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.component.delete(id)?;
        self.global.delete(id)
    }
}
