use std::fs;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use git2::{IndexAddOption, Repository, Signature};
use monodev::clock::FixedClock;
use monodev::engine::Engine;
use monodev::fsx::RealFs;
use monodev::repo::GitFingerprinter;
use monodev::state::StoreScope;
use tempfile::TempDir;

/// A temp git repository plus an isolated global root, with an engine
/// opened over it.
pub struct TestEnv {
    dir: TempDir,
}

impl TestEnv {
    pub fn init() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let repo = Repository::init(dir.path().join("repo")).expect("git init failed");
        set_identity(&repo);
        let env = Self { dir };
        env.commit_all("seed");
        env
    }

    pub fn repo_root(&self) -> PathBuf {
        self.dir.path().join("repo")
    }

    pub fn global_root(&self) -> PathBuf {
        self.dir.path().join("home")
    }

    /// Engine rooted at the repository root with a pinned clock.
    pub fn engine(&self) -> Engine {
        self.engine_at(&self.repo_root())
    }

    /// Engine rooted at a subdirectory workspace.
    pub fn engine_at(&self, workspace: &Path) -> Engine {
        Engine::open(
            Box::new(RealFs),
            Box::new(FixedClock(
                Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            )),
            &GitFingerprinter,
            self.global_root(),
            workspace,
        )
        .expect("engine open failed")
    }

    pub fn write_ws_file(&self, rel_path: &str, contents: &str) -> PathBuf {
        let path = self.repo_root().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir failed");
        }
        fs::write(&path, contents).expect("write failed");
        path
    }

    pub fn read_ws_file(&self, rel_path: &str) -> String {
        fs::read_to_string(self.repo_root().join(rel_path)).expect("read failed")
    }

    pub fn ws_path(&self, rel_path: &str) -> PathBuf {
        self.repo_root().join(rel_path)
    }

    /// Create a component store and seed its overlay with files,
    /// tracking each of them.
    pub fn seed_store(&self, engine: &Engine, id: &str, files: &[(&str, &str)]) {
        engine
            .create_store(id, StoreScope::Component, &Default::default())
            .expect("store create failed");
        for (rel, contents) in files {
            self.write_ws_file(rel, contents);
        }
        if !files.is_empty() {
            let paths: Vec<String> = files.iter().map(|(rel, _)| rel.to_string()).collect();
            engine
                .track(
                    &paths,
                    &monodev::engine::TrackOptions {
                        store: Some(id.to_string()),
                        required: true,
                        role: None,
                    },
                )
                .expect("track failed");
            engine.commit(Some(id), false).expect("commit failed");
            // Remove the originals so apply starts from a clean slate.
            for (rel, _) in files {
                fs::remove_file(self.repo_root().join(rel)).expect("cleanup failed");
            }
        }
    }

    pub fn commit_all(&self, message: &str) {
        let repo = Repository::open(self.repo_root()).expect("open repo failed");
        let mut index = repo.index().expect("index failed");
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .expect("add failed");
        index.write().expect("index write failed");

        let tree_id = index.write_tree().expect("write tree failed");
        let tree = repo.find_tree(tree_id).expect("find tree failed");
        let sig = Signature::now("monodev-test", "monodev-test@example.com")
            .expect("signature failed");

        let parent = repo
            .head()
            .ok()
            .and_then(|head| head.target())
            .and_then(|oid| repo.find_commit(oid).ok());

        match parent {
            Some(parent) => repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])
                .expect("commit failed"),
            None => repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &[])
                .expect("commit failed"),
        };
    }
}

fn set_identity(repo: &Repository) {
    let mut cfg = repo.config().expect("config failed");
    cfg.set_str("user.name", "monodev-test").expect("set failed");
    cfg.set_str("user.email", "monodev-test@example.com")
        .expect("set failed");
}
