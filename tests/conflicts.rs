//! Conflict detection and forced claims.

mod support;

use monodev::engine::{ApplyOptions, UnapplyOptions};
use monodev::error::Error;
use monodev::state::OverlayMode;
use support::TestEnv;

#[test]
fn unmanaged_file_blocks_apply() {
    let env = TestEnv::init();
    let engine = env.engine();
    env.seed_store(&engine, "s1", &[("config.yaml", "managed: true\n")]);
    engine.use_store("s1").unwrap();

    // A pre-existing local file the engine never created.
    env.write_ws_file("config.yaml", "local: precious\n");

    let err = engine.apply(&ApplyOptions::default()).unwrap_err();
    let Error::Conflicts { plan } = err else {
        panic!("expected Conflicts, got other error");
    };
    assert!(plan.operations.is_empty());
    assert_eq!(plan.conflicts.len(), 1);
    assert_eq!(plan.conflicts[0].existing, "unmanaged");
    assert_eq!(plan.conflicts[0].incoming, "file");

    // On-disk state unchanged, nothing recorded.
    assert_eq!(env.read_ws_file("config.yaml"), "local: precious\n");
    assert!(!engine.status().unwrap().applied);
}

#[test]
fn force_claims_unmanaged_paths() {
    let env = TestEnv::init();
    let engine = env.engine();
    env.seed_store(&engine, "s1", &[("config.yaml", "managed: true\n")]);
    engine.use_store("s1").unwrap();
    env.write_ws_file("config.yaml", "local\n");

    let outcome = engine
        .apply(&ApplyOptions {
            force: true,
            ..Default::default()
        })
        .unwrap();

    assert!(outcome.plan.conflicts.is_empty());
    assert_eq!(outcome.plan.operations.len(), 2);
    assert_eq!(outcome.plan.operations[0].kind_str(), "remove");
    assert_eq!(outcome.plan.operations[0].store(), "");
    assert_eq!(outcome.plan.operations[1].kind_str(), "create_symlink");

    assert_eq!(env.read_ws_file("config.yaml"), "managed: true\n");
    assert_eq!(engine.status().unwrap().paths[0].store, "s1");
}

#[test]
fn required_missing_source_warns_but_applies_rest() {
    let env = TestEnv::init();
    let engine = env.engine();
    env.seed_store(&engine, "s1", &[("present.txt", "here\n")]);
    engine.use_store("s1").unwrap();

    // Track a path whose overlay copy never existed.
    engine
        .track(
            &["absent.txt".to_string()],
            &monodev::engine::TrackOptions {
                store: Some("s1".to_string()),
                required: true,
                role: None,
            },
        )
        .unwrap();

    let outcome = engine.apply(&ApplyOptions::default()).unwrap();

    assert!(outcome.executed);
    assert_eq!(outcome.plan.warnings.len(), 1);
    assert!(outcome.plan.warnings[0].contains("absent.txt"));
    assert_eq!(outcome.plan.operations.len(), 1);
    assert!(env.ws_path("present.txt").exists());
    assert!(!env.ws_path("absent.txt").exists());
}

#[test]
fn traversal_in_track_file_is_rejected_before_any_io() {
    let env = TestEnv::init();
    let engine = env.engine();
    env.seed_store(&engine, "s1", &[]);
    engine.use_store("s1").unwrap();

    // Corrupt the track file on disk to bypass save-side validation.
    let track_path = env
        .repo_root()
        .join(".monodev/stores/s1/track.json");
    std::fs::write(
        &track_path,
        r#"{"schemaVersion":1,"tracked":[{"path":"../etc/passwd","kind":"file"}]}"#,
    )
    .unwrap();

    let err = engine.apply(&ApplyOptions::default()).unwrap_err();
    assert!(matches!(err, Error::InvalidRelPath(_)));
    assert!(!engine.status().unwrap().applied);
}

#[test]
fn mode_mismatch_between_applies_is_blocked() {
    let env = TestEnv::init();
    let engine = env.engine();
    env.seed_store(&engine, "s1", &[("Makefile", "x\n")]);
    env.seed_store(&engine, "s2", &[("notes.md", "y\n")]);
    engine.use_store("s1").unwrap();
    engine.apply(&ApplyOptions::default()).unwrap();

    // The workspace is symlink-mode now; a copy-mode apply of another
    // store must not mix modes.
    engine.use_store("s2").unwrap();
    let err = engine
        .apply(&ApplyOptions {
            mode: Some(OverlayMode::Copy),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, Error::ModeMismatch { .. }));
}

#[test]
fn tampered_artifact_blocks_unapply_until_forced() {
    let env = TestEnv::init();
    let engine = env.engine();
    env.seed_store(&engine, "s1", &[("Makefile", "x\n")]);
    engine.use_store("s1").unwrap();
    engine.apply(&ApplyOptions::default()).unwrap();

    // Replace the managed symlink with a regular file.
    std::fs::remove_file(env.ws_path("Makefile")).unwrap();
    env.write_ws_file("Makefile", "hand-edited\n");

    let err = engine.unapply(&UnapplyOptions::default()).unwrap_err();
    assert!(matches!(err, Error::StateMismatch { .. }));
    assert_eq!(env.read_ws_file("Makefile"), "hand-edited\n");

    engine
        .unapply(&UnapplyOptions {
            force: true,
            ..Default::default()
        })
        .unwrap();
    assert!(!env.ws_path("Makefile").exists());
    assert!(!engine.status().unwrap().applied);
}

#[test]
fn unknown_store_in_stack_fails_fast() {
    let env = TestEnv::init();
    let engine = env.engine();
    env.seed_store(&engine, "s1", &[("Makefile", "x\n")]);
    engine.use_store("s1").unwrap();
    engine.stack_add("s1").unwrap();
    // Remove the store behind the stack's back.
    engine.delete_store("s1").unwrap();

    let err = engine.apply(&ApplyOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        Error::NoActiveStore | Error::StoreNotFound(_)
    ));
}
