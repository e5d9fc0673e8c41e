//! Stack composition and store-to-store precedence.

mod support;

use monodev::engine::{ApplyOptions, UnapplyOptions};
use support::TestEnv;

#[test]
fn later_store_wins_on_collision() {
    let env = TestEnv::init();
    let engine = env.engine();
    env.seed_store(&engine, "s1", &[("Makefile", "from s1\n")]);
    env.seed_store(&engine, "s2", &[("Makefile", "from s2\n")]);

    engine.stack_add("s1").unwrap();
    engine.use_store("s2").unwrap();

    let outcome = engine.apply(&ApplyOptions::default()).unwrap();

    // create(s1), remove(s1), create(s2)
    let ops: Vec<(&str, &str)> = outcome
        .plan
        .operations
        .iter()
        .map(|op| (op.kind_str(), op.store()))
        .collect();
    assert_eq!(
        ops,
        vec![
            ("create_symlink", "s1"),
            ("remove", "s1"),
            ("create_symlink", "s2"),
        ]
    );

    let target = std::fs::read_link(env.ws_path("Makefile")).unwrap();
    assert!(target.ends_with("s2/overlay/Makefile"));
    assert_eq!(env.read_ws_file("Makefile"), "from s2\n");

    let status = engine.status().unwrap();
    assert_eq!(status.applied_stores, vec!["s2"]);
}

#[test]
fn stack_and_active_both_contribute() {
    let env = TestEnv::init();
    let engine = env.engine();
    env.seed_store(&engine, "base", &[("Makefile", "base\n")]);
    env.seed_store(&engine, "task", &[("notes.md", "task notes\n")]);

    engine.stack_add("base").unwrap();
    engine.use_store("task").unwrap();

    engine.apply(&ApplyOptions::default()).unwrap();

    assert_eq!(env.read_ws_file("Makefile"), "base\n");
    assert_eq!(env.read_ws_file("notes.md"), "task notes\n");

    let status = engine.status().unwrap();
    assert_eq!(status.applied_stores, vec!["base", "task"]);
    assert_eq!(status.active_store.as_deref(), Some("task"));
    assert_eq!(status.stack, vec!["base"]);
}

#[test]
fn single_store_apply_skips_the_stack() {
    let env = TestEnv::init();
    let engine = env.engine();
    env.seed_store(&engine, "base", &[("Makefile", "base\n")]);
    env.seed_store(&engine, "task", &[("notes.md", "task\n")]);

    engine.stack_add("base").unwrap();
    engine.use_store("task").unwrap();

    engine
        .apply(&ApplyOptions {
            store: Some("task".to_string()),
            ..Default::default()
        })
        .unwrap();

    assert!(!env.ws_path("Makefile").exists());
    assert!(env.ws_path("notes.md").exists());
}

#[test]
fn scope_selective_unapply_by_store() {
    let env = TestEnv::init();
    let engine = env.engine();
    env.seed_store(&engine, "base", &[("Makefile", "base\n")]);
    env.seed_store(&engine, "task", &[("notes.md", "task\n")]);

    engine.stack_add("base").unwrap();
    engine.use_store("task").unwrap();
    engine.apply(&ApplyOptions::default()).unwrap();

    let outcome = engine
        .unapply(&UnapplyOptions {
            store: Some("base".to_string()),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(outcome.removed, vec!["Makefile"]);
    assert!(!env.ws_path("Makefile").exists());
    assert!(env.ws_path("notes.md").exists());

    let status = engine.status().unwrap();
    assert!(status.applied);
    assert_eq!(status.applied_stores, vec!["task"]);
}

#[test]
fn stack_only_unapply_keeps_active_store() {
    let env = TestEnv::init();
    let engine = env.engine();
    env.seed_store(&engine, "base", &[("Makefile", "base\n")]);
    env.seed_store(&engine, "task", &[("notes.md", "task\n")]);

    engine.stack_add("base").unwrap();
    engine.use_store("task").unwrap();
    engine.apply(&ApplyOptions::default()).unwrap();

    engine
        .unapply(&UnapplyOptions {
            stack_only: true,
            ..Default::default()
        })
        .unwrap();

    assert!(!env.ws_path("Makefile").exists());
    assert!(env.ws_path("notes.md").exists());
}

#[test]
fn stack_verbs_roundtrip() {
    let env = TestEnv::init();
    let engine = env.engine();
    env.seed_store(&engine, "a", &[]);
    env.seed_store(&engine, "b", &[]);

    assert!(engine.stack_list().unwrap().is_empty());
    engine.stack_add("a").unwrap();
    engine.stack_add("b").unwrap();
    assert_eq!(engine.stack_list().unwrap(), vec!["a", "b"]);

    // Duplicates are refused.
    assert!(engine.stack_add("a").is_err());
    // Unknown stores are refused.
    assert!(engine.stack_add("nope").is_err());

    assert_eq!(engine.stack_pop().unwrap(), Some("b".to_string()));
    assert_eq!(engine.stack_list().unwrap(), vec!["a"]);

    assert_eq!(engine.stack_clear().unwrap(), 1);
    assert!(engine.stack_list().unwrap().is_empty());
    assert_eq!(engine.stack_pop().unwrap(), None);
}
