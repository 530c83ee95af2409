#![cfg(feature = "mod_lua")]

use cardshifter_core::{EntityId, Session};
use cardshifter_modding::ModRegistry;
use std::fs;
use std::path::Path;

const FOO: &str = r#"
    function setup(game)
        local me = game.add_player("Foo")
        game.set(me, "score", 0)
        game.add_action(me, "Score", {
            perform = function(g) g.set(me, "score", g.get(me, "score") + 1) end,
        })
    end
"#;

fn write_mod(root: &Path, name: &str, file: &str, source: &str) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join(file), source).expect("write");
}

#[test]
fn external_lua_mod_joins_builtins() {
    let root = tempfile::tempdir().expect("tempdir");
    write_mod(root.path(), "Foo", "game.lua", FOO);

    let mut registry = ModRegistry::new();
    assert_eq!(registry.load_external(root.path()), 1);
    let mods = registry.available_mods();
    for name in ["Vanilla", "Skirmish", "Foo"] {
        assert!(mods.contains(&name), "missing {}", name);
    }

    let rules = registry.instantiate("Foo").expect("Foo loads");
    let mut session = Session::new(rules, 1).expect("bind");
    session.start().expect("start");
    let listed = session.list_actions();
    let mut unused = |_: &cardshifter_core::Game,
                      _: &cardshifter_core::Action,
                      _: &[EntityId]|
     -> Option<usize> { None };
    session.dispatch(&listed, 0, &mut unused).expect("score");
    assert_eq!(
        session.game().metadata(EntityId(1)).expect("table").int("score"),
        1
    );

    assert!(registry.instantiate("Bar").is_none());
}

#[test]
fn loading_the_same_directory_twice_adds_no_duplicates() {
    let root = tempfile::tempdir().expect("tempdir");
    write_mod(root.path(), "Foo", "game.lua", FOO);
    write_mod(root.path(), "Vanilla", "game.lua", FOO);

    let mut registry = ModRegistry::new();
    registry.load_external(root.path());
    let first: Vec<String> = registry.available_mods().iter().map(|s| s.to_string()).collect();
    registry.load_external(root.path());
    let second: Vec<String> = registry.available_mods().iter().map(|s| s.to_string()).collect();

    assert_eq!(first, second);
    let mut sorted = second.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), second.len());
    // an external mod named like a built-in takes over its position
    assert_eq!(second[0], "Vanilla");
}

#[test]
fn missing_directory_leaves_registry_unchanged() {
    let root = tempfile::tempdir().expect("tempdir");
    let mut registry = ModRegistry::new();
    let before: Vec<String> = registry.available_mods().iter().map(|s| s.to_string()).collect();
    assert_eq!(registry.load_external(root.path().join("nowhere")), 0);
    let after: Vec<String> = registry.available_mods().iter().map(|s| s.to_string()).collect();
    assert_eq!(before, after);
}

#[test]
fn regular_file_leaves_registry_unchanged() {
    let root = tempfile::tempdir().expect("tempdir");
    let file = root.path().join("mods.txt");
    fs::write(&file, "not a directory").expect("write");
    let mut registry = ModRegistry::new();
    let before = registry.available_mods().len();
    assert_eq!(registry.load_external(&file), 0);
    assert_eq!(registry.available_mods().len(), before);
}

#[test]
fn broken_mod_is_listed_but_instantiates_to_none() {
    let root = tempfile::tempdir().expect("tempdir");
    write_mod(root.path(), "Broken", "game.lua", "function setup(");
    write_mod(root.path(), "NoSetup", "game.lua", "x = 1");
    write_mod(root.path(), "Skipped", "readme.txt", "no marker");

    let mut registry = ModRegistry::new();
    assert_eq!(registry.load_external(root.path()), 2);
    assert!(registry.contains("Broken"));
    assert!(!registry.contains("Skipped"));
    assert!(registry.instantiate("Broken").is_none());
    assert!(registry.instantiate("NoSetup").is_none());
}

#[test]
fn discovery_does_not_read_scripts() {
    let root = tempfile::tempdir().expect("tempdir");
    write_mod(root.path(), "Later", "game.lua", FOO);
    let mut registry = ModRegistry::new();
    registry.load_external(root.path());
    fs::write(root.path().join("Later").join("game.lua"), "function setup(").expect("rewrite");
    assert!(registry.instantiate("Later").is_none());
}
