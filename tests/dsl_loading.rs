//! Integration tests for task-file loading

mod common;

use armada::config::loader::load_catalog;
use armada::config::types::Statement;
use common::{write_task_file, write_task_file_named};
use std::fs;

#[test]
fn test_load_compact_file() {
    let (_dir, path) = write_task_file(
        r#"
task greet
  describe Say hello
  shell echo "hello"
end

task cleanup
  shell rm -f /tmp/armada-scratch
end
"#,
    );

    let (catalog, loaded_from) = load_catalog(Some(&path)).unwrap();
    assert_eq!(loaded_from.as_deref(), Some(path.as_path()));
    assert_eq!(
        catalog.get("greet").unwrap().description.as_deref(),
        Some("Say hello")
    );
    assert_eq!(catalog.get("cleanup").unwrap().body.len(), 1);
}

#[test]
fn test_load_full_grammar_by_extension() {
    let (_dir, path) = write_task_file_named(
        "stack.afx",
        r#"
task deploy(root="/srv/app")
  describe Deploy the app
  if $mode == "prod"
    shell echo prod
  else
    shell echo dev
  end
end
"#,
    );

    let (catalog, _) = load_catalog(Some(&path)).unwrap();
    let task = catalog.get("deploy").unwrap();
    assert_eq!(task.params.len(), 1);
    assert!(matches!(task.body[1], Statement::If { .. }));
}

#[test]
fn test_includes_pull_in_other_files() {
    let (dir, path) = write_task_file(
        "include web.af\n\ntask base\n  shell echo base\nend\n",
    );
    fs::write(
        dir.path().join("web.af"),
        "task web\n  describe Web stack\n  shell echo web\nend\n",
    )
    .unwrap();

    let (catalog, _) = load_catalog(Some(&path)).unwrap();
    assert!(catalog.contains_key("base"));
    assert_eq!(
        catalog.get("web").unwrap().description.as_deref(),
        Some("Web stack")
    );
}

#[test]
fn test_missing_include_is_nonfatal() {
    let (_dir, path) = write_task_file(
        "include missing.af\n\ntask base\n  shell echo base\nend\n",
    );
    let (catalog, _) = load_catalog(Some(&path)).unwrap();
    assert!(catalog.contains_key("base"));
}

#[test]
fn test_builtins_available_beneath_file_tasks() {
    let (_dir, path) = write_task_file("task mine\n  shell echo mine\nend\n");
    let (catalog, _) = load_catalog(Some(&path)).unwrap();
    assert!(catalog.contains_key("mine"));
    assert!(catalog.contains_key("update"));
}

#[test]
fn test_file_task_shadows_builtin() {
    let (_dir, path) = write_task_file(
        "task update\n  describe Custom update\n  shell echo custom\nend\n",
    );
    let (catalog, _) = load_catalog(Some(&path)).unwrap();
    assert_eq!(
        catalog.get("update").unwrap().description.as_deref(),
        Some("Custom update")
    );
}

#[test]
fn test_no_file_falls_back_to_embedded_catalog() {
    let dir = tempfile::TempDir::new().unwrap();
    let missing = dir.path().join("Armadafile");
    let (catalog, loaded_from) = load_catalog(Some(&missing)).unwrap();
    assert!(loaded_from.is_none());
    assert!(catalog.contains_key("demo"));
}
