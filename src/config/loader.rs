//! Task-file discovery and loading
//!
//! Resolves the task file (walking up parent directories like the host
//! registry), expands `include` directives, and parses the result with the
//! grammar matching the file extension. Files with the `.afx` extension use
//! the full grammar; everything else uses the compact line grammar defined
//! in this module.

use crate::config::grammar;
use crate::config::types::{Catalog, Statement, Task};
use crate::error::{ParseError, ParseResult, Result};
use colored::Colorize;
use std::collections::{HashMap, HashSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default task file names to search for
const TASK_FILE_NAMES: &[&str] = &["Armadafile", "Armadafile.af"];

/// Environment variable overriding the task file location
const TASK_FILE_ENV: &str = "ARMADA_FILE";

/// Built-in tasks, always available beneath the loaded catalog.
const BUILTIN_SRC: &str = r#"
task update
  describe Refresh the package index
  shell sudo apt -y update
end

task upgrade
  describe Upgrade all installed packages
  shell sudo apt -y upgrade
end

task reboot
  describe Schedule a reboot in one minute
  shell sudo shutdown -r +1 'armada reboot requested'
end

task podman-install
  describe Install podman and enable the user socket
  packages install podman
  shell sudo usermod -aG podman ${SUDO_USER} || true
  shell systemctl --user enable podman.socket || true
end

task nginx-install
  describe Install nginx and start it
  packages install nginx
  service enable nginx
  service start nginx
end
"#;

/// Source used when no task file exists anywhere up the tree.
const FALLBACK_SRC: &str = r#"
task demo
  describe Shows that armada works without a task file
  shell echo "Armada demo task ran."
end
"#;

/// Find the task file by searching the current directory and its parents.
///
/// `ARMADA_FILE` overrides the file name; an absolute value is returned
/// unchanged without checking existence, matching how an explicit path is
/// trusted. Returns `None` when nothing is found.
pub fn find_task_file() -> Option<PathBuf> {
    find_task_file_from(env::current_dir().ok()?)
}

/// Find the task file starting from a specific directory.
pub fn find_task_file_from(start_dir: PathBuf) -> Option<PathBuf> {
    let names: Vec<String> = match env::var(TASK_FILE_ENV) {
        Ok(hint) => {
            let hinted = PathBuf::from(&hint);
            if hinted.is_absolute() {
                return Some(hinted);
            }
            vec![hint]
        }
        Err(_) => TASK_FILE_NAMES.iter().map(|s| s.to_string()).collect(),
    };

    let mut current_dir = start_dir;
    loop {
        for name in &names {
            let candidate = current_dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => return None,
        }
    }
}

/// Load the task catalog: built-ins, overlaid by the resolved task file
/// (or the embedded fallback when no file exists).
///
/// Returns the catalog and the path it was loaded from, if any.
pub fn load_catalog(explicit: Option<&Path>) -> Result<(Catalog, Option<PathBuf>)> {
    let mut catalog = parse_compact(BUILTIN_SRC)?;

    let resolved = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => find_task_file(),
    };

    match resolved {
        Some(path) if path.is_file() => {
            let base_dir = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            let mut visited = HashSet::new();
            if let Ok(canonical) = fs::canonicalize(&path) {
                visited.insert(canonical);
            }
            let text = fs::read_to_string(&path).map_err(|e| ParseError::Unreadable {
                path: path.clone(),
                error: e.to_string(),
            })?;
            let expanded = expand_includes(&text, &base_dir, &mut visited);

            let loaded = if path.extension().is_some_and(|ext| ext == "afx") {
                grammar::parse_full(&expanded)?
            } else {
                parse_compact(&expanded)?
            };
            catalog.extend(loaded);
            Ok((catalog, Some(path)))
        }
        _ => {
            catalog.extend(parse_compact(FALLBACK_SRC)?);
            Ok((catalog, None))
        }
    }
}

/// Expand `include` directives recursively.
///
/// Directives are only honored between task definitions. Paths resolve
/// relative to the including file (absolute paths pass through). A file
/// already expanded in this load is skipped silently; a missing file is a
/// warning and the directive is dropped.
pub fn expand_includes(text: &str, base_dir: &Path, visited: &mut HashSet<PathBuf>) -> String {
    let mut out_lines: Vec<String> = Vec::new();
    let mut inside_task = false;

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.starts_with("task ") || stripped == "task" {
            inside_task = true;
            out_lines.push(line.to_string());
            continue;
        }
        if stripped == "end" {
            inside_task = false;
            out_lines.push(line.to_string());
            continue;
        }
        if !inside_task && stripped.starts_with("include ") {
            let toks = shlex::split(stripped)
                .unwrap_or_else(|| stripped.split_whitespace().map(String::from).collect());
            if toks.len() >= 2 {
                let inc_path = PathBuf::from(&toks[1]);
                let inc_full = if inc_path.is_absolute() {
                    inc_path
                } else {
                    base_dir.join(inc_path)
                };
                if !inc_full.exists() {
                    eprintln!(
                        "{} include file not found: {}",
                        "[warn]".yellow(),
                        inc_full.display()
                    );
                    continue;
                }
                let canonical = fs::canonicalize(&inc_full).unwrap_or(inc_full.clone());
                if !visited.insert(canonical) {
                    continue;
                }
                match fs::read_to_string(&inc_full) {
                    Ok(inc_text) => {
                        let inc_dir = inc_full
                            .parent()
                            .map(Path::to_path_buf)
                            .unwrap_or_else(|| PathBuf::from("."));
                        out_lines.push(expand_includes(&inc_text, &inc_dir, visited));
                    }
                    Err(e) => {
                        eprintln!(
                            "{} include file unreadable: {}: {}",
                            "[warn]".yellow(),
                            inc_full.display(),
                            e
                        );
                    }
                }
                continue;
            }
        }
        out_lines.push(line.to_string());
    }

    out_lines.join("\n")
}

/// Parse the compact line grammar into a catalog.
///
/// `task <name>` opens a task, `end` closes it. Blank lines and full-line
/// comments are discarded. The first `describe` sets the description;
/// later ones are ignored for that purpose. A task left open at end of
/// input (or at the next `task` line) keeps whatever body it collected.
pub fn parse_compact(text: &str) -> ParseResult<Catalog> {
    let mut catalog = Catalog::new();
    let mut current: Option<Task> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line == "task" || line.starts_with("task ") {
            if let Some(done) = current.take() {
                catalog.insert(done.name.clone(), done);
            }
            let name = line[4..].trim();
            if name.is_empty() {
                return Err(ParseError::MissingTaskName { line: idx + 1 });
            }
            current = Some(Task::new(name));
            continue;
        }
        if line == "end" {
            if let Some(done) = current.take() {
                catalog.insert(done.name.clone(), done);
            }
            continue;
        }
        let Some(task) = current.as_mut() else {
            // Stray lines between tasks are ignored, like comments.
            continue;
        };
        let stmt = parse_statement_line(line);
        if let Statement::Describe(text) = &stmt {
            if task.description.is_none() {
                task.description = Some(text.clone());
            }
        }
        task.body.push(stmt);
    }

    if let Some(done) = current.take() {
        catalog.insert(done.name.clone(), done);
    }
    Ok(catalog)
}

/// Parse one verb line into a statement.
///
/// Fields keep their raw text; interpolation and validation happen when
/// the statement executes, so a bad line only fails the target it runs on.
pub fn parse_statement_line(line: &str) -> Statement {
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((v, r)) => (v, r.trim()),
        None => (line, ""),
    };

    match verb {
        "shell" => Statement::Shell(rest.to_string()),
        "describe" => Statement::Describe(rest.to_string()),
        "packages" => {
            let toks = split_tokens(rest);
            let action = toks.first().cloned().unwrap_or_default();
            let names = toks.into_iter().skip(1).collect();
            Statement::Package { action, names }
        }
        "service" => {
            let toks = split_tokens(rest);
            let action = toks.first().cloned().unwrap_or_default();
            let name = toks.get(1).cloned().unwrap_or_default();
            Statement::Service { action, name }
        }
        "directory" => {
            let (pos, kv) = split_kv(&split_tokens(rest));
            Statement::Directory {
                path: pos.first().cloned().unwrap_or_default(),
                mode: kv.get("mode").cloned(),
            }
        }
        "copy" => {
            let (pos, kv) = split_kv(&split_tokens(rest));
            Statement::Copy {
                local: pos.first().cloned().unwrap_or_default(),
                remote: pos.get(1).cloned().unwrap_or_default(),
                mode: kv.get("mode").cloned(),
                owner: kv.get("user").cloned(),
                group: kv.get("group").cloned(),
            }
        }
        "env" => {
            let mut pairs = Vec::new();
            for tok in split_tokens(rest) {
                if let Some((k, v)) = tok.split_once('=') {
                    pairs.push((k.to_string(), v.to_string()));
                }
            }
            Statement::Env(pairs)
        }
        _ => Statement::Unknown {
            verb: verb.to_string(),
            line: line.to_string(),
        },
    }
}

/// Shell-style token split with a whitespace fallback for unbalanced quotes.
fn split_tokens(text: &str) -> Vec<String> {
    shlex::split(text).unwrap_or_else(|| text.split_whitespace().map(String::from).collect())
}

/// Separate positional tokens from `key=value` tokens.
pub fn split_kv(tokens: &[String]) -> (Vec<String>, HashMap<String, String>) {
    let mut pos = Vec::new();
    let mut kv = HashMap::new();
    for tok in tokens {
        match tok.split_once('=') {
            Some((k, v)) => {
                kv.insert(k.to_string(), v.to_string());
            }
            None => pos.push(tok.clone()),
        }
    }
    (pos, kv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_simple_task() {
        let src = r#"
task hello
  describe Say hello
  shell echo "hello"
end
"#;
        let catalog = parse_compact(src).unwrap();
        let task = catalog.get("hello").unwrap();
        assert_eq!(task.description.as_deref(), Some("Say hello"));
        assert_eq!(task.body.len(), 2);
        assert_eq!(
            task.body[1],
            Statement::Shell(r#"echo "hello""#.to_string())
        );
    }

    #[test]
    fn test_missing_task_name_is_fatal() {
        let result = parse_compact("task\n  shell echo hi\nend\n");
        assert!(matches!(
            result,
            Err(ParseError::MissingTaskName { line: 1 })
        ));
    }

    #[test]
    fn test_duplicate_describe_first_wins() {
        let src = "task t\n  describe first\n  describe second\nend\n";
        let catalog = parse_compact(src).unwrap();
        assert_eq!(
            catalog.get("t").unwrap().description.as_deref(),
            Some("first")
        );
    }

    #[test]
    fn test_unterminated_task_keeps_body() {
        let src = "task open\n  shell echo one\n  shell echo two\n";
        let catalog = parse_compact(src).unwrap();
        assert_eq!(catalog.get("open").unwrap().body.len(), 2);
    }

    #[test]
    fn test_next_task_closes_previous() {
        let src = "task a\n  shell echo a\ntask b\n  shell echo b\nend\n";
        let catalog = parse_compact(src).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("a").unwrap().body.len(), 1);
    }

    #[test]
    fn test_comments_and_blanks_discarded() {
        let src = "task t\n\n  # comment\n  shell echo hi\nend\n";
        let catalog = parse_compact(src).unwrap();
        assert_eq!(catalog.get("t").unwrap().body.len(), 1);
    }

    #[test]
    fn test_statement_variants() {
        assert_eq!(
            parse_statement_line("packages install nginx curl"),
            Statement::Package {
                action: "install".to_string(),
                names: vec!["nginx".to_string(), "curl".to_string()],
            }
        );
        assert_eq!(
            parse_statement_line("service restart nginx"),
            Statement::Service {
                action: "restart".to_string(),
                name: "nginx".to_string(),
            }
        );
        assert_eq!(
            parse_statement_line("directory /var/app mode=0750"),
            Statement::Directory {
                path: "/var/app".to_string(),
                mode: Some("0750".to_string()),
            }
        );
        assert_eq!(
            parse_statement_line("copy app.conf /etc/app.conf mode=0644 user=www group=www"),
            Statement::Copy {
                local: "app.conf".to_string(),
                remote: "/etc/app.conf".to_string(),
                mode: Some("0644".to_string()),
                owner: Some("www".to_string()),
                group: Some("www".to_string()),
            }
        );
        assert_eq!(
            parse_statement_line("env A=1 B=$A"),
            Statement::Env(vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "$A".to_string()),
            ])
        );
    }

    #[test]
    fn test_unknown_verb_kept_for_execution() {
        let stmt = parse_statement_line("frobnicate /etc");
        assert_eq!(
            stmt,
            Statement::Unknown {
                verb: "frobnicate".to_string(),
                line: "frobnicate /etc".to_string(),
            }
        );
    }

    #[test]
    fn test_arity_gaps_load_as_empty_fields() {
        assert_eq!(
            parse_statement_line("copy only-one"),
            Statement::Copy {
                local: "only-one".to_string(),
                remote: String::new(),
                mode: None,
                owner: None,
                group: None,
            }
        );
        assert_eq!(
            parse_statement_line("service start"),
            Statement::Service {
                action: "start".to_string(),
                name: String::new(),
            }
        );
    }

    #[test]
    fn test_include_expansion() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("extra.af"),
            "task extra\n  shell echo extra\nend\n",
        )
        .unwrap();
        let root = "include extra.af\ntask main\n  shell echo main\nend\n";

        let mut visited = HashSet::new();
        let expanded = expand_includes(root, dir.path(), &mut visited);
        let catalog = parse_compact(&expanded).unwrap();
        assert!(catalog.contains_key("extra"));
        assert!(catalog.contains_key("main"));
    }

    #[test]
    fn test_include_inside_task_is_not_expanded() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("x.af"), "task x\nend\n").unwrap();
        let root = "task t\n  include x.af\nend\n";

        let mut visited = HashSet::new();
        let expanded = expand_includes(root, dir.path(), &mut visited);
        let catalog = parse_compact(&expanded).unwrap();
        assert!(!catalog.contains_key("x"));
        // The line stays in the body as an unknown verb.
        assert!(matches!(
            catalog.get("t").unwrap().body[0],
            Statement::Unknown { .. }
        ));
    }

    #[test]
    fn test_include_cycle_skipped_silently() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("a.af"),
            "include b.af\ntask a\n  shell echo a\nend\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("b.af"),
            "include a.af\ntask b\n  shell echo b\nend\n",
        )
        .unwrap();

        let root_text = fs::read_to_string(dir.path().join("a.af")).unwrap();
        let mut visited = HashSet::new();
        visited.insert(fs::canonicalize(dir.path().join("a.af")).unwrap());
        let expanded = expand_includes(&root_text, dir.path(), &mut visited);
        let catalog = parse_compact(&expanded).unwrap();
        assert!(catalog.contains_key("a"));
        assert!(catalog.contains_key("b"));
    }

    #[test]
    fn test_missing_include_is_nonfatal() {
        let dir = TempDir::new().unwrap();
        let root = "include nope.af\ntask t\n  shell echo hi\nend\n";
        let mut visited = HashSet::new();
        let expanded = expand_includes(root, dir.path(), &mut visited);
        let catalog = parse_compact(&expanded).unwrap();
        assert!(catalog.contains_key("t"));
    }

    #[test]
    fn test_builtins_parse() {
        let catalog = parse_compact(BUILTIN_SRC).unwrap();
        assert!(catalog.contains_key("update"));
        assert!(catalog.contains_key("nginx-install"));
    }

    #[test]
    fn test_find_task_file_walks_up() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("Armadafile");
        fs::write(&file, "task t\nend\n").unwrap();
        let sub = dir.path().join("a/b");
        fs::create_dir_all(&sub).unwrap();

        let found = find_task_file_from(sub).unwrap();
        assert_eq!(found, file);
    }
}
