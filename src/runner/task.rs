//! Task execution against one target
//!
//! Threads one mutable scope through a task's whole statement sequence.
//! `env` statements merge into the task-local layer in declaration order,
//! `if` runs exactly one branch, `for` binds its variable in a fresh
//! innermost layer one item at a time, and everything else goes to the
//! verb executor. The first statement with a non-zero exit code stops the
//! task and becomes its result.

use crate::config::types::{Statement, Task};
use crate::error::ExecResult;
use crate::runner::interpolate::interpolate;
use crate::runner::transport::Transport;
use crate::runner::{condition, verb, ExecutionContext, Scope};
use std::collections::HashMap;

/// Run one task against one target. `invocation_params` are the caller's
/// `key=value` pairs, overlaying the task's declared defaults.
pub fn run_task(
    task: &Task,
    invocation_params: &HashMap<String, String>,
    ctx: &ExecutionContext,
    transport: &mut dyn Transport,
) -> ExecResult<i32> {
    let mut params: HashMap<String, String> = task
        .params
        .iter()
        .map(|p| (p.name.clone(), p.default.clone()))
        .collect();
    for (key, value) in invocation_params {
        params.insert(key.clone(), value.clone());
    }

    ctx.say_task(&task.name);
    let mut scope = Scope::new(params);
    run_body(&task.body, ctx, &mut scope, transport)
}

/// Execute a statement sequence, stopping at the first non-zero exit.
pub fn run_body(
    body: &[Statement],
    ctx: &ExecutionContext,
    scope: &mut Scope,
    transport: &mut dyn Transport,
) -> ExecResult<i32> {
    for stmt in body {
        let rc = match stmt {
            Statement::Env(pairs) => {
                // In order, so later assignments can use earlier ones.
                for (key, value) in pairs {
                    let value = interpolate(value, scope);
                    scope.set_local(key.clone(), value);
                }
                0
            }

            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                if condition::evaluate(condition, ctx, scope, transport)? {
                    run_body(then_body, ctx, scope, transport)?
                } else {
                    run_body(else_body, ctx, scope, transport)?
                }
            }

            Statement::For { var, items, body } => {
                let mut rc = 0;
                for item in items {
                    let bound = interpolate(item, scope);
                    scope.bind(var.clone(), bound);
                    let result = run_body(body, ctx, scope, transport);
                    scope.unbind();
                    rc = result?;
                    if rc != 0 {
                        break;
                    }
                }
                rc
            }

            other => {
                let rc = verb::execute(other, ctx, scope, transport)?;
                if rc != 0 {
                    ctx.say_error(&format!("!! command failed (rc={rc}): {stmt}"));
                }
                rc
            }
        };

        if rc != 0 {
            return Ok(rc);
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::hosts::parse_host_spec;
    use crate::config::types::{Condition, Param};
    use crate::runner::transport::LocalTransport;
    use std::fs;
    use tempfile::TempDir;

    fn local_ctx() -> ExecutionContext {
        let resolved = parse_host_spec("@local", None, None).unwrap();
        ExecutionContext::new(&resolved, false, None)
    }

    fn shell(cmd: &str) -> Statement {
        Statement::Shell(cmd.to_string())
    }

    #[test]
    fn test_fail_fast_stops_at_first_failure() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran-third");

        let mut task = Task::new("t");
        task.body = vec![
            shell("true"),
            shell("exit 5"),
            shell(&format!("touch {}", marker.display())),
        ];

        let ctx = local_ctx();
        let mut t = LocalTransport::new("[t]");
        let rc = run_task(&task, &HashMap::new(), &ctx, &mut t).unwrap();
        assert_eq!(rc, 5);
        assert!(!marker.exists());
    }

    #[test]
    fn test_env_assignments_see_earlier_ones() {
        let mut task = Task::new("t");
        task.body = vec![
            Statement::Env(vec![
                ("A".to_string(), "one".to_string()),
                ("B".to_string(), "$A-two".to_string()),
            ]),
            shell("test \"$B\" = one-two"),
        ];

        let ctx = local_ctx();
        let mut t = LocalTransport::new("[t]");
        assert_eq!(run_task(&task, &HashMap::new(), &ctx, &mut t).unwrap(), 0);
    }

    #[test]
    fn test_if_runs_exactly_one_branch() {
        let dir = TempDir::new().unwrap();
        let then_marker = dir.path().join("then");
        let else_marker = dir.path().join("else");

        let mut task = Task::new("t");
        task.params = vec![Param {
            name: "mode".to_string(),
            default: "dev".to_string(),
        }];
        task.body = vec![Statement::If {
            condition: Condition::VarEquals {
                var: "mode".to_string(),
                negated: false,
                literal: "prod".to_string(),
            },
            then_body: vec![shell(&format!("touch {}", then_marker.display()))],
            else_body: vec![shell(&format!("touch {}", else_marker.display()))],
        }];

        let ctx = local_ctx();
        let mut t = LocalTransport::new("[t]");
        assert_eq!(run_task(&task, &HashMap::new(), &ctx, &mut t).unwrap(), 0);
        assert!(!then_marker.exists());
        assert!(else_marker.exists());

        fs::remove_file(&else_marker).unwrap();
        let mut params = HashMap::new();
        params.insert("mode".to_string(), "prod".to_string());
        assert_eq!(run_task(&task, &params, &ctx, &mut t).unwrap(), 0);
        assert!(then_marker.exists());
        assert!(!else_marker.exists());
    }

    #[test]
    fn test_empty_else_means_skip() {
        let mut task = Task::new("t");
        task.body = vec![Statement::If {
            condition: Condition::VarExists("not_set_anywhere_zz".to_string()),
            then_body: vec![shell("exit 9")],
            else_body: vec![],
        }];

        let ctx = local_ctx();
        let mut t = LocalTransport::new("[t]");
        assert_eq!(run_task(&task, &HashMap::new(), &ctx, &mut t).unwrap(), 0);
    }

    #[test]
    fn test_for_binds_each_item_in_order() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("log");

        let mut task = Task::new("t");
        task.body = vec![Statement::For {
            var: "f".to_string(),
            items: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            body: vec![shell(&format!("echo $f >> {}", log.display()))],
        }];

        let ctx = local_ctx();
        let mut t = LocalTransport::new("[t]");
        assert_eq!(run_task(&task, &HashMap::new(), &ctx, &mut t).unwrap(), 0);
        assert_eq!(fs::read_to_string(&log).unwrap(), "a\nb\nc\n");
    }

    #[test]
    fn test_for_failure_stops_iteration() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("log");

        let mut task = Task::new("t");
        task.body = vec![Statement::For {
            var: "i".to_string(),
            items: vec!["1".to_string(), "2".to_string(), "3".to_string()],
            body: vec![
                shell(&format!("echo $i >> {}", log.display())),
                shell("test $i != 2"),
            ],
        }];

        let ctx = local_ctx();
        let mut t = LocalTransport::new("[t]");
        let rc = run_task(&task, &HashMap::new(), &ctx, &mut t).unwrap();
        assert_ne!(rc, 0);
        assert_eq!(fs::read_to_string(&log).unwrap(), "1\n2\n");
    }

    #[test]
    fn test_command_condition_runs_once_per_iteration() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("log");

        let mut task = Task::new("t");
        task.body = vec![Statement::For {
            var: "i".to_string(),
            items: vec!["1".to_string(), "2".to_string(), "3".to_string()],
            body: vec![Statement::If {
                condition: Condition::CommandSucceeds(format!(
                    "echo tick >> {}",
                    log.display()
                )),
                then_body: vec![shell("true")],
                else_body: vec![],
            }],
        }];

        let ctx = local_ctx();
        let mut t = LocalTransport::new("[t]");
        assert_eq!(run_task(&task, &HashMap::new(), &ctx, &mut t).unwrap(), 0);
        assert_eq!(fs::read_to_string(&log).unwrap().lines().count(), 3);
    }

    #[test]
    fn test_invocation_params_override_defaults() {
        let mut task = Task::new("t");
        task.params = vec![Param {
            name: "who".to_string(),
            default: "default".to_string(),
        }];
        task.body = vec![shell("test \"$who\" = given")];

        let ctx = local_ctx();
        let mut t = LocalTransport::new("[t]");
        let mut params = HashMap::new();
        params.insert("who".to_string(), "given".to_string());
        assert_eq!(run_task(&task, &params, &ctx, &mut t).unwrap(), 0);

        // And the default applies when the caller passes nothing.
        task.body = vec![shell("test \"$who\" = default")];
        assert_eq!(run_task(&task, &HashMap::new(), &ctx, &mut t).unwrap(), 0);
    }

    #[test]
    fn test_loop_binding_shadows_param() {
        let mut task = Task::new("t");
        task.params = vec![Param {
            name: "x".to_string(),
            default: "outer".to_string(),
        }];
        task.body = vec![
            Statement::For {
                var: "x".to_string(),
                items: vec!["inner".to_string()],
                body: vec![shell("test \"$x\" = inner")],
            },
            shell("test \"$x\" = outer"),
        ];

        let ctx = local_ctx();
        let mut t = LocalTransport::new("[t]");
        assert_eq!(run_task(&task, &HashMap::new(), &ctx, &mut t).unwrap(), 0);
    }
}
