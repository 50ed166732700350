//! Parallel dispatch across targets
//!
//! Fans a fixed task sequence out over every resolved target on a bounded
//! worker pool. Targets are independent failure domains: a connect error,
//! a failing task, or a panic inside one worker never blocks or aborts
//! the others. Within a worker everything is strictly sequential, and the
//! remote session is released on every exit path.

use crate::config::hosts::{ResolvedTarget, Target};
use crate::config::types::Task;
use crate::error::Result;
use crate::runner::task::run_task;
use crate::runner::transport::{LocalTransport, SshTransport, Transport};
use crate::runner::ExecutionContext;
use rayon::prelude::*;
use std::collections::HashMap;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Upper bound on concurrent workers; the pool never exceeds the target
/// count either.
pub const MAX_WORKERS: usize = 32;

/// One selected task with its per-invocation parameters.
#[derive(Debug, Clone)]
pub struct TaskInvocation {
    pub task: Task,
    pub params: HashMap<String, String>,
}

/// Privilege-elevation settings for a dispatcher run.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    pub sudo: bool,
    pub sudo_user: Option<String>,
}

/// Run the whole task sequence against every target concurrently and
/// return the aggregate exit code: zero only when every task on every
/// target succeeded, otherwise the first failing target's code.
pub fn dispatch(
    plan: &[TaskInvocation],
    targets: &[ResolvedTarget],
    opts: &DispatchOptions,
) -> Result<i32> {
    let workers = MAX_WORKERS.min(targets.len()).max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| io::Error::other(e.to_string()))?;

    let codes: Vec<i32> = pool.install(|| {
        targets
            .par_iter()
            .map(|target| {
                match catch_unwind(AssertUnwindSafe(|| run_target(plan, target, opts))) {
                    Ok(rc) => rc,
                    Err(_) => {
                        eprintln!("[{}] !! unhandled fault in worker", target.spec);
                        1
                    }
                }
            })
            .collect()
    });

    Ok(codes.into_iter().find(|rc| *rc != 0).unwrap_or(0))
}

/// Run the task sequence against one target. Stops at the first failing
/// task; a connect error marks the target failed without touching the
/// others.
fn run_target(plan: &[TaskInvocation], resolved: &ResolvedTarget, opts: &DispatchOptions) -> i32 {
    let ctx = ExecutionContext::new(resolved, opts.sudo, opts.sudo_user.clone());

    let mut transport: Box<dyn Transport> = match &resolved.target {
        Target::Local => Box::new(LocalTransport::new(&ctx.prefix)),
        Target::Remote { user, host, port } => {
            match SshTransport::connect(user.as_deref(), host, *port, &ctx.prefix) {
                Ok(session) => Box::new(session),
                Err(e) => {
                    ctx.say_error(&e.to_string());
                    return 1;
                }
            }
        }
    };

    let mut rc = 0;
    for invocation in plan {
        match run_task(&invocation.task, &invocation.params, &ctx, transport.as_mut()) {
            Ok(code) => {
                rc = code;
                if code != 0 {
                    break;
                }
            }
            Err(e) => {
                ctx.say_error(&format!("!! error: {e}"));
                rc = 1;
                break;
            }
        }
    }

    transport.close();
    rc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::hosts::parse_host_spec;
    use crate::config::types::Statement;
    use tempfile::TempDir;

    fn invocation(cmds: &[&str]) -> TaskInvocation {
        let mut task = Task::new("t");
        task.body = cmds
            .iter()
            .map(|c| Statement::Shell(c.to_string()))
            .collect();
        TaskInvocation {
            task,
            params: HashMap::new(),
        }
    }

    #[test]
    fn test_all_targets_succeeding_aggregate_zero() {
        let targets = vec![parse_host_spec("@local", None, None).unwrap()];
        let plan = vec![invocation(&["true"])];
        let rc = dispatch(&plan, &targets, &DispatchOptions::default()).unwrap();
        assert_eq!(rc, 0);
    }

    #[test]
    fn test_failing_task_sets_aggregate() {
        let targets = vec![parse_host_spec("@local", None, None).unwrap()];
        let plan = vec![invocation(&["exit 4"])];
        let rc = dispatch(&plan, &targets, &DispatchOptions::default()).unwrap();
        assert_eq!(rc, 4);
    }

    #[test]
    fn test_connect_failure_does_not_block_other_targets() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");

        // Port 1 on loopback refuses immediately; the local target must
        // still run everything.
        let targets = vec![
            parse_host_spec("nobody@127.0.0.1:1", None, None).unwrap(),
            parse_host_spec("@local", None, None).unwrap(),
        ];
        let plan = vec![invocation(&[&format!("touch {}", marker.display())])];
        let rc = dispatch(&plan, &targets, &DispatchOptions::default()).unwrap();

        assert_ne!(rc, 0);
        assert!(marker.exists());
    }

    #[test]
    fn test_per_target_sequence_stops_after_failing_task() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("second-task");

        let targets = vec![parse_host_spec("@local", None, None).unwrap()];
        let plan = vec![
            invocation(&["exit 2"]),
            invocation(&[&format!("touch {}", marker.display())]),
        ];
        let rc = dispatch(&plan, &targets, &DispatchOptions::default()).unwrap();

        assert_eq!(rc, 2);
        assert!(!marker.exists());
    }

    #[test]
    fn test_two_targets_both_execute() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("log");

        let mut a = parse_host_spec("@local", None, None).unwrap();
        a.spec = "local-a".to_string();
        let mut b = parse_host_spec("@local", None, None).unwrap();
        b.spec = "local-b".to_string();

        let plan = vec![invocation(&[&format!("echo ran >> {}", log.display())])];
        let rc = dispatch(&plan, &[a, b], &DispatchOptions::default()).unwrap();

        assert_eq!(rc, 0);
        assert_eq!(std::fs::read_to_string(&log).unwrap().lines().count(), 2);
    }
}
