//! Verb execution
//!
//! Dispatches one action statement against one target and resolves to the
//! external command's exit code. Package and service operations translate
//! to `apt` and `systemctl` invocations; `directory` and `copy` chain
//! sub-steps and stop at the first failure; `sync` builds an rsync command
//! line and always runs it on the machine armada runs on (the option
//! bag's own host/user/port pick the rsync destination, independent of
//! the current target). Malformed arguments surface here, when the
//! statement is about to run, so they fail only the target that reached
//! them.

use crate::config::types::{Statement, SyncOptions};
use crate::error::{ExecError, ExecResult};
use crate::runner::interpolate::{interpolate, interpolate_list};
use crate::runner::transport::{LocalTransport, Transport};
use crate::runner::{ExecutionContext, Scope};
use std::path::Path;

/// Execute a single action statement. Control-flow statements never reach
/// this point; the task runner unfolds them first.
pub fn execute(
    stmt: &Statement,
    ctx: &ExecutionContext,
    scope: &Scope,
    transport: &mut dyn Transport,
) -> ExecResult<i32> {
    match stmt {
        Statement::Shell(text) => {
            let command = interpolate(text, scope);
            let words = shlex::split(&command).unwrap_or_default();
            if words.is_empty() {
                return Err(ExecError::Argument("shell needs a command".to_string()));
            }
            run_shell(&command, ctx, scope, transport)
        }

        Statement::Package { action, names } => {
            let action = interpolate(action, scope);
            let mut resolved: Vec<String> = Vec::new();
            for name in interpolate_list(names, scope) {
                resolved.extend(name.split_whitespace().map(String::from));
            }
            let command = package_command(&action, &resolved)?;
            run_shell(&command, ctx, scope, transport)
        }

        Statement::Service { action, name } => {
            let action = interpolate(action, scope);
            let name = interpolate(name, scope);
            let command = service_command(&action, &name)?;
            run_shell(&command, ctx, scope, transport)
        }

        Statement::Directory { path, mode } => {
            let path = interpolate(path, scope);
            if path.is_empty() {
                return Err(ExecError::Argument(
                    "directory <path> [mode=0755]".to_string(),
                ));
            }
            let rc = run_shell(&format!("mkdir -p {}", quote(&path)), ctx, scope, transport)?;
            if rc != 0 {
                return Ok(rc);
            }
            if let Some(mode) = mode {
                let mode = interpolate(mode, scope);
                return run_shell(
                    &format!("chmod {} {}", quote(&mode), quote(&path)),
                    ctx,
                    scope,
                    transport,
                );
            }
            Ok(0)
        }

        Statement::Copy {
            local,
            remote,
            mode,
            owner,
            group,
        } => {
            let local = interpolate(local, scope);
            let remote = interpolate(remote, scope);
            if local.is_empty() || remote.is_empty() {
                return Err(ExecError::Argument(
                    "copy <local> <remote> [mode=0644] [user=...] [group=...]".to_string(),
                ));
            }
            ctx.say(&format!("copy {local} -> {remote}"));
            transport.transfer(Path::new(&local), &remote)?;

            if let Some(mode) = mode {
                let mode = interpolate(mode, scope);
                let rc = run_shell(
                    &format!("chmod {} {}", quote(&mode), quote(&remote)),
                    ctx,
                    scope,
                    transport,
                )?;
                if rc != 0 {
                    return Ok(rc);
                }
            }
            if owner.is_some() || group.is_some() {
                let owner = owner.as_deref().map(|o| interpolate(o, scope));
                let group = group.as_deref().map(|g| interpolate(g, scope));
                let spec = format!(
                    "{}:{}",
                    owner.as_deref().unwrap_or(""),
                    group.as_deref().unwrap_or("")
                );
                let rc = run_shell(
                    &format!("chown {} {}", spec, quote(&remote)),
                    ctx,
                    scope,
                    transport,
                )?;
                if rc != 0 {
                    return Ok(rc);
                }
            }
            Ok(0)
        }

        Statement::Sync(opts) => {
            let argv = sync_argv(opts, scope)?;
            let command = argv
                .iter()
                .map(|a| quote(a))
                .collect::<Vec<_>>()
                .join(" ");
            // rsync runs where armada runs; the destination spec decides
            // whether bytes leave this machine.
            let mut local = LocalTransport::new(&ctx.prefix);
            ctx.say_command(&command);
            local.run(&command, &[])
        }

        // Consumed during scope construction and catalog loading.
        Statement::Env(_) | Statement::Describe(_) => Ok(0),

        Statement::If { .. } | Statement::For { .. } => Err(ExecError::Argument(
            "control statement reached the verb executor".to_string(),
        )),

        Statement::Unknown { verb, .. } => Err(ExecError::UnknownVerb(verb.clone())),
    }
}

/// The shared shell path: wraps sudo, exports the task-local environment,
/// echoes the command under the target prefix, and runs it on the target.
/// Condition evaluation reuses this for backquoted commands.
pub fn run_shell(
    command: &str,
    ctx: &ExecutionContext,
    scope: &Scope,
    transport: &mut dyn Transport,
) -> ExecResult<i32> {
    let mut env: Vec<(String, String)> = scope
        .locals()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    env.sort();

    let mut display = String::new();
    if ctx.sudo {
        display.push_str("(sudo) ");
    }
    for (key, value) in &env {
        display.push_str(&format!("{key}={} ", quote(value)));
    }
    display.push_str(command);
    ctx.say_command(&display);

    let full = if ctx.sudo {
        wrap_sudo(command, ctx.sudo_user.as_deref())
    } else {
        command.to_string()
    };
    transport.run(&full, &env)
}

/// `sudo bash -lc '<cmd>'`, optionally as another user.
pub fn wrap_sudo(command: &str, sudo_user: Option<&str>) -> String {
    match sudo_user {
        Some(user) => format!("sudo -u {} -H bash -lc {}", quote(user), quote(command)),
        None => format!("sudo bash -lc {}", quote(command)),
    }
}

/// Package-manager invocation for an install/remove action.
pub fn package_command(action: &str, names: &[String]) -> ExecResult<String> {
    if names.is_empty() {
        return Err(ExecError::Argument(
            "packages install/remove <names...>".to_string(),
        ));
    }
    let base = match action {
        "install" => "apt -y install",
        "remove" => "apt -y remove",
        other => {
            return Err(ExecError::Argument(format!(
                "unknown packages action: {other}"
            )));
        }
    };
    Ok(format!("{base} {}", names.join(" ")))
}

/// Init-system invocation for a service action.
pub fn service_command(action: &str, name: &str) -> ExecResult<String> {
    if name.is_empty() {
        return Err(ExecError::Argument(
            "service <start|stop|enable|disable|restart> <name>".to_string(),
        ));
    }
    match action {
        "start" | "stop" | "enable" | "disable" | "restart" => {
            Ok(format!("systemctl {action} {}", quote(name)))
        }
        other => Err(ExecError::Argument(format!(
            "unknown service action: {other}"
        ))),
    }
}

/// Build the rsync argument vector for a sync statement. Paths, excludes,
/// and the exclude file interpolate against the scope; host, user, and
/// port are taken as written.
pub fn sync_argv(opts: &SyncOptions, scope: &Scope) -> ExecResult<Vec<String>> {
    let src = interpolate(&opts.src, scope);
    let dest = interpolate(&opts.dest, scope);
    if src.is_empty() || dest.is_empty() {
        return Err(ExecError::Argument("sync requires src and dest".to_string()));
    }

    let mut argv = vec!["rsync".to_string(), "-a".to_string()];
    if opts.verbose {
        argv.push("-v".to_string());
    }
    if opts.dry {
        argv.push("-n".to_string());
    }
    if opts.delete {
        argv.push("--delete".to_string());
    }
    for pattern in interpolate_list(&opts.excludes, scope) {
        argv.push("--exclude".to_string());
        argv.push(pattern);
    }
    if let Some(file) = &opts.exclude_file {
        argv.push("--exclude-from".to_string());
        argv.push(interpolate(file, scope));
    }

    let dest_spec = match &opts.host {
        Some(host) => {
            let ssh = match opts.port {
                Some(port) => format!("ssh -p {port}"),
                None => "ssh".to_string(),
            };
            argv.push("-e".to_string());
            argv.push(ssh);
            match &opts.user {
                Some(user) => format!("{user}@{host}:{dest}"),
                None => format!("{host}:{dest}"),
            }
        }
        None => dest,
    };
    argv.push(src);
    argv.push(dest_spec);
    Ok(argv)
}

/// Shell-quote a single word.
pub fn quote(word: &str) -> String {
    shlex::try_quote(word)
        .map(|q| q.into_owned())
        .unwrap_or_else(|_| word.to_string())
}
