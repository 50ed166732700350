//! Main CLI application

use crate::config::hosts::{resolve_targets, HostRegistry};
use crate::config::loader::load_catalog;
use crate::config::types::Catalog;
use crate::error::{ArmadaError, Result};
use crate::runner::dispatch::{dispatch, DispatchOptions, TaskInvocation};
use clap::{crate_version, Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Build the clap command.
fn build_command() -> Command {
    Command::new("armada")
        .version(crate_version!())
        .about("Run provisioning tasks on local and remote hosts, in parallel")
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .help("Path to the task file"),
        )
        .arg(
            Arg::new("env")
                .short('e')
                .long("env")
                .value_name("NAME")
                .action(ArgAction::Append)
                .help("Named environment from the host registry (repeatable)"),
        )
        .arg(
            Arg::new("host")
                .short('H')
                .long("host")
                .value_name("SPEC")
                .action(ArgAction::Append)
                .help("Target host spec, user@host:port (repeatable)"),
        )
        .arg(
            Arg::new("hosts")
                .long("hosts")
                .value_name("LIST")
                .help("Comma-separated host specs"),
        )
        .arg(
            Arg::new("user")
                .short('u')
                .long("user")
                .value_name("USER")
                .help("Default remote user"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .value_parser(clap::value_parser!(u16))
                .help("Default remote port"),
        )
        .arg(
            Arg::new("sudo")
                .long("sudo")
                .action(ArgAction::SetTrue)
                .help("Run commands through sudo"),
        )
        .arg(
            Arg::new("sudo-user")
                .long("sudo-user")
                .value_name("USER")
                .help("Sudo to this user instead of root"),
        )
        .arg(
            Arg::new("words")
                .value_name("TASK [key=value ...]")
                .num_args(0..)
                .trailing_var_arg(true)
                .help("Tasks to run in order, each followed by key=value parameters; or 'list'"),
        )
}

/// Run the CLI and return the process exit code.
pub fn run() -> Result<i32> {
    // A .env beside the invocation feeds the outermost scope layer.
    dotenvy::dotenv().ok();

    let mut command = build_command();
    let matches = command.clone().get_matches();

    let explicit_file = matches.get_one::<String>("file").map(PathBuf::from);
    let (catalog, task_file) = load_catalog(explicit_file.as_deref())?;

    let words: Vec<String> = matches
        .get_many::<String>("words")
        .map(|vals| vals.cloned().collect())
        .unwrap_or_default();

    let task_file_dir = task_file.as_deref().and_then(Path::parent);
    let registry = HostRegistry::load(task_file_dir)?;

    match words.first().map(String::as_str) {
        None => {
            command.print_help()?;
            println!();
            print_list(&catalog, task_file.as_deref(), &registry);
            return Ok(0);
        }
        Some("list") => {
            print_list(&catalog, task_file.as_deref(), &registry);
            return Ok(0);
        }
        Some("completions") => {
            return generate_completions(words.get(1).map(String::as_str), &mut command);
        }
        Some(_) => {}
    }

    let plan = parse_selection(&words, &catalog)?;
    let targets = collect_targets(&matches, &registry)?;
    let opts = DispatchOptions {
        sudo: matches.get_flag("sudo"),
        sudo_user: matches.get_one::<String>("sudo-user").cloned(),
    };

    dispatch(&plan, &targets, &opts)
}

/// Resolve the target list from the CLI flags.
fn collect_targets(
    matches: &ArgMatches,
    registry: &HostRegistry,
) -> Result<Vec<crate::config::hosts::ResolvedTarget>> {
    let env_names: Vec<String> = matches
        .get_many::<String>("env")
        .map(|vals| vals.cloned().collect())
        .unwrap_or_default();
    let mut host_specs: Vec<String> = matches
        .get_many::<String>("host")
        .map(|vals| vals.cloned().collect())
        .unwrap_or_default();
    if let Some(list) = matches.get_one::<String>("hosts") {
        host_specs.push(list.clone());
    }

    let targets = resolve_targets(
        registry,
        &env_names,
        &host_specs,
        matches.get_one::<String>("user").map(String::as_str),
        matches.get_one::<u16>("port").copied(),
    )?;
    Ok(targets)
}

/// Parse the trailing words into an ordered task plan:
/// `<task> [k=v ...] [<task2> [k=v ...]] ...`
pub fn parse_selection(words: &[String], catalog: &Catalog) -> Result<Vec<TaskInvocation>> {
    let mut plan: Vec<TaskInvocation> = Vec::new();

    for word in words {
        match word.split_once('=') {
            Some((key, value)) => match plan.last_mut() {
                Some(invocation) => {
                    invocation
                        .params
                        .insert(key.to_string(), value.to_string());
                }
                None => return Err(ArmadaError::StrayParameter(word.clone())),
            },
            None => {
                let task = catalog
                    .get(word)
                    .cloned()
                    .ok_or_else(|| ArmadaError::TaskNotFound(word.clone()))?;
                plan.push(TaskInvocation {
                    task,
                    params: HashMap::new(),
                });
            }
        }
    }

    Ok(plan)
}

/// Print the task catalog and known environments.
fn print_list(catalog: &Catalog, task_file: Option<&Path>, registry: &HostRegistry) {
    match task_file {
        Some(path) => println!("{} (from {}):", "Tasks".bold(), path.display()),
        None => println!("{} (built-in):", "Tasks".bold()),
    }
    let mut names: Vec<&String> = catalog.keys().collect();
    names.sort();
    for name in names {
        match catalog.get(name).and_then(|t| t.description.as_deref()) {
            Some(desc) => println!("  {}  —  {}", name.cyan(), desc.dimmed()),
            None => println!("  {}", name.cyan()),
        }
    }

    println!("{}:", "Environments".bold());
    for (name, hosts) in registry.entries() {
        let list = if hosts.is_empty() {
            "(empty)".to_string()
        } else {
            hosts.join(", ")
        };
        println!("  {}: {}", name.cyan(), list);
    }
}

/// Emit shell completions for the given shell name.
fn generate_completions(shell: Option<&str>, command: &mut Command) -> Result<i32> {
    use clap_complete::{generate, Shell};

    let Some(shell) = shell.and_then(|s| s.parse::<Shell>().ok()) else {
        eprintln!("usage: armada completions <bash|zsh|fish|elvish|powershell>");
        return Ok(2);
    };
    generate(shell, command, "armada", &mut std::io::stdout());
    Ok(0)
}
