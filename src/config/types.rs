//! Core task model
//!
//! This module defines the in-memory representation that both grammar
//! front-ends normalize into: tasks, statements, conditions, and the sync
//! option bag.

use std::collections::HashMap;
use std::fmt;

/// A catalog of tasks keyed by name, as produced by the loader.
pub type Catalog = HashMap<String, Task>;

/// A named, parameterized sequence of statements.
///
/// Tasks are immutable after loading and shared read-only across all
/// concurrent target executions.
#[derive(Debug, Clone)]
pub struct Task {
    /// Task name, unique within its catalog
    pub name: String,

    /// One-line description (first `describe` in the body wins)
    pub description: Option<String>,

    /// Declared parameters with default values, in declaration order.
    /// Only the full grammar can declare these; compact tasks have none.
    pub params: Vec<Param>,

    /// Statement sequence, in declaration order
    pub body: Vec<Statement>,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Task {
            name: name.into(),
            description: None,
            params: Vec::new(),
            body: Vec::new(),
        }
    }
}

/// A declared task parameter with its default value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub default: String,
}

/// One DSL instruction.
///
/// Fields hold raw, pre-interpolation text; the verb executor interpolates
/// them when the statement runs. Missing positional fields load as empty
/// strings and are rejected at execution time, which keeps loading lenient
/// and scopes argument errors to the target they run on.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Run a command line through the target's shell
    Shell(String),

    /// Install or remove packages via the platform package manager
    Package { action: String, names: Vec<String> },

    /// Drive the platform init system for a named service
    Service { action: String, name: String },

    /// Create a directory (parents included), optionally applying a mode
    Directory { path: String, mode: Option<String> },

    /// Copy a local file to the target, optionally applying mode/ownership
    Copy {
        local: String,
        remote: String,
        mode: Option<String>,
        owner: Option<String>,
        group: Option<String>,
    },

    /// Synchronize a directory tree via rsync
    Sync(SyncOptions),

    /// Set task-local variables for subsequent statements
    Env(Vec<(String, String)>),

    /// Task description metadata; no effect at execution time
    Describe(String),

    /// Conditional branch; exactly one body runs
    If {
        condition: Condition,
        then_body: Vec<Statement>,
        else_body: Vec<Statement>,
    },

    /// Sequential iteration binding `var` to each item in turn
    For {
        var: String,
        items: Vec<String>,
        body: Vec<Statement>,
    },

    /// A line whose verb the loader did not recognize. Kept so the failure
    /// surfaces on the target that reaches it instead of aborting the load.
    Unknown { verb: String, line: String },
}

impl fmt::Display for Statement {
    /// Render a statement back into a source-like line, used when
    /// reporting which statement failed on a target.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Shell(text) => write!(f, "shell {text}"),
            Statement::Package { action, names } => {
                write!(f, "packages {action} {}", names.join(" "))
            }
            Statement::Service { action, name } => write!(f, "service {action} {name}"),
            Statement::Directory { path, mode } => {
                write!(f, "directory {path}")?;
                if let Some(mode) = mode {
                    write!(f, " mode={mode}")?;
                }
                Ok(())
            }
            Statement::Copy {
                local,
                remote,
                mode,
                owner,
                group,
            } => {
                write!(f, "copy {local} {remote}")?;
                if let Some(mode) = mode {
                    write!(f, " mode={mode}")?;
                }
                if let Some(owner) = owner {
                    write!(f, " user={owner}")?;
                }
                if let Some(group) = group {
                    write!(f, " group={group}")?;
                }
                Ok(())
            }
            Statement::Sync(opts) => {
                write!(f, "sync {{ src: \"{}\", dest: \"{}\" }}", opts.src, opts.dest)
            }
            Statement::Env(pairs) => {
                write!(f, "env")?;
                for (k, v) in pairs {
                    write!(f, " {k}={v}")?;
                }
                Ok(())
            }
            Statement::Describe(text) => write!(f, "describe {text}"),
            Statement::If { condition, .. } => write!(f, "if {condition}"),
            Statement::For { var, items, .. } => {
                write!(f, "for {var} in [{}]", items.join(", "))
            }
            Statement::Unknown { line, .. } => write!(f, "{line}"),
        }
    }
}

/// A condition in an `if` statement.
///
/// `CommandSucceeds` is not a pure predicate: evaluating it executes the
/// command on the current target, every time the condition is reached.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `$var == "literal"` / `$var != "literal"`
    VarEquals {
        var: String,
        negated: bool,
        literal: String,
    },

    /// `$var` — true iff the variable resolves to a non-empty string
    VarExists(String),

    /// `` `command` `` — true iff the command exits zero on the target
    CommandSucceeds(String),
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::VarEquals {
                var,
                negated,
                literal,
            } => {
                let op = if *negated { "!=" } else { "==" };
                write!(f, "${var} {op} \"{literal}\"")
            }
            Condition::VarExists(var) => write!(f, "${var}"),
            Condition::CommandSucceeds(cmd) => write!(f, "`{cmd}`"),
        }
    }
}

/// Options for the `sync` verb, validated when the statement executes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncOptions {
    pub src: String,
    pub dest: String,
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub excludes: Vec<String>,
    pub exclude_file: Option<String>,
    pub delete: bool,
    pub dry: bool,
    /// `-v` on the rsync command line; on unless explicitly disabled
    pub verbose: bool,
}

impl SyncOptions {
    pub fn new() -> Self {
        SyncOptions {
            verbose: true,
            ..Default::default()
        }
    }
}
