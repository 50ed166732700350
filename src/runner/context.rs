//! Per-target execution context
//!
//! Tracks the target, privilege-elevation settings, and the output prefix
//! used to keep concurrently interleaved lines attributable. All output
//! helpers emit whole lines, so lines from different workers never mix.

use crate::config::hosts::{ResolvedTarget, Target};
use colored::Colorize;

/// Per-target execution state, immutable for the duration of one
/// dispatcher run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// The execution endpoint
    pub target: Target,

    /// Run commands through sudo
    pub sudo: bool,

    /// Identity to elevate to (implies plain root sudo when unset)
    pub sudo_user: Option<String>,

    /// Output-line prefix, the target's display name
    pub prefix: String,
}

impl ExecutionContext {
    pub fn new(resolved: &ResolvedTarget, sudo: bool, sudo_user: Option<String>) -> Self {
        ExecutionContext {
            target: resolved.target.clone(),
            sudo,
            sudo_user,
            prefix: format!("[{}]", resolved.spec),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.target, Target::Local)
    }

    /// Print one prefixed output line.
    pub fn say(&self, line: &str) {
        println!("{} {}", self.prefix.cyan(), line);
    }

    /// Echo a command line about to run.
    pub fn say_command(&self, display: &str) {
        println!("{}$ {}", self.prefix.cyan(), display);
    }

    /// Announce a task starting on this target.
    pub fn say_task(&self, name: &str) {
        println!("{} --> {}", self.prefix.cyan(), name.bold());
    }

    /// Print one prefixed error line to stderr.
    pub fn say_error(&self, message: &str) {
        eprintln!("{} {}", self.prefix.cyan(), message.red());
    }
}
