//! Condition evaluation
//!
//! The three `if` condition forms. Variable comparisons read the scope
//! (an absent variable compares as the empty string); existence means
//! a non-empty value. A backquoted command condition is NOT a pure
//! predicate: it interpolates and runs the command on the current target
//! through the same shell path the `shell` verb uses, every time the
//! condition is reached — inside a loop that means once per iteration.

use crate::config::types::Condition;
use crate::error::ExecResult;
use crate::runner::interpolate::interpolate;
use crate::runner::transport::Transport;
use crate::runner::{verb, ExecutionContext, Scope};

/// Evaluate one condition against the current scope and target.
pub fn evaluate(
    cond: &Condition,
    ctx: &ExecutionContext,
    scope: &Scope,
    transport: &mut dyn Transport,
) -> ExecResult<bool> {
    match cond {
        Condition::VarEquals {
            var,
            negated,
            literal,
        } => {
            let actual = scope.lookup(var).unwrap_or("");
            let equal = actual == literal;
            Ok(if *negated { !equal } else { equal })
        }

        Condition::VarExists(var) => {
            Ok(scope.lookup(var).is_some_and(|v| !v.is_empty()))
        }

        Condition::CommandSucceeds(text) => {
            let command = interpolate(text, scope);
            let rc = verb::run_shell(&command, ctx, scope, transport)?;
            Ok(rc == 0)
        }
    }
}
