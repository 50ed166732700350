//! Layered variable environment
//!
//! Interpolation resolves names against four layers, innermost first:
//! loop bindings, task-local `env` assignments, invocation parameters, and
//! the process environment. The environment and parameter layers are fixed
//! once the scope is built; only the task-local map and the loop-binding
//! stack change while a task runs. One scope exists per (task, target)
//! execution and dies with it.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Scope {
    /// Process environment snapshot, outermost layer
    environ: HashMap<String, String>,

    /// Invocation parameters: declared defaults overlaid by caller-supplied
    /// key=value pairs. Immutable once bound.
    params: HashMap<String, String>,

    /// Task-local `env` assignments, in effect for subsequent statements
    locals: HashMap<String, String>,

    /// Loop-iteration bindings, innermost wins; a stack so nested loops
    /// shadow correctly
    bindings: Vec<(String, String)>,
}

impl Scope {
    /// Build a scope from the current process environment and the resolved
    /// invocation parameters.
    pub fn new(params: HashMap<String, String>) -> Self {
        Scope {
            environ: std::env::vars().collect(),
            params,
            locals: HashMap::new(),
            bindings: Vec::new(),
        }
    }

    /// Scope with an explicit environment layer instead of the process one.
    pub fn with_environ(
        environ: HashMap<String, String>,
        params: HashMap<String, String>,
    ) -> Self {
        Scope {
            environ,
            params,
            locals: HashMap::new(),
            bindings: Vec::new(),
        }
    }

    /// Look a name up, most specific layer first.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        if let Some((_, v)) = self.bindings.iter().rev().find(|(k, _)| k == name) {
            return Some(v);
        }
        self.locals
            .get(name)
            .or_else(|| self.params.get(name))
            .or_else(|| self.environ.get(name))
            .map(String::as_str)
    }

    /// Set a task-local variable (an `env` assignment).
    pub fn set_local(&mut self, key: String, value: String) {
        self.locals.insert(key, value);
    }

    /// The task-local layer, exported into child-process environments.
    pub fn locals(&self) -> &HashMap<String, String> {
        &self.locals
    }

    /// Push a loop binding; pair with `unbind` when the loop body finishes.
    pub fn bind(&mut self, name: String, value: String) {
        self.bindings.push((name, value));
    }

    /// Pop the innermost loop binding.
    pub fn unbind(&mut self) {
        self.bindings.pop();
    }
}
