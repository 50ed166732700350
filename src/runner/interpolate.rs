//! Variable interpolation
//!
//! Replaces `$name` and `${name}` tokens with scope lookups. Substitution
//! is a single pass: values substituted in are never re-scanned, so
//! variable content cannot inject further substitution. Unresolved tokens
//! stay in the text verbatim.

use crate::runner::Scope;
use regex::Regex;
use std::sync::OnceLock;

fn var_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$(\w+)|\$\{(\w+)\}").unwrap())
}

/// Interpolate variables in a string against a scope.
pub fn interpolate(text: &str, scope: &Scope) -> String {
    var_pattern()
        .replace_all(text, |caps: &regex::Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match scope.lookup(name) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Interpolate each string of a list.
pub fn interpolate_list(items: &[String], scope: &Scope) -> Vec<String> {
    items.iter().map(|s| interpolate(s, scope)).collect()
}
