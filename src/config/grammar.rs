//! Full task grammar
//!
//! The richer front-end for `.afx` files: quoted literal values,
//! parameterized task headers (`task deploy(port="9443")`), `if`/`else`
//! blocks with expression-like conditions, `for` loops over arrays, and
//! `sync { key: value, ... }` blocks. Everything normalizes into the same
//! statement model the compact grammar produces; execution logic is shared.

use crate::config::loader::parse_statement_line;
use crate::config::types::{Catalog, Condition, Param, Statement, SyncOptions, Task};
use crate::error::{ParseError, ParseResult};

/// Parse full-grammar source into a catalog.
pub fn parse_full(text: &str) -> ParseResult<Catalog> {
    let lines: Vec<&str> = text.lines().collect();
    let mut catalog = Catalog::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i].trim();
        if line.is_empty() || line.starts_with('#') {
            i += 1;
            continue;
        }
        if line == "task" || line.starts_with("task ") {
            let (name, params) = parse_task_header(line, i + 1)?;
            i += 1;
            let (body, _) = parse_block(&lines, &mut i, false)?;
            let mut task = Task::new(name);
            task.params = params;
            task.description = body.iter().find_map(|s| match s {
                Statement::Describe(d) => Some(d.clone()),
                _ => None,
            });
            task.body = body;
            catalog.insert(task.name.clone(), task);
            continue;
        }
        if line == "end" || line == "else" {
            return Err(ParseError::UnmatchedEnd {
                found: line.to_string(),
                line: i + 1,
            });
        }
        // Stray lines between tasks are ignored, as in the compact grammar.
        i += 1;
    }

    Ok(catalog)
}

/// Parse `task name` or `task name(p="v", q="w")`.
fn parse_task_header(line: &str, line_no: usize) -> ParseResult<(String, Vec<Param>)> {
    let rest = line[4..].trim();
    if rest.is_empty() {
        return Err(ParseError::MissingTaskName { line: line_no });
    }

    let Some(open) = rest.find('(') else {
        return Ok((rest.to_string(), Vec::new()));
    };
    let name = rest[..open].trim();
    if name.is_empty() {
        return Err(ParseError::MissingTaskName { line: line_no });
    }
    let Some(close) = rest.rfind(')') else {
        return Err(ParseError::BadTaskHeader(format!(
            "unclosed parameter list in '{line}'"
        )));
    };

    let mut params = Vec::new();
    for part in split_top_level(&rest[open + 1..close]) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let Some((pname, pval)) = part.split_once('=') else {
            return Err(ParseError::BadTaskHeader(format!(
                "parameter '{part}' is missing a default value"
            )));
        };
        params.push(Param {
            name: pname.trim().to_string(),
            default: unquote(pval.trim()),
        });
    }
    Ok((name.to_string(), params))
}

/// Parse statements until the block's `end` (or `else`, when inside an
/// `if`). Input running out is accepted permissively, and a new `task`
/// header unwinds without being consumed so the dangling task keeps what
/// it collected.
fn parse_block(
    lines: &[&str],
    i: &mut usize,
    allow_else: bool,
) -> ParseResult<(Vec<Statement>, Option<&'static str>)> {
    let mut body = Vec::new();

    while *i < lines.len() {
        let line = lines[*i].trim();
        if line.is_empty() || line.starts_with('#') {
            *i += 1;
            continue;
        }
        if line == "end" {
            *i += 1;
            return Ok((body, Some("end")));
        }
        if line == "else" && allow_else {
            *i += 1;
            return Ok((body, Some("else")));
        }
        if line == "task" || line.starts_with("task ") {
            return Ok((body, None));
        }
        if let Some(rest) = line.strip_prefix("if ") {
            let condition = parse_condition(rest.trim())?;
            *i += 1;
            let (then_body, term) = parse_block(lines, i, true)?;
            let else_body = if term == Some("else") {
                let (eb, _) = parse_block(lines, i, false)?;
                eb
            } else {
                Vec::new()
            };
            body.push(Statement::If {
                condition,
                then_body,
                else_body,
            });
            continue;
        }
        if let Some(rest) = line.strip_prefix("for ") {
            let (var, items) = parse_for_header(rest.trim())?;
            *i += 1;
            let (loop_body, _) = parse_block(lines, i, false)?;
            body.push(Statement::For {
                var,
                items,
                body: loop_body,
            });
            continue;
        }
        if line == "sync" || line.starts_with("sync ") || line.starts_with("sync{") {
            let block = collect_braced(lines, i)?;
            body.push(Statement::Sync(parse_sync_options(&block)?));
            continue;
        }
        body.push(parse_statement_line(line));
        *i += 1;
    }

    Ok((body, None))
}

/// Parse an `if` condition: `$var == "lit"`, `$var != "lit"`, `$var`, or
/// `` `command` ``.
pub fn parse_condition(text: &str) -> ParseResult<Condition> {
    if let Some(inner) = text.strip_prefix('`') {
        let Some(cmd) = inner.strip_suffix('`') else {
            return Err(ParseError::BadCondition(format!(
                "unterminated command condition: {text}"
            )));
        };
        return Ok(Condition::CommandSucceeds(cmd.trim().to_string()));
    }

    let Some(rest) = text.strip_prefix('$') else {
        return Err(ParseError::BadCondition(text.to_string()));
    };
    let rest = rest.strip_prefix('{').unwrap_or(rest);
    let var_end = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    let var = &rest[..var_end];
    if var.is_empty() {
        return Err(ParseError::BadCondition(text.to_string()));
    }
    let tail = rest[var_end..].trim_start_matches('}').trim();

    if tail.is_empty() {
        return Ok(Condition::VarExists(var.to_string()));
    }
    let (negated, lit) = if let Some(l) = tail.strip_prefix("==") {
        (false, l)
    } else if let Some(l) = tail.strip_prefix("!=") {
        (true, l)
    } else {
        return Err(ParseError::BadCondition(text.to_string()));
    };
    Ok(Condition::VarEquals {
        var: var.to_string(),
        negated,
        literal: unquote(lit.trim()),
    })
}

/// Parse `for VAR in ["a", "b", ...]`.
fn parse_for_header(text: &str) -> ParseResult<(String, Vec<String>)> {
    let Some((var, rest)) = text.split_once(" in ") else {
        return Err(ParseError::BadCondition(format!("malformed for loop: {text}")));
    };
    let var = var.trim().trim_start_matches('$').to_string();
    let rest = rest.trim();
    let inner = rest
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .ok_or_else(|| ParseError::BadCondition(format!("for loop needs an array: {text}")))?;
    let items = split_top_level(inner)
        .into_iter()
        .map(|s| unquote(s.trim()))
        .filter(|s| !s.is_empty())
        .collect();
    Ok((var, items))
}

/// Collect the text between a `sync` statement's braces, which may span
/// multiple lines. Leaves the cursor past the closing brace's line.
fn collect_braced(lines: &[&str], i: &mut usize) -> ParseResult<String> {
    let mut collected = String::new();
    let mut depth = 0usize;
    let mut seen_open = false;

    while *i < lines.len() {
        let line = lines[*i].trim();
        *i += 1;
        for c in line.chars() {
            match c {
                '{' => {
                    if seen_open {
                        collected.push(c);
                    }
                    seen_open = true;
                    depth += 1;
                }
                '}' => {
                    if !seen_open {
                        return Err(ParseError::BadSyncBlock(
                            "'}' before '{'".to_string(),
                        ));
                    }
                    depth -= 1;
                    if depth == 0 {
                        return Ok(collected);
                    }
                    collected.push(c);
                }
                _ => {
                    if seen_open {
                        collected.push(c);
                    }
                }
            }
        }
        if seen_open {
            collected.push(' ');
        }
    }

    Err(ParseError::BadSyncBlock("unterminated sync block".to_string()))
}

/// Parse the inside of a `sync { ... }` block into typed options.
///
/// Keys: `src`, `dest`, `host`, `user`, `port`, `excludes`, `exclude_file`,
/// plus the flags `delete`, `dry`, `verbose` (bare or `key: true/false`).
/// An unknown key is rejected here, once, instead of at every execution.
fn parse_sync_options(block: &str) -> ParseResult<SyncOptions> {
    let mut opts = SyncOptions::new();

    for entry in split_top_level(block) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key, value) = match entry.split_once(':') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (entry, None),
        };
        match key {
            "src" => opts.src = unquote(value.unwrap_or_default()),
            "dest" => opts.dest = unquote(value.unwrap_or_default()),
            "host" => opts.host = Some(unquote(value.unwrap_or_default())),
            "user" => opts.user = Some(unquote(value.unwrap_or_default())),
            "port" => {
                let raw = unquote(value.unwrap_or_default());
                let port = raw.parse::<u16>().map_err(|_| {
                    ParseError::BadSyncBlock(format!("bad port '{raw}'"))
                })?;
                opts.port = Some(port);
            }
            "excludes" => {
                let raw = value.unwrap_or_default();
                let inner = raw
                    .strip_prefix('[')
                    .and_then(|r| r.strip_suffix(']'))
                    .ok_or_else(|| {
                        ParseError::BadSyncBlock(format!("excludes needs an array: {raw}"))
                    })?;
                opts.excludes = split_top_level(inner)
                    .into_iter()
                    .map(|s| unquote(s.trim()))
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            "exclude_file" => opts.exclude_file = Some(unquote(value.unwrap_or_default())),
            "delete" => opts.delete = parse_flag(value),
            "dry" => opts.dry = parse_flag(value),
            "verbose" => opts.verbose = parse_flag(value),
            _ => {
                return Err(ParseError::BadSyncBlock(format!("unknown key '{key}'")));
            }
        }
    }

    Ok(opts)
}

fn parse_flag(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => matches!(unquote(v).as_str(), "true" | "yes" | "on" | "1"),
    }
}

/// Split on commas that are not inside quotes or brackets.
fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_quote: Option<char> = None;

    for c in text.chars() {
        match c {
            '"' | '\'' => {
                match in_quote {
                    Some(q) if q == c => in_quote = None,
                    None => in_quote = Some(c),
                    _ => {}
                }
                current.push(c);
            }
            '[' | '(' if in_quote.is_none() => {
                depth += 1;
                current.push(c);
            }
            ']' | ')' if in_quote.is_none() => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if in_quote.is_none() && depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

/// Strip one layer of matching quotes.
fn unquote(text: &str) -> String {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return text[1..text.len() - 1].to_string();
        }
    }
    text.to_string()
}
