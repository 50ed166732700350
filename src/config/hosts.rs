//! Target resolution
//!
//! Maps symbolic environment names and ad-hoc host specs onto the list of
//! targets a run fans out over. The environment registry is a YAML file
//! (`hosts.yml`) looked up beside the task file, then in the user config
//! directory; a missing registry leaves only the built-in `local` entry.

use crate::error::{HostError, HostResult};
use colored::Colorize;
use directories::ProjectDirs;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Registry file name, searched beside the task file
const REGISTRY_FILE: &str = "hosts.yml";

/// Host spec naming the local machine
pub const LOCAL_SPEC: &str = "@local";

/// An execution endpoint for a task run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Local,
    Remote {
        user: Option<String>,
        host: String,
        port: u16,
    },
}

/// A target paired with the spec string it was resolved from, used as its
/// display name in prefixed output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub spec: String,
    pub target: Target,
}

impl fmt::Display for ResolvedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spec)
    }
}

/// On-disk registry shape: environment name to host list (either a YAML
/// sequence or a comma-separated string).
#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    environments: HashMap<String, HostsEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HostsEntry {
    One(String),
    Many(Vec<String>),
}

/// Environment-name to host-list table, immutable once built and threaded
/// through target resolution.
#[derive(Debug, Clone)]
pub struct HostRegistry {
    environments: HashMap<String, Vec<String>>,
}

impl HostRegistry {
    /// Registry with only the built-in `local` environment.
    pub fn builtin() -> Self {
        let mut environments = HashMap::new();
        environments.insert("local".to_string(), vec![LOCAL_SPEC.to_string()]);
        HostRegistry { environments }
    }

    /// Load the registry, layering the first file found over the built-in
    /// entries. Search order: beside the task file, then the user config
    /// directory.
    pub fn load(task_file_dir: Option<&Path>) -> HostResult<Self> {
        let mut registry = Self::builtin();

        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(dir) = task_file_dir {
            candidates.push(dir.join(REGISTRY_FILE));
        }
        if let Some(dirs) = ProjectDirs::from("", "", "armada") {
            candidates.push(dirs.config_dir().join(REGISTRY_FILE));
        }

        for path in candidates {
            if !path.is_file() {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|e| HostError::Registry {
                path: path.clone(),
                error: e.to_string(),
            })?;
            let file: RegistryFile =
                serde_yaml::from_str(&text).map_err(|e| HostError::Registry {
                    path: path.clone(),
                    error: e.to_string(),
                })?;
            for (name, entry) in file.environments {
                registry.environments.insert(name, normalize_entry(entry));
            }
            break;
        }

        Ok(registry)
    }

    /// Host specs for a named environment.
    pub fn environment(&self, name: &str) -> Option<&[String]> {
        self.environments.get(name).map(Vec::as_slice)
    }

    /// Environment names with their host lists, sorted by name.
    pub fn entries(&self) -> Vec<(&String, &Vec<String>)> {
        let mut entries: Vec<_> = self.environments.iter().collect();
        entries.sort_by_key(|(name, _)| name.clone());
        entries
    }
}

fn normalize_entry(entry: HostsEntry) -> Vec<String> {
    match entry {
        HostsEntry::One(s) => split_host_list(&s),
        HostsEntry::Many(items) => items.iter().flat_map(|s| split_host_list(s)).collect(),
    }
}

/// Split a comma-separated host list, dropping empty pieces.
pub fn split_host_list(spec: &str) -> Vec<String> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Resolve environment names plus ad-hoc specs into a deduplicated,
/// order-preserving target list. An unknown environment name is a warning
/// and is skipped. No targets at all resolves to the local machine.
pub fn resolve_targets(
    registry: &HostRegistry,
    env_names: &[String],
    host_specs: &[String],
    default_user: Option<&str>,
    default_port: Option<u16>,
) -> HostResult<Vec<ResolvedTarget>> {
    let mut merged: Vec<String> = Vec::new();
    for name in env_names {
        match registry.environment(name) {
            Some(hosts) => merged.extend(hosts.iter().cloned()),
            None => {
                eprintln!(
                    "{} environment '{}' not in the host registry, skipping",
                    "[warn]".yellow(),
                    name
                );
            }
        }
    }
    for spec in host_specs {
        merged.extend(split_host_list(spec));
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for spec in merged {
        if seen.insert(spec.clone()) {
            out.push(parse_host_spec(&spec, default_user, default_port)?);
        }
    }
    if out.is_empty() {
        out.push(parse_host_spec(LOCAL_SPEC, default_user, default_port)?);
    }
    Ok(out)
}

/// Parse one host spec: `@local`, or `[user@]host[:port]`.
pub fn parse_host_spec(
    spec: &str,
    default_user: Option<&str>,
    default_port: Option<u16>,
) -> HostResult<ResolvedTarget> {
    if spec == LOCAL_SPEC {
        return Ok(ResolvedTarget {
            spec: spec.to_string(),
            target: Target::Local,
        });
    }

    let mut user = default_user.map(String::from);
    let mut rest = spec;
    if let Some((u, h)) = rest.split_once('@') {
        if !u.is_empty() {
            user = Some(u.to_string());
        }
        rest = h;
    }

    let mut port = default_port.unwrap_or(22);
    let host = match rest.split_once(':') {
        Some((h, p)) => {
            port = p
                .parse::<u16>()
                .map_err(|_| HostError::BadPort(spec.to_string()))?;
            h
        }
        None => rest,
    };
    if host.is_empty() {
        return Err(HostError::BadSpec(spec.to_string()));
    }

    Ok(ResolvedTarget {
        spec: spec.to_string(),
        target: Target::Remote {
            user,
            host: host.to_string(),
            port,
        },
    })
}
