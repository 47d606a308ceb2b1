//! `WEBFUNC_*` environment overrides.
//!
//! Overrides are applied to the merged TOML tree after every file layer, so
//! they win over all files.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// How an override is typed in the tree.
#[derive(Debug, Clone, Copy)]
enum Kind {
    String,
    Integer,
}

/// Environment variable name, dotted field path, value kind.
const ENV_OVERRIDES: &[(&str, &str, Kind)] = &[
    ("WEBFUNC_BIND_ADDR", "server.bind_addr", Kind::String),
    ("WEBFUNC_MODULE", "sandbox.module", Kind::String),
    ("WEBFUNC_MOUNT_PATH", "sandbox.mount_path", Kind::String),
    ("WEBFUNC_TIMEOUT_MS", "sandbox.timeout_ms", Kind::Integer),
    ("WEBFUNC_LOG_LEVEL", "logging.level", Kind::String),
];

/// Names of every recognized override variable.
#[must_use]
pub fn override_vars() -> Vec<&'static str> {
    ENV_OVERRIDES.iter().map(|(name, _, _)| *name).collect()
}

/// Snapshot the override variables present in the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    ENV_OVERRIDES
        .iter()
        .filter_map(|(name, _, _)| std::env::var(name).ok().map(|v| ((*name).to_owned(), v)))
        .collect()
}

/// Apply the overrides in `env` to `tree`. Empty values are ignored.
///
/// Returns the number of fields overridden.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] if an integer override does not parse.
pub fn apply_env_overrides(
    tree: &mut toml::Value,
    env: &HashMap<String, String>,
) -> ConfigResult<usize> {
    let mut applied = 0usize;
    for (var_name, field_path, kind) in ENV_OVERRIDES {
        let Some(raw) = env.get(*var_name).map(|v| v.trim()).filter(|v| !v.is_empty()) else {
            continue;
        };
        let value = match kind {
            Kind::String => toml::Value::String(raw.to_owned()),
            Kind::Integer => {
                let parsed: i64 = raw.parse().map_err(|e| ConfigError::EnvError {
                    var_name: (*var_name).to_owned(),
                    message: format!("expected an integer, got '{raw}': {e}"),
                })?;
                toml::Value::Integer(parsed)
            },
        };
        let segments: Vec<&str> = field_path.split('.').collect();
        set_path(tree, &segments, value);
        debug!(var = var_name, field = field_path, "applied environment override");
        applied = applied.saturating_add(1);
    }
    Ok(applied)
}

/// Set the field at `path` in `tree`, creating intermediate tables.
fn set_path(tree: &mut toml::Value, path: &[&str], value: toml::Value) {
    let Some((first, rest)) = path.split_first() else {
        *tree = value;
        return;
    };
    if !tree.is_table() {
        *tree = toml::Value::Table(toml::map::Map::new());
    }
    if let toml::Value::Table(table) = tree {
        let child = table
            .entry((*first).to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
        set_path(child, rest, value);
    }
}
