//! Config file discovery and layered loading.
//!
//! 1. Parse the embedded `defaults.toml`.
//! 2. Merge the user file (`~/.config/webfunc/config.toml` on Linux), if present.
//! 3. Merge the explicitly requested file, which must exist.
//! 4. Apply `WEBFUNC_*` environment overrides.
//! 5. Deserialize and validate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_overrides, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: usize = 1_048_576;

/// A loaded configuration and where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The validated configuration.
    pub config: Config,
    /// Files merged over the defaults, in order.
    pub loaded_files: Vec<PathBuf>,
    /// Number of fields set from the environment.
    pub env_overrides: usize,
}

/// Builder for the layered load.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    user_file: Option<PathBuf>,
    explicit_file: Option<PathBuf>,
    env: HashMap<String, String>,
}

impl ConfigLoader {
    /// A loader that sees only the embedded defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A loader using the user config path and the process environment.
    #[must_use]
    pub fn from_environment() -> Self {
        Self {
            user_file: user_config_path(),
            explicit_file: None,
            env: collect_env_vars(),
        }
    }

    /// Merge `path` as the user layer if it exists.
    #[must_use]
    pub fn with_user_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.user_file = Some(path.into());
        self
    }

    /// Merge `path` over the user layer. The file must exist.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    /// Use `env` as the override variables.
    #[must_use]
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Run the layered load.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a file is unreadable or malformed, an
    /// override does not parse, or the result fails validation.
    pub fn load(&self) -> ConfigResult<LoadedConfig> {
        let mut merged: toml::Value =
            toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
                path: "<embedded defaults>".to_owned(),
                source: e,
            })?;
        let mut loaded_files = Vec::new();

        if let Some(path) = &self.user_file
            && let Some(overlay) = try_load_file(path)?
        {
            deep_merge(&mut merged, &overlay);
            info!(path = %path.display(), "loaded user config");
            loaded_files.push(path.clone());
        }

        if let Some(path) = &self.explicit_file {
            let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
                path: path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            })?;
            deep_merge(&mut merged, &overlay);
            info!(path = %path.display(), "loaded config file");
            loaded_files.push(path.clone());
        }

        let env_overrides = apply_env_overrides(&mut merged, &self.env)?;
        if env_overrides > 0 {
            debug!(count = env_overrides, "applied environment overrides");
        }

        let config: Config =
            merged
                .try_into()
                .map_err(|e: toml::de::Error| ConfigError::ParseError {
                    path: "<merged config>".to_owned(),
                    source: e,
                })?;
        validate::validate(&config)?;

        Ok(LoadedConfig {
            config,
            loaded_files,
            env_overrides,
        })
    }
}

/// Load a single file over the defaults, without user layer or environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    ConfigLoader::new().with_file(path).load().map(|l| l.config)
}

/// The per-user config file location, if a home directory is known.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "webfunc").map(|d| d.config_dir().join("config.toml"))
}

/// Read and parse `path`, returning `None` if it does not exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }

    let value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(Some(value))
}

/// Merge `overlay` into `base`: tables per key, everything else replaces.
fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                match base_table.get_mut(key) {
                    Some(base_val) => deep_merge(base_val, overlay_val),
                    None => {
                        base_table.insert(key.clone(), overlay_val.clone());
                    },
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
        },
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn defaults_match_types() {
        let from_toml: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert_eq!(from_toml, Config::default());
    }

    #[test]
    fn defaults_only() {
        let loaded = ConfigLoader::new().load().unwrap();
        assert_eq!(loaded.config, Config::default());
        assert!(loaded.loaded_files.is_empty());
        assert_eq!(loaded.env_overrides, 0);
    }

    #[test]
    fn missing_user_file_is_skipped() {
        let loaded = ConfigLoader::new()
            .with_user_file("/nonexistent/webfunc/config.toml")
            .load()
            .unwrap();
        assert!(loaded.loaded_files.is_empty());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn layers_apply_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let user = write_file(
            &dir,
            "user.toml",
            "[server]\nbind_addr = \"127.0.0.1:7000\"\n[sandbox]\ntimeout_ms = 5000\n",
        );
        let explicit = write_file(&dir, "explicit.toml", "[sandbox]\ntimeout_ms = 100\n");

        let loaded = ConfigLoader::new()
            .with_user_file(&user)
            .with_file(&explicit)
            .with_env(HashMap::from([(
                "WEBFUNC_MOUNT_PATH".to_owned(),
                "/srv/fn".to_owned(),
            )]))
            .load()
            .unwrap();

        let config = loaded.config;
        assert_eq!(config.server.bind_addr, "127.0.0.1:7000");
        assert_eq!(config.sandbox.timeout_ms, 100);
        assert_eq!(config.sandbox.mount_path, "/srv/fn");
        assert_eq!(config.sandbox.entrypoint, "handle");
        assert_eq!(loaded.loaded_files, vec![user, explicit]);
        assert_eq!(loaded.env_overrides, 1);
    }

    #[test]
    fn environment_wins_over_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(&dir, "c.toml", "[logging]\nlevel = \"warn\"\n");
        let loaded = ConfigLoader::new()
            .with_file(&file)
            .with_env(HashMap::from([(
                "WEBFUNC_LOG_LEVEL".to_owned(),
                "debug".to_owned(),
            )]))
            .load()
            .unwrap();
        assert_eq!(loaded.config.logging.level, "debug");
    }

    #[test]
    fn module_path_from_environment() {
        let loaded = ConfigLoader::new()
            .with_env(HashMap::from([(
                "WEBFUNC_MODULE".to_owned(),
                "/opt/fn/handler.wasm".to_owned(),
            )]))
            .load()
            .unwrap();
        assert_eq!(
            loaded.config.sandbox.module,
            Some(PathBuf::from("/opt/fn/handler.wasm"))
        );
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(&dir, "bad.toml", "[server\nbind_addr = 1");
        let err = load_file(&file).unwrap_err();
        match err {
            ConfigError::ParseError { path, .. } => assert!(path.ends_with("bad.toml")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn invalid_merged_value_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(&dir, "c.toml", "[sandbox]\nmount_path = \"relative\"\n");
        let err = load_file(&file).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "sandbox.mount_path"));
    }

    #[test]
    fn oversized_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let data = "x = \"".to_owned() + &"a".repeat(1_100_000) + "\"";
        let file = write_file(&dir, "huge.toml", &data);
        let result = try_load_file(&file);
        assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
    }

    #[test]
    fn deep_merge_keeps_unset_keys() {
        let mut base: toml::Value = toml::from_str("[a]\nx = 1\ny = 2\n").unwrap();
        let overlay: toml::Value = toml::from_str("[a]\ny = 3\n[b]\nz = 4\n").unwrap();
        deep_merge(&mut base, &overlay);
        assert_eq!(base["a"]["x"].as_integer(), Some(1));
        assert_eq!(base["a"]["y"].as_integer(), Some(3));
        assert_eq!(base["b"]["z"].as_integer(), Some(4));
    }
}
