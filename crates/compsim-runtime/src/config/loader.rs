//! Layered configuration loading.
//!
//! # Load Order
//!
//! 1. Defaults
//! 2. Global config (`~/.compsim/config.toml`)
//! 3. Explicit config file
//! 4. Environment variables (`COMPSIM_*`)
//!
//! Each layer overrides the previous. Missing files are skipped.

use super::{default_config_path, ConfigError, SimConfig};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration loader with builder pattern.
///
/// # Example
///
/// ```no_run
/// use compsim_runtime::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_file("compsim.toml")
///     .skip_env_vars()
///     .load()?;
/// # Ok::<(), compsim_runtime::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    global_config_path: Option<PathBuf>,
    file: Option<PathBuf>,
    skip_env: bool,
    skip_global: bool,
}

impl ConfigLoader {
    /// Loader with every layer enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the global config path.
    #[must_use]
    pub fn with_global_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Adds an explicit config file layered over the global one.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Skips environment variables. Useful for deterministic tests.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Skips the global config file.
    #[must_use]
    pub fn skip_global_config(mut self) -> Self {
        self.skip_global = true;
        self
    }

    /// Loads and merges every enabled layer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a config file exists but cannot be read
    /// or parsed, or an environment variable has an invalid value.
    pub fn load(&self) -> Result<SimConfig, ConfigError> {
        let mut config = SimConfig::default();

        if !self.skip_global {
            let path = self
                .global_config_path
                .clone()
                .unwrap_or_else(default_config_path);
            if let Some(global) = load_file(&path)? {
                debug!(path = %path.display(), "loaded global config");
                config.merge(&global);
            }
        }

        if let Some(path) = &self.file {
            if let Some(explicit) = load_file(path)? {
                debug!(path = %path.display(), "loaded config file");
                config.merge(&explicit);
            }
        }

        if !self.skip_env {
            apply_env(&mut config, |name| std::env::var(name).ok())?;
        }

        Ok(config)
    }
}

fn load_file(path: &Path) -> Result<Option<SimConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    SimConfig::from_toml(&content)
        .map(Some)
        .map_err(|e| ConfigError::parse_toml(path, e))
}

fn apply_env<F>(config: &mut SimConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("COMPSIM_DEBUG") {
        config.debug = parse_bool(&val)
            .ok_or_else(|| ConfigError::invalid_env_var("COMPSIM_DEBUG", "expected bool"))?;
    }
    if let Some(val) = lookup("COMPSIM_ROOT") {
        config.storage.root = PathBuf::from(val);
    }
    if let Some(val) = lookup("COMPSIM_TICK_MS") {
        config.scheduler.tick_ms = val
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid_env_var("COMPSIM_TICK_MS", "expected integer"))?;
    }
    if let Some(val) = lookup("COMPSIM_BOOT_SCRIPT") {
        config.boot.script = val;
    }
    Ok(())
}

/// Accepts "true", "false", "1", "0", "yes", "no", "on", "off" (case-insensitive).
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn write_config(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).expect("write config");
        path
    }

    #[test]
    fn defaults_only() {
        let config = ConfigLoader::new()
            .skip_global_config()
            .skip_env_vars()
            .load()
            .expect("load");
        assert_eq!(config, SimConfig::default());
    }

    #[test]
    fn explicit_file_overrides_global() {
        let temp = TempDir::new().expect("temp dir");
        let global = write_config(
            temp.path(),
            "global.toml",
            "debug = true\n[scheduler]\ntick_ms = 10\n[boot]\nmachines = [\"g\"]\n",
        );
        let explicit = write_config(temp.path(), "explicit.toml", "[scheduler]\ntick_ms = 25\n");

        let config = ConfigLoader::new()
            .with_global_config(&global)
            .with_file(&explicit)
            .skip_env_vars()
            .load()
            .expect("load");

        assert!(config.debug);
        assert_eq!(config.scheduler.tick_ms, 25);
        assert_eq!(config.boot.machines, vec!["g"]);
    }

    #[test]
    fn missing_files_are_skipped() {
        let config = ConfigLoader::new()
            .with_global_config("/nonexistent/compsim/config.toml")
            .with_file("/nonexistent/compsim/other.toml")
            .skip_env_vars()
            .load()
            .expect("load");
        assert_eq!(config, SimConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = TempDir::new().expect("temp dir");
        let bad = write_config(temp.path(), "bad.toml", "[scheduler\n");
        let err = ConfigLoader::new()
            .skip_global_config()
            .with_file(&bad)
            .skip_env_vars()
            .load()
            .expect_err("malformed");
        assert!(matches!(err, ConfigError::ParseToml { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("COMPSIM_DEBUG", "yes"),
            ("COMPSIM_ROOT", "/srv/compsim"),
            ("COMPSIM_TICK_MS", "7"),
            ("COMPSIM_BOOT_SCRIPT", "/init.lua"),
        ]
        .into_iter()
        .collect();
        let mut config = SimConfig::default();
        apply_env(&mut config, |name| vars.get(name).map(|v| (*v).to_string()))
            .expect("apply env");
        assert!(config.debug);
        assert_eq!(config.storage.root, PathBuf::from("/srv/compsim"));
        assert_eq!(config.scheduler.tick_ms, 7);
        assert_eq!(config.boot.script, "/init.lua");
    }

    #[test]
    fn invalid_env_value_is_reported() {
        let mut config = SimConfig::default();
        let err = apply_env(&mut config, |name| {
            (name == "COMPSIM_TICK_MS").then(|| "soon".to_string())
        })
        .expect_err("invalid");
        assert!(matches!(err, ConfigError::InvalidEnvVar { ref name, .. } if name == "COMPSIM_TICK_MS"));
    }

    #[test]
    fn parse_bool_values() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("Off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
