//! # Configuration Loading
//!
//! Layers configuration sources: built-in defaults, then a TOML file, then
//! environment variables, then validation.

use crate::{config::BenchConfig, Error, Result};
use std::{
    env,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

const CONFIG_NAMES: [&str; 2] = ["isucari.toml", "isucari-bench.toml"];

/// Configuration loader with file search paths and an env prefix.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
    explicit_file: Option<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    /// Create a loader searching `.`, `./config` and the user config dir.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = vec![PathBuf::from("."), PathBuf::from("./config")];
        if let Some(dir) = dirs::config_dir() {
            search_paths.push(dir.join("isucari"));
        }
        Self { search_paths, explicit_file: None, env_prefix: "ISUCARI".to_string() }
    }

    /// Add a search path for configuration files
    #[must_use]
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Use this file instead of searching; it must exist.
    #[must_use]
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.explicit_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the environment variable prefix
    #[must_use]
    pub fn with_env_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.env_prefix = prefix.as_ref().to_string();
        self
    }

    /// Load from defaults, file and the process environment.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if a file cannot be read or parsed, or
    /// if the merged configuration fails validation.
    pub fn load(&self) -> Result<BenchConfig> {
        self.load_with_env(env::vars())
    }

    /// Load using the given variables instead of the process environment.
    ///
    /// # Errors
    /// Same as [`ConfigLoader::load`].
    pub fn load_with_env<I>(&self, vars: I) -> Result<BenchConfig>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        info!("Loading benchmarker configuration");

        let mut config_value = toml::Value::try_from(BenchConfig::default()).map_err(|e| {
            Error::Configuration { message: format!("Failed to serialize default config: {e}") }
        })?;

        if let Some(path) = self.find_config_file()? {
            let file_config = Self::load_config_file(&path)?;
            config_value = Self::merge_config(config_value, file_config);
            info!("Loaded configuration file: {}", path.display());
        } else {
            debug!("No configuration file found in search paths");
        }

        let mut applied = 0usize;
        for (key, value) in vars {
            if let Some((section, field)) = self.env_key(&key) {
                Self::set_value(&mut config_value, &section, &field, &value);
                applied += 1;
            }
        }
        debug!("Applied {applied} environment overrides");

        let config: BenchConfig = config_value.try_into().map_err(|e| Error::Configuration {
            message: format!("Failed to deserialize config: {e}"),
        })?;
        config.validate()?;

        info!("Configuration loaded and validated");
        Ok(config)
    }

    /// Environment prefix in use.
    #[must_use]
    pub fn env_prefix(&self) -> &str {
        &self.env_prefix
    }

    fn find_config_file(&self) -> Result<Option<PathBuf>> {
        if let Some(path) = &self.explicit_file {
            if !path.exists() {
                return Err(Error::Configuration {
                    message: format!("Config file not found: {}", path.display()),
                });
            }
            return Ok(Some(path.clone()));
        }

        for search_path in &self.search_paths {
            for name in CONFIG_NAMES {
                let candidate = search_path.join(name);
                if candidate.exists() {
                    debug!("Found config file: {}", candidate.display());
                    return Ok(Some(candidate));
                }
            }
        }
        Ok(None)
    }

    fn load_config_file(path: &Path) -> Result<toml::Value> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Configuration {
            message: format!("Failed to read config file {}: {e}", path.display()),
        })?;
        content.parse::<toml::Value>().map_err(|e| Error::Configuration {
            message: format!("Failed to parse config file {}: {e}", path.display()),
        })
    }

    fn merge_config(mut base: toml::Value, override_value: toml::Value) -> toml::Value {
        if let (toml::Value::Table(base_table), toml::Value::Table(override_table)) =
            (&mut base, override_value)
        {
            for (key, value) in override_table {
                match base_table.get_mut(&key) {
                    Some(existing) if existing.is_table() && value.is_table() => {
                        *existing = Self::merge_config(existing.clone(), value);
                    },
                    Some(existing) => *existing = value,
                    None => {
                        base_table.insert(key, value);
                    },
                }
            }
        }
        base
    }

    /// `ISUCARI_TARGET_APP_URL` maps to (`target`, `app_url`).
    fn env_key(&self, key: &str) -> Option<(String, String)> {
        let rest = key.strip_prefix(&self.env_prefix)?.strip_prefix('_')?;
        let lower = rest.to_lowercase();
        let (section, field) = lower.split_once('_')?;
        if field.is_empty() {
            return None;
        }
        Some((section.to_string(), field.to_string()))
    }

    fn set_value(config: &mut toml::Value, section: &str, field: &str, value: &str) {
        if let toml::Value::Table(table) = config {
            let entry = table
                .entry(section.to_string())
                .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
            if let toml::Value::Table(section_table) = entry {
                section_table.insert(field.to_string(), Self::parse_env_value(value));
            }
        }
    }

    fn parse_env_value(value: &str) -> toml::Value {
        if let Ok(bool_val) = value.parse::<bool>() {
            return toml::Value::Boolean(bool_val);
        }
        if let Ok(int_val) = value.parse::<i64>() {
            return toml::Value::Integer(int_val);
        }
        toml::Value::String(value.to_string())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
