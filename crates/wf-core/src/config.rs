//! Project configuration (`wharf.yml`)
//!
//! The `database` section is kept as raw YAML until an environment is chosen;
//! the per-environment override is merged over it key by key and the result
//! is sanitized into an immutable [`DatabaseConfig`].

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::path::Path;
use wf_db::Dialect;

/// Environment used when neither the CLI nor `WHARF_ENV` names one
pub const DEFAULT_ENV: &str = "development";

/// Project configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Base database settings (validated lazily, see [`Config::database_config`])
    #[serde(default)]
    pub database: Option<Value>,

    /// Named environment overrides (e.g. development, test, production)
    #[serde(default)]
    pub environments: HashMap<String, EnvironmentConfig>,
}

/// Environment-specific overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Keys merged over the base `database` section
    #[serde(default)]
    pub database: Option<Value>,
}

/// Sanitized database settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseConfig {
    pub enabled: bool,
    pub dialect: Dialect,
    /// Store file name (embedded dialect) or server URL
    pub connection: String,
    pub ssl: bool,
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a project directory
    /// Looks for wharf.yml or wharf.yaml
    pub fn load_from_dir(dir: &Path) -> ConfigResult<Self> {
        let yml_path = dir.join("wharf.yml");
        let yaml_path = dir.join("wharf.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(ConfigError::NotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Get the sanitized database configuration for `env`.
    ///
    /// Environments without an override entry use the base section as is.
    pub fn database_config(&self, env: &str) -> ConfigResult<DatabaseConfig> {
        let mut merged = match &self.database {
            Some(Value::Mapping(map)) => map.clone(),
            Some(Value::Null) | None => Mapping::new(),
            Some(_) => {
                return Err(ConfigError::InvalidDatabase {
                    message: "\"database\" must be of type object".to_string(),
                })
            }
        };

        if let Some(Value::Mapping(overrides)) = self
            .environments
            .get(env)
            .and_then(|e| e.database.as_ref())
        {
            for (key, value) in overrides {
                merged.insert(key.clone(), value.clone());
            }
        }

        DatabaseConfig::sanitize(&Value::Mapping(merged))
    }

    /// Resolve the environment from a CLI flag or the WHARF_ENV variable
    ///
    /// Priority: CLI flag > WHARF_ENV env var > "development"
    pub fn resolve_env(cli_env: Option<&str>) -> String {
        cli_env
            .map(String::from)
            .or_else(|| std::env::var("WHARF_ENV").ok())
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENV.to_string())
    }
}

impl DatabaseConfig {
    /// Validate a raw `database` section.
    ///
    /// Keys are checked in declaration order and the first failure is
    /// reported. Unknown keys are dropped.
    pub fn sanitize(raw: &Value) -> ConfigResult<Self> {
        let empty = Mapping::new();
        let map = match raw {
            Value::Mapping(map) => map,
            Value::Null => &empty,
            _ => return Err(invalid("\"database\" must be of type object")),
        };

        let enabled = required_bool(map, "enabled")?;

        let dialect = match map.get("dialect") {
            None | Some(Value::Null) => return Err(invalid("\"dialect\" is required")),
            Some(Value::String(s)) => s.trim().parse::<Dialect>().map_err(|_| {
                invalid(format!(
                    "\"dialect\" must be one of [{}]",
                    Dialect::NAMES.join(", ")
                ))
            })?,
            Some(_) => return Err(invalid("\"dialect\" must be a string")),
        };

        let connection = match map.get("connection") {
            None | Some(Value::Null) => return Err(invalid("\"connection\" is required")),
            Some(Value::String(s)) if s.trim().is_empty() => {
                return Err(invalid("\"connection\" is not allowed to be empty"))
            }
            Some(Value::String(s)) => s.trim().to_string(),
            Some(_) => return Err(invalid("\"connection\" must be a string")),
        };

        let ssl = required_bool(map, "ssl")?;

        Ok(Self {
            enabled,
            dialect,
            connection,
            ssl,
        })
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidDatabase {
        message: message.into(),
    }
}

fn required_bool(map: &Mapping, key: &str) -> ConfigResult<bool> {
    match map.get(key) {
        None | Some(Value::Null) => Err(invalid(format!("\"{key}\" is required"))),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(invalid(format!("\"{key}\" must be a boolean"))),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
