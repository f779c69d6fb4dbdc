//! Configuration loading and parsing

use anyhow::{bail, Context, Result};
use gsapi::{InstanceConfig, ParamValue};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from a TOML file)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub instance: InstanceConfig,
    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LibraryConfig {
    /// Shared library to load instead of the platform default
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RunConfig {
    /// Files run after initialisation, in order
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub user_errors: i32,
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

/// Parse a `NAME=VALUE` parameter.
///
/// The value type is inferred: `true`/`false`, then integer, then float;
/// anything else is a string. Quote the value (`NAME="12"`) to force a string.
pub fn parse_param(text: &str) -> Result<(String, ParamValue)> {
    let Some((name, value)) = text.split_once('=') else {
        bail!("Parameter must be NAME=VALUE: {:?}", text);
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("Parameter name is empty: {:?}", text);
    }

    let value = if let Some(quoted) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        ParamValue::String(quoted.to_string())
    } else if let Ok(flag) = value.parse::<bool>() {
        ParamValue::Bool(flag)
    } else if let Ok(int) = value.parse::<i64>() {
        ParamValue::Int(int)
    } else if let Ok(float) = value.parse::<f32>() {
        ParamValue::Float(float)
    } else {
        ParamValue::String(value.to_string())
    };

    Ok((name.to_string(), value))
}
