//! Weaver configuration (tether.toml)

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Weaver configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WeaverConfig {
    /// Binding model settings
    #[serde(default)]
    pub weaver: BindingConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Names and conventions of the binding model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BindingConfig {
    /// Namespace of the binding annotations (default: "Tether.Attributes")
    #[serde(default = "default_attribute_namespace")]
    pub attribute_namespace: String,

    /// Namespace of the runtime support types (default: "Tether.Runtime")
    #[serde(default = "default_runtime_namespace")]
    pub runtime_namespace: String,

    /// Simple name of the native object root class (default: "NativeObject")
    #[serde(default = "default_native_root")]
    pub native_root: String,

    /// Types whose name ends with this suffix are skipped (default: "Wrapper")
    #[serde(default = "default_wrapper_suffix")]
    pub wrapper_suffix: String,

    /// Full names of structs marshaled by dedicated runtime marshallers
    #[serde(default = "default_core_structs")]
    pub core_structs: Vec<String>,
}

fn default_attribute_namespace() -> String {
    "Tether.Attributes".to_string()
}

fn default_runtime_namespace() -> String {
    "Tether.Runtime".to_string()
}

fn default_native_root() -> String {
    "NativeObject".to_string()
}

fn default_wrapper_suffix() -> String {
    "Wrapper".to_string()
}

fn default_core_structs() -> Vec<String> {
    vec![
        "Tether.Math.Vector".to_string(),
        "Tether.Math.Rotator".to_string(),
        "Tether.Math.Quat".to_string(),
        "Tether.Math.Transform".to_string(),
        "Tether.Math.IntPoint".to_string(),
        "Tether.Math.Size2D".to_string(),
    ]
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            attribute_namespace: default_attribute_namespace(),
            runtime_namespace: default_runtime_namespace(),
            native_root: default_native_root(),
            wrapper_suffix: default_wrapper_suffix(),
            core_structs: default_core_structs(),
        }
    }
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Write a `<name>.tether.json` sidecar next to each rewritten module
    #[serde(default = "default_true")]
    pub sidecar: bool,
}

fn default_true() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { sidecar: true }
    }
}

impl WeaverConfig {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: WeaverConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.weaver;
        if w.native_root.is_empty() {
            return Err(ConfigError::ValidationError(
                "native_root cannot be empty".to_string(),
            ));
        }
        if w.native_root.contains('.') {
            return Err(ConfigError::ValidationError(format!(
                "native_root '{}' must be a simple name inside runtime_namespace",
                w.native_root
            )));
        }
        if w.attribute_namespace.is_empty() || w.runtime_namespace.is_empty() {
            return Err(ConfigError::ValidationError(
                "attribute_namespace and runtime_namespace cannot be empty".to_string(),
            ));
        }
        if w.wrapper_suffix.is_empty() {
            return Err(ConfigError::ValidationError(
                "wrapper_suffix cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
