//! Previous-run native type manifest
//!
//! A flat list of native class, struct and enum names already known to the
//! native side. Loaded once, read-only during processing, and used only to
//! reject newly annotated types whose native name collides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading a manifest
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Failed to read manifest file
    #[error("Failed to read manifest file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse JSON
    #[error("Failed to parse manifest: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Kind of native type a name belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeKindOfType {
    Class,
    Struct,
    Enum,
}

/// Known native type names
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NativeManifest {
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub structs: Vec<String>,
    #[serde(default)]
    pub enums: Vec<String>,
}

impl NativeManifest {
    /// Load a manifest from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse a manifest from JSON text
    pub fn from_json(content: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Check whether a native name is already taken for the given kind
    pub fn contains(&self, kind: NativeKindOfType, native_name: &str) -> bool {
        let names = match kind {
            NativeKindOfType::Class => &self.classes,
            NativeKindOfType::Struct => &self.structs,
            NativeKindOfType::Enum => &self.enums,
        };
        names.iter().any(|n| n == native_name)
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.structs.is_empty() && self.enums.is_empty()
    }
}
