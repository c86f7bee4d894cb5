//! Output packaging
//!
//! A woven module is written under its original file name into the output
//! directory, optionally with a `<name>.tether.json` sidecar describing every
//! processed type. Nothing is written for rejected modules.

use crate::error::{WeaveError, WeaveResult};
use crate::hash::ClassHashSet;
use crate::model::{ClassBinding, EnumBinding, FunctionBinding, MemberBinding, StructBinding};
use crate::weaver::WovenModule;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sidecar contents for one module
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeaveReport {
    pub module: String,
    pub types: Vec<TypeReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeReport {
    pub kind: &'static str,
    pub name: String,
    pub native_name: String,
    pub hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_hash: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<MemberReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberReport {
    pub name: String,
    pub native_name: String,
    pub category: String,
    pub flags: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionReport {
    pub name: String,
    pub native_name: String,
    pub flags: Vec<&'static str>,
    pub params: Vec<MemberReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_value: Option<MemberReport>,
}

impl MemberReport {
    fn new(member: &MemberBinding) -> Self {
        Self {
            name: member.name.clone(),
            native_name: member.native_name.clone(),
            category: member.category.label(),
            flags: member.flags.names(),
        }
    }
}

impl FunctionReport {
    fn new(function: &FunctionBinding) -> Self {
        Self {
            name: function.name.clone(),
            native_name: function.native_name.clone(),
            flags: function.flags.names(),
            params: function.params.iter().map(MemberReport::new).collect(),
            return_value: function.return_value.as_ref().map(MemberReport::new),
        }
    }
}

impl TypeReport {
    pub fn class(binding: &ClassBinding, hashes: &ClassHashSet) -> Self {
        Self {
            kind: "class",
            name: binding.name.full_name(),
            native_name: binding.native_name.clone(),
            hash: hashes.own.clone(),
            base_hash: hashes.base.clone(),
            members: binding.members.iter().map(MemberReport::new).collect(),
            functions: binding.functions.iter().map(FunctionReport::new).collect(),
        }
    }

    pub fn structure(binding: &StructBinding, hash: &str) -> Self {
        Self {
            kind: "struct",
            name: binding.name.full_name(),
            native_name: binding.native_name.clone(),
            hash: hash.to_string(),
            base_hash: None,
            members: binding.members.iter().map(MemberReport::new).collect(),
            functions: Vec::new(),
        }
    }

    pub fn enumeration(binding: &EnumBinding, hash: &str) -> Self {
        Self {
            kind: "enum",
            name: binding.name.full_name(),
            native_name: binding.native_name.clone(),
            hash: hash.to_string(),
            base_hash: None,
            members: Vec::new(),
            functions: Vec::new(),
        }
    }
}

/// Files written for one module
#[derive(Debug, Clone, PartialEq)]
pub struct PackagedFiles {
    pub module: PathBuf,
    pub sidecar: Option<PathBuf>,
}

/// Writes woven modules to an output directory
#[derive(Debug, Clone)]
pub struct Packager {
    out_dir: PathBuf,
    sidecar: bool,
}

impl Packager {
    pub fn new(out_dir: impl Into<PathBuf>, sidecar: bool) -> Self {
        Self {
            out_dir: out_dir.into(),
            sidecar,
        }
    }

    /// Write a woven module under `input`'s file name
    pub fn write(&self, input: &Path, woven: &WovenModule) -> WeaveResult<PackagedFiles> {
        let file_name = input.file_name().ok_or_else(|| {
            WeaveError::Inconsistent(format!("'{}' has no file name", input.display()))
        })?;
        std::fs::create_dir_all(&self.out_dir).map_err(|e| WeaveError::io(&self.out_dir, e))?;

        let module_path = self.out_dir.join(file_name);
        std::fs::write(&module_path, woven.module.encode())
            .map_err(|e| WeaveError::io(&module_path, e))?;

        let sidecar = if self.sidecar {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| woven.report.module.clone());
            let path = self.out_dir.join(format!("{}.tether.json", stem));
            let json = serde_json::to_string_pretty(&woven.report)?;
            std::fs::write(&path, json).map_err(|e| WeaveError::io(&path, e))?;
            Some(path)
        } else {
            None
        };
        debug!(module = %module_path.display(), "wrote woven module");
        Ok(PackagedFiles {
            module: module_path,
            sidecar,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Diagnostics;
    use tether_bytecode::Module;

    fn woven() -> WovenModule {
        WovenModule {
            module: Module::new("Game"),
            report: WeaveReport {
                module: "Game".to_string(),
                types: vec![TypeReport {
                    kind: "enum",
                    name: "Game.Team".to_string(),
                    native_name: "Team".to_string(),
                    hash: "ab".to_string(),
                    base_hash: None,
                    members: Vec::new(),
                    functions: Vec::new(),
                }],
            },
            diagnostics: Diagnostics::new(),
        }
    }

    #[test]
    fn test_writes_module_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let packager = Packager::new(&out, true);
        let files = packager.write(Path::new("bin/Game.tmod"), &woven()).unwrap();

        assert_eq!(files.module, out.join("Game.tmod"));
        let bytes = std::fs::read(&files.module).unwrap();
        assert_eq!(Module::decode(&bytes).unwrap().metadata.name, "Game");

        let sidecar = files.sidecar.unwrap();
        assert_eq!(sidecar, out.join("Game.tether.json"));
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(sidecar).unwrap()).unwrap();
        assert_eq!(json["types"][0]["native_name"], "Team");
        assert!(json["types"][0].get("base_hash").is_none());
    }

    #[test]
    fn test_sidecar_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let packager = Packager::new(dir.path(), false);
        let files = packager.write(Path::new("Game.tmod"), &woven()).unwrap();
        assert!(files.sidecar.is_none());
        assert!(!dir.path().join("Game.tether.json").exists());
    }
}
