//! Module discovery and loading

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tether_bytecode::Module;
use tether_weaver::TypeUniverse;
use tracing::{debug, warn};

/// File extension of compiled modules
pub const MODULE_EXTENSION: &str = "tmod";

/// Collect module files from paths. Directories are searched recursively,
/// skipping hidden entries.
pub fn collect_module_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            collect_recursive(path, &mut files)?;
        } else {
            warn!(path = %path.display(), "search path does not exist");
        }
    }
    files.sort();
    Ok(files)
}

fn collect_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory '{}'", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if hidden {
            continue;
        }
        if path.is_dir() {
            collect_recursive(&path, files)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some(MODULE_EXTENSION) {
            files.push(path);
        }
    }
    Ok(())
}

/// Read and decode a module file
pub fn load_module(path: &Path) -> Result<Module> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read '{}'", path.display()))?;
    Module::decode(&bytes).with_context(|| format!("Failed to decode '{}'", path.display()))
}

/// Build the universe of external modules from the search paths.
/// Undecodable files are skipped with a warning.
pub fn load_universe(search_paths: &[PathBuf]) -> Result<TypeUniverse> {
    let mut universe = TypeUniverse::new();
    for path in collect_module_files(search_paths)? {
        match load_module(&path) {
            Ok(module) => {
                debug!(path = %path.display(), module = %module.metadata.name, "loaded search module");
                universe.add_module(module);
            }
            Err(e) => warn!(path = %path.display(), "skipping search module: {:#}", e),
        }
    }
    Ok(universe)
}
