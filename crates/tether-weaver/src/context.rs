//! Processing context
//!
//! Configuration, the previous-run manifest and the search-path type universe
//! are folded into one immutable value that every stage borrows.

use crate::config::WeaverConfig;
use crate::manifest::NativeManifest;
use crate::names::Names;
use crate::resolve::{TypeResolver, TypeUniverse};
use tether_bytecode::{Module, TypeName};

/// Immutable state shared by every stage of a run
#[derive(Debug)]
pub struct ProcessingContext {
    pub config: WeaverConfig,
    pub manifest: NativeManifest,
    pub universe: TypeUniverse,
    pub names: Names,
    core_structs: Vec<TypeName>,
}

impl ProcessingContext {
    pub fn new(config: WeaverConfig, manifest: NativeManifest, universe: TypeUniverse) -> Self {
        let names = Names::from_config(&config.weaver);
        let core_structs = config
            .weaver
            .core_structs
            .iter()
            .map(|s| TypeName::parse(s))
            .collect();
        Self {
            config,
            manifest,
            universe,
            names,
            core_structs,
        }
    }

    /// Context with default configuration and no search paths
    pub fn with_defaults() -> Self {
        Self::new(
            WeaverConfig::default(),
            NativeManifest::default(),
            TypeUniverse::new(),
        )
    }

    /// Resolver for a module under analysis
    pub fn resolver<'a>(&'a self, module: &'a Module) -> TypeResolver<'a> {
        TypeResolver::new(module, &self.universe, &self.names)
    }

    /// Check whether a struct is marshaled by a dedicated runtime marshaller
    pub fn is_core_struct(&self, name: &TypeName) -> bool {
        self.core_structs.iter().any(|n| n == name)
    }

    /// Check whether a type exists only to supply a concrete substitute
    pub fn is_wrapper_only(&self, simple_name: &str) -> bool {
        let suffix = &self.config.weaver.wrapper_suffix;
        simple_name.len() > suffix.len() && simple_name.ends_with(suffix.as_str())
    }
}
