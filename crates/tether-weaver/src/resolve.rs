//! Type resolution across the module under analysis and its search paths

use crate::names::Names;
use rustc_hash::{FxHashMap, FxHashSet};
use tether_bytecode::{Module, TypeDef, TypeKind, TypeName, TypeSig};

/// Read-only set of type definitions from referenced modules
#[derive(Debug, Default)]
pub struct TypeUniverse {
    modules: Vec<Module>,
    index: FxHashMap<TypeName, (usize, usize)>,
}

impl TypeUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a universe from already decoded reference modules
    pub fn from_modules(modules: Vec<Module>) -> Self {
        let mut universe = Self::new();
        for module in modules {
            universe.add_module(module);
        }
        universe
    }

    /// Add a reference module; earlier definitions win on name clashes
    pub fn add_module(&mut self, module: Module) {
        let module_index = self.modules.len();
        for (type_index, ty) in module.types.iter().enumerate() {
            self.index
                .entry(ty.type_name())
                .or_insert((module_index, type_index));
        }
        self.modules.push(module);
    }

    pub fn lookup(&self, name: &TypeName) -> Option<&TypeDef> {
        let (m, t) = *self.index.get(name)?;
        self.modules.get(m)?.types.get(t)
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|m| m.metadata.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Resolves type names against one module first, then the universe
#[derive(Clone, Copy)]
pub struct TypeResolver<'a> {
    module: &'a Module,
    universe: &'a TypeUniverse,
    names: &'a Names,
}

impl<'a> TypeResolver<'a> {
    pub fn new(module: &'a Module, universe: &'a TypeUniverse, names: &'a Names) -> Self {
        Self {
            module,
            universe,
            names,
        }
    }

    pub fn module(&self) -> &'a Module {
        self.module
    }

    pub fn names(&self) -> &'a Names {
        self.names
    }

    /// Resolve a type by name
    pub fn resolve(&self, name: &TypeName) -> Option<&'a TypeDef> {
        match self.module.find_type(name) {
            Some(index) => self.module.types.get(index),
            None => self.universe.lookup(name),
        }
    }

    /// Index of a type defined in the module under analysis
    pub fn local_index(&self, name: &TypeName) -> Option<usize> {
        self.module.find_type(name)
    }

    /// Check whether a class derives (directly or transitively) from the native root
    ///
    /// The root itself does not count as derived.
    pub fn derives_from_root(&self, name: &TypeName) -> bool {
        let root = self.names.native_root();
        let mut visited = FxHashSet::default();
        let mut current = name.clone();
        while visited.insert(current.clone()) {
            let base = match self.resolve(&current).and_then(|t| t.base.as_ref()) {
                Some(base) => base,
                None => return false,
            };
            let base_name = match base.type_name() {
                Some(n) => n.clone(),
                None => return false,
            };
            if base_name == root {
                return true;
            }
            current = base_name;
        }
        false
    }

    /// Check whether a type is the native root or derives from it
    pub fn is_native_object(&self, name: &TypeName) -> bool {
        *name == self.names.native_root() || self.derives_from_root(name)
    }

    /// Resolve a class-reference constraint
    ///
    /// Returns `None` when the signature no longer names a class deriving from
    /// the native root. Callers treat this as absence, not as an error.
    pub fn try_resolve_class(&self, sig: &TypeSig) -> Option<&'a TypeDef> {
        let name = sig.type_name()?;
        let ty = self.resolve(name)?;
        if ty.kind == TypeKind::Class && self.is_native_object(name) {
            Some(ty)
        } else {
            None
        }
    }

    /// Declared base class name, if any
    pub fn base_of(&self, name: &TypeName) -> Option<TypeName> {
        self.resolve(name)?
            .base
            .as_ref()
            .and_then(|b| b.type_name().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BindingConfig;

    fn runtime_module() -> Module {
        let mut module = Module::new("Tether.Runtime");
        module
            .types
            .push(TypeDef::new("Tether.Runtime", "NativeObject", TypeKind::Class));
        let mut actor = TypeDef::new("Engine", "Actor", TypeKind::Class);
        actor.base = Some(TypeSig::named("Tether.Runtime", "NativeObject"));
        module.types.push(actor);
        module
    }

    #[test]
    fn test_derivation_across_modules() {
        let universe = TypeUniverse::from_modules(vec![runtime_module()]);
        let names = Names::from_config(&BindingConfig::default());
        let mut module = Module::new("Game");
        let mut pawn = TypeDef::new("Game", "Pawn", TypeKind::Class);
        pawn.base = Some(TypeSig::named("Engine", "Actor"));
        module.types.push(pawn);
        module.types.push(TypeDef::new("Game", "Helper", TypeKind::Class));

        let resolver = TypeResolver::new(&module, &universe, &names);
        assert!(resolver.derives_from_root(&TypeName::new("Game", "Pawn")));
        assert!(!resolver.derives_from_root(&TypeName::new("Game", "Helper")));
        assert!(resolver.is_native_object(&TypeName::new("Tether.Runtime", "NativeObject")));
        assert_eq!(resolver.local_index(&TypeName::new("Engine", "Actor")), None);
    }

    #[test]
    fn test_soft_failure_class_lookup() {
        let universe = TypeUniverse::from_modules(vec![runtime_module()]);
        let names = Names::from_config(&BindingConfig::default());
        let module = Module::new("Game");
        let resolver = TypeResolver::new(&module, &universe, &names);

        assert!(resolver
            .try_resolve_class(&TypeSig::named("Engine", "Actor"))
            .is_some());
        assert!(resolver
            .try_resolve_class(&TypeSig::named("Game", "Removed"))
            .is_none());
        assert!(resolver.try_resolve_class(&TypeSig::I32).is_none());
    }

    #[test]
    fn test_inheritance_cycle_terminates() {
        let universe = TypeUniverse::new();
        let names = Names::from_config(&BindingConfig::default());
        let mut module = Module::new("Game");
        let mut a = TypeDef::new("Game", "A", TypeKind::Class);
        a.base = Some(TypeSig::named("Game", "B"));
        let mut b = TypeDef::new("Game", "B", TypeKind::Class);
        b.base = Some(TypeSig::named("Game", "A"));
        module.types.push(a);
        module.types.push(b);
        let resolver = TypeResolver::new(&module, &universe, &names);
        assert!(!resolver.derives_from_root(&TypeName::new("Game", "A")));
    }
}
