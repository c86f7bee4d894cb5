//! Structural hashing
//!
//! A type's hash covers its observable binding metadata in declaration order,
//! the hashes of the structs its members refer to and, for classes, the code
//! of the construction constructor. Structs embedded inline from the same
//! module contribute the hash recorded when they were processed; any other
//! struct contributes a hash of its declaration, attached to the member at
//! extraction. Hashes are only consumed by external change detection.

use crate::error::{WeaveError, WeaveResult};
use crate::model::{ClassBinding, EnumBinding, MemberBinding, ModuleBindings, StructBinding};
use rustc_hash::FxHashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tether_bytecode::{Module, TypeName};

/// Hashes recorded for a class
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassHashSet {
    pub own: String,
    /// Hash of the base class when it is processed in the same module
    pub base: Option<String>,
}

#[derive(Serialize)]
struct MemberEntry<'a> {
    name: &'a str,
    native_name: &'a str,
    category: String,
    flags: u64,
    nested: Option<&'a str>,
}

#[derive(Serialize)]
struct FunctionEntry<'a> {
    name: &'a str,
    flags: u64,
    values: Vec<MemberEntry<'a>>,
}

#[derive(Serialize)]
struct TypeEntry<'a> {
    kind: &'static str,
    name: String,
    native_name: &'a str,
    members: Vec<MemberEntry<'a>>,
    functions: Vec<FunctionEntry<'a>>,
    base: Option<String>,
}

/// Stands in for the hash of a struct that holds a list of itself
pub const SELF_REFERENCE: &str = "self";

/// Exposed field of a struct known only from its declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredField {
    pub name: String,
    pub category: String,
    pub nested: Option<String>,
}

/// Hash of a struct that is not processed as part of the current module
pub fn declared_struct_hash(name: &str, fields: &[DeclaredField]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"declared-struct\0");
    hasher.update(name.as_bytes());
    for field in fields {
        for part in [
            field.name.as_str(),
            field.category.as_str(),
            field.nested.as_deref().unwrap_or(""),
        ] {
            hasher.update(b"\0");
            hasher.update(part.as_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

/// Computes and records hashes in dependency order
#[derive(Debug, Default)]
pub struct StructuralHasher {
    structs: FxHashMap<TypeName, String>,
    classes: FxHashMap<TypeName, ClassHashSet>,
}

impl StructuralHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn struct_hash(&self, name: &TypeName) -> Option<&str> {
        self.structs.get(name).map(String::as_str)
    }

    pub fn class_hashes(&self, name: &TypeName) -> Option<&ClassHashSet> {
        self.classes.get(name)
    }

    /// Hash a struct; every in-module struct it embeds must already be hashed
    pub fn hash_struct(
        &mut self,
        binding: &StructBinding,
        bindings: &ModuleBindings,
    ) -> WeaveResult<String> {
        let entry = TypeEntry {
            kind: "struct",
            name: binding.name.full_name(),
            native_name: &binding.native_name,
            members: self.member_entries(&binding.name, &binding.members, bindings)?,
            functions: Vec::new(),
            base: None,
        };
        let hash = digest(&entry, None)?;
        self.structs.insert(binding.name.clone(), hash.clone());
        Ok(hash)
    }

    /// Hash a class; its in-module base class must already be hashed
    pub fn hash_class(
        &mut self,
        binding: &ClassBinding,
        module: &Module,
        bindings: &ModuleBindings,
    ) -> WeaveResult<ClassHashSet> {
        let base = match &binding.base {
            Some(base) if bindings.find_class(base).is_some() => {
                let hashes = self.classes.get(base).ok_or_else(|| {
                    WeaveError::MissingDependencyHash {
                        dependent: binding.name.full_name(),
                        dependency: base.full_name(),
                    }
                })?;
                Some(hashes.own.clone())
            }
            _ => None,
        };

        let values: Vec<Vec<MemberBinding>> = binding
            .functions
            .iter()
            .map(|f| f.all_values().cloned().collect())
            .collect();
        let mut functions = Vec::with_capacity(binding.functions.len());
        for (function, values) in binding.functions.iter().zip(&values) {
            functions.push(FunctionEntry {
                name: &function.name,
                flags: function.flags.bits(),
                values: self.member_entries(&binding.name, values, bindings)?,
            });
        }

        let entry = TypeEntry {
            kind: "class",
            name: binding.name.full_name(),
            native_name: &binding.native_name,
            members: self.member_entries(&binding.name, &binding.members, bindings)?,
            functions,
            base: base.clone(),
        };
        let ctor_code = binding.construction_ctor.and_then(|index| {
            module
                .types
                .get(binding.type_index)
                .and_then(|t| t.methods.get(index))
                .and_then(|m| m.body.as_ref())
                .map(|b| b.code.as_slice())
        });

        let hashes = ClassHashSet {
            own: digest(&entry, ctor_code)?,
            base,
        };
        self.classes.insert(binding.name.clone(), hashes.clone());
        Ok(hashes)
    }

    /// Hash an enum from its member names
    pub fn hash_enum(&self, binding: &EnumBinding) -> WeaveResult<String> {
        #[derive(Serialize)]
        struct EnumEntry<'a> {
            kind: &'static str,
            name: String,
            native_name: &'a str,
            members: &'a [String],
        }
        digest(
            &EnumEntry {
                kind: "enum",
                name: binding.name.full_name(),
                native_name: &binding.native_name,
                members: &binding.members,
            },
            None,
        )
    }

    fn member_entries<'m>(
        &'m self,
        owner: &TypeName,
        members: &'m [MemberBinding],
        bindings: &ModuleBindings,
    ) -> WeaveResult<Vec<MemberEntry<'m>>> {
        members
            .iter()
            .map(|member| {
                let nested = match member.category.embedded_struct() {
                    Some(dep) if bindings.find_struct(dep).is_some() => Some(
                        self.struct_hash(dep)
                            .ok_or_else(|| WeaveError::MissingDependencyHash {
                                dependent: owner.full_name(),
                                dependency: dep.full_name(),
                            })?,
                    ),
                    _ => member.hash_override.as_deref(),
                };
                Ok(MemberEntry {
                    name: &member.name,
                    native_name: &member.native_name,
                    category: member.category.label(),
                    flags: member.flags.bits(),
                    nested,
                })
            })
            .collect()
    }
}

fn digest<T: Serialize>(entry: &T, code: Option<&[u8]>) -> WeaveResult<String> {
    let canonical = serde_json::to_vec(entry)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    if let Some(code) = code {
        hasher.update(code);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::{BindingCategory, StructRepr};
    use crate::model::{AnnotatedType, MemberOrigin};
    use tether_bytecode::{NativeKind, TypeSig};

    fn scalar(name: &str, kind: NativeKind) -> MemberBinding {
        MemberBinding::new(name, TypeSig::F32, BindingCategory::Scalar(kind), MemberOrigin::Field(0))
    }

    fn point(kind: NativeKind) -> StructBinding {
        StructBinding {
            name: TypeName::new("Game", "Point"),
            native_name: "Point".to_string(),
            type_index: 0,
            members: vec![scalar("X", kind), scalar("Y", kind)],
            blittable: true,
            location: None,
        }
    }

    fn line() -> StructBinding {
        let embed = |name: &str| {
            MemberBinding::new(
                name,
                TypeSig::named("Game", "Point"),
                BindingCategory::Struct {
                    repr: StructRepr::Blittable,
                    native_name: "Point".to_string(),
                    owner: TypeName::new("Game", "Point"),
                },
                MemberOrigin::Field(0),
            )
        };
        StructBinding {
            name: TypeName::new("Game", "Line"),
            native_name: "Line".to_string(),
            type_index: 1,
            members: vec![embed("Start"), embed("End")],
            blittable: true,
            location: None,
        }
    }

    fn bindings(point: StructBinding) -> ModuleBindings {
        ModuleBindings {
            types: vec![AnnotatedType::Struct(point), AnnotatedType::Struct(line())],
        }
    }

    #[test]
    fn test_nested_hash_propagates() {
        let a = bindings(point(NativeKind::F32));
        let mut hasher = StructuralHasher::new();
        hasher.hash_struct(a.find_struct(&TypeName::new("Game", "Point")).unwrap(), &a).unwrap();
        let first = hasher.hash_struct(&line(), &a).unwrap();

        let b = bindings(point(NativeKind::F64));
        let mut other = StructuralHasher::new();
        other.hash_struct(b.find_struct(&TypeName::new("Game", "Point")).unwrap(), &b).unwrap();
        let second = other.hash_struct(&line(), &b).unwrap();

        assert_eq!(first.len(), 64);
        assert_ne!(first, second);
    }

    #[test]
    fn test_hash_override_is_folded_in() {
        let a = bindings(point(NativeKind::F32));
        let with_override = |hash: &str| {
            let mut line = line();
            for member in &mut line.members {
                member.category = BindingCategory::Struct {
                    repr: StructRepr::Blittable,
                    native_name: "Vec".to_string(),
                    owner: TypeName::new("Core", "Vec"),
                };
                member.hash_override = Some(hash.to_string());
            }
            StructuralHasher::new().hash_struct(&line, &a).unwrap()
        };
        assert_ne!(with_override("aa"), with_override("bb"));
    }

    #[test]
    fn test_declared_hash_tracks_fields() {
        let field = |name: &str, category: &str| DeclaredField {
            name: name.to_string(),
            category: category.to_string(),
            nested: None,
        };
        let narrow = declared_struct_hash(
            "Game.Point",
            &[field("X", "scalar:f32"), field("Y", "scalar:f32")],
        );
        let wide = declared_struct_hash(
            "Game.Point",
            &[field("X", "scalar:f64"), field("Y", "scalar:f64")],
        );
        assert_eq!(narrow.len(), 64);
        assert_ne!(narrow, wide);
        // Field boundaries are part of the hash
        assert_ne!(
            declared_struct_hash("T", &[field("AB", "c")]),
            declared_struct_hash("T", &[field("A", "Bc")])
        );
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = bindings(point(NativeKind::I32));
        let mut one = StructuralHasher::new();
        let mut two = StructuralHasher::new();
        let p = a.find_struct(&TypeName::new("Game", "Point")).unwrap();
        assert_eq!(one.hash_struct(p, &a).unwrap(), two.hash_struct(p, &a).unwrap());
    }

    #[test]
    fn test_missing_nested_hash_is_fatal() {
        let a = bindings(point(NativeKind::F32));
        let mut hasher = StructuralHasher::new();
        match hasher.hash_struct(&line(), &a) {
            Err(WeaveError::MissingDependencyHash { dependent, dependency }) => {
                assert_eq!(dependent, "Game.Line");
                assert_eq!(dependency, "Game.Point");
            }
            other => panic!("expected missing hash, got {:?}", other),
        }
    }
}
