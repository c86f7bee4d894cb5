//! Binding-category classification
//!
//! Maps a declared value type plus the member's annotations to a
//! [`BindingCategory`]. Results are memoized per (type, member shape) so the
//! rewriter can ask repeatedly without re-resolving anything.

use crate::category::{BindingCategory, StructRepr};
use crate::context::ProcessingContext;
use crate::diagnostic::{codes, Diagnostic, ErrorCode};
use crate::hash::{declared_struct_hash, DeclaredField, SELF_REFERENCE};
use crate::names::{attrs, runtime_types, LIST_INTERFACE};
use crate::resolve::TypeResolver;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use tether_bytecode::{
    AttrValue, Attribute, Instr, Module, TypeDef, TypeKind, TypeName, TypeSig,
};
use tracing::warn;

/// A classification failure, turned into a diagnostic by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifyError {
    pub code: ErrorCode,
    pub message: String,
}

impl ClassifyError {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn unsupported(ty: &TypeSig) -> Self {
        Self::new(
            codes::UNSUPPORTED_TYPE,
            format!("type '{}' cannot be exposed to native code", ty),
        )
    }

    pub fn into_diagnostic(self) -> Diagnostic {
        Diagnostic::error(self.message).with_code(self.code)
    }
}

/// Member annotations that influence classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemberShape {
    /// Repetition count of a fixed array
    pub array_dim: Option<u32>,
    /// Object reference created together with its owner
    pub subobject: bool,
}

impl MemberShape {
    /// Read the shape from the member's declaring annotation
    pub fn from_attribute(attr: Option<&Attribute>) -> Self {
        let attr = match attr {
            Some(attr) => attr,
            None => return Self::default(),
        };
        let array_dim = attr
            .named_arg(attrs::ARG_ARRAY_DIM)
            .and_then(AttrValue::as_int)
            .and_then(|d| u32::try_from(d).ok());
        let subobject = attr
            .named_arg(attrs::ARG_SUBOBJECT)
            .and_then(AttrValue::as_bool)
            .unwrap_or(false);
        Self {
            array_dim,
            subobject,
        }
    }

    fn without_container(self) -> Self {
        Self {
            array_dim: None,
            subobject: false,
        }
    }
}

type Memo = FxHashMap<(TypeSig, MemberShape), Result<BindingCategory, ClassifyError>>;

/// Classifies value types against one module and the search-path universe
pub struct Classifier<'a> {
    ctx: &'a ProcessingContext,
    resolver: TypeResolver<'a>,
    memo: RefCell<Memo>,
    struct_reprs: RefCell<FxHashMap<TypeName, StructRepr>>,
    in_progress: RefCell<FxHashSet<TypeName>>,
    declared_hashes: RefCell<FxHashMap<TypeName, String>>,
    hashing: RefCell<FxHashSet<TypeName>>,
}

impl<'a> Classifier<'a> {
    pub fn new(ctx: &'a ProcessingContext, module: &'a Module) -> Self {
        Self {
            ctx,
            resolver: ctx.resolver(module),
            memo: RefCell::new(FxHashMap::default()),
            struct_reprs: RefCell::new(FxHashMap::default()),
            in_progress: RefCell::new(FxHashSet::default()),
            declared_hashes: RefCell::new(FxHashMap::default()),
            hashing: RefCell::new(FxHashSet::default()),
        }
    }

    pub fn resolver(&self) -> &TypeResolver<'a> {
        &self.resolver
    }

    /// Classify a declared value type
    pub fn classify(
        &self,
        ty: &TypeSig,
        shape: MemberShape,
    ) -> Result<BindingCategory, ClassifyError> {
        let key = (ty.clone(), shape);
        if let Some(cached) = self.memo.borrow().get(&key) {
            return cached.clone();
        }
        let result = self.classify_uncached(ty, shape);
        self.memo.borrow_mut().insert(key, result.clone());
        result
    }

    fn classify_uncached(
        &self,
        ty: &TypeSig,
        shape: MemberShape,
    ) -> Result<BindingCategory, ClassifyError> {
        let names = &self.ctx.names;

        if shape.array_dim.is_some() && !self.is_runtime_generic(ty, runtime_types::FIXED_ARRAY) {
            return Err(ClassifyError::new(
                codes::UNSUPPORTED_TYPE,
                format!("'{}' has an array dimension but is not a fixed array", ty),
            ));
        }

        if let Some(kind) = scalar_kind(ty) {
            return Ok(BindingCategory::Scalar(kind));
        }

        match ty {
            TypeSig::Bool => Ok(BindingCategory::Boolean),
            TypeSig::String => Ok(BindingCategory::String),
            TypeSig::Named(name) if names.is_runtime(name, runtime_types::TEXT) => {
                Ok(BindingCategory::Text)
            }
            TypeSig::Named(name) => self.classify_named(ty, name, shape),
            TypeSig::Generic { base, args } => self.classify_generic(ty, base, args, shape),
            _ => Err(ClassifyError::unsupported(ty)),
        }
    }

    fn classify_named(
        &self,
        ty: &TypeSig,
        name: &TypeName,
        shape: MemberShape,
    ) -> Result<BindingCategory, ClassifyError> {
        let def = self
            .resolver
            .resolve(name)
            .ok_or_else(|| ClassifyError::unsupported(ty))?;

        match def.kind {
            TypeKind::Enum => {
                if def.enum_underlying != Some(TypeSig::U8) {
                    return Err(ClassifyError::new(
                        codes::ENUM_BACKING_TYPE,
                        format!("enum '{}' must be backed by an unsigned byte", name),
                    ));
                }
                Ok(BindingCategory::Enum {
                    native_name: self.ctx.names.native_type_name(def, attrs::NATIVE_ENUM),
                    owner: name.clone(),
                })
            }
            TypeKind::Class if self.resolver.is_native_object(name) => {
                if shape.subobject {
                    Ok(BindingCategory::SubobjectReference { target: ty.clone() })
                } else {
                    Ok(BindingCategory::ObjectReference { target: ty.clone() })
                }
            }
            TypeKind::Struct => {
                let repr = self
                    .struct_repr(def)
                    .ok_or_else(|| ClassifyError::unsupported(ty))?;
                Ok(BindingCategory::Struct {
                    repr,
                    native_name: self.ctx.names.native_type_name(def, attrs::NATIVE_STRUCT),
                    owner: name.clone(),
                })
            }
            _ => Err(ClassifyError::unsupported(ty)),
        }
    }

    fn classify_generic(
        &self,
        ty: &TypeSig,
        base: &TypeName,
        args: &[TypeSig],
        shape: MemberShape,
    ) -> Result<BindingCategory, ClassifyError> {
        let names = &self.ctx.names;
        let arg = match args {
            [arg] => arg,
            _ => return Err(ClassifyError::unsupported(ty)),
        };

        if names.is_runtime(base, runtime_types::WEAK_REF) {
            let target = arg.type_name().filter(|n| self.resolver.is_native_object(n));
            return match target {
                Some(_) => Ok(BindingCategory::WeakReference { inner: arg.clone() }),
                None => Err(ClassifyError::unsupported(ty)),
            };
        }

        if names.is_runtime(base, runtime_types::SUBCLASS_OF) {
            let constraint = match self.resolver.try_resolve_class(arg) {
                Some(def) => def.as_sig(),
                None => {
                    warn!(
                        constraint = %arg,
                        "class reference constraint no longer resolves, falling back to the native root"
                    );
                    names.native_root_sig()
                }
            };
            return Ok(BindingCategory::ClassReference { constraint });
        }

        if names.is_runtime(base, runtime_types::FIXED_ARRAY) {
            let dim = shape.array_dim.filter(|d| *d > 0).ok_or_else(|| {
                ClassifyError::new(
                    codes::MISSING_ARRAY_DIM,
                    format!("fixed array '{}' requires an ArrayDim greater than zero", ty),
                )
            })?;
            let inner = self.classify_element(ty, arg, shape)?;
            return Ok(BindingCategory::FixedArray {
                inner: Box::new(inner),
                inner_ty: arg.clone(),
                dim,
            });
        }

        if base.namespace == LIST_INTERFACE.0 && base.name == LIST_INTERFACE.1 {
            let inner = self.classify_element(ty, arg, shape)?;
            return Ok(BindingCategory::DynamicList {
                inner: Box::new(inner),
                inner_ty: arg.clone(),
            });
        }

        Err(ClassifyError::unsupported(ty))
    }

    /// Classify a container element, which must not itself be a container
    fn classify_element(
        &self,
        container: &TypeSig,
        element: &TypeSig,
        shape: MemberShape,
    ) -> Result<BindingCategory, ClassifyError> {
        let inner = self.classify(element, shape.without_container())?;
        if !inner.is_simple() {
            return Err(ClassifyError::new(
                codes::NESTED_CONTAINER,
                format!("'{}' nests a container inside a container", container),
            ));
        }
        Ok(inner)
    }

    fn is_runtime_generic(&self, ty: &TypeSig, simple: &str) -> bool {
        matches!(ty, TypeSig::Generic { base, .. } if self.ctx.names.is_runtime(base, simple))
    }

    /// Representation of a struct type, or `None` when it cannot be bound
    pub fn struct_repr(&self, def: &TypeDef) -> Option<StructRepr> {
        let name = def.type_name();
        if self.ctx.is_core_struct(&name) {
            return Some(StructRepr::Core);
        }
        if let Some(repr) = self.struct_reprs.borrow().get(&name) {
            return Some(*repr);
        }

        let names = &self.ctx.names;
        let repr = if self.resolver.local_index(&name).is_some() {
            if !names.has(&def.attributes, attrs::NATIVE_STRUCT) {
                return None;
            }
            // Embedding cycles are reported by the orderer
            if !self.in_progress.borrow_mut().insert(name.clone()) {
                return Some(StructRepr::Generic);
            }
            let blittable = self.local_struct_is_blittable(def);
            self.in_progress.borrow_mut().remove(&name);
            if blittable {
                StructRepr::Blittable
            } else {
                StructRepr::Generic
            }
        } else if names.has(&def.attributes, attrs::BLITTABLE) {
            StructRepr::Blittable
        } else if names.has(&def.attributes, attrs::NATIVE_STRUCT) {
            StructRepr::Generic
        } else {
            return None;
        };

        self.struct_reprs.borrow_mut().insert(name, repr);
        Some(repr)
    }

    /// Hash a member of `owner` contributes for the struct it refers to, when
    /// that struct is not hashed ahead of the owner in this module.
    ///
    /// Inline structs of the current module yield `None`; their hash comes from
    /// processing order. A list of the owner itself yields a fixed marker.
    pub fn hash_override(&self, owner: &TypeName, category: &BindingCategory) -> Option<String> {
        let dep = category.hash_dependency()?;
        if category.embedded_struct().is_some() && self.resolver.local_index(dep).is_some() {
            return None;
        }
        if dep == owner {
            return Some(SELF_REFERENCE.to_string());
        }
        Some(self.declared_hash(dep))
    }

    /// Hash of a struct computed from its exposed fields, recursing into the
    /// structs they refer to
    fn declared_hash(&self, name: &TypeName) -> String {
        if let Some(hash) = self.declared_hashes.borrow().get(name) {
            return hash.clone();
        }
        if !self.hashing.borrow_mut().insert(name.clone()) {
            return format!("cycle:{}", name.full_name());
        }
        let fields = match self.resolver.resolve(name) {
            Some(def) => self.declared_fields(def),
            None => Vec::new(),
        };
        self.hashing.borrow_mut().remove(name);

        let hash = declared_struct_hash(&name.full_name(), &fields);
        self.declared_hashes
            .borrow_mut()
            .insert(name.clone(), hash.clone());
        hash
    }

    fn declared_fields(&self, def: &TypeDef) -> Vec<DeclaredField> {
        let names = &self.ctx.names;
        def.fields
            .iter()
            .filter(|f| !f.is_static())
            .filter_map(|field| {
                let attr = names.find(&field.attributes, attrs::NATIVE_PROPERTY)?;
                let (category, nested) =
                    match self.classify(&field.ty, MemberShape::from_attribute(Some(attr))) {
                        Ok(category) => (
                            category.label(),
                            category.hash_dependency().map(|dep| self.declared_hash(dep)),
                        ),
                        Err(_) => (format!("unsupported:{}", field.ty), None),
                    };
                Some(DeclaredField {
                    name: field.name.clone(),
                    category,
                    nested,
                })
            })
            .collect()
    }

    /// Every instance field is exposed and laid out natively
    fn local_struct_is_blittable(&self, def: &TypeDef) -> bool {
        let names = &self.ctx.names;
        def.fields.iter().filter(|f| !f.is_static()).all(|field| {
            let attr = match names.find(&field.attributes, attrs::NATIVE_PROPERTY) {
                Some(attr) => attr,
                None => return false,
            };
            self.classify(&field.ty, MemberShape::from_attribute(Some(attr)))
                .map(|c| c.is_blittable())
                .unwrap_or(false)
        })
    }
}

fn scalar_kind(ty: &TypeSig) -> Option<tether_bytecode::NativeKind> {
    match ty {
        TypeSig::I8
        | TypeSig::U8
        | TypeSig::I16
        | TypeSig::U16
        | TypeSig::I32
        | TypeSig::U32
        | TypeSig::I64
        | TypeSig::U64
        | TypeSig::F32
        | TypeSig::F64 => Instr::native_kind_of(ty),
        _ => None,
    }
}
