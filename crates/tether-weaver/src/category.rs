//! Binding categories
//!
//! A closed classification of how a value type crosses the native boundary.
//! The emission strategy for each variant lives in [`crate::codegen`].

use serde::Serialize;
use std::fmt;
use tether_bytecode::{NativeKind, TypeName, TypeSig};

/// How a struct value is laid out and marshaled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StructRepr {
    /// Managed layout matches native layout; copied with a block load/store
    Blittable,
    /// Marshaled by a dedicated runtime marshaller
    Core,
    /// Marshaled field by field through generated members
    Generic,
}

/// Classification of an exposed value type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingCategory {
    Scalar(NativeKind),
    /// Storage width is platform defined and queried at runtime
    Boolean,
    String,
    /// Reference-counted native text behind a lazily created wrapper
    Text,
    Enum {
        native_name: String,
        owner: TypeName,
    },
    Struct {
        repr: StructRepr,
        native_name: String,
        owner: TypeName,
    },
    ObjectReference {
        target: TypeSig,
    },
    /// Object created together with its owner; not reassignable
    SubobjectReference {
        target: TypeSig,
    },
    WeakReference {
        inner: TypeSig,
    },
    ClassReference {
        constraint: TypeSig,
    },
    FixedArray {
        inner: Box<BindingCategory>,
        inner_ty: TypeSig,
        dim: u32,
    },
    DynamicList {
        inner: Box<BindingCategory>,
        inner_ty: TypeSig,
    },
}

impl BindingCategory {
    /// Short label used in hashes and sidecar output
    pub fn label(&self) -> String {
        match self {
            BindingCategory::Scalar(kind) => format!("scalar:{}", kind.name()),
            BindingCategory::Boolean => "bool".to_string(),
            BindingCategory::String => "string".to_string(),
            BindingCategory::Text => "text".to_string(),
            BindingCategory::Enum { native_name, .. } => format!("enum:{}", native_name),
            BindingCategory::Struct {
                repr, native_name, ..
            } => {
                let repr = match repr {
                    StructRepr::Blittable => "blittable",
                    StructRepr::Core => "core",
                    StructRepr::Generic => "generic",
                };
                format!("struct[{}]:{}", repr, native_name)
            }
            BindingCategory::ObjectReference { target } => format!("object:{}", target),
            BindingCategory::SubobjectReference { target } => format!("subobject:{}", target),
            BindingCategory::WeakReference { inner } => format!("weak:{}", inner),
            BindingCategory::ClassReference { constraint } => format!("class:{}", constraint),
            BindingCategory::FixedArray { inner, dim, .. } => {
                format!("array[{}]:{}", dim, inner.label())
            }
            BindingCategory::DynamicList { inner, .. } => format!("list:{}", inner.label()),
        }
    }

    /// Mutation goes through a returned wrapper object instead of a setter
    pub fn suppresses_setter(&self) -> bool {
        matches!(
            self,
            BindingCategory::Text
                | BindingCategory::FixedArray { .. }
                | BindingCategory::DynamicList { .. }
                | BindingCategory::SubobjectReference { .. }
        )
    }

    /// Needs a native property handle slot besides the offset
    pub fn needs_property_handle(&self) -> bool {
        matches!(
            self,
            BindingCategory::String
                | BindingCategory::FixedArray { .. }
                | BindingCategory::DynamicList { .. }
        )
    }

    /// Needs the native element size of a fixed array
    pub fn needs_element_size(&self) -> bool {
        matches!(self, BindingCategory::FixedArray { .. })
    }

    /// Needs the queried boolean storage width
    pub fn needs_width(&self) -> bool {
        matches!(self, BindingCategory::Boolean)
    }

    /// Property getter caches a wrapper object in an instance field
    pub fn needs_wrapper_field(&self) -> bool {
        matches!(
            self,
            BindingCategory::Text
                | BindingCategory::FixedArray { .. }
                | BindingCategory::DynamicList { .. }
        )
    }

    /// Native storage must be initialized to a non-zero default
    pub fn needs_default_init(&self) -> bool {
        matches!(self, BindingCategory::Text)
    }

    /// Marshaled value owns native memory that must be released after a call
    pub fn needs_cleanup(&self) -> bool {
        matches!(
            self,
            BindingCategory::String | BindingCategory::Text | BindingCategory::DynamicList { .. }
        )
    }

    /// Can be written from a plain value
    pub fn has_value_store(&self) -> bool {
        !matches!(self, BindingCategory::FixedArray { .. })
    }

    /// Allowed as the element of a fixed array or dynamic list
    pub fn is_simple(&self) -> bool {
        !matches!(
            self,
            BindingCategory::FixedArray { .. } | BindingCategory::DynamicList { .. }
        )
    }

    /// Laid out natively without marshaling
    pub fn is_blittable(&self) -> bool {
        matches!(
            self,
            BindingCategory::Scalar(_)
                | BindingCategory::Enum { .. }
                | BindingCategory::Struct {
                    repr: StructRepr::Blittable,
                    ..
                }
        )
    }

    /// Struct whose hash must be folded into the owner's hash
    pub fn hash_dependency(&self) -> Option<&TypeName> {
        match self {
            BindingCategory::Struct { owner, .. } => Some(owner),
            BindingCategory::FixedArray { inner, .. } | BindingCategory::DynamicList { inner, .. } => {
                inner.hash_dependency()
            }
            _ => None,
        }
    }

    /// Struct laid out inline in the owner's memory.
    ///
    /// List elements live in a separate native allocation and are not embedded.
    pub fn embedded_struct(&self) -> Option<&TypeName> {
        match self {
            BindingCategory::Struct { owner, .. } => Some(owner),
            BindingCategory::FixedArray { inner, .. } => inner.embedded_struct(),
            _ => None,
        }
    }
}

impl fmt::Display for BindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> BindingCategory {
        BindingCategory::Struct {
            repr: StructRepr::Blittable,
            native_name: "Point".to_string(),
            owner: TypeName::new("Game", "Point"),
        }
    }

    #[test]
    fn test_setter_suppression() {
        assert!(BindingCategory::Text.suppresses_setter());
        assert!(!BindingCategory::Boolean.suppresses_setter());
        let array = BindingCategory::FixedArray {
            inner: Box::new(BindingCategory::Scalar(NativeKind::I32)),
            inner_ty: TypeSig::I32,
            dim: 4,
        };
        assert!(array.suppresses_setter());
        assert!(!array.is_simple());
        assert!(!array.has_value_store());
        assert_eq!(array.label(), "array[4]:scalar:i32");
    }

    #[test]
    fn test_hash_dependency_through_containers() {
        let list = BindingCategory::DynamicList {
            inner: Box::new(point()),
            inner_ty: TypeSig::named("Game", "Point"),
        };
        assert_eq!(list.hash_dependency(), Some(&TypeName::new("Game", "Point")));
        assert_eq!(BindingCategory::String.hash_dependency(), None);
    }

    #[test]
    fn test_only_inline_structs_are_embedded() {
        let list = BindingCategory::DynamicList {
            inner: Box::new(point()),
            inner_ty: TypeSig::named("Game", "Point"),
        };
        let array = BindingCategory::FixedArray {
            inner: Box::new(point()),
            inner_ty: TypeSig::named("Game", "Point"),
            dim: 2,
        };
        assert_eq!(list.embedded_struct(), None);
        assert_eq!(array.embedded_struct(), Some(&TypeName::new("Game", "Point")));
        assert_eq!(point().embedded_struct(), Some(&TypeName::new("Game", "Point")));
    }

    #[test]
    fn test_blittable_categories() {
        assert!(point().is_blittable());
        assert!(BindingCategory::Scalar(NativeKind::F32).is_blittable());
        assert!(!BindingCategory::Boolean.is_blittable());
    }
}
