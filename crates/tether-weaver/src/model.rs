//! Typed binding model built from a decoded module
//!
//! Everything here is created fresh per processing run and discarded once the
//! module has been rewritten and packaged.

use crate::category::BindingCategory;
use crate::flags::{FunctionFlags, PropertyFlags, ReplicationCondition};
use tether_bytecode::{Access, SourceLocation, TypeName, TypeSig};

/// Where a member binding lives on its owning type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberOrigin {
    /// Index into the owner's properties
    Property(usize),
    /// Index into the owner's fields
    Field(usize),
    /// Index into a function's parameters
    Param(usize),
    Return,
}

/// One exposed property, field, parameter or return value
#[derive(Debug, Clone, PartialEq)]
pub struct MemberBinding {
    pub name: String,
    /// Name on the native side (defaults to `name`)
    pub native_name: String,
    pub ty: TypeSig,
    pub access: Access,
    pub category: BindingCategory,
    pub flags: PropertyFlags,
    pub origin: MemberOrigin,
    /// Editor category label, if declared
    pub category_label: Option<String>,
    pub replication: Option<ReplicationCondition>,
    /// Raw replication condition value when it is out of range
    pub invalid_replication: Option<i64>,
    pub custom_condition: Option<String>,
    pub rep_notify: Option<String>,
    pub allow_private_access: bool,
    /// Hash of a struct this member refers to that is not ordered before the
    /// owner: declared in another module or reached through a list
    pub hash_override: Option<String>,
    pub location: Option<SourceLocation>,
}

impl MemberBinding {
    pub fn new(name: &str, ty: TypeSig, category: BindingCategory, origin: MemberOrigin) -> Self {
        Self {
            name: name.to_string(),
            native_name: name.to_string(),
            ty,
            access: Access::Public,
            category,
            flags: PropertyFlags::empty(),
            origin,
            category_label: None,
            replication: None,
            invalid_replication: None,
            custom_condition: None,
            rep_notify: None,
            allow_private_access: false,
            hash_override: None,
            location: None,
        }
    }

    /// Value type with any by-ref wrapper removed
    pub fn value_type(&self) -> &TypeSig {
        self.ty.strip_by_ref()
    }

    /// Parameter written back to the caller after the call
    pub fn is_by_ref(&self) -> bool {
        self.flags
            .intersects(PropertyFlags::OUT_PARAM | PropertyFlags::REFERENCE_PARAM)
    }

    /// Parameter marshaled into the argument buffer before the call
    pub fn is_input(&self) -> bool {
        !self.flags.contains(PropertyFlags::OUT_PARAM)
            && !self.flags.contains(PropertyFlags::RETURN_PARAM)
    }
}

/// One exposed function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionBinding {
    pub name: String,
    pub native_name: String,
    /// Index into the owner's methods at extraction time
    pub method_index: usize,
    pub flags: FunctionFlags,
    pub access: Access,
    pub category_label: Option<String>,
    pub params: Vec<MemberBinding>,
    pub return_value: Option<MemberBinding>,
    pub location: Option<SourceLocation>,
}

impl FunctionBinding {
    pub fn is_static(&self) -> bool {
        self.flags.contains(FunctionFlags::STATIC)
    }

    pub fn is_native_event(&self) -> bool {
        self.flags.contains(FunctionFlags::NATIVE_EVENT)
    }

    pub fn has_validation(&self) -> bool {
        self.flags.contains(FunctionFlags::WITH_VALIDATION)
    }

    /// Parameters followed by the return value
    pub fn all_values(&self) -> impl Iterator<Item = &MemberBinding> {
        self.params.iter().chain(self.return_value.iter())
    }
}

/// An annotated class
#[derive(Debug, Clone, PartialEq)]
pub struct ClassBinding {
    pub name: TypeName,
    pub native_name: String,
    pub type_index: usize,
    pub base: Option<TypeName>,
    pub is_abstract: bool,
    /// Method index of the parameterless constructor
    pub construction_ctor: Option<usize>,
    /// Method index of the native-pointer constructor
    pub rehydration_ctor: Option<usize>,
    pub members: Vec<MemberBinding>,
    pub functions: Vec<FunctionBinding>,
    pub location: Option<SourceLocation>,
}

/// An annotated struct
#[derive(Debug, Clone, PartialEq)]
pub struct StructBinding {
    pub name: TypeName,
    pub native_name: String,
    pub type_index: usize,
    pub members: Vec<MemberBinding>,
    /// Every instance field is exposed and natively laid out
    pub blittable: bool,
    pub location: Option<SourceLocation>,
}

/// An annotated enum
#[derive(Debug, Clone, PartialEq)]
pub struct EnumBinding {
    pub name: TypeName,
    pub native_name: String,
    pub type_index: usize,
    /// Member names in value order
    pub members: Vec<String>,
    pub location: Option<SourceLocation>,
}

/// An annotated type
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotatedType {
    Class(ClassBinding),
    Struct(StructBinding),
    Enum(EnumBinding),
}

impl AnnotatedType {
    pub fn name(&self) -> &TypeName {
        match self {
            AnnotatedType::Class(c) => &c.name,
            AnnotatedType::Struct(s) => &s.name,
            AnnotatedType::Enum(e) => &e.name,
        }
    }

    pub fn native_name(&self) -> &str {
        match self {
            AnnotatedType::Class(c) => &c.native_name,
            AnnotatedType::Struct(s) => &s.native_name,
            AnnotatedType::Enum(e) => &e.native_name,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            AnnotatedType::Class(_) => "class",
            AnnotatedType::Struct(_) => "struct",
            AnnotatedType::Enum(_) => "enum",
        }
    }
}

/// Every annotated type found in one module, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleBindings {
    pub types: Vec<AnnotatedType>,
}

impl ModuleBindings {
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassBinding> {
        self.types.iter().filter_map(|t| match t {
            AnnotatedType::Class(c) => Some(c),
            _ => None,
        })
    }

    pub fn structs(&self) -> impl Iterator<Item = &StructBinding> {
        self.types.iter().filter_map(|t| match t {
            AnnotatedType::Struct(s) => Some(s),
            _ => None,
        })
    }

    pub fn enums(&self) -> impl Iterator<Item = &EnumBinding> {
        self.types.iter().filter_map(|t| match t {
            AnnotatedType::Enum(e) => Some(e),
            _ => None,
        })
    }

    pub fn find_class(&self, name: &TypeName) -> Option<&ClassBinding> {
        self.classes().find(|c| &c.name == name)
    }

    pub fn find_struct(&self, name: &TypeName) -> Option<&StructBinding> {
        self.structs().find(|s| &s.name == name)
    }
}
