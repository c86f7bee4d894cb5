//! Well-known names
//!
//! Annotation and runtime type names are resolved against the configured
//! namespaces; generated member names follow fixed patterns so the runtime
//! can locate them by name.

use crate::config::BindingConfig;
use tether_bytecode::{AttrValue, Attribute, AttributeList, TypeDef, TypeName, TypeSig};

/// Simple names of the binding annotations
pub mod attrs {
    pub const NATIVE_CLASS: &str = "NativeClass";
    pub const NATIVE_STRUCT: &str = "NativeStruct";
    pub const NATIVE_ENUM: &str = "NativeEnum";
    pub const NATIVE_PROPERTY: &str = "NativeProperty";
    pub const NATIVE_FUNCTION: &str = "NativeFunction";
    pub const BLITTABLE: &str = "Blittable";

    // Standalone flag annotations
    pub const EDIT_ANYWHERE: &str = "EditAnywhere";
    pub const EDIT_DEFAULTS_ONLY: &str = "EditDefaultsOnly";
    pub const VISIBLE_ANYWHERE: &str = "VisibleAnywhere";
    pub const SCRIPT_READ_ONLY: &str = "ScriptReadOnly";
    pub const SCRIPT_READ_WRITE: &str = "ScriptReadWrite";
    pub const REPLICATED: &str = "Replicated";
    pub const TRANSIENT: &str = "Transient";
    pub const INSTANCED: &str = "Instanced";
    pub const CONFIG: &str = "Config";

    // Named arguments
    pub const ARG_NAME: &str = "Name";
    pub const ARG_FLAGS: &str = "Flags";
    pub const ARG_CATEGORY: &str = "Category";
    pub const ARG_REPLICATED_USING: &str = "ReplicatedUsing";
    pub const ARG_CONDITION: &str = "Condition";
    pub const ARG_CUSTOM_CONDITION: &str = "CustomCondition";
    pub const ARG_ARRAY_DIM: &str = "ArrayDim";
    pub const ARG_SUBOBJECT: &str = "Subobject";
    pub const ARG_ALLOW_PRIVATE_ACCESS: &str = "AllowPrivateAccess";
}

/// Simple names of runtime support types
pub mod runtime_types {
    pub const NATIVE_LAYOUT: &str = "NativeLayout";
    pub const BOOL_MARSHALLER: &str = "BoolMarshaller";
    pub const STRING_MARSHALLER: &str = "StringMarshaller";
    pub const TEXT: &str = "Text";
    pub const TEXT_MARSHALLER: &str = "TextMarshaller";
    pub const OBJECT_MARSHALLER: &str = "ObjectMarshaller";
    pub const WEAK_REF: &str = "WeakRef";
    pub const WEAK_REF_MARSHALLER: &str = "WeakRefMarshaller";
    pub const SUBCLASS_OF: &str = "SubclassOf";
    pub const SUBCLASS_OF_MARSHALLER: &str = "SubclassOfMarshaller";
    pub const FIXED_ARRAY: &str = "FixedArray";
    pub const NATIVE_LIST: &str = "NativeList";
    pub const LIST_MARSHALLER: &str = "ListMarshaller";
}

/// Namespace and name of the list interface mapped to dynamic lists
pub const LIST_INTERFACE: (&str, &str) = ("System.Collections.Generic", "IList");

/// Static field holding the native type handle
pub const NATIVE_CLASS_PTR: &str = "NativeClassPtr";
/// Static field holding a generated struct's native size
pub const NATIVE_DATA_SIZE: &str = "NativeDataSize";
/// Instance field on the native root holding the native instance address
pub const NATIVE_PTR: &str = "NativePtr";
/// Parameter name the native side uses for return values
pub const RETURN_VALUE: &str = "ReturnValue";
/// Method generated on structs to write themselves into native memory
pub const TO_NATIVE: &str = "ToNative";

pub fn backing_field(property: &str) -> String {
    format!("<{}>k__BackingField", property)
}

pub fn getter(property: &str) -> String {
    format!("get_{}", property)
}

pub fn setter(property: &str) -> String {
    format!("set_{}", property)
}

pub fn offset_slot(member: &str) -> String {
    format!("{}_Offset", member)
}

pub fn handle_slot(member: &str) -> String {
    format!("{}_NativeProperty", member)
}

pub fn element_size_slot(member: &str) -> String {
    format!("{}_ElementSize", member)
}

pub fn width_slot(member: &str) -> String {
    format!("{}_Width", member)
}

pub fn wrapper_field(member: &str) -> String {
    format!("{}_Wrapper", member)
}

pub fn function_slot(function: &str) -> String {
    format!("{}_NativeFunction", function)
}

pub fn params_size_slot(function: &str) -> String {
    format!("{}_ParamsSize", function)
}

/// Prefix for per-parameter slots, e.g. `Fire_Target`
pub fn param_slot_prefix(function: &str, param: &str) -> String {
    format!("{}_{}", function, param)
}

pub fn implementation(function: &str) -> String {
    format!("{}_Implementation", function)
}

pub fn invoker(function: &str) -> String {
    format!("Invoke_{}", function)
}

pub fn validate(function: &str) -> String {
    format!("{}_Validate", function)
}

/// Namespace-aware name resolution derived from configuration
#[derive(Debug, Clone)]
pub struct Names {
    attribute_namespace: String,
    runtime_namespace: String,
    native_root: String,
}

impl Names {
    pub fn from_config(config: &BindingConfig) -> Self {
        Self {
            attribute_namespace: config.attribute_namespace.clone(),
            runtime_namespace: config.runtime_namespace.clone(),
            native_root: config.native_root.clone(),
        }
    }

    /// Full name of a binding annotation
    pub fn attr(&self, simple: &str) -> String {
        format!("{}.{}", self.attribute_namespace, simple)
    }

    /// Name of a runtime support type
    pub fn runtime(&self, simple: &str) -> TypeName {
        TypeName::new(&self.runtime_namespace, simple)
    }

    /// Signature of a runtime support type
    pub fn runtime_sig(&self, simple: &str) -> TypeSig {
        TypeSig::Named(self.runtime(simple))
    }

    /// Signature of a generic runtime support type
    pub fn runtime_generic(&self, simple: &str, args: Vec<TypeSig>) -> TypeSig {
        TypeSig::Generic {
            base: self.runtime(simple),
            args,
        }
    }

    /// Name of the native object root class
    pub fn native_root(&self) -> TypeName {
        self.runtime(&self.native_root)
    }

    pub fn native_root_sig(&self) -> TypeSig {
        TypeSig::Named(self.native_root())
    }

    /// Check whether a type name refers to a runtime support type
    pub fn is_runtime(&self, name: &TypeName, simple: &str) -> bool {
        name.namespace == self.runtime_namespace && name.name == simple
    }

    /// Find a binding annotation by simple name
    pub fn find<'a>(&self, attributes: &'a [Attribute], simple: &str) -> Option<&'a Attribute> {
        attributes.find_attr(&self.attr(simple))
    }

    pub fn has(&self, attributes: &[Attribute], simple: &str) -> bool {
        self.find(attributes, simple).is_some()
    }

    /// Native name of a type: the declaring annotation's `Name`, else the simple name
    pub fn native_type_name(&self, ty: &TypeDef, declaring: &str) -> String {
        self.find(&ty.attributes, declaring)
            .and_then(|attr| attr.named_arg(attrs::ARG_NAME))
            .and_then(AttrValue::as_str)
            .filter(|name| !name.is_empty())
            .unwrap_or(&ty.name)
            .to_string()
    }
}
