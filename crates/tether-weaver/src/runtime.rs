//! Runtime collaborators referenced by generated code
//!
//! Generated bodies call into two runtime types: the native object root,
//! which owns the native instance address and dispatch helpers, and the
//! native layout service, which answers handle and offset queries while a
//! type initializer runs. Member references are interned lazily so a module
//! only gains the references its generated code actually uses.

use crate::category::{BindingCategory, StructRepr};
use crate::context::ProcessingContext;
use crate::error::{WeaveError, WeaveResult};
use crate::names::{self, runtime_types, Names};
use tether_bytecode::{MemberRef, MethodSig, Module, TypeName, TypeSig};

/// Queries answered by the native layout service
///
/// Generated type initializers call these through the runtime's
/// `NativeLayout` type; tooling that executes generated code implements the
/// trait directly.
pub trait NativeLayoutService {
    fn resolve_native_type(&self, name: &str) -> usize;
    fn resolve_struct_size(&self, type_handle: usize) -> i32;
    fn resolve_property_offset(&self, type_handle: usize, name: &str) -> i32;
    fn resolve_property_handle(&self, type_handle: usize, name: &str) -> usize;
    fn resolve_function_handle(&self, type_handle: usize, name: &str) -> usize;
    fn resolve_function_arguments_size(&self, function_handle: usize) -> i32;
    fn resolve_boolean_storage_width(&self) -> i32;
    fn resolve_array_element_size(&self, type_handle: usize, name: &str) -> i32;
}

/// Layout query behind a `NativeLayout` method name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutQuery {
    NativeType,
    StructSize,
    PropertyOffset,
    PropertyHandle,
    FunctionHandle,
    FunctionArgumentsSize,
    BooleanStorageWidth,
    ArrayElementSize,
}

impl LayoutQuery {
    const ALL: [(LayoutQuery, &'static str); 8] = [
        (LayoutQuery::NativeType, "ResolveNativeType"),
        (LayoutQuery::StructSize, "GetStructSize"),
        (LayoutQuery::PropertyOffset, "GetPropertyOffset"),
        (LayoutQuery::PropertyHandle, "GetPropertyHandle"),
        (LayoutQuery::FunctionHandle, "GetFunctionHandle"),
        (LayoutQuery::FunctionArgumentsSize, "GetFunctionArgumentsSize"),
        (LayoutQuery::BooleanStorageWidth, "GetBoolStorageWidth"),
        (LayoutQuery::ArrayElementSize, "GetArrayElementSize"),
    ];

    /// Runtime method name
    pub fn method_name(self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(query, _)| *query == self)
            .map(|(_, name)| *name)
            .unwrap_or_default()
    }

    /// Query for a runtime method name
    pub fn from_method_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(query, _)| *query)
    }

    /// Caller signature of the runtime method
    pub fn signature(self) -> MethodSig {
        use TypeSig::{IntPtr, String, I32};
        let (params, ret) = match self {
            LayoutQuery::NativeType => (vec![String], IntPtr),
            LayoutQuery::StructSize => (vec![IntPtr], I32),
            LayoutQuery::PropertyOffset => (vec![IntPtr, String], I32),
            LayoutQuery::PropertyHandle => (vec![IntPtr, String], IntPtr),
            LayoutQuery::FunctionHandle => (vec![IntPtr, String], IntPtr),
            LayoutQuery::FunctionArgumentsSize => (vec![IntPtr], I32),
            LayoutQuery::BooleanStorageWidth => (vec![], I32),
            LayoutQuery::ArrayElementSize => (vec![IntPtr, String], I32),
        };
        MethodSig::static_fn(params, ret)
    }
}

/// Interns references to runtime members on demand
#[derive(Debug, Clone)]
pub struct RuntimeRefs {
    names: Names,
    root: TypeSig,
    layout: TypeSig,
}

impl RuntimeRefs {
    /// Check that every runtime type the bindings need is reachable
    pub fn resolve<'c>(
        ctx: &ProcessingContext,
        module: &Module,
        categories: impl IntoIterator<Item = &'c BindingCategory>,
    ) -> WeaveResult<Self> {
        let resolver = ctx.resolver(module);
        let names = &ctx.names;

        let mut required = vec![names.native_root(), names.runtime(runtime_types::NATIVE_LAYOUT)];
        for category in categories {
            collect_runtime_types(names, category, &mut required);
        }
        for name in &required {
            if resolver.resolve(name).is_none() {
                return Err(WeaveError::MissingCollaborator(name.full_name()));
            }
        }

        Ok(Self::unchecked(names))
    }

    /// References without checking that the runtime types exist
    pub fn unchecked(names: &Names) -> Self {
        Self {
            names: names.clone(),
            root: names.native_root_sig(),
            layout: names.runtime_sig(runtime_types::NATIVE_LAYOUT),
        }
    }

    pub fn names(&self) -> &Names {
        &self.names
    }

    /// Signature of the native object root
    pub fn root(&self) -> &TypeSig {
        &self.root
    }

    // ===== Native object root =====

    /// Instance field holding the native address
    pub fn native_ptr(&self, module: &mut Module) -> u32 {
        module.intern_member_ref(MemberRef::field(
            self.root.clone(),
            names::NATIVE_PTR,
            TypeSig::IntPtr,
        ))
    }

    /// Throws when the native counterpart has been destroyed
    pub fn check_liveness(&self, module: &mut Module) -> u32 {
        self.root_method(module, "CheckLiveness", MethodSig::instance(vec![], TypeSig::Void))
    }

    pub fn create_default_subobject(&self, module: &mut Module) -> u32 {
        let sig = MethodSig::instance(vec![TypeSig::String, TypeSig::IntPtr], self.root.clone());
        self.root_method(module, "CreateDefaultSubobject", sig)
    }

    /// Per-instance function lookup, honoring native overrides
    pub fn resolve_function_on_instance(&self, module: &mut Module) -> u32 {
        let sig = MethodSig::instance(vec![TypeSig::String], TypeSig::IntPtr);
        self.root_method(module, "ResolveFunctionOnInstance", sig)
    }

    /// `InvokeNativeFunction(object, function, params)`
    pub fn invoke_native_function(&self, module: &mut Module) -> u32 {
        let sig = MethodSig::static_fn(
            vec![TypeSig::IntPtr, TypeSig::IntPtr, TypeSig::IntPtr],
            TypeSig::Void,
        );
        self.root_method(module, "InvokeNativeFunction", sig)
    }

    pub fn report_validation_failure(&self, module: &mut Module) -> u32 {
        let sig = MethodSig::static_fn(vec![TypeSig::String], TypeSig::Void);
        self.root_method(module, "ReportValidationFailure", sig)
    }

    /// Class default object used as the receiver of static functions
    pub fn get_default_object(&self, module: &mut Module) -> u32 {
        let sig = MethodSig::static_fn(vec![TypeSig::IntPtr], TypeSig::IntPtr);
        self.root_method(module, "GetDefaultObject", sig)
    }

    fn root_method(&self, module: &mut Module, name: &str, sig: MethodSig) -> u32 {
        module.intern_member_ref(MemberRef::method(self.root.clone(), name, sig))
    }

    // ===== Native layout service =====

    pub fn layout(&self, module: &mut Module, query: LayoutQuery) -> u32 {
        module.intern_member_ref(MemberRef::method(
            self.layout.clone(),
            query.method_name(),
            query.signature(),
        ))
    }
}

/// Runtime types generated code for a category refers to
fn collect_runtime_types(names: &Names, category: &BindingCategory, out: &mut Vec<TypeName>) {
    match category {
        BindingCategory::Scalar(_) | BindingCategory::Enum { .. } => {}
        BindingCategory::Boolean => push_unique(out, names.runtime(runtime_types::BOOL_MARSHALLER)),
        BindingCategory::String => push_unique(out, names.runtime(runtime_types::STRING_MARSHALLER)),
        BindingCategory::Text => {
            push_unique(out, names.runtime(runtime_types::TEXT));
            push_unique(out, names.runtime(runtime_types::TEXT_MARSHALLER));
        }
        BindingCategory::Struct { repr, owner, .. } => {
            if *repr == StructRepr::Core {
                push_unique(out, core_marshaller(owner));
            }
        }
        BindingCategory::ObjectReference { .. } | BindingCategory::SubobjectReference { .. } => {
            push_unique(out, names.runtime(runtime_types::OBJECT_MARSHALLER))
        }
        BindingCategory::WeakReference { .. } => {
            push_unique(out, names.runtime(runtime_types::WEAK_REF_MARSHALLER))
        }
        BindingCategory::ClassReference { .. } => {
            push_unique(out, names.runtime(runtime_types::SUBCLASS_OF_MARSHALLER))
        }
        BindingCategory::FixedArray { inner, .. } => {
            push_unique(out, names.runtime(runtime_types::FIXED_ARRAY));
            collect_runtime_types(names, inner, out);
        }
        BindingCategory::DynamicList { inner, .. } => {
            push_unique(out, names.runtime(runtime_types::NATIVE_LIST));
            push_unique(out, names.runtime(runtime_types::LIST_MARSHALLER));
            collect_runtime_types(names, inner, out);
        }
    }
}

fn push_unique(out: &mut Vec<TypeName>, name: TypeName) {
    if !out.contains(&name) {
        out.push(name);
    }
}

/// Dedicated marshaller of a core struct, e.g. `Tether.Math.VectorMarshaller`
pub fn core_marshaller(owner: &TypeName) -> TypeName {
    TypeName::new(owner.namespace.clone(), format!("{}Marshaller", owner.name))
}
