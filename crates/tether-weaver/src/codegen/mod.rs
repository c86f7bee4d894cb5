//! Instruction emission per binding category
//!
//! Every category knows how to move a value between managed code and native
//! memory. The emitters here append to a [`BodyBuilder`]; they never touch
//! existing method bodies, which keeps rewriting a build-then-commit step.
//!
//! Addresses are always `base + offset` where `base` is an `IntPtr` value
//! (the instance's native address, a parameter buffer, a struct buffer) and
//! `offset` is an `i32` static slot filled in by the type initializer.

mod access;
mod marshal;

use crate::category::BindingCategory;
use crate::names::runtime_types;
use crate::runtime::RuntimeRefs;
use tether_bytecode::module::CONSTRUCTOR_NAME;
use tether_bytecode::{BodyBuilder, Instr, MemberRef, MethodSig, Module, TypeSig};

/// Where a managed value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Arg(u16),
    Local(u16),
    /// Instance field of argument 0
    ThisField(u32),
    Static(u32),
    /// By-ref argument; the type token names the referenced value type
    Deref { arg: u16, ty_token: u32 },
}

impl ValueSource {
    /// Push the value
    pub fn push(self, b: &mut BodyBuilder) {
        match self {
            ValueSource::Arg(index) => b.load_arg(index),
            ValueSource::Local(index) => b.load_local(index),
            ValueSource::ThisField(token) => {
                b.load_arg(0);
                b.emit(Instr::LoadField(token));
            }
            ValueSource::Static(token) => b.load_static(token),
            ValueSource::Deref { arg, ty_token } => {
                b.load_arg(arg);
                b.emit(Instr::LoadObj(ty_token));
            }
        }
    }

    /// Push the address of the value
    pub fn push_address(self, b: &mut BodyBuilder) {
        match self {
            ValueSource::Arg(index) => b.emit(Instr::LoadArgAddr(index)),
            ValueSource::Local(index) => b.emit(Instr::LoadLocalAddr(index)),
            ValueSource::ThisField(token) => {
                b.load_arg(0);
                b.emit(Instr::LoadFieldAddr(token));
            }
            // Statics are only used for plain values
            ValueSource::Static(token) => b.load_static(token),
            ValueSource::Deref { arg, .. } => b.load_arg(arg),
        }
    }
}

/// Native address of a value: `base + offset`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeAddress {
    pub base: ValueSource,
    /// Static `i32` offset slot; `None` addresses the base itself
    pub offset: Option<u32>,
}

impl NativeAddress {
    pub fn new(base: ValueSource, offset: u32) -> Self {
        Self {
            base,
            offset: Some(offset),
        }
    }

    pub fn at(base: ValueSource) -> Self {
        Self { base, offset: None }
    }

    pub fn push(&self, b: &mut BodyBuilder) {
        self.base.push(b);
        if let Some(offset) = self.offset {
            b.load_static(offset);
            b.emit(Instr::ConvI);
            b.emit(Instr::Add);
        }
    }
}

/// Static (and wrapper) slots allocated for one member
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemberSlots {
    pub offset: u32,
    pub handle: Option<u32>,
    pub element_size: Option<u32>,
    pub width: Option<u32>,
    /// Instance field caching a wrapper object
    pub wrapper: Option<u32>,
}

/// Managed wrapper object type cached by a getter, if the category uses one
pub fn wrapper_type(refs: &RuntimeRefs, category: &BindingCategory) -> Option<TypeSig> {
    let names = refs.names();
    match category {
        BindingCategory::Text => Some(names.runtime_sig(runtime_types::TEXT)),
        BindingCategory::FixedArray { inner_ty, .. } => Some(
            names.runtime_generic(runtime_types::FIXED_ARRAY, vec![inner_ty.clone()]),
        ),
        BindingCategory::DynamicList { inner_ty, .. } => Some(
            names.runtime_generic(runtime_types::NATIVE_LIST, vec![inner_ty.clone()]),
        ),
        _ => None,
    }
}

/// Emits category sequences, interning the references they need
pub struct Emitter<'m> {
    module: &'m mut Module,
    refs: &'m RuntimeRefs,
}

impl<'m> Emitter<'m> {
    pub fn new(module: &'m mut Module, refs: &'m RuntimeRefs) -> Self {
        Self { module, refs }
    }

    pub fn module(&mut self) -> &mut Module {
        &mut *self.module
    }

    pub fn refs(&self) -> &'m RuntimeRefs {
        self.refs
    }

    pub fn type_token(&mut self, sig: &TypeSig) -> u32 {
        self.module.intern_type_ref(sig.clone())
    }

    pub fn string(&mut self, value: &str) -> u32 {
        self.module.intern_string(value)
    }

    pub fn member(&mut self, member: MemberRef) -> u32 {
        self.module.intern_member_ref(member)
    }

    /// `ldarg.0; call CheckLiveness`
    pub fn emit_liveness_check(&mut self, b: &mut BodyBuilder) {
        let token = self.refs.check_liveness(&mut *self.module);
        b.load_arg(0);
        b.call(token);
    }

    /// Push the native address of `this`
    pub fn emit_native_base(&mut self, b: &mut BodyBuilder) {
        let token = self.refs.native_ptr(&mut *self.module);
        b.load_arg(0);
        b.emit(Instr::LoadField(token));
    }

    /// Base source reading `this.NativePtr`
    pub fn this_native(&mut self) -> ValueSource {
        ValueSource::ThisField(self.refs.native_ptr(&mut *self.module))
    }

    pub fn emit_load_string(&mut self, b: &mut BodyBuilder, value: &str) {
        let index = self.string(value);
        b.emit(Instr::ConstStr(index));
    }

    fn call_static(
        &mut self,
        b: &mut BodyBuilder,
        owner: TypeSig,
        name: &str,
        params: Vec<TypeSig>,
        ret: TypeSig,
    ) {
        let token = self.member(MemberRef::method(owner, name, MethodSig::static_fn(params, ret)));
        b.call(token);
    }

    fn call_instance(
        &mut self,
        b: &mut BodyBuilder,
        owner: TypeSig,
        name: &str,
        params: Vec<TypeSig>,
        ret: TypeSig,
    ) {
        let token = self.member(MemberRef::method(owner, name, MethodSig::instance(params, ret)));
        b.call(token);
    }

    fn new_object(&mut self, b: &mut BodyBuilder, owner: TypeSig, params: Vec<TypeSig>) {
        let token = self.member(MemberRef::method(
            owner,
            CONSTRUCTOR_NAME,
            MethodSig::instance(params, TypeSig::Void),
        ));
        b.emit(Instr::NewObj(token));
    }
}
