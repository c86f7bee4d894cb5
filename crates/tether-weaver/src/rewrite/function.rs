//! Exposed function rewriting
//!
//! An exposed function `F` becomes three methods:
//!
//! - `F`, a shim that packs its arguments into a native parameter buffer and
//!   calls the native function through its handle
//! - `F_Implementation`, the original body under a new name
//! - `Invoke_F(buffer, returnBuffer)`, the entry point native code calls to
//!   run the managed implementation
//!
//! Every parameter and the return value occupy a slot in the same buffer;
//! their offsets are resolved from the function handle at type initialization.

use super::class::ClassPlanner;
use super::{member_slots, static_slot};
use crate::codegen::{MemberSlots, NativeAddress, ValueSource};
use crate::error::{WeaveError, WeaveResult};
use crate::model::{FunctionBinding, MemberBinding, MemberOrigin};
use crate::names;
use tether_bytecode::module::method_flags;
use tether_bytecode::{
    Access, BodyBuilder, Instr, MemberRef, MethodBody, MethodDef, MethodSig, ParamDef, TypeSig,
};

/// One value crossing the call boundary with its slots
struct Slotted<'f> {
    value: &'f MemberBinding,
    slots: MemberSlots,
    /// Argument index on the shim (includes `this`); `None` for the return value
    arg: Option<u16>,
}

impl<'p> ClassPlanner<'p, '_> {
    pub(super) fn rewrite_function(&mut self, function: &FunctionBinding) -> WeaveResult<()> {
        let def = self.def;
        let original = def.methods.get(function.method_index).ok_or_else(|| {
            WeaveError::Inconsistent(format!("exposed function '{}' moved", function.name))
        })?;
        let has_this = !original.is_static();

        let fn_slot = static_slot(
            &mut self.e,
            &mut self.plan,
            &self.owner,
            &names::function_slot(&function.name),
            TypeSig::IntPtr,
        );
        let size_slot = static_slot(
            &mut self.e,
            &mut self.plan,
            &self.owner,
            &names::params_size_slot(&function.name),
            TypeSig::I32,
        );
        self.init
            .function(&mut self.e, self.class_ptr, &function.native_name, fn_slot, size_slot);

        let mut values = Vec::new();
        for value in function.all_values() {
            let prefix = names::param_slot_prefix(&function.name, &value.name);
            let slots = member_slots(&mut self.e, &mut self.plan, &self.owner, &prefix, &value.category);
            self.init
                .member(&mut self.e, fn_slot, &value.native_name, &slots);
            let arg = match value.origin {
                MemberOrigin::Param(index) => Some(arg_index(index, has_this)?),
                _ => None,
            };
            values.push(Slotted { value, slots, arg });
        }

        let implementation = names::implementation(&function.name);
        self.plan
            .renames
            .push((function.method_index, implementation.clone()));
        if self.plan.has_body(function.method_index) {
            self.plan.touch(&implementation);
        }

        let shim_body = self.shim_body(function, has_this, fn_slot, size_slot, &values)?;
        let mut shim = MethodDef::new(&original.name, original.params.clone(), original.return_type.clone());
        shim.access = original.access;
        shim.flags = original.flags & !(method_flags::VIRTUAL | method_flags::ABSTRACT);
        shim.attributes = original.attributes.clone();
        shim.source = original.source.clone();
        shim.body = Some(shim_body);
        self.plan.add_method(shim);

        let invoker_body = self.invoker_body(function, original, has_this, &values)?;
        let mut invoker = MethodDef::new(
            &names::invoker(&function.name),
            vec![
                ParamDef::new("buffer", TypeSig::IntPtr),
                ParamDef::new("returnBuffer", TypeSig::IntPtr),
            ],
            TypeSig::Void,
        );
        invoker.access = Access::Public;
        invoker.flags = method_flags::COMPILER_GENERATED
            | if has_this { 0 } else { method_flags::STATIC };
        invoker.source = original.source.clone();
        invoker.body = Some(invoker_body);
        self.plan.add_method(invoker);
        Ok(())
    }

    /// Managed-to-native call through the parameter buffer
    fn shim_body(
        &mut self,
        function: &FunctionBinding,
        has_this: bool,
        fn_slot: u32,
        size_slot: u32,
        values: &[Slotted<'_>],
    ) -> WeaveResult<MethodBody> {
        let mut b = BodyBuilder::new();
        if has_this {
            self.e.emit_liveness_check(&mut b);
        }

        let buffer = b.add_local(TypeSig::IntPtr)?;
        b.load_static(size_slot);
        b.emit(Instr::LocalAlloc);
        b.store_local(buffer);
        b.load_local(buffer);
        b.const_i32(0);
        b.load_static(size_slot);
        b.emit(Instr::InitBlock);

        for slotted in values {
            let (Some(arg), value) = (slotted.arg, slotted.value) else {
                continue;
            };
            if !value.is_input() {
                continue;
            }
            let ty = value.value_type();
            let source = if value.is_by_ref() {
                ValueSource::Deref {
                    arg,
                    ty_token: self.e.type_token(ty),
                }
            } else {
                ValueSource::Arg(arg)
            };
            let addr = NativeAddress::new(ValueSource::Local(buffer), slotted.slots.offset);
            self.e
                .emit_marshal_to_native(&mut b, &value.category, ty, &slotted.slots, &addr, source)?;
        }

        // Receiver
        if has_this {
            self.e.emit_native_base(&mut b);
        } else {
            let default_object = self.e.refs().get_default_object(self.e.module());
            b.load_static(self.class_ptr);
            b.call(default_object);
        }
        // Function handle; native events may be overridden per instance
        if has_this && function.is_native_event() {
            let resolve = self.e.refs().resolve_function_on_instance(self.e.module());
            b.load_arg(0);
            self.e.emit_load_string(&mut b, &function.native_name);
            b.call(resolve);
        } else {
            b.load_static(fn_slot);
        }
        b.load_local(buffer);
        let invoke = self.e.refs().invoke_native_function(self.e.module());
        b.call(invoke);

        for slotted in values {
            let (Some(arg), value) = (slotted.arg, slotted.value) else {
                continue;
            };
            if !value.is_by_ref() {
                continue;
            }
            let ty = value.value_type();
            let ty_token = self.e.type_token(ty);
            let addr = NativeAddress::new(ValueSource::Local(buffer), slotted.slots.offset);
            b.load_arg(arg);
            self.e
                .emit_marshal_from_native(&mut b, &value.category, ty, &slotted.slots, &addr)?;
            b.emit(Instr::StoreObj(ty_token));
        }

        let mut result = None;
        if let Some(ret) = values.iter().find(|s| s.arg.is_none()) {
            let ty = ret.value.value_type();
            let local = b.add_local(ty.clone())?;
            let addr = NativeAddress::new(ValueSource::Local(buffer), ret.slots.offset);
            self.e
                .emit_marshal_from_native(&mut b, &ret.value.category, ty, &ret.slots, &addr)?;
            b.store_local(local);
            result = Some(local);
        }

        // Cleanup runs straight after the call; no protected region guards it,
        // so a throwing call leaks the marshaled arguments
        for slotted in values.iter().filter(|s| s.value.category.needs_cleanup()) {
            let addr = NativeAddress::new(ValueSource::Local(buffer), slotted.slots.offset);
            self.e
                .emit_cleanup(&mut b, &slotted.value.category, &slotted.slots, &addr)?;
        }

        if let Some(local) = result {
            b.load_local(local);
        }
        b.ret();
        Ok(b.build()?)
    }

    /// Native-to-managed entry point calling the original body
    fn invoker_body(
        &mut self,
        function: &FunctionBinding,
        original: &MethodDef,
        has_this: bool,
        values: &[Slotted<'_>],
    ) -> WeaveResult<MethodBody> {
        let buffer_arg = u16::from(has_this);
        let return_arg = buffer_arg + 1;
        let mut b = BodyBuilder::new();

        // Unpack parameters into locals
        let mut locals = Vec::new();
        for slotted in values.iter().filter(|s| s.arg.is_some()) {
            let value = slotted.value;
            let ty = value.value_type();
            let local = b.add_local(ty.clone())?;
            if value.is_input() {
                let addr = NativeAddress::new(ValueSource::Arg(buffer_arg), slotted.slots.offset);
                self.e
                    .emit_marshal_from_native(&mut b, &value.category, ty, &slotted.slots, &addr)?;
                b.store_local(local);
            }
            locals.push((slotted, local));
        }

        let push_args = |b: &mut BodyBuilder| {
            if has_this {
                b.load_arg(0);
            }
            for (slotted, local) in &locals {
                if slotted.value.is_by_ref() {
                    b.emit(Instr::LoadLocalAddr(*local));
                } else {
                    b.load_local(*local);
                }
            }
        };

        if function.has_validation() {
            let validate = self.e.member(MemberRef::method(
                self.owner.clone(),
                &names::validate(&function.name),
                MethodSig {
                    has_this,
                    params: original.params.iter().map(|p| p.ty.clone()).collect(),
                    ret: TypeSig::Bool,
                },
            ));
            let report = self.e.refs().report_validation_failure(self.e.module());
            let valid = b.new_label();
            push_args(&mut b);
            b.call(validate);
            b.jmp_if_true(valid);
            self.e
                .emit_load_string(&mut b, &format!("{} failed validation", function.name));
            b.call(report);
            b.ret();
            b.bind(valid);
        }

        let implementation = self.e.member(MemberRef::method(
            self.owner.clone(),
            &names::implementation(&function.name),
            original.signature(),
        ));
        push_args(&mut b);
        if original.is_virtual() {
            b.emit(Instr::CallVirt(implementation));
        } else {
            b.call(implementation);
        }

        if let Some(ret) = values.iter().find(|s| s.arg.is_none()) {
            let ty = ret.value.value_type();
            let local = b.add_local(ty.clone())?;
            b.store_local(local);
            let addr = NativeAddress::at(ValueSource::Arg(return_arg));
            self.e.emit_marshal_to_native(
                &mut b,
                &ret.value.category,
                ty,
                &ret.slots,
                &addr,
                ValueSource::Local(local),
            )?;
        }

        for (slotted, local) in locals.iter().filter(|(s, _)| s.value.is_by_ref()) {
            let value = slotted.value;
            let addr = NativeAddress::new(ValueSource::Arg(buffer_arg), slotted.slots.offset);
            self.e.emit_marshal_to_native(
                &mut b,
                &value.category,
                value.value_type(),
                &slotted.slots,
                &addr,
                ValueSource::Local(*local),
            )?;
        }
        b.ret();
        Ok(b.build()?)
    }
}

fn arg_index(param: usize, has_this: bool) -> WeaveResult<u16> {
    u16::try_from(param + usize::from(has_this))
        .map_err(|_| WeaveError::Inconsistent(format!("parameter index {} out of range", param)))
}
