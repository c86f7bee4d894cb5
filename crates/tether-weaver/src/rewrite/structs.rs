//! Generated marshaling members for non-blittable structs
//!
//! A struct gets a constructor reading every exposed field from a native
//! buffer and a `ToNative` method writing them back. Both use offsets
//! resolved once in the type initializer.

use super::{member_slots, static_slot, TypeInitializer, TypePlan};
use crate::category::BindingCategory;
use crate::codegen::{Emitter, NativeAddress, ValueSource};
use crate::error::{WeaveError, WeaveResult};
use crate::model::{MemberOrigin, StructBinding};
use crate::names;
use tether_bytecode::module::{method_flags, CONSTRUCTOR_NAME, TYPE_INITIALIZER_NAME};
use tether_bytecode::{BodyBuilder, Instr, MemberRef, MethodDef, ParamDef, TypeDef, TypeSig};

pub(super) fn plan_struct(
    def: &TypeDef,
    binding: &StructBinding,
    mut e: Emitter<'_>,
) -> WeaveResult<TypePlan> {
    let owner = def.as_sig();
    let mut plan = TypePlan::new(binding.type_index);
    let mut init = TypeInitializer::new();

    let class_ptr = static_slot(&mut e, &mut plan, &owner, names::NATIVE_CLASS_PTR, TypeSig::IntPtr);
    let size = static_slot(&mut e, &mut plan, &owner, names::NATIVE_DATA_SIZE, TypeSig::I32);
    init.resolve_type(&mut e, class_ptr, &binding.native_name);
    init.struct_size(&mut e, class_ptr, size);

    let mut from_native = BodyBuilder::new();
    let mut to_native = BodyBuilder::new();
    let buffer = ValueSource::Arg(1);

    for member in &binding.members {
        let MemberOrigin::Field(index) = member.origin else {
            return Err(WeaveError::Inconsistent(format!(
                "struct member '{}' is not a field",
                member.name
            )));
        };
        let field = def.fields.get(index).ok_or_else(|| {
            WeaveError::Inconsistent(format!("field '{}' moved during rewriting", member.name))
        })?;
        let ty = member.value_type();
        let slots = member_slots(&mut e, &mut plan, &owner, &member.name, &member.category);
        init.member(&mut e, class_ptr, &member.native_name, &slots);
        let token = e.member(MemberRef::field(owner.clone(), &field.name, field.ty.clone()));
        let addr = NativeAddress::new(buffer, slots.offset);

        from_native.load_arg(0);
        e.emit_marshal_from_native(&mut from_native, &member.category, ty, &slots, &addr)?;
        from_native.emit(Instr::StoreField(token));

        // Fixed arrays are views over native memory and have nothing to copy back
        if !matches!(member.category, BindingCategory::FixedArray { .. }) {
            e.emit_marshal_to_native(
                &mut to_native,
                &member.category,
                ty,
                &slots,
                &addr,
                ValueSource::ThisField(token),
            )?;
        }
    }
    from_native.ret();
    to_native.ret();

    let mut ctor = MethodDef::new(
        CONSTRUCTOR_NAME,
        vec![ParamDef::new("buffer", TypeSig::IntPtr)],
        TypeSig::Void,
    );
    ctor.flags = method_flags::SPECIAL_NAME;
    ctor.body = Some(from_native.build()?);
    plan.add_method(ctor);

    let mut write = MethodDef::new(
        names::TO_NATIVE,
        vec![ParamDef::new("buffer", TypeSig::IntPtr)],
        TypeSig::Void,
    );
    write.body = Some(to_native.build()?);
    plan.add_method(write);

    plan.initializer = init.finish()?;
    plan.touch(TYPE_INITIALIZER_NAME);
    Ok(plan)
}
