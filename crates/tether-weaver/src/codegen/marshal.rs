//! Copying values between managed code and native memory

use super::{Emitter, MemberSlots, NativeAddress, ValueSource};
use crate::category::{BindingCategory, StructRepr};
use crate::error::{WeaveError, WeaveResult};
use crate::names::{self, runtime_types};
use crate::runtime::core_marshaller;
use tether_bytecode::{BodyBuilder, Instr, NativeKind, TypeSig};

fn required(slot: Option<u32>, what: &str, category: &BindingCategory) -> WeaveResult<u32> {
    slot.ok_or_else(|| {
        WeaveError::Inconsistent(format!("{} slot missing for category {}", what, category))
    })
}

impl Emitter<'_> {
    /// Push the managed value stored at `addr`
    ///
    /// `ty` is the declared value type with any by-ref wrapper removed.
    pub fn emit_marshal_from_native(
        &mut self,
        b: &mut BodyBuilder,
        category: &BindingCategory,
        ty: &TypeSig,
        slots: &MemberSlots,
        addr: &NativeAddress,
    ) -> WeaveResult<()> {
        let names = self.refs().names();
        match category {
            BindingCategory::Scalar(kind) => {
                addr.push(b);
                b.load_ind(*kind);
            }
            BindingCategory::Enum { .. } => {
                addr.push(b);
                b.load_ind(NativeKind::U8);
            }
            BindingCategory::Boolean => {
                let width = required(slots.width, "width", category)?;
                addr.push(b);
                b.load_static(width);
                self.call_static(
                    b,
                    names.runtime_sig(runtime_types::BOOL_MARSHALLER),
                    "FromNative",
                    vec![TypeSig::IntPtr, TypeSig::I32],
                    TypeSig::Bool,
                );
            }
            BindingCategory::String => {
                let handle = required(slots.handle, "property handle", category)?;
                b.load_static(handle);
                addr.push(b);
                self.call_static(
                    b,
                    names.runtime_sig(runtime_types::STRING_MARSHALLER),
                    "FromNative",
                    vec![TypeSig::IntPtr, TypeSig::IntPtr],
                    TypeSig::String,
                );
            }
            BindingCategory::Text => {
                addr.push(b);
                self.call_static(
                    b,
                    names.runtime_sig(runtime_types::TEXT_MARSHALLER),
                    "FromNative",
                    vec![TypeSig::IntPtr],
                    names.runtime_sig(runtime_types::TEXT),
                );
            }
            BindingCategory::Struct { repr, owner, .. } => match repr {
                StructRepr::Blittable => {
                    let token = self.type_token(ty);
                    addr.push(b);
                    b.emit(Instr::LoadObj(token));
                }
                StructRepr::Core => {
                    addr.push(b);
                    self.call_static(
                        b,
                        TypeSig::Named(core_marshaller(owner)),
                        "FromNative",
                        vec![TypeSig::IntPtr],
                        ty.clone(),
                    );
                }
                StructRepr::Generic => {
                    addr.push(b);
                    self.new_object(b, ty.clone(), vec![TypeSig::IntPtr]);
                }
            },
            BindingCategory::ObjectReference { target }
            | BindingCategory::SubobjectReference { target } => {
                addr.push(b);
                self.call_static(
                    b,
                    names.runtime_sig(runtime_types::OBJECT_MARSHALLER),
                    "FromNative",
                    vec![TypeSig::IntPtr],
                    names.native_root_sig(),
                );
                let token = self.type_token(target);
                b.emit(Instr::CastClass(token));
            }
            BindingCategory::WeakReference { inner } => {
                addr.push(b);
                self.call_static(
                    b,
                    names.runtime_generic(runtime_types::WEAK_REF_MARSHALLER, vec![inner.clone()]),
                    "FromNative",
                    vec![TypeSig::IntPtr],
                    ty.clone(),
                );
            }
            BindingCategory::ClassReference { constraint } => {
                addr.push(b);
                self.call_static(
                    b,
                    names.runtime_generic(
                        runtime_types::SUBCLASS_OF_MARSHALLER,
                        vec![constraint.clone()],
                    ),
                    "FromNative",
                    vec![TypeSig::IntPtr],
                    ty.clone(),
                );
            }
            BindingCategory::FixedArray { inner_ty, dim, .. } => {
                let handle = required(slots.handle, "property handle", category)?;
                let element_size = required(slots.element_size, "element size", category)?;
                b.load_static(handle);
                addr.push(b);
                b.const_i32(*dim as i32);
                b.load_static(element_size);
                self.new_object(
                    b,
                    names.runtime_generic(runtime_types::FIXED_ARRAY, vec![inner_ty.clone()]),
                    vec![TypeSig::IntPtr, TypeSig::IntPtr, TypeSig::I32, TypeSig::I32],
                );
            }
            BindingCategory::DynamicList { inner_ty, .. } => {
                let handle = required(slots.handle, "property handle", category)?;
                b.load_static(handle);
                addr.push(b);
                self.call_static(
                    b,
                    names.runtime_generic(runtime_types::LIST_MARSHALLER, vec![inner_ty.clone()]),
                    "FromNative",
                    vec![TypeSig::IntPtr, TypeSig::IntPtr],
                    ty.clone(),
                );
            }
        }
        Ok(())
    }

    /// Write the managed value from `value` to `addr`
    pub fn emit_marshal_to_native(
        &mut self,
        b: &mut BodyBuilder,
        category: &BindingCategory,
        ty: &TypeSig,
        slots: &MemberSlots,
        addr: &NativeAddress,
        value: ValueSource,
    ) -> WeaveResult<()> {
        let names = self.refs().names();
        match category {
            BindingCategory::Scalar(kind) => {
                addr.push(b);
                value.push(b);
                b.store_ind(*kind);
            }
            BindingCategory::Enum { .. } => {
                addr.push(b);
                value.push(b);
                b.store_ind(NativeKind::U8);
            }
            BindingCategory::Boolean => {
                let width = required(slots.width, "width", category)?;
                addr.push(b);
                b.load_static(width);
                value.push(b);
                self.call_static(
                    b,
                    names.runtime_sig(runtime_types::BOOL_MARSHALLER),
                    "ToNative",
                    vec![TypeSig::IntPtr, TypeSig::I32, TypeSig::Bool],
                    TypeSig::Void,
                );
            }
            BindingCategory::String => {
                let handle = required(slots.handle, "property handle", category)?;
                b.load_static(handle);
                addr.push(b);
                value.push(b);
                self.call_static(
                    b,
                    names.runtime_sig(runtime_types::STRING_MARSHALLER),
                    "ToNative",
                    vec![TypeSig::IntPtr, TypeSig::IntPtr, TypeSig::String],
                    TypeSig::Void,
                );
            }
            BindingCategory::Text => {
                addr.push(b);
                value.push(b);
                self.call_static(
                    b,
                    names.runtime_sig(runtime_types::TEXT_MARSHALLER),
                    "ToNative",
                    vec![TypeSig::IntPtr, names.runtime_sig(runtime_types::TEXT)],
                    TypeSig::Void,
                );
            }
            BindingCategory::Struct { repr, owner, .. } => match repr {
                StructRepr::Blittable => {
                    let token = self.type_token(ty);
                    addr.push(b);
                    value.push(b);
                    b.emit(Instr::StoreObj(token));
                }
                StructRepr::Core => {
                    addr.push(b);
                    value.push(b);
                    self.call_static(
                        b,
                        TypeSig::Named(core_marshaller(owner)),
                        "ToNative",
                        vec![TypeSig::IntPtr, ty.clone()],
                        TypeSig::Void,
                    );
                }
                StructRepr::Generic => {
                    value.push_address(b);
                    addr.push(b);
                    self.call_instance(
                        b,
                        ty.clone(),
                        names::TO_NATIVE,
                        vec![TypeSig::IntPtr],
                        TypeSig::Void,
                    );
                }
            },
            BindingCategory::ObjectReference { .. } | BindingCategory::SubobjectReference { .. } => {
                addr.push(b);
                value.push(b);
                self.call_static(
                    b,
                    names.runtime_sig(runtime_types::OBJECT_MARSHALLER),
                    "ToNative",
                    vec![TypeSig::IntPtr, names.native_root_sig()],
                    TypeSig::Void,
                );
            }
            BindingCategory::WeakReference { inner } => {
                addr.push(b);
                value.push(b);
                self.call_static(
                    b,
                    names.runtime_generic(runtime_types::WEAK_REF_MARSHALLER, vec![inner.clone()]),
                    "ToNative",
                    vec![TypeSig::IntPtr, ty.clone()],
                    TypeSig::Void,
                );
            }
            BindingCategory::ClassReference { constraint } => {
                addr.push(b);
                value.push(b);
                self.call_static(
                    b,
                    names.runtime_generic(
                        runtime_types::SUBCLASS_OF_MARSHALLER,
                        vec![constraint.clone()],
                    ),
                    "ToNative",
                    vec![TypeSig::IntPtr, ty.clone()],
                    TypeSig::Void,
                );
            }
            BindingCategory::FixedArray { .. } => {
                return Err(WeaveError::Inconsistent(format!(
                    "category {} has no value store",
                    category
                )));
            }
            BindingCategory::DynamicList { inner_ty, .. } => {
                let handle = required(slots.handle, "property handle", category)?;
                b.load_static(handle);
                addr.push(b);
                value.push(b);
                self.call_static(
                    b,
                    names.runtime_generic(runtime_types::LIST_MARSHALLER, vec![inner_ty.clone()]),
                    "ToNative",
                    vec![TypeSig::IntPtr, TypeSig::IntPtr, ty.clone()],
                    TypeSig::Void,
                );
            }
        }
        Ok(())
    }

    /// Release native resources a marshaled value holds at `addr`
    ///
    /// Emits nothing for categories without cleanup.
    pub fn emit_cleanup(
        &mut self,
        b: &mut BodyBuilder,
        category: &BindingCategory,
        slots: &MemberSlots,
        addr: &NativeAddress,
    ) -> WeaveResult<()> {
        let names = self.refs().names();
        match category {
            BindingCategory::String => {
                let handle = required(slots.handle, "property handle", category)?;
                b.load_static(handle);
                addr.push(b);
                self.call_static(
                    b,
                    names.runtime_sig(runtime_types::STRING_MARSHALLER),
                    "DestructInstance",
                    vec![TypeSig::IntPtr, TypeSig::IntPtr],
                    TypeSig::Void,
                );
            }
            BindingCategory::Text => {
                addr.push(b);
                self.call_static(
                    b,
                    names.runtime_sig(runtime_types::TEXT_MARSHALLER),
                    "DestructInstance",
                    vec![TypeSig::IntPtr],
                    TypeSig::Void,
                );
            }
            BindingCategory::DynamicList { inner_ty, .. } => {
                let handle = required(slots.handle, "property handle", category)?;
                b.load_static(handle);
                addr.push(b);
                self.call_static(
                    b,
                    names.runtime_generic(runtime_types::LIST_MARSHALLER, vec![inner_ty.clone()]),
                    "DestructInstance",
                    vec![TypeSig::IntPtr, TypeSig::IntPtr],
                    TypeSig::Void,
                );
            }
            _ => {}
        }
        Ok(())
    }

    /// Put native memory at `addr` into the category's valid empty state
    pub fn emit_default_init(
        &mut self,
        b: &mut BodyBuilder,
        category: &BindingCategory,
        addr: &NativeAddress,
    ) {
        if let BindingCategory::Text = category {
            addr.push(b);
            self.call_static(
                b,
                self.refs().names().runtime_sig(runtime_types::TEXT_MARSHALLER),
                "InitializeDefault",
                vec![TypeSig::IntPtr],
                TypeSig::Void,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ProcessingContext;
    use crate::runtime::RuntimeRefs;
    use tether_bytecode::{Module, TypeDef, TypeKind, TypeName};

    fn refs() -> (Module, RuntimeRefs) {
        let mut module = Module::new("Game");
        for name in ["NativeObject", "NativeLayout"] {
            module
                .types
                .push(TypeDef::new("Tether.Runtime", name, TypeKind::Class));
        }
        let ctx = ProcessingContext::with_defaults();
        let refs =
            RuntimeRefs::resolve(&ctx, &module, std::iter::empty::<&BindingCategory>()).unwrap();
        (module, refs)
    }

    fn called(module: &Module, instr: &Instr) -> String {
        let token = instr.member_token().unwrap();
        let member = module.member_ref(token).unwrap();
        format!("{}::{}", member.owner, member.name)
    }

    #[test]
    fn test_scalar_round_trip_sequence() {
        let (mut module, refs) = refs();
        let mut emitter = Emitter::new(&mut module, &refs);
        let addr = NativeAddress::new(ValueSource::Arg(0), 9);
        let slots = MemberSlots::default();
        let category = BindingCategory::Scalar(NativeKind::F32);
        let mut b = BodyBuilder::new();
        emitter
            .emit_marshal_to_native(&mut b, &category, &TypeSig::F32, &slots, &addr, ValueSource::Arg(1))
            .unwrap();
        emitter
            .emit_marshal_from_native(&mut b, &category, &TypeSig::F32, &slots, &addr)
            .unwrap();
        let (list, _) = b.into_list().unwrap();
        assert_eq!(list.get(5), Some(&Instr::StoreInd(NativeKind::F32)));
        assert_eq!(list.as_slice().last(), Some(&Instr::LoadInd(NativeKind::F32)));
    }

    #[test]
    fn test_object_reference_casts_to_target() {
        let (mut module, refs) = refs();
        let target = TypeSig::named("Game", "Weapon");
        let category = BindingCategory::ObjectReference {
            target: target.clone(),
        };
        let mut b = BodyBuilder::new();
        {
            let mut emitter = Emitter::new(&mut module, &refs);
            let addr = NativeAddress::at(ValueSource::Arg(0));
            emitter
                .emit_marshal_from_native(&mut b, &category, &target, &MemberSlots::default(), &addr)
                .unwrap();
        }
        let (list, _) = b.into_list().unwrap();
        assert_eq!(
            called(&module, &list.as_slice()[1]),
            "Tether.Runtime.ObjectMarshaller::FromNative"
        );
        let cast = list.as_slice()[2].type_token().unwrap();
        assert_eq!(module.type_ref(cast), Some(&target));
    }

    #[test]
    fn test_string_requires_handle_slot() {
        let (mut module, refs) = refs();
        let mut emitter = Emitter::new(&mut module, &refs);
        let mut b = BodyBuilder::new();
        let addr = NativeAddress::at(ValueSource::Arg(0));
        let result = emitter.emit_marshal_from_native(
            &mut b,
            &BindingCategory::String,
            &TypeSig::String,
            &MemberSlots::default(),
            &addr,
        );
        assert!(matches!(result, Err(WeaveError::Inconsistent(_))));
    }

    #[test]
    fn test_fixed_array_has_no_store() {
        let (mut module, refs) = refs();
        let mut emitter = Emitter::new(&mut module, &refs);
        let category = BindingCategory::FixedArray {
            inner: Box::new(BindingCategory::Scalar(NativeKind::I32)),
            inner_ty: TypeSig::I32,
            dim: 4,
        };
        let mut b = BodyBuilder::new();
        let addr = NativeAddress::at(ValueSource::Arg(0));
        let ty = TypeSig::Generic {
            base: TypeName::new("Tether.Runtime", "FixedArray"),
            args: vec![TypeSig::I32],
        };
        assert!(emitter
            .emit_marshal_to_native(&mut b, &category, &ty, &MemberSlots::default(), &addr, ValueSource::Arg(1))
            .is_err());
    }

    #[test]
    fn test_cleanup_only_for_owning_categories() {
        let (mut module, refs) = refs();
        let mut emitter = Emitter::new(&mut module, &refs);
        let mut b = BodyBuilder::new();
        let addr = NativeAddress::at(ValueSource::Local(0));
        emitter
            .emit_cleanup(&mut b, &BindingCategory::Boolean, &MemberSlots::default(), &addr)
            .unwrap();
        assert_eq!(b.current_position(), 0);
        emitter
            .emit_cleanup(&mut b, &BindingCategory::Text, &MemberSlots::default(), &addr)
            .unwrap();
        assert_eq!(b.current_position(), 2);
    }
}
