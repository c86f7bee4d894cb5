//! Property access on wrapped native instances
//!
//! Getters of wrapper categories hand out one cached accessor object per
//! instance instead of copying native data on every read.

use super::{Emitter, MemberSlots, NativeAddress, ValueSource};
use crate::category::BindingCategory;
use crate::error::{WeaveError, WeaveResult};
use crate::names::{self, runtime_types};
use tether_bytecode::{BodyBuilder, Instr, MemberRef, TypeSig};

impl Emitter<'_> {
    /// Push the value of an instance member
    pub fn emit_load(
        &mut self,
        b: &mut BodyBuilder,
        category: &BindingCategory,
        ty: &TypeSig,
        slots: &MemberSlots,
        addr: &NativeAddress,
    ) -> WeaveResult<()> {
        if !category.needs_wrapper_field() {
            return self.emit_marshal_from_native(b, category, ty, slots, addr);
        }
        let wrapper = slots.wrapper.ok_or_else(|| {
            WeaveError::Inconsistent(format!("wrapper field missing for category {}", category))
        })?;

        // if (this.W == null) this.W = <wrapper>; return this.W
        let ready = b.new_label();
        b.load_arg(0);
        b.emit(Instr::LoadField(wrapper));
        b.emit(Instr::ConstNull);
        b.emit(Instr::Ceq);
        b.jmp_if_false(ready);
        b.load_arg(0);
        self.emit_wrapper(b, category, slots, addr)?;
        b.emit(Instr::StoreField(wrapper));
        b.bind(ready);
        b.load_arg(0);
        b.emit(Instr::LoadField(wrapper));
        Ok(())
    }

    /// Write `value` to an instance member
    pub fn emit_store(
        &mut self,
        b: &mut BodyBuilder,
        category: &BindingCategory,
        ty: &TypeSig,
        slots: &MemberSlots,
        addr: &NativeAddress,
        value: ValueSource,
    ) -> WeaveResult<()> {
        if category.suppresses_setter() {
            return Err(WeaveError::Inconsistent(format!(
                "category {} is only mutated through its wrapper",
                category
            )));
        }
        self.emit_marshal_to_native(b, category, ty, slots, addr, value)
    }

    /// Create a subobject of class `target` and store it at `addr`
    pub fn emit_create_subobject(
        &mut self,
        b: &mut BodyBuilder,
        target: &TypeSig,
        native_name: &str,
        addr: &NativeAddress,
    ) {
        let names = self.refs().names();
        let create = self.refs().create_default_subobject(self.module());
        let class_ptr = self.member(MemberRef::static_field(
            target.clone(),
            names::NATIVE_CLASS_PTR,
            TypeSig::IntPtr,
        ));
        addr.push(b);
        b.load_arg(0);
        self.emit_load_string(b, native_name);
        b.load_static(class_ptr);
        b.call(create);
        self.call_static(
            b,
            names.runtime_sig(runtime_types::OBJECT_MARSHALLER),
            "ToNative",
            vec![TypeSig::IntPtr, names.native_root_sig()],
            TypeSig::Void,
        );
    }

    fn emit_wrapper(
        &mut self,
        b: &mut BodyBuilder,
        category: &BindingCategory,
        slots: &MemberSlots,
        addr: &NativeAddress,
    ) -> WeaveResult<()> {
        let names = self.refs().names();
        match category {
            BindingCategory::Text => {
                addr.push(b);
                self.new_object(b, names.runtime_sig(runtime_types::TEXT), vec![TypeSig::IntPtr]);
                Ok(())
            }
            BindingCategory::FixedArray { inner_ty, .. } => {
                // The array accessor is the wrapper itself
                self.emit_marshal_from_native(b, category, inner_ty, slots, addr)
            }
            BindingCategory::DynamicList { inner_ty, .. } => {
                let handle = slots.handle.ok_or_else(|| {
                    WeaveError::Inconsistent("list property handle slot missing".to_string())
                })?;
                b.load_static(handle);
                addr.push(b);
                self.new_object(
                    b,
                    names.runtime_generic(runtime_types::NATIVE_LIST, vec![inner_ty.clone()]),
                    vec![TypeSig::IntPtr, TypeSig::IntPtr],
                );
                Ok(())
            }
            _ => Err(WeaveError::Inconsistent(format!(
                "category {} has no wrapper",
                category
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ProcessingContext;
    use crate::runtime::RuntimeRefs;
    use tether_bytecode::{InstructionList, Label, Module, NativeKind, TypeDef, TypeKind};

    fn module() -> Module {
        let mut module = Module::new("Game");
        for name in ["NativeObject", "NativeLayout", "Text", "TextMarshaller"] {
            module
                .types
                .push(TypeDef::new("Tether.Runtime", name, TypeKind::Class));
        }
        module
    }

    fn getter(category: &BindingCategory, slots: MemberSlots) -> InstructionList {
        let ctx = ProcessingContext::with_defaults();
        let mut module = module();
        let refs = RuntimeRefs::resolve(&ctx, &module, [category]).unwrap();
        let mut emitter = Emitter::new(&mut module, &refs);
        let base = emitter.this_native();
        let mut b = BodyBuilder::new();
        emitter
            .emit_load(&mut b, category, &TypeSig::I32, &slots, &NativeAddress::new(base, 1))
            .unwrap();
        b.ret();
        b.into_list().unwrap().0
    }

    #[test]
    fn test_plain_getter_reads_native_memory() {
        let list = getter(&BindingCategory::Scalar(NativeKind::I32), MemberSlots::default());
        assert_eq!(list.len(), 7);
        assert_eq!(list.get(5), Some(&Instr::LoadInd(NativeKind::I32)));
    }

    #[test]
    fn test_wrapper_getter_is_lazy() {
        let slots = MemberSlots {
            wrapper: Some(4),
            ..MemberSlots::default()
        };
        let list = getter(&BindingCategory::Text, slots);
        assert_eq!(list.get(0), Some(&Instr::LoadArg(0)));
        assert_eq!(list.get(1), Some(&Instr::LoadField(4)));
        // Branch skips construction and lands on the final load
        let target = match list.get(4) {
            Some(Instr::JmpIfFalse(Label(target))) => *target as usize,
            other => panic!("expected branch, got {:?}", other),
        };
        assert_eq!(list.get(target), Some(&Instr::LoadArg(0)));
        assert_eq!(list.get(target + 1), Some(&Instr::LoadField(4)));
        assert_eq!(list.get(target - 1), Some(&Instr::StoreField(4)));
    }

    #[test]
    fn test_store_rejects_wrapper_categories() {
        let ctx = ProcessingContext::with_defaults();
        let mut module = module();
        let refs =
            RuntimeRefs::resolve(&ctx, &module, std::iter::empty::<&BindingCategory>()).unwrap();
        let mut emitter = Emitter::new(&mut module, &refs);
        let mut b = BodyBuilder::new();
        let addr = NativeAddress::at(ValueSource::Arg(0));
        let result = emitter.emit_store(
            &mut b,
            &BindingCategory::Text,
            &TypeSig::I32,
            &MemberSlots::default(),
            &addr,
            ValueSource::Arg(1),
        );
        assert!(result.is_err());
    }
}
